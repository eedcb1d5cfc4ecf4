//! Reference data returned by the `getCurrency`, `getSymbol` and `getTrades`
//! RPC calls.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::market_data::PublicTrade;
use super::symbol::Symbol;
use crate::time_util::format_wire_timestamp;

/// Currency metadata (`getCurrency`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyInfo {
    pub id: String,
    #[serde(rename = "fullname")]
    pub full_name: String,
    pub crypto: bool,
    pub payin_enabled: bool,
    pub payin_payment_id: bool,
    #[serde(default)]
    pub payin_confirmations: u32,
    pub payout_enabled: bool,
    pub payout_is_payment_id: bool,
    pub transfer_enabled: bool,
    #[serde(default)]
    pub delisted: bool,
    #[serde(default)]
    pub payout_fee: Option<Decimal>,
}

/// Market metadata (`getSymbol`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub id: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub quantity_increment: Decimal,
    pub tick_size: Decimal,
    pub take_liquidity_rate: Decimal,
    pub provide_liquidity_rate: Decimal,
    pub fee_currency: String,
}

// ---------------------------------------------------------------------------
// Trade history
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Field that `getTrades` sorts and filters by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeHistoryBy {
    Timestamp,
    Id,
}

impl TradeHistoryBy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Id => "id",
        }
    }
}

/// Optional `getTrades` parameters. Unset fields are left out of the request
/// and take the exchange's defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeHistoryQuery {
    pub limit: Option<u32>,
    pub sort: Option<SortOrder>,
    pub by: Option<TradeHistoryBy>,
    pub from: Option<DateTime<Utc>>,
    pub till: Option<DateTime<Utc>>,
    pub offset: Option<u32>,
}

impl TradeHistoryQuery {
    /// Request params for `symbol`.
    pub fn params(&self, symbol: &Symbol) -> Value {
        let mut params = Map::new();
        params.insert("symbol".into(), Value::String(symbol.to_string()));
        if let Some(limit) = self.limit {
            params.insert("limit".into(), limit.into());
        }
        if let Some(sort) = self.sort {
            params.insert("sort".into(), sort.as_str().into());
        }
        if let Some(by) = self.by {
            params.insert("by".into(), by.as_str().into());
        }
        if let Some(from) = &self.from {
            params.insert("from".into(), format_wire_timestamp(from).into());
        }
        if let Some(till) = &self.till {
            params.insert("till".into(), format_wire_timestamp(till).into());
        }
        if let Some(offset) = self.offset {
            params.insert("offset".into(), offset.into());
        }
        Value::Object(params)
    }
}

/// `getTrades` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeHistory {
    #[serde(default)]
    pub data: Vec<PublicTrade>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn symbol_info_wire_names() {
        let json = r#"{
            "id": "ETHBTC", "baseCurrency": "ETH", "quoteCurrency": "BTC",
            "quantityIncrement": "0.001", "tickSize": "0.000001",
            "takeLiquidityRate": "0.001", "provideLiquidityRate": "-0.0001",
            "feeCurrency": "BTC"
        }"#;
        let info: SymbolInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.tick_size, dec!(0.000001));
        assert_eq!(info.provide_liquidity_rate, dec!(-0.0001));
    }

    #[test]
    fn currency_info_wire_names() {
        let json = r#"{
            "id": "ETH", "fullname": "Ethereum", "crypto": true, "payinEnabled": true,
            "payinPaymentId": false, "payinConfirmations": 2, "payoutEnabled": true,
            "payoutIsPaymentId": false, "transferEnabled": true, "delisted": false,
            "payoutFee": "0.042800000000"
        }"#;
        let info: CurrencyInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.full_name, "Ethereum");
        assert_eq!(info.payin_confirmations, 2);
        assert_eq!(info.payout_fee, Some(dec!(0.0428)));
    }

    #[test]
    fn trade_query_sends_only_set_fields() {
        let symbol = Symbol::new("ETHBTC").unwrap();
        assert_eq!(TradeHistoryQuery::default().params(&symbol), json!({"symbol": "ETHBTC"}));

        let query = TradeHistoryQuery {
            limit: Some(2),
            sort: Some(SortOrder::Asc),
            by: Some(TradeHistoryBy::Timestamp),
            from: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            offset: Some(10),
            ..Default::default()
        };
        assert_eq!(
            query.params(&symbol),
            json!({
                "symbol": "ETHBTC", "limit": 2, "sort": "ASC", "by": "timestamp",
                "from": "2024-01-01T00:00:00.000Z", "offset": 10
            })
        );
    }
}
