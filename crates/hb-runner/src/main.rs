//! # hb-runner
//!
//! Entry point for the HitBTC feed multiplexer.
//!
//! Loads a JSON configuration file, connects to the exchange, opens every
//! configured subscription, and logs what arrives on each channel until
//! Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! hb-runner config.json --log-level info
//! ```

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use hb_core::config::SubscriptionConfig;
use hb_core::ws::{RpcClient, RpcTransport};
use hb_core::{Candles, Feed, OrderBook, Ticker, Trades};
use hb_feed::{DispatchError, FeedConfig, FeedMux, FeedReceiver};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// HitBTC market-data feed runner.
#[derive(Parser)]
#[command(name = "hb-runner", about = "HitBTC market-data feed runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log directory for file output. Overrides `module.log_path`.
    #[arg(long)]
    log_dir: Option<String>,

    /// Query and log `getSymbol` for each subscribed market before subscribing.
    #[arg(long)]
    describe: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = hb_core::config::load_config(&cli.config)?;

    // 2. Initialize logging
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    hb_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &config.module_name());
    info!(
        "hb-runner starting, config={} subscriptions={}",
        cli.config.display(),
        config.subscriptions.len()
    );

    // 3. Connect and build the multiplexer
    let transport: Arc<dyn RpcTransport> =
        RpcClient::connect(config.connection.rpc_config()).await?;
    let mux = FeedMux::new(transport, FeedConfig::from(&config.feed));

    let mut consumers = vec![spawn_consumer(
        "errors".into(),
        mux.errors(),
        |e: &DispatchError| e.to_string(),
    )];

    // 4. Open configured subscriptions
    for sub in &config.subscriptions {
        if cli.describe {
            match mux.get_symbol(sub.symbol.as_str()).await {
                Ok(meta) => info!(
                    "{}: base={} quote={} tick={} qty_step={}",
                    meta.id,
                    meta.base_currency,
                    meta.quote_currency,
                    meta.tick_size,
                    meta.quantity_increment
                ),
                Err(e) => warn!("getSymbol {}: {e}", sub.symbol),
            }
        }
        match subscribe(&mux, sub).await {
            Ok(handles) => consumers.extend(handles),
            Err(e) => error!("subscribe {} {}: {e}", sub.feed, sub.symbol),
        }
    }

    info!("{} topic(s) open, press Ctrl+C to stop", mux.topics().len());

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    // 6. Close; every consumer ends when its channel does
    mux.close().await;
    for handle in consumers {
        let _ = handle.await;
    }
    info!("all channels closed, goodbye");
    Ok(())
}

/// Open one configured subscription and spawn a logger per channel.
async fn subscribe(mux: &FeedMux, sub: &SubscriptionConfig) -> Result<Vec<JoinHandle<()>>> {
    let symbol = sub.symbol.as_str();
    let handles = match sub.feed {
        Feed::Ticker => {
            let rx = mux.subscribe_ticker(symbol).await?;
            vec![spawn_consumer(format!("ticker {symbol}"), rx, describe_ticker)]
        }
        Feed::OrderBook => {
            let (updates, snapshots) = mux.subscribe_order_book(symbol).await?;
            vec![
                spawn_consumer(format!("book update {symbol}"), updates, describe_book),
                spawn_consumer(format!("book snapshot {symbol}"), snapshots, describe_book),
            ]
        }
        Feed::Trades => {
            let (updates, snapshots) = mux.subscribe_trades(symbol).await?;
            vec![
                spawn_consumer(format!("trades update {symbol}"), updates, describe_trades),
                spawn_consumer(format!("trades snapshot {symbol}"), snapshots, describe_trades),
            ]
        }
        Feed::Candles => {
            let (updates, snapshots) = mux.subscribe_candles(symbol, sub.period).await?;
            vec![
                spawn_consumer(format!("candles update {symbol}"), updates, describe_candles),
                spawn_consumer(format!("candles snapshot {symbol}"), snapshots, describe_candles),
            ]
        }
    };
    Ok(handles)
}

fn spawn_consumer<T: Send + 'static>(
    label: String,
    rx: FeedReceiver<T>,
    describe: fn(&T) -> String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut count = 0u64;
        while let Some(msg) = rx.recv().await {
            count += 1;
            info!("[{label}] {}", describe(&msg));
        }
        info!("[{label}] closed after {count} message(s)");
    })
}

fn opt<T: Display>(v: &Option<T>) -> String {
    v.as_ref().map_or_else(|| "-".to_string(), ToString::to_string)
}

fn describe_ticker(t: &Ticker) -> String {
    format!(
        "bid={} ask={} last={} vol={}",
        opt(&t.bid),
        opt(&t.ask),
        opt(&t.last),
        t.volume
    )
}

fn describe_book(b: &OrderBook) -> String {
    format!(
        "seq={} best_ask={} best_bid={} levels={}/{}",
        b.sequence,
        opt(&b.ask.first().map(|l| l.price)),
        opt(&b.bid.first().map(|l| l.price)),
        b.ask.len(),
        b.bid.len()
    )
}

fn describe_trades(t: &Trades) -> String {
    match t.data.last() {
        Some(last) => format!(
            "{} trade(s), last {:?} {} @ {}",
            t.data.len(),
            last.side,
            opt(&last.quantity),
            last.price
        ),
        None => "0 trades".to_string(),
    }
}

fn describe_candles(c: &Candles) -> String {
    match c.data.last() {
        Some(last) => format!(
            "{} {} candle(s), last o={} c={} v={}",
            c.data.len(),
            c.period,
            last.open,
            last.close,
            last.volume
        ),
        None => format!("0 {} candles", c.period),
    }
}
