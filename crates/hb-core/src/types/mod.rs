//! Core data types: feed enums, symbols, and decoded payloads.

pub mod enums;
pub mod market_data;
pub mod reference;
pub mod symbol;

pub use enums::*;
pub use market_data::*;
pub use reference::*;
pub use symbol::*;
