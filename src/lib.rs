// Bonding-curve market-making and trade-ledger engine.
//
// Prices buy/sell trades against a deterministic supply curve, records every
// executed trade per token, and derives OHLCV candles and rolling statistics
// for a charting front end. Transport, auth and on-chain settlement live in
// the consuming service.

pub mod candles;
pub mod config;
pub mod curve;
pub mod datafeed;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod models;

pub use candles::CandleAggregator;
pub use config::CurveConfig;
pub use curve::BondingCurve;
pub use datafeed::ChartFeed;
pub use engine::{MarketEngine, TradeOutcome, TradeQuote, TradeRequest};
pub use error::EngineError;
pub use ledger::{LedgerSnapshot, TradeLedger};
pub use models::{Candle, Trade, TradeSide};
