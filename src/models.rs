use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
        }
    }
}

/// An executed trade as recorded by the ledger. Immutable once appended.
///
/// `price` is the effective (average) SOL-per-token price of this fill;
/// `price_after` is the instantaneous marginal price once the fill settled.
/// `sol_raised_after` and `price_after` are taken as given from the pricing
/// path; the ledger records them without re-deriving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub token_address: String,
    pub side: TradeSide,
    pub wallet: String,
    pub sol_amount: f64,
    pub token_amount: f64,
    pub price: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    pub external_tx_ref: String,
    pub sol_raised_after: f64,
    pub price_after: f64,
}

/// One OHLCV bucket. `time` is the bucket start in seconds, floor-aligned to
/// the interval. Buckets exist only where at least one trade landed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Sum of `sol_amount` over the bucket's trades.
    pub volume: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceChange24h {
    pub change: f64,
    pub percentage: f64,
}

/// Rolling per-token statistics derived from the trade sequence.
#[derive(Debug, Clone, Serialize)]
pub struct TokenStats {
    pub latest_price: Option<f64>,
    pub sol_raised: f64,
    pub volume_24h: f64,
    pub price_change_24h: Option<PriceChange24h>,
    /// Distinct wallets that have ever traded the token. A proxy, not a true
    /// on-chain holder count.
    pub holder_count: usize,
}
