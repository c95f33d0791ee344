use crate::ledger::{now_ms, TradeLedger};
use crate::models::{Candle, TokenStats};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Derives OHLCV candles and rollup statistics from the ledger's trade
/// sequence on demand. Holds no state of its own: every call recomputes from
/// a fresh snapshot, so readers never observe a torn append.
pub struct CandleAggregator {
    ledger: Arc<TradeLedger>,
}

impl CandleAggregator {
    pub fn new(ledger: Arc<TradeLedger>) -> Self {
        Self { ledger }
    }

    /// Bucket a token's trades into candles of `interval_secs`, covering the
    /// trailing `limit` buckets. Buckets with no trades are omitted; output
    /// ascends by bucket time.
    ///
    /// Trades are processed in ledger append order, so a candle's `close` is
    /// the price of the last trade *appended* into the bucket, which can
    /// differ from the last by timestamp when settlement callbacks race.
    /// That matches the ledger's last-write-wins state semantics.
    pub fn generate_ohlcv(&self, token: &str, interval_secs: i64, limit: usize) -> Vec<Candle> {
        let trades = self.ledger.trades(token);
        if trades.is_empty() || interval_secs <= 0 {
            return Vec::new();
        }

        let bucket_ms = interval_secs * 1000;
        let window_start = now_ms() - limit as i64 * bucket_ms;
        let mut buckets: BTreeMap<i64, Candle> = BTreeMap::new();

        for trade in &trades {
            if trade.timestamp_ms < window_start {
                continue;
            }
            let bucket_time = trade.timestamp_ms.div_euclid(bucket_ms) * interval_secs;

            buckets
                .entry(bucket_time)
                .and_modify(|candle| {
                    candle.high = candle.high.max(trade.price);
                    candle.low = candle.low.min(trade.price);
                    candle.close = trade.price;
                    candle.volume += trade.sol_amount;
                })
                .or_insert(Candle {
                    time: bucket_time,
                    open: trade.price,
                    high: trade.price,
                    low: trade.price,
                    close: trade.price,
                    volume: trade.sol_amount,
                });
        }

        buckets.into_values().collect()
    }

    /// Rolling stats for a token, all derived from one locked snapshot so the
    /// fields can never disagree about which trades they have seen.
    pub fn token_stats(&self, token: &str) -> TokenStats {
        let snapshot = self.ledger.snapshot(token);
        TokenStats {
            latest_price: snapshot.latest_price,
            sol_raised: snapshot.sol_raised,
            volume_24h: snapshot.volume_24h(),
            price_change_24h: snapshot.price_change_24h(),
            holder_count: snapshot.holder_count(),
        }
    }
}
