use crate::candles::CandleAggregator;
use crate::config::CurveConfig;
use crate::curve::BondingCurve;
use crate::ledger::{now_ms, TradeLedger};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::info;

pub const EXCHANGE: &str = "LAUNCHPAD";

/// Fallback interval when a resolution string is unrecognized.
const DEFAULT_RESOLUTION_SECS: i64 = 900;

/// Map a charting resolution string to an interval in seconds.
pub fn resolution_to_seconds(resolution: &str) -> i64 {
    match resolution {
        "1" => 60,
        "5" => 300,
        "15" => 900,
        "30" => 1_800,
        "60" => 3_600,
        "240" => 14_400,
        "1D" | "D" => 86_400,
        "1W" | "W" => 604_800,
        "1M" | "M" => 2_592_000,
        _ => DEFAULT_RESOLUTION_SECS,
    }
}

/// Display metadata registered per token; the feed resolves symbols from it.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
}

/// Static symbol metadata in the shape the charting protocol expects:
/// 24x7 crypto session, 8-decimal price scale, streaming data.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub session: &'static str,
    pub timezone: &'static str,
    pub ticker: String,
    pub minmov: u32,
    pub pricescale: u64,
    pub has_intraday: bool,
    pub intraday_multipliers: Vec<&'static str>,
    pub supported_resolutions: Vec<&'static str>,
    pub volume_precision: u32,
    pub data_status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub symbol: String,
    pub full_name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub exchange: &'static str,
    pub ticker: String,
}

/// A chart bar. `time` is milliseconds, as the charting protocol expects.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BarsResponse {
    pub bars: Vec<Bar>,
    pub no_data: bool,
}

pub type BarCallback = Box<dyn Fn(Bar) + Send + 'static>;
pub type ResetCallback = Box<dyn Fn() + Send + 'static>;

/// Read-mostly query surface over the ledger and aggregator for a
/// "symbol + resolution + time range" charting protocol, plus live bar
/// subscriptions fed from the ledger's trade fan-out.
pub struct ChartFeed {
    curve: BondingCurve,
    ledger: Arc<TradeLedger>,
    candles: CandleAggregator,
    tokens: RwLock<HashMap<String, TokenInfo>>,
    subscriptions: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ChartFeed {
    pub fn new(cfg: CurveConfig, ledger: Arc<TradeLedger>) -> Self {
        Self {
            curve: BondingCurve::new(cfg),
            candles: CandleAggregator::new(ledger.clone()),
            ledger,
            tokens: RwLock::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Make a token resolvable and searchable.
    pub fn register_token(&self, address: &str, info: TokenInfo) {
        self.tokens
            .write()
            .unwrap()
            .insert(address.to_string(), info);
    }

    pub fn resolve_symbol(&self, name: &str) -> Option<SymbolInfo> {
        let tokens = self.tokens.read().unwrap();
        let info = tokens.get(name)?;

        Some(SymbolInfo {
            symbol: name.to_string(),
            name: format!("{}/SOL", info.symbol),
            description: info.name.clone(),
            kind: "crypto",
            session: "24x7",
            timezone: "Etc/UTC",
            ticker: name.to_string(),
            minmov: 1,
            pricescale: 100_000_000,
            has_intraday: true,
            intraday_multipliers: vec!["1", "5", "15", "30", "60", "240"],
            supported_resolutions: vec!["1", "5", "15", "30", "60", "240", "1D"],
            volume_precision: 8,
            data_status: "streaming",
        })
    }

    /// Substring search over registered token symbols, names and addresses.
    /// Symbol hits rank above name/address hits; output is bounded by
    /// `limit` and deterministic.
    pub fn search(
        &self,
        query: &str,
        type_filter: Option<&str>,
        exchange_filter: Option<&str>,
        limit: usize,
    ) -> Vec<SearchResult> {
        // Everything this feed serves is a crypto pair on the one exchange.
        if type_filter.is_some_and(|t| !t.is_empty() && t != "crypto") {
            return Vec::new();
        }
        if exchange_filter.is_some_and(|e| !e.is_empty() && e != EXCHANGE) {
            return Vec::new();
        }

        let needle = query.to_lowercase();
        let tokens = self.tokens.read().unwrap();

        let mut matches: Vec<(u8, SearchResult)> = tokens
            .iter()
            .filter_map(|(address, info)| {
                let symbol = info.symbol.to_lowercase();
                let rank = if symbol == needle {
                    0
                } else if symbol.contains(&needle) {
                    1
                } else if info.name.to_lowercase().contains(&needle)
                    || address.to_lowercase().contains(&needle)
                {
                    2
                } else {
                    return None;
                };

                Some((
                    rank,
                    SearchResult {
                        symbol: address.clone(),
                        full_name: format!("{}/SOL", info.symbol),
                        description: info.name.clone(),
                        kind: "crypto",
                        exchange: EXCHANGE,
                        ticker: address.clone(),
                    },
                ))
            })
            .collect();

        matches.sort_by(|a, b| (a.0, &a.1.symbol).cmp(&(b.0, &b.1.symbol)));
        matches.into_iter().take(limit).map(|(_, r)| r).collect()
    }

    /// Historical bars for `[from_secs, to_secs]` at the given resolution.
    ///
    /// When the token has no trades yet but the range reaches the present,
    /// returns a single zero-volume bar at the curve's current price so the
    /// chart can render the launch price instead of an empty pane.
    pub fn get_bars(
        &self,
        symbol: &str,
        resolution: &str,
        from_secs: i64,
        to_secs: i64,
        _is_first_request: bool,
    ) -> BarsResponse {
        let interval = resolution_to_seconds(resolution);
        if to_secs < from_secs {
            return BarsResponse {
                bars: Vec::new(),
                no_data: true,
            };
        }

        let limit = ((to_secs - from_secs) / interval + 1).max(1) as usize;
        let candles = self.candles.generate_ohlcv(symbol, interval, limit);

        if candles.is_empty() {
            let now_secs = now_ms() / 1000;
            if to_secs >= now_secs - interval {
                let sol_raised = self.ledger.sol_raised(symbol);
                if let Ok(price) = self.curve.current_price(sol_raised) {
                    return BarsResponse {
                        bars: vec![Bar {
                            time: now_secs * 1000,
                            open: price,
                            high: price,
                            low: price,
                            close: price,
                            volume: 0.0,
                        }],
                        no_data: false,
                    };
                }
            }
            return BarsResponse {
                bars: Vec::new(),
                no_data: true,
            };
        }

        let bars: Vec<Bar> = candles
            .iter()
            .filter(|c| c.time >= from_secs && c.time <= to_secs)
            .map(|c| Bar {
                time: c.time * 1000,
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
            })
            .collect();

        BarsResponse {
            no_data: bars.is_empty(),
            bars,
        }
    }

    /// Stream in-progress bars for a symbol. Each trade updates the current
    /// bucket's bar and pushes it to `on_bar`; a finished bucket's final bar
    /// is pushed once more before the next one opens. Trades landing in an
    /// older bucket fold into the in-progress bar so emitted bar times stay
    /// monotonic; only a strictly newer bucket opens a new bar.
    /// `on_reset_cache` fires when the subscriber fell behind the trade
    /// stream and must refetch.
    ///
    /// Fan-out runs on a spawned task over the ledger's broadcast channel,
    /// so a slow consumer never blocks the append path. Must be called from
    /// within a tokio runtime.
    pub fn subscribe_bars(
        &self,
        symbol: &str,
        resolution: &str,
        on_bar: BarCallback,
        subscriber_id: &str,
        on_reset_cache: ResetCallback,
    ) {
        let interval = resolution_to_seconds(resolution);
        let symbol = symbol.to_string();
        // Subscribe before spawning so trades appended from here on are seen.
        let mut rx = self.ledger.subscribe_all();

        let handle = tokio::spawn(async move {
            let mut current: Option<Bar> = None;

            loop {
                match rx.recv().await {
                    Ok(trade) => {
                        if trade.token_address != symbol {
                            continue;
                        }

                        let bucket_ms =
                            (trade.timestamp_ms / 1000).div_euclid(interval) * interval * 1000;

                        match current {
                            Some(ref mut bar) if bucket_ms <= bar.time => {
                                bar.high = bar.high.max(trade.price);
                                bar.low = bar.low.min(trade.price);
                                bar.close = trade.price;
                                bar.volume += trade.sol_amount;
                            }
                            ref mut slot => {
                                // Flush the finished bar before opening the
                                // next bucket.
                                if let Some(done) = slot.take() {
                                    on_bar(done);
                                }
                                *slot = Some(Bar {
                                    time: bucket_ms,
                                    open: trade.price,
                                    high: trade.price,
                                    low: trade.price,
                                    close: trade.price,
                                    volume: trade.sol_amount,
                                });
                            }
                        }

                        if let Some(bar) = current {
                            on_bar(bar);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        info!(missed, "bar subscriber lagged, resetting cache");
                        current = None;
                        on_reset_cache();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let mut subs = self.subscriptions.lock().unwrap();
        if let Some(old) = subs.insert(subscriber_id.to_string(), handle) {
            old.abort();
        }
    }

    /// Remove a subscriber. Idempotent: unknown ids are a no-op.
    pub fn unsubscribe_bars(&self, subscriber_id: &str) {
        if let Some(handle) = self.subscriptions.lock().unwrap().remove(subscriber_id) {
            handle.abort();
        }
    }
}

impl Drop for ChartFeed {
    fn drop(&mut self) {
        for (_, handle) in self.subscriptions.lock().unwrap().drain() {
            handle.abort();
        }
    }
}
