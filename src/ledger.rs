use crate::error::EngineError;
use crate::models::{PriceChange24h, Trade};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::broadcast;
use tracing::info;

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Buffered trade events per broadcast channel before lagging receivers
/// start losing messages.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Default)]
struct BookState {
    trades: Vec<Trade>,
    sol_raised: f64,
    latest_price: Option<f64>,
}

/// Point-in-time view of one token's book, taken under a single lock
/// acquisition: the trade list and the derived state it implies can never
/// disagree, so rollups computed from it never observe a torn append.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub trades: Vec<Trade>,
    pub sol_raised: f64,
    pub latest_price: Option<f64>,
}

impl LedgerSnapshot {
    /// Sum of `sol_amount` over trades in the trailing 24 hours.
    pub fn volume_24h(&self) -> f64 {
        let cutoff = now_ms() - DAY_MS;
        self.trades
            .iter()
            .filter(|t| t.timestamp_ms >= cutoff)
            .map(|t| t.sol_amount)
            .sum()
    }

    /// Price change over the trailing 24 hours.
    ///
    /// Reference is the first trade at or after `now - 24h`; when the whole
    /// history is older than that, falls back to last-vs-first over all
    /// trades. `None` when the token has never traded.
    pub fn price_change_24h(&self) -> Option<PriceChange24h> {
        if self.trades.is_empty() {
            return None;
        }
        let mut trades: Vec<&Trade> = self.trades.iter().collect();
        trades.sort_by_key(|t| t.timestamp_ms);

        let cutoff = now_ms() - DAY_MS;
        let last = trades.last()?;

        if let Some(reference) = trades.iter().find(|t| t.timestamp_ms >= cutoff) {
            let current = self.latest_price.unwrap_or(last.price);
            let change = current - reference.price;
            Some(PriceChange24h {
                change,
                percentage: change / reference.price * 100.0,
            })
        } else {
            let first = trades.first()?;
            let change = last.price - first.price;
            Some(PriceChange24h {
                change,
                percentage: change / first.price * 100.0,
            })
        }
    }

    /// Distinct wallets that have ever traded (buys and sells both count).
    pub fn holder_count(&self) -> usize {
        self.trades
            .iter()
            .map(|t| t.wallet.as_str())
            .collect::<HashSet<_>>()
            .len()
    }
}

/// One token's book: the append-only trade vector plus derived state, all
/// behind a single mutex so "read sol_raised, price, append" can run as one
/// atomic unit per token. Unrelated tokens never share this lock.
struct TokenBook {
    state: Mutex<BookState>,
    events: broadcast::Sender<Trade>,
}

impl TokenBook {
    fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(BookState::default()),
            events,
        }
    }
}

/// Append-only per-token trade store with derived `sol_raised` /
/// `latest_price` state and post-append event fan-out.
///
/// Appends publish on two channels: one carrying every trade and one per
/// token. `broadcast::Sender::send` never blocks, so a slow or disconnected
/// subscriber cannot stall the append path; it just lags and eventually
/// drops messages.
pub struct TradeLedger {
    books: RwLock<HashMap<String, Arc<TokenBook>>>,
    all_events: broadcast::Sender<Trade>,
}

impl TradeLedger {
    pub fn new() -> Self {
        let (all_events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            books: RwLock::new(HashMap::new()),
            all_events,
        }
    }

    fn book(&self, token: &str) -> Option<Arc<TokenBook>> {
        self.books.read().unwrap().get(token).cloned()
    }

    fn book_or_create(&self, token: &str) -> Arc<TokenBook> {
        if let Some(book) = self.book(token) {
            return book;
        }
        let mut books = self.books.write().unwrap();
        books
            .entry(token.to_string())
            .or_insert_with(|| Arc::new(TokenBook::new()))
            .clone()
    }

    /// Record an executed trade. The trade's `sol_raised_after` and
    /// `price_after` are taken as given and overwrite the token state
    /// unconditionally: last write wins by append order, not by timestamp.
    /// Out-of-order timestamps are accepted; settlement callbacks may race.
    pub fn append_trade(&self, trade: Trade) -> Result<(), EngineError> {
        Self::check_structure(&trade)?;
        let book = self.book_or_create(&trade.token_address);
        let state = book.state.lock().unwrap();
        self.commit(state, &book, trade);
        Ok(())
    }

    /// Run `build` under the token's book lock with the current `sol_raised`,
    /// then append the trade it produces. This is the single-writer path for
    /// "compute price, then record" as one atomic unit; concurrent trades on
    /// the same token serialize here and never price off a stale snapshot.
    pub fn append_with<F>(&self, token: &str, build: F) -> Result<Trade, EngineError>
    where
        F: FnOnce(f64) -> Result<Trade, EngineError>,
    {
        let book = self.book_or_create(token);
        let state = book.state.lock().unwrap();
        let trade = build(state.sol_raised)?;
        Self::check_structure(&trade)?;
        self.commit(state, &book, trade.clone());
        Ok(trade)
    }

    fn check_structure(trade: &Trade) -> Result<(), EngineError> {
        if trade.sol_amount <= 0.0 || trade.token_amount <= 0.0 || trade.price <= 0.0 {
            return Err(EngineError::InvalidAmount);
        }
        Ok(())
    }

    fn commit(&self, mut state: MutexGuard<'_, BookState>, book: &TokenBook, trade: Trade) {
        state.sol_raised = trade.sol_raised_after;
        state.latest_price = Some(trade.price_after);
        state.trades.push(trade.clone());

        // Publish while still holding the book lock so event order matches
        // append order. Send is non-blocking; a send with no receivers is
        // not an error.
        let _ = book.events.send(trade.clone());
        let _ = self.all_events.send(trade.clone());
        drop(state);

        info!(
            token = %trade.token_address,
            side = trade.side.as_str(),
            sol = trade.sol_amount,
            tokens = trade.token_amount,
            price = trade.price,
            "recorded trade"
        );
    }

    /// Consistent snapshot of a token's book, read under one lock so a
    /// concurrent append is either fully visible or not at all. Empty for
    /// unknown tokens.
    pub fn snapshot(&self, token: &str) -> LedgerSnapshot {
        match self.book(token) {
            Some(book) => {
                let state = book.state.lock().unwrap();
                LedgerSnapshot {
                    trades: state.trades.clone(),
                    sol_raised: state.sol_raised,
                    latest_price: state.latest_price,
                }
            }
            None => LedgerSnapshot::default(),
        }
    }

    /// All trades for a token in append order. Empty for unknown tokens.
    pub fn trades(&self, token: &str) -> Vec<Trade> {
        match self.book(token) {
            Some(book) => book.state.lock().unwrap().trades.clone(),
            None => Vec::new(),
        }
    }

    /// Trades with `start_ms <= timestamp_ms <= end_ms`, in append order.
    pub fn trades_in_range(&self, token: &str, start_ms: i64, end_ms: i64) -> Vec<Trade> {
        self.trades(token)
            .into_iter()
            .filter(|t| t.timestamp_ms >= start_ms && t.timestamp_ms <= end_ms)
            .collect()
    }

    pub fn latest_price(&self, token: &str) -> Option<f64> {
        self.book(token).and_then(|b| b.state.lock().unwrap().latest_price)
    }

    /// Cumulative net SOL raised. Zero for unknown tokens.
    pub fn sol_raised(&self, token: &str) -> f64 {
        self.book(token)
            .map(|b| b.state.lock().unwrap().sol_raised)
            .unwrap_or(0.0)
    }

    /// Sum of `sol_amount` over trades in the trailing 24 hours.
    pub fn volume_24h(&self, token: &str) -> f64 {
        self.snapshot(token).volume_24h()
    }

    /// Price change over the trailing 24 hours; see
    /// [`LedgerSnapshot::price_change_24h`].
    pub fn price_change_24h(&self, token: &str) -> Option<PriceChange24h> {
        self.snapshot(token).price_change_24h()
    }

    /// Distinct wallets that have ever traded this token (buys and sells).
    pub fn holder_count(&self, token: &str) -> usize {
        self.snapshot(token).holder_count()
    }

    /// Drop all trades and state for a token. Test/reset utility only, never
    /// part of the production trade path.
    pub fn clear_token(&self, token: &str) {
        self.books.write().unwrap().remove(token);
    }

    /// Subscribe to every trade across all tokens.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Trade> {
        self.all_events.subscribe()
    }

    /// Subscribe to one token's trades. Creates the book if absent so a
    /// subscription can precede the first trade.
    pub fn subscribe_token(&self, token: &str) -> broadcast::Receiver<Trade> {
        self.book_or_create(token).events.subscribe()
    }
}

impl Default for TradeLedger {
    fn default() -> Self {
        Self::new()
    }
}
