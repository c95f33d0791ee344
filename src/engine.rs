use crate::config::CurveConfig;
use crate::curve::BondingCurve;
use crate::error::EngineError;
use crate::ledger::{now_ms, TradeLedger};
use crate::models::{Trade, TradeSide};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// A validated trade intent from the settlement collaborator. `amount` is
/// SOL for buys and tokens for sells.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeRequest {
    pub token_address: String,
    pub side: TradeSide,
    pub wallet: String,
    pub amount: f64,
    /// Fraction in `[0, 1)` the caller tolerates below the quoted output;
    /// sets the quote's `minimum_received` floor.
    pub slippage_tolerance: f64,
}

/// Priced outcome of a trade intent against the current curve position.
#[derive(Debug, Clone, Serialize)]
pub struct TradeQuote {
    pub side: TradeSide,
    pub sol_amount: f64,
    pub token_amount: f64,
    /// Effective (average) SOL-per-token price of the fill.
    pub price: f64,
    /// Instantaneous marginal price after the fill.
    pub new_price: f64,
    pub sol_raised_after: f64,
    pub price_impact: f64,
    pub graduation_progress: f64,
    /// Output floor for settlement: tokens for buys, SOL for sells, after
    /// the request's slippage tolerance.
    pub minimum_received: f64,
}

/// A recorded fill: the appended ledger trade plus post-trade curve position.
#[derive(Debug, Clone, Serialize)]
pub struct TradeOutcome {
    pub trade: Trade,
    pub graduation_progress: f64,
}

/// Front door for the settlement collaborator: quotes trade intents against
/// the ledger's live curve position and records settled fills.
pub struct MarketEngine {
    curve: BondingCurve,
    ledger: Arc<TradeLedger>,
}

impl MarketEngine {
    pub fn new(cfg: CurveConfig, ledger: Arc<TradeLedger>) -> Self {
        Self {
            curve: BondingCurve::new(cfg),
            ledger,
        }
    }

    pub fn curve(&self) -> &BondingCurve {
        &self.curve
    }

    pub fn ledger(&self) -> &Arc<TradeLedger> {
        &self.ledger
    }

    /// Price a trade intent against the token's current `sol_raised`.
    /// Read-only; the quote can go stale if another trade lands first.
    pub fn quote(&self, request: &TradeRequest) -> Result<TradeQuote, EngineError> {
        let sol_raised = self.ledger.sol_raised(&request.token_address);
        self.quote_at(request, sol_raised)
    }

    fn quote_at(&self, request: &TradeRequest, sol_raised: f64) -> Result<TradeQuote, EngineError> {
        if !(0.0..1.0).contains(&request.slippage_tolerance) {
            return Err(EngineError::InvalidAmount);
        }
        self.curve
            .validate_trade(request.amount, request.side, sol_raised)?;

        let (sol_amount, token_amount, sol_raised_after) = match request.side {
            TradeSide::Buy => {
                let tokens = self.curve.tokens_out(request.amount, sol_raised);
                if tokens <= 0.0 {
                    return Err(EngineError::CurveExhausted);
                }
                (request.amount, tokens, sol_raised + request.amount)
            }
            TradeSide::Sell => {
                let sol = self.curve.sol_out(request.amount, sol_raised)?;
                if sol <= 0.0 {
                    return Err(EngineError::InsufficientLiquidity);
                }
                (sol, request.amount, sol_raised - sol)
            }
        };

        let old_price = self.curve.current_price(sol_raised)?;
        let new_price = self.curve.current_price(sol_raised_after)?;

        let received = match request.side {
            TradeSide::Buy => token_amount,
            TradeSide::Sell => sol_amount,
        };

        Ok(TradeQuote {
            side: request.side,
            sol_amount,
            token_amount,
            price: sol_amount / token_amount,
            new_price,
            sol_raised_after,
            price_impact: (new_price - old_price) / old_price * 100.0,
            graduation_progress: self.curve.graduation_progress(sol_raised_after),
            minimum_received: received * (1.0 - request.slippage_tolerance),
        })
    }

    /// Validate, price and append in one atomic unit under the token's book
    /// lock, so two concurrent trades on the same token can never price off
    /// the same `sol_raised`. Called once settlement has succeeded;
    /// `external_tx_ref` is the settlement layer's transaction reference.
    pub fn execute(
        &self,
        request: &TradeRequest,
        external_tx_ref: &str,
    ) -> Result<TradeOutcome, EngineError> {
        let trade = self.ledger.append_with(&request.token_address, |sol_raised| {
            let quote = self.quote_at(request, sol_raised)?;
            Ok(Trade {
                id: Uuid::new_v4().to_string(),
                token_address: request.token_address.clone(),
                side: request.side,
                wallet: request.wallet.clone(),
                sol_amount: quote.sol_amount,
                token_amount: quote.token_amount,
                price: quote.price,
                timestamp_ms: now_ms(),
                external_tx_ref: external_tx_ref.to_string(),
                sol_raised_after: quote.sol_raised_after,
                price_after: quote.new_price,
            })
        })?;

        let graduation_progress = self.curve.graduation_progress(trade.sol_raised_after);
        Ok(TradeOutcome {
            trade,
            graduation_progress,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> MarketEngine {
        MarketEngine::new(CurveConfig::default(), Arc::new(TradeLedger::new()))
    }

    fn buy(token: &str, wallet: &str, sol: f64) -> TradeRequest {
        TradeRequest {
            token_address: token.to_string(),
            side: TradeSide::Buy,
            wallet: wallet.to_string(),
            amount: sol,
            slippage_tolerance: 0.01,
        }
    }

    fn sell(token: &str, wallet: &str, tokens: f64) -> TradeRequest {
        TradeRequest {
            token_address: token.to_string(),
            side: TradeSide::Sell,
            wallet: wallet.to_string(),
            amount: tokens,
            slippage_tolerance: 0.01,
        }
    }

    #[test]
    fn quote_matches_curve_math_on_fresh_token() {
        let eng = engine();
        let quote = eng.quote(&buy("mint", "w1", 1.0)).unwrap();

        assert_eq!(quote.sol_amount, 1.0);
        assert_eq!(quote.token_amount, eng.curve().tokens_out(1.0, 0.0));
        assert_eq!(quote.sol_raised_after, 1.0);
        assert_eq!(quote.new_price, eng.curve().current_price(1.0).unwrap());
        assert!(quote.price_impact > 0.0);
        assert!((quote.price - 1.0 / quote.token_amount).abs() < 1e-18);
    }

    #[test]
    fn quote_carries_minimum_received_after_slippage() {
        let eng = engine();

        let buy_quote = eng.quote(&buy("mint", "w1", 1.0)).unwrap();
        assert!((buy_quote.minimum_received - buy_quote.token_amount * 0.99).abs() < 1e-6);

        eng.execute(&buy("mint", "w1", 3.0), "tx-b").unwrap();
        let sell_quote = eng.quote(&sell("mint", "w1", buy_quote.token_amount)).unwrap();
        assert!((sell_quote.minimum_received - sell_quote.sol_amount * 0.99).abs() < 1e-12);
    }

    #[test]
    fn slippage_tolerance_outside_unit_range_is_rejected() {
        let eng = engine();

        let mut req = buy("mint", "w1", 1.0);
        req.slippage_tolerance = 1.5;
        assert_eq!(eng.quote(&req).unwrap_err(), EngineError::InvalidAmount);

        req.slippage_tolerance = -0.1;
        assert_eq!(eng.quote(&req).unwrap_err(), EngineError::InvalidAmount);
        assert!(eng.ledger().trades("mint").is_empty());
    }

    #[test]
    fn execute_appends_trade_matching_the_quote() {
        let eng = engine();
        let quote = eng.quote(&buy("mint", "w1", 2.0)).unwrap();
        let outcome = eng.execute(&buy("mint", "w1", 2.0), "tx-1").unwrap();

        assert_eq!(outcome.trade.sol_raised_after, quote.sol_raised_after);
        assert_eq!(outcome.trade.price_after, quote.new_price);
        assert_eq!(outcome.trade.external_tx_ref, "tx-1");

        let ledger = eng.ledger();
        assert_eq!(ledger.trades("mint").len(), 1);
        assert_eq!(ledger.sol_raised("mint"), 2.0);
        assert_eq!(ledger.latest_price("mint"), Some(quote.new_price));
    }

    #[test]
    fn rejected_trade_leaves_no_partial_record() {
        let eng = engine();
        let err = eng.execute(&buy("mint", "w1", 86.0), "tx-1").unwrap_err();
        assert!(matches!(err, EngineError::GraduationExceeded { .. }));
        assert!(eng.ledger().trades("mint").is_empty());
    }

    #[test]
    fn sequential_buys_accumulate_sol_raised() {
        let eng = engine();
        let mut prices = Vec::new();
        for i in 0..4 {
            let outcome = eng.execute(&buy("mint", "w1", 1.0), &format!("tx-{i}")).unwrap();
            prices.push(outcome.trade.price_after);
        }

        assert_eq!(eng.ledger().sol_raised("mint"), 4.0);
        // Each buy prices off the previous one's position.
        assert!(prices.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn buy_then_sell_round_trip_returns_at_most_the_sol_spent() {
        let eng = engine();
        let bought = eng.execute(&buy("mint", "w1", 3.0), "tx-b").unwrap();
        let sold = eng
            .execute(&sell("mint", "w1", bought.trade.token_amount), "tx-s")
            .unwrap();

        assert!(sold.trade.sol_amount <= 3.0 + 1e-9);
        assert!(sold.trade.price_after < bought.trade.price_after);
        assert!(eng.ledger().sol_raised("mint").abs() < 1e-9);
    }

    #[test]
    fn graduation_progress_tracks_sol_raised() {
        let eng = engine();
        // 17 buys of 2.5 SOL = 42.5 SOL = 50% of the 85 SOL threshold.
        for i in 0..17 {
            eng.execute(&buy("mint", "w1", 2.5), &format!("tx-{i}")).unwrap();
        }
        let outcome = eng.execute(&buy("mint", "w1", 2.5), "tx-final").unwrap();
        assert!((outcome.graduation_progress - (45.0 / 85.0 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn concurrent_buys_on_one_token_serialize() {
        let eng = Arc::new(engine());
        let mut handles = Vec::new();

        for t in 0..8 {
            let eng = eng.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..4 {
                    eng.execute(&buy("mint", "w", 1.0), &format!("tx-{t}-{i}")).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        // 32 buys of exactly 1 SOL: the serialized chain of sol_raised_after
        // values sums without float drift.
        assert_eq!(eng.ledger().sol_raised("mint"), 32.0);
        assert_eq!(eng.ledger().trades("mint").len(), 32);
    }

    #[test]
    fn cross_token_state_is_independent() {
        let eng = engine();
        eng.execute(&buy("mint-a", "w1", 1.0), "tx-a").unwrap();
        eng.execute(&buy("mint-b", "w2", 2.0), "tx-b").unwrap();

        assert_eq!(eng.ledger().sol_raised("mint-a"), 1.0);
        assert_eq!(eng.ledger().sol_raised("mint-b"), 2.0);
    }
}
