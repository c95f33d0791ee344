use crate::config::CurveConfig;
use crate::error::EngineError;
use crate::models::TradeSide;

/// Maximum allowed price impact for a buy, in percent.
pub const MAX_BUY_IMPACT_PCT: f64 = 50.0;

/// Stateless pricing against the supply curve `f(x) = a - b/(c + x)`, where
/// `x` is cumulative SOL raised and `f(x)` is tokens sold. Strictly
/// increasing, so price only falls through sells.
///
/// Every division with a denominator that can reach zero near the graduation
/// boundary returns `CurveExhausted` instead of producing NaN or infinity.
#[derive(Debug, Clone)]
pub struct BondingCurve {
    cfg: CurveConfig,
}

impl BondingCurve {
    pub fn new(cfg: CurveConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &CurveConfig {
        &self.cfg
    }

    /// Cumulative tokens sold once `sol_raised` SOL has been contributed.
    fn tokens_sold(&self, sol_raised: f64) -> f64 {
        self.cfg.a - self.cfg.b / (self.cfg.c + sol_raised)
    }

    /// Tokens received for `sol_in` SOL at the current curve position.
    pub fn tokens_out(&self, sol_in: f64, sol_raised: f64) -> f64 {
        let sold_before = self.tokens_sold(sol_raised);
        let sold_after = self.tokens_sold(sol_raised + sol_in);
        (sold_after - sold_before).max(0.0)
    }

    /// SOL required to buy `tokens_out` tokens, inverting the curve.
    pub fn sol_in(&self, tokens_out: f64, sol_raised: f64) -> Result<f64, EngineError> {
        let target_sold = self.tokens_sold(sol_raised) + tokens_out;
        let denom = self.cfg.a - target_sold;
        if denom <= 0.0 {
            return Err(EngineError::CurveExhausted);
        }
        Ok((self.cfg.b / denom - self.cfg.c - sol_raised).max(0.0))
    }

    /// SOL returned for selling `tokens_in` tokens back into the curve.
    pub fn sol_out(&self, tokens_in: f64, sol_raised: f64) -> Result<f64, EngineError> {
        let new_sold = self.tokens_sold(sol_raised) - tokens_in;
        let denom = self.cfg.a - new_sold;
        if denom <= 0.0 {
            return Err(EngineError::CurveExhausted);
        }
        let new_sol_raised = self.cfg.b / denom - self.cfg.c;
        Ok((sol_raised - new_sol_raised).max(0.0))
    }

    /// Instantaneous marginal price in SOL per token: the reciprocal of the
    /// curve derivative `f'(x) = b/(c + x)^2`.
    pub fn current_price(&self, sol_raised: f64) -> Result<f64, EngineError> {
        let d = self.cfg.c + sol_raised;
        let tokens_per_sol = self.cfg.b / (d * d);
        if tokens_per_sol <= 0.0 || !tokens_per_sol.is_finite() {
            return Err(EngineError::CurveExhausted);
        }
        Ok(1.0 / tokens_per_sol)
    }

    pub fn initial_price(&self) -> Result<f64, EngineError> {
        self.current_price(0.0)
    }

    /// Percentage change in marginal price caused by buying `sol_in` SOL.
    pub fn price_impact(&self, sol_in: f64, sol_raised: f64) -> Result<f64, EngineError> {
        let before = self.current_price(sol_raised)?;
        let after = self.current_price(sol_raised + sol_in)?;
        Ok((after - before) / before * 100.0)
    }

    /// Progress toward graduation, clamped to `[0, 100]` percent.
    pub fn graduation_progress(&self, sol_raised: f64) -> f64 {
        (sol_raised / self.cfg.graduation_threshold_sol * 100.0).clamp(0.0, 100.0)
    }

    /// Fully-diluted market cap in USD given a SOL/USD price.
    pub fn market_cap(&self, sol_raised: f64, sol_price_usd: f64) -> Result<f64, EngineError> {
        Ok(self.current_price(sol_raised)? * self.cfg.total_supply * sol_price_usd)
    }

    /// Validate a trade before any ledger mutation. `amount` is SOL for buys
    /// and tokens for sells.
    pub fn validate_trade(
        &self,
        amount: f64,
        side: TradeSide,
        sol_raised: f64,
    ) -> Result<(), EngineError> {
        if amount <= 0.0 || !amount.is_finite() {
            return Err(EngineError::InvalidAmount);
        }

        match side {
            TradeSide::Buy => {
                let would_raise = sol_raised + amount;
                if would_raise > self.cfg.graduation_threshold_sol {
                    return Err(EngineError::GraduationExceeded {
                        would_raise,
                        threshold: self.cfg.graduation_threshold_sol,
                    });
                }
                let impact = self.price_impact(amount, sol_raised)?;
                if impact > MAX_BUY_IMPACT_PCT {
                    return Err(EngineError::ExcessiveImpact { impact });
                }
            }
            TradeSide::Sell => {
                let sol_back = self.sol_out(amount, sol_raised)?;
                if sol_back > sol_raised {
                    return Err(EngineError::InsufficientLiquidity);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> BondingCurve {
        BondingCurve::new(CurveConfig::default())
    }

    fn assert_close(actual: f64, expected: f64, rel_tol: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= expected.abs() * rel_tol,
            "expected {expected}, got {actual} (diff {diff})"
        );
    }

    #[test]
    fn one_sol_buy_at_empty_curve_matches_closed_form() {
        let c = curve();
        let cfg = c.config();

        // f(1) - f(0) collapses to b / (c * (c + 1)).
        let expected = cfg.b / (cfg.c * (cfg.c + 1.0));
        let got = c.tokens_out(1.0, 0.0);

        assert!(got > 0.0);
        assert_close(got, expected, 1e-4);
    }

    #[test]
    fn sol_in_inverts_tokens_out() {
        let c = curve();
        for &(sol_in, raised) in &[(0.5, 0.0), (1.0, 10.0), (5.0, 40.0), (0.01, 84.0)] {
            let tokens = c.tokens_out(sol_in, raised);
            assert!(tokens > 0.0);
            let back = c.sol_in(tokens, raised).unwrap();
            assert_close(back, sol_in, 1e-6);
        }
    }

    #[test]
    fn price_is_strictly_increasing_in_sol_raised() {
        let c = curve();
        let mut last = 0.0;
        let mut x = 0.0;
        while x <= 85.0 {
            let p = c.current_price(x).unwrap();
            assert!(p > last, "price not increasing at sol_raised={x}");
            last = p;
            x += 0.5;
        }
    }

    #[test]
    fn buy_then_sell_round_trip_never_profits() {
        let c = curve();
        let sol_in = 5.0;
        let raised = 10.0;

        let tokens = c.tokens_out(sol_in, raised);
        let sol_back = c.sol_out(tokens, raised + sol_in).unwrap();

        assert!(sol_back <= sol_in + 1e-9);
        assert_close(sol_back, sol_in, 1e-6);
    }

    #[test]
    fn buy_past_graduation_threshold_is_rejected() {
        let c = curve();
        let err = c.validate_trade(86.0, TradeSide::Buy, 0.0).unwrap_err();
        assert!(matches!(err, EngineError::GraduationExceeded { .. }));
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let c = curve();
        assert_eq!(
            c.validate_trade(0.0, TradeSide::Buy, 0.0),
            Err(EngineError::InvalidAmount)
        );
        assert_eq!(
            c.validate_trade(-1.0, TradeSide::Sell, 10.0),
            Err(EngineError::InvalidAmount)
        );
    }

    #[test]
    fn high_impact_buy_is_rejected() {
        let c = curve();
        // 7 SOL at an empty curve moves the marginal price by
        // (37/30)^2 - 1 = 52.1%, past the 50% limit.
        let err = c.validate_trade(7.0, TradeSide::Buy, 0.0).unwrap_err();
        assert!(matches!(err, EngineError::ExcessiveImpact { .. }));

        // A smaller buy passes.
        assert!(c.validate_trade(5.0, TradeSide::Buy, 0.0).is_ok());
    }

    #[test]
    fn sell_on_empty_curve_lacks_liquidity() {
        let c = curve();
        let err = c.validate_trade(1_000.0, TradeSide::Sell, 0.0).unwrap_err();
        assert_eq!(err, EngineError::InsufficientLiquidity);
    }

    #[test]
    fn sell_within_liquidity_validates() {
        let c = curve();
        let tokens = c.tokens_out(2.0, 0.0);
        assert!(c.validate_trade(tokens, TradeSide::Sell, 2.0).is_ok());
    }

    #[test]
    fn requesting_the_whole_supply_exhausts_the_curve() {
        let c = curve();
        let remaining = c.config().a;
        assert_eq!(c.sol_in(remaining, 0.0), Err(EngineError::CurveExhausted));
    }

    #[test]
    fn graduation_progress_clamps() {
        let c = curve();
        assert_eq!(c.graduation_progress(0.0), 0.0);
        assert_close(c.graduation_progress(42.5), 50.0, 1e-12);
        assert_eq!(c.graduation_progress(200.0), 100.0);
    }

    #[test]
    fn initial_price_matches_derivative_at_zero() {
        let c = curve();
        let cfg = c.config();
        let expected = (cfg.c * cfg.c) / cfg.b;
        assert_close(c.initial_price().unwrap(), expected, 1e-12);
    }

    #[test]
    fn market_cap_scales_with_sol_price() {
        let c = curve();
        let at_one = c.market_cap(10.0, 1.0).unwrap();
        let at_180 = c.market_cap(10.0, 180.0).unwrap();
        assert_close(at_180, at_one * 180.0, 1e-12);
    }
}
