use thiserror::Error;

/// Typed failures returned to the settlement caller before any ledger
/// mutation. Read paths never produce these: absent data maps to empty/zero.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("trade amount must be positive")]
    InvalidAmount,

    #[error("buy would raise {would_raise} SOL, past the {threshold} SOL graduation threshold")]
    GraduationExceeded { would_raise: f64, threshold: f64 },

    #[error("price impact {impact:.2}% exceeds the 50% limit")]
    ExcessiveImpact { impact: f64 },

    #[error("sell would withdraw more SOL than the curve has raised")]
    InsufficientLiquidity,

    #[error("bonding curve exhausted: pricing denominator is not positive")]
    CurveExhausted,

    #[error("unknown token {0}")]
    UnknownToken(String),
}
