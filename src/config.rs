use anyhow::{bail, Result};
use serde::Deserialize;

/// Fixed curve parameters for the process lifetime. Token count sold at
/// cumulative SOL `x` is `f(x) = a - b/(c + x)`.
///
/// Defaults are the pump.fun mainnet constants: 1B total supply, 800M on the
/// curve, graduation at 85 SOL.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CurveConfig {
    pub total_supply: f64,
    pub initial_supply: f64,
    pub graduation_threshold_sol: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub lamports_per_sol: u64,
    pub token_decimals: u32,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            total_supply: 1_000_000_000.0,
            initial_supply: 800_000_000.0,
            graduation_threshold_sol: 85.0,
            a: 1_073_000_191.0,
            b: 32_190_005_730.0,
            c: 30.0,
            lamports_per_sol: 1_000_000_000,
            token_decimals: 6,
        }
    }
}

impl CurveConfig {
    /// Load from `config/engine.(toml|yaml|json)` relative to the working
    /// directory, then override with `ENGINE__...` environment variables.
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("config/engine").required(false))
            .add_source(config::Environment::with_prefix("ENGINE").separator("__"))
            .build()?;

        let cfg: CurveConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the curve invariants. `f` is strictly increasing, so checking
    /// both endpoints of the reachable range `[0, graduation_threshold_sol]`
    /// covers the whole interval.
    pub fn validate(&self) -> Result<()> {
        if self.a <= 0.0 || self.b <= 0.0 || self.c <= 0.0 {
            bail!("curve constants a, b, c must all be positive");
        }
        if self.graduation_threshold_sol <= 0.0 {
            bail!("graduation threshold must be positive");
        }
        if self.total_supply <= 0.0 || self.initial_supply <= 0.0 {
            bail!("token supply must be positive");
        }

        let sold_at_start = self.a - self.b / self.c;
        if sold_at_start < 0.0 {
            bail!("curve sells negative tokens at zero SOL raised (a < b/c)");
        }
        let sold_at_graduation = self.a - self.b / (self.c + self.graduation_threshold_sol);
        if sold_at_graduation > self.total_supply {
            bail!("curve sells more than the total supply before graduation");
        }
        Ok(())
    }
}
