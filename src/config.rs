use crate::error::{BalanceSheetError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Absolute tolerance used when comparing a declared value to the sum of its
/// children: one ten-thousandth of a currency unit.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ValidationConfig {
    #[serde(default = "default_tolerance")]
    #[schemars(
        description = "Absolute difference allowed between a declared value and the sum of its children. A difference equal to the tolerance still balances."
    )]
    pub tolerance: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl ValidationConfig {
    pub fn with_tolerance(tolerance: f64) -> Self {
        Self { tolerance }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(BalanceSheetError::InvalidTolerance(self.tolerance));
        }
        Ok(())
    }
}
