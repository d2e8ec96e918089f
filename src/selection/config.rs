use anyhow::{bail, Result};

/// Configuration for sample selection.
#[derive(Debug, Clone)]
pub struct SelectionConfig {
    /// Minimum time between two emitted samples, in the samples' timestamp domain.
    pub interval_ms: i64,
}

impl SelectionConfig {
    pub fn new(interval_ms: i64) -> Result<Self> {
        validate_interval(interval_ms)?;
        Ok(Self { interval_ms })
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

pub(crate) fn validate_interval(interval_ms: i64) -> Result<()> {
    if interval_ms <= 0 {
        bail!("reporting interval must be greater than zero (got {interval_ms}ms)");
    }
    Ok(())
}
