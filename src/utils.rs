use anyhow::{Context, Result};
use std::path::Path;

/// Hours in an average month, used for monthly cost estimates
pub const HOURS_PER_MONTH: f64 = 730.0;

/// Memory values above this are taken to be MiB; at or below it they are
/// already GB.
pub const MIB_THRESHOLD: f64 = 100.0;

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    Ok(())
}

/// Format an hourly price for display ("$0.10")
pub fn format_price(hourly: f64) -> String {
    format!("${:.2}", hourly)
}

/// Format an hourly price with three decimals, as shown to the AI advisor
pub fn format_price_precise(hourly: f64) -> String {
    format!("${:.3}", hourly)
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn monthly_cost(hourly: f64) -> f64 {
    hourly * HOURS_PER_MONTH
}

/// Normalize a memory figure to GB.
///
/// Values above 100 are MiB (8192 → 8.0); values at or below 100 are
/// already GB (8 → 8.0).
pub fn normalize_memory_gb(value: f64) -> f64 {
    if value > MIB_THRESHOLD {
        value / 1024.0
    } else {
        value
    }
}

/// Unit implied by the column a memory figure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryUnit {
    /// Column name says nothing (`memory`, `memory_value`): apply the MiB heuristic
    Unlabelled,
    Gib,
    Mib,
}

impl MemoryUnit {
    pub fn to_gb(self, value: f64) -> f64 {
        match self {
            MemoryUnit::Unlabelled => normalize_memory_gb(value),
            MemoryUnit::Gib => value,
            MemoryUnit::Mib => value / 1024.0,
        }
    }
}
