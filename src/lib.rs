//! sizectl library
//!
//! Recommends AWS EC2 instance types for on-premises VMs from a pricing
//! catalog, either with a deterministic ratio-based engine or with an
//! LLM advisor that falls back to it.

pub mod advisor;
pub mod catalog;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod grouping;
pub mod report;
pub mod requirements;
pub mod retry;
pub mod sizing;
pub mod source;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use catalog::{Catalog, InstanceSpec, Manufacturer};
pub use error::{Result, SizectlError};
pub use requirements::VmRequirement;
pub use sizing::{recommend, Method, Recommendation, RecommendationBatch};
