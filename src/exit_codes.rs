//! Process exit codes
//!
//! Scripts driving `sizectl` over many VM sheets need to tell a bad sheet
//! (1) from a broken catalog, bucket or endpoint (2) and from a broken
//! config file (3).

use crate::error::SizectlError;

pub mod codes {
    pub const SUCCESS: i32 = 0;
    /// Bad flags or an unreadable VM list
    pub const USER_ERROR: i32 = 1;
    /// Catalog, S3, completion endpoint or local I/O
    pub const SYSTEM_ERROR: i32 = 2;
    /// Config file missing a field or not parseable
    pub const CONFIG_ERROR: i32 = 3;
}

pub fn exit_code_for_error(error: &SizectlError) -> i32 {
    match error {
        SizectlError::Config(_) => codes::CONFIG_ERROR,
        SizectlError::Validation { .. } | SizectlError::Input { .. } => codes::USER_ERROR,
        SizectlError::Catalog { .. }
        | SizectlError::Advisor { .. }
        | SizectlError::Timeout { .. }
        | SizectlError::Retryable { .. }
        | SizectlError::S3(_)
        | SizectlError::Io(_)
        | SizectlError::Json(_)
        | SizectlError::Csv(_) => codes::SYSTEM_ERROR,
    }
}

/// Exit code for a top-level `anyhow` error
///
/// Errors that did not originate as a `SizectlError` (e.g. config file
/// read failures wrapped with context) count as system errors.
pub fn exit_code_for_anyhow(error: &anyhow::Error) -> i32 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<SizectlError>())
        .map(exit_code_for_error)
        .unwrap_or(codes::SYSTEM_ERROR)
}
