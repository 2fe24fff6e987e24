//! Checks on CLI arguments and model output
//!
//! Validates CLI arguments before they reach the loaders. Requirement rows are
//! not validated here: they are coerced in `requirements` and the engine
//! degrades instead of failing.

use crate::error::{Result, SizectlError};

/// Validate an EC2 instance type name ("m6i.large", "u-6tb1.metal")
///
/// Instance types are a family and a size joined by a single dot.
pub fn validate_instance_type(instance_type: &str) -> Result<()> {
    let parts: Vec<&str> = instance_type.split('.').collect();
    if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(SizectlError::Validation {
            field: "instance_type".to_string(),
            reason: format!(
                "Instance type must look like <family>.<size> (e.g. m6i.large), got: {}",
                instance_type
            ),
        });
    }

    if !instance_type
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(SizectlError::Validation {
            field: "instance_type".to_string(),
            reason: format!(
                "Instance type can only contain alphanumeric characters, dots and hyphens, got: {}",
                instance_type
            ),
        });
    }

    Ok(())
}

/// Validate a requested vCPU count
pub fn validate_cpu(cpu: u32) -> Result<()> {
    if cpu == 0 {
        return Err(SizectlError::Validation {
            field: "cpu".to_string(),
            reason: "vCPU count must be at least 1".to_string(),
        });
    }

    if cpu > 896 {
        return Err(SizectlError::Validation {
            field: "cpu".to_string(),
            reason: format!("vCPU count must be at most 896 (largest EC2 size), got: {}", cpu),
        });
    }

    Ok(())
}

/// Validate a requested memory figure (GB or MiB)
pub fn validate_memory(memory: f64) -> Result<()> {
    if !memory.is_finite() || memory <= 0.0 {
        return Err(SizectlError::Validation {
            field: "memory".to_string(),
            reason: format!("Memory must be a positive number, got: {}", memory),
        });
    }

    Ok(())
}

/// Validate an output format flag
pub fn validate_output_format(format: &str) -> Result<()> {
    match format {
        "text" | "json" => Ok(()),
        other => Err(SizectlError::Validation {
            field: "output".to_string(),
            reason: format!("Unsupported output format: {}. Use 'text' or 'json'", other),
        }),
    }
}

/// Reject local paths that climb out of the working tree or embed NUL
pub fn validate_path(path: &str) -> Result<()> {
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(SizectlError::validation(
            "path",
            format!("'{}' contains a '..' segment", path),
        ));
    }
    if path.contains('\0') {
        return Err(SizectlError::validation("path", "embedded NUL byte"));
    }
    Ok(())
}

/// Check the shape of an `s3://bucket[/key]` location
pub fn validate_s3_path(s3_path: &str) -> Result<()> {
    let Some(rest) = s3_path.strip_prefix("s3://") else {
        return Err(SizectlError::validation(
            "s3_path",
            format!("expected an s3://bucket/key location, got: {}", s3_path),
        ));
    };

    let bucket = rest.split('/').next().unwrap_or_default();
    // Only the length rule is checked; S3 itself rejects other bad names
    if !(3..=63).contains(&bucket.len()) {
        return Err(SizectlError::validation(
            "s3_path",
            format!("bucket '{}' must be 3 to 63 characters long", bucket),
        ));
    }
    Ok(())
}
