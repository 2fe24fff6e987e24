//! Input sources: local files and S3 objects
//!
//! Catalogs and requirement sheets are usually exported next to the migration
//! plan, either on disk or in an S3 bucket. Everything is read fully into
//! memory; these files are small.

use crate::error::{Result, SizectlError};
use crate::validation::validate_s3_path;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use std::path::Path;
use tracing::{debug, info};

pub fn is_s3(location: &str) -> bool {
    location.starts_with("s3://")
}

/// Whether a location should be parsed as JSON (by extension)
pub fn is_json(location: &str) -> bool {
    location.to_lowercase().ends_with(".json")
}

/// Split `s3://bucket/key` into bucket and key
pub fn parse_s3_path(s3_path: &str) -> Result<(String, String)> {
    validate_s3_path(s3_path)?;

    match s3_path["s3://".len()..].split_once('/') {
        Some((bucket, key)) if !key.is_empty() => Ok((bucket.to_string(), key.to_string())),
        _ => Err(SizectlError::S3(format!(
            "{} names a bucket but no object key",
            s3_path
        ))),
    }
}

/// Read the full contents of a local path or `s3://bucket/key`
pub async fn read_source(location: &str) -> Result<Vec<u8>> {
    if is_s3(location) {
        read_s3_object(location).await
    } else {
        debug!("Reading {}", location);
        let data = tokio::fs::read(Path::new(location)).await?;
        Ok(data)
    }
}

async fn read_s3_object(location: &str) -> Result<Vec<u8>> {
    let (bucket, key) = parse_s3_path(location)?;
    info!("Downloading s3://{}/{}", bucket, key);

    let aws_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let client = S3Client::new(&aws_config);

    let response = client
        .get_object()
        .bucket(&bucket)
        .key(&key)
        .send()
        .await
        .map_err(|e| SizectlError::S3(format!("Failed to download {}: {}", location, e)))?;

    let data = response
        .body
        .collect()
        .await
        .map_err(|e| SizectlError::S3(format!("Failed to read response body: {}", e)))?;

    Ok(data.into_bytes().to_vec())
}
