//! VM requirement normalization
//!
//! Migration sheets arrive with inconsistent column names ("VM" vs "name",
//! "instance type" vs "instance_type") and numbers stored as strings. This
//! module maps every accepted alias onto the canonical `VmRequirement` so
//! the engine only ever sees canonical fields. The original row is kept as
//! `metadata` and passed through to the output untouched.

use crate::catalog::{csv_records, lookup, lookup_memory, value_as_f64, value_as_string};
use crate::error::{Result, SizectlError};
use crate::source;
use crate::utils::MemoryUnit;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

const NAME_KEYS: &[&str] = &["VM", "name", "vm_name"];
const CPU_KEYS: &[&str] = &["cpu", "cpus", "vcpus"];
const MEMORY_KEYS: &[(&str, MemoryUnit)] = &[
    ("memory", MemoryUnit::Unlabelled),
    ("memory_value", MemoryUnit::Unlabelled),
    ("memory_mb", MemoryUnit::Mib),
    ("memory_gb", MemoryUnit::Gib),
];
const INSTANCE_TYPE_KEYS: &[&str] = &["instance type", "instance_type", "InstanceType"];
const MANUFACTURER_KEYS: &[&str] = &["manufacturer", "Manufacturer"];

const DEFAULT_CPU: u32 = 1;
/// 1024 MiB
const DEFAULT_MEMORY_GB: f64 = 1.0;

/// Placeholder values spreadsheets leave in empty instance type cells
const BLANK_SENTINELS: &[&str] = &["", "nan", "none", "null"];

/// One workload to size, in canonical form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmRequirement {
    pub name: String,
    pub cpu: u32,
    pub memory_gb: f64,
    /// Raw preference; resolved against the default by the engine
    pub manufacturer_preference: Option<String>,
    /// Trimmed, already checked against the blank sentinels
    pub predefined_instance_type: Option<String>,
    /// The original input row
    pub metadata: Map<String, Value>,
}

impl VmRequirement {
    pub fn new(name: impl Into<String>, cpu: u32, memory_gb: f64) -> Self {
        Self {
            name: name.into(),
            cpu,
            memory_gb,
            manufacturer_preference: None,
            predefined_instance_type: None,
            metadata: Map::new(),
        }
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer_preference = Some(manufacturer.into());
        self
    }

    pub fn with_predefined(mut self, instance_type: impl Into<String>) -> Self {
        self.predefined_instance_type = predefined_instance_type(&instance_type.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Normalize one raw input row
    pub fn from_record(record: &Map<String, Value>) -> Self {
        let name = lookup(record, NAME_KEYS)
            .and_then(value_as_string)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        let cpu = match lookup(record, CPU_KEYS) {
            None => DEFAULT_CPU,
            Some(value) => coerce_cpu(value).unwrap_or_else(|| {
                warn!("VM {}: cpu value {} is not numeric, using {}", name, value, DEFAULT_CPU);
                DEFAULT_CPU
            }),
        };

        let memory_gb = match lookup_memory(record, MEMORY_KEYS) {
            None => DEFAULT_MEMORY_GB,
            Some((value, unit)) => value_as_f64(value).map(|v| unit.to_gb(v)).unwrap_or_else(|| {
                warn!(
                    "VM {}: memory value {} is not numeric, using {} GB",
                    name, value, DEFAULT_MEMORY_GB
                );
                DEFAULT_MEMORY_GB
            }),
        };

        let predefined = lookup(record, INSTANCE_TYPE_KEYS)
            .and_then(value_as_string)
            .and_then(|s| predefined_instance_type(&s));

        let manufacturer_preference = lookup(record, MANUFACTURER_KEYS)
            .and_then(value_as_string)
            .filter(|s| !s.is_empty());

        Self {
            name,
            cpu,
            memory_gb,
            manufacturer_preference,
            predefined_instance_type: predefined,
            metadata: record.clone(),
        }
    }
}

/// Fractional vCPU counts round up; zero and negative values are kept as 0
/// and handled by the engine's ratio guard.
fn coerce_cpu(value: &Value) -> Option<u32> {
    value_as_f64(value).map(|v| v.max(0.0).ceil() as u32)
}

/// Return the trimmed instance type unless it is blank or a sentinel
/// ("nan", "none", "null", any case).
pub fn predefined_instance_type(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if BLANK_SENTINELS.contains(&trimmed.to_lowercase().as_str()) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Normalize a batch of raw rows, preserving order
pub fn normalize_records(records: &[Map<String, Value>]) -> Vec<VmRequirement> {
    records.iter().map(VmRequirement::from_record).collect()
}

/// Parse raw rows from JSON (array of objects) or CSV bytes
pub fn parse_records(bytes: &[u8], json: bool) -> Result<Vec<Map<String, Value>>> {
    if json {
        let values: Vec<Value> = serde_json::from_slice(bytes)?;
        values
            .into_iter()
            .enumerate()
            .map(|(i, v)| match v {
                Value::Object(map) => Ok(map),
                other => Err(SizectlError::validation(
                    format!("row {}", i),
                    format!("expected a JSON object, got: {}", other),
                )),
            })
            .collect()
    } else {
        csv_records(bytes)
    }
}

/// Load raw requirement rows from a local file or `s3://` object
pub async fn load_records(location: &str) -> Result<Vec<Map<String, Value>>> {
    let bytes = source::read_source(location)
        .await
        .map_err(|e| SizectlError::Input {
            source_location: location.to_string(),
            message: e.to_string(),
        })?;

    let records =
        parse_records(&bytes, source::is_json(location)).map_err(|e| SizectlError::Input {
            source_location: location.to_string(),
            message: e.to_string(),
        })?;

    info!("Loaded {} VM rows from {}", records.len(), location);
    Ok(records)
}
