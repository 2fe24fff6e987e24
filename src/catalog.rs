//! EC2 instance catalog
//!
//! The catalog is an ordered, immutable snapshot of instance types with their
//! vCPU count, memory and on-demand hourly price. Row order matters: when two
//! rows cost the same, the one that appears first wins.
//!
//! Catalogs come from a `CatalogProvider`. The engine never loads one itself,
//! so tests inject fixtures through `StaticCatalogProvider` or `Catalog::new`.

use crate::error::{Result, SizectlError};
use crate::source;
use crate::utils::MemoryUnit;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

const CATALOG_MEMORY_KEYS: &[(&str, MemoryUnit)] = &[
    ("MemoryMiB", MemoryUnit::Mib),
    ("memory_value", MemoryUnit::Unlabelled),
    ("memory", MemoryUnit::Unlabelled),
    ("memory_gb", MemoryUnit::Gib),
];

/// CPU manufacturer of an instance type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Manufacturer {
    Intel,
    #[serde(rename = "AMD")]
    Amd,
    #[serde(rename = "AWS")]
    Aws,
}

impl Manufacturer {
    /// Fixed order used when picking alternatives
    pub const ALL: [Manufacturer; 3] = [Manufacturer::Intel, Manufacturer::Amd, Manufacturer::Aws];

    pub fn as_str(&self) -> &'static str {
        match self {
            Manufacturer::Intel => "Intel",
            Manufacturer::Amd => "AMD",
            Manufacturer::Aws => "AWS",
        }
    }

    /// Lenient parse: trims, ignores case, accepts "graviton" for AWS.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "intel" => Some(Manufacturer::Intel),
            "amd" => Some(Manufacturer::Amd),
            "aws" | "graviton" => Some(Manufacturer::Aws),
            _ => None,
        }
    }
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Manufacturer {
    type Err = SizectlError;

    fn from_str(s: &str) -> Result<Self> {
        Manufacturer::parse(s).ok_or_else(|| {
            SizectlError::validation(
                "manufacturer",
                format!("Unknown manufacturer '{}'. Use Intel, AMD or AWS (Graviton)", s),
            )
        })
    }
}

/// One row of the instance catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub instance_type: String,
    pub manufacturer: Manufacturer,
    pub vcpus: u32,
    pub memory_gb: f64,
    pub hourly_price: f64,
}

impl InstanceSpec {
    pub fn new(
        instance_type: impl Into<String>,
        manufacturer: Manufacturer,
        vcpus: u32,
        memory_gb: f64,
        hourly_price: f64,
    ) -> Self {
        Self {
            instance_type: instance_type.into(),
            manufacturer,
            vcpus,
            memory_gb,
            hourly_price,
        }
    }

    /// Rows without a positive price are never recommended
    pub fn is_priced(&self) -> bool {
        self.hourly_price > 0.0
    }

    /// Priced and at least as large as the requested cpu/memory
    pub fn satisfies(&self, cpu: u32, memory_gb: f64) -> bool {
        self.is_priced() && self.vcpus >= cpu && self.memory_gb >= memory_gb
    }

    /// Convert a loosely keyed boundary record into a catalog row.
    ///
    /// Returns `None` for rows that can never be recommended: no instance
    /// type, an unrecognized manufacturer or no vCPUs.
    pub fn from_record(record: &Map<String, Value>) -> Option<Self> {
        let instance_type = lookup(record, &["InstanceType", "instance_type", "type"])
            .and_then(value_as_string)
            .filter(|s| !s.is_empty())?;

        let manufacturer_raw = lookup(record, &["Manufacturer", "manufacturer"])
            .and_then(value_as_string)
            .unwrap_or_default();
        let Some(manufacturer) = Manufacturer::parse(&manufacturer_raw) else {
            debug!(
                "Skipping catalog row {}: unrecognized manufacturer '{}'",
                instance_type, manufacturer_raw
            );
            return None;
        };

        let vcpus = lookup(record, &["VCpus", "vcpus", "vCPUs"])
            .and_then(value_as_f64)
            .filter(|v| *v >= 1.0)
            .map(|v| v as u32);
        let Some(vcpus) = vcpus else {
            debug!("Skipping catalog row {}: no vCPU count", instance_type);
            return None;
        };

        let memory_gb = lookup_memory(record, CATALOG_MEMORY_KEYS)
            .and_then(|(value, unit)| value_as_f64(value).map(|v| unit.to_gb(v)))
            .unwrap_or(0.0);

        let hourly_price = lookup(record, &["Price", "price", "hourly_price"])
            .map(|v| match v {
                Value::Number(n) => n.as_f64().filter(|p| p.is_finite()).unwrap_or(0.0),
                Value::String(s) => parse_price(s),
                _ => 0.0,
            })
            .unwrap_or(0.0);

        Some(Self::new(instance_type, manufacturer, vcpus, memory_gb, hourly_price))
    }
}

/// Parse a catalog price cell.
///
/// "$0.0960 hourly" → 0.096. "N/A", empty and anything non-numeric are 0.0,
/// which marks the row as unpriced.
pub fn parse_price(raw: &str) -> f64 {
    let cleaned: String = raw.trim().chars().filter(|c| *c != '$' && *c != ',').collect();
    cleaned
        .split_whitespace()
        .next()
        .and_then(|token| token.parse::<f64>().ok())
        .filter(|p| p.is_finite())
        .unwrap_or(0.0)
}

/// Immutable, ordered catalog snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    rows: Vec<InstanceSpec>,
}

impl Catalog {
    pub fn new(rows: Vec<InstanceSpec>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[InstanceSpec] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn priced_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_priced()).count()
    }

    pub fn has_manufacturer(&self, manufacturer: Manufacturer) -> bool {
        self.rows.iter().any(|r| r.manufacturer == manufacturer)
    }

    /// Priced rows meeting cpu/memory, optionally of one manufacturer, in catalog order
    pub fn eligible(
        &self,
        cpu: u32,
        memory_gb: f64,
        manufacturer: Option<Manufacturer>,
    ) -> impl Iterator<Item = &InstanceSpec> + '_ {
        self.rows.iter().filter(move |row| {
            row.satisfies(cpu, memory_gb) && manufacturer.map_or(true, |m| row.manufacturer == m)
        })
    }

    /// Build a catalog from boundary records, skipping unusable rows
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Map<String, Value>>) -> Self {
        let mut skipped = 0usize;
        let rows: Vec<InstanceSpec> = records
            .into_iter()
            .filter_map(|record| {
                let row = InstanceSpec::from_record(record);
                if row.is_none() {
                    skipped += 1;
                }
                row
            })
            .collect();
        if skipped > 0 {
            debug!("Skipped {} catalog rows that can never be recommended", skipped);
        }
        Self::new(rows)
    }

    /// Parse a CSV catalog with a header row
    pub fn from_csv(bytes: &[u8]) -> Result<Self> {
        let records = csv_records(bytes)?;
        Ok(Self::from_records(records.iter()))
    }

    /// Parse a JSON array of catalog records
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let values: Vec<Value> = serde_json::from_slice(bytes)?;
        let records: Vec<Map<String, Value>> = values
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        Ok(Self::from_records(records.iter()))
    }
}

/// Supplies the current catalog snapshot
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    async fn load(&self) -> Result<Catalog>;
}

/// Loads a catalog from a local file or an `s3://` object.
///
/// `.json` files are a JSON array of records; everything else is CSV.
pub struct FileCatalogProvider {
    location: String,
}

impl FileCatalogProvider {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

#[async_trait]
impl CatalogProvider for FileCatalogProvider {
    async fn load(&self) -> Result<Catalog> {
        let bytes = source::read_source(&self.location)
            .await
            .map_err(|e| SizectlError::Catalog {
                source_location: self.location.clone(),
                message: e.to_string(),
            })?;

        let parsed = if source::is_json(&self.location) {
            Catalog::from_json(&bytes)
        } else {
            Catalog::from_csv(&bytes)
        };
        let catalog = parsed.map_err(|e| SizectlError::Catalog {
            source_location: self.location.clone(),
            message: e.to_string(),
        })?;

        info!(
            "Loaded {} catalog rows ({} priced) from {}",
            catalog.len(),
            catalog.priced_count(),
            self.location
        );
        Ok(catalog)
    }
}

/// Serves a fixed in-memory snapshot
pub struct StaticCatalogProvider {
    catalog: Catalog,
}

impl StaticCatalogProvider {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl CatalogProvider for StaticCatalogProvider {
    async fn load(&self) -> Result<Catalog> {
        Ok(self.catalog.clone())
    }
}

/// Read CSV rows into string-valued JSON objects keyed by header
pub(crate) fn csv_records(bytes: &[u8]) -> Result<Vec<Map<String, Value>>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(bytes);
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let record: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
            .collect();
        records.push(record);
    }
    Ok(records)
}

/// First present, non-null value among alias keys
pub(crate) fn lookup<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .find(|v| !v.is_null())
}

/// First non-null memory column, with the unit its name implies
pub(crate) fn lookup_memory<'a>(
    record: &'a Map<String, Value>,
    keys: &[(&str, MemoryUnit)],
) -> Option<(&'a Value, MemoryUnit)> {
    keys.iter()
        .filter_map(|(k, unit)| record.get(*k).map(|v| (v, *unit)))
        .find(|(v, _)| !v.is_null())
}

pub(crate) fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub(crate) fn value_as_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}
