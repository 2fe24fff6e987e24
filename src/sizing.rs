//! Instance recommendation engine
//!
//! Maps VM requirements to EC2 instance types using only the catalog passed
//! in. For each VM, in input order:
//!
//! 1. A predefined instance type short-circuits everything.
//! 2. The manufacturer preference is resolved (falling back to the default).
//! 3. The memory:vCPU ratio picks a workload class and its family tags.
//! 4. The primary is the cheapest eligible row of the preferred manufacturer,
//!    or of any manufacturer when the preferred one has nothing that fits.
//! 5. Up to two alternatives come from the other manufacturers, preferring
//!    rows in the workload's families.
//! 6. If nothing in the catalog fits, the VM gets the fixed fallback type.
//!
//! The engine is pure: no I/O, no shared state, no errors. Price ties always
//! go to the row that appears first in the catalog.

use crate::catalog::{Catalog, InstanceSpec, Manufacturer};
use crate::requirements::VmRequirement;
use crate::utils::{format_price, round1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

/// Recommended when no catalog row satisfies a VM
pub const FALLBACK_INSTANCE_TYPE: &str = "m6i.large";

/// Batch `method` for the deterministic engine
pub const TRADITIONAL_METHOD: &str = "traditional_csv_based";

/// Ratio used when a VM reports zero vCPUs
const ZERO_CPU_RATIO: f64 = 4.0;

/// How a recommendation was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Predefined,
    CalculatedWithManufacturer,
    Fallback,
    AiEnhancedAnalysis,
    AiCached,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Predefined => "predefined",
            Method::CalculatedWithManufacturer => "calculated_with_manufacturer",
            Method::Fallback => "fallback",
            Method::AiEnhancedAnalysis => "ai_enhanced_analysis",
            Method::AiCached => "ai_cached",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Workload class derived from the memory:vCPU ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Workload {
    ComputeOptimized,
    GeneralPurpose,
    MemoryOptimized,
    HighMemory,
}

impl Workload {
    /// Thresholds are inclusive on the upper bound: 2.5 is compute optimized.
    pub fn classify(ratio: f64) -> Self {
        if ratio <= 2.5 {
            Workload::ComputeOptimized
        } else if ratio <= 6.0 {
            Workload::GeneralPurpose
        } else if ratio <= 12.0 {
            Workload::MemoryOptimized
        } else {
            Workload::HighMemory
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Workload::ComputeOptimized => "Compute Optimized",
            Workload::GeneralPurpose => "General Purpose",
            Workload::MemoryOptimized => "Memory Optimized",
            Workload::HighMemory => "High Memory",
        }
    }

    /// Family tags in preference order, matched as substrings of the instance type
    pub fn family_preference(&self) -> [&'static str; 3] {
        match self {
            Workload::ComputeOptimized => ["c7", "c6", "c5"],
            Workload::GeneralPurpose => ["m7", "m6", "m5"],
            Workload::MemoryOptimized => ["r7", "r6", "r5"],
            Workload::HighMemory => ["x2", "x1", "u-"],
        }
    }
}

/// GB of memory per vCPU
pub fn vcpu_memory_ratio(cpu: u32, memory_gb: f64) -> f64 {
    if cpu > 0 {
        memory_gb / cpu as f64
    } else {
        ZERO_CPU_RATIO
    }
}

/// Resolve a raw preference, falling back to the default when absent or unrecognized
pub fn resolve_manufacturer(preference: Option<&str>, default: Manufacturer) -> Manufacturer {
    preference.and_then(Manufacturer::parse).unwrap_or(default)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentSpecs {
    pub cpu: u32,
    pub memory_gb: f64,
}

/// An alternative instance from a different manufacturer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub instance_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<Manufacturer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcpus: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_gb: Option<f64>,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub use_case: String,
    #[serde(skip)]
    pub hourly_price: Option<f64>,
}

impl Alternative {
    fn from_spec(spec: &InstanceSpec) -> Self {
        Self {
            instance_type: spec.instance_type.clone(),
            manufacturer: Some(spec.manufacturer),
            vcpus: Some(spec.vcpus),
            memory_gb: Some(round1(spec.memory_gb)),
            price: format_price(spec.hourly_price),
            use_case: format!("{} alternative", spec.manufacturer),
            hourly_price: Some(spec.hourly_price),
        }
    }
}

/// The recommendation body for one VM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationDetail {
    pub primary_instance: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<Manufacturer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcpus: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    pub reasoning: String,
    pub method: Method,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_error: Option<String>,
    /// Raw hourly price for totals; display uses `price`
    #[serde(skip)]
    pub hourly_price: Option<f64>,
}

impl RecommendationDetail {
    fn predefined(instance_type: &str, manufacturer: Manufacturer) -> Self {
        Self {
            primary_instance: instance_type.to_string(),
            manufacturer: Some(manufacturer),
            vcpus: None,
            memory_gb: None,
            price: None,
            alternatives: Vec::new(),
            reasoning: format!(
                "Pre-defined instance type taken verbatim from input data: {}",
                instance_type
            ),
            method: Method::Predefined,
            generation: None,
            ai_error: None,
            hourly_price: None,
        }
    }

    fn fallback(preference: Manufacturer) -> Self {
        Self {
            primary_instance: FALLBACK_INSTANCE_TYPE.to_string(),
            manufacturer: None,
            vcpus: None,
            memory_gb: None,
            price: None,
            alternatives: Vec::new(),
            reasoning: format!(
                "Fallback recommendation - catalog lookup failed for {} preference",
                preference
            ),
            method: Method::Fallback,
            generation: None,
            ai_error: None,
            hourly_price: None,
        }
    }

    /// A recommendation built from catalog rows
    pub fn from_selection(
        primary: &InstanceSpec,
        alternatives: &[&InstanceSpec],
        reasoning: String,
        method: Method,
    ) -> Self {
        Self {
            primary_instance: primary.instance_type.clone(),
            manufacturer: Some(primary.manufacturer),
            vcpus: Some(primary.vcpus),
            memory_gb: Some(round1(primary.memory_gb)),
            price: Some(format_price(primary.hourly_price)),
            alternatives: alternatives.iter().map(|a| Alternative::from_spec(a)).collect(),
            reasoning,
            method,
            generation: None,
            ai_error: None,
            hourly_price: Some(primary.hourly_price),
        }
    }
}

/// Output for one VM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub vm_name: String,
    pub current_specs: CurrentSpecs,
    pub recommendation: RecommendationDetail,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// The original input row, untouched
    pub metadata: Map<String, Value>,
}

impl Recommendation {
    pub fn new(requirement: &VmRequirement, detail: RecommendationDetail) -> Self {
        Self {
            vm_name: requirement.name.clone(),
            current_specs: CurrentSpecs {
                cpu: requirement.cpu,
                memory_gb: requirement.memory_gb,
            },
            recommendation: detail,
            account_id: None,
            region: None,
            metadata: requirement.metadata.clone(),
        }
    }
}

/// Envelope for a batch of recommendations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationBatch {
    pub status: String,
    pub recommendations: Vec<Recommendation>,
    pub total_vms: usize,
    pub method: String,
    pub manufacturer_preference: Manufacturer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_hits: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_calls: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl RecommendationBatch {
    pub fn new(
        recommendations: Vec<Recommendation>,
        method: impl Into<String>,
        manufacturer_preference: Manufacturer,
    ) -> Self {
        Self {
            status: "success".to_string(),
            total_vms: recommendations.len(),
            recommendations,
            method: method.into(),
            manufacturer_preference,
            cache_hits: None,
            ai_calls: None,
            group_key: None,
            account_id: None,
            region: None,
        }
    }
}

/// Cheapest row; on equal prices the first one in catalog order wins
fn cheapest<'a>(rows: impl Iterator<Item = &'a InstanceSpec>) -> Option<&'a InstanceSpec> {
    rows.min_by(|a, b| a.hourly_price.total_cmp(&b.hourly_price))
}

/// Cheapest eligible row of the preferred manufacturer, else of any manufacturer
pub fn select_primary<'a>(
    catalog: &'a Catalog,
    cpu: u32,
    memory_gb: f64,
    manufacturer: Manufacturer,
) -> Option<&'a InstanceSpec> {
    cheapest(catalog.eligible(cpu, memory_gb, Some(manufacturer)))
        .or_else(|| cheapest(catalog.eligible(cpu, memory_gb, None)))
}

/// Up to two rows from manufacturers other than `exclude`, visited in the
/// fixed Intel, AMD, AWS order.
///
/// Within a manufacturer the first family tag that matches anything wins,
/// and the cheapest match for that tag is taken; with no family match the
/// cheapest eligible row is used.
pub fn select_alternatives<'a>(
    catalog: &'a Catalog,
    cpu: u32,
    memory_gb: f64,
    exclude: Manufacturer,
    workload: Workload,
) -> Vec<&'a InstanceSpec> {
    let mut alternatives = Vec::with_capacity(2);

    for manufacturer in Manufacturer::ALL.into_iter().filter(|m| *m != exclude) {
        let suitable: Vec<&InstanceSpec> =
            catalog.eligible(cpu, memory_gb, Some(manufacturer)).collect();
        if suitable.is_empty() {
            continue;
        }

        let family_match = workload.family_preference().iter().find_map(|family| {
            cheapest(
                suitable
                    .iter()
                    .copied()
                    .filter(|row| row.instance_type.to_lowercase().contains(*family)),
            )
        });

        if let Some(choice) = family_match.or_else(|| cheapest(suitable.iter().copied())) {
            alternatives.push(choice);
        }

        if alternatives.len() >= 2 {
            break;
        }
    }

    alternatives
}

/// Size a single VM
pub fn recommend_one(
    requirement: &VmRequirement,
    catalog: &Catalog,
    default_manufacturer: Manufacturer,
) -> Recommendation {
    let manufacturer = resolve_manufacturer(
        requirement.manufacturer_preference.as_deref(),
        default_manufacturer,
    );

    if let Some(predefined) = &requirement.predefined_instance_type {
        debug!("{}: using predefined instance type {}", requirement.name, predefined);
        return Recommendation::new(
            requirement,
            RecommendationDetail::predefined(predefined, manufacturer),
        );
    }

    let ratio = vcpu_memory_ratio(requirement.cpu, requirement.memory_gb);
    let workload = Workload::classify(ratio);

    let Some(primary) = select_primary(catalog, requirement.cpu, requirement.memory_gb, manufacturer)
    else {
        debug!(
            "{}: no catalog row fits {} vCPU / {:.1} GB, using fallback",
            requirement.name, requirement.cpu, requirement.memory_gb
        );
        return Recommendation::new(requirement, RecommendationDetail::fallback(manufacturer));
    };

    let alternatives = select_alternatives(
        catalog,
        requirement.cpu,
        requirement.memory_gb,
        primary.manufacturer,
        workload,
    );

    let reasoning = format!(
        "VM ratio {:.1}:1 → {} family. Primary: {} (cheapest). Alternatives from other manufacturers for flexibility. (Preferred manufacturer: {})",
        ratio,
        workload.label(),
        primary.manufacturer,
        manufacturer
    );

    debug!(
        "{}: {} ({}) with {} alternatives",
        requirement.name,
        primary.instance_type,
        workload.label(),
        alternatives.len()
    );

    Recommendation::new(
        requirement,
        RecommendationDetail::from_selection(
            primary,
            &alternatives,
            reasoning,
            Method::CalculatedWithManufacturer,
        ),
    )
}

/// Size every VM against one catalog snapshot.
///
/// VMs are evaluated in parallel; the output has the same length and order
/// as the input.
pub fn recommend(
    requirements: &[VmRequirement],
    catalog: &Catalog,
    default_manufacturer: Manufacturer,
) -> Vec<Recommendation> {
    requirements
        .par_iter()
        .map(|requirement| recommend_one(requirement, catalog, default_manufacturer))
        .collect()
}
