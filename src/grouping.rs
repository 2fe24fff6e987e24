//! Grouping of VM rows by destination account and region
//!
//! Migration sheets mix VMs for several AWS accounts and regions. Each group
//! is sized as its own batch and every result is stamped with the account
//! and region it belongs to, both on the recommendation and inside its
//! metadata (as `AccountId` / `Region`) for downstream consumers that only
//! read the flattened row.

use crate::catalog::{lookup, value_as_string};
use crate::sizing::Recommendation;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const ACCOUNT_KEYS: &[&str] = &["AccountId", "account_id"];
const REGION_KEYS: &[&str] = &["Region", "region"];
const UNKNOWN: &str = "unknown";

/// Rows for one account/region pair, in input order
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRegionGroup {
    pub account_id: String,
    pub region: String,
    pub records: Vec<Map<String, Value>>,
}

impl AccountRegionGroup {
    pub fn key(&self) -> String {
        group_key(&self.account_id, &self.region)
    }
}

pub fn group_key(account_id: &str, region: &str) -> String {
    format!("{}_{}", account_id, region)
}

fn field_or_unknown(record: &Map<String, Value>, keys: &[&str]) -> String {
    lookup(record, keys)
        .and_then(value_as_string)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Group raw rows by account and region.
///
/// Groups are returned in key order; rows keep their input order within a
/// group. Missing account or region values group under "unknown".
pub fn group_by_account_region(records: &[Map<String, Value>]) -> Vec<AccountRegionGroup> {
    let mut groups: BTreeMap<String, AccountRegionGroup> = BTreeMap::new();

    for record in records {
        let account_id = field_or_unknown(record, ACCOUNT_KEYS);
        let region = field_or_unknown(record, REGION_KEYS);
        groups
            .entry(group_key(&account_id, &region))
            .or_insert_with(|| AccountRegionGroup {
                account_id,
                region,
                records: Vec::new(),
            })
            .records
            .push(record.clone());
    }

    groups.into_values().collect()
}

/// Stamp each recommendation with its account and region
pub fn stamp_account_region(recommendations: &mut [Recommendation], account_id: &str, region: &str) {
    for rec in recommendations.iter_mut() {
        rec.account_id = Some(account_id.to_string());
        rec.region = Some(region.to_string());
        rec.metadata
            .insert("AccountId".to_string(), Value::String(account_id.to_string()));
        rec.metadata
            .insert("Region".to_string(), Value::String(region.to_string()));
    }
}
