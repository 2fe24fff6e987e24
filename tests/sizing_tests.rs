//! Tests for the ratio-based recommendation engine
//!
//! Covers ordering, predefined passthrough, classification boundaries,
//! manufacturer filtering, alternatives and the fallback path.

use serde_json::{json, Map, Value};
use sizectl::catalog::{Catalog, InstanceSpec, Manufacturer};
use sizectl::requirements::{normalize_records, VmRequirement};
use sizectl::sizing::{
    recommend, recommend_one, Method, RecommendationBatch, FALLBACK_INSTANCE_TYPE,
    TRADITIONAL_METHOD,
};

fn catalog() -> Catalog {
    Catalog::new(vec![
        InstanceSpec::new("c6i.xlarge", Manufacturer::Intel, 4, 8.0, 0.17),
        InstanceSpec::new("c6a.xlarge", Manufacturer::Amd, 4, 8.0, 0.153),
        InstanceSpec::new("m6i.large", Manufacturer::Intel, 2, 8.0, 0.096),
        InstanceSpec::new("m7i.large", Manufacturer::Intel, 2, 8.0, 0.1008),
        InstanceSpec::new("m6a.large", Manufacturer::Amd, 2, 8.0, 0.0864),
        InstanceSpec::new("m6g.large", Manufacturer::Aws, 2, 8.0, 0.077),
        InstanceSpec::new("m6i.xlarge", Manufacturer::Intel, 4, 16.0, 0.192),
        InstanceSpec::new("m6a.xlarge", Manufacturer::Amd, 4, 16.0, 0.1728),
        InstanceSpec::new("m6g.xlarge", Manufacturer::Aws, 4, 16.0, 0.154),
        InstanceSpec::new("r6i.large", Manufacturer::Intel, 2, 16.0, 0.126),
        InstanceSpec::new("r6g.large", Manufacturer::Aws, 2, 16.0, 0.1008),
        InstanceSpec::new("x2iedn.xlarge", Manufacturer::Intel, 4, 128.0, 0.834),
    ])
}

fn record(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("not an object"),
    }
}

#[test]
fn test_output_preserves_length_and_order() {
    let vms: Vec<VmRequirement> = (0..50)
        .map(|i| VmRequirement::new(format!("vm{:02}", i), 1 + (i % 4), 2.0 + i as f64))
        .collect();

    let recs = recommend(&vms, &catalog(), Manufacturer::Intel);
    assert_eq!(recs.len(), vms.len());
    for (vm, rec) in vms.iter().zip(&recs) {
        assert_eq!(rec.vm_name, vm.name);
        assert_eq!(rec.current_specs.cpu, vm.cpu);
    }
}

#[test]
fn test_predefined_instance_passthrough() {
    let rows = vec![record(json!({
        "VM": "legacy-db",
        "cpu": "8",
        "memory": "65536",
        "instance type": "  r5.2xlarge  ",
    }))];
    let vms = normalize_records(&rows);

    let rec = recommend_one(&vms[0], &catalog(), Manufacturer::Intel);
    assert_eq!(rec.recommendation.method, Method::Predefined);
    assert_eq!(rec.recommendation.primary_instance, "r5.2xlarge");
    assert!(rec.recommendation.alternatives.is_empty());
    assert!(rec.recommendation.reasoning.contains("r5.2xlarge"));
}

#[test]
fn test_predefined_sentinel_is_ignored() {
    let rows = vec![record(json!({
        "VM": "web01",
        "cpu": 2,
        "memory": 8192,
        "instance_type": "nan",
    }))];
    let vms = normalize_records(&rows);

    let rec = recommend_one(&vms[0], &catalog(), Manufacturer::Intel);
    assert_eq!(rec.recommendation.method, Method::CalculatedWithManufacturer);
}

#[test]
fn test_ratio_boundary_is_compute_optimized() {
    let catalog = Catalog::new(vec![
        InstanceSpec::new("c6i.2xlarge", Manufacturer::Intel, 8, 16.0, 0.34),
        InstanceSpec::new("m6i.xlarge", Manufacturer::Intel, 4, 16.0, 0.192),
    ]);

    let at_boundary = recommend_one(&VmRequirement::new("a", 4, 10.0), &catalog, Manufacturer::Intel);
    assert!(at_boundary.recommendation.reasoning.contains("2.5:1"));
    assert!(at_boundary.recommendation.reasoning.contains("Compute Optimized"));

    let above = recommend_one(&VmRequirement::new("b", 4, 10.01), &catalog, Manufacturer::Intel);
    assert!(above.recommendation.reasoning.contains("General Purpose"));
}

#[test]
fn test_manufacturer_filter_applies_before_price() {
    let catalog = Catalog::new(vec![
        InstanceSpec::new("t3.small", Manufacturer::Intel, 2, 2.0, 0.02),
        InstanceSpec::new("t3.small", Manufacturer::Amd, 2, 2.0, 0.018),
        InstanceSpec::new("t3.small", Manufacturer::Aws, 2, 2.0, 0.016),
    ]);
    let vm = VmRequirement::new("small", 2, 2.0).with_manufacturer("Intel");

    let rec = recommend_one(&vm, &catalog, Manufacturer::Amd);
    let detail = &rec.recommendation;
    assert_eq!(detail.manufacturer, Some(Manufacturer::Intel));
    assert_eq!(detail.price.as_deref(), Some("$0.02"));
    assert!(detail
        .alternatives
        .iter()
        .any(|a| matches!(a.manufacturer, Some(Manufacturer::Amd | Manufacturer::Aws))));
}

#[test]
fn test_preference_relaxes_when_manufacturer_has_no_fit() {
    let vm = VmRequirement::new("mem-heavy", 4, 100.0).with_manufacturer("AMD");

    let rec = recommend_one(&vm, &catalog(), Manufacturer::Aws);
    // No AMD row has 100 GB; cheapest of any manufacturer wins
    assert_eq!(rec.recommendation.primary_instance, "x2iedn.xlarge");
    assert_eq!(rec.recommendation.manufacturer, Some(Manufacturer::Intel));
    assert_eq!(rec.recommendation.method, Method::CalculatedWithManufacturer);
    assert!(rec.recommendation.reasoning.contains("Preferred manufacturer: AMD"));
}

#[test]
fn test_alternatives_prefer_workload_family() {
    let vm = VmRequirement::new("app", 2, 8.0);

    let rec = recommend_one(&vm, &catalog(), Manufacturer::Intel);
    let detail = &rec.recommendation;
    assert_eq!(detail.primary_instance, "m6i.large");

    let alts: Vec<&str> = detail
        .alternatives
        .iter()
        .map(|a| a.instance_type.as_str())
        .collect();
    // AMD before AWS; both take an m6 family row
    assert_eq!(alts, vec!["m6a.large", "m6g.large"]);
}

#[test]
fn test_alternatives_never_share_primary_manufacturer() {
    let vms = vec![
        VmRequirement::new("a", 1, 1.0),
        VmRequirement::new("b", 2, 8.0).with_manufacturer("AWS"),
        VmRequirement::new("c", 4, 16.0).with_manufacturer("amd"),
        VmRequirement::new("d", 4, 100.0),
    ];

    for rec in recommend(&vms, &catalog(), Manufacturer::Intel) {
        let detail = &rec.recommendation;
        assert!(detail.alternatives.len() <= 2);
        for alt in &detail.alternatives {
            assert_ne!(alt.manufacturer, detail.manufacturer);
        }
    }
}

#[test]
fn test_empty_catalog_falls_back() {
    let vm = VmRequirement::new("big", 4, 16.0);

    let rec = recommend_one(&vm, &Catalog::default(), Manufacturer::Intel);
    assert_eq!(rec.recommendation.method, Method::Fallback);
    assert_eq!(rec.recommendation.primary_instance, FALLBACK_INSTANCE_TYPE);
    assert_eq!(rec.recommendation.primary_instance, "m6i.large");
    assert!(rec.recommendation.alternatives.is_empty());
}

#[test]
fn test_unpriced_rows_are_never_recommended() {
    let catalog = Catalog::new(vec![
        InstanceSpec::new("m6i.large", Manufacturer::Intel, 2, 8.0, 0.0),
        InstanceSpec::new("m5.large", Manufacturer::Intel, 2, 8.0, 0.096),
    ]);

    let rec = recommend_one(&VmRequirement::new("a", 2, 8.0), &catalog, Manufacturer::Intel);
    assert_eq!(rec.recommendation.primary_instance, "m5.large");
}

#[test]
fn test_zero_cpu_uses_general_purpose_ratio() {
    let rec = recommend_one(&VmRequirement::new("zero", 0, 2.0), &catalog(), Manufacturer::Intel);
    assert!(rec.recommendation.reasoning.contains("4.0:1"));
    assert!(rec.recommendation.reasoning.contains("General Purpose"));
}

#[test]
fn test_price_ties_keep_catalog_order() {
    let catalog = Catalog::new(vec![
        InstanceSpec::new("m6i.large", Manufacturer::Intel, 2, 8.0, 0.096),
        InstanceSpec::new("m5.large", Manufacturer::Intel, 2, 8.0, 0.096),
    ]);

    let rec = recommend_one(&VmRequirement::new("tie", 2, 8.0), &catalog, Manufacturer::Intel);
    assert_eq!(rec.recommendation.primary_instance, "m6i.large");
}

#[test]
fn test_output_is_idempotent() {
    let vms = vec![
        VmRequirement::new("a", 2, 8.0),
        VmRequirement::new("b", 4, 16.0).with_manufacturer("AWS"),
        VmRequirement::new("c", 2, 4.0).with_predefined("t3.medium"),
    ];
    let catalog = catalog();

    let first = RecommendationBatch::new(
        recommend(&vms, &catalog, Manufacturer::Intel),
        TRADITIONAL_METHOD,
        Manufacturer::Intel,
    );
    let second = RecommendationBatch::new(
        recommend(&vms, &catalog, Manufacturer::Intel),
        TRADITIONAL_METHOD,
        Manufacturer::Intel,
    );

    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_batch_output_shape() {
    let rows = vec![record(json!({
        "VM": "web01",
        "cpu": 2,
        "memory": 8192,
        "Owner": "payments",
    }))];
    let vms = normalize_records(&rows);
    let batch = RecommendationBatch::new(
        recommend(&vms, &catalog(), Manufacturer::Intel),
        TRADITIONAL_METHOD,
        Manufacturer::Intel,
    );

    let value = serde_json::to_value(&batch).unwrap();
    assert_eq!(value["status"], "success");
    assert_eq!(value["total_vms"], 1);
    assert_eq!(value["method"], "traditional_csv_based");
    assert_eq!(value["manufacturer_preference"], "Intel");

    let rec = &value["recommendations"][0];
    assert_eq!(rec["vm_name"], "web01");
    assert_eq!(rec["current_specs"]["cpu"], 2);
    assert_eq!(rec["current_specs"]["memory_gb"], 8.0);
    assert_eq!(rec["recommendation"]["primary_instance"], "m6i.large");
    assert_eq!(rec["recommendation"]["price"], "$0.10");
    assert_eq!(rec["recommendation"]["method"], "calculated_with_manufacturer");
    assert_eq!(rec["metadata"]["Owner"], "payments");
}
