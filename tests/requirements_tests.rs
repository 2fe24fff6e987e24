//! Tests for requirement normalization and loading

use serde_json::{json, Map, Value};
use sizectl::error::SizectlError;
use sizectl::requirements::{load_records, normalize_records, VmRequirement};
use std::io::Write;
use tempfile::NamedTempFile;

fn record(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("not an object"),
    }
}

#[test]
fn test_memory_unit_heuristic() {
    let mib = VmRequirement::from_record(&record(json!({"VM": "a", "cpu": 2, "memory": 8192})));
    assert_eq!(mib.memory_gb, 8.0);

    let gb = VmRequirement::from_record(&record(json!({"VM": "b", "cpu": 2, "memory": 8})));
    assert_eq!(gb.memory_gb, 8.0);

    let boundary = VmRequirement::from_record(&record(json!({"VM": "c", "cpu": 2, "memory": 100})));
    assert_eq!(boundary.memory_gb, 100.0);
}

#[test]
fn test_labelled_memory_columns_keep_their_unit() {
    let db = VmRequirement::from_record(&record(json!({"VM": "db01", "cpu": 16, "memory_gb": 128})));
    assert_eq!(db.memory_gb, 128.0);

    let tiny = VmRequirement::from_record(&record(json!({"VM": "dns", "cpu": 1, "memory_mb": 64})));
    assert_eq!(tiny.memory_gb, 0.0625);

    let mib = VmRequirement::from_record(&record(json!({"VM": "app", "cpu": 2, "memory_mb": "4096"})));
    assert_eq!(mib.memory_gb, 4.0);
}

#[test]
fn test_field_aliases() {
    let vm = VmRequirement::from_record(&record(json!({
        "vm_name": "db02",
        "vcpus": "4",
        "memory_gb": "32",
        "InstanceType": "r6i.xlarge",
        "Manufacturer": "AMD",
    })));

    assert_eq!(vm.name, "db02");
    assert_eq!(vm.cpu, 4);
    assert_eq!(vm.memory_gb, 32.0);
    assert_eq!(vm.predefined_instance_type.as_deref(), Some("r6i.xlarge"));
    assert_eq!(vm.manufacturer_preference.as_deref(), Some("AMD"));
}

#[test]
fn test_first_alias_wins() {
    let vm = VmRequirement::from_record(&record(json!({
        "VM": "primary-name",
        "name": "other-name",
        "cpu": 2,
        "cpus": 8,
    })));
    assert_eq!(vm.name, "primary-name");
    assert_eq!(vm.cpu, 2);
}

#[test]
fn test_non_numeric_values_use_defaults() {
    let vm = VmRequirement::from_record(&record(json!({
        "VM": "odd",
        "cpu": "lots",
        "memory": "plenty",
    })));
    assert_eq!(vm.cpu, 1);
    assert_eq!(vm.memory_gb, 1.0);
}

#[test]
fn test_metadata_is_the_original_row() {
    let row = record(json!({
        "VM": "web01",
        "cpu": 2,
        "memory": 4096,
        "AccountId": "123456789012",
        "Server Statistics": "CPU p95 35%",
    }));
    let vm = VmRequirement::from_record(&row);
    assert_eq!(vm.metadata, row);
}

#[test]
fn test_normalize_preserves_order() {
    let rows: Vec<Map<String, Value>> = (0..5)
        .map(|i| record(json!({"VM": format!("vm{}", i), "cpu": 1, "memory": 2})))
        .collect();
    let names: Vec<String> = normalize_records(&rows).into_iter().map(|v| v.name).collect();
    assert_eq!(names, vec!["vm0", "vm1", "vm2", "vm3", "vm4"]);
}

#[tokio::test]
async fn test_load_records_from_csv() {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "VM,cpu,memory,instance type,manufacturer").unwrap();
    writeln!(file, "web01, 2 ,8192,,Intel").unwrap();
    writeln!(file, "db01,8,65536,r6i.2xlarge,").unwrap();
    file.flush().unwrap();

    let records = load_records(file.path().to_str().unwrap()).await.unwrap();
    let vms = normalize_records(&records);
    assert_eq!(vms.len(), 2);
    assert_eq!(vms[0].cpu, 2);
    assert_eq!(vms[0].memory_gb, 8.0);
    assert!(vms[0].predefined_instance_type.is_none());
    assert_eq!(vms[1].predefined_instance_type.as_deref(), Some("r6i.2xlarge"));
    assert!(vms[1].manufacturer_preference.is_none());
}

#[tokio::test]
async fn test_load_records_from_json() {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, r#"[{{"name": "app01", "cpus": 4, "memory": 16}}]"#).unwrap();
    file.flush().unwrap();

    let records = load_records(file.path().to_str().unwrap()).await.unwrap();
    let vms = normalize_records(&records);
    assert_eq!(vms[0].name, "app01");
    assert_eq!(vms[0].memory_gb, 16.0);
}

#[tokio::test]
async fn test_load_records_missing_file_is_input_error() {
    let err = load_records("/nonexistent/vms.csv").await.unwrap_err();
    assert!(matches!(err, SizectlError::Input { .. }));
    assert!(err.to_string().contains("/nonexistent/vms.csv"));
}

#[tokio::test]
async fn test_load_records_malformed_json_is_input_error() {
    let mut file: NamedTempFile = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    write!(file, "{{not json").unwrap();
    file.flush().unwrap();

    let err = load_records(file.path().to_str().unwrap()).await.unwrap_err();
    assert!(matches!(err, SizectlError::Input { .. }));
}
