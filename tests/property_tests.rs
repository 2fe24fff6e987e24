//! Property-based tests for the recommendation engine

use proptest::prelude::*;
use sizectl::catalog::{Catalog, InstanceSpec, Manufacturer};
use sizectl::requirements::{predefined_instance_type, VmRequirement};
use sizectl::sizing::{recommend, vcpu_memory_ratio, Method, Workload};
use sizectl::utils::normalize_memory_gb;

fn manufacturer() -> impl Strategy<Value = Manufacturer> {
    prop_oneof![
        Just(Manufacturer::Intel),
        Just(Manufacturer::Amd),
        Just(Manufacturer::Aws),
    ]
}

fn instance() -> impl Strategy<Value = InstanceSpec> {
    (
        prop::sample::select(vec!["c6", "c7", "m5", "m6", "m7", "r6", "r7", "x2", "t3"]),
        manufacturer(),
        1u32..=64,
        1.0f64..512.0,
        0.0f64..5.0,
    )
        .prop_map(|(family, mfr, vcpus, memory, price)| {
            let suffix = match mfr {
                Manufacturer::Intel => "i",
                Manufacturer::Amd => "a",
                Manufacturer::Aws => "g",
            };
            InstanceSpec::new(format!("{}{}.large", family, suffix), mfr, vcpus, memory, price)
        })
}

fn requirement() -> impl Strategy<Value = VmRequirement> {
    (
        "[a-z]{3,8}",
        0u32..=64,
        0.5f64..512.0,
        prop::option::of(prop::sample::select(vec!["Intel", "AMD", "AWS", "graviton", "Apple"])),
        prop::option::of(prop::sample::select(vec!["m5.large", "", "nan", "None"])),
    )
        .prop_map(|(name, cpu, memory, mfr, predefined)| {
            let mut vm = VmRequirement::new(name, cpu, memory);
            if let Some(m) = mfr {
                vm = vm.with_manufacturer(m);
            }
            if let Some(p) = predefined {
                vm = vm.with_predefined(p);
            }
            vm
        })
}

proptest! {
    #[test]
    fn prop_output_matches_input_order(
        rows in prop::collection::vec(instance(), 0..40),
        vms in prop::collection::vec(requirement(), 0..30),
    ) {
        let catalog = Catalog::new(rows);
        let recs = recommend(&vms, &catalog, Manufacturer::Intel);
        prop_assert_eq!(recs.len(), vms.len());
        for (vm, rec) in vms.iter().zip(&recs) {
            prop_assert_eq!(&rec.vm_name, &vm.name);
        }
    }

    #[test]
    fn prop_alternatives_differ_from_primary_manufacturer(
        rows in prop::collection::vec(instance(), 0..40),
        vms in prop::collection::vec(requirement(), 1..20),
    ) {
        let catalog = Catalog::new(rows);
        for rec in recommend(&vms, &catalog, Manufacturer::Amd) {
            let detail = rec.recommendation;
            prop_assert!(detail.alternatives.len() <= 2);
            for alt in &detail.alternatives {
                prop_assert_ne!(alt.manufacturer, detail.manufacturer);
            }
        }
    }

    #[test]
    fn prop_fallback_only_without_eligible_rows(
        rows in prop::collection::vec(instance(), 0..40),
        vm in requirement(),
    ) {
        let catalog = Catalog::new(rows);
        let recs = recommend(std::slice::from_ref(&vm), &catalog, Manufacturer::Intel);
        let detail = &recs[0].recommendation;

        if vm.predefined_instance_type.is_some() {
            prop_assert_eq!(detail.method, Method::Predefined);
            prop_assert!(detail.alternatives.is_empty());
        } else if catalog.eligible(vm.cpu, vm.memory_gb, None).next().is_some() {
            prop_assert_eq!(detail.method, Method::CalculatedWithManufacturer);
        } else {
            prop_assert_eq!(detail.method, Method::Fallback);
        }
    }

    #[test]
    fn prop_primary_is_cheapest_of_its_manufacturer(
        rows in prop::collection::vec(instance(), 1..40),
        cpu in 1u32..=16,
        memory in 1.0f64..64.0,
    ) {
        let catalog = Catalog::new(rows);
        let vm = VmRequirement::new("vm", cpu, memory);
        let recs = recommend(std::slice::from_ref(&vm), &catalog, Manufacturer::Intel);
        let detail = &recs[0].recommendation;

        if let (Some(mfr), Some(price)) = (detail.manufacturer, detail.hourly_price) {
            let cheapest = catalog
                .eligible(cpu, memory, Some(mfr))
                .map(|r| r.hourly_price)
                .fold(f64::INFINITY, f64::min);
            prop_assert_eq!(price, cheapest);
        }
    }

    #[test]
    fn prop_engine_is_idempotent(
        rows in prop::collection::vec(instance(), 0..30),
        vms in prop::collection::vec(requirement(), 0..15),
    ) {
        let catalog = Catalog::new(rows);
        let first = serde_json::to_string(&recommend(&vms, &catalog, Manufacturer::Aws)).unwrap();
        let second = serde_json::to_string(&recommend(&vms, &catalog, Manufacturer::Aws)).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_memory_heuristic(value in 0.0f64..1_000_000.0) {
        let gb = normalize_memory_gb(value);
        if value > 100.0 {
            prop_assert!((gb - value / 1024.0).abs() < 1e-9);
        } else {
            prop_assert_eq!(gb, value);
        }
    }

    #[test]
    fn prop_classification_is_monotonic(cpu in 1u32..=128, a in 0.1f64..4096.0, b in 0.1f64..4096.0) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let low_class = Workload::classify(vcpu_memory_ratio(cpu, low));
        let high_class = Workload::classify(vcpu_memory_ratio(cpu, high));
        prop_assert!(low_class <= high_class);
    }

    #[test]
    fn prop_predefined_is_trimmed(padding in " {0,3}", core in "[a-z][a-z0-9]{1,5}\\.[a-z0-9]{2,8}") {
        let raw = format!("{}{}{}", padding, core, padding);
        prop_assert_eq!(predefined_instance_type(&raw), Some(core));
    }
}
