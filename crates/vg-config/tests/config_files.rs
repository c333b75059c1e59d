use std::path::{Path, PathBuf};
use std::time::Duration;

use vg_config::{
    ConfigFileError, ValidationError, load, load_json, load_targets, load_yaml, save_json,
    save_yaml,
};
use vg_grid::{GridCoord, MaterialId};
use vg_schedule::ValveTechnology;

fn demos() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos")
}

#[test]
fn demo_configs_load_and_build() {
    for name in ["machine.yaml", "two_material.yaml"] {
        let config = load_yaml(&demos().join(name))
            .unwrap_or_else(|e| panic!("Failed to load {}: {}", name, e));
        config
            .build_grid()
            .unwrap_or_else(|e| panic!("Failed to build {}: {}", name, e));
    }
}

#[test]
fn bench_config_converts() {
    let config = load(&demos().join("machine.yaml")).unwrap();
    let grid = config.build_grid().unwrap();
    assert_eq!(grid.node_count(), 16);
    assert_eq!(grid.zones().len(), 4);
    assert_eq!(grid.injection_points().len(), 1);

    let compile = config.compile_options();
    assert_eq!(compile.technology, ValveTechnology::PneumaticSolenoid);
    assert_eq!(compile.valve_response(), Duration::from_millis(10));
    assert_eq!(compile.settle, Duration::from_millis(20));

    let coordinator = config.coordinator_config();
    assert_eq!(coordinator.ack_margin, Duration::from_millis(50));
    let policy = coordinator.pressure.unwrap();
    assert_eq!(policy.targets.len(), 1);
    assert_eq!(policy.targets[0].0, MaterialId(0));

    assert_eq!(config.refine_options().max_retries, 3);
    assert_eq!(config.route_options().demand_per_target, 1.0);
}

#[test]
fn dual_material_config_uses_dedicated_groups() {
    let config = load(&demos().join("two_material.yaml")).unwrap();
    let grid = config.build_grid().unwrap();
    assert_eq!(grid.slot_layout().slot_count(), 16);
    assert_eq!(grid.zones().len(), 4);

    let a = grid.node_at(GridCoord::new(3, 3)).unwrap();
    let b = grid.node_at(GridCoord::new(3, 4)).unwrap();
    let narrowed: Vec<_> = grid
        .edges()
        .iter()
        .filter(|e| (e.a == a && e.b == b) || (e.a == b && e.b == a))
        .map(|e| e.capacity)
        .collect();
    assert!(!narrowed.is_empty());
    assert!(narrowed.iter().all(|c| *c == 2.0));

    let compile = config.compile_options();
    assert_eq!(compile.valve_response(), Duration::from_millis(2));
    assert_eq!(compile.max_nodes_per_stage, Some(16));
    assert!(config.coordinator_config().pressure.is_none());
}

#[test]
fn targets_load() {
    let config = load(&demos().join("two_material.yaml")).unwrap();
    let grid = config.build_grid().unwrap();
    let dual = load_targets(&demos().join("layer1_dual.yaml"))
        .unwrap()
        .to_target_set(&grid)
        .unwrap();
    assert_eq!(dual.layer, 1);
    assert_eq!(dual.len(), 5);
    assert_eq!(dual.materials().len(), 2);

    let fill = load_targets(&demos().join("layer0.yaml"))
        .unwrap()
        .to_target_set(&grid)
        .unwrap();
    assert_eq!(fill.len(), 64);
}

#[test]
fn roundtrip_yaml_and_json() {
    let config = load(&demos().join("two_material.yaml")).unwrap();
    let dir = std::env::temp_dir();

    let yaml = dir.join("vg_config_roundtrip.yaml");
    save_yaml(&yaml, &config).unwrap();
    assert_eq!(load_yaml(&yaml).unwrap(), config);

    let json = dir.join("vg_config_roundtrip.json");
    save_json(&json, &config).unwrap();
    assert_eq!(load_json(&json).unwrap(), config);
}

#[test]
fn invalid_files_are_reported() {
    let dir = std::env::temp_dir();

    let bad = dir.join("vg_config_bad_material.yaml");
    let content = std::fs::read_to_string(demos().join("machine.yaml"))
        .unwrap()
        .replace("    material: 0\n    supply", "    material: 4\n    supply");
    std::fs::write(&bad, content).unwrap();
    assert!(matches!(
        load(&bad),
        Err(ConfigFileError::Validation(ValidationError::MissingReference { .. }))
    ));

    let outside = dir.join("vg_config_outside.yaml");
    let content = std::fs::read_to_string(demos().join("machine.yaml"))
        .unwrap()
        .replace("{ row: 0, col: 0 }", "{ row: 9, col: 0 }");
    std::fs::write(&outside, content).unwrap();
    let config = load(&outside).unwrap();
    assert!(matches!(config.build_grid(), Err(ConfigFileError::Grid(_))));

    assert!(matches!(
        load(&dir.join("machine.toml")),
        Err(ConfigFileError::UnsupportedFormat { .. })
    ));
}
