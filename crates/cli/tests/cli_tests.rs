// Integration tests for the offline commands and the exit-code contract.
// Run with: cargo test -p uaplaces-cli --test cli_tests

mod common;

use common::*;

// ===========================================================================
// generate
// ===========================================================================

#[test]
fn generate_builds_the_hierarchy() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    ws.generate();

    let records = ws.collection();
    assert_eq!(records.len(), 5);

    let town = ws.record(TOWN);
    assert_eq!(town["primary_code"], format!("{OBLAST}/{DISTRICT}/{COMMUNITY}/{TOWN}"));
    assert_eq!(town["parent_code"], format!("{OBLAST}/{DISTRICT}/{COMMUNITY}"));
    assert_eq!(town["category"], "M");
    assert_eq!(town["oblast_name"], "Одеська");
    assert_eq!(town["district_name"], "Ізмаїльський");
    assert_eq!(town["hromada_name"], "Ізмаїльська");

    let oblast = ws.record(OBLAST);
    assert!(oblast.get("parent_code").is_none());
}

#[test]
fn generate_twice_is_byte_identical() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    ws.generate();
    let first = std::fs::read(ws.data_path()).unwrap();
    ws.generate();
    let second = std::fs::read(ws.data_path()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn generate_keeps_enrichment() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    ws.generate();

    let mut records = ws.collection();
    for record in &mut records {
        if record["primary_code"].as_str().unwrap().ends_with(TOWN) {
            record["postal_code"] = "68600".into();
            record["note"] = "ручна правка".into();
        }
    }
    std::fs::write(ws.data_path(), serde_json::to_string_pretty(&records).unwrap()).unwrap();

    ws.generate();
    let town = ws.record(TOWN);
    assert_eq!(town["postal_code"], "68600");
    assert_eq!(town["note"], "ручна правка");
}

#[test]
fn data_flag_overrides_settings() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    ws.write("kodifikator.csv", CLASSIFIER);

    let other = ws.path("out/other.json");
    let output = ws.run(&["--data", other.to_str().unwrap(), "generate"]);
    assert_success(&output);
    assert_eq!(read_json_array(&other).len(), 5);
    assert!(!ws.data_path().exists());
}

#[test]
fn missing_classifier_exits_4() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    let output = ws.run(&["generate"]);
    assert_exit(&output, 4);
    assert!(String::from_utf8_lossy(&output.stderr).contains("kodifikator.csv"));
}

// ===========================================================================
// map-koatuu / add-places
// ===========================================================================

#[test]
fn map_koatuu_takes_numeric_codes_only() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    ws.generate();
    ws.write(
        "comparison.csv",
        "Код КАТОТТГ;Код КОАТУУ;Назва\n\
         UA51060030010011183;5110600000;Ізмаїл\n\
         UA51060030020096254;н/д;Муравлівка\n",
    );

    let output = ws.run(&["--json", "map-koatuu"]);
    assert_success(&output);
    let reports = stdout_json(&output);
    assert_eq!(reports[0]["meta"]["step"], "map-koatuu");

    assert_eq!(ws.record(TOWN)["legacy_code"], "5110600000");
    assert!(ws.record(VILLAGE).get("legacy_code").is_none());
}

#[test]
fn add_places_fills_reference_and_postal_code() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    ws.generate();
    ws.write(
        "places.csv",
        "katotth,osm_id,koatuu,postal_code\n\
         UA51060030010011183,337,5110600000,68600\n\
         UA99999999999999999,1,,00000\n",
    );

    let output = ws.run(&["add-places"]);
    assert_success(&output);

    let town = ws.record(TOWN);
    assert_eq!(town["osm_reference"], "337");
    assert_eq!(town["postal_code"], "68600");
    assert_eq!(town["legacy_code"], "5110600000");
    assert_eq!(ws.collection().len(), 5);
}

#[test]
fn add_places_without_table_is_skipped() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    ws.generate();
    let before = std::fs::read(ws.data_path()).unwrap();

    let output = ws.run(&["--json", "add-places"]);
    assert_success(&output);
    assert_eq!(stdout_json(&output), serde_json::json!([]));
    assert!(String::from_utf8_lossy(&output.stderr).contains("skipping add-places"));
    assert_eq!(std::fs::read(ws.data_path()).unwrap(), before);
}

// ===========================================================================
// check
// ===========================================================================

#[test]
fn check_json_is_a_single_report() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    ws.generate();

    let output = ws.run(&["check", "--json"]);
    assert_success(&output);
    let report = stdout_json(&output);
    assert_eq!(report["meta"]["step"], "check");
    assert_eq!(report["total_records"], 5);
    assert_eq!(report["missing"]["C"]["total"], 1);
    assert_eq!(report["hierarchy_violations"], serde_json::json!([]));
}

#[test]
fn check_strict_fails_on_map_mismatch() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    ws.generate();
    ws.write(
        "oblasts.geojson",
        r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"katotth": "UA01000000000013043"}, "geometry": null}
        ]}"#,
    );

    let output = ws.run(&["check", "--strict"]);
    assert_exit(&output, 10);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("not in oblasts map"), "stdout: {stdout}");

    // Without --strict the same findings are only reported
    assert_success(&ws.run(&["check"]));
}

#[test]
fn check_removes_shared_knowledge_base_ids() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    ws.generate();

    let mut records = ws.collection();
    for record in &mut records {
        let code = record["primary_code"].as_str().unwrap().to_string();
        if code.ends_with(TOWN) || code.ends_with(VILLAGE) {
            record["knowledge_base_id"] = "Q1".into();
        }
    }
    std::fs::write(ws.data_path(), serde_json::to_string_pretty(&records).unwrap()).unwrap();

    let output = ws.run(&["check"]);
    assert_success(&output);
    assert!(String::from_utf8_lossy(&output.stdout).contains("duplicate:"));
    assert!(ws.record(TOWN).get("knowledge_base_id").is_none());
    assert!(ws.record(VILLAGE).get("knowledge_base_id").is_none());
}

// ===========================================================================
// Exit codes
// ===========================================================================

#[test]
fn missing_collection_exits_5_with_hint() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    ws.write("comparison.csv", "Код КАТОТТГ;Код КОАТУУ\n");

    let output = ws.run(&["map-koatuu"]);
    assert_exit(&output, 5);
    assert!(String::from_utf8_lossy(&output.stderr).contains("uaplaces generate"));
}

#[test]
fn malformed_collection_exits_5() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    ws.write("settlements.json", "{\"not\": \"an array\"}");
    assert_exit(&ws.run(&["check"]), 5);
}

#[test]
fn invalid_settings_exit_3() {
    let ws = Workspace::new();
    ws.write("uaplaces.toml", "[fetch]\nbatch_size = 0\n");
    let output = ws.run(&["check"]);
    assert_exit(&output, 3);
    assert!(String::from_utf8_lossy(&output.stderr).contains("batch_size"));
}

#[test]
fn missing_explicit_settings_exit_3() {
    let ws = Workspace::new();
    let output = ws.run(&["check"]);
    assert_exit(&output, 3);
}

#[test]
fn unknown_step_is_a_usage_error() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    assert_exit(&ws.run(&["run", "--from", "everything"]), 2);
}

// ===========================================================================
// run / config
// ===========================================================================

#[test]
fn run_completes_when_sources_are_unreachable() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    ws.write("kodifikator.csv", CLASSIFIER);
    ws.write("comparison.csv", "Код КАТОТТГ;Код КОАТУУ\nUA51060030010011183;5110600000\n");

    let output = ws.run(&["--json", "run"]);
    assert_success(&output);
    let summary = stdout_json(&output);

    let steps: Vec<&str> = summary["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["meta"]["step"].as_str().unwrap())
        .collect();
    assert_eq!(steps.first(), Some(&"generate"));
    assert!(steps.contains(&"wikidata-details"));
    assert!(!steps.contains(&"add-places"));
    assert_eq!(summary["check"]["total_records"], 5);
    assert!(summary.get("failed_step").is_none());
    assert_eq!(ws.record(TOWN)["legacy_code"], "5110600000");
}

#[test]
fn run_stops_at_failing_step_and_still_checks() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    ws.generate();

    // No comparison table: map-koatuu fails, check still runs
    let output = ws.run(&["--json", "run", "--from", "map-koatuu"]);
    assert_exit(&output, 4);
    let summary = stdout_json(&output);
    assert_eq!(summary["failed_step"], "map-koatuu");
    assert_eq!(summary["steps"], serde_json::json!([]));
    assert_eq!(summary["check"]["total_records"], 5);
}

#[test]
fn config_show_prints_effective_settings() {
    let ws = Workspace::new();
    ws.config(UNREACHABLE);
    let output = ws.run(&["config", "show"]);
    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("batch_size = 15"));
    assert!(stdout.contains("pause_ms = 0"));
    assert!(stdout.contains("user_agent = \"UASettlementsBot/1.0\""));
}

#[test]
fn config_init_refuses_to_overwrite() {
    let ws = Workspace::new();
    let path = ws.path("fresh.toml");
    let run = |args: &[&str]| {
        ws.uaplaces()
            .arg("--config")
            .arg(&path)
            .args(args)
            .output()
            .expect("failed to run uaplaces")
    };

    assert_success(&run(&["config", "init"]));
    assert!(std::fs::read_to_string(&path).unwrap().contains("[endpoints]"));
    assert_exit(&run(&["config", "init"]), 2);
    assert_success(&run(&["config", "init", "--force"]));
}
