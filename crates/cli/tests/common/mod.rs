// Shared fixtures for the binary tests: a temp workspace with its own
// settings file, so nothing reads the user's config or the network.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;

pub const OBLAST: &str = "UA51000000000030770";
pub const DISTRICT: &str = "UA51060000000072165";
pub const COMMUNITY: &str = "UA51060030000063227";
pub const TOWN: &str = "UA51060030010011183";
pub const VILLAGE: &str = "UA51060030020096254";

pub const CLASSIFIER: &str = "\
Перший рівень;Другий рівень;Третій рівень;Четвертий рівень;Додатковий рівень;Категорія об’єкта;Назва об’єкта
UA51000000000030770;;;;;O;Одеська
UA51000000000030770;UA51060000000072165;;;;P;Ізмаїльський
UA51000000000030770;UA51060000000072165;UA51060030000063227;;;H;Ізмаїльська
UA51000000000030770;UA51060000000072165;UA51060030000063227;UA51060030010011183;;M;Ізмаїл
UA51000000000030770;UA51060000000072165;UA51060030000063227;UA51060030020096254;;C;Муравлівка
";

/// Endpoint base nobody listens on; requests fail fast with connection refused.
pub const UNREACHABLE: &str = "http://127.0.0.1:9";

pub struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self { dir: tempfile::tempdir().expect("tempdir") }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, content).expect("write fixture");
        path
    }

    /// Settings pointing every path into the workspace and every endpoint at
    /// `base`.
    pub fn config(&self, base: &str) -> PathBuf {
        let p = |name: &str| self.path(name).display().to_string();
        let toml = format!(
            "[paths]
data = '{data}'
classifier = '{classifier}'
comparison_table = '{comparison}'
places = '{places}'
oblast_map = '{oblasts}'
district_map = '{districts}'
community_map = '{communities}'
previous_community_map = '{previous}'

[fetch]
batch_size = 15
max_retries = 0
retry_delay_secs = 0
pause_ms = 0
timeout_secs = 5

[endpoints]
overpass = '{base}/api/interpreter'
wikidata_sparql = '{base}/sparql'
wikidata_api = '{base}/w/api.php'
decentralization = '{base}/graphql'
",
            data = p("settlements.json"),
            classifier = p("kodifikator.csv"),
            comparison = p("comparison.csv"),
            places = p("places.csv"),
            oblasts = p("oblasts.geojson"),
            districts = p("districts.geojson"),
            communities = p("communities.geojson"),
            previous = p("ADMIN_3.geojson"),
        );
        self.write("uaplaces.toml", &toml)
    }

    pub fn uaplaces(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_uaplaces"));
        cmd.current_dir(self.dir.path());
        // Keep the user's settings and log filter out of the tests
        cmd.env_remove("UAPLACES_CONFIG");
        cmd.env_remove("UAPLACES_DATA");
        cmd.env_remove("RUST_LOG");
        cmd.env("HOME", self.dir.path());
        cmd.env("XDG_CONFIG_HOME", self.dir.path().join("xdg"));
        cmd
    }

    /// Run with the workspace settings file.
    pub fn run(&self, args: &[&str]) -> Output {
        let config = self.path("uaplaces.toml");
        let mut cmd = self.uaplaces();
        cmd.arg("--config").arg(&config).args(args);
        cmd.output().expect("failed to run uaplaces")
    }

    /// Seed the collection from the standard classifier.
    pub fn generate(&self) {
        self.write("kodifikator.csv", CLASSIFIER);
        let output = self.run(&["generate"]);
        assert_success(&output);
    }

    pub fn data_path(&self) -> PathBuf {
        self.path("settlements.json")
    }

    pub fn collection(&self) -> Vec<Value> {
        read_json_array(&self.data_path())
    }

    /// The record whose primary code ends with `leaf`.
    pub fn record(&self, leaf: &str) -> Value {
        self.collection()
            .into_iter()
            .find(|r| r["primary_code"].as_str().map(|c| c.ends_with(leaf)).unwrap_or(false))
            .unwrap_or_else(|| panic!("no record for {leaf}"))
    }
}

pub fn read_json_array(path: &Path) -> Vec<Value> {
    let content = std::fs::read_to_string(path).expect("read collection");
    match serde_json::from_str(&content).expect("collection JSON") {
        Value::Array(items) => items,
        other => panic!("expected an array, got {other}"),
    }
}

pub fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "exit code: {:?}\nstderr: {}",
        output.status.code(),
        String::from_utf8_lossy(&output.stderr),
    );
}

pub fn assert_exit(output: &Output, code: i32) {
    assert_eq!(
        output.status.code(),
        Some(code),
        "expected exit {}, got {:?}\nstderr: {}",
        code,
        output.status.code(),
        String::from_utf8_lossy(&output.stderr),
    );
}

/// stdout must be exactly one JSON value.
pub fn stdout_json(output: &Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim())
        .unwrap_or_else(|e| panic!("stdout must be valid JSON.\nParse error: {}\nstdout:\n{}", e, stdout))
}
