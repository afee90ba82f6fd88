//! Shared fixtures for engine integration tests

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use trailhead::config::Config;
use trailhead::progression::{CatalogFile, ProgressionEngine};

/// Two zones. `basics` has a three-phase chapter followed by a two-phase
/// chapter; `advanced` has one chapter whose phase is split into pages.
pub const CATALOG: &str = r#"
[[node]]
id = "basics"
kind = "zone"
order = 0
title = "Basics"

[[node]]
id = "basics-intro"
kind = "chapter"
parent = "basics"
order = 0
title = "Introduction"

[[node]]
id = "intro-1"
kind = "phase"
parent = "basics-intro"
order = 0
content = "reading"

[[node]]
id = "intro-2"
kind = "phase"
parent = "basics-intro"
order = 1
content = "reflection"

[[node]]
id = "intro-3"
kind = "phase"
parent = "basics-intro"
order = 2
content = "self-assessment"

[[node]]
id = "basics-next"
kind = "chapter"
parent = "basics"
order = 1
title = "Next steps"

[[node]]
id = "next-1"
kind = "phase"
parent = "basics-next"
order = 0

[[node]]
id = "next-2"
kind = "phase"
parent = "basics-next"
order = 1

[[node]]
id = "advanced"
kind = "zone"
order = 1
title = "Advanced"

[[node]]
id = "adv-1"
kind = "chapter"
parent = "advanced"
order = 0

[[node]]
id = "adv-1-1"
kind = "phase"
parent = "adv-1"
order = 0

[[node]]
id = "adv-1-1-a"
kind = "page"
parent = "adv-1-1"
order = 0

[[node]]
id = "adv-1-1-b"
kind = "page"
parent = "adv-1-1"
order = 1
"#;

/// Leaves in the order a learner can complete them
pub const PATH: &[&str] = &[
    "intro-1",
    "intro-2",
    "intro-3",
    "next-1",
    "next-2",
    "adv-1-1-a",
    "adv-1-1-b",
];

pub const ADMIN: &str = "ops";

pub fn config() -> Config {
    let mut config = Config::default();
    config.settings.admins = vec![ADMIN.to_string()];
    config
}

/// Open an engine on `path` and load the fixture catalog
pub fn open_engine(path: &Path) -> ProgressionEngine {
    let engine = ProgressionEngine::open(path, config()).expect("open engine");
    let catalog: CatalogFile = toml::from_str(CATALOG).expect("parse catalog");
    engine
        .import_catalog(&catalog.into_tree().expect("valid catalog"))
        .expect("import catalog");
    engine
}

/// Fresh engine in a temp dir; keep the dir alive for the test's duration
pub fn engine() -> (TempDir, ProgressionEngine) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let engine = open_engine(&dir.path().join("progress.db"));
    (dir, engine)
}

/// Noon UTC on a day in June 2024
pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, d, 12, 0, 0).unwrap()
}

/// (reason_code, amount) rows for a learner, oldest first
pub fn xp_rows(engine: &ProgressionEngine, learner: &str) -> Vec<(String, i64)> {
    engine
        .ledger()
        .events(learner)
        .expect("read ledger")
        .into_iter()
        .map(|e| (e.reason.as_str().to_string(), e.amount))
        .collect()
}
