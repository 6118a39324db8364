//! Consistency checker.
//!
//! Read-mostly pass over the store. The only mutation is the removal of
//! shared knowledge-base IDs, after which the caller should rewrite the
//! collection.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::category::Category;
use crate::code::AdministrativeCode;
use crate::duplicates::{resolve_duplicates, DuplicateResolution};
use crate::hierarchy::{hierarchy_violations, HierarchyViolation};
use crate::record::{Presence, Record};
use crate::report::StepMeta;
use crate::store::RecordStore;

// ---------------------------------------------------------------------------
// Boundary maps
// ---------------------------------------------------------------------------

/// Leaf codes present in each boundary map. A level without a map is not
/// checked.
#[derive(Debug, Clone, Default)]
pub struct BoundaryMaps {
    pub oblasts: Option<HashSet<String>>,
    pub districts: Option<HashSet<String>>,
    pub communities: Option<HashSet<String>>,
}

impl BoundaryMaps {
    /// The map a record is expected in: level-1 units in the oblast map,
    /// districts and communities in their own maps.
    fn map_for(&self, record: &Record) -> Option<(&'static str, &HashSet<String>)> {
        if record.admin_level() == 1 {
            return self.oblasts.as_ref().map(|m| ("oblasts", m));
        }
        match record.category {
            Category::District => self.districts.as_ref().map(|m| ("districts", m)),
            Category::Community => self.communities.as_ref().map(|m| ("communities", m)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MissingCounts {
    pub total: usize,
    pub osm_reference: usize,
    pub postal_code: usize,
    pub coordinates: usize,
    pub legacy_code: usize,
    pub knowledge_base_id: usize,
}

impl MissingCounts {
    fn count(&mut self, record: &Record) {
        self.total += 1;
        self.osm_reference += usize::from(!record.osm_reference.is_present());
        self.postal_code += usize::from(!record.postal_code.is_present());
        self.coordinates += usize::from(!record.coordinates.is_present());
        self.legacy_code += usize::from(!record.legacy_code.is_present());
        self.knowledge_base_id += usize::from(!record.knowledge_base_id.is_present());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapMismatch {
    pub code: AdministrativeCode,
    pub name: String,
    pub map: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsistencyReport {
    pub meta: StepMeta,
    pub total_records: usize,
    /// Missing-field counts keyed by category code.
    pub missing: BTreeMap<String, MissingCounts>,
    pub nameless: Vec<AdministrativeCode>,
    pub map_mismatches: Vec<MapMismatch>,
    pub hierarchy_violations: Vec<HierarchyViolation>,
    pub duplicates: DuplicateResolution,
}

impl ConsistencyReport {
    /// Whether the check removed identifiers and the collection must be
    /// written back.
    pub fn needs_rewrite(&self) -> bool {
        self.duplicates.changed()
    }

    /// Shared legacy codes are expected after the KOATUU reform and only
    /// reported, so they do not count against a clean report.
    pub fn is_clean(&self) -> bool {
        self.nameless.is_empty()
            && self.map_mismatches.is_empty()
            && self.hierarchy_violations.is_empty()
            && self.duplicates.knowledge_base.is_empty()
    }

    /// Human-readable summary, one finding per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("records: {}\n", self.total_records));
        for (category, counts) in &self.missing {
            let name = Category::from_code(category).map(|c| c.display_name()).unwrap_or(category.as_str());
            out.push_str(&format!(
                "{name} ({}): missing osm {}, postal {}, coordinates {}, koatuu {}, wikidata {}\n",
                counts.total,
                counts.osm_reference,
                counts.postal_code,
                counts.coordinates,
                counts.legacy_code,
                counts.knowledge_base_id
            ));
        }
        for code in &self.nameless {
            out.push_str(&format!("nameless: {code}\n"));
        }
        for mismatch in &self.map_mismatches {
            out.push_str(&format!(
                "not in {} map: {} {}\n",
                mismatch.map, mismatch.code, mismatch.name
            ));
        }
        for violation in &self.hierarchy_violations {
            out.push_str(&format!("hierarchy: {} {:?}\n", violation.code, violation.kind));
        }
        for group in self.duplicates.legacy_code.iter().chain(&self.duplicates.knowledge_base) {
            out.push_str(&format!("duplicate: {}\n", group.describe()));
        }
        if self.needs_rewrite() {
            out.push_str(&format!(
                "removed {} shared knowledge-base IDs\n",
                self.duplicates.cleared
            ));
        }
        out
    }
}

/// Run every check over `store`.
pub fn check(store: &mut RecordStore, maps: &BoundaryMaps) -> ConsistencyReport {
    let duplicates = resolve_duplicates(store);

    let mut missing: BTreeMap<String, MissingCounts> = BTreeMap::new();
    let mut nameless = Vec::new();
    let mut map_mismatches = Vec::new();

    for record in store.all() {
        missing
            .entry(record.category.code().to_string())
            .or_default()
            .count(record);

        if !record.name.is_present() {
            nameless.push(record.primary_code().clone());
        }

        if let Some((map, leaves)) = maps.map_for(record) {
            if !leaves.contains(record.leaf_code()) {
                map_mismatches.push(MapMismatch {
                    code: record.primary_code().clone(),
                    name: record.name.clone(),
                    map,
                });
            }
        }
    }

    let report = ConsistencyReport {
        meta: StepMeta {
            step: "check".to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        total_records: store.len(),
        missing,
        nameless,
        map_mismatches,
        hierarchy_violations: hierarchy_violations(store),
        duplicates,
    };
    log::info!(
        "check: {} records, {} nameless, {} map mismatches, {} hierarchy violations",
        report.total_records,
        report.nameless.len(),
        report.map_mismatches.len(),
        report.hierarchy_violations.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::import_classifier;
    use crate::source::ClassifierRow;

    fn code(s: &str) -> AdministrativeCode {
        AdministrativeCode::parse(s).unwrap()
    }

    fn store() -> RecordStore {
        let mut store = RecordStore::new();
        import_classifier(
            &mut store,
            &[
                ClassifierRow::new(["UA80", "", "", "", ""], "K", "Київ"),
                ClassifierRow::new(["UA68", "", "", "", ""], "O", "Хмельницька"),
                ClassifierRow::new(["UA68", "UA6804", "", "", ""], "P", "Кам'янець-Подільський"),
                ClassifierRow::new(["UA68", "UA6804", "UA6804017", "", ""], "H", ""),
            ],
        );
        store
    }

    fn set(values: &[&str]) -> Option<HashSet<String>> {
        Some(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn counts_missing_fields_per_category() {
        let mut store = store();
        store.get_mut(&code("UA68")).unwrap().postal_code = Some("29000".into());
        let report = check(&mut store, &BoundaryMaps::default());
        assert_eq!(report.total_records, 4);
        assert_eq!(report.missing["O"].total, 1);
        assert_eq!(report.missing["O"].postal_code, 0);
        assert_eq!(report.missing["O"].coordinates, 1);
        assert_eq!(report.missing["K"].total, 1);
        assert_eq!(report.nameless, vec![code("UA68/UA6804/UA6804017")]);
    }

    #[test]
    fn boundary_maps_by_level() {
        let mut store = store();
        let maps = BoundaryMaps {
            oblasts: set(&["UA68"]),
            districts: set(&["UA6804"]),
            communities: set(&[]),
        };
        let report = check(&mut store, &maps);
        let missing: Vec<(String, &str)> = report
            .map_mismatches
            .iter()
            .map(|m| (m.code.to_string(), m.map))
            .collect();
        assert_eq!(
            missing,
            vec![
                ("UA80".to_string(), "oblasts"),
                ("UA68/UA6804/UA6804017".to_string(), "communities"),
            ]
        );
    }

    #[test]
    fn second_check_writes_nothing() {
        let mut store = store();
        store.get_mut(&code("UA68")).unwrap().knowledge_base_id = Some("Q1".into());
        store.get_mut(&code("UA68/UA6804")).unwrap().knowledge_base_id = Some("Q1".into());
        let first = check(&mut store, &BoundaryMaps::default());
        assert!(first.needs_rewrite());
        assert!(first.render().contains("duplicate: knowledge_base_id Q1"));
        let second = check(&mut store, &BoundaryMaps::default());
        assert!(!second.needs_rewrite());
    }

    #[test]
    fn clean_store_reports_clean() {
        let mut store = store();
        store.get_mut(&code("UA68/UA6804/UA6804017")).unwrap().name = "Кам'янець-Подільська".into();
        let report = check(&mut store, &BoundaryMaps::default());
        assert!(report.is_clean());
        assert!(report.render().starts_with("records: 4\n"));
    }

    #[test]
    fn shared_legacy_code_is_reported_but_clean() {
        let mut store = store();
        store.get_mut(&code("UA68/UA6804/UA6804017")).unwrap().name = "Кам'янець-Подільська".into();
        store.get_mut(&code("UA68/UA6804")).unwrap().legacy_code = Some("6810400000".into());
        store.get_mut(&code("UA68/UA6804/UA6804017")).unwrap().legacy_code = Some("6810400000".into());
        let report = check(&mut store, &BoundaryMaps::default());
        assert_eq!(report.duplicates.legacy_code.len(), 1);
        assert!(report.render().contains("duplicate: legacy_code 6810400000"));
        assert!(report.is_clean());
        assert!(!report.needs_rewrite());
    }
}
