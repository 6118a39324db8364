//! Hierarchy resolver.
//!
//! Parent links come from the structure of the code alone. Ancestor names are
//! copied downward and re-derived on every run.

use serde::Serialize;

use crate::category::Category;
use crate::code::AdministrativeCode;
use crate::record::Record;
use crate::report::StepReport;
use crate::source::ClassifierRow;
use crate::store::{RecordStore, Upserted};

// ---------------------------------------------------------------------------
// Classifier import
// ---------------------------------------------------------------------------

/// Seed or refresh the store from classifier rows, then rebuild parent links
/// and ancestor names. Enrichment already on existing records is kept.
pub fn import_classifier(store: &mut RecordStore, rows: &[ClassifierRow]) -> StepReport {
    let mut report = StepReport::new("generate");

    for row in rows {
        report.summary.examined += 1;
        let Some(code) = AdministrativeCode::from_segments(&row.columns) else {
            log::info!("skipping classifier row without code: {}", row.name);
            continue;
        };
        let Some(category) = Category::from_code(&row.category) else {
            log::warn!("{code}: unknown category '{}', row skipped", row.category);
            report.unresolved.push(code.to_string());
            continue;
        };
        let name = row.name.trim();
        let mut changed = false;
        let outcome = store.upsert(&code, category.clone(), |record| {
            if record.name != name {
                record.name = name.to_string();
                changed = true;
            }
            if record.category != category {
                record.category = category;
                changed = true;
            }
        });
        match outcome {
            Upserted::Created => report.summary.created += 1,
            Upserted::Updated if changed => report.summary.updated += 1,
            Upserted::Updated => {}
        }
    }

    let parents = resolve_parents(store);
    let names = propagate_names(store);
    log::info!("hierarchy: {parents} parent links and {names} ancestor name sets rewritten");
    report
}

// ---------------------------------------------------------------------------
// Parents + ancestor names
// ---------------------------------------------------------------------------

fn derived_parent(store: &RecordStore, record: &Record) -> Option<AdministrativeCode> {
    record.primary_code().parent().filter(|p| store.contains(p))
}

/// Set every record's `parent_code` to its code minus the last segment, when
/// that parent exists. Returns the number of records changed.
pub fn resolve_parents(store: &mut RecordStore) -> usize {
    let updates: Vec<(AdministrativeCode, Option<AdministrativeCode>)> = store
        .all()
        .filter_map(|r| {
            let parent = derived_parent(store, r);
            (r.parent_code != parent).then(|| (r.primary_code().clone(), parent))
        })
        .collect();

    let changed = updates.len();
    for (code, parent) in updates {
        if let Some(mut record) = store.get_mut(&code) {
            record.parent_code = parent;
        }
    }
    changed
}

/// Nearest ancestor of `code` with the given category.
pub fn nearest_ancestor<'a>(
    store: &'a RecordStore,
    code: &AdministrativeCode,
    category: Category,
) -> Option<&'a Record> {
    code.ancestors()
        .iter()
        .filter_map(|c| store.get(c))
        .find(|r| r.category == category)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct AncestorNames {
    oblast: Option<String>,
    district: Option<String>,
    hromada: Option<String>,
}

fn ancestor_names(store: &RecordStore, code: &AdministrativeCode) -> AncestorNames {
    let name_of = |category| nearest_ancestor(store, code, category).map(|r| r.name.clone());
    AncestorNames {
        oblast: name_of(Category::Oblast),
        district: name_of(Category::District),
        hromada: name_of(Category::Community),
    }
}

/// Rewrite `oblast_name`, `district_name` and `hromada_name` from the
/// ancestors. Returns the number of records changed.
pub fn propagate_names(store: &mut RecordStore) -> usize {
    let updates: Vec<(AdministrativeCode, AncestorNames)> = store
        .all()
        .filter_map(|r| {
            let names = ancestor_names(store, r.primary_code());
            let current = AncestorNames {
                oblast: r.oblast_name.clone(),
                district: r.district_name.clone(),
                hromada: r.hromada_name.clone(),
            };
            (current != names).then(|| (r.primary_code().clone(), names))
        })
        .collect();

    let changed = updates.len();
    for (code, names) in updates {
        if let Some(mut record) = store.get_mut(&code) {
            record.oblast_name = names.oblast;
            record.district_name = names.district;
            record.hromada_name = names.hromada;
        }
    }
    changed
}

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// `parent_code` differs from the code minus its last segment.
    WrongParent,
    /// `parent_code` names a record that is not in the store.
    DanglingParent,
    /// The parent exists but `parent_code` is empty.
    MissingParent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HierarchyViolation {
    pub code: AdministrativeCode,
    pub kind: ViolationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_code: Option<AdministrativeCode>,
}

pub fn hierarchy_violations(store: &RecordStore) -> Vec<HierarchyViolation> {
    let mut out = Vec::new();
    for record in store.all() {
        let expected = record.primary_code().parent();
        let kind = match (&record.parent_code, &expected) {
            (Some(actual), _) if Some(actual) != expected.as_ref() => Some(ViolationKind::WrongParent),
            (Some(actual), _) if !store.contains(actual) => Some(ViolationKind::DanglingParent),
            (None, Some(parent)) if store.contains(parent) => Some(ViolationKind::MissingParent),
            _ => None,
        };
        if let Some(kind) = kind {
            out.push(HierarchyViolation {
                code: record.primary_code().clone(),
                kind,
                parent_code: record.parent_code.clone(),
            });
        }
    }
    out
}
