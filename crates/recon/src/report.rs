use std::collections::BTreeMap;

use serde::Serialize;

use crate::code::AdministrativeCode;
use crate::duplicates::DuplicateResolution;
use crate::merge::MergeOutcome;

// ---------------------------------------------------------------------------
// Step report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StepMeta {
    pub step: String,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StepSummary {
    /// Records the step looked at.
    pub examined: usize,
    /// Records an external answer was matched to.
    pub matched: usize,
    /// Records with at least one field filled.
    pub updated: usize,
    pub created: usize,
    pub batches: usize,
    pub skipped_batches: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictEntry {
    pub code: AdministrativeCode,
    pub field: String,
    pub current: String,
    pub offered: String,
}

/// One external value that matched several records; the first one won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousMatch {
    pub value: String,
    pub codes: Vec<AdministrativeCode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub meta: StepMeta,
    pub summary: StepSummary,
    /// Filled-field counts by field name.
    pub fields_filled: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ConflictEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<ConflictEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ambiguous: Vec<AmbiguousMatch>,
    /// Lookup values no source answered for.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicates: Option<DuplicateResolution>,
}

impl StepReport {
    pub fn new(step: &str) -> Self {
        Self {
            meta: StepMeta {
                step: step.to_string(),
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                run_at: chrono::Utc::now().to_rfc3339(),
            },
            summary: StepSummary::default(),
            fields_filled: BTreeMap::new(),
            conflicts: Vec::new(),
            rejected: Vec::new(),
            ambiguous: Vec::new(),
            unresolved: Vec::new(),
            duplicates: None,
        }
    }

    /// Fold one merge result in; returns whether the record changed.
    pub fn absorb(&mut self, code: &AdministrativeCode, outcome: MergeOutcome) -> bool {
        self.summary.matched += 1;
        let changed = outcome.changed();
        if changed {
            self.summary.updated += 1;
        }
        for name in outcome.applied {
            *self.fields_filled.entry(name.to_string()).or_insert(0) += 1;
        }
        for conflict in outcome.conflicts {
            log::warn!(
                "{code}: {} conflict, keeping '{}' over '{}'",
                conflict.field,
                conflict.current,
                conflict.offered
            );
            self.conflicts.push(ConflictEntry {
                code: code.clone(),
                field: conflict.field.to_string(),
                current: conflict.current,
                offered: conflict.offered,
            });
        }
        for name in outcome.rejected {
            log::warn!("{code}: rejected {name} of the wrong element kind");
            self.rejected.push(ConflictEntry {
                code: code.clone(),
                field: name.to_string(),
                current: String::new(),
                offered: String::new(),
            });
        }
        changed
    }

    pub fn ambiguous(&mut self, value: &str, codes: Vec<AdministrativeCode>) {
        let listed: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
        log::warn!("{value} matches {} records ({}); using the first", codes.len(), listed.join(", "));
        self.ambiguous.push(AmbiguousMatch { value: value.to_string(), codes });
    }

    pub fn filled(&self, field: &str) -> usize {
        self.fields_filled.get(field).copied().unwrap_or(0)
    }

    /// Whether the step modified the collection.
    pub fn changed(&self) -> bool {
        self.summary.updated > 0
            || self.summary.created > 0
            || self.duplicates.as_ref().map(|d| d.changed()).unwrap_or(false)
    }

    /// One-line progress summary for the log.
    pub fn headline(&self) -> String {
        let s = &self.summary;
        format!(
            "{}: examined {}, matched {}, updated {}, created {}, {} conflicts, {} skipped batches",
            self.meta.step,
            s.examined,
            s.matched,
            s.updated,
            s.created,
            self.conflicts.len(),
            s.skipped_batches
        )
    }
}
