//! Field-level merge policy.
//!
//! A value from a source only fills a field that is currently empty. The
//! exceptions:
//!
//! - identifiers (`legacy_code`, `knowledge_base_id`) are never replaced; a
//!   different value is reported as a conflict, an equal one is a no-op;
//! - an `osm_reference` found through the knowledge base must fit the
//!   record's kind (nodes for points, ways/relations for regions).

use serde::Serialize;

use crate::record::{field, Patch, Presence, Record};

/// Where a patch came from. Only affects the `osm_reference` rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    LegacyTable,
    PlaceTable,
    Osm,
    KnowledgeBase,
    Decentralization,
    Hierarchy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldConflict {
    pub field: &'static str,
    pub current: String,
    pub offered: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// Fields that were empty and are now set.
    pub applied: Vec<&'static str>,
    /// Identifier values that disagree with what the record already holds.
    pub conflicts: Vec<FieldConflict>,
    /// Values refused by a kind rule.
    pub rejected: Vec<&'static str>,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Fill `slot` from `offered` when the slot is empty and the offer is set.
fn fill<T: Presence + Clone>(slot: &mut Option<T>, offered: &Option<T>) -> bool {
    if slot.is_present() || !offered.is_present() {
        return false;
    }
    *slot = offered.clone();
    true
}

fn fill_identifier(
    slot: &mut Option<String>,
    offered: &Option<String>,
    name: &'static str,
    outcome: &mut MergeOutcome,
) {
    let Some(value) = offered.as_ref().filter(|v| v.is_present()) else {
        return;
    };
    match slot.as_ref().filter(|v| v.is_present()) {
        None => {
            *slot = Some(value.trim().to_string());
            outcome.applied.push(name);
        }
        Some(current) if current.trim() == value.trim() => {}
        Some(current) => outcome.conflicts.push(FieldConflict {
            field: name,
            current: current.clone(),
            offered: value.clone(),
        }),
    }
}

/// Merge `patch` into `record` under the fill-if-empty policy.
pub fn merge_patch(record: &mut Record, patch: &Patch, origin: Origin) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    fill_identifier(&mut record.legacy_code, &patch.legacy_code, field::LEGACY_CODE, &mut outcome);
    fill_identifier(
        &mut record.knowledge_base_id,
        &patch.knowledge_base_id,
        field::KNOWLEDGE_BASE_ID,
        &mut outcome,
    );

    if let Some(reference) = patch.osm_reference.filter(|r| r.is_present()) {
        let kind_ok = origin != Origin::KnowledgeBase || reference.fits(record.kind());
        if !kind_ok {
            outcome.rejected.push(field::OSM_REFERENCE);
        } else if fill(&mut record.osm_reference, &Some(reference)) {
            outcome.applied.push(field::OSM_REFERENCE);
        }
    }

    macro_rules! fill_field {
        ($($slot:ident).+, $name:expr) => {
            if fill(&mut record.$($slot).+, &patch.$($slot).+) {
                outcome.applied.push($name);
            }
        };
    }

    fill_field!(postal_code, field::POSTAL_CODE);
    fill_field!(coordinates, field::COORDINATES);
    fill_field!(population, field::POPULATION);
    fill_field!(area, field::AREA);
    fill_field!(names.en, field::NAME_EN);
    fill_field!(names.ru, field::NAME_RU);
    fill_field!(names.pl, field::NAME_PL);
    fill_field!(wikipedia, field::WIKIPEDIA);
    fill_field!(old_name, field::OLD_NAME);
    fill_field!(hromada_center, field::HROMADA_CENTER);

    for (key, value) in &patch.extra {
        if field::is_known(key) || !value.is_present() {
            continue;
        }
        if record.extra.get(key).map(|v| v.is_present()).unwrap_or(false) {
            continue;
        }
        record.extra.insert(key.clone(), value.clone());
        // Extension keys are not 'static; report them under a shared label.
        outcome.applied.push("extra");
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::Category;
    use crate::code::AdministrativeCode;
    use crate::record::{Coordinates, OsmRef};

    fn record(category: Category) -> Record {
        Record::new(AdministrativeCode::parse("UA01/UA0102").unwrap(), "Test", category)
    }

    #[test]
    fn fills_only_empty_fields() {
        let mut r = record(Category::Village);
        r.postal_code = Some("68600".into());
        r.population = Some(0);
        let patch = Patch {
            postal_code: Some("99999".into()),
            population: Some(1200),
            coordinates: Some(Coordinates { lon: 28.8, lat: 45.3 }),
            ..Patch::default()
        };
        let outcome = merge_patch(&mut r, &patch, Origin::Osm);
        assert_eq!(r.postal_code.as_deref(), Some("68600"));
        assert_eq!(r.population, Some(1200));
        assert!(r.coordinates.is_some());
        assert_eq!(outcome.applied, vec![field::COORDINATES, field::POPULATION]);
    }

    #[test]
    fn empty_offers_never_apply() {
        let mut r = record(Category::Village);
        let patch = Patch {
            postal_code: Some("  ".into()),
            area: Some(0.0),
            ..Patch::default()
        };
        let outcome = merge_patch(&mut r, &patch, Origin::Osm);
        assert!(!outcome.changed());
        assert!(r.postal_code.is_none());
        assert!(r.area.is_none());
    }

    #[test]
    fn identifier_conflict_is_reported_not_applied() {
        let mut r = record(Category::Community);
        r.knowledge_base_id = Some("Q1".into());
        let patch = Patch {
            knowledge_base_id: Some("Q2".into()),
            ..Patch::default()
        };
        let outcome = merge_patch(&mut r, &patch, Origin::Osm);
        assert_eq!(r.knowledge_base_id.as_deref(), Some("Q1"));
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].field, field::KNOWLEDGE_BASE_ID);
        assert_eq!(outcome.conflicts[0].offered, "Q2");
    }

    #[test]
    fn same_identifier_is_a_no_op() {
        let mut r = record(Category::Community);
        r.legacy_code = Some("5122000000".into());
        let patch = Patch {
            legacy_code: Some("5122000000".into()),
            ..Patch::default()
        };
        let outcome = merge_patch(&mut r, &patch, Origin::LegacyTable);
        assert!(outcome.conflicts.is_empty());
        assert!(!outcome.changed());
    }

    #[test]
    fn knowledge_base_osm_reference_must_fit_kind() {
        let aggregate = Patch {
            osm_reference: Some(OsmRef::relation(7)),
            ..Patch::default()
        };
        let mut point = record(Category::Town);
        let outcome = merge_patch(&mut point, &aggregate, Origin::KnowledgeBase);
        assert!(point.osm_reference.is_none());
        assert_eq!(outcome.rejected, vec![field::OSM_REFERENCE]);

        let mut region = record(Category::Community);
        merge_patch(&mut region, &aggregate, Origin::KnowledgeBase);
        assert_eq!(region.osm_reference, Some(OsmRef::relation(7)));

        let node = Patch {
            osm_reference: Some(OsmRef::node(3)),
            ..Patch::default()
        };
        let mut region = record(Category::Community);
        merge_patch(&mut region, &node, Origin::KnowledgeBase);
        assert!(region.osm_reference.is_none());
    }

    #[test]
    fn extension_fields_fill_if_absent() {
        let mut r = record(Category::Village);
        r.extra.insert("kept".into(), "old".into());
        let mut patch = Patch::default();
        patch.extra.insert("kept".into(), "new".into());
        patch.extra.insert("added".into(), "yes".into());
        patch.extra.insert(field::NAME.into(), "hijack".into());
        merge_patch(&mut r, &patch, Origin::Osm);
        assert_eq!(r.extra["kept"], "old");
        assert_eq!(r.extra["added"], "yes");
        assert_eq!(r.name, "Test");
        assert!(!r.extra.contains_key(field::NAME));
    }

    #[test]
    fn merge_is_idempotent() {
        let mut r = record(Category::Village);
        let patch = Patch {
            legacy_code: Some("1".into()),
            postal_code: Some("2".into()),
            ..Patch::default()
        };
        merge_patch(&mut r, &patch, Origin::PlaceTable);
        let snapshot = r.clone();
        let second = merge_patch(&mut r, &patch, Origin::PlaceTable);
        assert_eq!(r, snapshot);
        assert!(!second.changed());
        assert!(second.conflicts.is_empty());
    }
}
