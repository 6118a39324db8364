//! Reconciliation engine.
//!
//! Each step selects the records it can improve, asks a source about them in
//! fixed-size batches, matches answers back by exact key equality and merges
//! under the fill-if-empty policy. A batch whose source call fails after the
//! retries is skipped; every batch that changed something is checkpointed.

use std::collections::{BTreeMap, HashMap};

use crate::category::{Category, Kind};
use crate::code::AdministrativeCode;
use crate::duplicates::resolve_duplicates;
use crate::error::ReconError;
use crate::hierarchy::nearest_ancestor;
use crate::merge::{merge_patch, Origin};
use crate::record::{ElementKind, OsmRef, Patch, Presence, Record};
use crate::report::StepReport;
use crate::source::{
    class_matches, AggregateFigures, Checkpoint, DecentralizationSource, KbCandidate, KbProperty,
    KnowledgeBase, LegacyPair, OsmEntity, OsmProperty, OsmSource, PlaceRow, RetryPolicy,
};
use crate::store::{RecordStore, SecondaryKey};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

pub const DEFAULT_BATCH_SIZE: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { batch_size: DEFAULT_BATCH_SIZE, retry: RetryPolicy::default() }
    }
}

impl EngineConfig {
    fn chunk(&self) -> usize {
        self.batch_size.max(1)
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// First record matching `value` on `key`, logging ambiguity.
fn first_match(
    store: &RecordStore,
    key: SecondaryKey,
    value: &str,
    report: &mut StepReport,
) -> Option<AdministrativeCode> {
    let codes = store.codes_by(key, value);
    if codes.len() > 1 {
        report.ambiguous(value, codes.clone());
    }
    codes.into_iter().next()
}

fn apply(
    store: &mut RecordStore,
    code: &AdministrativeCode,
    patch: &Patch,
    origin: Origin,
    report: &mut StepReport,
) -> bool {
    let Some(mut record) = store.get_mut(code) else {
        return false;
    };
    let outcome = merge_patch(&mut record, patch, origin);
    report.absorb(code, outcome)
}

fn checkpoint_if(
    changed: bool,
    store: &RecordStore,
    checkpoint: &mut dyn Checkpoint,
) -> Result<(), ReconError> {
    if changed {
        checkpoint.save(store)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Local tables
// ---------------------------------------------------------------------------

/// Fill `legacy_code` from the KATOTTH → KOATUU comparison table.
pub fn apply_legacy_codes(store: &mut RecordStore, pairs: &[LegacyPair]) -> StepReport {
    let mut report = StepReport::new("map-koatuu");
    for pair in pairs {
        report.summary.examined += 1;
        let koatuu = pair.koatuu.trim();
        if koatuu.is_empty() || !koatuu.chars().all(|c| c.is_ascii_digit()) {
            log::info!("{}: non-numeric KOATUU '{koatuu}' ignored", pair.katotth);
            continue;
        }
        let Some(code) = first_match(store, SecondaryKey::Leaf, pair.katotth.trim(), &mut report) else {
            log::info!("{}: no record for comparison-table row", pair.katotth);
            continue;
        };
        let patch = Patch { legacy_code: Some(koatuu.to_string()), ..Patch::default() };
        apply(store, &code, &patch, Origin::LegacyTable, &mut report);
    }
    report
}

/// Fill `osm_reference`, `postal_code` and `legacy_code` from the place
/// table. Rows match by leaf code, falling back to the legacy code.
pub fn apply_places(store: &mut RecordStore, rows: &[PlaceRow]) -> StepReport {
    let mut report = StepReport::new("add-places");
    for row in rows {
        report.summary.examined += 1;
        let by_leaf = first_match(store, SecondaryKey::Leaf, row.katotth.trim(), &mut report);
        let code = match (by_leaf, row.legacy_code.as_deref()) {
            (Some(code), _) => code,
            (None, Some(legacy)) if !legacy.trim().is_empty() => {
                match first_match(store, SecondaryKey::LegacyCode, legacy.trim(), &mut report) {
                    Some(code) => code,
                    None => {
                        log::info!("{}: no record for place row", row.katotth);
                        continue;
                    }
                }
            }
            (None, _) => {
                log::info!("{}: no record for place row", row.katotth);
                continue;
            }
        };

        let osm_reference = match row.osm_reference.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => {
                let parsed = OsmRef::parse(raw);
                if parsed.is_none() {
                    log::warn!("{code}: unreadable OSM reference '{raw}' in place table");
                }
                parsed
            }
            _ => None,
        };
        let patch = Patch {
            osm_reference,
            postal_code: row.postal_code.clone(),
            legacy_code: row.legacy_code.clone(),
            ..Patch::default()
        };
        apply(store, &code, &patch, Origin::PlaceTable, &mut report);
    }
    report
}

// ---------------------------------------------------------------------------
// OpenStreetMap
// ---------------------------------------------------------------------------

/// Fetch coordinates and tags for point records that already carry a node
/// reference. References OSM does not answer for are reported, never cleared.
pub fn locate_by_reference(
    store: &mut RecordStore,
    config: &EngineConfig,
    osm: &mut dyn OsmSource,
    checkpoint: &mut dyn Checkpoint,
) -> Result<StepReport, ReconError> {
    let mut report = StepReport::new("osm-locations");
    let targets: Vec<(AdministrativeCode, u64)> = store
        .all()
        .filter(|r| r.kind() == Kind::Point && !r.coordinates.is_present())
        .filter_map(|r| match r.osm_reference {
            Some(reference) if reference.element == ElementKind::Node && reference.is_present() => {
                Some((r.primary_code().clone(), reference.id))
            }
            _ => None,
        })
        .collect();
    report.summary.examined = targets.len();

    for batch in targets.chunks(config.chunk()) {
        report.summary.batches += 1;
        let ids: Vec<u64> = batch.iter().map(|(_, id)| *id).collect();
        let entities = match config.retry.run("osm nodes", || osm.nodes_by_id(&ids)) {
            Ok(entities) => entities,
            Err(err) => {
                log::warn!("skipping batch of {} nodes: {err}", ids.len());
                report.summary.skipped_batches += 1;
                continue;
            }
        };

        let by_id: HashMap<u64, &OsmEntity> = entities
            .iter()
            .filter(|e| e.reference.element == ElementKind::Node)
            .map(|e| (e.reference.id, e))
            .collect();

        let mut changed = false;
        for (code, id) in batch {
            match by_id.get(id) {
                Some(entity) => {
                    changed |= apply(store, code, &entity.to_patch(false), Origin::Osm, &mut report);
                }
                None => {
                    log::warn!("{code}: OSM node {id} not found");
                    report.unresolved.push(format!("{code} {id}"));
                }
            }
        }
        checkpoint_if(changed, store, checkpoint)?;
    }

    log::info!("{}", report.headline());
    Ok(report)
}

/// Records of `kind` that an OSM katotth query could still improve.
fn katotth_targets(store: &RecordStore, kind: Kind) -> Vec<(String, AdministrativeCode)> {
    store
        .all()
        .filter(|r| r.kind() == kind)
        .filter(|r| match kind {
            Kind::Region => !r.osm_reference.is_present(),
            Kind::Point => !r.osm_reference.is_present() || !r.coordinates.is_present(),
        })
        .map(|r| (r.leaf_code().to_string(), r.primary_code().clone()))
        .collect()
}

/// Records of `kind` with a knowledge-base ID and no OSM reference.
fn wikidata_targets(store: &RecordStore, kind: Kind) -> Vec<(String, AdministrativeCode)> {
    store
        .all()
        .filter(|r| r.kind() == kind && !r.osm_reference.is_present())
        .filter_map(|r| {
            let id = r.knowledge_base_id.as_ref().filter(|v| v.is_present())?;
            Some((id.trim().to_string(), r.primary_code().clone()))
        })
        .collect()
}

/// Query OSM by `property` for each `(value, code)` target, in batches.
/// Several answers for one value: the first wins.
#[allow(clippy::too_many_arguments)]
fn match_by_property(
    store: &mut RecordStore,
    config: &EngineConfig,
    osm: &mut dyn OsmSource,
    property: OsmProperty,
    kind: Kind,
    targets: Vec<(String, AdministrativeCode)>,
    checkpoint: &mut dyn Checkpoint,
    report: &mut StepReport,
) -> Result<(), ReconError> {
    let element = ElementKind::for_kind(kind);
    report.summary.examined += targets.len();

    for batch in targets.chunks(config.chunk()) {
        report.summary.batches += 1;
        let values: Vec<String> = batch.iter().map(|(v, _)| v.clone()).collect();
        let label = format!("osm {} {}", element.keyword(), property.tag());
        let entities = match config.retry.run(&label, || osm.find_by_property(property, &values, element)) {
            Ok(entities) => entities,
            Err(err) => {
                log::warn!("skipping batch of {} {} values: {err}", values.len(), property.tag());
                report.summary.skipped_batches += 1;
                continue;
            }
        };

        let mut answers: BTreeMap<&str, Vec<&OsmEntity>> = BTreeMap::new();
        for entity in &entities {
            if entity.reference.element != element {
                continue;
            }
            if let Some(value) = entity.property_value(property) {
                answers.entry(value.trim()).or_default().push(entity);
            }
        }

        let mut changed = false;
        for (value, code) in batch {
            let Some(found) = answers.get(value.as_str()) else {
                log::info!("{code}: no OSM {} with {}={value}", element.keyword(), property.tag());
                report.unresolved.push(value.clone());
                continue;
            };
            if found.len() > 1 {
                let refs: Vec<String> = found.iter().map(|e| e.reference.to_string()).collect();
                log::warn!("{code}: {}={value} matches {}; using the first", property.tag(), refs.join(", "));
            }
            changed |= apply(store, code, &found[0].to_patch(true), Origin::Osm, report);
        }
        checkpoint_if(changed, store, checkpoint)?;
    }
    Ok(())
}

/// Match records of `kind` to OSM elements by their KATOTTH leaf code:
/// relations for regions, nodes for points.
pub fn match_by_katotth(
    store: &mut RecordStore,
    config: &EngineConfig,
    osm: &mut dyn OsmSource,
    kind: Kind,
    checkpoint: &mut dyn Checkpoint,
) -> Result<StepReport, ReconError> {
    let step = match kind {
        Kind::Region => "osm-regions",
        Kind::Point => "osm-settlements",
    };
    let mut report = StepReport::new(step);
    let targets = katotth_targets(store, kind);
    match_by_property(store, config, osm, OsmProperty::Katotth, kind, targets, checkpoint, &mut report)?;
    log::info!("{}", report.headline());
    Ok(report)
}

/// Match records still lacking an OSM reference through their
/// knowledge-base ID, for both kinds.
pub fn match_by_knowledge_base(
    store: &mut RecordStore,
    config: &EngineConfig,
    osm: &mut dyn OsmSource,
    checkpoint: &mut dyn Checkpoint,
) -> Result<StepReport, ReconError> {
    let mut report = StepReport::new("osm-wikidata");
    for kind in [Kind::Region, Kind::Point] {
        let targets = wikidata_targets(store, kind);
        match_by_property(store, config, osm, OsmProperty::Wikidata, kind, targets, checkpoint, &mut report)?;
    }
    log::info!("{}", report.headline());
    Ok(report)
}

// ---------------------------------------------------------------------------
// Decentralization
// ---------------------------------------------------------------------------

/// Figures carried to a parent level.
#[derive(Debug, Clone, Default, PartialEq)]
struct Figures {
    population: Option<u64>,
    area: Option<f64>,
}

impl Figures {
    fn from_aggregate(aggregate: &AggregateFigures) -> Self {
        Self { population: aggregate.population, area: aggregate.area }
    }

    fn to_patch(&self) -> Patch {
        Patch { population: self.population, area: self.area, ..Patch::default() }
    }
}

/// Fill community population, area and center, then propagate figures to
/// the district and oblast above each community.
///
/// Parent figures go through a dictionary keyed by the parent's own code:
/// the last community processed under a parent wins, nothing is summed. A
/// district or oblast aggregate from the source replaces the community's
/// figures for that level. Parents are merged fill-if-empty like any other
/// source.
pub fn apply_decentralization(
    store: &mut RecordStore,
    config: &EngineConfig,
    source: &mut dyn DecentralizationSource,
    checkpoint: &mut dyn Checkpoint,
) -> Result<StepReport, ReconError> {
    let mut report = StepReport::new("decentralization");
    report.summary.batches = 1;
    let data = match config.retry.run("decentralization", || source.fetch()) {
        Ok(data) => data,
        Err(err) => {
            log::warn!("decentralization data unavailable: {err}");
            report.summary.skipped_batches = 1;
            return Ok(report);
        }
    };

    let districts: HashMap<&str, &AggregateFigures> =
        data.districts.iter().map(|d| (d.id.as_str(), d)).collect();
    let oblasts: HashMap<&str, &AggregateFigures> =
        data.oblasts.iter().map(|o| (o.id.as_str(), o)).collect();

    let mut parents: BTreeMap<AdministrativeCode, Figures> = BTreeMap::new();
    let mut changed = false;

    for community in &data.communities {
        report.summary.examined += 1;
        let Some(katotth) = community.katotth.as_deref().map(str::trim).filter(|k| !k.is_empty()) else {
            log::info!("community {} has no katotth, skipped", community.id);
            continue;
        };
        let codes: Vec<AdministrativeCode> = store
            .find_by(SecondaryKey::Leaf, katotth)
            .into_iter()
            .filter(|r| r.category == Category::Community)
            .map(|r| r.primary_code().clone())
            .collect();
        let Some(code) = codes.first().cloned() else {
            log::info!("{katotth}: no community record");
            report.unresolved.push(katotth.to_string());
            continue;
        };
        if codes.len() > 1 {
            report.ambiguous(katotth, codes);
        }

        let patch = Patch {
            population: community.population,
            area: community.area,
            hromada_center: community.center.clone(),
            ..Patch::default()
        };
        changed |= apply(store, &code, &patch, Origin::Decentralization, &mut report);

        let own = Figures { population: community.population, area: community.area };
        let district = nearest_ancestor(store, &code, Category::District).map(|r| r.primary_code().clone());
        if let Some(district) = &district {
            let figures = community
                .district_ref
                .as_deref()
                .and_then(|id| districts.get(id))
                .map(|d| Figures::from_aggregate(d))
                .unwrap_or_else(|| own.clone());
            parents.insert(district.clone(), figures);
        }
        let start = district.as_ref().unwrap_or(&code);
        if let Some(oblast) = nearest_ancestor(store, start, Category::Oblast).map(|r| r.primary_code().clone()) {
            let figures = community
                .oblast_ref
                .as_deref()
                .and_then(|id| oblasts.get(id))
                .map(|o| Figures::from_aggregate(o))
                .unwrap_or(own);
            parents.insert(oblast, figures);
        }
    }

    for (code, figures) in &parents {
        changed |= apply(store, code, &figures.to_patch(), Origin::Hierarchy, &mut report);
    }
    checkpoint_if(changed, store, checkpoint)?;

    log::info!("{}", report.headline());
    Ok(report)
}

// ---------------------------------------------------------------------------
// Knowledge base
// ---------------------------------------------------------------------------

/// Pick the candidates a record may take.
///
/// KOATUU codes were reused across levels and KATOTTH items are sometimes
/// mistyped, so every candidate needs a known class compatible with the
/// record's category. Class-less candidates are dropped.
fn pick_candidate<'a>(candidates: &'a [KbCandidate], category: &Category) -> Vec<&'a KbCandidate> {
    let mut accepted: Vec<&KbCandidate> = Vec::new();
    for candidate in candidates {
        let compatible = candidate
            .instance_of
            .as_deref()
            .and_then(|class| class_matches(class, category))
            .unwrap_or(false);
        if compatible && !accepted.iter().any(|c| c.id == candidate.id) {
            accepted.push(candidate);
        }
    }
    accepted
}

fn lookup_id(
    kb: &mut dyn KnowledgeBase,
    config: &EngineConfig,
    record: &Record,
    report: &mut StepReport,
) -> Option<String> {
    let mut queries = vec![(KbProperty::Katotth, record.leaf_code().to_string())];
    if let Some(legacy) = record.legacy_code.as_ref().filter(|v| v.is_present()) {
        queries.push((KbProperty::Koatuu, legacy.trim().to_string()));
    }

    for (property, value) in queries {
        let label = format!("wikidata {}", property.pid());
        let candidates = match config.retry.run(&label, || kb.lookup(property, &value)) {
            Ok(candidates) => candidates,
            Err(err) => {
                log::warn!("{}: {} lookup failed: {err}", record.primary_code(), property.pid());
                report.summary.skipped_batches += 1;
                continue;
            }
        };
        let accepted = pick_candidate(&candidates, &record.category);
        if accepted.len() > 1 {
            let ids: Vec<&str> = accepted.iter().map(|c| c.id.as_str()).collect();
            log::warn!(
                "{}: {}={value} matches {}; using the first",
                record.primary_code(),
                property.pid(),
                ids.join(", ")
            );
        }
        if let Some(first) = accepted.first() {
            return Some(first.id.clone());
        }
    }
    None
}

/// Look up a knowledge-base ID for every record without one, then strip IDs
/// that ended up shared.
pub fn assign_knowledge_base_ids(
    store: &mut RecordStore,
    config: &EngineConfig,
    kb: &mut dyn KnowledgeBase,
    checkpoint: &mut dyn Checkpoint,
) -> Result<StepReport, ReconError> {
    let mut report = StepReport::new("wikidata-ids");
    let targets = store.select(|r| !r.knowledge_base_id.is_present());
    report.summary.examined = targets.len();

    for batch in targets.chunks(config.chunk()) {
        report.summary.batches += 1;
        let mut changed = false;
        for code in batch {
            let Some(record) = store.get(code) else {
                continue;
            };
            let Some(id) = lookup_id(kb, config, record, &mut report) else {
                log::info!("{}: no knowledge-base entry", record.label());
                report.unresolved.push(code.to_string());
                continue;
            };
            let patch = Patch { knowledge_base_id: Some(id), ..Patch::default() };
            changed |= apply(store, code, &patch, Origin::KnowledgeBase, &mut report);
        }
        checkpoint_if(changed, store, checkpoint)?;
    }

    let duplicates = resolve_duplicates(store);
    checkpoint_if(duplicates.changed(), store, checkpoint)?;
    report.duplicates = Some(duplicates);

    log::info!("{}", report.headline());
    Ok(report)
}

fn wants_details(record: &Record) -> bool {
    !record.coordinates.is_present()
        || !record.postal_code.is_present()
        || !record.wikipedia.is_present()
        || !record.osm_reference.is_present()
        || !record.names.en.is_present()
        || !record.names.ru.is_present()
        || !record.names.pl.is_present()
}

/// Fill missing fields of records with a knowledge-base ID from bulk details.
pub fn fill_from_knowledge_base(
    store: &mut RecordStore,
    config: &EngineConfig,
    kb: &mut dyn KnowledgeBase,
    checkpoint: &mut dyn Checkpoint,
) -> Result<StepReport, ReconError> {
    let mut report = StepReport::new("wikidata-details");
    let mut order: Vec<String> = Vec::new();
    for record in store.all().filter(|r| wants_details(r)) {
        if let Some(id) = record.knowledge_base_id.as_ref().filter(|v| v.is_present()) {
            let id = id.trim().to_string();
            if !order.contains(&id) {
                order.push(id);
            }
        }
    }
    report.summary.examined = order.len();

    for batch in order.chunks(config.chunk()) {
        report.summary.batches += 1;
        let details = match config.retry.run("wikidata entities", || kb.details(batch)) {
            Ok(details) => details,
            Err(err) => {
                log::warn!("skipping batch of {} entities: {err}", batch.len());
                report.summary.skipped_batches += 1;
                continue;
            }
        };
        let by_id: HashMap<&str, _> = details.iter().map(|d| (d.id.as_str(), d)).collect();

        let mut changed = false;
        for id in batch {
            let Some(detail) = by_id.get(id.as_str()) else {
                report.unresolved.push(id.clone());
                continue;
            };
            let Some(code) = first_match(store, SecondaryKey::KnowledgeBaseId, id, &mut report) else {
                continue;
            };
            changed |= apply(store, &code, &detail.to_patch(), Origin::KnowledgeBase, &mut report);
        }
        checkpoint_if(changed, store, checkpoint)?;
    }

    log::info!("{}", report.headline());
    Ok(report)
}
