// Pipeline steps: load the collection, run one engine step, save.

use std::path::Path;

use clap::ValueEnum;
use serde::Serialize;
use uaplaces_config::Settings;
use uaplaces_io::csv::{read_classifier, read_comparison_table, read_places};
use uaplaces_io::geojson::{
    annotate_communities, annotate_districts, load_boundary_maps, merge_previous_communities, FeatureCollection,
};
use uaplaces_io::{load_collection, load_or_empty, save_collection, IoError, JsonCheckpoint};
use uaplaces_recon::hierarchy::import_classifier;
use uaplaces_recon::reconcile::{
    apply_decentralization, apply_legacy_codes, apply_places, assign_knowledge_base_ids,
    fill_from_knowledge_base, locate_by_reference, match_by_katotth, match_by_knowledge_base,
};
use uaplaces_recon::source::RetryPolicy;
use uaplaces_recon::{check, ConsistencyReport, EngineConfig, Kind, RecordStore, StepReport};

use crate::fetch::{DecentralizationClient, OverpassClient, WikidataClient};
use crate::CliError;

// ============================================================================
// Steps
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    Generate,
    MapKoatuu,
    AddPlaces,
    OsmLocations,
    OsmRegions,
    OsmSettlements,
    Decentralization,
    Wikidata,
}

impl Step {
    /// Run order.
    pub const ALL: [Step; 8] = [
        Step::Generate,
        Step::MapKoatuu,
        Step::AddPlaces,
        Step::OsmLocations,
        Step::OsmRegions,
        Step::OsmSettlements,
        Step::Decentralization,
        Step::Wikidata,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Step::Generate => "generate",
            Step::MapKoatuu => "map-koatuu",
            Step::AddPlaces => "add-places",
            Step::OsmLocations => "osm-locations",
            Step::OsmRegions => "osm-regions",
            Step::OsmSettlements => "osm-settlements",
            Step::Decentralization => "decentralization",
            Step::Wikidata => "wikidata",
        }
    }

    /// Steps from `first` to the end, in run order.
    pub fn resume_from(first: Step) -> impl Iterator<Item = Step> {
        Step::ALL.into_iter().skip_while(move |s| *s != first)
    }
}

pub fn engine_config(settings: &Settings) -> EngineConfig {
    EngineConfig {
        batch_size: settings.fetch.batch_size,
        retry: RetryPolicy {
            max_retries: settings.fetch.max_retries,
            delay: settings.fetch.retry_delay(),
        },
    }
}

/// Run one step against the configured collection.
pub fn run_step(step: Step, settings: &Settings) -> Result<Vec<StepReport>, CliError> {
    log::info!("{}...", step.name());
    match step {
        Step::Generate => generate(settings).map(|r| vec![r]),
        Step::MapKoatuu => map_koatuu(settings).map(|r| vec![r]),
        Step::AddPlaces => add_places(settings).map(|r| r.into_iter().collect()),
        Step::OsmLocations => osm_locations(settings).map(|r| vec![r]),
        Step::OsmRegions => osm_regions(settings).map(|r| vec![r]),
        Step::OsmSettlements => osm_settlements(settings),
        Step::Decentralization => decentralization(settings).map(|r| vec![r]),
        Step::Wikidata => wikidata(settings),
    }
}

// ----------------------------------------------------------------------------
// Local tables
// ----------------------------------------------------------------------------

fn generate(settings: &Settings) -> Result<StepReport, CliError> {
    let rows = read_classifier(&settings.paths.classifier).map_err(CliError::input)?;
    let data = &settings.paths.data;
    let mut store = load_or_empty(data).map_err(CliError::collection)?;
    let report = import_classifier(&mut store, &rows);
    log::info!("{}", report.headline());
    save(&store, data)?;
    Ok(report)
}

fn map_koatuu(settings: &Settings) -> Result<StepReport, CliError> {
    let pairs = read_comparison_table(&settings.paths.comparison_table).map_err(CliError::input)?;
    let mut store = load(settings)?;
    let report = apply_legacy_codes(&mut store, &pairs);
    log::info!("{}", report.headline());
    save_if_changed(&store, &report, settings)?;
    Ok(report)
}

/// `None` when the place table is not there; the step is optional.
fn add_places(settings: &Settings) -> Result<Option<StepReport>, CliError> {
    let path = &settings.paths.places;
    if !path.exists() {
        log::warn!("{} not found, skipping add-places", path.display());
        return Ok(None);
    }
    let rows = read_places(path).map_err(CliError::input)?;
    let mut store = load(settings)?;
    let report = apply_places(&mut store, &rows);
    log::info!("{}", report.headline());
    save_if_changed(&store, &report, settings)?;
    Ok(Some(report))
}

// ----------------------------------------------------------------------------
// Remote sources
// ----------------------------------------------------------------------------

fn osm_locations(settings: &Settings) -> Result<StepReport, CliError> {
    let mut osm = OverpassClient::new(settings)?;
    let mut store = load(settings)?;
    let mut checkpoint = JsonCheckpoint::new(&settings.paths.data);
    let report = locate_by_reference(&mut store, &engine_config(settings), &mut osm, &mut checkpoint)
        .map_err(CliError::engine)?;
    save_if_changed(&store, &report, settings)?;
    Ok(report)
}

fn osm_regions(settings: &Settings) -> Result<StepReport, CliError> {
    let mut osm = OverpassClient::new(settings)?;
    let mut store = load(settings)?;
    let mut checkpoint = JsonCheckpoint::new(&settings.paths.data);
    let report = match_by_katotth(&mut store, &engine_config(settings), &mut osm, Kind::Region, &mut checkpoint)
        .map_err(CliError::engine)?;
    save_if_changed(&store, &report, settings)?;
    Ok(report)
}

/// KATOTTH node lookups first, then the knowledge-base fallback for records
/// still without a reference.
fn osm_settlements(settings: &Settings) -> Result<Vec<StepReport>, CliError> {
    let mut osm = OverpassClient::new(settings)?;
    let config = engine_config(settings);
    let mut store = load(settings)?;
    let mut checkpoint = JsonCheckpoint::new(&settings.paths.data);

    let by_code = match_by_katotth(&mut store, &config, &mut osm, Kind::Point, &mut checkpoint)
        .map_err(CliError::engine)?;
    let by_kb = match_by_knowledge_base(&mut store, &config, &mut osm, &mut checkpoint).map_err(CliError::engine)?;
    if by_code.changed() || by_kb.changed() {
        save(&store, &settings.paths.data)?;
    }
    Ok(vec![by_code, by_kb])
}

fn decentralization(settings: &Settings) -> Result<StepReport, CliError> {
    let mut source = DecentralizationClient::new(settings)?;
    let mut store = load(settings)?;
    let mut checkpoint = JsonCheckpoint::new(&settings.paths.data);
    let report = apply_decentralization(&mut store, &engine_config(settings), &mut source, &mut checkpoint)
        .map_err(CliError::engine)?;
    save_if_changed(&store, &report, settings)?;
    annotate_community_map(&store, settings)?;
    annotate_district_map(&store, &settings.paths.district_map)?;
    Ok(report)
}

/// Copy district figures into the district boundary map, when there is one.
fn annotate_district_map(store: &RecordStore, path: &Path) -> Result<(), CliError> {
    if !path.exists() {
        log::info!("{} not found, district map not annotated", path.display());
        return Ok(());
    }
    let mut map = FeatureCollection::load(path).map_err(CliError::input)?;
    let touched = annotate_districts(&mut map, store);
    if touched > 0 {
        map.save(path).map_err(CliError::input)?;
    }
    log::info!("district map: {touched} features annotated");
    Ok(())
}

/// Fill the community boundary map from the store, first taking codes and
/// geometry from the previous ADMIN_3 map when there is one.
fn annotate_community_map(store: &RecordStore, settings: &Settings) -> Result<(), CliError> {
    let path = &settings.paths.community_map;
    let previous_path = &settings.paths.previous_community_map;
    let previous = if previous_path.exists() {
        Some(FeatureCollection::load(previous_path).map_err(CliError::input)?)
    } else {
        None
    };

    let mut map = if path.exists() {
        FeatureCollection::load(path).map_err(CliError::input)?
    } else if previous.is_some() {
        FeatureCollection::empty()
    } else {
        log::info!("{} not found, community map not annotated", path.display());
        return Ok(());
    };

    let mut touched = 0;
    if let Some(previous) = &previous {
        let merged = merge_previous_communities(&mut map, previous, store);
        log::info!("community map: {merged} features taken from {}", previous_path.display());
        touched += merged;
    }
    let annotated = annotate_communities(&mut map, store);
    log::info!("community map: {annotated} features annotated");
    touched += annotated;

    if touched > 0 {
        map.save(path).map_err(CliError::input)?;
    }
    Ok(())
}

fn wikidata(settings: &Settings) -> Result<Vec<StepReport>, CliError> {
    let mut kb = WikidataClient::new(settings)?;
    let config = engine_config(settings);
    let mut store = load(settings)?;
    let mut checkpoint = JsonCheckpoint::new(&settings.paths.data);

    let ids = assign_knowledge_base_ids(&mut store, &config, &mut kb, &mut checkpoint).map_err(CliError::engine)?;
    let details = fill_from_knowledge_base(&mut store, &config, &mut kb, &mut checkpoint).map_err(CliError::engine)?;
    if ids.changed() || details.changed() {
        save(&store, &settings.paths.data)?;
    }
    Ok(vec![ids, details])
}

// ----------------------------------------------------------------------------
// Check
// ----------------------------------------------------------------------------

fn existing(path: &Path) -> Option<&Path> {
    if path.exists() {
        Some(path)
    } else {
        log::warn!("{} not found, that level is not checked against a map", path.display());
        None
    }
}

pub fn run_check(settings: &Settings) -> Result<ConsistencyReport, CliError> {
    let paths = &settings.paths;
    let maps = load_boundary_maps(
        existing(&paths.oblast_map),
        existing(&paths.district_map),
        existing(&paths.community_map),
    )
    .map_err(CliError::input)?;
    let mut store = load(settings)?;
    let report = check(&mut store, &maps);
    if report.needs_rewrite() {
        save(&store, &paths.data)?;
    }
    Ok(report)
}

// ----------------------------------------------------------------------------
// run
// ----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub steps: Vec<StepReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<Step>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<ConsistencyReport>,
}

/// Run `first` and every later step. A failing step stops the run; the
/// consistency check runs either way. The step error wins over a check
/// error.
pub fn run_all(first: Step, settings: &Settings) -> (RunSummary, Result<(), CliError>) {
    let mut summary = RunSummary { steps: Vec::new(), failed_step: None, check: None };
    let mut outcome = Ok(());

    for step in Step::resume_from(first) {
        match run_step(step, settings) {
            Ok(reports) => summary.steps.extend(reports),
            Err(err) => {
                log::error!("{} failed: {}", step.name(), err.message);
                summary.failed_step = Some(step);
                outcome = Err(err);
                break;
            }
        }
    }

    match run_check(settings) {
        Ok(report) => summary.check = Some(report),
        Err(err) => {
            log::error!("check failed: {}", err.message);
            if outcome.is_ok() {
                outcome = Err(err);
            }
        }
    }
    (summary, outcome)
}

// ----------------------------------------------------------------------------
// Collection I/O
// ----------------------------------------------------------------------------

fn load(settings: &Settings) -> Result<RecordStore, CliError> {
    load_collection(&settings.paths.data).map_err(|e| {
        let missing = matches!(e, IoError::Read { .. }) && !settings.paths.data.exists();
        let err = CliError::collection(e);
        if missing {
            err.with_hint("run `uaplaces generate` first")
        } else {
            err
        }
    })
}

fn save(store: &RecordStore, path: &Path) -> Result<(), CliError> {
    save_collection(store, path).map_err(CliError::collection)?;
    log::info!("saved {} records to {}", store.len(), path.display());
    Ok(())
}

fn save_if_changed(store: &RecordStore, report: &StepReport, settings: &Settings) -> Result<(), CliError> {
    if report.changed() {
        save(store, &settings.paths.data)?;
    }
    Ok(())
}
