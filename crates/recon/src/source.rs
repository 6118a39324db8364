//! Collaborator contracts.
//!
//! The engine never talks to the network or the filesystem. Adapters
//! implement these traits and hand back normalized data; the engine decides
//! what matches and what gets merged.

use std::fmt;
use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::category::Category;
use crate::error::ReconError;
use crate::record::{Coordinates, ElementKind, LocaleNames, OsmRef, Patch};
use crate::store::RecordStore;

// ---------------------------------------------------------------------------
// Errors + retry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    pub source: String,
    pub message: String,
    /// Transient failures (network, timeout, 429, 5xx) are worth retrying.
    pub retryable: bool,
}

impl SourceError {
    pub fn transient(source: &str, message: impl Into<String>) -> Self {
        Self { source: source.into(), message: message.into(), retryable: true }
    }

    pub fn permanent(source: &str, message: impl Into<String>) -> Self {
        Self { source: source.into(), message: message.into(), retryable: false }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.source, self.message)
    }
}

impl std::error::Error for SourceError {}

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, delay: Duration::from_secs(2) }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_retries: 0, delay: Duration::ZERO }
    }

    /// Run `op` until it succeeds, fails permanently, or the retries are
    /// spent. Returns the last error in the latter two cases.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T, SourceError>
    where
        F: FnMut() -> Result<T, SourceError>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.retryable && attempt < self.max_retries => {
                    attempt += 1;
                    log::warn!(
                        "{label}: {err}; retry {attempt}/{} in {:?}",
                        self.max_retries,
                        self.delay
                    );
                    if !self.delay.is_zero() {
                        thread::sleep(self.delay);
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier + tables
// ---------------------------------------------------------------------------

/// One classifier row: five code columns, category letter, name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierRow {
    pub columns: Vec<String>,
    pub category: String,
    pub name: String,
}

impl ClassifierRow {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>, category: &str, name: &str) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            category: category.into(),
            name: name.into(),
        }
    }
}

/// KATOTTH → KOATUU pair from the comparison table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyPair {
    pub katotth: String,
    pub koatuu: String,
}

/// Row of the KATOTTH-keyed place table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceRow {
    pub katotth: String,
    pub osm_reference: Option<String>,
    pub legacy_code: Option<String>,
    pub postal_code: Option<String>,
}

// ---------------------------------------------------------------------------
// OpenStreetMap
// ---------------------------------------------------------------------------

/// Tag an OSM property query filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OsmProperty {
    Katotth,
    Wikidata,
}

impl OsmProperty {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Katotth => "katotth",
            Self::Wikidata => "wikidata",
        }
    }
}

/// Normalized OSM element.
#[derive(Debug, Clone, PartialEq)]
pub struct OsmEntity {
    pub reference: OsmRef,
    pub coordinates: Option<Coordinates>,
    pub postal_code: Option<String>,
    pub knowledge_base_id: Option<String>,
    pub wikipedia: Option<String>,
    pub population: Option<u64>,
    pub katotth: Option<String>,
    pub old_name: Option<String>,
    pub names: LocaleNames,
}

impl OsmEntity {
    pub fn new(reference: OsmRef) -> Self {
        Self {
            reference,
            coordinates: None,
            postal_code: None,
            knowledge_base_id: None,
            wikipedia: None,
            population: None,
            katotth: None,
            old_name: None,
            names: LocaleNames::default(),
        }
    }

    /// The property value this entity answers for.
    pub fn property_value(&self, property: OsmProperty) -> Option<&str> {
        match property {
            OsmProperty::Katotth => self.katotth.as_deref(),
            OsmProperty::Wikidata => self.knowledge_base_id.as_deref(),
        }
    }

    /// Partial record. `with_reference` is false when the record was matched
    /// through its own reference and must not take it from the answer.
    pub fn to_patch(&self, with_reference: bool) -> Patch {
        Patch {
            knowledge_base_id: self.knowledge_base_id.clone(),
            osm_reference: with_reference.then_some(self.reference),
            postal_code: self.postal_code.clone(),
            coordinates: self.coordinates,
            population: self.population,
            names: self.names.clone(),
            wikipedia: self.wikipedia.clone(),
            old_name: self.old_name.clone(),
            ..Patch::default()
        }
    }
}

pub trait OsmSource {
    /// Nodes by numeric id.
    fn nodes_by_id(&mut self, ids: &[u64]) -> Result<Vec<OsmEntity>, SourceError>;

    /// Elements of `element` kind whose `property` tag equals one of `values`.
    fn find_by_property(
        &mut self,
        property: OsmProperty,
        values: &[String],
        element: ElementKind,
    ) -> Result<Vec<OsmEntity>, SourceError>;
}

// ---------------------------------------------------------------------------
// Knowledge base (Wikidata)
// ---------------------------------------------------------------------------

/// Knowledge-base property an ID lookup runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KbProperty {
    /// KATOTTH code (P9435).
    Katotth,
    /// KOATUU code (P1077).
    Koatuu,
}

impl KbProperty {
    pub fn pid(&self) -> &'static str {
        match self {
            Self::Katotth => "P9435",
            Self::Koatuu => "P1077",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KbCandidate {
    pub id: String,
    /// "instance of" class (P31), when the lookup returned one.
    pub instance_of: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KbDetails {
    pub id: String,
    pub coordinates: Option<Coordinates>,
    pub postal_code: Option<String>,
    pub names: LocaleNames,
    pub wikipedia: Option<String>,
    pub osm_reference: Option<OsmRef>,
}

impl KbDetails {
    pub fn to_patch(&self) -> Patch {
        Patch {
            coordinates: self.coordinates,
            postal_code: self.postal_code.clone(),
            names: self.names.clone(),
            wikipedia: self.wikipedia.clone(),
            osm_reference: self.osm_reference,
            ..Patch::default()
        }
    }
}

pub trait KnowledgeBase {
    fn lookup(&mut self, property: KbProperty, value: &str) -> Result<Vec<KbCandidate>, SourceError>;
    fn details(&mut self, ids: &[String]) -> Result<Vec<KbDetails>, SourceError>;
}

/// Whether a knowledge-base class is compatible with a category.
/// `None` means the class is not one the engine knows about.
pub fn class_matches(class: &str, category: &Category) -> Option<bool> {
    let accepted: &[Category] = match class {
        // territorial community
        "Q4414033" | "Q104841013" | "Q21683299" | "Q634099" | "Q27002" => &[Category::Community],
        // village, rural settlement
        "Q2514025" | "Q21672098" | "Q4100864" | "Q15078955" | "Q486972" => {
            &[Category::Village, Category::RuralSettlement]
        }
        // raion
        "Q1267632" => &[Category::District],
        // oblast
        "Q3348196" => &[Category::Oblast],
        // city
        "Q5123999" | "Q12131624" | "Q7930989" => &[Category::Town, Category::City],
        _ => return None,
    };
    Some(accepted.contains(category))
}

// ---------------------------------------------------------------------------
// Decentralization API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommunityFigures {
    pub id: String,
    pub katotth: Option<String>,
    pub population: Option<u64>,
    pub area: Option<f64>,
    pub center: Option<String>,
    pub district_ref: Option<String>,
    pub oblast_ref: Option<String>,
}

/// District or oblast totals as the source reports them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateFigures {
    pub id: String,
    pub population: Option<u64>,
    pub area: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecentralizationData {
    pub communities: Vec<CommunityFigures>,
    pub districts: Vec<AggregateFigures>,
    pub oblasts: Vec<AggregateFigures>,
}

pub trait DecentralizationSource {
    fn fetch(&mut self) -> Result<DecentralizationData, SourceError>;
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Durable write of the collection after a batch.
pub trait Checkpoint {
    fn save(&mut self, store: &RecordStore) -> Result<(), ReconError>;
}

/// Keeps everything in memory; used by callers that save once at the end.
#[derive(Debug, Default)]
pub struct NoCheckpoint;

impl Checkpoint for NoCheckpoint {
    fn save(&mut self, _store: &RecordStore) -> Result<(), ReconError> {
        Ok(())
    }
}
