use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::category::{Category, Kind};
use crate::code::AdministrativeCode;

// ---------------------------------------------------------------------------
// Field names
// ---------------------------------------------------------------------------

pub mod field {
    pub const PRIMARY_CODE: &str = "primary_code";
    pub const NAME: &str = "name";
    pub const CATEGORY: &str = "category";
    pub const PARENT_CODE: &str = "parent_code";
    pub const OBLAST_NAME: &str = "oblast_name";
    pub const DISTRICT_NAME: &str = "district_name";
    pub const HROMADA_NAME: &str = "hromada_name";
    pub const LEGACY_CODE: &str = "legacy_code";
    pub const KNOWLEDGE_BASE_ID: &str = "knowledge_base_id";
    pub const OSM_REFERENCE: &str = "osm_reference";
    pub const POSTAL_CODE: &str = "postal_code";
    pub const COORDINATES: &str = "coordinates";
    pub const POPULATION: &str = "population";
    pub const AREA: &str = "area";
    pub const NAME_EN: &str = "name:en";
    pub const NAME_RU: &str = "name:ru";
    pub const NAME_PL: &str = "name:pl";
    pub const WIKIPEDIA: &str = "wikipedia";
    pub const OLD_NAME: &str = "old_name";
    pub const HROMADA_CENTER: &str = "hromada_center";

    /// Names owned by typed fields; never stored in the extension map.
    pub const KNOWN: [&str; 20] = [
        PRIMARY_CODE,
        NAME,
        CATEGORY,
        PARENT_CODE,
        OBLAST_NAME,
        DISTRICT_NAME,
        HROMADA_NAME,
        LEGACY_CODE,
        KNOWLEDGE_BASE_ID,
        OSM_REFERENCE,
        POSTAL_CODE,
        COORDINATES,
        POPULATION,
        AREA,
        NAME_EN,
        NAME_RU,
        NAME_PL,
        WIKIPEDIA,
        OLD_NAME,
        HROMADA_CENTER,
    ];

    pub fn is_known(name: &str) -> bool {
        KNOWN.contains(&name)
    }
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// "Set" means non-empty: empty strings, nulls and zeros never count.
pub trait Presence {
    fn is_present(&self) -> bool;
}

impl Presence for String {
    fn is_present(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl Presence for u64 {
    fn is_present(&self) -> bool {
        *self != 0
    }
}

impl Presence for f64 {
    fn is_present(&self) -> bool {
        self.is_finite() && *self != 0.0
    }
}

impl Presence for Value {
    fn is_present(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(_) => true,
            Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            Value::String(s) => s.is_present(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }
}

impl<T: Presence> Presence for Option<T> {
    fn is_present(&self) -> bool {
        self.as_ref().map(|v| v.is_present()).unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// OSM reference
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    /// Overpass element keyword.
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }

    pub fn is_aggregate(&self) -> bool {
        !matches!(self, Self::Node)
    }

    /// Element kind to search for a record of the given kind.
    pub fn for_kind(kind: Kind) -> Self {
        match kind {
            Kind::Region => Self::Relation,
            Kind::Point => Self::Node,
        }
    }
}

/// OpenStreetMap entity reference. Ways and relations carry a `w`/`r`
/// prefix in string form; nodes are bare (an `n` prefix is accepted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OsmRef {
    pub element: ElementKind,
    pub id: u64,
}

impl OsmRef {
    pub fn node(id: u64) -> Self {
        Self { element: ElementKind::Node, id }
    }

    pub fn way(id: u64) -> Self {
        Self { element: ElementKind::Way, id }
    }

    pub fn relation(id: u64) -> Self {
        Self { element: ElementKind::Relation, id }
    }

    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let (element, digits) = match input.chars().next()? {
            'w' | 'W' => (ElementKind::Way, &input[1..]),
            'r' | 'R' => (ElementKind::Relation, &input[1..]),
            'n' | 'N' => (ElementKind::Node, &input[1..]),
            _ => (ElementKind::Node, input),
        };
        let id = digits.parse::<u64>().ok()?;
        Some(Self { element, id })
    }

    pub fn is_aggregate(&self) -> bool {
        self.element.is_aggregate()
    }

    /// Whether a record of `kind` may carry this reference: points take
    /// nodes, regions take ways and relations.
    pub fn fits(&self, kind: Kind) -> bool {
        match kind {
            Kind::Point => !self.is_aggregate(),
            Kind::Region => self.is_aggregate(),
        }
    }
}

impl std::fmt::Display for OsmRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.element {
            ElementKind::Node => write!(f, "{}", self.id),
            ElementKind::Way => write!(f, "w{}", self.id),
            ElementKind::Relation => write!(f, "r{}", self.id),
        }
    }
}

impl Presence for OsmRef {
    fn is_present(&self) -> bool {
        self.id != 0
    }
}

impl Serialize for OsmRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OsmRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let text = match &raw {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => return Err(serde::de::Error::custom(format!("invalid OSM reference {other}"))),
        };
        OsmRef::parse(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid OSM reference '{text}'")))
    }
}

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// Point location, persisted as `[lon, lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinates {
    pub lon: f64,
    pub lat: f64,
}

impl From<[f64; 2]> for Coordinates {
    fn from(pair: [f64; 2]) -> Self {
        Self { lon: pair[0], lat: pair[1] }
    }
}

impl From<Coordinates> for [f64; 2] {
    fn from(c: Coordinates) -> Self {
        [c.lon, c.lat]
    }
}

impl Presence for Coordinates {
    fn is_present(&self) -> bool {
        self.lon.is_present() || self.lat.is_present()
    }
}

// ---------------------------------------------------------------------------
// Lenient numbers
// ---------------------------------------------------------------------------

/// OSM tags and older collections store figures as strings ("12 345").
fn de_lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Some(Value::String(s)) => parse_count(&s),
        Some(other) => {
            return Err(serde::de::Error::custom(format!("invalid count {other}")));
        }
    })
}

fn de_lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => parse_measure(&s),
        Some(other) => {
            return Err(serde::de::Error::custom(format!("invalid measure {other}")));
        }
    })
}

/// Parse a population-like count, ignoring digit-group separators.
pub fn parse_count(input: &str) -> Option<u64> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',' && *c != '\u{a0}')
        .collect();
    digits.parse().ok()
}

/// Parse an area figure; accepts a decimal comma.
pub fn parse_measure(input: &str) -> Option<f64> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse().ok()
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One administrative unit or settlement.
///
/// Known fields are typed; anything else read from the collection lands in
/// `extra` and is written back untouched. A known optional field holding
/// `null` reads as absent and is omitted on write, so the first save after
/// such a load drops it. `primary_code` is fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    primary_code: AdministrativeCode,
    pub name: String,
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_code: Option<AdministrativeCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oblast_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hromada_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osm_reference: Option<OsmRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default, deserialize_with = "de_lenient_u64", skip_serializing_if = "Option::is_none")]
    pub population: Option<u64>,
    #[serde(default, deserialize_with = "de_lenient_f64", skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
    #[serde(flatten)]
    pub names: LocaleNames,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wikipedia: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hromada_center: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Locale variants of a name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocaleNames {
    #[serde(rename = "name:en", default, skip_serializing_if = "Option::is_none")]
    pub en: Option<String>,
    #[serde(rename = "name:ru", default, skip_serializing_if = "Option::is_none")]
    pub ru: Option<String>,
    #[serde(rename = "name:pl", default, skip_serializing_if = "Option::is_none")]
    pub pl: Option<String>,
}

impl LocaleNames {
    pub fn is_empty(&self) -> bool {
        !self.en.is_present() && !self.ru.is_present() && !self.pl.is_present()
    }
}

impl Record {
    pub fn new(primary_code: AdministrativeCode, name: impl Into<String>, category: Category) -> Self {
        Self {
            primary_code,
            name: name.into(),
            category,
            parent_code: None,
            oblast_name: None,
            district_name: None,
            hromada_name: None,
            legacy_code: None,
            knowledge_base_id: None,
            osm_reference: None,
            postal_code: None,
            coordinates: None,
            population: None,
            area: None,
            names: LocaleNames::default(),
            wikipedia: None,
            old_name: None,
            hromada_center: None,
            extra: Map::new(),
        }
    }

    pub fn primary_code(&self) -> &AdministrativeCode {
        &self.primary_code
    }

    /// The KATOTTH code external sources know this record by.
    pub fn leaf_code(&self) -> &str {
        self.primary_code.leaf()
    }

    pub fn kind(&self) -> Kind {
        self.category.kind()
    }

    pub fn admin_level(&self) -> u8 {
        self.category.admin_level()
    }

    /// Short `code name` label for log lines.
    pub fn label(&self) -> String {
        format!("{} {}", self.primary_code, self.name)
    }
}

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// Normalized partial record produced by an external source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    pub legacy_code: Option<String>,
    pub knowledge_base_id: Option<String>,
    pub osm_reference: Option<OsmRef>,
    pub postal_code: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub population: Option<u64>,
    pub area: Option<f64>,
    pub names: LocaleNames,
    pub wikipedia: Option<String>,
    pub old_name: Option<String>,
    pub hromada_center: Option<String>,
    pub extra: Map<String, Value>,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        !self.legacy_code.is_present()
            && !self.knowledge_base_id.is_present()
            && !self.osm_reference.is_present()
            && !self.postal_code.is_present()
            && !self.coordinates.is_present()
            && !self.population.is_present()
            && !self.area.is_present()
            && self.names.is_empty()
            && !self.wikipedia.is_present()
            && !self.old_name.is_present()
            && !self.hromada_center.is_present()
            && !self.extra.values().any(|v| v.is_present())
    }
}
