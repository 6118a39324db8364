// Boundary maps (GeoJSON FeatureCollections used as property stores)

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uaplaces_recon::record::Presence;
use uaplaces_recon::store::SecondaryKey;
use uaplaces_recon::{BoundaryMaps, Category, Record, RecordStore};

use crate::error::IoError;
use crate::json::write_atomic;

/// Property holding a feature's KATOTTH code.
pub const KATOTTH_PROPERTY: &str = "katotth";

/// KATOTTH code property of the pre-2020 ADMIN_3 community map.
pub const PREVIOUS_CODE_PROPERTY: &str = "COD_3";

/// ADMIN_3 properties copied into the community map, old name to new.
const PREVIOUS_PROPERTIES: [(&str, &str); 3] =
    [("ADMIN_1", "oblast_name"), ("ADMIN_2", "district_name"), ("TYPE", "type")];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub properties: Map<String, Value>,
    /// Geometry and anything else is carried through untouched.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl Feature {
    /// Empty feature carrying only its code.
    pub fn with_katotth(katotth: &str) -> Self {
        let mut properties = Map::new();
        properties.insert(KATOTTH_PROPERTY.into(), Value::from(katotth));
        let mut rest = Map::new();
        rest.insert("type".into(), Value::from("Feature"));
        rest.insert("geometry".into(), Value::Null);
        Self { properties, rest }
    }

    pub fn katotth(&self) -> Option<&str> {
        self.text(KATOTTH_PROPERTY)
    }

    /// Non-blank string property.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.properties
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    pub fn has_geometry(&self) -> bool {
        match self.rest.get("geometry") {
            None | Some(Value::Null) => false,
            Some(Value::Object(geometry)) => !geometry.is_empty(),
            Some(_) => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(flatten)]
    pub rest: Map<String, Value>,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn empty() -> Self {
        let mut rest = Map::new();
        rest.insert("type".into(), Value::from("FeatureCollection"));
        Self { rest, features: Vec::new() }
    }

    pub fn from_json(content: &str, path: &Path) -> Result<Self, IoError> {
        serde_json::from_str(content).map_err(|e| IoError::json(path, e))
    }

    pub fn load(path: &Path) -> Result<Self, IoError> {
        let content = std::fs::read_to_string(path).map_err(|e| IoError::read(path, e))?;
        Self::from_json(&content, path)
    }

    pub fn save(&self, path: &Path) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| IoError::json(path, e))?;
        write_atomic(path, json.as_bytes())
    }

    /// KATOTTH codes of every feature that carries one.
    pub fn katotth_set(&self) -> HashSet<String> {
        self.features
            .iter()
            .filter_map(|f| f.katotth().map(str::to_string))
            .collect()
    }
}

/// Load the map at `path` as a membership set; `None` path means unchecked.
fn load_set(path: Option<&Path>) -> Result<Option<HashSet<String>>, IoError> {
    match path {
        Some(path) => Ok(Some(FeatureCollection::load(path)?.katotth_set())),
        None => Ok(None),
    }
}

pub fn load_boundary_maps(
    oblasts: Option<&Path>,
    districts: Option<&Path>,
    communities: Option<&Path>,
) -> Result<BoundaryMaps, IoError> {
    Ok(BoundaryMaps {
        oblasts: load_set(oblasts)?,
        districts: load_set(districts)?,
        communities: load_set(communities)?,
    })
}

fn record_for<'a>(store: &'a RecordStore, katotth: &str, category: Category) -> Option<&'a Record> {
    store
        .find_by(SecondaryKey::Leaf, katotth)
        .into_iter()
        .find(|r| r.category == category)
}

/// Write the record's shared figures into `props`: parent code, population
/// and area.
fn write_figures(props: &mut Map<String, Value>, record: &Record) {
    if let Some(parent) = record.primary_code().parent() {
        props.insert("parent_katotth".into(), Value::from(parent.leaf()));
    }
    if let Some(population) = record.population.filter(|p| p.is_present()) {
        props.insert("population".into(), Value::from(population));
    }
    if let Some(area) = record.area.filter(|a| a.is_present()) {
        props.insert("area".into(), Value::from(area));
    }
}

/// Copy district name, parent code, population and area from the store into
/// the matching features of the district map. Returns the number of features
/// touched.
pub fn annotate_districts(map: &mut FeatureCollection, store: &RecordStore) -> usize {
    let mut touched = 0;
    for feature in &mut map.features {
        let Some(katotth) = feature.katotth().map(str::to_string) else {
            log::warn!("district feature without {KATOTTH_PROPERTY} property");
            continue;
        };
        let Some(record) = record_for(store, &katotth, Category::District) else {
            continue;
        };

        let props = &mut feature.properties;
        let before = props.clone();
        props.insert("name".into(), Value::from(format!("{} район", record.name)));
        write_figures(props, record);
        if *props != before {
            touched += 1;
        }
    }
    touched
}

/// Community counterpart of [`annotate_districts`]; also writes the KOATUU
/// code and the community center.
pub fn annotate_communities(map: &mut FeatureCollection, store: &RecordStore) -> usize {
    let mut touched = 0;
    for feature in &mut map.features {
        let Some(katotth) = feature.katotth().map(str::to_string) else {
            log::warn!("community feature without {KATOTTH_PROPERTY} property");
            continue;
        };
        let Some(record) = record_for(store, &katotth, Category::Community) else {
            log::info!("{katotth}: community map feature has no record");
            continue;
        };

        let props = &mut feature.properties;
        let before = props.clone();
        if record.name.is_present() {
            props.insert("name".into(), Value::from(format!("{} територіальна громада", record.name)));
        }
        write_figures(props, record);
        if let Some(koatuu) = record.legacy_code.as_ref().filter(|v| v.is_present()) {
            props.insert("koatuu".into(), Value::from(koatuu.as_str()));
        }
        if let Some(center) = record.hromada_center.as_ref().filter(|v| v.is_present()) {
            props.insert("hromada_center".into(), Value::from(center.as_str()));
        }
        if *props != before {
            touched += 1;
        }
    }
    touched
}

/// Bring codes, names and geometry over from the previous ADMIN_3 map.
///
/// Every previous feature whose `COD_3` names a community record gets a
/// feature in `map` (added when missing). Geometry is copied only into
/// features without one; oblast, district and type names always follow the
/// previous map. Returns the number of features added or changed.
pub fn merge_previous_communities(
    map: &mut FeatureCollection,
    previous: &FeatureCollection,
    store: &RecordStore,
) -> usize {
    let mut touched = 0;
    for old in &previous.features {
        let Some(katotth) = old.text(PREVIOUS_CODE_PROPERTY) else {
            log::warn!("previous community feature without {PREVIOUS_CODE_PROPERTY} property");
            continue;
        };
        if record_for(store, katotth, Category::Community).is_none() {
            log::warn!("{katotth}: no community record for previous map feature");
            continue;
        }

        let index = match map.features.iter().position(|f| f.katotth() == Some(katotth)) {
            Some(index) => index,
            None => {
                log::info!("{katotth}: added to the community map from the previous map");
                map.features.push(Feature::with_katotth(katotth));
                map.features.len() - 1
            }
        };
        let feature = &mut map.features[index];
        let before = feature.clone();

        if !feature.has_geometry() {
            if let Some(geometry) = old.rest.get("geometry").filter(|_| old.has_geometry()) {
                feature.rest.insert("geometry".into(), geometry.clone());
            }
        }
        for (from, to) in PREVIOUS_PROPERTIES {
            if let Some(value) = old.text(from) {
                feature.properties.insert(to.into(), Value::from(value));
            }
        }
        if *feature != before {
            touched += 1;
        }
    }
    touched
}
