//! Wikidata: SPARQL for ID lookups, `wbgetentities` for bulk details.

use serde_json::Value;
use uaplaces_config::Settings;
use uaplaces_recon::record::{Coordinates, OsmRef};
use uaplaces_recon::source::{KbCandidate, KbDetails, KbProperty, KnowledgeBase, SourceError};

use super::common::{parse_endpoint, text_of, HttpClient};
use crate::CliError;

/// Candidates returned per lookup.
const LOOKUP_LIMIT: usize = 10;

pub struct WikidataClient {
    client: HttpClient,
    sparql: String,
    api: String,
}

impl WikidataClient {
    pub fn new(settings: &Settings) -> Result<Self, CliError> {
        Ok(Self {
            client: HttpClient::new("wikidata", &settings.fetch)?,
            sparql: parse_endpoint("wikidata_sparql", &settings.endpoints.wikidata_sparql)?,
            api: parse_endpoint("wikidata_api", &settings.endpoints.wikidata_api)?,
        })
    }
}

impl KnowledgeBase for WikidataClient {
    fn lookup(&mut self, property: KbProperty, value: &str) -> Result<Vec<KbCandidate>, SourceError> {
        let query = lookup_query(property, value);
        let body = self
            .client
            .get_json(&self.sparql, &[("query", query.as_str()), ("format", "json")])?;
        parse_bindings(&body)
    }

    fn details(&mut self, ids: &[String]) -> Result<Vec<KbDetails>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids.join("|");
        let body = self.client.get_json(
            &self.api,
            &[("action", "wbgetentities"), ("ids", joined.as_str()), ("format", "json")],
        )?;
        parse_entities(&body)
    }
}

// ── SPARQL ──────────────────────────────────────────────────────────

/// Both lookups return the item's instance-of classes, one row per class.
pub(crate) fn lookup_query(property: KbProperty, value: &str) -> String {
    let value = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "SELECT (STRAFTER(STR(?item), \"entity/\") AS ?itemID) (STRAFTER(STR(?instanceOf), \"entity/\") AS ?P31_ID) WHERE {{\n  ?item wdt:{} \"{value}\".\n  ?item wdt:P31 ?instanceOf .\n}}\nLIMIT {LOOKUP_LIMIT}",
        property.pid()
    )
}

fn binding<'a>(row: &'a Value, name: &str) -> Option<&'a Value> {
    row.get(name).and_then(|b| b.get("value"))
}

pub(crate) fn parse_bindings(body: &Value) -> Result<Vec<KbCandidate>, SourceError> {
    let rows = body
        .pointer("/results/bindings")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::permanent("wikidata", "SPARQL response has no results.bindings"))?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let id = text_of(binding(row, "itemID"))
                .or_else(|| text_of(binding(row, "item")).and_then(|url| url.rsplit('/').next().map(str::to_string)))?;
            Some(KbCandidate { id, instance_of: text_of(binding(row, "P31_ID")) })
        })
        .collect())
}

// ── wbgetentities ───────────────────────────────────────────────────

/// First statement value of `property`.
fn claim<'a>(entity: &'a Value, property: &str) -> Option<&'a Value> {
    entity
        .get("claims")?
        .get(property)?
        .get(0)?
        .pointer("/mainsnak/datavalue/value")
}

fn label(entity: &Value, language: &str) -> Option<String> {
    text_of(entity.get("labels")?.get(language)?.get("value"))
}

pub(crate) fn parse_entities(body: &Value) -> Result<Vec<KbDetails>, SourceError> {
    let entities = body
        .get("entities")
        .and_then(Value::as_object)
        .ok_or_else(|| SourceError::permanent("wikidata", "response has no entities object"))?;

    let mut details = Vec::new();
    for (id, entity) in entities {
        if entity.get("missing").is_some() {
            log::info!("{id}: no such wikidata entity");
            continue;
        }
        let mut detail = KbDetails { id: id.clone(), ..KbDetails::default() };

        detail.wikipedia = text_of(entity.pointer("/sitelinks/ukwiki/title")).map(|t| format!("uk:{t}"));
        detail.coordinates = claim(entity, "P625").and_then(|v| {
            Some(Coordinates {
                lon: v.get("longitude")?.as_f64()?,
                lat: v.get("latitude")?.as_f64()?,
            })
        });
        detail.postal_code = text_of(claim(entity, "P281"));
        detail.names.en = label(entity, "en");
        detail.names.ru = label(entity, "ru");
        detail.names.pl = label(entity, "pl");
        // P402 is a relation id, with or without the prefix
        detail.osm_reference = text_of(claim(entity, "P402")).and_then(|v| {
            let digits = v.strip_prefix('r').unwrap_or(&v);
            digits.parse().ok().map(OsmRef::relation)
        });

        details.push(detail);
    }
    Ok(details)
}
