//! decentralization.ua GraphQL API: communities, districts (`regions`) and
//! oblasts (`areas`).

use serde_json::Value;
use uaplaces_config::Settings;
use uaplaces_recon::record::{parse_count, parse_measure};
use uaplaces_recon::source::{
    AggregateFigures, CommunityFigures, DecentralizationData, DecentralizationSource, SourceError,
};

use super::common::{parse_endpoint, text_of, HttpClient};
use crate::CliError;

const COMMUNITIES_QUERY: &str =
    "{communities{title,id,area_id,region_id,population,square,center,koatuu,katottg}}";
const DISTRICTS_QUERY: &str = "{regions{title,area_id,id,population,square}}";
const OBLASTS_QUERY: &str = "{areas{title,id,square,population}}";

/// Kyiv and Sevastopol appear as one pseudo-community under this code.
const SKIPPED_COMMUNITY: &str = "UA80000000000093317";

pub struct DecentralizationClient {
    client: HttpClient,
    endpoint: String,
}

impl DecentralizationClient {
    pub fn new(settings: &Settings) -> Result<Self, CliError> {
        Ok(Self {
            client: HttpClient::new("decentralization", &settings.fetch)?,
            endpoint: parse_endpoint("decentralization", &settings.endpoints.decentralization)?,
        })
    }

    fn list(&self, query: &str, field: &str) -> Result<Vec<Value>, SourceError> {
        let body = self.client.post_json(&self.endpoint, &[("query", query)])?;
        list_of(&body, field)
    }
}

impl DecentralizationSource for DecentralizationClient {
    fn fetch(&mut self) -> Result<DecentralizationData, SourceError> {
        let communities = self.list(COMMUNITIES_QUERY, "communities")?;
        let districts = self.list(DISTRICTS_QUERY, "regions")?;
        let oblasts = self.list(OBLASTS_QUERY, "areas")?;
        let data = DecentralizationData {
            communities: communities.iter().filter_map(parse_community).collect(),
            districts: districts.iter().filter_map(parse_aggregate).collect(),
            oblasts: oblasts.iter().filter_map(parse_aggregate).collect(),
        };
        log::info!(
            "decentralization: {} communities, {} districts, {} oblasts",
            data.communities.len(),
            data.districts.len(),
            data.oblasts.len()
        );
        Ok(data)
    }
}

pub(crate) fn list_of(body: &Value, field: &str) -> Result<Vec<Value>, SourceError> {
    if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
        return Err(SourceError::permanent("decentralization", format!("{field}: {errors}")));
    }
    body.get("data")
        .and_then(|d| d.get(field))
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| SourceError::permanent("decentralization", format!("response has no data.{field}")))
}

fn count_of(value: Option<&Value>) -> Option<u64> {
    match value? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        other => text_of(Some(other)).and_then(|s| parse_count(&s)),
    }
}

fn measure_of(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        other => text_of(Some(other)).and_then(|s| parse_measure(&s)),
    }
}

pub(crate) fn parse_community(item: &Value) -> Option<CommunityFigures> {
    let id = text_of(item.get("id"))?;
    let katotth = text_of(item.get("katottg"));
    if katotth.as_deref() == Some(SKIPPED_COMMUNITY) {
        return None;
    }
    Some(CommunityFigures {
        id,
        katotth,
        population: count_of(item.get("population")),
        area: measure_of(item.get("square")),
        center: text_of(item.get("center")),
        district_ref: text_of(item.get("region_id")),
        oblast_ref: text_of(item.get("area_id")),
    })
}

pub(crate) fn parse_aggregate(item: &Value) -> Option<AggregateFigures> {
    Some(AggregateFigures {
        id: text_of(item.get("id"))?,
        population: count_of(item.get("population")),
        area: measure_of(item.get("square")),
    })
}
