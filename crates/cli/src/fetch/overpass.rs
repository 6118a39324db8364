//! OpenStreetMap through the Overpass API.
//!
//! Queries go out as `GET <endpoint>?data=<overpass QL>`; answers are the
//! `elements` array of an `[out:json]` response.

use serde_json::Value;
use uaplaces_config::Settings;
use uaplaces_recon::record::{parse_count, Coordinates, ElementKind, OsmRef};
use uaplaces_recon::source::{OsmEntity, OsmProperty, OsmSource, SourceError};

use super::common::{parse_endpoint, text_of, HttpClient};
use crate::CliError;

pub struct OverpassClient {
    client: HttpClient,
    endpoint: String,
}

impl OverpassClient {
    pub fn new(settings: &Settings) -> Result<Self, CliError> {
        Ok(Self {
            client: HttpClient::new("overpass", &settings.fetch)?,
            endpoint: parse_endpoint("overpass", &settings.endpoints.overpass)?,
        })
    }

    fn run(&self, query: &str) -> Result<Vec<OsmEntity>, SourceError> {
        log::debug!("{} query: {query}", self.client.source_name());
        let body = self.client.get_json(&self.endpoint, &[("data", query)])?;
        parse_elements(&body)
    }
}

impl OsmSource for OverpassClient {
    fn nodes_by_id(&mut self, ids: &[u64]) -> Result<Vec<OsmEntity>, SourceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.run(&node_query(ids))
    }

    fn find_by_property(
        &mut self,
        property: OsmProperty,
        values: &[String],
        element: ElementKind,
    ) -> Result<Vec<OsmEntity>, SourceError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }
        self.run(&property_query(property, values, element))
    }
}

// ── Query building ──────────────────────────────────────────────────

pub(crate) fn node_query(ids: &[u64]) -> String {
    let ids: Vec<String> = ids.iter().map(u64::to_string).collect();
    format!("[out:json];\nnode(id:{});\nout;", ids.join(","))
}

pub(crate) fn property_query(property: OsmProperty, values: &[String], element: ElementKind) -> String {
    let clauses: Vec<String> = values
        .iter()
        .map(|v| format!("{}['{}'='{}'];", element.keyword(), property.tag(), escape(v)))
        .collect();
    format!("[out:json];\n(\n{}\n);\nout;", clauses.join("\n"))
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

// ── Response parsing ────────────────────────────────────────────────

pub(crate) fn parse_elements(body: &Value) -> Result<Vec<OsmEntity>, SourceError> {
    let elements = body
        .get("elements")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::permanent("overpass", "response has no elements array"))?;
    Ok(elements.iter().filter_map(parse_element).collect())
}

fn parse_element(element: &Value) -> Option<OsmEntity> {
    let id = element.get("id").and_then(Value::as_u64)?;
    let reference = match element.get("type").and_then(Value::as_str)? {
        "node" => OsmRef::node(id),
        "way" => OsmRef::way(id),
        "relation" => OsmRef::relation(id),
        other => {
            log::warn!("ignoring overpass element {id} of type '{other}'");
            return None;
        }
    };

    let mut entity = OsmEntity::new(reference);
    if let (Some(lat), Some(lon)) = (
        element.get("lat").and_then(Value::as_f64),
        element.get("lon").and_then(Value::as_f64),
    ) {
        entity.coordinates = Some(Coordinates { lon, lat });
    }

    let Some(tags) = element.get("tags") else {
        return Some(entity);
    };
    let tag = |key: &str| text_of(tags.get(key));

    entity.old_name = tag("old_name");
    entity.postal_code = tag("postal_code");
    entity.knowledge_base_id = tag("wikidata");
    entity.wikipedia = tag("wikipedia:uk")
        .map(|title| if title.starts_with("uk:") { title } else { format!("uk:{title}") })
        .or_else(|| tag("wikipedia").filter(|w| w.starts_with("uk:")));
    entity.population = tag("population").and_then(|p| parse_count(&p));
    entity.katotth = tag("katotth");
    entity.names.en = tag("name:en");
    entity.names.ru = tag("name:ru");
    entity.names.pl = tag("name:pl");
    Some(entity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    use crate::fetch::common::test_settings;

    fn client(server: &MockServer) -> OverpassClient {
        OverpassClient {
            client: HttpClient::new("overpass", &test_settings()).unwrap(),
            endpoint: server.url("/api/interpreter"),
        }
    }

    #[test]
    fn test_node_query_lists_ids() {
        assert_eq!(node_query(&[1, 22]), "[out:json];\nnode(id:1,22);\nout;");
    }

    #[test]
    fn test_property_query_one_clause_per_value() {
        let query = property_query(
            OsmProperty::Katotth,
            &["UA01".to_string(), "UA02".to_string()],
            ElementKind::Relation,
        );
        assert_eq!(
            query,
            "[out:json];\n(\nrelation['katotth'='UA01'];\nrelation['katotth'='UA02'];\n);\nout;"
        );
        let quoted = property_query(OsmProperty::Wikidata, &["Q1'".to_string()], ElementKind::Node);
        assert!(quoted.contains("node['wikidata'='Q1\\''];"));
    }

    #[test]
    fn test_element_tags_are_normalized() {
        let body = json!({
            "elements": [
                {
                    "type": "node", "id": 337, "lat": 45.35, "lon": 28.84,
                    "tags": {
                        "postal_code": "68600", "wikidata": "Q156744",
                        "wikipedia": "en:Izmail", "wikipedia:uk": "Ізмаїл",
                        "population": "69 534", "katotth": "UA51060030010011183",
                        "name:en": "Izmail", "old_name": "Тучков"
                    }
                },
                {"type": "relation", "id": 71, "tags": {"wikipedia": "uk:Одеська область"}},
                {"type": "way", "id": 5, "tags": {"wikipedia": "ru:Что-то"}},
                {"type": "area", "id": 9},
                {"type": "node"}
            ]
        });
        let entities = parse_elements(&body).unwrap();
        assert_eq!(entities.len(), 3);

        let izmail = &entities[0];
        assert_eq!(izmail.reference, OsmRef::node(337));
        assert_eq!(izmail.coordinates, Some(Coordinates { lon: 28.84, lat: 45.35 }));
        assert_eq!(izmail.wikipedia.as_deref(), Some("uk:Ізмаїл"));
        assert_eq!(izmail.population, Some(69_534));
        assert_eq!(izmail.names.en.as_deref(), Some("Izmail"));
        assert_eq!(izmail.names.ru, None);
        assert_eq!(izmail.old_name.as_deref(), Some("Тучков"));

        assert_eq!(entities[1].reference, OsmRef::relation(71));
        assert_eq!(entities[1].coordinates, None);
        assert_eq!(entities[1].wikipedia.as_deref(), Some("uk:Одеська область"));
        assert_eq!(entities[2].wikipedia, None);
    }

    #[test]
    fn test_missing_elements_is_an_error() {
        let err = parse_elements(&json!({"remark": "runtime error"})).unwrap_err();
        assert!(!err.retryable);
    }

    #[test]
    fn test_nodes_by_id_round_trip() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/interpreter")
                .query_param("data", "[out:json];\nnode(id:337);\nout;");
            then.status(200).json_body(json!({
                "elements": [{"type": "node", "id": 337, "lat": 45.35, "lon": 28.84}]
            }));
        });

        let mut osm = client(&server);
        let entities = osm.nodes_by_id(&[337]).unwrap();
        mock.assert();
        assert_eq!(entities.len(), 1);
        assert!(osm.nodes_by_id(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_gateway_timeout_is_retryable() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/interpreter");
            then.status(504);
        });

        let mut osm = client(&server);
        let err = osm
            .find_by_property(OsmProperty::Katotth, &["UA51".to_string()], ElementKind::Relation)
            .unwrap_err();
        assert!(err.retryable);
    }

    fn unescape(quoted: &str) -> String {
        let mut out = String::new();
        let mut chars = quoted.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => out.extend(chars.next()),
                c => out.push(c),
            }
        }
        out
    }

    fn config_128() -> proptest::prelude::ProptestConfig {
        proptest::prelude::ProptestConfig {
            cases: std::env::var("PROPTEST_CASES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(128),
            failure_persistence: None,
            ..proptest::prelude::ProptestConfig::default()
        }
    }

    proptest::proptest! {
        #![proptest_config(config_128())]

        /// Quotes and backslashes in values never break a clause apart.
        #[test]
        fn property_query_keeps_one_clause_per_value(values in proptest::collection::vec("[^\n\r]{0,12}", 1..6)) {
            let query = property_query(OsmProperty::Katotth, &values, ElementKind::Node);
            let clauses: Vec<&str> = query.lines().filter(|l| l.starts_with("node['katotth'='")).collect();
            proptest::prop_assert_eq!(clauses.len(), values.len());
            for (clause, value) in clauses.iter().zip(&values) {
                let body = &clause["node['katotth'='".len()..clause.len() - "'];".len()];
                proptest::prop_assert_eq!(unescape(body), value.clone());
            }
        }
    }
}
