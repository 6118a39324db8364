use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use serde::Serialize;

use crate::category::Category;
use crate::code::AdministrativeCode;
use crate::error::ReconError;
use crate::record::{field, Presence, Record};

// ---------------------------------------------------------------------------
// Secondary keys
// ---------------------------------------------------------------------------

/// Non-primary identifiers a record can be looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryKey {
    /// KATOTTH code as known outside the hierarchy (last code segment).
    Leaf,
    LegacyCode,
    KnowledgeBaseId,
    OsmReference,
}

impl SecondaryKey {
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Leaf => "katotth",
            Self::LegacyCode => field::LEGACY_CODE,
            Self::KnowledgeBaseId => field::KNOWLEDGE_BASE_ID,
            Self::OsmReference => field::OSM_REFERENCE,
        }
    }

    /// The record's value for this key, when set.
    pub fn value_of(&self, record: &Record) -> Option<String> {
        match self {
            Self::Leaf => Some(record.leaf_code().to_string()),
            Self::LegacyCode => record.legacy_code.clone().filter(|v| v.is_present()),
            Self::KnowledgeBaseId => record.knowledge_base_id.clone().filter(|v| v.is_present()),
            Self::OsmReference => record
                .osm_reference
                .filter(|r| r.is_present())
                .map(|r| r.to_string()),
        }
    }
}

impl std::fmt::Display for SecondaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.field_name())
    }
}

/// Keys with an index maintained across record edits. `Leaf` is indexed on
/// insert only, since primary codes never change.
const INDEXED: [SecondaryKey; 2] = [SecondaryKey::LegacyCode, SecondaryKey::KnowledgeBaseId];

fn indexed_values(record: &Record) -> [Option<String>; 2] {
    INDEXED.map(|key| key.value_of(record))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Created,
    Updated,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// In-memory record collection in classifier import order.
#[derive(Debug, Default, Clone)]
pub struct RecordStore {
    records: Vec<Record>,
    by_code: HashMap<AdministrativeCode, usize>,
    by_leaf: HashMap<String, Vec<usize>>,
    by_legacy_code: HashMap<String, Vec<usize>>,
    by_knowledge_base_id: HashMap<String, Vec<usize>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<Record>) -> Result<Self, ReconError> {
        let mut store = Self::new();
        for record in records {
            if store.by_code.contains_key(record.primary_code()) {
                return Err(ReconError::DuplicatePrimaryCode(record.primary_code().to_string()));
            }
            store.push(record);
        }
        Ok(store)
    }

    /// Parse a persisted collection (a JSON array of flat objects).
    pub fn from_json(input: &str) -> Result<Self, ReconError> {
        let records: Vec<Record> =
            serde_json::from_str(input).map_err(|e| ReconError::CollectionParse(e.to_string()))?;
        Self::from_records(records)
    }

    /// Indented JSON with non-ASCII text written literally.
    pub fn to_json(&self) -> Result<String, ReconError> {
        serde_json::to_string_pretty(&self.records).map_err(|e| ReconError::Serialize(e.to_string()))
    }

    fn push(&mut self, record: Record) -> usize {
        let idx = self.records.len();
        self.by_code.insert(record.primary_code().clone(), idx);
        self.by_leaf
            .entry(record.leaf_code().to_string())
            .or_default()
            .push(idx);
        for (key, value) in INDEXED.into_iter().zip(indexed_values(&record)) {
            self.link(key, value, idx);
        }
        self.records.push(record);
        idx
    }

    fn index(&self, key: SecondaryKey) -> Option<&HashMap<String, Vec<usize>>> {
        match key {
            SecondaryKey::Leaf => Some(&self.by_leaf),
            SecondaryKey::LegacyCode => Some(&self.by_legacy_code),
            SecondaryKey::KnowledgeBaseId => Some(&self.by_knowledge_base_id),
            SecondaryKey::OsmReference => None,
        }
    }

    fn index_mut(&mut self, key: SecondaryKey) -> Option<&mut HashMap<String, Vec<usize>>> {
        match key {
            SecondaryKey::LegacyCode => Some(&mut self.by_legacy_code),
            SecondaryKey::KnowledgeBaseId => Some(&mut self.by_knowledge_base_id),
            SecondaryKey::Leaf | SecondaryKey::OsmReference => None,
        }
    }

    /// Slots stay sorted so lookups return store order.
    fn link(&mut self, key: SecondaryKey, value: Option<String>, idx: usize) {
        let (Some(value), Some(index)) = (value, self.index_mut(key)) else {
            return;
        };
        let slots = index.entry(value).or_default();
        if let Err(pos) = slots.binary_search(&idx) {
            slots.insert(pos, idx);
        }
    }

    fn unlink(&mut self, key: SecondaryKey, value: Option<String>, idx: usize) {
        let (Some(value), Some(index)) = (value, self.index_mut(key)) else {
            return;
        };
        if let Some(slots) = index.get_mut(&value) {
            slots.retain(|&i| i != idx);
            if slots.is_empty() {
                index.remove(&value);
            }
        }
    }

    fn reindex(&mut self, idx: usize, before: [Option<String>; 2]) {
        let after = indexed_values(&self.records[idx]);
        for ((key, old), new) in INDEXED.into_iter().zip(before).zip(after) {
            if old != new {
                self.unlink(key, old, idx);
                self.link(key, new, idx);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, code: &AdministrativeCode) -> bool {
        self.by_code.contains_key(code)
    }

    pub fn get(&self, code: &AdministrativeCode) -> Option<&Record> {
        self.by_code.get(code).map(|&i| &self.records[i])
    }

    /// Edit a record in place. Secondary indexes catch up when the returned
    /// handle is dropped.
    pub fn get_mut(&mut self, code: &AdministrativeCode) -> Option<RecordMut<'_>> {
        let idx = *self.by_code.get(code)?;
        let before = indexed_values(&self.records[idx]);
        Some(RecordMut { store: self, idx, before })
    }

    /// Find the record for `code`, creating it with `category` and an empty
    /// name when absent, then hand it to `apply`.
    pub fn upsert<F>(&mut self, code: &AdministrativeCode, category: Category, apply: F) -> Upserted
    where
        F: FnOnce(&mut Record),
    {
        let (idx, outcome) = match self.by_code.get(code) {
            Some(&i) => (i, Upserted::Updated),
            None => (
                self.push(Record::new(code.clone(), String::new(), category)),
                Upserted::Created,
            ),
        };
        let before = indexed_values(&self.records[idx]);
        apply(&mut self.records[idx]);
        self.reindex(idx, before);
        outcome
    }

    /// Every record whose `key` equals `value`, in store order.
    pub fn find_by(&self, key: SecondaryKey, value: &str) -> Vec<&Record> {
        if let Some(index) = self.index(key) {
            return index
                .get(value)
                .map(|ids| ids.iter().map(|&i| &self.records[i]).collect())
                .unwrap_or_default();
        }
        self.records
            .iter()
            .filter(|r| key.value_of(r).as_deref() == Some(value))
            .collect()
    }

    /// Primary codes of every record whose `key` equals `value`.
    pub fn codes_by(&self, key: SecondaryKey, value: &str) -> Vec<AdministrativeCode> {
        self.find_by(key, value)
            .into_iter()
            .map(|r| r.primary_code().clone())
            .collect()
    }

    /// All records in insertion order. Each call starts a fresh pass.
    pub fn all(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Primary codes of the records matching `pred`, in store order.
    pub fn select<P>(&self, pred: P) -> Vec<AdministrativeCode>
    where
        P: Fn(&Record) -> bool,
    {
        self.records
            .iter()
            .filter(|r| pred(r))
            .map(|r| r.primary_code().clone())
            .collect()
    }
}

/// Mutable handle returned by [`RecordStore::get_mut`].
pub struct RecordMut<'a> {
    store: &'a mut RecordStore,
    idx: usize,
    before: [Option<String>; 2],
}

impl Deref for RecordMut<'_> {
    type Target = Record;

    fn deref(&self) -> &Record {
        &self.store.records[self.idx]
    }
}

impl DerefMut for RecordMut<'_> {
    fn deref_mut(&mut self) -> &mut Record {
        &mut self.store.records[self.idx]
    }
}

impl Drop for RecordMut<'_> {
    fn drop(&mut self) {
        let before = std::mem::take(&mut self.before);
        self.store.reindex(self.idx, before);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::OsmRef;

    fn code(s: &str) -> AdministrativeCode {
        AdministrativeCode::parse(s).unwrap()
    }

    fn store() -> RecordStore {
        let mut store = RecordStore::new();
        store.upsert(&code("UA01"), Category::Oblast, |r| r.name = "Одеська".into());
        store.upsert(&code("UA01/UA0102"), Category::District, |r| {
            r.name = "Ізмаїльський".into();
            r.legacy_code = Some("5122000000".into());
        });
        store.upsert(&code("UA01/UA0102/UA0102003"), Category::Community, |r| {
            r.name = "Ізмаїльська".into();
            r.legacy_code = Some("5122000000".into());
            r.osm_reference = Some(OsmRef::relation(9));
        });
        store
    }

    #[test]
    fn upsert_creates_then_updates() {
        let mut store = store();
        assert_eq!(store.len(), 3);
        let outcome = store.upsert(&code("UA01"), Category::Oblast, |r| r.name = "Odesa".into());
        assert_eq!(outcome, Upserted::Updated);
        assert_eq!(store.len(), 3);
        assert_eq!(store.get(&code("UA01")).unwrap().name, "Odesa");
    }

    #[test]
    fn all_preserves_insertion_order_and_restarts() {
        let store = store();
        let first: Vec<_> = store.all().map(|r| r.primary_code().to_string()).collect();
        let second: Vec<_> = store.all().map(|r| r.primary_code().to_string()).collect();
        assert_eq!(first, vec!["UA01", "UA01/UA0102", "UA01/UA0102/UA0102003"]);
        assert_eq!(first, second);
    }

    #[test]
    fn find_by_secondary_keys() {
        let store = store();
        assert_eq!(store.find_by(SecondaryKey::LegacyCode, "5122000000").len(), 2);
        assert_eq!(store.find_by(SecondaryKey::Leaf, "UA0102").len(), 1);
        assert_eq!(store.find_by(SecondaryKey::OsmReference, "r9").len(), 1);
        assert!(store.find_by(SecondaryKey::KnowledgeBaseId, "Q1").is_empty());
    }

    #[test]
    fn indexes_follow_edits() {
        let mut store = store();
        store.get_mut(&code("UA01/UA0102")).unwrap().legacy_code = Some("5122100000".into());
        store.get_mut(&code("UA01")).unwrap().knowledge_base_id = Some("Q1".into());
        store.upsert(&code("UA01/UA0102/UA0102003"), Category::Community, |r| {
            r.knowledge_base_id = Some("Q1".into());
        });

        assert_eq!(store.codes_by(SecondaryKey::LegacyCode, "5122000000"), vec![code("UA01/UA0102/UA0102003")]);
        assert_eq!(store.codes_by(SecondaryKey::LegacyCode, "5122100000"), vec![code("UA01/UA0102")]);
        assert_eq!(
            store.codes_by(SecondaryKey::KnowledgeBaseId, "Q1"),
            vec![code("UA01"), code("UA01/UA0102/UA0102003")]
        );

        store.get_mut(&code("UA01")).unwrap().knowledge_base_id.take();
        assert_eq!(store.codes_by(SecondaryKey::KnowledgeBaseId, "Q1"), vec![code("UA01/UA0102/UA0102003")]);
        // Blank values are not indexed
        store.get_mut(&code("UA01/UA0102")).unwrap().legacy_code = Some(" ".into());
        assert!(store.find_by(SecondaryKey::LegacyCode, " ").is_empty());
    }

    #[test]
    fn json_round_trip() {
        let store = store();
        let json = store.to_json().unwrap();
        assert!(json.contains("Ізмаїльська"));
        assert!(json.starts_with("[\n  {"));
        let back = RecordStore::from_json(&json).unwrap();
        assert_eq!(back.to_json().unwrap(), json);
    }

    #[test]
    fn duplicate_primary_code_is_rejected() {
        let json = r#"[{"primary_code":"01","name":"a","category":"O"},{"primary_code":"01","name":"b","category":"O"}]"#;
        let err = RecordStore::from_json(json).unwrap_err();
        assert!(err.to_string().contains("duplicate primary code"));
    }

    #[test]
    fn unknown_category_loads_and_round_trips() {
        let json = "[\n  {\n    \"primary_code\": \"UA01\",\n    \"name\": \"Одеська\",\n    \"category\": \"Ю\"\n  }\n]";
        let store = RecordStore::from_json(json).unwrap();
        let record = store.get(&code("UA01")).unwrap();
        assert_eq!(record.category, Category::Unknown("Ю".into()));
        assert_eq!(record.category.to_string(), "Невідомий тип");
        assert_eq!(store.to_json().unwrap(), json);
    }

    #[test]
    fn malformed_collection_is_an_error() {
        assert!(matches!(
            RecordStore::from_json("{not json"),
            Err(ReconError::CollectionParse(_))
        ));
    }
}
