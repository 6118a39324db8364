//! Duplicate-identifier detection and resolution.
//!
//! Groups are rebuilt from the store on every call and never persisted.

use std::collections::HashMap;

use serde::Serialize;

use crate::code::AdministrativeCode;
use crate::store::{RecordStore, SecondaryKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateMember {
    pub code: AdministrativeCode,
    pub name: String,
}

/// Two or more records claiming the same identifier value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub key: SecondaryKey,
    pub value: String,
    pub members: Vec<DuplicateMember>,
}

impl DuplicateGroup {
    pub fn describe(&self) -> String {
        let members: Vec<String> = self
            .members
            .iter()
            .map(|m| format!("{} ({})", m.code, m.name))
            .collect();
        format!("{} {} shared by {}", self.key, self.value, members.join(", "))
    }
}

/// Groups of records sharing a value of `key`, ordered by first occurrence.
pub fn duplicate_groups(store: &RecordStore, key: SecondaryKey) -> Vec<DuplicateGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut seen: HashMap<String, Vec<DuplicateMember>> = HashMap::new();

    for record in store.all() {
        let Some(value) = key.value_of(record) else {
            continue;
        };
        let member = DuplicateMember {
            code: record.primary_code().clone(),
            name: record.name.clone(),
        };
        match seen.get_mut(&value) {
            Some(members) => members.push(member),
            None => {
                order.push(value.clone());
                seen.insert(value, vec![member]);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|value| {
            let members = seen.remove(&value)?;
            (members.len() > 1).then_some(DuplicateGroup { key, value, members })
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateResolution {
    /// Knowledge-base groups; the ID was removed from every member.
    pub knowledge_base: Vec<DuplicateGroup>,
    /// Legacy-code groups; reported only.
    pub legacy_code: Vec<DuplicateGroup>,
    /// Number of records that lost their knowledge-base ID.
    pub cleared: usize,
}

impl DuplicateResolution {
    /// Whether the collection needs rewriting.
    pub fn changed(&self) -> bool {
        self.cleared > 0
    }
}

/// Strip shared knowledge-base IDs from every sharer and log shared legacy
/// codes. A second call on the result finds nothing to do.
pub fn resolve_duplicates(store: &mut RecordStore) -> DuplicateResolution {
    let legacy_code = duplicate_groups(store, SecondaryKey::LegacyCode);
    for group in &legacy_code {
        log::warn!("duplicate {}", group.describe());
    }

    let knowledge_base = duplicate_groups(store, SecondaryKey::KnowledgeBaseId);
    let mut cleared = 0;
    for group in &knowledge_base {
        log::warn!("duplicate {}; removing from all members", group.describe());
        for member in &group.members {
            if let Some(mut record) = store.get_mut(&member.code) {
                if record.knowledge_base_id.take().is_some() {
                    cleared += 1;
                }
            }
        }
    }

    DuplicateResolution { knowledge_base, legacy_code, cleared }
}
