//! JSON document codec for the contact book.
//!
//! The document has three top-level arrays: `contacts`, `events` and
//! `groups`. Cross references are written as contact names, with parallel
//! id arrays alongside. Reading resolves a reference by id when one is
//! present and known, and falls back to the first contact with that name.
//! References that resolve to nothing are dropped.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::BookResult;
use crate::models::{Contact, ContactId, Event, EventId, Group, GroupId};
use crate::store::Store;

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct Document {
    #[serde(default)]
    pub contacts: Vec<ContactRecord>,
    #[serde(default)]
    pub events: Vec<EventRecord>,
    #[serde(default)]
    pub groups: Vec<GroupRecord>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ContactRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ContactId>,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub group: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct EventRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,
    pub title: String,
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participant_ids: Vec<ContactId>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<GroupId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub member_ids: Vec<ContactId>,
}

/// Builds a full snapshot of the store.
pub fn serialize(store: &Store) -> Document {
    let name_of = |id: &ContactId| store.contact(*id).map(|c| c.name.clone());

    let contacts = store
        .contacts()
        .iter()
        .map(|c| ContactRecord {
            id: Some(c.id),
            name: c.name.clone(),
            phone: c.phone.clone(),
            email: c.email.clone(),
            group: c.group.clone(),
        })
        .collect();

    let events = store
        .events()
        .iter()
        .map(|e| {
            let (participant_ids, participants) = resolved_pairs(&e.participants, name_of);
            EventRecord {
                id: Some(e.id),
                title: e.title.clone(),
                date: e.date.clone(),
                time: e.time.clone(),
                location: e.location.clone(),
                participants,
                participant_ids,
            }
        })
        .collect();

    let groups = store
        .groups()
        .iter()
        .map(|g| {
            let (member_ids, members) = resolved_pairs(&g.members, name_of);
            GroupRecord {
                id: Some(g.id),
                name: g.name.clone(),
                description: g.description.clone(),
                members,
                member_ids,
            }
        })
        .collect();

    Document {
        contacts,
        events,
        groups,
    }
}

/// Rebuilds the store: contacts first, then events, then groups.
///
/// The result is a faithful reconstruction of the document; run
/// [`Store::repair`] afterwards to enforce the membership invariants on
/// documents that were edited by hand.
pub fn deserialize(doc: Document) -> Store {
    let contacts: Vec<Contact> = doc
        .contacts
        .into_iter()
        .map(|r| Contact {
            id: r.id.unwrap_or_default(),
            name: r.name,
            phone: r.phone,
            email: r.email,
            group: r.group,
        })
        .collect();

    let events = doc
        .events
        .into_iter()
        .map(|r| {
            let participants =
                resolve_references(&contacts, &r.participants, &r.participant_ids, &r.title);
            Event {
                id: r.id.unwrap_or_default(),
                title: r.title,
                date: r.date,
                time: r.time,
                location: r.location,
                participants,
            }
        })
        .collect();

    let groups = doc
        .groups
        .into_iter()
        .map(|r| {
            let members = resolve_references(&contacts, &r.members, &r.member_ids, &r.name);
            Group {
                id: r.id.unwrap_or_default(),
                name: r.name,
                description: r.description,
                members,
            }
        })
        .collect();

    Store::from_parts(contacts, events, groups)
}

pub fn to_json(doc: &Document) -> BookResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(doc)?)
}

pub fn from_json(bytes: &[u8]) -> BookResult<Document> {
    Ok(serde_json::from_slice(bytes)?)
}

fn resolved_pairs(
    ids: &[ContactId],
    name_of: impl Fn(&ContactId) -> Option<String>,
) -> (Vec<ContactId>, Vec<String>) {
    ids.iter()
        .filter_map(|id| name_of(id).map(|name| (*id, name)))
        .unzip()
}

fn resolve_references(
    contacts: &[Contact],
    names: &[String],
    ids: &[ContactId],
    owner: &str,
) -> Vec<ContactId> {
    let mut resolved = Vec::with_capacity(names.len());
    let mut seen = HashSet::new();

    for (i, name) in names.iter().enumerate() {
        let by_id = ids
            .get(i)
            .and_then(|id| contacts.iter().find(|c| c.id == *id));
        let found = by_id.or_else(|| contacts.iter().find(|c| &c.name == name));
        match found {
            Some(contact) => {
                if seen.insert(contact.id) {
                    resolved.push(contact.id);
                }
            }
            None => warn!("dropping reference to unknown contact `{}` in `{}`", name, owner),
        }
    }

    resolved
}
