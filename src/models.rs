use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

entity_id!(ContactId);
entity_id!(EventId);
entity_id!(GroupId);

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub phone: String,
    pub email: String,
    /// Name of the group this contact belongs to, empty when unaffiliated.
    pub group: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    /// Free-form `DD/MM/YYYY`.
    pub date: String,
    /// Free-form `HH:MM`.
    pub time: String,
    pub location: String,
    /// Ordered, never holds the same contact twice.
    pub participants: Vec<ContactId>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub members: Vec<ContactId>,
}

impl Contact {
    pub fn in_group(&self) -> bool {
        !self.group.is_empty()
    }
}

impl Event {
    pub fn has_participant(&self, contact: ContactId) -> bool {
        self.participants.contains(&contact)
    }
}

impl Group {
    pub fn has_member(&self, contact: ContactId) -> bool {
        self.members.contains(&contact)
    }
}

/// State of a contact inside an open event-management session.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Pending,
    Confirmed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ContactInput {
    pub name: String,
    pub phone: String,
    pub email: String,
    pub group: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct EventInput {
    pub title: String,
    pub date: String,
    pub time: String,
    pub location: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct GroupInput {
    pub name: String,
    pub description: String,
}

impl ContactInput {
    pub fn new(
        name: impl Into<String>,
        phone: impl Into<String>,
        email: impl Into<String>,
        group: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: email.into(),
            group: group.into(),
        }
    }
}

impl EventInput {
    pub fn new(
        title: impl Into<String>,
        date: impl Into<String>,
        time: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            date: date.into(),
            time: time.into(),
            location: location.into(),
        }
    }
}

impl GroupInput {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub group: Group,
    pub member_contacts: Vec<Contact>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EventDetail {
    #[serde(flatten)]
    pub event: Event,
    pub participant_contacts: Vec<Contact>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
}
