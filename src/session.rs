use serde::Serialize;

use crate::error::{BookError, BookResult};
use crate::models::{Contact, ContactId, EventId, ParticipantStatus};
use crate::store::Store;

/// State of one open "manage event" view.
///
/// Selected contacts wait as pending until confirmed; only confirmed
/// participants are stored on the event. Pending selections live only as
/// long as the session and are never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSession {
    event: EventId,
    pending: Vec<ContactId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionEntry {
    pub contact: Contact,
    pub status: ParticipantStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub event: EventId,
    /// Confirmed participants first, then pending ones.
    pub participants: Vec<SessionEntry>,
    /// Contacts neither confirmed nor pending.
    pub candidates: Vec<Contact>,
}

impl EventSession {
    pub fn open(store: &Store, event: EventId) -> BookResult<Self> {
        if store.event(event).is_none() {
            return Err(BookError::NotFound(format!("event {event}")));
        }
        Ok(Self {
            event,
            pending: vec![],
        })
    }

    pub fn pending(&self) -> &[ContactId] {
        &self.pending
    }

    pub fn status(&self, store: &Store, contact: ContactId) -> Option<ParticipantStatus> {
        let event = store.event(self.event)?;
        if event.has_participant(contact) {
            Some(ParticipantStatus::Confirmed)
        } else if self.pending.contains(&contact) {
            Some(ParticipantStatus::Pending)
        } else {
            None
        }
    }

    /// Marks a contact as pending. Returns `false` when it is already
    /// pending or confirmed.
    pub fn select(&mut self, store: &Store, contact: ContactId) -> BookResult<bool> {
        if store.contact(contact).is_none() {
            return Err(BookError::NotFound(format!("contact {contact}")));
        }
        if self.status(store, contact).is_some() {
            return Ok(false);
        }
        if store.event(self.event).is_none() {
            return Err(BookError::NotFound(format!("event {}", self.event)));
        }
        self.pending.push(contact);
        Ok(true)
    }

    /// Moves a pending contact onto the event. No-op for anyone not pending.
    /// The selection stays pending when the event cannot take it.
    pub fn confirm(&mut self, store: &mut Store, contact: ContactId) -> BookResult<bool> {
        if !self.pending.contains(&contact) {
            return Ok(false);
        }
        let added = store.add_participant(self.event, contact)?;
        self.pending.retain(|p| *p != contact);
        Ok(added)
    }

    /// Drops a contact from both the pending list and the event.
    pub fn remove(&mut self, store: &mut Store, contact: ContactId) -> BookResult<bool> {
        let before = self.pending.len();
        self.pending.retain(|p| *p != contact);
        let was_participant = store.remove_participant(self.event, contact)?;
        Ok(was_participant || self.pending.len() != before)
    }

    /// Renders the session, forgetting pending contacts that were deleted or
    /// confirmed elsewhere in the meantime.
    pub fn view(&mut self, store: &Store) -> BookResult<SessionView> {
        let event = store
            .event(self.event)
            .ok_or_else(|| BookError::NotFound(format!("event {}", self.event)))?;
        self.pending
            .retain(|p| store.contact(*p).is_some() && !event.has_participant(*p));

        let confirmed = event
            .participants
            .iter()
            .filter_map(|p| store.contact(*p))
            .map(|c| SessionEntry {
                contact: c.clone(),
                status: ParticipantStatus::Confirmed,
            });
        let pending = self
            .pending
            .iter()
            .filter_map(|p| store.contact(*p))
            .map(|c| SessionEntry {
                contact: c.clone(),
                status: ParticipantStatus::Pending,
            });
        let participants = confirmed.chain(pending).collect();

        let candidates = store
            .contacts()
            .iter()
            .filter(|c| !event.has_participant(c.id) && !self.pending.contains(&c.id))
            .cloned()
            .collect();

        Ok(SessionView {
            event: self.event,
            participants,
            candidates,
        })
    }
}
