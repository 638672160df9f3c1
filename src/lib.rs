//! Contacts, events and groups with consistent two-way membership links and
//! a JSON document round-trip, stored locally or on a remote file store.

pub mod accounts;
pub mod codec;
pub mod error;
pub mod handlers;
pub mod models;
pub mod persistence;
pub mod remote;
pub mod session;
pub mod store;

pub use codec::Document;
pub use error::{BookError, BookResult};
pub use models::{
    Contact, ContactId, ContactInput, Event, EventId, EventInput, Group, GroupId, GroupInput,
    ParticipantStatus,
};
pub use persistence::{DataStore, LoadStatus, LocalFile, RemoteDataFile};
pub use session::EventSession;
pub use store::{Store, Violation};
