//! Account directory kept on the remote store.
//!
//! `users.json` maps each username to `{password, created_at}`, and every
//! account owns `<user>/data.json`. Passwords are compared as stored. Any
//! remote failure denies the operation.

use std::collections::BTreeMap;

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::codec::{self, Document};
use crate::persistence::RemoteDataFile;
use crate::remote::{RemoteError, RemoteStore};

pub const USERS_FILE: &str = "users.json";
pub const DATA_FILE: &str = "data.json";

/// Layout of the timestamps already found in `users.json`.
const CREATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountRecord {
    pub password: String,
    /// Kept verbatim; other clients write it in their own formats.
    #[serde(default)]
    pub created_at: Option<String>,
}

pub type Accounts = BTreeMap<String, AccountRecord>;

#[derive(Debug, Clone)]
pub struct AccountDirectory<R> {
    remote: R,
    folder: String,
}

impl<R: RemoteStore + Clone> AccountDirectory<R> {
    pub fn new(remote: R, folder: impl Into<String>) -> Self {
        Self {
            remote,
            folder: folder.into().trim_matches('/').to_string(),
        }
    }

    pub fn users_path(&self) -> String {
        self.join(USERS_FILE)
    }

    pub fn data_path(&self, username: &str) -> String {
        self.join(&format!("{username}/{DATA_FILE}"))
    }

    /// The per-account document as a persistence backend.
    pub fn data_file(&self, username: &str) -> RemoteDataFile<R> {
        RemoteDataFile::new(self.remote.clone(), self.data_path(username))
    }

    pub fn login(&self, username: &str, password: &str) -> bool {
        match self.try_login(username, password) {
            Ok(true) => {
                info!("login accepted for `{}`", username);
                true
            }
            Ok(false) => {
                warn!("login denied for `{}`", username);
                false
            }
            Err(err) => {
                warn!("login denied for `{}`: {}", username, err);
                false
            }
        }
    }

    /// Creates the account and an empty document for it. Denied when the
    /// name is taken or invalid.
    pub fn register(&self, username: &str, password: &str) -> bool {
        match self.try_register(username, password) {
            Ok(true) => {
                info!("registered `{}`", username);
                true
            }
            Ok(false) => {
                warn!("registration denied for `{}`", username);
                false
            }
            Err(err) => {
                warn!("registration denied for `{}`: {}", username, err);
                false
            }
        }
    }

    fn try_login(&self, username: &str, password: &str) -> Result<bool, RemoteError> {
        if !valid_username(username) {
            return Ok(false);
        }
        let (accounts, _) = self.fetch_accounts()?;
        Ok(accounts
            .get(username)
            .is_some_and(|account| account.password == password))
    }

    fn try_register(&self, username: &str, password: &str) -> Result<bool, RemoteError> {
        if !valid_username(username) || password.is_empty() {
            return Ok(false);
        }
        let (mut accounts, version) = self.fetch_accounts()?;
        if accounts.contains_key(username) {
            return Ok(false);
        }
        accounts.insert(
            username.to_string(),
            AccountRecord {
                password: password.to_string(),
                created_at: Some(Local::now().format(CREATED_AT_FORMAT).to_string()),
            },
        );
        let bytes =
            serde_json::to_vec_pretty(&accounts).map_err(|e| RemoteError::Decode(e.to_string()))?;
        self.remote.put(
            &self.users_path(),
            &bytes,
            &format!("Added new user: {username}"),
            version.as_deref(),
        )?;

        // An existing document is kept as is.
        let data_path = self.data_path(username);
        if self.remote.get(&data_path)?.is_none() {
            let empty = codec::to_json(&Document::default())
                .map_err(|e| RemoteError::Decode(e.to_string()))?;
            if let Err(err) = self.remote.put(
                &data_path,
                &empty,
                &format!("Initialize data for user: {username}"),
                None,
            ) {
                warn!("could not initialize {}: {}", data_path, err);
            }
        }
        Ok(true)
    }

    fn fetch_accounts(&self) -> Result<(Accounts, Option<String>), RemoteError> {
        match self.remote.get(&self.users_path())? {
            None => Ok((Accounts::new(), None)),
            Some(file) => {
                let accounts = serde_json::from_slice(&file.content)
                    .map_err(|e| RemoteError::Decode(e.to_string()))?;
                Ok((accounts, Some(file.version)))
            }
        }
    }

    fn join(&self, rest: &str) -> String {
        if self.folder.is_empty() {
            rest.to_string()
        } else {
            format!("{}/{}", self.folder, rest)
        }
    }
}

/// Usernames become path segments on the remote store.
fn valid_username(username: &str) -> bool {
    !username.trim().is_empty()
        && !username.contains('/')
        && !username.contains('\\')
        && !username.contains("..")
}
