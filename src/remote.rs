//! Remote file store adapter.
//!
//! A hosted file-content API standing in for a database: files are fetched
//! and overwritten whole, by path. Each `put` carries the version token of
//! the file it replaces (or none when creating it). All calls block, so they
//! must run on a blocking thread when used from async code.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid remote content: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content: Vec<u8>,
    /// Opaque token identifying this revision of the file.
    pub version: String,
}

pub trait RemoteStore: Send + Sync {
    /// `Ok(None)` when the file does not exist.
    fn get(&self, path: &str) -> Result<Option<RemoteFile>, RemoteError>;

    fn put(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        previous_version: Option<&str>,
    ) -> Result<(), RemoteError>;
}

impl<T: RemoteStore + ?Sized> RemoteStore for Arc<T> {
    fn get(&self, path: &str) -> Result<Option<RemoteFile>, RemoteError> {
        (**self).get(path)
    }

    fn put(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        previous_version: Option<&str>,
    ) -> Result<(), RemoteError> {
        (**self).put(path, content, message, previous_version)
    }
}

/// GitHub repository contents API.
#[derive(Debug, Clone)]
pub struct GithubContents {
    api_base: String,
    repo: String,
    token: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
}

#[derive(Serialize)]
struct PutRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

impl GithubContents {
    pub fn new(
        api_base: impl Into<String>,
        repo: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            repo: repo.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.api_base,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    fn client() -> Result<reqwest::blocking::Client, RemoteError> {
        Ok(reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("contactbook/", env!("CARGO_PKG_VERSION")))
            .build()?)
    }
}

impl RemoteStore for GithubContents {
    fn get(&self, path: &str) -> Result<Option<RemoteFile>, RemoteError> {
        debug!("remote get {}", path);
        let response = Self::client()?
            .get(self.url(path))
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .send()?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response)?;
        let body: ContentsResponse = response.json()?;
        Ok(Some(RemoteFile {
            content: decode_content(&body.content)?,
            version: body.sha,
        }))
    }

    fn put(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        previous_version: Option<&str>,
    ) -> Result<(), RemoteError> {
        debug!("remote put {} ({} bytes)", path, content.len());
        let request = PutRequest {
            message,
            content: STANDARD.encode(content),
            sha: previous_version,
        };
        let response = Self::client()?
            .put(self.url(path))
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .json(&request)
            .send()?;
        check_status(response)?;
        Ok(())
    }
}

fn check_status(
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

/// The contents API wraps base64 payloads across lines.
fn decode_content(encoded: &str) -> Result<Vec<u8>, RemoteError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_content_ignores_line_breaks() {
        let encoded = STANDARD.encode(br#"{"contacts": [], "events": [], "groups": []}"#);
        let (head, tail) = encoded.split_at(20);
        let wrapped = format!("{head}\n{tail}\n");

        let decoded = decode_content(&wrapped).unwrap();
        assert_eq!(decoded, br#"{"contacts": [], "events": [], "groups": []}"#);
    }

    #[test]
    fn decode_content_rejects_garbage() {
        assert!(matches!(
            decode_content("@@not base64@@"),
            Err(RemoteError::Decode(_))
        ));
    }

    #[test]
    fn url_joins_base_repo_and_path() {
        let remote = GithubContents::new("https://api.github.com/", "owner/people", "t");
        assert_eq!(
            remote.url("/DATA/users.json"),
            "https://api.github.com/repos/owner/people/contents/DATA/users.json"
        );
    }
}
