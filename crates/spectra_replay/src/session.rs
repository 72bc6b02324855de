//! Session loading.
//!
//! A session is read once per id: first from an optional directory of
//! bundled `<id>.json` payloads, then from `GET {base}/api/sessions/{id}/replay`.
//! The bundled lookup is a shortcut only; any failure there falls through to
//! the network read.

use crate::error::SessionLoadError;
use crate::event::SessionPayload;
use reqwest::{Client, Url};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where sessions are read from.
#[derive(Clone, Debug, PartialEq)]
pub struct LoaderConfig {
    /// Base URL of the session API.
    pub base_url: String,
    /// Directory of bundled `<id>.json` payloads tried before the network.
    pub bundled_dir: Option<PathBuf>,
    /// Request timeout.
    pub timeout: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            bundled_dir: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl LoaderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_bundled_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bundled_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Reads session payloads. Cheap to clone; clones share one HTTP client.
#[derive(Clone, Debug)]
pub struct SessionLoader {
    client: Client,
    config: LoaderConfig,
}

impl SessionLoader {
    pub fn new(config: LoaderConfig) -> Result<Self, SessionLoadError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The replay URL for `session_id`, with the id escaped as one path segment.
    pub fn replay_url(&self, session_id: &str) -> Result<Url, SessionLoadError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|err| SessionLoadError::InvalidUrl(format!("{}: {err}", self.config.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| SessionLoadError::InvalidUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(["api", "sessions", session_id, "replay"]);
        Ok(url)
    }

    /// Read the payload for `session_id`.
    pub async fn fetch(&self, session_id: &str) -> Result<SessionPayload, SessionLoadError> {
        if let Some(payload) = self.fetch_bundled(session_id).await {
            return Ok(payload);
        }

        let url = self.replay_url(session_id)?;
        tracing::debug!("Fetching session {} from {}", session_id, url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionLoadError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let payload = SessionPayload::from_slice(&body)?;
        tracing::info!(
            "Loaded session {} ({} events) from the network",
            session_id,
            payload.events.len()
        );
        Ok(payload)
    }

    async fn fetch_bundled(&self, session_id: &str) -> Option<SessionPayload> {
        let dir = self.config.bundled_dir.as_deref()?;
        let path = bundled_path(dir, session_id)?;

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::debug!("No bundled session at {}: {}", path.display(), err);
                return None;
            }
        };

        match SessionPayload::from_slice(&bytes) {
            Ok(payload) => {
                tracing::info!(
                    "Loaded session {} ({} events) from {}",
                    session_id,
                    payload.events.len(),
                    path.display()
                );
                Some(payload)
            }
            Err(err) => {
                tracing::debug!("Ignoring unreadable bundled session {}: {}", path.display(), err);
                None
            }
        }
    }
}

/// `<dir>/<id>.json`, if `id` is a single plain path component.
fn bundled_path(dir: &Path, session_id: &str) -> Option<PathBuf> {
    let safe = !session_id.is_empty()
        && session_id != "."
        && session_id != ".."
        && !session_id.contains(['/', '\\', '\0']);
    if !safe {
        tracing::debug!("Session id {:?} is not usable as a file name", session_id);
        return None;
    }
    Some(dir.join(format!("{session_id}.json")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RawEvent;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn loader(base_url: &str) -> SessionLoader {
        SessionLoader::new(LoaderConfig::new(base_url)).unwrap()
    }

    #[test]
    fn test_replay_url_escapes_id() {
        let loader = loader("http://localhost:3000/");
        assert_eq!(
            loader.replay_url("abc").unwrap().as_str(),
            "http://localhost:3000/api/sessions/abc/replay"
        );
        assert_eq!(
            loader.replay_url("a/b").unwrap().as_str(),
            "http://localhost:3000/api/sessions/a%2Fb/replay"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let loader = loader("not a url");
        assert!(matches!(
            loader.replay_url("abc"),
            Err(SessionLoadError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_from_server() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sessions/s-1/replay"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "events": [{ "timestamp": 1, "type": 2 }, "{\"timestamp\":5}"],
                "metadata": { "sessionId": "s-1" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let payload = loader(&server.uri()).fetch("s-1").await.unwrap();

        assert_eq!(payload.events.len(), 2);
        assert!(matches!(payload.events[1], RawEvent::Encoded(_)));
        assert_eq!(
            payload.metadata.and_then(|m| m.session_id).as_deref(),
            Some("s-1")
        );
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = loader(&server.uri()).fetch("missing").await.unwrap_err();

        assert!(matches!(err, SessionLoadError::Status(404)));
        assert_eq!(err.user_message(), "session could not be loaded");
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = loader(&server.uri()).fetch("s").await.unwrap_err();
        assert!(matches!(err, SessionLoadError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_bundled_session_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("demo.json"),
            json!({ "events": [{ "timestamp": 3 }] }).to_string(),
        )
        .unwrap();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let config = LoaderConfig::new(server.uri()).with_bundled_dir(dir.path());
        let payload = SessionLoader::new(config)
            .unwrap()
            .fetch("demo")
            .await
            .unwrap();

        assert_eq!(payload.events.len(), 1);
    }

    #[tokio::test]
    async fn test_bundled_failure_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ nope").unwrap();

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/sessions/broken/replay"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "events": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let config = LoaderConfig::new(server.uri()).with_bundled_dir(dir.path());
        let payload = SessionLoader::new(config)
            .unwrap()
            .fetch("broken")
            .await
            .unwrap();

        assert!(payload.events.is_empty());
    }

    #[test]
    fn test_bundled_path_rejects_traversal() {
        let dir = Path::new("/sessions");
        assert_eq!(bundled_path(dir, "abc"), Some(PathBuf::from("/sessions/abc.json")));
        assert_eq!(bundled_path(dir, "../etc/passwd"), None);
        assert_eq!(bundled_path(dir, ".."), None);
        assert_eq!(bundled_path(dir, ""), None);
    }
}
