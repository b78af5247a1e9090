//! Remote orchestrator event stream.
//!
//! The orchestrator pushes JSON frames over a websocket.  Each frame only
//! names the resource that changed, so container details are fetched with
//! a follow-up HTTP request against the orchestrator API.

use super::{forward, EventSource, SourceError};
use crate::config::RemoteConfig;
use crate::types::{Action, ContainerDescriptor, ContainerEvent};
use async_trait::async_trait;
use futures_util::stream::StreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

#[derive(Debug, Deserialize)]
struct RemoteMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    action: Option<String>,
    state: Option<String>,
    resource_uri: Option<String>,
}

fn classify(msg: &RemoteMessage) -> Option<Action> {
    let triple = (
        msg.kind.as_deref()?,
        msg.action.as_deref()?,
        msg.state.as_deref()?,
    );
    match triple {
        ("container", "update", "Running") => Some(Action::Start),
        ("container", "update", "Stopped") => Some(Action::Stop),
        ("container", "delete", "Terminated") => Some(Action::Stop),
        _ => None,
    }
}

/// Decodes one stream frame into an action and the URI of the container
/// it concerns.  Anything unrecognised yields `None`.
fn parse_frame(text: &str) -> Option<(Action, String)> {
    let msg: RemoteMessage = serde_json::from_str(text).ok()?;
    let action = classify(&msg)?;
    let uri = msg.resource_uri.filter(|u| !u.is_empty())?;
    Some((action, uri))
}

#[derive(Debug, Deserialize)]
struct EnvVar {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

/// The subset of the orchestrator's container resource we use.
#[derive(Debug, Deserialize)]
struct RemoteContainer {
    name: String,
    #[serde(default)]
    container_envvars: Vec<EnvVar>,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    private_ip: Option<String>,
}

impl RemoteContainer {
    fn into_descriptor(self, domain_suffix: &str) -> ContainerDescriptor {
        let hostname = self
            .hostname
            .filter(|h| !h.is_empty())
            .or(self.private_ip.filter(|ip| !ip.is_empty()))
            .unwrap_or_else(|| format!("{}{}", self.name, domain_suffix));
        let environment = self
            .container_envvars
            .into_iter()
            .map(|var| (var.key, var.value.unwrap_or_default()))
            .collect();
        ContainerDescriptor::new(self.name, environment, hostname)
    }
}

pub struct RemoteSource {
    http: reqwest::Client,
    stream_url: String,
    api_base: String,
    token: Option<String>,
    domain_suffix: String,
}

impl RemoteSource {
    pub fn new(
        stream_url: impl Into<String>,
        api_base: impl Into<String>,
        token: Option<String>,
        domain_suffix: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            stream_url: stream_url.into(),
            api_base: api_base.into(),
            token,
            domain_suffix: domain_suffix.into(),
        }
    }

    pub fn from_config(remote: &RemoteConfig, domain_suffix: &str) -> Result<Self, SourceError> {
        let stream_url = remote
            .stream_url
            .clone()
            .ok_or_else(|| SourceError::InvalidRequest("remote.stream_url is not set".into()))?;
        let api_base = remote
            .api_base
            .clone()
            .ok_or_else(|| SourceError::InvalidRequest("remote.api_base is not set".into()))?;
        Ok(Self::new(stream_url, api_base, remote.token.clone(), domain_suffix))
    }

    fn resource_url(&self, resource_uri: &str) -> String {
        if resource_uri.starts_with("http://") || resource_uri.starts_with("https://") {
            return resource_uri.to_string();
        }
        format!(
            "{}/{}",
            self.api_base.trim_end_matches('/'),
            resource_uri.trim_start_matches('/')
        )
    }

    fn stream_request(&self) -> Result<Request, SourceError> {
        let mut request = self.stream_url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(token)
                .map_err(|e| SourceError::InvalidRequest(format!("bad token: {}", e)))?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
        }
        Ok(request)
    }

    /// Forwards the event described by one text frame, if any.  Frames
    /// that are not a recognised container transition are dropped.
    async fn handle_frame(
        &self,
        text: &str,
        event_tx: &mpsc::Sender<ContainerEvent>,
    ) -> Result<(), SourceError> {
        let Some((action, uri)) = parse_frame(text) else {
            return Ok(());
        };
        debug!("Remote event {:?} for {}", action, uri);

        match self.lookup(&uri).await {
            Ok(container) => forward(event_tx, ContainerEvent { action, container }).await,
            Err(e) => {
                warn!("Failed to look up container {}: {}", uri, e);
                Ok(())
            }
        }
    }

    async fn lookup(&self, resource_uri: &str) -> Result<ContainerDescriptor, SourceError> {
        let mut req = self
            .http
            .get(self.resource_url(resource_uri))
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(token) = &self.token {
            req = req.header(reqwest::header::AUTHORIZATION, token);
        }
        let container: RemoteContainer = req.send().await?.error_for_status()?.json().await?;
        Ok(container.into_descriptor(&self.domain_suffix))
    }
}

#[async_trait]
impl EventSource for RemoteSource {
    async fn monitor(&self, event_tx: mpsc::Sender<ContainerEvent>) -> Result<(), SourceError> {
        let (mut stream, _) = connect_async(self.stream_request()?).await?;
        info!("Connected to event stream {}", self.stream_url);

        while let Some(frame) = stream.next().await {
            match frame? {
                Message::Text(text) => self.handle_frame(text.as_str(), &event_tx).await?,
                Message::Close(_) => break,
                _ => continue,
            }
        }

        warn!("Remote event stream ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URI: &str = "/api/v1/container/4f2a/";

    fn frame(kind: &str, action: &str, state: &str) -> String {
        serde_json::json!({
            "type": kind,
            "action": action,
            "state": state,
            "resource_uri": URI,
        })
        .to_string()
    }

    #[test]
    fn test_recognised_frames() {
        assert_eq!(
            parse_frame(&frame("container", "update", "Running")),
            Some((Action::Start, URI.into()))
        );
        assert_eq!(
            parse_frame(&frame("container", "update", "Stopped")),
            Some((Action::Stop, URI.into()))
        );
        assert_eq!(
            parse_frame(&frame("container", "delete", "Terminated")),
            Some((Action::Stop, URI.into()))
        );
    }

    #[test]
    fn test_unrecognised_frames_are_dropped() {
        assert_eq!(parse_frame(&frame("service", "update", "Running")), None);
        assert_eq!(parse_frame(&frame("container", "create", "Starting")), None);
        assert_eq!(parse_frame(&frame("container", "delete", "Stopped")), None);
        assert_eq!(
            parse_frame(r#"{"action": "update", "state": "Running", "resource_uri": "/x/"}"#),
            None
        );
        assert_eq!(
            parse_frame(r#"{"type": "container", "action": "update", "state": "Running"}"#),
            None
        );
        assert_eq!(parse_frame("not json"), None);
        assert_eq!(parse_frame("[1, 2]"), None);
    }

    #[tokio::test]
    async fn test_unrecognised_frames_reach_no_store() {
        use crate::reconciler::{Policy, Reconciler};
        use crate::records::KeyLayout;
        use crate::store::MemoryStore;
        use crate::types::Variant;
        use std::sync::Arc;

        // Nothing listens here; unrecognised frames must never get as far as a lookup.
        let source = RemoteSource::new("ws://127.0.0.1:9/events", "http://127.0.0.1:9", None, ".weave.local");
        let (tx, rx) = mpsc::channel(8);
        for text in [
            r#"{"action": "update", "state": "Running", "resource_uri": "/api/v1/container/4f2a/"}"#.to_string(),
            frame("service", "update", "Running"),
            frame("container", "create", "Starting"),
            "not json".to_string(),
        ] {
            source.handle_frame(&text, &tx).await.unwrap();
        }
        drop(tx);

        let store = Arc::new(MemoryStore::new());
        let reconciler = Reconciler::new(store.clone(), KeyLayout::default(), Policy::for_variant(Variant::Remote));
        reconciler.run(rx).await;

        assert!(store.ops().await.is_empty());
    }

    #[test]
    fn test_container_resource_to_descriptor() {
        let body = r#"{
            "name": "web-1",
            "private_ip": "10.7.0.4",
            "container_envvars": [
                {"key": "PORT", "value": "8080", "origin": "IMAGE"},
                {"key": "ROUTE", "value": "/web", "origin": "USER"},
                {"key": "EMPTY", "value": null}
            ]
        }"#;
        let container: RemoteContainer = serde_json::from_str(body).unwrap();
        let d = container.into_descriptor(".weave.local");
        assert_eq!(d.name, "web-1");
        assert_eq!(d.hostname, "10.7.0.4");
        assert_eq!(d.env("PORT"), Some("8080"));
        assert_eq!(d.env("ROUTE"), Some("/web"));
        assert_eq!(d.env("EMPTY"), None);
    }

    #[test]
    fn test_hostname_precedence() {
        let with_hostname: RemoteContainer =
            serde_json::from_str(r#"{"name": "web-1", "hostname": "web-1.svc", "private_ip": "10.7.0.4"}"#)
                .unwrap();
        assert_eq!(with_hostname.into_descriptor(".local").hostname, "web-1.svc");

        let bare: RemoteContainer = serde_json::from_str(r#"{"name": "web-1"}"#).unwrap();
        assert_eq!(bare.into_descriptor(".weave.local").hostname, "web-1.weave.local");
    }

    #[test]
    fn test_resource_url_joining() {
        let source = RemoteSource::new("wss://stream.example.com/v1/events", "https://api.example.com/", None, "");
        assert_eq!(source.resource_url(URI), "https://api.example.com/api/v1/container/4f2a/");
        assert_eq!(
            source.resource_url("https://other.example.com/c/1/"),
            "https://other.example.com/c/1/"
        );
    }

    #[test]
    fn test_stream_request_carries_token() {
        let source = RemoteSource::new(
            "wss://stream.example.com/v1/events",
            "https://api.example.com",
            Some("ApiKey user:secret".into()),
            "",
        );
        let request = source.stream_request().unwrap();
        assert_eq!(
            request
                .headers()
                .get(header::AUTHORIZATION)
                .unwrap()
                .to_str()
                .unwrap(),
            "ApiKey user:secret"
        );

        let anonymous = RemoteSource::new("wss://stream.example.com/v1/events", "https://api.example.com", None, "");
        assert!(anonymous
            .stream_request()
            .unwrap()
            .headers()
            .get(header::AUTHORIZATION)
            .is_none());
    }

    #[test]
    fn test_from_config_requires_urls() {
        assert!(RemoteSource::from_config(&RemoteConfig::default(), "").is_err());
    }
}
