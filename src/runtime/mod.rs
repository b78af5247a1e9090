use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::types::ContainerEvent;

pub mod docker;
pub mod remote;
pub use docker::DockerSource;
pub use remote::RemoteSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
    #[error("event stream error: {0}")]
    Stream(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("container lookup failed: {0}")]
    Lookup(#[from] reqwest::Error),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("event channel closed")]
    ChannelClosed,
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Start watching for container lifecycle changes.
    /// Events are sent to the provided channel in the order they are observed.
    /// Returns once the upstream stream ends.
    async fn monitor(&self, event_tx: mpsc::Sender<ContainerEvent>) -> Result<(), SourceError>;
}

pub(crate) async fn forward(
    event_tx: &mpsc::Sender<ContainerEvent>,
    event: ContainerEvent,
) -> Result<(), SourceError> {
    event_tx
        .send(event)
        .await
        .map_err(|_| SourceError::ChannelClosed)
}
