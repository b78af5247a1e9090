use super::{forward, EventSource, SourceError};
use crate::types::{parse_env_list, Action, ContainerDescriptor, ContainerEvent};
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerInspectResponse, EventMessage};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures_util::stream::StreamExt;
use log::{debug, info, warn};
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Watches the local Docker daemon for container starts and stops.
pub struct DockerSource {
    domain_suffix: String,
    sync_on_start: bool,
}

impl DockerSource {
    pub fn new(domain_suffix: impl Into<String>, sync_on_start: bool) -> Self {
        Self {
            domain_suffix: domain_suffix.into(),
            sync_on_start,
        }
    }

    fn connect() -> Result<Docker, SourceError> {
        // Unix socket on Linux, honouring DOCKER_HOST when set.
        Docker::connect_with_local_defaults().map_err(Into::into)
    }

    fn hostname(&self, name: &str) -> String {
        format!("{}{}", name, self.domain_suffix)
    }

    async fn inspect_env(docker: &Docker, id: &str) -> Result<HashMap<String, String>, SourceError> {
        let detail = docker.inspect_container(id, None).await?;
        Ok(container_env(&detail))
    }

    /// Emits a start event for every container already running.
    async fn send_running(
        &self,
        docker: &Docker,
        event_tx: &mpsc::Sender<ContainerEvent>,
    ) -> Result<usize, SourceError> {
        let opts = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = docker.list_containers(Some(opts)).await?;

        let mut sent = 0;
        for c in containers {
            let name = c
                .names
                .as_ref()
                .and_then(|n| n.first())
                .map(|n| n.trim_start_matches('/').to_string());
            let (name, id) = match (name, c.id) {
                (Some(n), Some(id)) => (n, id),
                (Some(n), None) => (n.clone(), n),
                (None, Some(id)) => (id.clone(), id),
                _ => continue,
            };

            match Self::inspect_env(docker, &id).await {
                Ok(environment) => {
                    let hostname = self.hostname(&name);
                    forward(
                        event_tx,
                        ContainerEvent {
                            action: Action::Start,
                            container: ContainerDescriptor::new(name, environment, hostname),
                        },
                    )
                    .await?;
                    sent += 1;
                }
                Err(e) => warn!("Failed to inspect running container {}: {}", name, e),
            }
        }
        Ok(sent)
    }
}

/// Action, container name and container id of a Docker event, if it is a
/// start or stop.  The name falls back to the id when the event has none.
pub(crate) fn classify(event: &EventMessage) -> Option<(Action, String, String)> {
    let action = Action::from_docker(event.action.as_deref()?)?;
    let actor = event.actor.as_ref()?;
    let id = actor.id.clone().unwrap_or_default();
    let name = actor
        .attributes
        .as_ref()
        .and_then(|attrs| attrs.get("name"))
        .filter(|n| !n.is_empty())
        .cloned()
        .unwrap_or_else(|| id.clone());

    if name.is_empty() {
        return None;
    }
    Some((action, name, id))
}

fn container_env(detail: &ContainerInspectResponse) -> HashMap<String, String> {
    detail
        .config
        .as_ref()
        .and_then(|c| c.env.as_ref())
        .map(parse_env_list)
        .unwrap_or_default()
}

#[async_trait]
impl EventSource for DockerSource {
    async fn monitor(&self, event_tx: mpsc::Sender<ContainerEvent>) -> Result<(), SourceError> {
        let docker = Self::connect()?;

        if self.sync_on_start {
            let sent = self.send_running(&docker, &event_tx).await?;
            info!("Initial scan found {} running containers", sent);
        }

        let opts = EventsOptions::<String> {
            filters: [("type", ["container"].as_slice()), ("event", ["start", "stop"].as_slice())]
                .iter()
                .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
                .collect(),
            ..Default::default()
        };

        let mut stream = docker.events(Some(opts));

        info!("Listening for Docker events...");
        while let Some(msg) = stream.next().await {
            let event = msg?;
            debug!("Docker event: {:?}", event);

            let Some((action, name, id)) = classify(&event) else {
                continue;
            };

            let environment = match action {
                Action::Start => {
                    let target = if id.is_empty() { &name } else { &id };
                    match Self::inspect_env(&docker, target).await {
                        Ok(env) => env,
                        Err(e) => {
                            warn!("Failed to inspect started container {}: {}", name, e);
                            continue;
                        }
                    }
                }
                // Only the name matters when deregistering.
                Action::Stop => HashMap::new(),
            };

            let hostname = self.hostname(&name);
            forward(
                &event_tx,
                ContainerEvent {
                    action,
                    container: ContainerDescriptor::new(name, environment, hostname),
                },
            )
            .await?;
        }

        warn!("Docker event stream ended");
        Ok(())
    }
}
