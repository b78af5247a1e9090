//! Turns container lifecycle events into proxy configuration.
//!
//! For every event the reconciler issues the smallest set of store
//! operations that brings the records for that one container in line
//! with its state.  Backends, frontends and middlewares are created with
//! a read-then-write check so repeated deliveries are harmless. Servers
//! are always overwritten so a restarted container refreshes its URL.
//!
//! Store failures are logged and swallowed.  One bad event never stops
//! the loop.

use std::sync::Arc;

use log::{debug, error, info};
use tokio::sync::mpsc;

use crate::records::{self, Backend, Frontend, KeyLayout, Middleware, Server, HTTPS_REDIRECT_ID};
use crate::route::{self, Incomplete, Naming, RouteIntent};
use crate::store::{self, ConfigStore, Ensured, Removal, StoreError};
use crate::types::{Action, ContainerDescriptor, ContainerEvent, Variant, ROUTE_VAR};

/// Behaviour that differs between the local and remote deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub naming: Naming,
    /// Skip the container entirely, backend included, when it has no route.
    pub route_required_first: bool,
    pub remove_frontend_on_stop: bool,
    pub https_redirect: bool,
}

impl Policy {
    pub fn for_variant(variant: Variant) -> Self {
        match variant {
            Variant::Local => Self {
                naming: Naming::FullName,
                route_required_first: false,
                remove_frontend_on_stop: true,
                https_redirect: false,
            },
            Variant::Remote => Self {
                naming: Naming::PrefixBeforeDash,
                route_required_first: true,
                remove_frontend_on_stop: false,
                https_redirect: true,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// Nothing was written.
    Skipped(Incomplete),
    /// The backend exists but the container has no server or frontend.
    Unroutable(Incomplete),
    Registered,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Removed,
    /// The server key was already gone.
    AlreadyAbsent,
    Failed,
}

pub struct Reconciler {
    store: Arc<dyn ConfigStore>,
    keys: KeyLayout,
    policy: Policy,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ConfigStore>, keys: KeyLayout, policy: Policy) -> Self {
        Self {
            store,
            keys,
            policy,
        }
    }

    /// Processes events one at a time until the sender side closes.
    pub async fn run(&self, mut events: mpsc::Receiver<ContainerEvent>) {
        while let Some(event) = events.recv().await {
            self.apply(&event).await;
        }
        info!("Event channel closed, reconciler stopping");
    }

    pub async fn apply(&self, event: &ContainerEvent) {
        match event.action {
            Action::Start => {
                info!("Started: {}", event.container.name);
                self.handle_start(&event.container).await;
            }
            Action::Stop => {
                info!("Stopped: {}", event.container.name);
                self.handle_stop(&event.container).await;
            }
        }
    }

    pub async fn handle_start(&self, container: &ContainerDescriptor) -> StartOutcome {
        match self.try_start(container).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to register container {}: {}", container.name, e);
                StartOutcome::Failed
            }
        }
    }

    pub async fn handle_stop(&self, container: &ContainerDescriptor) -> StopOutcome {
        match self.try_stop(container).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Failed to deregister container {}: {}", container.name, e);
                StopOutcome::Failed
            }
        }
    }

    async fn try_start(&self, container: &ContainerDescriptor) -> Result<StartOutcome, StoreError> {
        if self.policy.route_required_first && container.env(ROUTE_VAR).is_none() {
            info!("No route could be found for container {}, ignoring it", container.name);
            return Ok(StartOutcome::Skipped(Incomplete::NoRoute));
        }

        let backend_name = self.policy.naming.backend_name(&container.name);
        self.ensure_backend(backend_name).await?;

        let intent = match route::extract(container, self.policy.naming) {
            Ok(intent) => intent,
            Err(reason) => {
                info!("Not routing container {}: {}", container.name, reason);
                return Ok(StartOutcome::Unroutable(reason));
            }
        };
        info!("Adding: {}:{}{}", intent.hostname, intent.port, intent.route);

        self.put_server(&intent).await?;
        self.ensure_frontend(&intent.backend_name, &intent.route).await?;
        if self.policy.https_redirect {
            self.ensure_https_redirect(&intent.backend_name).await?;
        }
        Ok(StartOutcome::Registered)
    }

    async fn try_stop(&self, container: &ContainerDescriptor) -> Result<StopOutcome, StoreError> {
        let backend_name = self.policy.naming.backend_name(&container.name);
        let key = self.keys.server(backend_name, &container.name);

        match self.store.delete(&key).await? {
            Removal::Deleted => info!("Removed server: {}", key),
            Removal::Absent => {
                error!("Cannot remove server {}: key not found", key);
                return Ok(StopOutcome::AlreadyAbsent);
            }
        }

        if self.policy.remove_frontend_on_stop {
            self.remove_frontend(backend_name).await?;
        }
        Ok(StopOutcome::Removed)
    }

    async fn put_server(&self, intent: &RouteIntent) -> Result<(), StoreError> {
        let key = self.keys.server(&intent.backend_name, &intent.server_name);
        let value = records::encode(&Server::new(&intent.hostname, intent.port))?;
        self.store.write(&key, &value).await?;
        info!("Added server: {} = {} on route {}", key, value, intent.route);
        Ok(())
    }

    pub async fn ensure_backend(&self, backend_name: &str) -> Result<Ensured, StoreError> {
        let key = self.keys.backend(backend_name);
        self.ensure_logged("backend", &key, &Backend::default()).await
    }

    pub async fn ensure_frontend(&self, backend_name: &str, route: &str) -> Result<Ensured, StoreError> {
        let key = self.keys.frontend(backend_name);
        self.ensure_logged("frontend", &key, &Frontend::for_route(backend_name, route))
            .await
    }

    pub async fn ensure_https_redirect(&self, backend_name: &str) -> Result<Ensured, StoreError> {
        let key = self.keys.middleware(backend_name, HTTPS_REDIRECT_ID);
        self.ensure_logged("middleware", &key, &Middleware::https_redirect())
            .await
    }

    /// Deletes the frontend for `backend_name` if one is present.
    pub async fn remove_frontend(&self, backend_name: &str) -> Result<Removal, StoreError> {
        let key = self.keys.frontend(backend_name);
        if !self.store.read(&key).await?.exists() {
            debug!("No frontend to remove at {}", key);
            return Ok(Removal::Absent);
        }
        let removal = self.store.delete(&key).await?;
        if removal == Removal::Deleted {
            info!("Removed frontend: {}", key);
        }
        Ok(removal)
    }

    async fn ensure_logged<T>(&self, kind: &str, key: &str, record: &T) -> Result<Ensured, StoreError>
    where
        T: serde::Serialize + Sync,
    {
        let ensured = store::ensure(self.store.as_ref(), key, record).await?;
        match ensured {
            Ensured::Created => info!("Created {}: {}", kind, key),
            Ensured::AlreadyPresent => debug!("{} already present: {}", kind, key),
        }
        Ok(ensured)
    }
}
