//! Keeps a vulcand configuration tree in etcd in step with running
//! containers.
//!
//! Container lifecycle events come either from the local Docker daemon or
//! from a remote orchestrator stream ([`runtime`]).  The [`reconciler`]
//! turns each event into backend, server, frontend and middleware
//! records ([`records`]) and writes them through a [`store::ConfigStore`].

pub mod bootstrap;
pub mod config;
pub mod reconciler;
pub mod records;
pub mod route;
pub mod runtime;
pub mod store;
pub mod types;
