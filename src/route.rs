//! Derives routing intent from a container descriptor.
//!
//! Pure functions only: nothing here touches the store.

use thiserror::Error;

use crate::types::{ContainerDescriptor, PORT_VAR, ROUTE_VAR};

/// How a container name maps onto a backend name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Naming {
    /// One backend per container.
    FullName,
    /// Instances named `svc-1`, `svc-2`, ... share backend `svc`.
    PrefixBeforeDash,
}

impl Naming {
    pub fn backend_name<'a>(&self, container_name: &'a str) -> &'a str {
        match self {
            Naming::FullName => container_name,
            Naming::PrefixBeforeDash => container_name
                .split_once('-')
                .map_or(container_name, |(prefix, _)| prefix),
        }
    }
}

/// Everything needed to register one container with the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteIntent {
    pub backend_name: String,
    pub server_name: String,
    pub hostname: String,
    pub port: u16,
    pub route: String,
}

/// Why a descriptor cannot be routed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Incomplete {
    #[error("no port could be found")]
    NoPort,
    #[error("port {0:?} is not a valid port number")]
    InvalidPort(String),
    #[error("no route could be found")]
    NoRoute,
    #[error("route {0:?} cannot be embedded in a route expression")]
    InvalidRoute(String),
}

/// Reads `PORT` then `ROUTE` from the descriptor.  A missing port is
/// reported ahead of a missing route.  Routes are quoted with backticks
/// inside the frontend's route expression, so a backtick in `ROUTE` is
/// rejected.
pub fn extract(descriptor: &ContainerDescriptor, naming: Naming) -> Result<RouteIntent, Incomplete> {
    let raw_port = descriptor.env(PORT_VAR).ok_or(Incomplete::NoPort)?;
    let port = raw_port
        .trim()
        .parse::<u16>()
        .map_err(|_| Incomplete::InvalidPort(raw_port.to_string()))?;
    let route = descriptor.env(ROUTE_VAR).ok_or(Incomplete::NoRoute)?;
    if route.contains('`') {
        return Err(Incomplete::InvalidRoute(route.to_string()));
    }

    Ok(RouteIntent {
        backend_name: naming.backend_name(&descriptor.name).to_string(),
        server_name: descriptor.name.clone(),
        hostname: descriptor.hostname.clone(),
        port,
        route: route.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_env_list;

    fn descriptor(name: &str, env: &[&str]) -> ContainerDescriptor {
        ContainerDescriptor::new(name, parse_env_list(env), format!("{}.weave.local", name))
    }

    #[test]
    fn test_backend_naming() {
        assert_eq!(Naming::FullName.backend_name("web-1"), "web-1");
        assert_eq!(Naming::PrefixBeforeDash.backend_name("web-1"), "web");
        assert_eq!(Naming::PrefixBeforeDash.backend_name("api-v2-3"), "api");
        assert_eq!(Naming::PrefixBeforeDash.backend_name("db"), "db");
    }

    #[test]
    fn test_full_intent() {
        let intent = extract(
            &descriptor("web-1", &["PORT=8080", "ROUTE=/web"]),
            Naming::PrefixBeforeDash,
        )
        .unwrap();
        assert_eq!(
            intent,
            RouteIntent {
                backend_name: "web".into(),
                server_name: "web-1".into(),
                hostname: "web-1.weave.local".into(),
                port: 8080,
                route: "/web".into(),
            }
        );
    }

    #[test]
    fn test_missing_values() {
        let naming = Naming::FullName;
        assert_eq!(
            extract(&descriptor("web", &["ROUTE=/web"]), naming),
            Err(Incomplete::NoPort)
        );
        assert_eq!(
            extract(&descriptor("web", &["PORT=80"]), naming),
            Err(Incomplete::NoRoute)
        );
        assert_eq!(extract(&descriptor("web", &[]), naming), Err(Incomplete::NoPort));
        assert_eq!(
            extract(&descriptor("web", &["PORT=http", "ROUTE=/web"]), naming),
            Err(Incomplete::InvalidPort("http".into()))
        );
    }

    #[test]
    fn test_backtick_in_route_rejected() {
        assert_eq!(
            extract(&descriptor("web", &["PORT=80", "ROUTE=/a`) || Path(`/admin"]), Naming::FullName),
            Err(Incomplete::InvalidRoute("/a`) || Path(`/admin".into()))
        );
        assert!(extract(&descriptor("web", &["PORT=80", "ROUTE=/a\"b"]), Naming::FullName).is_ok());
    }
}
