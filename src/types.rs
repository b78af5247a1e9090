//! Data structures shared between the event sources and the reconciler.
//!
//! An event source turns whatever its upstream emits into a
//! [`ContainerEvent`]: the lifecycle [`Action`] plus a fresh
//! [`ContainerDescriptor`] snapshot.  Descriptors are never cached; each
//! one lives only as long as the event that carried it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Environment variable holding the port the container serves on.
pub const PORT_VAR: &str = "PORT";
/// Environment variable holding the URL path prefix to route.
pub const ROUTE_VAR: &str = "ROUTE";

/// Which deployment flavour is running.  Selects both the event source
/// and the reconciliation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Docker events read from the local daemon socket.
    #[default]
    Local,
    /// Events pushed by a remote orchestrator over a websocket stream.
    Remote,
}

/// A lifecycle transition the reconciler reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
}

impl Action {
    /// Maps a Docker event action onto a lifecycle transition.  Anything
    /// other than `start` and `stop` is ignored.
    pub fn from_docker(action: &str) -> Option<Self> {
        match action {
            "start" => Some(Action::Start),
            "stop" => Some(Action::Stop),
            _ => None,
        }
    }
}

/// What the reconciler knows about one container at event time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    pub name: String,
    pub environment: HashMap<String, String>,
    pub hostname: String,
}

impl ContainerDescriptor {
    pub fn new(
        name: impl Into<String>,
        environment: HashMap<String, String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            environment,
            hostname: hostname.into(),
        }
    }

    /// Looks up an environment variable, treating an empty value as unset.
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// Parses Docker-style `KEY=VALUE` strings.  Only the first `=` splits;
/// entries without one are skipped.
pub fn parse_env_list<I, S>(entries: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .filter_map(|entry| {
            entry
                .as_ref()
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}

/// A single unit of work handed from an event source to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    pub action: Action,
    pub container: ContainerDescriptor,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_list_splits_on_first_equals() {
        let env = parse_env_list(["PORT=8080", "OPTS=a=b", "BROKEN", "ROUTE=/web"]);
        assert_eq!(env.get("PORT").map(String::as_str), Some("8080"));
        assert_eq!(env.get("OPTS").map(String::as_str), Some("a=b"));
        assert_eq!(env.get("ROUTE").map(String::as_str), Some("/web"));
        assert!(!env.contains_key("BROKEN"));
    }

    #[test]
    fn test_empty_env_value_counts_as_unset() {
        let d = ContainerDescriptor::new("web", parse_env_list(["PORT="]), "web.local");
        assert_eq!(d.env(PORT_VAR), None);
        assert_eq!(d.env(ROUTE_VAR), None);
    }

    #[test]
    fn test_docker_actions() {
        assert_eq!(Action::from_docker("start"), Some(Action::Start));
        assert_eq!(Action::from_docker("stop"), Some(Action::Stop));
        assert_eq!(Action::from_docker("die"), None);
    }
}
