//! Records stored in the proxy's configuration tree.
//!
//! Every value written to the store goes through [`encode`], so field
//! names and escaping are decided by serde rather than by hand-built
//! strings.  Field names follow the proxy's PascalCase schema.

use serde::{Deserialize, Serialize};

/// Protocol used for backends and frontends.
pub const HTTP: &str = "http";
/// Id of the redirect middleware attached to frontends.
pub const HTTPS_REDIRECT_ID: &str = "http2https";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    #[serde(rename = "Protocol")]
    pub protocol: String,
    #[serde(rename = "Address")]
    pub address: ListenerAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerAddress {
    #[serde(rename = "Network")]
    pub network: String,
    #[serde(rename = "Address")]
    pub address: String,
}

impl Listener {
    /// A TCP listener bound to `address` (`host:port`).
    pub fn tcp(protocol: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            address: ListenerAddress {
                network: "tcp".into(),
                address: address.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backend {
    #[serde(rename = "Type")]
    pub kind: String,
}

impl Default for Backend {
    fn default() -> Self {
        Self { kind: HTTP.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    #[serde(rename = "URL")]
    pub url: String,
}

impl Server {
    pub fn new(hostname: &str, port: u16) -> Self {
        Self {
            url: format!("http://{}:{}", hostname, port),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frontend {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "BackendId")]
    pub backend_id: String,
    #[serde(rename = "Route")]
    pub route: String,
}

impl Frontend {
    /// Routes every path starting with `route` to `backend`.
    pub fn for_route(backend: &str, route: &str) -> Self {
        Self {
            kind: HTTP.into(),
            backend_id: backend.into(),
            route: format!("PathRegexp(`{}.*`)", route),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Middleware {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(rename = "Middleware")]
    pub spec: RewriteSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteSpec {
    #[serde(rename = "Regexp")]
    pub regexp: String,
    #[serde(rename = "Replacement")]
    pub replacement: String,
    #[serde(rename = "Redirect")]
    pub redirect: bool,
}

impl Middleware {
    /// Redirects plain http requests to the same URL over https.
    pub fn https_redirect() -> Self {
        Self {
            kind: "rewrite".into(),
            spec: RewriteSpec {
                regexp: "^http://(.*)$".into(),
                replacement: "https://$1".into(),
                redirect: true,
            },
        }
    }
}

/// Serialises a record into the string value stored under its key.
pub fn encode<T: Serialize>(record: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(record)
}

/// Builds store keys under a fixed namespace such as `/vulcand`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    namespace: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new("/vulcand")
    }
}

impl KeyLayout {
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            namespace: namespace.trim_end_matches('/').to_string(),
        }
    }

    pub fn listener(&self, name: &str) -> String {
        format!("{}/listeners/{}", self.namespace, name)
    }

    pub fn backend(&self, backend: &str) -> String {
        format!("{}/backends/{}/backend", self.namespace, backend)
    }

    pub fn server(&self, backend: &str, server: &str) -> String {
        format!("{}/backends/{}/servers/{}", self.namespace, backend, server)
    }

    pub fn frontend(&self, backend: &str) -> String {
        format!("{}/frontends/{}/frontend", self.namespace, backend)
    }

    pub fn middleware(&self, backend: &str, id: &str) -> String {
        format!("{}/frontends/{}/middlewares/{}", self.namespace, backend, id)
    }
}
