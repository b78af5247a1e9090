use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::Variant;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListenerConfig {
    pub name: String,
    pub protocol: String,
    pub address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            name: "http".into(),
            protocol: "http".into(),
            address: "0.0.0.0:80".into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DockerConfig {
    /// Register containers that were already running when the monitor started.
    pub sync_on_start: bool,
}

#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

// Keeps the token out of the startup log line.
impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("stream_url", &self.stream_url)
            .field("api_base", &self.api_base)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    pub variant: Variant,
    pub etcd_endpoint: String,
    pub namespace: String,
    pub domain_suffix: String,
    pub dry_run: bool,
    pub listener: ListenerConfig,
    pub docker: DockerConfig,
    pub remote: RemoteConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            variant: Variant::Local,
            etcd_endpoint: "http://etcd:4001".into(),
            namespace: "/vulcand".into(),
            domain_suffix: ".weave.local".into(),
            dry_run: false,
            listener: ListenerConfig::default(),
            docker: DockerConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let mut config: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("vulcand-glue.toml"))
            .merge(Json::file("vulcand-glue.json"))
            .merge(Env::prefixed("VGLUE_").split("__"))
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        // Support Docker-style secrets
        if let Ok(token_file) = std::env::var("VGLUE_REMOTE_TOKEN_FILE") {
            config.remote.token = Some(std::fs::read_to_string(token_file)?.trim().to_string());
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.namespace.starts_with('/') {
            anyhow::bail!("namespace must start with '/', got {:?}", self.namespace);
        }
        if self.variant == Variant::Remote {
            if self.remote.stream_url.is_none() {
                anyhow::bail!("remote variant requires remote.stream_url");
            }
            if self.remote.api_base.is_none() {
                anyhow::bail!("remote variant requires remote.api_base");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        Jail::expect_with(|_jail| {
            let cfg = Config::load().unwrap();
            assert_eq!(cfg, Config::default());
            assert_eq!(cfg.listener.address, "0.0.0.0:80");
            Ok(())
        });
    }

    #[test]
    fn test_file_and_env_layers() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "vulcand-glue.toml",
                r#"
                    etcd_endpoint = "http://10.0.0.5:2379"
                    domain_suffix = ".cluster"

                    [listener]
                    address = "0.0.0.0:8080"
                "#,
            )?;
            jail.set_env("VGLUE_DOMAIN_SUFFIX", ".override");
            jail.set_env("VGLUE_DOCKER__SYNC_ON_START", "true");

            let cfg = Config::load().unwrap();
            assert_eq!(cfg.etcd_endpoint, "http://10.0.0.5:2379");
            assert_eq!(cfg.domain_suffix, ".override");
            assert_eq!(cfg.listener.address, "0.0.0.0:8080");
            assert_eq!(cfg.listener.name, "http");
            assert!(cfg.docker.sync_on_start);
            Ok(())
        });
    }

    #[test]
    fn test_remote_requires_endpoints() {
        Jail::expect_with(|jail| {
            jail.set_env("VGLUE_VARIANT", "remote");
            assert!(Config::load().is_err());

            jail.set_env("VGLUE_REMOTE__STREAM_URL", "wss://stream.example.com/v1/events");
            jail.set_env("VGLUE_REMOTE__API_BASE", "https://api.example.com");
            jail.create_file("token", "  secret-token\n")?;
            jail.set_env("VGLUE_REMOTE_TOKEN_FILE", "token");

            let cfg = Config::load().unwrap();
            assert_eq!(cfg.variant, Variant::Remote);
            assert_eq!(cfg.remote.token.as_deref(), Some("secret-token"));
            assert!(!format!("{:?}", cfg).contains("secret-token"));
            Ok(())
        });
    }
}
