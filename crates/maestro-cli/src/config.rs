//! `maestro.toml` loading.

use maestro_agent::{ProviderConfig, ProviderRouter};
use maestro_orchestrator::OrchestratorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Provider name the default roster routes to.
pub const DEFAULT_PROVIDER: &str = "default";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MaestroConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Provider the default agents use. Falls back to the first configured
    /// provider, or an offline echo provider when none are configured.
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Directory for the JSON file store. In-memory storage when unset.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl MaestroConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read `path`. A missing file yields the defaults so the CLI works offline.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::parse(&text)
                .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {e}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No config file, using offline defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file '{}': {e}",
                path.display()
            )),
        }
    }

    /// Providers to register, with an echo provider when the file names none.
    pub fn effective_providers(&self) -> Vec<ProviderConfig> {
        if self.providers.is_empty() {
            vec![ProviderConfig::echo(DEFAULT_PROVIDER)]
        } else {
            self.providers.clone()
        }
    }

    pub fn roster_provider(&self) -> String {
        self.default_provider
            .clone()
            .or_else(|| self.providers.first().map(|p| p.name.clone()))
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string())
    }

    pub fn router(&self) -> ProviderRouter {
        ProviderRouter::from_configs(&self.effective_providers()).with_default(self.roster_provider())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use maestro_agent::ProviderKind;

    #[test]
    fn test_empty_config_is_offline() {
        let config = MaestroConfig::parse("").unwrap();
        assert_eq!(config.orchestrator, OrchestratorConfig::default());
        assert_eq!(config.roster_provider(), "default");
        let providers = config.effective_providers();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].kind, ProviderKind::Echo);
        assert_eq!(config.router().providers(), vec!["default"]);
    }

    #[test]
    fn test_full_config() {
        let text = r#"
default_provider = "groq"
data_dir = "./state"

[orchestrator]
queue_tick_ms = 250
collaboration_timeout_secs = 60

[[providers]]
name = "local"
kind = "local"
model_id = "llama3"

[[providers]]
name = "groq"
kind = "groq"
model_id = "llama-3.3-70b"
api_key_env = "GROQ_API_KEY"
"#;
        let config = MaestroConfig::parse(text).unwrap();
        assert_eq!(config.orchestrator.queue_tick_ms, 250);
        assert_eq!(config.orchestrator.collaboration_timeout_secs, 60);
        assert_eq!(config.orchestrator.negotiation_timeout_secs, 120);
        assert_eq!(config.roster_provider(), "groq");
        assert_eq!(config.data_dir, Some(PathBuf::from("./state")));
        assert_eq!(config.router().providers(), vec!["groq", "local"]);
    }

    #[test]
    fn test_first_provider_is_roster_default() {
        let text = r#"
[[providers]]
name = "openai"
kind = "openai"
model_id = "gpt-4o-mini"
"#;
        let config = MaestroConfig::parse(text).unwrap();
        assert_eq!(config.roster_provider(), "openai");
    }

    #[test]
    fn test_bad_kind_is_rejected() {
        let text = "[[providers]]\nname = \"x\"\nkind = \"carrier-pigeon\"\nmodel_id = \"m\"\n";
        assert!(MaestroConfig::parse(text).is_err());
    }

    #[tokio::test]
    async fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = MaestroConfig::load(&dir.path().join("absent.toml")).await.unwrap();
        assert!(config.providers.is_empty());
    }
}
