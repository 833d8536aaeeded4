//! Configuration

use masc_net::LoaderConfig;
use serde::Deserialize;

use crate::MascError;

/// Toolkit configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// URL relative references resolve against
    pub document_url: String,
    /// User agent for HTTP requests
    pub user_agent: String,
    /// Share one fetch between concurrent loads of the same URL
    pub coordinate_loads: bool,
    /// Queue stylesheet assets for prefetching
    pub prefetch_assets: bool,
    /// `tracing` filter used by [`init_logging`](crate::init_logging) when
    /// `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        let loader = LoaderConfig::default();
        Self {
            document_url: "http://localhost/".into(),
            user_agent: loader.user_agent,
            coordinate_loads: loader.coordinate_loads,
            prefetch_assets: loader.prefetch_assets,
            log_filter: "info".into(),
        }
    }
}

impl Config {
    /// Read a JSON object; missing fields keep their defaults
    pub fn from_json(text: &str) -> Result<Self, MascError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reject settings the loader cannot work with
    pub fn validate(&self) -> Result<(), MascError> {
        url::Url::parse(&self.document_url).map_err(|err| {
            MascError::Config(format!("document_url {:?}: {err}", self.document_url))
        })?;
        if self.user_agent.trim().is_empty() {
            return Err(MascError::Config("user_agent is empty".into()));
        }
        Ok(())
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig::builder()
            .coordinate_loads(self.coordinate_loads)
            .prefetch_assets(self.prefetch_assets)
            .user_agent(&self.user_agent)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = Config::from_json(r#"{"document_url": "https://site.test/app/", "prefetch_assets": false}"#)
            .unwrap();

        assert_eq!(config.document_url, "https://site.test/app/");
        assert!(!config.prefetch_assets);
        assert!(config.coordinate_loads);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            Config::from_json("{\"coordinate_loads\": \"yes\"}"),
            Err(MascError::Parse(_))
        ));
    }

    #[test]
    fn test_relative_document_url_rejected() {
        let config = Config {
            document_url: "/just/a/path".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(MascError::Config(_))));
    }

    #[test]
    fn test_loader_config_mirrors_fields() {
        let config = Config {
            coordinate_loads: false,
            user_agent: "Probe/2".into(),
            ..Default::default()
        };
        let loader = config.loader_config();

        assert!(!loader.coordinate_loads);
        assert_eq!(loader.user_agent, "Probe/2");
    }
}
