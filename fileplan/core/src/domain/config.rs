// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Records Management Configuration
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) controlling:
// - transaction retry behaviour for disposition and security mutations
// - capability voting and post-invocation filtering budgets
// - method security directives per intercepted method
// - the records management event catalog
// - logging

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::disposition::{EventCatalog, RecordsManagementEvent};

pub const API_VERSION: &str = "fileplan.records/v1";
pub const KIND: &str = "RecordsConfig";

/// Top-level records management configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfigManifest {
    /// API version (must be "fileplan.records/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "RecordsConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: RecordsConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordsConfigSpec {
    #[serde(default)]
    pub transactions: TransactionConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    /// Events added to the standard catalog (same name replaces)
    #[serde(default)]
    pub events: Vec<RecordsManagementEvent>,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Attempts after the first one when a mutation hits a conflict
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_delay")]
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Grant when every directive abstains
    #[serde(default)]
    pub allow_if_all_abstain: bool,

    /// Attach a capability report to access denied errors
    #[serde(default)]
    pub capability_report: bool,

    /// Upper bound on permission checks per filtered result
    #[serde(default)]
    pub max_permission_checks: Option<usize>,

    /// Upper bound on wall-clock time spent filtering one result
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub max_permission_check_time: Option<Duration>,

    /// Directive strings per intercepted method name
    #[serde(default)]
    pub method_security: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(20)
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RecordsConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "fileplan".to_string(),
                version: None,
                labels: None,
            },
            spec: RecordsConfigSpec::default(),
        }
    }
}

impl RecordsConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. FILEPLAN_CONFIG_PATH environment variable
    /// 2. ./fileplan-config.yaml (working directory)
    /// 3. ~/.fileplan/config.yaml (user home)
    /// 4. /etc/fileplan/config.yaml (Unix) or C:\ProgramData\Fileplan\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("FILEPLAN_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./fileplan-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".fileplan").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/fileplan/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Fileplan\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(explicit_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = if let Some(path) = explicit_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", path);
            Self::from_yaml_file(path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("FILEPLAN_MAX_PERMISSION_CHECKS") {
            match val.parse::<usize>() {
                Ok(n) => {
                    tracing::info!("Environment override: FILEPLAN_MAX_PERMISSION_CHECKS={}", n);
                    self.spec.security.max_permission_checks = Some(n);
                }
                Err(_) => tracing::warn!(
                    "Invalid value for FILEPLAN_MAX_PERMISSION_CHECKS: '{}'. Expected a number. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("FILEPLAN_CAPABILITY_REPORT") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => self.spec.security.capability_report = true,
                "false" | "0" | "no" | "off" => self.spec.security.capability_report = false,
                _ => tracing::warn!(
                    "Invalid value for FILEPLAN_CAPABILITY_REPORT: '{}'. Expected true/false. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("FILEPLAN_LOG_LEVEL") {
            self.spec.observability.logging.level = val;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.security.max_permission_checks == Some(0) {
            anyhow::bail!("spec.security.max_permission_checks must be greater than zero");
        }

        for event in &self.spec.events {
            if event.name.is_empty() {
                anyhow::bail!("Event name cannot be empty");
            }
        }

        for (method, directives) in &self.spec.security.method_security {
            crate::domain::security::AfterDirective::partition(directives).map_err(|e| {
                anyhow::anyhow!("Invalid method security for '{}': {}", method, e)
            })?;
        }

        Ok(())
    }

    /// Standard events plus those declared in the manifest
    pub fn event_catalog(&self) -> EventCatalog {
        let mut catalog = EventCatalog::standard();
        for event in &self.spec.events {
            catalog.register(event.clone());
        }
        catalog
    }
}
