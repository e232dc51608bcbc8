//! Declarative build configuration and its resolution.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
    CompilerDecl, CompilerProfile, DeployError, Environment, NetworkDecl, NetworkProfile,
    resolve_compiler_profiles, resolve_network_profiles,
};

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "Juice.toml";

/// Contract deployed when none is named.
pub const DEFAULT_CONTRACT: &str = "JuiceBox";

/// Network used when none is requested.
pub const DEFAULT_NETWORK: &str = "rinkeby";

/// Fixed gas price in wei offered by the deployment transaction.
pub const DEFAULT_GAS_PRICE: i64 = 50_000;

/// Gas reporting after a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasReporterConfig {
    /// Reporting is enabled when this environment key is present.
    pub enabled_env: String,
    /// Currency label attached to reports.
    pub currency: String,
}

impl Default for GasReporterConfig {
    fn default() -> Self {
        Self {
            enabled_env: "REPORT_GAS".to_string(),
            currency: "USD".to_string(),
        }
    }
}

/// Declarative build and deployment configuration.
///
/// Defaults describe the built-in project; a `Juice.toml` file may override
/// any field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Contract to deploy, by name or as `source:name`.
    pub contract: String,
    /// Directory holding the Solidity sources.
    pub contracts_dir: PathBuf,
    /// Fixed gas price in wei.
    pub gas_price: i64,
    /// Network used when none is requested.
    pub default_network: String,
    /// Seconds to wait for confirmation before giving up; unbounded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmation_timeout_secs: Option<u64>,
    /// Compiler versions in resolution priority order.
    pub compilers: Vec<CompilerDecl>,
    /// Declared networks keyed by name.
    pub networks: BTreeMap<String, NetworkDecl>,
    pub gas_reporter: GasReporterConfig,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            contract: DEFAULT_CONTRACT.to_string(),
            contracts_dir: PathBuf::from("contracts"),
            gas_price: DEFAULT_GAS_PRICE,
            default_network: DEFAULT_NETWORK.to_string(),
            confirmation_timeout_secs: None,
            compilers: vec![
                CompilerDecl::new("0.8.7").optimized(200),
                CompilerDecl::new("0.8.1"),
                CompilerDecl::new("0.8.0"),
                CompilerDecl::new("0.7.3"),
                CompilerDecl::new("0.6.2"),
            ],
            networks: BTreeMap::from([
                ("hardhat".to_string(), NetworkDecl::in_memory()),
                (
                    "rinkeby".to_string(),
                    NetworkDecl::from_env("STAGING_ALCHEMY_API_URL", "STAGING_PRIVATE_KEY"),
                ),
                (
                    "mainnet".to_string(),
                    NetworkDecl::from_env("PRODUCTION_INFURA_API_URL", "PRODUCTION_PRIVATE_KEY"),
                ),
            ]),
            gas_reporter: GasReporterConfig::default(),
        }
    }
}

impl DeployConfig {
    /// Load the configuration from a TOML file layered over the defaults.
    ///
    /// Lists in the file replace the default ones; tables such as `networks`
    /// merge key by key. If `path` is a directory, `Juice.toml` inside it is used.
    pub fn load_from_file(path: &Path) -> Result<Self, DeployError> {
        let config_path = if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        };

        if !config_path.exists() {
            return Err(DeployError::Configuration(format!(
                "Configuration file not found: {}",
                config_path.display()
            )));
        }

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(&config_path))
            .extract()
            .map_err(|e| {
                DeployError::Configuration(format!(
                    "Failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?;

        tracing::info!(path = %config_path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Serialize the configuration as TOML.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        std::fs::write(path, self.to_toml()?)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// The statically configured default network.
    pub fn select_default_network(&self) -> &str {
        &self.default_network
    }

    /// Validate the configuration and bind networks from `env`.
    ///
    /// Fails only on static configuration problems; missing secrets are left
    /// for the orchestrator to reject at the point of use.
    pub fn resolve(&self, env: &Environment) -> Result<ResolvedConfig, DeployError> {
        let compilers = resolve_compiler_profiles(&self.compilers)?;

        if let Some(name) = self.networks.keys().find(|name| name.trim().is_empty()) {
            return Err(DeployError::Configuration(format!(
                "Invalid network name '{}'",
                name
            )));
        }

        if !self.networks.contains_key(&self.default_network) {
            return Err(DeployError::Configuration(format!(
                "Default network '{}' is not declared",
                self.default_network
            )));
        }

        Ok(ResolvedConfig {
            compilers,
            networks: resolve_network_profiles(&self.networks, env),
            default_network: self.default_network.clone(),
            gas_reporter: GasReporter {
                enabled: env.contains(&self.gas_reporter.enabled_env),
                currency: self.gas_reporter.currency.clone(),
            },
        })
    }
}

/// Whether and how to report gas after deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasReporter {
    pub enabled: bool,
    pub currency: String,
}

/// Immutable, validated configuration produced once at process start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Compiler profiles in resolution priority order.
    pub compilers: Vec<CompilerProfile>,
    /// Network profiles keyed by name.
    pub networks: BTreeMap<String, NetworkProfile>,
    pub default_network: String,
    pub gas_reporter: GasReporter,
}

impl ResolvedConfig {
    /// The statically configured default network.
    pub fn select_default_network(&self) -> &str {
        &self.default_network
    }

    /// Profile for `name`, or for the default network when `name` is `None`.
    pub fn network(&self, name: Option<&str>) -> Result<&NetworkProfile, DeployError> {
        let name = name.unwrap_or(&self.default_network);
        self.networks.get(name).ok_or_else(|| {
            DeployError::Configuration(format!(
                "Unknown network '{}' (declared: {})",
                name,
                self.networks.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }
}
