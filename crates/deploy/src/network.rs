//! Network profiles bound from an explicit environment snapshot.

use std::{collections::BTreeMap, ffi::OsString, fmt};

use alloy_core::primitives::{Address, keccak256};
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::DeployError;

/// Immutable snapshot of the key/value environment the resolver reads from.
///
/// Built once at process start and passed down explicitly. Values are never
/// printed by [`fmt::Debug`] since they hold secrets.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Environment(BTreeMap<String, String>);

impl Environment {
    /// Snapshot the current process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn from_process() -> Self {
        Self::from_os_vars(std::env::vars_os())
    }

    fn from_os_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        vars.into_iter()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect()
    }

    /// Value for `key`, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether `key` is set at all, even to an empty value.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

/// Hex-encoded signing secret for one network.
///
/// The value is opaque to the resolver; it is only parsed when signing.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PrivateKey(String);

impl PrivateKey {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Raw secret. Callers must not log or persist it.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    /// Parse the secret as a secp256k1 key. An optional `0x` prefix is accepted.
    pub fn signing_key(&self) -> Result<SigningKey, DeployError> {
        let secret = self.0.trim();
        let secret = secret.strip_prefix("0x").unwrap_or(secret);

        let bytes = hex::decode(secret)
            .map_err(|_| DeployError::Credential("Private key is not valid hex".to_string()))?;
        if bytes.len() != 32 {
            return Err(DeployError::Credential(format!(
                "Private key must be 32 bytes, got {}",
                bytes.len()
            )));
        }

        SigningKey::from_slice(&bytes)
            .map_err(|_| DeployError::Credential("Private key is not a valid secp256k1 scalar".to_string()))
    }

    /// Address of the account controlled by this key.
    pub fn address(&self) -> Result<Address, DeployError> {
        Ok(signer_address(&self.signing_key()?))
    }
}

/// Derive the Ethereum address of a signing key.
pub fn signer_address(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    // Skip the 0x04 uncompressed marker.
    let hash = keccak256(&point.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("PrivateKey(<empty>)")
        } else {
            f.write_str("PrivateKey(<redacted>)")
        }
    }
}

/// Declaration of a network as written in configuration.
///
/// The URL and credential are looked up by environment key. A literal `url`
/// is used when no `url_env` key is declared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDecl {
    /// Environment key holding the RPC endpoint URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_env: Option<String>,
    /// Literal RPC endpoint URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Environment key holding the hex-encoded private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_env: Option<String>,
}

impl NetworkDecl {
    /// Declare a network whose URL and credential come from the environment.
    pub fn from_env(url_env: impl Into<String>, credential_env: impl Into<String>) -> Self {
        Self {
            url_env: Some(url_env.into()),
            url: None,
            credential_env: Some(credential_env.into()),
        }
    }

    /// Declare an in-process network with no endpoint and no credential.
    pub fn in_memory() -> Self {
        Self::default()
    }
}

/// A named deployment target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkProfile {
    pub name: String,
    /// RPC endpoint URL; empty when not configured.
    pub url: String,
    /// Signing credential; empty when not configured.
    pub credential: PrivateKey,
}

impl NetworkProfile {
    /// Validate the deferred fields before any network interaction.
    ///
    /// Returns the parsed endpoint on success.
    pub fn ensure_deployable(&self) -> Result<Url, DeployError> {
        if self.url.trim().is_empty() {
            return Err(DeployError::Credential(format!(
                "Network '{}' has no RPC endpoint URL configured",
                self.name
            )));
        }
        if self.credential.is_empty() {
            return Err(DeployError::Credential(format!(
                "Network '{}' has no signing credential configured",
                self.name
            )));
        }

        Url::parse(self.url.trim()).map_err(|e| {
            DeployError::Credential(format!(
                "Network '{}' has an invalid RPC endpoint URL: {}",
                self.name, e
            ))
        })
    }
}

/// Bind every declared network to its URL and credential from `env`.
///
/// Missing keys resolve to empty placeholders; validation happens at the point
/// of use so that networks not used in a run need no secrets.
pub fn resolve_network_profiles(
    decls: &BTreeMap<String, NetworkDecl>,
    env: &Environment,
) -> BTreeMap<String, NetworkProfile> {
    decls
        .iter()
        .map(|(name, decl)| {
            let lookup = |key: &Option<String>| {
                key.as_deref()
                    .and_then(|key| env.get(key))
                    .unwrap_or_default()
                    .to_string()
            };

            let url = match &decl.url_env {
                Some(_) => lookup(&decl.url_env),
                None => decl.url.clone().unwrap_or_default(),
            };

            let profile = NetworkProfile {
                name: name.clone(),
                url,
                credential: PrivateKey::new(lookup(&decl.credential_env)),
            };
            (name.clone(), profile)
        })
        .collect()
}
