//! `solc` invoked in `--standard-json` mode.

use std::{collections::BTreeMap, process::Stdio};

use alloy_core::primitives::Bytes;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::{CompiledArtifact, CompilerOutput, CompilerProfile, ContractCompiler, SourceSet};
use crate::DeployError;

/// Solidity compiler driven through its standard JSON interface.
///
/// By default each profile runs the `solc-<version>` executable found in `$PATH`.
#[derive(Debug, Clone, Default)]
pub struct SolcCompiler {
    /// Executable used for every profile instead of `solc-<version>`.
    executable: Option<String>,
}

impl SolcCompiler {
    /// Create a compiler that resolves `solc-<version>` per profile.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a single executable for every profile.
    pub fn with_executable(executable: impl Into<String>) -> Self {
        Self {
            executable: Some(executable.into()),
        }
    }

    /// The executable name used for `profile`.
    pub fn executable_for(&self, profile: &CompilerProfile) -> String {
        self.executable
            .clone()
            .unwrap_or_else(|| format!("solc-{}", profile.version))
    }

    async fn run(&self, executable: &str, input: &StandardJsonInput) -> anyhow::Result<Vec<u8>> {
        let input_json = serde_json::to_vec(input).context("Failed to serialize solc input")?;

        let mut child = tokio::process::Command::new(executable)
            .arg("--standard-json")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", executable))?;

        let mut stdin = child
            .stdin
            .take()
            .with_context(|| format!("Failed to open {} stdin", executable))?;
        stdin
            .write_all(&input_json)
            .await
            .with_context(|| format!("Failed to write {} stdin", executable))?;
        drop(stdin);

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("Failed to wait for {}", executable))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} exited with {}: {}",
                executable,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(output.stdout)
    }
}

impl ContractCompiler for SolcCompiler {
    async fn compile(
        &self,
        sources: &SourceSet,
        profile: &CompilerProfile,
    ) -> Result<CompilerOutput, DeployError> {
        let executable = self.executable_for(profile);
        let input = StandardJsonInput::new(sources, profile);

        tracing::debug!(
            executable = %executable,
            sources = sources.len(),
            optimizer = profile.optimizer.enabled,
            runs = profile.optimizer.runs,
            "Running solc"
        );

        let stdout = self
            .run(&executable, &input)
            .await
            .map_err(DeployError::compilation)?;

        let output: StandardJsonOutput = serde_json::from_slice(&stdout)
            .context("Failed to parse solc output")
            .map_err(DeployError::compilation)?;

        output.into_compiler_output()
    }
}

#[derive(Debug, Serialize)]
struct StandardJsonInput {
    language: &'static str,
    sources: BTreeMap<String, SourceContent>,
    settings: Settings,
}

#[derive(Debug, Serialize)]
struct SourceContent {
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Settings {
    optimizer: OptimizerInput,
    output_selection: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct OptimizerInput {
    enabled: bool,
    runs: u32,
}

impl StandardJsonInput {
    fn new(sources: &SourceSet, profile: &CompilerProfile) -> Self {
        Self {
            language: "Solidity",
            sources: sources
                .iter()
                .map(|(path, content)| {
                    (
                        path.clone(),
                        SourceContent {
                            content: content.clone(),
                        },
                    )
                })
                .collect(),
            settings: Settings {
                optimizer: OptimizerInput {
                    enabled: profile.optimizer.enabled,
                    runs: profile.optimizer.runs,
                },
                output_selection: serde_json::json!({
                    "*": { "*": ["abi", "evm.bytecode.object"] }
                }),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct StandardJsonOutput {
    #[serde(default)]
    errors: Vec<Diagnostic>,
    #[serde(default)]
    contracts: BTreeMap<String, BTreeMap<String, ContractOutput>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Diagnostic {
    severity: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    formatted_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContractOutput {
    #[serde(default)]
    abi: serde_json::Value,
    evm: EvmOutput,
}

#[derive(Debug, Deserialize)]
struct EvmOutput {
    bytecode: BytecodeOutput,
}

#[derive(Debug, Deserialize)]
struct BytecodeOutput {
    object: String,
}

impl StandardJsonOutput {
    fn into_compiler_output(self) -> Result<CompilerOutput, DeployError> {
        let errors: Vec<String> = self
            .errors
            .iter()
            .filter(|d| d.severity == "error")
            .map(|d| d.formatted_message.clone().unwrap_or_else(|| d.message.clone()))
            .collect();

        for warning in self.errors.iter().filter(|d| d.severity == "warning") {
            tracing::warn!(message = %warning.message, "solc warning");
        }

        if !errors.is_empty() {
            return Err(DeployError::Compilation(errors.join("\n")));
        }

        let mut artifacts = Vec::new();
        for (source, contracts) in self.contracts {
            for (name, contract) in contracts {
                let object = contract.evm.bytecode.object;
                // Unlinked library references show up as `__$...$__` placeholders.
                let bytecode = hex::decode(object.trim_start_matches("0x")).map_err(|e| {
                    DeployError::Compilation(format!(
                        "Bytecode for {}:{} is not valid hex (unlinked library?): {}",
                        source, name, e
                    ))
                })?;
                artifacts.push(CompiledArtifact {
                    source: source.clone(),
                    name,
                    abi: contract.abi,
                    bytecode: Bytes::from(bytecode),
                });
            }
        }

        Ok(CompilerOutput { artifacts })
    }
}
