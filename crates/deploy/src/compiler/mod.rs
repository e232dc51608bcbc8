//! Compiler profiles, source loading and contract compilation.

mod imports;
mod pragma;
mod solc;

use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
    path::{Path, PathBuf},
};

use alloy_core::primitives::Bytes;
use anyhow::Context;
use derive_more::Deref;
use semver::Version;
use serde::{Deserialize, Serialize};

pub use imports::{extract_imports, resolve_import};
pub use pragma::{PragmaRequirement, extract_pragmas};
pub use solc::SolcCompiler;

use crate::DeployError;

/// Optimizer settings attached to a compiler profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptimizerSettings {
    /// Whether the optimizer runs.
    #[serde(default)]
    pub enabled: bool,
    /// Expected number of contract runs the optimizer tunes for.
    #[serde(default = "default_runs")]
    pub runs: u32,
}

fn default_runs() -> u32 {
    200
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            runs: default_runs(),
        }
    }
}

/// A compiler version declaration as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerDecl {
    /// Semantic compiler version, e.g. `0.8.7`.
    pub version: String,
    /// Optimizer settings; disabled when omitted.
    #[serde(default)]
    pub optimizer: OptimizerSettings,
}

impl CompilerDecl {
    /// Declare a compiler version with the optimizer disabled.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            optimizer: OptimizerSettings::default(),
        }
    }

    /// Enable the optimizer with the given number of runs.
    pub fn optimized(mut self, runs: u32) -> Self {
        self.optimizer = OptimizerSettings {
            enabled: true,
            runs,
        };
        self
    }
}

/// A validated compiler version plus optimizer settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompilerProfile {
    pub version: Version,
    pub optimizer: OptimizerSettings,
}

/// Validate compiler declarations into profiles, preserving declaration order.
///
/// Order is the version-resolution priority when selecting a profile for a source set.
pub fn resolve_compiler_profiles(
    decls: &[CompilerDecl],
) -> Result<Vec<CompilerProfile>, DeployError> {
    if decls.is_empty() {
        return Err(DeployError::Configuration(
            "At least one compiler version must be declared".to_string(),
        ));
    }

    decls
        .iter()
        .map(|decl| {
            let version = Version::parse(decl.version.trim()).map_err(|e| {
                DeployError::Configuration(format!(
                    "Invalid compiler version '{}': {}",
                    decl.version, e
                ))
            })?;
            Ok(CompilerProfile {
                version,
                optimizer: decl.optimizer,
            })
        })
        .collect()
}

/// Solidity sources keyed by their path relative to the contracts directory's parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref)]
pub struct SourceSet(BTreeMap<String, String>);

impl SourceSet {
    /// Add or replace a source file.
    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) {
        self.0.insert(path.into(), content.into());
    }

    /// Recursively load every `.sol` file under `dir`.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let base = dir.parent().unwrap_or(Path::new(""));
        let mut sources = Self::default();
        let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];

        while let Some(current) = pending.pop() {
            let entries = std::fs::read_dir(&current)
                .with_context(|| format!("Failed to read sources directory {}", current.display()))?;

            for entry in entries {
                let path = entry
                    .with_context(|| format!("Failed to list {}", current.display()))?
                    .path();

                if path.is_dir() {
                    pending.push(path);
                } else if path.extension().is_some_and(|ext| ext == "sol") {
                    let content = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let key = path.strip_prefix(base).unwrap_or(&path);
                    sources.insert(key.to_string_lossy().replace('\\', "/"), content);
                }
            }
        }

        tracing::debug!(dir = %dir.display(), files = sources.len(), "Loaded Solidity sources");
        Ok(sources)
    }
}

/// One compiled contract.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledArtifact {
    /// Source path the contract was declared in.
    pub source: String,
    /// Contract name.
    pub name: String,
    /// Contract ABI as emitted by the compiler.
    pub abi: serde_json::Value,
    /// Creation bytecode.
    pub bytecode: Bytes,
}

impl CompiledArtifact {
    /// Fully qualified `source:name` identifier.
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.source, self.name)
    }
}

/// Everything a compiler run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompilerOutput {
    pub artifacts: Vec<CompiledArtifact>,
}

impl CompilerOutput {
    /// Find the artifact named by `contract`.
    ///
    /// Accepts either a bare contract name or a `source:name` identifier. A bare
    /// name matching contracts in several files is ambiguous.
    pub fn artifact(&self, contract: &str) -> Result<&CompiledArtifact, DeployError> {
        let matches: Vec<&CompiledArtifact> = match contract.rsplit_once(':') {
            Some((source, name)) => self
                .artifacts
                .iter()
                .filter(|a| a.source == source && a.name == name)
                .collect(),
            None => self.artifacts.iter().filter(|a| a.name == contract).collect(),
        };

        match matches.as_slice() {
            [artifact] => Ok(*artifact),
            [] => Err(DeployError::Compilation(format!(
                "Contract '{}' not found in compiler output",
                contract
            ))),
            many => Err(DeployError::Compilation(format!(
                "Contract name '{}' is ambiguous: {}",
                contract,
                many.iter()
                    .map(|a| a.qualified_name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

/// External compiler toolchain.
pub trait ContractCompiler: Send + Sync {
    /// Compile `sources` with a single profile.
    fn compile(
        &self,
        sources: &SourceSet,
        profile: &CompilerProfile,
    ) -> impl Future<Output = Result<CompilerOutput, DeployError>> + Send;
}

impl<T: ContractCompiler> ContractCompiler for &T {
    fn compile(
        &self,
        sources: &SourceSet,
        profile: &CompilerProfile,
    ) -> impl Future<Output = Result<CompilerOutput, DeployError>> + Send {
        (**self).compile(sources, profile)
    }
}

/// One compiler invocation: a profile and the files it builds.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationJob<'a> {
    pub profile: &'a CompilerProfile,
    /// Files whose artifacts this job produces.
    pub roots: BTreeSet<String>,
    /// The roots plus everything they import.
    pub sources: SourceSet,
}

/// Split `sources` into one job per compiler profile.
///
/// Each file is assigned to the first profile, in declaration order, that
/// satisfies the pragmas of the file and of everything it imports. Files with
/// no compatible profile fail the whole plan.
pub fn plan_compilation<'a>(
    profiles: &'a [CompilerProfile],
    sources: &SourceSet,
) -> Result<Vec<CompilationJob<'a>>, DeployError> {
    let mut requirements: BTreeMap<&str, Vec<PragmaRequirement>> = BTreeMap::new();
    let mut graph: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (path, content) in sources.iter() {
        let pragmas = extract_pragmas(path, content).map_err(DeployError::compilation)?;
        requirements.insert(path, pragmas);

        let local_imports = extract_imports(content)
            .iter()
            .map(|import| resolve_import(path, import))
            .filter(|import| sources.contains_key(import))
            .collect();
        graph.insert(path, local_imports);
    }

    let mut jobs: BTreeMap<usize, CompilationJob<'a>> = BTreeMap::new();
    for path in sources.keys() {
        let closure = imports::import_closure(path, &graph);
        let constraints: Vec<&PragmaRequirement> = closure
            .iter()
            .filter_map(|file| requirements.get(file.as_str()))
            .flatten()
            .collect();

        let index = profiles
            .iter()
            .position(|profile| constraints.iter().all(|req| req.matches(&profile.version)))
            .ok_or_else(|| no_compatible_profile(profiles, path, &constraints))?;

        let job = jobs.entry(index).or_insert_with(|| CompilationJob {
            profile: &profiles[index],
            roots: BTreeSet::new(),
            sources: SourceSet::default(),
        });
        job.roots.insert(path.clone());
        for file in closure {
            let content = sources[&file].clone();
            job.sources.insert(file, content);
        }
    }

    Ok(jobs.into_values().collect())
}

fn no_compatible_profile(
    profiles: &[CompilerProfile],
    path: &str,
    constraints: &[&PragmaRequirement],
) -> DeployError {
    let constraints = constraints
        .iter()
        .map(|req| format!("{} ({})", req.raw, req.path))
        .collect::<Vec<_>>()
        .join(", ");
    let versions = profiles
        .iter()
        .map(|p| p.version.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    DeployError::Compilation(format!(
        "No configured compiler version [{}] satisfies {} required by {}",
        versions, constraints, path
    ))
}

/// Compile `sources` and return the creation artifact for `contract`.
pub async fn compile_contract<C: ContractCompiler>(
    compiler: &C,
    sources: &SourceSet,
    profiles: &[CompilerProfile],
    contract: &str,
) -> Result<CompiledArtifact, DeployError> {
    if sources.is_empty() {
        return Err(DeployError::Compilation(
            "No Solidity sources found".to_string(),
        ));
    }

    let jobs = plan_compilation(profiles, sources)?;
    let mut output = CompilerOutput::default();
    for job in &jobs {
        tracing::info!(
            contract,
            version = %job.profile.version,
            optimizer = job.profile.optimizer.enabled,
            files = job.sources.len(),
            "Compiling sources"
        );
        let job_output = compiler.compile(&job.sources, job.profile).await?;
        output.artifacts.extend(
            job_output
                .artifacts
                .into_iter()
                .filter(|artifact| job.roots.contains(&artifact.source)),
        );
    }

    let artifact = output.artifact(contract)?;

    if artifact.bytecode.is_empty() {
        return Err(DeployError::Compilation(format!(
            "Contract '{}' has no creation bytecode (abstract contract or interface?)",
            artifact.qualified_name()
        )));
    }

    Ok(artifact.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn profiles(versions: &[&str]) -> Vec<CompilerProfile> {
        let decls: Vec<CompilerDecl> = versions.iter().map(|v| CompilerDecl::new(*v)).collect();
        resolve_compiler_profiles(&decls).unwrap()
    }

    fn sources(files: &[(&str, &str)]) -> SourceSet {
        let mut set = SourceSet::default();
        for (path, content) in files {
            set.insert(*path, *content);
        }
        set
    }

    #[test]
    fn test_resolve_preserves_order() {
        let decls = vec![
            CompilerDecl::new("0.8.7").optimized(200),
            CompilerDecl::new("0.8.1"),
            CompilerDecl::new("0.6.2"),
        ];
        let resolved = resolve_compiler_profiles(&decls).unwrap();

        let versions: Vec<String> = resolved.iter().map(|p| p.version.to_string()).collect();
        assert_eq!(versions, vec!["0.8.7", "0.8.1", "0.6.2"]);
        assert!(resolved[0].optimizer.enabled);
        assert_eq!(resolved[0].optimizer.runs, 200);
        assert!(!resolved[1].optimizer.enabled);
    }

    #[test]
    fn test_resolve_rejects_empty() {
        let err = resolve_compiler_profiles(&[]).unwrap_err();
        assert!(matches!(err, DeployError::Configuration(_)));
    }

    #[test]
    fn test_resolve_rejects_malformed_version() {
        for bad in ["0.8", "latest", "", "v0.8.7", "0.8.x"] {
            let err = resolve_compiler_profiles(&[CompilerDecl::new("0.8.7"), CompilerDecl::new(bad)])
                .unwrap_err();
            assert!(matches!(err, DeployError::Configuration(_)), "accepted {:?}", bad);
        }
    }

    /// `(version, roots, sources)` of every planned job.
    fn plan(profiles: &[CompilerProfile], set: &SourceSet) -> Vec<(String, Vec<String>, Vec<String>)> {
        plan_compilation(profiles, set)
            .unwrap()
            .into_iter()
            .map(|job| {
                (
                    job.profile.version.to_string(),
                    job.roots.into_iter().collect(),
                    job.sources.keys().cloned().collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_plan_in_declaration_order() {
        let profiles = profiles(&["0.8.7", "0.8.1", "0.8.0", "0.7.3", "0.6.2"]);

        let set = sources(&[("a.sol", "pragma solidity ^0.8.0;")]);
        assert_eq!(plan(&profiles, &set)[0].0, "0.8.7");

        let set = sources(&[("a.sol", "pragma solidity >=0.6.0 <0.8.0;")]);
        assert_eq!(plan(&profiles, &set)[0].0, "0.7.3");

        let set = sources(&[("a.sol", "pragma solidity 0.8.1;")]);
        assert_eq!(plan(&profiles, &set)[0].0, "0.8.1");
    }

    #[test]
    fn test_plan_groups_mixed_versions() {
        let profiles = profiles(&["0.8.7", "0.8.1", "0.8.0", "0.7.3", "0.6.2"]);
        let set = sources(&[
            ("contracts/JuiceBox.sol", "pragma solidity ^0.8.0;"),
            ("contracts/Token.sol", "pragma solidity ^0.8.0;"),
            ("contracts/legacy/Old.sol", "pragma solidity ^0.6.2;"),
        ]);

        assert_eq!(
            plan(&profiles, &set),
            vec![
                (
                    "0.8.7".to_string(),
                    vec!["contracts/JuiceBox.sol".to_string(), "contracts/Token.sol".to_string()],
                    vec!["contracts/JuiceBox.sol".to_string(), "contracts/Token.sol".to_string()],
                ),
                (
                    "0.6.2".to_string(),
                    vec!["contracts/legacy/Old.sol".to_string()],
                    vec!["contracts/legacy/Old.sol".to_string()],
                ),
            ]
        );
    }

    #[test]
    fn test_plan_follows_imports() {
        let profiles = profiles(&["0.8.7", "0.8.1", "0.6.2"]);
        let set = sources(&[
            ("contracts/A.sol", "pragma solidity ^0.8.0;\nimport \"./lib/B.sol\";"),
            ("contracts/lib/B.sol", "pragma solidity <=0.8.1;"),
            ("contracts/C.sol", "pragma solidity ^0.6.2;\nimport \"./Shared.sol\";"),
            ("contracts/Shared.sol", "pragma solidity >=0.6.0;"),
        ]);

        let jobs = plan(&profiles, &set);
        assert_eq!(jobs.len(), 3);

        assert_eq!(jobs[0].0, "0.8.7");
        assert_eq!(jobs[0].1, vec!["contracts/Shared.sol"]);

        // A is held back to 0.8.1 by the file it imports.
        assert_eq!(jobs[1].0, "0.8.1");
        assert_eq!(jobs[1].1, vec!["contracts/A.sol", "contracts/lib/B.sol"]);

        // Shared is built again alongside C but only C is a root there.
        assert_eq!(jobs[2].0, "0.6.2");
        assert_eq!(jobs[2].1, vec!["contracts/C.sol"]);
        assert_eq!(jobs[2].2, vec!["contracts/C.sol", "contracts/Shared.sol"]);
    }

    #[test]
    fn test_plan_none_match() {
        let profiles = profiles(&["0.8.7", "0.6.2"]);
        let set = sources(&[
            ("a.sol", "pragma solidity ^0.5.0;"),
            ("b.sol", "pragma solidity ^0.8.0;"),
        ]);
        let err = plan_compilation(&profiles, &set).unwrap_err();
        assert!(matches!(err, DeployError::Compilation(_)));
        assert!(err.to_string().contains("^0.5.0 (a.sol)"));
    }

    #[test]
    fn test_plan_without_pragma_takes_first() {
        let profiles = profiles(&["0.8.7", "0.6.2"]);
        let set = sources(&[("a.sol", "contract A {}")]);
        assert_eq!(plan(&profiles, &set)[0].0, "0.8.7");
    }

    fn artifact(source: &str, name: &str) -> CompiledArtifact {
        CompiledArtifact {
            source: source.to_string(),
            name: name.to_string(),
            abi: serde_json::json!([]),
            bytecode: Bytes::from_static(&[0x60, 0x80]),
        }
    }

    #[test]
    fn test_artifact_lookup() {
        let output = CompilerOutput {
            artifacts: vec![
                artifact("contracts/JuiceBox.sol", "JuiceBox"),
                artifact("contracts/A.sol", "Token"),
                artifact("contracts/B.sol", "Token"),
            ],
        };

        assert_eq!(output.artifact("JuiceBox").unwrap().name, "JuiceBox");
        assert_eq!(
            output.artifact("contracts/B.sol:Token").unwrap().source,
            "contracts/B.sol"
        );
        assert!(output.artifact("Token").unwrap_err().to_string().contains("ambiguous"));
        assert!(matches!(
            output.artifact("Missing"),
            Err(DeployError::Compilation(_))
        ));
    }

    #[test]
    fn test_load_sources_recursively() {
        let dir = TempDir::new("juice-sources").unwrap();
        let contracts = dir.path().join("contracts");
        std::fs::create_dir_all(contracts.join("lib")).unwrap();
        std::fs::write(contracts.join("JuiceBox.sol"), "pragma solidity ^0.8.0;").unwrap();
        std::fs::write(contracts.join("lib/Util.sol"), "pragma solidity ^0.8.0;").unwrap();
        std::fs::write(contracts.join("README.md"), "not solidity").unwrap();

        let set = SourceSet::load(&contracts).unwrap();
        let paths: Vec<&String> = set.keys().collect();
        assert_eq!(paths, vec!["contracts/JuiceBox.sol", "contracts/lib/Util.sol"]);
    }

    #[test]
    fn test_load_missing_directory() {
        let dir = TempDir::new("juice-sources").unwrap();
        assert!(SourceSet::load(&dir.path().join("nope")).is_err());
    }

    struct FixedCompiler(CompilerOutput);

    impl ContractCompiler for FixedCompiler {
        async fn compile(
            &self,
            _sources: &SourceSet,
            _profile: &CompilerProfile,
        ) -> Result<CompilerOutput, DeployError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_compile_contract_rejects_empty_bytecode() {
        let mut empty = artifact("a.sol", "IThing");
        empty.bytecode = Bytes::new();
        let compiler = FixedCompiler(CompilerOutput {
            artifacts: vec![empty],
        });
        let set = sources(&[("a.sol", "pragma solidity ^0.8.0;")]);

        let err = compile_contract(&compiler, &set, &profiles(&["0.8.7"]), "IThing")
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Compilation(_)));
    }

    #[tokio::test]
    async fn test_compile_contract_rejects_empty_sources() {
        let compiler = FixedCompiler(CompilerOutput::default());
        let err = compile_contract(&compiler, &SourceSet::default(), &profiles(&["0.8.7"]), "A")
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Compilation(_)));
    }
}
