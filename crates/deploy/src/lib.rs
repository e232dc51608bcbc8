//! juice-deploy - Build and deployment library for a single smart contract.
//!
//! This crate resolves the compiler and network configuration for a project
//! and runs one compile-submit-confirm deployment attempt against it.

mod client;
pub use client::{Confirmation, JsonRpcClient, NetworkClient, TxHandle};

pub mod compiler;
pub use compiler::{
    CompilationJob, CompiledArtifact, CompilerDecl, CompilerOutput, CompilerProfile,
    ContractCompiler, OptimizerSettings, SolcCompiler, SourceSet, compile_contract,
    plan_compilation, resolve_compiler_profiles,
};

mod config;
pub use config::{
    CONFIG_FILENAME, DEFAULT_CONTRACT, DEFAULT_GAS_PRICE, DEFAULT_NETWORK, DeployConfig,
    GasReporter, GasReporterConfig, ResolvedConfig,
};

mod deployer;
pub use deployer::{
    DeployedContract, Deployer, DeploymentOutcome, DeploymentRequest, DeploymentResult,
    DeploymentState,
};

mod error;
pub use error::DeployError;

pub mod network;
pub use network::{
    Environment, NetworkDecl, NetworkProfile, PrivateKey, resolve_network_profiles,
};

pub mod rpc;

mod transaction;
pub use transaction::{GasPrice, LegacyTransaction, SignedTransaction, create_address};
