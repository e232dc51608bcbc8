use std::{path::PathBuf, time::Duration};

use alloy_core::primitives::{Address, B256, U256, utils::format_ether};

use crate::{
    CompilerProfile, Confirmation, ContractCompiler, DeployError, GasPrice, GasReporter,
    NetworkClient, NetworkProfile, SourceSet, compile_contract,
};

/// Where the orchestrator reads Solidity sources from.
#[derive(Debug, Clone)]
enum Sources {
    Dir(PathBuf),
    Inline(SourceSet),
}

/// States of a single deployment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum DeploymentState {
    Idle,
    Compiling,
    Submitting,
    AwaitingConfirmation,
    Succeeded,
    Failed,
    TimedOut,
}

/// One attempt to deploy a named contract to a resolved network.
#[derive(Debug, Clone)]
pub struct DeploymentRequest<'a> {
    /// Contract name, or `source:name`.
    pub contract: String,
    /// Target network; borrowed, never mutated.
    pub network: &'a NetworkProfile,
    /// Fixed gas price in wei as supplied by the caller.
    pub gas_price: i64,
}

impl<'a> DeploymentRequest<'a> {
    pub fn new(contract: impl Into<String>, network: &'a NetworkProfile, gas_price: i64) -> Self {
        Self {
            contract: contract.into(),
            network,
            gas_price,
        }
    }
}

/// A confirmed on-chain deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedContract {
    pub address: Address,
    pub tx_hash: B256,
    pub gas_used: u64,
    /// `gas_used * gas_price`, in wei.
    pub gas_cost_wei: u128,
}

/// Terminal outcome of a deployment attempt.
#[derive(Debug)]
pub enum DeploymentOutcome {
    Succeeded(DeployedContract),
    Failed {
        /// State the attempt was in when it failed.
        stage: DeploymentState,
        error: DeployError,
    },
    /// Confirmation did not arrive in time. The transaction stays pending on-chain.
    TimedOut { tx_hash: B256, waited: Duration },
}

/// Result of [`Deployer::deploy`].
#[derive(Debug)]
pub struct DeploymentResult {
    pub contract: String,
    pub network: String,
    pub outcome: DeploymentOutcome,
}

impl DeploymentResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, DeploymentOutcome::Succeeded(_))
    }

    /// Deployed address; only present after confirmation.
    pub fn address(&self) -> Option<Address> {
        match &self.outcome {
            DeploymentOutcome::Succeeded(deployed) => Some(deployed.address),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DeployError> {
        match &self.outcome {
            DeploymentOutcome::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Terminal state reached by the attempt.
    pub fn state(&self) -> DeploymentState {
        match self.outcome {
            DeploymentOutcome::Succeeded(_) => DeploymentState::Succeeded,
            DeploymentOutcome::Failed { .. } => DeploymentState::Failed,
            DeploymentOutcome::TimedOut { .. } => DeploymentState::TimedOut,
        }
    }

    /// Human-readable line naming success or the failure kind.
    pub fn status_line(&self) -> String {
        match &self.outcome {
            DeploymentOutcome::Succeeded(deployed) => format!(
                "{} contract deployed to address: {} (network: {}, tx: {})",
                self.contract, deployed.address, self.network, deployed.tx_hash
            ),
            DeploymentOutcome::Failed { stage, error } => format!(
                "{} deployment to {} failed while {} with {}: {}",
                self.contract,
                self.network,
                stage,
                error.kind(),
                error
            ),
            DeploymentOutcome::TimedOut { tx_hash, waited } => format!(
                "{} deployment to {} timed out after {}s waiting for {}; the transaction may still be mined",
                self.contract,
                self.network,
                waited.as_secs(),
                tx_hash
            ),
        }
    }
}

/// Runs exactly one deployment attempt per call.
///
/// Compiles with the resolved profile sequence, submits through the network
/// client, waits for confirmation, and never retries.
pub struct Deployer<C, N> {
    compiler: C,
    network: N,
    profiles: Vec<CompilerProfile>,
    sources: Sources,
    confirmation_timeout: Option<Duration>,
    gas_reporter: Option<GasReporter>,
}

impl<C: ContractCompiler, N: NetworkClient> Deployer<C, N> {
    /// Create a deployer reading sources from `./contracts`.
    pub fn new(compiler: C, network: N, profiles: Vec<CompilerProfile>) -> Self {
        Self {
            compiler,
            network,
            profiles,
            sources: Sources::Dir(PathBuf::from("contracts")),
            confirmation_timeout: None,
            gas_reporter: None,
        }
    }

    /// Read sources from `dir` at compile time.
    pub fn contracts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sources = Sources::Dir(dir.into());
        self
    }

    /// Compile an in-memory source set instead of reading a directory.
    pub fn sources(mut self, sources: SourceSet) -> Self {
        self.sources = Sources::Inline(sources);
        self
    }

    /// Stop waiting for confirmation after `timeout`.
    pub fn confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn gas_reporter(mut self, reporter: GasReporter) -> Self {
        self.gas_reporter = reporter.enabled.then_some(reporter);
        self
    }

    /// Execute one deployment attempt and report its outcome.
    pub async fn deploy(&self, request: DeploymentRequest<'_>) -> DeploymentResult {
        let mut stage = DeploymentState::Idle;
        let outcome = match self.execute(&request, &mut stage).await {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::error!(
                    contract = %request.contract,
                    network = %request.network.name,
                    stage = %stage,
                    kind = error.kind(),
                    "Deployment failed"
                );
                DeploymentOutcome::Failed { stage, error }
            }
        };

        DeploymentResult {
            contract: request.contract,
            network: request.network.name.clone(),
            outcome,
        }
    }

    async fn execute(
        &self,
        request: &DeploymentRequest<'_>,
        stage: &mut DeploymentState,
    ) -> Result<DeploymentOutcome, DeployError> {
        let gas_price = GasPrice::new(request.gas_price)?;

        enter(stage, DeploymentState::Compiling);
        let sources = match &self.sources {
            Sources::Dir(dir) => SourceSet::load(dir).map_err(DeployError::compilation)?,
            Sources::Inline(sources) => sources.clone(),
        };
        let artifact =
            compile_contract(&self.compiler, &sources, &self.profiles, &request.contract).await?;

        enter(stage, DeploymentState::Submitting);
        let endpoint = request.network.ensure_deployable()?;
        tracing::info!(
            contract = %artifact.qualified_name(),
            network = %request.network.name,
            %gas_price,
            bytecode_len = artifact.bytecode.len(),
            "Submitting contract creation"
        );
        let handle = self
            .network
            .submit_contract_creation(
                &endpoint,
                &request.network.credential,
                &artifact.bytecode,
                gas_price,
            )
            .await?;
        tracing::info!(tx_hash = %handle.hash, sender = %handle.sender, "Transaction submitted");

        enter(stage, DeploymentState::AwaitingConfirmation);
        let waiting = self.network.await_confirmation(&endpoint, &handle);
        let confirmation = match self.confirmation_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, waiting).await {
                Ok(confirmation) => confirmation?,
                Err(_) => {
                    enter(stage, DeploymentState::TimedOut);
                    tracing::warn!(tx_hash = %handle.hash, "Timed out waiting for confirmation");
                    return Ok(DeploymentOutcome::TimedOut {
                        tx_hash: handle.hash,
                        waited: timeout,
                    });
                }
            },
            None => waiting.await?,
        };

        match confirmation {
            Confirmation::Mined { address, gas_used } => {
                enter(stage, DeploymentState::Succeeded);
                let deployed = DeployedContract {
                    address,
                    tx_hash: handle.hash,
                    gas_used,
                    gas_cost_wei: u128::from(gas_used) * gas_price.wei(),
                };
                self.report_gas(&request.contract, &deployed);
                Ok(DeploymentOutcome::Succeeded(deployed))
            }
            Confirmation::Reverted { reason } => Err(DeployError::TransactionReverted {
                tx_hash: handle.hash.to_string(),
                reason,
            }),
        }
    }

    fn report_gas(&self, contract: &str, deployed: &DeployedContract) {
        let Some(reporter) = &self.gas_reporter else {
            return;
        };
        tracing::info!(
            contract,
            gas_used = deployed.gas_used,
            cost_wei = %deployed.gas_cost_wei,
            cost_eth = %format_ether(U256::from(deployed.gas_cost_wei)),
            currency = %reporter.currency,
            "Gas report"
        );
    }
}

fn enter(stage: &mut DeploymentState, next: DeploymentState) {
    tracing::debug!(from = %stage, to = %next, "Deployment state transition");
    *stage = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::address;

    fn result(outcome: DeploymentOutcome) -> DeploymentResult {
        DeploymentResult {
            contract: "JuiceBox".to_string(),
            network: "rinkeby".to_string(),
            outcome,
        }
    }

    #[test]
    fn test_success_status_line() {
        let result = result(DeploymentOutcome::Succeeded(DeployedContract {
            address: address!("5FbDB2315678afecb367f032d93F642f64180aa3"),
            tx_hash: B256::ZERO,
            gas_used: 21_000,
            gas_cost_wei: 21_000 * 50_000,
        }));

        assert!(result.is_success());
        assert_eq!(result.state(), DeploymentState::Succeeded);
        assert_eq!(
            result.status_line(),
            format!(
                "JuiceBox contract deployed to address: 0x5FbDB2315678afecb367f032d93F642f64180aa3 (network: rinkeby, tx: {})",
                B256::ZERO
            )
        );
    }

    #[test]
    fn test_failure_status_line_names_kind() {
        let result = result(DeploymentOutcome::Failed {
            stage: DeploymentState::Submitting,
            error: DeployError::Credential("STAGING_PRIVATE_KEY is not set".to_string()),
        });

        assert!(!result.is_success());
        assert!(result.address().is_none());
        assert_eq!(result.state(), DeploymentState::Failed);
        assert_eq!(
            result.status_line(),
            "JuiceBox deployment to rinkeby failed while Submitting with CredentialError: \
             credential error: STAGING_PRIVATE_KEY is not set"
        );
    }

    #[test]
    fn test_timeout_status_line() {
        let result = result(DeploymentOutcome::TimedOut {
            tx_hash: B256::ZERO,
            waited: Duration::from_secs(120),
        });

        assert_eq!(result.state(), DeploymentState::TimedOut);
        assert!(result.error().is_none());
        assert!(result.status_line().contains("timed out after 120s"));
    }
}
