//! Network client used to submit and confirm contract-creation transactions.

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Context;
use serde::Deserialize;
use url::Url;

use crate::{
    DeployError, GasPrice, LegacyTransaction, PrivateKey, create_address, network::signer_address,
    rpc,
};

/// Default interval between receipt polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Handle to a submitted, not yet confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxHandle {
    pub hash: B256,
    /// Account that signed the transaction.
    pub sender: Address,
    /// Nonce the transaction was signed with.
    pub nonce: u64,
    /// Gas limit the transaction was sent with.
    pub gas_limit: u64,
}

/// Outcome of waiting for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// The creation succeeded on-chain.
    Mined { address: Address, gas_used: u64 },
    /// The creation was mined but failed.
    Reverted { reason: String },
}

/// External network collaborator.
///
/// Implementations receive an already validated endpoint and a non-empty credential.
pub trait NetworkClient: Send + Sync {
    /// Sign and broadcast a contract-creation transaction.
    fn submit_contract_creation(
        &self,
        endpoint: &Url,
        credential: &PrivateKey,
        bytecode: &Bytes,
        gas_price: GasPrice,
    ) -> impl Future<Output = Result<TxHandle, DeployError>> + Send;

    /// Block until the transaction is mined or the node fails.
    fn await_confirmation(
        &self,
        endpoint: &Url,
        handle: &TxHandle,
    ) -> impl Future<Output = Result<Confirmation, DeployError>> + Send;
}

impl<T: NetworkClient> NetworkClient for &T {
    fn submit_contract_creation(
        &self,
        endpoint: &Url,
        credential: &PrivateKey,
        bytecode: &Bytes,
        gas_price: GasPrice,
    ) -> impl Future<Output = Result<TxHandle, DeployError>> + Send {
        (**self).submit_contract_creation(endpoint, credential, bytecode, gas_price)
    }

    fn await_confirmation(
        &self,
        endpoint: &Url,
        handle: &TxHandle,
    ) -> impl Future<Output = Result<Confirmation, DeployError>> + Send {
        (**self).await_confirmation(endpoint, handle)
    }
}

/// Receipt fields read from `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionReceipt {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    contract_address: Option<Address>,
    gas_used: String,
}

/// [`NetworkClient`] talking plain JSON-RPC over HTTP and signing locally.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    client: reqwest::Client,
    poll_interval: Duration,
}

impl JsonRpcClient {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            client: rpc::create_client()?,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Set the interval between receipt polls.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &Url,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T, DeployError> {
        rpc::json_rpc_call(&self.client, endpoint.as_str(), method, params)
            .await
            .map_err(DeployError::network)
    }

    async fn quantity(
        &self,
        endpoint: &Url,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<u64, DeployError> {
        let value: String = self.call(endpoint, method, params).await?;
        let quantity = rpc::parse_quantity(&value)
            .with_context(|| format!("Invalid {} result", method))
            .map_err(DeployError::network)?;
        to_u64(quantity, method)
    }
}

impl NetworkClient for JsonRpcClient {
    async fn submit_contract_creation(
        &self,
        endpoint: &Url,
        credential: &PrivateKey,
        bytecode: &Bytes,
        gas_price: GasPrice,
    ) -> Result<TxHandle, DeployError> {
        let key = credential.signing_key()?;
        let sender = signer_address(&key);
        let data = format!("0x{}", hex::encode(bytecode));
        let gas_price_hex = format!("0x{:x}", gas_price.wei());

        let chain_id = self.quantity(endpoint, "eth_chainId", vec![]).await?;
        let nonce = self
            .quantity(
                endpoint,
                "eth_getTransactionCount",
                vec![serde_json::json!(sender), serde_json::json!("pending")],
            )
            .await?;
        let gas_limit = self
            .quantity(
                endpoint,
                "eth_estimateGas",
                vec![serde_json::json!({
                    "from": sender,
                    "data": data,
                    "gasPrice": gas_price_hex,
                })],
            )
            .await?;

        tracing::debug!(%sender, chain_id, nonce, gas_limit, "Prepared creation transaction");

        let signed = LegacyTransaction::creation(nonce, gas_price.wei(), gas_limit, bytecode.clone(), chain_id)
            .sign(&key)?;

        let hash: B256 = self
            .call(
                endpoint,
                "eth_sendRawTransaction",
                vec![serde_json::json!(format!("0x{}", hex::encode(&signed.raw)))],
            )
            .await?;

        if hash != signed.hash {
            tracing::warn!(expected = %signed.hash, reported = %hash, "Node reported an unexpected transaction hash");
        }

        Ok(TxHandle {
            hash,
            sender,
            nonce,
            gas_limit,
        })
    }

    async fn await_confirmation(
        &self,
        endpoint: &Url,
        handle: &TxHandle,
    ) -> Result<Confirmation, DeployError> {
        let receipt: TransactionReceipt =
            rpc::poll_until("transaction receipt", self.poll_interval, || async move {
                rpc::json_rpc_call::<Option<TransactionReceipt>>(
                    &self.client,
                    endpoint.as_str(),
                    "eth_getTransactionReceipt",
                    vec![serde_json::json!(handle.hash)],
                )
                .await
            })
            .await
            .map_err(DeployError::network)?;

        confirmation_from_receipt(receipt, handle)
    }
}

fn confirmation_from_receipt(
    receipt: TransactionReceipt,
    handle: &TxHandle,
) -> Result<Confirmation, DeployError> {
    let gas_used = rpc::parse_quantity(&receipt.gas_used)
        .context("Invalid gasUsed in receipt")
        .map_err(DeployError::network)?;
    let gas_used = to_u64(gas_used, "gasUsed")?;

    match receipt.status.as_deref() {
        Some("0x1") => {
            let address = receipt.contract_address.ok_or_else(|| {
                DeployError::Network("Receipt of a creation transaction has no contractAddress".to_string())
            })?;
            let expected = create_address(handle.sender, handle.nonce);
            if address != expected {
                tracing::warn!(%address, %expected, "Receipt contract address differs from the sender/nonce derivation");
            }
            Ok(Confirmation::Mined { address, gas_used })
        }
        Some("0x0") => {
            let reason = if gas_used >= handle.gas_limit {
                format!("out of gas ({} of {} used)", gas_used, handle.gas_limit)
            } else {
                format!("execution reverted ({} gas used)", gas_used)
            };
            Ok(Confirmation::Reverted { reason })
        }
        other => Err(DeployError::Network(format!(
            "Unexpected receipt status {:?}",
            other
        ))),
    }
}

fn to_u64(value: u128, field: &str) -> Result<u64, DeployError> {
    u64::try_from(value)
        .map_err(|_| DeployError::Network(format!("{} value {} does not fit in 64 bits", field, value)))
}
