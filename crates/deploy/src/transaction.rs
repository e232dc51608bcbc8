//! Legacy (EIP-155) transaction encoding and local signing.

use alloy_core::{
    primitives::{Address, B256, Bytes, U256, keccak256},
    rlp::{Encodable, Header},
};
use k256::ecdsa::SigningKey;

use crate::DeployError;

/// A validated, strictly positive gas price in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GasPrice(u128);

impl GasPrice {
    /// Validate a caller-supplied gas price. Zero and negative values are rejected.
    pub fn new(wei: i64) -> Result<Self, DeployError> {
        if wei <= 0 {
            return Err(DeployError::Configuration(format!(
                "Gas price must be a positive integer, got {}",
                wei
            )));
        }
        Ok(Self(wei as u128))
    }

    pub fn wei(&self) -> u128 {
        self.0
    }
}

impl std::fmt::Display for GasPrice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} wei", self.0)
    }
}

/// An unsigned legacy transaction with replay protection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    /// Recipient; `None` creates a contract.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub chain_id: u64,
}

/// A signed transaction ready for `eth_sendRawTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: B256,
}

impl LegacyTransaction {
    /// A contract-creation transaction carrying `bytecode` as init code.
    pub fn creation(
        nonce: u64,
        gas_price: u128,
        gas_limit: u64,
        bytecode: Bytes,
        chain_id: u64,
    ) -> Self {
        Self {
            nonce,
            gas_price,
            gas_limit,
            to: None,
            value: U256::ZERO,
            data: bytecode,
            chain_id,
        }
    }

    fn common_fields_length(&self) -> usize {
        self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + self.to_length()
            + self.value.length()
            + self.data.length()
    }

    fn encode_common_fields(&self, out: &mut Vec<u8>) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        match &self.to {
            Some(to) => to.encode(out),
            // Empty string for contract creation.
            None => (&[] as &[u8]).encode(out),
        }
        self.value.encode(out);
        self.data.encode(out);
    }

    fn to_length(&self) -> usize {
        match &self.to {
            Some(to) => to.length(),
            None => 1,
        }
    }

    /// RLP payload that is hashed for signing: the common fields plus `chain_id, 0, 0`.
    pub fn signing_payload(&self) -> Vec<u8> {
        let payload_length =
            self.common_fields_length() + self.chain_id.length() + 0u8.length() * 2;

        let mut out = Vec::with_capacity(payload_length + 4);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.encode_common_fields(&mut out);
        self.chain_id.encode(&mut out);
        0u8.encode(&mut out);
        0u8.encode(&mut out);
        out
    }

    pub fn signing_hash(&self) -> B256 {
        keccak256(self.signing_payload())
    }

    /// Sign with `key`, producing the raw transaction and its hash.
    pub fn sign(&self, key: &SigningKey) -> Result<SignedTransaction, DeployError> {
        let hash = self.signing_hash();
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| DeployError::Credential(format!("Failed to sign transaction: {}", e)))?;

        let v = u64::from(recovery_id.to_byte()) + self.chain_id * 2 + 35;
        let signature_bytes = signature.to_bytes();
        let r = U256::from_be_slice(&signature_bytes[..32]);
        let s = U256::from_be_slice(&signature_bytes[32..]);

        let payload_length =
            self.common_fields_length() + v.length() + r.length() + s.length();
        let mut out = Vec::with_capacity(payload_length + 4);
        Header {
            list: true,
            payload_length,
        }
        .encode(&mut out);
        self.encode_common_fields(&mut out);
        v.encode(&mut out);
        r.encode(&mut out);
        s.encode(&mut out);

        Ok(SignedTransaction {
            hash: keccak256(&out),
            raw: Bytes::from(out),
        })
    }
}

/// Address of the contract created by `sender` at `nonce`.
pub fn create_address(sender: Address, nonce: u64) -> Address {
    sender.create(nonce)
}
