//! Remote execution seam: deploying artifacts and calling deployed contracts.

use std::future::Future;

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, U256, keccak256},
};
use serde::{Deserialize, Serialize};

use crate::{ContractArtifact, ProvisionError, Result};

/// An ABI-typed argument passed to a constructor or contract method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallArg {
    Address(Address),
    Uint256(U256),
    Uint8(u8),
    Bytes32(B256),
    String(String),
}

impl CallArg {
    /// The Solidity type name used in method signatures.
    pub fn sol_type(&self) -> &'static str {
        match self {
            CallArg::Address(_) => "address",
            CallArg::Uint256(_) => "uint256",
            CallArg::Uint8(_) => "uint8",
            CallArg::Bytes32(_) => "bytes32",
            CallArg::String(_) => "string",
        }
    }

    fn to_sol_value(&self) -> DynSolValue {
        match self {
            CallArg::Address(a) => DynSolValue::Address(*a),
            CallArg::Uint256(v) => DynSolValue::Uint(*v, 256),
            CallArg::Uint8(v) => DynSolValue::Uint(U256::from(*v), 8),
            CallArg::Bytes32(b) => DynSolValue::FixedBytes(*b, 32),
            CallArg::String(s) => DynSolValue::String(s.clone()),
        }
    }
}

/// Canonical method signature, e.g. `transfer(address,uint256)`.
pub fn method_signature(method: &str, args: &[CallArg]) -> String {
    let types: Vec<&str> = args.iter().map(CallArg::sol_type).collect();
    format!("{}({})", method, types.join(","))
}

/// ABI-encode arguments as a parameter list (constructor args or call args without selector).
pub fn encode_args(args: &[CallArg]) -> Vec<u8> {
    if args.is_empty() {
        return Vec::new();
    }
    DynSolValue::Tuple(args.iter().map(CallArg::to_sol_value).collect()).abi_encode_params()
}

/// ABI-encode a method call: 4-byte selector followed by the encoded arguments.
pub fn encode_call(method: &str, args: &[CallArg]) -> Vec<u8> {
    let signature = method_signature(method, args);
    let mut calldata = keccak256(signature.as_bytes())[..4].to_vec();
    calldata.extend(encode_args(args));
    calldata
}

/// Outcome of a mined, successful transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: B256,
    pub gas_used: u64,
    /// Address of the created contract, for deployments.
    pub contract_address: Option<Address>,
}

/// A state-changing transaction submitted on behalf of the deployer.
#[derive(Debug, Clone, Copy)]
pub enum Submission<'a> {
    /// Create a contract from a fully linked artifact.
    Deploy {
        artifact: &'a ContractArtifact,
        args: &'a [CallArg],
    },
    /// Call a method on a deployed contract.
    Call {
        contract: Address,
        method: &'a str,
        args: &'a [CallArg],
    },
}

impl Submission<'_> {
    /// Classify a node-side rejection of this submission.
    ///
    /// Deployments fail with [`ProvisionError::Deployment`]. Calls fail with
    /// [`ProvisionError::Authorization`] when the reason is an ownership or access check,
    /// and with [`ProvisionError::RemoteExecution`] otherwise.
    pub fn rejected(&self, reason: impl Into<String>) -> ProvisionError {
        let reason = reason.into();
        match *self {
            Submission::Deploy { artifact, .. } => ProvisionError::Deployment {
                artifact: artifact.name.clone(),
                reason,
            },
            Submission::Call {
                contract, method, ..
            } if is_authorization_revert(&reason) => ProvisionError::Authorization {
                contract,
                method: method.to_string(),
                reason,
            },
            Submission::Call {
                contract, method, ..
            } => ProvisionError::RemoteExecution {
                contract,
                method: method.to_string(),
                reason,
            },
        }
    }

    /// The contract created by a confirmed deployment.
    pub fn deployed_address(&self, receipt: &Receipt) -> Result<Address> {
        receipt
            .contract_address
            .ok_or_else(|| self.rejected("receipt carries no contract address"))
    }
}

/// Whether a revert reason is an ownership or access check.
pub(crate) fn is_authorization_revert(reason: &str) -> bool {
    let reason = reason.to_lowercase();
    ["not the owner", "unauthorized", "not authorized", "only owner"]
        .iter()
        .any(|needle| reason.contains(needle))
}

/// Executes deployments and calls on behalf of a deployer account.
///
/// Sending and confirming are separate so the caller can journal the transaction hash in
/// between: a run interrupted while waiting resumes by confirming the same transaction
/// instead of sending it again. Confirming before the next send keeps submissions strictly
/// serial per account.
pub trait ChainBackend: Send + Sync {
    /// The chain ID of the connected network.
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Send a transaction without waiting for it to be mined, returning its hash.
    ///
    /// Fails with the classification of [`Submission::rejected`] when the node refuses the
    /// transaction or estimates a cost above `budget`.
    fn send(
        &self,
        submission: Submission<'_>,
        from: Address,
        budget: u64,
    ) -> impl Future<Output = Result<B256>> + Send;

    /// Wait for a sent transaction to be mined and check that it succeeded.
    ///
    /// A transaction that is not mined in time fails with
    /// [`crate::ProvisionError::Transport`] and may still be confirmed later.
    fn confirm(
        &self,
        submission: Submission<'_>,
        tx_hash: B256,
        budget: u64,
    ) -> impl Future<Output = Result<Receipt>> + Send;
}
