//! JSON-RPC transport and the [`ChainBackend`] implementation built on it.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, U64};
use anyhow::Context;
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::Mutex;
use url::Url;

use crate::{
    ChainBackend, ProvisionError, Receipt, Result, Submission,
    backend::{encode_args, encode_call},
};

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between receipt polls.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Error object returned by a JSON-RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("RPC error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Marker error while a transaction has no receipt yet.
#[derive(Debug, thiserror::Error)]
#[error("receipt not available yet")]
struct ReceiptPending;

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// An error response from the endpoint is returned as an [`RpcError`] inside the
/// `anyhow::Error`, so callers can tell it apart from transport failures with
/// `downcast_ref`.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        return Err(RpcError {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
        }
        .into());
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// Transaction receipt as returned by `eth_getTransactionReceipt`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    status: Option<U64>,
    gas_used: U64,
    contract_address: Option<Address>,
}

/// Map a failed request: node-side errors are rejections, everything else is transport.
fn node_error(submission: Submission<'_>, err: anyhow::Error) -> ProvisionError {
    match err.downcast_ref::<RpcError>() {
        Some(rpc) => submission.rejected(rpc.message.clone()),
        None => ProvisionError::Transport(err),
    }
}

/// A [`ChainBackend`] talking JSON-RPC to a node that holds the deployer's key.
#[derive(Debug)]
pub struct RpcBackend {
    client: reqwest::Client,
    url: Url,
    receipt_timeout: Duration,
    /// Held from estimation until the node accepts the transaction.
    submission: Mutex<()>,
}

impl RpcBackend {
    /// Create a backend for the given endpoint.
    pub fn new(url: Url, receipt_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: create_client().map_err(ProvisionError::Transport)?,
            url,
            receipt_timeout,
            submission: Mutex::new(()),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> anyhow::Result<T> {
        json_rpc_call(&self.client, self.url.as_str(), method, params).await
    }

    async fn fetch_receipt(&self, tx_hash: B256) -> anyhow::Result<RawReceipt> {
        let receipt: Option<RawReceipt> = self
            .request("eth_getTransactionReceipt", vec![serde_json::json!(tx_hash)])
            .await?;
        receipt.ok_or_else(|| ReceiptPending.into())
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> anyhow::Result<RawReceipt> {
        let max_polls = (self.receipt_timeout.as_millis() / POLL_INTERVAL.as_millis().max(1))
            .max(1) as usize;

        (|| self.fetch_receipt(tx_hash))
            .retry(
                ConstantBuilder::default()
                    .with_delay(POLL_INTERVAL)
                    .with_max_times(max_polls),
            )
            .when(|e| e.is::<ReceiptPending>())
            .notify(|_, _| tracing::trace!(%tx_hash, "Waiting for receipt..."))
            .await
            .with_context(|| format!("No receipt for {tx_hash} within {:?}", self.receipt_timeout))
    }
}

/// The `eth_sendTransaction` object for a submission.
fn transaction_request(
    submission: Submission<'_>,
    from: Address,
    budget: u64,
) -> Result<Value> {
    let (to, data) = match submission {
        Submission::Deploy { artifact, args } => {
            if !artifact.is_linked() {
                return Err(submission.rejected("bytecode has unlinked library placeholders"));
            }
            let mut data = artifact
                .bytecode
                .to_bytes()
                .map_err(|e| submission.rejected(format!("invalid bytecode: {e}")))?;
            data.extend(encode_args(args));
            (None, data)
        }
        Submission::Call {
            contract,
            method,
            args,
        } => (Some(contract), encode_call(method, args)),
    };

    let mut tx = serde_json::json!({
        "from": from,
        "data": format!("0x{}", hex::encode(&data)),
        "gas": format!("0x{:x}", budget),
    });
    if let Some(to) = to {
        tx["to"] = serde_json::json!(to);
    }
    Ok(tx)
}

impl ChainBackend for RpcBackend {
    async fn chain_id(&self) -> Result<u64> {
        let chain_id: U64 = self
            .request("eth_chainId", vec![])
            .await
            .map_err(ProvisionError::Transport)?;
        Ok(chain_id.to::<u64>())
    }

    async fn send(&self, submission: Submission<'_>, from: Address, budget: u64) -> Result<B256> {
        let tx = transaction_request(submission, from, budget)?;

        let _in_flight = self.submission.lock().await;

        let estimated: U64 = self
            .request("eth_estimateGas", vec![tx.clone()])
            .await
            .map_err(|e| node_error(submission, e))?;
        let estimated = estimated.to::<u64>();
        if estimated > budget {
            return Err(submission.rejected(format!(
                "estimated cost {estimated} exceeds budget {budget}"
            )));
        }

        let tx_hash: B256 = self
            .request("eth_sendTransaction", vec![tx])
            .await
            .map_err(|e| node_error(submission, e))?;
        tracing::debug!(%tx_hash, estimated, budget, "Transaction sent");

        Ok(tx_hash)
    }

    async fn confirm(
        &self,
        submission: Submission<'_>,
        tx_hash: B256,
        budget: u64,
    ) -> Result<Receipt> {
        let receipt = self
            .wait_for_receipt(tx_hash)
            .await
            .map_err(ProvisionError::Transport)?;

        let gas_used = receipt.gas_used.to::<u64>();
        match receipt.status.map(|s| s.to::<u64>()) {
            Some(1) => Ok(Receipt {
                tx_hash: receipt.transaction_hash,
                gas_used,
                contract_address: receipt.contract_address,
            }),
            _ if gas_used >= budget => Err(submission.rejected(format!(
                "ran out of gas: used {gas_used} of budget {budget}"
            ))),
            _ => Err(submission.rejected(format!(
                "transaction {} reverted",
                receipt.transaction_hash
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallArg, ContractArtifact};

    #[test]
    fn test_node_errors_are_rejections() {
        let call = Submission::Call {
            contract: Address::with_last_byte(1),
            method: "transfer",
            args: &[],
        };

        let rpc: anyhow::Error = RpcError {
            code: -32000,
            message: "execution reverted".to_string(),
        }
        .into();
        assert!(matches!(
            node_error(call, rpc),
            ProvisionError::RemoteExecution { ref reason, .. } if reason == "execution reverted"
        ));

        let transport = anyhow::anyhow!("connection refused");
        assert!(matches!(node_error(call, transport), ProvisionError::Transport(_)));
    }

    #[test]
    fn test_receipt_deserialization() {
        let receipt: RawReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x00000000000000000000000000000000000000000000000000000000000000ab",
            "status": "0x1",
            "gasUsed": "0x3d0900",
            "contractAddress": "0x00000000000000000000000000000000000000cd",
            "blockNumber": "0x10"
        }))
        .unwrap();

        assert_eq!(receipt.transaction_hash, B256::with_last_byte(0xab));
        assert_eq!(receipt.status.map(|s| s.to::<u64>()), Some(1));
        assert_eq!(receipt.gas_used.to::<u64>(), 4_000_000);
        assert_eq!(receipt.contract_address, Some(Address::with_last_byte(0xcd)));
    }

    #[test]
    fn test_transaction_request_for_call() {
        let args = [CallArg::Address(Address::ZERO)];
        let tx = transaction_request(
            Submission::Call {
                contract: Address::with_last_byte(0x20),
                method: "transferOwnership",
                args: &args,
            },
            Address::with_last_byte(0xde),
            300_000,
        )
        .unwrap();

        assert_eq!(tx["gas"], "0x493e0");
        assert!(tx["data"].as_str().unwrap().starts_with("0xf2fde38b"));
        assert_eq!(
            tx["to"],
            serde_json::json!(Address::with_last_byte(0x20))
        );
    }

    #[tokio::test]
    async fn test_send_refuses_unlinked_bytecode() {
        let backend = RpcBackend::new(
            Url::parse("http://127.0.0.1:1").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();
        let artifact = ContractArtifact::new(
            "DmmTokenFactory",
            format!("0x6080{}", crate::linker::placeholder("DmmTokenLibrary")),
        );

        let err = backend
            .send(
                Submission::Deploy {
                    artifact: &artifact,
                    args: &[],
                },
                Address::with_last_byte(1),
                6_000_000,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Deployment { .. }));
    }
}
