use secp256k1::SecretKey;
use web3::{
    Transport,
    signing::SecretKeyRef,
    types::{Bytes, CallRequest, H160, H256, TransactionParameters},
};

use crate::{
    error::SubmitError,
    reader::EvmChainReader,
    types::{Address, address_from_secret_key, encode_u256, selector},
};

/// Outcome of a submit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new transaction was broadcast and confirmed.
    Submitted { tx_hash: H256 },
    /// The on-chain root already equals the one we were about to submit;
    /// no transaction was sent.
    AlreadyCurrent,
}

/// The only writer in ERDE. Enforces ownership, idempotence, and
/// post-write verification around the single `setMerkleRoot` call. Signs
/// `setMerkleRoot` locally with `signer_key` and broadcasts the raw
/// transaction, so it works against any RPC endpoint rather than requiring
/// the node itself to hold the signer account unlocked.
pub struct Submitter<T: Transport> {
    reader: EvmChainReader<T>,
    signer: Address,
    signer_key: SecretKey,
    confirmations: usize,
}

impl<T: Transport + Send + Sync> Submitter<T>
where
    T::Out: Send,
{
    pub fn new(reader: EvmChainReader<T>, signer_key: SecretKey, confirmations: usize) -> Self {
        let signer = address_from_secret_key(&signer_key);
        Self {
            reader,
            signer,
            signer_key,
            confirmations,
        }
    }

    pub fn signer(&self) -> Address {
        self.signer
    }

    /// Runs the full submit sequence: ownership check, idempotence guard,
    /// broadcast, confirmation wait, post-write verify. `force` corresponds
    /// to `FORCE_UPDATE`: it permits overwriting a non-zero, differing root.
    pub async fn submit(
        &self,
        epoch: u64,
        root: [u8; 32],
        force: bool,
    ) -> Result<SubmitOutcome, SubmitError> {
        let owner = self.reader.owner().await?;
        if owner != self.signer {
            return Err(SubmitError::AuthorizationMismatch {
                signer: self.signer,
                owner,
            });
        }

        let existing = self.reader.read_on_chain_root(epoch).await?;
        if existing != [0u8; 32] {
            if existing == root {
                tracing::info!(epoch, "root already set on-chain, treating as idempotent success");
                return Ok(SubmitOutcome::AlreadyCurrent);
            }
            if !force {
                return Err(SubmitError::IdempotenceConflict {
                    epoch,
                    existing: hex::encode(existing),
                    submitting: hex::encode(root),
                });
            }
            tracing::warn!(
                epoch,
                existing = %hex::encode(existing),
                submitting = %hex::encode(root),
                "overriding an existing non-zero root because force is set"
            );
        }

        let tx_hash = self.broadcast(epoch, root).await?;
        self.await_confirmations(tx_hash).await?;

        let observed = self.reader.read_on_chain_root(epoch).await?;
        if observed != root {
            return Err(SubmitError::PostWriteMismatch {
                expected: hex::encode(root),
                observed: hex::encode(observed),
            });
        }

        Ok(SubmitOutcome::Submitted { tx_hash })
    }

    async fn broadcast(&self, epoch: u64, root: [u8; 32]) -> Result<H256, SubmitError> {
        let mut data = selector("setMerkleRoot(bytes32,uint256)").to_vec();
        data.extend_from_slice(&root);
        data.extend_from_slice(&encode_u256(epoch.into()));
        let distributor = H160::from(self.reader.distributor().0);

        let gas = self
            .reader
            .web3()
            .eth()
            .estimate_gas(
                CallRequest {
                    from: Some(H160::from(self.signer.0)),
                    to: Some(distributor),
                    data: Some(Bytes(data.clone())),
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(crate::error::ChainError::from)?;

        let params = TransactionParameters {
            to: Some(distributor),
            data: Bytes(data),
            gas,
            ..Default::default()
        };

        let accounts = self.reader.web3().accounts();
        let signed = accounts
            .sign_transaction(params, SecretKeyRef::new(&self.signer_key))
            .await
            .map_err(crate::error::ChainError::from)?;

        let tx_hash = self
            .reader
            .web3()
            .eth()
            .send_raw_transaction(signed.raw_transaction)
            .await
            .map_err(crate::error::ChainError::from)?;
        tracing::info!(epoch, tx_hash = %tx_hash, "broadcast setMerkleRoot");
        Ok(tx_hash)
    }

    async fn await_confirmations(&self, tx_hash: H256) -> Result<(), SubmitError> {
        loop {
            let receipt = self
                .reader
                .web3()
                .eth()
                .transaction_receipt(tx_hash)
                .await
                .map_err(crate::error::ChainError::from)?;
            if let Some(receipt) = receipt {
                if receipt.status == Some(web3::types::U64::from(0)) {
                    return Err(SubmitError::TransactionReverted {
                        tx_hash: hex::encode(tx_hash.as_bytes()),
                    });
                }
                if let Some(receipt_block) = receipt.block_number {
                    let current = self
                        .reader
                        .web3()
                        .eth()
                        .block_number()
                        .await
                        .map_err(crate::error::ChainError::from)?;
                    let confirmations = current.saturating_sub(receipt_block).as_u64() as usize + 1;
                    if confirmations >= self.confirmations.max(1) {
                        return Ok(());
                    }
                }
            }
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        }
    }
}
