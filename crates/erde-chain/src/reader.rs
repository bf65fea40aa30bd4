use std::{collections::BTreeMap, future::Future, time::Duration};

use async_trait::async_trait;
use web3::{
    Transport, Web3,
    types::{BlockId, BlockNumber, Bytes, CallRequest, H160},
};

use crate::{
    error::{ChainError, ChainFetchError},
    types::{
        Address, ChainAddresses, U256, decode_address, encode_address, encode_u256, selector,
    },
};

const MAX_ATTEMPTS: u32 = 3;

/// Linear back-off retry wrapper: up to three attempts, `100ms * (attempt
/// + 1)` between retries, every attempt pinned to the same arguments (most
/// importantly the same block tag). Any non-transport error propagates on
/// the first occurrence.
pub async fn retry_linear<F, Fut, T>(mut op: F) -> Result<T, ChainFetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let mut last_err = None;
    for attempt in 0..MAX_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                tracing::warn!(attempt, %err, "transient chain read failure, retrying");
                last_err = Some(err);
                if attempt + 1 < MAX_ATTEMPTS {
                    tokio::time::sleep(Duration::from_millis(100 * (attempt as u64 + 1))).await;
                }
            }
            Err(err) => {
                return Err(ChainFetchError {
                    attempts: attempt + 1,
                    source: err,
                });
            }
        }
    }
    Err(ChainFetchError {
        attempts: MAX_ATTEMPTS,
        source: last_err.expect("loop always records an error before exhausting attempts"),
    })
}

/// Typed, retrying reads from the on-chain Vault, stability pool, LP tokens,
/// emission manager, and reward distributor.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn fetch_current_block(&self) -> Result<u64, ChainFetchError>;

    /// Reads debt, stability-pool balance, and every configured LP balance
    /// for `user`, all pinned to `block_tag`. Never silently falls back to
    /// "latest" — a cross-block skew between reads would corrupt the
    /// snapshot's accounting.
    async fn fetch_user_snapshot(
        &self,
        user: Address,
        block_tag: u64,
    ) -> Result<crate::types::UserSnapshot, ChainFetchError>;

    async fn fetch_weekly_budget(&self, epoch: u64) -> Result<U256, ChainFetchError>;

    async fn read_on_chain_root(&self, epoch: u64) -> Result<[u8; 32], ChainFetchError>;
}

pub struct EvmChainReader<T: Transport> {
    web3: Web3<T>,
    addresses: ChainAddresses,
}

impl<T: Transport> EvmChainReader<T> {
    pub fn new(web3: Web3<T>, addresses: ChainAddresses) -> Self {
        Self { web3, addresses }
    }

    async fn call_uint256(
        &self,
        to: Address,
        data: Vec<u8>,
        block: BlockNumber,
    ) -> Result<U256, ChainError> {
        let word = self.raw_call(to, data, block).await?;
        Ok(U256::from_big_endian(&word))
    }

    async fn call_address(
        &self,
        to: Address,
        data: Vec<u8>,
        block: BlockNumber,
    ) -> Result<Address, ChainError> {
        let word = self.raw_call(to, data, block).await?;
        Ok(decode_address(&word))
    }

    async fn call_bytes32(
        &self,
        to: Address,
        data: Vec<u8>,
        block: BlockNumber,
    ) -> Result<[u8; 32], ChainError> {
        let word = self.raw_call(to, data, block).await?;
        Ok(word)
    }

    async fn raw_call(
        &self,
        to: Address,
        data: Vec<u8>,
        block: BlockNumber,
    ) -> Result<[u8; 32], ChainError> {
        let request = CallRequest {
            to: Some(H160::from(to.0)),
            data: Some(Bytes(data)),
            ..Default::default()
        };
        let raw = self
            .web3
            .eth()
            .call(request, Some(BlockId::Number(block)))
            .await?;
        if raw.0.len() < 32 {
            return Err(ChainError::MalformedResponse(format!(
                "expected a 32-byte word, got {} bytes",
                raw.0.len()
            )));
        }
        let mut word = [0u8; 32];
        word.copy_from_slice(&raw.0[raw.0.len() - 32..]);
        Ok(word)
    }

    fn debt_of_calldata(user: Address) -> Vec<u8> {
        let mut data = selector("debtOf(address)").to_vec();
        data.extend_from_slice(&encode_address(&user));
        data
    }

    fn balance_of_calldata(user: Address) -> Vec<u8> {
        let mut data = selector("balanceOf(address)").to_vec();
        data.extend_from_slice(&encode_address(&user));
        data
    }

    fn weekly_budget_calldata(epoch: u64) -> Vec<u8> {
        let mut data = selector("getWeeklyBudget(uint256)").to_vec();
        data.extend_from_slice(&encode_u256(U256::from(epoch)));
        data
    }

    fn merkle_roots_calldata(epoch: u64) -> Vec<u8> {
        let mut data = selector("merkleRoots(uint256)").to_vec();
        data.extend_from_slice(&encode_u256(U256::from(epoch)));
        data
    }

    pub(crate) fn owner_calldata() -> Vec<u8> {
        selector("owner()").to_vec()
    }
}

#[async_trait]
impl<T: Transport + Send + Sync> ChainReader for EvmChainReader<T>
where
    T::Out: Send,
{
    async fn fetch_current_block(&self) -> Result<u64, ChainFetchError> {
        retry_linear(|| async {
            let number = self.web3.eth().block_number().await?;
            Ok(number.as_u64())
        })
        .await
    }

    async fn fetch_user_snapshot(
        &self,
        user: Address,
        block_tag: u64,
    ) -> Result<crate::types::UserSnapshot, ChainFetchError> {
        let block = BlockNumber::Number(block_tag.into());

        let debt = retry_linear(|| async {
            self.call_uint256(self.addresses.vault, Self::debt_of_calldata(user), block)
                .await
        })
        .await?;

        let sp_shares = retry_linear(|| async {
            self.call_uint256(
                self.addresses.stability_pool,
                Self::balance_of_calldata(user),
                block,
            )
            .await
        })
        .await?;

        let mut lp_shares = BTreeMap::new();
        for pool in &self.addresses.lp_tokens {
            let balance = retry_linear(|| async {
                self.call_uint256(*pool, Self::balance_of_calldata(user), block)
                    .await
            })
            .await?;
            lp_shares.insert(*pool, balance);
        }

        Ok(crate::types::UserSnapshot {
            address: user,
            debt,
            lp_shares,
            sp_shares,
            timestamp: unix_now(),
        })
    }

    async fn fetch_weekly_budget(&self, epoch: u64) -> Result<U256, ChainFetchError> {
        retry_linear(|| async {
            self.call_uint256(
                self.addresses.emission_manager,
                Self::weekly_budget_calldata(epoch),
                BlockNumber::Latest,
            )
            .await
        })
        .await
    }

    async fn read_on_chain_root(&self, epoch: u64) -> Result<[u8; 32], ChainFetchError> {
        retry_linear(|| async {
            self.call_bytes32(
                self.addresses.reward_distributor,
                Self::merkle_roots_calldata(epoch),
                BlockNumber::Latest,
            )
            .await
        })
        .await
    }
}

impl<T: Transport + Send + Sync> EvmChainReader<T>
where
    T::Out: Send,
{
    pub async fn owner(&self) -> Result<Address, ChainFetchError> {
        retry_linear(|| async {
            self.call_address(
                self.addresses.reward_distributor,
                Self::owner_calldata(),
                BlockNumber::Latest,
            )
            .await
        })
        .await
    }

    pub fn distributor(&self) -> Address {
        self.addresses.reward_distributor
    }

    pub fn web3(&self) -> &Web3<T> {
        &self.web3
    }
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn retries_transient_errors_up_to_three_times() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, ChainFetchError> = retry_linear(|| {
            let attempts = &attempts;
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(ChainError::Transport(web3::Error::Decoder("transient".into())))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_immediately_on_fatal_error() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32, ChainFetchError> = retry_linear(|| {
            let attempts = &attempts;
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(ChainError::Reverted("bad input".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_and_surfaces_last_cause() {
        let result: Result<u32, ChainFetchError> =
            retry_linear(|| async { Err(ChainError::Transport(web3::Error::Decoder("transient".into()))) }).await;
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 3);
    }
}
