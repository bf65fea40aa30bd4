use erde_chain::{ChainReader, U256};

use crate::error::ErdeError;

/// Reads the weekly budget `E(w)` from the on-chain emission manager.
/// Performs no local policy computation — the contract is the source of
/// truth for the scalar itself; only the *split* of that scalar across
/// channels is this engine's policy.
pub async fn fetch_weekly_budget(
    reader: &(impl ChainReader + ?Sized),
    epoch: u64,
) -> Result<U256, ErdeError> {
    Ok(reader.fetch_weekly_budget(epoch).await?)
}

#[cfg(test)]
mod tests {
    use erde_chain::MockChainReader;

    use super::*;

    #[tokio::test]
    async fn passes_through_the_chain_reads_value() {
        let mut mock = MockChainReader::new();
        mock.expect_fetch_weekly_budget()
            .withf(|epoch| *epoch == 7)
            .returning(|_| Ok(U256::from(100_000u64)));

        let budget = fetch_weekly_budget(&mock, 7).await.unwrap();
        assert_eq!(budget, U256::from(100_000u64));
    }
}
