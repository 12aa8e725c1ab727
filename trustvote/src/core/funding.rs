/*!
On-chain side of a wallet login: voter registration and gas funding
*/

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use trustvote_chain::{
    Address, ChainError, RpcVotingContract, TxHash, U256, VotingWriter, format_ether,
};

/// What the login handler needs from the chain
#[async_trait]
pub trait Funder: Send + Sync {
    /// Grants the voter role and waits for the receipt
    async fn register_voter(&self, wallet: Address) -> Result<TxHash, ChainError>;

    /// Sends the configured funding amount and waits for the receipt
    async fn send_funds(&self, wallet: Address) -> Result<TxHash, ChainError>;
}

pub struct FundingService {
    contract: Arc<RpcVotingContract>,
    amount: U256,
}

impl FundingService {
    pub fn new(contract: Arc<RpcVotingContract>, amount: U256) -> Self {
        Self { contract, amount }
    }
}

#[async_trait]
impl Funder for FundingService {
    async fn register_voter(&self, wallet: Address) -> Result<TxHash, ChainError> {
        let hash = self.contract.register_voter(wallet).await?;
        info!("🗳️ Registered {wallet} as voter in {hash}");
        Ok(hash)
    }

    async fn send_funds(&self, wallet: Address) -> Result<TxHash, ChainError> {
        let hash = self.contract.transfer(wallet, self.amount).await?;
        info!("💸 Sent {} ETH to {wallet} in {hash}", format_ether(self.amount));
        Ok(hash)
    }
}
