/*!
Read and write interfaces to the deployed `VotingSystem` contract
*/

use std::time::Duration;

use alloy::network::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::bindings::VotingSystem;
use crate::error::ChainError;
use crate::events::{ContractEvent, EventQuery, EventRecord};
use crate::types::{Candidate, ElectionSummary, Role};

/// Read-only view of the contract
#[async_trait]
pub trait VotingReader: Send + Sync {
    async fn election_count(&self) -> Result<u64, ChainError>;

    async fn election_details(&self, election: u64) -> Result<ElectionSummary, ChainError>;

    /// Elections `1..=count`. Ids whose details the contract refuses to
    /// return (deleted elections) are skipped.
    async fn list_elections(&self) -> Result<Vec<ElectionSummary>, ChainError> {
        let count = self.election_count().await?;
        let mut elections = Vec::new();
        for id in 1..=count {
            match self.election_details(id).await {
                Ok(details) => elections.push(details),
                Err(e) if e.is_execution_error() => {
                    warn!("Skipping election {id}: {}", e.reason());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(elections)
    }

    async fn candidates(&self, election: u64, office: u64) -> Result<Vec<Candidate>, ChainError>;

    async fn has_role(&self, role: Role, account: Address) -> Result<bool, ChainError>;

    async fn view_admins(&self) -> Result<Vec<Address>, ChainError>;

    async fn view_voters(&self) -> Result<Vec<Address>, ChainError>;

    async fn latest_block(&self) -> Result<u64, ChainError>;

    /// Decoded events ordered by block and log index
    async fn events(&self, query: &EventQuery) -> Result<Vec<EventRecord>, ChainError>;
}

/// State changing calls. Each waits for the receipt before returning.
#[async_trait]
pub trait VotingWriter: Send + Sync {
    async fn add_admin(&self, account: Address) -> Result<TxHash, ChainError>;

    async fn register_voter(&self, account: Address) -> Result<TxHash, ChainError>;

    async fn create_election(
        &self,
        name: &str,
        start_time: u64,
        end_time: u64,
    ) -> Result<TxHash, ChainError>;

    async fn update_election(
        &self,
        election: u64,
        name: &str,
        start_time: u64,
        end_time: u64,
    ) -> Result<TxHash, ChainError>;

    async fn delete_election(&self, election: u64) -> Result<TxHash, ChainError>;

    async fn end_election(&self, election: u64) -> Result<TxHash, ChainError>;

    async fn add_office(&self, election: u64, name: &str) -> Result<TxHash, ChainError>;

    async fn add_candidate(
        &self,
        election: u64,
        office: u64,
        name: &str,
    ) -> Result<TxHash, ChainError>;

    async fn vote(&self, election: u64, office: u64, candidate: u64) -> Result<TxHash, ChainError>;
}

#[derive(Debug, Clone)]
pub struct ContractSettings {
    pub address: Address,
    /// Block the contract was deployed in; log scans start here
    pub from_block: u64,
    /// Maximum block span per `eth_getLogs` request
    pub log_chunk_size: Option<u64>,
    /// Skips the `eth_chainId` lookup when set
    pub chain_id: Option<u64>,
    pub receipt_timeout: Duration,
    pub receipt_poll_interval: Duration,
}

impl ContractSettings {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            from_block: 0,
            log_chunk_size: None,
            chain_id: None,
            receipt_timeout: Duration::from_secs(120),
            receipt_poll_interval: Duration::from_secs(2),
        }
    }
}

/// Hex private key, with or without `0x`
pub fn parse_signer(key: &str) -> Result<PrivateKeySigner, ChainError> {
    key.trim().parse().map_err(|_| ChainError::InvalidKey)
}

/// Contract bound to a JSON-RPC endpoint, optionally with a signing wallet
pub struct RpcVotingContract {
    provider: RootProvider,
    settings: ContractSettings,
    wallet: Option<EthereumWallet>,
    account: Option<Address>,
    chain_id: OnceCell<u64>,
    send_lock: Mutex<()>,
}

impl RpcVotingContract {
    pub fn new(provider: RootProvider, settings: ContractSettings) -> Self {
        let chain_id = match settings.chain_id {
            Some(id) => OnceCell::new_with(Some(id)),
            None => OnceCell::new(),
        };
        Self {
            provider,
            settings,
            wallet: None,
            account: None,
            chain_id,
            send_lock: Mutex::new(()),
        }
    }

    /// HTTP provider for `rpc_url`
    pub fn connect(rpc_url: &str, settings: ContractSettings) -> Result<Self, ChainError> {
        let url: Url = rpc_url
            .parse()
            .map_err(|_| ChainError::InvalidUrl(rpc_url.to_string()))?;
        Ok(Self::new(RootProvider::new_http(url), settings))
    }

    pub fn with_signer(mut self, signer: PrivateKeySigner) -> Self {
        self.account = Some(signer.address());
        self.wallet = Some(EthereumWallet::from(signer));
        self
    }

    pub fn address(&self) -> Address {
        self.settings.address
    }

    /// Account writes are sent from
    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn provider(&self) -> &RootProvider {
        &self.provider
    }

    async fn chain_id(&self) -> Result<u64, ChainError> {
        self.chain_id
            .get_or_try_init(|| async {
                let id = self.provider.get_chain_id().await?;
                Ok::<u64, ChainError>(id)
            })
            .await
            .copied()
    }

    async fn read<C>(&self, call: C) -> Result<C::Return, ChainError>
    where
        C: SolCall + Send + Sync,
    {
        let mut request = TransactionRequest::default()
            .with_to(self.settings.address)
            .with_input(call.abi_encode());
        if let Some(from) = self.account {
            request = request.with_from(from);
        }
        let output = self.provider.call(request).await?;
        Ok(C::abi_decode_returns(&output)?)
    }

    async fn write<C>(&self, call: C) -> Result<TxHash, ChainError>
    where
        C: SolCall + Send + Sync,
    {
        let input = Bytes::from(call.abi_encode());
        let hash = self.submit(self.settings.address, U256::ZERO, input).await?;
        info!("{} confirmed in {hash}", C::SIGNATURE);
        Ok(hash)
    }

    /// Sends plain ether from the wallet
    pub async fn transfer(&self, to: Address, value: U256) -> Result<TxHash, ChainError> {
        self.submit(to, value, Bytes::new()).await
    }

    async fn submit(&self, to: Address, value: U256, input: Bytes) -> Result<TxHash, ChainError> {
        let (Some(wallet), Some(from)) = (self.wallet.as_ref(), self.account) else {
            return Err(ChainError::NoSigner);
        };
        let chain_id = self.chain_id().await?;

        // nonce lookup and broadcast must not interleave between callers
        let hash = {
            let _guard = self.send_lock.lock().await;

            let request = TransactionRequest::default()
                .with_from(from)
                .with_to(to)
                .with_value(value)
                .with_input(input);
            let gas = self.provider.estimate_gas(request.clone()).await?;
            let nonce = self.provider.get_transaction_count(from).pending().await?;
            let gas_price = self.provider.get_gas_price().await?;

            let envelope = request
                .with_nonce(nonce)
                .with_gas_price(gas_price)
                .with_gas_limit(gas.saturating_add(gas / 5))
                .with_chain_id(chain_id)
                .build(wallet)
                .await
                .map_err(|e| ChainError::Signing(e.to_string()))?;

            let pending = self
                .provider
                .send_raw_transaction(&envelope.encoded_2718())
                .await?;
            *pending.tx_hash()
        };

        debug!("Broadcast {hash}, waiting for receipt");
        let receipt = self.wait_for_receipt(hash).await?;
        if !receipt.status() {
            return Err(ChainError::Reverted(hash));
        }
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TransactionReceipt, ChainError> {
        let deadline = Instant::now() + self.settings.receipt_timeout;
        loop {
            if let Some(receipt) = self.provider.get_transaction_receipt(hash).await? {
                return Ok(receipt);
            }
            if Instant::now() >= deadline {
                return Err(ChainError::ReceiptTimeout(hash));
            }
            sleep(self.settings.receipt_poll_interval).await;
        }
    }
}

fn small(value: U256) -> Result<u64, ChainError> {
    u64::try_from(value).map_err(|_| ChainError::Malformed(format!("{value} overflows u64")))
}

#[async_trait]
impl VotingReader for RpcVotingContract {
    async fn election_count(&self) -> Result<u64, ChainError> {
        small(self.read(VotingSystem::electionCountCall {}).await?)
    }

    async fn election_details(&self, election: u64) -> Result<ElectionSummary, ChainError> {
        let details = self
            .read(VotingSystem::getElectionDetailsCall {
                electionId: U256::from(election),
            })
            .await?;

        Ok(ElectionSummary {
            id: election,
            name: details.name,
            active: details.active,
            start_time: small(details.startTime)?,
            end_time: small(details.endTime)?,
            office_count: small(details.officeCount)?,
        })
    }

    async fn candidates(&self, election: u64, office: u64) -> Result<Vec<Candidate>, ChainError> {
        let list = self
            .read(VotingSystem::getCandidatesCall {
                electionId: U256::from(election),
                officeIndex: U256::from(office),
            })
            .await?;

        list.into_iter()
            .enumerate()
            .map(|(index, candidate)| {
                Ok(Candidate {
                    index: index as u64,
                    name: candidate.name,
                    vote_count: small(candidate.voteCount)?,
                })
            })
            .collect()
    }

    async fn has_role(&self, role: Role, account: Address) -> Result<bool, ChainError> {
        self.read(VotingSystem::hasRoleCall {
            role: role.id(),
            account,
        })
        .await
    }

    async fn view_admins(&self) -> Result<Vec<Address>, ChainError> {
        self.read(VotingSystem::viewAdminsCall {}).await
    }

    async fn view_voters(&self) -> Result<Vec<Address>, ChainError> {
        self.read(VotingSystem::viewVotersCall {}).await
    }

    async fn latest_block(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn events(&self, query: &EventQuery) -> Result<Vec<EventRecord>, ChainError> {
        let from = query.from_block.unwrap_or(self.settings.from_block);
        let to = match query.to_block {
            Some(block) => block,
            None => self.latest_block().await?,
        };
        if from > to {
            return Ok(Vec::new());
        }

        let span = self.settings.log_chunk_size.unwrap_or(u64::MAX).max(1);
        let mut records = Vec::new();
        let mut start = from;

        loop {
            let end = start.saturating_add(span - 1).min(to);
            let filter = query.filter(self.settings.address, start, end);

            for log in self.provider.get_logs(&filter).await? {
                let block_number = log.block_number.unwrap_or_default();
                let log_index = log.log_index.unwrap_or_default();
                match ContractEvent::decode(log.topics(), &log.data().data) {
                    Ok(Some(event)) if query.matches(&event) => records.push(EventRecord {
                        block_number,
                        log_index,
                        transaction_hash: log.transaction_hash,
                        event,
                    }),
                    Ok(_) => {}
                    Err(e) => warn!("Skipping undecodable log {block_number}:{log_index}: {e}"),
                }
            }

            if end >= to {
                break;
            }
            start = end + 1;
        }

        records.sort_by_key(|r| (r.block_number, r.log_index));
        debug!("Fetched {} events in blocks {from}..={to}", records.len());
        Ok(records)
    }
}

#[async_trait]
impl VotingWriter for RpcVotingContract {
    async fn add_admin(&self, account: Address) -> Result<TxHash, ChainError> {
        self.write(VotingSystem::addAdminCall { account }).await
    }

    async fn register_voter(&self, account: Address) -> Result<TxHash, ChainError> {
        self.write(VotingSystem::registerVoterCall { voter: account })
            .await
    }

    async fn create_election(
        &self,
        name: &str,
        start_time: u64,
        end_time: u64,
    ) -> Result<TxHash, ChainError> {
        self.write(VotingSystem::createElectionCall {
            name: name.to_string(),
            startTime: U256::from(start_time),
            endTime: U256::from(end_time),
        })
        .await
    }

    async fn update_election(
        &self,
        election: u64,
        name: &str,
        start_time: u64,
        end_time: u64,
    ) -> Result<TxHash, ChainError> {
        self.write(VotingSystem::updateElectionCall {
            electionId: U256::from(election),
            name: name.to_string(),
            startTime: U256::from(start_time),
            endTime: U256::from(end_time),
        })
        .await
    }

    async fn delete_election(&self, election: u64) -> Result<TxHash, ChainError> {
        self.write(VotingSystem::deleteElectionCall {
            electionId: U256::from(election),
        })
        .await
    }

    async fn end_election(&self, election: u64) -> Result<TxHash, ChainError> {
        self.write(VotingSystem::endElectionCall {
            electionId: U256::from(election),
        })
        .await
    }

    async fn add_office(&self, election: u64, name: &str) -> Result<TxHash, ChainError> {
        self.write(VotingSystem::addOfficeCall {
            electionId: U256::from(election),
            officeName: name.to_string(),
        })
        .await
    }

    async fn add_candidate(
        &self,
        election: u64,
        office: u64,
        name: &str,
    ) -> Result<TxHash, ChainError> {
        self.write(VotingSystem::addCandidateCall {
            electionId: U256::from(election),
            officeIndex: U256::from(office),
            candidateName: name.to_string(),
        })
        .await
    }

    async fn vote(&self, election: u64, office: u64, candidate: u64) -> Result<TxHash, ChainError> {
        self.write(VotingSystem::voteCall {
            electionId: U256::from(election),
            officeIndex: U256::from(office),
            candidateIndex: U256::from(candidate),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract() -> RpcVotingContract {
        let settings = ContractSettings {
            chain_id: Some(31_337),
            ..ContractSettings::new(Address::repeat_byte(1))
        };
        RpcVotingContract::connect("http://127.0.0.1:1", settings).unwrap()
    }

    #[tokio::test]
    async fn writes_without_wallet_fail_before_network() {
        let err = contract().vote(1, 0, 0).await.unwrap_err();
        assert!(matches!(err, ChainError::NoSigner));
    }

    #[tokio::test]
    async fn configured_chain_id_skips_lookup() {
        assert_eq!(contract().chain_id().await.unwrap(), 31_337);
    }

    #[tokio::test]
    async fn account_follows_wallet() {
        assert_eq!(contract().account(), None);
        let signer = parse_signer(&"46".repeat(32)).unwrap();
        let address = signer.address();
        assert_eq!(contract().with_signer(signer).account(), Some(address));
    }

    #[test]
    fn signer_derives_known_address() {
        let signer =
            parse_signer("0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80")
                .unwrap();
        assert_eq!(
            signer.address().to_string(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
        assert!(matches!(parse_signer("not-a-key"), Err(ChainError::InvalidKey)));
    }

    #[test]
    fn bad_rpc_url_is_rejected() {
        let settings = ContractSettings::new(Address::ZERO);
        assert!(matches!(
            RpcVotingContract::connect("not a url", settings),
            Err(ChainError::InvalidUrl(_))
        ));
    }
}
