/*!
Voting contract events: topics, decoding and query filters
*/

use alloy::primitives::{Address, B256, TxHash, U256};
use alloy::rpc::types::Filter;
use alloy::sol_types::SolEvent;
use serde::Serialize;

use crate::bindings::VotingSystem;
use crate::error::ChainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    ElectionCreated,
    OfficeAdded,
    CandidateAdded,
    VoteCast,
}

impl EventKind {
    pub fn all() -> [EventKind; 4] {
        [
            EventKind::ElectionCreated,
            EventKind::OfficeAdded,
            EventKind::CandidateAdded,
            EventKind::VoteCast,
        ]
    }

    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::ElectionCreated => VotingSystem::ElectionCreated::SIGNATURE,
            EventKind::OfficeAdded => VotingSystem::OfficeAdded::SIGNATURE,
            EventKind::CandidateAdded => VotingSystem::CandidateAdded::SIGNATURE,
            EventKind::VoteCast => VotingSystem::VoteCast::SIGNATURE,
        }
    }

    pub fn topic(&self) -> B256 {
        match self {
            EventKind::ElectionCreated => VotingSystem::ElectionCreated::SIGNATURE_HASH,
            EventKind::OfficeAdded => VotingSystem::OfficeAdded::SIGNATURE_HASH,
            EventKind::CandidateAdded => VotingSystem::CandidateAdded::SIGNATURE_HASH,
            EventKind::VoteCast => VotingSystem::VoteCast::SIGNATURE_HASH,
        }
    }

    fn from_topic(topic: &B256) -> Option<Self> {
        Self::all().into_iter().find(|kind| kind.topic() == *topic)
    }

    /// Whether the office index is an indexed topic (position 2)
    fn indexes_office(&self) -> bool {
        matches!(self, EventKind::CandidateAdded | EventKind::VoteCast)
    }

    fn topic_count(&self) -> usize {
        if self.indexes_office() { 3 } else { 2 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event")]
pub enum ContractEvent {
    ElectionCreated {
        election: u64,
        name: String,
        start_time: u64,
        end_time: u64,
    },
    OfficeAdded {
        election: u64,
        office: u64,
        name: String,
    },
    CandidateAdded {
        election: u64,
        office: u64,
        candidate: u64,
        name: String,
    },
    VoteCast {
        election: u64,
        office: u64,
        candidate: u64,
        #[serde(serialize_with = "crate::address::checksummed::serialize")]
        voter: Address,
    },
}

fn small(value: U256, field: &str) -> Result<u64, ChainError> {
    u64::try_from(value)
        .map_err(|_| ChainError::Malformed(format!("{field} {value} overflows u64")))
}

impl ContractEvent {
    /// Decodes a log; logs from other events yield `None`
    pub fn decode(topics: &[B256], data: &[u8]) -> Result<Option<Self>, ChainError> {
        let Some(kind) = topics.first().and_then(EventKind::from_topic) else {
            return Ok(None);
        };
        if topics.len() != kind.topic_count() {
            return Err(ChainError::Malformed(format!(
                "{kind:?} log has {} topics, expected {}",
                topics.len(),
                kind.topic_count()
            )));
        }

        let topics = topics.iter().copied();
        let event = match kind {
            EventKind::ElectionCreated => {
                let log = VotingSystem::ElectionCreated::decode_raw_log(topics, data)?;
                ContractEvent::ElectionCreated {
                    election: small(log.electionId, "election")?,
                    name: log.name,
                    start_time: small(log.startTime, "start time")?,
                    end_time: small(log.endTime, "end time")?,
                }
            }
            EventKind::OfficeAdded => {
                let log = VotingSystem::OfficeAdded::decode_raw_log(topics, data)?;
                ContractEvent::OfficeAdded {
                    election: small(log.electionId, "election")?,
                    office: small(log.officeIndex, "office")?,
                    name: log.officeName,
                }
            }
            EventKind::CandidateAdded => {
                let log = VotingSystem::CandidateAdded::decode_raw_log(topics, data)?;
                ContractEvent::CandidateAdded {
                    election: small(log.electionId, "election")?,
                    office: small(log.officeIndex, "office")?,
                    candidate: small(log.candidateIndex, "candidate")?,
                    name: log.candidateName,
                }
            }
            EventKind::VoteCast => {
                let log = VotingSystem::VoteCast::decode_raw_log(topics, data)?;
                ContractEvent::VoteCast {
                    election: small(log.electionId, "election")?,
                    office: small(log.officeIndex, "office")?,
                    candidate: small(log.candidateIndex, "candidate")?,
                    voter: log.voter,
                }
            }
        };

        Ok(Some(event))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ContractEvent::ElectionCreated { .. } => EventKind::ElectionCreated,
            ContractEvent::OfficeAdded { .. } => EventKind::OfficeAdded,
            ContractEvent::CandidateAdded { .. } => EventKind::CandidateAdded,
            ContractEvent::VoteCast { .. } => EventKind::VoteCast,
        }
    }

    pub fn election(&self) -> u64 {
        match self {
            ContractEvent::ElectionCreated { election, .. }
            | ContractEvent::OfficeAdded { election, .. }
            | ContractEvent::CandidateAdded { election, .. }
            | ContractEvent::VoteCast { election, .. } => *election,
        }
    }

    pub fn office(&self) -> Option<u64> {
        match self {
            ContractEvent::ElectionCreated { .. } => None,
            ContractEvent::OfficeAdded { office, .. }
            | ContractEvent::CandidateAdded { office, .. }
            | ContractEvent::VoteCast { office, .. } => Some(*office),
        }
    }
}

/// A decoded event with its position in the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRecord {
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: Option<TxHash>,
    pub event: ContractEvent,
}

/// Which events to fetch. Unset block bounds default to the contract's
/// deployment block and the current head.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    pub kinds: Vec<EventKind>,
    pub election: Option<u64>,
    pub office: Option<u64>,
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
}

impl EventQuery {
    pub fn new(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn election(mut self, election: u64) -> Self {
        self.election = Some(election);
        self
    }

    pub fn office(mut self, office: u64) -> Self {
        self.office = Some(office);
        self
    }

    pub fn blocks(mut self, from: u64, to: u64) -> Self {
        self.from_block = Some(from);
        self.to_block = Some(to);
        self
    }

    fn effective_kinds(&self) -> Vec<EventKind> {
        if self.kinds.is_empty() {
            EventKind::all().to_vec()
        } else {
            self.kinds.clone()
        }
    }

    /// `eth_getLogs` filter for one block range. The office topic is only
    /// used when every requested kind indexes it; otherwise
    /// [`EventQuery::matches`] filters client side.
    pub fn filter(&self, contract: Address, from_block: u64, to_block: u64) -> Filter {
        let kinds = self.effective_kinds();
        let mut filter = Filter::new()
            .address(contract)
            .from_block(from_block)
            .to_block(to_block)
            .event_signature(kinds.iter().map(EventKind::topic).collect::<Vec<_>>());

        if let Some(election) = self.election {
            filter = filter.topic1(U256::from(election));
        }
        if let Some(office) = self
            .office
            .filter(|_| kinds.iter().all(EventKind::indexes_office))
        {
            filter = filter.topic2(U256::from(office));
        }
        filter
    }

    pub fn matches(&self, event: &ContractEvent) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind()) {
            return false;
        }
        if self.election.is_some_and(|e| e != event.election()) {
            return false;
        }
        match self.office {
            Some(office) => event.office() == Some(office),
            None => true,
        }
    }
}
