use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use trustvote_chain::{
    Address, Candidate, ChainError, ContractEvent, ElectionSummary, EventQuery, EventRecord, Role,
    VotingReader, tally,
};

/// In-memory contract: a fixed event log plus the counters `getCandidates` would report
#[derive(Default)]
struct FakeReader {
    elections: HashMap<u64, ElectionSummary>,
    candidates: HashMap<(u64, u64), Vec<Candidate>>,
    log: Vec<ContractEvent>,
    queries: Mutex<Vec<EventQuery>>,
}

impl FakeReader {
    fn with_election(mut self, id: u64, name: &str, office_count: u64) -> Self {
        self.elections.insert(
            id,
            ElectionSummary {
                id,
                name: name.to_string(),
                active: true,
                start_time: 1_700_000_000,
                end_time: 1_800_000_000,
                office_count,
            },
        );
        self
    }

    fn emit(mut self, event: ContractEvent) -> Self {
        self.log.push(event);
        self
    }

    fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl VotingReader for FakeReader {
    async fn election_count(&self) -> Result<u64, ChainError> {
        Ok(self.elections.keys().max().copied().unwrap_or(0))
    }

    async fn election_details(&self, election: u64) -> Result<ElectionSummary, ChainError> {
        self.elections.get(&election).cloned().ok_or(ChainError::Rpc {
            code: 3,
            message: "execution reverted: Election does not exist".into(),
            reason: Some("Election does not exist".into()),
        })
    }

    async fn candidates(&self, election: u64, office: u64) -> Result<Vec<Candidate>, ChainError> {
        Ok(self
            .candidates
            .get(&(election, office))
            .cloned()
            .unwrap_or_default())
    }

    async fn has_role(&self, _role: Role, _account: Address) -> Result<bool, ChainError> {
        Ok(false)
    }

    async fn view_admins(&self) -> Result<Vec<Address>, ChainError> {
        Ok(Vec::new())
    }

    async fn view_voters(&self) -> Result<Vec<Address>, ChainError> {
        Ok(Vec::new())
    }

    async fn latest_block(&self) -> Result<u64, ChainError> {
        Ok(self.log.len() as u64)
    }

    async fn events(&self, query: &EventQuery) -> Result<Vec<EventRecord>, ChainError> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self
            .log
            .iter()
            .enumerate()
            .filter(|(_, event)| query.matches(event))
            .map(|(i, event)| EventRecord {
                block_number: i as u64 + 1,
                log_index: 0,
                transaction_hash: None,
                event: event.clone(),
            })
            .collect())
    }
}

fn office(election: u64, office: u64, name: &str) -> ContractEvent {
    ContractEvent::OfficeAdded {
        election,
        office,
        name: name.into(),
    }
}

fn candidate(election: u64, office: u64, candidate: u64, name: &str) -> ContractEvent {
    ContractEvent::CandidateAdded {
        election,
        office,
        candidate,
        name: name.into(),
    }
}

fn vote(election: u64, office: u64, candidate: u64, voter: u8) -> ContractEvent {
    ContractEvent::VoteCast {
        election,
        office,
        candidate,
        voter: Address::repeat_byte(voter),
    }
}

fn student_council() -> FakeReader {
    FakeReader::default()
        .with_election(1, "Student Council", 2)
        .with_election(2, "Book Club", 1)
        .emit(office(1, 0, "President"))
        .emit(office(1, 1, "Treasurer"))
        .emit(candidate(1, 0, 0, "Alice"))
        .emit(candidate(1, 0, 1, "Bob"))
        .emit(candidate(1, 1, 0, "Carol"))
        .emit(office(2, 0, "Chair"))
        .emit(candidate(2, 0, 0, "Dana"))
        .emit(vote(1, 0, 1, 1))
        .emit(vote(1, 0, 1, 2))
        .emit(vote(1, 0, 0, 3))
        .emit(vote(1, 1, 0, 1))
        .emit(vote(2, 0, 0, 1))
}

#[tokio::test]
async fn reconstructs_every_office_from_events() {
    let reader = student_council();
    let results = tally::reconstruct(&reader, 1).await.unwrap();

    assert_eq!(results.name.as_deref(), Some("Student Council"));
    assert_eq!(results.offices.len(), 2);
    assert_eq!(results.ignored_votes, 0);

    let president = &results.offices[0];
    assert_eq!(president.name, "President");
    assert_eq!(president.total_votes, 3);
    assert_eq!(president.candidates[0].name, "Bob");
    assert_eq!(president.candidates[0].votes, 2);
    assert_eq!(president.candidates[0].percentage, 67);
    assert_eq!(president.candidates[1].percentage, 33);

    let treasurer = &results.offices[1];
    assert_eq!(treasurer.total_votes, 1);
    assert_eq!(treasurer.candidates[0].percentage, 100);

    assert_eq!(reader.query_count(), 1);
}

#[tokio::test]
async fn office_tally_uses_filtered_queries() {
    let reader = student_council();
    let result = tally::office_tally(&reader, 1, 1).await.unwrap();

    assert_eq!(result.name, "Treasurer");
    assert_eq!(result.candidates.len(), 1);
    assert_eq!(result.candidates[0].name, "Carol");
    assert_eq!(result.total_votes, 1);
    assert_eq!(reader.query_count(), 3);
}

#[tokio::test]
async fn office_without_event_gets_default_name() {
    let reader = FakeReader::default()
        .with_election(7, "Referendum", 2)
        .emit(office(7, 0, "Question A"));
    let results = tally::reconstruct(&reader, 7).await.unwrap();

    assert_eq!(results.offices[1].name, "Office 2");
    assert!(results.offices[1].candidates.is_empty());
}

#[tokio::test]
async fn counter_results_take_names_from_events() {
    let mut reader = student_council();
    reader.candidates.insert(
        (1, 0),
        vec![
            Candidate {
                index: 0,
                name: "Alice".into(),
                vote_count: 1,
            },
            Candidate {
                index: 1,
                name: "Bob".into(),
                vote_count: 3,
            },
        ],
    );

    let results = tally::results_from_counters(&reader, 1).await.unwrap();
    assert_eq!(results.offices[0].name, "President");
    assert_eq!(results.offices[0].candidates[0].name, "Bob");
    assert_eq!(results.offices[0].candidates[0].percentage, 75);
    assert_eq!(results.offices[1].name, "Treasurer");
    assert_eq!(results.offices[1].total_votes, 0);
}

#[tokio::test]
async fn missing_election_propagates_error() {
    let reader = student_council();
    let err = tally::reconstruct(&reader, 9).await.unwrap_err();
    assert!(err.is_execution_error());
    assert_eq!(err.reason(), "Election does not exist");
}

#[tokio::test]
async fn list_elections_skips_deleted_ids() {
    let reader = FakeReader::default()
        .with_election(1, "First", 0)
        .with_election(3, "Third", 0);
    let elections = reader.list_elections().await.unwrap();
    let ids: Vec<u64> = elections.iter().map(|e| e.id).collect();
    assert_eq!(ids, [1, 3]);
}
