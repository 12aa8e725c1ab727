/*!
Election results rebuilt from contract events or read from on-chain counters

The event path folds `OfficeAdded`, `CandidateAdded` and `VoteCast` entries
into per-office counters. The same fold drives the live watcher, one event
at a time, through [`ElectionTally::apply`].
*/

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::debug;

use crate::contract::VotingReader;
use crate::error::ChainError;
use crate::events::{ContractEvent, EventKind, EventQuery};
use crate::types::Candidate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateResult {
    pub index: u64,
    pub name: String,
    pub votes: u64,
    pub percentage: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfficeResult {
    pub index: u64,
    pub name: String,
    pub total_votes: u64,
    /// Ordered by votes, descending; ties keep candidate order
    pub candidates: Vec<CandidateResult>,
}

impl OfficeResult {
    pub fn new(index: u64, name: Option<String>, candidates: Vec<Candidate>) -> Self {
        let total_votes = candidates.iter().map(|c| c.vote_count).sum();
        let mut candidates: Vec<CandidateResult> = candidates
            .into_iter()
            .map(|c| CandidateResult {
                index: c.index,
                percentage: percentage(c.vote_count, total_votes),
                name: c.name,
                votes: c.vote_count,
            })
            .collect();
        candidates.sort_by(|a, b| b.votes.cmp(&a.votes));

        Self {
            index,
            name: name.unwrap_or_else(|| fallback_office_name(index)),
            total_votes,
            candidates,
        }
    }

    pub fn leader(&self) -> Option<&CandidateResult> {
        self.candidates.first().filter(|c| c.votes > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElectionResults {
    pub election: u64,
    pub name: Option<String>,
    pub offices: Vec<OfficeResult>,
    /// Votes naming an office or candidate no event introduced
    pub ignored_votes: u64,
}

/// Share of `total` rounded to the nearest whole percent, halves up
pub fn percentage(votes: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let votes = u128::from(votes);
    let total = u128::from(total);
    ((votes * 200 + total) / (total * 2)) as u8
}

pub fn fallback_office_name(index: u64) -> String {
    format!("Office {}", index + 1)
}

#[derive(Debug, Clone, Default)]
struct OfficeTally {
    name: Option<String>,
    candidates: BTreeMap<u64, Candidate>,
}

/// Running per-office counters for one election
#[derive(Debug, Clone)]
pub struct ElectionTally {
    election: u64,
    name: Option<String>,
    offices: BTreeMap<u64, OfficeTally>,
    ignored_votes: u64,
}

impl ElectionTally {
    pub fn new(election: u64) -> Self {
        Self {
            election,
            name: None,
            offices: BTreeMap::new(),
            ignored_votes: 0,
        }
    }

    pub fn from_events<'a>(
        election: u64,
        events: impl IntoIterator<Item = &'a ContractEvent>,
    ) -> Self {
        let mut tally = Self::new(election);
        for event in events {
            tally.apply(event);
        }
        tally
    }

    pub fn election(&self) -> u64 {
        self.election
    }

    pub fn ignored_votes(&self) -> u64 {
        self.ignored_votes
    }

    /// Folds one event in. Returns false for events of other elections.
    pub fn apply(&mut self, event: &ContractEvent) -> bool {
        if event.election() != self.election {
            return false;
        }

        match event {
            ContractEvent::ElectionCreated { name, .. } => {
                self.name = Some(name.clone());
            }
            ContractEvent::OfficeAdded { office, name, .. } => {
                self.offices.entry(*office).or_default().name = Some(name.clone());
            }
            ContractEvent::CandidateAdded {
                office,
                candidate,
                name,
                ..
            } => {
                let entry = self.offices.entry(*office).or_default();
                let tracked = entry.candidates.entry(*candidate).or_insert_with(|| Candidate {
                    index: *candidate,
                    name: String::new(),
                    vote_count: 0,
                });
                tracked.name = name.clone();
            }
            ContractEvent::VoteCast {
                office, candidate, ..
            } => {
                let counted = self
                    .offices
                    .get_mut(office)
                    .and_then(|o| o.candidates.get_mut(candidate))
                    .map(|c| c.vote_count += 1)
                    .is_some();
                if !counted {
                    debug!(
                        "Vote for unknown candidate {candidate} in office {office} of election {}",
                        self.election
                    );
                    self.ignored_votes += 1;
                }
            }
        }
        true
    }

    pub fn office_result(&self, office: u64) -> OfficeResult {
        match self.offices.get(&office) {
            Some(tally) => OfficeResult::new(
                office,
                tally.name.clone(),
                tally.candidates.values().cloned().collect(),
            ),
            None => OfficeResult::new(office, None, Vec::new()),
        }
    }

    /// Results for every office seen in events
    pub fn results(&self) -> ElectionResults {
        let office_count = self.offices.keys().next_back().map_or(0, |last| last + 1);
        self.results_with_office_count(office_count)
    }

    /// Results for offices `0..office_count`, filling gaps with empty offices
    pub fn results_with_office_count(&self, office_count: u64) -> ElectionResults {
        ElectionResults {
            election: self.election,
            name: self.name.clone(),
            offices: (0..office_count).map(|i| self.office_result(i)).collect(),
            ignored_votes: self.ignored_votes,
        }
    }
}

/// Keeps one tally per election for a mixed event stream
#[derive(Debug, Default)]
pub struct TallyBook {
    elections: HashMap<u64, ElectionTally>,
}

impl TallyBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `event` and returns the tally it touched
    pub fn apply(&mut self, event: &ContractEvent) -> &ElectionTally {
        let election = event.election();
        let tally = self
            .elections
            .entry(election)
            .or_insert_with(|| ElectionTally::new(election));
        tally.apply(event);
        tally
    }

    pub fn get(&self, election: u64) -> Option<&ElectionTally> {
        self.elections.get(&election)
    }

    pub fn len(&self) -> usize {
        self.elections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elections.is_empty()
    }
}

/// Rebuilds an election's results from its event log
pub async fn reconstruct(
    reader: &dyn VotingReader,
    election: u64,
) -> Result<ElectionResults, ChainError> {
    let details = reader.election_details(election).await?;
    let query = EventQuery::new([
        EventKind::OfficeAdded,
        EventKind::CandidateAdded,
        EventKind::VoteCast,
    ])
    .election(election);
    let records = reader.events(&query).await?;

    let tally = ElectionTally::from_events(election, records.iter().map(|r| &r.event));
    let mut results = tally.results_with_office_count(details.office_count);
    results.name = Some(details.name);
    Ok(results)
}

/// One office, following the per-office event filters
pub async fn office_tally(
    reader: &dyn VotingReader,
    election: u64,
    office: u64,
) -> Result<OfficeResult, ChainError> {
    let names = reader
        .events(&EventQuery::new([EventKind::OfficeAdded]).election(election).office(office))
        .await?;
    let candidates = reader
        .events(&EventQuery::new([EventKind::CandidateAdded]).election(election).office(office))
        .await?;
    let votes = reader
        .events(&EventQuery::new([EventKind::VoteCast]).election(election).office(office))
        .await?;

    let events = names.iter().chain(&candidates).chain(&votes).map(|r| &r.event);
    Ok(ElectionTally::from_events(election, events).office_result(office))
}

/// Office names announced by `OfficeAdded`, sorted by index
pub async fn office_names(
    reader: &dyn VotingReader,
    election: u64,
) -> Result<BTreeMap<u64, String>, ChainError> {
    let records = reader
        .events(&EventQuery::new([EventKind::OfficeAdded]).election(election))
        .await?;
    Ok(records
        .into_iter()
        .filter_map(|r| match r.event {
            ContractEvent::OfficeAdded { office, name, .. } => Some((office, name)),
            _ => None,
        })
        .collect())
}

/// Results from the contract's own counters (`getCandidates`), with office
/// names taken from events
pub async fn results_from_counters(
    reader: &dyn VotingReader,
    election: u64,
) -> Result<ElectionResults, ChainError> {
    let details = reader.election_details(election).await?;
    let mut names = office_names(reader, election).await?;

    let mut offices = Vec::new();
    for index in 0..details.office_count {
        let candidates = reader.candidates(election, index).await?;
        offices.push(OfficeResult::new(index, names.remove(&index), candidates));
    }

    Ok(ElectionResults {
        election,
        name: Some(details.name),
        offices,
        ignored_votes: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;

    fn office(election: u64, office: u64, name: &str) -> ContractEvent {
        ContractEvent::OfficeAdded {
            election,
            office,
            name: name.into(),
        }
    }

    fn candidate(office: u64, candidate: u64, name: &str) -> ContractEvent {
        ContractEvent::CandidateAdded {
            election: 1,
            office,
            candidate,
            name: name.into(),
        }
    }

    fn vote(office: u64, candidate: u64) -> ContractEvent {
        ContractEvent::VoteCast {
            election: 1,
            office,
            candidate,
            voter: Address::ZERO,
        }
    }

    #[test]
    fn counts_votes_per_candidate() {
        let mut events = vec![
            office(1, 0, "Mayor"),
            candidate(0, 0, "Alice"),
            candidate(0, 1, "Bob"),
        ];
        events.extend(std::iter::repeat_n(vote(0, 0), 3));
        events.extend(std::iter::repeat_n(vote(0, 1), 5));

        let result = ElectionTally::from_events(1, &events).office_result(0);
        assert_eq!(result.name, "Mayor");
        assert_eq!(result.total_votes, 8);
        assert_eq!(result.candidates[0].name, "Bob");
        assert_eq!(result.candidates[0].votes, 5);
        assert_eq!(result.candidates[0].percentage, 63);
        assert_eq!(result.candidates[1].votes, 3);
        assert_eq!(result.candidates[1].percentage, 38);
        assert_eq!(result.leader().unwrap().name, "Bob");
    }

    #[test]
    fn ties_keep_candidate_order() {
        let events = [
            candidate(0, 0, "Alice"),
            candidate(0, 1, "Bob"),
            candidate(0, 2, "Carol"),
            vote(0, 2),
            vote(0, 1),
        ];
        let result = ElectionTally::from_events(1, &events).office_result(0);
        let order: Vec<_> = result.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(order, ["Bob", "Carol", "Alice"]);
    }

    #[test]
    fn unnamed_office_falls_back() {
        let result = ElectionTally::from_events(1, &[candidate(2, 0, "Dana")]).results();
        assert_eq!(result.offices.len(), 3);
        assert_eq!(result.offices[0].name, "Office 1");
        assert_eq!(result.offices[2].name, "Office 3");
        assert_eq!(result.offices[2].candidates.len(), 1);
    }

    #[test]
    fn votes_for_unknown_candidates_are_ignored() {
        let events = [candidate(0, 0, "Alice"), vote(0, 4), vote(3, 0), vote(0, 0)];
        let tally = ElectionTally::from_events(1, &events);
        assert_eq!(tally.ignored_votes(), 2);
        assert_eq!(tally.office_result(0).total_votes, 1);
    }

    #[test]
    fn other_elections_are_not_applied() {
        let mut tally = ElectionTally::new(1);
        assert!(!tally.apply(&office(2, 0, "Governor")));
        assert!(tally.results().offices.is_empty());
    }

    #[test]
    fn no_votes_means_zero_percent() {
        let result = ElectionTally::from_events(1, &[candidate(0, 0, "Alice")]).office_result(0);
        assert_eq!(result.total_votes, 0);
        assert_eq!(result.candidates[0].percentage, 0);
        assert!(result.leader().is_none());
    }

    #[test]
    fn percentage_rounds_half_up() {
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(1, 2), 50);
        assert_eq!(percentage(4, 4), 100);
        assert_eq!(percentage(0, 0), 0);
    }

    #[test]
    fn office_count_pads_missing_offices() {
        let tally = ElectionTally::from_events(1, &[office(1, 0, "Mayor")]);
        let results = tally.results_with_office_count(2);
        assert_eq!(results.offices.len(), 2);
        assert_eq!(results.offices[1].name, "Office 2");
    }

    #[test]
    fn tally_book_splits_elections() {
        let mut book = TallyBook::new();
        book.apply(&office(1, 0, "Mayor"));
        book.apply(&office(2, 0, "Governor"));
        let touched = book.apply(&candidate(0, 0, "Alice"));
        assert_eq!(touched.election(), 1);
        assert_eq!(book.len(), 2);
        assert_eq!(book.get(2).unwrap().office_result(0).name, "Governor");
    }
}
