/*!
Admin and voter operations behind the command line
*/

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use trustvote_chain::{
    Address, ChainError, ElectionResults, ElectionSummary, Role, TxHash, VotingReader,
    VotingWriter, tally, unix_now,
};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Election {0} is not open for voting")]
    ElectionClosed(u64),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl CommandError {
    pub fn reason(&self) -> String {
        match self {
            CommandError::Chain(e) => e.reason(),
            other => other.to_string(),
        }
    }
}

/// A state-changing contract call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteAction {
    AddAdmin(Address),
    RegisterVoter(Address),
    CreateElection {
        name: String,
        start_time: u64,
        end_time: u64,
    },
    UpdateElection {
        election: u64,
        name: String,
        start_time: u64,
        end_time: u64,
    },
    DeleteElection(u64),
    EndElection(u64),
    AddOffice {
        election: u64,
        name: String,
    },
    AddCandidate {
        election: u64,
        office: u64,
        name: String,
    },
    Vote {
        election: u64,
        office: u64,
        candidate: u64,
    },
}

impl WriteAction {
    fn success(&self) -> &'static str {
        match self {
            WriteAction::AddAdmin(_) => "Admin added successfully",
            WriteAction::RegisterVoter(_) => "Voter registered successfully",
            WriteAction::CreateElection { .. } => "Election created successfully",
            WriteAction::UpdateElection { .. } => "Election updated successfully",
            WriteAction::DeleteElection(_) => "Election deleted successfully",
            WriteAction::EndElection(_) => "Election ended successfully",
            WriteAction::AddOffice { .. } => "Office added successfully",
            WriteAction::AddCandidate { .. } => "Candidate added successfully",
            WriteAction::Vote { .. } => "Vote cast successfully!",
        }
    }

    fn failure(&self) -> &'static str {
        match self {
            WriteAction::AddAdmin(_) => "Error adding admin",
            WriteAction::RegisterVoter(_) => "Error registering voter",
            WriteAction::CreateElection { .. } => "Error creating election",
            WriteAction::UpdateElection { .. } => "Error updating election",
            WriteAction::DeleteElection(_) => "Error deleting election",
            WriteAction::EndElection(_) => "Error ending election",
            WriteAction::AddOffice { .. } => "Error adding office",
            WriteAction::AddCandidate { .. } => "Error adding candidate",
            WriteAction::Vote { .. } => "Error casting vote",
        }
    }

    /// One-line outcome shown to the user
    pub fn status_line(&self, outcome: &Result<TxHash, CommandError>) -> String {
        match outcome {
            Ok(hash) => format!("{} (tx {hash})", self.success()),
            Err(e) => format!("{}: {}", self.failure(), e.reason()),
        }
    }

    pub async fn execute<C>(&self, contract: &C, now: u64) -> Result<TxHash, CommandError>
    where
        C: VotingReader + VotingWriter + ?Sized,
    {
        let hash = match self {
            WriteAction::AddAdmin(account) => contract.add_admin(*account).await?,
            WriteAction::RegisterVoter(account) => contract.register_voter(*account).await?,
            WriteAction::CreateElection {
                name,
                start_time,
                end_time,
            } => contract.create_election(name, *start_time, *end_time).await?,
            WriteAction::UpdateElection {
                election,
                name,
                start_time,
                end_time,
            } => {
                contract
                    .update_election(*election, name, *start_time, *end_time)
                    .await?
            }
            WriteAction::DeleteElection(election) => contract.delete_election(*election).await?,
            WriteAction::EndElection(election) => contract.end_election(*election).await?,
            WriteAction::AddOffice { election, name } => {
                contract.add_office(*election, name).await?
            }
            WriteAction::AddCandidate {
                election,
                office,
                name,
            } => contract.add_candidate(*election, *office, name).await?,
            WriteAction::Vote {
                election,
                office,
                candidate,
            } => {
                let details = contract.election_details(*election).await?;
                if !details.is_open(now) {
                    return Err(CommandError::ElectionClosed(*election));
                }
                contract.vote(*election, *office, *candidate).await?
            }
        };
        Ok(hash)
    }
}

/// Runs `action` behind a spinner and returns its status line
pub async fn run_write<C>(contract: &C, action: &WriteAction) -> (bool, String)
where
    C: VotingReader + VotingWriter + ?Sized,
{
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Waiting for confirmation...");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let outcome = action.execute(contract, unix_now()).await;
    spinner.finish_and_clear();

    match &outcome {
        Ok(hash) => info!("✅ {action:?} confirmed in {hash}"),
        Err(e) => warn!("❌ {action:?} failed: {e}"),
    }
    (outcome.is_ok(), action.status_line(&outcome))
}

/// Where `results` reads its numbers from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsSource {
    /// Rebuilt from `VoteCast` logs
    Events,
    /// The contract's own counters
    Contract,
}

impl std::str::FromStr for ResultsSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "events" => Ok(ResultsSource::Events),
            "contract" => Ok(ResultsSource::Contract),
            other => Err(format!("unknown results source {other:?}")),
        }
    }
}

pub async fn election_results(
    reader: &dyn VotingReader,
    election: u64,
    source: ResultsSource,
) -> Result<ElectionResults, ChainError> {
    match source {
        ResultsSource::Events => tally::reconstruct(reader, election).await,
        ResultsSource::Contract => tally::results_from_counters(reader, election).await,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_elections: usize,
    pub active_elections: usize,
    pub admins: usize,
    pub voters: usize,
}

pub async fn dashboard_stats(
    reader: &dyn VotingReader,
    now: u64,
) -> Result<DashboardStats, ChainError> {
    let elections = reader.list_elections().await?;
    Ok(DashboardStats {
        total_elections: elections.len(),
        active_elections: elections.iter().filter(|e| e.is_open(now)).count(),
        admins: reader.view_admins().await?.len(),
        voters: reader.view_voters().await?.len(),
    })
}

/// Offices `0..office_count` with their announced names
pub async fn office_list(
    reader: &dyn VotingReader,
    election: u64,
) -> Result<Vec<(u64, String)>, ChainError> {
    let details = reader.election_details(election).await?;
    let mut names = tally::office_names(reader, election).await?;
    Ok((0..details.office_count)
        .map(|i| (i, names.remove(&i).unwrap_or_else(|| tally::fallback_office_name(i))))
        .collect())
}

pub async fn roles_of(
    reader: &dyn VotingReader,
    account: Address,
) -> Result<Vec<(Role, bool)>, ChainError> {
    let mut roles = Vec::new();
    for role in Role::all() {
        roles.push((role, reader.has_role(role, account).await?));
    }
    Ok(roles)
}

/// Accepts unix seconds, RFC 3339, or local `YYYY-MM-DDTHH:MM`
pub fn parse_timestamp(value: &str) -> Result<u64, String> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(seconds);
    }
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return u64::try_from(time.timestamp()).map_err(|_| format!("{value} is before 1970"));
    }
    for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            let local = Local
                .from_local_datetime(&naive)
                .earliest()
                .ok_or_else(|| format!("{value} does not exist in the local time zone"))?;
            return u64::try_from(local.timestamp()).map_err(|_| format!("{value} is before 1970"));
        }
    }
    Err(format!("unrecognised time {value:?}"))
}

pub fn format_timestamp(seconds: u64) -> String {
    i64::try_from(seconds)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

pub fn format_election(election: &ElectionSummary, now: u64) -> String {
    format!(
        "#{} {} [{}] {} → {} ({} offices)",
        election.id,
        election.name,
        if election.is_open(now) { "Active" } else { "Inactive" },
        format_timestamp(election.start_time),
        format_timestamp(election.end_time),
        election.office_count
    )
}

pub fn format_results(results: &ElectionResults) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Election {}: {}",
        results.election,
        results.name.as_deref().unwrap_or("(unnamed)")
    );
    for office in &results.offices {
        let _ = writeln!(out, "\n{} ({} votes)", office.name, office.total_votes);
        if office.candidates.is_empty() {
            let _ = writeln!(out, "  no candidates");
        }
        for candidate in &office.candidates {
            let _ = writeln!(
                out,
                "  {:<24} {:>6} votes {:>4}%",
                candidate.name, candidate.votes, candidate.percentage
            );
        }
    }
    if results.ignored_votes > 0 {
        let _ = writeln!(out, "\n{} votes referenced unknown candidates", results.ignored_votes);
    }
    out
}
