/*!
TrustVote command line: login backend, election administration, voting and
live results
*/

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use tracing::info;
use tracing_subscriber::EnvFilter;
use serde::Serialize;
use serde_json::json;
use trustvote_chain::{Address, EventKind, EventQuery, VotingReader, parse_address, unix_now};

use crate::core::{
    commands::{self, ResultsSource, WriteAction},
    config::AppConfig,
    event_system::ChainMonitor,
    output_plugins::OutputManager,
    server,
    tracker::ResultsTracker,
};
use crate::database::WalletStore;

mod core;
mod database;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn election_arg() -> Arg {
    Arg::new("election")
        .help("Election id")
        .required(true)
        .value_parser(value_parser!(u64))
}

fn index_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).help(help).required(true).value_parser(value_parser!(u64))
}

fn text_arg(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).help(help).required(true)
}

fn json_flag() -> Arg {
    Arg::new("json")
        .long("json")
        .help("Print JSON instead of text")
        .action(ArgAction::SetTrue)
}

fn cli() -> Command {
    Command::new("trustvote")
        .version(clap::crate_version!())
        .about("Blockchain voting: login backend, admin tools and live results")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to the config file")
                .value_name("PATH")
                .global(true),
        )
        .subcommand(Command::new("serve").about("Run the wallet login backend"))
        .subcommand(Command::new("elections").about("List elections").arg(json_flag()))
        .subcommand(
            Command::new("dashboard")
                .about("Election, admin and voter counts")
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("results")
                .about("Per-office results of an election")
                .arg(election_arg())
                .arg(
                    Arg::new("source")
                        .long("source")
                        .help("Rebuild from vote events or read the contract's counters")
                        .value_parser(["events", "contract"])
                        .default_value("events"),
                )
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("offices")
                .about("Offices of an election")
                .arg(election_arg())
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("candidates")
                .about("Candidates of an office with on-chain vote counts")
                .arg(election_arg())
                .arg(index_arg("office", "Office index"))
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("roles")
                .about("Roles held by an account")
                .arg(text_arg("address", "Account address"))
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("admins")
                .about("List admin accounts")
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("wallets")
                .about("Wallets recorded by the login backend")
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("voters")
                .about("List registered voters")
                .arg(json_flag()),
        )
        .subcommand(
            Command::new("add-admin")
                .about("Grant the admin role")
                .arg(text_arg("address", "Account address")),
        )
        .subcommand(
            Command::new("register-voter")
                .about("Grant the voter role")
                .arg(text_arg("address", "Account address")),
        )
        .subcommand(
            Command::new("create-election")
                .about("Create an election")
                .arg(text_arg("name", "Election name"))
                .arg(text_arg("start", "Start time (unix seconds, RFC 3339 or YYYY-MM-DDTHH:MM)"))
                .arg(text_arg("end", "End time")),
        )
        .subcommand(
            Command::new("update-election")
                .about("Rename or reschedule an election")
                .arg(election_arg())
                .arg(text_arg("name", "Election name"))
                .arg(text_arg("start", "Start time"))
                .arg(text_arg("end", "End time")),
        )
        .subcommand(
            Command::new("delete-election")
                .about("Delete an election")
                .arg(election_arg()),
        )
        .subcommand(
            Command::new("end-election")
                .about("Close an election early")
                .arg(election_arg()),
        )
        .subcommand(
            Command::new("add-office")
                .about("Add an office to an election")
                .arg(election_arg())
                .arg(text_arg("name", "Office name")),
        )
        .subcommand(
            Command::new("add-candidate")
                .about("Add a candidate to an office")
                .arg(election_arg())
                .arg(index_arg("office", "Office index"))
                .arg(text_arg("name", "Candidate name")),
        )
        .subcommand(
            Command::new("vote")
                .about("Cast a vote")
                .arg(election_arg())
                .arg(index_arg("office", "Office index"))
                .arg(index_arg("candidate", "Candidate index")),
        )
        .subcommand(
            Command::new("watch")
                .about("Follow contract events and print live standings")
                .arg(
                    Arg::new("election")
                        .long("election")
                        .help("Only follow this election")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("from-block")
                        .long("from-block")
                        .help("Replay history from this block (defaults to chain.from_block)")
                        .value_parser(value_parser!(u64))
                        .conflicts_with("from-head"),
                )
                .arg(
                    Arg::new("from-head")
                        .long("from-head")
                        .help("Skip history and follow new blocks only")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn address(matches: &ArgMatches) -> Result<Address, BoxError> {
    let value = string(matches, "address");
    parse_address(&value).map_err(|e| format!("Invalid address {value:?}: {e}").into())
}

fn string(matches: &ArgMatches, name: &str) -> String {
    matches.get_one::<String>(name).cloned().unwrap_or_default()
}

fn number(matches: &ArgMatches, name: &str) -> u64 {
    matches.get_one::<u64>(name).copied().unwrap_or_default()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), BoxError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Accounts print in checksummed form in both text and JSON output
fn print_accounts(accounts: &[Address], json: bool) -> Result<(), BoxError> {
    if json {
        let accounts: Vec<String> = accounts.iter().map(Address::to_string).collect();
        return print_json(&accounts);
    }
    for account in accounts {
        println!("{account}");
    }
    Ok(())
}

fn timestamp(matches: &ArgMatches, name: &str) -> Result<u64, BoxError> {
    Ok(commands::parse_timestamp(&string(matches, name))?)
}

/// Maps a write subcommand to its contract call
fn write_action(name: &str, matches: &ArgMatches) -> Result<Option<WriteAction>, BoxError> {
    let action = match name {
        "add-admin" => WriteAction::AddAdmin(address(matches)?),
        "register-voter" => WriteAction::RegisterVoter(address(matches)?),
        "create-election" => WriteAction::CreateElection {
            name: string(matches, "name"),
            start_time: timestamp(matches, "start")?,
            end_time: timestamp(matches, "end")?,
        },
        "update-election" => WriteAction::UpdateElection {
            election: number(matches, "election"),
            name: string(matches, "name"),
            start_time: timestamp(matches, "start")?,
            end_time: timestamp(matches, "end")?,
        },
        "delete-election" => WriteAction::DeleteElection(number(matches, "election")),
        "end-election" => WriteAction::EndElection(number(matches, "election")),
        "add-office" => WriteAction::AddOffice {
            election: number(matches, "election"),
            name: string(matches, "name"),
        },
        "add-candidate" => WriteAction::AddCandidate {
            election: number(matches, "election"),
            office: number(matches, "office"),
            name: string(matches, "name"),
        },
        "vote" => WriteAction::Vote {
            election: number(matches, "election"),
            office: number(matches, "office"),
            candidate: number(matches, "candidate"),
        },
        _ => return Ok(None),
    };
    Ok(Some(action))
}

async fn run(matches: ArgMatches) -> Result<(), BoxError> {
    let config_path = matches.get_one::<String>("config").map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref()).await?;

    let Some((name, sub)) = matches.subcommand() else {
        return Ok(());
    };

    if let Some(action) = write_action(name, sub)? {
        let contract = config.chain.writer()?;
        let (ok, status) = commands::run_write(&contract, &action).await;
        println!("{status}");
        if !ok {
            std::process::exit(1);
        }
        return Ok(());
    }

    match name {
        "serve" => server::start_server(&config).await?,
        "watch" => watch(&config, sub).await?,
        "wallets" => list_wallets(&config, sub)?,
        _ => read_command(&config, name, sub).await?,
    }
    Ok(())
}

async fn read_command(config: &AppConfig, name: &str, sub: &ArgMatches) -> Result<(), BoxError> {
    let reader = config.chain.reader()?;
    let json = sub
        .try_get_one::<bool>("json")
        .ok()
        .flatten()
        .copied()
        .unwrap_or(false);
    let now = unix_now();

    match name {
        "elections" => {
            let elections = reader.list_elections().await?;
            if json {
                print_json(&elections)?;
            } else if elections.is_empty() {
                println!("No elections");
            } else {
                for election in &elections {
                    println!("{}", commands::format_election(election, now));
                }
            }
        }
        "dashboard" => {
            let stats = commands::dashboard_stats(&reader, now).await?;
            if json {
                print_json(&stats)?;
            } else {
                println!("Total elections:  {}", stats.total_elections);
                println!("Active elections: {}", stats.active_elections);
                println!("Admins:           {}", stats.admins);
                println!("Voters:           {}", stats.voters);
            }
        }
        "results" => {
            let source: ResultsSource = string(sub, "source").parse()?;
            let election = number(sub, "election");
            let results = commands::election_results(&reader, election, source).await?;
            if json {
                print_json(&results)?;
            } else {
                print!("{}", commands::format_results(&results));
            }
        }
        "offices" => {
            let offices = commands::office_list(&reader, number(sub, "election")).await?;
            if json {
                let offices: Vec<_> = offices
                    .iter()
                    .map(|(index, name)| json!({ "index": index, "name": name }))
                    .collect();
                print_json(&offices)?;
            } else {
                for (index, office) in &offices {
                    println!("{index}: {office}");
                }
            }
        }
        "candidates" => {
            let candidates = reader
                .candidates(number(sub, "election"), number(sub, "office"))
                .await?;
            if json {
                print_json(&candidates)?;
            } else {
                for candidate in &candidates {
                    println!(
                        "{}: {} ({} votes)",
                        candidate.index, candidate.name, candidate.vote_count
                    );
                }
            }
        }
        "roles" => {
            let roles = commands::roles_of(&reader, address(sub)?).await?;
            if json {
                let roles: Vec<_> = roles
                    .iter()
                    .map(|(role, held)| json!({ "role": role.label(), "held": held }))
                    .collect();
                print_json(&roles)?;
            } else {
                for (role, held) in &roles {
                    println!("{:<18} {}", role.label(), if *held { "yes" } else { "no" });
                }
            }
        }
        "admins" => print_accounts(&reader.view_admins().await?, json)?,
        "voters" => print_accounts(&reader.view_voters().await?, json)?,
        other => return Err(format!("Unknown command {other}").into()),
    }
    Ok(())
}

fn list_wallets(config: &AppConfig, sub: &ArgMatches) -> Result<(), BoxError> {
    let store = WalletStore::open(&config.server.database_path)?;
    let wallets = store.list()?;
    if sub.get_flag("json") {
        print_json(&wallets)?;
    } else {
        for wallet in &wallets {
            let created = commands::format_timestamp(wallet.created_at.max(0) as u64);
            println!("{} {created}", wallet.address);
        }
    }
    Ok(())
}

async fn watch(config: &AppConfig, sub: &ArgMatches) -> Result<(), BoxError> {
    let reader: Arc<dyn VotingReader> = Arc::new(config.chain.reader()?);

    let mut query = EventQuery::new(EventKind::all());
    if let Some(election) = sub.get_one::<u64>("election") {
        query = query.election(*election);
    }
    let from_block = if sub.get_flag("from-head") {
        None
    } else {
        Some(sub.get_one::<u64>("from-block").copied().unwrap_or(config.chain.from_block))
    };

    let monitor = ChainMonitor::new(
        reader,
        query,
        from_block,
        Duration::from_millis(config.watch.poll_interval_ms),
    );
    let tracker = ResultsTracker::new(OutputManager::new(&config.watch.outputs));
    let stats = tracker.run(monitor, server::shutdown_signal()).await?;
    info!("📊 {}", serde_json::to_string(&stats)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    run(cli().get_matches()).await
}
