/*!
Client side of the TrustVote voting contract.

This crate binds the contract's Solidity interface through alloy, sends
legacy transactions signed by a local key, and rebuilds election results
from the contract's event log.

```no_run
use trustvote_chain::{ContractSettings, RpcVotingContract, parse_address, tally};

# async fn run() -> Result<(), trustvote_chain::ChainError> {
let address = parse_address("0x5FbDB2315678afecb367f032d93F642f64180aa3")?;
let contract =
    RpcVotingContract::connect("http://127.0.0.1:8545", ContractSettings::new(address))?;
let results = tally::reconstruct(&contract, 1).await?;
for office in results.offices {
    println!("{}: {} votes", office.name, office.total_votes);
}
# Ok(())
# }
```
*/

pub mod address;
pub mod bindings;
pub mod contract;
pub mod error;
pub mod events;
pub mod tally;
pub mod types;
pub mod units;

pub use address::{Address, AddressError, is_valid_address, parse_address};
pub use alloy::primitives::{TxHash, U256};
pub use alloy::signers::local::PrivateKeySigner;
pub use contract::{ContractSettings, RpcVotingContract, VotingReader, VotingWriter, parse_signer};
pub use error::ChainError;
pub use events::{ContractEvent, EventKind, EventQuery, EventRecord};
pub use tally::{CandidateResult, ElectionResults, ElectionTally, OfficeResult, TallyBook};
pub use types::{Candidate, ElectionSummary, Office, Role, unix_now};
pub use units::{format_ether, parse_ether};
