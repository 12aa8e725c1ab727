/*!
Local mirrors of the records the voting contract owns
*/

use alloy::primitives::{B256, keccak256};
use serde::{Deserialize, Serialize};

/// An election as reported by `getElectionDetails`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSummary {
    pub id: u64,
    pub name: String,
    pub active: bool,
    pub start_time: u64,
    pub end_time: u64,
    pub office_count: u64,
}

impl ElectionSummary {
    /// Accepting votes: flagged active and not past its end time
    pub fn is_open(&self, now: u64) -> bool {
        self.active && now <= self.end_time
    }

    pub fn is_open_now(&self) -> bool {
        self.is_open(unix_now())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Office {
    pub index: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub index: u64,
    pub name: String,
    pub vote_count: u64,
}

/// Access control roles checked through `hasRole`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    DefaultAdmin,
    Admin,
    Voter,
}

impl Role {
    pub fn id(&self) -> B256 {
        match self {
            Role::DefaultAdmin => B256::ZERO,
            Role::Admin => keccak256(b"ADMIN_ROLE"),
            Role::Voter => keccak256(b"VOTER_ROLE"),
        }
    }

    pub fn all() -> [Role; 3] {
        [Role::DefaultAdmin, Role::Admin, Role::Voter]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::DefaultAdmin => "DEFAULT_ADMIN_ROLE",
            Role::Admin => "ADMIN_ROLE",
            Role::Voter => "VOTER_ROLE",
        }
    }
}

pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn election(active: bool, end_time: u64) -> ElectionSummary {
        ElectionSummary {
            id: 1,
            name: "Student Council".into(),
            active,
            start_time: 100,
            end_time,
            office_count: 2,
        }
    }

    #[test]
    fn open_until_end_time_inclusive() {
        assert!(election(true, 200).is_open(200));
        assert!(!election(true, 200).is_open(201));
        assert!(!election(false, 200).is_open(150));
    }

    #[test]
    fn role_ids_are_hashed_names() {
        assert_eq!(Role::DefaultAdmin.id(), B256::ZERO);
        assert_eq!(Role::Admin.id(), keccak256("ADMIN_ROLE"));
        assert_ne!(Role::Admin.id(), Role::Voter.id());
    }
}
