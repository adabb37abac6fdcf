//! Escrow deal entity and its lifecycle state machine

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// Deal lifecycle state
///
/// ```text
/// created ──submit──▶ submitted ──approve──▶ approved ──release confirmed──▶ completed
///    │                  │    ▲                   ▲
///  cancel            dispute │ resubmit          │ resolve(freelancer)
///    ▼                  ▼    │                   │
/// cancelled ◀─resolve(client)─ disputed ─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DealStatus {
    Created,
    Submitted,
    Approved,
    Disputed,
    Completed,
    Cancelled,
}

impl DealStatus {
    pub const ALL: [DealStatus; 6] = [
        DealStatus::Created,
        DealStatus::Submitted,
        DealStatus::Approved,
        DealStatus::Disputed,
        DealStatus::Completed,
        DealStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DealStatus::Created => "created",
            DealStatus::Submitted => "submitted",
            DealStatus::Approved => "approved",
            DealStatus::Disputed => "disputed",
            DealStatus::Completed => "completed",
            DealStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DealStatus::Completed | DealStatus::Cancelled)
    }

    /// Whether funds for a deal in this state are still held in escrow
    pub fn holds_funds(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, next: DealStatus) -> bool {
        use DealStatus::*;
        matches!(
            (self, next),
            (Created, Submitted)
                | (Created, Cancelled)
                | (Submitted, Approved)
                | (Submitted, Disputed)
                | (Disputed, Submitted)
                | (Disputed, Approved)
                | (Disputed, Cancelled)
                | (Approved, Completed)
        )
    }

    pub fn ensure_transition(&self, next: DealStatus) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(Error::invalid_transition(self, next))
        }
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DealStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DealStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::validation(format!("Unknown deal status: {}", s)))
    }
}

/// Which side a dispute was settled in favour of
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Client,
    Freelancer,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Client => "client",
            Resolution::Freelancer => "freelancer",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "client" => Ok(Resolution::Client),
            "freelancer" => Ok(Resolution::Freelancer),
            _ => Err(Error::validation(format!(
                "Resolution must be 'client' or 'freelancer', got '{}'",
                s
            ))),
        }
    }
}

/// One side of a deal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub id: String,
    pub near_account_id: String,
}

/// An escrow agreement between a client and a freelancer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deal {
    pub deal_id: String,
    pub intent_id: String,
    pub client: Party,
    pub freelancer: Party,
    pub amount_zec: Decimal,
    pub amount_zatoshi: i64,
    pub deadline: DateTime<Utc>,
    pub description: String,
    pub status: DealStatus,
    pub proof_link: Option<String>,
    pub notes: Option<String>,
    pub dispute_reason: Option<String>,
    pub resolution: Option<Resolution>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deal {
    pub fn is_client(&self, user_id: &str) -> bool {
        self.client.id == user_id
    }

    pub fn is_freelancer(&self, user_id: &str) -> bool {
        self.freelancer.id == user_id
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }
}

/// Field changes applied together with a status transition
#[derive(Debug, Clone, Default)]
pub struct DealUpdate {
    pub proof_link: Option<String>,
    pub notes: Option<String>,
    pub dispute_reason: Option<String>,
    pub resolution: Option<Resolution>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(DealStatus::Created.can_transition_to(DealStatus::Submitted));
        assert!(DealStatus::Submitted.can_transition_to(DealStatus::Approved));
        assert!(DealStatus::Approved.can_transition_to(DealStatus::Completed));
    }

    #[test]
    fn test_dispute_paths() {
        assert!(DealStatus::Submitted.can_transition_to(DealStatus::Disputed));
        assert!(DealStatus::Disputed.can_transition_to(DealStatus::Submitted));
        assert!(DealStatus::Disputed.can_transition_to(DealStatus::Approved));
        assert!(DealStatus::Disputed.can_transition_to(DealStatus::Cancelled));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [DealStatus::Completed, DealStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in DealStatus::ALL {
                assert!(!terminal.can_transition_to(next), "{} -> {}", terminal, next);
            }
        }
    }

    #[test]
    fn test_skipping_approval_is_rejected() {
        let err = DealStatus::Submitted
            .ensure_transition(DealStatus::Completed)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert!(DealStatus::Created.ensure_transition(DealStatus::Approved).is_err());
        assert!(DealStatus::Approved.ensure_transition(DealStatus::Cancelled).is_err());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("disputed".parse::<DealStatus>().unwrap(), DealStatus::Disputed);
        assert!("paid".parse::<DealStatus>().is_err());
        assert_eq!("Freelancer".parse::<Resolution>().unwrap(), Resolution::Freelancer);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&DealStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }
}
