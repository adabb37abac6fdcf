//! NEAR-side escrow intent record and the contract's guard rules

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Created,
    Submitted,
    Disputed,
    Completed,
    Cancelled,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Created => "created",
            IntentStatus::Submitted => "submitted",
            IntentStatus::Disputed => "disputed",
            IntentStatus::Completed => "completed",
            IntentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowIntent {
    pub intent_id: String,
    pub client: String,
    pub freelancer: String,
    pub amount_zatoshi: i64,
    pub deadline: DateTime<Utc>,
    pub status: IntentStatus,
    pub proof_link: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EscrowIntent {
    pub fn new(
        intent_id: impl Into<String>,
        client: impl Into<String>,
        freelancer: impl Into<String>,
        amount_zatoshi: i64,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            intent_id: intent_id.into(),
            client: client.into(),
            freelancer: freelancer.into(),
            amount_zatoshi,
            deadline,
            status: IntentStatus::Created,
            proof_link: None,
            created_at: Utc::now(),
        }
    }

    fn require_status(&self, allowed: &[IntentStatus], next: IntentStatus) -> Result<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(Error::invalid_transition(self.status, next))
        }
    }

    fn require_caller(&self, caller: &str, expected: &str, role: &str) -> Result<()> {
        if caller == expected {
            Ok(())
        } else {
            Err(Error::forbidden(format!(
                "Only the {} can do this on intent {}",
                role, self.intent_id
            )))
        }
    }

    pub fn submit_work(&mut self, caller: &str, proof_link: &str) -> Result<()> {
        self.require_caller(caller, &self.freelancer, "freelancer")?;
        self.require_status(
            &[IntentStatus::Created, IntentStatus::Disputed],
            IntentStatus::Submitted,
        )?;
        self.status = IntentStatus::Submitted;
        self.proof_link = Some(proof_link.to_string());
        Ok(())
    }

    pub fn approve(&mut self, caller: &str) -> Result<()> {
        self.require_caller(caller, &self.client, "client")?;
        self.require_status(&[IntentStatus::Submitted], IntentStatus::Completed)?;
        self.status = IntentStatus::Completed;
        Ok(())
    }

    pub fn dispute(&mut self, caller: &str) -> Result<()> {
        self.require_caller(caller, &self.client, "client")?;
        self.require_status(&[IntentStatus::Submitted], IntentStatus::Disputed)?;
        self.status = IntentStatus::Disputed;
        Ok(())
    }

    /// Client or contract owner may cancel before work lands or while disputed
    pub fn cancel(&mut self, caller: &str, owner: &str) -> Result<()> {
        if caller != self.client && caller != owner {
            return Err(Error::forbidden(format!(
                "Only the client or owner can cancel intent {}",
                self.intent_id
            )));
        }
        self.require_status(
            &[IntentStatus::Created, IntentStatus::Disputed],
            IntentStatus::Cancelled,
        )?;
        self.status = IntentStatus::Cancelled;
        Ok(())
    }

    pub fn resolve(&mut self, caller: &str, owner: &str, complete: bool) -> Result<()> {
        self.require_caller(caller, owner, "contract owner")?;
        let next = if complete {
            IntentStatus::Completed
        } else {
            IntentStatus::Cancelled
        };
        self.require_status(&[IntentStatus::Disputed], next)?;
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent() -> EscrowIntent {
        EscrowIntent::new("intent-1", "near-client01.testnet", "near-freelanc.testnet", 5_000, Utc::now())
    }

    #[test]
    fn test_submit_then_approve() {
        let mut i = intent();
        i.submit_work("near-freelanc.testnet", "https://example.com/pr/1").unwrap();
        assert_eq!(i.status, IntentStatus::Submitted);
        i.approve("near-client01.testnet").unwrap();
        assert_eq!(i.status, IntentStatus::Completed);
    }

    #[test]
    fn test_client_cannot_submit_work() {
        let mut i = intent();
        let err = i.submit_work("near-client01.testnet", "https://x.dev").unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert_eq!(i.status, IntentStatus::Created);
    }

    #[test]
    fn test_resolve_is_owner_only_and_needs_dispute() {
        let mut i = intent();
        assert!(i.resolve("owner.testnet", "owner.testnet", true).is_err());

        i.submit_work("near-freelanc.testnet", "https://x.dev").unwrap();
        i.dispute("near-client01.testnet").unwrap();
        assert!(matches!(
            i.resolve("near-client01.testnet", "owner.testnet", false),
            Err(Error::Forbidden(_))
        ));
        i.resolve("owner.testnet", "owner.testnet", false).unwrap();
        assert_eq!(i.status, IntentStatus::Cancelled);
    }

    #[test]
    fn test_cancel_after_submission_is_rejected() {
        let mut i = intent();
        i.submit_work("near-freelanc.testnet", "https://x.dev").unwrap();
        assert!(matches!(
            i.cancel("near-client01.testnet", "owner.testnet"),
            Err(Error::InvalidTransition { .. })
        ));
    }
}
