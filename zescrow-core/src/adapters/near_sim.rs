//! Simulated NEAR intent contract
//!
//! Keeps intents in a JSON-backed map and applies the same caller and
//! status guards the on-chain contract enforces.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::state_file::JsonStore;
use crate::domain::result::{Error, Result};
use crate::domain::EscrowIntent;
use crate::ports::IntentRegistry;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryState {
    intents: BTreeMap<String, EscrowIntent>,
}

pub struct SimulatedIntentRegistry {
    owner: String,
    store: JsonStore<RegistryState>,
}

impl SimulatedIntentRegistry {
    pub fn in_memory(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            store: JsonStore::in_memory(),
        }
    }

    pub fn open(path: &Path, owner: impl Into<String>) -> Result<Self> {
        Ok(Self {
            owner: owner.into(),
            store: JsonStore::open(path)?,
        })
    }

    fn with_intent<R>(
        &self,
        intent_id: &str,
        f: impl FnOnce(&mut EscrowIntent) -> Result<R>,
    ) -> Result<R> {
        self.store.update(|state| {
            let intent = state
                .intents
                .get_mut(intent_id)
                .ok_or_else(|| Error::not_found(format!("Intent {}", intent_id)))?;
            f(intent)
        })
    }
}

impl IntentRegistry for SimulatedIntentRegistry {
    fn owner_account(&self) -> String {
        self.owner.clone()
    }

    fn create_intent(&self, intent: EscrowIntent) -> Result<EscrowIntent> {
        if intent.client == intent.freelancer {
            return Err(Error::validation("Client and freelancer must differ"));
        }
        self.store.update(|state| {
            if state.intents.contains_key(&intent.intent_id) {
                return Err(Error::conflict(format!(
                    "Intent {} already exists",
                    intent.intent_id
                )));
            }
            state
                .intents
                .insert(intent.intent_id.clone(), intent.clone());
            Ok(intent)
        })
    }

    fn submit_work(&self, intent_id: &str, caller: &str, proof_link: &str) -> Result<()> {
        self.with_intent(intent_id, |intent| intent.submit_work(caller, proof_link))
    }

    fn approve(&self, intent_id: &str, caller: &str) -> Result<()> {
        self.with_intent(intent_id, |intent| intent.approve(caller))
    }

    fn dispute(&self, intent_id: &str, caller: &str) -> Result<()> {
        self.with_intent(intent_id, |intent| intent.dispute(caller))
    }

    fn cancel(&self, intent_id: &str, caller: &str) -> Result<()> {
        let owner = self.owner.clone();
        self.with_intent(intent_id, |intent| intent.cancel(caller, &owner))
    }

    fn resolve(&self, intent_id: &str, caller: &str, complete: bool) -> Result<()> {
        let owner = self.owner.clone();
        self.with_intent(intent_id, |intent| intent.resolve(caller, &owner, complete))
    }

    fn get_intent(&self, intent_id: &str) -> Result<Option<EscrowIntent>> {
        self.store.read(|state| state.intents.get(intent_id).cloned())
    }

    fn user_intents(&self, account_id: &str) -> Result<Vec<EscrowIntent>> {
        self.store.read(|state| {
            state
                .intents
                .values()
                .filter(|i| i.client == account_id || i.freelancer == account_id)
                .cloned()
                .collect()
        })
    }

    fn total_intents(&self) -> Result<u64> {
        self.store.read(|state| state.intents.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IntentStatus;
    use chrono::Utc;

    const CLIENT: &str = "near-client01.testnet";
    const FREELANCER: &str = "near-freelanc.testnet";

    fn registry_with_intent() -> SimulatedIntentRegistry {
        let registry = SimulatedIntentRegistry::in_memory("zescrow.testnet");
        registry
            .create_intent(EscrowIntent::new("i-1", CLIENT, FREELANCER, 10_000, Utc::now()))
            .unwrap();
        registry
    }

    #[test]
    fn test_duplicate_intent_rejected() {
        let registry = registry_with_intent();
        let err = registry
            .create_intent(EscrowIntent::new("i-1", CLIENT, FREELANCER, 1, Utc::now()))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(registry.total_intents().unwrap(), 1);
    }

    #[test]
    fn test_guard_failure_does_not_mutate() {
        let registry = registry_with_intent();
        assert!(registry.approve("i-1", CLIENT).is_err());
        let intent = registry.get_intent("i-1").unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Created);
    }

    #[test]
    fn test_owner_resolves_dispute() {
        let registry = registry_with_intent();
        registry.submit_work("i-1", FREELANCER, "https://git.example/pr/7").unwrap();
        registry.dispute("i-1", CLIENT).unwrap();
        registry.resolve("i-1", "zescrow.testnet", true).unwrap();
        let intent = registry.get_intent("i-1").unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Completed);
    }

    #[test]
    fn test_user_intents_match_both_sides() {
        let registry = registry_with_intent();
        assert_eq!(registry.user_intents(CLIENT).unwrap().len(), 1);
        assert_eq!(registry.user_intents(FREELANCER).unwrap().len(), 1);
        assert!(registry.user_intents("near-nobody00.testnet").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_intent() {
        let registry = registry_with_intent();
        assert!(matches!(
            registry.approve("missing", CLIENT),
            Err(Error::NotFound(_))
        ));
    }
}
