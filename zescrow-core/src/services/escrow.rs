//! Escrow service - deal lifecycle orchestration
//!
//! Every state change follows the same shape:
//!
//! 1. load the deal and check the caller and the transition guard
//! 2. claim the transition with a compare-and-set on the current status
//! 3. run chain side effects (intent contract, vault, Zcash transfer)
//! 4. record resulting transactions together with a status check
//!
//! If step 3 fails the claim is rolled back and the caller may retry.
//! Effects that already landed are repeat-safe: an intent already in its
//! target state is left alone and the vault hands back the recorded
//! authorization. Once step 3 succeeds the funds have moved, so a failure
//! in step 4 keeps the claim and logs the transaction ids for recovery.
//! Losing the race in step 2 surfaces as `Error::Conflict`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapters::duckdb::DuckDbRepository;
use crate::config::EscrowSettings;
use crate::domain::amount::{zatoshi_to_zec, zec_to_zatoshi};
use crate::domain::identity::{near_account_id, validate_user_id};
use crate::domain::result::{Error, Result};
use crate::domain::{
    Blockchain, ChainTransaction, Deal, DealStatus, DealUpdate, EscrowIntent, IntentStatus, Party,
    Pool, Resolution, TxType, Wallet, WalletBalance, WalletKeys,
};
use crate::ports::{IntentRegistry, PayoutAuthorization, VaultContract, ZcashChain};

const MAX_DESCRIPTION_LEN: usize = 2_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeal {
    pub client_id: String,
    pub freelancer_id: String,
    pub amount_zec: Decimal,
    pub deadline_days: u32,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitWork {
    pub proof_link: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveDispute {
    pub resolution: Resolution,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Wallet plus its live balance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletView {
    #[serde(flatten)]
    pub wallet: Wallet,
    pub balance: WalletBalance,
    pub balance_zec: Decimal,
}

pub struct EscrowService {
    repository: Arc<DuckDbRepository>,
    zcash: Arc<dyn ZcashChain>,
    intents: Arc<dyn IntentRegistry>,
    vault: Arc<dyn VaultContract>,
    settings: EscrowSettings,
}

impl EscrowService {
    pub fn new(
        repository: Arc<DuckDbRepository>,
        zcash: Arc<dyn ZcashChain>,
        intents: Arc<dyn IntentRegistry>,
        vault: Arc<dyn VaultContract>,
        settings: EscrowSettings,
    ) -> Self {
        Self {
            repository,
            zcash,
            intents,
            vault,
            settings,
        }
    }

    // === Wallets ===

    pub fn create_user_wallet(&self, user_id: &str, label: Option<&str>) -> Result<Wallet> {
        validate_user_id(user_id)?;
        let keys = self.zcash.create_wallet(label)?;
        self.store_wallet(user_id, label, keys)
    }

    pub fn import_user_wallet(
        &self,
        user_id: &str,
        seed_phrase: &str,
        label: Option<&str>,
    ) -> Result<Wallet> {
        validate_user_id(user_id)?;
        let keys = self.zcash.import_wallet(seed_phrase, label)?;
        self.store_wallet(user_id, label, keys)
    }

    fn store_wallet(
        &self,
        user_id: &str,
        label: Option<&str>,
        keys: WalletKeys,
    ) -> Result<Wallet> {
        if keys.wallet_id == self.vault.vault_wallet().wallet_id {
            return Err(Error::validation("The escrow vault wallet cannot be assigned to a user"));
        }
        let wallet = Wallet {
            wallet_id: keys.wallet_id,
            user_id: user_id.to_string(),
            label: label.map(str::to_string),
            transparent_address: keys.transparent_address,
            shielded_address: keys.shielded_address,
            created_at: Utc::now(),
        };
        self.repository.upsert_wallet(&wallet)?;
        tracing::info!(user_id, wallet_id = %wallet.wallet_id, "wallet stored");
        Ok(wallet)
    }

    fn require_wallet(&self, user_id: &str) -> Result<Wallet> {
        self.repository
            .get_wallet(user_id)?
            .ok_or_else(|| Error::not_found(format!("No wallet for user {}", user_id)))
    }

    pub fn get_wallet(&self, user_id: &str) -> Result<WalletView> {
        let wallet = self.require_wallet(user_id)?;
        let balance = self.zcash.balance(&wallet.wallet_id)?;
        Ok(WalletView {
            wallet,
            balance,
            balance_zec: balance.total_zec(),
        })
    }

    /// Whether the user can cover `amount_zatoshi` plus the network fee
    pub fn check_sufficient_balance(&self, user_id: &str, amount_zatoshi: i64) -> Result<bool> {
        let wallet = self.require_wallet(user_id)?;
        let balance = self.zcash.balance(&wallet.wallet_id)?;
        Ok(balance.total() >= amount_zatoshi + self.zcash.fee_zatoshi())
    }

    /// Development faucet
    pub fn fund_wallet(&self, user_id: &str, amount_zec: Decimal, pool: Pool) -> Result<WalletView> {
        if !self.settings.allow_faucet {
            return Err(Error::forbidden("The faucet is disabled"));
        }
        let wallet = self.require_wallet(user_id)?;
        self.zcash
            .faucet(&wallet.wallet_id, zec_to_zatoshi(amount_zec)?, pool)?;
        self.get_wallet(user_id)
    }

    // === Deal creation ===

    pub fn create_deal(&self, request: CreateDeal) -> Result<Deal> {
        validate_user_id(&request.client_id)?;
        validate_user_id(&request.freelancer_id)?;
        if request.client_id == request.freelancer_id {
            return Err(Error::validation("Client and freelancer must be different users"));
        }
        let description = request.description.trim();
        if description.is_empty() {
            return Err(Error::validation("Description is required"));
        }
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(Error::validation(format!(
                "Description is limited to {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
        if request.deadline_days == 0 || request.deadline_days > self.settings.max_deadline_days {
            return Err(Error::validation(format!(
                "Deadline must be between 1 and {} days",
                self.settings.max_deadline_days
            )));
        }
        let amount_zatoshi = zec_to_zatoshi(request.amount_zec)?;
        let fee = self.zcash.fee_zatoshi();
        if amount_zatoshi <= fee {
            return Err(Error::validation(format!(
                "Amount must exceed the {} zatoshi payout fee",
                fee
            )));
        }

        let client_wallet = self.require_wallet(&request.client_id)?;
        self.require_wallet(&request.freelancer_id)?;

        let available = self.zcash.balance(&client_wallet.wallet_id)?.total();
        let needed = amount_zatoshi + fee;
        if available < needed {
            return Err(Error::InsufficientBalance { needed, available });
        }

        let network = self.zcash.network();
        let client = Party {
            id: request.client_id.clone(),
            near_account_id: near_account_id(&request.client_id, network)?,
        };
        let freelancer = Party {
            id: request.freelancer_id.clone(),
            near_account_id: near_account_id(&request.freelancer_id, network)?,
        };

        let key = Uuid::new_v4().simple().to_string();
        let deal_id = format!("deal-{}", key);
        let now = Utc::now();
        let deadline = now + Duration::days(request.deadline_days as i64);

        let intent = self.intents.create_intent(EscrowIntent::new(
            format!("intent-{}", key),
            &client.near_account_id,
            &freelancer.near_account_id,
            amount_zatoshi,
            deadline,
        ))?;

        let vault = self.vault.vault_wallet();
        let sent = match self.zcash.send(
            &client_wallet.wallet_id,
            &vault.shielded_address,
            amount_zatoshi,
            Some(&deal_id),
        ) {
            Ok(sent) => sent,
            Err(e) => {
                if let Err(cancel_err) = self
                    .intents
                    .cancel(&intent.intent_id, &self.intents.owner_account())
                {
                    tracing::error!(intent_id = %intent.intent_id, "failed to cancel orphaned intent: {}", cancel_err);
                }
                return Err(e);
            }
        };

        let deal = Deal {
            deal_id: deal_id.clone(),
            intent_id: intent.intent_id,
            client,
            freelancer,
            amount_zec: zatoshi_to_zec(amount_zatoshi),
            amount_zatoshi,
            deadline,
            description: description.to_string(),
            status: DealStatus::Created,
            proof_link: None,
            notes: None,
            dispute_reason: None,
            resolution: None,
            created_at: now,
            updated_at: now,
        };
        let escrow_tx = ChainTransaction::pending(
            sent.tx_id,
            &deal_id,
            Blockchain::Zcash,
            TxType::Escrow,
            sent.from_address,
            vault.shielded_address,
            amount_zatoshi,
        );

        if let Err(e) = self.repository.insert_deal(&deal, &escrow_tx) {
            // Funds already moved to the vault; the tx id is the recovery handle
            tracing::error!(deal_id, tx_id = %escrow_tx.tx_id, "deal funded but not stored: {:#}", e);
            return Err(e.into());
        }

        tracing::info!(deal_id, amount_zatoshi, "deal created");
        Ok(deal)
    }

    // === Lifecycle ===

    pub fn submit_work(&self, deal_id: &str, freelancer_id: &str, work: SubmitWork) -> Result<Deal> {
        let deal = self.require_deal(deal_id)?;
        if !deal.is_freelancer(freelancer_id) {
            return Err(Error::forbidden("Only the freelancer can submit work"));
        }
        deal.status.ensure_transition(DealStatus::Submitted)?;
        let proof_link = validate_proof_link(&work.proof_link)?;

        let update = DealUpdate {
            proof_link: Some(proof_link.clone()),
            notes: clean_optional(work.notes),
            ..Default::default()
        };
        self.transition(&deal, DealStatus::Submitted, &update, || {
            self.intents
                .submit_work(&deal.intent_id, &deal.freelancer.near_account_id, &proof_link)?;
            Ok(Vec::new())
        })
    }

    /// Client accepts the work; the vault pays the freelancer
    pub fn approve_work(&self, deal_id: &str, client_id: &str) -> Result<Deal> {
        let deal = self.require_deal(deal_id)?;
        if !deal.is_client(client_id) {
            return Err(Error::forbidden("Only the client can approve work"));
        }
        deal.status.ensure_transition(DealStatus::Approved)?;
        if deal.status != DealStatus::Submitted {
            return Err(Error::invalid_transition(deal.status, DealStatus::Approved));
        }

        self.transition(&deal, DealStatus::Approved, &DealUpdate::default(), || {
            self.settle_intent(&deal.intent_id, IntentStatus::Completed, || {
                self.intents
                    .approve(&deal.intent_id, &deal.client.near_account_id)
            })?;
            self.pay_out(&deal, TxType::Release)
        })
    }

    pub fn dispute_work(&self, deal_id: &str, client_id: &str, reason: &str) -> Result<Deal> {
        let deal = self.require_deal(deal_id)?;
        if !deal.is_client(client_id) {
            return Err(Error::forbidden("Only the client can dispute work"));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::validation("A dispute reason is required"));
        }
        deal.status.ensure_transition(DealStatus::Disputed)?;

        let update = DealUpdate {
            dispute_reason: Some(reason.to_string()),
            ..Default::default()
        };
        self.transition(&deal, DealStatus::Disputed, &update, || {
            self.intents
                .dispute(&deal.intent_id, &deal.client.near_account_id)?;
            Ok(Vec::new())
        })
    }

    /// Admin settles a dispute: release to the freelancer or refund the client
    pub fn resolve_dispute(
        &self,
        deal_id: &str,
        admin_id: &str,
        resolution: ResolveDispute,
    ) -> Result<Deal> {
        if !self.settings.is_admin(admin_id) {
            return Err(Error::forbidden("Only an administrator can resolve disputes"));
        }
        let deal = self.require_deal(deal_id)?;

        let (target, intent_target, payout) = match resolution.resolution {
            Resolution::Freelancer => (DealStatus::Approved, IntentStatus::Completed, TxType::Release),
            Resolution::Client => (DealStatus::Cancelled, IntentStatus::Cancelled, TxType::Refund),
        };
        // Only a disputed deal can be resolved, whichever way it goes
        if deal.status != DealStatus::Disputed {
            return Err(Error::invalid_transition(deal.status, target));
        }

        let update = DealUpdate {
            resolution: Some(resolution.resolution),
            notes: resolution_notes(&deal, resolution.resolution, resolution.notes),
            ..Default::default()
        };
        self.transition(&deal, target, &update, || {
            self.settle_intent(&deal.intent_id, intent_target, || {
                self.intents.resolve(
                    &deal.intent_id,
                    &self.intents.owner_account(),
                    resolution.resolution == Resolution::Freelancer,
                )
            })?;
            self.pay_out(&deal, payout)
        })
    }

    /// Client withdraws before any work was submitted; funds are refunded
    pub fn cancel_deal(&self, deal_id: &str, client_id: &str) -> Result<Deal> {
        let deal = self.require_deal(deal_id)?;
        if !deal.is_client(client_id) {
            return Err(Error::forbidden("Only the client can cancel a deal"));
        }
        if deal.status != DealStatus::Created {
            return Err(Error::invalid_transition(deal.status, DealStatus::Cancelled));
        }

        self.transition(&deal, DealStatus::Cancelled, &DealUpdate::default(), || {
            self.settle_intent(&deal.intent_id, IntentStatus::Cancelled, || {
                self.intents
                    .cancel(&deal.intent_id, &deal.client.near_account_id)
            })?;
            self.pay_out(&deal, TxType::Refund)
        })
    }

    /// Run an intent contract call unless an earlier attempt, whose payout
    /// then failed, already left the intent in `target`.
    fn settle_intent(
        &self,
        intent_id: &str,
        target: IntentStatus,
        call: impl FnOnce() -> Result<()>,
    ) -> Result<()> {
        if let Some(intent) = self.intents.get_intent(intent_id)? {
            if intent.status == target {
                tracing::info!(intent_id, status = %target, "intent already settled, retrying payout");
                return Ok(());
            }
        }
        call()
    }

    /// Claim `deal -> to`, run `effects`, then record what they produced.
    fn transition(
        &self,
        deal: &Deal,
        to: DealStatus,
        update: &DealUpdate,
        effects: impl FnOnce() -> Result<Vec<ChainTransaction>>,
    ) -> Result<Deal> {
        if !self
            .repository
            .transition_deal(&deal.deal_id, deal.status, to, update)?
        {
            return Err(Error::conflict(format!(
                "Deal {} changed while moving from '{}' to '{}'",
                deal.deal_id, deal.status, to
            )));
        }

        let records = match effects() {
            Ok(records) => records,
            Err(e) => {
                match self.repository.restore_deal(deal, to) {
                    Ok(true) => {}
                    Ok(false) => tracing::error!(deal_id = %deal.deal_id, "claim moved on before rollback"),
                    Err(restore_err) => tracing::error!(deal_id = %deal.deal_id, "rollback failed: {:#}", restore_err),
                }
                return Err(e);
            }
        };

        if !records.is_empty() {
            // Funds already moved, so the tx ids are the recovery handle
            match self
                .repository
                .record_transition(&deal.deal_id, to, &records)
            {
                Ok(true) => {}
                Ok(false) => {
                    let tx_ids = tx_id_list(&records);
                    tracing::error!(deal_id = %deal.deal_id, status = %to, tx_ids = %tx_ids, "deal moved on before its transactions were recorded");
                    return Err(Error::conflict(format!(
                        "Deal {} left '{}' before transactions {} were recorded",
                        deal.deal_id, to, tx_ids
                    )));
                }
                Err(e) => {
                    tracing::error!(deal_id = %deal.deal_id, status = %to, tx_ids = %tx_id_list(&records), "transition effects not recorded: {:#}", e);
                    return Err(e.into());
                }
            }
        }

        tracing::info!(deal_id = %deal.deal_id, from = %deal.status, to = %to, "deal transitioned");
        self.require_deal(&deal.deal_id)
    }

    /// Authorize on the vault contract and move funds out of the vault.
    /// The network fee is taken from the escrowed amount.
    fn pay_out(&self, deal: &Deal, kind: TxType) -> Result<Vec<ChainTransaction>> {
        let recipient_id = match kind {
            TxType::Release => &deal.freelancer.id,
            TxType::Refund => &deal.client.id,
            TxType::Escrow => return Err(Error::validation("Escrow is not a payout")),
        };
        let recipient = self.require_wallet(recipient_id)?;
        let net_amount = deal.amount_zatoshi - self.zcash.fee_zatoshi();

        let evm_hash = self.vault.authorize_payout(&PayoutAuthorization {
            deal_id: deal.deal_id.clone(),
            intent_id: deal.intent_id.clone(),
            kind,
            recipient: recipient.shielded_address.clone(),
            amount_zatoshi: net_amount,
        })?;

        let vault = self.vault.vault_wallet();
        let sent = self
            .zcash
            .send(
                &vault.wallet_id,
                &recipient.shielded_address,
                net_amount,
                Some(&deal.deal_id),
            )
            .map_err(|e| match e {
                Error::InsufficientBalance { needed, available } => Error::chain(format!(
                    "Escrow vault cannot cover the payout: needs {} zatoshi, holds {}",
                    needed, available
                )),
                other => other,
            })?;

        Ok(vec![
            ChainTransaction::pending(
                evm_hash,
                &deal.deal_id,
                Blockchain::Ethereum,
                kind,
                self.vault.contract_address(),
                &recipient.shielded_address,
                net_amount,
            )
            .confirmed(),
            ChainTransaction::pending(
                sent.tx_id,
                &deal.deal_id,
                Blockchain::Zcash,
                kind,
                sent.from_address,
                recipient.shielded_address,
                net_amount,
            ),
        ])
    }

    // === Queries ===

    fn require_deal(&self, deal_id: &str) -> Result<Deal> {
        self.repository
            .get_deal(deal_id)?
            .ok_or_else(|| Error::not_found(format!("Deal {}", deal_id)))
    }

    pub fn get_deal(&self, deal_id: &str) -> Result<Deal> {
        self.require_deal(deal_id)
    }

    pub fn get_user_deals(&self, user_id: &str) -> Result<Vec<Deal>> {
        Ok(self.repository.get_user_deals(user_id)?)
    }

    pub fn list_deals(&self, status: Option<DealStatus>, limit: usize) -> Result<Vec<Deal>> {
        Ok(self.repository.list_deals(status, limit)?)
    }

    pub fn get_deal_transactions(&self, deal_id: &str) -> Result<Vec<ChainTransaction>> {
        self.require_deal(deal_id)?;
        Ok(self.repository.get_deal_transactions(deal_id)?)
    }

    pub fn get_intent(&self, intent_id: &str) -> Result<EscrowIntent> {
        self.intents
            .get_intent(intent_id)?
            .ok_or_else(|| Error::not_found(format!("Intent {}", intent_id)))
    }

    /// Intents where the user's NEAR account is either party
    pub fn get_user_intents(&self, user_id: &str) -> Result<Vec<EscrowIntent>> {
        validate_user_id(user_id)?;
        let account_id = near_account_id(user_id, self.zcash.network())?;
        self.intents.user_intents(&account_id)
    }
}

fn tx_id_list(records: &[ChainTransaction]) -> String {
    records
        .iter()
        .map(|r| r.tx_id.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Existing notes followed by the resolution summary, when the admin left notes
fn resolution_notes(
    deal: &Deal,
    resolution: Resolution,
    admin_notes: Option<String>,
) -> Option<String> {
    let admin_notes = clean_optional(admin_notes)?;
    let summary = format!(
        "Dispute resolved in favor of {}. Admin notes: {}",
        resolution, admin_notes
    );
    Some(match &deal.notes {
        Some(existing) => format!("{}\n\n{}", existing, summary),
        None => summary,
    })
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Proof links must be absolute http(s) URLs
fn validate_proof_link(link: &str) -> Result<String> {
    let parsed = url::Url::parse(link.trim())
        .map_err(|e| Error::validation(format!("Invalid proof link: {}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::validation("Proof link must use http or https"));
    }
    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proof_link_validation() {
        assert_eq!(
            validate_proof_link(" https://github.com/acme/site/pull/4 ").unwrap(),
            "https://github.com/acme/site/pull/4"
        );
        assert!(validate_proof_link("ftp://files.example/work.zip").is_err());
        assert!(validate_proof_link("not a url").is_err());
    }

    #[test]
    fn test_clean_optional() {
        assert_eq!(clean_optional(Some("  ".into())), None);
        assert_eq!(clean_optional(Some(" done ".into())), Some("done".to_string()));
        assert_eq!(clean_optional(None), None);
    }
}
