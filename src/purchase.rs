//! Pay-then-record purchase flow.
//!
//! A purchase is strictly linear: session check, wallet check, payment, receipt,
//! durable record. Nothing is retried. A failure after the payment is mined leaves the
//! user charged without an entitlement; that case is logged with the transaction hash
//! and can be repaired later with [`PurchaseOrchestrator::reconcile`].
//!
//! The ledger only knows which account paid, not which user. Each wallet account is
//! therefore bound to the first user that pays with it, and only that user may pay
//! with it or have its ledger purchases reconciled.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::access::ChapterIdSet;
use crate::errors::{MarketError, MarketResult};
use crate::record_store::RecordStore;
use crate::story::{Chapter, PurchaseRecord, Story, UserSession};
use crate::wallet::{ether_to_wei, to_ledger_id, WalletConnection};

pub struct PurchaseOrchestrator {
    store: Arc<dyn RecordStore>,
    wallet: Arc<RwLock<WalletConnection>>,
}

impl PurchaseOrchestrator {
    pub fn new(store: Arc<dyn RecordStore>, wallet: Arc<RwLock<WalletConnection>>) -> Self {
        Self { store, wallet }
    }

    pub fn wallet(&self) -> &Arc<RwLock<WalletConnection>> {
        &self.wallet
    }

    /// Pays for `chapter` and records the entitlement.
    ///
    /// The caller is expected to have checked access first; this does not look for an
    /// existing record before paying.
    pub async fn purchase(
        &self,
        session: Option<&UserSession>,
        story: &Story,
        chapter: &Chapter,
        price_quote: Decimal,
    ) -> MarketResult<PurchaseRecord> {
        let user = session.ok_or(MarketError::NotAuthenticated)?;
        let (bridge, account) = self.wallet.read().await.ready_handle()?;

        let story_num = to_ledger_id(&story.id)?;
        let chapter_num = to_ledger_id(&chapter.id)?;
        let value_wei = ether_to_wei(price_quote)?;

        let owner = self.store.claim_account(&account, &user.user_id).await?;
        if owner != user.user_id {
            tracing::warn!(
                %account,
                user_id = %user.user_id,
                "wallet account belongs to another user"
            );
            return Err(MarketError::WalletAccountMismatch { account });
        }

        let attempt = Uuid::new_v4();
        let submitted_at = Utc::now();
        tracing::info!(
            %attempt,
            user_id = %user.user_id,
            story_id = %story.id,
            chapter_id = %chapter.id,
            %price_quote,
            "submitting chapter payment"
        );

        let receipt = bridge
            .submit_payment(&account, story_num, chapter_num, value_wei)
            .await
            .map_err(|cause| {
                tracing::warn!(%attempt, error = %cause, "chapter payment failed");
                MarketError::payment_failed(cause)
            })?;

        let record = PurchaseRecord {
            user_id: user.user_id.clone(),
            story_id: story.id.clone(),
            chapter_id: chapter.id.clone(),
            purchased_at: submitted_at,
            blockchain_tx_hash: Some(receipt.transaction_hash.clone()),
        };

        if let Err(err) = self.store.insert_purchase(&record).await {
            tracing::error!(
                %attempt,
                user_id = %record.user_id,
                chapter_id = %record.chapter_id,
                tx_hash = %receipt.transaction_hash,
                error = %err,
                "payment confirmed on-chain but purchase record was not saved"
            );
            return Err(MarketError::record_persist_failed(receipt.transaction_hash, err));
        }

        tracing::info!(
            %attempt,
            tx_hash = %receipt.transaction_hash,
            block = ?receipt.block_number,
            "chapter purchase complete"
        );
        Ok(record)
    }

    /// Records every paid chapter of `story` that the ledger says the wallet account
    /// bought but the store has no record for. Returns the records it created.
    ///
    /// Does nothing unless the wallet account is bound to the session's user.
    pub async fn reconcile(
        &self,
        session: Option<&UserSession>,
        story: &Story,
    ) -> MarketResult<Vec<PurchaseRecord>> {
        let user = session.ok_or(MarketError::NotAuthenticated)?;
        let (bridge, account) = self.wallet.read().await.ready_handle()?;
        let story_num = to_ledger_id(&story.id)?;

        // Ledger purchases prove payment by the account, so they only count for the
        // user the account is bound to.
        let owner = self.store.account_owner(&account).await?;
        if owner.as_deref() != Some(user.user_id.as_str()) {
            tracing::info!(
                %account,
                user_id = %user.user_id,
                "wallet account not bound to user, nothing to reconcile"
            );
            return Ok(Vec::new());
        }

        let recorded: ChapterIdSet = self
            .store
            .list_purchases(&user.user_id, &story.id)
            .await?
            .into_iter()
            .map(|record| record.chapter_id)
            .collect();

        let mut restored = Vec::new();
        for chapter in self.store.list_published_chapters(&story.id).await? {
            if chapter.is_free || recorded.contains(&chapter.id) {
                continue;
            }
            let chapter_num = to_ledger_id(&chapter.id)?;
            let paid = bridge
                .has_purchased(&account, story_num, chapter_num)
                .await
                .map_err(MarketError::reconcile_failed)?;
            if !paid {
                continue;
            }

            let record = PurchaseRecord {
                user_id: user.user_id.clone(),
                story_id: story.id.clone(),
                chapter_id: chapter.id.clone(),
                purchased_at: Utc::now(),
                blockchain_tx_hash: None,
            };
            match self.store.insert_purchase(&record).await {
                Ok(()) => {
                    tracing::warn!(
                        user_id = %record.user_id,
                        chapter_id = %record.chapter_id,
                        "restored unrecorded on-chain purchase"
                    );
                    restored.push(record);
                }
                // Another session recorded it in the meantime.
                Err(MarketError::AlreadyPurchased { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(restored)
    }
}
