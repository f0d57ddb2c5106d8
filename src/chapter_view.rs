//! Per-page chapter state and the user actions on it.
//!
//! A controller belongs to one page view of one story. Its purchased set is a
//! read-through cache of the record store: filled on refresh, appended to after a
//! successful purchase, and never shared with other controllers.

use serde::Serialize;
use std::sync::{Arc, Mutex};

use crate::access::{can_access, ChapterIdSet};
use crate::errors::{MarketError, MarketResult, SafeLock};
use crate::purchase::PurchaseOrchestrator;
use crate::record_store::RecordStore;
use crate::story::{Chapter, PurchaseRecord, Story, UserSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Error,
}

/// Non-blocking message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub category: String,
    pub message: String,
}

impl Notification {
    fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            category: "PurchaseComplete".to_string(),
            message: message.into(),
        }
    }

    fn failure(err: &MarketError) -> Self {
        Self {
            level: NotificationLevel::Error,
            category: err.category().to_string(),
            message: err.to_string(),
        }
    }
}

/// What `request_purchase` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Purchased(PurchaseRecord),
    /// The chapter is free or already bought; nothing was submitted.
    AlreadyUnlocked,
    /// A purchase for this chapter is still outstanding.
    InFlight,
}

/// One chapter as the page shows it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterView {
    pub id: String,
    pub chapter_number: u32,
    pub title: String,
    pub is_free: bool,
    pub price: rust_decimal::Decimal,
    pub unlocked: bool,
    pub expanded: bool,
    pub purchasing: bool,
    /// Present only for chapters that are both expanded and unlocked.
    pub content: Option<String>,
}

#[derive(Default)]
struct ViewState {
    story: Option<Story>,
    chapters: Vec<Chapter>,
    purchased: ChapterIdSet,
    expanded: ChapterIdSet,
    purchasing: ChapterIdSet,
    notifications: Vec<Notification>,
}

pub struct ChapterViewController {
    story_id: String,
    session: Option<UserSession>,
    store: Arc<dyn RecordStore>,
    orchestrator: Arc<PurchaseOrchestrator>,
    reconcile_on_load: bool,
    state: Mutex<ViewState>,
}

impl ChapterViewController {
    pub fn new(
        story_id: impl Into<String>,
        session: Option<UserSession>,
        store: Arc<dyn RecordStore>,
        orchestrator: Arc<PurchaseOrchestrator>,
    ) -> Self {
        Self {
            story_id: story_id.into(),
            session,
            store,
            orchestrator,
            reconcile_on_load: false,
            state: Mutex::new(ViewState::default()),
        }
    }

    pub fn with_reconcile_on_load(mut self, enabled: bool) -> Self {
        self.reconcile_on_load = enabled;
        self
    }

    pub fn story_id(&self) -> &str {
        &self.story_id
    }

    /// Reloads the story and its published chapters. State is untouched on failure.
    pub async fn refresh_chapters(&self) -> MarketResult<()> {
        let loaded = self.load_chapters().await;
        let mut state = self.state.safe_lock()?;
        match loaded {
            Ok((story, chapters)) => {
                state.story = Some(story);
                state.chapters = chapters;
                Ok(())
            }
            Err(err) => {
                state.notifications.push(Notification::failure(&err));
                Err(err)
            }
        }
    }

    async fn load_chapters(&self) -> MarketResult<(Story, Vec<Chapter>)> {
        let story = self
            .store
            .get_story(&self.story_id)
            .await?
            .ok_or_else(|| MarketError::story_not_found(&self.story_id))?;
        let chapters = self.store.list_published_chapters(&self.story_id).await?;
        Ok((story, chapters))
    }

    /// Reloads the purchased set. Anonymous sessions always get an empty set.
    pub async fn refresh_purchases(&self) -> MarketResult<()> {
        let Some(session) = &self.session else {
            self.state.safe_lock()?.purchased = ChapterIdSet::new();
            return Ok(());
        };

        if self.reconcile_on_load {
            self.try_reconcile(session).await?;
        }

        match self
            .store
            .list_purchases(&session.user_id, &self.story_id)
            .await
        {
            Ok(records) => {
                self.state.safe_lock()?.purchased =
                    records.into_iter().map(|r| r.chapter_id).collect();
                Ok(())
            }
            Err(err) => {
                self.state
                    .safe_lock()?
                    .notifications
                    .push(Notification::failure(&err));
                Err(err)
            }
        }
    }

    /// Reconciliation problems are reported but never block loading purchases.
    async fn try_reconcile(&self, session: &UserSession) -> MarketResult<()> {
        if !self.orchestrator.wallet().read().await.is_ready() {
            return Ok(());
        }
        let story = self.state.safe_lock()?.story.clone();
        let story = match story {
            Some(story) => story,
            None => match self.store.get_story(&self.story_id).await {
                Ok(Some(story)) => story,
                _ => return Ok(()),
            },
        };

        if let Err(err) = self.orchestrator.reconcile(Some(session), &story).await {
            tracing::warn!(story_id = %self.story_id, error = %err, "reconciliation failed");
            self.state
                .safe_lock()?
                .notifications
                .push(Notification::failure(&err));
        }
        Ok(())
    }

    /// Buys a chapter unless it is already unlocked or already being bought.
    pub async fn request_purchase(&self, chapter_id: &str) -> MarketResult<PurchaseOutcome> {
        let (story, chapter) = {
            let mut state = self.state.safe_lock()?;
            let found = state.chapters.iter().find(|c| c.id == chapter_id).cloned();
            let chapter = match found {
                Some(chapter) => chapter,
                None => {
                    let err = MarketError::chapter_not_found(chapter_id);
                    state.notifications.push(Notification::failure(&err));
                    return Err(err);
                }
            };
            if can_access(&chapter, &state.purchased) {
                return Ok(PurchaseOutcome::AlreadyUnlocked);
            }
            if !state.purchasing.insert(chapter_id) {
                return Ok(PurchaseOutcome::InFlight);
            }
            let story = state
                .story
                .clone()
                .ok_or_else(|| MarketError::story_not_found(&self.story_id));
            (story, chapter)
        };

        let result = match story {
            Ok(story) => {
                self.orchestrator
                    .purchase(self.session.as_ref(), &story, &chapter, chapter.price)
                    .await
            }
            Err(err) => Err(err),
        };

        let mut state = self.state.safe_lock()?;
        state.purchasing.remove(chapter_id);
        match result {
            Ok(record) => {
                state.purchased.insert(record.chapter_id.clone());
                state.notifications.push(Notification::success(format!(
                    "Chapter {} unlocked",
                    chapter.chapter_number
                )));
                Ok(PurchaseOutcome::Purchased(record))
            }
            Err(err) => {
                state.notifications.push(Notification::failure(&err));
                Err(err)
            }
        }
    }

    /// Flips whether a chapter is expanded. Returns the new membership.
    pub fn toggle_expanded(&self, chapter_id: &str) -> MarketResult<bool> {
        Ok(self.state.safe_lock()?.expanded.toggle(chapter_id))
    }

    pub fn render(&self) -> MarketResult<Vec<ChapterView>> {
        let state = self.state.safe_lock()?;
        Ok(state
            .chapters
            .iter()
            .map(|chapter| {
                let unlocked = can_access(chapter, &state.purchased);
                let expanded = state.expanded.contains(&chapter.id);
                ChapterView {
                    id: chapter.id.clone(),
                    chapter_number: chapter.chapter_number,
                    title: chapter.title.clone(),
                    is_free: chapter.is_free,
                    price: chapter.price,
                    unlocked,
                    expanded,
                    purchasing: state.purchasing.contains(&chapter.id),
                    content: (unlocked && expanded).then(|| chapter.content.clone()),
                }
            })
            .collect())
    }

    pub fn story(&self) -> MarketResult<Option<Story>> {
        Ok(self.state.safe_lock()?.story.clone())
    }

    pub fn chapters(&self) -> MarketResult<Vec<Chapter>> {
        Ok(self.state.safe_lock()?.chapters.clone())
    }

    pub fn purchased(&self) -> MarketResult<ChapterIdSet> {
        Ok(self.state.safe_lock()?.purchased.clone())
    }

    pub fn is_purchasing(&self, chapter_id: &str) -> MarketResult<bool> {
        Ok(self.state.safe_lock()?.purchasing.contains(chapter_id))
    }

    pub fn drain_notifications(&self) -> MarketResult<Vec<Notification>> {
        Ok(std::mem::take(&mut self.state.safe_lock()?.notifications))
    }
}
