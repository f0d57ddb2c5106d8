use crate::errors::MarketResult;
use crate::story::{Category, Chapter, ChapterDraft, PurchaseRecord, Story, StoryDraft};
use async_trait::async_trait;

/// Durable home of stories, chapters and purchase entitlements.
///
/// The store is the final arbiter of purchase uniqueness: `insert_purchase` must
/// reject a second record for the same (user, chapter) pair with
/// `MarketError::AlreadyPurchased`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_category(&self, name: &str) -> MarketResult<Category>;

    /// Exact, case-sensitive name match.
    async fn find_category_by_name(&self, name: &str) -> MarketResult<Option<Category>>;

    async fn list_categories(&self) -> MarketResult<Vec<Category>>;

    async fn insert_story(&self, draft: StoryDraft) -> MarketResult<Story>;

    async fn get_story(&self, story_id: &str) -> MarketResult<Option<Story>>;

    async fn list_stories(&self) -> MarketResult<Vec<Story>>;

    async fn update_story_chapter_count(&self, story_id: &str, total: u32) -> MarketResult<()>;

    async fn insert_chapter(&self, draft: ChapterDraft) -> MarketResult<Chapter>;

    async fn get_chapter(&self, chapter_id: &str) -> MarketResult<Option<Chapter>>;

    /// Published chapters of a story, ordered by chapter number ascending.
    async fn list_published_chapters(&self, story_id: &str) -> MarketResult<Vec<Chapter>>;

    async fn list_purchases(&self, user_id: &str, story_id: &str)
        -> MarketResult<Vec<PurchaseRecord>>;

    async fn insert_purchase(&self, record: &PurchaseRecord) -> MarketResult<()>;

    /// Binds a wallet account to `user_id` unless it is already bound, and returns the
    /// user the account belongs to afterwards. A binding is never replaced.
    async fn claim_account(&self, account: &str, user_id: &str) -> MarketResult<String>;

    async fn account_owner(&self, account: &str) -> MarketResult<Option<String>>;
}
