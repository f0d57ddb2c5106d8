use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};

use crate::errors::{MarketError, MarketResult};
use crate::record_store::RecordStore;
use crate::story::{Category, Chapter, ChapterDraft, PurchaseRecord, Story, StoryDraft};

const CATEGORIES: &str = "categories";
const CATEGORY_NAMES: &str = "category_names";
const STORIES: &str = "stories";
const CHAPTERS: &str = "chapters";
const STORY_CHAPTERS: &str = "story_chapters";
const PURCHASES: &str = "purchases";
const ACCOUNT_OWNERS: &str = "account_owners";

/// Separates the parts of a compound key so that a prefix scan on the first part
/// never matches a longer id.
const KEY_SEP: char = '\u{1f}';

fn compound_key(first: &str, second: &str) -> String {
    format!("{first}{KEY_SEP}{second}")
}

fn key_prefix(first: &str) -> String {
    format!("{first}{KEY_SEP}")
}

/// Chapter index key. The zero-padded number keeps scan order; the trailing chapter id
/// keeps two chapters that share a number from overwriting each other.
fn chapter_index_key(chapter: &Chapter) -> String {
    compound_key(
        &chapter.story_id,
        &compound_key(&format!("{:010}", chapter.chapter_number), &chapter.id),
    )
}

/// Ledger addresses are case-insensitive hex.
fn account_key(account: &str) -> String {
    account.trim().to_ascii_lowercase()
}

/// A sled-backed implementation of RecordStore.
///
/// Ids come from `Db::generate_id`, so every id this store hands out is a decimal
/// `u64` and converts cleanly to a ledger id.
pub struct SledRecordStore {
    db: Db,
}

impl SledRecordStore {
    /// Opens (or creates) the database at `path`.
    pub fn open(path: &str) -> MarketResult<Self> {
        let db = sled::open(path).map_err(|e| MarketError::persistence("open_db", e))?;
        tracing::debug!(path, "opened record store");
        Ok(Self { db })
    }

    /// A throwaway store that is removed when dropped.
    pub fn temporary() -> MarketResult<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| MarketError::persistence("open_temporary_db", e))?;
        Ok(Self { db })
    }

    fn tree(&self, name: &str) -> MarketResult<Tree> {
        self.db
            .open_tree(name)
            .map_err(|e| MarketError::persistence(format!("open_tree:{name}"), e))
    }

    fn next_id(&self) -> MarketResult<String> {
        Ok(self.db.generate_id()?.to_string())
    }

    fn encode<T: Serialize>(value: &T) -> MarketResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> MarketResult<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn get_json<T: DeserializeOwned>(&self, tree: &str, key: &str) -> MarketResult<Option<T>> {
        match self.tree(tree)?.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, tree: &str, key: &str, value: &T) -> MarketResult<()> {
        self.tree(tree)?.insert(key.as_bytes(), Self::encode(value)?)?;
        Ok(())
    }

    fn all_json<T: DeserializeOwned>(&self, tree: &str) -> MarketResult<Vec<T>> {
        self.tree(tree)?
            .iter()
            .map(|item| {
                let (_, value) = item?;
                Self::decode(&value)
            })
            .collect()
    }

    async fn flush(&self) -> MarketResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SledRecordStore {
    async fn insert_category(&self, name: &str) -> MarketResult<Category> {
        let names = self.tree(CATEGORY_NAMES)?;
        let id = self.next_id()?;

        let swapped = names.compare_and_swap(
            name.as_bytes(),
            None as Option<&[u8]>,
            Some(id.as_bytes()),
        )?;
        if swapped.is_err() {
            return Err(MarketError::validation(
                "category",
                format!("category '{name}' already exists"),
            ));
        }

        let category = Category {
            id: id.clone(),
            name: name.to_string(),
        };
        self.put_json(CATEGORIES, &id, &category)?;
        self.flush().await?;
        tracing::info!(category_id = %id, name, "category created");
        Ok(category)
    }

    async fn find_category_by_name(&self, name: &str) -> MarketResult<Option<Category>> {
        match self.tree(CATEGORY_NAMES)?.get(name.as_bytes())? {
            Some(id) => {
                let id = String::from_utf8_lossy(&id).into_owned();
                self.get_json(CATEGORIES, &id)
            }
            None => Ok(None),
        }
    }

    async fn list_categories(&self) -> MarketResult<Vec<Category>> {
        let mut categories: Vec<Category> = self.all_json(CATEGORIES)?;
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn insert_story(&self, draft: StoryDraft) -> MarketResult<Story> {
        let story = Story {
            id: self.next_id()?,
            title: draft.title,
            description: draft.description,
            category_id: draft.category_id,
            price_per_chapter: draft.price_per_chapter,
            author_id: draft.author_id,
            total_chapters: 0,
            created_at: Utc::now(),
        };
        self.put_json(STORIES, &story.id, &story)?;
        self.flush().await?;
        tracing::info!(story_id = %story.id, author_id = %story.author_id, "story created");
        Ok(story)
    }

    async fn get_story(&self, story_id: &str) -> MarketResult<Option<Story>> {
        self.get_json(STORIES, story_id)
    }

    async fn list_stories(&self) -> MarketResult<Vec<Story>> {
        let mut stories: Vec<Story> = self.all_json(STORIES)?;
        stories.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(stories)
    }

    async fn update_story_chapter_count(&self, story_id: &str, total: u32) -> MarketResult<()> {
        let mut story: Story = self
            .get_json(STORIES, story_id)?
            .ok_or_else(|| MarketError::story_not_found(story_id))?;
        story.total_chapters = total;
        self.put_json(STORIES, story_id, &story)?;
        self.flush().await
    }

    async fn insert_chapter(&self, draft: ChapterDraft) -> MarketResult<Chapter> {
        let chapter = Chapter {
            id: self.next_id()?,
            story_id: draft.story_id,
            chapter_number: draft.chapter_number,
            title: draft.title,
            content: draft.content,
            is_free: draft.is_free,
            is_published: draft.is_published,
            price: draft.price,
            created_at: Utc::now(),
        };

        let index_key = chapter_index_key(&chapter);
        self.put_json(CHAPTERS, &chapter.id, &chapter)?;
        self.tree(STORY_CHAPTERS)?
            .insert(index_key.as_bytes(), chapter.id.as_bytes())?;
        self.flush().await?;

        tracing::info!(
            story_id = %chapter.story_id,
            chapter_id = %chapter.id,
            chapter_number = chapter.chapter_number,
            "chapter created"
        );
        Ok(chapter)
    }

    async fn get_chapter(&self, chapter_id: &str) -> MarketResult<Option<Chapter>> {
        self.get_json(CHAPTERS, chapter_id)
    }

    async fn list_published_chapters(&self, story_id: &str) -> MarketResult<Vec<Chapter>> {
        let index = self.tree(STORY_CHAPTERS)?;
        let mut chapters = Vec::new();

        // Index keys start with the zero-padded chapter number, so scan order is chapter order.
        for item in index.scan_prefix(key_prefix(story_id).as_bytes()) {
            let (_, chapter_id) = item?;
            let chapter_id = String::from_utf8_lossy(&chapter_id).into_owned();
            let chapter: Option<Chapter> = self.get_json(CHAPTERS, &chapter_id)?;
            match chapter {
                Some(chapter) if chapter.is_published => chapters.push(chapter),
                Some(_) => {}
                None => tracing::warn!(story_id, chapter_id, "dangling chapter index entry"),
            }
        }
        Ok(chapters)
    }

    async fn list_purchases(
        &self,
        user_id: &str,
        story_id: &str,
    ) -> MarketResult<Vec<PurchaseRecord>> {
        let purchases = self.tree(PURCHASES)?;
        let mut records = Vec::new();
        for item in purchases.scan_prefix(key_prefix(user_id).as_bytes()) {
            let (_, value) = item?;
            let record: PurchaseRecord = Self::decode(&value)?;
            if record.story_id == story_id {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn insert_purchase(&self, record: &PurchaseRecord) -> MarketResult<()> {
        let key = compound_key(&record.user_id, &record.chapter_id);
        let swapped = self.tree(PURCHASES)?.compare_and_swap(
            key.as_bytes(),
            None as Option<&[u8]>,
            Some(Self::encode(record)?),
        )?;
        if swapped.is_err() {
            return Err(MarketError::AlreadyPurchased {
                user_id: record.user_id.clone(),
                chapter_id: record.chapter_id.clone(),
            });
        }
        self.flush().await?;

        tracing::info!(
            user_id = %record.user_id,
            story_id = %record.story_id,
            chapter_id = %record.chapter_id,
            tx_hash = record.blockchain_tx_hash.as_deref().unwrap_or("-"),
            "purchase recorded"
        );
        Ok(())
    }

    async fn claim_account(&self, account: &str, user_id: &str) -> MarketResult<String> {
        let key = account_key(account);
        let swapped = self.tree(ACCOUNT_OWNERS)?.compare_and_swap(
            key.as_bytes(),
            None as Option<&[u8]>,
            Some(user_id.as_bytes()),
        )?;
        match swapped {
            Ok(()) => {
                self.flush().await?;
                tracing::info!(account = %key, user_id, "wallet account bound to user");
                Ok(user_id.to_string())
            }
            Err(existing) => Ok(existing
                .current
                .map(|owner| String::from_utf8_lossy(&owner).into_owned())
                .unwrap_or_default()),
        }
    }

    async fn account_owner(&self, account: &str) -> MarketResult<Option<String>> {
        Ok(self
            .tree(ACCOUNT_OWNERS)?
            .get(account_key(account).as_bytes())?
            .map(|owner| String::from_utf8_lossy(&owner).into_owned()))
    }
}
