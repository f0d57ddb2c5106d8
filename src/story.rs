// Marketplace records: categories, stories, chapters and purchase entitlements.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

/// A story and its running chapter counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category_id: String,
    /// Default price for new chapters, in ether.
    pub price_per_chapter: Decimal,
    pub author_id: String,
    /// Only ever moves forward, one step per persisted chapter.
    pub total_chapters: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub story_id: String,
    pub chapter_number: u32,
    pub title: String,
    pub content: String,
    pub is_free: bool,
    pub is_published: bool,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Durable proof that a user is entitled to read a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub user_id: String,
    pub story_id: String,
    pub chapter_id: String,
    pub purchased_at: DateTime<Utc>,
    /// `None` only for records restored from the ledger by reconciliation.
    pub blockchain_tx_hash: Option<String>,
}

/// Author-supplied fields for a new story. The category is given by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStory {
    pub title: String,
    pub description: String,
    pub category: String,
    pub price_per_chapter: Decimal,
}

/// Author-supplied fields for a new chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewChapter {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub is_free: bool,
    /// Falls back to the story's per-chapter price.
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default = "default_publish")]
    pub publish: bool,
}

fn default_publish() -> bool {
    true
}

/// A story row ready for insertion; the store assigns the id.
#[derive(Debug, Clone)]
pub struct StoryDraft {
    pub title: String,
    pub description: String,
    pub category_id: String,
    pub price_per_chapter: Decimal,
    pub author_id: String,
}

/// A chapter row ready for insertion; the store assigns the id.
#[derive(Debug, Clone)]
pub struct ChapterDraft {
    pub story_id: String,
    pub chapter_number: u32,
    pub title: String,
    pub content: String,
    pub is_free: bool,
    pub is_published: bool,
    pub price: Decimal,
}

/// The signed-in reader or author. Anonymous callers carry no session at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
}

impl UserSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}
