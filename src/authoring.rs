//! Story and chapter creation.

use std::sync::Arc;

use crate::errors::{MarketError, MarketResult};
use crate::record_store::RecordStore;
use crate::story::{Category, Chapter, ChapterDraft, NewChapter, NewStory, Story, StoryDraft};

pub struct StoryAuthoring {
    store: Arc<dyn RecordStore>,
}

impl StoryAuthoring {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn create_category(&self, name: &str) -> MarketResult<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MarketError::validation("category", "name cannot be empty"));
        }
        self.store.insert_category(name).await
    }

    pub async fn list_categories(&self) -> MarketResult<Vec<Category>> {
        self.store.list_categories().await
    }

    /// Creates a story with no chapters. The category must already exist.
    pub async fn create_story(&self, data: NewStory, author_id: &str) -> MarketResult<Story> {
        if data.title.trim().is_empty() {
            return Err(MarketError::validation("title", "title cannot be empty"));
        }
        if data.price_per_chapter.is_sign_negative() {
            return Err(MarketError::invalid_price(format!(
                "{} is negative",
                data.price_per_chapter
            )));
        }

        let category = self
            .store
            .find_category_by_name(&data.category)
            .await?
            .ok_or_else(|| MarketError::category_not_found(&data.category))?;

        self.store
            .insert_story(StoryDraft {
                title: data.title,
                description: data.description,
                category_id: category.id,
                price_per_chapter: data.price_per_chapter,
                author_id: author_id.to_string(),
            })
            .await
    }

    /// Appends a chapter numbered `total_chapters + 1`, then advances the story counter.
    ///
    /// The two writes are separate. If the second one fails the chapter exists and the
    /// counter lags behind; chapter content is never affected.
    pub async fn add_chapter(
        &self,
        story_id: &str,
        data: NewChapter,
        author_id: &str,
    ) -> MarketResult<Chapter> {
        let story = self
            .store
            .get_story(story_id)
            .await?
            .ok_or_else(|| MarketError::story_not_found(story_id))?;

        if story.author_id != author_id {
            return Err(MarketError::NotStoryAuthor {
                user_id: author_id.to_string(),
                story_id: story_id.to_string(),
            });
        }
        if data.title.trim().is_empty() {
            return Err(MarketError::validation("title", "title cannot be empty"));
        }
        let price = data.price.unwrap_or(story.price_per_chapter);
        if price.is_sign_negative() {
            return Err(MarketError::invalid_price(format!("{price} is negative")));
        }

        let chapter_number = story.total_chapters + 1;
        let chapter = self
            .store
            .insert_chapter(ChapterDraft {
                story_id: story.id.clone(),
                chapter_number,
                title: data.title,
                content: data.content,
                is_free: data.is_free,
                is_published: data.publish,
                price,
            })
            .await?;

        if let Err(err) = self
            .store
            .update_story_chapter_count(&story.id, chapter_number)
            .await
        {
            tracing::warn!(
                story_id = %story.id,
                chapter_id = %chapter.id,
                error = %err,
                "chapter saved but story chapter count not updated"
            );
            return Err(err);
        }
        Ok(chapter)
    }
}
