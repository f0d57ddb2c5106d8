//! Chapter access decisions.
//!
//! Access is never stored. It is recomputed from the chapter's free flag and the
//! caller's current set of purchased chapter ids every time a chapter is shown.

use crate::story::Chapter;
use std::collections::BTreeSet;

/// Returns `true` when the chapter is free or its id is in `purchased`.
///
/// Adding ids to `purchased` never turns a `true` into a `false`.
pub fn can_access(chapter: &Chapter, purchased: &ChapterIdSet) -> bool {
    chapter.is_free || purchased.contains(&chapter.id)
}

/// A set of chapter ids with the handful of operations the view layer needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterIdSet {
    ids: BTreeSet<String>,
}

impl ChapterIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the id was not already present.
    pub fn insert(&mut self, chapter_id: impl Into<String>) -> bool {
        self.ids.insert(chapter_id.into())
    }

    pub fn remove(&mut self, chapter_id: &str) -> bool {
        self.ids.remove(chapter_id)
    }

    pub fn contains(&self, chapter_id: &str) -> bool {
        self.ids.contains(chapter_id)
    }

    /// Flips membership and returns whether the id is present afterwards.
    pub fn toggle(&mut self, chapter_id: &str) -> bool {
        if self.ids.remove(chapter_id) {
            false
        } else {
            self.ids.insert(chapter_id.to_string());
            true
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ChapterIdSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}
