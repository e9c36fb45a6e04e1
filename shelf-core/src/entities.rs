//! Library entity structures

use crate::{BookId, ReadingStatus, Timestamp};
use serde::{Deserialize, Serialize};

/// Catalogue entry of a book, as shown on its detail screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub book_id: BookId,
    pub title: String,
    #[serde(default)]
    pub total_chapters: Option<u32>,
    #[serde(default)]
    pub total_volumes: Option<u32>,
}

/// One row of the user's library: the tracking relationship to a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedBook {
    pub book_id: BookId,
    pub status: ReadingStatus,
    #[serde(default)]
    pub current_chapter: Option<u32>,
    #[serde(default)]
    pub current_volume: Option<u32>,
    /// Score from 1 to 10.
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub last_read_at: Option<Timestamp>,
    /// Chapter count of the book, used to derive completion locally.
    #[serde(default)]
    pub total_chapters: Option<u32>,
}

impl TrackedBook {
    /// Local stand-in shown while the server has not confirmed tracking yet.
    pub fn placeholder(book: &Book, status: ReadingStatus) -> Self {
        Self {
            book_id: book.book_id,
            status,
            current_chapter: None,
            current_volume: None,
            rating: None,
            last_read_at: None,
            total_chapters: book.total_chapters,
        }
    }

    /// Merge a partial progress update into a copy of this entry.
    ///
    /// Setting a chapter at or past the last one also marks the entry
    /// completed, unless the update names a status explicitly.
    pub fn with_progress(&self, update: &ProgressUpdate) -> Self {
        let mut next = self.clone();
        if let Some(chapter) = update.current_chapter {
            next.current_chapter = Some(chapter);
        }
        if let Some(volume) = update.current_volume {
            next.current_volume = Some(volume);
        }
        if let Some(rating) = update.rating {
            next.rating = Some(rating);
        }
        if let Some(read_at) = update.last_read_at {
            next.last_read_at = Some(read_at);
        }
        match update.status {
            Some(status) => next.status = status,
            None if update.current_chapter.is_some() && next.reached_last_chapter() => {
                next.status = ReadingStatus::Completed;
            }
            None => {}
        }
        next
    }

    /// True when the current chapter is at or past the known chapter count.
    pub fn reached_last_chapter(&self) -> bool {
        match (self.current_chapter, self.total_chapters) {
            (Some(current), Some(total)) => total > 0 && current >= total,
            _ => false,
        }
    }
}

/// Partial fields for a progress update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ReadingStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_chapter: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_volume: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_read_at: Option<Timestamp>,
}

impl ProgressUpdate {
    pub fn chapter(chapter: u32) -> Self {
        Self {
            current_chapter: Some(chapter),
            ..Default::default()
        }
    }

    pub fn status(status: ReadingStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_volume(mut self, volume: u32) -> Self {
        self.current_volume = Some(volume);
        self
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_read_at(mut self, read_at: Timestamp) -> Self {
        self.last_read_at = Some(read_at);
        self
    }

    /// True when the update moves the reading position.
    pub fn advances_position(&self) -> bool {
        self.current_chapter.is_some() || self.current_volume.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Body of the "start tracking" request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRequest {
    pub book_id: BookId,
    pub status: ReadingStatus,
}
