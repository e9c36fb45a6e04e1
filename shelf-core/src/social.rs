//! Social entity summaries: lists, user profiles and reviews.
//!
//! Each summary carries the viewer's own relationship flags (liked, saved,
//! following) next to the public counters those flags contribute to. The
//! `*Counts` types are what the server answers to a like/save/follow call.

use crate::{BookId, ListId, ReviewId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSummary {
    pub list_id: ListId,
    pub name: String,
    pub liked: bool,
    pub saved: bool,
    pub like_count: u64,
    pub save_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListCounts {
    pub like_count: u64,
    pub save_count: u64,
}

impl ListSummary {
    pub fn with_liked(&self, liked: bool) -> Self {
        let mut next = self.clone();
        if next.liked != liked {
            next.like_count = adjust(next.like_count, liked);
            next.liked = liked;
        }
        next
    }

    pub fn with_saved(&self, saved: bool) -> Self {
        let mut next = self.clone();
        if next.saved != saved {
            next.save_count = adjust(next.save_count, saved);
            next.saved = saved;
        }
        next
    }

    pub fn with_counts(mut self, counts: &ListCounts) -> Self {
        self.like_count = counts.like_count;
        self.save_count = counts.save_count;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub username: String,
    pub following: bool,
    pub follower_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowCounts {
    pub follower_count: u64,
}

impl UserProfile {
    pub fn with_following(&self, following: bool) -> Self {
        let mut next = self.clone();
        if next.following != following {
            next.follower_count = adjust(next.follower_count, following);
            next.following = following;
        }
        next
    }

    pub fn with_counts(mut self, counts: &FollowCounts) -> Self {
        self.follower_count = counts.follower_count;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    pub review_id: ReviewId,
    pub book_id: BookId,
    pub liked: bool,
    pub like_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCounts {
    pub like_count: u64,
}

impl ReviewSummary {
    pub fn with_liked(&self, liked: bool) -> Self {
        let mut next = self.clone();
        if next.liked != liked {
            next.like_count = adjust(next.like_count, liked);
            next.liked = liked;
        }
        next
    }

    pub fn with_counts(mut self, counts: &ReviewCounts) -> Self {
        self.like_count = counts.like_count;
        self
    }
}

fn adjust(count: u64, increment: bool) -> u64 {
    if increment {
        count.saturating_add(1)
    } else {
        count.saturating_sub(1)
    }
}
