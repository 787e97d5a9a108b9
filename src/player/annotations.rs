use std::collections::HashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::cache::{CacheKey, LocalCache};
use crate::client::validation::validate_comment;
use crate::core::{Result, VideoError, VideoId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoComment {
    pub id: String,
    pub video_id: VideoId,
    pub user_id: String,
    pub user_name: String,
    pub content: String,
    /// Media time the comment refers to
    pub timestamp: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoNote {
    pub id: String,
    pub video_id: VideoId,
    pub user_id: String,
    pub content: String,
    pub timestamp: f64,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewComment {
    pub user_id: String,
    pub user_name: String,
    pub content: String,
    /// Current position when `None`
    pub timestamp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNote {
    pub user_id: String,
    pub content: String,
    pub timestamp: Option<f64>,
    pub is_private: bool,
}

/// Comments and notes of one video, ordered by media time
#[derive(Debug, Clone)]
pub struct Annotations {
    video_id: VideoId,
    comments: Vec<VideoComment>,
    notes: Vec<VideoNote>,
}

impl Annotations {
    pub fn new(video_id: VideoId) -> Self {
        Self {
            video_id,
            comments: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn comments(&self) -> &[VideoComment] {
        &self.comments
    }

    pub fn notes(&self) -> &[VideoNote] {
        &self.notes
    }

    pub fn add_comment(&mut self, comment: NewComment, position: f64) -> Result<VideoComment> {
        validate_comment(&comment.content)?;

        let comment = VideoComment {
            id: format!("comment_{}", Uuid::new_v4().simple()),
            video_id: self.video_id.clone(),
            user_id: comment.user_id,
            user_name: comment.user_name,
            content: comment.content,
            timestamp: comment.timestamp.unwrap_or(position).max(0.0),
            created_at: Utc::now(),
        };
        let index = self.comments.partition_point(|c| c.timestamp <= comment.timestamp);
        self.comments.insert(index, comment.clone());
        Ok(comment)
    }

    pub fn add_note(&mut self, note: NewNote, position: f64) -> Result<VideoNote> {
        if note.content.trim().is_empty() {
            return Err(VideoError::InvalidParameters(vec!["Note can't be empty".to_string()]));
        }

        let note = VideoNote {
            id: format!("note_{}", Uuid::new_v4().simple()),
            video_id: self.video_id.clone(),
            user_id: note.user_id,
            content: note.content,
            timestamp: note.timestamp.unwrap_or(position).max(0.0),
            is_private: note.is_private,
            created_at: Utc::now(),
        };
        let index = self.notes.partition_point(|n| n.timestamp <= note.timestamp);
        self.notes.insert(index, note.clone());
        Ok(note)
    }

    pub fn remove_comment(&mut self, comment_id: &str) -> bool {
        let before = self.comments.len();
        self.comments.retain(|comment| comment.id != comment_id);
        self.comments.len() != before
    }

    pub fn remove_note(&mut self, note_id: &str) -> bool {
        let before = self.notes.len();
        self.notes.retain(|note| note.id != note_id);
        self.notes.len() != before
    }

    /// Notes visible to `user_id`: their own plus every public note
    pub fn visible_notes<'a>(&'a self, user_id: &'a str) -> impl Iterator<Item = &'a VideoNote> + 'a {
        self.notes
            .iter()
            .filter(move |note| !note.is_private || note.user_id == user_id)
    }

    /// Load this video's annotations from the cache; other videos' entries are left alone.
    pub async fn load(cache: &LocalCache, video_id: VideoId) -> Result<Self> {
        let mut comments: HashMap<VideoId, Vec<VideoComment>> = cache.load(CacheKey::Comments).await?.unwrap_or_default();
        let mut notes: HashMap<VideoId, Vec<VideoNote>> = cache.load(CacheKey::Notes).await?.unwrap_or_default();

        Ok(Self {
            comments: comments.remove(&video_id).unwrap_or_default(),
            notes: notes.remove(&video_id).unwrap_or_default(),
            video_id,
        })
    }

    pub async fn save(&self, cache: &LocalCache) -> Result<()> {
        let mut comments: HashMap<VideoId, Vec<VideoComment>> = cache.load(CacheKey::Comments).await?.unwrap_or_default();
        comments.insert(self.video_id.clone(), self.comments.clone());
        cache.store(CacheKey::Comments, &comments).await?;

        let mut notes: HashMap<VideoId, Vec<VideoNote>> = cache.load(CacheKey::Notes).await?.unwrap_or_default();
        notes.insert(self.video_id.clone(), self.notes.clone());
        cache.store(CacheKey::Notes, &notes).await
    }
}
