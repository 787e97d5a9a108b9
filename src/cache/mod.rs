use std::path::{Path, PathBuf};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use crate::core::{Result, VideoId, VideoMetadata};

/// Fixed documents kept by the local cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Videos,
    Comments,
    Notes,
}

impl CacheKey {
    pub const ALL: [CacheKey; 3] = [CacheKey::Videos, CacheKey::Comments, CacheKey::Notes];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKey::Videos => "training_videos",
            CacheKey::Comments => "training_comments",
            CacheKey::Notes => "training_notes",
        }
    }
}

/// JSON documents in a directory, one file per [`CacheKey`].
///
/// A mirror for offline use, never the source of truth.
#[derive(Debug, Clone)]
pub struct LocalCache {
    dir: PathBuf,
}

impl LocalCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: CacheKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }

    /// `None` when nothing was stored under `key`
    pub async fn load<T: DeserializeOwned>(&self, key: CacheKey) -> Result<Option<T>> {
        let path = self.path(key);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }

        let data = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&data)?))
    }

    pub async fn store<T: Serialize + ?Sized>(&self, key: CacheKey, value: &T) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // 先写临时文件再替换
        let path = self.path(key);
        let tmp_path = path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(value)?;
        tokio::fs::write(&tmp_path, data).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        debug!(key = key.as_str(), "Cache entry stored");
        Ok(())
    }

    pub async fn remove(&self, key: CacheKey) -> Result<()> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn clear(&self) -> Result<()> {
        for key in CacheKey::ALL {
            self.remove(key).await?;
        }
        Ok(())
    }

    pub async fn videos(&self) -> Result<Vec<VideoMetadata>> {
        Ok(self.load(CacheKey::Videos).await?.unwrap_or_default())
    }

    /// Insert or replace by video id
    pub async fn upsert_video(&self, video: &VideoMetadata) -> Result<()> {
        let mut videos = self.videos().await?;
        match videos.iter_mut().find(|cached| cached.id == video.id) {
            Some(cached) => *cached = video.clone(),
            None => videos.push(video.clone()),
        }
        self.store(CacheKey::Videos, &videos).await
    }

    pub async fn remove_video(&self, video_id: &VideoId) -> Result<bool> {
        let mut videos = self.videos().await?;
        let before = videos.len();
        videos.retain(|cached| &cached.id != video_id);
        if videos.len() == before {
            return Ok(false);
        }
        self.store(CacheKey::Videos, &videos).await?;
        Ok(true)
    }
}
