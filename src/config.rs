use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use url::Url;
use crate::core::{Result, VideoError, VideoFormat, VideoResolution};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024 * 1024; // 2GB
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024; // 5MB

// 用于序列化 Duration
fn serialize_duration_ms<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn deserialize_duration_ms<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

fn serialize_duration_secs<S>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_secs())
}

fn deserialize_duration_secs<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

/// `0` disables the deadline
fn serialize_deadline<S>(deadline: &Option<Duration>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(deadline.map(|d| d.as_secs()).unwrap_or(0))
}

fn deserialize_deadline<'de, D>(deserializer: D) -> std::result::Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Base url of the video API, e.g. `https://videos.example.com`
    pub endpoint: String,
    /// Bearer token
    pub token: String,
    pub upload: UploadConfig,
    pub queue: QueueConfig,
    pub player: PlayerConfig,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000".to_string(),
            token: String::new(),
            upload: UploadConfig::default(),
            queue: QueueConfig::default(),
            player: PlayerConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .map_err(|err| VideoError::ConfigError(format!("Can't read {}: {}", path.display(), err)))?;
        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.endpoint)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(VideoError::ConfigError(format!("Unsupported endpoint scheme: {}", url.scheme())));
        }
        self.upload.validate()?;
        self.queue.validate()
    }
}

/// Transfer limits and polling behaviour
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_size: u64,
    /// Files strictly larger than this are sent in chunks
    pub chunk_size: u64,
    pub supported_formats: Vec<VideoFormat>,
    #[serde(rename = "poll_interval_ms", serialize_with = "serialize_duration_ms", deserialize_with = "deserialize_duration_ms")]
    pub poll_interval: Duration,
    #[serde(rename = "processing_timeout_secs", serialize_with = "serialize_deadline", deserialize_with = "deserialize_deadline")]
    pub processing_timeout: Option<Duration>,
    #[serde(rename = "request_timeout_secs", serialize_with = "serialize_duration_secs", deserialize_with = "deserialize_duration_secs")]
    pub request_timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            supported_formats: VideoFormat::ALL.to_vec(),
            poll_interval: Duration::from_secs(2),
            processing_timeout: Some(Duration::from_secs(30 * 60)),
            request_timeout: Duration::from_secs(300),
        }
    }
}

impl UploadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(VideoError::ConfigError("chunk_size must be greater than zero".to_string()));
        }
        if self.max_file_size == 0 {
            return Err(VideoError::ConfigError("max_file_size must be greater than zero".to_string()));
        }
        if self.supported_formats.is_empty() {
            return Err(VideoError::ConfigError("supported_formats can't be empty".to_string()));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct QueueConfig {
    pub max_files: usize,
    pub allow_multiple: bool,
    pub auto_start: bool,
    /// Files transferred at the same time; 1 keeps uploads strictly sequential
    pub max_concurrent: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_files: 10,
            allow_multiple: true,
            auto_start: false,
            max_concurrent: 1,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_files == 0 {
            return Err(VideoError::ConfigError("max_files must be greater than zero".to_string()));
        }
        if self.max_concurrent == 0 {
            return Err(VideoError::ConfigError("max_concurrent must be greater than zero".to_string()));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct PlayerConfig {
    pub auto_play: bool,
    pub default_quality: VideoResolution,
    pub playback_rates: Vec<f64>,
    /// Seconds skipped by rewind/forward without an explicit amount
    pub seek_step: f64,
    /// Seconds skipped by the arrow keys
    pub keyboard_seek_step: f64,
    pub volume_step: f64,
    pub enable_fullscreen: bool,
    pub analytics: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            auto_play: false,
            default_quality: VideoResolution::P720,
            playback_rates: vec![0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0],
            seek_step: 10.0,
            keyboard_seek_step: 5.0,
            volume_step: 0.1,
            enable_fullscreen: true,
            analytics: true,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory of the local JSON cache; no caching when unset
    pub dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.upload.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.upload.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.upload.poll_interval, Duration::from_secs(2));
        assert_eq!(config.upload.processing_timeout, Some(Duration::from_secs(1800)));
        assert_eq!(config.queue.max_files, 10);
        assert_eq!(config.queue.max_concurrent, 1);
        assert_eq!(config.player.default_quality, VideoResolution::P720);
        assert!(config.cache.dir.is_none());
    }

    #[test]
    fn test_parse_sections() {
        let config = Config::from_toml(
            r#"
            endpoint = "https://videos.example.com"
            token = "secret"

            [upload]
            chunk_size = 1048576
            supported_formats = ["mp4", "webm"]
            poll_interval_ms = 250
            processing_timeout_secs = 0

            [queue]
            max_files = 3
            allow_multiple = false

            [player]
            default_quality = "1080p"

            [cache]
            dir = "/tmp/solara-cache"
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoint, "https://videos.example.com");
        assert_eq!(config.upload.chunk_size, 1024 * 1024);
        assert_eq!(config.upload.supported_formats, vec![VideoFormat::Mp4, VideoFormat::Webm]);
        assert_eq!(config.upload.poll_interval, Duration::from_millis(250));
        assert_eq!(config.upload.processing_timeout, None);
        assert_eq!(config.queue.max_files, 3);
        assert!(!config.queue.allow_multiple);
        assert_eq!(config.player.default_quality, VideoResolution::P1080);
        assert_eq!(config.cache.dir, Some(PathBuf::from("/tmp/solara-cache")));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::from_toml("endpoint = \"not a url\"").is_err());
        assert!(Config::from_toml("endpoint = \"ftp://host\"").is_err());
        assert!(Config::from_toml("[upload]\nchunk_size = 0").is_err());
        assert!(Config::from_toml("[queue]\nmax_concurrent = 0").is_err());
    }
}
