use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use chrono::Utc;
use serde::Serialize;
use crate::config::UploadConfig;
use crate::core::{MetadataUpdate, Result, UploadMetadata, VideoError, VideoFile, VideoFormat, VideoId};
use crate::utils::format_bytes;

pub const MAX_TITLE_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 5000;
pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_LENGTH: usize = 50;
pub const MAX_COMMENT_LENGTH: usize = 1000;

/// Size first, then the extension allow-list.
pub fn validate_file(file: &VideoFile, config: &UploadConfig) -> Result<VideoFormat> {
    if file.size > config.max_file_size {
        return Err(VideoError::FileTooLarge {
            size: file.size,
            max: config.max_file_size,
        });
    }

    match file.format() {
        Some(format) if config.supported_formats.contains(&format) => Ok(format),
        _ => {
            let extension = file.extension();
            let shown = if extension.is_empty() { file.name.clone() } else { extension };
            Err(VideoError::UnsupportedFormat(shown))
        }
    }
}

/// Queue admission: only `video/*` mime types, then [`validate_file`].
pub fn validate_queued_file(file: &VideoFile, config: &UploadConfig) -> Result<VideoFormat> {
    if !file.mime_type.starts_with("video/") {
        return Err(VideoError::UnsupportedFormat(format!(
            "{} is not a video file ({})",
            file.name, file.mime_type
        )));
    }
    validate_file(file, config)
}

pub fn validate_metadata(metadata: &UploadMetadata) -> Result<()> {
    let mut problems = Vec::new();
    check_title(&metadata.title, &mut problems);
    check_description(&metadata.description, &mut problems);
    check_tags(&metadata.tags, &mut problems);
    into_result(problems)
}

pub fn validate_metadata_update(update: &MetadataUpdate) -> Result<()> {
    let mut problems = Vec::new();
    if let Some(title) = &update.title {
        check_title(title, &mut problems);
    }
    if let Some(description) = &update.description {
        check_description(description, &mut problems);
    }
    if let Some(tags) = &update.tags {
        check_tags(tags, &mut problems);
    }
    into_result(problems)
}

pub fn validate_comment(content: &str) -> Result<()> {
    let mut problems = Vec::new();
    if content.trim().is_empty() {
        problems.push("Comment can't be empty".to_string());
    }
    if content.chars().count() > MAX_COMMENT_LENGTH {
        problems.push(format!("Comment exceeds {} characters", MAX_COMMENT_LENGTH));
    }
    into_result(problems)
}

fn check_title(title: &str, problems: &mut Vec<String>) {
    if title.trim().is_empty() {
        problems.push("Title is required".to_string());
    } else if title.chars().count() > MAX_TITLE_LENGTH {
        problems.push(format!("Title exceeds {} characters", MAX_TITLE_LENGTH));
    }
}

fn check_description(description: &str, problems: &mut Vec<String>) {
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        problems.push(format!("Description exceeds {} characters", MAX_DESCRIPTION_LENGTH));
    }
}

fn check_tags(tags: &[String], problems: &mut Vec<String>) {
    if tags.len() > MAX_TAGS {
        problems.push(format!("At most {} tags are allowed", MAX_TAGS));
    }
    for tag in tags {
        if tag.chars().count() > MAX_TAG_LENGTH {
            problems.push(format!("Tag '{}' exceeds {} characters", tag, MAX_TAG_LENGTH));
        }
    }
}

fn into_result(problems: Vec<String>) -> Result<()> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(VideoError::InvalidParameters(problems))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadTokenClaims<'a> {
    video_id: &'a str,
    user_id: &'a str,
    timestamp: i64,
}

/// Base64 of `{"videoId", "userId", "timestamp"}`; `userId` defaults to `anonymous`.
pub fn generate_upload_token(video_id: &VideoId, user_id: Option<&str>) -> Result<String> {
    let claims = UploadTokenClaims {
        video_id: video_id.as_str(),
        user_id: user_id.unwrap_or("anonymous"),
        timestamp: Utc::now().timestamp_millis(),
    };
    let json = serde_json::to_vec(&claims)?;
    Ok(BASE64_STANDARD.encode(json))
}

/// One line summary used in logs and rejection messages
pub fn describe_file(file: &VideoFile) -> String {
    format!("{} ({})", file.name, format_bytes(file.size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_size_is_checked_before_format() {
        let config = UploadConfig {
            max_file_size: 100,
            ..Default::default()
        };

        let file = VideoFile::with_size("/tmp/a.txt", "a.txt", 101);
        assert!(matches!(validate_file(&file, &config), Err(VideoError::FileTooLarge { size: 101, max: 100 })));

        let file = VideoFile::with_size("/tmp/a.mp4", "a.mp4", 100);
        assert_eq!(validate_file(&file, &config).unwrap(), VideoFormat::Mp4);
    }

    #[test]
    fn test_format_allow_list() {
        let config = UploadConfig {
            supported_formats: vec![VideoFormat::Mp4],
            ..Default::default()
        };
        let file = VideoFile::with_size("/tmp/a.webm", "a.webm", 1);
        assert!(matches!(validate_file(&file, &config), Err(VideoError::UnsupportedFormat(ext)) if ext == "webm"));
    }

    #[test]
    fn test_queue_admission_requires_video_mime() {
        let config = UploadConfig::default();
        let file = VideoFile::with_size("/tmp/notes.txt", "notes.txt", 1);
        assert!(matches!(validate_queued_file(&file, &config), Err(VideoError::UnsupportedFormat(_))));

        // video mime type, but not on the allow-list
        let file = VideoFile::with_size("/tmp/clip.mkv", "clip.mkv", 1);
        assert!(matches!(validate_queued_file(&file, &config), Err(VideoError::UnsupportedFormat(ext)) if ext == "mkv"));
    }

    #[test]
    fn test_metadata_problems_are_collected() {
        let metadata = UploadMetadata {
            title: " ".to_string(),
            description: "x".repeat(MAX_DESCRIPTION_LENGTH + 1),
            tags: vec!["t".repeat(MAX_TAG_LENGTH + 1)],
            ..Default::default()
        };
        match validate_metadata(&metadata) {
            Err(VideoError::InvalidParameters(problems)) => assert_eq!(problems.len(), 3),
            other => panic!("unexpected result: {:?}", other),
        }

        let metadata = UploadMetadata {
            title: "Inverter commissioning".to_string(),
            tags: vec!["inverter".to_string(); MAX_TAGS],
            ..Default::default()
        };
        assert!(validate_metadata(&metadata).is_ok());
    }

    #[test]
    fn test_metadata_update_checks_present_fields_only() {
        assert!(validate_metadata_update(&MetadataUpdate::default()).is_ok());

        let update = MetadataUpdate {
            title: Some("x".repeat(MAX_TITLE_LENGTH + 1)),
            ..Default::default()
        };
        assert!(validate_metadata_update(&update).is_err());
    }

    #[test]
    fn test_comment_length() {
        assert!(validate_comment("ok").is_ok());
        assert!(validate_comment("").is_err());
        assert!(validate_comment(&"c".repeat(MAX_COMMENT_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_upload_token_payload() {
        let video_id = VideoId::from("video_1");
        let token = generate_upload_token(&video_id, None).unwrap();
        let decoded = BASE64_STANDARD.decode(token).unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(claims["videoId"], "video_1");
        assert_eq!(claims["userId"], "anonymous");
        assert!(claims["timestamp"].as_i64().unwrap() > 0);
    }
}
