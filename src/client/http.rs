use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use url::Url;
use crate::config::Config;
use crate::core::{
    ChunkUpload,
    CreateSessionRequest,
    DirectUpload,
    MetadataUpdate,
    ProcessingStatus,
    ProgressCallback,
    Result,
    SessionId,
    UploadResult,
    UploadSession,
    VideoApi,
    VideoError,
    VideoId,
    VideoMetadata,
};
use crate::utils::ProgressStream;

const UPLOAD_TOKEN_HEADER: &str = "X-Upload-Token";

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct SessionEnvelope {
    session: UploadSession,
}

#[derive(Deserialize)]
struct ResultEnvelope {
    result: UploadResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunksEnvelope {
    #[serde(default)]
    uploaded_chunks: Vec<u32>,
}

#[derive(Deserialize)]
struct MetadataEnvelope {
    metadata: VideoMetadata,
}

/// `VideoApi` over the REST endpoints of the video service
#[derive(Debug, Clone)]
pub struct HttpVideoApi {
    client: Client,
    base_url: Url,
}

impl HttpVideoApi {
    pub fn new(endpoint: &str, token: &str) -> Result<Self> {
        Self::with_client(endpoint, token, Client::builder())
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let builder = Client::builder().timeout(config.upload.request_timeout);
        Self::with_client(&config.endpoint, &config.token, builder)
    }

    fn with_client(endpoint: &str, token: &str, builder: reqwest::ClientBuilder) -> Result<Self> {
        // join() drops the last path segment without a trailing slash
        let mut base_url = Url::parse(endpoint)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        if !token.is_empty() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|err| VideoError::ConfigError(format!("Invalid token: {}", err)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = builder.default_headers(headers).build()?;
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn send(request: RequestBuilder, action: &str) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            format!("Failed to {}", action)
        } else {
            format!("Failed to {}: {}", action, body)
        };
        Err(VideoError::server_error(status.as_u16(), message))
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder, action: &str) -> Result<T> {
        let response = Self::send(request, action).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl VideoApi for HttpVideoApi {
    async fn upload_direct(&self, upload: DirectUpload<'_>, on_progress: ProgressCallback) -> Result<UploadResult> {
        let file = File::open(&upload.file.path).await?;
        let size = upload.file.size;
        let stream = ProgressStream::new(ReaderStream::new(file), size, on_progress);

        let video = Part::stream_with_length(Body::wrap_stream(stream), size)
            .file_name(upload.file.name.clone())
            .mime_str(&upload.file.mime_type)?;
        let form = Form::new()
            .part("video", video)
            .text("videoId", upload.video_id.to_string())
            .text("uploadToken", upload.upload_token.to_string())
            .text("metadata", serde_json::to_string(upload.metadata)?);

        let request = self
            .client
            .post(self.url("api/videos/upload")?)
            .header(UPLOAD_TOKEN_HEADER, upload.upload_token)
            .multipart(form);

        let envelope: DataEnvelope<UploadResult> = Self::send_json(request, "upload video").await?;
        Ok(envelope.data)
    }

    async fn create_session(&self, request: &CreateSessionRequest, upload_token: &str) -> Result<UploadSession> {
        let request = self
            .client
            .post(self.url("api/videos/upload/session")?)
            .header(UPLOAD_TOKEN_HEADER, upload_token)
            .json(request);

        let envelope: SessionEnvelope = Self::send_json(request, "create upload session").await?;
        Ok(envelope.session)
    }

    async fn upload_chunk(&self, chunk: ChunkUpload, upload_token: &str) -> Result<()> {
        let index = chunk.chunk_index;
        let form = Form::new()
            .text("sessionId", chunk.session_id.to_string())
            .text("chunkIndex", chunk.chunk_index.to_string())
            .text("totalChunks", chunk.total_chunks.to_string())
            .text("checksum", chunk.checksum)
            .part("chunk", Part::stream(Body::from(chunk.data)).file_name("blob"));

        let request = self
            .client
            .post(self.url("api/videos/upload/chunk")?)
            .header(UPLOAD_TOKEN_HEADER, upload_token)
            .multipart(form);

        Self::send(request, &format!("upload chunk {}", index)).await?;
        Ok(())
    }

    async fn finalize(&self, session_id: &SessionId, upload_token: &str) -> Result<UploadResult> {
        let request = self
            .client
            .post(self.url("api/videos/upload/finalize")?)
            .header(UPLOAD_TOKEN_HEADER, upload_token)
            .json(&serde_json::json!({ "sessionId": session_id }));

        let envelope: ResultEnvelope = Self::send_json(request, "finalize upload").await?;
        Ok(envelope.result)
    }

    async fn uploaded_chunks(&self, session_id: &SessionId) -> Result<Vec<u32>> {
        let url = self.url(&format!("api/videos/upload/session/{}/chunks", session_id))?;
        let envelope: ChunksEnvelope = Self::send_json(self.client.get(url), "get uploaded chunks").await?;
        Ok(envelope.uploaded_chunks)
    }

    async fn cancel_session(&self, session_id: &SessionId) -> Result<()> {
        let url = self.url(&format!("api/videos/upload/session/{}/cancel", session_id))?;
        Self::send(self.client.delete(url), "cancel upload").await?;
        Ok(())
    }

    async fn processing_status(&self, video_id: &VideoId) -> Result<ProcessingStatus> {
        let url = self.url(&format!("api/videos/{}/processing", video_id))?;
        Self::send_json(self.client.get(url), "get processing status").await
    }

    async fn get_metadata(&self, video_id: &VideoId) -> Result<VideoMetadata> {
        let url = self.url(&format!("api/videos/{}/metadata", video_id))?;
        let envelope: MetadataEnvelope = Self::send_json(self.client.get(url), "get video metadata").await?;
        Ok(envelope.metadata)
    }

    async fn update_metadata(&self, video_id: &VideoId, update: &MetadataUpdate) -> Result<VideoMetadata> {
        let url = self.url(&format!("api/videos/{}/metadata", video_id))?;
        let request = self.client.put(url).json(update);
        let envelope: MetadataEnvelope = Self::send_json(request, "update video metadata").await?;
        Ok(envelope.metadata)
    }

    async fn delete_video(&self, video_id: &VideoId) -> Result<()> {
        let url = self.url(&format!("api/videos/{}", video_id))?;
        Self::send(self.client.delete(url), "delete video").await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        Self::send(self.client.get(self.url("api/health")?), "check health").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_paths_keep_base_prefix() {
        let api = HttpVideoApi::new("https://crm.example.com/training", "secret").unwrap();
        assert_eq!(
            api.url("api/videos/upload/chunk").unwrap().as_str(),
            "https://crm.example.com/training/api/videos/upload/chunk"
        );

        let api = HttpVideoApi::new("http://localhost:3000", "").unwrap();
        assert_eq!(api.url("api/health").unwrap().as_str(), "http://localhost:3000/api/health");
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(matches!(HttpVideoApi::new("not a url", "t"), Err(VideoError::ConfigError(_))));
    }

    #[test]
    fn test_response_envelopes() {
        let chunks: ChunksEnvelope = serde_json::from_str(r#"{"uploadedChunks":[0,2]}"#).unwrap();
        assert_eq!(chunks.uploaded_chunks, vec![0, 2]);

        let chunks: ChunksEnvelope = serde_json::from_str("{}").unwrap();
        assert!(chunks.uploaded_chunks.is_empty());

        let result: ResultEnvelope = serde_json::from_str(
            r#"{"result":{"videoId":"video_1","uploadUrl":"https://cdn/v.mp4","processingStatus":"processing","estimatedProcessingTime":30,"thumbnailUrls":[]}}"#,
        )
        .unwrap();
        assert_eq!(result.result.video_id, VideoId::from("video_1"));
        assert_eq!(result.result.estimated_processing_time, 30);
    }
}
