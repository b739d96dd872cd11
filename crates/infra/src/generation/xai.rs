//! xAI video generation client over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use vidgen_core::{NewJob, RequestId};

use super::client::{GenerationApi, GenerationError, MODERATION_REJECTED, PollResult, truncate_chars};

pub const MODEL: &str = "grok-imagine-video";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Upstream bodies are clipped to this many characters in errors and logs.
const BODY_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct XaiGenerationClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    request_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct PollResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    video: Option<VideoInfo>,
}

#[derive(Debug, Deserialize)]
struct VideoInfo {
    #[serde(default)]
    url: Option<String>,
}

impl XaiGenerationClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Request body for `POST /videos/generations`.
///
/// `aspect_ratio` is omitted for `auto`; `image` only when a source image is set.
pub fn submit_body(job: &NewJob) -> Value {
    let mut body = json!({
        "model": MODEL,
        "prompt": job.prompt,
        "duration": job.params.duration.secs(),
        "resolution": job.params.resolution.as_str(),
    });
    if !job.params.aspect_ratio.is_auto() {
        body["aspect_ratio"] = json!(job.params.aspect_ratio.as_str());
    }
    if let Some(image) = &job.source_image {
        body["image"] = json!({ "url": image.as_str() });
    }
    body
}

/// Map one poll response onto a [`PollResult`].
pub fn classify_poll(status: StatusCode, body: &str) -> PollResult {
    if status == StatusCode::BAD_REQUEST {
        if body.to_lowercase().contains("content moderation") {
            return PollResult::Rejected {
                reason: MODERATION_REJECTED.to_string(),
            };
        }
        return PollResult::Transient {
            status: status.as_u16(),
            body: body.to_string(),
        };
    }

    if !status.is_success() {
        return PollResult::Fatal {
            detail: format!(
                "API error {}: {}",
                status.as_u16(),
                truncate_chars(body, 200)
            ),
        };
    }

    let parsed: PollResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            return PollResult::Fatal {
                detail: format!("invalid poll response: {e}"),
            };
        }
    };

    let video_url = parsed
        .video
        .and_then(|v| v.url)
        .filter(|url| !url.is_empty());

    match (parsed.status.as_deref(), video_url) {
        (_, Some(video_url)) => PollResult::Ready { video_url },
        (Some("pending"), None) => PollResult::StillPending,
        (Some("done"), None) => PollResult::Fatal {
            detail: "generation finished without a video url".to_string(),
        },
        (Some("expired"), None) => PollResult::Expired,
        (Some("failed"), None) => PollResult::Fatal {
            detail: "generation failed upstream".to_string(),
        },
        (other, None) => {
            warn!(status = ?other, "unrecognized upstream status; treating as pending");
            PollResult::StillPending
        }
    }
}

#[async_trait]
impl GenerationApi for XaiGenerationClient {
    #[instrument(skip(self, job), fields(duration = job.params.duration.secs(), aspect_ratio = job.params.aspect_ratio.as_str(), has_image = job.source_image.is_some()), err)]
    async fn submit(&self, job: &NewJob) -> Result<RequestId, GenerationError> {
        let response = self
            .http
            .post(self.url("/videos/generations"))
            .bearer_auth(&self.api_key)
            .json(&submit_body(job))
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                body: truncate_chars(&text, BODY_PREVIEW_CHARS).to_string(),
            });
        }

        let parsed: SubmitResponse = serde_json::from_str(&text)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
        let request_id = RequestId::parse(parsed.request_id)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        info!(request_id = %request_id, "generation submitted");
        Ok(request_id)
    }

    #[instrument(skip(self), fields(request_id = %request_id))]
    async fn poll(&self, request_id: &RequestId) -> PollResult {
        let response = match self
            .http
            .get(self.url(&format!("/videos/{}", request_id.as_str())))
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return PollResult::Fatal {
                    detail: e.to_string(),
                };
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return PollResult::Fatal {
                    detail: e.to_string(),
                };
            }
        };

        let result = classify_poll(status, &text);
        if status.is_success() {
            debug!(outcome = result.kind(), "poll response");
        } else {
            warn!(
                http_status = status.as_u16(),
                outcome = result.kind(),
                body = truncate_chars(&text, BODY_PREVIEW_CHARS),
                "poll returned an error status"
            );
        }
        result
    }

    #[instrument(skip(self, video_url), err)]
    async fn fetch_artifact(&self, video_url: &str) -> Result<Vec<u8>, GenerationError> {
        let response = self
            .http
            .get(video_url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                body: truncate_chars(&text, BODY_PREVIEW_CHARS).to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;
        debug!(bytes = bytes.len(), "artifact downloaded");
        Ok(bytes.to_vec())
    }
}
