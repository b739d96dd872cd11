use serde::Deserialize;

use vidgen_core::{Job, VideoDuration};
use vidgen_infra::jobs::{GenerationRequest, Page};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default = "default_duration")]
    pub duration: i64,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_resolution")]
    pub resolution: String,
}

fn default_duration() -> i64 {
    i64::from(VideoDuration::DEFAULT_SECS)
}

fn default_aspect_ratio() -> String {
    "auto".to_string()
}

fn default_resolution() -> String {
    "720p".to_string()
}

impl From<GenerateRequest> for GenerationRequest {
    fn from(req: GenerateRequest) -> Self {
        GenerationRequest {
            prompt: req.prompt,
            // An empty string means "no image".
            image: req.image_data.filter(|s| !s.is_empty()),
            duration: req.duration,
            aspect_ratio: req.aspect_ratio,
            resolution: req.resolution,
        }
    }
}

/// `limit=0` (or no limit) lists everything.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl ListQuery {
    pub fn page(&self) -> Page {
        Page {
            limit: (self.limit > 0).then_some(self.limit),
            offset: self.offset,
        }
    }
}

// -------------------------
// Response mapping
// -------------------------

pub fn job_to_json(job: &Job) -> serde_json::Value {
    serde_json::json!({
        "id": job.id.get(),
        "request_id": job.request_id.as_str(),
        "prompt": job.prompt,
        "duration": job.params.duration.secs(),
        "aspect_ratio": job.params.aspect_ratio.as_str(),
        "resolution": job.params.resolution.as_str(),
        "status": job.status().as_str(),
        "video_filename": job.video_filename(),
        "error_message": job.error_message(),
        "created_at": job.created_at.to_rfc3339(),
        "has_image": job.has_source_image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vidgen_core::{GenerationParams, JobId, JobOutcome, RequestId};

    #[test]
    fn generate_request_defaults() {
        let req: GenerateRequest = serde_json::from_str(r#"{"prompt":"a cat","image_data":""}"#).unwrap();
        let request = GenerationRequest::from(req);
        assert_eq!(request.duration, 15);
        assert_eq!(request.aspect_ratio, "auto");
        assert_eq!(request.resolution, "720p");
        assert_eq!(request.image, None);
    }

    #[test]
    fn zero_limit_means_everything() {
        assert_eq!(ListQuery::default().page(), Page::all());
        let q = ListQuery { limit: 10, offset: 20 };
        assert_eq!(q.page(), Page::new(10, 20));
    }

    #[test]
    fn job_json_shape() {
        let job = Job {
            id: JobId::new(7),
            request_id: RequestId::parse("abc123").unwrap(),
            prompt: "a cat skateboarding".to_string(),
            has_source_image: false,
            params: GenerationParams::default(),
            outcome: Some(JobOutcome::done("abc123.mp4")),
            created_at: Utc::now(),
        };
        let json = job_to_json(&job);
        assert_eq!(json["id"], 7);
        assert_eq!(json["status"], "done");
        assert_eq!(json["video_filename"], "abc123.mp4");
        assert!(json["error_message"].is_null());
        assert_eq!(json["aspect_ratio"], "auto");
        assert_eq!(json["has_image"], false);
    }
}
