//! Zhipu (BigModel) asynchronous image generation provider

use crate::client::PollPolicy;
use crate::config::PictorConfig;
use crate::job::{ArtifactRef, Job, JobState};
use crate::provider::*;
use crate::transport::Header;
use log::{debug, warn};
use pictor_core::{PictorError, Result};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str =
    "https://open.bigmodel.cn/api/paas/v4/async/images/generations";
pub const DEFAULT_TASK_ENDPOINT: &str = "https://open.bigmodel.cn/api/paas/v4/async/tasks";
pub const DEFAULT_MODEL: &str = "cogview-4";

const POLL_INTERVAL_SECS: u64 = 3;

/// Zhipu provider (CogView models)
pub struct ZhipuProvider {
    api_key: String,
    endpoint: String,
    task_endpoint: String,
    model: String,
}

impl ZhipuProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            task_endpoint: DEFAULT_TASK_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn from_config(config: &PictorConfig) -> Result<Self> {
        let api_key = config.api_key("zhipu").ok_or_else(|| {
            PictorError::Config(
                "Zhipu API key not configured. Set ZHIPU_API_KEY or add to .pictor/config.toml"
                    .to_string(),
            )
        })?;

        let mut provider = Self::new(api_key);
        if let Some(endpoint) = config.endpoint("zhipu") {
            provider.endpoint = endpoint.to_string();
        }
        if let Some(task_endpoint) = config.task_endpoint("zhipu") {
            provider.task_endpoint = task_endpoint.trim_end_matches('/').to_string();
        }
        if let Some(model) = config.model("zhipu") {
            provider.model = model.to_string();
        }
        Ok(provider)
    }
}

impl ImageProvider for ZhipuProvider {
    fn name(&self) -> &str {
        "zhipu"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_submission(&self, request: &GenerationRequest) -> SubmitCall {
        if request.count() > 1 {
            debug!("Zhipu returns one image per task, ignoring count {}", request.count());
        }

        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": request.prompt(),
            "size": request.size().to_descriptor('x'),
            "quality": "hd",
            "watermark_enabled": true
        });
        if let Some(negative) = request.negative_prompt() {
            body["negative_prompt"] = serde_json::json!(negative);
        }

        let mut headers = self.auth_headers();
        headers.push(("Content-Type", "application/json".to_string()));

        SubmitCall {
            url: self.endpoint.clone(),
            headers,
            body,
        }
    }

    fn parse_submission(&self, body: &[u8]) -> Result<String> {
        let response: SubmitResponse = serde_json::from_slice(body).map_err(|e| {
            PictorError::Submission(format!("Invalid Zhipu submit response: {}", e))
        })?;
        response
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                PictorError::Submission("Zhipu submit response did not contain id".to_string())
            })
    }

    fn status_url(&self, job_id: &str) -> String {
        format!("{}/{}", self.task_endpoint, job_id)
    }

    fn auth_headers(&self) -> Vec<Header> {
        vec![("Authorization", format!("Bearer {}", self.api_key))]
    }

    fn parse_status(&self, job_id: &str, body: &[u8]) -> Result<Job> {
        let response: TaskResponse = serde_json::from_slice(body).map_err(|e| {
            PictorError::Poll(format!("Invalid Zhipu task response for {}: {}", job_id, e))
        })?;

        let artifacts: Vec<ArtifactRef> = response
            .image_result
            .iter()
            .flatten()
            .filter_map(|r| r.url.as_deref())
            .filter(|url| !url.is_empty())
            .map(ArtifactRef::new)
            .collect();

        let state = match response.task_status.as_deref() {
            Some("FAIL") => JobState::Failed {
                message: response
                    .error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "Unknown error".to_string()),
            },
            _ if !artifacts.is_empty() => JobState::Succeeded { artifacts },
            Some("SUCCESS") => JobState::Succeeded { artifacts },
            Some("PROCESSING") => JobState::Running,
            Some(other) => {
                warn!("Zhipu job {} reported unrecognised status '{}'", job_id, other);
                JobState::Running
            }
            None => {
                debug!("Zhipu job {} has no task_status yet", job_id);
                JobState::Running
            }
        };

        Ok(Job::new(job_id, state))
    }

    fn default_poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            crate::client::DEFAULT_MAX_ATTEMPTS,
            Duration::from_secs(POLL_INTERVAL_SECS),
        )
    }
}

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct TaskResponse {
    #[serde(default)]
    task_status: Option<String>,
    #[serde(default)]
    image_result: Option<Vec<ImageResult>>,
    #[serde(default)]
    error: Option<TaskError>,
}

#[derive(Deserialize)]
struct ImageResult {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct TaskError {
    #[serde(default)]
    message: Option<String>,
}
