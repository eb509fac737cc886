//! DashScope text-to-image provider
//!
//! Submits to the image-generation service with `X-DashScope-Async: enable`
//! and polls the shared task endpoint. Finished jobs carry their images as
//! typed content items under `output.choices[].message.content`.

use crate::config::PictorConfig;
use crate::job::{ArtifactRef, Job, JobState};
use crate::provider::*;
use crate::transport::Header;
use log::{debug, warn};
use pictor_core::{PictorError, Result};
use serde::Deserialize;

pub const DEFAULT_ENDPOINT: &str =
    "https://dashscope.aliyuncs.com/api/v1/services/aigc/image-generation/generation";
pub const DEFAULT_TASK_ENDPOINT: &str = "https://dashscope.aliyuncs.com/api/v1/tasks";
pub const DEFAULT_MODEL: &str = "wan2.6-t2i";

const ASYNC_HEADER: &str = "X-DashScope-Async";

/// DashScope provider (wan text-to-image models)
pub struct DashScopeProvider {
    api_key: String,
    endpoint: String,
    task_endpoint: String,
    model: String,
}

impl DashScopeProvider {
    /// Provider with documented default endpoints and model
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            task_endpoint: DEFAULT_TASK_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a new DashScopeProvider from config
    pub fn from_config(config: &PictorConfig) -> Result<Self> {
        let api_key = config.api_key("dashscope").ok_or_else(|| {
            PictorError::Config(
                "DashScope API key not configured. Set DASHSCOPE_API_KEY or add to .pictor/config.toml".to_string(),
            )
        })?;

        let mut provider = Self::new(api_key);
        if let Some(endpoint) = config.endpoint("dashscope") {
            provider = provider.with_endpoint(endpoint);
        }
        if let Some(task_endpoint) = config.task_endpoint("dashscope") {
            provider = provider.with_task_endpoint(task_endpoint);
        }
        if let Some(model) = config.model("dashscope") {
            provider = provider.with_model(model);
        }
        Ok(provider)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Trailing slashes are dropped so status URLs join cleanly
    pub fn with_task_endpoint(mut self, task_endpoint: impl Into<String>) -> Self {
        self.task_endpoint = task_endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn build_payload(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "model": self.model,
            "input": {
                "messages": [{
                    "role": "user",
                    "content": [{ "text": request.prompt() }]
                }]
            },
            "parameters": {
                "size": request.size().to_descriptor('*'),
                "max_images": request.count(),
                "enable_interleave": true
            }
        });

        if let Some(negative) = request.negative_prompt() {
            payload["parameters"]["negative_prompt"] = serde_json::json!(negative);
        }

        payload
    }
}

impl ImageProvider for DashScopeProvider {
    fn name(&self) -> &str {
        "dashscope"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_submission(&self, request: &GenerationRequest) -> SubmitCall {
        let mut headers = self.auth_headers();
        headers.push(("Content-Type", "application/json".to_string()));
        headers.push((ASYNC_HEADER, "enable".to_string()));

        SubmitCall {
            url: self.endpoint.clone(),
            headers,
            body: self.build_payload(request),
        }
    }

    fn parse_submission(&self, body: &[u8]) -> Result<String> {
        parse_submit_response(body)
    }

    fn status_url(&self, job_id: &str) -> String {
        format!("{}/{}", self.task_endpoint, job_id)
    }

    fn auth_headers(&self) -> Vec<Header> {
        vec![("Authorization", format!("Bearer {}", self.api_key))]
    }

    fn parse_status(&self, job_id: &str, body: &[u8]) -> Result<Job> {
        parse_task_response(job_id, body)
    }
}

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    output: Option<SubmitOutput>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct SubmitOutput {
    #[serde(default)]
    task_id: Option<String>,
}

#[derive(Deserialize)]
struct TaskResponse {
    #[serde(default)]
    output: Option<TaskOutput>,
}

#[derive(Deserialize)]
struct TaskOutput {
    #[serde(default)]
    task_status: Option<String>,
    /// Only read on SUCCEEDED; other statuses may send null
    #[serde(default)]
    choices: Option<Vec<Choice>>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<ChoiceContent>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChoiceContent {
    Items(Vec<ContentItem>),
    Text(String),
}

#[derive(Deserialize)]
struct ContentItem {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    image: Option<String>,
}

/// Extract `output.task_id` from a submission body
pub fn parse_submit_response(body: &[u8]) -> Result<String> {
    let response: SubmitResponse = serde_json::from_slice(body).map_err(|e| {
        PictorError::Submission(format!("Invalid DashScope submit response: {}", e))
    })?;

    let task_id = response
        .output
        .and_then(|o| o.task_id)
        .filter(|id| !id.trim().is_empty());

    task_id.ok_or_else(|| {
        let detail = match (response.code, response.message) {
            (Some(code), Some(message)) => format!(" ({}: {})", code, message),
            (None, Some(message)) => format!(" ({})", message),
            _ => String::new(),
        };
        PictorError::Submission(format!(
            "DashScope submit response did not contain output.task_id{}",
            detail
        ))
    })
}

/// Decode a task status body into a job snapshot
pub fn parse_task_response(job_id: &str, body: &[u8]) -> Result<Job> {
    let response: TaskResponse = serde_json::from_slice(body).map_err(|e| {
        PictorError::Poll(format!("Invalid DashScope task response for {}: {}", job_id, e))
    })?;

    let output = response.output.ok_or_else(|| {
        PictorError::Poll(format!("DashScope task response for {} has no output", job_id))
    })?;
    let status = output.task_status.as_deref().ok_or_else(|| {
        PictorError::Poll(format!(
            "DashScope task response for {} has no output.task_status",
            job_id
        ))
    })?;

    let state = match status {
        "PENDING" => JobState::Pending,
        "RUNNING" => JobState::Running,
        "SUCCEEDED" => {
            let artifacts = image_urls(output.choices.as_deref().unwrap_or_default());
            if artifacts.is_empty() {
                warn!("DashScope job {} succeeded without an image item", job_id);
                debug!("Task response: {}", String::from_utf8_lossy(body));
            }
            JobState::Succeeded { artifacts }
        }
        "FAILED" => JobState::Failed {
            message: output
                .message
                .unwrap_or_else(|| "Unknown error".to_string()),
        },
        other => {
            warn!("DashScope job {} reported unrecognised status '{}'", job_id, other);
            JobState::Running
        }
    };

    Ok(Job::new(job_id, state))
}

/// Every `type == "image"` item with a non-empty URL, across all choices
fn image_urls(choices: &[Choice]) -> Vec<ArtifactRef> {
    choices
        .iter()
        .filter_map(|c| c.message.as_ref())
        .filter_map(|m| match &m.content {
            Some(ChoiceContent::Items(items)) => Some(items),
            _ => None,
        })
        .flatten()
        .filter(|item| item.kind.as_deref() == Some("image"))
        .filter_map(|item| item.image.as_deref())
        .filter(|url| !url.is_empty())
        .map(ArtifactRef::new)
        .collect()
}
