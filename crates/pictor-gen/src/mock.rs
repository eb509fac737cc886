//! In-process stand-in for the DashScope task API
//!
//! Accepts submissions, reports PENDING/RUNNING for a configurable number
//! of polls and then serves a solid-colour PNG, all without network access.

use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;

use crate::provider::ImageSize;
use crate::transport::{Header, HttpResponse, Transport, TransportError};

const IMAGE_PREFIX: &str = "mock://images/";

struct MockTask {
    prompt: String,
    size: ImageSize,
    polls: u32,
}

/// Transport that answers DashScope-shaped requests locally
pub struct MockTransport {
    pending_polls: u32,
    failure: Option<String>,
    tasks: RefCell<HashMap<String, MockTask>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            pending_polls: 1,
            failure: None,
            tasks: RefCell::new(HashMap::new()),
        }
    }

    /// Number of polls that report a non-terminal status before the job finishes
    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    /// Make every job end in FAILED with this message
    pub fn with_failure(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    fn submit(&self, headers: &[Header], body: &Value) -> HttpResponse {
        if !has_header(headers, "Authorization", |v| v.starts_with("Bearer ")) {
            return error_response(401, "InvalidApiKey", "No API-key provided.");
        }
        if !has_header(headers, "X-DashScope-Async", |v| v == "enable") {
            return error_response(
                403,
                "AccessDenied",
                "current user api does not support synchronous calls",
            );
        }

        let prompt = body["input"]["messages"][0]["content"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let size = body["parameters"]["size"]
            .as_str()
            .and_then(|s| s.parse::<ImageSize>().ok())
            .unwrap_or_default();

        let task_id = format!("mock-{}", uuid::Uuid::new_v4().simple());
        log::debug!("Mock accepted task {}", task_id);
        self.tasks.borrow_mut().insert(
            task_id.clone(),
            MockTask {
                prompt,
                size,
                polls: 0,
            },
        );

        HttpResponse::json(
            200,
            &json!({
                "request_id": uuid::Uuid::new_v4().to_string(),
                "output": { "task_id": task_id, "task_status": "PENDING" }
            }),
        )
    }

    fn status(&self, task_id: &str) -> HttpResponse {
        let mut tasks = self.tasks.borrow_mut();
        let Some(task) = tasks.get_mut(task_id) else {
            return error_response(404, "NotFound", "task not found");
        };
        task.polls += 1;

        let output = if task.polls <= self.pending_polls {
            let status = if task.polls == 1 { "PENDING" } else { "RUNNING" };
            json!({ "task_id": task_id, "task_status": status })
        } else if let Some(message) = &self.failure {
            json!({ "task_id": task_id, "task_status": "FAILED", "message": message })
        } else {
            json!({
                "task_id": task_id,
                "task_status": "SUCCEEDED",
                "choices": [{
                    "finish_reason": "stop",
                    "message": {
                        "role": "assistant",
                        "content": [
                            { "type": "image", "image": format!("{}{}.png", IMAGE_PREFIX, task_id) }
                        ]
                    }
                }]
            })
        };

        HttpResponse::json(200, &json!({ "output": output }))
    }

    fn image(&self, task_id: &str) -> HttpResponse {
        let tasks = self.tasks.borrow();
        let Some(task) = tasks.get(task_id) else {
            return HttpResponse::new(404, "not found");
        };
        match solid_png(&task.prompt, task.size) {
            Ok(bytes) => HttpResponse::new(200, bytes),
            Err(message) => HttpResponse::new(500, message),
        }
    }
}

impl Transport for MockTransport {
    fn post_json(
        &self,
        _url: &str,
        headers: &[Header],
        body: &Value,
    ) -> Result<HttpResponse, TransportError> {
        Ok(self.submit(headers, body))
    }

    fn get(&self, url: &str, _headers: &[Header]) -> Result<HttpResponse, TransportError> {
        if let Some(name) = url.strip_prefix(IMAGE_PREFIX) {
            return Ok(self.image(name.trim_end_matches(".png")));
        }
        match url.rsplit_once('/') {
            Some((_, task_id)) if !task_id.is_empty() => Ok(self.status(task_id)),
            _ => Ok(HttpResponse::new(404, "not found")),
        }
    }
}

fn has_header(headers: &[Header], name: &str, check: impl Fn(&str) -> bool) -> bool {
    headers
        .iter()
        .any(|(k, v)| k.eq_ignore_ascii_case(name) && check(v))
}

fn error_response(status: u16, code: &str, message: &str) -> HttpResponse {
    HttpResponse::json(status, &json!({ "code": code, "message": message }))
}

/// Solid-colour PNG whose colour is derived from the prompt
fn solid_png(prompt: &str, size: ImageSize) -> Result<Vec<u8>, String> {
    let hash_val = prompt
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    let r = ((hash_val >> 16) & 0xFF) as u8;
    let g = ((hash_val >> 8) & 0xFF) as u8;
    let b = (hash_val & 0xFF) as u8;

    let img = image::RgbaImage::from_pixel(size.width, size.height, image::Rgba([r, g, b, 255]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| format!("Failed to encode PNG: {}", e))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AsyncJobClient, PollPolicy};
    use crate::job::JobStatus;
    use crate::provider::GenerationRequest;
    use crate::providers::dashscope::DashScopeProvider;
    use crate::test_support::RecordingSleeper;
    use pictor_core::PictorError;
    use std::time::Duration;

    fn client<'a>(
        transport: &'a MockTransport,
        sleeper: &'a RecordingSleeper,
    ) -> AsyncJobClient<&'a MockTransport, &'a RecordingSleeper> {
        AsyncJobClient::with_transport(Box::new(DashScopeProvider::new("sk-mock")), transport)
            .with_sleeper(sleeper)
            .with_policy(PollPolicy::new(10, Duration::from_millis(1)))
    }

    #[test]
    fn test_mock_walks_through_statuses() {
        let transport = MockTransport::new().with_pending_polls(2);
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let request = GenerationRequest::new("teal sky").unwrap();
        let job_id = client.submit(&request).unwrap();
        assert!(job_id.starts_with("mock-"));

        assert_eq!(client.poll(&job_id).unwrap().status(), JobStatus::Pending);
        assert_eq!(client.poll(&job_id).unwrap().status(), JobStatus::Running);
        let done = client.poll(&job_id).unwrap();
        assert_eq!(done.status(), JobStatus::Succeeded);
        assert!(done.artifact().unwrap().as_str().starts_with("mock://images/"));
    }

    #[test]
    fn test_mock_serves_image_of_requested_size() {
        let transport = MockTransport::new();
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let request = GenerationRequest::new("teal sky")
            .unwrap()
            .with_size(ImageSize::new(16, 8));
        let job_id = client.submit(&request).unwrap();
        let artifact = client
            .await_completion(&job_id, 5, Duration::from_millis(1))
            .unwrap();
        let bytes = client.fetch(&artifact).unwrap();

        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (16, 8));
        assert_eq!(sleeper.count(), 2);
    }

    #[test]
    fn test_mock_failure() {
        let transport = MockTransport::new().with_failure("content moderation");
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let job_id = client
            .submit(&GenerationRequest::new("x").unwrap())
            .unwrap();
        let err = client
            .await_completion(&job_id, 5, Duration::from_millis(1))
            .unwrap_err();
        assert_eq!(err.job_message(), Some("content moderation"));
    }

    #[test]
    fn test_mock_rejects_synchronous_submission() {
        let transport = MockTransport::new();
        let body = json!({ "input": { "messages": [] } });
        let response = transport
            .post_json("http://x", &[("Authorization", "Bearer k".to_string())], &body)
            .unwrap();
        assert_eq!(response.status, 403);
    }

    #[test]
    fn test_mock_unknown_task() {
        let transport = MockTransport::new();
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);
        assert!(matches!(client.poll("nope"), Err(PictorError::Poll(_))));
        assert_eq!(
            transport.get("mock://images/nope.png", &[]).unwrap().status,
            404
        );
    }
}
