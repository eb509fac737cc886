//! Asynchronous job client: submit, poll, wait, fetch
//!
//! One client handles one job at a time, end to end, on the calling thread.
//! Nothing is retried: every transport failure or non-2xx status surfaces
//! as the error variant of the step that hit it.

use log::{debug, info, warn};
use pictor_core::{PictorError, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::artifact::{write_artifact, SavedArtifact};
use crate::job::{ArtifactRef, Job, JobState};
use crate::provider::{GenerationRequest, ImageProvider};
use crate::transport::{Transport, UreqTransport};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Bounded fixed-delay polling schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        )
    }
}

/// Suspends the calling thread between polls
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Everything a one-shot generation produced
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub job_id: String,
    pub provider: String,
    pub model: String,
    pub prompt_length: usize,
    pub images: Vec<SavedArtifact>,
}

/// Client for a provider's asynchronous task API
pub struct AsyncJobClient<T = UreqTransport, S = ThreadSleeper> {
    provider: Box<dyn ImageProvider>,
    transport: T,
    sleeper: S,
    policy: PollPolicy,
}

impl AsyncJobClient {
    /// Client over HTTP with the provider's default poll policy
    pub fn new(provider: Box<dyn ImageProvider>) -> Self {
        Self::with_transport(provider, UreqTransport::new())
    }
}

impl<T: Transport> AsyncJobClient<T, ThreadSleeper> {
    pub fn with_transport(provider: Box<dyn ImageProvider>, transport: T) -> Self {
        let policy = provider.default_poll_policy();
        Self {
            provider,
            transport,
            sleeper: ThreadSleeper,
            policy,
        }
    }
}

impl<T: Transport, S: Sleeper> AsyncJobClient<T, S> {
    /// Replace the sleep function used between polls
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> AsyncJobClient<T, S2> {
        AsyncJobClient {
            provider: self.provider,
            transport: self.transport,
            sleeper,
            policy: self.policy,
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn provider(&self) -> &dyn ImageProvider {
        self.provider.as_ref()
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Submit a request in asynchronous mode and return the job ID
    pub fn submit(&self, request: &GenerationRequest) -> Result<String> {
        request.validate()?;
        let name = self.provider.name();
        let call = self.provider.build_submission(request);

        debug!("Submit endpoint: {}", call.url);
        debug!(
            "Submit model: {}, prompt length: {}",
            self.provider.model(),
            request.prompt_length()
        );

        let response = self
            .transport
            .post_json(&call.url, &call.headers, &call.body)
            .map_err(|e| PictorError::Submission(format!("{} request failed: {}", name, e)))?;

        if !response.is_success() {
            return Err(PictorError::Submission(format!(
                "{} returned HTTP {}: {}",
                name,
                response.status,
                response.text().trim()
            )));
        }

        let job_id = self.provider.parse_submission(&response.body)?;
        if job_id.trim().is_empty() {
            return Err(PictorError::Submission(format!(
                "{} returned an empty job ID",
                name
            )));
        }

        info!("Submitted {} job {}", name, job_id);
        Ok(job_id)
    }

    /// Perform a single status check
    pub fn poll(&self, job_id: &str) -> Result<Job> {
        let url = self.provider.status_url(job_id);
        let headers = self.provider.auth_headers();

        let response = self.transport.get(&url, &headers).map_err(|e| {
            PictorError::Poll(format!("status request for job {} failed: {}", job_id, e))
        })?;

        if !response.is_success() {
            return Err(PictorError::Poll(format!(
                "status request for job {} returned HTTP {}",
                job_id, response.status
            )));
        }

        self.provider.parse_status(job_id, &response.body)
    }

    /// Poll until the job is terminal and return every artifact it produced.
    ///
    /// Sleeps `interval` before each of at most `max_attempts` polls. The
    /// first terminal status ends the loop.
    pub fn await_artifacts(
        &self,
        job_id: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<Vec<ArtifactRef>> {
        for attempt in 1..=max_attempts {
            self.sleeper.sleep(interval);

            let job = self.poll(job_id)?;
            info!(
                "Job {} status ({}/{}): {}",
                job_id,
                attempt,
                max_attempts,
                job.status()
            );

            match job.state {
                JobState::Pending | JobState::Running => continue,
                JobState::Succeeded { artifacts } => {
                    if artifacts.is_empty() {
                        return Err(PictorError::MalformedResult(format!(
                            "job {} succeeded but returned no image URL",
                            job_id
                        )));
                    }
                    return Ok(artifacts);
                }
                JobState::Failed { message } => {
                    return Err(PictorError::JobFailed {
                        job_id: job_id.to_string(),
                        message,
                    });
                }
            }
        }

        warn!("Job {} still running after {} polls", job_id, max_attempts);
        Err(PictorError::Timeout {
            job_id: job_id.to_string(),
            attempts: max_attempts,
        })
    }

    /// Poll until the job is terminal and return its artifact reference
    pub fn await_completion(
        &self,
        job_id: &str,
        max_attempts: u32,
        interval: Duration,
    ) -> Result<ArtifactRef> {
        self.await_artifacts(job_id, max_attempts, interval)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                PictorError::MalformedResult(format!("job {} has no artifact", job_id))
            })
    }

    /// Download an artifact's bytes
    pub fn fetch(&self, artifact: &ArtifactRef) -> Result<Vec<u8>> {
        info!("Downloading {}", artifact);

        let response = self
            .transport
            .get(artifact.as_str(), &[])
            .map_err(|e| PictorError::Fetch(format!("download of {} failed: {}", artifact, e)))?;

        if !response.is_success() {
            return Err(PictorError::Fetch(format!(
                "download of {} returned HTTP {}",
                artifact, response.status
            )));
        }

        debug!("Downloaded {} bytes", response.body.len());
        Ok(response.body)
    }

    /// Fetch an artifact and write it into `output_dir`.
    /// Nothing is written unless the download succeeded.
    pub fn download(&self, artifact: &ArtifactRef, output_dir: &Path) -> Result<SavedArtifact> {
        let bytes = self.fetch(artifact)?;
        let saved = write_artifact(&bytes, artifact, output_dir)?;
        info!("Image saved to: {}", saved.path.display());
        Ok(saved)
    }

    /// Submit, wait with the client's poll policy, and download every image
    pub fn generate(
        &self,
        request: &GenerationRequest,
        output_dir: &Path,
    ) -> Result<GenerationOutcome> {
        let job_id = self.submit(request)?;
        let artifacts =
            self.await_artifacts(&job_id, self.policy.max_attempts, self.policy.interval)?;

        let images = artifacts
            .iter()
            .map(|artifact| self.download(artifact, output_dir))
            .collect::<Result<Vec<_>>>()?;

        Ok(GenerationOutcome {
            job_id,
            provider: self.provider.name().to_string(),
            model: self.provider.model().to_string(),
            prompt_length: request.prompt_length(),
            images,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::dashscope::DashScopeProvider;
    use crate::test_support::{pending, running, succeeded, RecordingSleeper, ScriptedTransport};
    use crate::transport::{HttpResponse, TransportError};
    use serde_json::json;

    fn client<'a>(
        transport: &'a ScriptedTransport,
        sleeper: &'a RecordingSleeper,
    ) -> AsyncJobClient<&'a ScriptedTransport, &'a RecordingSleeper> {
        let provider = DashScopeProvider::new("sk-test").with_task_endpoint("https://tasks.test/api/v1/tasks/");
        AsyncJobClient::with_transport(Box::new(provider), transport).with_sleeper(sleeper)
    }

    fn temp_dir() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("pictor_client_test_{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_submit_returns_task_id_and_sends_async_header() {
        let transport = ScriptedTransport::new()
            .with_json(200, json!({"output": {"task_id": "task-42", "task_status": "PENDING"}}));
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let request = GenerationRequest::new("a red fox in snow").unwrap();
        let job_id = client.submit(&request).unwrap();
        assert_eq!(job_id, "task-42");

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, "POST");
        assert!(calls[0].header("X-DashScope-Async") == Some("enable"));
        assert_eq!(calls[0].header("Authorization"), Some("Bearer sk-test"));
        let body = calls[0].body.as_ref().unwrap();
        assert_eq!(body["input"]["messages"][0]["content"][0]["text"], "a red fox in snow");
    }

    #[test]
    fn test_submit_non_2xx_is_submission_error() {
        let transport = ScriptedTransport::new().with_response(HttpResponse::new(401, "invalid api key"));
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let err = client.submit(&GenerationRequest::new("x").unwrap()).unwrap_err();
        match err {
            PictorError::Submission(msg) => {
                assert!(msg.contains("401"));
                assert!(msg.contains("invalid api key"));
            }
            other => panic!("expected Submission, got {:?}", other),
        }
    }

    #[test]
    fn test_submit_without_task_id_is_submission_error() {
        let transport = ScriptedTransport::new().with_json(200, json!({"output": {}}));
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let err = client.submit(&GenerationRequest::new("x").unwrap()).unwrap_err();
        assert!(matches!(err, PictorError::Submission(_)));
    }

    #[test]
    fn test_submit_empty_task_id_is_submission_error() {
        let transport = ScriptedTransport::new().with_json(200, json!({"output": {"task_id": ""}}));
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let err = client.submit(&GenerationRequest::new("x").unwrap()).unwrap_err();
        assert!(matches!(err, PictorError::Submission(_)));
    }

    #[test]
    fn test_submit_transport_failure_is_submission_error() {
        let transport = ScriptedTransport::new()
            .with_error(TransportError("connection refused".to_string()));
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let err = client.submit(&GenerationRequest::new("x").unwrap()).unwrap_err();
        assert!(matches!(err, PictorError::Submission(ref m) if m.contains("connection refused")));
    }

    #[test]
    fn test_poll_uses_task_endpoint_without_double_slash() {
        let transport = ScriptedTransport::new().with_json(200, running());
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let job = client.poll("task-9").unwrap();
        assert_eq!(job.state, JobState::Running);

        let calls = transport.calls();
        assert_eq!(calls[0].method, "GET");
        assert_eq!(calls[0].url, "https://tasks.test/api/v1/tasks/task-9");
        assert_eq!(calls[0].header("Authorization"), Some("Bearer sk-test"));
        assert!(sleeper.count() == 0);
    }

    #[test]
    fn test_poll_non_2xx_is_poll_error() {
        let transport = ScriptedTransport::new().with_response(HttpResponse::new(503, "busy"));
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        assert!(matches!(client.poll("t"), Err(PictorError::Poll(_))));
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_await_returns_artifact_after_exactly_three_polls() {
        let transport = ScriptedTransport::new()
            .with_json(200, pending())
            .with_json(200, running())
            .with_json(200, succeeded("https://cdn.test/out.png"))
            // Anything after the terminal status must never be read
            .with_json(200, pending());
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let artifact = client
            .await_completion("task-1", 10, Duration::from_secs(2))
            .unwrap();
        assert_eq!(artifact.as_str(), "https://cdn.test/out.png");
        assert_eq!(transport.count("GET"), 3);
        assert_eq!(sleeper.count(), 3);
        assert!(sleeper.sleeps().iter().all(|d| *d == Duration::from_secs(2)));
    }

    #[test]
    fn test_await_times_out_after_exactly_n_polls() {
        let mut transport = ScriptedTransport::new();
        for _ in 0..6 {
            transport = transport.with_json(200, pending());
        }
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let err = client
            .await_completion("task-slow", 5, Duration::from_millis(10))
            .unwrap_err();
        match err {
            PictorError::Timeout { job_id, attempts } => {
                assert_eq!(job_id, "task-slow");
                assert_eq!(attempts, 5);
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert_eq!(transport.count("GET"), 5);
        assert_eq!(sleeper.count(), 5);
    }

    #[test]
    fn test_await_failed_job_passes_message_through() {
        let transport = ScriptedTransport::new()
            .with_json(200, pending())
            .with_json(200, json!({"output": {"task_status": "FAILED", "message": "quota exceeded"}}))
            .with_json(200, succeeded("https://never.test/x.png"));
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let err = client
            .await_completion("task-q", 10, Duration::ZERO)
            .unwrap_err();
        assert_eq!(err.job_message(), Some("quota exceeded"));
        assert_eq!(transport.count("GET"), 2);
    }

    #[test]
    fn test_await_success_without_image_is_malformed() {
        let transport = ScriptedTransport::new().with_json(
            200,
            json!({"output": {
                "task_status": "SUCCEEDED",
                "choices": [{"message": {"content": [{"type": "text", "text": "here you go"}]}}]
            }}),
        );
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let err = client
            .await_completion("task-m", 3, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, PictorError::MalformedResult(_)));
        assert_eq!(transport.count("GET"), 1);
    }

    #[test]
    fn test_await_poll_error_aborts_loop() {
        let transport = ScriptedTransport::new()
            .with_json(200, pending())
            .with_response(HttpResponse::new(500, "oops"))
            .with_json(200, succeeded("https://never.test/x.png"));
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let err = client.await_completion("t", 10, Duration::ZERO).unwrap_err();
        assert!(matches!(err, PictorError::Poll(_)));
        assert_eq!(transport.count("GET"), 2);
    }

    #[test]
    fn test_await_zero_attempts_times_out_without_polling() {
        let transport = ScriptedTransport::new();
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let err = client.await_completion("t", 0, Duration::ZERO).unwrap_err();
        assert!(matches!(err, PictorError::Timeout { attempts: 0, .. }));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_fetch_returns_bytes() {
        let transport = ScriptedTransport::new().with_response(HttpResponse::new(200, vec![1u8, 2, 3]));
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let bytes = client.fetch(&ArtifactRef::new("https://cdn.test/a.png")).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        // Artifact downloads carry no credentials
        assert!(transport.calls()[0].headers.is_empty());
    }

    #[test]
    fn test_failed_download_writes_nothing() {
        let transport = ScriptedTransport::new().with_response(HttpResponse::new(404, "expired"));
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);
        let dir = temp_dir();

        let err = client
            .download(&ArtifactRef::new("https://cdn.test/gone.png"), &dir)
            .unwrap_err();
        assert!(matches!(err, PictorError::Fetch(ref m) if m.contains("404")));
        let written = std::fs::read_dir(&dir).map(|d| d.count()).unwrap_or(0);
        assert_eq!(written, 0);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_generate_end_to_end() {
        let png = crate::test_support::tiny_png();
        let transport = ScriptedTransport::new()
            .with_json(200, json!({"output": {"task_id": "task-e2e"}}))
            .with_json(200, running())
            .with_json(200, succeeded("https://cdn.test/e2e.png"))
            .with_response(HttpResponse::new(200, png.clone()));
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper).with_policy(PollPolicy::new(4, Duration::from_secs(1)));
        let dir = temp_dir();

        let request = GenerationRequest::new("a teapot").unwrap();
        let outcome = client.generate(&request, &dir).unwrap();

        assert_eq!(outcome.job_id, "task-e2e");
        assert_eq!(outcome.provider, "dashscope");
        assert_eq!(outcome.prompt_length, 8);
        assert_eq!(outcome.images.len(), 1);
        let saved = &outcome.images[0];
        assert!(saved.path.exists());
        assert_eq!(std::fs::read(&saved.path).unwrap(), png);
        assert_eq!(saved.url, "https://cdn.test/e2e.png");
        assert_eq!(sleeper.count(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_request_is_never_sent() {
        let transport = ScriptedTransport::new();
        let sleeper = RecordingSleeper::default();
        let client = client(&transport, &sleeper);

        let request = GenerationRequest::new("ok").unwrap().with_count(0);
        assert!(matches!(client.submit(&request), Err(PictorError::InvalidRequest(_))));
        assert!(transport.calls().is_empty());
    }
}
