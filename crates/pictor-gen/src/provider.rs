//! Provider trait and request types

use pictor_core::{PictorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::client::PollPolicy;
use crate::job::Job;
use crate::transport::Header;

const DEFAULT_SIZE: u32 = 1024;

/// Output size of a generated image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Render as `W{sep}H`, e.g. `1024*1024` or `1024x1024`
    pub fn to_descriptor(&self, separator: char) -> String {
        format!("{}{}{}", self.width, separator, self.height)
    }
}

impl Default for ImageSize {
    fn default() -> Self {
        Self::new(DEFAULT_SIZE, DEFAULT_SIZE)
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}*{}", self.width, self.height)
    }
}

impl FromStr for ImageSize {
    type Err = PictorError;

    /// Accepts `W*H` and `WxH`
    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .trim()
            .split_once(['*', 'x', 'X'])
            .ok_or_else(|| {
                PictorError::InvalidRequest(format!(
                    "invalid size '{}': expected WIDTH*HEIGHT",
                    s
                ))
            })?;

        let parse = |part: &str| -> Result<u32> {
            match part.trim().parse::<u32>() {
                Ok(v) if v > 0 => Ok(v),
                _ => Err(PictorError::InvalidRequest(format!(
                    "invalid size '{}': dimensions must be positive integers",
                    s
                ))),
            }
        };

        Ok(Self::new(parse(w)?, parse(h)?))
    }
}

/// A text-to-image generation request.
///
/// Built once and passed by reference to the client, so it cannot change
/// after submission. The prompt is guaranteed non-blank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    prompt: String,
    size: ImageSize,
    count: u32,
    negative_prompt: Option<String>,
}

impl GenerationRequest {
    /// Create a request for a single default-sized image
    pub fn new(prompt: impl Into<String>) -> Result<Self> {
        let request = Self {
            prompt: prompt.into(),
            size: ImageSize::default(),
            count: 1,
            negative_prompt: None,
        };
        request.validate()?;
        Ok(request)
    }

    pub fn with_size(mut self, size: ImageSize) -> Self {
        self.size = size;
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = count;
        self
    }

    /// Set the negative prompt; blank text clears it
    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        let negative = negative.into();
        let trimmed = negative.trim();
        self.negative_prompt = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    /// Prepend a configured default negative prompt, joined with ", "
    pub fn merge_negative_prompt(mut self, default: Option<&str>) -> Self {
        let parts: Vec<&str> = [default, self.negative_prompt.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        self.negative_prompt = if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        };
        self
    }

    /// Check the request is submittable
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(PictorError::InvalidRequest(
                "prompt must not be empty".to_string(),
            ));
        }
        if self.count == 0 {
            return Err(PictorError::InvalidRequest(
                "image count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn negative_prompt(&self) -> Option<&str> {
        self.negative_prompt.as_deref()
    }

    /// Prompt length in characters
    pub fn prompt_length(&self) -> usize {
        self.prompt.chars().count()
    }
}

/// A fully-built submission call: where to POST, with which headers and body
#[derive(Debug, Clone)]
pub struct SubmitCall {
    pub url: String,
    pub headers: Vec<Header>,
    pub body: serde_json::Value,
}

/// A provider dialect of the asynchronous task protocol.
///
/// Providers only build requests and decode responses; all I/O goes
/// through the client's transport.
pub trait ImageProvider: Send {
    /// Provider name (e.g. "dashscope", "zhipu")
    fn name(&self) -> &str;

    /// Model identifier sent with every submission
    fn model(&self) -> &str;

    /// Submission endpoint URL
    fn endpoint(&self) -> &str;

    /// Build the submission call for a request
    fn build_submission(&self, request: &GenerationRequest) -> SubmitCall;

    /// Extract the job identifier from a 2xx submission body
    fn parse_submission(&self, body: &[u8]) -> Result<String>;

    /// Status endpoint for a job
    fn status_url(&self, job_id: &str) -> String;

    /// Headers sent with every status check
    fn auth_headers(&self) -> Vec<Header>;

    /// Decode a 2xx status body into a job snapshot
    fn parse_status(&self, job_id: &str, body: &[u8]) -> Result<Job>;

    /// Poll cadence this provider is documented to tolerate
    fn default_poll_policy(&self) -> PollPolicy {
        PollPolicy::default()
    }
}
