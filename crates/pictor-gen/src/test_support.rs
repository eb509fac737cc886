//! Scripted transport and recording sleeper for unit tests

use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use crate::client::Sleeper;
use crate::transport::{Header, HttpResponse, Transport, TransportError};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RecordedCall {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Replays queued responses in order and records every request
#[derive(Default)]
pub struct ScriptedTransport {
    responses: RefCell<VecDeque<Result<HttpResponse, TransportError>>>,
    calls: RefCell<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: HttpResponse) -> Self {
        self.responses.borrow_mut().push_back(Ok(response));
        self
    }

    pub fn with_json(self, status: u16, value: Value) -> Self {
        self.with_response(HttpResponse::json(status, &value))
    }

    pub fn with_error(self, error: TransportError) -> Self {
        self.responses.borrow_mut().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls.borrow().iter().filter(|c| c.method == method).count()
    }

    fn record(
        &self,
        method: &'static str,
        url: &str,
        headers: &[Header],
        body: Option<&Value>,
    ) -> Result<HttpResponse, TransportError> {
        self.calls.borrow_mut().push(RecordedCall {
            method,
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            body: body.cloned(),
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError("no scripted response left".to_string())))
    }
}

impl Transport for ScriptedTransport {
    fn post_json(
        &self,
        url: &str,
        headers: &[Header],
        body: &Value,
    ) -> Result<HttpResponse, TransportError> {
        self.record("POST", url, headers, Some(body))
    }

    fn get(&self, url: &str, headers: &[Header]) -> Result<HttpResponse, TransportError> {
        self.record("GET", url, headers, None)
    }
}

/// Records requested sleeps instead of sleeping
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn count(&self) -> usize {
        self.sleeps.borrow().len()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}

pub fn pending() -> Value {
    json!({"output": {"task_id": "t", "task_status": "PENDING"}})
}

pub fn running() -> Value {
    json!({"output": {"task_id": "t", "task_status": "RUNNING"}})
}

pub fn succeeded(url: &str) -> Value {
    json!({"output": {
        "task_id": "t",
        "task_status": "SUCCEEDED",
        "choices": [{
            "finish_reason": "stop",
            "message": {
                "role": "assistant",
                "content": [{"type": "image", "image": url}]
            }
        }]
    }})
}

/// A 4x2 PNG
pub fn tiny_png() -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(4, 2, image::Rgba([200, 120, 40, 255]));
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}
