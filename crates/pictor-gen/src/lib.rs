//! Pictor Gen - asynchronous text-to-image job client
//!
//! Submits a prompt to a provider's task API, polls the task on a fixed
//! schedule until it reaches a terminal status, and downloads the resulting
//! image. Provider dialects (DashScope, Zhipu) only describe the wire format;
//! HTTP goes through a pluggable transport so the whole lifecycle can run
//! against the in-process mock.

pub mod artifact;
pub mod client;
pub mod config;
pub mod job;
pub mod mock;
pub mod provider;
pub mod providers;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use artifact::{write_artifact, SavedArtifact};
pub use client::{AsyncJobClient, GenerationOutcome, PollPolicy, Sleeper, ThreadSleeper};
pub use config::PictorConfig;
pub use job::{ArtifactRef, Job, JobRecord, JobState, JobStatus, JobStore};
pub use mock::MockTransport;
pub use provider::{GenerationRequest, ImageProvider, ImageSize, SubmitCall};
pub use transport::{HttpResponse, Transport, TransportError, UreqTransport};
