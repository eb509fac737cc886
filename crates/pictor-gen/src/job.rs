//! Job snapshots and the on-disk job ledger
//!
//! A `Job` is what one status check reports. `JobStore` keeps a small
//! `.job.toml` record per submitted job in `.pictor/jobs/` so a job can be
//! submitted by one process and awaited by another. Records are removed
//! once their result has been consumed.

use pictor_core::{PictorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Provider-reported status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    /// `Succeeded` and `Failed` are absorbing
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "PENDING"),
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Succeeded => write!(f, "SUCCEEDED"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Remote locator of generated content. Not the content itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(String);

impl ArtifactRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job state with the payload each status carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    /// Image URLs in provider order; empty means the payload had none
    Succeeded { artifacts: Vec<ArtifactRef> },
    Failed { message: String },
}

/// One status snapshot of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub state: JobState,
}

impl Job {
    pub fn new(id: impl Into<String>, state: JobState) -> Self {
        Self {
            id: id.into(),
            state,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self.state {
            JobState::Pending => JobStatus::Pending,
            JobState::Running => JobStatus::Running,
            JobState::Succeeded { .. } => JobStatus::Succeeded,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// All artifact references; empty unless the job succeeded
    pub fn artifacts(&self) -> &[ArtifactRef] {
        match &self.state {
            JobState::Succeeded { artifacts } => artifacts.as_slice(),
            _ => &[],
        }
    }

    /// First artifact reference, if the job succeeded with one
    pub fn artifact(&self) -> Option<&ArtifactRef> {
        self.artifacts().first()
    }

    /// Provider's failure message, if the job failed
    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { message } => Some(message),
            _ => None,
        }
    }
}

/// Ledger entry for a submitted job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// Provider-assigned job ID
    pub job_id: String,
    /// Provider name
    pub provider: String,
    /// Model the job was submitted to
    pub model: String,
    /// Last observed status
    pub status: JobStatus,
    /// RFC 3339 timestamp when submitted
    pub submitted_at: String,
    /// Prompt length in characters
    #[serde(default)]
    pub prompt_length: usize,
    /// Failure message once failed
    #[serde(default)]
    pub error: Option<String>,
}

impl JobRecord {
    /// Create a record for a freshly submitted job
    pub fn new(job_id: &str, provider: &str, model: &str, prompt_length: usize) -> Self {
        Self {
            job_id: job_id.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            status: JobStatus::Pending,
            submitted_at: chrono::Utc::now().to_rfc3339(),
            prompt_length,
            error: None,
        }
    }
}

/// File-based job ledger in `.pictor/jobs/`
pub struct JobStore {
    root: PathBuf,
}

impl JobStore {
    /// Create a new job store at the given root directory
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Default job store location
    pub fn default_store() -> Self {
        Self::new(".pictor/jobs")
    }

    /// Save a record to disk
    pub fn save(&self, record: &JobRecord) -> Result<()> {
        let path = self.record_path(&record.job_id)?;
        std::fs::create_dir_all(&self.root)?;

        let wrapper = JobFile {
            job: record.clone(),
        };
        let content = toml::to_string_pretty(&wrapper)?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Load a record by job ID
    pub fn load(&self, job_id: &str) -> Result<JobRecord> {
        let path = self.record_path(job_id)?;
        if !path.exists() {
            return Err(PictorError::InvalidRequest(format!(
                "Job not found: {}",
                job_id
            )));
        }

        let content = std::fs::read_to_string(&path)?;
        let file: JobFile = toml::from_str(&content)?;
        Ok(file.job)
    }

    /// List all tracked jobs, oldest first
    pub fn list(&self) -> Result<Vec<JobRecord>> {
        let mut jobs = Vec::new();

        if !self.root.exists() {
            return Ok(jobs);
        }

        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(".job.toml"))
                .unwrap_or(false)
            {
                let content = std::fs::read_to_string(&path)?;
                match toml::from_str::<JobFile>(&content) {
                    Ok(file) => jobs.push(file.job),
                    Err(e) => log::warn!("Skipping unreadable job file {}: {}", path.display(), e),
                }
            }
        }

        jobs.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(jobs)
    }

    /// Record a newly observed status. A terminal status never changes.
    pub fn update_status(&self, job_id: &str, job: &Job) -> Result<JobRecord> {
        let mut record = self.load(job_id)?;
        let status = job.status();

        if record.status.is_terminal() && record.status != status {
            return Err(PictorError::InvalidRequest(format!(
                "Job {} is already {} and cannot become {}",
                job_id, record.status, status
            )));
        }

        record.status = status;
        record.error = job.error_message().map(str::to_string);
        self.save(&record)?;
        Ok(record)
    }

    /// Drop a record once its result has been consumed
    pub fn remove(&self, job_id: &str) -> Result<()> {
        let path = self.record_path(job_id)?;
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn record_path(&self, job_id: &str) -> Result<PathBuf> {
        let safe = !job_id.is_empty()
            && job_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !job_id.contains("..");
        if !safe {
            return Err(PictorError::InvalidRequest(format!(
                "Invalid job ID '{}'",
                job_id
            )));
        }
        Ok(self.root.join(format!("{}.job.toml", job_id)))
    }
}

#[derive(Serialize, Deserialize)]
struct JobFile {
    job: JobRecord,
}
