//! Split lifecycle commands backed by the job ledger

use anyhow::{Context, Result};
use log::warn;
use pictor_core::PictorError;
use pictor_gen::{JobRecord, JobStore};
use std::path::Path;

use super::{connect, PollOpts, PromptOpts, ProviderOpts};

/// Submit a job and record it in the ledger without waiting
pub fn run_submit(prompt: &PromptOpts, opts: &ProviderOpts) -> Result<()> {
    let (config, name) = opts.resolve(None)?;
    let request = prompt.request(&config)?;
    let client = connect(&config, &name, &PollOpts::default())?;

    let job_id = client.submit(&request)?;
    let provider = client.provider();
    let record = JobRecord::new(
        &job_id,
        provider.name(),
        provider.model(),
        request.prompt_length(),
    );
    JobStore::default_store()
        .save(&record)
        .context("failed to record job")?;

    println!("Submitted job {} via {}", job_id, provider.name());
    println!("  Wait with: pictor wait {}", job_id);
    Ok(())
}

/// Perform one status check and print it
pub fn run_status(job_id: &str, opts: &ProviderOpts) -> Result<()> {
    let store = JobStore::default_store();
    let record = store.load(job_id).ok();
    let (config, name) = opts.resolve(ledger_provider(&record))?;
    let client = connect(&config, &name, &PollOpts::default())?;

    let job = client.poll(job_id)?;
    if record.is_some() {
        store.update_status(job_id, &job)?;
    }

    println!("Job: {}", job.id);
    println!("  Provider: {}", client.provider().name());
    println!("  Status: {}", job.status());
    if let Some(ref record) = record {
        println!("  Submitted: {}", record.submitted_at);
    }
    for artifact in job.artifacts() {
        println!("  Image: {}", artifact);
    }
    if let Some(message) = job.error_message() {
        println!("  Error: {}", message);
    }
    Ok(())
}

/// Block until the job finishes, then download its images
pub fn run_wait(
    job_id: &str,
    output_dir: &Path,
    opts: &ProviderOpts,
    poll: &PollOpts,
) -> Result<()> {
    let store = JobStore::default_store();
    let record = store.load(job_id).ok();
    let (config, name) = opts.resolve(ledger_provider(&record))?;
    let client = connect(&config, &name, poll)?;
    let policy = client.policy();

    let artifacts = match client.await_artifacts(job_id, policy.max_attempts, policy.interval) {
        Ok(artifacts) => artifacts,
        Err(e @ PictorError::JobFailed { .. }) | Err(e @ PictorError::MalformedResult(_)) => {
            if record.is_some() {
                if let Err(remove_err) = store.remove(job_id) {
                    warn!("Could not drop ledger entry for {}: {}", job_id, remove_err);
                }
            }
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    for artifact in &artifacts {
        let saved = client.download(artifact, output_dir)?;
        println!("Downloaded: {}", saved.path.display());
    }

    if record.is_some() {
        store.remove(job_id)?;
    }
    Ok(())
}

/// List ledger entries
pub fn run_list() -> Result<()> {
    let jobs = JobStore::default_store().list()?;

    if jobs.is_empty() {
        println!("No generation jobs found.");
        return Ok(());
    }

    println!("{} job(s):\n", jobs.len());
    for job in &jobs {
        println!(
            "  {} ({}/{}) {} {}",
            job.job_id, job.provider, job.model, job.status, job.submitted_at
        );
        if let Some(ref err) = job.error {
            println!("    Error: {}", err);
        }
    }
    Ok(())
}

fn ledger_provider(record: &Option<JobRecord>) -> Option<&str> {
    record.as_ref().map(|r| r.provider.as_str())
}
