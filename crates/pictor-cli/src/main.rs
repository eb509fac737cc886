//! Pictor CLI - text-to-image generation through asynchronous task APIs

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{fetch, generate, job, providers, PollOpts, PromptOpts, ProviderOpts};
use std::path::PathBuf;

const DEFAULT_OUTPUT_DIR: &str = "outputs/images";

#[derive(Parser)]
#[command(name = "pictor")]
#[command(about = "Generate images from text prompts via asynchronous task APIs", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a prompt, wait for the job and download the images
    Generate {
        #[command(flatten)]
        prompt: PromptOpts,

        /// Directory for downloaded images
        #[arg(long, short, default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        /// Write the outgoing request to DIR/t2i_input_<timestamp>.json
        #[arg(long)]
        debug_dir: Option<PathBuf>,

        /// Run against the in-process DashScope mock instead of the network
        #[arg(long)]
        offline: bool,

        #[command(flatten)]
        provider: ProviderOpts,

        #[command(flatten)]
        poll: PollOpts,
    },

    /// Submit a prompt and print the job ID without waiting
    Submit {
        #[command(flatten)]
        prompt: PromptOpts,

        #[command(flatten)]
        provider: ProviderOpts,
    },

    /// Check a job's status once
    Status {
        /// Job ID
        job_id: String,

        #[command(flatten)]
        provider: ProviderOpts,
    },

    /// Wait for a submitted job and download its images
    Wait {
        /// Job ID
        job_id: String,

        /// Directory for downloaded images
        #[arg(long, short, default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        #[command(flatten)]
        provider: ProviderOpts,

        #[command(flatten)]
        poll: PollOpts,
    },

    /// Download an image URL produced by a finished job
    Fetch {
        /// Image URL
        url: String,

        /// Directory for the downloaded image
        #[arg(long, short, default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        #[command(flatten)]
        provider: ProviderOpts,
    },

    /// List jobs recorded by `submit`
    Jobs,

    /// List providers and their configuration state
    Providers,
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Generate {
            prompt,
            output_dir,
            debug_dir,
            offline,
            provider,
            poll,
        } => generate::run(generate::GenerateArgs {
            prompt,
            output_dir,
            debug_dir,
            offline,
            provider,
            poll,
        }),
        Commands::Submit { prompt, provider } => job::run_submit(&prompt, &provider),
        Commands::Status { job_id, provider } => job::run_status(&job_id, &provider),
        Commands::Wait {
            job_id,
            output_dir,
            provider,
            poll,
        } => job::run_wait(&job_id, &output_dir, &provider, &poll),
        Commands::Fetch {
            url,
            output_dir,
            provider,
        } => fetch::run(&url, &output_dir, &provider),
        Commands::Jobs => job::run_list(),
        Commands::Providers => providers::run(),
    }
}
