//! meta-optimize binary.
//!
//! # Environment Variables
//!
//! - `OPIK_URL_OVERRIDE`, `OPIK_API_KEY`, `OPIK_WORKSPACE` for the registry
//! - `OPENAI_BASE_URL`, `OPENAI_API_KEY`, `JUDGE_MODEL` for the relevance judge
//! - `OPTIMIZER_URL`, `OPTIMIZER_API_KEY` for the optimizer service
//! - `RUST_LOG` for the log filter (default: "info,meta_optimize=debug")
//!
//! # Usage
//!
//! ```bash
//! meta-optimize run user-skill-agent
//! meta-optimize run-all --root ./optimize
//! ```

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use meta_optimize::cli::{Cli, Commands};
use meta_optimize::config::{load_env_file, OptimizeConfig};
use meta_optimize::jobs::{JobContext, JobKind, OptimizerDriver};
use meta_optimize::sequencer::{ProcessLauncher, RunAllSequencer};
use meta_optimize::utilities::printer::Printer;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load .env before the filter reads RUST_LOG.
    let env_file = load_env_file(cli.env_file.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,meta_optimize=debug".into()),
        )
        .init();

    if let Some(path) = env_file {
        tracing::debug!("Loaded environment from {}", path.display());
    }

    match cli.command {
        Commands::List => {
            for kind in JobKind::ALL {
                let job = kind.job();
                println!(
                    "{:<26} system={} user={} dataset={}",
                    job.name(),
                    job.system_prompt_name(),
                    job.user_prompt_name().unwrap_or("-"),
                    job.dataset_name()
                );
            }
            Ok(())
        }

        Commands::Run { job } => {
            let config = OptimizeConfig::load(cli.config.as_deref())?;
            let context = JobContext::from_config(&config)?;
            OptimizerDriver::new(context)
                .run_job(job.job().as_ref())
                .await
                .with_context(|| format!("job {} failed", job))?;
            Ok(())
        }

        Commands::RunAll => {
            let root = match cli.root {
                Some(ref root) => root.clone(),
                None => std::env::current_dir().context("cannot determine working directory")?,
            };
            let launcher = ProcessLauncher::current_exe(cli.forwarded_args())
                .context("cannot locate the meta-optimize executable")?;
            let jobs = JobKind::ALL.iter().map(|kind| kind.to_string()).collect();

            let summary = RunAllSequencer::new(jobs, root, Arc::new(launcher), Printer::new())
                .run()
                .await;
            std::process::exit(summary.exit_code());
        }
    }
}
