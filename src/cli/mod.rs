//! Command-line interface.
//!
//! ```text
//! meta-optimize [--env-file PATH] [--config PATH] [--root DIR] run <job>
//! meta-optimize [--env-file PATH] [--config PATH] [--root DIR] run-all
//! meta-optimize list
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::jobs::JobKind;

/// Prompt optimization driver
#[derive(Debug, Parser)]
#[command(name = "meta-optimize")]
#[command(version, about = "Optimize stored agent prompts against evaluation datasets", long_about = None)]
pub struct Cli {
    /// `.env` file to load (default: `.env` searched upwards from the working directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    /// YAML config file; environment variables still override it
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Working directory for jobs started by `run-all` (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Optimize the prompts of one job
    Run {
        #[arg(value_enum)]
        job: JobKind,
    },

    /// Run every job in its own process and report which failed
    RunAll,

    /// List the known jobs with their prompts and datasets
    List,
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

impl Cli {
    /// Global options to pass on to child `run` processes. Paths are made
    /// absolute since children start in the `--root` directory.
    pub fn forwarded_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if let Some(ref path) = self.env_file {
            args.push(OsString::from("--env-file"));
            args.push(absolute(path).into_os_string());
        }
        if let Some(ref path) = self.config {
            args.push(OsString::from("--config"));
            args.push(absolute(path).into_os_string());
        }
        args
    }
}
