//! Run-all sequencer.
//!
//! Runs every job as its own child process, strictly one after another, and
//! reports which ones failed. A failed job never stops the jobs after it.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::utilities::printer::{rule, Printer, PrinterColor};

// ---------------------------------------------------------------------------
// Job state
// ---------------------------------------------------------------------------

/// Lifecycle of one job in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Passed,
    /// `exit_code` is `None` when the process was killed by a signal or
    /// could not be started.
    Failed { exit_code: Option<i32> },
}

impl JobState {
    /// State reached by a finished process.
    pub fn from_exit(exit_code: Option<i32>) -> Self {
        match exit_code {
            Some(0) => JobState::Passed,
            code => JobState::Failed { exit_code: code },
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Passed | JobState::Failed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, JobState::Failed { .. })
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => f.write_str("pending"),
            JobState::Running => f.write_str("running"),
            JobState::Passed => f.write_str("passed"),
            JobState::Failed { exit_code: Some(code) } => write!(f, "failed (exit code {})", code),
            JobState::Failed { exit_code: None } => f.write_str("failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Launchers
// ---------------------------------------------------------------------------

/// Starts one job and waits for it.
#[async_trait]
pub trait JobLauncher: Send + Sync {
    /// Run `job` with `cwd` as working directory. Returns the exit code, or
    /// `None` if the process ended without one.
    async fn launch(&self, job: &str, cwd: &Path) -> io::Result<Option<i32>>;
}

/// Launches `<program> <leading args...> run <job>` as a child process that
/// inherits stdout and stderr.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, leading_args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            leading_args,
        }
    }

    /// Re-invoke the running executable, passing `leading_args` (global
    /// options such as `--env-file`) before the subcommand.
    pub fn current_exe(leading_args: Vec<OsString>) -> io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, leading_args))
    }
}

#[async_trait]
impl JobLauncher for ProcessLauncher {
    async fn launch(&self, job: &str, cwd: &Path) -> io::Result<Option<i32>> {
        log::debug!(
            "spawning {} {:?} run {} in {}",
            self.program.display(),
            self.leading_args,
            job,
            cwd.display()
        );
        let status = tokio::process::Command::new(&self.program)
            .args(&self.leading_args)
            .arg("run")
            .arg(job)
            .current_dir(cwd)
            .status()
            .await?;
        Ok(status.code())
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Final state of every job in a run, in run order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub jobs: Vec<(String, JobState)>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.jobs.len()
    }

    pub fn passed(&self) -> usize {
        self.jobs
            .iter()
            .filter(|(_, state)| *state == JobState::Passed)
            .count()
    }

    pub fn failed_jobs(&self) -> Vec<&str> {
        self.jobs
            .iter()
            .filter(|(_, state)| state.is_failed())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn failed(&self) -> usize {
        self.failed_jobs().len()
    }

    /// `1` if any job failed, else `0`.
    pub fn exit_code(&self) -> i32 {
        if self.failed() > 0 {
            1
        } else {
            0
        }
    }

    pub fn render(&self, printer: &Printer) -> String {
        let color = if self.failed() > 0 {
            PrinterColor::BoldRed
        } else {
            PrinterColor::BoldGreen
        };
        let mut lines = vec![
            printer.paint(&rule(), color),
            printer.paint("ALL OPTIMIZERS COMPLETE", color),
            printer.paint(&rule(), color),
            format!(
                "Total: {}, Passed: {}, Failed: {}",
                self.total(),
                self.passed(),
                self.failed()
            ),
        ];

        let failed = self.failed_jobs();
        if !failed.is_empty() {
            lines.push(String::new());
            lines.push("Failed optimizers:".to_string());
            for job in failed {
                lines.push(printer.paint(&format!("  - {}", job), PrinterColor::Red));
            }
        }
        lines.join("\n")
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&Printer::plain()))
    }
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

/// Runs a fixed list of jobs in order.
pub struct RunAllSequencer {
    jobs: Vec<String>,
    root: PathBuf,
    launcher: Arc<dyn JobLauncher>,
    printer: Printer,
}

impl RunAllSequencer {
    pub fn new(
        jobs: Vec<String>,
        root: impl Into<PathBuf>,
        launcher: Arc<dyn JobLauncher>,
        printer: Printer,
    ) -> Self {
        Self {
            jobs,
            root: root.into(),
            launcher,
            printer,
        }
    }

    /// Run every job, printing progress, then print and return the summary.
    pub async fn run(&self) -> RunSummary {
        self.run_with_output(&mut io::stdout()).await
    }

    /// Like [`run`](Self::run), writing progress and the summary to `out`.
    pub async fn run_with_output<W: io::Write>(&self, out: &mut W) -> RunSummary {
        let mut states: Vec<(String, JobState)> = self
            .jobs
            .iter()
            .map(|job| (job.clone(), JobState::Pending))
            .collect();

        for (job, state) in states.iter_mut() {
            let banner = self
                .printer
                .render_banner(&format!("Running: {}", job), PrinterColor::BoldCyan);
            emit(out, &format!("{}\n", banner));

            *state = JobState::Running;
            log::debug!("{} -> {}", job, state);

            *state = match self.launcher.launch(job, &self.root).await {
                Ok(exit_code) => JobState::from_exit(exit_code),
                Err(e) => {
                    log::error!("Could not start {}: {}", job, e);
                    JobState::Failed { exit_code: None }
                }
            };
            log::debug!("{} -> {}", job, state);

            if let JobState::Failed { exit_code } = *state {
                let detail = match exit_code {
                    Some(code) => format!("exit code {}", code),
                    None => "no exit code".to_string(),
                };
                let line = self
                    .printer
                    .paint(&format!("FAILED: {} ({})", job, detail), PrinterColor::BoldRed);
                emit(out, &format!("\n{}", line));
            }
        }

        let summary = RunSummary { jobs: states };
        emit(out, &format!("\n{}", summary.render(&self.printer)));
        summary
    }
}

fn emit<W: io::Write>(out: &mut W, text: &str) {
    if let Err(e) = writeln!(out, "{}", text).and_then(|_| out.flush()) {
        log::warn!("Could not write run-all progress: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// Launcher that returns canned exit codes and records what it ran.
    #[derive(Default)]
    struct ScriptedLauncher {
        exit_codes: HashMap<String, Option<i32>>,
        launched: Mutex<Vec<(String, PathBuf)>>,
    }

    impl ScriptedLauncher {
        fn with(mut self, job: &str, exit_code: Option<i32>) -> Self {
            self.exit_codes.insert(job.to_string(), exit_code);
            self
        }
    }

    #[async_trait]
    impl JobLauncher for ScriptedLauncher {
        async fn launch(&self, job: &str, cwd: &Path) -> io::Result<Option<i32>> {
            self.launched
                .lock()
                .unwrap()
                .push((job.to_string(), cwd.to_path_buf()));
            match self.exit_codes.get(job) {
                Some(code) => Ok(*code),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "no such job")),
            }
        }
    }

    fn jobs() -> Vec<String> {
        vec![
            "user-skill-agent".to_string(),
            "skill-resource-retriever".to_string(),
            "challenge-generator".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_jobs() {
        let launcher = Arc::new(
            ScriptedLauncher::default()
                .with("user-skill-agent", Some(0))
                .with("skill-resource-retriever", Some(1))
                .with("challenge-generator", Some(0)),
        );
        let sequencer =
            RunAllSequencer::new(jobs(), "/srv/optimize", launcher.clone(), Printer::plain());

        let mut out = Vec::new();
        let summary = sequencer.run_with_output(&mut out).await;

        let launched = launcher.launched.lock().unwrap();
        assert_eq!(launched.len(), 3);
        assert_eq!(launched[2].0, "challenge-generator");
        assert_eq!(launched[0].1, PathBuf::from("/srv/optimize"));

        assert_eq!(summary.passed(), 2);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(
            summary.jobs[1].1,
            JobState::Failed { exit_code: Some(1) }
        );
        assert_eq!(
            summary.to_string(),
            format!(
                "{rule}\nALL OPTIMIZERS COMPLETE\n{rule}\nTotal: 3, Passed: 2, Failed: 1\n\nFailed optimizers:\n  - skill-resource-retriever",
                rule = "=".repeat(60)
            )
        );

        let output = String::from_utf8(out).unwrap();
        assert!(output.contains("\nFAILED: skill-resource-retriever (exit code 1)\n"));
        assert!(!output.contains("FAILED: user-skill-agent"));
        assert!(!output.contains("FAILED: challenge-generator"));
        assert_eq!(output.matches("Running: ").count(), 3);
        let failure = output.find("FAILED: skill-resource-retriever").unwrap();
        let third = output.find("Running: challenge-generator").unwrap();
        assert!(failure < third);
        assert!(output.trim_end().ends_with("  - skill-resource-retriever"));
    }

    #[tokio::test]
    async fn test_all_passed() {
        let launcher = Arc::new(
            ScriptedLauncher::default()
                .with("user-skill-agent", Some(0))
                .with("skill-resource-retriever", Some(0))
                .with("challenge-generator", Some(0)),
        );
        let summary = RunAllSequencer::new(jobs(), ".", launcher, Printer::plain())
            .run()
            .await;

        assert_eq!(summary.exit_code(), 0);
        assert!(summary.to_string().ends_with("Total: 3, Passed: 3, Failed: 0"));
        assert!(summary.jobs.iter().all(|(_, state)| state.is_terminal()));
    }

    #[tokio::test]
    async fn test_launch_error_and_signal_count_as_failures() {
        let launcher = Arc::new(ScriptedLauncher::default().with("user-skill-agent", None));
        let mut out = Vec::new();
        let summary = RunAllSequencer::new(jobs(), ".", launcher, Printer::plain())
            .run_with_output(&mut out)
            .await;

        let output = String::from_utf8(out).unwrap();
        assert!(output.contains("FAILED: user-skill-agent (no exit code)"));
        assert_eq!(summary.failed(), 3);
        assert_eq!(summary.jobs[0].1, JobState::Failed { exit_code: None });
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(JobState::Pending.to_string(), "pending");
        assert_eq!(
            JobState::Failed { exit_code: Some(1) }.to_string(),
            "failed (exit code 1)"
        );
        assert!(!JobState::Running.is_terminal());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_launcher_passes_subcommand() {
        // $1 is "run", $2 is the job name.
        let launcher = ProcessLauncher::new(
            "sh",
            vec![
                OsString::from("-c"),
                OsString::from("[ \"$1\" = run ] && [ \"$2\" != broken ]"),
                OsString::from("sh"),
            ],
        );
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(launcher.launch("fine", dir.path()).await.unwrap(), Some(0));
        assert_eq!(launcher.launch("broken", dir.path()).await.unwrap(), Some(1));
    }
}
