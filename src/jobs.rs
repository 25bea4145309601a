//! Background job tracking.
//!
//! Jobs are OS processes started with `sh -c`, detached into their own
//! process group, with stdout and stderr both redirected to a log file.
//! Status is refreshed on demand with a non-blocking `try_wait`; nothing
//! polls in the background.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::JobError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One background process.
#[derive(Debug)]
pub struct Job {
    pub id: u64,
    pub pid: u32,
    pub command: String,
    pub log_path: PathBuf,
    pub started_at: DateTime<Local>,
    started: Instant,
    finished: Option<Instant>,
    status: JobStatus,
    exit_code: Option<i32>,
    child: Child,
}

impl Job {
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Exit code, set once the job is terminal. A job killed by a signal
    /// reports `128 + signal`, as shells do.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Wall-clock runtime, frozen once the job has been seen to exit.
    pub fn elapsed(&self) -> Duration {
        match self.finished {
            Some(end) => end.duration_since(self.started),
            None => self.started.elapsed(),
        }
    }

    /// Check liveness and record the exit if the process is gone.
    ///
    /// Returns true only on the call that moves the job to a terminal state.
    fn refresh(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(exit)) => {
                self.finish(Some(exit));
                true
            }
            Ok(None) => false,
            Err(e) => {
                // The child can no longer be reaped through the handle; fall
                // back to a liveness check on the pid.
                if is_process_running(self.pid) {
                    debug!(job = self.id, error = %e, "try_wait failed, process still alive");
                    false
                } else {
                    warn!(job = self.id, error = %e, "job exit status unavailable");
                    self.finish(None);
                    true
                }
            }
        }
    }

    fn finish(&mut self, exit: Option<ExitStatus>) {
        let code = exit.and_then(|s| s.code().or_else(|| s.signal().map(|sig| 128 + sig)));
        self.exit_code = code;
        self.status = if code == Some(0) {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        self.finished = Some(Instant::now());
    }

    /// One-line status summary with the log path shown relative to `base`.
    pub fn summary_line(&self, base: &Path) -> String {
        let status = match self.exit_code {
            Some(code) if self.status.is_terminal() => format!("{} (exit {})", self.status, code),
            _ => self.status.to_string(),
        };
        let log = self
            .log_path
            .strip_prefix(base)
            .unwrap_or(&self.log_path)
            .display();
        format!(
            "[job {}] pid {} | {} | {} | log: {} | cmd: {}",
            self.id,
            self.pid,
            status,
            format_elapsed(self.elapsed()),
            log,
            self.command
        )
    }
}

/// A job that reached a terminal state since the last drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTransition {
    pub job_id: u64,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
}

/// Registry of every background job started in this process. Records are
/// never removed.
#[derive(Debug)]
pub struct JobManager {
    workdir: PathBuf,
    log_dir: PathBuf,
    jobs: Vec<Job>,
    next_id: u64,
    transitions: Vec<JobTransition>,
}

impl JobManager {
    pub fn new(workdir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            log_dir: log_dir.into(),
            jobs: Vec::new(),
            next_id: 1,
            transitions: Vec::new(),
        }
    }

    /// Spawn `command` in the background.
    ///
    /// On failure no job id is consumed and no record is created.
    pub fn start(&mut self, command: &str) -> Result<&Job, JobError> {
        let id = self.next_id;
        let started_at = Local::now();
        let stem = format!(
            "nohup_{}_{}_{}",
            started_at.format("%Y%m%d_%H%M%S"),
            std::process::id(),
            id
        );

        std::fs::create_dir_all(&self.log_dir).map_err(|source| JobError::LogFile {
            path: self.log_dir.clone(),
            source,
        })?;
        let (log_path, stdout) =
            create_log(&self.log_dir, &stem).map_err(|source| JobError::LogFile {
                path: self.log_dir.join(format!("{}.log", stem)),
                source,
            })?;
        let stderr = stdout.try_clone().map_err(|source| JobError::LogFile {
            path: log_path.clone(),
            source,
        })?;

        let spawned = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0)
            .spawn();

        let child = match spawned {
            Ok(child) => child,
            Err(source) => {
                let _ = std::fs::remove_file(&log_path);
                return Err(JobError::Spawn {
                    command: command.to_string(),
                    source,
                });
            }
        };

        let pid = child.id();
        debug!(job = id, pid, command, log = %log_path.display(), "started background job");

        self.next_id += 1;
        self.jobs.push(Job {
            id,
            pid,
            command: command.to_string(),
            log_path,
            started_at,
            started: Instant::now(),
            finished: None,
            status: JobStatus::Running,
            exit_code: None,
            child,
        });
        Ok(&self.jobs[self.jobs.len() - 1])
    }

    /// Refresh one job; returns its current status, or `None` for an unknown id.
    pub fn refresh(&mut self, id: u64) -> Option<JobStatus> {
        let job = self.jobs.iter_mut().find(|j| j.id == id)?;
        if job.refresh() {
            self.transitions.push(JobTransition {
                job_id: job.id,
                status: job.status,
                exit_code: job.exit_code,
            });
        }
        Some(job.status)
    }

    pub fn refresh_all(&mut self) {
        for job in &mut self.jobs {
            if job.refresh() {
                self.transitions.push(JobTransition {
                    job_id: job.id,
                    status: job.status,
                    exit_code: job.exit_code,
                });
            }
        }
    }

    /// Refresh every job, then describe each on one line in creation order.
    pub fn summarize(&mut self) -> Vec<String> {
        self.refresh_all();
        self.jobs
            .iter()
            .map(|j| j.summary_line(&self.workdir))
            .collect()
    }

    /// Terminal transitions observed since the previous call.
    pub fn drain_finished(&mut self) -> Vec<JobTransition> {
        std::mem::take(&mut self.transitions)
    }

    pub fn get(&self, id: u64) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

pub fn is_process_running(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

/// `42s`, `3m 05s`, `1h 02m`.
pub fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Create `<stem>.log` in `dir`, or `<stem>_<n>.log` when that name is
/// taken. An existing file is never opened for writing.
fn create_log(dir: &Path, stem: &str) -> io::Result<(PathBuf, File)> {
    let mut attempt = 1u32;
    loop {
        let name = if attempt == 1 {
            format!("{}.log", stem)
        } else {
            format!("{}_{}.log", stem, attempt)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < 100 => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, JobManager) {
        let dir = TempDir::new().unwrap();
        let mgr = JobManager::new(dir.path(), dir.path());
        (dir, mgr)
    }

    fn wait_terminal(mgr: &mut JobManager, id: u64) -> JobStatus {
        for _ in 0..100 {
            let status = mgr.refresh(id).unwrap();
            if status.is_terminal() {
                return status;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        panic!("job {} did not finish", id);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(7)), "7s");
        assert_eq!(format_elapsed(Duration::from_secs(185)), "3m 05s");
        assert_eq!(format_elapsed(Duration::from_secs(3720)), "1h 02m");
    }

    #[test]
    fn test_start_allocates_sequential_ids_and_logs() {
        let (dir, mut mgr) = manager();
        let first = mgr.start("echo out; echo err >&2").unwrap().id;
        let second = mgr.start("true").unwrap().id;
        assert_eq!((first, second), (1, 2));

        assert_eq!(wait_terminal(&mut mgr, first), JobStatus::Completed);
        let log = std::fs::read_to_string(&mgr.get(first).unwrap().log_path).unwrap();
        assert!(log.contains("out"));
        assert!(log.contains("err"));
        assert!(mgr.get(first).unwrap().log_path.starts_with(dir.path()));
    }

    #[test]
    fn test_nonzero_exit_is_failed() {
        let (_dir, mut mgr) = manager();
        let id = mgr.start("exit 3").unwrap().id;
        assert_eq!(wait_terminal(&mut mgr, id), JobStatus::Failed);
        assert_eq!(mgr.get(id).unwrap().exit_code(), Some(3));
    }

    #[test]
    fn test_status_is_monotonic() {
        let (_dir, mut mgr) = manager();
        let id = mgr.start("true").unwrap().id;
        assert_eq!(wait_terminal(&mut mgr, id), JobStatus::Completed);

        let transitions = mgr.drain_finished();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].exit_code, Some(0));

        for _ in 0..3 {
            assert_eq!(mgr.refresh(id), Some(JobStatus::Completed));
        }
        assert!(mgr.drain_finished().is_empty());
    }

    #[test]
    fn test_summarize_reports_running_then_completed() {
        let (_dir, mut mgr) = manager();
        let id = mgr.start("sleep 1").unwrap().id;

        let lines = mgr.summarize();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(&format!("[job {}]", id)));
        assert!(lines[0].contains("| running |"));
        assert!(lines[0].contains("cmd: sleep 1"));

        std::thread::sleep(Duration::from_millis(1500));
        let lines = mgr.summarize();
        assert!(lines[0].contains("completed (exit 0)"), "got {}", lines[0]);
    }

    #[test]
    fn test_spawn_failure_creates_no_record() {
        let dir = TempDir::new().unwrap();
        let mut mgr = JobManager::new(dir.path().join("missing-workdir"), dir.path());
        let err = mgr.start("true").unwrap_err();
        assert!(matches!(err, JobError::Spawn { .. }));
        assert!(mgr.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        // the id was not consumed
        let mut ok = JobManager::new(dir.path(), dir.path());
        assert_eq!(ok.start("true").unwrap().id, 1);
    }

    #[test]
    fn test_existing_log_is_never_truncated() {
        let dir = TempDir::new().unwrap();
        let taken = dir.path().join("nohup_x.log");
        std::fs::write(&taken, "earlier output").unwrap();

        let (path, _file) = create_log(dir.path(), "nohup_x").unwrap();
        assert_eq!(path, dir.path().join("nohup_x_2.log"));
        assert_eq!(std::fs::read_to_string(&taken).unwrap(), "earlier output");
    }

    #[test]
    fn test_managers_sharing_a_log_dir_get_distinct_logs() {
        let dir = TempDir::new().unwrap();
        let mut a = JobManager::new(dir.path(), dir.path());
        let mut b = JobManager::new(dir.path(), dir.path());
        let first = a.start("echo from-a").unwrap().id;
        let second = b.start("echo from-b").unwrap().id;
        assert_eq!((first, second), (1, 1));

        assert_eq!(wait_terminal(&mut a, 1), JobStatus::Completed);
        assert_eq!(wait_terminal(&mut b, 1), JobStatus::Completed);
        let log_a = a.get(1).unwrap().log_path.clone();
        let log_b = b.get(1).unwrap().log_path.clone();
        assert_ne!(log_a, log_b);
        assert_eq!(std::fs::read_to_string(log_a).unwrap(), "from-a\n");
        assert_eq!(std::fs::read_to_string(log_b).unwrap(), "from-b\n");
    }

    #[test]
    fn test_unknown_job_refresh() {
        let (_dir, mut mgr) = manager();
        assert_eq!(mgr.refresh(99), None);
        assert!(mgr.summarize().is_empty());
    }
}
