//! Tracking background and stopped jobs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use indexmap::IndexMap;

use crate::error::Error;

/// A tracked job: a background pipeline or a stopped external command.
#[derive(Clone, Debug)]
pub struct Job {
    pub id: usize,
    /// The source text of the pipeline, or the command name.
    pub description: String,
    /// The process id, for stopped external commands.
    pub pid: Option<i32>,
    pub state: JobState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
    Done,
}

/// The interpreter's job table.
#[derive(Debug, Default)]
pub struct JobManager {
    next_id: AtomicUsize,
    running_bg: AtomicUsize,
    jobs: Mutex<IndexMap<usize, Job>>,
}

impl JobManager {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a background pipeline and returns its job id.
    pub(crate) fn add_background(&self, description: String) -> usize {
        self.running_bg.fetch_add(1, Ordering::SeqCst);
        self.add(description, None, JobState::Running)
    }

    pub(crate) fn finish_background(&self, id: usize) {
        self.running_bg.fetch_sub(1, Ordering::SeqCst);
        if let Some(job) = self.lock().get_mut(&id) {
            job.state = JobState::Done;
        }
    }

    /// Registers an external command stopped by a signal.
    pub(crate) fn add_stopped(&self, description: String, pid: i32) -> usize {
        self.add(description, Some(pid), JobState::Stopped)
    }

    fn add(&self, description: String, pid: Option<i32>, state: JobState) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.lock().insert(
            id,
            Job {
                id,
                description,
                pid,
                state,
            },
        );
        id
    }

    /// The number of background pipelines still running. Embedders check
    /// this before exiting.
    pub fn running_background(&self) -> usize {
        self.running_bg.load(Ordering::SeqCst)
    }

    /// A snapshot of the job table.
    pub fn jobs(&self) -> Vec<Job> {
        self.lock().values().cloned().collect()
    }

    pub fn job(&self, id: usize) -> Option<Job> {
        self.lock().get(&id).cloned()
    }

    /// Resumes a stopped job by sending it `SIGCONT`.
    #[cfg(unix)]
    pub fn continue_job(&self, id: usize) -> Result<(), Error> {
        let pid = {
            let jobs = self.lock();
            match jobs.get(&id) {
                Some(Job {
                    pid: Some(pid),
                    state: JobState::Stopped,
                    ..
                }) => *pid,
                _ => return Err(Error::NoSuchJob(id)),
            }
        };
        nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid),
            nix::sys::signal::Signal::SIGCONT,
        )?;
        if let Some(job) = self.lock().get_mut(&id) {
            job.state = JobState::Running;
        }
        tracing::debug!(job = id, pid, "resumed stopped job");
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<usize, Job>> {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn background_count_tracks_lifecycle() {
        let jobs = JobManager::new();
        assert_eq!(jobs.running_background(), 0);
        let id = jobs.add_background("sleep 10 &".to_string());
        assert_eq!(jobs.running_background(), 1);
        jobs.finish_background(id);
        assert_eq!(jobs.running_background(), 0);
        assert_eq!(jobs.job(id).unwrap().state, JobState::Done);
    }

    #[test]
    fn continuing_an_unknown_job_fails() {
        let jobs = JobManager::new();
        assert!(matches!(jobs.continue_job(7), Err(Error::NoSuchJob(7))));
    }
}
