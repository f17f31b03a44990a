//! Interfaces to the embedding environment.
//!
//! The runtime never prints notifications or talks to storage directly; the
//! embedder plugs in implementations of these traits.

use crate::error::Error;
use crate::exception::Exception;

/// A finished background job.
#[derive(Clone, Debug)]
pub struct JobEvent {
    pub job_id: usize,
    /// The pipeline's source text.
    pub description: String,
    /// How the pipeline finished. Failures carry the composed exception.
    pub result: Result<(), Exception>,
}

/// Receives background job completions. An interactive embedder would print
/// them between prompts; a batch embedder might log them.
pub trait JobNotifier: Send + Sync {
    fn notify(&self, event: JobEvent);

    /// Whether completions are currently delivered. The runtime skips
    /// [`JobNotifier::notify`] while this reports `false`; skipped events
    /// are dropped, not queued.
    fn is_active(&self) -> bool;

    /// Switches delivery on or off. An interactive embedder turns delivery
    /// off while it is mid-redraw and back on at the next prompt.
    fn set_active(&self, active: bool);
}

/// A client for the optional storage daemon holding state shared across
/// interpreter processes. Every operation can fail with
/// [`Error::StoreNotConnected`]-like conditions on the transport.
pub trait StoreClient: Send + Sync {
    /// Records a visit to `path` with the given weight.
    fn add_dir_visit(&self, path: &str, weight: f64) -> Result<(), Error>;

    /// Directories by descending score.
    fn ranked_dirs(&self) -> Result<Vec<(String, f64)>, Error>;

    /// Reads a shared variable.
    fn shared_var(&self, name: &str) -> Result<String, Error>;

    /// Writes a shared variable.
    fn set_shared_var(&self, name: &str, value: &str) -> Result<(), Error>;

    /// The daemon's process id, for diagnostics.
    fn pid(&self) -> Result<u32, Error>;
}
