//! The interpreter: shared state and the top-level evaluation API.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use reef_syntax::ast::Chunk;
use reef_syntax::Source;
use tokio::sync::watch;

use crate::builtins;
use crate::compile::{self, CompileError, EffectOp};
use crate::error::Error;
use crate::exception::Exception;
use crate::frame::Frame;
use crate::interfaces::{JobEvent, JobNotifier, StoreClient};
use crate::interrupts::Interrupts;
use crate::jobs::JobManager;
use crate::ns::Ns;
use crate::pathsearch::{self, PathSearcher};
use crate::port::{Capture, OpenFile, Port};
use crate::value::Value;

/// Tunables for an interpreter.
#[derive(Clone, Debug)]
pub struct InterpOptions {
    /// Prefix printed before each value on the top-level output port.
    pub value_prefix: String,
    /// How long a foreground pipeline stage may keep running after an
    /// interrupt before it is given up on.
    pub interrupt_grace: Duration,
    /// Overrides `$PATH` for external command lookup.
    pub command_paths: Option<Vec<PathBuf>>,
    /// Whether successfully finished background jobs are reported to the
    /// notifier. Failures are always reported.
    pub notify_bg_job_success: bool,
}

impl Default for InterpOptions {
    fn default() -> Self {
        Self {
            value_prefix: "\u{25b6} ".to_string(),
            interrupt_grace: Duration::from_millis(100),
            command_paths: None,
            notify_bg_job_success: true,
        }
    }
}

/// A compiled chunk, ready to evaluate any number of times.
#[derive(Clone)]
pub struct Op {
    pub(crate) inner: EffectOp,
    pub(crate) src: Arc<Source>,
}

/// Everything an evaluation captured: both output bands plus the result.
#[derive(Debug)]
pub struct CapturedEval {
    pub values: Vec<Value>,
    pub bytes: Vec<u8>,
    pub result: Result<(), Exception>,
}

/// The interpreter: builtin and global namespaces, the job table, the
/// interrupt source, and hooks to the embedding environment.
///
/// An `Interp` is shared behind an `Arc`; every frame holds a handle.
pub struct Interp {
    builtin: Ns,
    global: Ns,
    options: InterpOptions,
    interrupt_tx: watch::Sender<bool>,
    interrupts: Interrupts,
    jobs: JobManager,
    notifier: RwLock<Option<Arc<dyn JobNotifier>>>,
    store: RwLock<Option<Arc<dyn StoreClient>>>,
    before_exit: Mutex<Vec<Box<dyn Fn(&Interp) + Send + Sync>>>,
    paths: PathSearcher,
}

impl Interp {
    pub fn new() -> Arc<Self> {
        Self::with_options(InterpOptions::default())
    }

    pub fn with_options(options: InterpOptions) -> Arc<Self> {
        let (interrupt_tx, interrupts) = Interrupts::new();
        Arc::new(Self {
            builtin: builtins::builtin_ns(),
            global: Ns::new(),
            options,
            interrupt_tx,
            interrupts,
            jobs: JobManager::new(),
            notifier: RwLock::new(None),
            store: RwLock::new(None),
            before_exit: Mutex::new(vec![]),
            paths: PathSearcher::new(),
        })
    }

    pub fn options(&self) -> &InterpOptions {
        &self.options
    }

    /// The namespace of builtin values and functions.
    pub fn builtin(&self) -> &Ns {
        &self.builtin
    }

    /// The global namespace: the local scope of top-level code.
    pub fn global(&self) -> &Ns {
        &self.global
    }

    pub fn jobs(&self) -> &JobManager {
        &self.jobs
    }

    /// Compiles a chunk against the current global and builtin namespaces.
    pub fn compile(&self, chunk: &Chunk, src: Arc<Source>) -> Result<Op, CompileError> {
        let inner = compile::compile(&self.global, chunk, src.clone())?;
        Ok(Op { inner, src })
    }

    /// Evaluates a compiled chunk on a fresh top-level frame wired to the
    /// given ports. Missing ports are padded (null input, discarding
    /// outputs).
    pub async fn eval(self: &Arc<Self>, op: &Op, ports: Vec<Port>) -> Result<(), Exception> {
        let mut ports = ports;
        if ports.is_empty() {
            ports.push(Port::null_input());
        }
        while ports.len() < 3 {
            ports.push(Port::blackhole_output());
        }
        let mut fm = Frame::new(
            self.clone(),
            op.src.clone(),
            self.global.clone(),
            ports,
            self.interrupts.clone(),
        );
        op.inner.exec(&mut fm).await
    }

    /// Compiles and evaluates a chunk, capturing both output bands. The
    /// input port reads end-of-stream.
    pub async fn eval_capture(
        self: &Arc<Self>,
        chunk: &Chunk,
        src: Arc<Source>,
    ) -> Result<CapturedEval, Error> {
        let op = self.compile(chunk, src).map_err(Error::Compile)?;
        let (out, capture) = Port::capture()?;
        let err_out = out.try_clone()?;
        let ports = vec![Port::null_input(), out, err_out];
        let result = self.eval(&op, ports).await;
        let (values, bytes) = capture.collect().await?;
        Ok(CapturedEval {
            values,
            bytes,
            result,
        })
    }

    /// Ports wired to the process's standard streams, with values rendered
    /// onto stdout/stderr after the configured prefix.
    pub fn stdio_ports(&self) -> Result<Vec<Port>, Error> {
        Ok(vec![
            Port::file_input(OpenFile::Stdin),
            Port::file_with_value_relay(OpenFile::Stdout, self.options.value_prefix.clone())?,
            Port::file_with_value_relay(OpenFile::Stderr, self.options.value_prefix.clone())?,
        ])
    }

    /// A capture port pair for ad-hoc output collection.
    pub fn capture_port(&self) -> Result<(Port, Capture), Error> {
        Port::capture()
    }

    /// Raises the interrupt flag observed by all foreground frames.
    pub fn interrupt(&self) {
        tracing::debug!("interrupt raised");
        self.interrupt_tx.send_replace(true);
    }

    /// Clears the interrupt flag, typically before starting a new top-level
    /// evaluation.
    pub fn reset_interrupts(&self) {
        self.interrupt_tx.send_replace(false);
    }

    /// Forwards Ctrl-C to [`Interp::interrupt`] for the life of the
    /// runtime.
    pub fn listen_for_ctrl_c(self: &Arc<Self>) {
        let interp = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                interp.interrupt();
            }
        });
    }

    pub fn set_job_notifier(&self, notifier: Arc<dyn JobNotifier>) {
        *write(&self.notifier) = Some(notifier);
    }

    pub fn set_store(&self, store: Arc<dyn StoreClient>) {
        *write(&self.store) = Some(store);
    }

    /// The attached storage client.
    pub fn store(&self) -> Result<Arc<dyn StoreClient>, Error> {
        read(&self.store).clone().ok_or(Error::StoreNotConnected)
    }

    /// Registers a hook run by [`Interp::run_before_exit`].
    pub fn add_before_exit(&self, hook: impl Fn(&Interp) + Send + Sync + 'static) {
        self.before_exit
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Box::new(hook));
    }

    /// Runs and drains the registered pre-exit hooks. Embedders call this
    /// once before the process exits.
    pub fn run_before_exit(&self) {
        let hooks = std::mem::take(
            &mut *self
                .before_exit
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        for hook in hooks {
            hook(self);
        }
    }

    pub(crate) fn find_command(&self, name: &str) -> Option<PathBuf> {
        match &self.options.command_paths {
            Some(paths) => self.paths.search(name, paths),
            None => self.paths.search(name, &pathsearch::default_paths()),
        }
    }

    pub(crate) fn finish_background(
        &self,
        id: usize,
        description: String,
        result: Result<(), Exception>,
    ) {
        self.jobs.finish_background(id);
        tracing::debug!(job = id, ok = result.is_ok(), "background pipeline finished");
        if result.is_ok() && !self.options.notify_bg_job_success {
            return;
        }
        if let Some(notifier) = read(&self.notifier).clone() {
            if notifier.is_active() {
                notifier.notify(JobEvent {
                    job_id: id,
                    description,
                    result,
                });
            }
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(std::sync::PoisonError::into_inner)
}
