//! Running external commands as pipeline stages.

use async_trait::async_trait;

use crate::commands::{Callable, OptMap};
use crate::error::{BadValue, Error};
use crate::exception::Exception;
use crate::frame::Frame;
use crate::value::Value;

/// An external command, callable like any function. The head `cat` resolves
/// to one of these when no `cat~` variable is in scope; `$e:cat~` names one
/// explicitly.
#[derive(Clone, Debug)]
pub struct ExternalCmd {
    pub name: String,
}

impl ExternalCmd {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Callable for ExternalCmd {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(
        &self,
        fm: &mut Frame,
        args: Vec<Value>,
        opts: OptMap,
    ) -> Result<(), Exception> {
        if let Some((name, _)) = opts.first() {
            return Err(fm.except(Error::UnsupportedOption(name.clone())));
        }
        let mut argv = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            match arg.to_text() {
                Some(s) => argv.push(s),
                None => {
                    return Err(fm.except(
                        BadValue::new(
                            format!("argument {}", i + 1),
                            "string or number",
                            arg.kind(),
                        )
                        .into(),
                    ));
                }
            }
        }
        self.run(fm, argv).await.map_err(|e| fm.except(e))
    }
}

impl ExternalCmd {
    #[cfg(unix)]
    async fn run(&self, fm: &Frame, argv: Vec<String>) -> Result<(), Error> {
        use command_fds::CommandFdExt as _;

        use crate::exception::{ExitReason, ExternalCmdExit};

        let path = if self.name.contains('/') {
            std::path::PathBuf::from(&self.name)
        } else {
            fm.interp()
                .find_command(&self.name)
                .ok_or_else(|| Error::CommandNotFound(self.name.clone()))?
        };

        let mut cmd = std::process::Command::new(&path);
        cmd.args(&argv);
        cmd.stdin(port_stdio(fm, 0)?);
        cmd.stdout(port_stdio(fm, 1)?);
        cmd.stderr(port_stdio(fm, 2)?);

        // Ports past the standard three map to the same descriptors in the
        // child.
        let mut mappings = Vec::new();
        for (i, port) in fm.ports.iter().enumerate().skip(3) {
            if let Some(file) = &port.file {
                mappings.push(command_fds::FdMapping {
                    parent_fd: file.to_owned_fd()?,
                    child_fd: i as std::os::fd::RawFd,
                });
            }
        }
        if !mappings.is_empty() {
            cmd.fd_mappings(mappings)
                .map_err(|_| Error::InvalidFd("duplicate descriptor mapping".to_string()))?;
        }

        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::CommandNotFound(self.name.clone()),
            _ => Error::Io(e),
        })?;
        let pid = child.id() as i32;
        tracing::debug!(cmd = %self.name, pid, "spawned external command");

        let status = tokio::task::spawn_blocking(move || {
            nix::sys::wait::waitpid(
                nix::unistd::Pid::from_raw(pid),
                Some(nix::sys::wait::WaitPidFlag::WUNTRACED),
            )
        })
        .await??;

        use nix::sys::wait::WaitStatus;
        match status {
            WaitStatus::Exited(_, 0) => Ok(()),
            WaitStatus::Exited(_, code) => Err(ExternalCmdExit {
                cmd_name: self.name.clone(),
                pid,
                reason: ExitReason::Exited(code),
            }
            .into()),
            WaitStatus::Signaled(_, signal, core_dumped) => Err(ExternalCmdExit {
                cmd_name: self.name.clone(),
                pid,
                reason: ExitReason::Signaled {
                    signal: signal.to_string(),
                    core_dumped,
                },
            }
            .into()),
            WaitStatus::Stopped(_, signal) => {
                // The process still exists; record it so it can be resumed.
                fm.interp().jobs().add_stopped(self.name.clone(), pid);
                Err(ExternalCmdExit {
                    cmd_name: self.name.clone(),
                    pid,
                    reason: ExitReason::Stopped {
                        signal: signal.to_string(),
                    },
                }
                .into())
            }
            other => Err(Error::Io(std::io::Error::other(format!(
                "unexpected wait status: {other:?}"
            )))),
        }
    }

    #[cfg(not(unix))]
    async fn run(&self, _fm: &Frame, _argv: Vec<String>) -> Result<(), Error> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "external commands are only supported on unix",
        )))
    }
}

#[cfg(unix)]
fn port_stdio(fm: &Frame, index: usize) -> Result<std::process::Stdio, Error> {
    match fm.port(index).and_then(|p| p.file.as_ref()) {
        Some(file) => file.to_stdio(),
        None => Ok(std::process::Stdio::null()),
    }
}
