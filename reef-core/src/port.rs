//! Ports: the paired byte/value streams commands read from and write to.
//!
//! Every frame carries at least three ports (input, output, error output).
//! A port has a byte band, backed by an OS file, and a value band, backed by
//! a bounded in-process channel. A command uses whichever band suits it;
//! pipes wire both bands between adjacent pipeline stages.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Write};
use std::process::Stdio;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::Error;
use crate::value::Value;

/// The capacity of the value band of a pipe. Bounded so that a fast producer
/// feeding a slow consumer exerts backpressure instead of buffering without
/// limit.
pub const VALUE_BUFFER: usize = 32;

/// A byte stream endpoint: the standard streams, a file, one end of an OS
/// pipe, or the null device.
#[derive(Debug)]
pub enum OpenFile {
    Stdin,
    Stdout,
    Stderr,
    File(File),
    PipeReader(os_pipe::PipeReader),
    PipeWriter(os_pipe::PipeWriter),
    /// Reads end-of-stream, discards writes.
    Null,
}

impl OpenFile {
    /// Duplicates the endpoint. For real files and pipe ends this duplicates
    /// the descriptor; the byte stream position stays shared.
    pub fn try_dup(&self) -> Result<Self, Error> {
        match self {
            Self::Stdin => Ok(Self::Stdin),
            Self::Stdout => Ok(Self::Stdout),
            Self::Stderr => Ok(Self::Stderr),
            Self::File(f) => Ok(Self::File(f.try_clone()?)),
            Self::PipeReader(r) => Ok(Self::PipeReader(r.try_clone()?)),
            Self::PipeWriter(w) => Ok(Self::PipeWriter(w.try_clone()?)),
            Self::Null => Ok(Self::Null),
        }
    }

    /// Converts into a `Stdio` for wiring up a child process.
    pub fn to_stdio(&self) -> Result<Stdio, Error> {
        match self {
            Self::Stdin | Self::Stdout | Self::Stderr => Ok(Stdio::inherit()),
            Self::File(f) => Ok(Stdio::from(f.try_clone()?)),
            Self::PipeReader(r) => Ok(Stdio::from(r.try_clone()?)),
            Self::PipeWriter(w) => Ok(Stdio::from(w.try_clone()?)),
            Self::Null => Ok(Stdio::null()),
        }
    }

    /// Duplicates the endpoint as an owned descriptor, for mapping into a
    /// child process at descriptors past the standard three.
    #[cfg(unix)]
    pub fn to_owned_fd(&self) -> Result<std::os::fd::OwnedFd, Error> {
        use std::os::fd::AsFd as _;
        match self {
            Self::Stdin => Ok(std::io::stdin().as_fd().try_clone_to_owned()?),
            Self::Stdout => Ok(std::io::stdout().as_fd().try_clone_to_owned()?),
            Self::Stderr => Ok(std::io::stderr().as_fd().try_clone_to_owned()?),
            Self::File(f) => Ok(f.try_clone()?.into()),
            Self::PipeReader(r) => Ok(r.try_clone()?.into()),
            Self::PipeWriter(w) => Ok(w.try_clone()?.into()),
            Self::Null => Ok(File::options().read(true).write(true).open("/dev/null")?.into()),
        }
    }
}

impl Read for OpenFile {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::Stdin => std::io::stdin().read(buf),
            Self::File(f) => f.read(buf),
            Self::PipeReader(r) => r.read(buf),
            Self::Null => Ok(0),
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "not readable",
            )),
        }
    }
}

impl Write for OpenFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Self::Stdout => std::io::stdout().write(buf),
            Self::Stderr => std::io::stderr().write(buf),
            Self::File(f) => f.write(buf),
            Self::PipeWriter(w) => w.write(buf),
            Self::Null => Ok(buf.len()),
            Self::Stdin | Self::PipeReader(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "not writable",
            )),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout => std::io::stdout().flush(),
            Self::Stderr => std::io::stderr().flush(),
            Self::File(f) => f.flush(),
            Self::PipeWriter(w) => w.flush(),
            _ => Ok(()),
        }
    }
}

/// The sending half of a value band. Producers block (asynchronously) when
/// the buffer is full; sending to a band whose reader has gone away fails
/// with [`Error::ReaderGone`].
#[derive(Clone, Debug)]
pub struct ValueSender(mpsc::Sender<Value>);

impl ValueSender {
    pub async fn send(&self, value: Value) -> Result<(), Error> {
        self.0.send(value).await.map_err(|_| Error::ReaderGone)
    }
}

/// The receiving half of a value band. Clones share one receiver, so a port
/// can be forked into several frames while values are still consumed exactly
/// once.
#[derive(Clone, Debug)]
pub struct ValueReceiver(Arc<tokio::sync::Mutex<mpsc::Receiver<Value>>>);

impl ValueReceiver {
    fn new(rx: mpsc::Receiver<Value>) -> Self {
        Self(Arc::new(tokio::sync::Mutex::new(rx)))
    }

    /// Receives the next value, or `None` once every sender is gone and the
    /// buffer is empty.
    pub async fn recv(&self) -> Option<Value> {
        self.0.lock().await.recv().await
    }

    /// Stops accepting values and discards anything buffered. Upstream
    /// senders unblock with [`Error::ReaderGone`], which keeps a pipeline
    /// live when a downstream stage exits without reading its input.
    pub async fn close_and_drain(&self) {
        let mut rx = self.0.lock().await;
        rx.close();
        while rx.try_recv().is_ok() {}
    }
}

/// One port of a frame: an optional byte band and an optional value band in
/// either direction.
///
/// Which fields are populated encodes the port's shape: a plain file
/// redirection has only `file`; a pipe's write end has `file` and `sender`;
/// its read end has `file` and `receiver`. Reading the value band of a port
/// without a receiver yields end-of-stream; writing the value band of a port
/// without a sender fails with [`Error::NoValueOutput`].
#[derive(Debug, Default)]
pub struct Port {
    pub file: Option<OpenFile>,
    pub sender: Option<ValueSender>,
    pub receiver: Option<ValueReceiver>,
}

impl Port {
    /// An input port that reads end-of-stream on both bands.
    pub fn null_input() -> Self {
        Self {
            file: Some(OpenFile::Null),
            sender: None,
            receiver: None,
        }
    }

    /// An output port that discards both bands.
    pub fn blackhole_output() -> Self {
        let (tx, mut rx) = mpsc::channel(VALUE_BUFFER);
        tokio::spawn(async move { while rx.recv().await.is_some() {} });
        Self {
            file: Some(OpenFile::Null),
            sender: Some(ValueSender(tx)),
            receiver: None,
        }
    }

    /// An input port reading bytes from `file`; the value band reads
    /// end-of-stream.
    pub fn file_input(file: OpenFile) -> Self {
        Self {
            file: Some(file),
            sender: None,
            receiver: None,
        }
    }

    /// An output port writing bytes to `file`; the value band rejects
    /// writes.
    pub fn file_output(file: OpenFile) -> Self {
        Self {
            file: Some(file),
            sender: None,
            receiver: None,
        }
    }

    /// An output port writing bytes to `file` and rendering values onto the
    /// same file, one per line after `prefix`. Used for the top-level output
    /// and error ports. Must be called within a runtime.
    pub fn file_with_value_relay(file: OpenFile, prefix: impl Into<String>) -> Result<Self, Error> {
        let mut dup = file.try_dup()?;
        let prefix = prefix.into();
        let (tx, mut rx) = mpsc::channel::<Value>(VALUE_BUFFER);
        tokio::spawn(async move {
            while let Some(v) = rx.recv().await {
                if writeln!(dup, "{prefix}{}", v.to_display()).is_err() {
                    break;
                }
            }
        });
        Ok(Self {
            file: Some(file),
            sender: Some(ValueSender(tx)),
            receiver: None,
        })
    }

    /// A connected (write end, read end) pair carrying both bands, for
    /// wiring adjacent pipeline stages.
    pub fn pipe() -> Result<(Self, Self), Error> {
        let (r, w) = os_pipe::pipe()?;
        let (tx, rx) = mpsc::channel(VALUE_BUFFER);
        let write = Self {
            file: Some(OpenFile::PipeWriter(w)),
            sender: Some(ValueSender(tx)),
            receiver: None,
        };
        let read = Self {
            file: Some(OpenFile::PipeReader(r)),
            sender: None,
            receiver: Some(ValueReceiver::new(rx)),
        };
        Ok((write, read))
    }

    /// An output port whose two bands are collected into memory. The capture
    /// completes once every clone of the port is dropped. Must be called
    /// within a runtime.
    pub fn capture() -> Result<(Self, Capture), Error> {
        let (tx, mut rx) = mpsc::channel(VALUE_BUFFER);
        let values = tokio::spawn(async move {
            let mut out = Vec::new();
            while let Some(v) = rx.recv().await {
                out.push(v);
            }
            out
        });
        let (mut r, w) = os_pipe::pipe()?;
        let bytes = tokio::task::spawn_blocking(move || {
            let mut buf = Vec::new();
            r.read_to_end(&mut buf)?;
            Ok(buf)
        });
        let port = Self {
            file: Some(OpenFile::PipeWriter(w)),
            sender: Some(ValueSender(tx)),
            receiver: None,
        };
        Ok((port, Capture { values, bytes }))
    }

    /// Duplicates the port: the byte descriptor is duplicated and the value
    /// band handles are shared.
    pub fn try_clone(&self) -> Result<Self, Error> {
        Ok(Self {
            file: match &self.file {
                Some(f) => Some(f.try_dup()?),
                None => None,
            },
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
        })
    }

    /// Writes a value to the value band.
    pub async fn send_value(&self, value: Value) -> Result<(), Error> {
        match &self.sender {
            Some(tx) => tx.send(value).await,
            None => Err(Error::NoValueOutput),
        }
    }

    /// Shuts down the value band's read side, discarding buffered values.
    pub async fn close_input(&self) {
        if let Some(rx) = &self.receiver {
            rx.close_and_drain().await;
        }
    }
}

/// The collection side of [`Port::capture`].
#[derive(Debug)]
pub struct Capture {
    values: tokio::task::JoinHandle<Vec<Value>>,
    bytes: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
}

impl Capture {
    /// Waits for both bands to reach end-of-stream and returns what was
    /// collected. Every clone of the captured port must be dropped first.
    pub async fn collect(self) -> Result<(Vec<Value>, Vec<u8>), Error> {
        let values = self.values.await?;
        let bytes = self.bytes.await??;
        Ok((values, bytes))
    }
}

/// A merged view of a port's two bands as a stream of values: buffered
/// values first, then the byte band split into lines.
#[derive(Debug)]
pub struct InputStream {
    chan: Option<ValueReceiver>,
    lines: Option<tokio::task::JoinHandle<std::io::Result<Vec<String>>>>,
    queued: VecDeque<Value>,
}

impl InputStream {
    /// A stream over the bands of `port`. The handles are independent of the
    /// port, so the caller may keep using the frame while iterating.
    ///
    /// The byte band starts draining on a blocking task right away. The value
    /// band only closes when the upstream stage finishes, so waiting on it
    /// before touching the bytes would wedge against a producer mid-way
    /// through a pipe write larger than the OS buffer. Must be called within
    /// a runtime.
    pub fn from_port(port: &Port) -> Result<Self, Error> {
        let lines = match &port.file {
            None | Some(OpenFile::Null) => None,
            Some(f) => {
                let file = f.try_dup()?;
                Some(tokio::task::spawn_blocking(
                    move || -> std::io::Result<Vec<String>> {
                        use std::io::BufRead as _;
                        std::io::BufReader::new(file).lines().collect()
                    },
                ))
            }
        };
        Ok(Self {
            chan: port.receiver.clone(),
            lines,
            queued: VecDeque::new(),
        })
    }

    /// A stream over a fixed sequence of values.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            chan: None,
            lines: None,
            queued: values.into_iter().collect(),
        }
    }

    /// The next value, or `None` at end of both bands.
    pub async fn next(&mut self) -> Result<Option<Value>, Error> {
        if let Some(v) = self.queued.pop_front() {
            return Ok(Some(v));
        }
        if let Some(chan) = &self.chan {
            if let Some(v) = chan.recv().await {
                return Ok(Some(v));
            }
            self.chan = None;
        }
        if let Some(lines) = self.lines.take() {
            self.queued = lines.await??.into_iter().map(Value::Str).collect();
        }
        Ok(self.queued.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[tokio::test]
    async fn pipe_carries_values_in_order() {
        let (w, r) = Port::pipe().unwrap();
        w.send_value(Value::Int(1)).await.unwrap();
        w.send_value(Value::Int(2)).await.unwrap();
        drop(w);
        let rx = r.receiver.as_ref().unwrap();
        assert_eq!(rx.recv().await, Some(Value::Int(1)));
        assert_eq!(rx.recv().await, Some(Value::Int(2)));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn closed_reader_unblocks_senders() {
        let (w, r) = Port::pipe().unwrap();
        r.close_input().await;
        let err = w.send_value(Value::Int(1)).await.unwrap_err();
        assert!(matches!(err, Error::ReaderGone));
    }

    #[tokio::test]
    async fn file_output_rejects_values() {
        let port = Port::file_output(OpenFile::Null);
        let err = port.send_value(Value::Int(1)).await.unwrap_err();
        assert!(matches!(err, Error::NoValueOutput));
    }

    #[tokio::test]
    async fn capture_collects_both_bands() {
        let (mut port, capture) = Port::capture().unwrap();
        port.send_value(Value::Int(7)).await.unwrap();
        if let Some(file) = &mut port.file {
            file.write_all(b"hello\n").unwrap();
        }
        drop(port);
        let (values, bytes) = capture.collect().await.unwrap();
        assert_eq!(values, vec![Value::Int(7)]);
        assert_eq!(bytes, b"hello\n");
    }

    #[tokio::test]
    async fn input_stream_yields_values_then_byte_lines() {
        let (w, r) = Port::pipe().unwrap();
        w.send_value(Value::Str("v".into())).await.unwrap();
        let mut w = w;
        if let Some(file) = &mut w.file {
            file.write_all(b"line1\nline2\n").unwrap();
        }
        drop(w);
        let mut stream = InputStream::from_port(&r).unwrap();
        drop(r);
        assert_eq!(stream.next().await.unwrap(), Some(Value::Str("v".into())));
        assert_eq!(stream.next().await.unwrap(), Some(Value::Str("line1".into())));
        assert_eq!(stream.next().await.unwrap(), Some(Value::Str("line2".into())));
        assert_eq!(stream.next().await.unwrap(), None);
    }
}
