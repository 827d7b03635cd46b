//! Where a pipeline's first stdin comes from and where its last stdout goes.
//!
//! Interactive use inherits the terminal on both ends. Tests and embedders can
//! instead feed the first stage from memory and capture the last stage into any
//! `Write + Send` sink; each of those copies runs on its own scoped thread so that
//! neither direction can stall on a full pipe buffer.

use std::io::{self, Write};
use std::process::{ChildStdin, ChildStdout, Stdio};

/// Standard input of the first pipeline stage.
#[derive(Debug, Default)]
pub enum Input {
    /// The shell's own stdin.
    #[default]
    Inherit,
    /// Bytes written to the first stage, followed by end-of-file.
    Bytes(Vec<u8>),
    /// Immediate end-of-file.
    Null,
}

impl Input {
    /// Split into the stdio for the child and the bytes that still need feeding.
    pub(crate) fn into_parts(self) -> (Stdio, Option<Vec<u8>>) {
        match self {
            Input::Inherit => (Stdio::inherit(), None),
            Input::Bytes(bytes) => (Stdio::piped(), Some(bytes)),
            Input::Null => (Stdio::null(), None),
        }
    }
}

/// Standard output of the last pipeline stage and of builtins.
#[derive(Default)]
pub enum Output<'a> {
    /// The shell's own stdout.
    #[default]
    Inherit,
    /// Everything is copied into the sink.
    Capture(&'a mut (dyn Write + Send)),
}

impl<'a> Output<'a> {
    /// Split into the stdio for the last child and the sink that must be drained into.
    pub(crate) fn parts(&mut self) -> (Stdio, Option<&mut (dyn Write + Send)>) {
        match self {
            Output::Inherit => (Stdio::inherit(), None),
            Output::Capture(sink) => (Stdio::piped(), Some(&mut **sink)),
        }
    }

    /// Run `f` against the writer this output stands for, flushing afterwards.
    pub fn with_writer<R>(&mut self, f: impl FnOnce(&mut dyn Write) -> R) -> io::Result<R> {
        match self {
            Output::Inherit => {
                let mut stdout = io::stdout().lock();
                let r = f(&mut stdout);
                stdout.flush()?;
                Ok(r)
            }
            Output::Capture(sink) => {
                let r = f(&mut **sink);
                sink.flush()?;
                Ok(r)
            }
        }
    }

    /// Flush anything the shell itself buffered before children write to the terminal.
    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Inherit => io::stdout().flush(),
            Output::Capture(sink) => sink.flush(),
        }
    }
}

/// Write `bytes` into a child's stdin and close it.
///
/// A child that exits without reading everything is not an error.
pub(crate) fn feed(mut stdin: ChildStdin, bytes: Vec<u8>) -> io::Result<()> {
    match stdin.write_all(&bytes) {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}

/// Copy a child's stdout into `sink` until end-of-file.
pub(crate) fn drain(mut stdout: ChildStdout, sink: &mut (dyn Write + Send)) -> io::Result<u64> {
    let copied = io::copy(&mut stdout, sink)?;
    sink.flush()?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    #[test]
    fn captured_output_receives_builtin_writes() {
        let mut buf: Vec<u8> = Vec::new();
        let mut output = Output::Capture(&mut buf);
        let code = output
            .with_writer(|w| {
                write!(w, "abc").unwrap();
                7
            })
            .unwrap();
        assert_eq!(code, 7);
        drop(output);
        assert_eq!(buf, b"abc");
    }

    #[test]
    fn feed_and_drain_through_cat() {
        let mut child = Command::new("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();
        let stdin = child.stdin.take().unwrap();
        let stdout = child.stdout.take().unwrap();

        let payload = vec![b'x'; 1 << 20];
        let mut sink: Vec<u8> = Vec::new();
        std::thread::scope(|s| {
            let bytes = payload.clone();
            let feeder = s.spawn(move || feed(stdin, bytes));
            let copied = drain(stdout, &mut sink).unwrap();
            assert_eq!(copied, payload.len() as u64);
            feeder.join().unwrap().unwrap();
        });
        assert!(child.wait().unwrap().success());
        assert_eq!(sink, payload);
    }

    #[test]
    fn feed_ignores_early_exit() {
        let mut child = Command::new("true").stdin(Stdio::piped()).spawn().unwrap();
        let stdin = child.stdin.take().unwrap();
        child.wait().unwrap();
        feed(stdin, vec![0u8; 1 << 20]).unwrap();
    }
}
