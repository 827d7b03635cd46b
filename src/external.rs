//! Running pipelines of external programs.
//!
//! Every pipe of an N-stage pipeline lives in a [`PipeArena`] indexed by stage.
//! Each endpoint is taken exactly once, moved into the spawn configuration of the
//! stage that uses it, and closed in the parent when that configuration is dropped
//! right after the spawn. Endpoints nobody took (because a spawn failed) are closed
//! together with the arena before any child is waited on, so no reader is ever kept
//! from seeing end-of-file by a stray writer in the shell.

use crate::command::ExitCode;
use crate::env::Environment;
use crate::error::ShellError;
use crate::io_adapters::{self, Input, Output};
use crate::parser::{Pipeline, Segment};
use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io::{self, PipeReader, PipeWriter};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;

/// A pipeline stage resolved to an executable on disk.
pub struct ExternalCommand {
    name: String,
    program: PathBuf,
    args: Vec<OsString>,
}

impl ExternalCommand {
    /// Resolve `segment` against the session's `PATH` and working directory.
    pub fn resolve(segment: &Segment, env: &Environment) -> Result<Self, ShellError> {
        let search_paths = env.get_var("PATH").unwrap_or_default();
        let program = find_command_path(
            OsStr::new(&search_paths),
            &env.current_dir,
            Path::new(&segment.name),
        )
        .ok_or_else(|| ShellError::CommandNotFound(segment.name.clone()))?;
        Ok(Self {
            name: segment.name.clone(),
            program: program.into_owned(),
            args: segment.args.iter().map(OsString::from).collect(),
        })
    }

    fn command(&self, env: &Environment) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env_clear()
            .envs(env.vars.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&env.current_dir)
            .stderr(Stdio::inherit());
        cmd
    }
}

struct PipeSlot {
    reader: Option<PipeReader>,
    writer: Option<PipeWriter>,
}

/// The N−1 anonymous pipes joining the stages of an N-stage pipeline.
///
/// Pipe `i` carries stdout of stage `i` into stdin of stage `i + 1`.
pub struct PipeArena {
    slots: Vec<PipeSlot>,
}

impl PipeArena {
    pub fn new(stages: usize) -> io::Result<Self> {
        let slots = (1..stages)
            .map(|_| {
                let (reader, writer) = io::pipe()?;
                Ok(PipeSlot {
                    reader: Some(reader),
                    writer: Some(writer),
                })
            })
            .collect::<io::Result<Vec<_>>>()?;
        Ok(Self { slots })
    }

    /// Read end feeding `stage`, `None` for the first stage or if already taken.
    pub fn take_stdin(&mut self, stage: usize) -> Option<PipeReader> {
        let slot = stage.checked_sub(1)?;
        self.slots.get_mut(slot)?.reader.take()
    }

    /// Write end fed by `stage`, `None` for the last stage or if already taken.
    pub fn take_stdout(&mut self, stage: usize) -> Option<PipeWriter> {
        self.slots.get_mut(stage)?.writer.take()
    }

    /// Endpoints still owned by the shell.
    #[cfg(test)]
    fn open_endpoints(&self) -> usize {
        self.slots
            .iter()
            .map(|s| s.reader.is_some() as usize + s.writer.is_some() as usize)
            .sum()
    }
}

/// Final state of one spawned stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaped {
    pub name: String,
    pub pid: u32,
    pub code: ExitCode,
}

/// What happened to a pipeline: every stage that was spawned and then reaped, plus
/// the error that stopped it, if any.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub reaped: Vec<Reaped>,
    pub failure: Option<ShellError>,
}

impl PipelineOutcome {
    fn failed(failure: ShellError) -> Self {
        Self {
            reaped: Vec::new(),
            failure: Some(failure),
        }
    }

    /// Exit status of the pipeline, i.e. of its last stage.
    pub fn into_result(self) -> Result<ExitCode, ShellError> {
        match self.failure {
            Some(e) => Err(e),
            None => Ok(self.reaped.last().map_or(0, |r| r.code)),
        }
    }
}

/// Spawn every stage of `pipeline`, wire them together and wait for all of them.
///
/// On the first stage that cannot be resolved or spawned the remaining stages are
/// skipped; the ones already running are still waited on and reported.
pub fn run_pipeline(
    pipeline: &Pipeline,
    env: &Environment,
    input: Input,
    output: &mut Output<'_>,
) -> PipelineOutcome {
    let segments = pipeline.segments();
    let last = segments.len().saturating_sub(1);

    let mut arena = match PipeArena::new(segments.len()) {
        Ok(arena) => arena,
        Err(e) => return PipelineOutcome::failed(e.into()),
    };
    if let Err(e) = output.flush() {
        return PipelineOutcome::failed(e.into());
    }
    let (first_stdin, feed_bytes) = input.into_parts();
    let (last_stdout, sink) = output.parts();
    let mut first_stdin = Some(first_stdin);
    let mut last_stdout = Some(last_stdout);
    let mut feed_bytes = feed_bytes;
    let mut sink = sink;

    thread::scope(|scope| {
        let mut children: Vec<(String, Child)> = Vec::new();
        let mut helpers = Vec::new();
        let mut failure = None;

        for (stage, segment) in segments.iter().enumerate() {
            let external = match ExternalCommand::resolve(segment, env) {
                Ok(external) => external,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };

            let mut cmd = external.command(env);
            cmd.stdin(match arena.take_stdin(stage) {
                Some(reader) => Stdio::from(reader),
                None => first_stdin.take().unwrap_or_else(Stdio::null),
            });
            cmd.stdout(match arena.take_stdout(stage) {
                Some(writer) => Stdio::from(writer),
                None => last_stdout.take().unwrap_or_else(Stdio::inherit),
            });
            let spawned = cmd.spawn();
            // closes the parent's copies of the endpoints handed to this stage
            drop(cmd);

            let mut child = match spawned {
                Ok(child) => child,
                Err(source) => {
                    failure = Some(ShellError::SpawnError {
                        name: segment.name.clone(),
                        source,
                    });
                    break;
                }
            };
            log::debug!("spawned `{}` as pid {}", external.name, child.id());

            if stage == 0 {
                if let (Some(bytes), Some(stdin)) = (feed_bytes.take(), child.stdin.take()) {
                    helpers.push(scope.spawn(move || io_adapters::feed(stdin, bytes)));
                }
            }
            if stage == last {
                if let (Some(sink), Some(stdout)) = (sink.take(), child.stdout.take()) {
                    helpers.push(scope.spawn(move || io_adapters::drain(stdout, sink).map(|_| ())));
                }
            }
            children.push((external.name, child));
        }

        drop(arena);

        let mut reaped = Vec::with_capacity(children.len());
        for (name, mut child) in children {
            let pid = child.id();
            match child.wait() {
                Ok(status) => {
                    let code = exit_code(status);
                    log::debug!("reaped `{}` (pid {}) with status {}", name, pid, code);
                    reaped.push(Reaped { name, pid, code });
                }
                Err(e) => {
                    log::warn!("failed to wait for `{}` (pid {}): {}", name, pid, e);
                    failure.get_or_insert(ShellError::Io(e));
                }
            }
        }

        for helper in helpers {
            match helper.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failure.get_or_insert(ShellError::Io(e));
                }
                Err(_) => log::warn!("pipeline I/O thread panicked"),
            }
        }

        PipelineOutcome { reaped, failure }
    })
}

/// Map an exit status to the shell convention: the exit code, or `128 + signal`.
pub fn exit_code(exit_status: ExitStatus) -> ExitCode {
    match exit_status.code() {
        Some(x) => x,
        None => terminated_by_signal(exit_status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it names an executable file.
/// - Relative with multiple components (e.g., `bin/sh` or `./foo`): resolved against
///   `current_dir`, returned if it names an executable file.
/// - Single path component (no separators): search each directory in `search_paths`
///   (PATH) and return the first executable file.
/// - Empty path: returns `None`.
pub fn find_command_path<'a>(
    search_paths: &OsStr,
    current_dir: &Path,
    path: &'a Path,
) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => None,
        (Some(x), None) if !path.starts_with(".") => {
            find_in_path(search_paths, x.as_os_str()).map(Cow::Owned)
        }
        _ => {
            let joined = current_dir.join(path);
            find_by_path(&joined).map(|p| Cow::Owned(p.to_owned()))
        }
    }
}

fn find_in_path(search_paths: &OsStr, cmd: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_paths)
        .map(|dir| dir.join(cmd))
        .find(|path| find_by_path(path).is_some())
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if is_executable(path) { Some(path) } else { None }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
