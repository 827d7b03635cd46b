use std::fmt;
use std::io;
use std::path::PathBuf;

/// Everything that can go wrong while dispatching a single input line.
///
/// None of these terminate the shell; the REPL prints them and prompts again.
#[derive(Debug)]
pub enum ShellError {
    /// The token stream does not form a valid `cmd | cmd | ...` chain.
    MalformedPipeline(String),
    /// The program named by a segment could not be resolved.
    CommandNotFound(String),
    /// The program was found but the OS refused to start it.
    SpawnError { name: String, source: io::Error },
    /// Missing or invalid builtin arguments.
    BuiltinUsageError { name: String, message: String },
    /// A builtin appeared after the first stage of a pipeline.
    BuiltinNotPipeable(String),
    NoSuchDirectory(PathBuf),
    NotADirectory(PathBuf),
    /// Signal delivery failed (`kill`).
    SignalError { pid: i32, source: io::Error },
    /// Reading process or filesystem state failed (`pwd`, `ps`).
    OsQueryError { what: &'static str, source: io::Error },
    Io(io::Error),
}

impl fmt::Display for ShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellError::MalformedPipeline(reason) => write!(f, "malformed pipeline: {}", reason),
            ShellError::CommandNotFound(name) => write!(f, "command not found: {}", name),
            ShellError::SpawnError { name, .. } => write!(f, "{}: failed to spawn", name),
            ShellError::BuiltinUsageError { name, message } => {
                write!(f, "{}: {}", name, message.trim_end())
            }
            ShellError::BuiltinNotPipeable(name) => {
                write!(f, "{}: builtin can only be the first stage of a pipeline", name)
            }
            ShellError::NoSuchDirectory(path) => {
                write!(f, "cd: no such directory: {}", path.display())
            }
            ShellError::NotADirectory(path) => write!(f, "cd: not a directory: {}", path.display()),
            ShellError::SignalError { pid, .. } => write!(f, "kill: ({})", pid),
            ShellError::OsQueryError { what, .. } => write!(f, "{}", what),
            ShellError::Io(_) => write!(f, "IO error"),
        }
    }
}

impl std::error::Error for ShellError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShellError::SpawnError { source, .. }
            | ShellError::SignalError { source, .. }
            | ShellError::OsQueryError { source, .. } => Some(source),
            ShellError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ShellError {
    fn from(err: io::Error) -> Self {
        ShellError::Io(err)
    }
}
