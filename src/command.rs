use crate::env::Environment;
use anyhow::Result;
use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// Children terminated by a signal report `128 + signal`, as POSIX shells do.
pub type ExitCode = i32;

/// Object-safe trait for a parsed builtin invocation, ready to run in-process.
pub trait ExecutableCommand {
    /// Executes the command, writing its output to `stdout`.
    ///
    /// Errors are returned rather than printed; the REPL reports them.
    fn execute(self: Box<Self>, stdout: &mut dyn Write, env: &mut Environment)
    -> Result<ExitCode>;
}

/// Creates command instances for one builtin name.
///
/// Factories are registered by [`name`](CommandFactory::name) in the builtin
/// registry, so adding a builtin never touches the dispatch code.
pub trait CommandFactory {
    /// Name the factory answers to, e.g. "cd".
    fn name(&self) -> &'static str;

    /// Parse `args` into an executable command.
    ///
    /// Argument errors are deferred to execution so they surface like any other
    /// command failure.
    fn create(&self, args: &[&str]) -> Box<dyn ExecutableCommand>;
}
