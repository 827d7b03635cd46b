use crate::command::{CommandFactory, ExecutableCommand, ExitCode};
use crate::env::Environment;
use crate::error::ShellError;
use crate::process;
use anyhow::{Context, Result};
use argh::{EarlyExit, FromArgs};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

/// Built-in commands known to the shell at compile time.
///
/// Builtins run directly in the shell process without spawning a child, which is
/// why they can only ever be the first stage of a pipeline.
pub(crate) trait BuiltinCommand: Sized + 'static {
    /// Canonical name of the command, e.g. "echo" or "cd".
    fn name() -> &'static str;

    /// Parse the argument list. Most builtins delegate to `argh`.
    fn parse(args: &[&str]) -> Result<Self, EarlyExit>;

    /// Executes the command using the provided output stream and session.
    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode>;
}

fn parse_with_argh<T: BuiltinCommand + FromArgs>(args: &[&str]) -> Result<T, EarlyExit> {
    T::from_args(&[T::name()], args)
}

impl<T: BuiltinCommand> ExecutableCommand for T {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment,
    ) -> Result<ExitCode> {
        <T as BuiltinCommand>::execute(*self, stdout, env)
    }
}

/// Result of an argument parse that did not produce a command: either `--help`
/// output or a usage error.
struct InvalidArgs {
    name: &'static str,
    output: String,
    is_error: bool,
}

impl ExecutableCommand for InvalidArgs {
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        _env: &mut Environment,
    ) -> Result<ExitCode> {
        if self.is_error {
            return Err(ShellError::BuiltinUsageError {
                name: self.name.to_string(),
                message: self.output,
            }
            .into());
        }
        stdout.write_all(self.output.as_bytes())?;
        Ok(0)
    }
}

/// Factory for a single builtin type.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<T: BuiltinCommand> CommandFactory for Factory<T> {
    fn name(&self) -> &'static str {
        T::name()
    }

    fn create(&self, args: &[&str]) -> Box<dyn ExecutableCommand> {
        match T::parse(args) {
            Ok(cmd) => Box::new(cmd),
            Err(EarlyExit { output, status }) => Box::new(InvalidArgs {
                name: T::name(),
                output,
                is_error: status.is_err(),
            }),
        }
    }
}

/// Name → factory map consulted before anything is spawned.
pub struct BuiltinRegistry {
    factories: BTreeMap<&'static str, Box<dyn CommandFactory>>,
}

impl BuiltinRegistry {
    /// A registry without any builtins; every command is external.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register a factory under its own name, returning the one it replaced.
    pub fn register(
        &mut self,
        factory: Box<dyn CommandFactory>,
    ) -> Option<Box<dyn CommandFactory>> {
        self.factories.insert(factory.name(), factory)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build a command for `name`, or `None` when it is not a builtin.
    pub fn create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>> {
        self.factories.get(name).map(|f| f.create(args))
    }

    #[cfg(test)]
    fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }
}

impl Default for BuiltinRegistry {
    /// `cd`, `pwd`, `echo`, `kill` and `ps`.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(Factory::<Pwd>::default()));
        registry.register(Box::new(Factory::<Cd>::default()));
        registry.register(Box::new(Factory::<Echo>::default()));
        registry.register(Box::new(Factory::<Kill>::default()));
        registry.register(Box::new(Factory::<Ps>::default()));
        registry
    }
}

#[derive(FromArgs)]
/// Print the current working directory to standard output.
pub struct Pwd {}

impl BuiltinCommand for Pwd {
    fn name() -> &'static str {
        "pwd"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        parse_with_argh(args)
    }

    fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        fs::metadata(&env.current_dir)
            .map_err(|source| ShellError::OsQueryError { what: "pwd", source })?;
        writeln!(stdout, "{}", env.current_dir.display())?;
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Change the current working directory of the session.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    fn name() -> &'static str {
        "cd"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        parse_with_argh(args)
    }

    fn execute(self, _stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
        let Some(target) = self.target.filter(|t| !t.is_empty()) else {
            return Err(ShellError::BuiltinUsageError {
                name: "cd".to_string(),
                message: "usage: cd <directory>".to_string(),
            }
            .into());
        };

        let target = PathBuf::from(target);
        let new_dir = if target.is_absolute() {
            target
        } else {
            env.current_dir.join(target)
        };

        let canonical = match fs::canonicalize(&new_dir) {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ShellError::NoSuchDirectory(new_dir).into());
            }
            Err(e) if e.kind() == io::ErrorKind::NotADirectory => {
                return Err(ShellError::NotADirectory(new_dir).into());
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("cd: can't canonicalize {}", new_dir.display()));
            }
        };
        if !canonical.is_dir() {
            return Err(ShellError::NotADirectory(new_dir).into());
        }

        env.current_dir = canonical;
        Ok(0)
    }
}

/// Write the arguments to standard output, separated by spaces.
///
/// Not parsed with `argh`: echo accepts any words, including ones that look like flags.
/// A leading `-n` suppresses the trailing newline.
pub struct Echo {
    pub no_newline: bool,
    pub args: Vec<String>,
}

impl BuiltinCommand for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        let (no_newline, rest) = match args.split_first() {
            Some((&"-n", rest)) => (true, rest),
            _ => (false, args),
        };
        Ok(Echo {
            no_newline,
            args: rest.iter().map(|s| s.to_string()).collect(),
        })
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        let s = self.args.join(" ");
        if self.no_newline {
            write!(stdout, "{}", s)?;
        } else {
            writeln!(stdout, "{}", s)?;
        }
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Send a signal to a process, SIGTERM unless told otherwise.
pub struct Kill {
    #[argh(option, short = 's', default = "libc::SIGTERM")]
    /// signal number to deliver
    pub signal: i32,

    #[argh(positional)]
    /// id of the process to signal
    pub pid: i32,
}

impl BuiltinCommand for Kill {
    fn name() -> &'static str {
        "kill"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        parse_with_argh(args)
    }

    fn execute(self, _stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        // 0 and negative ids address process groups
        if self.pid <= 0 {
            return Err(ShellError::BuiltinUsageError {
                name: "kill".to_string(),
                message: format!("invalid process id: {}", self.pid),
            }
            .into());
        }
        process::send_signal(self.pid, self.signal).map_err(|source| {
            ShellError::SignalError {
                pid: self.pid,
                source,
            }
        })?;
        log::debug!("sent signal {} to {}", self.signal, self.pid);
        Ok(0)
    }
}

#[derive(FromArgs)]
/// Print a snapshot of the currently running processes.
pub struct Ps {}

impl BuiltinCommand for Ps {
    fn name() -> &'static str {
        "ps"
    }

    fn parse(args: &[&str]) -> Result<Self, EarlyExit> {
        parse_with_argh(args)
    }

    fn execute(self, stdout: &mut dyn Write, _env: &mut Environment) -> Result<ExitCode> {
        let procs = process::list_processes()
            .map_err(|source| ShellError::OsQueryError { what: "ps", source })?;
        writeln!(stdout, "{:>7} {:<4} {}", "PID", "STAT", "COMMAND")?;
        for p in procs {
            writeln!(stdout, "{:>7} {:<4} {}", p.pid, p.state, p.command)?;
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::env as stdenv;
    use std::os::unix::process::ExitStatusExt;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn test_env() -> Environment {
        Environment {
            vars: HashMap::new(),
            current_dir: stdenv::current_dir().unwrap(),
            home_dir: stdenv::temp_dir(),
            user: "tester".to_string(),
        }
    }

    fn make_unique_temp_dir(tag: &str) -> io::Result<PathBuf> {
        let mut p = stdenv::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        p.push(format!("pipeshell_{}_{}_{}", tag, std::process::id(), nanos));
        fs::create_dir_all(&p)?;
        Ok(p)
    }

    fn run(name: &str, args: &[&str], env: &mut Environment) -> (Result<ExitCode>, String) {
        let cmd = BuiltinRegistry::default()
            .create(name, args)
            .expect("builtin registered");
        let mut out = Vec::new();
        let res = cmd.execute(&mut out, env);
        (res, String::from_utf8(out).unwrap())
    }

    fn shell_error(res: Result<ExitCode>) -> ShellError {
        match res.unwrap_err().downcast::<ShellError>() {
            Ok(e) => e,
            Err(other) => panic!("expected ShellError, got {:?}", other),
        }
    }

    #[test]
    fn test_registry_knows_default_builtins() {
        let registry = BuiltinRegistry::default();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["cd", "echo", "kill", "ps", "pwd"]
        );
        assert!(registry.contains("cd"));
        assert!(!registry.contains("ls"));
        assert!(registry.create("ls", &[]).is_none());
    }

    #[test]
    fn test_registry_accepts_new_builtins() {
        struct Hello;
        impl BuiltinCommand for Hello {
            fn name() -> &'static str {
                "hello"
            }
            fn parse(_args: &[&str]) -> Result<Self, EarlyExit> {
                Ok(Hello)
            }
            fn execute(self, stdout: &mut dyn Write, env: &mut Environment) -> Result<ExitCode> {
                writeln!(stdout, "hello {}", env.user)?;
                Ok(0)
            }
        }

        let mut registry = BuiltinRegistry::empty();
        assert!(registry.register(Box::new(Factory::<Hello>::default())).is_none());
        let mut out = Vec::new();
        let code = registry
            .create("hello", &[])
            .unwrap()
            .execute(&mut out, &mut test_env())
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(out, b"hello tester\n");
    }

    #[test]
    fn test_pwd_prints_current_dir() {
        let mut env = test_env();
        let (res, out) = run("pwd", &[], &mut env);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, format!("{}\n", env.current_dir.display()));
    }

    #[test]
    fn test_pwd_reports_vanished_directory() {
        let mut env = test_env();
        env.current_dir =
            stdenv::temp_dir().join(format!("pipeshell_gone_{}", std::process::id()));
        let (res, out) = run("pwd", &[], &mut env);
        assert!(out.is_empty());
        assert!(matches!(
            shell_error(res),
            ShellError::OsQueryError { what: "pwd", .. }
        ));
    }

    #[test]
    fn test_echo_with_and_without_newline() {
        let mut env = test_env();

        let (res, out) = run("echo", &["hello", "world"], &mut env);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, "hello world\n");

        let (res, out) = run("echo", &["-n", "foo", "bar"], &mut env);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, "foo bar");
    }

    #[test]
    fn test_echo_never_fails_on_flag_like_words() {
        let mut env = test_env();
        let (res, out) = run("echo", &["--help", "-x"], &mut env);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, "--help -x\n");

        let (res, out) = run("echo", &[], &mut env);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, "\n");
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let temp = make_unique_temp_dir("cd_abs").expect("failed to create temp dir");
        let canonical_temp = fs::canonicalize(&temp).expect("canonicalize failed");
        let process_cwd = stdenv::current_dir().unwrap();

        let mut env = test_env();
        let (res, _) = run("cd", &[canonical_temp.to_str().unwrap()], &mut env);

        assert_eq!(res.unwrap(), 0);
        assert_eq!(env.current_dir, canonical_temp);
        // the shell process itself never moves
        assert_eq!(stdenv::current_dir().unwrap(), process_cwd);

        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cd_relative_to_session_dir() {
        let temp = make_unique_temp_dir("cd_rel").expect("failed to create temp dir");
        fs::create_dir_all(temp.join("inner")).unwrap();
        let canonical_temp = fs::canonicalize(&temp).unwrap();

        let mut env = test_env();
        env.current_dir = canonical_temp.clone();

        let (res, _) = run("cd", &["inner"], &mut env);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(env.current_dir, canonical_temp.join("inner"));

        let (res, _) = run("cd", &[".."], &mut env);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(env.current_dir, canonical_temp);

        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cd_nonexistent_path_errors() {
        let mut env = test_env();
        let orig = env.current_dir.clone();

        let (res, _) = run("cd", &["/nonexistent-path"], &mut env);

        match shell_error(res) {
            ShellError::NoSuchDirectory(path) => {
                assert_eq!(path, PathBuf::from("/nonexistent-path"))
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(env.current_dir, orig);

        let (res, out) = run("pwd", &[], &mut env);
        assert_eq!(res.unwrap(), 0);
        assert_eq!(out, format!("{}\n", orig.display()));
    }

    #[test]
    fn test_cd_into_file_errors() {
        let temp = make_unique_temp_dir("cd_file").unwrap();
        let file = temp.join("plain.txt");
        fs::write(&file, "x").unwrap();

        let mut env = test_env();
        let orig = env.current_dir.clone();
        let (res, _) = run("cd", &[file.to_str().unwrap()], &mut env);
        assert!(matches!(shell_error(res), ShellError::NotADirectory(_)));
        assert_eq!(env.current_dir, orig);

        let _ = fs::remove_dir_all(&temp);
    }

    #[test]
    fn test_cd_without_argument_is_usage_error() {
        let mut env = test_env();
        let orig = env.current_dir.clone();
        let (res, _) = run("cd", &[], &mut env);
        assert_eq!(shell_error(res).to_string(), "cd: usage: cd <directory>");
        assert_eq!(env.current_dir, orig);
    }

    #[test]
    fn test_help_prints_usage() {
        let mut env = test_env();
        let (res, out) = run("cd", &["--help"], &mut env);
        assert_eq!(res.unwrap(), 0);
        assert!(out.contains("Usage: cd"), "got {:?}", out);
    }

    #[test]
    fn test_kill_terminates_process() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id().to_string();

        let mut env = test_env();
        let (res, _) = run("kill", &[pid.as_str()], &mut env);
        assert_eq!(res.unwrap(), 0);

        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
    }

    #[test]
    fn test_kill_with_explicit_signal() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id().to_string();
        let sigkill = libc::SIGKILL.to_string();

        let (res, _) = run("kill", &["-s", sigkill.as_str(), pid.as_str()], &mut test_env());
        assert_eq!(res.unwrap(), 0);
        assert_eq!(child.wait().unwrap().signal(), Some(libc::SIGKILL));
    }

    #[test]
    fn test_kill_reports_os_error() {
        let pid = i32::MAX.to_string();
        let (res, _) = run("kill", &[pid.as_str()], &mut test_env());
        match shell_error(res) {
            ShellError::SignalError { pid, source } => {
                assert_eq!(pid, i32::MAX);
                assert_eq!(source.raw_os_error(), Some(libc::ESRCH));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_kill_argument_errors() {
        let mut env = test_env();
        for args in [&[][..], &["abc"][..]] {
            let (res, _) = run("kill", args, &mut env);
            match shell_error(res) {
                ShellError::BuiltinUsageError { name, message } => {
                    assert_eq!(name, "kill");
                    assert!(message.contains("pid"), "args {:?}: {:?}", args, message);
                }
                other => panic!("args {:?}: unexpected error {:?}", args, other),
            }
        }

        let (res, _) = run("kill", &["0"], &mut env);
        assert_eq!(shell_error(res).to_string(), "kill: invalid process id: 0");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_ps_lists_own_process() {
        let (res, out) = run("ps", &[], &mut test_env());
        assert_eq!(res.unwrap(), 0);

        let mut lines = out.lines();
        let header = lines.next().unwrap();
        assert!(header.contains("PID") && header.contains("COMMAND"));

        let me = std::process::id().to_string();
        assert!(lines.any(|l| l.split_whitespace().next() == Some(me.as_str())));
    }
}
