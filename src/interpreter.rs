use crate::builtin::BuiltinRegistry;
use crate::command::ExitCode;
use crate::env::Environment;
use crate::error::ShellError;
use crate::external;
use crate::io_adapters::{Input, Output};
use crate::lexer;
use crate::parser;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// The line that ends the session.
pub const QUIT: &str = "quit";

const SHELL_NAME: &str = env!("CARGO_PKG_NAME");

/// Source of input lines for the REPL.
///
/// Implemented for rustyline's editor; tests drive the loop with scripted input.
/// Any error, end-of-file included, ends the session.
pub trait LineReader {
    fn read_line(&mut self, prompt: &str) -> rustyline::Result<String>;
}

impl LineReader for DefaultEditor {
    fn read_line(&mut self, prompt: &str) -> rustyline::Result<String> {
        let line = self.readline(prompt)?;
        if !line.trim().is_empty() {
            self.add_history_entry(line.as_str())?;
        }
        Ok(line)
    }
}

enum ReplState {
    Prompting,
    Dispatching(String),
    Exited,
}

/// A minimal shell that runs builtins in-process and pipelines of external programs.
///
/// Example
/// ```
/// use pipeshell::{Interpreter, Input, Output};
/// let mut sh = Interpreter::default();
/// let mut out: Vec<u8> = Vec::new();
/// let code = sh
///     .execute_line("echo hello world", Input::Null, &mut Output::Capture(&mut out))
///     .unwrap();
/// assert_eq!(code, 0);
/// assert_eq!(out, b"hello world\n");
/// ```
pub struct Interpreter {
    env: Environment,
    builtins: BuiltinRegistry,
}

impl Interpreter {
    pub fn new(env: Environment, builtins: BuiltinRegistry) -> Self {
        Self { env, builtins }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Tokenize, parse and run one input line.
    ///
    /// A builtin as the first stage runs alone in the shell process and any
    /// downstream stages are reported and ignored. A builtin in a later stage is
    /// rejected. Everything else is spawned as a pipeline.
    pub fn execute_line(
        &mut self,
        line: &str,
        input: Input,
        output: &mut Output<'_>,
    ) -> anyhow::Result<ExitCode> {
        let tokens = lexer::split_into_tokens(line);
        if tokens.is_empty() {
            return Ok(0);
        }
        let pipeline = parser::construct_pipeline(tokens)?;

        let first = pipeline.first();
        if let Some(cmd) = self.builtins.create(&first.name, &first.arg_refs()) {
            if pipeline.len() > 1 {
                eprintln!(
                    "{}: `{}` is a builtin and cannot feed a pipe; ignoring {} downstream stage(s)",
                    SHELL_NAME,
                    first.name,
                    pipeline.len() - 1
                );
            }
            let env = &mut self.env;
            let result = output.with_writer(|w| cmd.execute(w, env))?;
            return result;
        }

        if let Some(segment) = pipeline
            .segments()
            .iter()
            .skip(1)
            .find(|s| self.builtins.contains(&s.name))
        {
            return Err(ShellError::BuiltinNotPipeable(segment.name.clone()).into());
        }

        let code = external::run_pipeline(&pipeline, &self.env, input, output).into_result()?;
        Ok(code)
    }

    /// Drive the Prompting → Dispatching cycle until `quit` or a read failure.
    ///
    /// Errors from a dispatched line are printed and never end the loop. Returns the
    /// number of lines dispatched.
    pub fn run_loop(&mut self, reader: &mut dyn LineReader, output: &mut Output<'_>) -> usize {
        let mut dispatched = 0;
        let mut state = ReplState::Prompting;

        loop {
            state = match state {
                ReplState::Prompting => match reader.read_line(&self.env.prompt()) {
                    Ok(line) if line.trim() == QUIT => ReplState::Exited,
                    Ok(line) => ReplState::Dispatching(line),
                    Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                        ReplState::Exited
                    }
                    Err(err) => {
                        eprintln!("{}: {}", SHELL_NAME, err);
                        ReplState::Exited
                    }
                },
                ReplState::Dispatching(line) => {
                    dispatched += 1;
                    if let Err(err) = self.execute_line(&line, Input::Inherit, output) {
                        eprintln!("{}", error_line(&err));
                    }
                    ReplState::Prompting
                }
                ReplState::Exited => return dispatched,
            };
        }
    }

    /// Interactive session on the controlling terminal.
    pub fn repl(&mut self) -> rustyline::Result<()> {
        let mut rl = DefaultEditor::new()?;
        println!("Welcome, {}! Type '{}' to exit.", self.env.user, QUIT);

        let dispatched = self.run_loop(&mut rl, &mut Output::Inherit);
        log::debug!("session ended after {} line(s)", dispatched);
        Ok(())
    }
}

/// What the REPL prints for a failed line: the error followed by its causes.
fn error_line(err: &anyhow::Error) -> String {
    format!("{}: {:#}", SHELL_NAME, err)
}

impl Default for Interpreter {
    /// Session captured from the current process with the default builtins:
    /// `cd`, `pwd`, `echo`, `kill` and `ps`.
    fn default() -> Self {
        Self::new(Environment::new(), BuiltinRegistry::default())
    }
}
