//! An interactive command shell with pipelines.
//!
//! Each input line is split into tokens, grouped into a pipeline of
//! `program args...` segments separated by `|`, and then either run in-process
//! as a builtin (`cd`, `pwd`, `echo`, `kill`, `ps`) or spawned as a chain of
//! child processes whose standard streams are connected end-to-end.
//!
//! The main entry point is [`Interpreter`]. Builtins are looked up in a
//! [`BuiltinRegistry`], so new ones can be registered without touching dispatch.

pub mod builtin;
pub mod command;
pub mod env;
pub mod error;
pub mod external;
pub mod interpreter;
pub mod io_adapters;
pub mod lexer;
pub mod parser;
pub mod process;

pub use builtin::BuiltinRegistry;
pub use error::ShellError;
pub use interpreter::{Interpreter, LineReader};
pub use io_adapters::{Input, Output};
