use std::collections::HashMap;
use std::env as stdenv;
use std::ffi::OsString;
use std::path::PathBuf;

/// Session state shared by the REPL, the builtins and the process executor.
///
/// The session keeps its own working directory instead of changing the one of the
/// shell process: `cd` only updates `current_dir`, and every spawned child is started
/// inside it. This lets several sessions coexist, which the tests rely on.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Variables passed to every spawned program (PATH is also used for lookup).
    pub vars: HashMap<String, String>,
    /// Working directory of the session.
    pub current_dir: PathBuf,
    /// Home directory of the invoking user, used for the prompt.
    pub home_dir: PathBuf,
    /// Login name of the invoking user.
    pub user: String,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let vars = unicode_vars(stdenv::vars_os());
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let home_dir = dirs::home_dir()
            .or_else(|| vars.get("HOME").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("/"));
        let user = vars
            .get("USER")
            .or_else(|| vars.get("LOGNAME"))
            .cloned()
            .unwrap_or_else(|| "user".to_string());
        Self {
            vars,
            current_dir,
            home_dir,
            user,
        }
    }

    /// Get the value of an environment variable.
    ///
    /// Looks up the key in `self.vars` first, falling back to `std::env::var`.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Interactive prompt, `<home-directory>$ `.
    pub fn prompt(&self) -> String {
        format!("{}$ ", self.home_dir.display())
    }
}

/// Keep the variables that are valid UTF-8; the others are dropped with a warning.
fn unicode_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> HashMap<String, String> {
    vars.into_iter()
        .filter_map(|(key, val)| match (key.into_string(), val.into_string()) {
            (Ok(key), Ok(val)) => Some((key, val)),
            (Ok(key), Err(_)) => {
                log::warn!("skipping environment variable {} with a non-UTF-8 value", key);
                None
            }
            (Err(key), _) => {
                log::warn!("skipping non-UTF-8 environment variable {:?}", key);
                None
            }
        })
        .collect()
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
