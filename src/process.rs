//! Thin wrappers over the OS process APIs used by the `kill` and `ps` builtins.

use std::fs;
use std::io;
use std::path::Path;

/// One row of a process snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: i32,
    /// Single-letter scheduler state (`R`, `S`, `Z`, ...).
    pub state: char,
    /// Full command line, or `[comm]` for kernel threads without one.
    pub command: String,
}

/// Deliver `signal` to `pid`.
///
/// The raw OS error is returned untouched so callers can tell `ESRCH` from `EPERM`.
pub fn send_signal(pid: i32, signal: i32) -> io::Result<()> {
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if rc == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Snapshot of the processes visible in `/proc`, ordered by PID.
#[cfg(target_os = "linux")]
pub fn list_processes() -> io::Result<Vec<ProcessInfo>> {
    let mut procs = Vec::new();
    for entry in fs::read_dir("/proc")? {
        let entry = entry?;
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<i32>().ok()) else {
            continue;
        };
        // processes may exit while we walk the directory
        if let Ok(info) = read_process(pid, &entry.path()) {
            procs.push(info);
        }
    }
    procs.sort_by_key(|p| p.pid);
    Ok(procs)
}

#[cfg(not(target_os = "linux"))]
pub fn list_processes() -> io::Result<Vec<ProcessInfo>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process enumeration requires /proc",
    ))
}

fn read_process(pid: i32, dir: &Path) -> io::Result<ProcessInfo> {
    let stat = fs::read_to_string(dir.join("stat"))?;
    let (comm, state) = parse_stat(&stat)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed stat line"))?;

    let cmdline = fs::read(dir.join("cmdline")).unwrap_or_default();
    let command = if cmdline.is_empty() {
        format!("[{}]", comm)
    } else {
        cmdline
            .split(|b| *b == 0)
            .filter(|arg| !arg.is_empty())
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join(" ")
    };

    Ok(ProcessInfo {
        pid,
        state,
        command,
    })
}

/// Extract `comm` and the state letter from a `/proc/<pid>/stat` line.
///
/// `comm` may itself contain spaces and parentheses, so it spans up to the last `)`.
fn parse_stat(stat: &str) -> Option<(&str, char)> {
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    if close < open {
        return None;
    }
    let comm = &stat[open + 1..close];
    let state = stat[close + 1..].trim_start().chars().next()?;
    Some((comm, state))
}
