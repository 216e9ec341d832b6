//! Persistent index server for warm searches
//!
//! The daemon keeps parsed shard sets in memory so repeated searches skip
//! loading entirely.
//!
//! Architecture:
//! - `dxi daemon`: loads indexes on demand, listens on a Unix socket,
//!   answers search requests from a per-index result cache
//! - Client: connects to the socket, sends queries, receives ranked hits
//! - Fallback: if the daemon is unavailable the CLI loads shards itself

mod client;
pub mod daemon;
pub mod protocol;

pub use client::{ClientError, IndexClient, SearchResult};

use std::path::PathBuf;

fn runtime_path(file_name: &str, ext: &str) -> PathBuf {
    // Try XDG_RUNTIME_DIR first (most secure, tmpfs-backed)
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(format!("{}.{}", file_name, ext));
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".local").join("run").join(format!("{}.{}", file_name, ext));
    }

    // Last resort: /tmp with user ID
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/{}-{}.{}", file_name, uid, ext))
}

/// Get the socket path for the index server
pub fn get_socket_path() -> PathBuf {
    runtime_path("dxi", "sock")
}

/// Get the PID file path for the daemon
pub fn get_pid_path() -> PathBuf {
    runtime_path("dxi", "pid")
}

/// Check if the daemon is running
pub fn is_daemon_running() -> bool {
    let Ok(pid_str) = std::fs::read_to_string(get_pid_path()) else {
        return false;
    };

    match pid_str.trim().parse::<i32>() {
        // kill(pid, 0) only checks that the process exists
        Ok(pid) => unsafe { libc::kill(pid, 0) == 0 },
        Err(_) => false,
    }
}
