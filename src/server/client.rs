//! Client for connecting to the index server daemon

use crate::query::{SearchHit, SearchOptions};
use crate::server::get_socket_path;
use crate::server::protocol::{read_message, write_message, Request, Response, StatusResponse};
use std::io::{BufReader, BufWriter};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Read/write timeout
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Index server is not running")]
    NotRunning,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Server error: {0}")]
    Server(String),
    #[error("Invalid response from server")]
    InvalidResponse,
}

/// Client for the index server
pub struct IndexClient {
    reader: BufReader<UnixStream>,
    writer: BufWriter<UnixStream>,
}

impl IndexClient {
    /// Try to connect to the running daemon
    /// Returns None if daemon is not running (allowing fallback to direct mode)
    pub fn connect() -> Option<Self> {
        let socket_path = get_socket_path();

        if !socket_path.exists() {
            return None;
        }

        let stream = UnixStream::connect(&socket_path).ok()?;
        let _ = stream.set_read_timeout(Some(IO_TIMEOUT));
        let _ = stream.set_write_timeout(Some(IO_TIMEOUT));

        let reader = BufReader::new(stream.try_clone().ok()?);
        let writer = BufWriter::new(stream);

        Some(Self { reader, writer })
    }

    /// Connect or return an error (for when daemon is required)
    pub fn connect_required() -> ClientResult<Self> {
        Self::connect().ok_or(ClientError::NotRunning)
    }

    fn call(&mut self, request: &Request) -> ClientResult<Response> {
        write_message(&mut self.writer, request)?;
        match read_message(&mut self.reader)? {
            Response::Error { message } => Err(ClientError::Server(message)),
            response => Ok(response),
        }
    }

    /// Execute a search query
    pub fn search(
        &mut self,
        query: &str,
        index_dirs: &[PathBuf],
        options: &SearchOptions,
    ) -> ClientResult<SearchResult> {
        let request = Request::Search {
            query: query.to_string(),
            index_dirs: index_dirs.to_vec(),
            options: options.clone(),
        };

        match self.call(&request)? {
            Response::Search(sr) => Ok(SearchResult {
                hits: sr.hits,
                duration_ms: sr.duration_ms,
                cached: sr.cached,
            }),
            _ => Err(ClientError::InvalidResponse),
        }
    }

    /// Get server status
    pub fn status(&mut self) -> ClientResult<StatusResponse> {
        match self.call(&Request::Status)? {
            Response::Status(status) => Ok(status),
            _ => Err(ClientError::InvalidResponse),
        }
    }

    /// Request index reload
    pub fn reload(&mut self, index_dirs: &[PathBuf]) -> ClientResult<(bool, String)> {
        let request = Request::Reload {
            index_dirs: index_dirs.to_vec(),
        };

        match self.call(&request)? {
            Response::Reloaded { success, message } => Ok((success, message)),
            _ => Err(ClientError::InvalidResponse),
        }
    }

    /// Request graceful shutdown
    pub fn shutdown(&mut self) -> ClientResult<()> {
        match self.call(&Request::Shutdown)? {
            Response::ShuttingDown => Ok(()),
            _ => Err(ClientError::InvalidResponse),
        }
    }

    /// Ping the server
    pub fn ping(&mut self) -> ClientResult<()> {
        match self.call(&Request::Ping)? {
            Response::Pong => Ok(()),
            _ => Err(ClientError::InvalidResponse),
        }
    }
}

/// Search result from the server
#[derive(Debug)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
    pub duration_ms: f64,
    pub cached: bool,
}
