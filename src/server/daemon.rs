//! Unix index server daemon
//!
//! Keeps shard sets loaded in memory and serves search requests over a Unix
//! socket. Indexes are keyed by their canonical search directory list.

use crate::index::loader::open_table;
use crate::query::{QueryEngine, SearchHit, SearchOptions, TokenTable};
use crate::server::protocol::{read_message, write_message, Request, Response, SearchResponse, StatusResponse};
use crate::server::{get_pid_path, get_socket_path};
use crate::utils::AppConfig;
use anyhow::{Context, Result};
use lru::LruCache;
use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::num::NonZeroUsize;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::{Duration, Instant};

/// Connection timeout
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Key for cached result lists: the raw query and options without limit
type QueryKey = (String, SearchOptions);

/// Loaded index with its query cache
struct CachedIndex {
    table: Arc<dyn TokenTable>,
    query_cache: Mutex<LruCache<QueryKey, Vec<SearchHit>>>,
}

impl CachedIndex {
    fn new(table: Arc<dyn TokenTable>, cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            table,
            query_cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

/// Statistics for the server
struct ServerStats {
    start_time: Instant,
    queries_served: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl ServerStats {
    fn new() -> Self {
        Self {
            start_time: Instant::now(),
            queries_served: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    fn cache_hit_rate(&self) -> f32 {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f32 / total as f32
        }
    }
}

/// The index server daemon
pub struct IndexServer {
    /// Loaded indexes by canonical search directory list
    indexes: RwLock<HashMap<Vec<PathBuf>, Arc<CachedIndex>>>,
    config: AppConfig,
    stats: ServerStats,
    shutdown: AtomicBool,
}

impl IndexServer {
    /// Create a new index server wrapped in Arc
    pub fn new(config: AppConfig) -> Arc<Self> {
        Arc::new(Self {
            indexes: RwLock::new(HashMap::new()),
            config,
            stats: ServerStats::new(),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Start the server (blocking)
    pub fn run(self: &Arc<Self>) -> Result<()> {
        let socket_path = get_socket_path();
        let pid_path = get_pid_path();

        if let Some(parent) = socket_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Remove stale socket file
        if socket_path.exists() {
            fs::remove_file(&socket_path)?;
        }

        fs::write(&pid_path, format!("{}", std::process::id()))
            .with_context(|| format!("Failed to write {}", pid_path.display()))?;

        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("Failed to bind to {}", socket_path.display()))?;

        // Set socket permissions (user only)
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&socket_path, fs::Permissions::from_mode(0o600))?;
        }

        tracing::info!(socket = %socket_path.display(), "daemon listening");

        for stream in listener.incoming() {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            match stream {
                Ok(stream) => {
                    let _ = stream.set_read_timeout(Some(CONNECTION_TIMEOUT));
                    let _ = stream.set_write_timeout(Some(CONNECTION_TIMEOUT));

                    let server = Arc::clone(self);
                    thread::spawn(move || {
                        if let Err(e) = server.handle_connection(stream) {
                            tracing::warn!("connection error: {:#}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("accept error: {}", e);
                }
            }
        }

        let _ = fs::remove_file(&socket_path);
        let _ = fs::remove_file(&pid_path);
        tracing::info!("daemon stopped");

        Ok(())
    }

    /// Handle a single client connection
    fn handle_connection(&self, stream: UnixStream) -> Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);

        loop {
            let request: Request = match read_message(&mut reader) {
                Ok(req) => req,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    // Client disconnected
                    break;
                }
                Err(e) => {
                    let resp = Response::Error {
                        message: format!("Invalid request: {}", e),
                    };
                    write_message(&mut writer, &resp)?;
                    continue;
                }
            };

            let response = self.handle_request(request);
            write_message(&mut writer, &response)?;

            if matches!(response, Response::ShuttingDown) {
                // Wake the accept loop so it sees the flag
                let _ = UnixStream::connect(get_socket_path());
                break;
            }
        }

        Ok(())
    }

    /// Handle a single request
    pub fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::Search {
                query,
                index_dirs,
                options,
            } => self.handle_search(query, index_dirs, options),

            Request::Status => self.handle_status(),

            Request::Reload { index_dirs } => self.handle_reload(index_dirs),

            Request::Shutdown => {
                self.shutdown.store(true, Ordering::Relaxed);
                Response::ShuttingDown
            }

            Request::Ping => Response::Pong,
        }
    }

    fn handle_search(&self, query: String, index_dirs: Vec<PathBuf>, options: SearchOptions) -> Response {
        let start = Instant::now();

        let key = match canonical_dirs(&index_dirs) {
            Ok(key) => key,
            Err(e) => {
                return Response::Error {
                    message: format!("Invalid path: {}", e),
                }
            }
        };

        let cached = match self.ensure_index_loaded(&key) {
            Ok(cached) => cached,
            Err(e) => {
                return Response::Error {
                    message: format!("Failed to load index: {:#}", e),
                }
            }
        };

        self.stats.queries_served.fetch_add(1, Ordering::Relaxed);
        let cache_key = (query, options.unlimited());

        let hit = cached
            .query_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&cache_key)
            .cloned();

        let (mut hits, from_cache) = match hit {
            Some(hits) => {
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                (hits, true)
            }
            None => {
                self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
                let hits = QueryEngine::new(cached.table.as_ref()).search_with(&cache_key.0, &cache_key.1);
                cached
                    .query_cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .put(cache_key, hits.clone());
                (hits, false)
            }
        };

        if let Some(limit) = options.limit {
            hits.truncate(limit);
        }

        Response::Search(SearchResponse {
            hits,
            duration_ms: start.elapsed().as_secs_f64() * 1000.0,
            cached: from_cache,
        })
    }

    fn handle_status(&self) -> Response {
        let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);

        Response::Status(StatusResponse {
            uptime_secs: self.stats.start_time.elapsed().as_secs(),
            indexes_loaded: indexes.len(),
            total_tokens: indexes.values().map(|c| c.table.token_count()).sum(),
            total_shards: indexes.values().map(|c| c.table.shard_count()).sum(),
            queries_served: self.stats.queries_served.load(Ordering::Relaxed),
            cache_hit_rate: self.stats.cache_hit_rate(),
            loaded_dirs: indexes.keys().cloned().collect(),
        })
    }

    fn handle_reload(&self, index_dirs: Vec<PathBuf>) -> Response {
        let key = match canonical_dirs(&index_dirs) {
            Ok(key) => key,
            Err(e) => {
                return Response::Reloaded {
                    success: false,
                    message: format!("Invalid path: {}", e),
                }
            }
        };

        self.indexes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);

        match self.ensure_index_loaded(&key) {
            Ok(cached) => Response::Reloaded {
                success: true,
                message: format!(
                    "Reloaded {} shards ({} tokens)",
                    cached.table.shard_count(),
                    cached.table.token_count()
                ),
            },
            Err(e) => Response::Reloaded {
                success: false,
                message: format!("Failed to reload: {:#}", e),
            },
        }
    }

    /// Return the index for `key`, loading it on first use
    fn ensure_index_loaded(&self, key: &[PathBuf]) -> Result<Arc<CachedIndex>> {
        // Check with read lock first
        if let Some(cached) = self
            .indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Ok(Arc::clone(cached));
        }

        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);

        // Double-check after acquiring write lock
        if let Some(cached) = indexes.get(key) {
            return Ok(Arc::clone(cached));
        }

        tracing::info!(dirs = ?key, "loading index");
        let opened = open_table(key, &self.config.shard_patterns, self.config.lazy_loading)?;
        if opened.failures > 0 {
            tracing::warn!(failures = opened.failures, "some shards failed to load");
        }

        let cached = Arc::new(CachedIndex::new(opened.table, self.config.effective_cache_size()));
        indexes.insert(key.to_vec(), Arc::clone(&cached));
        tracing::info!(
            shards = cached.table.shard_count(),
            tokens = cached.table.token_count(),
            "index ready"
        );

        Ok(cached)
    }
}

fn canonical_dirs(dirs: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    dirs.iter().map(|d| d.canonicalize()).collect()
}

/// Daemonize the current process
pub fn daemonize(config: AppConfig) -> Result<()> {
    // Fork using double-fork technique for proper daemonization
    match unsafe { libc::fork() } {
        -1 => anyhow::bail!("First fork failed"),
        0 => {
            if unsafe { libc::setsid() } == -1 {
                anyhow::bail!("setsid failed");
            }

            // Second fork to prevent acquiring a controlling terminal
            match unsafe { libc::fork() } {
                -1 => anyhow::bail!("Second fork failed"),
                0 => {
                    unsafe {
                        libc::close(0);
                        libc::close(1);
                        libc::close(2);

                        let null = libc::open(c"/dev/null".as_ptr(), libc::O_RDWR);
                        if null != -1 {
                            libc::dup2(null, 0);
                            libc::dup2(null, 1);
                            libc::dup2(null, 2);
                            if null > 2 {
                                libc::close(null);
                            }
                        }
                    }

                    // Avoid holding mounts
                    let _ = std::env::set_current_dir("/");

                    let server = IndexServer::new(config);
                    if let Err(e) = server.run() {
                        // stderr is closed at this point
                        let _ = fs::write(error_log_path(), format!("{:#}", e));
                    }
                    std::process::exit(0);
                }
                _ => std::process::exit(0),
            }
        }
        _ => {
            // Parent: reap the first child
            unsafe {
                let mut status: libc::c_int = 0;
                libc::wait(&mut status);
            }
            Ok(())
        }
    }
}

/// Where a detached daemon records a fatal startup error
pub fn error_log_path() -> PathBuf {
    get_pid_path().with_extension("err")
}

/// Run the daemon in the foreground
pub fn run_foreground(config: AppConfig) -> Result<()> {
    let server = IndexServer::new(config);
    server.run()
}

/// Stop the running daemon
pub fn stop_daemon() -> Result<bool> {
    let pid_path = get_pid_path();

    if !pid_path.exists() {
        return Ok(false);
    }

    let pid_str = fs::read_to_string(&pid_path)?;
    let pid: i32 = pid_str.trim().parse().context("Corrupt pid file")?;

    unsafe {
        if libc::kill(pid, libc::SIGTERM) == 0 {
            thread::sleep(Duration::from_millis(500));

            if libc::kill(pid, 0) == 0 {
                thread::sleep(Duration::from_secs(1));
                if libc::kill(pid, 0) == 0 {
                    libc::kill(pid, libc::SIGKILL);
                }
            }
        }
    }

    let _ = fs::remove_file(get_socket_path());
    let _ = fs::remove_file(&pid_path);

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CLASSES: &str = "var searchData=[\n  ['taggedcache_1',['TaggedCache',['../classripple_1_1TaggedCache.html',1,'ripple']]],\n  ['taggedpointer_2',['TaggedPointer',['../classripple_1_1TaggedPointer.html',1,'ripple']]]\n];\n";

    fn search_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("classes_13.js"), CLASSES).unwrap();
        dir
    }

    fn search(server: &IndexServer, dir: &TempDir, query: &str, limit: Option<usize>) -> SearchResponse {
        let request = Request::Search {
            query: query.to_string(),
            index_dirs: vec![dir.path().to_path_buf()],
            options: SearchOptions {
                limit,
                ..Default::default()
            },
        };
        match server.handle_request(request) {
            Response::Search(sr) => sr,
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_search_then_cached() {
        let dir = search_dir();
        let server = IndexServer::new(AppConfig::default());

        let first = search(&server, &dir, "tagged", None);
        assert_eq!(first.hits.len(), 2);
        assert!(!first.cached);

        let second = search(&server, &dir, "tagged", Some(1));
        assert!(second.cached);
        assert_eq!(second.hits.len(), 1);
        assert_eq!(second.hits[0], first.hits[0]);
    }

    #[test]
    fn test_status_reports_loaded_index() {
        let dir = search_dir();
        let server = IndexServer::new(AppConfig::default());
        search(&server, &dir, "tagged", None);

        match server.handle_request(Request::Status) {
            Response::Status(status) => {
                assert_eq!(status.indexes_loaded, 1);
                assert_eq!(status.total_shards, 1);
                assert_eq!(status.queries_served, 1);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let dir = search_dir();
        let server = IndexServer::new(AppConfig::default());
        assert_eq!(search(&server, &dir, "handoff", None).hits.len(), 0);

        fs::write(
            dir.path().join("classes_7.js"),
            "var searchData=[['handoff_1',['Handoff',['../structripple_1_1Handoff.html',1,'ripple']]]];",
        )
        .unwrap();
        let reload = server.handle_request(Request::Reload {
            index_dirs: vec![dir.path().to_path_buf()],
        });
        assert!(matches!(reload, Response::Reloaded { success: true, .. }));
        assert_eq!(search(&server, &dir, "handoff", None).hits.len(), 1);
    }

    #[test]
    fn test_missing_dir_is_an_error_response() {
        let server = IndexServer::new(AppConfig::default());
        let response = server.handle_request(Request::Search {
            query: "x".to_string(),
            index_dirs: vec![PathBuf::from("/no/such/search/dir")],
            options: SearchOptions::default(),
        });
        assert!(matches!(response, Response::Error { .. }));
    }

    #[test]
    fn test_lazy_daemon() {
        let dir = search_dir();
        let config = AppConfig {
            lazy_loading: true,
            ..Default::default()
        };
        let server = IndexServer::new(config);
        assert_eq!(search(&server, &dir, "TaggedCache", None).hits.len(), 1);
    }
}
