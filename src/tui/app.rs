use crate::index::loader::{open_table, OpenedTable};
use crate::index::types::{resolve_anchor, Section};
use crate::query::{QueryEngine, SearchHit, SearchOptions, TokenTable};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Application mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Search,
    Help,
}

/// Index loading state for background loading
pub enum IndexLoadState {
    /// Shards are loading in background
    Loading(Receiver<Result<OpenedTable, String>>),
    /// Index loaded successfully
    Ready,
    /// Loading failed (error message stored in status_message)
    Failed,
}

/// Cached result lists per (query, section filter)
const SEARCH_CACHE_SIZE: usize = 64;

/// Section filters cycled with Ctrl+T
const SECTION_CYCLE: [Option<Section>; 8] = [
    None,
    Some(Section::Classes),
    Some(Section::Functions),
    Some(Section::Variables),
    Some(Section::Typedefs),
    Some(Section::Enums),
    Some(Section::Namespaces),
    Some(Section::Files),
];

/// Application state
pub struct App {
    /// Search directories, in load order
    pub index_dirs: Vec<PathBuf>,
    table: Option<Arc<dyn TokenTable>>,
    pub query: String,
    pub results: Vec<SearchHit>,
    pub selected: usize,
    pub mode: Mode,
    pub previous_mode: Mode,
    pub status_message: String,
    pub section: Option<Section>,
    pub limit: Option<usize>,
    load_state: IndexLoadState,
    search_cache: LruCache<(String, Option<Section>), Vec<SearchHit>>,
}

impl App {
    /// Create the app and start loading shards on a background thread
    pub fn new(index_dirs: Vec<PathBuf>, patterns: Vec<String>, lazy: bool, limit: Option<usize>) -> Self {
        let (tx, rx) = mpsc::channel();
        let dirs_for_thread = index_dirs.clone();

        thread::spawn(move || {
            let result = open_table(&dirs_for_thread, &patterns, lazy).map_err(|e| e.to_string());
            let _ = tx.send(result);
        });

        let mut app = Self::empty(index_dirs, limit);
        app.load_state = IndexLoadState::Loading(rx);
        app.status_message = "Loading index...".to_string();
        app
    }

    /// Create the app over an already loaded table
    #[cfg(test)]
    pub fn with_table(table: Arc<dyn TokenTable>, index_dirs: Vec<PathBuf>, limit: Option<usize>) -> Self {
        let mut app = Self::empty(index_dirs, limit);
        app.status_message = ready_message(table.as_ref());
        app.table = Some(table);
        app
    }

    fn empty(index_dirs: Vec<PathBuf>, limit: Option<usize>) -> Self {
        Self {
            index_dirs,
            table: None,
            query: String::new(),
            results: Vec::new(),
            selected: 0,
            mode: Mode::Search,
            previous_mode: Mode::Search,
            status_message: String::new(),
            section: None,
            limit,
            load_state: IndexLoadState::Ready,
            search_cache: LruCache::new(NonZeroUsize::new(SEARCH_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Check for background index load completion (call this in event loop)
    pub fn poll_index_load(&mut self) {
        let current_state = std::mem::replace(&mut self.load_state, IndexLoadState::Ready);

        match current_state {
            IndexLoadState::Loading(rx) => match rx.try_recv() {
                Ok(Ok(opened)) => {
                    let mut msg = ready_message(opened.table.as_ref());
                    if opened.failures > 0 {
                        msg.push_str(&format!(", {} malformed shards skipped", opened.failures));
                    }
                    self.status_message = msg;
                    self.table = Some(opened.table);

                    // Run the query typed while loading
                    if !self.query.is_empty() {
                        self.execute_search();
                    }
                }
                Ok(Err(e)) => {
                    self.status_message = format!("Index load failed: {}", e);
                    self.load_state = IndexLoadState::Failed;
                }
                Err(TryRecvError::Empty) => {
                    self.load_state = IndexLoadState::Loading(rx);
                }
                Err(TryRecvError::Disconnected) => {
                    self.status_message = "Index load thread terminated unexpectedly".to_string();
                    self.load_state = IndexLoadState::Failed;
                }
            },
            other => {
                self.load_state = other;
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.load_state, IndexLoadState::Loading(_))
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
    }

    pub fn push_char(&mut self, c: char) {
        self.query.push(c);
        self.execute_search();
    }

    pub fn backspace(&mut self) {
        self.query.pop();
        self.execute_search();
    }

    pub fn clear_query(&mut self) {
        self.query.clear();
        self.execute_search();
    }

    /// Delete word backward from query (Ctrl+W)
    pub fn delete_word(&mut self) {
        while self.query.ends_with(' ') {
            self.query.pop();
        }
        while !self.query.is_empty() && !self.query.ends_with(' ') {
            self.query.pop();
        }
        self.execute_search();
    }

    /// Move to the next section filter
    pub fn cycle_section(&mut self) {
        let pos = SECTION_CYCLE.iter().position(|s| *s == self.section).unwrap_or(0);
        self.section = SECTION_CYCLE[(pos + 1) % SECTION_CYCLE.len()];
        self.execute_search();
    }

    /// Re-run the current query (instant for cached queries)
    pub fn execute_search(&mut self) {
        self.selected = 0;

        let Some(table) = self.table.as_ref().map(Arc::clone) else {
            // Results appear once loading finishes
            return;
        };

        if self.query.trim().is_empty() {
            self.results.clear();
            self.status_message = ready_message(table.as_ref());
            return;
        }

        let key = (self.query.clone(), self.section);
        if let Some(cached) = self.search_cache.get(&key) {
            self.results = cached.clone();
            self.status_message = format!("{} matches (cached)", self.results.len());
            return;
        }

        let start = Instant::now();
        let options = SearchOptions {
            section: self.section,
            scope: None,
            limit: self.limit,
        };
        let hits = QueryEngine::new(table.as_ref()).search_with(&self.query, &options);
        self.status_message = format!(
            "{} matches ({:.1}ms)",
            hits.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        self.search_cache.put(key, hits.clone());
        self.results = hits;
    }

    pub fn select_next(&mut self) {
        if !self.results.is_empty() {
            self.selected = (self.selected + 1).min(self.results.len() - 1);
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn select_page_down(&mut self) {
        if !self.results.is_empty() {
            self.selected = (self.selected + 10).min(self.results.len() - 1);
        }
    }

    pub fn select_page_up(&mut self) {
        self.selected = self.selected.saturating_sub(10);
    }

    pub fn select_first(&mut self) {
        self.selected = 0;
    }

    pub fn select_last(&mut self) {
        self.selected = self.results.len().saturating_sub(1);
    }

    pub fn show_help(&mut self) {
        if self.mode != Mode::Help {
            self.previous_mode = self.mode;
            self.mode = Mode::Help;
        }
    }

    pub fn hide_help(&mut self) {
        if self.mode == Mode::Help {
            self.mode = self.previous_mode;
        }
    }

    pub fn get_selected_result(&self) -> Option<&SearchHit> {
        self.results.get(self.selected)
    }

    /// Anchor of the selected hit resolved against the last search directory
    pub fn selected_url(&self) -> Option<String> {
        let hit = self.get_selected_result()?;
        Some(match self.index_dirs.last() {
            Some(dir) => resolve_anchor(&hit.anchor_url, dir),
            None => hit.anchor_url.clone(),
        })
    }

    /// Open the selected anchor in `$BROWSER` (or the platform opener)
    pub fn open_selected(&mut self) {
        let Some(url) = self.selected_url() else {
            return;
        };

        let opener = std::env::var("BROWSER").unwrap_or_else(|_| {
            let fallback = if cfg!(target_os = "macos") { "open" } else { "xdg-open" };
            fallback.to_string()
        });

        let spawned = Command::new(&opener)
            .arg(&url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        self.status_message = match spawned {
            Ok(_) => format!("Opened {}", url),
            Err(e) => format!("Failed to run {}: {}", opener, e),
        };
    }
}

fn ready_message(table: &dyn TokenTable) -> String {
    format!("{} shards, {} tokens", table.shard_count(), table.token_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::loader::IndexLoader;

    const ALL: &str = "var searchData=[\n  ['key_1',['key',['../classripple_1_1TaggedCache.html#a1',1,'ripple::TaggedCache']]],\n  ['key_5f_2',['key_',['../classripple_1_1Key.html',1,'ripple::Key']]],\n  ['keep_5falive_3',['keep_alive',['../structripple_1_1Handoff.html#a3',1,'ripple::Handoff']]]\n];\n";
    const CLASSES: &str = "var searchData=[\n  ['key_4',['Key',['../classripple_1_1Key.html',1,'ripple']]]\n];\n";

    fn app() -> App {
        let mut loader = IndexLoader::new();
        loader.add_payload("all_b", ALL).add_payload("classes_a", CLASSES);
        let index = loader.load().unwrap().index;
        App::with_table(Arc::new(index), vec![PathBuf::from("/docs/html/search")], None)
    }

    #[test]
    fn test_incremental_search() {
        let mut app = app();
        app.push_char('k');
        assert_eq!(app.results.len(), 4);
        app.push_char('e');
        app.push_char('y');
        assert_eq!(app.results[0].token, "key");
        assert!(app.results.iter().all(|h| h.token.contains("key")));

        app.backspace();
        app.backspace();
        app.backspace();
        assert!(app.results.is_empty());
    }

    #[test]
    fn test_cycle_section_filters() {
        let mut app = app();
        app.set_query("key");
        app.cycle_section();
        assert_eq!(app.section, Some(Section::Classes));
        assert_eq!(app.results.len(), 1);
        assert_eq!(app.results[0].display_label, "Key");
    }

    #[test]
    fn test_selection_bounds() {
        let mut app = app();
        app.set_query("k");
        app.execute_search();
        app.select_prev();
        assert_eq!(app.selected, 0);
        app.select_page_down();
        assert_eq!(app.selected, app.results.len() - 1);
        app.select_next();
        assert_eq!(app.selected, app.results.len() - 1);
        app.select_first();
        assert_eq!(app.selected, 0);
    }

    #[test]
    fn test_selected_url_is_resolved() {
        let mut app = app();
        app.set_query("keep_alive");
        app.execute_search();
        assert_eq!(
            app.selected_url().as_deref(),
            Some("file:///docs/html/structripple_1_1Handoff.html#a3")
        );
    }

    #[test]
    fn test_limit_applies() {
        let mut loader = IndexLoader::new();
        loader.add_payload("all_b", ALL);
        let index = loader.load().unwrap().index;
        let mut app = App::with_table(Arc::new(index), Vec::new(), Some(1));
        app.set_query("k");
        app.execute_search();
        assert_eq!(app.results.len(), 1);
    }
}
