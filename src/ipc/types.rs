use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::RequestCache;
use crate::config::{Config, StorageMode};
use crate::debounce::Debouncer;
use crate::insights::{LessonStatusMetrics, MetricsKey, ProgressKey, StudentProgress};
use crate::store::{open_store, Store, StoreError};
use crate::validation::ValidationContext;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub store: Option<Box<dyn Store>>,
    pub config: Config,
    /// `--config` path; when unset the config is re-read from each selected workspace.
    pub config_path: Option<PathBuf>,
    pub progress_cache: RequestCache<ProgressKey, StudentProgress>,
    pub metrics_cache: RequestCache<MetricsKey, LessonStatusMetrics>,
    pub conflict_checks: Debouncer<String>,
    /// Responses produced after their request returned (debounced checks).
    pub outbox: Sender<serde_json::Value>,
}

impl AppState {
    pub fn new(config: Config, config_path: Option<PathBuf>, outbox: Sender<serde_json::Value>) -> Self {
        let ttl = Duration::from_secs(config.cache.ttl_secs);
        let debounce = Duration::from_millis(config.schedule.conflict_debounce_ms);
        Self {
            workspace: None,
            store: None,
            config_path,
            progress_cache: RequestCache::new("student_progress", ttl),
            metrics_cache: RequestCache::new("lesson_status_metrics", ttl),
            conflict_checks: Debouncer::new("schedule_conflicts", debounce),
            outbox,
            config,
        }
    }

    /// Swaps in a new config, rebuilding what depends on its timings.
    pub fn apply_config(&mut self, config: Config) {
        let ttl = Duration::from_secs(config.cache.ttl_secs);
        let debounce = Duration::from_millis(config.schedule.conflict_debounce_ms);
        if ttl != Duration::from_secs(self.config.cache.ttl_secs) {
            self.progress_cache = RequestCache::new("student_progress", ttl);
            self.metrics_cache = RequestCache::new("lesson_status_metrics", ttl);
        }
        if debounce != self.conflict_checks.delay() {
            self.conflict_checks.cancel_all();
            self.conflict_checks = Debouncer::new("schedule_conflicts", debounce);
        }
        self.config = config;
    }

    /// Opens `path` before touching current state; on failure the previous
    /// workspace stays selected and usable.
    pub fn open_workspace(&mut self, path: &Path, mode: StorageMode) -> Result<(), StoreError> {
        let store = open_store(path, mode)?;
        self.store = Some(store);
        self.workspace = Some(path.to_path_buf());
        self.invalidate_read_models();
        Ok(())
    }

    pub fn invalidate_read_models(&self) {
        self.progress_cache.invalidate_all();
        self.metrics_cache.invalidate_all();
    }

    pub fn validation_context(&self) -> ValidationContext {
        ValidationContext {
            max_students: self.config.classes.max_students,
        }
    }

    pub fn mode(&self) -> Option<StorageMode> {
        self.store.as_ref().map(|s| s.mode())
    }
}
