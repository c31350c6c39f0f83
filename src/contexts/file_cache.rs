use crate::data::Cache;
use std::fs;
use std::path::PathBuf;

/// Root folder for cached model responses when none is given.
pub const DEFAULT_CACHE_ROOT: &str = ".biolog/cache";

/// FileCache stores raw model responses on disk.
///
/// The cache is organized as: `{root}/{template_model_hash}/{key}.cache`
/// where template_model_hash = hash(prompt template + model name), so that
/// editing the template or switching models starts from an empty partition.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
    template_model_hash: String,
}

impl FileCache {
    /// # Arguments
    /// * `root` - Optional root folder. If None, defaults to `.biolog/cache`
    /// * `template_model_hash` - Partition name (hex hash)
    pub fn new(root: Option<PathBuf>, template_model_hash: String) -> Self {
        Self {
            root: root.unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_ROOT)),
            template_model_hash,
        }
    }

    fn cache_dir(&self) -> PathBuf {
        self.root.join(&self.template_model_hash)
    }

    /// Keys are hex hashes, which are already safe file names.
    fn cache_path(&self, key: &str) -> PathBuf {
        self.cache_dir().join(format!("{}.cache", key))
    }
}

impl Cache for FileCache {
    /// A missing or unreadable file is a miss.
    fn get(&self, key: &str) -> Option<String> {
        let path = self.cache_path(key);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::debug!(path = %path.display(), "response cache hit");
                Some(contents)
            }
            Err(_) => None,
        }
    }

    /// Best effort: failures are logged and otherwise ignored.
    fn set(&self, key: &str, value: &str) {
        let dir = self.cache_dir();
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to create cache directory");
            return;
        }

        let path = self.cache_path(key);
        if let Err(e) = fs::write(&path, value) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write cache file");
        }
    }
}
