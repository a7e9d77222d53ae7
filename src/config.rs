//! Configuration registry: environment options overlaid by CLI flags

use crate::packages::DEFAULT_MAX_DEPTH;
use std::path::PathBuf;

pub const ENV_ROOT: &str = "ALSYM_ROOT";
pub const ENV_MAX_DEPTH: &str = "ALSYM_MAX_DEPTH";
pub const ENV_LOG_LEVEL: &str = "ALSYM_LOG_LEVEL";
pub const ENV_CACHE_DIR: &str = "ALSYM_CACHE_DIR";

/// Engine configuration. Each option is documented once, here.
#[derive(Debug, Clone)]
pub struct Config {
    /// Absolute project root anchoring auto-discovery and every relative
    /// subpath the engine resolves. Deliberately has no default: a relative
    /// root combined with an arbitrary host cwd is the classic path bug,
    /// so callers must always pass one explicitly.
    pub root_path: Option<PathBuf>,

    /// How many directory levels below the root discovery walks.
    pub max_depth: usize,

    /// env_logger filter (error, warn, info, debug, trace).
    pub log_level: String,

    /// Extra package cache directory, resolved against the root.
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_path: None,
            max_depth: DEFAULT_MAX_DEPTH,
            log_level: "info".to_string(),
            cache_dir: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(root) = std::env::var(ENV_ROOT) {
            if !root.is_empty() {
                config.root_path = Some(PathBuf::from(root));
            }
        }
        if let Ok(depth) = std::env::var(ENV_MAX_DEPTH) {
            if let Ok(depth) = depth.parse() {
                config.max_depth = depth;
            }
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            if !level.is_empty() {
                config.log_level = level;
            }
        }
        if let Ok(dir) = std::env::var(ENV_CACHE_DIR) {
            if !dir.is_empty() {
                config.cache_dir = Some(PathBuf::from(dir));
            }
        }
        config
    }

    /// CLI flags win over environment values.
    pub fn merge_cli(
        mut self,
        root: Option<PathBuf>,
        log_level: Option<String>,
        cache_dir: Option<PathBuf>,
    ) -> Self {
        if root.is_some() {
            self.root_path = root;
        }
        if let Some(level) = log_level {
            self.log_level = level;
        }
        if cache_dir.is_some() {
            self.cache_dir = cache_dir;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.root_path.is_none());
        assert_eq!(config.max_depth, DEFAULT_MAX_DEPTH);
        assert_eq!(config.log_level, "info");
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default().merge_cli(
            Some(PathBuf::from("/p/proj")),
            Some("debug".to_string()),
            None,
        );
        assert_eq!(config.root_path.as_deref(), Some(std::path::Path::new("/p/proj")));
        assert_eq!(config.log_level, "debug");
    }
}
