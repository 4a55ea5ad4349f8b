//! Well-known locations used by the daemon.
//!
//! | Purpose | Default | Override |
//! |---------|---------|----------|
//! | Daemon log | `$TMPDIR/turbocache.log` | `TURBOCACHE_LOG_FILE` |
//! | Filesystem provider root | `<temp root>/turbocache` | `TURBOCACHE_FS_DIR` |
//! | Hosted-cache upload staging | `<temp root>/turbocache-staging` | `TURBOCACHE_STAGING_DIR` |
//!
//! The temp root is `RUNNER_TEMP` when running inside a CI runner, otherwise
//! the OS temp directory.

use std::path::PathBuf;

/// Resolved filesystem locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Daemon stdout/stderr target
    pub log_file: PathBuf,
    /// Directory holding `<hash>.bin` files for the filesystem provider
    pub filesystem_dir: PathBuf,
    /// Directory for temporary upload files
    pub staging_dir: PathBuf,
}

impl Paths {
    /// Resolve every path from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve every path through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty()).map(PathBuf::from);

        let temp_root = non_empty("RUNNER_TEMP").unwrap_or_else(std::env::temp_dir);

        Self {
            log_file: non_empty("TURBOCACHE_LOG_FILE")
                .unwrap_or_else(|| std::env::temp_dir().join("turbocache.log")),
            filesystem_dir: non_empty("TURBOCACHE_FS_DIR")
                .unwrap_or_else(|| temp_root.join("turbocache")),
            staging_dir: non_empty("TURBOCACHE_STAGING_DIR")
                .unwrap_or_else(|| temp_root.join("turbocache-staging")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_live_under_temp() {
        let paths = Paths::from_lookup(lookup(&[]));
        let temp = std::env::temp_dir();
        assert_eq!(paths.log_file, temp.join("turbocache.log"));
        assert_eq!(paths.filesystem_dir, temp.join("turbocache"));
    }

    #[test]
    fn test_runner_temp_is_temp_root() {
        let paths = Paths::from_lookup(lookup(&[("RUNNER_TEMP", "/runner/_temp")]));
        assert_eq!(paths.filesystem_dir, PathBuf::from("/runner/_temp/turbocache"));
        assert_eq!(
            paths.staging_dir,
            PathBuf::from("/runner/_temp/turbocache-staging")
        );
        assert_eq!(paths.log_file, std::env::temp_dir().join("turbocache.log"));
    }

    #[test]
    fn test_overrides_win() {
        let paths = Paths::from_lookup(lookup(&[
            ("RUNNER_TEMP", "/runner/_temp"),
            ("TURBOCACHE_LOG_FILE", "/var/log/tc.log"),
            ("TURBOCACHE_FS_DIR", "/data/cache"),
            ("TURBOCACHE_STAGING_DIR", ""),
        ]));
        assert_eq!(paths.log_file, PathBuf::from("/var/log/tc.log"));
        assert_eq!(paths.filesystem_dir, PathBuf::from("/data/cache"));
        assert_eq!(
            paths.staging_dir,
            PathBuf::from("/runner/_temp/turbocache-staging")
        );
    }
}
