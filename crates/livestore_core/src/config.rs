//! Store configuration.

/// Configuration for opening an object store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync the object log on every commit.
    ///
    /// When false a commit only flushes to the OS, trading crash durability
    /// of the last commits for speed.
    pub sync_on_commit: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_durable() {
        let config = StoreConfig::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_commit);
    }

    #[test]
    fn builder_overrides() {
        let config = StoreConfig::new()
            .create_if_missing(false)
            .sync_on_commit(false);
        assert!(!config.create_if_missing);
        assert!(!config.sync_on_commit);
    }
}
