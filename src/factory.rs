//! Builds stores from configuration.
//!
//! A [`StoreFactory`] holds the merged [`Settings`] and a [`ConnectionPool`].
//! Stores it builds share the pool, so two profiles pointing at the same kv
//! URL share one connection.
//!
//! ```
//! use kyrostore::config::{BackendConfig, BackendKind};
//! use kyrostore::factory::StoreFactory;
//! use kyrostore::storage::ObjectStore;
//!
//! let factory = StoreFactory::default();
//! let store = factory
//!     .build(&BackendConfig::new(BackendKind::Kv).bucket("docs").url("memory://doctest"))
//!     .unwrap();
//! store.put("greeting", "hello".into()).unwrap();
//! assert_eq!(store.get("greeting").unwrap().as_text(), Some("hello"));
//! ```

use std::path::Path;
use std::sync::Arc;

use crate::config::{BackendConfig, BackendKind, Settings};
use crate::error::{ConfigError, StoreResult};
use crate::namespace::Namespace;
use crate::pool::ConnectionPool;
use crate::storage::cloud::CloudStore;
use crate::storage::dict::DictStore;
use crate::storage::file::FileStore;
use crate::storage::kv::KvStore;
use crate::storage::ObjectStore;
use crate::store::Store;

/// Something that can be turned into a store.
#[derive(Debug, Clone)]
pub enum StoreSpec {
    /// A profile name from the settings.
    Named(String),
    /// Inline parameters.
    Inline(BackendConfig),
    /// An already built store, passed through unchanged.
    Store(Store),
}

impl From<&str> for StoreSpec {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<BackendConfig> for StoreSpec {
    fn from(config: BackendConfig) -> Self {
        Self::Inline(config)
    }
}

impl From<Store> for StoreSpec {
    fn from(store: Store) -> Self {
        Self::Store(store)
    }
}

/// Resolves profiles and builds stores.
#[derive(Debug, Clone, Default)]
pub struct StoreFactory {
    settings: Settings,
    pool: Arc<ConnectionPool>,
}

impl StoreFactory {
    /// A factory over the configuration files on the search path.
    #[must_use]
    pub fn new() -> Self {
        Self::from_settings(Settings::load())
    }

    /// A factory over explicit settings.
    #[must_use]
    pub fn from_settings(settings: Settings) -> Self {
        Self::with_pool(settings, Arc::new(ConnectionPool::new()))
    }

    /// A factory sharing an existing pool.
    #[must_use]
    pub fn with_pool(settings: Settings, pool: Arc<ConnectionPool>) -> Self {
        Self { settings, pool }
    }

    /// Merged settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Shared connection pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Build the store for a named profile. `default` follows the settings'
    /// `default` key.
    pub fn open(&self, name: &str) -> StoreResult<Store> {
        self.open_with(name, &BackendConfig::default())
    }

    /// Build a named profile with some parameters replaced.
    pub fn open_with(&self, name: &str, overrides: &BackendConfig) -> StoreResult<Store> {
        let profile = self.settings.profile(name)?;
        let config = profile.merged(overrides);
        config.kind(name)?;
        self.build(&config)
    }

    /// Build the default profile.
    pub fn open_default(&self) -> StoreResult<Store> {
        self.open("default")
    }

    /// Build a store from inline parameters.
    pub fn build(&self, config: &BackendConfig) -> StoreResult<Store> {
        let kind = config.kind("<inline>")?;
        let bucket = required(kind, "bucket", config.bucket.as_deref())?;
        let prefix = config.prefix.as_deref().unwrap_or_default();
        tracing::debug!(%kind, bucket, prefix, "building store");

        let store = match kind {
            BackendKind::Dict => {
                let path = required_path(kind, config.path.as_deref())?;
                let ns = Namespace::new(bucket, prefix)?;
                Store::Dict(DictStore::open(path, ns, config.sync_on_write)?)
            }
            BackendKind::File => {
                let path = required_path(kind, config.path.as_deref())?;
                let ns = Namespace::new(bucket, prefix)?;
                Store::File(FileStore::open(path, ns)?)
            }
            BackendKind::Cloud => {
                let client = self.pool.object_client(config)?;
                Store::Cloud(CloudStore::open(client, bucket, prefix)?)
            }
            BackendKind::Kv => {
                let url = required(kind, "url", config.url.as_deref())?;
                let ns = Namespace::new(bucket, prefix)?;
                Store::Kv(KvStore::new(self.pool.kv(url)?, ns))
            }
        };
        Ok(store)
    }

    /// Turn a name, inline parameters or a store into a store.
    pub fn resolve(&self, spec: impl Into<StoreSpec>) -> StoreResult<Store> {
        match spec.into() {
            StoreSpec::Named(name) => self.open(&name),
            StoreSpec::Inline(config) => self.build(&config),
            StoreSpec::Store(store) => Ok(store),
        }
    }

    /// A child of `store` that may live on a different backend.
    ///
    /// `config` keeps `store`'s bucket and gets the child prefix. If it
    /// names no class, or the same class as `store`, this is just
    /// [`ObjectStore::sub`] and shares the connection.
    pub fn sub_with(
        &self,
        store: &Store,
        parts: &[&str],
        config: &BackendConfig,
    ) -> StoreResult<Store> {
        let same_kind = match config.class.as_deref() {
            None => true,
            Some(class) => class.parse::<BackendKind>()? == store.kind(),
        };
        if same_kind {
            return store.sub(parts);
        }
        let ns = store.namespace().child(parts);
        let config = config.merged(
            &BackendConfig::default()
                .bucket(ns.bucket())
                .prefix(ns.prefix()),
        );
        self.build(&config)
    }
}

fn required<'a>(
    kind: BackendKind,
    field: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, ConfigError> {
    value.ok_or_else(|| ConfigError::MissingField {
        class: kind.name().to_string(),
        field: field.to_string(),
    })
}

fn required_path(kind: BackendKind, value: Option<&Path>) -> Result<&Path, ConfigError> {
    value.ok_or_else(|| ConfigError::MissingField {
        class: kind.name().to_string(),
        field: "path".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use tempfile::tempdir;

    fn settings(dir: &Path) -> Settings {
        Settings::from_yaml(&format!(
            "default: local\n\
             caches:\n\
             \x20 local: {{class_: LocalObjectStore, bucket: scratch, path: '{dir}'}}\n\
             \x20 files: {{class_: file, bucket: blobs, prefix: base, path: '{dir}'}}\n\
             \x20 shared: {{class_: redis, bucket: sessions, url: 'memory://factory'}}\n\
             \x20 broken: {{bucket: nope}}\n",
            dir = dir.display()
        ))
        .unwrap()
    }

    #[test]
    fn test_open_default_profile() {
        let dir = tempdir().unwrap();
        let factory = StoreFactory::from_settings(settings(dir.path()));
        let store = factory.open_default().unwrap();
        assert_eq!(store.kind(), BackendKind::Dict);
        assert_eq!(store.namespace().bucket(), "scratch");
    }

    #[test]
    fn test_unknown_profile_lists_names() {
        let dir = tempdir().unwrap();
        let factory = StoreFactory::from_settings(settings(dir.path()));
        let err = factory.open("nope").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("No configuration for object store named 'nope'"));
        assert!(msg.contains("broken, files, local, shared"));
    }

    #[test]
    fn test_missing_class() {
        let dir = tempdir().unwrap();
        let factory = StoreFactory::from_settings(settings(dir.path()));
        assert!(matches!(
            factory.open("broken"),
            Err(StoreError::Config(ConfigError::MissingClass { .. }))
        ));
    }

    #[test]
    fn test_missing_field() {
        let factory = StoreFactory::default();
        let err = factory
            .build(&BackendConfig::new(BackendKind::Dict).bucket("b"))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Config(ConfigError::MissingField { ref field, .. }) if field == "path"
        ));
    }

    #[test]
    fn test_overrides_replace_profile_fields() {
        let dir = tempdir().unwrap();
        let factory = StoreFactory::from_settings(settings(dir.path()));
        let store = factory
            .open_with("files", &BackendConfig::default().prefix("other"))
            .unwrap();
        assert_eq!(store.namespace().prefix(), "other");
    }

    #[test]
    fn test_profiles_share_kv_connection() {
        let dir = tempdir().unwrap();
        let factory = StoreFactory::from_settings(settings(dir.path()));
        let a = factory.open("shared").unwrap();
        let b = factory
            .build(
                &BackendConfig::new(BackendKind::Kv)
                    .bucket("sessions")
                    .url("memory://factory"),
            )
            .unwrap();
        a.put("k", "v".into()).unwrap();
        assert!(b.exists("k").unwrap());
    }

    #[test]
    fn test_resolve_passes_store_through() {
        let dir = tempdir().unwrap();
        let factory = StoreFactory::from_settings(settings(dir.path()));
        let store = factory.open("shared").unwrap();
        let same = factory.resolve(store.clone()).unwrap();
        assert_eq!(same, store);
        assert_eq!(factory.resolve("files").unwrap().kind(), BackendKind::File);
    }

    #[test]
    fn test_sub_with_switches_backend() {
        let dir = tempdir().unwrap();
        let factory = StoreFactory::from_settings(settings(dir.path()));
        let local = factory.open("local").unwrap();

        let moved = factory
            .sub_with(
                &local,
                &["cache"],
                &BackendConfig::new(BackendKind::Kv).url("memory://sub-with"),
            )
            .unwrap();
        assert_eq!(moved.kind(), BackendKind::Kv);
        assert_eq!(moved.namespace().bucket(), "scratch");
        assert_eq!(moved.namespace().prefix(), "cache");

        let same = factory
            .sub_with(&local, &["cache"], &BackendConfig::default())
            .unwrap();
        assert_eq!(same, local.sub(&["cache"]).unwrap());
    }
}
