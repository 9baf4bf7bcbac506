//! Layered YAML configuration.
//!
//! Configuration files are read in precedence order and deep-merged: a later
//! file overrides individual leaves of earlier ones, not whole sections.
//!
//! ```yaml
//! default: local
//! caches:
//!   local:
//!     class_: dict
//!     bucket: scratch
//!     path: /var/cache/kyrostore
//!   shared:
//!     class_: kv
//!     bucket: sessions
//!     url: redis://localhost:6379/0
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_yaml::Value as Yaml;

use crate::error::ConfigError;

/// Environment variable naming an extra configuration file.
pub const CONF_ENV: &str = "KYROSTORE_CONF";

const FILE_STEM: &str = "kyrostore";

/// The closed set of backends.
///
/// Parsed from a profile's `class_`, which also accepts the legacy class names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Embedded dictionary file.
    Dict,
    /// One file per key.
    File,
    /// Cloud object storage.
    Cloud,
    /// Key-value/queue service.
    Kv,
}

impl BackendKind {
    /// Canonical `class_` name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dict => "dict",
            Self::File => "file",
            Self::Cloud => "cloud",
            Self::Kv => "kv",
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dict" | "LocalObjectStore" => Ok(Self::Dict),
            "file" | "FSObjectStore" => Ok(Self::File),
            "cloud" | "s3" | "S3ObjectStore" => Ok(Self::Cloud),
            "kv" | "redis" | "RedisObjectStore" => Ok(Self::Kv),
            other => Err(ConfigError::UnknownClass {
                class: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parameters for one store: a profile from the file, or built inline.
///
/// Every field is optional so profiles can be layered and overridden; the
/// factory checks that the chosen backend has what it needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend name, see [`BackendKind`].
    #[serde(rename = "class_", skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Bucket name; `name/extra` puts `extra` into the prefix on the cloud backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Key prefix inside the bucket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Directory for the dictionary and file backends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Cloud service endpoint, e.g. `http://minio:9000` or `memory://test`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Cloud region.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Cloud access key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    /// Cloud secret key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    /// Kv service URL, e.g. `redis://localhost:6379/0` or `memory://test`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Fsync dictionary writes.
    pub sync_on_write: bool,
}

impl BackendConfig {
    /// An empty config for a backend kind.
    #[must_use]
    pub fn new(kind: BackendKind) -> Self {
        Self {
            class: Some(kind.name().to_string()),
            ..Self::default()
        }
    }

    /// Set the bucket.
    #[must_use]
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Set the prefix.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the directory.
    #[must_use]
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the cloud endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the kv URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// The backend kind, naming `profile` in the error if `class_` is absent.
    pub fn kind(&self, profile: &str) -> Result<BackendKind, ConfigError> {
        self.class
            .as_deref()
            .ok_or_else(|| ConfigError::MissingClass {
                profile: profile.to_string(),
            })?
            .parse()
    }

    /// Fields set in `overlay` replace those set here.
    #[must_use]
    pub fn merged(&self, overlay: &Self) -> Self {
        fn pick<T: Clone>(over: &Option<T>, base: &Option<T>) -> Option<T> {
            over.clone().or_else(|| base.clone())
        }
        Self {
            class: pick(&overlay.class, &self.class),
            bucket: pick(&overlay.bucket, &self.bucket),
            prefix: pick(&overlay.prefix, &self.prefix),
            path: pick(&overlay.path, &self.path),
            endpoint: pick(&overlay.endpoint, &self.endpoint),
            region: pick(&overlay.region, &self.region),
            access_key: pick(&overlay.access_key, &self.access_key),
            secret_key: pick(&overlay.secret_key, &self.secret_key),
            url: pick(&overlay.url, &self.url),
            sync_on_write: overlay.sync_on_write || self.sync_on_write,
        }
    }
}

/// The merged configuration: named profiles plus the default profile name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Profile that `default` resolves to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Profiles by name.
    pub caches: BTreeMap<String, BackendConfig>,
    /// Files that contributed, in load order.
    #[serde(skip)]
    pub sources: Vec<PathBuf>,
}

impl Settings {
    /// Load from every existing file in [`search_paths`].
    #[must_use]
    pub fn load() -> Self {
        let paths = extant_paths(&search_paths());
        let (merged, sources) = load_layers(&paths);
        match Self::from_yaml_value(merged) {
            Ok(settings) => Self { sources, ..settings },
            Err(e) => {
                tracing::warn!(error = %e, "merged configuration is malformed, using empty settings");
                Self::default()
            }
        }
    }

    /// Load from explicit files, in precedence order.
    ///
    /// Unlike [`Settings::load`], a missing or unparseable file is an error.
    pub fn load_from<P: AsRef<Path>>(paths: &[P]) -> Result<Self, ConfigError> {
        let mut merged = Yaml::Null;
        let mut sources = Vec::new();
        for path in paths {
            let path = path.as_ref();
            deep_merge(&mut merged, read_yaml(path)?);
            sources.push(path.to_path_buf());
        }
        Ok(Self {
            sources,
            ..Self::from_yaml_value(merged)?
        })
    }

    /// Parse a single YAML document.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let value: Yaml = serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        Self::from_yaml_value(value)
    }

    fn from_yaml_value(value: Yaml) -> Result<Self, ConfigError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(value).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<merged>"),
            message: e.to_string(),
        })
    }

    /// Look up a profile. `default` follows the top-level `default` key.
    pub fn profile(&self, name: &str) -> Result<&BackendConfig, ConfigError> {
        let resolved = if name == "default" {
            self.default.as_deref().unwrap_or(name)
        } else {
            name
        };
        self.caches
            .get(resolved)
            .ok_or_else(|| ConfigError::UnknownProfile {
                name: resolved.to_string(),
                available: self.caches.keys().cloned().collect(),
            })
    }

    /// Name of the default profile, if one is set.
    #[must_use]
    pub fn default_profile(&self) -> Option<&str> {
        self.default.as_deref()
    }
}

/// Candidate configuration files, lowest precedence first.
#[must_use]
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(format!("/usr/local/etc/{FILE_STEM}.yaml"))];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(format!(".{FILE_STEM}.yaml")));
    }
    if let Some(conf) = std::env::var_os(CONF_ENV).filter(|v| !v.is_empty()) {
        paths.push(PathBuf::from(conf));
    }
    for dir in ["..", "."] {
        for name in [
            format!("{FILE_STEM}.yaml"),
            format!("{FILE_STEM}-secret.yaml"),
            format!(".{FILE_STEM}.yaml"),
            format!(".{FILE_STEM}-secret.yaml"),
        ] {
            paths.push(if dir == "." {
                PathBuf::from(name)
            } else {
                Path::new(dir).join(name)
            });
        }
    }
    paths
}

/// The subset of `paths` that exist.
#[must_use]
pub fn extant_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths.iter().filter(|p| p.is_file()).cloned().collect()
}

/// Merge `overlay` into `base`. Mappings merge key by key; anything else
/// in `overlay` replaces what `base` had.
pub fn deep_merge(base: &mut Yaml, overlay: Yaml) {
    match (base, overlay) {
        (Yaml::Mapping(base), Yaml::Mapping(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (_, Yaml::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

/// Read and merge files, skipping any that fail to read or parse.
///
/// Returns the merged document and the files that contributed.
pub fn load_layers(paths: &[PathBuf]) -> (Yaml, Vec<PathBuf>) {
    let mut merged = Yaml::Null;
    let mut loaded = Vec::new();
    for path in paths {
        match read_yaml(path) {
            Ok(doc) => {
                tracing::debug!(path = %path.display(), "loaded configuration");
                deep_merge(&mut merged, doc);
                loaded.push(path.clone());
            }
            Err(e) => tracing::warn!(error = %e, "skipping configuration file"),
        }
    }
    (merged, loaded)
}

fn read_yaml(path: &Path) -> Result<Yaml, ConfigError> {
    let text = fs::read_to_string(path).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
