//! Layered configuration files resolve into working stores.

use std::fs;

use kyrostore::config::{deep_merge, load_layers};
use kyrostore::{BackendKind, ConfigError, ObjectStore, Settings, StoreError, StoreFactory};

use tempfile::tempdir;

#[test]
fn test_later_file_overrides_leaves() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    let base = dir.path().join("kyrostore.yaml");
    let secret = dir.path().join("kyrostore-secret.yaml");

    fs::write(
        &base,
        format!(
            "default: local\n\
             caches:\n\
             \x20 local:\n\
             \x20   class_: dict\n\
             \x20   bucket: public\n\
             \x20   path: {}\n\
             \x20 remote:\n\
             \x20   class_: kv\n\
             \x20   bucket: shared\n\
             \x20   url: memory://layered\n",
            data.display()
        ),
    )
    .unwrap();
    fs::write(
        &secret,
        "default: remote\n\
         caches:\n\
         \x20 local:\n\
         \x20   bucket: private\n",
    )
    .unwrap();

    let settings = Settings::load_from(&[&base, &secret]).unwrap();
    assert_eq!(settings.sources, vec![base.clone(), secret.clone()]);
    assert_eq!(settings.default_profile(), Some("remote"));

    let local = settings.profile("local").unwrap();
    assert_eq!(local.bucket.as_deref(), Some("private"));
    assert_eq!(local.class.as_deref(), Some("dict"));
    assert_eq!(local.path.as_deref(), Some(data.as_path()));

    let factory = StoreFactory::from_settings(settings);
    let default = factory.open_default().unwrap();
    assert_eq!(default.kind(), BackendKind::Kv);

    let local = factory.open("local").unwrap();
    local.put("k", "v".into()).unwrap();
    assert!(data.join("private.dict").exists());
}

#[test]
fn test_unparseable_layer_is_skipped() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good.yaml");
    let bad = dir.path().join("bad.yaml");
    fs::write(&good, "caches: {a: {class_: file, bucket: b}}\n").unwrap();
    fs::write(&bad, "caches: {a: [\n").unwrap();

    let (merged, loaded) = load_layers(&[good.clone(), bad.clone(), dir.path().join("missing.yaml")]);
    assert_eq!(loaded, vec![good]);
    let settings: Settings = serde_yaml::from_value(merged).unwrap();
    assert_eq!(settings.profile("a").unwrap().bucket.as_deref(), Some("b"));

    assert!(matches!(
        Settings::load_from(&[bad]),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_deep_merge_keeps_untouched_profiles() {
    let mut base: serde_yaml::Value =
        serde_yaml::from_str("caches: {a: {class_: dict}, b: {class_: kv}}").unwrap();
    deep_merge(
        &mut base,
        serde_yaml::from_str("caches: {b: {url: 'memory://x'}}").unwrap(),
    );
    let settings: Settings = serde_yaml::from_value(base).unwrap();
    assert_eq!(settings.profile("a").unwrap().class.as_deref(), Some("dict"));
    assert_eq!(settings.profile("b").unwrap().url.as_deref(), Some("memory://x"));
}

#[test]
fn test_unknown_class_is_reported() {
    let settings = Settings::from_yaml("caches: {odd: {class_: MongoStore, bucket: b}}").unwrap();
    let err = StoreFactory::from_settings(settings).open("odd").unwrap_err();
    assert!(matches!(
        err,
        StoreError::Config(ConfigError::UnknownClass { ref class }) if class == "MongoStore"
    ));
}
