//! Behaviour every backend must share.
//!
//! Each test runs against the dictionary and file stores on a scratch
//! directory and against the cloud and kv stores on their in-memory services.

use kyrostore::{BackendConfig, BackendKind, ObjectStore, Store, StoreFactory, Value};

use serde_json::json;
use tempfile::{tempdir, TempDir};

struct Backends {
    _dir: TempDir,
    stores: Vec<Store>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn backends(bucket: &str) -> Backends {
    init_tracing();
    let dir = tempdir().unwrap();
    let factory = StoreFactory::default();
    let configs = [
        BackendConfig::new(BackendKind::Dict).path(dir.path()),
        BackendConfig::new(BackendKind::File).path(dir.path()),
        BackendConfig::new(BackendKind::Cloud).endpoint("memory://contract"),
        BackendConfig::new(BackendKind::Kv).url("memory://contract"),
    ];
    let stores = configs
        .iter()
        .map(|config| factory.build(&config.clone().bucket(bucket)).unwrap())
        .collect();
    Backends { _dir: dir, stores }
}

fn sorted(store: &Store, prefix: &str, recursive: bool) -> Vec<String> {
    let mut keys: Vec<String> = store
        .list(prefix, recursive)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    keys.sort();
    keys
}

#[test]
fn test_round_trip_each_value_kind() {
    for store in backends("roundtrip").stores {
        let cases = [
            ("text", Value::from("hello")),
            ("bytes", Value::from(vec![0u8, 159, 146, 150])),
            ("json", Value::Json(json!({"a": [1, 2, 3], "b": null}))),
            ("object", Value::from_serialize(&std::collections::HashMap::from([((1, 2), "x")])).unwrap()),
        ];
        for (key, value) in cases {
            store.put(key, value.clone().into()).unwrap();
            assert_eq!(store.get(key).unwrap(), value, "{store} {key}");
        }
    }
}

#[test]
fn test_overwrite_replaces_value() {
    for store in backends("overwrite").stores {
        store.put("k", "one".into()).unwrap();
        store.put("k", "two".into()).unwrap();
        assert_eq!(store.get("k").unwrap(), Value::from("two"), "{store}");
    }
}

#[test]
fn test_missing_key_after_delete() {
    for store in backends("deleted").stores {
        store.put("gone", "x".into()).unwrap();
        assert!(store.exists("gone").unwrap());

        store.delete("gone").unwrap();
        assert!(!store.exists("gone").unwrap(), "{store}");
        assert!(store.get("gone").unwrap_err().is_not_found(), "{store}");
    }
}

#[test]
fn test_delete_missing_key() {
    for store in backends("absent").stores {
        let result = store.delete("never-written");
        match store.kind() {
            BackendKind::Dict | BackendKind::File => {
                assert!(result.unwrap_err().is_not_found(), "{store}");
            }
            BackendKind::Cloud | BackendKind::Kv => result.unwrap(),
        }
    }
}

#[test]
fn test_nested_sub_equals_joined_sub() {
    for store in backends("nested").stores {
        let nested = store.sub(&["a"]).unwrap().sub(&["b"]).unwrap();
        let joined = store.sub(&["a/b"]).unwrap();
        assert_eq!(nested, joined);
        assert_eq!(nested.namespace().prefix(), "a/b");

        nested.put("k", "v".into()).unwrap();
        assert_eq!(joined.get("k").unwrap(), Value::from("v"));
        assert_eq!(store.get("a/b/k").unwrap(), Value::from("v"), "{store}");
    }
}

#[test]
fn test_sibling_prefixes_do_not_leak() {
    for store in backends("siblings").stores {
        let a = store.sub(&["a"]).unwrap();
        let ab = store.sub(&["ab"]).unwrap();
        a.put("one", "1".into()).unwrap();
        ab.put("two", "2".into()).unwrap();

        assert_eq!(sorted(&a, "", true), vec!["one"], "{store}");
        assert_eq!(sorted(&ab, "", true), vec!["two"], "{store}");
        assert!(!a.exists("two").unwrap());
    }
}

#[test]
fn test_non_recursive_listing_collapses_dirs() {
    for store in backends("listing").stores {
        for key in ["top", "dir/one", "dir/two", "dir/deeper/three"] {
            store.put(key, "x".into()).unwrap();
        }

        assert_eq!(sorted(&store, "", false), vec!["dir/", "top"], "{store}");
        assert_eq!(
            sorted(&store, "dir", false),
            vec!["dir/deeper/", "dir/one", "dir/two"],
            "{store}"
        );
        assert_eq!(
            sorted(&store, "dir", true),
            vec!["dir/deeper/three", "dir/one", "dir/two"],
            "{store}"
        );
    }
}

#[test]
fn test_trailing_star_matches_name_prefix() {
    for store in backends("star").stores {
        for key in ["log-1", "log-2", "logs/a", "other"] {
            store.put(key, "x".into()).unwrap();
        }
        assert_eq!(
            sorted(&store, "log*", true),
            vec!["log-1", "log-2", "logs/a"],
            "{store}"
        );
    }
}

#[test]
fn test_typed_values() {
    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Turn {
        role: String,
        content: String,
    }

    for store in backends("typed").stores {
        let turns = vec![
            Turn {
                role: "user".to_string(),
                content: "hi".to_string(),
            },
            Turn {
                role: "assistant".to_string(),
                content: "hello".to_string(),
            },
        ];
        store.put_value("session/1", &turns).unwrap();
        assert_eq!(store.get_as::<Vec<Turn>>("session/1").unwrap(), turns, "{store}");
    }
}

#[test]
fn test_file_payload_round_trip() {
    let scratch = tempdir().unwrap();
    let path = scratch.path().join("notes.txt");
    std::fs::write(&path, "plain notes").unwrap();

    for store in backends("files").stores {
        store.put("notes", path.as_path().into()).unwrap();
        assert_eq!(store.get("notes").unwrap(), Value::from("plain notes"), "{store}");
    }
}

#[test]
fn test_invalid_bucket_name() {
    let dir = tempdir().unwrap();
    let factory = StoreFactory::default();
    let err = factory
        .build(
            &BackendConfig::new(BackendKind::Dict)
                .bucket("no_underscores")
                .path(dir.path()),
        )
        .unwrap_err();
    assert!(matches!(err, kyrostore::StoreError::InvalidBucketName { .. }));
}

#[test]
fn test_listing_rejects_relative_prefixes() {
    for store in backends("mine").stores {
        for prefix in ["../other", "a/../..", "./x"] {
            assert!(
                matches!(
                    store.list(prefix, true),
                    Err(kyrostore::StoreError::InvalidKey { .. })
                ),
                "{store} {prefix}"
            );
        }
    }
}

#[test]
fn test_file_listing_stays_inside_bucket() {
    let dir = tempdir().unwrap();
    let factory = StoreFactory::default();
    let open = |bucket: &str| {
        factory
            .build(&BackendConfig::new(BackendKind::File).bucket(bucket).path(dir.path()))
            .unwrap()
    };
    let other = open("other");
    other.put("secret", "hidden".into()).unwrap();

    let mine = open("mine");
    mine.put("own", "x".into()).unwrap();
    assert!(mine.list("../other", true).is_err());
    assert_eq!(sorted(&mine, "", true), vec!["own"]);
}
