//! End-to-end tests for the in-memory cache service.

use kvstash::{CacheService, Value};

#[test]
fn test_set_then_get_returns_value() {
    let cache = CacheService::spawn().unwrap();

    cache.set("theme", Value::from("dark")).unwrap();
    assert_eq!(cache.get("theme").unwrap(), Some(Value::from("dark")));

    cache.shutdown();
}

#[test]
fn test_get_missing_key_is_none() {
    let cache = CacheService::spawn().unwrap();
    assert_eq!(cache.get("absent").unwrap(), None);
    cache.shutdown();
}

#[test]
fn test_set_returns_primary_key() {
    let cache = CacheService::spawn().unwrap();
    let key = cache.set("theme", Value::from("dark")).unwrap();
    assert_eq!(key, "theme");
    cache.shutdown();
}

#[test]
fn test_get_all_returns_full_records() {
    let cache = CacheService::spawn().unwrap();

    cache.set("theme", Value::from("dark")).unwrap();
    cache.set("lang", Value::from("en")).unwrap();

    let records = cache.get_all(None).unwrap();
    assert_eq!(records.len(), 2);

    // Records carry both the key and the stored value.
    let theme = records
        .iter()
        .find(|r| r.get("key") == Some(&Value::from("theme")))
        .unwrap();
    assert_eq!(theme.get("value"), Some(&Value::from("dark")));

    cache.shutdown();
}

#[test]
fn test_clear_empties_the_store() {
    let cache = CacheService::spawn().unwrap();

    cache.set("a", Value::Int(1)).unwrap();
    cache.set("b", Value::Int(2)).unwrap();
    cache.clear().unwrap();

    assert!(cache.get_all(None).unwrap().is_empty());
    assert_eq!(cache.get("a").unwrap(), None);

    cache.shutdown();
}

#[test]
fn test_delete_is_idempotent() {
    let cache = CacheService::spawn().unwrap();

    cache.set("k", Value::from("v")).unwrap();
    cache.delete("k").unwrap();
    assert_eq!(cache.get("k").unwrap(), None);

    // Deleting again is a quiet success.
    cache.delete("k").unwrap();

    cache.shutdown();
}

#[test]
fn test_explicit_connect_is_allowed() {
    let cache = CacheService::spawn().unwrap();
    assert!(cache.connect().unwrap());
    // A second connect reuses the open connection.
    assert!(cache.connect().unwrap());
    cache.shutdown();
}

#[test]
fn test_verbs_reconnect_after_close() {
    let cache = CacheService::spawn().unwrap();

    cache.set("k", Value::from("v")).unwrap();
    cache.close().unwrap();

    // In-memory data does not survive the close.
    assert_eq!(cache.get("k").unwrap(), None);

    cache.shutdown();
}

#[test]
fn test_structured_values_round_trip() {
    let cache = CacheService::spawn().unwrap();

    let value = Value::map([
        ("enabled".to_string(), Value::Bool(true)),
        (
            "thresholds".to_string(),
            Value::List(vec![Value::Int(10), Value::Int(20)]),
        ),
    ]);
    cache.set("settings", value.clone()).unwrap();

    assert_eq!(cache.get("settings").unwrap(), Some(value));

    cache.shutdown();
}
