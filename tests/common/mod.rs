//! Contract checks every backend must pass.
//!
//! Each backend's test file builds a fresh cache per check and calls these.
//! Namespaces are suffixed with a per-run tag so suites sharing a remote
//! server do not see each other's keys.

#![allow(dead_code)]

use cachex::{Bytes, Cache};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A namespace unique to this process and call.
pub fn unique_ns(base: &str) -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!(
        "{}-{}-{}-{}",
        base,
        std::process::id(),
        nanos,
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

async fn collect(cache: &Arc<dyn Cache>, ns: &str) -> Vec<(String, Bytes)> {
    let mut out = Vec::new();
    cache
        .iterate(ns, &mut |key: &str, value: &Bytes| {
            out.push((key.to_string(), value.clone()));
            true
        })
        .await
        .unwrap();
    out.sort();
    out
}

pub async fn set_then_get(cache: Arc<dyn Cache>) {
    let ns = unique_ns("n");
    cache.set(&ns, "k", Bytes::from("v"), None).await.unwrap();
    assert_eq!(cache.get(&ns, "k").await.unwrap(), Some(Bytes::from("v")));

    cache.set(&ns, "k", Bytes::from("v2"), None).await.unwrap();
    assert_eq!(cache.get(&ns, "k").await.unwrap(), Some(Bytes::from("v2")));
}

pub async fn missing_key_is_not_an_error(cache: Arc<dyn Cache>) {
    let ns = unique_ns("n");
    assert_eq!(cache.get(&ns, "never-set").await.unwrap(), None);
    assert_eq!(cache.get_and_delete(&ns, "never-set").await.unwrap(), None);
    assert!(!cache.exists(&ns, "never-set").await.unwrap());
    cache.delete(&ns, "never-set").await.unwrap();
}

pub async fn namespaces_are_isolated(cache: Arc<dyn Cache>) {
    let ns1 = unique_ns("one");
    let ns2 = unique_ns("two");
    cache.set(&ns1, "k", Bytes::from("v"), None).await.unwrap();

    assert_eq!(cache.get(&ns2, "k").await.unwrap(), None);
    assert!(!cache.exists(&ns2, "k").await.unwrap());
}

pub async fn empty_namespace_is_valid(cache: Arc<dyn Cache>) {
    let key = unique_ns("k");
    cache.set("", &key, Bytes::from("v"), None).await.unwrap();
    assert_eq!(cache.get("", &key).await.unwrap(), Some(Bytes::from("v")));
    cache.delete("", &key).await.unwrap();
}

pub async fn get_and_delete_consumes(cache: Arc<dyn Cache>) {
    let ns = unique_ns("n");
    cache.set(&ns, "k", Bytes::from("once"), None).await.unwrap();

    assert_eq!(
        cache.get_and_delete(&ns, "k").await.unwrap(),
        Some(Bytes::from("once"))
    );
    assert_eq!(cache.get(&ns, "k").await.unwrap(), None);
    assert_eq!(cache.get_and_delete(&ns, "k").await.unwrap(), None);
}

pub async fn delete_removes(cache: Arc<dyn Cache>) {
    let ns = unique_ns("n");
    cache.set(&ns, "k", Bytes::from("v"), None).await.unwrap();
    cache.delete(&ns, "k").await.unwrap();

    assert!(!cache.exists(&ns, "k").await.unwrap());
    // Deleting again is still fine.
    cache.delete(&ns, "k").await.unwrap();
}

pub async fn no_ttl_never_expires(cache: Arc<dyn Cache>) {
    let ns = unique_ns("n");
    cache.set(&ns, "none", Bytes::from("v"), None).await.unwrap();
    cache
        .set(&ns, "zero", Bytes::from("v"), Some(Duration::ZERO))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(cache.exists(&ns, "none").await.unwrap());
    assert!(cache.exists(&ns, "zero").await.unwrap());
}

pub async fn ttl_expires(cache: Arc<dyn Cache>) {
    let ns = unique_ns("n");
    cache
        .set(&ns, "k", Bytes::from("v"), Some(Duration::from_millis(50)))
        .await
        .unwrap();
    cache.set(&ns, "keep", Bytes::from("v"), None).await.unwrap();
    assert!(cache.exists(&ns, "k").await.unwrap());

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(cache.get(&ns, "k").await.unwrap(), None);
    assert!(!cache.exists(&ns, "k").await.unwrap());
    assert_eq!(cache.get_and_delete(&ns, "k").await.unwrap(), None);

    let keys: Vec<String> = collect(&cache, &ns).await.into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["keep"]);
}

pub async fn iterate_is_namespace_scoped(cache: Arc<dyn Cache>) {
    let ns = unique_ns("n");
    let other = unique_ns("m");
    cache.set(&ns, "a", Bytes::from("1"), None).await.unwrap();
    cache.set(&ns, "b", Bytes::from("2"), None).await.unwrap();
    cache.set(&ns, "c", Bytes::from("3"), None).await.unwrap();
    cache.set(&other, "a", Bytes::from("x"), None).await.unwrap();

    assert_eq!(
        collect(&cache, &ns).await,
        vec![
            ("a".to_string(), Bytes::from("1")),
            ("b".to_string(), Bytes::from("2")),
            ("c".to_string(), Bytes::from("3")),
        ]
    );
}

pub async fn iterate_stops_when_visitor_declines(cache: Arc<dyn Cache>) {
    let ns = unique_ns("n");
    cache.set(&ns, "a", Bytes::from("1"), None).await.unwrap();
    cache.set(&ns, "b", Bytes::from("2"), None).await.unwrap();
    cache.set(&ns, "c", Bytes::from("3"), None).await.unwrap();

    let mut calls = 0;
    cache
        .iterate(&ns, &mut |_: &str, _: &Bytes| {
            calls += 1;
            false
        })
        .await
        .unwrap();
    assert_eq!(calls, 1);
}

pub async fn iterate_skips_deleted(cache: Arc<dyn Cache>) {
    let ns = unique_ns("n");
    cache.set(&ns, "a", Bytes::from("1"), None).await.unwrap();
    cache.set(&ns, "b", Bytes::from("2"), None).await.unwrap();
    cache.delete(&ns, "a").await.unwrap();

    let keys: Vec<String> = collect(&cache, &ns).await.into_iter().map(|(k, _)| k).collect();
    assert_eq!(keys, vec!["b"]);
}

pub async fn binary_values(cache: Arc<dyn Cache>) {
    let ns = unique_ns("n");
    let binary: Vec<u8> = vec![0, 1, 2, 255, 254, 253];
    cache
        .set(&ns, "bin", Bytes::from(binary.clone()), None)
        .await
        .unwrap();

    let value = cache.get(&ns, "bin").await.unwrap().unwrap();
    assert_eq!(&value[..], &binary[..]);
}

pub async fn concurrent_writers(cache: Arc<dyn Cache>) {
    let ns = unique_ns("n");
    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let cache = Arc::clone(&cache);
            let ns = ns.clone();
            tokio::spawn(async move {
                cache
                    .set(&ns, &format!("key_{}", i), Bytes::from(format!("value_{}", i)), None)
                    .await
                    .unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.expect("writer panicked");
    }

    for i in 0..32 {
        assert_eq!(
            cache.get(&ns, &format!("key_{}", i)).await.unwrap(),
            Some(Bytes::from(format!("value_{}", i)))
        );
    }
}

pub async fn close_twice_does_not_panic(cache: Arc<dyn Cache>) {
    cache.close().await.unwrap();
    let _ = cache.close().await;
}

pub async fn iteration_respects_caller_deadline(cache: Arc<dyn Cache>) {
    let ns = unique_ns("n");
    for key in ["a", "b", "c"] {
        cache.set(&ns, key, Bytes::from(key), None).await.unwrap();
    }

    // The visitor itself cannot be interrupted, but the caller's deadline
    // still bounds the whole call.
    let result = tokio::time::timeout(Duration::from_secs(5), collect(&cache, &ns)).await;
    assert_eq!(result.expect("iteration exceeded its deadline").len(), 3);
}

pub async fn stats_are_recorded(cache: Arc<dyn Cache>) {
    let ns = unique_ns("n");
    let before = cache.stats();

    cache.set(&ns, "k", Bytes::from("v"), None).await.unwrap();
    let _ = cache.get(&ns, "k").await.unwrap();
    let _ = cache.get(&ns, "missing").await.unwrap();
    cache.delete(&ns, "k").await.unwrap();

    let after = cache.stats();
    assert_eq!(after.sets - before.sets, 1);
    assert_eq!(after.hits - before.hits, 1);
    assert_eq!(after.misses - before.misses, 1);
    assert_eq!(after.deletes - before.deletes, 1);
}

/// Expand to one `#[tokio::test]` per contract check, each with a fresh
/// `(guard, cache)` pair from `$make`. The guard keeps per-test resources
/// (such as a temporary directory) alive.
macro_rules! contract_tests {
    (@tests $make:expr; $($name:ident),* $(,)?) => {
        $(
            #[tokio::test]
            async fn $name() {
                let (_guard, cache) = $make;
                common::$name(cache).await;
            }
        )*
    };
    ($make:expr) => {
        contract_tests!(@tests $make;
            set_then_get,
            missing_key_is_not_an_error,
            namespaces_are_isolated,
            empty_namespace_is_valid,
            get_and_delete_consumes,
            delete_removes,
            no_ttl_never_expires,
            ttl_expires,
            iterate_is_namespace_scoped,
            iterate_stops_when_visitor_declines,
            iterate_skips_deleted,
            binary_values,
            close_twice_does_not_panic,
            iteration_respects_caller_deadline,
            stats_are_recorded,
        );

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        async fn concurrent_writers() {
            let (_guard, cache) = $make;
            common::concurrent_writers(cache).await;
        }
    };
}
