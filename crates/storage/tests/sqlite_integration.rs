use storage::repository::{KeyValueStore, Storage};
use storage::sqlite::SqliteStore;

#[tokio::test]
async fn sqlite_roundtrip_overwrites_value() {
    let store = SqliteStore::connect("sqlite:file:memdb_kv_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("migrate");

    assert_eq!(store.get("token_history").await.expect("get"), None);

    store.set("token_history", "[]").await.expect("first set");
    store
        .set("token_history", r#"[{"model":"gpt-4"}]"#)
        .await
        .expect("second set");

    let value = store.get("token_history").await.expect("get");
    assert_eq!(value.as_deref(), Some(r#"[{"model":"gpt-4"}]"#));
}

#[tokio::test]
async fn sqlite_keys_are_independent() {
    let storage = Storage::sqlite("sqlite:file:memdb_kv_keys?mode=memory&cache=shared")
        .await
        .expect("connect");

    storage.kv.set("a", "1").await.expect("set a");
    storage.kv.set("b", "2").await.expect("set b");

    assert_eq!(storage.kv.get("a").await.expect("get a").as_deref(), Some("1"));
    assert_eq!(storage.kv.get("b").await.expect("get b").as_deref(), Some("2"));
}

#[tokio::test]
async fn sqlite_migrations_are_idempotent() {
    let store = SqliteStore::connect("sqlite:file:memdb_kv_migrate?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("first migrate");
    store.set("k", "v").await.expect("set");
    store.migrate().await.expect("second migrate");

    assert_eq!(store.get("k").await.expect("get").as_deref(), Some("v"));
}

#[tokio::test]
async fn sqlite_update_reads_current_value_and_can_skip_the_write() {
    let store = SqliteStore::connect("sqlite:file:memdb_kv_update?mode=memory&cache=shared")
        .await
        .expect("connect");
    store.migrate().await.expect("migrate");
    store.set("k", "a").await.expect("set");

    let written = store
        .update(
            "k",
            Box::new(|current: Option<String>| current.map(|value| format!("{value}b"))),
        )
        .await
        .expect("update");
    assert!(written);

    let written = store
        .update("k", Box::new(|_: Option<String>| None::<String>))
        .await
        .expect("skipped update");
    assert!(!written);
    assert_eq!(store.get("k").await.expect("get").as_deref(), Some("ab"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sqlite_updates_from_separate_pools_do_not_interleave() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("kv.db").display());
    let first = Storage::sqlite(&url).await.expect("open first");
    let second = Storage::sqlite(&url).await.expect("open second");

    let mut handles = Vec::new();
    for i in 0..20 {
        let kv = if i % 2 == 0 {
            first.kv.clone()
        } else {
            second.kv.clone()
        };
        handles.push(tokio::spawn(async move {
            kv.update(
                "counter",
                Box::new(|current: Option<String>| {
                    let count: u32 = current.and_then(|v| v.parse().ok()).unwrap_or(0);
                    Some((count + 1).to_string())
                }),
            )
            .await
            .expect("update")
        }));
    }
    for handle in handles {
        assert!(handle.await.expect("join"));
    }

    assert_eq!(
        first.kv.get("counter").await.expect("get").as_deref(),
        Some("20")
    );
}
