//! Integration test: optimistic concurrency over real backends.
//!
//! Every scenario runs against both the in-memory and the filesystem
//! backend, through the public `VersionedTextStore` surface.

use std::sync::Arc;

use futures::future::join_all;
use tempfile::TempDir;

use quill_core::{BlobBackend, BlobTextStore, Container, ETag, TextId, VersionedTextStore};
use quill_storage::{LocalBackend, MemoryBackend};

fn texts() -> Container {
    Container::new("texts").unwrap()
}

fn id(name: &str) -> TextId {
    TextId::new(name).unwrap()
}

/// One store per backend kind. The `TempDir` keeps the local root alive.
async fn stores() -> (Vec<(&'static str, BlobTextStore)>, TempDir) {
    let tmp = TempDir::new().unwrap();
    let local: Arc<dyn BlobBackend> = Arc::new(LocalBackend::new(tmp.path()).await.unwrap());
    let memory: Arc<dyn BlobBackend> = Arc::new(MemoryBackend::new());
    let stores = vec![
        ("memory", BlobTextStore::new(memory, texts())),
        ("local", BlobTextStore::new(local, texts())),
    ];
    (stores, tmp)
}

#[tokio::test]
async fn test_read_never_written_is_absent() {
    let (stores, _tmp) = stores().await;
    for (kind, store) in &stores {
        assert!(store.read(&id("never")).await.unwrap().is_none(), "{kind}");
    }
}

#[tokio::test]
async fn test_first_use_scenario() {
    let (stores, _tmp) = stores().await;
    for (kind, store) in &stores {
        // Container does not exist yet; the write provisions it.
        store.create_or_update(&id("a"), "hello").await.unwrap();

        let first = store.read(&id("a")).await.unwrap().expect(kind);
        assert_eq!(first.content(), "hello", "{kind}");

        let applied = store
            .try_update(&id("a"), "world", first.version())
            .await
            .unwrap();
        assert!(applied, "{kind}");

        let second = store.read(&id("a")).await.unwrap().expect(kind);
        assert_eq!(second.content(), "world", "{kind}");
        assert_ne!(second.version(), first.version(), "{kind}");
    }
}

#[tokio::test]
async fn test_try_create_succeeds_once() {
    let (stores, _tmp) = stores().await;
    for (kind, store) in &stores {
        assert!(store.try_create(&id("doc"), "original").await.unwrap(), "{kind}");
        assert!(!store.try_create(&id("doc"), "second").await.unwrap(), "{kind}");

        let text = store.read(&id("doc")).await.unwrap().expect(kind);
        assert_eq!(text.content(), "original", "{kind}");
    }
}

#[tokio::test]
async fn test_stale_update_is_rejected() {
    let (stores, _tmp) = stores().await;
    for (kind, store) in &stores {
        assert!(store.try_create(&id("doc"), "v1").await.unwrap(), "{kind}");
        let v1 = store.read(&id("doc")).await.unwrap().expect(kind);

        assert!(store
            .try_update(&id("doc"), "new", v1.version())
            .await
            .unwrap());
        assert!(!store
            .try_update(&id("doc"), "another", v1.version())
            .await
            .unwrap());

        let current = store.read(&id("doc")).await.unwrap().expect(kind);
        assert_eq!(current.content(), "new", "{kind}");
    }
}

#[tokio::test]
async fn test_update_of_deleted_text_is_rejected() {
    let (stores, _tmp) = stores().await;
    for (kind, store) in &stores {
        store.create_or_update(&id("doc"), "x").await.unwrap();
        let seen = store.read(&id("doc")).await.unwrap().expect(kind);
        store.delete_if_exists(&id("doc")).await.unwrap();

        let applied = store
            .try_update(&id("doc"), "y", seen.version())
            .await
            .unwrap();
        assert!(!applied, "{kind}");
        assert!(store.read(&id("doc")).await.unwrap().is_none(), "{kind}");
    }
}

#[tokio::test]
async fn test_try_delete_requires_current_version() {
    let (stores, _tmp) = stores().await;
    for (kind, store) in &stores {
        store.create_or_update(&id("doc"), "one").await.unwrap();
        let stale = store.read(&id("doc")).await.unwrap().expect(kind);
        store.create_or_update(&id("doc"), "two").await.unwrap();
        let current = store.read(&id("doc")).await.unwrap().expect(kind);

        assert!(!store.try_delete(&id("doc"), stale.version()).await.unwrap());
        assert!(store.read(&id("doc")).await.unwrap().is_some(), "{kind}");

        assert!(store
            .try_delete(&id("doc"), current.version())
            .await
            .unwrap());
        assert!(store.read(&id("doc")).await.unwrap().is_none(), "{kind}");

        // Already deleted by "someone else".
        assert!(!store
            .try_delete(&id("doc"), current.version())
            .await
            .unwrap());
    }
}

#[tokio::test]
async fn test_try_delete_without_container_is_false() {
    let (stores, _tmp) = stores().await;
    for (kind, store) in &stores {
        let deleted = store
            .try_delete(&id("doc"), &ETag::from_displayed("whatever"))
            .await
            .unwrap();
        assert!(!deleted, "{kind}");
    }
}

#[tokio::test]
async fn test_delete_if_exists_is_idempotent() {
    let (stores, _tmp) = stores().await;
    for (kind, store) in &stores {
        // Neither the container nor the text exists yet.
        store.delete_if_exists(&id("doc")).await.unwrap();

        store.create_or_update(&id("doc"), "x").await.unwrap();
        store.delete_if_exists(&id("doc")).await.unwrap();
        store.delete_if_exists(&id("doc")).await.unwrap();
        assert!(store.read(&id("doc")).await.unwrap().is_none(), "{kind}");
    }
}

#[tokio::test]
async fn test_container_deleted_out_of_band() {
    let backend = Arc::new(MemoryBackend::new());
    let store = BlobTextStore::new(backend.clone(), texts());

    store.create_or_update(&id("doc"), "x").await.unwrap();
    let seen = store.read(&id("doc")).await.unwrap().unwrap();
    assert!(backend.drop_container(&texts()).unwrap());

    // The container is recreated, but the text is gone, so the update loses.
    assert!(!store
        .try_update(&id("doc"), "y", seen.version())
        .await
        .unwrap());
    assert!(backend.container_exists(&texts()).unwrap());

    backend.drop_container(&texts()).unwrap();
    store.create_or_update(&id("doc"), "z").await.unwrap();
    let text = store.read(&id("doc")).await.unwrap().unwrap();
    assert_eq!(text.content(), "z");

    backend.drop_container(&texts()).unwrap();
    assert!(store.try_create(&id("doc"), "fresh").await.unwrap());
}

#[tokio::test]
async fn test_concurrent_updates_from_same_version() {
    let (stores, _tmp) = stores().await;
    for (kind, store) in stores {
        store.create_or_update(&id("counter"), "0").await.unwrap();
        let seen = store.read(&id("counter")).await.unwrap().expect(kind);
        let store = Arc::new(store);

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let version = seen.version().clone();
                tokio::spawn(async move {
                    store
                        .try_update(&id("counter"), &format!("writer-{i}"), &version)
                        .await
                })
            })
            .collect();

        let applied: Vec<bool> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.expect("task should not panic").unwrap())
            .collect();

        let winners = applied.iter().filter(|&&won| won).count();
        assert_eq!(winners, 1, "{kind}: exactly one writer should win");

        let current = store.read(&id("counter")).await.unwrap().expect(kind);
        assert!(current.content().starts_with("writer-"), "{kind}");
    }
}

#[tokio::test]
async fn test_read_modify_write_loop_converges() {
    let store = Arc::new(BlobTextStore::new(Arc::new(MemoryBackend::new()), texts()));
    store.create_or_update(&id("counter"), "0").await.unwrap();

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                loop {
                    let current = store.read(&id("counter")).await?.expect("counter exists");
                    let next = current.content().parse::<u32>().unwrap() + 1;
                    if store
                        .try_update(&id("counter"), &next.to_string(), current.version())
                        .await?
                    {
                        return Ok::<_, quill_core::QuillError>(());
                    }
                }
            })
        })
        .collect();

    for joined in join_all(tasks).await {
        joined.expect("task should not panic").unwrap();
    }
    let total = store.read(&id("counter")).await.unwrap().unwrap();
    assert_eq!(total.content(), "5");
}
