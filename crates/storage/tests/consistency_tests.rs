// Consistency tests for bucket writes racing bucket deletion.
// A page-side "clear everything" may run while the worker is still storing
// responses; every put must either land or fail cleanly, never corrupt.

mod common;

use common::{request, seeded_body};
use deeds_core::Response;
use deeds_storage::{CacheStorage, FilesystemCacheStorage, MemoryCacheStorage};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::time::Duration;

const BUCKET: &str = "deeds-cache-v4";

async fn race_puts_against_delete(storage: Arc<dyn CacheStorage>) {
    let writer = storage.clone();
    let put_handle = tokio::spawn(async move {
        let mut outcomes = Vec::new();
        for i in 0..100u64 {
            let req = request(&format!("/assets/{i}.png"));
            let resp = Response::ok(seeded_body(i, 256));
            outcomes.push(writer.put(BUCKET, &req, &resp).await.is_ok());
            tokio::task::yield_now().await;
        }
        outcomes
    });

    let deleter = storage.clone();
    let delete_handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(1)).await;
        for _ in 0..10 {
            let _ = deleter.delete(BUCKET).await;
            tokio::task::yield_now().await;
        }
    });

    let (outcomes, delete_result) = tokio::join!(put_handle, delete_handle);
    delete_result.unwrap();
    let outcomes = outcomes.unwrap();
    assert_eq!(outcomes.len(), 100);

    // Whatever survived must be readable and intact.
    for url in storage.entries(BUCKET).await.unwrap() {
        let i: u64 = url
            .trim_start_matches("https://deeds.example.test/assets/")
            .trim_end_matches(".png")
            .parse()
            .unwrap();
        let hit = storage
            .match_in(BUCKET, &request(&format!("/assets/{i}.png")))
            .await
            .unwrap()
            .expect("listed entry must be readable");
        assert_eq!(hit.body, seeded_body(i, 256));
    }
}

#[tokio::test]
async fn test_memory_put_racing_delete() {
    race_puts_against_delete(Arc::new(MemoryCacheStorage::new())).await;
}

#[tokio::test]
async fn test_filesystem_put_racing_delete() {
    let temp = TempDir::new().unwrap();
    let storage = FilesystemCacheStorage::new(temp.path()).await.unwrap();
    race_puts_against_delete(Arc::new(storage)).await;
}

#[tokio::test]
async fn test_concurrent_puts_to_same_key_last_writer_wins() {
    let temp = TempDir::new().unwrap();
    let storage = Arc::new(FilesystemCacheStorage::new(temp.path()).await.unwrap());

    let mut handles = Vec::new();
    for i in 0..16u64 {
        let storage = storage.clone();
        handles.push(tokio::spawn(async move {
            storage
                .put(BUCKET, &request("/"), &Response::ok(seeded_body(i, 64)))
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let hit = storage.match_in(BUCKET, &request("/")).await.unwrap().unwrap();
    assert!((0..16u64).any(|i| hit.body == seeded_body(i, 64)));
    assert_eq!(storage.entries(BUCKET).await.unwrap().len(), 1);
}
