//! Object lifecycle tests against the relay core.
//!
//! These drive `Relay` directly over an instrumented in-memory backend so the
//! number of physical deletes can be asserted exactly.

use bytes::Bytes;
use ephemera::relay::{Relay, RelayConfig, RelayError};
use ephemera::storage::{BlobStore, ByteStream, MemoryBackend};
use futures::{StreamExt, TryStreamExt};
use std::time::Duration;

fn body(data: Vec<u8>) -> ByteStream {
    futures::stream::iter([Ok::<_, std::io::Error>(Bytes::from(data))]).boxed()
}

fn relay_with_ttl(ttl: Duration) -> (Relay, MemoryBackend) {
    let backend = MemoryBackend::new();
    let relay = Relay::new(
        BlobStore::custom(backend.clone()),
        RelayConfig {
            max_upload_size: 64 * 1024,
            ttl,
            ..RelayConfig::default()
        },
    );
    (relay, backend)
}

async fn settle(relay: &Relay) {
    for _ in 0..200 {
        if relay.registry().is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_download_racing_expiry_deletes_once() {
    const OBJECTS: usize = 64;
    let (relay, backend) = relay_with_ttl(Duration::from_millis(10));

    let mut tasks = Vec::new();
    for i in 0..OBJECTS {
        let name = format!("race-{i}.bin");
        relay.upload(&name, body(vec![i as u8; 512])).await.unwrap();

        let relay = relay.clone();
        tasks.push(tokio::spawn(async move {
            // Land some downloads before the deadline and some after.
            tokio::time::sleep(Duration::from_millis((i % 20) as u64)).await;
            match relay.download(&name).await {
                Ok(download) => {
                    let _: Vec<Bytes> = download.body.try_collect().await.unwrap();
                },
                Err(RelayError::NotFound { .. }) => {},
                Err(e) => panic!("unexpected error: {e}"),
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    settle(&relay).await;

    assert!(relay.registry().is_empty());
    assert!(backend.is_empty());
    assert_eq!(backend.deleted(), OBJECTS);
    assert_eq!(backend.delete_calls(), OBJECTS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_downloads_of_one_object() {
    let (relay, backend) = relay_with_ttl(Duration::from_secs(60));
    relay.upload("shared.bin", body(vec![7; 4096])).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let relay = relay.clone();
        tasks.push(tokio::spawn(async move {
            match relay.download("shared.bin").await {
                Ok(download) => {
                    let chunks: Vec<Bytes> = download.body.try_collect().await.unwrap();
                    Some(chunks.concat().len())
                },
                Err(_) => None,
            }
        }));
    }

    let mut served = 0;
    for task in tasks {
        if let Some(len) = task.await.unwrap() {
            assert_eq!(len, 4096);
            served += 1;
        }
    }
    assert!(served >= 1);

    settle(&relay).await;
    assert_eq!(backend.delete_calls(), 1);
    assert!(relay.download("shared.bin").await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_names_do_not_interfere() {
    let (relay, backend) = relay_with_ttl(Duration::from_secs(60));

    let uploads = (0..32).map(|i| {
        let relay = relay.clone();
        async move {
            let name = format!("file-{i}.txt");
            relay
                .upload(&name, body(format!("content {i}").into_bytes()))
                .await
                .map(|u| u.name)
        }
    });
    let names: Vec<String> = futures::future::try_join_all(uploads).await.unwrap();
    assert_eq!(relay.registry().len(), 32);
    assert_eq!(relay.scheduler().armed(), 32);

    for (i, name) in names.iter().enumerate() {
        let download = relay.download(name).await.unwrap();
        let chunks: Vec<Bytes> = download.body.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), format!("content {i}").into_bytes());
    }

    settle(&relay).await;
    assert!(backend.is_empty());
    assert_eq!(backend.deleted(), 32);
}

#[tokio::test]
async fn test_concurrent_same_name_uploads_one_wins() {
    let (relay, backend) = relay_with_ttl(Duration::from_secs(60));

    let (a, b) = tokio::join!(
        relay.upload("same.txt", body(b"aaa".to_vec())),
        relay.upload("same.txt", body(b"bbb".to_vec()))
    );
    let results = [a.is_ok(), b.is_ok()];
    assert_eq!(results.iter().filter(|ok| **ok).count(), 1);
    assert!(matches!(
        a.err().or(b.err()),
        Some(RelayError::Duplicate { .. })
    ));
    assert_eq!(backend.len(), 1);
}

#[tokio::test]
async fn test_partial_download_leaves_object_for_expiry() {
    let (relay, backend) = relay_with_ttl(Duration::from_millis(100));
    relay.upload("slow.bin", body(vec![1; 1024])).await.unwrap();

    // Open and abandon before reading anything.
    let download = relay.download("slow.bin").await.unwrap();
    drop(download);
    assert!(relay.registry().lookup("slow.bin").is_some());

    tokio::time::sleep(Duration::from_millis(300)).await;
    settle(&relay).await;
    assert!(!backend.contains("slow.bin"));
    assert_eq!(backend.delete_calls(), 1);
}
