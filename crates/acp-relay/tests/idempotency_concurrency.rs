use acp_relay::idempotency::{content_hash, IdempotencyCache, IdempotencyLookup};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn test_purge_races_with_store() {
    let cache = IdempotencyCache::in_memory().with_ttl(0);
    let purger = cache.clone();
    let writer = cache.clone();

    let t1 = thread::spawn(move || {
        for _ in 0..100 {
            purger.purge_expired();
        }
    });

    let t2 = thread::spawn(move || {
        (0..1000u64)
            .filter(|i| !writer.store(&format!("key-{i}"), "hash", 200, i.to_be_bytes().to_vec()))
            .count()
    });

    t1.join().unwrap();
    let rejected = t2.join().unwrap();
    assert_eq!(rejected, 0, "store refused a fresh key");

    cache.purge_expired_at(i64::MAX);
    assert_eq!(cache.purge_expired_at(i64::MAX), 0, "records left after final purge");
    for i in 0..1000u64 {
        assert!(
            !matches!(cache.lookup(&format!("key-{i}"), "hash"), IdempotencyLookup::Hit(_)),
            "key-{i} survived the final purge"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_same_key_executes_once() {
    let cache = IdempotencyCache::in_memory();
    let executions = Arc::new(AtomicUsize::new(0));
    let hash = content_hash("POST", "/agentic_commerce/capture", b"{\"payment_token\":\"p1\"}");

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        let executions = executions.clone();
        let hash = hash.clone();
        handles.push(tokio::spawn(async move {
            let _guard = cache.lock("idem-1").await.unwrap();
            match cache.lookup("idem-1", &hash) {
                IdempotencyLookup::Hit(cached) => cached.body,
                IdempotencyLookup::Miss => {
                    executions.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                    let body = b"{\"status\":\"processing\"}".to_vec();
                    cache.store("idem-1", &hash, 200, body.clone());
                    body
                }
                IdempotencyLookup::Conflict => panic!("same request reported as conflict"),
            }
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), b"{\"status\":\"processing\"}".to_vec());
    }
    assert_eq!(executions.load(Ordering::SeqCst), 1);
}
