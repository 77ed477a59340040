use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mercato_middleware::CacheService;
use mercato_types::{CacheConfig, MercatoError};

const MINUTE: Duration = Duration::from_secs(60);

fn cache() -> CacheService<String> {
    CacheService::new(CacheConfig::default())
}

#[tokio::test(start_paused = true)]
async fn set_then_get_returns_value() {
    let cache = cache();
    assert!(cache.set("AAPL", "189.5".to_string(), MINUTE, false));
    assert_eq!(cache.get("AAPL").as_deref(), Some("189.5"));
    assert!(cache.has("AAPL"));

    let info = cache.entry_info("AAPL").unwrap();
    assert_eq!(info.access_count, 1);
    assert_eq!(info.ttl, MINUTE);
    assert!(!info.persist);
}

#[tokio::test(start_paused = true)]
async fn entry_is_never_returned_past_ttl() {
    let cache = cache();
    cache.set("k", "v".to_string(), Duration::from_secs(1), false);

    tokio::time::advance(Duration::from_millis(1000)).await;
    assert_eq!(cache.get("k").as_deref(), Some("v"), "still valid at exactly ttl");

    tokio::time::advance(Duration::from_millis(1)).await;
    assert!(!cache.has("k"));
    assert!(cache.get("k").is_none());
    assert_eq!(cache.len(), 0, "expired entry removed on read");

    let stats = cache.stats();
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test(start_paused = true)]
async fn has_does_not_touch_access_bookkeeping() {
    let cache = cache();
    cache.set("k", "v".to_string(), MINUTE, false);
    assert!(cache.has("k"));
    assert!(cache.has("k"));
    assert_eq!(cache.entry_info("k").unwrap().access_count, 0);
    assert_eq!(cache.stats().hits, 0);
}

#[tokio::test(start_paused = true)]
async fn cleanup_sweeps_only_expired_entries() {
    let cache = cache();
    cache.set("short", "a".to_string(), Duration::from_secs(1), false);
    cache.set("long", "b".to_string(), MINUTE, false);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.len(), 2, "expiry is lazy until cleanup runs");
    assert_eq!(cache.cleanup(), 1);
    assert_eq!(cache.len(), 1);
    assert!(cache.has("long"));
}

#[tokio::test(start_paused = true)]
async fn spawned_cleanup_runs_on_interval() {
    let cfg = CacheConfig {
        cleanup_interval: Duration::from_secs(10),
        ..CacheConfig::default()
    };
    let cache = Arc::new(CacheService::<u32>::new(cfg));
    cache.set("k", 1, Duration::from_secs(5), false);
    let handle = cache.spawn_cleanup();

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(cache.len(), 0);
    assert_eq!(handle.runs(), 1);
    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn cache_api_call_loads_once_then_serves_from_cache() {
    let cache = cache();
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let v = cache
            .cache_api_call(
                "quote:MSFT",
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, MercatoError>("410.2".to_string())
                },
                MINUTE,
                false,
            )
            .await
            .unwrap();
        assert_eq!(v, "410.2");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(MINUTE + Duration::from_millis(1)).await;
    cache
        .cache_api_call(
            "quote:MSFT",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, MercatoError>("411.0".to_string())
            },
            MINUTE,
            false,
        )
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2, "expired entry triggers reload");
}

#[tokio::test(start_paused = true)]
async fn cache_api_call_propagates_loader_error_without_caching() {
    let cache = cache();
    let err = cache
        .cache_api_call(
            "k",
            || async { Err::<String, _>(MercatoError::Http("503".into())) },
            MINUTE,
            false,
        )
        .await
        .unwrap_err();
    assert_eq!(err, MercatoError::Http("503".into()));
    assert!(!cache.has("k"));
}

#[tokio::test(start_paused = true)]
async fn get_with_refresh_serves_stale_and_refreshes_once() {
    let cache = Arc::new(CacheService::<u32>::new(CacheConfig::default()));
    let ttl = Duration::from_secs(10);
    cache.set("k", 1, ttl, false);
    tokio::time::advance(Duration::from_secs(9)).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let loader = |calls: &Arc<AtomicUsize>| {
        let calls = Arc::clone(calls);
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, MercatoError>(2)
        }
    };

    assert_eq!(cache.get_with_refresh("k", loader(&calls), ttl, 0.8).await.unwrap(), 1);
    assert!(cache.is_refreshing("k"));
    assert_eq!(cache.get_with_refresh("k", loader(&calls), ttl, 0.8).await.unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1, "one refresh in flight per key");
    assert!(!cache.is_refreshing("k"));
    assert_eq!(cache.get("k"), Some(2));
}

#[tokio::test(start_paused = true)]
async fn get_with_refresh_leaves_fresh_entries_alone() {
    let cache = Arc::new(CacheService::<u32>::new(CacheConfig::default()));
    let ttl = Duration::from_secs(10);
    cache.set("k", 1, ttl, false);
    tokio::time::advance(Duration::from_secs(2)).await;

    let v = cache
        .get_with_refresh(
            "k",
            || async { Err::<u32, _>(MercatoError::Other("must not run".into())) },
            ttl,
            0.8,
        )
        .await
        .unwrap();
    assert_eq!(v, 1);
    assert!(!cache.is_refreshing("k"));
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_keeps_previous_value() {
    let cache = Arc::new(CacheService::<u32>::new(CacheConfig::default()));
    let ttl = Duration::from_secs(10);
    cache.set("k", 7, ttl, false);
    tokio::time::advance(Duration::from_secs(9)).await;

    let v = cache
        .get_with_refresh(
            "k",
            || async { Err::<u32, _>(MercatoError::Http("timeout".into())) },
            ttl,
            0.8,
        )
        .await
        .unwrap();
    assert_eq!(v, 7);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!cache.is_refreshing("k"));
    assert_eq!(cache.get("k"), Some(7));
}

#[tokio::test(start_paused = true)]
async fn get_with_refresh_miss_loads_synchronously() {
    let cache = Arc::new(CacheService::<u32>::new(CacheConfig::default()));
    let v = cache
        .get_with_refresh(
            "k",
            || async { Ok::<_, MercatoError>(3) },
            MINUTE,
            0.8,
        )
        .await
        .unwrap();
    assert_eq!(v, 3);
    assert_eq!(cache.get("k"), Some(3));
}

#[tokio::test(start_paused = true)]
async fn get_with_refresh_accepts_unbounded_ttl_and_nan_threshold() {
    let cache = Arc::new(CacheService::<u32>::new(CacheConfig::default()));
    cache.set("forever", 1, Duration::MAX, false);
    cache.set("k", 2, MINUTE, false);
    tokio::time::advance(Duration::from_secs(30)).await;

    let never = || async { Err::<u32, _>(MercatoError::Other("must not run".into())) };
    let v = cache
        .get_with_refresh("forever", never, Duration::MAX, 1.0)
        .await
        .unwrap();
    assert_eq!(v, 1);
    assert!(!cache.is_refreshing("forever"));

    // NaN falls back to refreshing only at full TTL
    let v = cache
        .get_with_refresh("k", never, MINUTE, f64::NAN)
        .await
        .unwrap();
    assert_eq!(v, 2);
    assert!(!cache.is_refreshing("k"));
}
