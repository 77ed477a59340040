use std::time::Duration;

use mercato_middleware::ApiLimitManager;
use mercato_mock::{MockBehavior, MockProvider};
use mercato_types::{
    LimitEvent, LimitsConfig, MercatoError, ProviderConfig, ProviderId, QuotaRule, RateLimits,
    RequestPriority, RequestType, default_providers,
};

fn manager() -> ApiLimitManager {
    ApiLimitManager::new(LimitsConfig {
        provider_timeout: Duration::from_millis(500),
        ..LimitsConfig::default()
    })
}

#[tokio::test(start_paused = true)]
async fn primary_serves_when_healthy() {
    let m = manager();
    let providers = MockProvider::new();
    providers.set_behavior("alpaca", MockBehavior::Return(1));
    providers.set_behavior("polygon", MockBehavior::Return(2));

    let v = m
        .make_optimal_request(RequestType::Quote, Some("AAPL"), |id| providers.call(id), None)
        .await
        .unwrap();
    assert_eq!(v, 1);
    assert_eq!(providers.call_order(), [ProviderId::new("alpaca")]);
    assert_eq!(m.usage_snapshot()[0].quotas[&RequestType::Quote].used, 1);
}

#[tokio::test(start_paused = true)]
async fn failures_fall_through_in_rank_order() {
    let m = manager();
    let providers = MockProvider::new();
    providers.set_behavior("alpaca", MockBehavior::Fail(MercatoError::Http("502".into())));
    providers.set_behavior("polygon", MockBehavior::Hang);
    providers.set_behavior("finnhub", MockBehavior::Return("ok"));

    let v = m
        .make_optimal_request(RequestType::Quote, None, |id| providers.call(id), None)
        .await
        .unwrap();
    assert_eq!(v, "ok");
    assert_eq!(
        providers.call_order(),
        ["alpaca", "polygon", "finnhub"].map(ProviderId::new)
    );
    assert_eq!(m.health_score(&ProviderId::new("alpaca")), Some(95));
    assert_eq!(m.health_score(&ProviderId::new("polygon")), Some(95));
    assert_eq!(m.health_score(&ProviderId::new("finnhub")), Some(100));
    assert!(
        m.usage_snapshot().iter().all(|u| u.active_requests == 0),
        "concurrency slots released"
    );
}

#[tokio::test(start_paused = true)]
async fn exhaustion_collects_every_failure_and_publishes_event() {
    let m = manager();
    let mut rx = m.subscribe();
    let providers: MockProvider<u32> = MockProvider::new();
    for id in ["alpaca", "polygon", "finnhub"] {
        providers.set_behavior(id, MockBehavior::Fail(MercatoError::provider(id, "down")));
    }

    let err = m
        .make_optimal_request(RequestType::Quote, Some("MSFT"), |id| providers.call(id), None)
        .await
        .unwrap_err();
    match err {
        MercatoError::AllProvidersFailed(errors) => assert_eq!(errors.len(), 3),
        other => panic!("unexpected: {other:?}"),
    }

    let mut exhausted = false;
    while let Ok(event) = rx.try_recv() {
        if let LimitEvent::ProvidersExhausted { symbol, request_type } = event {
            assert_eq!(symbol.as_deref(), Some("MSFT"));
            assert_eq!(request_type, RequestType::Quote);
            exhausted = true;
        }
    }
    assert!(exhausted);
}

#[tokio::test(start_paused = true)]
async fn all_timeouts_collapse_to_timed_out() {
    let m = manager();
    let providers: MockProvider<u32> = MockProvider::new();
    for id in ["alpaca", "polygon"] {
        providers.set_behavior(id, MockBehavior::Hang);
    }

    let err = m
        .make_optimal_request(RequestType::History, None, |id| providers.call(id), None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        MercatoError::AllProvidersTimedOut {
            request_type: "history".into()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn exhausted_quota_routes_elsewhere_then_fails_without_calls() {
    let m = ApiLimitManager::new(LimitsConfig {
        providers: vec![
            ProviderConfig::new("solo", 1)
                .with_quota(RequestType::Quote, QuotaRule::per_minute(10)),
        ],
        ..LimitsConfig::default()
    });
    let solo = ProviderId::new("solo");
    m.set_quota_usage(&solo, RequestType::Quote, 9).unwrap();
    let providers = MockProvider::new();
    providers.set_behavior("solo", MockBehavior::Return(5));

    let err = m
        .make_optimal_request(RequestType::Quote, None, |id| providers.call(id), None)
        .await
        .unwrap_err();
    match err {
        MercatoError::NoEligibleProvider { reasons, .. } => {
            assert_eq!(reasons, ["solo: Quota exceeded"]);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(providers.calls("solo"), 0);

    // the reserve is still available to critical symbols
    m.set_symbol_priority("SPY", RequestPriority::Critical);
    let v = m
        .make_optimal_request(RequestType::Quote, Some("SPY"), |id| providers.call(id), None)
        .await
        .unwrap();
    assert_eq!(v, 5);
}

#[tokio::test(start_paused = true)]
async fn concurrency_ceiling_is_held_for_the_call_duration() {
    let m = std::sync::Arc::new(ApiLimitManager::new(LimitsConfig {
        providers: vec![
            ProviderConfig::new("narrow", 1)
                .with_quota(RequestType::Quote, QuotaRule::per_minute(100))
                .with_rate_limits(RateLimits {
                    per_second: 100,
                    max_concurrent: 1,
                }),
        ],
        ..LimitsConfig::default()
    }));
    let providers = std::sync::Arc::new(MockProvider::new());
    providers.set_behavior("narrow", MockBehavior::Delay(Duration::from_millis(100), 1));

    let (m2, p2) = (m.clone(), providers.clone());
    let first = tokio::spawn(async move {
        m2.make_optimal_request(RequestType::Quote, None, |id| p2.call(id), None)
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let narrow = ProviderId::new("narrow");
    assert_eq!(
        m.can_make_request(&narrow, RequestType::Quote, RequestPriority::Critical)
            .reason()
            .map(|r| r.to_string())
            .as_deref(),
        Some("Concurrent request limit reached")
    );
    assert_eq!(m.usage_snapshot()[0].active_requests, 1);

    assert_eq!(first.await.unwrap().unwrap(), 1);
    assert!(m
        .can_make_request(&narrow, RequestType::Quote, RequestPriority::Critical)
        .is_allowed());
}

#[tokio::test(start_paused = true)]
async fn ranking_prefers_idle_secondary_over_saturated_primary() {
    let m = ApiLimitManager::new(LimitsConfig {
        providers: default_providers(),
        ..LimitsConfig::default()
    });
    assert_eq!(
        m.optimal_provider(RequestType::Quote, RequestPriority::Standard),
        Some(ProviderId::new("alpaca"))
    );

    // half the primary's quota used: 0.4*100 + 10*3 + 30*0.5 + 5 = 90
    m.set_quota_usage(&ProviderId::new("alpaca"), RequestType::Quote, 100)
        .unwrap();
    assert_eq!(
        m.optimal_provider_list(RequestType::Quote, RequestPriority::Standard),
        ["polygon", "alpaca", "finnhub"].map(ProviderId::new)
    );

    // only providers with a quota for the request type are ranked
    assert_eq!(
        m.optimal_provider_list(RequestType::Search, RequestPriority::Standard),
        [ProviderId::new("finnhub")]
    );
}

#[tokio::test(start_paused = true)]
async fn disabled_providers_are_skipped() {
    let m = manager();
    m.set_provider_enabled(&ProviderId::new("alpaca"), false)
        .unwrap();
    let providers = MockProvider::new();
    providers.set_behavior("polygon", MockBehavior::Return(2));

    let v = m
        .make_optimal_request(
            RequestType::Quote,
            None,
            |id| providers.call(id),
            Some(RequestPriority::High),
        )
        .await
        .unwrap();
    assert_eq!(v, 2);
    assert_eq!(providers.calls("alpaca"), 0);
}
