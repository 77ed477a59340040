use std::time::Duration;

use mercato_middleware::{ApiLimitManager, CacheService};
use mercato_types::{CacheConfig, ProviderId, RequestPriority, RequestType};
use proptest::prelude::*;

fn priority() -> impl Strategy<Value = RequestPriority> {
    prop_oneof![
        Just(RequestPriority::Low),
        Just(RequestPriority::Standard),
        Just(RequestPriority::High),
        Just(RequestPriority::Critical),
    ]
}

proptest! {
    #[test]
    fn cache_never_exceeds_max_size(
        max_size in 1usize..40,
        keys in proptest::collection::vec("[a-z]{1,4}", 0..200),
    ) {
        let cache = CacheService::<usize>::new(CacheConfig {
            max_size,
            ..CacheConfig::default()
        });
        for (i, k) in keys.iter().enumerate() {
            cache.set(k.clone(), i, Duration::from_secs(60), false);
            prop_assert!(cache.len() <= max_size);
            prop_assert_eq!(cache.get(k), Some(i));
        }
    }

    #[test]
    fn health_score_stays_in_range(outcomes in proptest::collection::vec(any::<bool>(), 0..300)) {
        let m = ApiLimitManager::default();
        let id = ProviderId::new("alpaca");
        for ok in outcomes {
            m.record_request(&id, RequestType::Quote, ok);
            let score = m.health_score(&id).unwrap();
            prop_assert!(score <= 100);
        }
    }

    #[test]
    fn symbol_belongs_to_one_bucket(
        moves in proptest::collection::vec(("[A-D]", priority()), 1..50),
    ) {
        let m = ApiLimitManager::default();
        for (symbol, p) in &moves {
            m.set_symbol_priority(symbol, *p);
        }
        for symbol in ["A", "B", "C", "D"] {
            let buckets = [
                RequestPriority::Low,
                RequestPriority::Standard,
                RequestPriority::High,
                RequestPriority::Critical,
            ]
            .into_iter()
            .filter(|p| m.symbols_with_priority(*p).iter().any(|s| s == symbol))
            .count();
            let assigned = moves.iter().any(|(s, _)| s == symbol);
            prop_assert_eq!(buckets, usize::from(assigned));
            if let Some((_, last)) = moves.iter().rev().find(|(s, _)| s == symbol) {
                prop_assert_eq!(m.symbol_priority(symbol), *last);
            }
        }
    }
}
