use std::time::Duration;

use proptest::prelude::*;

use super::retry::{MAX_DELAY, RetryPolicy};

proptest! {
    #[test]
    fn prop_backoff_is_monotonic_and_capped(base_ms in 0u64..5_000, attempt in 1u32..64) {
        let policy = RetryPolicy::new(5, Duration::from_millis(base_ms));

        let current = policy.delay_for(attempt);
        let next = policy.delay_for(attempt + 1);

        prop_assert!(current <= next);
        prop_assert!(next <= MAX_DELAY);
    }

    #[test]
    fn prop_first_delay_is_base(base_ms in 0u64..30_000) {
        let base = Duration::from_millis(base_ms);
        prop_assert_eq!(RetryPolicy::new(3, base).delay_for(1), base);
    }

    #[test]
    fn prop_delay_doubles_below_cap(base_ms in 1u64..1_000, attempt in 1u32..5) {
        let policy = RetryPolicy::new(10, Duration::from_millis(base_ms));
        let current = policy.delay_for(attempt);
        let next = policy.delay_for(attempt + 1);

        if current * 2 <= MAX_DELAY {
            prop_assert_eq!(next, current * 2);
        }
    }
}
