//! Property-based invariant tests for retry backoff.
//!
//! Verifies for every valid policy:
//!
//! 1. Delays never decrease from one attempt to the next.
//! 2. Delays never exceed `max_delay_ms`.
//! 3. The first delay is `initial_delay_ms` (capped).
//! 4. `allows` is a prefix: once an attempt is refused, later ones are too.

use std::time::Duration;

use depgate::RetryPolicy;
use proptest::prelude::*;

fn arb_valid_policy() -> impl Strategy<Value = RetryPolicy> {
    (1u64..10_000, 1.0f64..8.0, 0u64..100_000, 0u32..20).prop_map(
        |(initial, multiplier, extra, attempts)| RetryPolicy {
            initial_delay_ms: initial,
            multiplier,
            max_delay_ms: initial + extra,
            max_attempts: attempts,
        },
    )
}

proptest! {
    #[test]
    fn generated_policies_validate(policy in arb_valid_policy()) {
        prop_assert!(policy.validate().is_ok());
    }

    #[test]
    fn delays_are_monotonic_and_capped(policy in arb_valid_policy()) {
        let cap = Duration::from_millis(policy.max_delay_ms);
        prop_assert_eq!(
            policy.delay_for(1),
            Duration::from_millis(policy.initial_delay_ms.min(policy.max_delay_ms))
        );
        let mut previous = Duration::ZERO;
        for attempt in 1..=64 {
            let delay = policy.delay_for(attempt);
            prop_assert!(delay >= previous, "attempt {}: {:?} < {:?}", attempt, delay, previous);
            prop_assert!(delay <= cap);
            previous = delay;
        }
        prop_assert!(policy.delay_for(u32::MAX) <= cap);
    }

    #[test]
    fn allowed_attempts_form_a_prefix(policy in arb_valid_policy()) {
        let mut refused = false;
        for attempt in 1..=64 {
            let allowed = policy.allows(attempt);
            prop_assert!(!(refused && allowed), "attempt {} allowed after refusal", attempt);
            refused |= !allowed;
        }
        if policy.max_attempts == 0 {
            prop_assert!(!refused);
        }
    }
}
