//! Property-Based Tests for Token Buckets
//!
//! Drives buckets through random sequences of consume and refill calls and
//! checks the invariants that must hold after every step.
//!
//! ```bash
//! cargo test --lib quota::proptests
//! ```

use proptest::prelude::*;
use std::time::Duration;

use crate::quota::bucket::{Bucket, InitialFill, Rule};

#[derive(Debug, Clone, Copy)]
enum Op {
    Consume,
    Refill,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Consume), Just(Op::Refill)]
}

fn arb_rule() -> impl Strategy<Value = Rule> {
    (1u32..50, 1u64..30).prop_map(|(rate, window_secs)| {
        Rule::new(rate as f64, Duration::from_secs(window_secs))
    })
}

fn arb_fill() -> impl Strategy<Value = InitialFill> {
    prop_oneof![Just(InitialFill::Full), Just(InitialFill::Empty)]
}

proptest! {
    #[test]
    fn prop_available_never_exceeds_capacity(
        rule in arb_rule(),
        fill in arb_fill(),
        ops in prop::collection::vec(arb_op(), 0..200),
    ) {
        let mut bucket = Bucket::new(rule, Duration::from_secs(1), fill);
        for op in ops {
            match op {
                Op::Consume => { bucket.try_consume(); }
                Op::Refill => bucket.refill(),
            }
            prop_assert!(bucket.available() <= bucket.capacity());
        }
    }

    #[test]
    fn prop_consume_moves_by_exactly_one(
        rule in arb_rule(),
        ops in prop::collection::vec(arb_op(), 0..200),
    ) {
        let mut bucket = Bucket::new(rule, Duration::from_secs(1), InitialFill::Full);
        for op in ops {
            let before = bucket.available();
            match op {
                Op::Consume => {
                    let accepted = bucket.try_consume();
                    prop_assert_eq!(accepted, before > 0);
                    let expected = if accepted { before - 1 } else { before };
                    prop_assert_eq!(bucket.available(), expected);
                }
                Op::Refill => {
                    bucket.refill();
                    let expected = (before + bucket.tokens_per_tick()).min(bucket.capacity());
                    prop_assert_eq!(bucket.available(), expected);
                }
            }
        }
    }

    #[test]
    fn prop_full_bucket_accepts_exactly_capacity(rule in arb_rule()) {
        let mut bucket = Bucket::new(rule, Duration::from_secs(1), InitialFill::Full);
        let mut accepted = 0u64;
        while bucket.try_consume() {
            accepted += 1;
        }
        prop_assert_eq!(accepted, rule.capacity());
    }

    #[test]
    fn prop_capacity_matches_exact_integer_floor(
        rate_tenths in 1u32..1000,
        window_ms in 1u64..60_000,
    ) {
        // (rate_tenths / 10) * (window_ms / 1000) in exact integer arithmetic
        let expected = rate_tenths as u64 * window_ms / 10_000;
        let rule = Rule::new(rate_tenths as f64 / 10.0, Duration::from_millis(window_ms));
        prop_assert_eq!(rule.capacity(), expected);
    }
}
