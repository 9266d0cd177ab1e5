/*!
 * Tests for batch planning and retry backoff
 */

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use doclingo::document::{Locator, TextUnit};
use doclingo::translation::{AttemptOutcome, BatchLimits, BatchPlanner, BatchState, RetryMachine, RetryPolicy};

fn units_of_sizes(sizes: &[usize]) -> Vec<TextUnit> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, size)| TextUnit::new(Locator::Pdf { page: i / 10, run: i % 10 }, "a".repeat(*size)))
        .collect()
}

/// Fifty small units with a 20 unit limit split 20/20/10
#[test]
fn test_plan_withFiftyUnits_shouldSplitByUnitLimit() {
    let units = units_of_sizes(&[12; 50]);
    let planner = BatchPlanner::new(BatchLimits { max_batch_bytes: 8 * 1024, max_batch_units: 20 });

    let batches = planner.plan(&units);

    let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![20, 20, 10]);
    assert_eq!(batches[2].range, 40..50);
    assert_eq!(batches[1].byte_size, 240);
}

/// Random inputs always give an ordered, gap-free partition within limits
#[test]
fn test_plan_withRandomSizes_shouldPartitionWithinLimits() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..200 {
        let count = rng.random_range(0..120);
        let sizes: Vec<usize> = (0..count).map(|_| rng.random_range(1..400)).collect();
        let limits = BatchLimits {
            max_batch_bytes: rng.random_range(1..1200),
            max_batch_units: rng.random_range(1..30),
        };
        let units = units_of_sizes(&sizes);

        let batches = BatchPlanner::new(limits).plan(&units);

        let mut next = 0;
        for (i, batch) in batches.iter().enumerate() {
            assert_eq!(batch.index, i);
            assert_eq!(batch.range.start, next);
            assert!(!batch.is_empty());
            assert!(batch.len() <= limits.max_batch_units);
            let bytes: usize = sizes[batch.range.clone()].iter().sum();
            assert_eq!(batch.byte_size, bytes);
            // Only a lone unit may exceed the byte limit
            assert!(bytes <= limits.max_batch_bytes || batch.len() == 1);
            next = batch.range.end;
        }
        assert_eq!(next, units.len());
    }
}

/// An empty unit list plans no batches
#[test]
fn test_plan_withNoUnits_shouldReturnNoBatches() {
    assert!(BatchPlanner::new(BatchLimits::default()).plan(&[]).is_empty());
}

/// Backoff grows exponentially, stays capped and respects jitter bounds
#[test]
fn test_retry_policy_delays_shouldStayWithinJitterBounds() {
    let policy = RetryPolicy {
        max_retries: 6,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(1000),
        jitter: 0.5,
    };

    assert_eq!(policy.base_delay_for(1), Duration::from_millis(100));
    assert_eq!(policy.base_delay_for(2), Duration::from_millis(200));
    assert_eq!(policy.base_delay_for(4), Duration::from_millis(800));
    assert_eq!(policy.base_delay_for(6), Duration::from_millis(1000));

    for retry in 1..=6 {
        for _ in 0..50 {
            let delay = policy.delay_for(retry);
            let base = policy.base_delay_for(retry);
            assert!(delay >= base);
            assert!(delay <= base + base / 2);
        }
    }
    assert_eq!(policy.max_attempts(), 7);
}

/// The retry machine stops after max_retries and never sleeps past its bound
#[test]
fn test_retry_machine_withRepeatedTransientErrors_shouldExhaust() {
    let policy = RetryPolicy {
        max_retries: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        jitter: 0.25,
    };
    let mut machine = RetryMachine::new(policy);
    let mut attempts = 0;

    while machine.begin_attempt().is_some() {
        attempts += 1;
        if machine.record(AttemptOutcome::Transient).is_terminal() {
            break;
        }
    }

    assert_eq!(attempts, 4);
    assert_eq!(machine.attempts(), 4);
    assert!(matches!(machine.state(), BatchState::Failed { attempts: 4 }));
    assert!(machine.total_backoff() <= policy.max_total_backoff());
}
