//! Integration tests for `TieredPool`, the fixed-tier pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use tiered_pool::{Error, SizeHistogram, TierConfig, TierUsage, TieredPool, Usage};

fn usage_of(tiers: &[(usize, usize, usize)]) -> Usage {
    tiers
        .iter()
        .map(|&(capacity, used, total)| (capacity, TierUsage::new(used, total)))
        .collect()
}

#[test]
fn get_variants() {
    struct Case {
        name: &'static str,
        config: TierConfig,
        size: usize,
        expected_len: Option<usize>,
        expected_usage: Usage,
    }

    let cases = [
        Case {
            name: "simple",
            config: TierConfig::from([(10, 1)]),
            size: 10,
            expected_len: Some(10),
            expected_usage: usage_of(&[(10, 1, 1)]),
        },
        Case {
            name: "smaller",
            config: TierConfig::from([(10, 1)]),
            size: 8,
            expected_len: Some(8),
            expected_usage: usage_of(&[(10, 1, 1)]),
        },
        Case {
            name: "too large",
            config: TierConfig::from([(10, 1)]),
            size: 12,
            expected_len: None,
            expected_usage: usage_of(&[(10, 0, 1)]),
        },
        Case {
            name: "zero",
            config: TierConfig::from([(10, 1)]),
            size: 0,
            expected_len: None,
            expected_usage: usage_of(&[(10, 0, 1)]),
        },
    ];

    for case in cases {
        let pool = TieredPool::new(&case.config);

        let buffer = pool.get(case.size);

        assert_eq!(
            buffer.as_ref().map(|buffer| buffer.len()),
            case.expected_len,
            "case: {}",
            case.name
        );
        assert_eq!(pool.usage(), case.expected_usage, "case: {}", case.name);
    }
}

#[test]
fn upgrade_to_larger_tier() {
    let pool = TieredPool::new(&TierConfig::from([(10, 1), (20, 1)]));

    let _small = pool.get(10).unwrap();
    let upgraded = pool.get(12).unwrap();

    assert_eq!(upgraded.len(), 12);
    assert_eq!(upgraded.capacity(), 20);
    assert_eq!(pool.usage(), usage_of(&[(10, 1, 1), (20, 1, 1)]));
}

#[test]
fn upgrade_leaves_smaller_tier_alone() {
    let pool = TieredPool::new(&TierConfig::from([(10, 1), (20, 1)]));

    let _small = pool.get(10).unwrap();
    pool.put(pool.get(12)).unwrap();

    let _upgraded = pool.get(12).unwrap();

    assert_eq!(pool.usage().tier(10), Some(TierUsage::new(1, 1)));
    assert_eq!(pool.usage().tier(20), Some(TierUsage::new(1, 1)));
}

#[test]
fn get_and_put() {
    let pool = TieredPool::new(&TierConfig::from([(10, 1)]));

    let buffer = pool.get(10).unwrap();
    pool.put(buffer).unwrap();

    assert_eq!(pool.usage(), usage_of(&[(10, 0, 1)]));
}

#[test]
fn put_nil_buffer() {
    let pool = TieredPool::new(&TierConfig::from([(10, 1)]));

    let _held = pool.get(10).unwrap();

    let rejected = pool.put(None).unwrap_err();

    assert_eq!(*rejected.error(), Error::NilBuffer);
    assert!(rejected.into_buffer().is_none());
    assert_eq!(pool.usage(), usage_of(&[(10, 1, 1)]));
}

#[test]
fn put_exhausted_get_result_is_nil() {
    let pool = TieredPool::new(&TierConfig::from([(10, 1)]));

    let _held = pool.get(10).unwrap();

    assert_eq!(*pool.put(pool.get(10)).unwrap_err().error(), Error::NilBuffer);
}

#[test]
fn put_buffer_from_other_pool() {
    let pool = TieredPool::new(&TierConfig::from([(10, 1)]));
    let other = TieredPool::new(&TierConfig::from([(10, 1)]));

    let mut foreign = other.get(10).unwrap();
    foreign.fill(5);

    let rejected = pool.put(foreign).unwrap_err();
    assert_eq!(*rejected.error(), Error::ForeignBuffer);

    // Neither pool changed, and the caller still holds the buffer.
    assert_eq!(pool.usage(), usage_of(&[(10, 0, 1)]));
    assert_eq!(other.usage(), usage_of(&[(10, 1, 1)]));

    let foreign = rejected.into_buffer().unwrap();
    assert!(foreign.iter().all(|byte| *byte == 5));

    other.put(foreign).unwrap();
    assert_eq!(other.usage(), usage_of(&[(10, 0, 1)]));
}

#[test]
fn dropped_buffer_returns_container() {
    let pool = TieredPool::new(&TierConfig::from([(10, 1)]));

    {
        let _buffer = pool.get(10).unwrap();
        assert!(pool.get(10).is_none());
    }

    assert!(pool.get(10).is_some());
}

#[test]
fn contents_persist_between_leases() {
    let pool = TieredPool::new(&TierConfig::from([(4, 1)]));

    let mut buffer = pool.get(4).unwrap();
    buffer.copy_from_slice(&[9, 8, 7, 6]);
    pool.put(buffer).unwrap();

    let buffer = pool.get(2).unwrap();
    assert_eq!(&*buffer, &[9, 8]);
}

#[test]
fn histogram_counts_every_request() {
    let histogram = Arc::new(SizeHistogram::new());
    let pool = TieredPool::builder()
        .tiers(TierConfig::from([(10, 1)]))
        .histogram(Arc::clone(&histogram))
        .build();

    let held = pool.get(10);
    _ = pool.get(10);
    _ = pool.get(20);
    pool.put(held).unwrap();

    assert_eq!(
        histogram.snapshot().into_iter().collect::<Vec<_>>(),
        vec![(10, 2), (20, 1)]
    );
}

#[test]
fn reconfigure_with_outstanding_buffers() {
    let pool = TieredPool::new(&TierConfig::from([(10, 1)]));

    let mut old = pool.get(10).unwrap();

    pool.reconfigure(&TierConfig::from([(10, 5), (20, 5)]));

    assert_eq!(pool.usage(), usage_of(&[(10, 0, 5), (20, 0, 5)]));

    old.fill(1);
    assert!(old.iter().all(|byte| *byte == 1));

    // The old tiers are gone, so the pool no longer accepts the buffer.
    let rejected = pool.put(old).unwrap_err();
    assert_eq!(*rejected.error(), Error::ForeignBuffer);
    assert_eq!(pool.usage(), usage_of(&[(10, 0, 5), (20, 0, 5)]));

    // Dropping it is how its container goes away.
    drop(rejected);
    assert_eq!(pool.usage(), usage_of(&[(10, 0, 5), (20, 0, 5)]));
}

#[test]
fn concurrent_reconfiguration() {
    const THREADS: usize = 10;

    let pool = TieredPool::new(&TierConfig::from([(10, 10)]));
    let stop = AtomicBool::new(false);
    let completed = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                while !stop.load(Ordering::Relaxed) {
                    // A scan may find every container busy while others churn, so a miss is fine.
                    let Some(buffer) = pool.get(10) else {
                        continue;
                    };

                    match pool.put(buffer) {
                        Ok(()) => {
                            completed.fetch_add(1, Ordering::Relaxed);
                        }
                        // Taken just before the reconfiguration, so it is dropped instead.
                        Err(rejected) => assert_eq!(*rejected.error(), Error::ForeignBuffer),
                    }
                }
            });
        }

        thread::sleep(Duration::from_millis(50));
        pool.reconfigure(&TierConfig::from([(10, 5), (20, 5)]));
        thread::sleep(Duration::from_millis(50));

        stop.store(true, Ordering::Relaxed);
    });

    assert!(completed.load(Ordering::Relaxed) > 0);
    assert_eq!(pool.generation(), 1);
    assert_eq!(pool.usage().total_used(), 0);
}
