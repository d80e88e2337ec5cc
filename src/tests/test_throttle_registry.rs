use std::{
    sync::{
        Arc, Barrier,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    FixedIntervalTokenBucketFactory, RefillPeriodMs, TenantThrottle, ThrottleError, TokenBucket,
    TokenBucketFactory, registry::ThrottleRegistry,
};

#[derive(Debug, Default)]
struct CountingFactory {
    created: AtomicUsize,
    requests: Mutex<Vec<(u64, u64, Duration)>>,
}

impl TokenBucketFactory for CountingFactory {
    fn create(
        &self,
        capacity: u64,
        refill_tokens: u64,
        refill_period: Duration,
    ) -> Result<Arc<dyn TokenBucket>, ThrottleError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .push((capacity, refill_tokens, refill_period));

        FixedIntervalTokenBucketFactory.create(capacity, refill_tokens, refill_period)
    }
}

#[derive(Debug)]
struct FailingFactory;

impl TokenBucketFactory for FailingFactory {
    fn create(
        &self,
        _capacity: u64,
        _refill_tokens: u64,
        _refill_period: Duration,
    ) -> Result<Arc<dyn TokenBucket>, ThrottleError> {
        Err(ThrottleError::InvalidArgument("no buckets today".to_string()))
    }
}

fn registry() -> (ThrottleRegistry, Arc<CountingFactory>) {
    let factory = Arc::new(CountingFactory::default());
    let registry = ThrottleRegistry::new(factory.clone(), RefillPeriodMs::default());
    (registry, factory)
}

fn throttle(key: &str, rps: i64) -> TenantThrottle {
    TenantThrottle::new(key, rps).unwrap()
}

#[test]
fn first_resolve_creates_context() {
    let (registry, factory) = registry();

    let bucket = registry.resolve(&throttle("a", 5)).unwrap();

    assert_eq!(bucket.capacity(), 5);
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get("a"), Some(throttle("a", 5)));
}

#[test]
fn equal_descriptor_reuses_bucket_state() {
    let (registry, factory) = registry();

    let first = registry.resolve(&throttle("a", 3)).unwrap();
    assert!(first.try_consume(2));

    let second = registry.resolve(&throttle("a", 3)).unwrap();

    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    assert_eq!(second.available_tokens(), 1);
}

#[test]
fn rate_change_replaces_context_with_fresh_bucket() {
    let (registry, factory) = registry();

    let slow = registry.resolve(&throttle("a", 1)).unwrap();
    assert!(slow.try_consume(1));

    let fast = registry.resolve(&throttle("a", 60)).unwrap();

    assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    assert_eq!(registry.len(), 1);
    assert_eq!(fast.capacity(), 60);
    assert_eq!(fast.available_tokens(), 60);
    assert_eq!(registry.get("a"), Some(throttle("a", 60)));

    // Going back is another change, not a lookup of the old context.
    let slow_again = registry.resolve(&throttle("a", 1)).unwrap();
    assert_eq!(factory.created.load(Ordering::SeqCst), 3);
    assert_eq!(slow_again.available_tokens(), 1);
}

#[test]
fn tenants_are_independent() {
    let (registry, _) = registry();

    let a = registry.resolve(&throttle("a", 1)).unwrap();
    let b = registry.resolve(&throttle("b", 1)).unwrap();

    assert!(a.try_consume(1));
    assert!(!a.try_consume(1));
    assert!(b.try_consume(1));
    assert_eq!(registry.len(), 2);
}

#[test]
fn bucket_is_sized_from_refill_period() {
    let factory = Arc::new(CountingFactory::default());
    let period = RefillPeriodMs::try_from(250u64).unwrap();
    let registry = ThrottleRegistry::new(factory.clone(), period);

    registry.resolve(&throttle("a", 120)).unwrap();

    assert_eq!(
        factory.requests.lock().as_slice(),
        &[(30, 30, Duration::from_millis(250))]
    );
}

#[test]
fn factory_failure_stores_nothing() {
    let registry = ThrottleRegistry::new(Arc::new(FailingFactory), RefillPeriodMs::default());

    assert!(matches!(
        registry.resolve(&throttle("a", 1)),
        Err(ThrottleError::InvalidArgument(_))
    ));
    assert_eq!(registry.len(), 0);
    assert_eq!(registry.get("a"), None);
}

#[test]
fn fractional_tokens_per_period_stores_nothing() {
    let factory = Arc::new(CountingFactory::default());
    let period = RefillPeriodMs::try_from(250u64).unwrap();
    let registry = ThrottleRegistry::new(factory.clone(), period);

    assert!(matches!(
        registry.resolve(&throttle("a", 5)),
        Err(ThrottleError::InvalidArgument(_))
    ));
    assert_eq!(factory.created.load(Ordering::SeqCst), 0);
    assert_eq!(registry.len(), 0);

    // A rate that fills the period exactly still works on the same registry.
    assert_eq!(registry.resolve(&throttle("a", 8)).unwrap().capacity(), 2);
}

#[test]
fn close_removes_all_contexts_and_refuses_resolve() {
    let (registry, factory) = registry();

    registry.resolve(&throttle("a", 1)).unwrap();
    registry.resolve(&throttle("b", 2)).unwrap();
    assert_eq!(registry.len(), 2);

    assert_eq!(registry.close(), Some(2));
    assert!(registry.is_closed());
    assert_eq!(registry.len(), 0);
    assert_eq!(registry.get("a"), None);

    assert!(matches!(
        registry.resolve(&throttle("a", 1)),
        Err(ThrottleError::Disposed)
    ));
    assert!(matches!(
        registry.resolve(&throttle("c", 1)),
        Err(ThrottleError::Disposed)
    ));
    assert_eq!(registry.len(), 0);
    assert_eq!(factory.created.load(Ordering::SeqCst), 2);

    assert_eq!(registry.close(), None);
}

#[test]
fn close_racing_resolves_leaves_no_context() {
    for _ in 0..20 {
        let (registry, _) = registry();
        let registry = Arc::new(registry);
        let start = Arc::new(Barrier::new(9));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                let start = start.clone();
                thread::spawn(move || {
                    start.wait();
                    for i in 0..200 {
                        match registry.resolve(&throttle(&format!("tenant_{t}_{i}"), 10)) {
                            Ok(_) => {}
                            Err(ThrottleError::Disposed) => return,
                            Err(err) => panic!("unexpected error: {err}"),
                        }
                    }
                })
            })
            .collect();

        start.wait();
        thread::sleep(Duration::from_micros(200));
        registry.close();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 0);
        assert!(matches!(
            registry.resolve(&throttle("late", 10)),
            Err(ThrottleError::Disposed)
        ));
    }
}

#[test]
fn concurrent_resolve_of_same_descriptor_creates_one_bucket() {
    let (registry, factory) = registry();
    let registry = Arc::new(registry);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    registry.resolve(&throttle("hot", 1000)).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    assert_eq!(registry.len(), 1);
}

#[test]
fn concurrent_resolve_of_distinct_tenants() {
    let (registry, factory) = registry();
    let registry = Arc::new(registry);

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    registry
                        .resolve(&throttle(&format!("tenant_{t}_{i}"), 10))
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.len(), 400);
    assert_eq!(factory.created.load(Ordering::SeqCst), 400);
}

#[test]
fn concurrent_rate_changes_leave_one_of_the_written_rates() {
    let (registry, _) = registry();
    let registry = Arc::new(registry);

    let handles: Vec<_> = [10, 20, 30, 40]
        .into_iter()
        .map(|rps| {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    registry.resolve(&throttle("racy", rps)).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stored = registry.get("racy").unwrap();
    assert!([10, 20, 30, 40].contains(&stored.max_requests_per_second()));
    assert_eq!(registry.len(), 1);
}
