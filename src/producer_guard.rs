//! Single-flight guards: at most one producer runs per key at a time.
//!
//! Locks are released on every exit path of the producer, including panics.
//! Mutex poisoning is ignored since the mutexes protect no data.
//!
//! A producer may itself guard other keys. The striped guard lets the thread
//! holding a stripe enter it again, so nested keys that happen to share a
//! stripe do not deadlock. The adaptive guard has one lock per key and only
//! deadlocks if a producer guards its own key again.

use crate::path_util::{fold_char, AbsolutePath, CaseSensitivity};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub trait ProducerGuard {
    /// Runs `producer` while holding the lock for `key`.
    fn guard_by_key<T>(&self, key: &AbsolutePath, producer: impl FnOnce() -> T) -> T;
}

fn lock_key(key: &AbsolutePath, case_sensitivity: CaseSensitivity) -> String {
    match case_sensitivity {
        CaseSensitivity::CaseSensitive => key.as_str().to_owned(),
        CaseSensitivity::CaseInsensitive => key.as_str().chars().map(fold_char).collect(),
    }
}

// ----------------------------------------------------------------------------
// Striped
// ----------------------------------------------------------------------------

/// A fixed pool of locks indexed by key hash. Unrelated keys may share a
/// stripe and wait on each other; equal keys always share one. Stripes are
/// reentrant for the thread holding them.
pub struct StripedProducerGuard {
    stripes: Box<[Stripe]>,
    case_sensitivity: CaseSensitivity,
}

struct Stripe {
    lock: Mutex<()>,
    /// Token of the thread holding `lock`, 0 when free.
    owner: AtomicUsize,
}

/// Nonzero id of the calling thread.
fn thread_token() -> usize {
    static NEXT: AtomicUsize = AtomicUsize::new(1);
    thread_local! {
        static TOKEN: usize = NEXT.fetch_add(1, Ordering::Relaxed);
    }
    TOKEN.with(|token| *token)
}

/// Clears the stripe owner. Must drop before the mutex guard.
struct StripeOwnership<'a>(&'a AtomicUsize);

impl Drop for StripeOwnership<'_> {
    fn drop(&mut self) {
        self.0.store(0, Ordering::Release);
    }
}

impl StripedProducerGuard {
    pub fn new(stripes: usize, case_sensitivity: CaseSensitivity) -> Self {
        let stripes = stripes.max(1);
        StripedProducerGuard {
            stripes: (0..stripes)
                .map(|_| Stripe {
                    lock: Mutex::new(()),
                    owner: AtomicUsize::new(0),
                })
                .collect(),
            case_sensitivity,
        }
    }

    pub fn default_stripes() -> usize {
        num_cpus::get() * 4
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe_for(&self, key: &AbsolutePath) -> usize {
        let hash = xxhash_rust::xxh3::xxh3_64(lock_key(key, self.case_sensitivity).as_bytes());
        (hash % self.stripes.len() as u64) as usize
    }
}

impl ProducerGuard for StripedProducerGuard {
    fn guard_by_key<T>(&self, key: &AbsolutePath, producer: impl FnOnce() -> T) -> T {
        let stripe = &self.stripes[self.stripe_for(key)];
        let me = thread_token();
        // Only this thread ever stores its own token, so seeing it means we
        // already hold the stripe further up the stack.
        if stripe.owner.load(Ordering::Acquire) == me {
            return producer();
        }
        let _guard = stripe.lock.lock().unwrap_or_else(|e| e.into_inner());
        stripe.owner.store(me, Ordering::Release);
        let _ownership = StripeOwnership(&stripe.owner);
        producer()
    }
}

// ----------------------------------------------------------------------------
// Adaptive
// ----------------------------------------------------------------------------

/// One lock per key currently in flight. Unrelated keys never contend; the
/// lock table only holds keys somebody is working on. Not reentrant: a
/// producer must not guard its own key again.
pub struct AdaptiveProducerGuard {
    locks: DashMap<String, Arc<Mutex<()>>>,
    case_sensitivity: CaseSensitivity,
}

/// Removes the key from the table once the last holder is gone.
struct KeyLease<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    lock: Arc<Mutex<()>>,
}

impl Drop for KeyLease<'_> {
    fn drop(&mut self) {
        // Clones are only taken under the shard lock, which `remove_if` also
        // holds: a count of 2 (table + this lease) means nobody else waits.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 2);
    }
}

impl AdaptiveProducerGuard {
    pub fn new(case_sensitivity: CaseSensitivity) -> Self {
        AdaptiveProducerGuard {
            locks: DashMap::new(),
            case_sensitivity,
        }
    }

    /// Number of keys currently locked or waited on.
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }
}

impl ProducerGuard for AdaptiveProducerGuard {
    fn guard_by_key<T>(&self, key: &AbsolutePath, producer: impl FnOnce() -> T) -> T {
        let key = lock_key(key, self.case_sensitivity);
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let lease = KeyLease {
            locks: &self.locks,
            key,
            lock,
        };
        // Dropped before the lease, so the mutex is released first.
        let _guard = lease.lock.lock().unwrap_or_else(|e| e.into_inner());
        producer()
    }
}

// ----------------------------------------------------------------------------
// Dispatch
// ----------------------------------------------------------------------------

pub enum VfsProducerGuard {
    Striped(StripedProducerGuard),
    Adaptive(AdaptiveProducerGuard),
}

impl ProducerGuard for VfsProducerGuard {
    fn guard_by_key<T>(&self, key: &AbsolutePath, producer: impl FnOnce() -> T) -> T {
        match self {
            VfsProducerGuard::Striped(guard) => guard.guard_by_key(key, producer),
            VfsProducerGuard::Adaptive(guard) => guard.guard_by_key(key, producer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::path;
    use std::sync::Barrier;
    use std::time::Duration;

    fn max_concurrency(guard: &(impl ProducerGuard + Sync), keys: &[&str]) -> usize {
        let running = AtomicUsize::new(0);
        let max_running = AtomicUsize::new(0);
        let barrier = Barrier::new(keys.len());
        std::thread::scope(|s| {
            for key in keys {
                let key = path(key);
                let (running, max_running, barrier) = (&running, &max_running, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    guard.guard_by_key(&key, || {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        max_running.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(50));
                        running.fetch_sub(1, Ordering::SeqCst);
                    });
                });
            }
        });
        max_running.load(Ordering::SeqCst)
    }

    #[test]
    fn striped_serializes_equal_keys() {
        let guard = StripedProducerGuard::new(16, CaseSensitivity::CaseSensitive);
        assert_eq!(max_concurrency(&guard, &["/a", "/a", "/a", "/a"]), 1);
    }

    #[test]
    fn striped_folds_case_when_insensitive() {
        let guard = StripedProducerGuard::new(64, CaseSensitivity::CaseInsensitive);
        assert_eq!(guard.stripe_for(&path("/Src/Main.rs")), guard.stripe_for(&path("/src/main.RS")));
        assert_eq!(max_concurrency(&guard, &["/A", "/a"]), 1);
    }

    #[test]
    fn striped_never_has_zero_stripes() {
        let guard = StripedProducerGuard::new(0, CaseSensitivity::CaseSensitive);
        assert_eq!(guard.stripe_count(), 1);
        assert_eq!(guard.guard_by_key(&path("/x"), || 5), 5);
    }

    #[test]
    fn striped_allows_nested_keys_on_one_stripe() {
        let guard = StripedProducerGuard::new(1, CaseSensitivity::CaseSensitive);
        let nested = guard.guard_by_key(&path("/outer"), || {
            guard.guard_by_key(&path("/outer/inner"), || guard.guard_by_key(&path("/outer"), || 3))
        });
        assert_eq!(nested, 3);
        // Still exclusive across threads once released.
        assert_eq!(max_concurrency(&guard, &["/a", "/b", "/c"]), 1);
    }

    #[test]
    fn striped_stripe_is_released_after_panic() {
        let guard = StripedProducerGuard::new(1, CaseSensitivity::CaseSensitive);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            guard.guard_by_key(&path("/boom"), || panic!("producer failed"))
        }));
        assert!(result.is_err());
        let other_thread = std::thread::scope(|s| s.spawn(|| guard.guard_by_key(&path("/x"), || 4)).join().unwrap());
        assert_eq!(other_thread, 4);
    }

    #[test]
    fn adaptive_serializes_equal_keys_and_cleans_up() {
        let guard = AdaptiveProducerGuard::new(CaseSensitivity::CaseSensitive);
        assert_eq!(max_concurrency(&guard, &["/a", "/a", "/a"]), 1);
        assert_eq!(guard.in_flight(), 0);
    }

    #[test]
    fn adaptive_runs_distinct_keys_in_parallel() {
        let guard = AdaptiveProducerGuard::new(CaseSensitivity::CaseSensitive);
        assert_eq!(max_concurrency(&guard, &["/a", "/b"]), 2);
    }

    #[test]
    fn lock_is_released_after_panic() {
        let guard = AdaptiveProducerGuard::new(CaseSensitivity::CaseSensitive);
        let key = path("/boom");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            guard.guard_by_key(&key, || panic!("producer failed"))
        }));
        assert!(result.is_err());
        assert_eq!(guard.in_flight(), 0);
        assert_eq!(guard.guard_by_key(&key, || 1), 1);
    }
}
