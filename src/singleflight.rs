//! Request Coalescing Module
//!
//! Collapses concurrent loads of the same key into a single execution.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{CacheError, Result};

/// Shared slot an in-flight call publishes its outcome into.
type CallSlot<T> = Option<Result<T>>;

enum Role<T> {
    Leader(watch::Sender<CallSlot<T>>),
    Follower(watch::Receiver<CallSlot<T>>),
}

// == Request Coalescer ==
/// Ensures at most one in-flight execution per key.
///
/// The first caller for a key (the leader) runs the work; callers arriving
/// while it runs (followers) wait and receive a clone of the leader's
/// outcome, errors included. Once the leader has published and deregistered
/// its call, the next caller for that key starts a fresh execution.
///
/// Followers wait indefinitely unless a wait timeout is configured. If the
/// leader's future is dropped before finishing, the first follower to notice
/// becomes the leader of a new generation and the others join it.
#[derive(Debug)]
pub struct RequestCoalescer<T> {
    calls: Mutex<HashMap<String, watch::Receiver<CallSlot<T>>>>,
    wait_timeout: Option<Duration>,
}

impl<T> Default for RequestCoalescer<T> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            wait_timeout: None,
        }
    }
}

impl<T: Clone> RequestCoalescer<T> {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a coalescer whose followers give up after `timeout`.
    pub fn with_wait_timeout(timeout: Duration) -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            wait_timeout: Some(timeout),
        }
    }

    // == Execute ==
    /// Runs `func` for `key` unless a run is already in flight, in which
    /// case the in-flight outcome is awaited and returned instead.
    ///
    /// When the leader is dropped before publishing, a waiting caller takes
    /// over and runs its own `func` as the next generation.
    pub async fn execute<F, Fut>(&self, key: &str, func: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let deadline = self.wait_timeout.map(|after| (Instant::now() + after, after));

        loop {
            match self.join(key) {
                Role::Leader(tx) => {
                    let registration = Registration {
                        calls: &self.calls,
                        key,
                        call: tx.subscribe(),
                    };
                    let outcome = func().await;
                    tx.send_replace(Some(outcome.clone()));
                    drop(registration);
                    return outcome;
                }
                Role::Follower(rx) => {
                    debug!(key, "joining in-flight load");
                    match self.wait_for_leader(key, rx, deadline).await {
                        Some(outcome) => return outcome,
                        None => debug!(key, "in-flight load abandoned, taking over"),
                    }
                }
            }
        }
    }

    /// Number of keys with a load currently in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    fn join(&self, key: &str) -> Role<T> {
        let mut calls = self.calls.lock();
        match calls.get(key) {
            Some(rx) => Role::Follower(rx.clone()),
            None => {
                let (tx, rx) = watch::channel(None);
                calls.insert(key.to_string(), rx);
                Role::Leader(tx)
            }
        }
    }

    /// Waits for the leader's outcome. `None` means the leader was dropped
    /// without publishing.
    async fn wait_for_leader(
        &self,
        key: &str,
        mut rx: watch::Receiver<CallSlot<T>>,
        deadline: Option<(Instant, Duration)>,
    ) -> Option<Result<T>> {
        let published = rx.wait_for(Option::is_some);
        let slot = match deadline {
            Some((at, after)) => match tokio::time::timeout_at(at, published).await {
                Ok(slot) => slot,
                Err(_) => {
                    return Some(Err(CacheError::Timeout {
                        key: key.to_string(),
                        after,
                    }))
                }
            },
            None => published.await,
        };

        // The sender only closes without publishing when the leader was dropped
        match slot {
            Ok(outcome) => Option::clone(&outcome),
            Err(_) => None,
        }
    }
}

/// Deregisters the leader's call when it finishes or is dropped.
struct Registration<'a, T> {
    calls: &'a Mutex<HashMap<String, watch::Receiver<CallSlot<T>>>>,
    key: &'a str,
    call: watch::Receiver<CallSlot<T>>,
}

impl<T> Drop for Registration<'_, T> {
    fn drop(&mut self) {
        let mut calls = self.calls.lock();
        // A later generation may already own the key
        if calls
            .get(self.key)
            .is_some_and(|rx| rx.same_channel(&self.call))
        {
            calls.remove(self.key);
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::cache::ByteView;

    #[tokio::test]
    async fn test_single_call() {
        let group = RequestCoalescer::new();
        let value = group
            .execute("key", || async { Ok(ByteView::copy_from(b"bar")) })
            .await
            .unwrap();

        assert_eq!(value.as_slice(), b"bar");
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_error_is_returned() {
        let group: RequestCoalescer<ByteView> = RequestCoalescer::new();
        let err = group
            .execute("key", || async {
                Err(CacheError::loader(anyhow::anyhow!("some error")))
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "some error");
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_are_coalesced() {
        let group = Arc::new(RequestCoalescer::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let group = Arc::clone(&group);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    group
                        .execute("key", || async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(200)).await;
                            Ok(ByteView::copy_from(b"bar"))
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert_eq!(value.as_slice(), b"bar");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiters_share_the_same_error() {
        let group: Arc<RequestCoalescer<ByteView>> = Arc::new(RequestCoalescer::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let group = Arc::clone(&group);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    group
                        .execute("key", || async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(200)).await;
                            Err(CacheError::loader(anyhow::anyhow!("upstream down")))
                        })
                        .await
                })
            })
            .collect();

        let mut sources = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Err(CacheError::Loader(source)) => sources.push(source),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sources.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_distinct_keys_run_independently() {
        let group = RequestCoalescer::new();
        let a = group.execute("a", || async { Ok(1) });
        let b = group.execute("b", || async { Ok(2) });

        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sequential_calls_execute_again() {
        let group = RequestCoalescer::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            group
                .execute("key", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_waiter_times_out() {
        let group = Arc::new(RequestCoalescer::with_wait_timeout(Duration::from_millis(50)));

        let leader = {
            let group = Arc::clone(&group);
            tokio::spawn(async move {
                group
                    .execute("slow", || async {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        Ok(7)
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = group
            .execute("slow", || async { Ok(0) })
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Timeout { .. }));
        assert_eq!(leader.await.unwrap().unwrap(), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_leader_hands_over_to_waiter() {
        let group = Arc::new(RequestCoalescer::<u32>::new());

        let leader = {
            let group = Arc::clone(&group);
            tokio::spawn(async move {
                group
                    .execute("stuck", || std::future::pending::<Result<u32>>())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(group.in_flight(), 1);

        let follower = {
            let group = Arc::clone(&group);
            tokio::spawn(async move { group.execute("stuck", || async { Ok(1) }).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();

        assert_eq!(follower.await.unwrap().unwrap(), 1);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_waiters_share_the_takeover_generation() {
        let group = Arc::new(RequestCoalescer::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let leader = {
            let group = Arc::clone(&group);
            tokio::spawn(async move {
                group
                    .execute("key", || std::future::pending::<Result<u32>>())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let followers: Vec<_> = (0..4)
            .map(|_| {
                let group = Arc::clone(&group);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    group
                        .execute("key", || async {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok(9)
                        })
                        .await
                })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();

        for follower in followers {
            assert_eq!(follower.await.unwrap().unwrap(), 9);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
