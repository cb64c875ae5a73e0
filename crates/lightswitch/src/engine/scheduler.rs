use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;

use super::message::DeviceTarget;
use super::shutdown::Shutdown;

struct ArmedTimer {
    /// Distinguishes this timer from a newer one armed for the same device
    id: u64,
    handle: JoinHandle<()>,
}

/// Per-device delayed actions.
///
/// At most one timer is armed per device. Arming a device that already has a
/// timer cancels the old one first; the old one never fires.
#[derive(Clone, Default)]
pub struct Scheduler {
    timers: Arc<DashMap<DeviceTarget, ArmedTimer>>,
    next_id: Arc<AtomicU64>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` for `key` after `delay`, replacing any timer already armed
    /// for it.
    ///
    /// The timer is dropped without running if it is superseded or if
    /// `shutdown` fires first. Errors from `action` are logged.
    pub fn arm<F>(&self, key: DeviceTarget, delay: Duration, action: F, shutdown: &Shutdown)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // The entry lock is held across cancel and insert, so no other arm for
        // this device can interleave.
        match self.timers.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.get().handle.abort();
                info!("Previously scheduled turn-off for {} cancelled", key);
                let handle = self.spawn_timer(id, key, delay, action, shutdown);
                occupied.insert(ArmedTimer { id, handle });
            }
            Entry::Vacant(vacant) => {
                let handle = self.spawn_timer(id, key, delay, action, shutdown);
                vacant.insert(ArmedTimer { id, handle });
            }
        }
    }

    fn spawn_timer<F>(
        &self,
        id: u64,
        key: DeviceTarget,
        delay: Duration,
        action: F,
        shutdown: &Shutdown,
    ) -> JoinHandle<()>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let timers = self.timers.clone();
        let shutdown = shutdown.clone();

        debug!("Scheduling turn-off for {} in {:?}", key, delay);

        tokio::spawn(async move {
            // Shutdown wins when it coincides with the deadline
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    timers.remove_if(&key, |_, t| t.id == id);
                    debug!("Scheduled turn-off for {} dropped on shutdown", key);
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            // Only the timer still registered for this device may fire
            if timers.remove_if(&key, |_, t| t.id == id).is_none() {
                return;
            }

            info!("Invoking scheduled turn-off for {}", key);
            if let Err(e) = action() {
                error!("Scheduled turn-off for {} failed: {:#}", key, e);
            }
        })
    }

    /// Cancel every armed timer without running it.
    pub fn cancel_all(&self) {
        let mut cancelled = 0;
        self.timers.retain(|_, timer| {
            timer.handle.abort();
            cancelled += 1;
            false
        });
        if cancelled > 0 {
            info!("Cancelled {} pending turn-off(s)", cancelled);
        }
    }

    /// Number of timers currently armed
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    pub fn is_armed(&self, key: &DeviceTarget) -> bool {
        self.timers.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    use tokio::time::Instant;

    use super::*;

    /// Records the instant each action ran, tagged with a label
    #[derive(Clone, Default)]
    struct Fired(Arc<Mutex<Vec<(&'static str, Instant)>>>);

    impl Fired {
        fn action(
            &self,
            label: &'static str,
        ) -> impl FnOnce() -> anyhow::Result<()> + Send + 'static {
            let fired = self.0.clone();
            move || {
                fired.lock().unwrap().push((label, Instant::now()));
                Ok(())
            }
        }

        fn labels(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().iter().map(|(l, _)| *l).collect()
        }
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let scheduler = Scheduler::new();
        let shutdown = Shutdown::new();
        let fired = Fired::default();
        let key = DeviceTarget::light("hall", 8);
        let start = Instant::now();

        scheduler.arm(key.clone(), Duration::from_millis(100), fired.action("off"), &shutdown);
        assert!(scheduler.is_armed(&key));

        advance(99).await;
        assert!(fired.labels().is_empty());

        advance(2).await;
        assert_eq!(fired.labels(), vec!["off"]);
        let elapsed = fired.0.lock().unwrap()[0].1 - start;
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed <= Duration::from_millis(101));
        assert!(!scheduler.is_armed(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_supersedes() {
        let scheduler = Scheduler::new();
        let shutdown = Shutdown::new();
        let fired = Fired::default();
        let key = DeviceTarget::light("hall", 8);

        scheduler.arm(key.clone(), Duration::from_millis(100), fired.action("first"), &shutdown);
        advance(80).await;
        scheduler.arm(key.clone(), Duration::from_millis(100), fired.action("second"), &shutdown);
        assert_eq!(scheduler.pending(), 1);

        advance(500).await;
        assert_eq!(fired.labels(), vec!["second"]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_devices_are_independent() {
        let scheduler = Scheduler::new();
        let shutdown = Shutdown::new();
        let fired = Fired::default();

        scheduler.arm(
            DeviceTarget::light("hall", 1),
            Duration::from_millis(50),
            fired.action("light"),
            &shutdown,
        );
        scheduler.arm(
            DeviceTarget::group("hall", 1),
            Duration::from_millis(100),
            fired.action("group"),
            &shutdown,
        );
        assert_eq!(scheduler.pending(), 2);

        advance(200).await;
        assert_eq!(fired.labels(), vec!["light", "group"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending() {
        let scheduler = Scheduler::new();
        let shutdown = Shutdown::new();
        let fired = Fired::default();

        scheduler.arm(
            DeviceTarget::light("hall", 8),
            Duration::from_millis(100),
            fired.action("off"),
            &shutdown,
        );
        advance(50).await;
        shutdown.trigger();

        advance(500).await;
        assert!(fired.labels().is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_wins_over_due_timer() {
        let scheduler = Scheduler::new();
        let shutdown = Shutdown::new();
        let fired = Fired::default();

        scheduler.arm(
            DeviceTarget::light("hall", 8),
            Duration::from_millis(100),
            fired.action("off"),
            &shutdown,
        );
        tokio::task::yield_now().await;

        // Both become ready before the timer task is polled again
        shutdown.trigger();
        tokio::time::advance(Duration::from_millis(200)).await;
        advance(10).await;

        assert!(fired.labels().is_empty());
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_arms_fire_once() {
        let scheduler = Scheduler::new();
        let shutdown = Shutdown::new();
        let key = DeviceTarget::light("hall", 8);

        for round in 0..50 {
            let fired = Arc::new(AtomicUsize::new(0));

            let arms: Vec<_> = (0..32)
                .map(|_| {
                    let scheduler = scheduler.clone();
                    let shutdown = shutdown.clone();
                    let key = key.clone();
                    let fired = fired.clone();
                    tokio::spawn(async move {
                        let action = move || {
                            fired.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        };
                        scheduler.arm(key, Duration::from_millis(50), action, &shutdown);
                        assert!(scheduler.pending() <= 1);
                    })
                })
                .collect();
            for arm in arms {
                arm.await.unwrap();
            }
            assert!(scheduler.pending() <= 1);

            tokio::time::sleep(Duration::from_millis(150)).await;
            assert_eq!(fired.load(Ordering::SeqCst), 1, "round {}", round);
            assert_eq!(scheduler.pending(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let scheduler = Scheduler::new();
        let shutdown = Shutdown::new();
        let fired = Fired::default();

        for id in 1..=3 {
            scheduler.arm(
                DeviceTarget::light("hall", id),
                Duration::from_millis(100),
                fired.action("off"),
                &shutdown,
            );
        }
        scheduler.cancel_all();
        assert_eq!(scheduler.pending(), 0);

        advance(500).await;
        assert!(fired.labels().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_action_does_not_affect_others() {
        let scheduler = Scheduler::new();
        let shutdown = Shutdown::new();
        let fired = Fired::default();

        scheduler.arm(
            DeviceTarget::light("hall", 1),
            Duration::from_millis(10),
            || Err(anyhow::anyhow!("bridge unreachable")),
            &shutdown,
        );
        scheduler.arm(
            DeviceTarget::light("hall", 2),
            Duration::from_millis(20),
            fired.action("ok"),
            &shutdown,
        );

        advance(100).await;
        assert_eq!(fired.labels(), vec!["ok"]);
        assert_eq!(scheduler.pending(), 0);
    }
}
