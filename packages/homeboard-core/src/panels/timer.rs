//! Single-slot cancellable timer.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::runtime::TokioSpawner;

/// Holds at most one pending task.
///
/// Scheduling aborts whatever the slot held before; [`TimerSlot::cancel`] and
/// `Drop` abort the current task.
pub struct TimerSlot {
    spawner: TokioSpawner,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TimerSlot {
    pub fn new(spawner: TokioSpawner) -> Self {
        Self {
            spawner,
            handle: Mutex::new(None),
        }
    }

    /// Runs `callback` once after `delay`.
    pub fn schedule<F>(&self, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
    }

    /// Runs `callback` every `period`, first after one period.
    pub fn schedule_repeating<F>(&self, period: Duration, callback: F)
    where
        F: Fn() + Send + 'static,
    {
        self.spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                callback();
            }
        });
    }

    /// Places an arbitrary task in the slot.
    pub fn spawn<Fut>(&self, future: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = self.spawner.spawn_abortable(future);
        if let Some(previous) = self.handle.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Aborts the current task. Returns true if one was still pending.
    pub fn cancel(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let reader = Arc::clone(&count);
        (count, move || reader.load(Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let slot = TimerSlot::new(TokioSpawner::current());
        let (count, read) = counter();
        slot.schedule(Duration::from_secs(5), move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        assert!(slot.is_pending());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(read(), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(read(), 1);
        assert!(!slot.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_pending_task() {
        let slot = TimerSlot::new(TokioSpawner::current());
        let (count, read) = counter();
        for _ in 0..3 {
            let count = Arc::clone(&count);
            slot.schedule(Duration::from_secs(5), move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_secs(3)).await;
        }

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(read(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_and_drop_abort() {
        let (count, read) = counter();
        let slot = TimerSlot::new(TokioSpawner::current());
        let c = Arc::clone(&count);
        slot.schedule(Duration::from_secs(1), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(slot.cancel());
        assert!(!slot.cancel());

        let dropped = TimerSlot::new(TokioSpawner::current());
        dropped.schedule(Duration::from_secs(1), move || {
            count.fetch_add(1, Ordering::SeqCst);
        });
        drop(dropped);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(read(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn repeating_timer_ticks_until_cancelled() {
        let slot = TimerSlot::new(TokioSpawner::current());
        let (count, read) = counter();
        slot.schedule_repeating(Duration::from_secs(10), move || {
            count.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(read(), 3);

        slot.cancel();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(read(), 3);
    }
}
