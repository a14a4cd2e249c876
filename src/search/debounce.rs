use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

struct Scheduled {
  cancelled: Arc<Mutex<bool>>,
  handle: JoinHandle<()>,
}

/// One-shot timer that runs a callback after a quiet period.
///
/// Scheduling again replaces the pending callback. The callback runs while holding the
/// lock `cancel` takes, so once `cancel` returns the callback has either finished or will
/// never run. Dropping the timer cancels it.
#[derive(Default)]
pub struct DebounceTimer {
  scheduled: Option<Scheduled>,
}

impl DebounceTimer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn schedule<F>(&mut self, delay: Duration, f: F)
  where
    F: FnOnce() + Send + 'static,
  {
    self.cancel();

    let cancelled = Arc::new(Mutex::new(false));
    let flag = cancelled.clone();
    let handle = tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      let mut cancelled = flag.lock().unwrap_or_else(PoisonError::into_inner);
      if !*cancelled {
        *cancelled = true;
        f();
      }
    });

    self.scheduled = Some(Scheduled { cancelled, handle });
  }

  pub fn cancel(&mut self) {
    if let Some(scheduled) = self.scheduled.take() {
      *scheduled
        .cancelled
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = true;
      scheduled.handle.abort();
    }
  }

  /// Whether a callback is waiting to fire.
  pub fn is_pending(&self) -> bool {
    self.scheduled.as_ref().is_some_and(|scheduled| {
      !*scheduled
        .cancelled
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
    })
  }
}

impl Drop for DebounceTimer {
  fn drop(&mut self) {
    self.cancel();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let make = move || {
      let c = c.clone();
      Box::new(move || {
        c.fetch_add(1, Ordering::SeqCst);
      }) as Box<dyn FnOnce() + Send>
    };
    (count, make)
  }

  #[tokio::test(start_paused = true)]
  async fn test_fires_after_delay() {
    let (count, make) = counter();
    let mut timer = DebounceTimer::new();
    timer.schedule(Duration::from_millis(500), make());
    assert!(timer.is_pending());

    tokio::time::sleep(Duration::from_millis(499)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(!timer.is_pending());
  }

  #[tokio::test(start_paused = true)]
  async fn test_reschedule_replaces_pending_callback() {
    let (count, make) = counter();
    let mut timer = DebounceTimer::new();
    for _ in 0..3 {
      timer.schedule(Duration::from_millis(500), make());
      tokio::time::sleep(Duration::from_millis(100)).await;
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancelled_callback_never_runs() {
    let (count, make) = counter();
    let mut timer = DebounceTimer::new();
    timer.schedule(Duration::from_millis(500), make());
    tokio::time::sleep(Duration::from_millis(400)).await;
    timer.cancel();
    assert!(!timer.is_pending());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_drop_cancels() {
    let (count, make) = counter();
    {
      let mut timer = DebounceTimer::new();
      timer.schedule(Duration::from_millis(500), make());
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(count.load(Ordering::SeqCst), 0);
  }
}
