//! Utilities for polling the server on a fixed schedule.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::{Config, DEFAULT_REFRESH_INTERVAL};

/// Options controlling how often we poll. This uses a "builder" pattern, so
/// you can write:
///
/// ```
/// use std::time::Duration;
/// use dask_clusters::PollOptions;
///
/// let options = PollOptions::default().interval(Duration::from_secs(30));
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollOptions {
    /// Time between polls.
    interval: Duration,
}

impl PollOptions {
    /// How long should we wait between polls? Defaults to 5 seconds.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl From<&Config> for PollOptions {
    fn from(config: &Config) -> Self {
        PollOptions::default().interval(config.interval())
    }
}

/// Call `f` every `options.interval`, forever.
///
/// Failures are logged and polling carries on; the next tick is the retry.
/// If a poll takes longer than the interval, missed ticks are skipped rather
/// than fired in a burst.
pub async fn poll<F, Fut, T, E>(options: PollOptions, mut f: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display + Temporary,
{
    // The first poll waits a full interval.
    let start = Instant::now() + options.interval;
    let mut ticks = time::interval_at(start, options.interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    trace!("polling every {:?}", options.interval);
    loop {
        ticks.tick().await;
        match f().await {
            Ok(_) => trace!("poll finished"),
            Err(ref e) if e.might_be_temporary() => {
                warn!("poll failed, will try again: {}", e)
            }
            Err(e) => error!("poll failed: {}", e),
        }
    }
}

/// Errors that know whether they're worth retrying.
pub trait Temporary {
    /// Is this error likely to go away on its own?
    fn might_be_temporary(&self) -> bool;
}

impl Temporary for crate::Error {
    fn might_be_temporary(&self) -> bool {
        crate::Error::might_be_temporary(self)
    }
}

/// A background polling task. Polling stops when this is dropped.
#[derive(Debug)]
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub(crate) fn new(task: JoinHandle<()>) -> PollHandle {
        PollHandle { task }
    }

    /// Stop polling now.
    pub fn stop(self) {}
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

#[tokio::test(start_paused = true)]
async fn polls_on_schedule_and_survives_errors() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let options = PollOptions::default().interval(Duration::from_secs(5));
    let handle = PollHandle::new(tokio::spawn(poll(options, move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                Err(crate::Error::missing_env_var("X"))
            } else {
                Ok(())
            }
        }
    })));

    time::sleep(Duration::from_secs(4)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    time::sleep(Duration::from_secs(7)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    handle.stop();
    time::sleep(Duration::from_secs(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
