//! Keyed trailing-edge debouncer
//!
//! Scheduling under a key cancels the timer still pending under that key, so a
//! burst of calls runs the action once, `delay` after the last call. Once the
//! timer has fired the action runs detached and is no longer cancellable.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct Debouncer {
    timers: Mutex<HashMap<&'static str, JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<&'static str, JoinHandle<()>>> {
        match self.timers.lock() {
            Ok(timers) => timers,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run `action` after `delay` unless rescheduled or cancelled first
    pub fn schedule<F>(&self, runtime: &Handle, key: &'static str, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let detached = runtime.clone();
        let timer = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            detached.spawn(action);
        });
        if let Some(previous) = self.timers().insert(key, timer) {
            previous.abort();
        }
    }

    /// Cancel the pending timer under `key`, returning whether one was pending
    pub fn cancel(&self, key: &'static str) -> bool {
        match self.timers().remove(key) {
            Some(timer) => {
                let pending = !timer.is_finished();
                timer.abort();
                pending
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, timer) in self.timers().drain() {
            timer.abort();
        }
    }

    pub fn is_pending(&self, key: &'static str) -> bool {
        self.timers()
            .get(key)
            .map(|timer| !timer.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
