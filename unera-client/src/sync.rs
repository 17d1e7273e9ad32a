use log::{debug, trace};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use unera_api::Backend;

use crate::shared::Shared;

/// Background timers of a client: the conversation poll, which runs only
/// while signed in, and the story sweep, which runs for the client's whole
/// lifetime. Both hold the client weakly and are aborted on drop.
#[derive(Debug, Default)]
pub struct Synchronizer {
    poller: Mutex<Option<JoinHandle<()>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

fn lock(slot: &Mutex<Option<JoinHandle<()>>>) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn replace(slot: &Mutex<Option<JoinHandle<()>>>, handle: Option<JoinHandle<()>>) {
    if let Some(previous) = std::mem::replace(&mut *lock(slot), handle) {
        previous.abort();
    }
}

fn ticks(period: Duration) -> tokio::time::Interval {
    // first tick one period from now, like a plain repeating timer
    let mut ticks = interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticks
}

impl Synchronizer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn is_polling(&self) -> bool {
        lock(&self.poller)
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    pub fn is_sweeping(&self) -> bool {
        lock(&self.sweeper)
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    pub(crate) fn start_polling<B: Backend>(&self, shared: &Arc<Shared<B>>, epoch: u64) {
        let weak: Weak<Shared<B>> = Arc::downgrade(shared);
        let period = shared.config.poll_interval;
        debug!("polling conversations every {:?}", period);

        let handle = tokio::spawn(async move {
            let mut ticks = ticks(period);
            loop {
                ticks.tick().await;
                let shared = match weak.upgrade() {
                    Some(shared) => shared,
                    None => break,
                };
                trace!("conversation poll tick");
                if !shared.poll_conversations(epoch).await {
                    break;
                }
            }
        });
        replace(&self.poller, Some(handle));
    }

    pub(crate) fn stop_polling(&self) {
        replace(&self.poller, None);
    }

    pub(crate) fn start_sweeping<B: Backend>(&self, shared: &Arc<Shared<B>>) {
        let weak: Weak<Shared<B>> = Arc::downgrade(shared);
        let period = shared.config.story_sweep_interval;

        let handle = tokio::spawn(async move {
            let mut ticks = ticks(period);
            loop {
                ticks.tick().await;
                let shared = match weak.upgrade() {
                    Some(shared) => shared,
                    None => break,
                };
                let swept = shared.sweep_stories().await;
                if swept > 0 {
                    debug!("swept {} expired stories", swept);
                }
            }
        });
        replace(&self.sweeper, Some(handle));
    }

    pub(crate) fn stop_all(&self) {
        replace(&self.poller, None);
        replace(&self.sweeper, None);
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.stop_all();
    }
}
