//! Pushing the full channel list to the mixer.
//!
//! At most one sync runs at a time. A sync is best effort: every command is
//! attempted, failures are counted, nothing is rolled back.

use crate::events::EventBroadcaster;
use crate::mixer::{MixerClient, MixerTarget};
use crate::protocol::PreampCommand;
use parking_lot::Mutex;
use sqpatch_types::channel::{Channel, PreampLayout, PreampSocket};
use sqpatch_types::{SqEvent, SyncResult, SyncState, SyncStatusResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("sync already in progress")]
    AlreadyRunning,
    #[error("sync did not finish within {0:?}")]
    Timeout(Duration),
}

/// One channel's share of a sync.
#[derive(Debug, Clone)]
struct SyncItem {
    channel: Channel,
    sockets: Vec<PreampSocket>,
}

/// Sockets to address for each channel, skipping line channels and line
/// partners.
fn plan(channels: Vec<Channel>, layout: &PreampLayout) -> Vec<SyncItem> {
    channels
        .into_iter()
        .filter(|c| !layout.is_line_socket(c.socket()))
        .map(|channel| {
            let mut sockets = vec![channel.socket()];
            if let Some(partner) = channel.partner_socket() {
                if partner.id != channel.preamp_id && !layout.is_line_socket(partner) {
                    sockets.push(partner);
                }
            }
            SyncItem { channel, sockets }
        })
        .collect()
}

#[derive(Debug, Default)]
struct JobState {
    status: SyncState,
    current: usize,
    total: usize,
    last_result: Option<SyncResult>,
}

struct SyncInner {
    mixer: Arc<dyn MixerClient>,
    pace: Duration,
    job: Mutex<JobState>,
    events: EventBroadcaster,
}

/// Single-flight sync job runner.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<SyncInner>,
}

/// Returns the job to idle however the task ends.
struct RunningGuard {
    inner: Arc<SyncInner>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let mut job = self.inner.job.lock();
        if job.status.is_running() {
            job.status = SyncState::Idle;
            if job.last_result.is_none() {
                job.last_result = Some(SyncResult {
                    synced: 0,
                    error: Some("sync aborted".to_string()),
                });
            }
        }
    }
}

impl SyncCoordinator {
    pub fn new(mixer: Arc<dyn MixerClient>, pace: Duration, events: EventBroadcaster) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                mixer,
                pace,
                job: Mutex::new(JobState::default()),
                events,
            }),
        }
    }

    /// Start pushing `channels` to `target` in the background.
    ///
    /// Returns the number of sockets that will be addressed, or
    /// [`SyncError::AlreadyRunning`] without queuing anything.
    pub fn start(
        &self,
        target: MixerTarget,
        channels: Vec<Channel>,
        layout: &PreampLayout,
    ) -> Result<usize, SyncError> {
        let items = plan(channels, layout);
        let total = items.iter().map(|i| i.sockets.len()).sum();

        {
            let mut job = self.inner.job.lock();
            if job.status.is_running() {
                return Err(SyncError::AlreadyRunning);
            }
            job.status = SyncState::Running;
            job.current = 0;
            job.total = total;
            job.last_result = None;
        }

        info!("Sync to {} started: {} channels, {} sockets", target, items.len(), total);
        self.inner.events.broadcast(SqEvent::SyncStarted { total });

        let guard = RunningGuard {
            inner: Arc::clone(&self.inner),
        };
        tokio::spawn(async move {
            let result = run(&guard.inner, &target, items, total).await;
            {
                let mut job = guard.inner.job.lock();
                job.status = SyncState::Idle;
                job.last_result = Some(result.clone());
            }
            match &result.error {
                Some(error) => warn!("Sync to {} finished with errors: {}", target, error),
                None => info!("Sync to {} finished: {} channels", target, result.synced),
            }
            guard.inner.events.broadcast(SqEvent::SyncFinished { result });
        });

        Ok(total)
    }

    pub fn status(&self) -> SyncStatusResponse {
        let job = self.inner.job.lock();
        SyncStatusResponse {
            status: job.status,
            current: job.current,
            total: job.total,
            last_result: job.last_result.clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.job.lock().status.is_running()
    }

    /// Poll every `interval` until the job is idle or `deadline` has passed.
    pub async fn wait_idle(
        &self,
        interval: Duration,
        deadline: Duration,
    ) -> Result<SyncStatusResponse, SyncError> {
        let started = Instant::now();
        loop {
            let status = self.status();
            if !status.status.is_running() {
                return Ok(status);
            }
            if started.elapsed() >= deadline {
                return Err(SyncError::Timeout(deadline));
            }
            tokio::time::sleep(interval).await;
        }
    }
}

async fn run(inner: &SyncInner, target: &MixerTarget, items: Vec<SyncItem>, total: usize) -> SyncResult {
    let mut synced = 0;
    let mut first_error: Option<String> = None;
    let mut done = 0;
    let count = items.len();

    for (index, item) in items.into_iter().enumerate() {
        let mut failed = false;
        let ch = &item.channel;
        for socket in item.sockets {
            for command in PreampCommand::full_state(ch.phantom, ch.pad, ch.gain) {
                if let Err(e) = inner.mixer.send(target, socket, command).await {
                    warn!("Sync: {} {} failed: {}", socket, command, e);
                    failed = true;
                    first_error.get_or_insert_with(|| format!("{}: {}", socket, e));
                }
            }
            done += 1;
            inner.job.lock().current = done;
            inner.events.broadcast(SqEvent::SyncProgress {
                current: done,
                total,
            });
        }
        if !failed {
            synced += 1;
        }
        if index + 1 < count && !inner.pace.is_zero() {
            tokio::time::sleep(inner.pace).await;
        }
    }

    SyncResult {
        synced,
        error: first_error,
    }
}
