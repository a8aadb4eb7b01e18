//! Watch loop: polls a thread and re-archives it whenever it changes.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::{ThreadFetch, Transport};
use crate::archiver::{ArchiveOptions, ArchiveSession};
use crate::config::Config;
use crate::site::SiteProfile;

/// Quiet period after which the thread is re-checked for the archived flag.
pub const IDLE_RECHECK_AFTER: Duration = Duration::from_secs(60 * 60);

/// Quiet period after which watching stops unconditionally.
pub const HARD_TIMEOUT: Duration = Duration::from_secs(72 * 60 * 60);

/// Why watching ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The thread was deleted or pruned.
    NotFound,
    /// The thread was moved to the board archive and will not change again.
    HardArchived,
    /// The thread did not change for [`HARD_TIMEOUT`].
    Timeout,
    /// Run-once mode finished its archive pass.
    Completed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::NotFound => "thread not found",
            StopReason::HardArchived => "thread archived",
            StopReason::Timeout => "no changes for 72 hours",
            StopReason::Completed => "archive pass completed",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Polling,
    Archiving,
    Stopped(StopReason),
}

/// What to do on an unchanged tick, given time since the last change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleAction {
    Wait,
    Recheck,
    Timeout,
}

pub fn idle_action(elapsed: Duration) -> IdleAction {
    if elapsed > HARD_TIMEOUT {
        IdleAction::Timeout
    } else if elapsed > IDLE_RECHECK_AFTER {
        IdleAction::Recheck
    } else {
        IdleAction::Wait
    }
}

/// Settings shared by every archive pass of one watch.
#[derive(Debug, Clone)]
pub struct WatchPlan {
    pub site: Arc<SiteProfile>,
    pub dst: PathBuf,
    pub options: ArchiveOptions,
    pub files_only: bool,
    pub run_once: bool,
    pub interval: Duration,
}

impl WatchPlan {
    pub fn from_config(config: &Config) -> Self {
        Self {
            site: Arc::new(config.site_profile()),
            dst: config.dst.clone(),
            options: config.archive_options(),
            files_only: config.files_only,
            run_once: config.run_once,
            interval: config.poll_interval,
        }
    }
}

/// Polls one thread and drives archive sessions.
pub struct Watcher {
    transport: Arc<dyn Transport>,
    board: String,
    thread_id: u64,
    plan: WatchPlan,
    /// Conditional-GET marker from the last successful archive pass.
    last_modified: Option<DateTime<Utc>>,
    /// Newest marker fetched, whether or not its pass succeeded.
    last_seen: Option<DateTime<Utc>>,
    last_change: Instant,
    state: WatchState,
    passes: usize,
}

impl Watcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        board: impl Into<String>,
        thread_id: u64,
        plan: WatchPlan,
    ) -> Self {
        Self {
            transport,
            board: board.into(),
            thread_id,
            plan,
            last_modified: None,
            last_seen: None,
            last_change: Instant::now(),
            state: WatchState::Polling,
            passes: 0,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Number of archive passes attempted so far.
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    /// Poll until a stop condition is reached. The first poll happens
    /// immediately.
    pub async fn run(mut self) -> StopReason {
        let mut ticker = tokio::time::interval(self.plan.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let WatchState::Stopped(reason) = self.tick().await {
                info!(
                    board = %self.board,
                    thread = self.thread_id,
                    passes = self.passes,
                    "Stopped watching: {reason}"
                );
                return reason;
            }
        }
    }

    /// Run one poll and return the resulting state.
    pub async fn tick(&mut self) -> WatchState {
        if let WatchState::Stopped(_) = self.state {
            return self.state;
        }

        let elapsed = self.last_change.elapsed();
        if idle_action(elapsed) == IdleAction::Timeout {
            return self.stop(StopReason::Timeout);
        }

        let fetched = self
            .transport
            .fetch_thread(&self.board, self.thread_id, self.last_modified)
            .await;

        let thread = match fetched {
            Ok(ThreadFetch::Modified(thread)) => thread,
            Ok(ThreadFetch::NotModified) => return self.idle(elapsed).await,
            Err(e) if e.is_not_found() => return self.stop(StopReason::NotFound),
            Err(e) => {
                warn!(board = %self.board, thread = self.thread_id, "Failed to refresh thread: {e}");
                return self.state;
            }
        };

        // A failed pass is retried with the same marker; only a new marker
        // counts as activity.
        let marker = thread.last_modified;
        if self.last_seen != Some(marker) {
            self.last_seen = Some(marker);
            self.last_change = Instant::now();
        } else if thread.archived && idle_action(elapsed) == IdleAction::Recheck {
            return self.stop(StopReason::HardArchived);
        }

        self.state = WatchState::Archiving;
        self.passes += 1;

        let session = ArchiveSession::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.plan.site),
            &self.plan.dst,
            thread,
            self.plan.options,
        );

        let succeeded = if self.plan.files_only {
            session.archive_files_only().await;
            true
        } else {
            match session.archive().await {
                Ok(_) => true,
                Err(e) => {
                    warn!(board = %self.board, thread = self.thread_id, "Archive pass failed, will retry: {e}");
                    false
                }
            }
        };

        if !succeeded {
            self.state = WatchState::Polling;
            return self.state;
        }

        self.last_modified = Some(marker);
        if self.plan.run_once {
            return self.stop(StopReason::Completed);
        }

        self.state = WatchState::Polling;
        self.state
    }

    async fn idle(&mut self, elapsed: Duration) -> WatchState {
        match idle_action(elapsed) {
            IdleAction::Timeout => self.stop(StopReason::Timeout),
            IdleAction::Wait => {
                debug!(board = %self.board, thread = self.thread_id, "Thread not modified");
                self.state
            }
            IdleAction::Recheck => {
                debug!(
                    board = %self.board,
                    thread = self.thread_id,
                    idle_secs = elapsed.as_secs(),
                    "Thread quiet, checking archived flag"
                );
                match self.transport.fetch_thread(&self.board, self.thread_id, None).await {
                    Ok(ThreadFetch::Modified(thread)) if thread.archived => {
                        self.stop(StopReason::HardArchived)
                    }
                    Ok(_) => self.state,
                    Err(e) if e.is_not_found() => self.stop(StopReason::NotFound),
                    Err(e) => {
                        warn!(board = %self.board, thread = self.thread_id, "Archived re-check failed: {e}");
                        self.state
                    }
                }
            }
        }
    }

    fn stop(&mut self, reason: StopReason) -> WatchState {
        self.state = WatchState::Stopped(reason);
        self.state
    }
}
