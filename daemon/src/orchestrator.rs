/// Refresh orchestrator: the focus and session gates in front of
/// "clear cache, settle, refresh".
///
/// Every collaborator is a synchronous capability trait. The real
/// implementations live in [`crate::desktop`] and [`crate::cache`] and block
/// on subprocesses or the filesystem; tests substitute recording fakes.
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::ClearOutcome;
use crate::event::TriggerEvent;

/// Window focus oracle. `None` means the title could not be determined.
pub trait FocusOracle {
    fn active_window_title(&self) -> Option<String>;
}

/// Session activity oracle: is a live connection to the monitored domain open?
pub trait SessionOracle {
    fn live_session_active(&self) -> bool;
}

pub trait CacheStore {
    /// Destructively replaces `path` with an empty directory.
    fn clear(&self, path: &Path) -> Result<ClearOutcome>;
}

pub trait RefreshActuator {
    /// Sends the reload command to the focused application.
    fn send_refresh(&self) -> Result<()>;
}

/// Blocking wait used for settle delays and the polling interval.
pub trait Pause {
    fn pause(&self, duration: Duration);
}

pub struct ThreadSleep;

impl Pause for ThreadSleep {
    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    Perform,
    SkipNotFocused,
    SkipSessionActive,
}

/// Case-insensitive check that `title` contains `app_name`.
pub fn is_target_window(title: Option<&str>, app_name: &str) -> bool {
    title.is_some_and(|t| t.to_lowercase().contains(&app_name.to_lowercase()))
}

pub struct Orchestrator<F, S, C, R> {
    pub app_name: String,
    pub cache_dir: PathBuf,
    pub settle: Duration,
    pub focus: F,
    pub session: S,
    pub cache: C,
    pub actuator: R,
}

impl<F, S, C, R> Orchestrator<F, S, C, R>
where
    F: FocusOracle,
    S: SessionOracle,
    C: CacheStore,
    R: RefreshActuator,
{
    /// Runs the focus gate, then the session gate when `check_session` is set.
    pub fn decide(&self, check_session: bool) -> RefreshDecision {
        let title = self.focus.active_window_title();
        tracing::debug!("Focused window: {}", title.as_deref().unwrap_or("<unavailable>"));

        if !is_target_window(title.as_deref(), &self.app_name) {
            tracing::info!("{} is not focused. Skipping refresh.", self.app_name);
            return RefreshDecision::SkipNotFocused;
        }
        tracing::info!("{} is focused.", self.app_name);

        if check_session && self.session.live_session_active() {
            tracing::info!("Active session to the monitored domain detected. Skipping refresh.");
            return RefreshDecision::SkipSessionActive;
        }
        RefreshDecision::Perform
    }

    /// Clears the cache directory, logging the outcome. Returns whether the
    /// directory now exists and is empty.
    pub fn clear_cache(&self) -> bool {
        match self.cache.clear(&self.cache_dir) {
            Ok(ClearOutcome::Cleared) => {
                tracing::info!("Cache cleared: {}", self.cache_dir.display());
                true
            }
            Ok(ClearOutcome::Created) => {
                tracing::info!("Cache directory created: {}", self.cache_dir.display());
                true
            }
            Err(e) => {
                tracing::error!("Error clearing cache: {e:#}");
                false
            }
        }
    }

    pub fn settle(&self, pause: &dyn Pause) {
        pause.pause(self.settle);
    }

    pub fn refresh(&self) {
        match self.actuator.send_refresh() {
            Ok(()) => tracing::info!("{} refreshed.", self.app_name),
            Err(e) => tracing::error!("Failed to refresh {}: {e:#}", self.app_name),
        }
    }

    /// Runs one trigger through the gates. The variant selects the gating:
    ///
    /// - `NetworkMatch`: focus gate only, then clear, settle and refresh. The
    ///   refresh is only sent once the cache clear has succeeded.
    /// - `TimerTick`: focus and session gates, then refresh. The periodic loop
    ///   has already cleared the cache unconditionally before this point.
    pub fn handle(&self, event: &TriggerEvent, pause: &dyn Pause) -> RefreshDecision {
        match event {
            TriggerEvent::NetworkMatch { host, domain } => {
                tracing::debug!("Evaluating refresh for traffic to {host} ({domain})");
                self.on_network_match(pause)
            }
            TriggerEvent::TimerTick => self.on_timer_tick(),
        }
    }

    fn on_network_match(&self, pause: &dyn Pause) -> RefreshDecision {
        let decision = self.decide(false);
        if decision == RefreshDecision::Perform {
            tracing::info!("Clearing cache and refreshing {}", self.app_name);
            if self.clear_cache() {
                self.settle(pause);
                self.refresh();
            }
        }
        decision
    }

    fn on_timer_tick(&self) -> RefreshDecision {
        let decision = self.decide(true);
        if decision == RefreshDecision::Perform {
            tracing::info!("No active session detected. Refreshing {}", self.app_name);
            self.refresh();
        }
        decision
    }
}
