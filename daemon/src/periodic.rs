/// Interval-driven refresher.
///
/// Each tick: clear the cache (always), settle, check the screen for VPN
/// block messages, then refresh only if the app is focused and no live
/// session is open. The VPN rotation state lives in this loop's frame.
use chrono::Local;
use std::time::Duration;

use crate::event::TriggerEvent;
use crate::orchestrator::{
    CacheStore, FocusOracle, Orchestrator, Pause, RefreshActuator, RefreshDecision, SessionOracle,
};
use crate::vpn::{self, RotationController, ServerChooser, ToastReader, VpnController, VpnRotationState};

pub struct TickOutcome {
    pub state: VpnRotationState,
    pub decision: RefreshDecision,
}

/// One pass of the periodic loop.
pub fn tick<F, S, C, R, T, V, K>(
    orchestrator: &Orchestrator<F, S, C, R>,
    toasts: &T,
    rotation: &mut RotationController<V, K>,
    state: VpnRotationState,
    pause: &dyn Pause,
) -> TickOutcome
where
    F: FocusOracle,
    S: SessionOracle,
    C: CacheStore,
    R: RefreshActuator,
    T: ToastReader,
    V: VpnController,
    K: ServerChooser,
{
    tracing::info!("Clearing cache...");
    // A failed clear is already logged; the refresh decision does not depend on it.
    orchestrator.clear_cache();
    orchestrator.settle(pause);

    let state = vpn::check_toasts(toasts, rotation, state, pause);
    let decision = orchestrator.handle(&TriggerEvent::TimerTick, pause);
    TickOutcome { state, decision }
}

/// Runs ticks back to back, waiting `interval` after each, until the process
/// is interrupted.
pub fn run<F, S, C, R, T, V, K>(
    orchestrator: &Orchestrator<F, S, C, R>,
    toasts: &T,
    rotation: &mut RotationController<V, K>,
    pause: &dyn Pause,
    interval: Duration,
) where
    F: FocusOracle,
    S: SessionOracle,
    C: CacheStore,
    R: RefreshActuator,
    T: ToastReader,
    V: VpnController,
    K: ServerChooser,
{
    let mut state = VpnRotationState::default();
    let mut ticks = 0u64;

    loop {
        let outcome = tick(orchestrator, toasts, rotation, state, pause);
        ticks += 1;
        tracing::debug!("Tick {ticks} finished with {:?}", outcome.decision);
        state = outcome.state;
        wait_for_next_tick(pause, interval);
    }
}

fn wait_for_next_tick(pause: &dyn Pause, interval: Duration) {
    tracing::info!(
        "Waiting {:.1} hours for the next refresh (at {})",
        interval.as_secs_f64() / 3600.0,
        next_tick_at(interval)
    );
    pause.pause(interval);
}

fn next_tick_at(interval: Duration) -> String {
    let next = chrono::Duration::from_std(interval)
        .ok()
        .and_then(|d| Local::now().checked_add_signed(d));
    match next {
        Some(t) => t.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "an unrepresentable time".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::fakes::{journal, orchestrator, FakeOrchestrator, FakePause, Journal};
    use crate::vpn::fakes::{FakeToast, FakeVpn, IndexChooser};
    use crate::vpn::VpnServerPool;

    fn rotation(j: &Journal) -> RotationController<FakeVpn, IndexChooser> {
        RotationController::new(
            &["block".to_string(), "legacy".to_string()],
            VpnServerPool::new("US-FL", 5),
            Duration::from_secs(2),
            FakeVpn::new(j),
            IndexChooser(0),
        )
    }

    #[test]
    fn tick_clears_cache_even_when_unfocused() {
        let j = journal();
        let o = orchestrator(Some("Terminal"), false, &j);
        let mut r = rotation(&j);
        let out = tick(&o, &FakeToast(""), &mut r, VpnRotationState::default(), &FakePause(j.clone()));
        assert_eq!(out.decision, RefreshDecision::SkipNotFocused);
        assert_eq!(*j.borrow(), vec!["clear /cache", "pause 4s"]);
    }

    #[test]
    fn tick_refreshes_only_when_focused_and_idle() {
        let j = journal();
        let o = orchestrator(Some("FreeTube - Home"), false, &j);
        let mut r = rotation(&j);
        let out = tick(&o, &FakeToast(""), &mut r, VpnRotationState::default(), &FakePause(j.clone()));
        assert_eq!(out.decision, RefreshDecision::Perform);
        assert_eq!(*j.borrow(), vec!["clear /cache", "pause 4s", "refresh"]);
    }

    #[test]
    fn tick_with_live_session_skips_refresh() {
        let j = journal();
        let o = orchestrator(Some("FreeTube - Home"), true, &j);
        let mut r = rotation(&j);
        let out = tick(&o, &FakeToast(""), &mut r, VpnRotationState::default(), &FakePause(j.clone()));
        assert_eq!(out.decision, RefreshDecision::SkipSessionActive);
        assert!(!j.borrow().iter().any(|e| e == "refresh"));
        assert!(j.borrow().iter().any(|e| e == "clear /cache"));
    }

    #[test]
    fn tick_rotates_vpn_before_focus_check() {
        let j = journal();
        let o = orchestrator(Some("FreeTube - Home"), false, &j);
        let mut r = rotation(&j);
        let start = VpnRotationState { last_connected_index: Some(1) };
        let out = tick(&o, &FakeToast("Legacy protocol blocked"), &mut r, start, &FakePause(j.clone()));
        assert_eq!(out.state.last_connected_index, Some(2));
        assert_eq!(
            *j.borrow(),
            vec!["clear /cache", "pause 4s", "disconnect", "pause 2s", "connect US-FL#2", "refresh"]
        );
    }

    #[test]
    fn tick_failed_clear_still_evaluates_refresh() {
        let j = journal();
        let mut o = orchestrator(Some("FreeTube"), false, &j);
        o.cache.fail = true;
        let mut r = rotation(&j);
        let out = tick(&o, &FakeToast(""), &mut r, VpnRotationState::default(), &FakePause(j.clone()));
        assert_eq!(out.decision, RefreshDecision::Perform);
    }

    /// Runs `n` ticks the way `run` does, threading the rotation state.
    fn ticks(
        n: usize,
        o: &FakeOrchestrator,
        toasts: &FakeToast,
        r: &mut RotationController<FakeVpn, IndexChooser>,
        pause: &FakePause,
    ) -> VpnRotationState {
        (0..n).fold(VpnRotationState::default(), |state, _| tick(o, toasts, r, state, pause).state)
    }

    #[test]
    fn ticks_thread_rotation_state() {
        let j = journal();
        let o = orchestrator(Some("Terminal"), false, &j);
        let mut r = rotation(&j);
        let last = ticks(3, &o, &FakeToast("blocked"), &mut r, &FakePause(j.clone()));
        // IndexChooser(0) alternates between servers 1 and 2 because the last one is excluded.
        assert_eq!(last.last_connected_index, Some(1));
        let connects: Vec<_> = j.borrow().iter().filter(|e| e.starts_with("connect")).cloned().collect();
        assert_eq!(connects, vec!["connect US-FL#1", "connect US-FL#2", "connect US-FL#1"]);
    }

    #[test]
    fn wait_for_next_tick_pauses_for_interval() {
        let j = journal();
        wait_for_next_tick(&FakePause(j.clone()), Duration::from_secs(3600));
        assert_eq!(*j.borrow(), vec!["pause 3600s"]);
    }

    #[test]
    fn next_tick_at_formats_local_time() {
        let s = next_tick_at(Duration::from_secs(60));
        assert_eq!(s.len(), 19, "Unexpected timestamp: {s}");
        assert_eq!(&s[4..5], "-");
        assert_eq!(&s[10..11], " ");
    }
}
