/// Packet-driven refresher: every captured packet headed for a watched domain
/// runs the focus gate and, when focused, clears the cache and refreshes.
///
/// The orchestrator runs synchronously inside the capture loop, so packets
/// that arrive during the settle delay wait in tcpdump's pipe.
use crate::orchestrator::{CacheStore, FocusOracle, Orchestrator, Pause, RefreshActuator, SessionOracle};
use crate::watcher::{DomainWatcher, PacketObservation};

/// Consumes `observations` until the stream ends. Returns the number of
/// triggers handled.
pub fn run<I, F, S, C, R>(
    watcher: &DomainWatcher,
    observations: I,
    orchestrator: &Orchestrator<F, S, C, R>,
    pause: &dyn Pause,
) -> u64
where
    I: IntoIterator<Item = PacketObservation>,
    F: FocusOracle,
    S: SessionOracle,
    C: CacheStore,
    R: RefreshActuator,
{
    let mut handled = 0;
    for event in watcher.triggers(observations) {
        orchestrator.handle(&event, pause);
        handled += 1;
    }
    handled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::fakes::{journal, orchestrator, FakePause};

    fn packet(host: &str) -> PacketObservation {
        PacketObservation { ipv4_dst: Some(host.to_string()), ipv6_dst: None }
    }

    fn watcher() -> DomainWatcher {
        DomainWatcher::new(vec!["youtube.com".to_string(), "google.com".to_string()])
    }

    #[test]
    fn run_handles_only_matching_packets() {
        let j = journal();
        let o = orchestrator(Some("FreeTube - Home"), false, &j);
        let stream = vec![packet("www.youtube.com"), packet("example.org"), PacketObservation::default()];
        assert_eq!(run(&watcher(), stream, &o, &FakePause(j.clone())), 1);
        assert_eq!(*j.borrow(), vec!["clear /cache", "pause 4s", "refresh"]);
    }

    #[test]
    fn run_one_refresh_per_packet_even_if_several_domains_match() {
        let j = journal();
        let o = orchestrator(Some("FreeTube - Home"), false, &j);
        let stream = vec![packet("youtube.com.google.com")];
        assert_eq!(run(&watcher(), stream, &o, &FakePause(j.clone())), 1);
        assert_eq!(j.borrow().iter().filter(|e| *e == "refresh").count(), 1);
    }

    #[test]
    fn run_unfocused_never_clears() {
        let j = journal();
        let o = orchestrator(Some("Mozilla Firefox"), false, &j);
        let stream = vec![packet("www.youtube.com"), packet("i.google.com")];
        assert_eq!(run(&watcher(), stream, &o, &FakePause(j.clone())), 2);
        assert!(j.borrow().is_empty());
    }
}
