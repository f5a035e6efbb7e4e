/// Domain watcher: turns observed packet destinations into refresh triggers.
use crate::event::TriggerEvent;

/// Destination addresses pulled out of one captured packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketObservation {
    pub ipv4_dst: Option<String>,
    pub ipv6_dst: Option<String>,
}

impl PacketObservation {
    /// The IPv4 destination if present, otherwise the IPv6 one.
    pub fn destination(&self) -> Option<&str> {
        self.ipv4_dst.as_deref().or(self.ipv6_dst.as_deref())
    }
}

/// Returns the first domain in list order that is a (case-sensitive) substring of `host`.
pub fn first_match<'a>(host: &str, domains: &'a [String]) -> Option<&'a str> {
    domains
        .iter()
        .map(String::as_str)
        .find(|d| host.contains(d))
}

/// True iff any configured domain is a substring of `host`.
pub fn matches(host: &str, domains: &[String]) -> bool {
    first_match(host, domains).is_some()
}

pub struct DomainWatcher {
    domains: Vec<String>,
}

impl DomainWatcher {
    pub fn new(domains: Vec<String>) -> Self {
        Self { domains }
    }

    /// Emits at most one trigger per observation. Observations without a
    /// destination are discarded.
    pub fn classify(&self, observation: &PacketObservation) -> Option<TriggerEvent> {
        let host = observation.destination()?;
        let domain = first_match(host, &self.domains)?;
        tracing::debug!("Detected HTTPS traffic to {host} (matched {domain})");
        Some(TriggerEvent::NetworkMatch {
            host: host.to_string(),
            domain: domain.to_string(),
        })
    }

    /// Lazily maps a (possibly endless) observation stream to its triggers.
    pub fn triggers<I>(&self, observations: I) -> Triggers<'_, I::IntoIter>
    where
        I: IntoIterator<Item = PacketObservation>,
    {
        Triggers { watcher: self, observations: observations.into_iter() }
    }
}

/// Iterator returned by [`DomainWatcher::triggers`].
pub struct Triggers<'a, I> {
    watcher: &'a DomainWatcher,
    observations: I,
}

impl<I: Iterator<Item = PacketObservation>> Iterator for Triggers<'_, I> {
    type Item = TriggerEvent;

    fn next(&mut self) -> Option<TriggerEvent> {
        loop {
            let observation = self.observations.next()?;
            if let Some(event) = self.watcher.classify(&observation) {
                return Some(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domains(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn v4(host: &str) -> PacketObservation {
        PacketObservation { ipv4_dst: Some(host.to_string()), ipv6_dst: None }
    }

    // ── matches ───────────────────────────────────────────────────────────────

    #[test]
    fn matches_substring_of_host() {
        let d = domains(&["youtube.com", "google.com"]);
        assert!(matches("www.youtube.com", &d));
        assert!(matches("accounts.google.com", &d));
        assert!(!matches("example.org", &d));
    }

    #[test]
    fn matches_is_case_sensitive() {
        let d = domains(&["youtube.com"]);
        assert!(!matches("WWW.YOUTUBE.COM", &d));
    }

    #[test]
    fn matches_empty_domain_list_never_matches() {
        assert!(!matches("www.youtube.com", &[]));
    }

    #[test]
    fn matches_outcome_is_order_independent() {
        let hosts = ["youtube.com.google.com", "google.com", "i.ytimg.com", ""];
        let forward = domains(&["youtube.com", "google.com", "ytimg.com"]);
        let mut reversed = forward.clone();
        reversed.reverse();
        for h in hosts {
            assert_eq!(matches(h, &forward), matches(h, &reversed), "host {h:?}");
        }
    }

    #[test]
    fn first_match_follows_list_order() {
        let host = "youtube.com.google.com";
        assert_eq!(first_match(host, &domains(&["youtube.com", "google.com"])), Some("youtube.com"));
        assert_eq!(first_match(host, &domains(&["google.com", "youtube.com"])), Some("google.com"));
    }

    // ── classify ──────────────────────────────────────────────────────────────

    #[test]
    fn classify_prefers_ipv4_destination() {
        let w = DomainWatcher::new(domains(&["youtube.com"]));
        let obs = PacketObservation {
            ipv4_dst: Some("example.org".to_string()),
            ipv6_dst: Some("www.youtube.com".to_string()),
        };
        assert_eq!(w.classify(&obs), None);
    }

    #[test]
    fn classify_falls_back_to_ipv6_destination() {
        let w = DomainWatcher::new(domains(&["youtube.com"]));
        let obs = PacketObservation { ipv4_dst: None, ipv6_dst: Some("www.youtube.com".to_string()) };
        assert_eq!(
            w.classify(&obs),
            Some(TriggerEvent::NetworkMatch {
                host: "www.youtube.com".to_string(),
                domain: "youtube.com".to_string(),
            })
        );
    }

    #[test]
    fn classify_discards_observation_without_destination() {
        let w = DomainWatcher::new(domains(&["youtube.com"]));
        assert_eq!(w.classify(&PacketObservation::default()), None);
    }

    // ── triggers ──────────────────────────────────────────────────────────────

    #[test]
    fn triggers_emits_one_event_per_matching_packet() {
        let w = DomainWatcher::new(domains(&["youtube.com", "google.com", "com"]));
        let stream = vec![v4("www.youtube.com"), v4("example.org"), v4("mail.google.com")];
        let events: Vec<_> = w.triggers(stream).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            TriggerEvent::NetworkMatch {
                host: "www.youtube.com".to_string(),
                domain: "youtube.com".to_string(),
            }
        );
    }

    #[test]
    fn triggers_is_lazy_over_endless_streams() {
        let w = DomainWatcher::new(domains(&["youtube.com"]));
        let endless = std::iter::repeat_with(|| v4("r1.youtube.com"));
        let first_three: Vec<_> = w.triggers(endless).take(3).collect();
        assert_eq!(first_three.len(), 3);
    }
}
