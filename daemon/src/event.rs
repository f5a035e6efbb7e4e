/// Something that makes the orchestrator evaluate whether to refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    /// A captured packet was headed for a host on the domain allow-list.
    NetworkMatch { host: String, domain: String },
    /// The periodic interval elapsed.
    TimerTick,
}
