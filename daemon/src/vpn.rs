/// VPN rotation: when on-screen text says the connection was flagged, move to
/// a different server in the regional pool, never straight back to the last one.
use anyhow::Result;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;

use crate::orchestrator::Pause;

pub trait ToastReader {
    /// Current on-screen text. Empty when it could not be read.
    fn read_screen_text(&self) -> String;
}

pub trait VpnController {
    fn disconnect(&self) -> Result<()>;
    fn connect(&self, server_id: &str) -> Result<()>;
}

/// Picks a position in `0..count` among the rotation candidates. Never called
/// with a zero count.
pub trait ServerChooser {
    fn choose(&mut self, count: u32) -> Option<u32>;
}

/// Uniform random choice.
pub struct RandomChooser;

impl ServerChooser for RandomChooser {
    fn choose(&mut self, count: u32) -> Option<u32> {
        (count > 0).then(|| rand::thread_rng().gen_range(0..count))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RotationError {
    #[error("VPN pool {region} has {size} server(s); rotation needs at least 2")]
    PoolTooSmall { region: String, size: u32 },
    #[error("server chooser returned no server")]
    NoChoice,
}

/// Servers `1..=size`, named `"{region}#{index}"`.
#[derive(Debug, Clone)]
pub struct VpnServerPool {
    region: String,
    size: u32,
}

impl VpnServerPool {
    pub fn new(region: impl Into<String>, size: u32) -> Self {
        Self { region: region.into(), size }
    }

    pub fn server_id(&self, index: u32) -> String {
        format!("{}#{}", self.region, index)
    }

    pub fn contains(&self, index: u32) -> bool {
        (1..=self.size).contains(&index)
    }

    /// Number of servers in the pool other than `exclude`.
    pub fn candidate_count(&self, exclude: Option<u32>) -> u32 {
        match exclude {
            Some(skip) if self.contains(skip) => self.size - 1,
            _ => self.size,
        }
    }

    /// The `pos`-th server in ascending order with `exclude` skipped, or `None`
    /// past the last candidate. Pools can be large, so nothing is materialised.
    pub fn candidate_at(&self, pos: u32, exclude: Option<u32>) -> Option<u32> {
        if pos >= self.candidate_count(exclude) {
            return None;
        }
        let index = pos + 1;
        match exclude {
            Some(skip) if self.contains(skip) && index >= skip => Some(index + 1),
            _ => Some(index),
        }
    }
}

/// Owned by the periodic loop; starts empty and is never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VpnRotationState {
    pub last_connected_index: Option<u32>,
}

pub struct RotationController<V, C> {
    keywords: Vec<String>,
    pool: VpnServerPool,
    settle: Duration,
    vpn: V,
    chooser: C,
}

impl<V: VpnController, C: ServerChooser> RotationController<V, C> {
    pub fn new(keywords: &[String], pool: VpnServerPool, settle: Duration, vpn: V, chooser: C) -> Self {
        let keywords = keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords, pool, settle, vpn, chooser }
    }

    /// True if the lower-cased text contains any trigger keyword.
    pub fn is_flagged(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }

    /// Rotates to a new server if `text` contains a trigger keyword.
    ///
    /// The returned state records the chosen server even when disconnect or
    /// connect failed, so a failed attempt still counts against repeating.
    /// A pool that cannot rotate leaves the state unchanged.
    pub fn rotate_if_flagged(
        &mut self,
        text: &str,
        state: VpnRotationState,
        pause: &dyn Pause,
    ) -> VpnRotationState {
        if !self.is_flagged(text) {
            return state;
        }
        tracing::info!("Detected on-screen message matching {:?}. Changing VPN server...", self.keywords);

        let chosen = match self.choose_next(state) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!("Skipping VPN rotation: {e}");
                return state;
            }
        };
        let server_id = self.pool.server_id(chosen);

        if let Err(e) = self.vpn.disconnect() {
            tracing::error!("VPN disconnect failed: {e:#}");
        }
        pause.pause(self.settle);
        match self.vpn.connect(&server_id) {
            Ok(()) => tracing::info!("VPN connected to {server_id}."),
            Err(e) => tracing::error!("Failed to connect VPN to {server_id}: {e:#}"),
        }

        VpnRotationState { last_connected_index: Some(chosen) }
    }

    fn choose_next(&mut self, state: VpnRotationState) -> Result<u32, RotationError> {
        if self.pool.size < 2 {
            return Err(RotationError::PoolTooSmall {
                region: self.pool.region.clone(),
                size: self.pool.size,
            });
        }
        let last = state.last_connected_index;
        let count = self.pool.candidate_count(last);
        self.chooser
            .choose(count)
            .and_then(|pos| self.pool.candidate_at(pos, last))
            .ok_or(RotationError::NoChoice)
    }
}

/// Reads the screen and rotates if flagged. One call per periodic tick.
pub fn check_toasts<T, V, C>(
    reader: &T,
    controller: &mut RotationController<V, C>,
    state: VpnRotationState,
    pause: &dyn Pause,
) -> VpnRotationState
where
    T: ToastReader,
    V: VpnController,
    C: ServerChooser,
{
    let text = reader.read_screen_text();
    tracing::debug!("Extracted screen text: {text:?}");
    controller.rotate_if_flagged(&text, state, pause)
}
