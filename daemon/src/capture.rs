/// Packet source for the watcher: a `tcpdump` child process whose line-buffered
/// output is parsed lazily into [`PacketObservation`]s.
///
/// tcpdump runs without `-n`, so destinations arrive as reverse-resolved host
/// names where available (`yt-in-f14.1e100.net.https`) and as numeric
/// addresses otherwise. The trailing `.port` component is stripped.
use anyhow::{bail, Context, Result};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Lines};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use crate::watcher::PacketObservation;

pub const TCPDUMP: &str = "tcpdump";
pub const HTTPS_FILTER: &str = "tcp port 443";

/// Stderr lines kept for the exit report.
const STDERR_TAIL: usize = 8;

/// A running capture. Iterating yields one observation per captured packet
/// and ends when tcpdump closes its output; [`TcpdumpCapture::finish`] then
/// reports how it exited.
pub struct TcpdumpCapture {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<Vec<String>>>,
}

impl TcpdumpCapture {
    /// Starts `tcpdump -l -q <filter>`. Usually needs root or CAP_NET_RAW.
    pub fn spawn(filter: &str) -> Result<Self> {
        let mut cmd = Command::new(TCPDUMP);
        cmd.args(["-l", "-q", filter]);
        Self::spawn_command(cmd)
    }

    fn spawn_command(mut cmd: Command) -> Result<Self> {
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {TCPDUMP}"))?;
        let stdout = child
            .stdout
            .take()
            .context("tcpdump stdout was not captured")?;
        let stderr = child
            .stderr
            .take()
            .context("tcpdump stderr was not captured")?;
        // Drained on its own thread so a chatty stderr never blocks the capture.
        let stderr = std::thread::Builder::new()
            .name("tcpdump-stderr".into())
            .spawn(move || tail_stderr(stderr))
            .context("Failed to start tcpdump stderr reader")?;
        Ok(Self {
            child,
            lines: BufReader::new(stdout).lines(),
            stderr: Some(stderr),
        })
    }

    /// Waits for tcpdump to exit. A non-zero exit becomes an error carrying
    /// the last lines it wrote to stderr.
    pub fn finish(&mut self) -> Result<()> {
        let status = self
            .child
            .wait()
            .with_context(|| format!("Failed to wait for {TCPDUMP}"))?;
        let tail = match self.stderr.take() {
            Some(reader) => reader.join().unwrap_or_default(),
            None => Vec::new(),
        };
        for line in &tail {
            tracing::debug!("[{TCPDUMP}] {line}");
        }
        if !status.success() {
            if tail.is_empty() {
                bail!("{TCPDUMP} exited with {status}");
            }
            bail!("{TCPDUMP} exited with {status}: {}", tail.join("; "));
        }
        Ok(())
    }
}

fn tail_stderr(stderr: ChildStderr) -> Vec<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL);
    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

impl Iterator for TcpdumpCapture {
    type Item = PacketObservation;

    fn next(&mut self) -> Option<PacketObservation> {
        loop {
            match self.lines.next()? {
                Ok(line) => return Some(parse_line(&line)),
                Err(e) => {
                    tracing::warn!("Unreadable capture line: {e}");
                    continue;
                }
            }
        }
    }
}

impl Drop for TcpdumpCapture {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Parses one `tcpdump -q` line. Lines that are not IPv4/IPv6 packets yield an
/// observation with no destination, which the watcher discards.
///
/// ```text
/// 12:00:01.000001 IP laptop.51234 > yt-in-f14.1e100.net.https: tcp 0
/// 12:00:01.000002 IP6 fe80::1.51234 > 2607:f8b0:4005::200e.443: tcp 0
/// ```
pub fn parse_line(line: &str) -> PacketObservation {
    let mut tokens = line.split_whitespace();
    let mut observation = PacketObservation::default();

    let Some(family) = tokens.find(|t| *t == "IP" || *t == "IP6") else {
        return observation;
    };
    let (Some(_src), Some(">"), Some(dst)) = (tokens.next(), tokens.next(), tokens.next()) else {
        return observation;
    };

    let host = strip_port(dst.trim_end_matches(':'));
    if host.is_empty() {
        return observation;
    }
    if family == "IP" {
        observation.ipv4_dst = Some(host.to_string());
    } else {
        observation.ipv6_dst = Some(host.to_string());
    }
    observation
}

fn strip_port(endpoint: &str) -> &str {
    match endpoint.rsplit_once('.') {
        Some((host, _port)) => host,
        None => endpoint,
    }
}
