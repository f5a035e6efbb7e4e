/// X11 desktop collaborators backed by external command-line tools.
///
/// Each call blocks on a child process. Oracle failures are logged and mapped
/// to the negative answer; actuator failures are returned to the caller.
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::process::{Command, Output, Stdio};

use crate::orchestrator::{FocusOracle, RefreshActuator, SessionOracle};
use crate::vpn::{ToastReader, VpnController};

pub const XDOTOOL: &str = "xdotool";
pub const LSOF: &str = "lsof";
pub const PROTONVPN: &str = "protonvpn-app";
pub const IMPORT: &str = "import";
pub const TESSERACT: &str = "tesseract";

/// Hard-reload shortcut understood by Electron apps.
const REFRESH_KEYS: &str = "ctrl+shift+r";

fn run(program: &str, args: &[&str]) -> Result<Output> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("Failed to run {program}"))
}

fn run_checked(program: &str, args: &[&str]) -> Result<Output> {
    let output = run(program, args)?;
    if !output.status.success() {
        bail!(
            "{program} {} exited with {}: {}",
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output)
}

/// Active window title via `xdotool getwindowfocus getwindowname`.
pub struct XdotoolFocus;

impl FocusOracle for XdotoolFocus {
    fn active_window_title(&self) -> Option<String> {
        match run_checked(XDOTOOL, &["getwindowfocus", "getwindowname"]) {
            Ok(out) => Some(String::from_utf8_lossy(&out.stdout).trim().to_string()),
            Err(e) => {
                tracing::error!("Unable to get focused window: {e:#}");
                None
            }
        }
    }
}

/// Any open socket to `domain` reported by `lsof -i @domain` counts as a live session.
pub struct LsofSession {
    pub domain: String,
}

impl SessionOracle for LsofSession {
    fn live_session_active(&self) -> bool {
        let target = format!("@{}", self.domain);
        // lsof exits 1 when nothing matches, so only the output is meaningful.
        match run(LSOF, &["-i", target.as_str()]) {
            Ok(out) => {
                let active = !String::from_utf8_lossy(&out.stdout).trim().is_empty();
                tracing::debug!("Active TCP session to {}: {active}", self.domain);
                active
            }
            Err(e) => {
                tracing::error!("Error checking for active TCP sessions: {e:#}");
                false
            }
        }
    }
}

/// Sends the reload shortcut to the focused window with `xdotool key`.
pub struct XdotoolRefresh;

impl RefreshActuator for XdotoolRefresh {
    fn send_refresh(&self) -> Result<()> {
        run_checked(XDOTOOL, &["key", "--clearmodifiers", REFRESH_KEYS])?;
        Ok(())
    }
}

/// Screenshots the root window with ImageMagick and OCRs it with tesseract.
pub struct OcrToastReader;

impl OcrToastReader {
    fn capture_text(&self) -> Result<String> {
        let png = run_checked(IMPORT, &["-window", "root", "png:-"])?.stdout;

        let mut child = Command::new(TESSERACT)
            .args(["stdin", "stdout"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to run {TESSERACT}"))?;
        {
            let mut stdin = child.stdin.take().context("tesseract stdin was not captured")?;
            stdin.write_all(&png).context("Failed to pipe screenshot to tesseract")?;
        }
        let output = child.wait_with_output().context("tesseract did not finish")?;
        if !output.status.success() {
            bail!("{TESSERACT} exited with {}", output.status);
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ToastReader for OcrToastReader {
    fn read_screen_text(&self) -> String {
        self.capture_text().unwrap_or_else(|e| {
            tracing::error!("Error capturing toast messages: {e:#}");
            String::new()
        })
    }
}

/// ProtonVPN desktop CLI.
pub struct ProtonVpn;

impl VpnController for ProtonVpn {
    fn disconnect(&self) -> Result<()> {
        run_checked(PROTONVPN, &["disconnect"])?;
        Ok(())
    }

    fn connect(&self, server_id: &str) -> Result<()> {
        run_checked(PROTONVPN, &["connect", server_id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_reports_missing_program() {
        let err = run("tubeflush-no-such-tool", &[]).unwrap_err();
        assert!(err.to_string().contains("tubeflush-no-such-tool"));
    }

    #[cfg(unix)]
    #[test]
    fn run_checked_rejects_non_zero_exit() {
        let err = run_checked("false", &[]).unwrap_err();
        assert!(err.to_string().contains("exited with"), "{err}");
    }

    #[cfg(unix)]
    #[test]
    fn run_checked_returns_stdout_on_success() {
        let out = run_checked("echo", &["FreeTube - Home"]).unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "FreeTube - Home");
    }
}
