/// Start-up check that every external tool a mode shells out to is on PATH.
use anyhow::{bail, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::capture::TCPDUMP;
use crate::desktop::{IMPORT, LSOF, PROTONVPN, TESSERACT, XDOTOOL};

pub const PERIODIC_TOOLS: &[&str] = &[XDOTOOL, LSOF, PROTONVPN, IMPORT, TESSERACT];
pub const WATCH_TOOLS: &[&str] = &[XDOTOOL, TCPDUMP];

/// Finds `program` in the directories of `path_var`.
pub fn find_in(program: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Fails on the first tool in `tools` that is not installed.
pub fn require_tools(tools: &[&str]) -> Result<()> {
    let path_var = std::env::var_os("PATH").unwrap_or_default();
    check_tools(tools, &path_var)
}

fn check_tools(tools: &[&str], path_var: &OsStr) -> Result<()> {
    for tool in tools {
        if find_in(tool, path_var).is_none() {
            bail!("Required tool '{tool}' is not installed. Please install it and try again.");
        }
    }
    Ok(())
}
