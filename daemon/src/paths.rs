/// Canonical file locations for tubeflush.
///
/// The config file lives at `$XDG_CONFIG_HOME/tubeflush/config.toml`, falling
/// back to `~/.config/tubeflush/config.toml` when XDG_CONFIG_HOME is unset.
use std::path::PathBuf;

const APP_DIR_NAME: &str = "tubeflush";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Returns the tubeflush configuration directory, or `None` when neither
/// XDG_CONFIG_HOME nor HOME is set.
pub fn config_dir() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        Some(xdg) => PathBuf::from(xdg),
        None => PathBuf::from(std::env::var_os("HOME")?).join(".config"),
    };
    Some(base.join(APP_DIR_NAME))
}

/// Returns the full path to the default config file.
pub fn config_file_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Expands a leading `~` or `$HOME` to the user's home directory.
/// Paths without either prefix, or when HOME is unset, are returned as-is.
pub fn expand_home(raw: &str) -> PathBuf {
    let home = match std::env::var("HOME") {
        Ok(h) if !h.is_empty() => h,
        _ => return PathBuf::from(raw),
    };
    expand_with(raw, &home)
}

fn expand_with(raw: &str, home: &str) -> PathBuf {
    for prefix in ["~", "$HOME"] {
        if raw == prefix {
            return PathBuf::from(home);
        }
        if let Some(rest) = raw.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(raw)
}
