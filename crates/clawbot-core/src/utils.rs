//! Utility helpers — data paths and string manipulation.

use std::path::PathBuf;

/// Clawbot data directory (`~/.clawbot/`).
pub fn get_data_path() -> PathBuf {
    dirs_next::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".clawbot")
}

/// Session files directory (`~/.clawbot/sessions/`).
pub fn get_sessions_path() -> PathBuf {
    get_data_path().join("sessions")
}

/// Truncate to `max_len` characters, ending with "..." when cut. Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// Replace anything that is not alphanumeric, `-`, `_` or `.` with `_`.
pub fn safe_filename(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            c if c.is_alphanumeric() => c,
            '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            let home = dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."));
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(path),
    }
}
