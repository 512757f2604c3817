//! Application directory paths for Zira.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config | `~/Library/Application Support/zira/` | `~/.config/zira/` |
//!
//! Set `ZIRA_CONFIG_DIR` to override [`config_dir`] for tests or custom
//! deployments.

use std::path::PathBuf;

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/zira/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("ZIRA_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("zira"))
        .unwrap_or_else(|| PathBuf::from("/tmp/zira-config"))
}

/// Path to the main `config.toml`.
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_lives_in_config_dir() {
        let file = config_file();
        assert_eq!(file.file_name().and_then(|n| n.to_str()), Some("config.toml"));
        assert_eq!(file.parent(), Some(config_dir().as_path()));
    }
}
