pub mod loader;
pub mod schema;

pub use loader::{load_config, load_config_from_str};
pub use schema::{ChunkingConfig, Config, ModelConfig, RetryConfig};

/// Expands a leading `~` to the user's home directory.
///
/// Checks HOME then USERPROFILE, falling back to the platform home
/// directory. `~user/path` is not supported.
pub(crate) fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        let home = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(std::path::PathBuf::from)
            .or_else(dirs::home_dir);
        if let Some(home) = home {
            let home = home.to_string_lossy();
            if path == "~" {
                return home.into_owned();
            }
            return path.replacen('~', &home, 1);
        }
    }
    path.to_string()
}
