pub mod generate;
pub mod parse;
pub mod types;

use regex::{Captures, Regex};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub use parse::{load_config, load_or_default, ConfigError};
pub use types::{BatchSection, CloudWatchSection, Config, ReaderConfig, WriterConfig};

const APP_DIR: &str = "journald-cwl";
const CONFIG_FILE: &str = "config.yml";

/// Matches `$env{VAR_NAME}`. Plain `${...}` is left alone.
pub(crate) const ENV_VAR_PATTERN: &str = r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}";

pub(crate) fn env_var_regex() -> Result<&'static Regex, regex::Error> {
    static RE: OnceLock<Regex> = OnceLock::new();
    if let Some(re) = RE.get() {
        return Ok(re);
    }
    let re = Regex::new(ENV_VAR_PATTERN)?;
    Ok(RE.get_or_init(|| re))
}

/// Expands environment variables in a string.
/// Supports $env{VAR_NAME} syntax.
/// If an environment variable is not set, it's left unchanged.
pub fn expand_env_vars(text: &str) -> Result<String, regex::Error> {
    let re = env_var_regex()?;
    let expanded = re.replace_all(text, |caps: &Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    });
    Ok(expanded.into_owned())
}

/// Expands tilde (~) in paths to the user's home directory.
/// Returns the path unchanged if it doesn't start with tilde or home directory cannot be determined.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(rest);
        }
    } else if path_str == "~" {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir;
        }
    }

    path.to_path_buf()
}

/// Resolves the config file path based on explicit argument or default locations.
/// Returns the first existing path from:
/// 1. Explicit path (if provided, with tilde expansion)
/// 2. ~/.config/journald-cwl/config.yml
/// 3. /etc/journald-cwl/config.yml
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    let system_config = system_config_path();
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// `~/.config/journald-cwl/config.yml`
pub fn user_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join(APP_DIR).join(CONFIG_FILE))
}

pub fn system_config_path() -> PathBuf {
    PathBuf::from("/etc").join(APP_DIR).join(CONFIG_FILE)
}
