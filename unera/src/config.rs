use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use unera_client::ClientConfig;

use crate::Error;

/// Storage value that keeps everything in memory, for guest-only runs.
pub const MEMORY_STORAGE: &str = ":memory:";

#[derive(Parser, Debug)]
#[command(name = "unera")]
#[command(about = "Boots a UNERA client session and prints the home feed", long_about = None)]
pub struct Config {
    /// Base url of the REST API.
    #[arg(long, env = "UNERA_API_URL", default_value = "http://localhost:3000/api")]
    pub api_url: String,

    /// SQLite file holding the persisted session. Defaults to
    /// `~/.unera/storage.sqlite3`; `:memory:` persists nothing.
    #[arg(long, env = "UNERA_STORAGE")]
    pub storage: Option<PathBuf>,

    #[arg(long, env = "UNERA_POLL_SECS", default_value_t = 10)]
    pub poll_secs: u64,

    #[arg(long, env = "UNERA_STORY_SWEEP_SECS", default_value_t = 60)]
    pub story_sweep_secs: u64,

    /// Log in with this email before loading.
    #[arg(long, value_name = "EMAIL")]
    pub login: Option<String>,

    #[arg(long, env = "UNERA_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Forget the persisted session before loading.
    #[arg(long, conflicts_with = "login")]
    pub logout: bool,

    /// Keep polling and reprint the feed on every change until Ctrl-C.
    #[arg(long)]
    pub watch: bool,
}

impl Config {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            poll_interval: Duration::from_secs(self.poll_secs.max(1)),
            story_sweep_interval: Duration::from_secs(self.story_sweep_secs.max(1)),
        }
    }

    /// Where the session lives, or `None` to keep it in memory.
    pub fn storage_path(&self) -> Result<Option<PathBuf>, Error> {
        match &self.storage {
            Some(path) if path.as_os_str() == MEMORY_STORAGE => Ok(None),
            Some(path) => Ok(Some(path.clone())),
            None => {
                let home = simple_home_dir::home_dir().ok_or(Error::NoHomeDir)?;
                Ok(Some(home.join(".unera").join("storage.sqlite3")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage() {
        let config = Config::try_parse_from(["unera", "--storage", ":memory:"]).unwrap();
        assert_eq!(config.storage_path().unwrap(), None);
    }

    #[test]
    fn test_explicit_storage_and_intervals() {
        let config = Config::try_parse_from([
            "unera",
            "--storage",
            "/tmp/unera.sqlite3",
            "--poll-secs",
            "0",
            "--story-sweep-secs",
            "30",
        ])
        .unwrap();
        assert_eq!(
            config.storage_path().unwrap(),
            Some(PathBuf::from("/tmp/unera.sqlite3"))
        );
        let client_config = config.client_config();
        assert_eq!(client_config.poll_interval, Duration::from_secs(1));
        assert_eq!(client_config.story_sweep_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_login_conflicts_with_logout() {
        let parsed = Config::try_parse_from(["unera", "--login", "a@b.c", "--logout"]);
        assert!(parsed.is_err());
    }
}
