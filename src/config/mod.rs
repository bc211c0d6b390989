#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::catalog::store::HISTORY_FILE;
use crate::error::ConfigError;
use crate::gateway::secret::secret_path;
use crate::lock::LOCK_FILE;
use crate::scheduler::SchedulerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub scheduler: SchedulerSettings,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8999".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub conf_dir: String,
    pub log_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            conf_dir: "~/.recmd/conf".to_owned(),
            log_dir: "~/.recmd/logs".to_owned(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerSettings {
    pub shell: String,
    pub vacuum_delay_ms: u64,
    pub queue_capacity: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            shell: "sh".to_owned(),
            vacuum_delay_ms: 3000,
            queue_capacity: 1,
        }
    }
}

impl SchedulerSettings {
    #[must_use]
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            shell: self.shell.clone(),
            vacuum_delay: Duration::from_millis(self.vacuum_delay_ms),
            queue_capacity: self.queue_capacity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub file_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file_name: "recmd_dmn.log".to_owned(),
        }
    }
}

/// Resolved on-disk locations of everything the daemon reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub conf_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_file_name: String,
}

impl Layout {
    #[must_use]
    pub fn history_file(&self) -> PathBuf {
        self.conf_dir.join(HISTORY_FILE)
    }

    #[must_use]
    pub fn secret_file(&self) -> PathBuf {
        secret_path(&self.conf_dir)
    }

    #[must_use]
    pub fn lock_file(&self) -> PathBuf {
        self.conf_dir.join(LOCK_FILE)
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(&self.log_file_name)
    }

    pub fn ensure_dirs(&self) -> anyhow::Result<()> {
        for dir in [&self.conf_dir, &self.log_dir] {
            if dir.exists() && !dir.is_dir() {
                anyhow::bail!("{} exists but is not a directory", dir.display());
            }
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

pub fn default_config_file() -> anyhow::Result<PathBuf> {
    let unix = home_config_path_unix();
    if !cfg!(windows) || unix.exists() {
        return Ok(unix);
    }

    let proj = ProjectDirs::from("com", "recmd", "recmd")
        .context("failed to determine platform config directory")?;
    Ok(proj.config_dir().join("config.toml"))
}

fn home_config_path_unix() -> PathBuf {
    let home = home_dir().unwrap_or_else(|| PathBuf::from("~"));
    home.join(".config").join("recmd").join("config.toml")
}

fn home_dir() -> Option<PathBuf> {
    if let Some(v) = std::env::var_os("HOME") {
        return Some(PathBuf::from(v));
    }
    if let Some(v) = std::env::var_os("USERPROFILE") {
        return Some(PathBuf::from(v));
    }
    let drive = std::env::var_os("HOMEDRIVE");
    let path = std::env::var_os("HOMEPATH");
    match (drive, path) {
        (Some(d), Some(p)) => Some(PathBuf::from(d).join(PathBuf::from(p))),
        _ => None,
    }
}

#[must_use]
pub fn expand_tilde(input: &str) -> String {
    if let Some(rest) = input.strip_prefix("~/")
        && let Some(home) = home_dir()
    {
        return home.join(rest).to_string_lossy().to_string();
    }
    input.to_owned()
}

pub fn expand_path(input: &str) -> anyhow::Result<PathBuf> {
    let expanded = expand_env_vars(&expand_tilde(input));
    let p = PathBuf::from(expanded);
    if p.is_absolute() {
        return Ok(p);
    }
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    Ok(cwd.join(p))
}

fn expand_env_vars(input: &str) -> String {
    // Expand $VAR and ${VAR}. Leave unknown vars untouched.
    let Ok(re) = regex::Regex::new(r"\$\{?([A-Za-z_][A-Za-z0-9_]*)\}?") else {
        return input.to_owned();
    };
    re.replace_all(input, |caps: &regex::Captures<'_>| {
        let key = &caps[1];
        std::env::var(key).unwrap_or_else(|_| caps[0].to_owned())
    })
    .to_string()
}

/// Loads `path` (or the default config file) and validates it. A missing
/// file yields the defaults.
pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_file()?,
    };
    let cfg = load_from_file(&path)?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn list_resolved_toml(cfg: &Config) -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(cfg)?)
}

fn load_from_file(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cfg: Config = toml::from_str(&raw)
        .with_context(|| format!("failed to deserialize TOML in {}", path.display()))?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen.trim().is_empty() {
            return Err(ConfigError("server.listen must not be empty".to_owned()));
        }
        if self.paths.conf_dir.trim().is_empty() {
            return Err(ConfigError("paths.conf_dir must not be empty".to_owned()));
        }
        if self.paths.log_dir.trim().is_empty() {
            return Err(ConfigError("paths.log_dir must not be empty".to_owned()));
        }
        if self.scheduler.shell.trim().is_empty() {
            return Err(ConfigError("scheduler.shell must not be empty".to_owned()));
        }
        if self.scheduler.queue_capacity == 0 {
            return Err(ConfigError(
                "scheduler.queue_capacity must be >= 1".to_owned(),
            ));
        }
        if self.log.file_name.trim().is_empty() {
            return Err(ConfigError("log.file_name must not be empty".to_owned()));
        }
        Ok(())
    }

    pub fn layout(&self) -> anyhow::Result<Layout> {
        Ok(Layout {
            conf_dir: expand_path(&self.paths.conf_dir)?,
            log_dir: expand_path(&self.paths.log_dir)?,
            log_file_name: self.log.file_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn config_validation_catches_invalid_values() {
        let mut cfg = Config::default();
        cfg.scheduler.queue_capacity = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.scheduler.shell = "  ".to_owned();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[scheduler]\nvacuum_delay_ms = 250\n\n[paths]\nconf_dir = \"/srv/recmd\"\n",
        )
        .unwrap();

        let cfg = load(Some(&path)).unwrap();
        assert_eq!(cfg.scheduler.vacuum_delay_ms, 250);
        assert_eq!(cfg.scheduler.shell, "sh");
        assert_eq!(cfg.paths.log_dir, "~/.recmd/logs");
        assert_eq!(
            cfg.scheduler.to_scheduler_config().vacuum_delay,
            Duration::from_millis(250)
        );

        let layout = cfg.layout().unwrap();
        assert_eq!(
            layout.history_file(),
            PathBuf::from("/srv/recmd/recmd_history.json")
        );
        assert_eq!(layout.secret_file(), PathBuf::from("/srv/recmd/recmd_secret"));
    }

    #[test]
    fn invalid_toml_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scheduler\nshell = ").unwrap();
        assert!(load(Some(&path)).is_err());
    }

    #[test]
    fn layout_creates_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = Layout {
            conf_dir: dir.path().join("conf"),
            log_dir: dir.path().join("logs"),
            log_file_name: "recmd_dmn.log".to_owned(),
        };
        layout.ensure_dirs().unwrap();
        assert!(layout.conf_dir.is_dir());
        assert!(layout.log_dir.is_dir());
        assert_eq!(layout.log_file(), dir.path().join("logs").join("recmd_dmn.log"));
    }

    #[test]
    fn expand_path_keeps_absolute_paths() {
        assert_eq!(
            expand_path("/var/lib/recmd").unwrap(),
            PathBuf::from("/var/lib/recmd")
        );
        assert!(expand_path("relative/dir").unwrap().is_absolute());
    }
}
