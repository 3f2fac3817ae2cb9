use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use tracing::{debug, info, trace, warn};

use crate::storage::DEFAULT_STORAGE_KEY;
use crate::task::TaskFilter;

/// Settings read from the rc file, then from `--rc` overrides.
#[derive(Debug, Clone)]
pub struct Config {
    values: HashMap<String, String>,
    /// Every rc file read, includes after the file that named them.
    pub sources: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let values = [
            ("data.location", "~/.todomaster"),
            ("storage.key", DEFAULT_STORAGE_KEY),
            ("default.filter", "all"),
            ("color", "on"),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

        Self {
            values,
            sources: Vec::new(),
        }
    }
}

impl Config {
    /// Reads `explicit`, else `$TODORC`, else `~/.todorc` if it exists.
    /// `TODORC=/dev/null` skips the rc file.
    #[tracing::instrument(skip(explicit))]
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = Config::default();

        match rc_location(explicit) {
            Some(path) => {
                info!(todorc = %path.display(), "loading todorc");
                cfg.read_rc(&path, &mut Vec::new())?;
            }
            None => debug!("no todorc found; using defaults"),
        }

        Ok(cfg)
    }

    pub fn apply_overrides<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in overrides {
            let key = key.strip_prefix("rc.").map(str::to_string).unwrap_or(key);
            debug!(key = %key, value = %value, "applying override");
            self.values.insert(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    /// `None` when the key is unset or its value is not a recognised boolean.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        let value = self.values.get(key)?.trim().to_ascii_lowercase();
        match value.as_str() {
            "on" | "yes" | "y" | "true" | "1" => Some(true),
            "off" | "no" | "n" | "false" | "0" => Some(false),
            _ => None,
        }
    }

    pub fn storage_key(&self) -> String {
        self.get("storage.key")
            .filter(|key| !key.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_string())
    }

    pub fn default_filter(&self) -> anyhow::Result<TaskFilter> {
        match self.get("default.filter") {
            Some(raw) => raw.parse().context("invalid default.filter"),
            None => Ok(TaskFilter::All),
        }
    }

    /// `chain` holds the canonical paths of the files currently being read,
    /// outermost first. Meeting one of them again is an include cycle.
    #[tracing::instrument(skip(self, chain))]
    fn read_rc(&mut self, path: &Path, chain: &mut Vec<PathBuf>) -> anyhow::Result<()> {
        let path = home_relative(path);
        let canonical = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if chain.contains(&canonical) {
            return Err(anyhow!("include cycle at {}", path.display()));
        }

        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        self.sources.push(path.clone());

        chain.push(canonical);
        let result = self.parse_rc(&text, &path, chain);
        chain.pop();
        result
    }

    fn parse_rc(
        &mut self,
        text: &str,
        path: &Path,
        chain: &mut Vec<PathBuf>,
    ) -> anyhow::Result<()> {
        let dir = path.parent().unwrap_or(Path::new("."));

        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line
                .split_once('#')
                .map_or(raw_line, |(content, _)| content)
                .trim();
            if line.is_empty() {
                continue;
            }

            if let Some(target) = line.strip_prefix("include ") {
                let target = target.trim();
                if target.is_empty() {
                    return Err(anyhow!(
                        "{}:{}: include needs a path",
                        path.display(),
                        idx + 1
                    ));
                }
                let included = dir.join(home_relative(Path::new(target)));
                if included.exists() {
                    debug!(include = %included.display(), line = idx + 1, "processing include");
                    self.read_rc(&included, chain)?;
                } else {
                    warn!(include = %included.display(), "include file does not exist; skipping");
                }
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(anyhow!(
                    "invalid config line {}:{}: {}",
                    path.display(),
                    idx + 1,
                    raw_line
                ));
            };
            let (key, value) = (key.trim(), value.trim());
            trace!(key, value, "loaded config key");
            self.values.insert(key.to_string(), value.to_string());
        }

        Ok(())
    }
}

/// `--data` wins over `data.location`. The directory is created if missing.
#[tracing::instrument(skip(cfg, explicit))]
pub fn resolve_data_dir(cfg: &Config, explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = match (explicit, cfg.get("data.location")) {
        (Some(path), _) => path.to_path_buf(),
        (None, Some(location)) if !location.trim().is_empty() => {
            home_relative(Path::new(location.trim()))
        }
        (None, _) => dirs::home_dir()
            .ok_or_else(|| anyhow!("cannot determine home directory"))?
            .join(".todomaster"),
    };

    if !dir.is_dir() {
        info!(dir = %dir.display(), "creating data directory");
        fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(dir)
}

fn rc_location(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    match std::env::var_os("TODORC") {
        Some(value) if value == "/dev/null" => None,
        Some(value) => Some(PathBuf::from(value)),
        None => dirs::home_dir()
            .map(|home| home.join(".todorc"))
            .filter(|candidate| candidate.is_file()),
    }
}

/// Resolves a leading `~` component against the home directory.
fn home_relative(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}
