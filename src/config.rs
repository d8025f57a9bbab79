use tracing::warn;

use crate::jobs::JobTable;

pub const DEFAULT_PROMPT: &str = "jobsh> ";
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Startup settings, read from `JOBSH_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `JOBSH_PROMPT`
    pub prompt: String,
    /// `JOBSH_MAX_JOBS`, the job table capacity.
    pub max_jobs: usize,
    /// `JOBSH_LOG`, a `tracing` filter directive.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prompt: DEFAULT_PROMPT.to_string(),
            max_jobs: JobTable::DEFAULT_CAPACITY,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(prompt) = lookup("JOBSH_PROMPT") {
            config.prompt = prompt;
        }
        if let Some(raw) = lookup("JOBSH_MAX_JOBS") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.max_jobs = n,
                _ => warn!(value = %raw, "ignoring invalid JOBSH_MAX_JOBS"),
            }
        }
        if let Some(filter) = lookup("JOBSH_LOG") {
            config.log_filter = filter;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let config = Config::from_lookup(lookup_from(&[]));
        assert_eq!(config, Config::default());
        assert_eq!(config.max_jobs, 128);
        assert_eq!(config.prompt, "jobsh> ");
    }

    #[test]
    fn variables_override_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("JOBSH_PROMPT", "$ "),
            ("JOBSH_MAX_JOBS", "4"),
            ("JOBSH_LOG", "jobsh=debug"),
        ]));
        assert_eq!(config.prompt, "$ ");
        assert_eq!(config.max_jobs, 4);
        assert_eq!(config.log_filter, "jobsh=debug");
    }

    #[test]
    fn invalid_capacity_falls_back() {
        for raw in ["0", "-1", "lots"] {
            let config = Config::from_lookup(lookup_from(&[("JOBSH_MAX_JOBS", raw)]));
            assert_eq!(config.max_jobs, JobTable::DEFAULT_CAPACITY);
        }
    }
}
