//! JIT configuration.
//!
//! Values come from `JitConfig::default()`, optionally a `[jit]`-style TOML
//! document, and finally `HERON_JIT*` environment overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

/// Env var enabling the JIT.
pub const ENV_ENABLE: &str = "HERON_JIT";
/// Env var setting the number of batch compile workers; `auto` uses one per CPU.
pub const ENV_BATCH_COMPILE_WORKERS: &str = "HERON_JIT_BATCH_COMPILE_WORKERS";
/// Env var enabling the static-function eligibility bypass.
pub const ENV_ALL_STATIC_FUNCTIONS: &str = "HERON_JIT_ALL_STATIC_FUNCTIONS";
/// Env var enabling forced multithreaded recompiles for tests.
pub const ENV_TEST_MULTITHREADED_COMPILE: &str = "HERON_JIT_TEST_MULTITHREADED_COMPILE";
/// Env var naming an allow-list file. Setting it also enables the JIT.
pub const ENV_LIST_FILE: &str = "HERON_JIT_LIST_FILE";
/// Env var raising the per-compile log line to `info`, where the bisect tool
/// and default log filters see it.
pub const ENV_DEBUG: &str = "HERON_JIT_DEBUG";

/// Coordinator configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JitConfig {
    /// Whether the coordinator accepts registrations after init
    pub enabled: bool,
    /// Worker threads used to drain pending functions; 0 compiles serially
    pub batch_compile_workers: usize,
    /// Static functions are eligible regardless of the allow-list
    pub compile_all_static_functions: bool,
    /// Retain registered functions so they can be force-recompiled
    pub test_multithreaded_compile: bool,
    /// Optional allow-list file
    pub jit_list_file: Option<PathBuf>,
    /// Log every compile start at `info` instead of `debug`
    pub debug: bool,
}

impl JitConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Read a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Apply overrides from a variable lookup (normally `std::env::var`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if lookup(ENV_ENABLE).is_some_and(|v| parse_env_truthy(&v)) {
            self.enabled = true;
        }

        if let Some(value) = lookup(ENV_BATCH_COMPILE_WORKERS) {
            let trimmed = value.trim();
            if trimmed.eq_ignore_ascii_case("auto") {
                self.batch_compile_workers = Self::default_worker_count();
            } else if !trimmed.is_empty() {
                self.batch_compile_workers =
                    trimmed.parse().map_err(|_| ConfigError::InvalidEnv {
                        var: ENV_BATCH_COMPILE_WORKERS,
                        value: value.clone(),
                    })?;
            }
        }

        if lookup(ENV_ALL_STATIC_FUNCTIONS).is_some_and(|v| parse_env_truthy(&v)) {
            self.compile_all_static_functions = true;
        }

        if lookup(ENV_TEST_MULTITHREADED_COMPILE).is_some_and(|v| parse_env_truthy(&v)) {
            self.test_multithreaded_compile = true;
        }

        if lookup(ENV_DEBUG).is_some_and(|v| parse_env_truthy(&v)) {
            self.debug = true;
        }

        if let Some(path) = lookup(ENV_LIST_FILE).filter(|v| !v.trim().is_empty()) {
            self.jit_list_file = Some(PathBuf::from(path.trim()));
            self.enabled = true;
        }

        Ok(())
    }

    /// Worker count to use when the caller asks for "as many as the machine has".
    pub fn default_worker_count() -> usize {
        num_cpus::get().max(1)
    }
}

/// Is the value set to something other than `""`, `"0"`, `false`, `off` or `no`?
pub fn parse_env_truthy(value: &str) -> bool {
    !matches!(value.trim(), "" | "0")
        && !value.trim().eq_ignore_ascii_case("false")
        && !value.trim().eq_ignore_ascii_case("off")
        && !value.trim().eq_ignore_ascii_case("no")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn truthy_values() {
        assert!(parse_env_truthy("1"));
        assert!(parse_env_truthy("yes"));
        assert!(!parse_env_truthy(""));
        assert!(!parse_env_truthy(" 0 "));
        assert!(!parse_env_truthy("Off"));
        assert!(!parse_env_truthy("FALSE"));
    }

    #[test]
    fn env_overrides_apply_on_top_of_defaults() {
        let mut config = JitConfig::default();
        config
            .apply_env_overrides(lookup(&[
                (ENV_ENABLE, "1"),
                (ENV_BATCH_COMPILE_WORKERS, "4"),
                (ENV_ALL_STATIC_FUNCTIONS, "1"),
            ]))
            .expect("valid overrides");

        assert!(config.enabled);
        assert_eq!(config.batch_compile_workers, 4);
        assert!(config.compile_all_static_functions);
        assert!(!config.test_multithreaded_compile);
    }

    #[test]
    fn auto_worker_count_uses_cpu_count() {
        let mut config = JitConfig::default();
        config
            .apply_env_overrides(lookup(&[(ENV_BATCH_COMPILE_WORKERS, "auto")]))
            .expect("valid overrides");
        assert_eq!(config.batch_compile_workers, JitConfig::default_worker_count());
        assert!(config.batch_compile_workers >= 1);
    }

    #[test]
    fn debug_flag_is_read_from_env() {
        let mut config = JitConfig::default();
        config
            .apply_env_overrides(lookup(&[(ENV_DEBUG, "0")]))
            .expect("valid overrides");
        assert!(!config.debug);

        config
            .apply_env_overrides(lookup(&[(ENV_DEBUG, "1")]))
            .expect("valid overrides");
        assert!(config.debug);
        assert!(!config.enabled);
    }

    #[test]
    fn list_file_enables_jit() {
        let mut config = JitConfig::default();
        config
            .apply_env_overrides(lookup(&[(ENV_LIST_FILE, "/tmp/jitlist.txt")]))
            .expect("valid overrides");
        assert!(config.enabled);
        assert_eq!(config.jit_list_file, Some(PathBuf::from("/tmp/jitlist.txt")));
    }

    #[test]
    fn invalid_worker_count_is_rejected() {
        let mut config = JitConfig::default();
        let err = config
            .apply_env_overrides(lookup(&[(ENV_BATCH_COMPILE_WORKERS, "many")]))
            .expect_err("non-numeric worker count");
        assert!(matches!(
            err,
            ConfigError::InvalidEnv {
                var: ENV_BATCH_COMPILE_WORKERS,
                ..
            }
        ));
    }

    #[test]
    fn toml_keeps_defaults_for_missing_keys() {
        let config = JitConfig::from_toml_str("enabled = true\nbatch_compile_workers = 2\n")
            .expect("valid toml");
        assert!(config.enabled);
        assert_eq!(config.batch_compile_workers, 2);
        assert!(config.jit_list_file.is_none());
    }
}
