//! Compiler configuration.
//!
//! Resolved once before a compilation starts, from defaults and the
//! environment:
//!
//! | Variable                    | Setting                                  |
//! |-----------------------------|------------------------------------------|
//! | `ILC_POINTER_SIZE`          | target pointer size in bytes (4 or 8)    |
//! | `ILC_CONTINUATION_SCOPE`    | `method` or `module`                     |
//! | `ILC_PARALLELISM`           | worker threads for body emission         |
//! | `ILC_CROSS_MODULE_INLINING` | rewrite bodies for cross-module inlining |
//! | `ILC_LOG`, `ILC_LOG_FORMAT` | see [`LogOptions`]                       |
//!
//! Unparseable values fall back to the default; out-of-range values are
//! reported by [`CompilerConfig::validate`].

use crate::logging::LogOptions;
use ilc_types::{ContinuationScopePolicy, TypeSystemConfig};
use std::fmt;

// =============================================================================
// Compiler Configuration
// =============================================================================

/// Complete compiler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Type-system settings fixed for the life of the context.
    pub type_system: TypeSystemConfig,

    /// Worker threads used to emit method bodies.
    ///
    /// Default: available parallelism
    pub parallelism: usize,

    /// Whether bodies from cross-module inlineable modules are rewritten
    /// into the manifest module.
    ///
    /// Default: true
    pub cross_module_inlining: bool,

    pub log: LogOptions,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            type_system: TypeSystemConfig::default(),
            parallelism: default_parallelism(),
            cross_module_inlining: true,
            log: LogOptions::DEFAULT,
        }
    }
}

impl CompilerConfig {
    /// Single-threaded configuration, for reproducing issues.
    pub fn serial() -> Self {
        Self {
            parallelism: 1,
            ..Default::default()
        }
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by the variables `lookup` returns.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(size) = lookup("ILC_POINTER_SIZE").and_then(|v| v.trim().parse().ok()) {
            config.type_system.pointer_size = size;
        }
        if let Some(scope) = lookup("ILC_CONTINUATION_SCOPE").and_then(|v| ContinuationScopePolicy::parse(v.trim())) {
            config.type_system.continuation_scope = scope;
        }
        if let Some(threads) = lookup("ILC_PARALLELISM").and_then(|v| v.trim().parse().ok()) {
            config.parallelism = threads;
        }
        if let Some(value) = lookup("ILC_CROSS_MODULE_INLINING") {
            config.cross_module_inlining = parse_bool(&value);
        }
        config.log = config
            .log
            .clone()
            .with_env_values(lookup("ILC_LOG_FORMAT").as_deref(), lookup("ILC_LOG").as_deref());

        config
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.type_system.validate().map_err(ConfigError::TypeSystem)?;
        if self.parallelism == 0 {
            return Err(ConfigError::InvalidParallelism(self.parallelism));
        }
        Ok(())
    }
}

/// Truthy unless empty, `0`, `false`, `off` or `no`.
fn parse_bool(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "off" | "no"
    )
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

// =============================================================================
// Errors
// =============================================================================

/// Configuration validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    TypeSystem(ilc_types::ConfigError),
    /// At least one worker thread is required.
    InvalidParallelism(usize),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::TypeSystem(e) => write!(f, "{}", e),
            ConfigError::InvalidParallelism(n) => write!(f, "parallelism must be at least 1, got {}", n),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::TypeSystem(e) => Some(e),
            ConfigError::InvalidParallelism(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;
    use rustc_hash::FxHashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: FxHashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = CompilerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.parallelism >= 1);
        assert!(config.cross_module_inlining);
        assert_eq!(CompilerConfig::serial().parallelism, 1);
    }

    #[test]
    fn test_environment_overrides() {
        let config = CompilerConfig::from_lookup(lookup(&[
            ("ILC_POINTER_SIZE", "4"),
            ("ILC_CONTINUATION_SCOPE", "module"),
            ("ILC_PARALLELISM", " 3 "),
            ("ILC_CROSS_MODULE_INLINING", "off"),
            ("ILC_LOG", "debug"),
        ]));
        assert_eq!(config.type_system.pointer_size, 4);
        assert_eq!(config.type_system.continuation_scope, ContinuationScopePolicy::PerModule);
        assert_eq!(config.parallelism, 3);
        assert!(!config.cross_module_inlining);
        assert_eq!(config.log.level, LevelFilter::DEBUG);
    }

    #[test]
    fn test_unparseable_values_keep_defaults() {
        let config = CompilerConfig::from_lookup(lookup(&[
            ("ILC_POINTER_SIZE", "wide"),
            ("ILC_CONTINUATION_SCOPE", "global"),
            ("ILC_LOG", "loud"),
        ]));
        assert_eq!(config.type_system, TypeSystemConfig::default());
        assert_eq!(config.log, LogOptions::DEFAULT);
    }

    #[test]
    fn test_validate_reports_bad_values() {
        let config = CompilerConfig::from_lookup(lookup(&[("ILC_POINTER_SIZE", "6")]));
        assert_eq!(
            config.validate(),
            Err(ConfigError::TypeSystem(ilc_types::ConfigError::InvalidPointerSize(6)))
        );

        let config = CompilerConfig {
            parallelism: 0,
            ..CompilerConfig::serial()
        };
        let error = config.validate().unwrap_err();
        assert_eq!(error, ConfigError::InvalidParallelism(0));
        assert!(error.to_string().contains("at least 1"));
    }
}
