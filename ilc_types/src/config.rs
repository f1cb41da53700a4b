//! Type-system configuration.
//!
//! Settings that change the shape of synthesized types are fixed when a
//! [`TypeSystemContext`](crate::TypeSystemContext) is constructed and never
//! change afterwards.

/// How continuation layout types are partitioned.
///
/// Two continuation types with the same pointer map are distinct instances
/// when they belong to different scopes. A context uses exactly one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContinuationScopePolicy {
    /// One cache partition per owning method.
    #[default]
    PerMethod,
    /// One cache partition per module of the owning method.
    PerModule,
}

impl ContinuationScopePolicy {
    /// Parse a policy name as used on the command line and in `ILC_CONTINUATION_SCOPE`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "method" | "per-method" => Some(Self::PerMethod),
            "module" | "per-module" => Some(Self::PerModule),
            _ => None,
        }
    }
}

/// Configuration for a type-system context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSystemConfig {
    // =========================================================================
    // Target
    // =========================================================================
    /// Size of a machine pointer in bytes.
    ///
    /// Continuation layouts are measured in pointer-sized cells, so this
    /// determines their reported data size and GC offsets.
    ///
    /// Default: 8
    pub pointer_size: usize,

    // =========================================================================
    // Async
    // =========================================================================
    /// Partitioning of the continuation layout cache.
    ///
    /// Default: [`ContinuationScopePolicy::PerMethod`]
    pub continuation_scope: ContinuationScopePolicy,
}

impl Default for TypeSystemConfig {
    fn default() -> Self {
        Self {
            pointer_size: 8,
            continuation_scope: ContinuationScopePolicy::PerMethod,
        }
    }
}

impl TypeSystemConfig {
    /// Configuration for a 32-bit target.
    pub fn target_32bit() -> Self {
        Self {
            pointer_size: 4,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pointer_size != 4 && self.pointer_size != 8 {
            return Err(ConfigError::InvalidPointerSize(self.pointer_size));
        }
        Ok(())
    }
}

/// Configuration validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Pointer size is neither 4 nor 8 bytes.
    InvalidPointerSize(usize),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPointerSize(size) => {
                write!(f, "pointer size must be 4 or 8 bytes, got {}", size)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TypeSystemConfig::default().validate().is_ok());
        assert!(TypeSystemConfig::target_32bit().validate().is_ok());
    }

    #[test]
    fn test_invalid_pointer_size() {
        let config = TypeSystemConfig {
            pointer_size: 6,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidPointerSize(6)));
    }

    #[test]
    fn test_scope_policy_parse() {
        assert_eq!(
            ContinuationScopePolicy::parse("method"),
            Some(ContinuationScopePolicy::PerMethod)
        );
        assert_eq!(
            ContinuationScopePolicy::parse("Per-Module"),
            Some(ContinuationScopePolicy::PerModule)
        );
        assert_eq!(ContinuationScopePolicy::parse("global"), None);
    }
}
