//! Subscriber installation for compiler diagnostics.
//!
//! The crates report at fixed levels:
//!
//! ```text
//!   ilc_types      registry creation                      trace
//!                  modules, async library installed       debug
//!   ilc_il         linked method bodies                   trace
//!   ilc_compiler   manifest tokens, simulated thunks      trace
//!                  stub emission, worker summary          debug
//!                  phase boundaries, manifest seal        info
//!                  bodies that cannot be rewritten        warn
//!                  failed methods                         error
//! ```
//!
//! `ILC_LOG` is either a bare level applied to every `ilc_*` target or a
//! list of filter directives (`ilc_types=trace,ilc_compiler=debug`) layered
//! on top of it. Targets outside the compiler stay at `warn`.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Targets that follow [`LogOptions::level`].
const COMPILER_TARGETS: [&str; 3] = ["ilc_types", "ilc_il", "ilc_compiler"];

/// How events are rendered on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One line per event, fields inline.
    #[default]
    Compact,
    /// The `tracing-subscriber` default layout, with span context.
    Full,
    /// Newline-delimited JSON, for collecting build logs.
    Json,
}

impl LogFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "full" => Some(Self::Full),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Log configuration carried by [`CompilerConfig`](crate::CompilerConfig).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub format: LogFormat,
    /// Level for every compiler target.
    pub level: LevelFilter,
    /// Extra filter directives, applied after `level`.
    pub directives: Option<String>,
}

impl LogOptions {
    pub const DEFAULT: Self = Self {
        format: LogFormat::Compact,
        level: LevelFilter::WARN,
        directives: None,
    };

    /// Apply `ILC_LOG_FORMAT` and `ILC_LOG` values to `self`.
    ///
    /// Values that are neither a level nor valid directives are ignored.
    #[must_use]
    pub fn with_env_values(mut self, format: Option<&str>, filter: Option<&str>) -> Self {
        if let Some(format) = format.and_then(LogFormat::from_name) {
            self.format = format;
        }
        let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
            return self;
        };
        if let Ok(level) = filter.parse::<LevelFilter>() {
            self.level = level;
        } else if filter.contains('=') && EnvFilter::try_new(filter).is_ok() {
            self.directives = Some(filter.to_string());
        }
        self
    }

    /// The full directive list handed to the subscriber.
    ///
    /// A target named in `directives` does not also get the blanket level.
    pub fn filter_directives(&self) -> String {
        let level = self.level.to_string().to_ascii_lowercase();
        let extra = self.directives.as_deref().unwrap_or("");
        let named = |target: &str| {
            extra
                .split(',')
                .any(|directive| directive.trim().split(['=', '[']).next() == Some(target))
        };

        let mut directives = String::from("warn");
        for target in COMPILER_TARGETS.into_iter().filter(|t| !named(t)) {
            directives.push_str(&format!(",{}={}", target, level));
        }
        if let Some(extra) = &self.directives {
            directives.push(',');
            directives.push_str(extra);
        }
        directives
    }
}

impl Default for LogOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Install the global subscriber on stderr.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case `options` has no effect.
pub fn init_logging(options: &LogOptions) -> bool {
    use std::io::IsTerminal;

    let filter = EnvFilter::try_new(options.filter_directives()).unwrap_or_else(|_| EnvFilter::new("warn"));
    let ansi = std::io::stderr().is_terminal();
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let installed = match options.format {
        LogFormat::Compact => builder.with_ansi(ansi).compact().try_init().is_ok(),
        LogFormat::Full => builder.with_ansi(ansi).try_init().is_ok(),
        LogFormat::Json => builder.with_ansi(false).json().try_init().is_ok(),
    };
    if installed {
        tracing::debug!(
            format = ?options.format,
            filter = %options.filter_directives(),
            "compiler logging installed"
        );
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_level_applies_to_compiler_targets() {
        let options = LogOptions::DEFAULT.with_env_values(Some("json"), Some(" DEBUG "));
        assert_eq!(options.format, LogFormat::Json);
        assert_eq!(options.level, LevelFilter::DEBUG);
        assert_eq!(
            options.filter_directives(),
            "warn,ilc_types=debug,ilc_il=debug,ilc_compiler=debug"
        );
    }

    #[test]
    fn test_directives_layer_on_top() {
        let options = LogOptions::DEFAULT.with_env_values(None, Some("ilc_types=trace"));
        assert_eq!(options.level, LevelFilter::WARN);
        assert_eq!(options.directives.as_deref(), Some("ilc_types=trace"));
        assert_eq!(
            options.filter_directives(),
            "warn,ilc_il=warn,ilc_compiler=warn,ilc_types=trace"
        );
    }

    #[test]
    fn test_unrecognized_values_are_ignored() {
        let options = LogOptions::DEFAULT.with_env_values(Some("pretty"), Some("loud"));
        assert_eq!(options, LogOptions::DEFAULT);
        let options = LogOptions::DEFAULT.with_env_values(None, Some(""));
        assert_eq!(options, LogOptions::DEFAULT);
    }

    #[test]
    fn test_second_install_is_refused() {
        init_logging(&LogOptions::DEFAULT);
        assert!(!init_logging(&LogOptions {
            format: LogFormat::Json,
            ..LogOptions::DEFAULT
        }));
    }
}
