//! # Terminal Output
//!
//! Controls how much decoration the CLI emits. Color handling honors the
//! conventional environment switches in addition to the `--color` flag:
//!
//! - `NO_COLOR` set (even empty) disables color (https://no-color.org/)
//! - `CLICOLOR=0` disables color
//! - `CLICOLOR_FORCE=1` forces color for non-TTY output
//! - `TERM=dumb` disables color
//!
//! `--color=always|never` overrides all of the above.

use std::env;

use console::style;

/// Resolved output preferences for one CLI invocation.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub use_color: bool,
}

impl OutputConfig {
    /// Resolve from the `--color` flag value ("always", "never", or "auto")
    /// plus the environment.
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };
        Self { use_color }
    }

    fn detect_color_support() -> bool {
        // presence alone disables, per the NO_COLOR spec
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }
        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }
        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }
        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }
        console::Term::stdout().features().colors_supported()
    }

    /// Render a layer status line, green when colored.
    pub fn success(&self, message: &str) -> String {
        if self.use_color {
            format!("{}", style(message).green())
        } else {
            message.to_string()
        }
    }

    /// Render a warning line, yellow when colored.
    pub fn warning(&self, message: &str) -> String {
        if self.use_color {
            format!("{}", style(message).yellow().bold())
        } else {
            message.to_string()
        }
    }

    /// Render a failure line, red when colored.
    pub fn failure(&self, message: &str) -> String {
        if self.use_color {
            format!("{}", style(message).red().bold())
        } else {
            message.to_string()
        }
    }

    /// Fixed-preference constructors for tests and non-interactive callers.
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// The emoji when decoration is on, the bracketed tag otherwise.
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_flag_always_wins() {
        assert!(OutputConfig::from_env_and_flag("always").use_color);
        assert!(!OutputConfig::from_env_and_flag("never").use_color);
    }

    #[test]
    fn test_emoji_falls_back_to_plain_tag() {
        assert_eq!(emoji(&OutputConfig::with_color(), "✅", "[OK]"), "✅");
        assert_eq!(emoji(&OutputConfig::without_color(), "✅", "[OK]"), "[OK]");
    }

    #[test]
    fn test_plain_output_has_no_escape_codes() {
        let plain = OutputConfig::without_color();
        assert_eq!(plain.failure("patches failed"), "patches failed");
        let colored = OutputConfig::with_color();
        assert!(colored.failure("patches failed").contains("patches failed"));
    }
}
