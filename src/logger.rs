//! Routing log lines with configurable verbosity levels.
//!
//! Supports three verbosity levels:
//! - Minimal: `gpt-4o openai#1`
//! - Compact: `[2/3] Model: gpt-4o, Provider: OpenAI (Key #1)`
//! - Verbose: compact line plus target URL and priority

use crate::config::LogVerbosity;
use crate::routing::Channel;

/// One relay attempt, as seen by the log formatter.
#[derive(Debug, Clone, Copy)]
pub struct AttemptLine<'a> {
    pub attempt: u32,
    pub max_attempts: u32,
    pub channel: &'a Channel,
    pub url: &'a str,
}

/// Format duration in human-readable form.
pub fn format_duration(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

/// Extract path from URL.
fn extract_path(url: &str) -> &str {
    url.find("://")
        .and_then(|i| url[i + 3..].find('/').map(|j| &url[i + 3 + j..]))
        .unwrap_or(url)
}

/// Format the routing line logged before an attempt is sent.
pub fn format_attempt(line: &AttemptLine<'_>, verbosity: LogVerbosity) -> String {
    match verbosity {
        LogVerbosity::Minimal => format_minimal(line),
        LogVerbosity::Compact => format_compact(line),
        LogVerbosity::Verbose => format_verbose(line),
    }
}

fn format_minimal(line: &AttemptLine<'_>) -> String {
    format!(
        "{} {}#{}",
        line.channel.provider.model, line.channel.provider.id, line.channel.api_key.index
    )
}

fn format_compact(line: &AttemptLine<'_>) -> String {
    let prefix = if line.attempt > 1 {
        format!("[{}/{}] ", line.attempt, line.max_attempts)
    } else {
        String::new()
    };

    format!(
        "{}Model: {}, Provider: {} (Key #{})",
        prefix, line.channel.provider.model, line.channel.provider.name, line.channel.api_key.index
    )
}

fn format_verbose(line: &AttemptLine<'_>) -> String {
    let host_end = line.url.len() - extract_path(line.url).len();
    format!(
        "{}\n  → {} {}\n  priority: {}",
        format_compact(line),
        &line.url[..host_end],
        extract_path(line.url),
        line.channel.provider.priority
    )
}

/// Format the result of an attempt.
pub fn format_outcome(status: Option<u16>, elapsed_ms: u64, verbosity: LogVerbosity) -> String {
    let duration = format_duration(elapsed_ms);
    let status = status.map(|s| s.to_string()).unwrap_or_else(|| "ERR".to_string());

    match verbosity {
        LogVerbosity::Minimal => format!("{} {}", status, duration),
        LogVerbosity::Compact | LogVerbosity::Verbose => format!("← {} ({})", status, duration),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ProviderKind;
    use crate::routing::{ChannelKey, ChannelProvider};
    use pretty_assertions::assert_eq;

    fn sample_channel() -> Channel {
        Channel {
            provider: ChannelProvider {
                id: "openai".to_string(),
                name: "OpenAI".to_string(),
                model: "gpt-4o".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                kind: ProviderKind::Standard,
                priority: 5,
                reasoning: false,
            },
            api_key: ChannelKey {
                index: 1,
                value: "sk-upstream".to_string(),
            },
        }
    }

    fn line(channel: &Channel, attempt: u32) -> AttemptLine<'_> {
        AttemptLine {
            attempt,
            max_attempts: 3,
            channel,
            url: "https://api.openai.com/v1/chat/completions",
        }
    }

    #[test]
    fn minimal_format_is_single_line() {
        let channel = sample_channel();
        let output = format_attempt(&line(&channel, 1), LogVerbosity::Minimal);

        assert_eq!(output, "gpt-4o openai#1");
    }

    #[test]
    fn compact_first_attempt_has_no_prefix() {
        let channel = sample_channel();
        let output = format_attempt(&line(&channel, 1), LogVerbosity::Compact);

        assert_eq!(output, "Model: gpt-4o, Provider: OpenAI (Key #1)");
    }

    #[test]
    fn compact_retry_shows_attempt_counter() {
        let channel = sample_channel();
        let output = format_attempt(&line(&channel, 2), LogVerbosity::Compact);

        assert_eq!(output, "[2/3] Model: gpt-4o, Provider: OpenAI (Key #1)");
    }

    #[test]
    fn verbose_format_includes_target_and_priority() {
        let channel = sample_channel();
        let output = format_attempt(&line(&channel, 1), LogVerbosity::Verbose);

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("https://api.openai.com"));
        assert!(lines[1].contains("/v1/chat/completions"));
        assert!(lines[2].contains("priority: 5"));
    }

    #[test]
    fn no_format_leaks_the_key() {
        let channel = sample_channel();
        for verbosity in [LogVerbosity::Minimal, LogVerbosity::Compact, LogVerbosity::Verbose] {
            assert!(!format_attempt(&line(&channel, 2), verbosity).contains("sk-upstream"));
        }
    }

    #[test]
    fn outcome_formats() {
        assert_eq!(format_outcome(Some(200), 1200, LogVerbosity::Minimal), "200 1.2s");
        assert_eq!(format_outcome(None, 80, LogVerbosity::Compact), "← ERR (80ms)");
    }

    #[test]
    fn extract_path_handles_bare_host() {
        assert_eq!(extract_path("https://example.com/a/b"), "/a/b");
        assert_eq!(extract_path("https://example.com"), "https://example.com");
    }
}
