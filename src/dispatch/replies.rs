//! User-facing text and reply cleanup.

use std::time::Duration;

use crate::ratelimit::LimitConfig;
use crate::session::SessionPolicy;

pub const THINKING: &str = "Deep thinking in progress..\n🤔 → 🧠 → 🚀";
pub const AUTO_RESET: &str =
    "⏳ Your conversation history was automatically reset due to inactivity.";
pub const RESET_DONE: &str = "✅ Your conversation history has been reset. Starting fresh!";
pub const RESET_NOTHING: &str = "ℹ️ No conversation history found to reset.";
pub const UNKNOWN_COMMAND: &str = "🤷 Unknown command. Try /help.";
pub const EMPTY_REPLY: &str = "🤐 The assistant returned an empty reply.";
pub const BACKEND_FAILED: &str = "🚨 Oops! Something went wrong.\n\n\
    Possible reasons:\n\
    1. Service temporarily unavailable\n\
    2. Network issue\n\
    3. API rate limit reached\n\n\
    Please try again in a minute.";

/// A recognised bot command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Reset,
    Unknown,
}

/// Parse a leading `/command` (with an optional `@botname` suffix).
///
/// Returns `None` for ordinary text.
pub fn parse_command(text: &str) -> Option<Command> {
    let word = text.trim_start().strip_prefix('/')?.split_whitespace().next()?;
    let name = word.split('@').next().unwrap_or(word);

    Some(match name.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "reset" => Command::Reset,
        _ => Command::Unknown,
    })
}

/// Welcome text describing the configured limits.
pub fn welcome(limits: LimitConfig, policy: SessionPolicy) -> String {
    format!(
        "👋 Hello! I'm your AI assistant.\n\n\
         📝 I remember context within our chat (last {} messages).\n\
         🚀 Responses are plain text only.\n\
         ⏱️ Rate limit: {} requests per {}\n\
         🧹 Use /reset anytime to clear chat history.\n\
         ⏳ Auto-reset happens if you're inactive for {}.",
        policy.max_turns,
        limits.limit,
        human_duration(limits.window),
        human_duration(policy.inactivity_timeout),
    )
}

/// Rate-limit notice.
pub fn rate_limited(retry_after: Duration) -> String {
    let secs = retry_after.as_secs().max(1);
    let unit = if secs == 1 { "second" } else { "seconds" };
    format!("⚠️ Rate limit exceeded. Please wait {} {}.", secs, unit)
}

fn human_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        60 => "minute".to_string(),
        s if s % 60 == 0 => format!("{} minutes", s / 60),
        s => format!("{} seconds", s),
    }
}

/// Strip formatting the backend adds despite the plain-text instruction.
///
/// `\boxed{...}` wrappers are replaced by their contents.
pub fn clean_reply(reply: &str) -> String {
    const BOXED: &str = "\\boxed{";

    let mut out = String::with_capacity(reply.len());
    let mut rest = reply;

    while let Some(start) = rest.find(BOXED) {
        out.push_str(&rest[..start]);
        let inner = &rest[start + BOXED.len()..];

        match matching_brace(inner) {
            Some(end) => {
                out.push_str(&inner[..end]);
                rest = &inner[end + 1..];
            }
            None => {
                // Unterminated wrapper: keep the text, drop the marker
                rest = inner;
            }
        }
    }
    out.push_str(rest);

    out.trim().to_string()
}

/// Byte offset of the `}` closing an already-opened brace.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' if depth == 0 => return Some(idx),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/reset@relay_bot"), Some(Command::Reset));
        assert_eq!(parse_command("  /HELP please"), Some(Command::Help));
        assert_eq!(parse_command("/weather"), Some(Command::Unknown));
        assert_eq!(parse_command("hello /start"), None);
        assert_eq!(parse_command("just text"), None);
    }

    #[test]
    fn test_clean_reply_unwraps_boxed() {
        assert_eq!(clean_reply("The answer is \\boxed{42}."), "The answer is 42.");
        assert_eq!(clean_reply("\\boxed{f(x) = {x}}"), "f(x) = {x}");
        assert_eq!(clean_reply("\\boxed{a} and \\boxed{b}"), "a and b");
    }

    #[test]
    fn test_clean_reply_keeps_plain_braces() {
        assert_eq!(clean_reply("use {braces} freely"), "use {braces} freely");
        assert_eq!(clean_reply("  padded  \n"), "padded");
    }

    #[test]
    fn test_clean_reply_unterminated_boxed() {
        assert_eq!(clean_reply("\\boxed{oops"), "oops");
    }

    #[test]
    fn test_welcome_mentions_limits() {
        let text = welcome(LimitConfig::default(), SessionPolicy::default());
        assert!(text.contains("3 requests per minute"));
        assert!(text.contains("30 minutes"));
        assert!(text.contains("/reset"));
    }

    #[test]
    fn test_rate_limited_rounds_up_to_a_second() {
        assert!(rate_limited(Duration::from_millis(200)).contains("wait 1 second."));
        assert!(rate_limited(Duration::from_secs(42)).contains("42 seconds"));
    }
}
