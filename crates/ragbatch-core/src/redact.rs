//! Scrub credentials out of text before it reaches logs or progress messages.
//!
//! Provider errors routinely echo request headers or URLs back; anything that
//! looks like a key, bearer token or embedded credential is replaced with a
//! `[REDACTED_*]` marker.

use regex::Regex;
use std::sync::OnceLock;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        // Order matters: specific key formats before the generic long-token rule.
        [
            (r"sk-ant-[A-Za-z0-9\-]{20,}", "[REDACTED_ANTHROPIC_KEY]"),
            (r"sk-(?:proj-)?[A-Za-z0-9]{20,}", "[REDACTED_OPENAI_KEY]"),
            (r"up_[A-Za-z0-9]{20,}", "[REDACTED_UPSTAGE_KEY]"),
            (r"gsk_[A-Za-z0-9]{20,}", "[REDACTED_GROQ_KEY]"),
            (r"(?:ghp|gho|ghu|ghs|ghr)_[A-Za-z0-9]{36}", "[REDACTED_GITHUB_TOKEN]"),
            (r"(?i)bearer\s+[A-Za-z0-9\-._~+/]+=*", "Bearer [REDACTED_TOKEN]"),
            (r"(?i)(api[_-]?key|password|secret|token)(\s*[:=]\s*)[^\s,;&]+", "$1$2[REDACTED]"),
            (r"(https?://)[^/\s:@]+:[^/\s@]+@", "$1[REDACTED_CREDENTIALS]@"),
            (r"\b[A-Za-z0-9]{32,}\b", "[REDACTED_KEY]"),
        ]
        .into_iter()
        .filter_map(|(p, replacement)| Regex::new(p).ok().map(|pattern| Rule { pattern, replacement }))
        .collect()
    })
}

pub fn sanitize_message(message: &str) -> String {
    let mut out = message.to_string();
    for rule in rules() {
        if rule.pattern.is_match(&out) {
            out = rule.pattern.replace_all(&out, rule.replacement).into_owned();
        }
    }
    out
}

/// Show only the first and last few characters of a key, for diagnostics.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.trim().chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
