//! Denylist of obviously destructive commands
//!
//! Compiled once, immutable after startup. Additions go through code review,
//! not runtime configuration.

use std::sync::OnceLock;

use regex::Regex;

struct DenyRule {
    pattern: Regex,
    reason: &'static str,
}

fn rules() -> &'static [DenyRule] {
    static RULES: OnceLock<Vec<DenyRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let compile = |pattern: &str, reason: &'static str| DenyRule {
            pattern: Regex::new(pattern).expect("denylist pattern must compile"),
            reason,
        };

        vec![
            compile(r"(?i)\brm\s+(-[a-z]*r[a-z]*f|-[a-z]*f[a-z]*r)[a-z]*\s+(/|~)(\s|$)", "recursive delete of root or home"),
            compile(r"(?i)\brm\s+-[a-z]*r[a-z]*\s+(/|~)(\s|$)", "recursive delete of root or home"),
            compile(r"(?i)\bdd\b.*\bof=/dev/(sd|hd|nvme|disk)", "raw write to a block device"),
            compile(r"(?i)\bmkfs(\.[a-z0-9]+)?\b", "filesystem format"),
            compile(r":\(\)\s*\{\s*:\|:&\s*\}\s*;?\s*:", "fork bomb"),
            compile(r"(?i)\bformat\s+[a-z]:", "windows drive format"),
            compile(r"(?i)\bdel\s+/s\b", "windows recursive delete"),
            compile(r"^\s*```", "bare fenced code-block marker"),
        ]
    })
}

/// Why a command is blocked, or None when it is allowed
pub fn command_blocked_reason(command: &str) -> Option<&'static str> {
    rules().iter().find(|rule| rule.pattern.is_match(command)).map(|rule| rule.reason)
}
