//! Command risk filter.
//!
//! A [`CommandFilter`] is built once per policy version and then checked on
//! every submitted command line. Built-in rule tables are compiled once per
//! process; policy-supplied patterns are appended after them.

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;
use tracing::warn;

use super::shell_parser::analyze_command;
use crate::models::{CommandCheckResult, CommandMode};

/// Risk assigned to a blacklisted command.
pub const BLOCKED_RISK: f64 = 1.0;
/// Risk assigned to a command accepted by a whitelist.
pub const WHITELIST_ALLOWED_RISK: f64 = 0.1;
/// Risk assigned to a command a whitelist does not cover.
pub const WHITELIST_DENIED_RISK: f64 = 0.5;

/// Categorically destructive or privilege-escalating command shapes.
const BUILTIN_BLACKLIST: &[&str] = &[
    // recursive deletion of /, /*, ~ or $HOME
    r"\brm\s+(?:-\S+\s+)*(?:/\*?|~/?|\$home/?)(?:\s|[;&|]|$)",
    r"\b(?:mkfs(?:\.\w+)?|mke2fs|mkswap|wipefs)\b",
    r"\bdd\b.*\bof=\s*/dev/(?:sd|hd|vd|xvd|nvme|mmcblk|disk)",
    r">\s*/dev/(?:sd|hd|vd|xvd|nvme|mmcblk)[a-z0-9]*",
    r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
    // in command position, so `tail reboot.log` stays readable
    r"(?:^|[;&|(`]|\b(?:sudo|doas|exec|nohup|systemctl)(?:\s+-\S+)*)\s*(?:/\S*/)?(?:shutdown|halt|poweroff|reboot)\b",
    r"\binit\s+[06]\b",
    r"\bchmod\s+(?:-\S+\s+)*(?:0?777|a\+rwx|ugo\+rwx)\s+/(?:\*|\s|$)",
    r"\b(?:curl|wget)\b[^|]*\|\s*(?:sudo\s+)?(?:ba|z|k|da)?sh\b",
];

/// Read-only and diagnostic commands accepted in whitelist mode.
///
/// Commands that take arguments able to write, execute or open an
/// interactive escape are pinned to their safe forms here or narrowed by
/// [`WHITELIST_EXCLUSIONS`]. Option letters are matched case-sensitively.
const BUILTIN_WHITELIST: &[&str] = &[
    r"^(?:ls|ll|la|pwd|whoami|id|uname|uptime|w|who|last)\b",
    r"^(?:df|du|free|ps|pgrep|lsof|vmstat|iostat|lsblk)\b",
    r"^(?:cat|head|tail|grep|egrep|fgrep|wc|stat|file|sort|find)\b",
    r"^(?:echo|printenv|which|type|clear)\b",
    r"^(?:netstat|ss|ping|traceroute|dig|nslookup|host)\b",
    r"^uniq(?:\s+-\S+)*\s*$",
    r"^history(?:\s+\d+)?\s*$",
    r"^(?-i:hostname(?:\s+(?:-[fsdiIaA]+|--fqdn|--short|--domain|--ip-address|--all-ip-addresses|--all-fqdns))*)\s*$",
    r#"^(?-i:date(?:\s+(?:-u|-R|--utc|--universal|--rfc-email|-I\w*|--iso-8601(?:=\w+)?|\+\S*|'\+[^']*'|"\+[^"]*"))*)\s*$"#,
    r"^(?-i:top\s+(?:-b\s*-n\s*\d+|-bn\s*\d+|-n\s*\d+\s+-b))\s*$",
    r"^ip\s+(?:a|addr|route|link)(?:\s+show)?\s*$",
    r"^journalctl\b",
    r"^systemctl\s+(?:status|is-active|is-enabled|list-units)\b",
    r"^git\s+(?:status|log|diff|show)\b",
    r"^git\s+branch(?:\s+(?:-a|-r|-v|-vv|--all|--remotes|--list))*\s*$",
];

/// Arguments that turn a whitelisted built-in command into one that writes
/// or executes. They only override the built-in list; a policy pattern
/// that matches such a command still allows it.
const WHITELIST_EXCLUSIONS: &[&str] = &[
    r"^find\b.*\s-(?:exec|execdir|ok|okdir|delete|fprint0?|fprintf|fls)\b",
    r"^(?-i:sort\b.*\s(?:-[a-zA-Z]*o|--output|--compress-program))",
    r"^journalctl\b.*\s--(?:vacuum-\w+|rotate|flush|sync|relinquish-var|setup-keys|update-catalog)\b",
    r"^git\b.*\s--output\b",
];

/// Weighted token classes for the heuristic score of non-blacklisted commands.
const RISK_WEIGHTS: &[(&str, f64)] = &[
    (r"\b(?:sudo|su|doas|pkexec)\b", 0.3),
    (
        r"\b(?:rm|mv|chmod|chown|chgrp|dd|truncate|shred|rmdir)\b|>",
        0.2,
    ),
    (
        r"\b(?:apt|apt-get|yum|dnf|zypper|pacman|apk|rpm|dpkg|snap|pip3?|npm|gem)\b",
        0.2,
    ),
    (
        r"\b(?:systemctl|service|supervisorctl|initctl|launchctl)\b",
        0.2,
    ),
    (
        r"\b(?:iptables|ip6tables|nft|ufw|firewall-cmd|route|ifconfig|ifup|ifdown)\b",
        0.3,
    ),
];

#[derive(Debug, Clone)]
struct CompiledPattern {
    source: String,
    regex: Regex,
}

fn compile_builtin(patterns: &[&str]) -> Vec<CompiledPattern> {
    patterns
        .iter()
        .map(|pattern| CompiledPattern {
            source: (*pattern).to_string(),
            regex: RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .expect("built-in command pattern must compile"),
        })
        .collect()
}

static BLACKLIST: LazyLock<Vec<CompiledPattern>> =
    LazyLock::new(|| compile_builtin(BUILTIN_BLACKLIST));

static WHITELIST: LazyLock<Vec<CompiledPattern>> =
    LazyLock::new(|| compile_builtin(BUILTIN_WHITELIST));

static EXCLUSIONS: LazyLock<Vec<CompiledPattern>> =
    LazyLock::new(|| compile_builtin(WHITELIST_EXCLUSIONS));

static RISK_RULES: LazyLock<Vec<(Regex, f64)>> = LazyLock::new(|| {
    RISK_WEIGHTS
        .iter()
        .map(|(pattern, weight)| {
            let regex = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .expect("built-in risk pattern must compile");
            (regex, *weight)
        })
        .collect()
});

static NEVER_MATCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\s\S]").expect("empty-class regex must compile"));

/// Compile a policy-supplied pattern. Invalid regex syntax is matched as a
/// literal substring instead of being dropped.
fn compile_custom(pattern: &str) -> CompiledPattern {
    let regex = match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => regex,
        Err(e) => {
            warn!(pattern, error = %e, "Invalid command pattern, matching it literally");
            let escaped = regex::escape(pattern);
            match RegexBuilder::new(&escaped).case_insensitive(true).build() {
                Ok(regex) => regex,
                // Only reachable when the escaped literal exceeds the size limit.
                Err(_) => NEVER_MATCH.clone(),
            }
        }
    };
    CompiledPattern {
        source: pattern.to_string(),
        regex,
    }
}

/// Pure allow/deny decision over a fixed pattern set.
#[derive(Debug, Clone)]
pub struct CommandFilter {
    mode: CommandMode,
    patterns: Vec<CompiledPattern>,
    /// Leading entries of `patterns` that are built in
    builtin_count: usize,
}

impl CommandFilter {
    /// Build a filter for `mode`, appending `extra` patterns to the built-in
    /// list of that mode.
    pub fn new(mode: CommandMode, extra: &[String]) -> Self {
        let builtin = match mode {
            CommandMode::Blacklist => &*BLACKLIST,
            CommandMode::Whitelist => &*WHITELIST,
        };
        let mut patterns = builtin.clone();
        patterns.extend(extra.iter().map(|pattern| compile_custom(pattern)));
        Self {
            mode,
            patterns,
            builtin_count: builtin.len(),
        }
    }

    /// Blacklist filter with only the built-in rules.
    pub fn builtin_blacklist() -> Self {
        Self::new(CommandMode::Blacklist, &[])
    }

    pub fn mode(&self) -> CommandMode {
        self.mode
    }

    /// Number of compiled patterns, built-ins included.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn check(&self, command: &str) -> CommandCheckResult {
        let command = command.trim();
        if command.is_empty() {
            return CommandCheckResult::allowed("Empty command", 0.0, None);
        }

        match self.mode {
            CommandMode::Blacklist => self.check_blacklist(command),
            CommandMode::Whitelist => self.check_whitelist(command),
        }
    }

    /// Check every reading of one submitted line. The line is blocked if
    /// any reading is; otherwise the riskiest allowed result is returned.
    pub fn check_any(&self, readings: &[String]) -> CommandCheckResult {
        let mut worst: Option<CommandCheckResult> = None;
        for reading in readings {
            let result = self.check(reading);
            if !result.allowed {
                return result;
            }
            if worst
                .as_ref()
                .is_none_or(|current| result.risk_score > current.risk_score)
            {
                worst = Some(result);
            }
        }
        worst.unwrap_or_else(|| CommandCheckResult::allowed("Empty command", 0.0, None))
    }

    fn find_match(&self, command: &str) -> Option<&CompiledPattern> {
        self.patterns
            .iter()
            .find(|pattern| pattern.regex.is_match(command))
    }

    /// Like [`Self::find_match`], but built-in whitelist entries are skipped
    /// for commands carrying an excluded argument.
    fn find_whitelist_match(&self, segment: &str) -> Option<&CompiledPattern> {
        let excluded = EXCLUSIONS.iter().any(|pattern| pattern.regex.is_match(segment));
        let skip = if excluded { self.builtin_count } else { 0 };
        self.patterns[skip..]
            .iter()
            .find(|pattern| pattern.regex.is_match(segment))
    }

    fn check_blacklist(&self, command: &str) -> CommandCheckResult {
        if let Some(pattern) = self.find_match(command) {
            return CommandCheckResult::blocked(
                "Command matches a blocked pattern",
                BLOCKED_RISK,
                Some(pattern.source.clone()),
            );
        }
        CommandCheckResult::allowed("Command allowed", risk_score(command), None)
    }

    /// Every simple command of a chain or pipeline must be whitelisted, and
    /// command substitution is never accepted.
    fn check_whitelist(&self, command: &str) -> CommandCheckResult {
        let analysis = analyze_command(command);
        if analysis.has_subshell {
            return CommandCheckResult::blocked(
                "Command substitution is not allowed in whitelist mode",
                WHITELIST_DENIED_RISK,
                None,
            );
        }
        if analysis.has_output_redirect {
            return CommandCheckResult::blocked(
                "Output redirection is not allowed in whitelist mode",
                WHITELIST_DENIED_RISK,
                None,
            );
        }

        let mut first_match = None;
        for segment in &analysis.segments {
            match self.find_whitelist_match(segment) {
                Some(pattern) => {
                    first_match.get_or_insert_with(|| pattern.source.clone());
                }
                None => {
                    return CommandCheckResult::blocked(
                        format!("Command not in whitelist: {segment}"),
                        WHITELIST_DENIED_RISK,
                        None,
                    );
                }
            }
        }

        CommandCheckResult::allowed("Command whitelisted", WHITELIST_ALLOWED_RISK, first_match)
    }
}

/// Heuristic risk of a command that no blacklist rule caught, in `0.0..=1.0`.
///
/// Each token class contributes its weight once.
pub fn risk_score(command: &str) -> f64 {
    RISK_RULES
        .iter()
        .filter(|(regex, _)| regex.is_match(command))
        .fold(0.0, |score, (_, weight)| score + weight)
        .min(1.0)
}
