use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellAnalysis {
    /// Simple commands separated by `;`, `&&`, `||`, `|` or `&`
    pub segments: Vec<String>,
    pub has_pipe: bool,
    pub has_chain: bool,
    pub has_subshell: bool,
    pub has_output_redirect: bool,
}

/// Split a command line into its simple commands, honoring quotes.
pub fn analyze_command(command: &str) -> ShellAnalysis {
    let mut analysis = ShellAnalysis {
        has_subshell: has_unquoted_subshell(command),
        ..Default::default()
    };

    let chars: Vec<char> = command.chars().collect();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '\\' if !in_single_quote => {
                current.push(c);
                if let Some(escaped) = next {
                    current.push(escaped);
                    i += 1;
                }
            }
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                current.push(c);
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                current.push(c);
            }
            ';' | '\n' if !in_single_quote && !in_double_quote => {
                analysis.has_chain = true;
                push_segment(&mut analysis.segments, &mut current);
            }
            '&' | '|' if !in_single_quote && !in_double_quote => {
                if next == Some(c) {
                    analysis.has_chain = true;
                    i += 1;
                } else if c == '|' {
                    analysis.has_pipe = true;
                } else if matches!(current.chars().last(), Some('>') | Some('<')) {
                    // `2>&1` style redirection, not a separator
                    current.push(c);
                    i += 1;
                    continue;
                } else {
                    analysis.has_chain = true;
                }
                push_segment(&mut analysis.segments, &mut current);
            }
            '>' if !in_single_quote && !in_double_quote => {
                analysis.has_output_redirect = true;
                current.push(c);
            }
            _ => current.push(c),
        }
        i += 1;
    }
    push_segment(&mut analysis.segments, &mut current);

    analysis
}

fn push_segment(segments: &mut Vec<String>, current: &mut String) {
    let segment = current.trim();
    if !segment.is_empty() {
        segments.push(segment.to_string());
    }
    current.clear();
}

/// Check if a command contains unquoted subshell patterns ($(...) or backticks).
fn has_unquoted_subshell(command: &str) -> bool {
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut prev_char = '\0';
    let chars: Vec<char> = command.chars().collect();

    for i in 0..chars.len() {
        let c = chars[i];
        match c {
            '\'' if !in_double_quote && prev_char != '\\' => in_single_quote = !in_single_quote,
            '"' if !in_single_quote && prev_char != '\\' => in_double_quote = !in_double_quote,
            '$' if !in_single_quote && i + 1 < chars.len() && chars[i + 1] == '(' => return true,
            // Backticks expand even inside double quotes, only single quotes suppress them
            '`' if !in_single_quote => return true,
            _ => {}
        }
        prev_char = c;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_command() {
        let analysis = analyze_command("ls -la /var/log");
        assert_eq!(analysis.segments, vec!["ls -la /var/log"]);
        assert!(!analysis.has_pipe);
        assert!(!analysis.has_chain);
    }

    #[test]
    fn test_detects_pipe_operator() {
        let analysis = analyze_command("ps aux | grep nginx");
        assert!(analysis.has_pipe);
        assert_eq!(analysis.segments, vec!["ps aux", "grep nginx"]);
    }

    #[test]
    fn test_allows_pipe_in_quotes() {
        let analysis = analyze_command("echo 'a|b'");
        assert!(!analysis.has_pipe);
        assert_eq!(analysis.segments.len(), 1);
    }

    #[test]
    fn test_detects_chain_operators() {
        let analysis = analyze_command("uptime && rm -f x; whoami || true & date");
        assert!(analysis.has_chain);
        assert_eq!(
            analysis.segments,
            vec!["uptime", "rm -f x", "whoami", "true", "date"]
        );
    }

    #[test]
    fn test_fd_redirect_is_not_a_separator() {
        let analysis = analyze_command("make 2>&1");
        assert!(!analysis.has_chain);
        assert_eq!(analysis.segments, vec!["make 2>&1"]);
        assert!(analysis.has_output_redirect);
    }

    #[test]
    fn test_quoted_angle_bracket_is_not_a_redirect() {
        assert!(!analyze_command("grep '<a href>' index.html").has_output_redirect);
        assert!(analyze_command("cat a > b").has_output_redirect);
    }

    #[test]
    fn test_unquoted_subshell_detected() {
        assert!(analyze_command("echo $(date)").has_subshell);
        assert!(analyze_command("echo \"`date`\"").has_subshell);
    }

    #[test]
    fn test_subshell_in_single_quotes_allowed() {
        assert!(!analyze_command("echo '$(date)'").has_subshell);
        assert!(!analyze_command("echo '`date`'").has_subshell);
    }
}
