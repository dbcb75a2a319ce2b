//! Command extraction from raw terminal input.
//!
//! Interactive sessions deliver keystrokes, not commands. [`LineBuffer`]
//! assembles them into the line the remote shell will execute and
//! [`command_readings`] lists the forms of that line the command filter
//! has to accept before it is submitted.

use regex::Regex;
use std::sync::LazyLock;

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
        .expect("ANSI escape regex must compile")
});

/// Prompt fragments, most specific first.
static PROMPTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // user@host:~/path$
        r"^[\w.-]+@[\w.-]+(?::[^\s$#%>]*)?\s*[$#%>]\s+",
        // [user@host dir]$
        r"^\[[^\]]*\]\s*[$#%>]\s+",
        // bash-5.2$, $, #, %, >
        r"^\S*[$#%>]\s+",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("prompt regex must compile"))
    .collect()
});

/// Bracketed-paste markers a terminal wraps pasted text in.
const PASTE_MARKERS: &[&str] = &["[200~", "[201~"];

/// Extract the command from a line of terminal text: escape sequences are
/// removed, only the last line is kept, and a leading shell prompt is
/// stripped.
pub fn extract_command(raw: &str) -> String {
    let cleaned = ANSI_ESCAPE.replace_all(raw, "");
    let line = cleaned
        .trim_end_matches(['\r', '\n'])
        .rsplit(['\r', '\n'])
        .next()
        .unwrap_or_default();

    let mut command = line.trim_start();
    for prompt in PROMPTS.iter() {
        if let Some(found) = prompt.find(command) {
            command = &command[found.end()..];
            break;
        }
    }
    command.trim().to_string()
}

/// Every reading of a submitted line that must pass the filter.
///
/// The line exactly as typed always comes first. When it starts with
/// something shaped like a prompt (pasted terminal text), the stripped
/// form is checked as well. Prompts never prefix keystrokes on their own,
/// so the typed form is never dropped.
pub fn command_readings(line: &str) -> Vec<String> {
    let typed = line.trim().to_string();
    let stripped = extract_command(line);
    if stripped == typed {
        vec![typed]
    } else {
        vec![typed, stripped]
    }
}

/// A piece of a keystroke stream, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSegment {
    /// Bytes to forward unchanged
    Keys(Vec<u8>),
    /// The user pressed Enter on `line`; `terminator` is the key that was sent.
    /// `untracked` is set when the shell may be holding a different line.
    Submit {
        line: String,
        terminator: u8,
        untracked: bool,
    },
}

/// Assembles keystrokes into the current command line.
///
/// Printable input, Backspace and Ctrl-C are tracked exactly. Keys the
/// shell edits the line with on its own (Tab completion, cursor and
/// history keys, Ctrl-R, Meta sequences) leave the buffer unable to tell
/// what the shell will run, so the line is marked untracked until it is
/// submitted or cancelled.
#[derive(Debug, Default)]
pub struct LineBuffer {
    line: String,
    escape: Option<String>,
    untracked: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The line typed so far.
    pub fn current(&self) -> &str {
        &self.line
    }

    pub fn is_untracked(&self) -> bool {
        self.untracked
    }

    pub fn clear(&mut self) {
        self.line.clear();
        self.escape = None;
        self.untracked = false;
    }

    /// Feed a chunk of input and split it at every Enter key.
    ///
    /// The chunk should end on a character boundary; bytes that are not
    /// UTF-8 are forwarded as they are and mark the line untracked.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<InputSegment> {
        let mut segments = Vec::new();
        let mut keys = Vec::with_capacity(chunk.len());

        for piece in chunk.utf8_chunks() {
            for c in piece.valid().chars() {
                if let Some(submit) = self.feed_char(c) {
                    if !keys.is_empty() {
                        segments.push(InputSegment::Keys(std::mem::take(&mut keys)));
                    }
                    segments.push(submit);
                    continue;
                }
                let mut buf = [0u8; 4];
                keys.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            if !piece.invalid().is_empty() {
                self.untracked = true;
                keys.extend_from_slice(piece.invalid());
            }
        }

        if !keys.is_empty() {
            segments.push(InputSegment::Keys(keys));
        }
        segments
    }

    /// Returns the submit segment when `c` is Enter.
    fn feed_char(&mut self, c: char) -> Option<InputSegment> {
        if let Some(sequence) = self.escape.as_mut() {
            sequence.push(c);
            if escape_complete(sequence) {
                if !PASTE_MARKERS.contains(&sequence.as_str()) {
                    self.untracked = true;
                }
                self.escape = None;
            }
            return None;
        }

        match c {
            '\r' | '\n' => {
                return Some(InputSegment::Submit {
                    line: std::mem::take(&mut self.line),
                    terminator: c as u8,
                    untracked: std::mem::take(&mut self.untracked),
                });
            }
            '\x7f' | '\x08' => {
                self.line.pop();
            }
            '\x03' => self.clear(),
            // Ctrl-U only kills up to the cursor, so an untracked line stays so.
            '\x15' => self.line.clear(),
            // Ctrl-L redraws the screen
            '\x0c' => {}
            '\x1b' => self.escape = Some(String::new()),
            c if c.is_control() => self.untracked = true,
            c => self.line.push(c),
        }
        None
    }
}

/// Whether the bytes after ESC form a whole sequence: CSI ends at its final
/// byte, SS3 takes one more character, anything else is a two-key Meta
/// combination.
fn escape_complete(sequence: &str) -> bool {
    let mut chars = sequence.chars();
    match chars.next() {
        None => false,
        Some('[') => chars.last().is_some_and(|c| matches!(c, '@'..='~')),
        Some('O') => chars.next().is_some(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submitted(segments: &[InputSegment]) -> Vec<(&str, bool)> {
        segments
            .iter()
            .filter_map(|segment| match segment {
                InputSegment::Submit {
                    line, untracked, ..
                } => Some((line.as_str(), *untracked)),
                InputSegment::Keys(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_extract_plain_command() {
        assert_eq!(extract_command("ls -la"), "ls -la");
        assert_eq!(extract_command("  uptime \r\n"), "uptime");
    }

    #[test]
    fn test_strips_common_prompts() {
        assert_eq!(extract_command("deploy@web-1:~/app$ rm -rf /"), "rm -rf /");
        assert_eq!(extract_command("root@db.internal:/var/log# tail -f syslog"), "tail -f syslog");
        assert_eq!(extract_command("[ops@web-1 ~]$ df -h"), "df -h");
        assert_eq!(extract_command("$ whoami"), "whoami");
        assert_eq!(extract_command("# reboot"), "reboot");
        assert_eq!(extract_command("bash-5.2$ id"), "id");
    }

    #[test]
    fn test_keeps_dollar_inside_command() {
        assert_eq!(extract_command("echo $HOME"), "echo $HOME");
        assert_eq!(extract_command("$HOME/bin/run"), "$HOME/bin/run");
    }

    #[test]
    fn test_strips_ansi_sequences() {
        let raw = "\x1b[01;32mdeploy@web-1\x1b[00m:\x1b[01;34m~\x1b[00m$ shutdown -h now";
        assert_eq!(extract_command(raw), "shutdown -h now");
        assert_eq!(extract_command("\x1b]0;title\x07ls"), "ls");
    }

    #[test]
    fn test_uses_last_line() {
        assert_eq!(extract_command("total 0\r\n$ reboot\r\n"), "reboot");
    }

    #[test]
    fn test_readings_keep_the_typed_line() {
        assert_eq!(command_readings("  ls -la "), vec!["ls -la"]);
        // Tokens ending in a prompt character are part of the command.
        assert_eq!(command_readings("reboot;# x"), vec!["reboot;# x", "x"]);
        assert_eq!(
            command_readings("cat</dev/zero> /dev/sda"),
            vec!["cat</dev/zero> /dev/sda", "/dev/sda"]
        );
        assert_eq!(command_readings("$ whoami"), vec!["$ whoami", "whoami"]);
    }

    #[test]
    fn test_line_buffer_submits_on_enter() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.feed(b"ls"), vec![InputSegment::Keys(b"ls".to_vec())]);
        assert_eq!(buffer.current(), "ls");

        let segments = buffer.feed(b" -la\r");
        assert_eq!(
            segments,
            vec![
                InputSegment::Keys(b" -la".to_vec()),
                InputSegment::Submit {
                    line: "ls -la".into(),
                    terminator: b'\r',
                    untracked: false,
                },
            ]
        );
        assert_eq!(buffer.current(), "");
    }

    #[test]
    fn test_line_buffer_editing_keys() {
        let mut buffer = LineBuffer::new();
        buffer.feed(b"rmx\x7f -rf /");
        assert_eq!(buffer.current(), "rm -rf /");

        buffer.feed(b"\x15");
        assert_eq!(buffer.current(), "");

        buffer.feed(b"reboot\x03");
        assert_eq!(buffer.current(), "");
        assert!(!buffer.is_untracked());
    }

    #[test]
    fn test_tab_completion_untracks_the_line() {
        let mut buffer = LineBuffer::new();
        let segments = buffer.feed(b"rebo\t\r");
        assert_eq!(submitted(&segments), vec![("rebo", true)]);

        // The next line starts clean.
        let segments = buffer.feed(b"uptime\r");
        assert_eq!(submitted(&segments), vec![("uptime", false)]);
    }

    #[test]
    fn test_cursor_and_history_keys_untrack_the_line() {
        for input in [
            &b"eboot\x1b[Hr\r"[..],
            b"\x1b[A\r",
            b"\x1bOA\r",
            b"ls \x1bb\r",
            b"\x12boot\r",
        ] {
            let mut buffer = LineBuffer::new();
            let segments = buffer.feed(input);
            let lines = submitted(&segments);
            assert_eq!(lines.len(), 1, "{input:?}");
            assert!(lines[0].1, "{input:?}");
        }
    }

    #[test]
    fn test_escape_split_across_chunks_is_forwarded_whole() {
        let mut buffer = LineBuffer::new();
        let mut forwarded = Vec::new();
        for chunk in [&b"ls\x1b"[..], b"[", b"D\r"] {
            for segment in buffer.feed(chunk) {
                match segment {
                    InputSegment::Keys(keys) => forwarded.extend(keys),
                    InputSegment::Submit { line, untracked, .. } => {
                        assert_eq!(line, "ls");
                        assert!(untracked);
                    }
                }
            }
        }
        assert_eq!(forwarded, b"ls\x1b[D");
    }

    #[test]
    fn test_ctrl_c_forgets_untracked_state() {
        let mut buffer = LineBuffer::new();
        buffer.feed(b"\x1b[A");
        assert!(buffer.is_untracked());
        buffer.feed(b"\x03");
        assert!(!buffer.is_untracked());

        // Ctrl-U does not: the cursor may not be at the end of the line.
        buffer.feed(b"\x1b[D\x15");
        assert!(buffer.is_untracked());
    }

    #[test]
    fn test_bracketed_paste_markers_are_tracked() {
        let mut buffer = LineBuffer::new();
        let segments = buffer.feed(b"\x1b[200~df -h\x1b[201~\r");
        assert_eq!(submitted(&segments), vec![("df -h", false)]);
    }

    #[test]
    fn test_non_utf8_bytes_pass_through_untracked() {
        let mut buffer = LineBuffer::new();
        let segments = buffer.feed(b"ls \xff\r");
        assert_eq!(segments[0], InputSegment::Keys(b"ls \xff".to_vec()));
        assert_eq!(submitted(&segments), vec![("ls ", true)]);
    }

    #[test]
    fn test_multibyte_keys_are_forwarded_unchanged() {
        let mut buffer = LineBuffer::new();
        let segments = buffer.feed("echo café".as_bytes());
        assert_eq!(segments, vec![InputSegment::Keys("echo café".as_bytes().to_vec())]);
        assert_eq!(buffer.current(), "echo café");
    }

    #[test]
    fn test_line_buffer_pasted_lines() {
        let mut buffer = LineBuffer::new();
        let segments = buffer.feed(b"uptime\nreboot\n");
        assert_eq!(submitted(&segments), vec![("uptime", false), ("reboot", false)]);
    }
}
