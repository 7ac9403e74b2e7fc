use std::sync::OnceLock;

use regex::Regex;

use crate::types::CompileResult;

/// Continuation lines absorbed by one inline-marker message.
pub const MAX_CONTINUATION_LINES: usize = 5;

const ERROR_MARKER: &str = "[ error ]:";
const WARNING_MARKER: &str = "[ warning ]:";
const SIZE_MARKER: &str = "[ size ]:";
const PROJECT_SIZE_MARKER: &str = "[ project size ]:";
const SECTION_DIVIDER: &str = "----------";
const SUMMARY_TOKEN: &str = "warning(s)";

pub const LABEL_WARNINGS: &str = "Program Warnings";
pub const LABEL_NOTICES: &str = "Program Notices";
pub const LABEL_ERRORS: &str = "Program Errors";

fn summary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d+)\s*warning\(s\),\s*(\d+)\s*error\(s\)").expect("summary pattern")
    })
}

fn compile_time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^Compile Time\s*:\s*(\d+(?:\.\d+)?|\.\d+)\s*(?:seconds|s)?").expect("compile time pattern")
    })
}

/// `"Program Warnings: 1"` with label `"Program Warnings"` yields `Some(1)`.
/// Only the leading digit run counts; a label without a number yields `None`.
pub fn parse_stat_line(line: &str, label: &str) -> Option<u32> {
    let re = Regex::new(&format!(r"^{}\s*:\s*(\d+)", regex::escape(label))).ok()?;
    re.captures(line)?.get(1)?.as_str().parse().ok()
}

/// `"Compile Time: 0.23 seconds"` yields `Some(0.23)`.
pub fn parse_compile_time(line: &str) -> Option<f64> {
    compile_time_re().captures(line)?.get(1)?.as_str().parse().ok()
}

/// `"<n> warning(s), <n> error(s)"` anywhere in the line, as (warnings, errors).
pub fn parse_summary(line: &str) -> Option<(u32, u32)> {
    let caps = summary_re().captures(line)?;
    let warnings = caps.get(1)?.as_str().parse().ok()?;
    let errors = caps.get(2)?.as_str().parse().ok()?;
    Some((warnings, errors))
}

/// Apply one labelled statistics line to `result`. True if anything matched.
fn apply_stat_line(line: &str, result: &mut CompileResult) -> bool {
    let mut matched = false;
    if let Some(n) = parse_stat_line(line, LABEL_WARNINGS) {
        result.warnings = n;
        matched = true;
    }
    if let Some(n) = parse_stat_line(line, LABEL_NOTICES) {
        result.notices = n;
        matched = true;
    }
    if let Some(n) = parse_stat_line(line, LABEL_ERRORS) {
        result.errors = n;
        matched = true;
    }
    if let Some(secs) = parse_compile_time(line) {
        result.compile_time = Some(secs);
        matched = true;
    }
    matched
}

/// Read the labelled counters and compile time out of the statistics dialog text.
pub fn parse_statistics_text(text: &str, result: &mut CompileResult) -> bool {
    let text = text.replace("\r\n", "\n");
    let mut matched = false;
    for line in text.split('\n').map(str::trim).filter(|l| !l.is_empty()) {
        matched |= apply_stat_line(line, result);
    }
    matched
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Error,
    Warning,
    Notice,
}

/// Messages grouped by kind, in the order they were listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailedMessages {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub notices: Vec<String>,
}

impl DetailedMessages {
    fn list(&mut self, kind: MessageKind) -> &mut Vec<String> {
        match kind {
            MessageKind::Error => &mut self.errors,
            MessageKind::Warning => &mut self.warnings,
            MessageKind::Notice => &mut self.notices,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty() && self.notices.is_empty()
    }
}

fn leading_kind(line: &str) -> Option<MessageKind> {
    let upper = line.to_uppercase();
    let starts = |token: &str| {
        upper
            .strip_prefix(token)
            .is_some_and(|rest| rest.starts_with(' ') || rest.starts_with('\t'))
    };
    if starts("ERROR") {
        Some(MessageKind::Error)
    } else if starts("WARNING") {
        Some(MessageKind::Warning)
    } else if starts("NOTICE") {
        Some(MessageKind::Notice)
    } else {
        None
    }
}

/// Parse the detail dialog's list lines. A line led by `ERROR`, `WARNING` or
/// `NOTICE` starts a message; other non-blank lines continue the last one.
pub fn parse_detailed_messages<S: AsRef<str>>(lines: &[S]) -> DetailedMessages {
    let mut out = DetailedMessages::default();
    let mut current: Option<MessageKind> = None;

    for line in lines.iter().map(|l| l.as_ref().trim()).filter(|l| !l.is_empty()) {
        if let Some(kind) = leading_kind(line) {
            out.list(kind).push(line.to_string());
            current = Some(kind);
            continue;
        }
        let Some(kind) = current else { continue };
        if let Some(last) = out.list(kind).last_mut() {
            last.push(' ');
            last.push_str(line);
        }
    }
    out
}

fn inline_message(line: &str) -> Option<(MessageKind, &str)> {
    if let Some(pos) = line.find(ERROR_MARKER) {
        return Some((MessageKind::Error, &line[pos + ERROR_MARKER.len()..]));
    }
    if let Some(pos) = line.find(WARNING_MARKER) {
        return Some((MessageKind::Warning, &line[pos + WARNING_MARKER.len()..]));
    }
    None
}

fn marker_value<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    line.find(marker).map(|pos| line[pos + marker.len()..].trim())
}

/// Text that belongs to the message above it.
fn is_continuation(raw: &str) -> bool {
    let text = raw.trim();
    !text.is_empty()
        && inline_message(text).is_none()
        && !text.contains(SECTION_DIVIDER)
        && !text.contains(SUMMARY_TOKEN)
        && !text.contains(SIZE_MARKER)
        && !text.contains(PROJECT_SIZE_MARKER)
}

/// Parse a free-text compile log (the main window's output pane) into `result`.
/// Messages are appended; counts come from the summary line and labelled fields.
pub fn parse_output(text: &str, result: &mut CompileResult) {
    let text = text.replace("\r\n", "\n");
    let lines: Vec<&str> = text.split('\n').collect();

    let mut i = 0;
    while i < lines.len() {
        let raw = lines[i];
        let line = raw.trim();
        i += 1;
        if line.is_empty() {
            continue;
        }

        if let Some((warnings, errors)) = parse_summary(line) {
            result.warnings = warnings;
            result.errors = errors;
            continue;
        }
        if let Some(v) = marker_value(line, PROJECT_SIZE_MARKER) {
            result.project_size = Some(v.to_string());
            continue;
        }
        if let Some(v) = marker_value(line, SIZE_MARKER) {
            result.size = Some(v.to_string());
            continue;
        }
        if apply_stat_line(line, result) {
            continue;
        }

        let Some((kind, first)) = inline_message(line) else { continue };
        let mut message = first.trim().to_string();
        let mut taken = 0;
        while taken < MAX_CONTINUATION_LINES && i < lines.len() {
            let next = lines[i];
            // A blank line ends the message
            if !is_continuation(next) {
                break;
            }
            if !message.is_empty() {
                message.push(' ');
            }
            message.push_str(next.trim());
            taken += 1;
            i += 1;
        }

        if message.is_empty() {
            continue;
        }
        match kind {
            MessageKind::Error => result.error_messages.push(message),
            MessageKind::Warning => result.warning_messages.push(message),
            MessageKind::Notice => result.notice_messages.push(message),
        }
    }
    result.update_has_errors();
}
