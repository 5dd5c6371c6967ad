//! Directive extraction from free-form model output.
//!
//! Model output may wrap reasoning in `<think>` blocks, narrate before acting,
//! or emit several directive-looking spans while it corrects itself. The parser
//! strips reasoning, scans for `TOOL:` / `FINAL_ANSWER:` markers, and keeps the
//! last well-formed span. Output without any span maps to [`DEFAULT_DIRECTIVE`].

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{Directive, ToolName, normalize_newlines};

/// Directive substituted when the output contains no directive span.
pub const DEFAULT_DIRECTIVE: &str = "TOOL: run_python";

const TOOL_MARKER: &str = "tool:";
const FINAL_MARKER: &str = "final_answer:";
const FINAL_PREFIX: &str = "FINAL_ANSWER:";

static REASONING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<think>.*?</think>").expect("reasoning pattern should be valid")
});

/// The authoritative directive text of one completion and its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDirective {
    /// Trimmed, LF-normalized span text (what gets recorded in the transcript).
    pub text: String,
    pub directive: Directive,
}

/// Parse raw model output into exactly one directive.
pub fn parse_directive(raw: &str) -> ParsedDirective {
    let text = select_span(raw).unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string());
    let directive = classify(&text);
    ParsedDirective { text, directive }
}

/// Return the last directive span in `raw`, trimmed and LF-normalized.
pub fn select_span(raw: &str) -> Option<String> {
    let stripped = strip_reasoning(raw);
    let spans = scan_spans(&stripped);
    spans
        .last()
        .map(|span| normalize_newlines(stripped[span.clone()].trim()))
}

fn strip_reasoning(raw: &str) -> String {
    REASONING_RE.replace_all(raw, "").into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Tool,
    Final,
}

#[derive(Debug, Clone, Copy)]
struct Marker {
    start: usize,
    end: usize,
    kind: MarkerKind,
}

/// Locate every marker occurrence (case-insensitive), in text order.
fn find_markers(lower: &str) -> Vec<Marker> {
    let mut markers: Vec<Marker> = Vec::new();
    for (needle, kind) in [(TOOL_MARKER, MarkerKind::Tool), (FINAL_MARKER, MarkerKind::Final)] {
        markers.extend(lower.match_indices(needle).map(|(start, _)| Marker {
            start,
            end: start + needle.len(),
            kind,
        }));
    }
    markers.sort_by_key(|marker| marker.start);
    markers
}

/// Split `text` into non-overlapping directive spans.
///
/// A span opens at `FINAL_ANSWER:` or at `TOOL:` followed by an allowed tool
/// name, and runs until the next marker after its head (valid or not) or the
/// end of the text.
fn scan_spans(text: &str) -> Vec<Range<usize>> {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();
    let markers = find_markers(&lower);

    let mut spans = Vec::new();
    let mut cursor = 0usize;
    for marker in &markers {
        if marker.start < cursor {
            continue;
        }
        let head_end = match marker.kind {
            MarkerKind::Final => Some(marker.end),
            MarkerKind::Tool => tool_head_end(&lower, marker.end),
        };
        let Some(head_end) = head_end else {
            continue;
        };
        let end = markers
            .iter()
            .find(|next| next.start >= head_end)
            .map_or(text.len(), |next| next.start);
        spans.push(marker.start..end);
        cursor = end;
    }
    spans
}

/// End offset of `<whitespace><tool name>` starting at `from`, if present.
fn tool_head_end(lower: &str, from: usize) -> Option<usize> {
    let rest = &lower[from..];
    let name_start = from + (rest.len() - rest.trim_start().len());
    let candidate = &lower[name_start..];
    ToolName::ALL
        .iter()
        .map(|tool| tool.as_str())
        .find(|name| candidate.starts_with(name))
        .map(|name| name_start + name.len())
}

fn canonical(tool: ToolName) -> String {
    format!("TOOL: {}", tool.as_str())
}

/// Map selected span text onto a directive. Accepted forms are exact.
fn classify(text: &str) -> Directive {
    if let Some(status) = text.strip_prefix(FINAL_PREFIX) {
        return Directive::FinalAnswer {
            status: status.trim().to_string(),
        };
    }
    if let Some(rest) = text.strip_prefix(canonical(ToolName::SetCode).as_str()) {
        return Directive::ReplaceCode {
            body: extract_code_payload(rest),
        };
    }
    if text == canonical(ToolName::RunPython) {
        return Directive::RunTests;
    }
    if text == canonical(ToolName::InspectTraceback) {
        return Directive::InspectFailure;
    }
    Directive::Malformed {
        text: text.to_string(),
    }
}

/// Extract the replacement program from the text following `TOOL: set_code`.
///
/// Preference: `<code>…</code>`, then a fenced block, then the raw remainder.
pub fn extract_code_payload(rest: &str) -> String {
    let body = normalize_newlines(rest);
    if let Some(code) = between_code_tags(&body) {
        return code.trim().to_string();
    }
    if let Some(code) = fenced_block(&body) {
        return code.trim().to_string();
    }
    body.trim().to_string()
}

/// Text between the first `<code>` and the last `</code>`.
fn between_code_tags(body: &str) -> Option<&str> {
    let lower = body.to_ascii_lowercase();
    let start = lower.find("<code>")? + "<code>".len();
    let close = lower.rfind("</code>")?;
    (close >= start).then(|| &body[start..close])
}

/// Contents of the first ```` ```lang\n…\n``` ```` fence; the language tag is optional.
fn fenced_block(body: &str) -> Option<&str> {
    for (fence, _) in body.match_indices("```") {
        let after = fence + 3;
        let tag_len = body[after..]
            .find(|ch: char| !(ch.is_ascii_alphanumeric() || matches!(ch, '_' | '+' | '-')))
            .unwrap_or(body.len() - after);
        let newline = after + tag_len;
        if !body[newline..].starts_with('\n') {
            continue;
        }
        let content_start = newline + 1;
        if let Some(close) = body[content_start..].find("\n```") {
            return Some(&body[content_start..content_start + close]);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_span_yields_default_run_tests() {
        let parsed = parse_directive("I think the bug is an off-by-one.");
        assert_eq!(parsed.text, DEFAULT_DIRECTIVE);
        assert_eq!(parsed.directive, Directive::RunTests);
    }

    #[test]
    fn empty_output_yields_default() {
        assert_eq!(parse_directive("").directive, Directive::RunTests);
    }

    #[test]
    fn last_span_wins() {
        let raw = "TOOL: run_python\nactually, wait.\nTOOL: inspect_traceback\n";
        let parsed = parse_directive(raw);
        assert_eq!(parsed.text, "TOOL: inspect_traceback");
        assert_eq!(parsed.directive, Directive::InspectFailure);
    }

    #[test]
    fn final_answer_after_tool_wins() {
        let parsed = parse_directive("TOOL: run_python\nFINAL_ANSWER: All tests pass");
        assert_eq!(
            parsed.directive,
            Directive::FinalAnswer {
                status: "All tests pass".to_string()
            }
        );
    }

    #[test]
    fn reasoning_block_is_ignored_even_with_directives_inside() {
        let raw = "<think>TOOL: set_code\n<code>bad</code>\nFINAL_ANSWER: nope</think>\nTOOL: run_python";
        let parsed = parse_directive(raw);
        assert_eq!(parsed.text, "TOOL: run_python");
        assert!(!parsed.text.contains("nope"));
    }

    #[test]
    fn reasoning_only_output_falls_back_to_default() {
        let parsed = parse_directive("<THINK>\nFINAL_ANSWER: TESTS_PASS\n</Think>");
        assert_eq!(parsed.text, DEFAULT_DIRECTIVE);
    }

    #[test]
    fn span_is_trimmed_and_crlf_normalized() {
        let raw = "  TOOL: set_code\r\n<code>\r\ndef f():\r\n    return 1\r\n</code>\r\n  ";
        let parsed = parse_directive(raw);
        assert_eq!(
            parsed.text,
            "TOOL: set_code\n<code>\ndef f():\n    return 1\n</code>"
        );
        assert_eq!(
            parsed.directive,
            Directive::ReplaceCode {
                body: "def f():\n    return 1".to_string()
            }
        );
    }

    #[test]
    fn unknown_tool_name_is_not_a_span_but_still_terminates_the_previous_one() {
        let raw = "FINAL_ANSWER: done TOOL: delete_everything";
        let parsed = parse_directive(raw);
        assert_eq!(parsed.text, "FINAL_ANSWER: done");
    }

    #[test]
    fn only_unknown_tools_fall_back_to_default() {
        let parsed = parse_directive("TOOL: rm_rf\nTOOL: curl");
        assert_eq!(parsed.text, DEFAULT_DIRECTIVE);
    }

    #[test]
    fn markers_match_case_insensitively_but_forms_are_exact() {
        let parsed = parse_directive("tool: RUN_PYTHON");
        assert_eq!(parsed.text, "tool: RUN_PYTHON");
        assert_eq!(
            parsed.directive,
            Directive::Malformed {
                text: "tool: RUN_PYTHON".to_string()
            }
        );
    }

    #[test]
    fn trailing_prose_after_run_python_is_malformed() {
        let parsed = parse_directive("TOOL: run_python please");
        assert!(matches!(parsed.directive, Directive::Malformed { .. }));
    }

    #[test]
    fn set_code_prefers_code_tags_over_fences() {
        let raw = "TOOL: set_code\n```python\nfenced\n```\n<code>\ntagged\n</code>";
        let parsed = parse_directive(raw);
        assert_eq!(
            parsed.directive,
            Directive::ReplaceCode {
                body: "tagged".to_string()
            }
        );
    }

    #[test]
    fn set_code_spans_from_first_open_to_last_close_tag() {
        let body = extract_code_payload("\n<code>\na = '<code>'\nb = '</code>'\n</code>\n");
        assert_eq!(body, "a = '<code>'\nb = '</code>'");
    }

    #[test]
    fn set_code_accepts_fence_with_any_language_tag() {
        let body = extract_code_payload("\n```py3\ndef g():\n    return 2\n```\n");
        assert_eq!(body, "def g():\n    return 2");
        let body = extract_code_payload("\n```\nx = 1\n```");
        assert_eq!(body, "x = 1");
    }

    #[test]
    fn set_code_falls_back_to_raw_remainder() {
        let body = extract_code_payload("\ndef h():\n    return 3\n");
        assert_eq!(body, "def h():\n    return 3");
    }

    #[test]
    fn set_code_payload_may_contain_lowercase_markers_from_code() {
        // A `tool:` inside the payload ends the span; only the head survives.
        let parsed = parse_directive("TOOL: set_code\n<code>\nx = 'tool: run_python'\n</code>");
        assert_eq!(parsed.text, "tool: run_python'\n</code>");
        assert!(matches!(parsed.directive, Directive::Malformed { .. }));
    }

    #[test]
    fn adjacent_spans_without_separator_split_cleanly() {
        let raw = "TOOL: run_pythonTOOL: inspect_traceback";
        assert_eq!(scan_spans(raw), vec![0..16, 16..raw.len()]);
    }

    #[test]
    fn non_ascii_text_keeps_offsets_aligned() {
        let parsed = parse_directive("héllo — FINAL_ANSWER: TESTS_PASS ✓");
        assert_eq!(parsed.text, "FINAL_ANSWER: TESTS_PASS ✓");
    }
}
