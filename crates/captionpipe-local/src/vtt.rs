//! Caption-text normalization.
//!
//! Small, deterministic and infallible: cue timing lines, sequence numbers,
//! markup tags and bracketed annotations are stripped, whitespace runs
//! collapse to single spaces. Callers treat an empty result as "cleaning
//! produced nothing" and fall back to the raw text.

use captionpipe_core::Cue;

/// Drop complete `<...>` spans within a line.
fn strip_markup(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        match rest[open..].find('>') {
            Some(close) => rest = &rest[open + close + 1..],
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Drop `[...]` and `(...)` annotation spans (sound effects, speaker notes).
/// Spans only count when closed on the same line.
fn strip_annotations(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.char_indices();
    while let Some((i, c)) = chars.next() {
        let close = match c {
            '[' => ']',
            '(' => ')',
            _ => {
                out.push(c);
                continue;
            }
        };
        match line[i..].find(close) {
            Some(rel) => {
                // Skip everything inside the span, including the brackets.
                let end = i + rel;
                while let Some((j, _)) = chars.next() {
                    if j >= end {
                        break;
                    }
                }
            }
            None => out.push(c),
        }
    }
    out
}

/// Remove opener characters left over after span stripping. A loose `<` on
/// one line must not pair up with a `>` on a later one once the lines are
/// joined, so the text survives but the bracket does not.
fn strip_loose_openers(line: &str) -> String {
    line.chars()
        .filter(|c| !matches!(c, '<' | '[' | '('))
        .collect()
}

fn is_header_or_meta(line: &str) -> bool {
    line.eq_ignore_ascii_case("webvtt")
        || line.starts_with("WEBVTT ")
        || line.starts_with("NOTE")
        || line.starts_with("STYLE")
        || line.starts_with("Kind:")
        || line.starts_with("Language:")
}

fn next_nonempty<'a>(lines: &[&'a str], from: usize) -> Option<&'a str> {
    lines[from..]
        .iter()
        .map(|l| l.trim())
        .find(|l| !l.is_empty())
}

/// Normalize raw caption text (WebVTT or already-plain) to clean prose.
///
/// Idempotent: the output is one line with no timing markers, no markup or
/// annotation spans, no opener brackets and no whitespace runs, so a second
/// pass is a no-op.
pub fn normalize(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let mut out = String::with_capacity(raw.len() / 2);
    for (idx, line) in lines.iter().enumerate() {
        let l = line.trim();
        if l.is_empty() {
            continue;
        }
        let cleaned = strip_loose_openers(&strip_annotations(&strip_markup(l)));
        let cleaned = cleaned.trim();
        // Headers and timing lines are checked after stripping so markup
        // cannot smuggle either shape past the filter.
        if cleaned.is_empty() || is_header_or_meta(cleaned) || cleaned.contains("-->") {
            continue;
        }
        // Cue sequence number: a digits-only line directly before a timing
        // line. Digits without that context are caption text.
        if cleaned.chars().all(|c| c.is_ascii_digit())
            && next_nonempty(&lines, idx + 1).is_some_and(|n| n.contains("-->"))
        {
            continue;
        }
        for token in cleaned.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(token);
        }
    }
    out
}

/// Join a structured-source cue list into clean prose.
pub fn cues_to_text(cues: &[Cue]) -> String {
    let joined = cues
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    normalize(&joined)
}

/// Clip to at most `max_chars` characters (not bytes).
pub fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars).collect()
}
