//! Python source normalization.
//!
//! Removes `#` comments outside string literals, strips trailing whitespace,
//! and expands leading tabs. Lines are never removed: a comment-only line
//! becomes an empty line, so line numbers found during extraction stay valid
//! against the cleaned text.
//!
//! Also computes a rough cyclomatic-style complexity score (one plus the
//! number of decision keywords in code) and the percentage by which the
//! text shrank.

use crate::models::CodeFile;

const TAB_WIDTH: usize = 4;

const DECISION_KEYWORDS: &[&str] = &[
    "if", "elif", "for", "while", "except", "with", "and", "or", "assert", "case", "lambda",
];

/// Result of preprocessing one source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessed {
    pub cleaned: String,
    pub complexity_score: u32,
    pub reduction_percentage: f64,
}

#[derive(Clone, Copy, PartialEq)]
enum State {
    Code,
    Comment,
    Str { quote: char, triple: bool },
}

/// Preprocess `source`. With `remove_comments = false` only whitespace is
/// normalized; the complexity score still ignores comments.
pub fn preprocess(source: &str, remove_comments: bool) -> Preprocessed {
    let (with_comments_stripped, code_only) = scan(source);
    let body = if remove_comments {
        with_comments_stripped
    } else {
        source.to_string()
    };

    let cleaned = body
        .lines()
        .map(normalize_line)
        .collect::<Vec<_>>()
        .join("\n");

    Preprocessed {
        complexity_score: complexity(&code_only),
        reduction_percentage: reduction(source.len(), cleaned.len()),
        cleaned,
    }
}

/// Apply [`preprocess`] to an extracted file in place.
pub fn preprocess_file(file: &mut CodeFile, remove_comments: bool) {
    let result = preprocess(&file.source, remove_comments);
    file.cleaned_source = Some(result.cleaned);
    file.complexity_score = result.complexity_score;
    file.reduction_percentage = result.reduction_percentage;
}

/// Walk the source once, returning (source without comments, source with
/// both comments and string contents blanked out).
fn scan(source: &str) -> (String, String) {
    let chars: Vec<char> = source.chars().collect();
    let mut stripped = String::with_capacity(source.len());
    let mut code_only = String::with_capacity(source.len());
    let mut state = State::Code;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match state {
            State::Code => match c {
                '#' => {
                    state = State::Comment;
                    i += 1;
                }
                '"' | '\'' => {
                    let triple = i + 2 < chars.len() && chars[i + 1] == c && chars[i + 2] == c;
                    let width = if triple { 3 } else { 1 };
                    for _ in 0..width {
                        stripped.push(c);
                        code_only.push(' ');
                    }
                    state = State::Str { quote: c, triple };
                    i += width;
                }
                _ => {
                    stripped.push(c);
                    code_only.push(c);
                    i += 1;
                }
            },
            State::Comment => {
                if c == '\n' {
                    stripped.push('\n');
                    code_only.push('\n');
                    state = State::Code;
                }
                i += 1;
            }
            State::Str { quote, triple } => {
                if c == '\\' && i + 1 < chars.len() {
                    stripped.push(c);
                    stripped.push(chars[i + 1]);
                    code_only.push(' ');
                    code_only.push(if chars[i + 1] == '\n' { '\n' } else { ' ' });
                    i += 2;
                    continue;
                }
                let closes = if triple {
                    c == quote
                        && i + 2 < chars.len()
                        && chars[i + 1] == quote
                        && chars[i + 2] == quote
                } else {
                    c == quote
                };
                if closes {
                    let width = if triple { 3 } else { 1 };
                    for _ in 0..width {
                        stripped.push(c);
                        code_only.push(' ');
                    }
                    state = State::Code;
                    i += width;
                } else {
                    // An unterminated single-quoted string ends at the line break.
                    if c == '\n' && !triple {
                        state = State::Code;
                    }
                    stripped.push(c);
                    code_only.push(if c == '\n' { '\n' } else { ' ' });
                    i += 1;
                }
            }
        }
    }

    (stripped, code_only)
}

fn normalize_line(line: &str) -> String {
    let trimmed = line.trim_end();
    let indent_len = trimmed.len() - trimmed.trim_start_matches([' ', '\t']).len();
    let (indent, rest) = trimmed.split_at(indent_len);
    let mut out = String::with_capacity(trimmed.len());
    for c in indent.chars() {
        if c == '\t' {
            out.push_str(&" ".repeat(TAB_WIDTH));
        } else {
            out.push(c);
        }
    }
    out.push_str(rest);
    out
}

fn complexity(code_only: &str) -> u32 {
    let decisions = code_only
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| DECISION_KEYWORDS.contains(word))
        .count();
    1 + decisions as u32
}

fn reduction(original: usize, cleaned: usize) -> f64 {
    if original == 0 {
        return 0.0;
    }
    let pct = (original as f64 - cleaned as f64) / original as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}
