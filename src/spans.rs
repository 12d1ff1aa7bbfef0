//! Span tokenizer and reassembler.
//!
//! Splits raw chat message text into an ordered sequence of typed spans:
//! translatable plain text, and protected structure (code, spoilers,
//! mentions, emoji, links, timestamps) that must survive translation
//! byte-for-byte. Parsing is a single left-to-right scan, never fails, and
//! malformed markup degrades to plain text rather than being dropped.

use std::collections::HashMap;

/// The kind of a message span. Only `PlainText` is translatable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanKind {
    PlainText,
    CodeFence,
    InlineCode,
    Spoiler,
    BlockQuote,
    Mention,
    CustomEmoji,
    UnicodeEmoji,
    Link,
    Timestamp,
}

impl SpanKind {
    pub fn is_translatable(self) -> bool {
        self == SpanKind::PlainText
    }
}

/// A contiguous, typed region of the original text.
///
/// Spans are non-overlapping, ordered by offset, and their concatenation
/// reconstructs the original text exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub kind: SpanKind,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// The parsed form of one message. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    spans: Vec<Span>,
}

/// A plain-text span plus its positional index back into the parsed
/// message; the atomic item sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationUnit {
    pub span_index: usize,
    pub text: String,
}

impl ParsedMessage {
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// One unit per plain-text run. The scanner already produces maximal
    /// runs, so adjacent plain-text spans cannot occur.
    pub fn units(&self) -> Vec<TranslationUnit> {
        self.spans
            .iter()
            .enumerate()
            .filter(|(_, span)| span.kind.is_translatable())
            .map(|(index, span)| TranslationUnit {
                span_index: index,
                text: span.text.clone(),
            })
            .collect()
    }

    /// Concatenated translatable text, used by the language matcher.
    pub fn translatable_text(&self) -> String {
        self.spans
            .iter()
            .filter(|span| span.kind.is_translatable())
            .map(|span| span.text.as_str())
            .collect()
    }

    /// Concatenation of all spans in order; equals the original input.
    pub fn reconstruct(&self) -> String {
        self.spans.iter().map(|span| span.text.as_str()).collect()
    }
}

/// Tokenize raw message text. Total: every input produces a valid span
/// sequence whose concatenation is the input.
pub fn parse(raw: &str) -> ParsedMessage {
    let mut spans: Vec<Span> = Vec::new();
    let mut plain_start = 0usize;
    let mut i = 0usize;
    let bytes = raw.as_bytes();

    let mut flush_plain = |spans: &mut Vec<Span>, from: usize, to: usize| {
        if to > from {
            spans.push(Span {
                kind: SpanKind::PlainText,
                text: raw[from..to].to_string(),
                start: from,
                end: to,
            });
        }
    };

    while i < raw.len() {
        let rest = &raw[i..];
        let at_line_start = i == 0 || bytes[i - 1] == b'\n';

        let matched: Option<(usize, SpanKind)> = match bytes[i] {
            b'`' => match_code(rest),
            b'|' => match_spoiler(rest),
            b'>' if at_line_start => Some(match_block_quote(rest)),
            b'<' => match_angle_token(rest),
            b'[' => match_markdown_link(rest),
            b'h' | b'H' | b'w' | b'W' => match_url(rest),
            b if !b.is_ascii() => match_emoji_run(rest).map(|len| (len, SpanKind::UnicodeEmoji)),
            _ => None,
        };

        match matched {
            Some((len, kind)) => {
                flush_plain(&mut spans, plain_start, i);
                spans.push(Span {
                    kind,
                    text: rest[..len].to_string(),
                    start: i,
                    end: i + len,
                });
                i += len;
                plain_start = i;
            }
            None => {
                // Not a protected token here; the char stays plain text.
                i += rest.chars().next().map(char::len_utf8).unwrap_or(1);
            }
        }
    }
    flush_plain(&mut spans, plain_start, raw.len());

    ParsedMessage { spans }
}

/// Rebuild the final message: plain-text spans are replaced by their
/// translation (looked up by span index), everything else is emitted
/// verbatim. A unit with no translation keeps its original text.
pub fn reassemble(parsed: &ParsedMessage, translated: &HashMap<usize, String>) -> String {
    let mut out = String::new();
    for (index, span) in parsed.spans().iter().enumerate() {
        if span.kind.is_translatable() {
            match translated.get(&index) {
                Some(text) => out.push_str(text),
                None => out.push_str(&span.text),
            }
        } else {
            out.push_str(&span.text);
        }
    }
    out
}

/// Fenced code block (triple backtick) or inline code (single backtick).
/// Unterminated delimiters do not match: they revert to plain text.
fn match_code(rest: &str) -> Option<(usize, SpanKind)> {
    if let Some(after_fence) = rest.strip_prefix("```") {
        // Opaque through the matching close; no scanning resumes inside.
        return after_fence
            .find("```")
            .map(|pos| (3 + pos + 3, SpanKind::CodeFence));
    }
    // Inline code: closes at the next unescaped backtick on the same line,
    // content must be non-empty.
    let mut iter = rest[1..].char_indices();
    while let Some((off, c)) = iter.next() {
        match c {
            '`' if off > 0 => return Some((1 + off + 1, SpanKind::InlineCode)),
            '`' | '\n' => return None,
            '\\' => {
                iter.next();
            }
            _ => {}
        }
    }
    None
}

/// Spoiler: `||...||`, may span lines. Unterminated reverts to plain text.
fn match_spoiler(rest: &str) -> Option<(usize, SpanKind)> {
    let after = rest.strip_prefix("||")?;
    after.find("||").map(|pos| (2 + pos + 2, SpanKind::Spoiler))
}

/// Block quote marker at line start; the span runs to end of line
/// (exclusive of the newline, which stays plain text).
fn match_block_quote(rest: &str) -> (usize, SpanKind) {
    let end = rest.find('\n').unwrap_or(rest.len());
    (end, SpanKind::BlockQuote)
}

/// Structured angle tokens: mentions `<@id>` / `<@!id>` / `<@&id>` / `<#id>`,
/// custom emoji `<:name:id>` / `<a:name:id>`, timestamps `<t:epoch[:format]>`.
/// Each is one atomic, non-splittable unit.
fn match_angle_token(rest: &str) -> Option<(usize, SpanKind)> {
    let inner = &rest[1..];

    // Timestamp: <t:digits> or <t:digits:F> with F in tTdDfFR
    if let Some(after) = inner.strip_prefix("t:") {
        let digits = count_digits(after);
        if digits > 0 {
            let tail = &after[digits..];
            if tail.starts_with('>') {
                return Some((1 + 2 + digits + 1, SpanKind::Timestamp));
            }
            let mut chars = tail.chars();
            if chars.next() == Some(':') {
                if let Some(style) = chars.next() {
                    if "tTdDfFR".contains(style) && chars.next() == Some('>') {
                        return Some((1 + 2 + digits + 3, SpanKind::Timestamp));
                    }
                }
            }
        }
        return None;
    }

    // Custom emoji: <:name:id> or <a:name:id>
    let (animated, emoji_body) = match inner.strip_prefix("a:") {
        Some(body) => (true, body),
        None => (false, inner.strip_prefix(':').unwrap_or("")),
    };
    if animated || inner.starts_with(':') {
        let name_len = emoji_body
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_' || *b == b'~')
            .count();
        if name_len > 0 {
            let after_name = &emoji_body[name_len..];
            if let Some(after_colon) = after_name.strip_prefix(':') {
                let digits = count_digits(after_colon);
                if digits > 0 && after_colon[digits..].starts_with('>') {
                    let prefix = if animated { 3 } else { 2 };
                    return Some((prefix + name_len + 1 + digits + 1, SpanKind::CustomEmoji));
                }
            }
        }
        return None;
    }

    // Mentions: <@id>, <@!id>, <@&id>, <#id>
    let after_sigil = match inner.as_bytes().first() {
        Some(b'@') => {
            let body = &inner[1..];
            match body.as_bytes().first() {
                Some(b'!') | Some(b'&') => Some((3, &body[1..])),
                _ => Some((2, body)),
            }
        }
        Some(b'#') => Some((2, &inner[1..])),
        _ => None,
    };
    if let Some((prefix_len, body)) = after_sigil {
        let digits = count_digits(body);
        if digits > 0 && body[digits..].starts_with('>') {
            return Some((prefix_len + digits + 1, SpanKind::Mention));
        }
    }
    None
}

/// Markdown link `[label](url)`: label non-empty without `]`, url non-empty
/// without whitespace or `)`.
fn match_markdown_link(rest: &str) -> Option<(usize, SpanKind)> {
    let close = rest.find(']')?;
    if close < 2 {
        return None;
    }
    let after = &rest[close + 1..];
    let url_part = after.strip_prefix('(')?;
    for (off, c) in url_part.char_indices() {
        if c == ')' {
            if off == 0 {
                return None;
            }
            return Some((close + 2 + off + 1, SpanKind::Link));
        }
        if c.is_whitespace() {
            return None;
        }
    }
    None
}

/// Bare URL: scheme-prefixed or www-prefixed, running to the next
/// whitespace.
fn match_url(rest: &str) -> Option<(usize, SpanKind)> {
    let prefix_len = if starts_with_ignore_case(rest, "https://") {
        8
    } else if starts_with_ignore_case(rest, "http://") {
        7
    } else if starts_with_ignore_case(rest, "www.") {
        4
    } else {
        return None;
    };
    let end = rest
        .char_indices()
        .find(|(_, c)| c.is_whitespace())
        .map(|(idx, _)| idx)
        .unwrap_or(rest.len());
    if end > prefix_len {
        Some((end, SpanKind::Link))
    } else {
        None
    }
}

/// A run of Unicode emoji, including variation selectors and ZWJ joins.
fn match_emoji_run(rest: &str) -> Option<usize> {
    let first = rest.chars().next()?;
    if !is_emoji_char(first) {
        return None;
    }
    let mut end = first.len_utf8();
    loop {
        let tail = &rest[end..];
        let mut chars = tail.chars();
        match chars.next() {
            Some(c) if is_emoji_char(c) || c == '\u{FE0F}' => {
                end += c.len_utf8();
            }
            Some(c) if c == '\u{200D}' => {
                // Joiner only glues two emoji; a dangling joiner stays plain.
                match chars.next() {
                    Some(next) if is_emoji_char(next) => {
                        end += c.len_utf8() + next.len_utf8();
                    }
                    _ => break,
                }
            }
            _ => break,
        }
    }
    Some(end)
}

fn is_emoji_char(c: char) -> bool {
    matches!(c as u32,
        0x1F300..=0x1F5FF  // symbols & pictographs
        | 0x1F600..=0x1F64F  // emoticons
        | 0x1F680..=0x1F6FF  // transport
        | 0x1F900..=0x1F9FF  // supplemental symbols
        | 0x1FA70..=0x1FAFF  // extended-A
        | 0x2600..=0x26FF    // misc symbols
        | 0x2700..=0x27BF    // dingbats
        | 0x1F1E6..=0x1F1FF  // regional indicators
    )
}

fn count_digits(s: &str) -> usize {
    s.bytes().take_while(|b| b.is_ascii_digit()).count()
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}
