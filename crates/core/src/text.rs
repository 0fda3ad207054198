//! Artifact text model.
//!
//! Artifacts are single HTML documents with inline scripts. Checks that look
//! at script code run over a *code view*: a copy of the document with the same
//! byte length in which everything outside inline scripts, and every comment
//! and string literal inside them, is blanked with spaces. Newlines are kept,
//! so byte offsets and line numbers in the code view are those of the source,
//! and a pattern that only appears inside a string or a comment never matches.
//!
//! This is a lexical approximation, not a JavaScript parser. Regex literals
//! are not recognised, so a quote inside one can desynchronise the masking
//! until the end of the line.

use regex::{Captures, Regex};
use std::ops::Range;

use crate::finding::Location;

/// An inline `<script>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBlock {
    /// Byte range of the opening tag, `<script ...>`
    pub open_tag: Range<usize>,

    /// Byte range of the script body
    pub body: Range<usize>,

    /// Whether a matching `</script>` was found
    pub closed: bool,

    /// Whether the element has a `src` attribute
    pub external: bool,
}

/// Bracket balance of the script code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balance {
    /// Openers never closed
    pub unclosed: usize,

    /// Closers without an opener
    pub unexpected: usize,

    /// Offset of the first offending bracket
    pub first_offset: Option<usize>,
}

impl Balance {
    /// Whether every opener has its closer.
    pub fn is_balanced(&self) -> bool {
        self.unclosed == 0 && self.unexpected == 0
    }
}

/// Parsed view over an artifact's text.
#[derive(Debug, Clone)]
pub struct ArtifactText<'a> {
    source: &'a str,
    code: String,
    line_starts: Vec<usize>,
    scripts: Vec<ScriptBlock>,
    script_opens: usize,
    script_closes: usize,
}

impl<'a> ArtifactText<'a> {
    /// Parse a document.
    pub fn parse(source: &'a str) -> Self {
        let lower = source.to_ascii_lowercase();
        let scripts = find_scripts(&lower);
        let code = build_code_view(source, &scripts);

        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));

        Self {
            source,
            code,
            line_starts,
            script_opens: count_tag(&lower, "<script"),
            script_closes: count_tag(&lower, "</script"),
            scripts,
        }
    }

    /// The original text.
    pub fn source(&self) -> &'a str {
        self.source
    }

    /// The code view.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Inline script elements in document order.
    pub fn scripts(&self) -> &[ScriptBlock] {
        &self.scripts
    }

    /// Bodies of the inline scripts that carry code.
    pub fn script_sources(&self) -> Vec<&'a str> {
        self.scripts
            .iter()
            .filter(|s| !s.external && !self.source[s.body.clone()].trim().is_empty())
            .map(|s| &self.source[s.body.clone()])
            .collect()
    }

    /// Number of `<script` opening and `</script` closing tags.
    pub fn script_tag_counts(&self) -> (usize, usize) {
        (self.script_opens, self.script_closes)
    }

    /// 1-based line and column of a byte offset.
    pub fn location(&self, offset: usize) -> Location {
        let offset = offset.min(self.source.len());
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self.line_starts[line - 1];
        let column = self
            .source
            .get(line_start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(0)
            + 1;
        Location::at(line, column)
    }

    /// Locations of every match of `pattern` in the code view.
    pub fn find_in_code(&self, pattern: &Regex) -> Vec<Location> {
        pattern
            .find_iter(&self.code)
            .map(|m| self.location(m.start()))
            .collect()
    }

    /// Locations of every match of `pattern` in the raw document.
    pub fn find_in_source(&self, pattern: &Regex) -> Vec<Location> {
        pattern
            .find_iter(self.source)
            .map(|m| self.location(m.start()))
            .collect()
    }

    /// Balance of an opener/closer pair, checked per script block.
    pub fn balance(&self, open: char, close: char) -> Balance {
        let mut total = Balance::default();
        for script in &self.scripts {
            let block = self.block_balance(script, open, close);
            total.unclosed += block.unclosed;
            total.unexpected += block.unexpected;
            total.first_offset = match (total.first_offset, block.first_offset) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        total
    }

    /// Balance of an opener/closer pair inside one script block.
    pub fn block_balance(&self, script: &ScriptBlock, open: char, close: char) -> Balance {
        let mut balance = Balance::default();
        let mut stack: Vec<usize> = Vec::new();
        for (i, c) in self.code[script.body.clone()].char_indices() {
            let offset = script.body.start + i;
            if c == open {
                stack.push(offset);
            } else if c == close && stack.pop().is_none() {
                balance.unexpected += 1;
                balance.first_offset.get_or_insert(offset);
            }
        }
        if let Some(&first) = stack.first() {
            balance.unclosed = stack.len();
            balance.first_offset = Some(balance.first_offset.map_or(first, |o| o.min(first)));
        }
        balance
    }

    /// Offset of the `}` closing the block opened at `open`, if any.
    pub fn matching_close(&self, open: usize) -> Option<usize> {
        let bytes = self.code.as_bytes();
        if bytes.get(open) != Some(&b'{') {
            return None;
        }
        let mut depth = 0usize;
        for (i, &b) in bytes.iter().enumerate().skip(open) {
            match b {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// Offsets of unconditional loops whose body never breaks out.
    ///
    /// `pattern` must match a loop header up to and including its opening
    /// brace, see [`UNBOUNDED_LOOP_PATTERN`].
    pub fn unbounded_loops(&self, pattern: &Regex) -> Vec<usize> {
        pattern
            .find_iter(&self.code)
            .filter(|m| {
                let open = m.end() - 1;
                let close = self.matching_close(open).unwrap_or(self.code.len());
                let body = &self.code[open..close];
                !contains_word(body, "break") && !contains_word(body, "return") && !contains_word(body, "throw")
            })
            .map(|m| m.start())
            .collect()
    }

    /// Rewrite every code-view match of `pattern` in the source.
    ///
    /// Identifiers are never masked, so captures taken from the code view
    /// equal the source text at the same range.
    pub fn rewrite_code_matches<F>(&self, pattern: &Regex, mut replace: F) -> String
    where
        F: FnMut(&Captures<'_>) -> String,
    {
        let mut out = String::with_capacity(self.source.len() + 16);
        let mut last = 0;
        for caps in pattern.captures_iter(&self.code) {
            let Some(m) = caps.get(0) else { continue };
            out.push_str(&self.source[last..m.start()]);
            out.push_str(&replace(&caps));
            last = m.end();
        }
        out.push_str(&self.source[last..]);
        out
    }
}

/// Header of a `while (true) {` or `for (;;) {` loop.
pub const UNBOUNDED_LOOP_PATTERN: &str =
    r"\bwhile\s*\(\s*(?:true|1)\s*\)\s*\{|\bfor\s*\(\s*;\s*;\s*\)\s*\{";

/// Whether `word` occurs in `text` as a whole identifier.
pub fn contains_word(text: &str, word: &str) -> bool {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
    text.match_indices(word).any(|(i, _)| {
        let before = text[..i].chars().next_back();
        let after = text[i + word.len()..].chars().next();
        !before.map_or(false, is_ident) && !after.map_or(false, is_ident)
    })
}

fn count_tag(lower: &str, tag: &str) -> usize {
    lower
        .match_indices(tag)
        .filter(|(i, _)| {
            lower[i + tag.len()..]
                .chars()
                .next()
                .map_or(false, |c| c.is_ascii_whitespace() || c == '>' || c == '/')
        })
        .count()
}

fn find_scripts(lower: &str) -> Vec<ScriptBlock> {
    let mut scripts = Vec::new();
    let mut pos = 0;

    while let Some(rel) = lower[pos..].find("<script") {
        let tag_start = pos + rel;
        let after_name = tag_start + "<script".len();
        let boundary = lower[after_name..].chars().next();
        if !boundary.map_or(false, |c| c.is_ascii_whitespace() || c == '>' || c == '/') {
            pos = after_name;
            continue;
        }
        let Some(gt) = lower[after_name..].find('>') else {
            break;
        };
        let tag_end = after_name + gt + 1;
        let attrs = &lower[after_name..tag_end - 1];

        let (body_end, next_pos, closed) = match lower[tag_end..].find("</script") {
            Some(close) => {
                let close_start = tag_end + close;
                let close_end = lower[close_start..]
                    .find('>')
                    .map_or(lower.len(), |g| close_start + g + 1);
                (close_start, close_end, true)
            }
            None => (lower.len(), lower.len(), false),
        };

        if is_javascript(attrs) {
            scripts.push(ScriptBlock {
                open_tag: tag_start..tag_end,
                body: tag_end..body_end,
                closed,
                external: attrs.contains("src="),
            });
        }
        pos = next_pos;
    }
    scripts
}

fn is_javascript(attrs: &str) -> bool {
    let Some(idx) = attrs.find("type=") else {
        return true;
    };
    let value: String = attrs[idx + 5..]
        .trim_start_matches(['"', '\''])
        .chars()
        .take_while(|c| !matches!(c, '"' | '\'' | ' ' | '>'))
        .collect();
    value.is_empty()
        || value.contains("javascript")
        || value.contains("ecmascript")
        || value == "module"
}

#[derive(Clone, Copy, PartialEq)]
enum Lex {
    Code,
    LineComment,
    BlockComment,
    Str(char),
    Template,
}

fn build_code_view(source: &str, scripts: &[ScriptBlock]) -> String {
    let mut code = String::with_capacity(source.len());
    let mut cursor = 0;

    for script in scripts {
        blank_into(&mut code, &source[cursor..script.body.start]);
        mask_script(&mut code, &source[script.body.clone()]);
        cursor = script.body.end;
    }
    blank_into(&mut code, &source[cursor..]);
    code
}

fn blank_into(out: &mut String, text: &str) {
    for c in text.chars() {
        push_blank(out, c);
    }
}

fn push_blank(out: &mut String, c: char) {
    if c == '\n' {
        out.push('\n');
    } else {
        for _ in 0..c.len_utf8() {
            out.push(' ');
        }
    }
}

fn mask_script(out: &mut String, body: &str) {
    let mut state = Lex::Code;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            Lex::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    state = Lex::LineComment;
                    push_blank(out, c);
                }
                '/' if chars.peek() == Some(&'*') => {
                    state = Lex::BlockComment;
                    push_blank(out, c);
                    if let Some(star) = chars.next() {
                        push_blank(out, star);
                    }
                }
                '\'' | '"' => {
                    state = Lex::Str(c);
                    out.push(c);
                }
                '`' => {
                    state = Lex::Template;
                    out.push(c);
                }
                _ => out.push(c),
            },
            Lex::LineComment => {
                if c == '\n' {
                    state = Lex::Code;
                }
                push_blank(out, c);
            }
            Lex::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    push_blank(out, c);
                    if let Some(slash) = chars.next() {
                        push_blank(out, slash);
                    }
                    state = Lex::Code;
                } else {
                    push_blank(out, c);
                }
            }
            Lex::Str(quote) => {
                if c == '\\' {
                    push_blank(out, c);
                    if let Some(escaped) = chars.next() {
                        push_blank(out, escaped);
                    }
                } else if c == quote {
                    out.push(c);
                    state = Lex::Code;
                } else if c == '\n' {
                    // unterminated literal
                    out.push(c);
                    state = Lex::Code;
                } else {
                    push_blank(out, c);
                }
            }
            Lex::Template => {
                if c == '\\' {
                    push_blank(out, c);
                    if let Some(escaped) = chars.next() {
                        push_blank(out, escaped);
                    }
                } else if c == '`' {
                    out.push(c);
                    state = Lex::Code;
                } else {
                    push_blank(out, c);
                }
            }
        }
    }
}
