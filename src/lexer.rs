// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use alloc::rc::Rc;
use core::cmp;
use core::fmt::{self, Debug, Formatter};
use core::iter::Peekable;
use core::str::CharIndices;

use anyhow::{anyhow, bail, Result};

#[derive(Clone)]
struct SourceInternal {
    pub file: String,
    pub contents: String,
    pub lines: Vec<(u32, u32)>,
}

#[derive(Clone)]
pub struct Source {
    src: Rc<SourceInternal>,
}

impl cmp::Ord for Source {
    fn cmp(&self, other: &Source) -> cmp::Ordering {
        Rc::as_ptr(&self.src).cmp(&Rc::as_ptr(&other.src))
    }
}

impl cmp::PartialOrd for Source {
    fn partial_cmp(&self, other: &Source) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl cmp::PartialEq for Source {
    fn eq(&self, other: &Source) -> bool {
        Rc::as_ptr(&self.src) == Rc::as_ptr(&other.src)
    }
}

impl cmp::Eq for Source {}

impl Debug for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        self.src.file.fmt(f)
    }
}

impl Source {
    pub fn from_contents(file: String, contents: String) -> Result<Source> {
        let max_size = u32::MAX as usize - 2; // Account for rows, cols possibly starting at 1, EOF etc.
        if contents.len() > max_size {
            bail!("{file} exceeds maximum allowed source file size {max_size}");
        }
        let mut lines = vec![];
        let mut prev_ch = ' ';
        let mut prev_pos = 0u32;
        let mut start = 0u32;
        for (i, ch) in contents.char_indices() {
            if ch == '\n' {
                let end = match prev_ch {
                    '\r' => prev_pos,
                    _ => i as u32,
                };
                lines.push((start, end));
                start = i as u32 + 1;
            }
            prev_ch = ch;
            prev_pos = i as u32;
        }

        if (start as usize) < contents.len() {
            lines.push((start, contents.len() as u32));
        } else if contents.is_empty() {
            lines.push((0, 0));
        } else {
            let s = (contents.len() - 1) as u32;
            lines.push((s, s));
        }
        Ok(Self {
            src: Rc::new(SourceInternal {
                file,
                contents,
                lines,
            }),
        })
    }

    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Source> {
        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => bail!("Failed to read {}. {e}", path.as_ref().display()),
        };
        Self::from_contents(path.as_ref().to_string_lossy().to_string(), contents)
    }

    pub fn file(&self) -> &String {
        &self.src.file
    }

    pub fn contents(&self) -> &String {
        &self.src.contents
    }

    pub fn line(&self, idx: u32) -> &str {
        let idx = idx as usize;
        if idx < self.src.lines.len() {
            let (start, end) = self.src.lines[idx];
            &self.src.contents[start as usize..end as usize]
        } else {
            ""
        }
    }

    /// Byte offset of a 1-based line and column, clamped to the line end.
    pub fn offset_of(&self, line: u32, col: u32) -> Option<u32> {
        let (start, end) = *self.src.lines.get(line.checked_sub(1)? as usize)?;
        Some(cmp::min(start + col.saturating_sub(1), end))
    }

    pub fn message(&self, line: u32, col: u32, kind: &str, msg: &str) -> String {
        if line as usize > self.src.lines.len() {
            return format!("{}: invalid line {} specified", self.src.file, line);
        }

        let line_str = format!("{line}");
        let line_num_width = line_str.len() + 1;
        let col_spaces = (col as usize).saturating_sub(1);

        format!(
            "\n--> {}:{}:{}\n{:<line_num_width$}|\n\
		{:<line_num_width$}| {}\n\
		{:<line_num_width$}| {:<col_spaces$}^\n\
		{}: {}",
            self.src.file,
            line,
            col,
            "",
            line,
            self.line(line.saturating_sub(1)),
            "",
            "",
            kind,
            msg
        )
    }

    pub fn error(&self, line: u32, col: u32, msg: &str) -> anyhow::Error {
        anyhow!(self.message(line, col, "error", msg))
    }
}

#[derive(Clone)]
pub struct Span {
    pub source: Source,
    pub line: u32,
    pub col: u32,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn text(&self) -> &str {
        &self.source.contents()[self.start as usize..self.end as usize]
    }

    pub fn message(&self, kind: &str, msg: &str) -> String {
        self.source.message(self.line, self.col, kind, msg)
    }

    pub fn error(&self, msg: &str) -> anyhow::Error {
        self.source.error(self.line, self.col, msg)
    }

    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset <= self.end
    }
}

impl Debug for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        let t = self.text().escape_debug().to_string();
        let max = 32;
        let (txt, trailer) = if t.len() > max {
            (&t[0..max], "...")
        } else {
            (t.as_str(), "")
        };

        f.write_fmt(format_args!(
            "{}:{}:{}:{}, \"{}{}\"",
            self.line, self.col, self.start, self.end, txt, trailer
        ))
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum TokenKind {
    Symbol,
    /// Quoted string. The span covers the quotes.
    String,
    Number,
    Ident,
    /// `$name`. The span covers the sigil.
    Variable,
    /// `/** ... */`
    DocComment,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Token(pub TokenKind, pub Span);

// Longest symbols first.
const SYMBOLS: [&str; 47] = [
    "<=>", "===", "!==", "??=", "...", "?->", "**=", "==", "!=", "<>", "<=", ">=", "&&", "||",
    "??", "->", "=>", "::", "++", "--", ".=", "+=", "-=", "*=", "/=", "%=", "|=", "&=", "**", "{",
    "}", "[", "]", "(", ")", ";", ",", ".", "+", "-", "*", "/", "%", "=", "<", ">", "!",
];

const SINGLE_SYMBOLS: [char; 7] = ['?', ':', '&', '|', '^', '~', '@'];

#[derive(Clone)]
pub struct Lexer<'source> {
    source: Source,
    iter: Peekable<CharIndices<'source>>,
    line: u32,
    col: u32,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source Source) -> Self {
        let mut lexer = Self {
            source: source.clone(),
            iter: source.contents().char_indices().peekable(),
            line: 1,
            col: 1,
        };
        lexer.skip_open_tag();
        lexer
    }

    fn peek(&mut self) -> (usize, char) {
        match self.iter.peek() {
            Some((index, chr)) => (*index, *chr),
            _ => (self.source.contents().len(), '\x00'),
        }
    }

    fn peekahead(&mut self, n: usize) -> (usize, char) {
        match self.iter.clone().nth(n) {
            Some((index, chr)) => (index, chr),
            _ => (self.source.contents().len(), '\x00'),
        }
    }

    fn rest(&mut self) -> &str {
        let start = self.peek().0;
        &self.source.contents()[start..]
    }

    fn advance(&mut self) -> char {
        match self.iter.next() {
            Some((_, '\n')) => {
                self.line += 1;
                self.col = 1;
                '\n'
            }
            Some((_, '\t')) => {
                self.col += 4;
                '\t'
            }
            Some((_, ch)) => {
                self.col += 1;
                ch
            }
            None => '\x00',
        }
    }

    fn skip_open_tag(&mut self) {
        let contents = self.source.contents().clone();
        let trimmed = contents.trim_start();
        if trimmed.starts_with("<?php") {
            let skip = contents.len() - trimmed.len() + "<?php".len();
            while self.peek().0 < skip {
                self.advance();
            }
        }
    }

    fn span(&self, line: u32, col: u32, start: usize, end: usize) -> Span {
        Span {
            source: self.source.clone(),
            line,
            col,
            start: start as u32,
            end: end as u32,
        }
    }

    fn read_ident(&mut self, kind: TokenKind) -> Result<Token> {
        let (start, _) = self.peek();
        let (line, col) = (self.line, self.col);
        if kind == TokenKind::Variable {
            self.advance();
        }
        loop {
            let ch = self.peek().1;
            if ch.is_ascii_alphanumeric() || ch == '_' || ch == '\\' || !ch.is_ascii() {
                self.advance();
            } else {
                break;
            }
        }
        let end = self.peek().0;
        if kind == TokenKind::Variable && end == start + 1 {
            return Err(self.source.error(line, col, "expecting variable name after `$`"));
        }
        Ok(Token(kind, self.span(line, col, start, end)))
    }

    fn read_digits(&mut self) {
        while self.peek().1.is_ascii_digit() || self.peek().1 == '_' {
            self.advance();
        }
    }

    fn read_number(&mut self) -> Result<Token> {
        let (start, _) = self.peek();
        let (line, col) = (self.line, self.col);

        if self.peek().1 == '0' && matches!(self.peekahead(1).1, 'x' | 'X' | 'b' | 'B') {
            self.advance();
            self.advance();
            while self.peek().1.is_ascii_hexdigit() || self.peek().1 == '_' {
                self.advance();
            }
        } else {
            self.read_digits();

            // . must be followed by at least 1 digit to be a fraction,
            // otherwise it is the concatenation operator.
            if self.peek().1 == '.' && self.peekahead(1).1.is_ascii_digit() {
                self.advance();
                self.read_digits();
            }

            let ch = self.peek().1;
            if ch == 'e' || ch == 'E' {
                self.advance();
                if matches!(self.peek().1, '+' | '-') {
                    self.advance();
                }
                self.read_digits();
            }
        }

        let end = self.peek().0;
        let ch = self.peek().1;
        if ch == '_' || ch.is_ascii_alphabetic() {
            return Err(self.source.error(self.line, self.col, "invalid number"));
        }

        Ok(Token(TokenKind::Number, self.span(line, col, start, end)))
    }

    fn read_string(&mut self) -> Result<Token> {
        let (start, quote) = self.peek();
        let (line, col) = (self.line, self.col);
        self.advance();
        loop {
            match self.peek().1 {
                '\\' => {
                    self.advance();
                    self.advance();
                }
                '\x00' if self.peek().0 >= self.source.contents().len() => {
                    return Err(self.source.error(line, col, &format!("unmatched {quote}")));
                }
                ch if ch == quote => {
                    self.advance();
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }
        let end = self.peek().0;
        Ok(Token(TokenKind::String, self.span(line, col, start, end)))
    }

    // Returns a doc comment token when one is found.
    fn skip_ws(&mut self) -> Result<Option<Token>> {
        loop {
            match self.peek().1 {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                // Comments and single line attributes.
                '#' => self.skip_line(),
                '/' if self.peekahead(1).1 == '/' => self.skip_line(),
                '/' if self.peekahead(1).1 == '*' => {
                    let (start, _) = self.peek();
                    let (line, col) = (self.line, self.col);
                    let is_doc = self.peekahead(2).1 == '*' && self.peekahead(3).1 != '/';
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek().1 {
                            '*' if self.peekahead(1).1 == '/' => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            '\x00' if self.peek().0 >= self.source.contents().len() => {
                                return Err(self.source.error(line, col, "unterminated comment"));
                            }
                            _ => {
                                self.advance();
                            }
                        }
                    }
                    if is_doc {
                        let end = self.peek().0;
                        return Ok(Some(Token(
                            TokenKind::DocComment,
                            self.span(line, col, start, end),
                        )));
                    }
                }
                '?' if self.peekahead(1).1 == '>' => {
                    // Closing tag. Inline html after it is skipped up to the next open tag.
                    self.advance();
                    self.advance();
                    match self.rest().find("<?php") {
                        Some(pos) => {
                            let target = self.peek().0 + pos + "<?php".len();
                            while self.peek().0 < target {
                                self.advance();
                            }
                        }
                        None => {
                            while self.peek().0 < self.source.contents().len() {
                                self.advance();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(None)
    }

    fn skip_line(&mut self) {
        loop {
            match self.peek().1 {
                '\n' | '\x00' => break,
                _ => {
                    self.advance();
                }
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token> {
        if let Some(doc) = self.skip_ws()? {
            return Ok(doc);
        }

        let (start, chr) = self.peek();
        let (line, col) = (self.line, self.col);

        if start >= self.source.contents().len() {
            return Ok(Token(TokenKind::Eof, self.span(line, col, start, start)));
        }

        match chr {
            '$' if self.peekahead(1).1.is_ascii_alphabetic() || self.peekahead(1).1 == '_' => {
                self.read_ident(TokenKind::Variable)
            }
            '\'' | '"' => self.read_string(),
            '.' if self.peekahead(1).1.is_ascii_digit() => self.read_number(),
            _ if chr.is_ascii_digit() => self.read_number(),
            _ if chr.is_ascii_alphabetic() || chr == '_' || chr == '\\' || !chr.is_ascii() => {
                self.read_ident(TokenKind::Ident)
            }
            _ => {
                let len = SYMBOLS
                    .iter()
                    .find(|s| self.rest().starts_with(*s))
                    .map(|s| s.len())
                    .or_else(|| SINGLE_SYMBOLS.contains(&chr).then_some(1));
                match len {
                    Some(len) => {
                        for _ in 0..len {
                            self.advance();
                        }
                        Ok(Token(
                            TokenKind::Symbol,
                            self.span(line, col, start, start + len),
                        ))
                    }
                    None => Err(self.source.error(line, col, "invalid character")),
                }
            }
        }
    }
}

/// Decodes the text of a quoted string token.
pub fn unquote(text: &str) -> String {
    let mut chars = text.chars();
    let quote = chars.next().unwrap_or('\'');
    let body = &text[quote.len_utf8()..text.len().saturating_sub(1).max(quote.len_utf8())];
    let mut out = String::with_capacity(body.len());
    let mut iter = body.chars().peekable();
    while let Some(ch) = iter.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(&next) = iter.peek() else {
            out.push(ch);
            break;
        };
        let decoded = match (quote, next) {
            ('\'', '\'') | ('\'', '\\') => Some(next),
            ('"', '"') | ('"', '\\') | ('"', '$') => Some(next),
            ('"', 'n') => Some('\n'),
            ('"', 't') => Some('\t'),
            ('"', 'r') => Some('\r'),
            ('"', '0') => Some('\0'),
            _ => None,
        };
        match decoded {
            Some(c) => {
                out.push(c);
                iter.next();
            }
            None => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Result<Vec<(TokenKind, String)>> {
        let source = Source::from_contents("test.php".to_string(), src.to_string())?;
        let mut lexer = Lexer::new(&source);
        let mut tokens = vec![];
        loop {
            let tok = lexer.next_token()?;
            if tok.0 == TokenKind::Eof {
                break;
            }
            tokens.push((tok.0.clone(), tok.1.text().to_string()));
        }
        Ok(tokens)
    }

    #[test]
    fn skips_open_tag_and_comments() -> Result<()> {
        let tokens = kinds("<?php\n// line\n# hash\n/* block */ $x = 1;")?;
        let texts: Vec<_> = tokens.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, vec!["$x", "=", "1", ";"]);
        Ok(())
    }

    #[test]
    fn emits_doc_comments() -> Result<()> {
        let tokens = kinds("/** @var array $x */ $x;")?;
        assert_eq!(tokens[0].0, TokenKind::DocComment);
        assert_eq!(tokens[1].0, TokenKind::Variable);
        Ok(())
    }

    #[test]
    fn prefers_longest_symbol() -> Result<()> {
        let tokens = kinds("$a ??= $b?->c === 1.5 . 'x'")?;
        let texts: Vec<_> = tokens.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, vec!["$a", "??=", "$b", "?->", "c", "===", "1.5", ".", "'x'"]);
        Ok(())
    }

    #[test]
    fn unquotes_both_styles() {
        assert_eq!(unquote(r"'it\'s'"), "it's");
        assert_eq!(unquote(r#""a\tb\"""#), "a\tb\"");
        assert_eq!(unquote(r"'a\nb'"), "a\\nb");
    }

    #[test]
    fn reports_unmatched_quote() {
        let err = kinds("$x = 'abc").err();
        assert!(err.is_some_and(|e| e.to_string().contains("unmatched")));
    }
}
