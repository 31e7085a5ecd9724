//! Single-pass lexer with integrated preprocessor.
//!
//! The lexer turns source text (plus any `#include`d files) into a flat,
//! position-annotated token list while evaluating conditional compilation,
//! macro definition/substitution and file inclusion. It knows nothing about
//! the grammar beyond which lines start with `#`. It never aborts: illegal
//! input degrades to `Error`/`Inactive` tokens and diagnostics, and the
//! token array always covers the remainder of the file.

use std::collections::HashMap;
use std::path::PathBuf;

use tower_lsp::lsp_types::{Position, Range, Url};

use crate::diagnostics::{Diag, Severity};
use crate::folding::{FoldKind, FoldRegion};
use crate::include::IncludeCache;
use crate::keywords;
use crate::token::{utf16_len, Token, TokenKind};

/// Hard cap on include/macro-expansion nesting. Termination against include
/// cycles and self-referential macros depends on it, independent of any
/// cycle detection.
pub const MAX_NESTING_DEPTH: usize = 16;

/// How `#include` paths are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IncludeMode {
    /// Relative to the including document's directory.
    #[default]
    FileRelative,
    /// Relative to the workspace root captured at initialize.
    WorkspaceRelative,
}

/// Read-only inputs to a lexing run.
#[derive(Debug, Clone, Default)]
pub struct LexConfig {
    /// Macro table seeded before lexing starts.
    pub defines: HashMap<String, String>,
    pub include_mode: IncludeMode,
    pub workspace_root: Option<PathBuf>,
}

/// Everything one lexing run produces.
#[derive(Debug)]
pub struct LexOutput {
    pub tokens: Vec<Token>,
    /// Byte offset of each line start in the root document.
    pub line_offsets: Vec<usize>,
    pub diagnostics: Vec<Diag>,
    pub folding: Vec<FoldRegion>,
}

/// Lex `text` (and, recursively, its includes) into a token list.
pub fn lex(text: &str, uri: &Url, config: &LexConfig, includes: &IncludeCache) -> LexOutput {
    let mut out = LexOutput {
        tokens: Vec::new(),
        line_offsets: vec![0],
        diagnostics: Vec::new(),
        folding: Vec::new(),
    };
    let mut macros = config.defines.clone();
    Lexer {
        src: text,
        pos: 0,
        line: 0,
        col: 0,
        line_has_content: false,
        uri: uri.clone(),
        macros: &mut macros,
        includes,
        config,
        depth: 0,
        origin: None,
        root: true,
        system_section: false,
        conds: Vec::new(),
        out: &mut out,
    }
    .run();
    out
}

/// Span a macro reference was expanded from; replacement tokens inherit it
/// in full so expansion stays positionally transparent.
#[derive(Debug, Clone)]
struct MacroOrigin {
    uri: Url,
    line: u32,
    column: u32,
    offset: usize,
    length: usize,
    value: String,
}

/// One open `#ifdef`/`#ifndef` level.
#[derive(Debug)]
struct Cond {
    /// Conditional state of the enclosing levels.
    parent_active: bool,
    /// Outcome of this level's own test.
    taken: bool,
    /// Effective state: `parent_active && taken` (inverted after `#else`).
    active: bool,
    else_seen: bool,
    line: u32,
    label: String,
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    col: u32,
    /// Whether anything but whitespace appeared on the current line; `#`
    /// starts a directive only while this is false.
    line_has_content: bool,
    uri: Url,
    macros: &'a mut HashMap<String, String>,
    includes: &'a IncludeCache,
    config: &'a LexConfig,
    depth: usize,
    origin: Option<MacroOrigin>,
    root: bool,
    /// Toggled by the SYSTEM/PROBLEM keywords; the connection operators
    /// `<->`, `<-`, `->` exist only inside the system division.
    system_section: bool,
    conds: Vec<Cond>,
    out: &'a mut LexOutput,
}

impl<'a> Lexer<'a> {
    fn run(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                self.newline();
                continue;
            }
            if c.is_whitespace() {
                self.advance(c);
                continue;
            }
            if c == '#' && !self.line_has_content {
                self.directive();
                continue;
            }
            self.line_has_content = true;
            if !self.cond_active() {
                self.inactive_line();
                continue;
            }
            match c {
                '!' => self.line_comment(),
                '/' if self.peek_at(1) == Some('*') => self.block_comment(),
                '\'' => self.string_literal(),
                _ if c.is_ascii_digit() => self.number(),
                _ if c.is_ascii_alphabetic() => self.word(),
                _ => self.operator_or_symbol(c),
            }
        }

        let open: Vec<(u32, String)> = self
            .conds
            .drain(..)
            .map(|c| (c.line, c.label))
            .collect();
        for (line, label) in open {
            self.diag_at(line, 0, label.len(), Severity::Warning, format!("missing #endif for `{label}`"));
        }
    }

    // ------------------------------------------------------------------
    // Cursor primitives
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn advance(&mut self, c: char) {
        self.pos += c.len_utf8();
        self.col += c.len_utf16() as u32;
    }

    fn newline(&mut self) {
        self.pos += 1;
        self.line += 1;
        self.col = 0;
        self.line_has_content = false;
        if self.root {
            self.out.line_offsets.push(self.pos);
        }
    }

    fn cond_active(&self) -> bool {
        self.conds.last().map(|c| c.active).unwrap_or(true)
    }

    /// Advance to the end of the current line and return the skipped slice.
    fn rest_of_line(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance(c);
        }
        &self.src[start..self.pos]
    }

    fn emit(&mut self, mut token: Token) {
        if let Some(origin) = &self.origin {
            token.uri = origin.uri.clone();
            token.line = origin.line;
            token.column = origin.column;
            token.offset = origin.offset;
            token.length = origin.length;
            token.macro_value = Some(origin.value.clone());
        }
        self.out.tokens.push(token);
    }

    fn diag_at(
        &mut self,
        line: u32,
        col: u32,
        len: usize,
        severity: Severity,
        message: impl Into<String>,
    ) {
        self.out.diagnostics.push(Diag {
            uri: self.uri.clone(),
            range: Range::new(
                Position::new(line, col),
                Position::new(line, col + len as u32),
            ),
            severity,
            message: message.into(),
            unnecessary: false,
        });
    }

    // ------------------------------------------------------------------
    // Token scanners
    // ------------------------------------------------------------------

    /// Consume the remainder of a preprocessed-out line as one token.
    fn inactive_line(&mut self) {
        let (line, col, offset) = (self.line, self.col, self.pos);
        let text = self.rest_of_line();
        let token = Token::new(TokenKind::Inactive, text, &self.uri, line, col, offset);
        self.out.diagnostics.push(
            Diag::at(
                &token,
                Severity::Hint,
                "inactive code (excluded by preprocessor conditional)",
            )
            .unnecessary(),
        );
        self.emit(token);
    }

    fn line_comment(&mut self) {
        let (line, col, offset) = (self.line, self.col, self.pos);
        let text = self.rest_of_line();
        self.emit(Token::new(
            TokenKind::Comment,
            text,
            &self.uri,
            line,
            col,
            offset,
        ));
    }

    fn block_comment(&mut self) {
        let (start_line, start_col, start) = (self.line, self.col, self.pos);
        self.advance('/');
        self.advance('*');
        let mut closed = false;
        while let Some(c) = self.peek() {
            if c == '*' && self.peek_at(1) == Some('/') {
                self.advance('*');
                self.advance('/');
                closed = true;
                break;
            }
            if c == '\n' {
                self.newline();
            } else {
                self.advance(c);
            }
        }
        if !closed {
            self.diag_at(
                start_line,
                start_col,
                2,
                Severity::Warning,
                "unterminated block comment",
            );
        }
        let text = &self.src[start..self.pos];
        if self.line > start_line {
            self.out.folding.push(FoldRegion::new(
                &self.uri,
                start_line,
                self.line,
                FoldKind::Comment,
            ));
        }
        self.emit(Token::new(
            TokenKind::Comment,
            text,
            &self.uri,
            start_line,
            start_col,
            start,
        ));
    }

    /// `'...'` character string, optionally suffixed `B`/`B1`..`B4` to form a
    /// bit literal. An unterminated literal is closed at end of line so the
    /// rest of the file still lexes.
    fn string_literal(&mut self) {
        let (line, col, start) = (self.line, self.col, self.pos);
        self.advance('\'');
        let mut closed = false;
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance(c);
            if c == '\'' {
                if self.peek() == Some('\'') {
                    // doubled quote is an escaped quote
                    self.advance('\'');
                    continue;
                }
                closed = true;
                break;
            }
        }
        let mut kind = TokenKind::String;
        if closed {
            if self.peek() == Some('B') {
                let digit = self.peek_at(1);
                let after = if matches!(digit, Some('1'..='4')) {
                    self.peek_at(2)
                } else {
                    digit
                };
                let suffix_ok = !after.map(|c| c.is_ascii_alphanumeric() || c == '_').unwrap_or(false);
                if suffix_ok {
                    self.advance('B');
                    if matches!(self.peek(), Some('1'..='4')) {
                        let d = self.peek().unwrap_or('1');
                        self.advance(d);
                    }
                    kind = TokenKind::BitString;
                }
            }
        } else {
            self.diag_at(
                line,
                col,
                utf16_len(&self.src[start..self.pos]),
                Severity::Error,
                "unterminated character-string literal",
            );
        }
        let text = &self.src[start..self.pos];
        self.emit(Token::new(kind, text, &self.uri, line, col, start));
    }

    /// Integer/fraction/exponent literal with an optional parenthesized
    /// precision suffix attached directly to the numeral, e.g. `15(31)`.
    fn number(&mut self) {
        let (line, col, start) = (self.line, self.col, self.pos);
        self.digits();
        if self.peek() == Some('.') && self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false) {
            self.advance('.');
            self.digits();
        }
        if matches!(self.peek(), Some('E') | Some('e')) {
            let mut n = 1;
            if matches!(self.peek_at(1), Some('+') | Some('-')) {
                n = 2;
            }
            if self.peek_at(n).map(|c| c.is_ascii_digit()).unwrap_or(false) {
                for _ in 0..n {
                    let c = self.peek().unwrap_or('E');
                    self.advance(c);
                }
                self.digits();
            }
        }
        if self.peek() == Some('(') && self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false)
        {
            // precision suffix: consume up to the closing paren
            self.advance('(');
            self.digits();
            if self.peek() == Some(')') {
                self.advance(')');
            }
        }
        let text = &self.src[start..self.pos];
        self.emit(Token::new(TokenKind::Number, text, &self.uri, line, col, start));
    }

    fn digits(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            self.advance(c);
        }
    }

    fn word(&mut self) {
        let (line, col, start) = (self.line, self.col, self.pos);
        while let Some(c) = self.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            self.advance(c);
        }
        let word = &self.src[start..self.pos];

        // A macro name always wins over keyword classification.
        if self.macros.contains_key(word) {
            let word = word.to_string();
            self.expand_macro(&word, line, col, start);
            return;
        }

        let kind = if keywords::is_keyword(word) {
            TokenKind::Keyword
        } else if keywords::is_operator_word(word) {
            TokenKind::Operator
        } else {
            TokenKind::Identifier
        };
        // Section keywords flip the lexer's arrow-operator state.
        if word == "SYSTEM" {
            self.system_section = true;
        } else if word == "PROBLEM" {
            self.system_section = false;
        }
        self.emit(Token::new(kind, word, &self.uri, line, col, start));
    }

    /// Re-lex a macro's replacement text in place. Replacement tokens carry
    /// the invoking token's span in full, at any nesting depth.
    fn expand_macro(&mut self, name: &str, line: u32, col: u32, offset: usize) {
        let Some(value) = self.macros.get(name).cloned() else {
            return;
        };
        if self.depth + 1 > MAX_NESTING_DEPTH {
            self.diag_at(
                line,
                col,
                utf16_len(name),
                Severity::Error,
                format!("macro expansion of `{name}` exceeds the nesting limit"),
            );
            self.emit(Token::new(
                TokenKind::Identifier,
                name,
                &self.uri,
                line,
                col,
                offset,
            ));
            return;
        }

        let origin = match &self.origin {
            // Nested expansions stay anchored at the outermost reference.
            Some(outer) => outer.clone(),
            None => MacroOrigin {
                uri: self.uri.clone(),
                line,
                column: col,
                offset,
                length: utf16_len(name),
                value: value.clone(),
            },
        };

        let produced_before = self.out.tokens.len();
        Lexer {
            src: value.as_str(),
            pos: 0,
            line: 0,
            col: 0,
            line_has_content: true,
            uri: self.uri.clone(),
            macros: &mut *self.macros,
            includes: self.includes,
            config: self.config,
            depth: self.depth + 1,
            origin: Some(origin.clone()),
            root: false,
            system_section: self.system_section,
            conds: Vec::new(),
            out: &mut *self.out,
        }
        .run();

        if self.out.tokens.len() == produced_before {
            // Empty replacement: keep a marker so hover can show it.
            let mut marker =
                Token::new(TokenKind::MacroExpansion, name, &self.uri, line, col, offset);
            marker.macro_value = Some(value);
            self.emit(marker);
        }
    }

    fn operator_or_symbol(&mut self, c: char) {
        let (line, col, start) = (self.line, self.col, self.pos);

        // Multi-character operators, longest match first. The connection
        // arrows only exist while the lexer is inside the system division.
        let system_ops: &[&str] = if self.system_section {
            &["<->", "<-", "->"]
        } else {
            &[]
        };
        let general_ops: &[&str] = &[":=", "<=", ">=", "<>", "==", "//", "**"];
        for op in system_ops.iter().chain(general_ops) {
            if self.src[self.pos..].starts_with(op) {
                for ch in op.chars() {
                    self.advance(ch);
                }
                self.emit(Token::new(
                    TokenKind::Operator,
                    *op,
                    &self.uri,
                    line,
                    col,
                    start,
                ));
                return;
            }
        }

        let kind = match c {
            '+' | '-' | '*' | '/' | '<' | '>' | '=' | '&' => TokenKind::Operator,
            ';' | ',' | '(' | ')' | '[' | ']' | ':' | '.' => TokenKind::Symbol,
            _ => TokenKind::Error,
        };
        self.advance(c);
        if kind == TokenKind::Error {
            self.diag_at(
                line,
                col,
                c.len_utf16(),
                Severity::Error,
                format!("illegal character `{c}`"),
            );
        }
        self.emit(Token::new(
            kind,
            c.to_string(),
            &self.uri,
            line,
            col,
            start,
        ));
    }

    // ------------------------------------------------------------------
    // Preprocessor directives
    // ------------------------------------------------------------------

    fn directive(&mut self) {
        let (dline, dcol, doffset) = (self.line, self.col, self.pos);
        self.line_has_content = true;
        self.advance('#');
        let name_start = self.pos;
        while let Some(c) = self.peek() {
            if !c.is_ascii_alphabetic() {
                break;
            }
            self.advance(c);
        }
        let name = self.src[name_start..self.pos].to_string();

        match name.as_str() {
            "ifdef" | "ifndef" => {
                let ident = self.directive_word();
                let parent = self.cond_active();
                let defined = ident
                    .as_deref()
                    .map(|n| self.macros.contains_key(n))
                    .unwrap_or(false);
                let taken = if name == "ifdef" { defined } else { !defined };
                if ident.is_none() {
                    self.diag_at(
                        dline,
                        dcol,
                        name.len() + 1,
                        Severity::Error,
                        format!("expected macro name after #{name}"),
                    );
                }
                let label = match &ident {
                    Some(n) => format!("#{name} {n}"),
                    None => format!("#{name}"),
                };
                self.conds.push(Cond {
                    parent_active: parent,
                    taken,
                    active: parent && taken,
                    else_seen: false,
                    line: dline,
                    label,
                });
                self.finish_directive(dline, dcol, doffset);
            }
            "else" => {
                match self.conds.last_mut() {
                    Some(cond) if !cond.else_seen => {
                        cond.active = cond.parent_active && !cond.taken;
                        cond.else_seen = true;
                    }
                    Some(_) => {
                        self.diag_at(dline, dcol, 5, Severity::Error, "duplicate #else");
                    }
                    None => {
                        self.diag_at(
                            dline,
                            dcol,
                            5,
                            Severity::Error,
                            "#else without matching #ifdef",
                        );
                    }
                }
                self.finish_directive(dline, dcol, doffset);
            }
            "endif" => {
                match self.conds.pop() {
                    Some(cond) => {
                        self.out.folding.push(
                            FoldRegion::new(&self.uri, cond.line, dline, FoldKind::Preproc)
                                .with_label(cond.label),
                        );
                    }
                    None => {
                        self.diag_at(
                            dline,
                            dcol,
                            6,
                            Severity::Error,
                            "#endif without matching #ifdef",
                        );
                    }
                }
                self.finish_directive(dline, dcol, doffset);
            }
            // Anything below only runs in active code; in a false
            // conditional the line is plain inactive text.
            _ if !self.cond_active() => {
                let _ = self.rest_of_line();
                let text = &self.src[doffset..self.pos];
                let token =
                    Token::new(TokenKind::Inactive, text, &self.uri, dline, dcol, doffset);
                self.out.diagnostics.push(
                    Diag::at(
                        &token,
                        Severity::Hint,
                        "inactive code (excluded by preprocessor conditional)",
                    )
                    .unnecessary(),
                );
                self.emit(token);
            }
            "include" => self.include_directive(dline, dcol, doffset),
            "define" => {
                match self.directive_word() {
                    Some(macro_name) => {
                        let value = self.rest_of_line().trim().to_string();
                        if self.macros.contains_key(&macro_name) {
                            self.diag_at(
                                dline,
                                dcol,
                                utf16_len(&self.src[doffset..self.pos].trim_end()),
                                Severity::Error,
                                format!("macro `{macro_name}` is already defined"),
                            );
                        } else {
                            self.macros.insert(macro_name, value);
                        }
                    }
                    None => {
                        self.diag_at(
                            dline,
                            dcol,
                            7,
                            Severity::Error,
                            "expected macro name after #define",
                        );
                    }
                }
                self.finish_directive(dline, dcol, doffset);
            }
            "undef" => {
                match self.directive_word() {
                    Some(macro_name) => {
                        if self.macros.remove(&macro_name).is_none() {
                            self.diag_at(
                                dline,
                                dcol,
                                utf16_len(&self.src[doffset..self.pos].trim_end()),
                                Severity::Warning,
                                format!("macro `{macro_name}` was never defined"),
                            );
                        }
                    }
                    None => {
                        self.diag_at(
                            dline,
                            dcol,
                            6,
                            Severity::Error,
                            "expected macro name after #undef",
                        );
                    }
                }
                self.finish_directive(dline, dcol, doffset);
            }
            _ => {
                self.diag_at(
                    dline,
                    dcol,
                    name.len() + 1,
                    Severity::Error,
                    format!("unknown preprocessor directive `#{name}`"),
                );
                let rest = self.rest_of_line();
                let text = format!("#{name}{rest}");
                self.emit(Token::new(
                    TokenKind::Inactive,
                    text,
                    &self.uri,
                    dline,
                    dcol,
                    doffset,
                ));
            }
        }
    }

    /// Consume the directive line's remainder and emit one keyword token
    /// covering the whole directive.
    fn finish_directive(&mut self, line: u32, col: u32, offset: usize) {
        let _ = self.rest_of_line();
        let text = self.src[offset..self.pos].trim_end();
        self.emit(Token::new(
            TokenKind::Keyword,
            text,
            &self.uri,
            line,
            col,
            offset,
        ));
    }

    /// Skip horizontal whitespace and read one identifier word, if present.
    fn directive_word(&mut self) -> Option<String> {
        while let Some(c) = self.peek() {
            if c == ' ' || c == '\t' {
                self.advance(c);
            } else {
                break;
            }
        }
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() => {}
            _ => return None,
        }
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                self.advance(c);
            } else {
                break;
            }
        }
        Some(self.src[start..self.pos].to_string())
    }

    fn include_directive(&mut self, dline: u32, dcol: u32, doffset: usize) {
        let raw = self.rest_of_line().trim().to_string();
        let pragma = Token::new(
            TokenKind::Keyword,
            self.src[doffset..self.pos].trim_end(),
            &self.uri,
            dline,
            dcol,
            doffset,
        );

        let path_str = strip_include_delimiters(&raw);
        if path_str.is_empty() {
            self.out
                .diagnostics
                .push(Diag::error(&pragma, "expected file name after #include"));
            self.emit(pragma);
            return;
        }
        let substituted = self.substitute_in_path(path_str);

        // Included tokens are spliced in right after the pragma token.
        let pragma_for_diags = pragma.clone();
        self.emit(pragma);

        if self.depth + 1 > MAX_NESTING_DEPTH {
            self.out.diagnostics.push(Diag::error(
                &pragma_for_diags,
                format!("include depth limit reached while including `{substituted}`"),
            ));
            return;
        }

        let dir = match (self.config.include_mode, &self.config.workspace_root) {
            (IncludeMode::WorkspaceRelative, Some(root)) => root.clone(),
            _ => self
                .uri
                .to_file_path()
                .ok()
                .and_then(|p| p.parent().map(|p| p.to_path_buf()))
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        let full = dir.join(&substituted);

        let text = match self.includes.read(&full) {
            Ok(text) => text,
            Err(err) => {
                self.out.diagnostics.push(Diag::error(
                    &pragma_for_diags,
                    format!("cannot include `{substituted}`: {err}"),
                ));
                return;
            }
        };
        let Ok(child_uri) = Url::from_file_path(&full) else {
            self.out.diagnostics.push(Diag::error(
                &pragma_for_diags,
                format!("include path `{substituted}` is not a valid file path"),
            ));
            return;
        };

        Lexer {
            src: text.as_ref(),
            pos: 0,
            line: 0,
            col: 0,
            line_has_content: false,
            uri: child_uri,
            macros: &mut *self.macros,
            includes: self.includes,
            config: self.config,
            depth: self.depth + 1,
            origin: None,
            root: false,
            system_section: self.system_section,
            conds: Vec::new(),
            out: &mut *self.out,
        }
        .run();
    }

    /// Replace macro names appearing as identifier words inside an include
    /// path. Quotes around a macro's value are stripped so `#define LIB
    /// "lib"` composes into paths.
    fn substitute_in_path(&self, path: &str) -> String {
        let mut result = String::with_capacity(path.len());
        let mut chars = path.char_indices().peekable();
        while let Some(&(start, c)) = chars.peek() {
            if c.is_ascii_alphabetic() {
                let mut end = start;
                while let Some(&(idx, c)) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        end = idx + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let word = &path[start..end];
                match self.macros.get(word) {
                    Some(value) => result.push_str(value.trim().trim_matches('"')),
                    None => result.push_str(word),
                }
            } else {
                result.push(c);
                chars.next();
            }
        }
        result
    }
}

fn strip_include_delimiters(raw: &str) -> &str {
    let raw = raw.trim();
    if let Some(inner) = raw.strip_prefix('"') {
        return inner.strip_suffix('"').unwrap_or(inner);
    }
    if let Some(inner) = raw.strip_prefix('<') {
        return inner.strip_suffix('>').unwrap_or(inner);
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use std::fs;

    fn test_uri() -> Url {
        Url::parse("file:///tmp/test.prl").unwrap()
    }

    fn lex_str(text: &str) -> LexOutput {
        lex(text, &test_uri(), &LexConfig::default(), &IncludeCache::new())
    }

    fn kinds(out: &LexOutput) -> Vec<TokenKind> {
        out.tokens.iter().map(|t| t.kind).collect()
    }

    fn unique_temp_dir(name: &str) -> PathBuf {
        let stamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should move forward")
            .as_nanos();
        std::env::temp_dir().join(format!("pearl-lsp-lexer-{name}-{}-{stamp}", std::process::id()))
    }

    #[test]
    fn classifies_keywords_types_and_identifiers() {
        let out = lex_str("MODULE M; DCL X FIXED;");
        assert_eq!(
            kinds(&out),
            vec![
                TokenKind::Keyword,
                TokenKind::Identifier,
                TokenKind::Symbol,
                TokenKind::Keyword,
                TokenKind::Identifier,
                TokenKind::Keyword,
                TokenKind::Symbol,
            ]
        );
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn line_comment_runs_to_end_of_line() {
        let out = lex_str("! a comment\nX");
        assert_eq!(out.tokens[0].kind, TokenKind::Comment);
        assert_eq!(out.tokens[0].text, "! a comment");
        assert_eq!(out.tokens[1].text, "X");
        assert_eq!(out.tokens[1].line, 1);
    }

    #[test]
    fn multiline_block_comment_is_foldable() {
        let out = lex_str("/* one\ntwo\nthree */ X");
        assert_eq!(out.tokens[0].kind, TokenKind::Comment);
        assert_eq!(out.folding.len(), 1);
        assert_eq!(out.folding[0].kind, FoldKind::Comment);
        assert_eq!(out.folding[0].start_line, 0);
        assert_eq!(out.folding[0].end_line, 2);
        assert_eq!(out.tokens[1].text, "X");
    }

    #[test]
    fn string_and_bit_literals() {
        let out = lex_str("'abc' '10110'B1 '1F'B4");
        assert_eq!(
            kinds(&out),
            vec![TokenKind::String, TokenKind::BitString, TokenKind::BitString]
        );
        assert_eq!(out.tokens[1].text, "'10110'B1");
    }

    #[test]
    fn doubled_quote_is_an_escape() {
        let out = lex_str("'it''s';");
        assert_eq!(out.tokens[0].kind, TokenKind::String);
        assert_eq!(out.tokens[0].text, "'it''s'");
        assert_eq!(out.tokens[1].text, ";");
    }

    #[test]
    fn unterminated_string_recovers_at_end_of_line() {
        let out = lex_str("'open\nNEXT");
        assert_eq!(out.tokens[0].kind, TokenKind::String);
        assert_eq!(out.tokens[1].text, "NEXT");
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error && d.message.contains("unterminated")));
    }

    #[test]
    fn numbers_with_fraction_exponent_and_precision() {
        let out = lex_str("15 3.14 1E6 2.5E-3 15(31)");
        assert_eq!(out.tokens.len(), 5);
        assert!(out.tokens.iter().all(|t| t.kind == TokenKind::Number));
        assert_eq!(out.tokens[4].text, "15(31)");
    }

    #[test]
    fn arrows_only_in_system_section() {
        let out = lex_str("SYSTEM; A <-> B; PROBLEM; C <-> D;");
        let arrow_count = out.tokens.iter().filter(|t| t.text == "<->").count();
        assert_eq!(arrow_count, 1, "second arrow must fall apart outside SYSTEM");
        let lt: Vec<_> = out.tokens.iter().filter(|t| t.text == "<").collect();
        assert_eq!(lt.len(), 1);
    }

    #[test]
    fn illegal_character_yields_error_token_and_continues() {
        let out = lex_str("A @ B");
        assert_eq!(
            kinds(&out),
            vec![TokenKind::Identifier, TokenKind::Error, TokenKind::Identifier]
        );
        assert!(out.diagnostics.iter().any(|d| d.message.contains("illegal")));
    }

    #[test]
    fn ifdef_unset_with_else_lexes_else_branch_active() {
        let out = lex_str("#ifdef UNSET\nDCL A FIXED;\n#else\nDCL B FIXED;\n#endif\n");
        let inactive: Vec<_> = out
            .tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Inactive)
            .collect();
        assert_eq!(inactive.len(), 1);
        assert_eq!(inactive[0].text, "DCL A FIXED;");
        assert!(out.tokens.iter().any(|t| t.text == "B"));
        assert!(!out.tokens.iter().any(|t| t.text == "A" && t.kind == TokenKind::Identifier));
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Hint && d.unnecessary));
        // the whole conditional folds
        assert!(out
            .folding
            .iter()
            .any(|f| f.kind == FoldKind::Preproc && f.label.as_deref() == Some("#ifdef UNSET")));
    }

    #[test]
    fn nested_conditionals_combine_with_logical_and() {
        let out = lex_str(
            "#define OUTER 1\n#ifdef OUTER\n#ifdef INNER\nDCL A FIXED;\n#endif\nDCL B FIXED;\n#endif\n",
        );
        assert!(out.tokens.iter().any(|t| t.text == "B" && t.kind == TokenKind::Identifier));
        assert!(out.tokens.iter().any(|t| t.kind == TokenKind::Inactive && t.text.contains('A')));
    }

    #[test]
    fn inactive_region_is_consumed_line_by_line() {
        let out = lex_str("#ifdef UNSET\none line;\nanother line;\n#endif\n");
        let inactive: Vec<_> = out
            .tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Inactive)
            .collect();
        assert_eq!(inactive.len(), 2);
    }

    #[test]
    fn macro_redefinition_is_an_error() {
        let out = lex_str("#define X 1\n#define X 2\n");
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error && d.message.contains("already defined")));
    }

    #[test]
    fn undef_of_unknown_macro_warns() {
        let out = lex_str("#undef NEVER\n");
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message.contains("never defined")));
    }

    #[test]
    fn undef_removes_a_definition() {
        let out = lex_str("#define X 1\n#undef X\n#ifdef X\nDCL A FIXED;\n#endif\n");
        assert!(out.tokens.iter().any(|t| t.kind == TokenKind::Inactive));
    }

    #[test]
    fn unknown_directive_is_an_error_and_skipped() {
        let out = lex_str("#frobnicate all the things\nX");
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.message.contains("unknown preprocessor directive")));
        assert_eq!(out.tokens[0].kind, TokenKind::Inactive);
        assert_eq!(out.tokens[1].text, "X");
    }

    #[test]
    fn hash_mid_line_is_not_a_directive() {
        let out = lex_str("A #define B");
        assert!(out.diagnostics.iter().any(|d| d.message.contains("illegal")));
        assert!(out.tokens.iter().any(|t| t.kind == TokenKind::Error));
    }

    #[test]
    fn macro_expansion_inherits_the_reference_span() {
        let out = lex_str("#define X 'v'\nMODULE M;\nX;\n");
        let expanded: Vec<_> = out
            .tokens
            .iter()
            .filter(|t| t.macro_value.is_some())
            .collect();
        assert_eq!(expanded.len(), 1);
        let tok = expanded[0];
        assert_eq!(tok.kind, TokenKind::String);
        assert_eq!(tok.text, "'v'");
        assert_eq!(tok.line, 2);
        assert_eq!(tok.column, 0);
        assert_eq!(tok.length, 1, "span length is the reference's, not the replacement's");
        assert_eq!(tok.macro_value.as_deref(), Some("'v'"));
    }

    #[test]
    fn nested_macro_expansion_keeps_the_outermost_span() {
        let out = lex_str("#define INNER 42\n#define OUTER INNER\nOUTER;\n");
        let expanded: Vec<_> = out
            .tokens
            .iter()
            .filter(|t| t.macro_value.is_some())
            .collect();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].kind, TokenKind::Number);
        assert_eq!(expanded[0].text, "42");
        assert_eq!(expanded[0].line, 2);
        assert_eq!(expanded[0].length, 5, "span is OUTER's own");
    }

    #[test]
    fn empty_macro_expansion_leaves_a_marker() {
        let out = lex_str("#define NOTHING\nNOTHING;\n");
        let marker = out
            .tokens
            .iter()
            .find(|t| t.kind == TokenKind::MacroExpansion)
            .expect("marker token");
        assert_eq!(marker.text, "NOTHING");
        assert_eq!(marker.macro_value.as_deref(), Some(""));
    }

    #[test]
    fn self_referential_macro_hits_the_depth_cap() {
        let out = lex_str("#define X X\nX;\n");
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.message.contains("nesting limit")));
    }

    #[test]
    fn predefined_macros_are_seeded() {
        let config = LexConfig {
            defines: [("TARGET".to_string(), "1".to_string())].into(),
            ..Default::default()
        };
        let out = lex(
            "#ifdef TARGET\nDCL A FIXED;\n#endif\n",
            &test_uri(),
            &config,
            &IncludeCache::new(),
        );
        assert!(out.tokens.iter().any(|t| t.text == "A" && t.kind == TokenKind::Identifier));
    }

    #[test]
    fn missing_endif_warns_at_the_opening_line() {
        let out = lex_str("#ifdef A\nDCL X FIXED;\n");
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.severity == Severity::Warning && d.message.contains("missing #endif")));
    }

    #[test]
    fn line_offsets_cover_the_root_document() {
        let out = lex_str("A\nBB\nCCC");
        assert_eq!(out.line_offsets, vec![0, 2, 5]);
    }

    #[test]
    fn include_splices_tokens_with_their_own_uri() {
        let dir = unique_temp_dir("splice");
        fs::create_dir_all(&dir).expect("create temp dir");
        fs::write(dir.join("defs.prl"), "DCL SHARED FIXED GLOBAL;\n").expect("write include");

        let doc = Url::from_file_path(dir.join("main.prl")).expect("doc uri");
        let out = lex(
            "#include \"defs.prl\"\nMODULE M;\n",
            &doc,
            &LexConfig::default(),
            &IncludeCache::new(),
        );

        let shared = out
            .tokens
            .iter()
            .find(|t| t.text == "SHARED")
            .expect("token from include");
        assert!(shared.uri.path().ends_with("defs.prl"));
        // pragma token precedes the spliced tokens
        let pragma_idx = out
            .tokens
            .iter()
            .position(|t| t.text.starts_with("#include"))
            .expect("pragma token");
        let shared_idx = out.tokens.iter().position(|t| t.text == "SHARED").unwrap();
        assert!(pragma_idx < shared_idx);
        assert!(out.diagnostics.is_empty());

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn include_path_supports_macro_substitution() {
        let dir = unique_temp_dir("subst");
        fs::create_dir_all(&dir).expect("create temp dir");
        fs::write(dir.join("defs.prl"), "DCL D FIXED;\n").expect("write include");

        let doc = Url::from_file_path(dir.join("main.prl")).expect("doc uri");
        let out = lex(
            "#define NAME \"defs\"\n#include \"NAME.prl\"\n",
            &doc,
            &LexConfig::default(),
            &IncludeCache::new(),
        );
        assert!(out.tokens.iter().any(|t| t.text == "D"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_include_reports_on_the_pragma_and_continues() {
        let dir = unique_temp_dir("missing");
        fs::create_dir_all(&dir).expect("create temp dir");
        let doc = Url::from_file_path(dir.join("main.prl")).expect("doc uri");
        let out = lex(
            "#include \"nope.prl\"\nMODULE M;\n",
            &doc,
            &LexConfig::default(),
            &IncludeCache::new(),
        );
        let diag = out
            .diagnostics
            .iter()
            .find(|d| d.message.contains("cannot include"))
            .expect("include failure diagnostic");
        assert_eq!(diag.range.start.line, 0, "anchored at the pragma");
        assert!(out.tokens.iter().any(|t| t.text == "MODULE"));

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn self_include_terminates_at_the_depth_cap() {
        let dir = unique_temp_dir("cycle");
        fs::create_dir_all(&dir).expect("create temp dir");
        fs::write(dir.join("a.prl"), "#include \"a.prl\"\nDCL A FIXED;\n").expect("write include");

        let doc = Url::from_file_path(dir.join("main.prl")).expect("doc uri");
        let out = lex(
            "#include \"a.prl\"\n",
            &doc,
            &LexConfig::default(),
            &IncludeCache::new(),
        );
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.message.contains("include depth limit")));
        // each level still contributed its declaration tokens
        assert!(out.tokens.iter().filter(|t| t.text == "A").count() >= MAX_NESTING_DEPTH);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn workspace_relative_include_resolution() {
        let root = unique_temp_dir("workspace");
        let sub = root.join("src");
        fs::create_dir_all(&sub).expect("create temp dirs");
        fs::write(root.join("defs.prl"), "DCL W FIXED;\n").expect("write include");

        let doc = Url::from_file_path(sub.join("main.prl")).expect("doc uri");
        let config = LexConfig {
            include_mode: IncludeMode::WorkspaceRelative,
            workspace_root: Some(root.clone()),
            ..Default::default()
        };
        let out = lex(
            "#include \"defs.prl\"\n",
            &doc,
            &config,
            &IncludeCache::new(),
        );
        assert!(out.tokens.iter().any(|t| t.text == "W"));

        let _ = fs::remove_dir_all(root);
    }
}
