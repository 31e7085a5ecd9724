//! Single-pass scope-stack semantic analyzer.
//!
//! Walks the token list once, left to right, maintaining a block-frame
//! stack and a parallel scope stack. Declarations are inserted and
//! references resolved in the same pass; diagnostics, folding ranges and
//! token-to-symbol links come out the other end. The analyzer never aborts:
//! malformed statements produce targeted errors and the walk resynchronizes
//! at the next statement boundary.

use tower_lsp::lsp_types::Url;

use crate::builtins;
use crate::diagnostics::Diag;
use crate::folding::{FoldKind, FoldRegion};
use crate::token::{SymbolId, Token, TokenKind};

use super::scope::{BlockFrame, BlockKind, ScopeArena, Symbol, SymbolKind, TypeAttributes};

#[derive(Debug)]
pub struct AnalyzerOutput {
    pub tokens: Vec<Token>,
    pub symbols: Vec<Symbol>,
    pub diagnostics: Vec<Diag>,
    pub folding: Vec<FoldRegion>,
}

/// Analyze a full token list.
pub fn analyze_tokens(tokens: Vec<Token>) -> AnalyzerOutput {
    let mut analyzer = Analyzer::new(tokens, None);
    analyzer.walk();
    analyzer.finish();
    AnalyzerOutput {
        tokens: analyzer.tokens,
        symbols: analyzer.scopes.into_symbols(),
        diagnostics: analyzer.diags,
        folding: analyzer.folds,
    }
}

/// Bounded variant: walk until the first root-document token past `cutoff`
/// and return the symbols visible there. Used to answer "what is in scope
/// at this cursor position" without walking the rest of the document.
pub fn visible_symbols(tokens: Vec<Token>, uri: &Url, cutoff: usize) -> Vec<Symbol> {
    let mut analyzer = Analyzer::new(tokens, Some((uri.clone(), cutoff)));
    analyzer.walk();
    analyzer
        .scopes
        .open_symbols()
        .into_iter()
        .map(|id| analyzer.scopes.symbol(id).clone())
        .collect()
}

/// Whether the analyzer looks at this token at all.
fn is_significant(token: &Token) -> bool {
    match token.kind {
        TokenKind::Comment
        | TokenKind::Inactive
        | TokenKind::Error
        | TokenKind::MacroExpansion => false,
        // Preprocessor directive lines are lexed as keyword tokens but have
        // no statement meaning.
        TokenKind::Keyword => !token.text.starts_with('#'),
        _ => true,
    }
}

/// Presence rule for the operand and PRIO clause of task-control
/// statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Required,
    Optional,
    Forbidden,
}

fn task_statement_rules(keyword: &str) -> (Presence, Presence) {
    match keyword {
        "ACTIVATE" => (Presence::Required, Presence::Optional),
        "CONTINUE" => (Presence::Optional, Presence::Optional),
        "RESUME" => (Presence::Forbidden, Presence::Forbidden),
        // TERMINATE, SUSPEND, PREVENT
        _ => (Presence::Optional, Presence::Forbidden),
    }
}

struct Analyzer {
    tokens: Vec<Token>,
    scopes: ScopeArena,
    frames: Vec<BlockFrame>,
    diags: Vec<Diag>,
    folds: Vec<FoldRegion>,
    /// Loop variable of a `FOR <ident>` header waiting for its REPEAT.
    pending_for: Option<usize>,
    saw_modend: bool,
    cutoff: Option<(Url, usize)>,
}

impl Analyzer {
    fn new(tokens: Vec<Token>, cutoff: Option<(Url, usize)>) -> Self {
        Self {
            tokens,
            scopes: ScopeArena::new(),
            frames: Vec::new(),
            diags: Vec::new(),
            folds: Vec::new(),
            pending_for: None,
            saw_modend: false,
            cutoff,
        }
    }

    fn walk(&mut self) {
        let mut i = 0;
        while i < self.tokens.len() {
            if let Some((uri, cutoff)) = &self.cutoff {
                let token = &self.tokens[i];
                if &token.uri == uri && token.offset > *cutoff {
                    return;
                }
            }
            if !is_significant(&self.tokens[i]) {
                i += 1;
                continue;
            }
            i = match self.tokens[i].kind {
                TokenKind::Keyword => self.keyword(i),
                TokenKind::Identifier => self.identifier(i),
                _ => i + 1,
            };
        }
    }

    fn finish(&mut self) {
        while let Some(frame) = self.frames.pop() {
            let opening = self.tokens[frame.opening].clone();
            self.diags.push(Diag::warning(
                &opening,
                format!(
                    "`{}` block is not closed, expected `{}`",
                    opening.text,
                    frame.kind.expected_closer()
                ),
            ));
            let popped = self.scopes.pop();
            self.sweep(popped);
        }
        if !self.saw_modend {
            // Malformed/partial file: sweep what is left in the global scope.
            let remaining = self.scopes.open_symbols();
            self.sweep(remaining);
        }
    }

    // ------------------------------------------------------------------
    // Token cursor helpers
    // ------------------------------------------------------------------

    /// First significant token at or after `i`.
    fn sig(&self, mut i: usize) -> Option<usize> {
        while i < self.tokens.len() {
            if is_significant(&self.tokens[i]) {
                return Some(i);
            }
            i += 1;
        }
        None
    }

    fn is_sym(&self, i: usize, text: &str) -> bool {
        let t = &self.tokens[i];
        t.kind == TokenKind::Symbol && t.text == text
    }

    fn is_kw(&self, i: usize, word: &str) -> bool {
        let t = &self.tokens[i];
        t.kind == TokenKind::Keyword && t.text == word
    }

    fn is_ident(&self, i: usize) -> bool {
        self.tokens[i].kind == TokenKind::Identifier
    }

    /// Skip to the next statement boundary: past a `;` or `)`, or to the
    /// next keyword.
    fn resync(&mut self, mut i: usize) -> usize {
        while i < self.tokens.len() {
            if !is_significant(&self.tokens[i]) {
                i += 1;
                continue;
            }
            match self.tokens[i].kind {
                TokenKind::Symbol if matches!(self.tokens[i].text.as_str(), ";" | ")") => {
                    return i + 1;
                }
                TokenKind::Keyword => return i,
                _ => i += 1,
            }
        }
        i
    }

    /// Consume a balanced parenthesis group starting at `open` (which must
    /// point at `(`); returns the index past the closing `)`.
    fn skip_parens(&mut self, open: usize) -> usize {
        let mut depth = 0usize;
        let mut i = open;
        while i < self.tokens.len() {
            if is_significant(&self.tokens[i]) {
                if self.is_sym(i, "(") {
                    depth += 1;
                } else if self.is_sym(i, ")") {
                    depth -= 1;
                    if depth == 0 {
                        return i + 1;
                    }
                } else if self.is_sym(i, ";") {
                    // missing `)`: stop at the statement boundary
                    self.error(i, "expected `)` before `;`");
                    return i;
                }
            }
            i += 1;
        }
        i
    }

    fn error(&mut self, i: usize, message: impl Into<String>) {
        let token = self.tokens[i].clone();
        self.diags.push(Diag::error(&token, message));
    }

    // ------------------------------------------------------------------
    // Block structure
    // ------------------------------------------------------------------

    fn open_block(&mut self, kind: BlockKind, opening: usize) -> usize {
        let scope = self.scopes.push();
        self.frames.push(BlockFrame {
            kind,
            opening,
            scope,
            gotos: Vec::new(),
        });
        scope
    }

    fn keyword(&mut self, i: usize) -> usize {
        match self.tokens[i].text.as_str() {
            "MODULE" | "SHELLMODULE" => self.module_header(i),
            "PROC" | "PROCEDURE" => self.body_header(i, None, BlockKind::Proc),
            "TASK" => self.body_header(i, None, BlockKind::Task),
            "BEGIN" => {
                self.open_block(BlockKind::Begin, i);
                i + 1
            }
            "REPEAT" => {
                let scope = self.open_block(BlockKind::Repeat, i);
                if let Some(var) = self.pending_for.take() {
                    // the loop variable is implicitly FIXED inside the loop
                    let symbol = Symbol {
                        name: self.tokens[var].text.clone(),
                        kind: SymbolKind::Variable,
                        attributes: TypeAttributes {
                            base: Some("FIXED".to_string()),
                            ..Default::default()
                        },
                        name_token: var,
                        used: false,
                    };
                    self.declare_in_scope(scope, var, symbol);
                }
                i + 1
            }
            "FOR" => self.for_header(i),
            "IF" => {
                self.open_block(BlockKind::If, i);
                i + 1
            }
            "CASE" => {
                self.open_block(BlockKind::Case, i);
                i + 1
            }
            "ELSE" => self.else_keyword(i),
            "FIN" => self.close_block(i, &[BlockKind::If, BlockKind::Case]),
            "END" => self.close_block(
                i,
                &[
                    BlockKind::Task,
                    BlockKind::Proc,
                    BlockKind::Begin,
                    BlockKind::Repeat,
                ],
            ),
            "MODEND" => self.close_block(i, &[BlockKind::Module]),
            "DCL" | "DECLARE" | "SPC" | "SPECIFY" => self.declaration(i),
            "GOTO" => self.goto_statement(i),
            "CALL" => self.call_statement(i),
            "ACTIVATE" | "TERMINATE" | "SUSPEND" | "CONTINUE" | "RESUME" | "PREVENT" => {
                self.task_statement(i)
            }
            "REQUEST" | "RELEASE" | "SEMASET" => self.sync_statement(i, SymbolKind::Semaphore),
            "ENTER" | "LEAVE" | "RESERVE" | "FREE" => self.sync_statement(i, SymbolKind::Bolt),
            _ => i + 1,
        }
    }

    fn module_header(&mut self, i: usize) -> usize {
        if !self.frames.is_empty() {
            self.error(i, "only one `MODULE` may be open at a time");
            return self.resync(i + 1);
        }
        let mut next = i + 1;
        match self.sig(i + 1) {
            Some(n) if self.is_ident(n) => {
                let symbol = Symbol {
                    name: self.tokens[n].text.clone(),
                    kind: SymbolKind::Module,
                    attributes: TypeAttributes {
                        global: true,
                        ..Default::default()
                    },
                    name_token: n,
                    used: true,
                };
                match self.scopes.declare(symbol) {
                    Ok(id) => self.tokens[n].definition = Some(id),
                    Err(_) => {
                        let name = self.tokens[n].text.clone();
                        self.error(n, format!("`{name}` is already declared in this scope"));
                    }
                }
                next = n + 1;
            }
            _ => self.error(i, "expected a module name after `MODULE`"),
        }
        self.open_block(BlockKind::Module, i);
        next
    }

    /// PROC/TASK implementation header, in either the keyword-first form
    /// (`PROC P ...;`) or the label-prefixed form (`P: PROC ...;`).
    fn body_header(&mut self, kw: usize, name: Option<usize>, kind: BlockKind) -> usize {
        let keyword_text = self.tokens[kw].text.clone();
        let symbol_kind = if kind == BlockKind::Task {
            SymbolKind::Task
        } else {
            SymbolKind::Procedure
        };

        let mut cursor = kw + 1;
        let name_idx = match name {
            Some(n) => Some(n),
            None => match self.sig(cursor) {
                Some(n) if self.is_ident(n) => {
                    cursor = n + 1;
                    Some(n)
                }
                _ => {
                    self.error(kw, format!("expected a name after `{keyword_text}`"));
                    None
                }
            },
        };

        let at_module_level = self.frames.len() == 1 && self.frames[0].kind == BlockKind::Module;
        if !at_module_level {
            self.error(
                kw,
                format!("`{keyword_text}` bodies may only be declared at module level"),
            );
        }

        // Tolerate the doubled spelling `PROC P: PROC;` by skipping a
        // label-style repetition of the keyword after the name.
        if let Some(colon) = self.sig(cursor) {
            if self.is_sym(colon, ":") {
                if let Some(rep) = self.sig(colon + 1) {
                    if self.is_kw(rep, "PROC")
                        || self.is_kw(rep, "PROCEDURE")
                        || self.is_kw(rep, "TASK")
                    {
                        cursor = rep + 1;
                    }
                }
            }
        }

        let mut attrs = TypeAttributes::default();
        let mut params: Vec<(usize, TypeAttributes)> = Vec::new();
        let end = self.body_header_tail(kw, &mut cursor, kind, &mut attrs, &mut params);

        if let Some(n) = name_idx {
            let symbol = Symbol {
                name: self.tokens[n].text.clone(),
                kind: symbol_kind,
                attributes: attrs,
                name_token: n,
                // Bodies are externally visible entry points; their names
                // never count as unused.
                used: true,
            };
            match self.scopes.declare_module_level(symbol) {
                Ok(id) => self.tokens[n].definition = Some(id),
                Err(_) => {
                    let name = self.tokens[n].text.clone();
                    self.error(n, format!("`{name}` is already declared in this scope"));
                }
            }
        }

        let scope = self.open_block(kind, kw);
        for (idx, pattrs) in params {
            let symbol = Symbol {
                name: self.tokens[idx].text.clone(),
                kind: SymbolKind::Variable,
                attributes: pattrs,
                name_token: idx,
                used: false,
            };
            self.declare_in_scope(scope, idx, symbol);
        }
        end
    }

    /// Parse `(params)? RETURNS(...)? PRIO n? GLOBAL? ;` after a body
    /// header's name. Returns the index to continue the walk at.
    fn body_header_tail(
        &mut self,
        kw: usize,
        cursor: &mut usize,
        kind: BlockKind,
        attrs: &mut TypeAttributes,
        params: &mut Vec<(usize, TypeAttributes)>,
    ) -> usize {
        // parameter list
        if let Some(open) = self.sig(*cursor) {
            if self.is_sym(open, "(") {
                let mut k = self.sig(open + 1);
                loop {
                    match k {
                        Some(idx) if self.is_sym(idx, ")") => {
                            *cursor = idx + 1;
                            break;
                        }
                        Some(idx) if self.is_ident(idx) => {
                            let mut pattrs = TypeAttributes {
                                parameter: true,
                                ..Default::default()
                            };
                            let mut at = self.sig(idx + 1);
                            while let Some(a) = at {
                                if self.tokens[a].kind == TokenKind::Keyword {
                                    self.apply_attribute_word(a, &mut pattrs, None);
                                    at = self.sig(a + 1);
                                } else if self.is_sym(a, "(") {
                                    let after = self.skip_parens(a);
                                    at = self.sig(after);
                                } else {
                                    break;
                                }
                            }
                            params.push((idx, pattrs));
                            match at {
                                Some(a) if self.is_sym(a, ",") => {
                                    k = self.sig(a + 1);
                                }
                                Some(a) if self.is_sym(a, ")") => {
                                    *cursor = a + 1;
                                    break;
                                }
                                _ => {
                                    self.error(kw, "expected `,` or `)` in the parameter list");
                                    return self.resync(at.unwrap_or(idx + 1));
                                }
                            }
                        }
                        _ => {
                            self.error(kw, "unterminated parameter list");
                            return self.resync(k.unwrap_or(open + 1));
                        }
                    }
                }
            }
        }

        // RETURNS clause
        if let Some(r) = self.sig(*cursor) {
            if self.is_kw(r, "RETURNS") {
                match self.sig(r + 1) {
                    Some(open) if self.is_sym(open, "(") => {
                        let close = self.skip_parens(open);
                        let inner_end = close.saturating_sub(1).max(open + 1);
                        let words: Vec<&str> = self.tokens[open + 1..inner_end]
                            .iter()
                            .filter(|t| is_significant(t))
                            .map(|t| t.text.as_str())
                            .collect();
                        attrs.returns = Some(words.join(" "));
                        *cursor = close;
                    }
                    _ => {
                        self.error(r, "expected `(` after `RETURNS`");
                        return self.resync(r + 1);
                    }
                }
            }
        }

        // PRIO clause on task headers
        if kind == BlockKind::Task {
            if let Some(p) = self.sig(*cursor) {
                if self.is_kw(p, "PRIO") || self.is_kw(p, "PRIORITY") {
                    match self.sig(p + 1) {
                        Some(n) if self.tokens[n].kind == TokenKind::Number => {
                            *cursor = n + 1;
                        }
                        _ => {
                            self.error(p, "expected a priority value after `PRIO`");
                            return self.resync(p + 1);
                        }
                    }
                }
            }
        }

        if let Some(g) = self.sig(*cursor) {
            if self.is_kw(g, "GLOBAL") {
                attrs.global = true;
                *cursor = g + 1;
            }
        }

        match self.sig(*cursor) {
            Some(s) if self.is_sym(s, ";") => s + 1,
            Some(s) => {
                self.error(s, "expected `;` at the end of the header");
                self.resync(s)
            }
            None => self.tokens.len(),
        }
    }

    fn for_header(&mut self, i: usize) -> usize {
        match self.sig(i + 1) {
            Some(n) if self.is_ident(n) => {
                self.pending_for = Some(n);
                n + 1
            }
            _ => {
                self.error(i, "expected a loop variable after `FOR`");
                i + 1
            }
        }
    }

    fn else_keyword(&mut self, i: usize) -> usize {
        match self.frames.last() {
            Some(frame) if frame.kind == BlockKind::If => {
                self.close_frame(i);
                // ELSE reopens a fresh conditional frame at the same depth
                self.open_block(BlockKind::If, i);
                i + 1
            }
            _ => {
                self.error(i, "`ELSE` without an open `IF` block");
                i + 1
            }
        }
    }

    fn close_block(&mut self, i: usize, permitted: &[BlockKind]) -> usize {
        let top = self.frames.last().map(|f| (f.kind, f.opening));
        match top {
            Some((kind, _)) if permitted.contains(&kind) => {
                self.close_frame(i);
                i + 1
            }
            Some((kind, opening)) => {
                let closer = self.tokens[i].text.clone();
                let open = self.tokens[opening].text.clone();
                let expected = kind.expected_closer();
                // no corrective pop: the stack is left unchanged
                self.error(
                    i,
                    format!(
                        "`{closer}` cannot close the open `{open}` block, expected `{expected}`"
                    ),
                );
                i + 1
            }
            None => {
                let closer = self.tokens[i].text.clone();
                self.error(i, format!("`{closer}` without an open block"));
                i + 1
            }
        }
    }

    /// Pop the top frame and its scope: resolve accumulated GOTOs, sweep
    /// unused symbols, record the folding region.
    fn close_frame(&mut self, closer: usize) {
        let frame = self.frames.pop().expect("caller checked the stack top");
        let popped = self.scopes.pop();

        if matches!(frame.kind, BlockKind::Proc | BlockKind::Task) {
            self.resolve_gotos(&frame, closer);
        }
        if frame.kind == BlockKind::Module {
            self.saw_modend = true;
        }
        self.sweep(popped);

        let opening = &self.tokens[frame.opening];
        let uri = opening.uri.clone();
        let start_line = opening.line;
        let end_line = self.tokens[closer].line;
        self.folds
            .push(FoldRegion::new(&uri, start_line, end_line, FoldKind::Region));
    }

    fn resolve_gotos(&mut self, frame: &BlockFrame, closer: usize) {
        for &target in &frame.gotos {
            let name = self.tokens[target].text.clone();
            match self.scopes.lookup_in(frame.scope, &name) {
                Some(id) if self.scopes.symbol(id).kind == SymbolKind::Label => {
                    self.scopes.mark_used(id);
                    if self.tokens[target].definition.is_none() {
                        self.tokens[target].definition = Some(id);
                    }
                }
                Some(id) => {
                    let kind = self.scopes.symbol(id).kind.describe();
                    self.error(
                        target,
                        format!("`{name}` is declared as a {kind}, expected a label"),
                    );
                }
                None => {
                    // dangling GOTO is reported where the body ends
                    self.error(closer, format!("label `{name}` is not defined"));
                }
            }
        }
    }

    fn sweep(&mut self, popped: Vec<SymbolId>) {
        for id in popped {
            let symbol = self.scopes.symbol(id);
            if symbol.used || symbol.attributes.global {
                continue;
            }
            let message = format!("{} `{}` is never used", symbol.kind.describe(), symbol.name);
            let token = self.tokens[symbol.name_token].clone();
            self.diags.push(Diag::warning(&token, message).unnecessary());
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    /// Parse a `DCL`/`SPC` statement up to its terminating `;`. Supports
    /// both the single-name form and the grouped `(a, b) TYPE` form.
    fn declaration(&mut self, i: usize) -> usize {
        let mut cursor = i + 1;
        loop {
            let Some(start) = self.sig(cursor) else {
                self.error(i, "unterminated declaration");
                return self.tokens.len();
            };
            if self.is_sym(start, ";") {
                return start + 1;
            }

            // collect the declared names of this group
            let mut names: Vec<usize> = Vec::new();
            let mut at;
            if self.is_sym(start, "(") {
                let mut k = self.sig(start + 1);
                let close;
                loop {
                    match k {
                        Some(idx) if self.is_ident(idx) => {
                            names.push(idx);
                            match self.sig(idx + 1) {
                                Some(s) if self.is_sym(s, ",") => k = self.sig(s + 1),
                                Some(s) if self.is_sym(s, ")") => {
                                    close = s;
                                    break;
                                }
                                _ => {
                                    self.error(idx, "expected `,` or `)` in declaration group");
                                    return self.resync(idx + 1);
                                }
                            }
                        }
                        Some(idx) if self.is_sym(idx, ")") => {
                            close = idx;
                            break;
                        }
                        _ => {
                            self.error(start, "expected a name in declaration group");
                            return self.resync(start + 1);
                        }
                    }
                }
                at = self.sig(close + 1);
            } else if self.is_ident(start) {
                names.push(start);
                at = self.sig(start + 1);
            } else {
                self.error(start, "expected a name in declaration");
                return self.resync(start + 1);
            }

            // dimension list directly after a single name
            let mut attrs = TypeAttributes::default();
            if names.len() == 1 {
                if let Some(open) = at {
                    if self.is_sym(open, "(") {
                        attrs.dimensions = self.count_dimension_entries(open);
                        let after = self.skip_parens(open);
                        at = self.sig(after);
                    }
                }
            }

            // attribute words up to `,` or `;`
            let mut kind = SymbolKind::Variable;
            let group_end;
            loop {
                match at {
                    Some(a) if self.tokens[a].kind == TokenKind::Keyword => {
                        self.apply_attribute_word(a, &mut attrs, Some(&mut kind));
                        let mut next = self.sig(a + 1);
                        // length/precision or INIT arguments
                        if let Some(n) = next {
                            if self.is_sym(n, "(") {
                                let after = self.skip_parens(n);
                                next = self.sig(after);
                            }
                        }
                        at = next;
                    }
                    Some(a) if self.is_sym(a, ",") => {
                        group_end = a + 1;
                        break;
                    }
                    Some(a) if self.is_sym(a, ";") => {
                        group_end = a;
                        break;
                    }
                    Some(a) => {
                        let text = self.tokens[a].text.clone();
                        self.error(a, format!("unexpected `{text}` in declaration"));
                        self.declare_names(&names, &attrs, kind);
                        return self.resync(a + 1);
                    }
                    None => {
                        self.error(i, "declaration is missing its terminating `;`");
                        self.declare_names(&names, &attrs, kind);
                        return self.tokens.len();
                    }
                }
            }

            self.declare_names(&names, &attrs, kind);
            if group_end < self.tokens.len() && self.is_sym(group_end, ";") {
                return group_end + 1;
            }
            cursor = group_end;
        }
    }

    /// Interpret one attribute keyword inside a declaration or parameter
    /// list.
    fn apply_attribute_word(
        &mut self,
        i: usize,
        attrs: &mut TypeAttributes,
        kind: Option<&mut SymbolKind>,
    ) {
        let word = self.tokens[i].text.clone();
        match word.as_str() {
            "INV" => attrs.inv = true,
            "REF" => attrs.by_ref = true,
            "GLOBAL" => attrs.global = true,
            "INIT" => attrs.init = true,
            "IDENT" => attrs.ident = true,
            "SEMA" => {
                attrs.base = Some(word);
                if let Some(kind) = kind {
                    *kind = SymbolKind::Semaphore;
                }
            }
            "BOLT" => {
                attrs.base = Some(word);
                if let Some(kind) = kind {
                    *kind = SymbolKind::Bolt;
                }
            }
            "PROC" | "PROCEDURE" => {
                if let Some(kind) = kind {
                    *kind = SymbolKind::Procedure;
                }
            }
            "TASK" => {
                if let Some(kind) = kind {
                    *kind = SymbolKind::Task;
                }
            }
            "RETURNS" => {}
            _ if crate::keywords::is_type(&word) => attrs.base = Some(word),
            _ => {}
        }
    }

    fn count_dimension_entries(&self, open: usize) -> usize {
        let mut depth = 0usize;
        let mut entries = 1usize;
        let mut i = open;
        while i < self.tokens.len() {
            if is_significant(&self.tokens[i]) {
                if self.is_sym(i, "(") {
                    depth += 1;
                } else if self.is_sym(i, ")") {
                    if depth == 1 {
                        break;
                    }
                    depth -= 1;
                } else if self.is_sym(i, ",") && depth == 1 {
                    entries += 1;
                } else if self.is_sym(i, ";") {
                    break;
                }
            }
            i += 1;
        }
        entries
    }

    fn declare_names(&mut self, names: &[usize], attrs: &TypeAttributes, kind: SymbolKind) {
        for &idx in names {
            let symbol = Symbol {
                name: self.tokens[idx].text.clone(),
                kind,
                attributes: attrs.clone(),
                name_token: idx,
                used: attrs.global || matches!(kind, SymbolKind::Task | SymbolKind::Procedure),
            };
            match self.scopes.declare(symbol) {
                Ok(id) => self.tokens[idx].definition = Some(id),
                Err(_) => {
                    let name = self.tokens[idx].text.clone();
                    self.error(idx, format!("`{name}` is already declared in this scope"));
                }
            }
        }
    }

    fn declare_in_scope(&mut self, scope: usize, name_idx: usize, symbol: Symbol) {
        match self.scopes.declare_in(scope, symbol) {
            Ok(id) => self.tokens[name_idx].definition = Some(id),
            Err(_) => {
                let name = self.tokens[name_idx].text.clone();
                self.error(
                    name_idx,
                    format!("`{name}` is already declared in this scope"),
                );
            }
        }
    }

    fn declare_label(&mut self, i: usize) {
        // Labels live one level inside the enclosing PROC/TASK, never
        // deeper and never truly global.
        let scope = self
            .frames
            .iter()
            .rev()
            .find(|f| matches!(f.kind, BlockKind::Proc | BlockKind::Task))
            .map(|f| f.scope)
            .unwrap_or_else(|| self.scopes.current());
        let symbol = Symbol {
            name: self.tokens[i].text.clone(),
            kind: SymbolKind::Label,
            attributes: TypeAttributes::default(),
            name_token: i,
            used: false,
        };
        self.declare_in_scope(scope, i, symbol);
    }

    // ------------------------------------------------------------------
    // Statements and references
    // ------------------------------------------------------------------

    fn goto_statement(&mut self, i: usize) -> usize {
        match self.sig(i + 1) {
            Some(target) if self.is_ident(target) => {
                match self
                    .frames
                    .iter_mut()
                    .rev()
                    .find(|f| matches!(f.kind, BlockKind::Proc | BlockKind::Task))
                {
                    Some(frame) => frame.gotos.push(target),
                    None => self.error(i, "`GOTO` outside of a PROC or TASK body"),
                }
                target + 1
            }
            _ => {
                self.error(i, "expected a label after `GOTO`");
                i + 1
            }
        }
    }

    fn call_statement(&mut self, i: usize) -> usize {
        match self.sig(i + 1) {
            Some(name) if self.is_ident(name) => {
                self.resolve(name, Some(SymbolKind::Procedure), true, true);
                name + 1
            }
            _ => {
                self.error(i, "expected a procedure name after `CALL`");
                i + 1
            }
        }
    }

    fn task_statement(&mut self, i: usize) -> usize {
        let keyword = self.tokens[i].text.clone();
        let (name_rule, prio_rule) = task_statement_rules(&keyword);

        let mut cursor = i + 1;
        match self.sig(cursor) {
            Some(n) if self.is_ident(n) => {
                if name_rule == Presence::Forbidden {
                    self.error(n, format!("`{keyword}` does not take a task name"));
                } else {
                    self.resolve(n, Some(SymbolKind::Task), false, true);
                }
                cursor = n + 1;
            }
            _ => {
                if name_rule == Presence::Required {
                    self.error(i, format!("`{keyword}` requires a task name"));
                }
            }
        }

        if let Some(p) = self.sig(cursor) {
            if self.is_kw(p, "PRIO") || self.is_kw(p, "PRIORITY") {
                if prio_rule == Presence::Forbidden {
                    self.error(p, format!("`{keyword}` does not take a `PRIO` clause"));
                }
                match self.sig(p + 1) {
                    Some(n) if self.tokens[n].kind == TokenKind::Number => {
                        cursor = n + 1;
                    }
                    _ => {
                        self.error(p, "expected a priority value after `PRIO`");
                        cursor = p + 1;
                    }
                }
            } else if prio_rule == Presence::Required {
                self.error(i, format!("`{keyword}` requires a `PRIO` clause"));
            }
        }
        cursor
    }

    /// SEMA (`REQUEST`/`RELEASE`/`SEMASET`) and BOLT
    /// (`ENTER`/`LEAVE`/`RESERVE`/`FREE`) statements: every listed operand
    /// must resolve to the required kind.
    fn sync_statement(&mut self, i: usize, required: SymbolKind) -> usize {
        let keyword = self.tokens[i].text.clone();
        let mut cursor = i + 1;
        let mut seen_any = false;
        loop {
            match self.sig(cursor) {
                Some(n) if self.is_ident(n) => {
                    self.resolve(n, Some(required), false, true);
                    seen_any = true;
                    match self.sig(n + 1) {
                        Some(c) if self.is_sym(c, ",") => cursor = c + 1,
                        _ => return n + 1,
                    }
                }
                Some(n) => {
                    if !seen_any {
                        self.error(
                            i,
                            format!(
                                "`{keyword}` requires at least one {} name",
                                required.describe()
                            ),
                        );
                    }
                    return n;
                }
                None => return self.tokens.len(),
            }
        }
    }

    fn identifier(&mut self, i: usize) -> usize {
        let next = self.sig(i + 1);

        // label or label-prefixed body header
        if let Some(colon) = next {
            if self.is_sym(colon, ":") {
                if let Some(after) = self.sig(colon + 1) {
                    if self.is_kw(after, "PROC") || self.is_kw(after, "PROCEDURE") {
                        return self.body_header(after, Some(i), BlockKind::Proc);
                    }
                    if self.is_kw(after, "TASK") {
                        return self.body_header(after, Some(i), BlockKind::Task);
                    }
                }
                self.declare_label(i);
                return colon + 1;
            }
        }

        let call_position = matches!(next, Some(n) if self.is_sym(n, "("));
        // A plain assignment target is resolved but does not count as a
        // use; only reads mark a symbol used.
        let assignment = matches!(next, Some(n) if self.tokens[n].text == ":=");
        self.resolve(i, None, call_position, !assignment);
        i + 1
    }

    /// Scope-stack lookup for the identifier at `i`. The first name match
    /// wins; a kind mismatch at that match is a resolution failure, not a
    /// fallthrough to an outer shadowed name.
    fn resolve(
        &mut self,
        i: usize,
        required: Option<SymbolKind>,
        call_position: bool,
        mark_used: bool,
    ) {
        let name = self.tokens[i].text.clone();
        match self.scopes.lookup(&name) {
            Some(id) => {
                let kind = self.scopes.symbol(id).kind;
                if let Some(required) = required {
                    if kind != required {
                        self.error(
                            i,
                            format!(
                                "`{name}` is declared as a {}, expected a {}",
                                kind.describe(),
                                required.describe()
                            ),
                        );
                        self.scopes.mark_used(id);
                        return;
                    }
                }
                if self.tokens[i].definition.is_none() {
                    self.tokens[i].definition = Some(id);
                }
                if mark_used {
                    self.scopes.mark_used(id);
                }
            }
            None => {
                if call_position {
                    if let Some(builtin) = builtins::lookup(&name) {
                        self.tokens[i].builtin = Some(builtin);
                        return;
                    }
                }
                self.error(i, format!("`{name}` is not declared"));
            }
        }
    }
}
