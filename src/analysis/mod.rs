//! Document analysis: lexing plus the single-pass semantic walk.
//!
//! One `Analysis` value is built per document version and atomically
//! replaces the cached one; every editor request reads from it without
//! re-running anything.

mod analyzer;
pub mod scope;

pub use analyzer::{analyze_tokens, AnalyzerOutput};

use thiserror::Error;
use tower_lsp::lsp_types::{Position, Url};

use crate::diagnostics::Diag;
use crate::folding::FoldRegion;
use crate::include::IncludeCache;
use crate::lexer::{lex, LexConfig};
use crate::token::{SymbolId, Token, TokenKind};

use scope::Symbol;

/// Errors that can occur when resolving the symbol under a cursor.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no token at position {line}:{column}")]
    NoTokenAtPosition { line: u32, column: u32 },

    #[error("`{0}` is not an identifier")]
    NotAnIdentifier(String),

    #[error("`{0}` does not resolve to a declaration")]
    Unresolved(String),
}

/// The complete, immutable result of one analysis run.
#[derive(Debug)]
pub struct Analysis {
    pub uri: Url,
    pub tokens: Vec<Token>,
    pub symbols: Vec<Symbol>,
    pub diagnostics: Vec<Diag>,
    pub folding: Vec<FoldRegion>,
    /// Byte offset of each line start in the root document.
    pub line_offsets: Vec<usize>,
}

impl Analysis {
    /// The token covering `position` in `uri`, together with its index.
    /// Macro-replacement tokens share the reference's span; the first one
    /// wins, which is also the one hover wants.
    pub fn token_at(&self, uri: &Url, position: Position) -> Option<(usize, &Token)> {
        self.tokens
            .iter()
            .enumerate()
            .find(|(_, t)| &t.uri == uri && t.covers(position))
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0]
    }

    /// The defining occurrence token of a symbol.
    pub fn definition_token(&self, id: SymbolId) -> &Token {
        &self.tokens[self.symbol(id).name_token]
    }

    /// Resolve the symbol under `position`, for hover/goto style queries.
    pub fn resolve_symbol_at(
        &self,
        uri: &Url,
        position: Position,
    ) -> Result<(SymbolId, &Symbol), ResolveError> {
        let (_, token) =
            self.token_at(uri, position)
                .ok_or(ResolveError::NoTokenAtPosition {
                    line: position.line,
                    column: position.character,
                })?;
        if token.kind != TokenKind::Identifier {
            return Err(ResolveError::NotAnIdentifier(token.text.clone()));
        }
        let id = token
            .definition
            .ok_or_else(|| ResolveError::Unresolved(token.text.clone()))?;
        Ok((id, self.symbol(id)))
    }

    /// Byte offset of a position in the root document, if it exists.
    pub fn offset_at(&self, position: Position) -> Option<usize> {
        let line_start = *self.line_offsets.get(position.line as usize)?;
        Some(line_start + position.character as usize)
    }
}

/// Run lexer and analyzer over `text`, resolving includes through `includes`.
pub fn analyze(text: &str, uri: &Url, config: &LexConfig, includes: &IncludeCache) -> Analysis {
    let lexed = lex(text, uri, config, includes);
    let mut diagnostics = lexed.diagnostics;
    let mut folding = lexed.folding;

    let walked = analyze_tokens(lexed.tokens);
    diagnostics.extend(walked.diagnostics);
    folding.extend(walked.folding);

    Analysis {
        uri: uri.clone(),
        tokens: walked.tokens,
        symbols: walked.symbols,
        diagnostics,
        folding,
        line_offsets: lexed.line_offsets,
    }
}

/// Bounded variant of the analysis: lex as usual, then walk only until the
/// first root-document token past `cutoff` and report the symbols in scope
/// there.
pub fn visible_symbols_at(
    text: &str,
    uri: &Url,
    config: &LexConfig,
    includes: &IncludeCache,
    cutoff: usize,
) -> Vec<Symbol> {
    let lexed = lex(text, uri, config, includes);
    analyzer::visible_symbols(lexed.tokens, uri, cutoff)
}
