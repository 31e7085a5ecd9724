//! Semantic token classification and delta encoding.
//!
//! The analyzed token array, filtered of comments and inactive text, is
//! mapped onto a fixed small set of semantic classes and delta-encoded the
//! way the protocol wants it. Identifiers classify by the symbol their
//! definition link points at; everything else classifies lexically.

use tower_lsp::lsp_types::{
    SemanticToken, SemanticTokenModifier, SemanticTokenType, SemanticTokens, SemanticTokensLegend,
    Url,
};

use crate::analysis::scope::SymbolKind;
use crate::analysis::Analysis;
use crate::keywords;
use crate::token::{Token, TokenKind};

// Indices into the legend; keep both lists in sync.
const TYPE: u32 = 0;
const VARIABLE: u32 = 1;
const PARAMETER: u32 = 2;
const FUNCTION: u32 = 3;
const CLASS: u32 = 4;
const PROPERTY: u32 = 5;
const LABEL: u32 = 6;
const OPERATOR: u32 = 7;
const STRING: u32 = 8;
const NUMBER: u32 = 9;

const MOD_DECLARATION: u32 = 1 << 0;

/// The legend advertised in the server capabilities.
pub fn legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: vec![
            SemanticTokenType::TYPE,
            SemanticTokenType::VARIABLE,
            SemanticTokenType::PARAMETER,
            SemanticTokenType::FUNCTION,
            SemanticTokenType::CLASS,
            SemanticTokenType::PROPERTY,
            SemanticTokenType::new("label"),
            SemanticTokenType::OPERATOR,
            SemanticTokenType::STRING,
            SemanticTokenType::NUMBER,
        ],
        token_modifiers: vec![SemanticTokenModifier::DECLARATION],
    }
}

/// Classify one token; `None` drops it from the stream.
fn classify(analysis: &Analysis, idx: usize, token: &Token) -> Option<(u32, u32)> {
    match token.kind {
        TokenKind::Keyword => {
            if token.text.starts_with('#') {
                return None;
            }
            keywords::is_type(&token.text).then_some((TYPE, 0))
        }
        TokenKind::Operator => Some((OPERATOR, 0)),
        TokenKind::String | TokenKind::BitString => Some((STRING, 0)),
        TokenKind::Number => Some((NUMBER, 0)),
        TokenKind::Identifier => {
            if let Some(id) = token.definition {
                let symbol = analysis.symbol(id);
                let class = match symbol.kind {
                    SymbolKind::Variable if symbol.attributes.parameter => PARAMETER,
                    SymbolKind::Variable => VARIABLE,
                    SymbolKind::Procedure => FUNCTION,
                    SymbolKind::Task | SymbolKind::Module => CLASS,
                    SymbolKind::Semaphore | SymbolKind::Bolt => PROPERTY,
                    SymbolKind::Label => LABEL,
                };
                let modifiers = if symbol.name_token == idx {
                    MOD_DECLARATION
                } else {
                    0
                };
                Some((class, modifiers))
            } else if token.builtin.is_some() {
                Some((FUNCTION, 0))
            } else {
                Some((VARIABLE, 0))
            }
        }
        TokenKind::Symbol
        | TokenKind::Comment
        | TokenKind::Inactive
        | TokenKind::MacroExpansion
        | TokenKind::Error => None,
    }
}

/// Build the full semantic-token stream for one document.
pub fn semantic_tokens_full(analysis: &Analysis, uri: &Url) -> SemanticTokens {
    let mut raw: Vec<(u32, u32, u32, u32, u32)> = Vec::new();
    for (idx, token) in analysis.tokens.iter().enumerate() {
        if &token.uri != uri {
            continue;
        }
        let Some((class, modifiers)) = classify(analysis, idx, token) else {
            continue;
        };
        raw.push((token.line, token.column, token.length as u32, class, modifiers));
    }
    raw.sort_by_key(|&(line, column, ..)| (line, column));
    // macro replacements share the reference's span; keep the first token
    raw.dedup_by_key(|&mut (line, column, ..)| (line, column));

    let mut data = Vec::with_capacity(raw.len());
    let mut prev_line = 0u32;
    let mut prev_col = 0u32;
    for (line, column, length, token_type, modifiers) in raw {
        let delta_line = line - prev_line;
        let delta_start = if delta_line == 0 {
            column - prev_col
        } else {
            column
        };
        data.push(SemanticToken {
            delta_line,
            delta_start,
            length,
            token_type,
            token_modifiers_bitset: modifiers,
        });
        prev_line = line;
        prev_col = column;
    }

    SemanticTokens {
        result_id: None,
        data,
    }
}
