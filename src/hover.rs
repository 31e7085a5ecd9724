//! Hover content derived from the cached analysis.
//!
//! Priority order: macro-expansion text, then the linked symbol's
//! declaration-site attributes, then builtin signatures, then a generic
//! token description. Comments and literals get no hover.

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position, Url};

use crate::analysis::scope::{Symbol, SymbolKind};
use crate::analysis::Analysis;
use crate::token::TokenKind;

/// Answer a hover request against the cached analysis.
pub fn hover(analysis: &Analysis, uri: &Url, position: Position) -> Option<Hover> {
    let (_, token) = analysis.token_at(uri, position)?;

    // Macro references win even when their replacement is a literal.
    if token.macro_value.is_none()
        && matches!(
            token.kind,
            TokenKind::Comment
                | TokenKind::Inactive
                | TokenKind::Number
                | TokenKind::String
                | TokenKind::BitString
                | TokenKind::Error
        )
    {
        return None;
    }

    let text = if let Some(value) = &token.macro_value {
        let shown = if value.is_empty() { "(empty)" } else { value };
        format!("```pearl\n{shown}\n```\n\n---\n\npreprocessor macro expansion")
    } else if let Some(id) = token.definition {
        let symbol = analysis.symbol(id);
        let declared = analysis.definition_token(id);
        format!(
            "```pearl\n{}\n```\n\n---\n\ndeclared on line {}",
            declaration_signature(symbol),
            declared.line + 1
        )
    } else if let Some(builtin) = token.builtin {
        format!(
            "```pearl\n{}\n```\n\n---\n\n{}",
            builtin.signature, builtin.description
        )
    } else {
        match token.kind {
            TokenKind::Keyword => format!("keyword `{}`", token.text),
            TokenKind::Operator => format!("operator `{}`", token.text),
            _ => return None,
        }
    };

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: text,
        }),
        range: Some(token.range()),
    })
}

/// Render a symbol the way its declaration would read.
pub fn declaration_signature(symbol: &Symbol) -> String {
    let attrs = &symbol.attributes;
    match symbol.kind {
        SymbolKind::Module => format!("MODULE {};", symbol.name),
        SymbolKind::Task => format!("{}: TASK;", symbol.name),
        SymbolKind::Procedure => {
            let mut out = format!("{}: PROC", symbol.name);
            if let Some(returns) = &attrs.returns {
                out.push_str(&format!(" RETURNS({returns})"));
            }
            if attrs.global {
                out.push_str(" GLOBAL");
            }
            out.push(';');
            out
        }
        SymbolKind::Label => format!("{}: (label)", symbol.name),
        SymbolKind::Variable | SymbolKind::Semaphore | SymbolKind::Bolt => {
            let mut out = if attrs.parameter {
                format!("parameter {}", symbol.name)
            } else {
                format!("DCL {}", symbol.name)
            };
            if attrs.dimensions > 0 {
                let stars = vec!["*"; attrs.dimensions].join(",");
                out.push_str(&format!("({stars})"));
            }
            if let Some(base) = &attrs.base {
                out.push_str(&format!(" {base}"));
            }
            for (set, flag) in [
                (attrs.inv, "INV"),
                (attrs.by_ref, "REF"),
                (attrs.init, "INIT"),
                (attrs.ident, "IDENT"),
                (attrs.global, "GLOBAL"),
            ] {
                if set {
                    out.push(' ');
                    out.push_str(flag);
                }
            }
            if !attrs.parameter {
                out.push(';');
            }
            out
        }
    }
}
