//! Diagnostic values produced by the lexer and the analyzer, and their
//! conversion into LSP diagnostics at the protocol boundary.

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, DiagnosticTag, Range, Url};

use crate::token::Token;

pub const SOURCE_ANALYSIS: &str = "pearl";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Hint,
}

/// One diagnostic, anchored in the file it was produced for (which is the
/// included file's uri when the offending token came from an `#include`).
#[derive(Debug, Clone)]
pub struct Diag {
    pub uri: Url,
    pub range: Range,
    pub severity: Severity,
    pub message: String,
    /// Marks inactive/unused code so clients can render it dimmed.
    pub unnecessary: bool,
}

impl Diag {
    pub fn error(token: &Token, message: impl Into<String>) -> Self {
        Self::at(token, Severity::Error, message)
    }

    pub fn warning(token: &Token, message: impl Into<String>) -> Self {
        Self::at(token, Severity::Warning, message)
    }

    pub fn hint(token: &Token, message: impl Into<String>) -> Self {
        Self {
            unnecessary: true,
            ..Self::at(token, Severity::Hint, message)
        }
    }

    pub fn at(token: &Token, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            uri: token.uri.clone(),
            range: token.range(),
            severity,
            message: message.into(),
            unnecessary: false,
        }
    }

    /// Tag this diagnostic as removable/dimmable code.
    pub fn unnecessary(mut self) -> Self {
        self.unnecessary = true;
        self
    }
}

fn map_severity(severity: Severity) -> DiagnosticSeverity {
    match severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
        Severity::Hint => DiagnosticSeverity::HINT,
    }
}

pub fn to_lsp(diag: &Diag) -> Diagnostic {
    Diagnostic {
        range: diag.range,
        severity: Some(map_severity(diag.severity)),
        source: Some(SOURCE_ANALYSIS.to_string()),
        message: diag.message.clone(),
        tags: diag.unnecessary.then(|| vec![DiagnosticTag::UNNECESSARY]),
        ..Default::default()
    }
}

/// The diagnostics belonging to one document, as LSP values.
pub fn for_document(diags: &[Diag], uri: &Url) -> Vec<Diagnostic> {
    diags.iter().filter(|d| &d.uri == uri).map(to_lsp).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    fn test_token(uri: &str) -> Token {
        let uri = Url::parse(uri).unwrap();
        Token::new(TokenKind::Identifier, "X", &uri, 2, 1, 10)
    }

    #[test]
    fn hint_carries_unnecessary_tag() {
        let diag = Diag::hint(&test_token("file:///a.prl"), "inactive code");
        let lsp = to_lsp(&diag);
        assert_eq!(lsp.severity, Some(DiagnosticSeverity::HINT));
        assert_eq!(lsp.tags, Some(vec![DiagnosticTag::UNNECESSARY]));
    }

    #[test]
    fn for_document_filters_by_uri() {
        let diags = vec![
            Diag::error(&test_token("file:///a.prl"), "one"),
            Diag::error(&test_token("file:///b.prl"), "two"),
        ];
        let doc = Url::parse("file:///a.prl").unwrap();
        let published = for_document(&diags, &doc);
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].message, "one");
    }
}
