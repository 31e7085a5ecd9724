use tower_lsp::lsp_types::{Position, Range, Url};

use crate::builtins::Builtin;

/// Index of a symbol in the analysis symbol arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub usize);

/// Lexical class of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Reserved or type-introducing keyword, including preprocessor
    /// directive lines (their text starts with `#`).
    Keyword,
    Identifier,
    Number,
    String,
    /// Character string with a `B`/`B1`..`B4` suffix.
    BitString,
    /// Operator, spelled symbolically or as a word (`AND`, `REM`, ...).
    Operator,
    /// Structural punctuation: `;`, `,`, `(`, `)`, `:`, ...
    Symbol,
    Comment,
    /// A line excluded by a false preprocessor conditional.
    Inactive,
    /// Marker for a macro reference whose replacement produced no tokens.
    MacroExpansion,
    /// Single illegal character; lexing continues after it.
    Error,
}

/// One lexed token. Position fields are immutable once created; the
/// annotation fields (`definition`, `builtin`, `macro_value`) are written by
/// the semantic analyzer and the preprocessor.
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Source the token came from; tokens spliced in from an `#include`
    /// carry the included file's uri.
    pub uri: Url,
    /// Zero-based line in `uri`.
    pub line: u32,
    /// Zero-based column in UTF-16 code units, as the protocol counts.
    pub column: u32,
    /// Byte offset in `uri`'s text.
    pub offset: usize,
    /// Length in UTF-16 code units; for macro-replacement tokens this is the
    /// length of the invoking reference, not of the replacement text.
    pub length: usize,
    /// Back-reference to the declaring symbol, set at most once.
    pub definition: Option<SymbolId>,
    /// Entry in the static builtin-procedure table, for call-position
    /// identifiers that resolved against it.
    pub builtin: Option<&'static Builtin>,
    /// Replacement text of the macro this token was expanded from.
    pub macro_value: Option<String>,
}

impl Token {
    pub fn new(
        kind: TokenKind,
        text: impl Into<String>,
        uri: &Url,
        line: u32,
        column: u32,
        offset: usize,
    ) -> Self {
        let text = text.into();
        let length = utf16_len(&text);
        Self {
            kind,
            text,
            uri: uri.clone(),
            line,
            column,
            offset,
            length,
            definition: None,
            builtin: None,
            macro_value: None,
        }
    }

    /// The single-line range this token covers.
    pub fn range(&self) -> Range {
        Range::new(
            Position::new(self.line, self.column),
            Position::new(self.line, self.column + self.length as u32),
        )
    }

    /// Whether `position` falls inside this token's span.
    pub fn covers(&self, position: Position) -> bool {
        position.line == self.line
            && position.character >= self.column
            && position.character < self.column + self.length as u32
    }
}

/// Length of `text` in UTF-16 code units.
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}
