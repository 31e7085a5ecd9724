//! Foldable regions collected during lexing (comments, preprocessor
//! conditionals) and analysis (matched block-open/close pairs).

use tower_lsp::lsp_types::{FoldingRange, FoldingRangeKind, Url};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldKind {
    /// Multi-line block comment.
    Comment,
    /// Matched block open/close pair (MODULE..MODEND, PROC..END, ...).
    Region,
    /// `#ifdef`..`#endif` conditional region.
    Preproc,
}

#[derive(Debug, Clone)]
pub struct FoldRegion {
    pub uri: Url,
    pub start_line: u32,
    pub end_line: u32,
    pub kind: FoldKind,
    /// Collapsed-text label, e.g. the opening directive.
    pub label: Option<String>,
}

impl FoldRegion {
    pub fn new(uri: &Url, start_line: u32, end_line: u32, kind: FoldKind) -> Self {
        Self {
            uri: uri.clone(),
            start_line,
            end_line,
            kind,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Convert the recorded regions belonging to `uri` into protocol folding
/// ranges. Single-line regions are dropped, they cannot fold.
pub fn folding_ranges(regions: &[FoldRegion], uri: &Url) -> Vec<FoldingRange> {
    regions
        .iter()
        .filter(|r| &r.uri == uri && r.end_line > r.start_line)
        .map(|r| FoldingRange {
            start_line: r.start_line,
            start_character: None,
            end_line: r.end_line,
            end_character: None,
            kind: Some(match r.kind {
                FoldKind::Comment => FoldingRangeKind::Comment,
                FoldKind::Region | FoldKind::Preproc => FoldingRangeKind::Region,
            }),
            collapsed_text: r.label.clone(),
        })
        .collect()
}
