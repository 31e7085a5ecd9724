//! Semantic token streams over the LSP boundary.

mod common;

use common::fixtures::inline;
use common::harness::TestHarness;
use pearl_lsp::semantic_tokens::legend;

#[tokio::test]
async fn stream_covers_identifiers_types_and_literals() {
    let harness = TestHarness::new().await;
    let uri = harness
        .open_inline("control.prl", inline::CONTROL_MODULE)
        .await;

    let tokens = harness.semantic_tokens(&uri).await;
    assert!(!tokens.data.is_empty());
    // every class index fits the advertised legend
    let legend_len = legend().token_types.len() as u32;
    assert!(tokens.data.iter().all(|t| t.token_type < legend_len));
}

#[tokio::test]
async fn comments_and_inactive_lines_are_not_classified() {
    let harness = TestHarness::new().await;
    let text = "! only a comment\n#ifdef UNSET\nDCL HIDDEN FIXED;\n#endif\n";
    let uri = harness.open_inline("quiet.prl", text).await;

    let tokens = harness.semantic_tokens(&uri).await;
    assert!(tokens.data.is_empty());
}

#[tokio::test]
async fn deltas_reconstruct_the_document_order() {
    let harness = TestHarness::new().await;
    let uri = harness
        .open_inline("control.prl", inline::CONTROL_MODULE)
        .await;

    let tokens = harness.semantic_tokens(&uri).await;
    let mut line = 0u32;
    let mut last_line = 0u32;
    let mut last_col = 0u32;
    for token in &tokens.data {
        line += token.delta_line;
        let col = if token.delta_line == 0 {
            last_col + token.delta_start
        } else {
            token.delta_start
        };
        assert!(
            line > last_line || (line == last_line && col >= last_col),
            "stream must be position-ordered"
        );
        last_line = line;
        last_col = col;
    }
}

#[tokio::test]
async fn declarations_carry_the_declaration_modifier() {
    let harness = TestHarness::new().await;
    let text = "MODULE M;\nDCL X FIXED GLOBAL;\nMODEND;\n";
    let uri = harness.open_inline("decl.prl", text).await;

    let tokens = harness.semantic_tokens(&uri).await;
    let declared: Vec<_> = tokens
        .data
        .iter()
        .filter(|t| t.token_modifiers_bitset == 1)
        .collect();
    // M and X are declaring occurrences
    assert_eq!(declared.len(), 2);
}
