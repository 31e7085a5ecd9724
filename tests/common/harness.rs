//! Test harness driving the backend through the LSP surface.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use pearl_lsp::client::PublishDiagnostics;
use pearl_lsp::server::Backend;
use pearl_lsp::ServerConfig;
use tokio::sync::Mutex;
use tower_lsp::lsp_types::{
    Diagnostic, DidCloseTextDocumentParams, DidOpenTextDocumentParams, FoldingRange,
    FoldingRangeParams, GotoDefinitionParams, GotoDefinitionResponse, Hover, HoverParams, Location,
    Position, SemanticTokens, SemanticTokensParams, SemanticTokensResult, TextDocumentIdentifier,
    TextDocumentItem, TextDocumentPositionParams, Url,
};
use tower_lsp::LanguageServer;

use super::fixtures::{find_position, fixture_uri};

/// A recording LSP client that captures published diagnostics.
#[derive(Clone, Default)]
pub struct RecordingClient {
    published: Arc<Mutex<Vec<(Url, Vec<Diagnostic>, Option<i32>)>>>,
}

#[async_trait]
impl PublishDiagnostics for RecordingClient {
    async fn publish_diagnostics(
        &self,
        uri: Url,
        diagnostics: Vec<Diagnostic>,
        version: Option<i32>,
    ) {
        let mut guard = self.published.lock().await;
        guard.push((uri, diagnostics, version));
    }
}

impl RecordingClient {
    /// The most recently published diagnostics for a uri.
    pub async fn diagnostics_for(&self, uri: &Url) -> Vec<Diagnostic> {
        let guard = self.published.lock().await;
        guard
            .iter()
            .rev()
            .find(|(u, _, _)| u == uri)
            .map(|(_, d, _)| d.clone())
            .unwrap_or_default()
    }
}

/// Test harness that wraps a Backend with a RecordingClient.
pub struct TestHarness {
    pub backend: Backend<RecordingClient>,
    pub client: RecordingClient,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_config(ServerConfig::default()).await
    }

    pub async fn with_config(config: ServerConfig) -> Self {
        let client = RecordingClient::default();
        let backend = Backend::new_with_config(client.clone(), config);
        Self { backend, client }
    }

    /// Open a document in the backend.
    pub async fn open_doc(&self, uri: Url, text: String) {
        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri,
                language_id: "pearl".into(),
                version: 1,
                text,
            },
        };
        self.backend.did_open(params).await;
    }

    /// Open inline content with a generated uri.
    pub async fn open_inline(&self, name: &str, content: &str) -> Url {
        let uri = fixture_uri(name);
        self.open_doc(uri.clone(), content.to_string()).await;
        uri
    }

    pub async fn close_doc(&self, uri: &Url) {
        self.backend
            .did_close(DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri: uri.clone() },
            })
            .await;
    }

    pub async fn assert_no_diagnostics(&self, uri: &Url) {
        let diags = self.client.diagnostics_for(uri).await;
        assert!(
            diags.is_empty(),
            "expected no diagnostics for {uri}, got: {diags:?}"
        );
    }

    pub async fn assert_diagnostic_contains(&self, uri: &Url, text: &str) {
        let diags = self.client.diagnostics_for(uri).await;
        let found = diags.iter().any(|d| d.message.contains(text));
        assert!(
            found,
            "expected diagnostic containing '{text}' for {uri}, got: {diags:?}"
        );
    }

    /// Perform goto definition and return the result.
    pub async fn goto_definition(&self, uri: &Url, position: Position) -> Option<Location> {
        let params = GotoDefinitionParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri: uri.clone() },
                position,
            },
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        let result = self.backend.goto_definition(params).await.ok()?;
        match result {
            Some(GotoDefinitionResponse::Scalar(loc)) => Some(loc),
            Some(GotoDefinitionResponse::Array(locs)) => locs.into_iter().next(),
            _ => None,
        }
    }

    /// Goto definition at a text needle.
    pub async fn goto_definition_at(
        &self,
        uri: &Url,
        text: &str,
        needle: &str,
    ) -> Option<Location> {
        let position = find_position(text, needle);
        self.goto_definition(uri, position).await
    }

    /// Get hover information at a position.
    pub async fn hover(&self, uri: &Url, position: Position) -> Option<Hover> {
        let params = HoverParams {
            text_document_position_params: TextDocumentPositionParams {
                text_document: TextDocumentIdentifier { uri: uri.clone() },
                position,
            },
            work_done_progress_params: Default::default(),
        };
        self.backend.hover(params).await.ok().flatten()
    }

    /// Get hover information at a text needle.
    pub async fn hover_at(&self, uri: &Url, text: &str, needle: &str) -> Option<Hover> {
        let position = find_position(text, needle);
        self.hover(uri, position).await
    }

    /// Get the folding ranges of a document.
    pub async fn folding_ranges(&self, uri: &Url) -> Vec<FoldingRange> {
        let params = FoldingRangeParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        self.backend
            .folding_range(params)
            .await
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    /// Get the full semantic token stream of a document.
    pub async fn semantic_tokens(&self, uri: &Url) -> SemanticTokens {
        let params = SemanticTokensParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        match self.backend.semantic_tokens_full(params).await {
            Ok(Some(SemanticTokensResult::Tokens(tokens))) => tokens,
            _ => SemanticTokens {
                result_id: None,
                data: Vec::new(),
            },
        }
    }
}
