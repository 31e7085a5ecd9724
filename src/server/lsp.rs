use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;

use tower_lsp::{
    jsonrpc::Result,
    lsp_types::{
        FoldingRange, FoldingRangeParams, FoldingRangeProviderCapability, GotoDefinitionParams,
        GotoDefinitionResponse, Hover, HoverParams, HoverProviderCapability, InitializeParams,
        InitializeResult, InitializedParams, Location, SemanticTokens, SemanticTokensFullOptions,
        SemanticTokensOptions, SemanticTokensParams, SemanticTokensResult,
        SemanticTokensServerCapabilities, ServerCapabilities, TextDocumentSyncCapability,
        TextDocumentSyncKind,
    },
    LanguageServer,
};
use tracing::{debug, error, info};

use crate::client::PublishDiagnostics;
use crate::folding::folding_ranges;
use crate::hover::hover;
use crate::semantic_tokens::{legend, semantic_tokens_full};

use super::backend::Backend;
use super::config::{extract_defines, extract_include_mode};

#[tower_lsp::async_trait]
impl<C> LanguageServer for Backend<C>
where
    C: PublishDiagnostics,
{
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        self.set_workspace_root(workspace_root_from_initialize(&params))
            .await;

        let capabilities = ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
            hover_provider: Some(HoverProviderCapability::Simple(true)),
            definition_provider: Some(tower_lsp::lsp_types::OneOf::Left(true)),
            folding_range_provider: Some(FoldingRangeProviderCapability::Simple(true)),
            semantic_tokens_provider: Some(
                SemanticTokensServerCapabilities::SemanticTokensOptions(SemanticTokensOptions {
                    legend: legend(),
                    full: Some(SemanticTokensFullOptions::Bool(true)),
                    range: None,
                    work_done_progress_options: Default::default(),
                }),
            ),
            ..Default::default()
        };

        Ok(InitializeResult {
            capabilities,
            ..Default::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        info!("PEARL LSP initialized");
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_change_configuration(
        &self,
        params: tower_lsp::lsp_types::DidChangeConfigurationParams,
    ) {
        let mut config = self.snapshot_config().await;
        let mut changed = false;
        if let Some(defines) = extract_defines(&params.settings) {
            config.defines = defines;
            changed = true;
            info!("updated predefined macros");
        }
        if let Some(mode) = extract_include_mode(&params.settings) {
            config.include_mode = mode;
            changed = true;
            info!("updated include resolution mode: {:?}", mode);
        }
        if changed {
            self.update_config(config).await;
            self.reanalyze_open_documents().await;
        }
    }

    async fn did_open(&self, params: tower_lsp::lsp_types::DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        let text = params.text_document.text;
        let _ = self.handle_open(uri, version, text).await;
    }

    async fn did_change(&self, params: tower_lsp::lsp_types::DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        self.handle_change(uri, version, params.content_changes)
            .await;
    }

    async fn did_close(&self, params: tower_lsp::lsp_types::DidCloseTextDocumentParams) {
        self.handle_close(params.text_document.uri).await;
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some(analysis) = self.get_or_analyze(&uri).await else {
            return Ok(None);
        };
        Ok(hover(&analysis, &uri, position))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some(analysis) = self.get_or_analyze(&uri).await else {
            return Ok(None);
        };

        let (id, _) = match analysis.resolve_symbol_at(&uri, position) {
            Ok(resolved) => resolved,
            Err(err) => {
                debug!("goto_definition: {err}");
                return Ok(None);
            }
        };
        let declared = analysis.definition_token(id);
        Ok(Some(GotoDefinitionResponse::Scalar(Location::new(
            declared.uri.clone(),
            declared.range(),
        ))))
    }

    async fn folding_range(&self, params: FoldingRangeParams) -> Result<Option<Vec<FoldingRange>>> {
        let uri = params.text_document.uri;
        let Some(analysis) = self.get_or_analyze(&uri).await else {
            return Ok(None);
        };
        Ok(Some(folding_ranges(&analysis.folding, &uri)))
    }

    async fn semantic_tokens_full(
        &self,
        params: SemanticTokensParams,
    ) -> Result<Option<SemanticTokensResult>> {
        let uri = params.text_document.uri;
        let Some(analysis) = self.get_or_analyze(&uri).await else {
            return Ok(None);
        };

        // A classification failure degrades to an empty stream for this
        // one request instead of taking the server down.
        let tokens = catch_unwind(AssertUnwindSafe(|| semantic_tokens_full(&analysis, &uri)))
            .unwrap_or_else(|_| {
                error!("semantic token encoding failed for {uri}");
                SemanticTokens {
                    result_id: None,
                    data: Vec::new(),
                }
            });
        Ok(Some(SemanticTokensResult::Tokens(tokens)))
    }
}

fn workspace_root_from_initialize(params: &InitializeParams) -> Option<PathBuf> {
    if let Some(folders) = &params.workspace_folders {
        if let Some(folder) = folders.first() {
            if let Ok(path) = folder.uri.to_file_path() {
                return Some(path);
            }
        }
    }
    if let Some(root_uri) = &params.root_uri {
        if let Ok(path) = root_uri.to_file_path() {
            return Some(path);
        }
    }
    None
}
