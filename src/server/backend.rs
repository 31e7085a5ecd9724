use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tower_lsp::lsp_types::{Diagnostic, TextDocumentContentChangeEvent, Url};
use tracing::debug;

use crate::analysis::{analyze, Analysis};
use crate::client::PublishDiagnostics;
use crate::diagnostics;
use crate::include::IncludeCache;
use crate::lexer::LexConfig;
use crate::ServerConfig;

use super::cache::DocumentCache;

#[derive(Debug, Clone)]
pub struct Backend<C = tower_lsp::Client> {
    pub(crate) client: C,
    pub(crate) documents: DocumentCache,
    pub(crate) includes: Arc<IncludeCache>,
    pub(crate) config: Arc<RwLock<ServerConfig>>,
    pub(crate) workspace_root: Arc<RwLock<Option<PathBuf>>>,
}

impl<C> Backend<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            documents: DocumentCache::new(),
            includes: Arc::new(IncludeCache::new()),
            config: Arc::new(RwLock::new(ServerConfig::default())),
            workspace_root: Arc::new(RwLock::new(None)),
        }
    }

    pub fn new_with_config(client: C, config: ServerConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            ..Self::new(client)
        }
    }

    pub async fn snapshot_config(&self) -> ServerConfig {
        self.config.read().await.clone()
    }

    pub async fn update_config(&self, config: ServerConfig) {
        let mut guard = self.config.write().await;
        *guard = config;
    }

    pub(crate) async fn set_workspace_root(&self, root: Option<PathBuf>) {
        let mut guard = self.workspace_root.write().await;
        *guard = root;
    }

    /// Snapshot the read-only inputs of one analysis run.
    pub(crate) async fn lex_config(&self) -> LexConfig {
        let config = self.snapshot_config().await;
        let workspace_root = self.workspace_root.read().await.clone();
        LexConfig {
            defines: config.defines,
            include_mode: config.include_mode,
            workspace_root,
        }
    }
}

impl<C> Backend<C>
where
    C: PublishDiagnostics,
{
    pub async fn handle_open(&self, uri: Url, version: i32, text: String) -> Vec<Diagnostic> {
        self.documents
            .set_document(uri.clone(), version, text)
            .await;
        self.publish_diagnostics(uri).await
    }

    /// Full-sync change handling: the last change carries the complete new
    /// document text.
    pub async fn handle_change(
        &self,
        uri: Url,
        version: i32,
        changes: Vec<TextDocumentContentChangeEvent>,
    ) {
        let Some(latest) = changes.into_iter().last() else {
            return;
        };
        self.documents
            .set_document(uri.clone(), version, latest.text)
            .await;
        self.publish_diagnostics(uri).await;
    }

    pub async fn handle_close(&self, uri: Url) {
        self.documents.remove(&uri).await;
        // the closed file may also be someone's include target
        if let Ok(path) = uri.to_file_path() {
            self.includes.invalidate(&path);
        }
    }

    /// Run lexer and analyzer over the cached document text and publish
    /// the result, replacing the previous analysis atomically.
    pub(crate) async fn run_analysis(&self, uri: &Url) -> Option<Arc<Analysis>> {
        let text = self.documents.get_text(uri).await?;
        let version = self.documents.get_version(uri).await.unwrap_or(0);
        let lex_config = self.lex_config().await;
        let analysis = Arc::new(analyze(&text, uri, &lex_config, &self.includes));
        self.documents
            .set_analysis(uri.clone(), analysis.clone(), version)
            .await;
        Some(analysis)
    }

    /// The cached analysis for `uri`, re-running the pass when the cache is
    /// stale.
    pub async fn get_or_analyze(&self, uri: &Url) -> Option<Arc<Analysis>> {
        if let Some(analysis) = self.documents.get_analysis_if_current(uri).await {
            return Some(analysis);
        }
        self.run_analysis(uri).await
    }

    pub async fn publish_diagnostics(&self, uri: Url) -> Vec<Diagnostic> {
        let version = self.documents.get_version(&uri).await;
        let diags = match self.get_or_analyze(&uri).await {
            Some(analysis) => diagnostics::for_document(&analysis.diagnostics, &uri),
            None => {
                debug!("no document text cached for {uri}");
                Vec::new()
            }
        };
        self.client
            .publish_diagnostics(uri, diags.clone(), version)
            .await;
        diags
    }

    /// Re-run every open document, e.g. after a configuration change. The
    /// document versions did not move, so the cache has to be refreshed
    /// explicitly before publishing.
    pub(crate) async fn reanalyze_open_documents(&self) {
        for uri in self.documents.open_uris().await {
            let _ = self.run_analysis(&uri).await;
            self.publish_diagnostics(uri).await;
        }
    }
}
