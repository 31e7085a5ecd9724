use std::collections::HashMap;
use std::sync::Arc;

use tower_lsp::lsp_types::Url;

use crate::analysis::Analysis;

#[derive(Debug, Clone)]
struct DocumentState {
    version: i32,
    text: Arc<str>,
}

/// Cached analysis with version tracking.
#[derive(Debug, Clone)]
struct CachedAnalysis {
    analysis: Arc<Analysis>,
    version: i32,
}

/// Cache for open document text and their analysis results.
///
/// A finished analysis atomically replaces the previous entry; requests
/// observe either the old or the new result, never a partial one.
#[derive(Debug, Default, Clone)]
pub struct DocumentCache {
    state: Arc<tokio::sync::RwLock<HashMap<Url, DocumentState>>>,
    analyses: Arc<tokio::sync::RwLock<HashMap<Url, CachedAnalysis>>>,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_version(&self, uri: &Url) -> Option<i32> {
        let state = self.state.read().await;
        state.get(uri).map(|doc| doc.version)
    }

    pub async fn get_text(&self, uri: &Url) -> Option<Arc<str>> {
        let state = self.state.read().await;
        state.get(uri).map(|doc| doc.text.clone())
    }

    pub async fn set_document(&self, uri: Url, version: i32, text: String) {
        let mut state = self.state.write().await;
        state.insert(
            uri,
            DocumentState {
                version,
                text: text.into(),
            },
        );
    }

    pub async fn remove(&self, uri: &Url) {
        let mut state = self.state.write().await;
        state.remove(uri);
        drop(state);
        let mut analyses = self.analyses.write().await;
        analyses.remove(uri);
    }

    pub async fn open_uris(&self) -> Vec<Url> {
        let state = self.state.read().await;
        state.keys().cloned().collect()
    }

    pub async fn get_analysis_if_current(&self, uri: &Url) -> Option<Arc<Analysis>> {
        let current_version = self.get_version(uri).await?;
        let analyses = self.analyses.read().await;
        let cached = analyses.get(uri)?;
        (cached.version == current_version).then(|| cached.analysis.clone())
    }

    pub async fn get_analysis(&self, uri: &Url) -> Option<Arc<Analysis>> {
        let analyses = self.analyses.read().await;
        analyses.get(uri).map(|c| c.analysis.clone())
    }

    pub async fn set_analysis(&self, uri: Url, analysis: Arc<Analysis>, version: i32) {
        let mut analyses = self.analyses.write().await;
        analyses.insert(uri, CachedAnalysis { analysis, version });
    }
}
