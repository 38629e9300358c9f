use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use crossbeam_channel::Sender;

use super::url::GraphUrl;
use crate::payload::{self, GraphPayload};

/// Transport seam: fetch one graph payload.
///
/// Implementations may finish synchronously inside `fetch` or hand the
/// [`FetchCompletion`] to another thread; either way the result only reaches
/// materials when the loader is polled on the render thread.
pub trait GraphFetcher: 'static {
    fn fetch(&self, url: &GraphUrl, completion: FetchCompletion);
}

#[derive(Debug)]
pub(crate) struct FetchOutcome {
    pub url: GraphUrl,
    pub result: Result<GraphPayload>,
}

/// One-shot handle for delivering a fetch result back to the loader.
///
/// Dropping it without completing reports a failure, so a fetcher that loses
/// a request cannot leave the URL pending forever.
#[derive(Debug)]
pub struct FetchCompletion {
    url: GraphUrl,
    tx: Option<Sender<FetchOutcome>>,
}

impl FetchCompletion {
    pub(crate) fn new(url: GraphUrl, tx: Sender<FetchOutcome>) -> Self {
        Self { url, tx: Some(tx) }
    }

    pub fn url(&self) -> &GraphUrl {
        &self.url
    }

    pub fn complete(self, payload: GraphPayload) {
        self.finish(Ok(payload));
    }

    /// Parse the wire JSON and complete with it (or with the parse error).
    pub fn complete_json(self, text: &str) {
        let result = GraphPayload::from_json_str(text);
        self.finish(result);
    }

    pub fn fail(self, error: anyhow::Error) {
        self.finish(Err(error));
    }

    pub fn finish(mut self, result: Result<GraphPayload>) {
        self.send(result);
    }

    fn send(&mut self, result: Result<GraphPayload>) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        // The loader may already be gone; nothing left to notify then.
        let _ = tx.send(FetchOutcome {
            url: self.url.clone(),
            result,
        });
    }
}

impl Drop for FetchCompletion {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let url = self.url.clone();
            self.send(Err(anyhow!("fetch for {url} was dropped without a result")));
        }
    }
}

/// Serves `file://` URLs from disk. A missing `.json` extension is tried as
/// a fallback so graph ids can map straight onto a directory of exports.
#[derive(Debug, Clone, Default)]
pub struct FileGraphFetcher;

impl FileGraphFetcher {
    pub fn new() -> Self {
        Self
    }

    pub fn path_for(url: &GraphUrl) -> Result<PathBuf> {
        let path = url
            .as_str()
            .strip_prefix("file://")
            .ok_or_else(|| anyhow!("unsupported graph url scheme: {url}"))?;
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
        let with_ext = path.with_extension("json");
        if path.extension().is_none() && with_ext.exists() {
            return Ok(with_ext);
        }
        Ok(path)
    }
}

impl GraphFetcher for FileGraphFetcher {
    fn fetch(&self, url: &GraphUrl, completion: FetchCompletion) {
        let result = Self::path_for(url).and_then(payload::load_payload_from_path);
        completion.finish(result);
    }
}

/// In-memory table of URL -> payload JSON. Clone-friendly; clones share the
/// table, so a host can keep a handle and add graphs after handing the
/// fetcher to the loader.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraphFetcher {
    graphs: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryGraphFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &GraphUrl, json: impl Into<String>) {
        let Ok(mut graphs) = self.graphs.lock() else {
            return;
        };
        graphs.insert(url.as_str().to_string(), json.into());
    }

    pub fn remove(&self, url: &GraphUrl) -> Option<String> {
        self.graphs.lock().ok()?.remove(url.as_str())
    }

    pub fn contains(&self, url: &GraphUrl) -> bool {
        self.graphs
            .lock()
            .ok()
            .is_some_and(|graphs| graphs.contains_key(url.as_str()))
    }
}

impl GraphFetcher for MemoryGraphFetcher {
    fn fetch(&self, url: &GraphUrl, completion: FetchCompletion) {
        let json = self
            .graphs
            .lock()
            .ok()
            .and_then(|graphs| graphs.get(url.as_str()).cloned());
        match json {
            Some(text) => completion.complete_json(&text),
            None => completion.fail(anyhow!("graph not found: {url}")),
        }
    }
}
