#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::anyhow;
use serde_json::{Value, json};
use shader_graph_material::{FetchCompletion, GraphFetcher, GraphUrl};

/// Fetcher that parks every request until the test completes it by hand.
#[derive(Clone, Default)]
pub struct ManualFetcher {
    pending: Rc<RefCell<Vec<FetchCompletion>>>,
}

impl ManualFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    fn take(&self, url: &GraphUrl) -> Option<FetchCompletion> {
        let mut pending = self.pending.borrow_mut();
        let index = pending.iter().position(|c| c.url() == url)?;
        Some(pending.remove(index))
    }

    pub fn complete(&self, url: &GraphUrl, json: &str) -> bool {
        match self.take(url) {
            Some(completion) => {
                completion.complete_json(json);
                true
            }
            None => false,
        }
    }

    pub fn fail(&self, url: &GraphUrl, message: &str) -> bool {
        match self.take(url) {
            Some(completion) => {
                completion.fail(anyhow!("{message}"));
                true
            }
            None => false,
        }
    }
}

impl GraphFetcher for ManualFetcher {
    fn fetch(&self, _url: &GraphUrl, completion: FetchCompletion) {
        self.pending.borrow_mut().push(completion);
    }
}

pub fn graph_json(uniforms: Value) -> String {
    json!({
        "vertex": "void main() { gl_Position = vec4(position, 1.0); }",
        "fragment": "uniform float rimSize; void main() {}",
        "uniforms": uniforms,
    })
    .to_string()
}

pub fn rim_graph() -> String {
    graph_json(json!([
        {"name": "rimSize", "type": "float", "value": 1.0},
        {"name": "tint", "type": "color", "value": "#ff0000"},
    ]))
}
