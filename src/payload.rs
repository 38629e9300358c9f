use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Compiled graph as delivered by the editor backend.
///
/// Immutable once received; the loader shares it between materials behind an
/// `Arc`, and every material copies what it needs to mutate.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GraphPayload {
    #[serde(rename = "vertex")]
    pub vertex_source: String,
    #[serde(rename = "fragment")]
    pub fragment_source: String,
    #[serde(default)]
    pub uniforms: Vec<UniformDecl>,

    // Optional render metadata declared by the graph.
    #[serde(rename = "cullMode", default, skip_serializing_if = "Option::is_none")]
    pub cull_mode: Option<String>,
    #[serde(rename = "lightModel", default, skip_serializing_if = "Option::is_none")]
    pub light_model: Option<String>,
    #[serde(rename = "renderType", default, skip_serializing_if = "Option::is_none")]
    pub render_type: Option<String>,
}

/// One manifest entry: a uniform the compiled shader declares.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UniformDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub uniform_type: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl GraphPayload {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("failed to parse graph payload json")
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).context("invalid graph payload")
    }

    /// Manifest entry for `name`, if the graph declares it.
    pub fn uniform_decl(&self, name: &str) -> Option<&UniformDecl> {
        self.uniforms.iter().find(|u| u.name == name)
    }

    pub fn uniform_names(&self) -> impl Iterator<Item = &str> {
        self.uniforms.iter().map(|u| u.name.as_str())
    }
}

pub fn load_payload_from_path(path: impl AsRef<Path>) -> Result<GraphPayload> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read graph json at {}", path.display()))?;
    GraphPayload::from_json_str(&text)
        .with_context(|| format!("invalid graph json in {}", path.display()))
}
