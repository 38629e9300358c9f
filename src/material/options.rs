use serde::{Deserialize, Serialize};

use crate::payload::GraphPayload;
use crate::uniforms::ParameterOverrides;

/// Which faces are culled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CullMode {
    Front,
    #[default]
    Back,
    None,
}

impl CullMode {
    /// Graph metadata uses lowercase names; anything unrecognized disables
    /// culling.
    pub fn from_graph(name: &str) -> Self {
        match name {
            "front" => CullMode::Front,
            "back" => CullMode::Back,
            _ => CullMode::None,
        }
    }

    /// Faces the backend should draw.
    pub fn side(self) -> Side {
        match self {
            CullMode::Front => Side::Back,
            CullMode::Back => Side::Front,
            CullMode::None => Side::Double,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Front,
    Back,
    Double,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderType {
    Opaque,
    Transparent,
}

impl RenderType {
    pub fn from_graph(name: &str) -> Option<Self> {
        match name {
            "opaque" => Some(RenderType::Opaque),
            "transparent" => Some(RenderType::Transparent),
            _ => None,
        }
    }
}

/// Lighting the compiled graph expects. Environment maps are only bound for
/// lit models.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LightModel {
    Standard,
    Physical,
    #[default]
    Unlit,
}

impl LightModel {
    pub fn from_graph(name: &str) -> Option<Self> {
        match name {
            "standard" => Some(LightModel::Standard),
            "physical" => Some(LightModel::Physical),
            "unlit" => Some(LightModel::Unlit),
            _ => None,
        }
    }

    pub fn is_lit(self) -> bool {
        self != LightModel::Unlit
    }
}

/// Construction options.
///
/// Every field is optional so that "not given" stays distinguishable from
/// "given with the default value": graph metadata may only override cull mode
/// and transparency when the caller left them unset.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MaterialOptions {
    pub url: Option<String>,
    /// Pre-fetched payload; applied directly without going through the loader.
    pub data: Option<GraphPayload>,
    pub parameters: Option<ParameterOverrides>,
    pub tone_mapped: Option<bool>,
    pub flat_shading: Option<bool>,
    pub transparent: Option<bool>,
    pub cull_mode: Option<CullMode>,
    pub verbose: Option<bool>,
    pub polygon_offset: Option<bool>,
    pub polygon_offset_factor: Option<f32>,
    pub depth_test: Option<bool>,
    pub depth_write: Option<bool>,
    pub env_map_intensity: Option<f32>,
}

impl MaterialOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_data(mut self, data: GraphPayload) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_parameters(mut self, parameters: ParameterOverrides) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = Some(cull_mode);
        self
    }

    pub fn with_transparent(mut self, transparent: bool) -> Self {
        self.transparent = Some(transparent);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = Some(verbose);
        self
    }

    pub fn with_env_map_intensity(mut self, intensity: f32) -> Self {
        self.env_map_intensity = Some(intensity);
        self
    }
}

/// Fixed-function state the backend applies alongside the shader.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderState {
    pub tone_mapped: bool,
    pub flat_shading: bool,
    pub transparent: bool,
    pub side: Side,
    pub polygon_offset: bool,
    pub polygon_offset_factor: f32,
    pub depth_test: bool,
    pub depth_write: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            tone_mapped: false,
            flat_shading: false,
            transparent: true,
            side: Side::Front,
            polygon_offset: false,
            polygon_offset_factor: 0.0,
            depth_test: true,
            depth_write: true,
        }
    }
}

impl RenderState {
    pub(crate) fn from_options(options: &MaterialOptions) -> Self {
        let defaults = Self::default();
        Self {
            tone_mapped: options.tone_mapped.unwrap_or(defaults.tone_mapped),
            flat_shading: options.flat_shading.unwrap_or(defaults.flat_shading),
            transparent: options.transparent.unwrap_or(defaults.transparent),
            side: options.cull_mode.unwrap_or_default().side(),
            polygon_offset: options.polygon_offset.unwrap_or(defaults.polygon_offset),
            polygon_offset_factor: options
                .polygon_offset_factor
                .unwrap_or(defaults.polygon_offset_factor),
            depth_test: options.depth_test.unwrap_or(defaults.depth_test),
            depth_write: options.depth_write.unwrap_or(defaults.depth_write),
        }
    }
}
