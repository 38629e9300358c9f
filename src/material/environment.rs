//! Scene-dependent state pushed into a material once per draw.

use std::collections::BTreeMap;

use crate::uniforms::{TextureHandle, Uniform, UniformSet, UniformType, UniformValue};

/// Shader defines (name -> value, values are usually empty).
pub type Defines = BTreeMap<String, String>;

pub const ENV_MAP_UNIFORM: &str = "envMap";
pub const ENV_MAP_INTENSITY_UNIFORM: &str = "envMapIntensity";
pub const TIME_UNIFORM: &str = "time";
pub const DELTA_TIME_UNIFORM: &str = "deltaTime";
pub const CAMERA_POSITION_UNIFORM: &str = "cameraPosition";

const BASE_DEFINES: [&str; 4] = [
    "STANDARD",
    "USE_NORMALMAP",
    "USE_TANGENT",
    "TANGENTSPACE_NORMALMAP",
];
const ENVIRONMENT_DEFINES: [&str; 2] = ["USE_ENVMAP", "ENVMAP_TYPE_CUBE_UV"];
const FOG_DEFINE: &str = "USE_FOG";

/// What the host knows about the scene for the current draw.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameContext {
    /// Scene environment map; its `id` is the identity the material caches on.
    pub environment: Option<TextureHandle>,
    /// Whether the scene declares fog.
    pub fog: bool,
    pub camera_position: Option<[f32; 3]>,
}

impl FrameContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_environment(mut self, environment: TextureHandle) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn with_fog(mut self, fog: bool) -> Self {
        self.fog = fog;
        self
    }

    pub fn with_camera_position(mut self, position: [f32; 3]) -> Self {
        self.camera_position = Some(position);
        self
    }
}

pub(crate) fn frame_defines(environment: bool, fog: bool) -> Defines {
    let mut defines: Defines = BASE_DEFINES
        .iter()
        .map(|d| (d.to_string(), String::new()))
        .collect();
    if environment {
        defines.extend(ENVIRONMENT_DEFINES.iter().map(|d| (d.to_string(), String::new())));
    }
    if fog {
        defines.insert(FOG_DEFINE.to_string(), String::new());
    }
    defines
}

/// Uniforms the material owns independently of any graph.
pub(crate) fn engine_uniforms(env_map_intensity: f32) -> UniformSet {
    [
        (ENV_MAP_UNIFORM, Uniform::new(UniformType::Texture, UniformValue::Texture(None))),
        (
            ENV_MAP_INTENSITY_UNIFORM,
            Uniform::new(UniformType::Float, UniformValue::Float(env_map_intensity)),
        ),
        (TIME_UNIFORM, Uniform::new(UniformType::Float, UniformValue::Float(0.0))),
        (DELTA_TIME_UNIFORM, Uniform::new(UniformType::Float, UniformValue::Float(0.0))),
        (
            CAMERA_POSITION_UNIFORM,
            Uniform::new(UniformType::Vec3, UniformValue::Vec3([0.0; 3])),
        ),
    ]
    .into_iter()
    .collect()
}
