//! Runtime for materials whose shaders come from an external shader-graph editor.
//!
//! A [`NodeMaterial`] is pointed at a graph URL; the shared [`GraphLoader`]
//! fetches the compiled payload once per URL, caches it and broadcasts it to
//! every material using that URL. Each material merges its own parameter
//! overrides into the graph's uniform manifest and, once per draw, reconciles
//! time and scene environment state into its uniforms and defines.

pub mod clock;
pub mod loader;
pub mod material;
pub mod payload;
pub mod runtime;
pub mod uniforms;

pub use clock::{FrameClock, FrameTime};
pub use loader::{
    FetchCompletion, FileGraphFetcher, GraphEvent, GraphFetcher, GraphListener, GraphLoader,
    GraphResolver, GraphUrl, LoadStatus, LoaderConfig, MemoryGraphFetcher, SubscriberId,
};
pub use material::{
    CullMode, Defines, FrameContext, LightModel, MaterialOptions, NodeMaterial, RenderState,
    RenderType, Side,
};
pub use payload::{GraphPayload, UniformDecl};
pub use runtime::MaterialRuntime;
pub use uniforms::{
    Color, FrameUniforms, ParameterOverrides, TextureHandle, TextureMapping, TextureRef, Uniform,
    UniformError, UniformSet, UniformType, UniformValue,
};
