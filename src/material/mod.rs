//! Per-surface material driven by a shader graph.
//!
//! A [`NodeMaterial`] reconciles three independent sources of change into the
//! uniforms and defines the backend reads on every draw:
//!
//! - graph (re)loads delivered by the [`GraphLoader`],
//! - parameter overrides set by the application,
//! - per-frame scene state (time, environment map, fog).
//!
//! Graph-declared uniforms and engine-owned uniforms (environment map, time,
//! camera) live in two separate sets, so merging overrides can never clobber
//! engine state and a graph reload never drops an environment binding.

pub mod environment;
pub mod options;

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::sync::Arc;

pub use environment::{
    CAMERA_POSITION_UNIFORM, DELTA_TIME_UNIFORM, Defines, ENV_MAP_INTENSITY_UNIFORM,
    ENV_MAP_UNIFORM, FrameContext, TIME_UNIFORM,
};
pub use options::{CullMode, LightModel, MaterialOptions, RenderState, RenderType, Side};

use crate::clock::{FrameClock, FrameTime};
use crate::loader::{GraphEvent, GraphListener, GraphLoader, GraphUrl, SubscriberId};
use crate::payload::GraphPayload;
use crate::uniforms::{
    FrameUniforms, PackedUniforms, ParameterOverrides, TextureMapping, TextureRef, Uniform,
    UniformError, UniformSet, UniformValue, decode_uniform, diff, merge_overrides, pack_uniforms,
};

#[derive(Clone)]
struct MaterialState {
    verbose: bool,
    explicit_cull_mode: bool,
    explicit_transparent: bool,

    url: Option<String>,
    full_url: Option<GraphUrl>,
    parameters: ParameterOverrides,
    payload: Option<Arc<GraphPayload>>,

    vertex_shader: String,
    fragment_shader: String,
    uniforms: UniformSet,
    engine_uniforms: UniformSet,
    defines: Defines,
    define_key: (bool, bool),

    cull_mode: CullMode,
    render_state: RenderState,
    light_model: LightModel,
    env_map_intensity: f32,
    env_key: Option<u64>,
    env_revision: u64,

    version: u64,
    load_error: Option<String>,
}

impl MaterialState {
    fn new(options: &MaterialOptions) -> Self {
        let env_map_intensity = options.env_map_intensity.unwrap_or(1.0);
        Self {
            verbose: options.verbose.unwrap_or(false),
            explicit_cull_mode: options.cull_mode.is_some(),
            explicit_transparent: options.transparent.is_some(),
            url: None,
            full_url: None,
            parameters: options.parameters.clone().unwrap_or_default(),
            payload: None,
            vertex_shader: String::new(),
            fragment_shader: String::new(),
            uniforms: UniformSet::new(),
            engine_uniforms: environment::engine_uniforms(env_map_intensity),
            defines: environment::frame_defines(false, false),
            define_key: (false, false),
            cull_mode: options.cull_mode.unwrap_or_default(),
            render_state: RenderState::from_options(options),
            light_model: LightModel::default(),
            env_map_intensity,
            env_key: None,
            env_revision: 0,
            version: 0,
            load_error: None,
        }
    }

    fn refresh_shader(&mut self) {
        self.version += 1;
    }

    fn set_cull_mode(&mut self, mode: CullMode) {
        self.cull_mode = mode;
        self.render_state.side = mode.side();
    }

    fn report_decode_errors(&self, errors: &[(String, UniformError)]) {
        if !self.verbose {
            return;
        }
        for (name, err) in errors {
            log::warn!("NodeMaterial: uniform '{name}' kept its previous value: {err}");
        }
    }

    fn apply_payload(&mut self, payload: Arc<GraphPayload>) {
        if self.verbose {
            log::info!(
                "NodeMaterial: graph loaded ({} uniforms) | url: {}",
                payload.uniforms.len(),
                self.full_url.as_ref().map_or("<inline>", GraphUrl::as_str)
            );
        }

        self.vertex_shader = payload.vertex_source.clone();
        self.fragment_shader = payload.fragment_source.clone();

        let merged = merge_overrides(&payload.uniforms, &self.parameters, Some(&self.uniforms));
        self.report_decode_errors(&merged.errors);
        self.uniforms = merged.uniforms;

        if let Some(mode) = payload.cull_mode.as_deref() {
            if !self.explicit_cull_mode {
                self.set_cull_mode(CullMode::from_graph(mode));
            }
        }
        if let Some(model) = payload.light_model.as_deref() {
            self.light_model = LightModel::from_graph(model).unwrap_or_else(|| {
                if self.verbose {
                    log::warn!("NodeMaterial: unknown light model '{model}', using standard");
                }
                LightModel::Standard
            });
        }
        if let Some(render_type) = payload.render_type.as_deref().and_then(RenderType::from_graph) {
            if !self.explicit_transparent {
                self.render_state.transparent = render_type == RenderType::Transparent;
            }
        }

        self.payload = Some(payload);
        self.load_error = None;
        self.refresh_shader();
    }

    fn set_parameters(&mut self, overrides: ParameterOverrides) -> usize {
        self.parameters = overrides;
        let Some(payload) = self.payload.clone() else {
            // Applied on load.
            return 0;
        };

        let merged = merge_overrides(&payload.uniforms, &self.parameters, Some(&self.uniforms));
        self.report_decode_errors(&merged.errors);

        let changed = diff(&self.uniforms, &merged.uniforms);
        for name in &changed {
            match merged.uniforms.get(name) {
                Some(uniform) => self.uniforms.insert(name.clone(), uniform.clone()),
                None => {
                    self.uniforms.remove(name);
                }
            }
        }
        changed.len()
    }

    fn reset_uniforms_by_name<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(payload) = self.payload.clone() else {
            return;
        };
        for name in names {
            let Some(decl) = payload.uniform_decl(name.as_ref()) else {
                continue;
            };
            match decode_uniform(&decl.uniform_type, &decl.value) {
                Ok(uniform) => self.uniforms.insert(decl.name.clone(), uniform),
                Err(e) => self.report_decode_errors(&[(decl.name.clone(), e)]),
            }
        }
    }

    fn before_render(&mut self, frame: &FrameContext, time: FrameTime) {
        if self.payload.is_none() {
            return;
        }

        self.engine_uniforms
            .set_value(TIME_UNIFORM, UniformValue::Float(time.elapsed));
        self.engine_uniforms
            .set_value(DELTA_TIME_UNIFORM, UniformValue::Float(time.delta));
        if let Some(position) = frame.camera_position {
            self.engine_uniforms
                .set_value(CAMERA_POSITION_UNIFORM, UniformValue::Vec3(position));
        }

        let environment = frame.environment.filter(|_| self.light_model.is_lit());
        match environment {
            Some(env) if self.env_key != Some(env.id) => {
                self.env_key = Some(env.id);
                let bound = env.with_mapping(TextureMapping::CubeUvReflection);
                self.engine_uniforms.set_value(
                    ENV_MAP_UNIFORM,
                    UniformValue::Texture(Some(TextureRef::Handle(bound))),
                );
                self.engine_uniforms.set_value(
                    ENV_MAP_INTENSITY_UNIFORM,
                    UniformValue::Float(self.env_map_intensity),
                );
                self.env_revision += 1;
            }
            Some(_) => {}
            None => {
                if self.env_key.take().is_some() {
                    self.engine_uniforms
                        .set_value(ENV_MAP_UNIFORM, UniformValue::Texture(None));
                    self.env_revision += 1;
                }
            }
        }

        let define_key = (environment.is_some(), frame.fog);
        if define_key != self.define_key {
            self.define_key = define_key;
            self.defines = environment::frame_defines(define_key.0, define_key.1);
            // Defines are compiled in; the backend has to rebuild the program.
            self.refresh_shader();
        }
    }
}

impl GraphListener for MaterialState {
    fn on_graph_event(&mut self, event: &GraphEvent) {
        if self.full_url.as_ref() != Some(event.url()) {
            return;
        }
        match event {
            GraphEvent::Loaded { payload, .. } => self.apply_payload(payload.clone()),
            GraphEvent::Failed { url, message } => {
                if self.verbose {
                    log::warn!("NodeMaterial: failed to load graph {url}: {message}");
                }
                self.load_error = Some(message.clone());
            }
        }
    }
}

/// Material whose shader and uniforms come from a shader graph.
///
/// Not `Send`: it lives on the render thread together with its loader.
/// Dropping it removes its loader subscriptions.
pub struct NodeMaterial {
    state: Rc<RefCell<MaterialState>>,
    loader: GraphLoader,
    clock: FrameClock,
    subscriber: SubscriberId,
}

impl NodeMaterial {
    pub fn new(loader: &GraphLoader, clock: &FrameClock, mut options: MaterialOptions) -> Self {
        let data = options.data.take();
        let url = options.url.take();

        let mut material = Self {
            state: Rc::new(RefCell::new(MaterialState::new(&options))),
            loader: loader.clone(),
            clock: clock.clone(),
            subscriber: SubscriberId::next(),
        };

        if let Some(data) = data {
            match url.as_deref().and_then(|u| material.loader.resolve(u)) {
                // Seeded cache: subscribing below replays it without a fetch.
                Some(full_url) => material.loader.publish(&full_url, data),
                None => material.state.borrow_mut().apply_payload(Arc::new(data)),
            }
        }
        if let Some(url) = url {
            material.set_url(&url);
        }
        material
    }

    /// Point the material at a graph.
    ///
    /// Blank input logs a warning and changes nothing. Otherwise the URL is
    /// resolved, a cached payload is applied before this returns, and the
    /// material stays subscribed for later loads of that URL.
    pub fn set_url(&mut self, url: &str) {
        let Some(full_url) = self.loader.resolve(url) else {
            log::warn!("NodeMaterial: missing material graph URL, cannot load shader");
            return;
        };

        let previous = {
            let mut state = self.state.borrow_mut();
            state.url = Some(url.to_string());
            if state.verbose {
                log::info!("NodeMaterial: loading graph... | url: {full_url}");
            }
            state.full_url.replace(full_url.clone())
        };
        if let Some(previous) = previous.filter(|p| *p != full_url) {
            self.loader.unsubscribe(&previous, self.subscriber);
        }

        let listener: Rc<RefCell<dyn GraphListener>> = self.state.clone();
        self.loader
            .request(&full_url, self.subscriber, Rc::downgrade(&listener));
    }

    /// Replace the override mapping. When a graph is loaded, only uniforms
    /// whose merged value changed are written; returns how many were.
    /// Without a graph the overrides are kept and applied on load.
    pub fn set_parameters(&mut self, overrides: ParameterOverrides) -> usize {
        self.state.borrow_mut().set_parameters(overrides)
    }

    /// Set or replace one override, keeping the others.
    pub fn set_parameter(&mut self, name: impl Into<String>, value: serde_json::Value) -> usize {
        let mut overrides = self.parameters();
        overrides.insert(name.into(), value);
        self.set_parameters(overrides)
    }

    /// Restore the named uniforms to their manifest defaults. Names the
    /// loaded graph does not declare are ignored. Overrides are kept, so a
    /// later [`set_parameters`](Self::set_parameters) applies them again.
    pub fn reset_uniforms_by_name<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.state.borrow_mut().reset_uniforms_by_name(names);
    }

    pub fn reset_uniform_by_name(&mut self, name: &str) {
        self.reset_uniforms_by_name([name]);
    }

    /// Per-draw hook. Pushes clock time and scene state into the engine
    /// uniforms and defines; does nothing before a graph is loaded.
    /// Never panics and never fails.
    pub fn on_before_render(&mut self, frame: &FrameContext) {
        let time = self.clock.time();
        match self.state.try_borrow_mut() {
            Ok(mut state) => state.before_render(frame, time),
            Err(_) => log::warn!("NodeMaterial: state busy, skipped frame update"),
        }
    }

    /// Bump the version so the backend recompiles/rebinds the program.
    pub fn refresh_shader(&mut self) {
        self.state.borrow_mut().refresh_shader();
    }

    /// Remove all loader subscriptions now instead of on drop.
    pub fn dispose(self) {}

    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber
    }

    pub fn url(&self) -> Option<String> {
        self.state.borrow().url.clone()
    }

    pub fn full_url(&self) -> Option<GraphUrl> {
        self.state.borrow().full_url.clone()
    }

    pub fn parameters(&self) -> ParameterOverrides {
        self.state.borrow().parameters.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.borrow().payload.is_some()
    }

    pub fn payload(&self) -> Option<Arc<GraphPayload>> {
        self.state.borrow().payload.clone()
    }

    pub fn load_error(&self) -> Option<String> {
        self.state.borrow().load_error.clone()
    }

    /// Graph-declared uniforms.
    ///
    /// A graph event that arrives while this (or any other) borrow is held is
    /// deferred by the loader and applied on its next poll.
    pub fn uniforms(&self) -> Ref<'_, UniformSet> {
        Ref::map(self.state.borrow(), |s| &s.uniforms)
    }

    pub fn uniform(&self, name: &str) -> Option<Uniform> {
        self.state.borrow().uniforms.get(name).cloned()
    }

    /// Engine-owned uniforms: environment map, time, camera.
    pub fn engine_uniforms(&self) -> Ref<'_, UniformSet> {
        Ref::map(self.state.borrow(), |s| &s.engine_uniforms)
    }

    pub fn defines(&self) -> Ref<'_, Defines> {
        Ref::map(self.state.borrow(), |s| &s.defines)
    }

    pub fn vertex_shader(&self) -> Ref<'_, str> {
        Ref::map(self.state.borrow(), |s| s.vertex_shader.as_str())
    }

    pub fn fragment_shader(&self) -> Ref<'_, str> {
        Ref::map(self.state.borrow(), |s| s.fragment_shader.as_str())
    }

    /// Incremented whenever the compiled program must be rebuilt.
    pub fn version(&self) -> u64 {
        self.state.borrow().version
    }

    /// Incremented each time the environment binding is rebuilt.
    pub fn environment_revision(&self) -> u64 {
        self.state.borrow().env_revision
    }

    pub fn cull_mode(&self) -> CullMode {
        self.state.borrow().cull_mode
    }

    pub fn set_cull_mode(&mut self, mode: CullMode) {
        self.state.borrow_mut().set_cull_mode(mode);
    }

    pub fn side(&self) -> Side {
        self.state.borrow().render_state.side
    }

    pub fn transparent(&self) -> bool {
        self.state.borrow().render_state.transparent
    }

    pub fn set_transparent(&mut self, transparent: bool) {
        self.state.borrow_mut().render_state.transparent = transparent;
    }

    pub fn light_model(&self) -> LightModel {
        self.state.borrow().light_model
    }

    pub fn render_state(&self) -> RenderState {
        self.state.borrow().render_state
    }

    pub fn env_map_intensity(&self) -> f32 {
        self.state.borrow().env_map_intensity
    }

    pub fn set_env_map_intensity(&mut self, intensity: f32) {
        let mut state = self.state.borrow_mut();
        state.env_map_intensity = intensity;
        if state.env_key.is_some() {
            state
                .engine_uniforms
                .set_value(ENV_MAP_INTENSITY_UNIFORM, UniformValue::Float(intensity));
        }
    }

    pub fn verbose(&self) -> bool {
        self.state.borrow().verbose
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.state.borrow_mut().verbose = verbose;
    }

    /// Graph uniforms packed for a uniform buffer.
    pub fn packed_uniforms(&self) -> PackedUniforms {
        pack_uniforms(&self.state.borrow().uniforms)
    }

    pub fn frame_uniforms(&self) -> FrameUniforms {
        let state = self.state.borrow();
        let float = |name: &str| {
            state
                .engine_uniforms
                .value(name)
                .and_then(UniformValue::as_f32)
                .unwrap_or(0.0)
        };
        FrameUniforms {
            time: float(TIME_UNIFORM),
            delta_time: float(DELTA_TIME_UNIFORM),
            env_map_intensity: float(ENV_MAP_INTENSITY_UNIFORM),
            _pad0: 0.0,
        }
    }
}

/// Independent copy: own shader sources, uniforms and overrides, the same
/// resolved payload, and no loader subscription. Call
/// [`set_url`](NodeMaterial::set_url) on the copy to follow graph reloads.
impl Clone for NodeMaterial {
    fn clone(&self) -> Self {
        let mut state = self.state.borrow().clone();
        state.refresh_shader();
        Self {
            state: Rc::new(RefCell::new(state)),
            loader: self.loader.clone(),
            clock: self.clock.clone(),
            subscriber: SubscriberId::next(),
        }
    }
}

impl Drop for NodeMaterial {
    fn drop(&mut self) {
        self.loader.unsubscribe_all(self.subscriber);
    }
}
