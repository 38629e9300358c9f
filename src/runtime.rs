use crate::clock::{FrameClock, FrameTime};
use crate::loader::{GraphFetcher, GraphLoader, LoaderConfig};
use crate::material::{MaterialOptions, NodeMaterial};

/// The loader and clock shared by every material of one renderer.
///
/// Owned by the render thread; hand out clones of the loader or clock
/// wherever materials are built.
#[derive(Clone)]
pub struct MaterialRuntime {
    loader: GraphLoader,
    clock: FrameClock,
}

impl MaterialRuntime {
    pub fn new(fetcher: impl GraphFetcher) -> Self {
        Self::with_config(fetcher, LoaderConfig::default())
    }

    pub fn with_config(fetcher: impl GraphFetcher, config: LoaderConfig) -> Self {
        log::debug!("MaterialRuntime: base url {}", config.base_url);
        Self {
            loader: GraphLoader::with_config(fetcher, config),
            clock: FrameClock::new(),
        }
    }

    pub fn loader(&self) -> &GraphLoader {
        &self.loader
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn create_material(&self, options: MaterialOptions) -> NodeMaterial {
        NodeMaterial::new(&self.loader, &self.clock, options)
    }

    /// Call once per rendered frame before drawing: delivers finished graph
    /// loads to their materials, then advances the clock.
    pub fn begin_frame(&self) -> FrameTime {
        let delivered = self.loader.poll();
        if delivered > 0 {
            log::trace!("MaterialRuntime: delivered {delivered} graph results");
        }
        self.clock.tick()
    }

    /// Advance the clock without polling the loader.
    pub fn tick(&self) -> FrameTime {
        self.clock.tick()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryGraphFetcher;

    const GRAPH: &str = r#"{
        "vertex": "void main() {}",
        "fragment": "void main() {}",
        "uniforms": [{"name": "rimSize", "type": "float", "value": 2.0}]
    }"#;

    #[test]
    fn begin_frame_delivers_pending_loads() {
        let fetcher = MemoryGraphFetcher::new();
        let runtime = MaterialRuntime::new(fetcher.clone());
        let url = runtime.loader().resolve("g1").unwrap();
        fetcher.insert(&url, GRAPH);

        let material = runtime.create_material(MaterialOptions::new().with_url("g1"));
        assert!(!material.is_loaded());

        let time = runtime.begin_frame();
        assert_eq!(time.delta, 0.0);
        assert!(material.is_loaded());
        assert!(material.uniforms().contains("rimSize"));
    }
}
