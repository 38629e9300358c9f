//! Runtime uniform values and the codec that builds them from graph manifests.

pub mod codec;
pub mod pack;

use std::collections::HashMap;

use serde::Serialize;

pub use codec::{
    MergedUniforms, UniformError, decode_uniform, decode_value, diff, merge_overrides,
};
pub use pack::{FrameUniforms, PackedUniforms, UniformField, UniformLayout, pack_uniforms};

/// Caller-supplied values keyed by uniform name. Values use the manifest's
/// JSON shapes and are decoded against the declared type on merge.
pub type ParameterOverrides = HashMap<String, serde_json::Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UniformType {
    Float,
    Int,
    Bool,
    Vec2,
    Vec3,
    Vec4,
    Color,
    Mat3,
    Mat4,
    Texture,
}

impl UniformType {
    /// Parse a manifest type name. Editors are not consistent about naming,
    /// so a few aliases are accepted.
    pub fn parse(name: &str) -> Result<Self, UniformError> {
        let ty = match name {
            "float" | "number" => UniformType::Float,
            "int" => UniformType::Int,
            "bool" | "boolean" => UniformType::Bool,
            "vec2" | "vector2" => UniformType::Vec2,
            "vec3" | "vector3" => UniformType::Vec3,
            "vec4" | "vector4" => UniformType::Vec4,
            "color" => UniformType::Color,
            "mat3" | "matrix3" => UniformType::Mat3,
            "mat4" | "matrix4" => UniformType::Mat4,
            "texture" | "texture2D" | "sampler2D" | "samplerCube" | "cubeTexture" => {
                UniformType::Texture
            }
            other => return Err(UniformError::UnsupportedType(other.to_string())),
        };
        Ok(ty)
    }

    pub fn name(self) -> &'static str {
        match self {
            UniformType::Float => "float",
            UniformType::Int => "int",
            UniformType::Bool => "bool",
            UniformType::Vec2 => "vec2",
            UniformType::Vec3 => "vec3",
            UniformType::Vec4 => "vec4",
            UniformType::Color => "color",
            UniformType::Mat3 => "mat3",
            UniformType::Mat4 => "mat4",
            UniformType::Texture => "texture",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// How the backend should sample a bound texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TextureMapping {
    #[default]
    Uv,
    Equirectangular,
    CubeUvReflection,
}

/// Engine-side texture identity. `id` is owned by the host and is what the
/// material compares to detect environment changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TextureHandle {
    pub id: u64,
    pub mapping: TextureMapping,
}

impl TextureHandle {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            mapping: TextureMapping::Uv,
        }
    }

    pub fn with_mapping(self, mapping: TextureMapping) -> Self {
        Self { mapping, ..self }
    }
}

/// Texture slot contents. Manifests only carry a source string; resolving it
/// into an engine texture is the host's job.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TextureRef {
    Source(String),
    Handle(TextureHandle),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Color(Color),
    Mat3([f32; 9]),
    Mat4([f32; 16]),
    Texture(Option<TextureRef>),
}

impl UniformValue {
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            UniformValue::Float(v) => Some(*v),
            UniformValue::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub fn as_texture(&self) -> Option<&TextureRef> {
        match self {
            UniformValue::Texture(t) => t.as_ref(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Uniform {
    pub value: UniformValue,
    #[serde(rename = "type")]
    pub ty: UniformType,
}

impl Uniform {
    pub fn new(ty: UniformType, value: UniformValue) -> Self {
        Self { value, ty }
    }
}

/// Name-keyed uniforms in insertion order.
///
/// Graph manifests are small, so lookups are linear; order is kept because
/// it is the manifest order and drives buffer packing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UniformSet {
    entries: Vec<(String, Uniform)>,
}

impl UniformSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Uniform> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, u)| u)
    }

    pub fn value(&self, name: &str) -> Option<&UniformValue> {
        self.get(name).map(|u| &u.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert or replace. Replacing keeps the entry's position.
    pub fn insert(&mut self, name: impl Into<String>, uniform: Uniform) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = uniform,
            None => self.entries.push((name, uniform)),
        }
    }

    /// Overwrite the value of an existing entry, keeping its type.
    /// Returns `false` if `name` is not present.
    pub fn set_value(&mut self, name: &str, value: UniformValue) -> bool {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, slot)) => {
                slot.value = value;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Uniform> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Uniform)> {
        self.entries.iter().map(|(n, u)| (n.as_str(), u))
    }
}

impl Serialize for UniformSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, uniform) in &self.entries {
            map.serialize_entry(name, uniform)?;
        }
        map.end()
    }
}

impl<N: Into<String>> FromIterator<(N, Uniform)> for UniformSet {
    fn from_iter<I: IntoIterator<Item = (N, Uniform)>>(iter: I) -> Self {
        let mut set = UniformSet::new();
        for (name, uniform) in iter {
            set.insert(name, uniform);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_aliases_resolve_to_the_same_type() {
        assert_eq!(UniformType::parse("vec3").unwrap(), UniformType::Vec3);
        assert_eq!(UniformType::parse("vector3").unwrap(), UniformType::Vec3);
        assert_eq!(UniformType::parse("sampler2D").unwrap(), UniformType::Texture);
        assert!(matches!(
            UniformType::parse("struct"),
            Err(UniformError::UnsupportedType(t)) if t == "struct"
        ));
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut set = UniformSet::new();
        set.insert("a", Uniform::new(UniformType::Float, UniformValue::Float(1.0)));
        set.insert("b", Uniform::new(UniformType::Float, UniformValue::Float(2.0)));
        set.insert("a", Uniform::new(UniformType::Float, UniformValue::Float(3.0)));

        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(set.value("a"), Some(&UniformValue::Float(3.0)));
    }

    #[test]
    fn set_value_ignores_unknown_names() {
        let mut set = UniformSet::new();
        assert!(!set.set_value("missing", UniformValue::Bool(true)));
        assert!(set.is_empty());
    }
}
