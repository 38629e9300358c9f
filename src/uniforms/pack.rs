//! Packing of uniform sets into a flat buffer for the backend.
//!
//! Every non-texture uniform occupies whole 16-byte slots so the layout is
//! valid for both std140 uniform blocks and WGSL uniform buffers: scalars and
//! vectors take one slot, `mat3` three (columns padded to vec4), `mat4` four.
//! Textures are bound separately and do not appear in the buffer.

use serde::Serialize;

use super::{UniformSet, UniformType, UniformValue};

const SLOT_BYTES: usize = 16;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UniformField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: UniformType,
    pub offset: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UniformLayout {
    pub fields: Vec<UniformField>,
    pub size_bytes: u64,
}

impl UniformLayout {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&UniformField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Clone, Debug, Default)]
pub struct PackedUniforms {
    pub layout: UniformLayout,
    pub bytes: Vec<u8>,
}

/// Per-frame values shared by every graph shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub time: f32,
    pub delta_time: f32,
    pub env_map_intensity: f32,
    pub _pad0: f32,
}

fn slot_count(ty: UniformType) -> usize {
    match ty {
        UniformType::Texture => 0,
        UniformType::Mat3 => 3,
        UniformType::Mat4 => 4,
        _ => 1,
    }
}

fn write_f32_slot(dst: &mut [u8], slot_index: usize, values: [f32; 4]) {
    let base = slot_index * SLOT_BYTES;
    dst[base..base + SLOT_BYTES].copy_from_slice(bytemuck::cast_slice(&values));
}

fn write_i32_slot(dst: &mut [u8], slot_index: usize, values: [i32; 4]) {
    let base = slot_index * SLOT_BYTES;
    dst[base..base + SLOT_BYTES].copy_from_slice(bytemuck::cast_slice(&values));
}

fn write_value(dst: &mut [u8], slot: usize, value: &UniformValue) {
    match value {
        UniformValue::Float(v) => write_f32_slot(dst, slot, [*v, 0.0, 0.0, 0.0]),
        UniformValue::Int(v) => write_i32_slot(dst, slot, [*v, 0, 0, 0]),
        UniformValue::Bool(b) => write_i32_slot(dst, slot, [i32::from(*b), 0, 0, 0]),
        UniformValue::Vec2([x, y]) => write_f32_slot(dst, slot, [*x, *y, 0.0, 0.0]),
        UniformValue::Vec3([x, y, z]) => write_f32_slot(dst, slot, [*x, *y, *z, 0.0]),
        UniformValue::Vec4(v) => write_f32_slot(dst, slot, *v),
        UniformValue::Color(c) => write_f32_slot(dst, slot, c.to_array()),
        UniformValue::Mat3(m) => {
            for col in 0..3 {
                let c = &m[col * 3..col * 3 + 3];
                write_f32_slot(dst, slot + col, [c[0], c[1], c[2], 0.0]);
            }
        }
        UniformValue::Mat4(m) => {
            for col in 0..4 {
                let c = &m[col * 4..col * 4 + 4];
                write_f32_slot(dst, slot + col, [c[0], c[1], c[2], c[3]]);
            }
        }
        UniformValue::Texture(_) => {}
    }
}

/// Pack `set` in its own order. A value whose shape disagrees with its
/// declared type still gets the declared type's slot count, so the layout
/// depends only on names and types.
pub fn pack_uniforms(set: &UniformSet) -> PackedUniforms {
    let mut layout = UniformLayout::default();
    let mut slot = 0_usize;
    let mut placements: Vec<(usize, &UniformValue)> = Vec::new();

    for (name, uniform) in set.iter() {
        let slots = slot_count(uniform.ty);
        if slots == 0 {
            continue;
        }
        layout.fields.push(UniformField {
            name: name.to_string(),
            ty: uniform.ty,
            offset: (slot * SLOT_BYTES) as u64,
        });
        if slot_count_of_value(&uniform.value) == slots {
            placements.push((slot, &uniform.value));
        }
        slot += slots;
    }

    layout.size_bytes = (slot * SLOT_BYTES) as u64;
    let mut bytes = vec![0_u8; slot * SLOT_BYTES];
    for (slot, value) in placements {
        write_value(&mut bytes, slot, value);
    }

    PackedUniforms { layout, bytes }
}

fn slot_count_of_value(value: &UniformValue) -> usize {
    match value {
        UniformValue::Texture(_) => 0,
        UniformValue::Mat3(_) => 3,
        UniformValue::Mat4(_) => 4,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uniforms::{Color, TextureRef, Uniform};

    fn read_f32(bytes: &[u8], offset: usize) -> f32 {
        f32::from_ne_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    fn read_i32(bytes: &[u8], offset: usize) -> i32 {
        i32::from_ne_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn pack_writes_expected_slots() {
        let set: UniformSet = [
            ("speed", Uniform::new(UniformType::Float, UniformValue::Float(3.0))),
            (
                "noise",
                Uniform::new(
                    UniformType::Texture,
                    UniformValue::Texture(Some(TextureRef::Source("n.png".into()))),
                ),
            ),
            ("enabled", Uniform::new(UniformType::Bool, UniformValue::Bool(true))),
            (
                "tint",
                Uniform::new(
                    UniformType::Color,
                    UniformValue::Color(Color::new(0.25, 0.5, 0.75, 1.0)),
                ),
            ),
        ]
        .into_iter()
        .collect();

        let packed = pack_uniforms(&set);
        assert_eq!(packed.layout.size_bytes, 48);
        assert_eq!(packed.bytes.len(), 48);
        assert!(packed.layout.field("noise").is_none());

        assert_eq!(read_f32(&packed.bytes, 0), 3.0);
        assert_eq!(read_i32(&packed.bytes, 16), 1);
        let tint = packed.layout.field("tint").unwrap();
        assert_eq!(tint.offset, 32);
        assert_eq!(read_f32(&packed.bytes, 32 + 8), 0.75);
    }

    #[test]
    fn mat3_columns_are_padded() {
        let m = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];
        let set: UniformSet = [("m", Uniform::new(UniformType::Mat3, UniformValue::Mat3(m)))]
            .into_iter()
            .collect();
        let packed = pack_uniforms(&set);
        assert_eq!(packed.layout.size_bytes, 48);
        assert_eq!(read_f32(&packed.bytes, 16), 4.0);
        assert_eq!(read_f32(&packed.bytes, 28), 0.0);
        assert_eq!(read_f32(&packed.bytes, 40), 9.0);
    }

    #[test]
    fn frame_block_is_one_slot() {
        let frame = FrameUniforms {
            time: 1.5,
            ..Default::default()
        };
        let bytes = bytemuck::bytes_of(&frame);
        assert_eq!(bytes.len(), 16);
        assert_eq!(read_f32(bytes, 0), 1.5);
    }
}
