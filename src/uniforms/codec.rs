use std::collections::BTreeSet;

use serde_json::Value;

use super::{
    Color, ParameterOverrides, TextureRef, Uniform, UniformSet, UniformType, UniformValue,
};
use crate::payload::UniformDecl;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniformError {
    #[error("unsupported uniform type: {0}")]
    UnsupportedType(String),

    #[error("invalid {ty} value: {reason}")]
    InvalidValue { ty: &'static str, reason: String },
}

impl UniformError {
    fn invalid(ty: UniformType, reason: impl Into<String>) -> Self {
        UniformError::InvalidValue {
            ty: ty.name(),
            reason: reason.into(),
        }
    }
}

fn parse_json_number_f32(v: &Value) -> Option<f32> {
    v.as_f64()
        .map(|x| x as f32)
        .or_else(|| v.as_i64().map(|x| x as f32))
        .or_else(|| v.as_u64().map(|x| x as f32))
}

fn parse_number(ty: UniformType, raw: &Value) -> Result<f32, UniformError> {
    parse_json_number_f32(raw)
        .ok_or_else(|| UniformError::invalid(ty, format!("expected number, got {raw}")))
}

/// Vector components from `[x, y, ..]` or `{x, y, z, w}`. Missing trailing
/// components are zero.
fn parse_components<const N: usize>(
    ty: UniformType,
    raw: &Value,
) -> Result<[f32; N], UniformError> {
    let mut out = [0.0_f32; N];
    match raw {
        Value::Array(items) => {
            if items.len() > N {
                return Err(UniformError::invalid(
                    ty,
                    format!("expected at most {N} components, got {}", items.len()),
                ));
            }
            for (slot, item) in out.iter_mut().zip(items) {
                *slot = parse_number(ty, item)?;
            }
        }
        Value::Object(map) => {
            for (slot, key) in out.iter_mut().zip(["x", "y", "z", "w"]) {
                if let Some(v) = map.get(key) {
                    *slot = parse_number(ty, v)?;
                }
            }
        }
        // A scalar broadcasts to every component.
        Value::Number(_) => out = [parse_number(ty, raw)?; N],
        other => {
            return Err(UniformError::invalid(
                ty,
                format!("expected array or object, got {other}"),
            ));
        }
    }
    Ok(out)
}

fn parse_matrix<const N: usize>(ty: UniformType, raw: &Value) -> Result<[f32; N], UniformError> {
    let items = raw
        .as_array()
        .ok_or_else(|| UniformError::invalid(ty, "expected array"))?;
    if items.len() != N {
        return Err(UniformError::invalid(
            ty,
            format!("expected {N} elements, got {}", items.len()),
        ));
    }
    let mut out = [0.0_f32; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = parse_number(ty, item)?;
    }
    Ok(out)
}

fn parse_hex_color(s: &str) -> Option<Color> {
    let hex = s.strip_prefix('#').or_else(|| s.strip_prefix("0x"))?;
    let channel = |i: usize| -> Option<f32> {
        let byte = u8::from_str_radix(hex.get(i * 2..i * 2 + 2)?, 16).ok()?;
        Some(byte as f32 / 255.0)
    };
    match hex.len() {
        6 => Some(Color::new(channel(0)?, channel(1)?, channel(2)?, 1.0)),
        8 => Some(Color::new(channel(0)?, channel(1)?, channel(2)?, channel(3)?)),
        _ => None,
    }
}

fn parse_color(raw: &Value) -> Result<Color, UniformError> {
    let ty = UniformType::Color;
    match raw {
        Value::String(s) => parse_hex_color(s)
            .ok_or_else(|| UniformError::invalid(ty, format!("bad hex color {s:?}"))),
        Value::Array(items) => {
            if !(3..=4).contains(&items.len()) {
                return Err(UniformError::invalid(
                    ty,
                    format!("expected 3 or 4 channels, got {}", items.len()),
                ));
            }
            let get = |i: usize, default: f32| -> Result<f32, UniformError> {
                items.get(i).map_or(Ok(default), |v| parse_number(ty, v))
            };
            Ok(Color::new(get(0, 0.0)?, get(1, 0.0)?, get(2, 0.0)?, get(3, 1.0)?))
        }
        Value::Object(map) => {
            let get = |key: &str, default: f32| -> Result<f32, UniformError> {
                map.get(key).map_or(Ok(default), |v| parse_number(ty, v))
            };
            Ok(Color::new(get("r", 0.0)?, get("g", 0.0)?, get("b", 0.0)?, get("a", 1.0)?))
        }
        other => Err(UniformError::invalid(ty, format!("expected color, got {other}"))),
    }
}

fn parse_texture(raw: &Value) -> Result<Option<TextureRef>, UniformError> {
    match raw {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(TextureRef::Source(s.clone()))),
        Value::Object(map) => match map.get("url").or_else(|| map.get("src")) {
            Some(Value::String(s)) => Ok(Some(TextureRef::Source(s.clone()))),
            Some(Value::Null) | None => Ok(None),
            Some(other) => Err(UniformError::invalid(
                UniformType::Texture,
                format!("expected texture url, got {other}"),
            )),
        },
        other => Err(UniformError::invalid(
            UniformType::Texture,
            format!("expected texture source, got {other}"),
        )),
    }
}

/// Decode a raw manifest/override value into the representation the backend
/// binds for `ty`.
pub fn decode_value(ty: UniformType, raw: &Value) -> Result<UniformValue, UniformError> {
    let value = match ty {
        UniformType::Float => UniformValue::Float(parse_number(ty, raw)?),
        UniformType::Int => UniformValue::Int(parse_number(ty, raw)? as i32),
        UniformType::Bool => match raw {
            Value::Bool(b) => UniformValue::Bool(*b),
            Value::Number(_) => UniformValue::Bool(parse_number(ty, raw)? != 0.0),
            other => return Err(UniformError::invalid(ty, format!("expected bool, got {other}"))),
        },
        UniformType::Vec2 => UniformValue::Vec2(parse_components(ty, raw)?),
        UniformType::Vec3 => UniformValue::Vec3(parse_components(ty, raw)?),
        UniformType::Vec4 => UniformValue::Vec4(parse_components(ty, raw)?),
        UniformType::Color => UniformValue::Color(parse_color(raw)?),
        UniformType::Mat3 => UniformValue::Mat3(parse_matrix(ty, raw)?),
        UniformType::Mat4 => UniformValue::Mat4(parse_matrix(ty, raw)?),
        UniformType::Texture => UniformValue::Texture(parse_texture(raw)?),
    };
    Ok(value)
}

/// Decode a manifest entry given its declared type name.
pub fn decode_uniform(type_name: &str, raw: &Value) -> Result<Uniform, UniformError> {
    let ty = UniformType::parse(type_name)?;
    Ok(Uniform::new(ty, decode_value(ty, raw)?))
}

/// Names whose uniform was added, removed, or differs in any field.
///
/// Order: `new`'s order first, then names only present in `old`.
pub fn diff(old: &UniformSet, new: &UniformSet) -> Vec<String> {
    let mut changed: Vec<String> = new
        .iter()
        .filter(|(name, uniform)| old.get(name) != Some(*uniform))
        .map(|(name, _)| name.to_string())
        .collect();

    changed.extend(
        old.names()
            .filter(|name| !new.contains(name))
            .map(str::to_string),
    );
    changed
}

/// Result of [`merge_overrides`]: the merged set plus the per-uniform decode
/// failures that were recovered from.
#[derive(Debug, Clone, Default)]
pub struct MergedUniforms {
    pub uniforms: UniformSet,
    pub errors: Vec<(String, UniformError)>,
}

/// Build a uniform set for `manifest` in manifest order, using the override
/// value when one exists and the declared default otherwise.
///
/// Override keys that the manifest does not declare are ignored. A failure to
/// decode one entry never fails the merge: the entry falls back to its value in
/// `prior` (or to the manifest default when an override was the culprit) and
/// the error is reported in [`MergedUniforms::errors`].
///
/// The result holds exactly the manifest names, except that an entry whose
/// type is unsupported is left out when `prior` has no value for it.
pub fn merge_overrides(
    manifest: &[UniformDecl],
    overrides: &ParameterOverrides,
    prior: Option<&UniformSet>,
) -> MergedUniforms {
    let mut merged = MergedUniforms::default();
    let mut seen: BTreeSet<&str> = BTreeSet::new();

    for decl in manifest {
        if !seen.insert(decl.name.as_str()) {
            // Duplicate declaration: the first one wins.
            continue;
        }
        let prior_value = prior.and_then(|p| p.get(&decl.name)).cloned();

        let ty = match UniformType::parse(&decl.uniform_type) {
            Ok(ty) => ty,
            Err(e) => {
                merged.errors.push((decl.name.clone(), e));
                if let Some(u) = prior_value {
                    merged.uniforms.insert(decl.name.clone(), u);
                }
                continue;
            }
        };

        if let Some(raw) = overrides.get(&decl.name) {
            match decode_value(ty, raw) {
                Ok(value) => {
                    merged.uniforms.insert(decl.name.clone(), Uniform::new(ty, value));
                    continue;
                }
                Err(e) => {
                    merged.errors.push((decl.name.clone(), e));
                    if let Some(u) = prior_value {
                        merged.uniforms.insert(decl.name.clone(), u);
                        continue;
                    }
                }
            }
        }

        match decode_value(ty, &decl.value) {
            Ok(value) => merged.uniforms.insert(decl.name.clone(), Uniform::new(ty, value)),
            Err(e) => {
                merged.errors.push((decl.name.clone(), e));
                if let Some(u) = prior_value {
                    merged.uniforms.insert(decl.name.clone(), u);
                }
            }
        }
    }

    merged
}
