//! Uniform-location resolution and per-frame uniform/texture binding for
//! loaded effect passes.

use serde_json::Value;

use crate::foundation::math::Vec2;
use crate::render::{RenderBackend, ShaderHandle, UniformLocation, UniformValue};
use crate::render::textures::LoadedTexture;
use crate::scene::model::ConstantShaderValues;

pub const TEXTURE_SLOTS: usize = 8;

/// Per-frame inputs shared by every pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalState {
    pub time: f64,
    /// Normalized scene mouse, components in [-1, 1].
    pub mouse: Vec2,
    pub parallax: Vec2,
}

/// Pre-resolved uniform locations for the well-known engine uniforms.
#[derive(Clone, Debug, Default)]
pub struct ShaderParams {
    pub time: Option<UniformLocation>,
    pub pointer: Option<UniformLocation>,
    pub parallax: Option<UniformLocation>,
    pub texel_size: Option<UniformLocation>,
    pub mvp: Option<UniformLocation>,
    pub proj: Option<UniformLocation>,
    pub proj_inv: Option<UniformLocation>,
    pub model_inv: Option<UniformLocation>,
    pub texture_samplers: [Option<UniformLocation>; TEXTURE_SLOTS],
    pub texture_resolutions: [Option<UniformLocation>; TEXTURE_SLOTS],
}

pub fn resolve_shader_params(
    backend: &mut dyn RenderBackend,
    shader: ShaderHandle,
) -> ShaderParams {
    let mut params = ShaderParams {
        time: backend.resolve_uniform(shader, "g_Time"),
        pointer: backend
            .resolve_uniform(shader, "g_PointerPosition")
            .or_else(|| backend.resolve_uniform(shader, "g_Pointer")),
        parallax: backend.resolve_uniform(shader, "g_ParallaxPosition"),
        texel_size: backend.resolve_uniform(shader, "g_TexelSize"),
        mvp: backend.resolve_uniform(shader, "g_ModelViewProjectionMatrix"),
        proj: backend.resolve_uniform(shader, "g_EffectTextureProjectionMatrix"),
        proj_inv: backend.resolve_uniform(shader, "g_EffectTextureProjectionMatrixInverse"),
        model_inv: backend.resolve_uniform(shader, "g_EffectModelViewProjectionMatrixInverse"),
        ..Default::default()
    };

    for i in 0..TEXTURE_SLOTS {
        params.texture_resolutions[i] =
            backend.resolve_uniform(shader, &format!("g_Texture{i}Resolution"));
        params.texture_samplers[i] = backend.resolve_uniform(shader, &format!("g_Texture{i}"));
        if i == 0 && params.texture_samplers[i].is_none() {
            params.texture_samplers[i] = backend.resolve_uniform(shader, "texture0");
        }
    }

    params
}

#[derive(Clone, Debug)]
pub struct PrecomputedUniform {
    pub location: UniformLocation,
    pub value: UniformValue,
}

fn title_case(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn candidate_names(key: &str) -> Vec<String> {
    let mut names = vec![format!("g_{key}"), key.to_string(), format!("g_{}", title_case(key))];
    match key {
        "ripplestrength" => names.push("g_Strength".to_string()),
        "animationspeed" => names.push("g_AnimationSpeed".to_string()),
        "sens" | "sensitivity" => {
            names.push("g_Sensitivity".to_string());
            names.push("sensitivity".to_string());
        }
        "center" => {
            names.push("g_Center".to_string());
            names.push("center".to_string());
        }
        "scale" => {
            names.push("g_Scale".to_string());
            names.push("scale".to_string());
        }
        _ => {}
    }
    names
}

fn parse_floats(value: &Value) -> Option<Vec<f32>> {
    match value {
        Value::Number(n) => Some(vec![n.as_f64()? as f32]),
        Value::String(s) => {
            let parts: Vec<f32> = s
                .split_whitespace()
                .map(|t| t.parse::<f64>().unwrap_or(0.0) as f32)
                .collect();
            (1..=3).contains(&parts.len()).then_some(parts)
        }
        Value::Object(map) => match map.get("value") {
            Some(Value::Number(n)) => Some(vec![n.as_f64()? as f32]),
            _ => None,
        },
        _ => None,
    }
}

/// Converts each constant to `{location, value}` once at load. Keys resolve
/// through `g_<key>`, the bare key, `g_<TitleCase>`, and a fixed alias
/// table; `scale` for depthparallax shaders uploads divided by 40.
pub fn precompute_constants(
    backend: &mut dyn RenderBackend,
    shader: ShaderHandle,
    shader_name: &str,
    constants: &ConstantShaderValues,
) -> Vec<PrecomputedUniform> {
    let mut uniforms = Vec::new();

    for (key, value) in constants.iter() {
        let location = candidate_names(key)
            .into_iter()
            .find_map(|name| backend.resolve_uniform(shader, &name));
        let Some(location) = location else { continue };
        let Some(mut floats) = parse_floats(value) else {
            continue;
        };

        if key == "scale" && shader_name.contains("depthparallax") {
            for f in &mut floats {
                *f /= 40.0;
            }
        }

        let value = match floats.len() {
            1 => UniformValue::Float(floats[0]),
            2 => UniformValue::Vec2([floats[0], floats[1]]),
            3 => UniformValue::Vec3([floats[0], floats[1], floats[2]]),
            _ => continue,
        };
        uniforms.push(PrecomputedUniform { location, value });
    }

    uniforms
}

pub struct PassBindings<'a> {
    pub shader: ShaderHandle,
    pub params: &'a ShaderParams,
    pub uniforms: &'a [PrecomputedUniform],
    pub textures: &'a [Option<LoadedTexture>],
}

/// Applies one pass's uniforms and texture bindings for the current draw.
/// `main_texture` feeds slot 0 unless the pass overrides it; slots above 0
/// without a texture but with a live sampler get the 1x1 black fallback.
pub fn apply_pass(
    backend: &mut dyn RenderBackend,
    pass: &PassBindings<'_>,
    state: &GlobalState,
    main_texture: Option<LoadedTexture>,
    black: LoadedTexture,
) {
    let shader = pass.shader;
    let params = pass.params;

    if let Some(loc) = params.time {
        backend.set_uniform(shader, loc, &UniformValue::Float(state.time as f32));
    }
    if let Some(loc) = params.pointer {
        backend.set_uniform(
            shader,
            loc,
            &UniformValue::Vec2([
                (state.mouse.x * 0.5 + 0.5) as f32,
                (state.mouse.y * 0.5 + 0.5) as f32,
            ]),
        );
    }
    if let Some(loc) = params.parallax {
        backend.set_uniform(
            shader,
            loc,
            &UniformValue::Vec2([
                (state.parallax.x * 0.5 + 0.5) as f32,
                (state.parallax.y * 0.5 + 0.5) as f32,
            ]),
        );
    }
    for loc in [params.mvp, params.proj, params.proj_inv, params.model_inv]
        .into_iter()
        .flatten()
    {
        backend.set_uniform(shader, loc, &UniformValue::IdentityMatrix);
    }

    for uniform in pass.uniforms {
        backend.set_uniform(shader, uniform.location, &uniform.value);
    }

    for i in 0..TEXTURE_SLOTS {
        let mut texture = pass.textures.get(i).copied().flatten();
        if i == 0 {
            if let Some(main) = main_texture {
                texture = Some(main);
            }
        }
        if texture.is_none() && i > 0 && params.texture_samplers[i].is_some() {
            texture = Some(black);
        }
        let Some(texture) = texture else { continue };

        if let Some(loc) = params.texture_samplers[i] {
            backend.set_uniform(shader, loc, &UniformValue::Sampler(i as i32));
        }
        if let Some(loc) = params.texture_resolutions[i] {
            let (w, h) = (texture.width as f32, texture.height as f32);
            backend.set_uniform(shader, loc, &UniformValue::Vec4([w, h, w, h]));
            if i == 0 {
                if let Some(texel) = params.texel_size {
                    backend.set_uniform(
                        shader,
                        texel,
                        &UniformValue::Vec2([1.0 / w, 1.0 / h]),
                    );
                }
            }
        }

        backend.bind_texture_slot(i as u32, texture.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn candidate_names_include_aliases() {
        let names = candidate_names("ripplestrength");
        assert!(names.contains(&"g_ripplestrength".to_string()));
        assert!(names.contains(&"ripplestrength".to_string()));
        assert!(names.contains(&"g_Ripplestrength".to_string()));
        assert!(names.contains(&"g_Strength".to_string()));
    }

    #[test]
    fn parse_floats_by_shape() {
        assert_eq!(parse_floats(&json!(2.0)), Some(vec![2.0]));
        assert_eq!(parse_floats(&json!("1 2")), Some(vec![1.0, 2.0]));
        assert_eq!(parse_floats(&json!("1 2 3")), Some(vec![1.0, 2.0, 3.0]));
        assert_eq!(parse_floats(&json!({"value": 4.0})), Some(vec![4.0]));
        assert_eq!(parse_floats(&json!({"other": 4.0})), None);
        assert_eq!(parse_floats(&json!([1, 2])), None);
    }

    #[test]
    fn title_case_single_word() {
        assert_eq!(title_case("speed"), "Speed");
        assert_eq!(title_case(""), "");
    }
}
