//! Effect loading: resolves each pass's shader and textures by merging the
//! three setting layers (material pass, shared effect file, scene instance;
//! the scene wins on conflict and lower layers fill what is absent), then
//! compiles the shader and precomputes its uniforms.

use std::collections::BTreeMap;

use crate::assets::AssetResolver;
use crate::config::PlayerConfig;
use crate::render::textures::{LoadedTexture, TextureStore};
use crate::render::{RenderBackend, ShaderHandle, WrapMode};
use crate::scene::model::{ConstantShaderValues, EffectPass, Material, SceneEffect};
use crate::shader::preprocess::{load_shader_source, shader_constant_defaults};
use crate::shader::uniforms::{
    precompute_constants, resolve_shader_params, PrecomputedUniform, ShaderParams,
};

pub struct LoadedPass {
    pub shader_name: String,
    /// None when the pass has no shader or compilation failed; the renderer
    /// skips such passes.
    pub shader: Option<ShaderHandle>,
    pub textures: Vec<Option<LoadedTexture>>,
    pub combos: BTreeMap<String, i32>,
    pub constants: ConstantShaderValues,
    pub params: ShaderParams,
    pub uniforms: Vec<PrecomputedUniform>,
}

pub struct LoadedEffect {
    pub config: SceneEffect,
    pub passes: Vec<LoadedPass>,
}

impl LoadedEffect {
    /// An effect participates in the ping-pong pipeline when visible and at
    /// least one pass compiled.
    pub fn is_renderable(&self) -> bool {
        self.config.visible.get() && self.passes.iter().any(|p| p.shader.is_some())
    }
}

pub struct EffectLoader<'a> {
    pub backend: &'a mut dyn RenderBackend,
    pub resolver: &'a AssetResolver,
    pub store: &'a mut TextureStore,
    pub config: &'a PlayerConfig,
}

impl EffectLoader<'_> {
    pub fn load_effect(&mut self, effect_config: &SceneEffect) -> LoadedEffect {
        if effect_config.file.contains("bokeh_blur") {
            log::info!("effect: unsupported effect 'bokeh_blur', skipping");
            return LoadedEffect {
                config: effect_config.clone(),
                passes: Vec::new(),
            };
        }

        if !effect_config.file.is_empty() {
            log::debug!("effect: loading {}", effect_config.file);
        }

        let base_effect = self.load_effect_file(&effect_config.file);

        let scene_passes: &[EffectPass] = if effect_config.passes.is_empty() {
            base_effect
                .as_ref()
                .map(|e| e.passes.as_slice())
                .unwrap_or(&[])
        } else {
            &effect_config.passes
        };
        let scene_passes = scene_passes.to_vec();

        let mut passes = Vec::with_capacity(scene_passes.len());
        for (i, scene_pass) in scene_passes.iter().enumerate() {
            let base_pass = base_effect.as_ref().and_then(|e| e.passes.get(i));
            passes.push(self.load_pass(scene_pass, base_pass));
        }

        LoadedEffect {
            config: effect_config.clone(),
            passes,
        }
    }

    fn load_effect_file(&self, file: &str) -> Option<SceneEffect> {
        if file.is_empty() {
            return None;
        }
        let path = self.resolver.tmp_dir().join(file);
        let data = std::fs::read(&path).ok()?;
        match serde_json::from_slice::<SceneEffect>(&data) {
            Ok(effect) => Some(effect),
            Err(err) => {
                log::warn!("effect: unreadable base definition '{file}': {err}");
                None
            }
        }
    }

    fn load_pass(&mut self, scene_pass: &EffectPass, base_pass: Option<&EffectPass>) -> LoadedPass {
        let mut constants = scene_pass.constant_shader_values.clone();
        let mut combos = scene_pass.combos.clone();

        if let Some(base) = base_pass {
            for (key, value) in base.constant_shader_values.iter() {
                constants.insert_missing(key, value.clone());
            }
            for (key, value) in &base.combos {
                combos.entry(key.clone()).or_insert(*value);
            }
        }

        let mut shader_name = scene_pass.shader.clone();
        let mut material_path = scene_pass.material.clone();
        if shader_name.is_empty() {
            if let Some(base) = base_pass {
                shader_name = base.shader.clone();
                if material_path.is_empty() {
                    material_path = base.material.clone();
                }
            }
        }

        let mut material = None;
        if shader_name.is_empty() && !material_path.is_empty() {
            material = self.load_material(&material_path);
            if let Some(mat_pass) = material.as_ref().and_then(|m: &Material| m.passes.first()) {
                shader_name = mat_pass.shader.clone();
                for (key, value) in &mat_pass.combos {
                    combos.entry(key.clone()).or_insert(*value);
                }
                for (key, value) in mat_pass.constant_shader_values.iter() {
                    constants.insert_missing(key, value.clone());
                }
            }
        }

        // Texture slots: material fills the base, the effect file overlays,
        // the scene instance overlays last. Null slots defer to the layer
        // below; unmatched tail slots append.
        let mut texture_names: Vec<Option<String>> = material
            .as_ref()
            .and_then(|m| m.passes.first())
            .map(|p| p.textures.clone())
            .unwrap_or_default();
        if let Some(base) = base_pass {
            overlay_textures(&mut texture_names, &base.textures);
        }
        overlay_textures(&mut texture_names, &scene_pass.textures);

        let mut textures = Vec::with_capacity(texture_names.len());
        for (slot, name) in texture_names.iter().enumerate() {
            let loaded = match name.as_deref() {
                None | Some("") => None,
                Some(name) => {
                    let loaded = self.store.load_name(
                        self.backend,
                        self.resolver,
                        &self.config.decode,
                        name,
                        WrapMode::Clamp,
                    );
                    if loaded.is_none() {
                        log::warn!("effect: texture '{name}' for slot {slot} not found");
                    }
                    loaded
                }
            };
            textures.push(loaded);
        }

        let mut shader = None;
        if !shader_name.is_empty() {
            combos.entry("MASK".to_string()).or_insert_with(|| {
                log::debug!("effect: MASK combo defaults to 1 for {shader_name}");
                1
            });

            let (vertex, fragment) = load_shader_source(
                &shader_name,
                &mut combos,
                self.resolver,
                self.config.legacy_shader_fixups,
            );
            shader = match self.backend.compile_shader(&vertex, &fragment) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    log::warn!("effect: shader '{shader_name}' failed to compile: {err}");
                    None
                }
            };

            for (key, value) in shader_constant_defaults(&shader_name, self.resolver) {
                constants.insert_missing(&key, value);
            }
        }

        let (params, uniforms) = match shader {
            Some(handle) => {
                let params = resolve_shader_params(self.backend, handle);
                let uniforms =
                    precompute_constants(self.backend, handle, &shader_name, &constants);
                (params, uniforms)
            }
            None => (ShaderParams::default(), Vec::new()),
        };

        LoadedPass {
            shader_name,
            shader,
            textures,
            combos,
            constants,
            params,
            uniforms,
        }
    }

    fn load_material(&self, path: &str) -> Option<Material> {
        let full = self.resolver.tmp_dir().join(path);
        let data = std::fs::read(&full).ok()?;
        match Material::from_json(&data) {
            Ok(material) => Some(material),
            Err(err) => {
                log::warn!("effect: unreadable material '{path}': {err}");
                None
            }
        }
    }
}

fn overlay_textures(base: &mut Vec<Option<String>>, layer: &[Option<String>]) {
    for (i, name) in layer.iter().enumerate() {
        if i < base.len() {
            if name.is_some() {
                base[i] = name.clone();
            }
        } else {
            base.push(name.clone());
        }
    }
}

/// Folds `opacity` and `tint` effects into a final draw alpha and tint
/// color; these act on the composite draw rather than running as passes.
pub fn fold_inline_effects(effect_configs: &[SceneEffect], alpha: &mut f64, tint: &mut [f32; 3]) {
    for effect in effect_configs {
        if !effect.visible.get() {
            continue;
        }
        if effect.name == "opacity" {
            if let Some(pass) = effect.passes.first() {
                if pass.constant_value != 0.0 {
                    *alpha *= pass.constant_value;
                } else {
                    *alpha *= effect.alpha.base();
                }
            } else {
                *alpha *= effect.alpha.base();
            }
        }
        if effect.name == "tint" {
            if let Some(pass) = effect.passes.first() {
                tint[0] *= pass.constant_color.x as f32;
                tint[1] *= pass.constant_color.y as f32;
                tint[2] *= pass.constant_color.z as f32;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::HeadlessBackend;
    use serde_json::json;

    fn loader_fixture(dir: &std::path::Path) -> (HeadlessBackend, AssetResolver, TextureStore, PlayerConfig) {
        (
            HeadlessBackend::new(),
            AssetResolver::new(dir, None),
            TextureStore::new(),
            PlayerConfig::default(),
        )
    }

    #[test]
    fn three_layer_merge_scene_wins_material_fills() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tmp/effects/glow")).unwrap();
        std::fs::create_dir_all(dir.path().join("tmp/materials")).unwrap();

        std::fs::write(
            dir.path().join("tmp/materials/glow_mat.json"),
            serde_json::to_vec(&json!({
                "passes": [{"shader": "effects/glow", "combos": {"X": 1}}]
            }))
            .unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("tmp/effects/glow/effect.json"),
            serde_json::to_vec(&json!({
                "name": "glow",
                "passes": [{"material": "materials/glow_mat.json", "combos": {"Y": 2}}]
            }))
            .unwrap(),
        )
        .unwrap();

        let scene_effect: SceneEffect = serde_json::from_value(json!({
            "name": "glow",
            "file": "effects/glow/effect.json",
            "passes": [{"combos": {"X": 3}}]
        }))
        .unwrap();

        let (mut backend, resolver, mut store, config) = loader_fixture(dir.path());
        let mut loader = EffectLoader {
            backend: &mut backend,
            resolver: &resolver,
            store: &mut store,
            config: &config,
        };
        let loaded = loader.load_effect(&scene_effect);

        let pass = &loaded.passes[0];
        assert_eq!(pass.shader_name, "effects/glow");
        assert_eq!(pass.combos.get("X"), Some(&3));
        assert_eq!(pass.combos.get("Y"), Some(&2));
        assert_eq!(pass.combos.get("MASK"), Some(&1));
    }

    #[test]
    fn texture_overlay_fills_null_slots_and_appends() {
        let mut base = vec![Some("mat0".to_string()), Some("mat1".to_string())];
        overlay_textures(
            &mut base,
            &[None, Some("eff1".to_string()), Some("eff2".to_string())],
        );
        assert_eq!(
            base,
            vec![
                Some("mat0".to_string()),
                Some("eff1".to_string()),
                Some("eff2".to_string())
            ]
        );
    }

    #[test]
    fn bokeh_blur_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let scene_effect: SceneEffect = serde_json::from_value(json!({
            "name": "blur",
            "file": "effects/bokeh_blur/effect.json",
            "passes": [{"shader": "effects/bokeh"}]
        }))
        .unwrap();

        let (mut backend, resolver, mut store, config) = loader_fixture(dir.path());
        let mut loader = EffectLoader {
            backend: &mut backend,
            resolver: &resolver,
            store: &mut store,
            config: &config,
        };
        let loaded = loader.load_effect(&scene_effect);
        assert!(loaded.passes.is_empty());
        assert!(!loaded.is_renderable());
    }

    #[test]
    fn failed_compile_leaves_pass_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let scene_effect: SceneEffect = serde_json::from_value(json!({
            "name": "ripple",
            "passes": [{"shader": "effects/waterripple"}]
        }))
        .unwrap();

        let (mut backend, resolver, mut store, config) = loader_fixture(dir.path());
        let mut loader = EffectLoader {
            backend: &mut backend,
            resolver: &resolver,
            store: &mut store,
            config: &config,
        };
        // The software backend cannot compile shaders, so the pass loads
        // without one and the effect reports non-renderable.
        let loaded = loader.load_effect(&scene_effect);
        assert_eq!(loaded.passes.len(), 1);
        assert!(loaded.passes[0].shader.is_none());
        assert!(!loaded.is_renderable());
    }

    #[test]
    fn fold_opacity_and_tint() {
        let effects: Vec<SceneEffect> = serde_json::from_value(json!([
            {"name": "opacity", "passes": [{"constantvalue": 0.5}]},
            {"name": "tint", "passes": [{"constantcolor": "1 0.5 0"}]},
            {"name": "opacity", "visible": false, "passes": [{"constantvalue": 0.0}]}
        ]))
        .unwrap();

        let mut alpha = 1.0;
        let mut tint = [1.0_f32; 3];
        fold_inline_effects(&effects, &mut alpha, &mut tint);
        assert_eq!(alpha, 0.5);
        assert_eq!(tint, [1.0, 0.5, 0.0]);
    }
}
