//! One-shot per-object setup at scene load: texture resolution and upload,
//! model metadata, particle-system assembly, effect loading, optional mesh.
//! Load failures are local; the object stays in the list with whatever
//! parts loaded.

use std::path::{Path, PathBuf};

use crate::assets::AssetResolver;
use crate::audio::{start_object_sound, SoundPlayer};
use crate::config::PlayerConfig;
use crate::foundation::math::Vec2;
use crate::mesh::{load_mdl, MdlMesh};
use crate::particle::{ParticleSystem, ParticleSystemOptions};
use crate::render::textures::{LoadedTexture, TextureStore};
use crate::render::{BlendMode, RenderBackend, TargetHandle, WrapMode};
use crate::scene::model::{
    InstanceOverride, Material, ModelMeta, ParticleConfig, Scene, SceneObject,
};
use crate::shader::{EffectLoader, LoadedEffect};
use crate::tex::TexMeta;

pub struct RenderObject {
    pub object: SceneObject,
    pub offset: Vec2,
    pub image: Option<LoadedTexture>,
    /// Rasterized text, refreshed when the displayed string changes.
    pub text_texture: Option<LoadedTexture>,
    pub last_text: String,
    pub particles: Option<ParticleSystem>,
    pub effects: Vec<LoadedEffect>,
    pub crop_offset: Vec2,
    pub mesh: Option<MdlMesh>,
    /// Lazily allocated by the effect pipeline, sized to the source.
    pub ping_pong: Option<[TargetHandle; 2]>,
}

impl RenderObject {
    pub fn has_renderable_effects(&self) -> bool {
        self.effects.iter().any(|e| e.is_renderable())
    }
}

pub struct SceneBuilder<'a> {
    pub backend: &'a mut dyn RenderBackend,
    pub resolver: &'a AssetResolver,
    pub store: &'a mut TextureStore,
    pub config: &'a PlayerConfig,
}

impl SceneBuilder<'_> {
    /// Builds the render-object list for a parsed scene, starting sounds as
    /// a side effect.
    pub fn build(&mut self, scene: &Scene, sound: &mut dyn SoundPlayer) -> Vec<RenderObject> {
        let (_, scene_height) = scene.general.projection();
        let mut objects = Vec::with_capacity(scene.objects.len());

        for source in &scene.objects {
            let mut object = source.clone();

            // Particle configs author their origin bottom-up.
            if !object.particle.is_empty() {
                object.origin.y = f64::from(scene_height) - object.origin.y;
            }

            start_object_sound(sound, &self.resolver.tmp_dir(), &object, self.config.silent);

            log::debug!("scene: adding object '{}'", object.name);
            objects.push(self.build_one(object));
        }

        objects
    }

    fn build_one(&mut self, mut object: SceneObject) -> RenderObject {
        let model_meta = self.load_model_meta(&object);
        let crop_offset = model_meta
            .as_ref()
            .map(|m| m.crop_offset)
            .unwrap_or_default();
        let autosize = model_meta.as_ref().map(|m| m.autosize).unwrap_or(false);
        let puppet = model_meta.map(|m| m.puppet).unwrap_or_default();

        let texture_path = self
            .resolver
            .resolve_texture_ref(&object.image, &object.model);
        let image = match &texture_path {
            Some(path) => {
                let loaded = self.store.load_path(
                    self.backend,
                    self.resolver,
                    &self.config.decode,
                    path,
                    WrapMode::Clamp,
                );
                if loaded.is_none() {
                    log::error!(
                        "failed to load texture for object '{}' from {}",
                        object.name,
                        path.display()
                    );
                }
                loaded
            }
            None => {
                if !object.image.is_empty() {
                    log::error!(
                        "could not resolve texture for object '{}' (image: {})",
                        object.name,
                        object.image
                    );
                }
                None
            }
        };

        if autosize {
            if let Some(image) = image {
                object.size = Vec2::new(f64::from(image.width), f64::from(image.height));
            }
        }

        let particles = if object.particle.is_empty() {
            None
        } else {
            self.load_particle_system(
                &object.name,
                &object.particle,
                object.instance_override.clone(),
            )
        };

        let mut effects = Vec::with_capacity(object.effects.len());
        {
            let mut loader = EffectLoader {
                backend: &mut *self.backend,
                resolver: self.resolver,
                store: &mut *self.store,
                config: self.config,
            };
            for effect in &object.effects {
                effects.push(loader.load_effect(effect));
            }
        }

        let mesh = if autosize && !puppet.is_empty() {
            let path = self.resolver.tmp_dir().join(&puppet);
            log::info!(
                "object '{}' uses puppet warp (static rendering only): {puppet}",
                object.name
            );
            match load_mdl(&path) {
                Ok(mesh) => Some(mesh),
                Err(err) => {
                    log::error!("failed to load mesh for object '{}': {err}", object.name);
                    None
                }
            }
        } else {
            None
        };

        RenderObject {
            object,
            offset: Vec2::ZERO,
            image,
            text_texture: None,
            last_text: String::new(),
            particles,
            effects,
            crop_offset,
            mesh,
            ping_pong: None,
        }
    }

    /// Model metadata comes from the object's `model`, or from an `image`
    /// reference that is itself a JSON document.
    fn load_model_meta(&self, object: &SceneObject) -> Option<ModelMeta> {
        let mut model_path = object.model.as_str();
        if model_path.is_empty() && object.image.ends_with(".json") {
            model_path = &object.image;
        }
        if model_path.is_empty() || !model_path.ends_with(".json") {
            return None;
        }

        let path = self.resolver.locate_json(model_path)?;
        let data = std::fs::read(&path).ok()?;
        match ModelMeta::from_json(&data) {
            Ok(meta) => Some(meta),
            Err(err) => {
                log::warn!("unreadable model metadata '{model_path}': {err}");
                None
            }
        }
    }

    fn load_particle_system(
        &mut self,
        name: &str,
        particle_path: &str,
        overrides: Option<InstanceOverride>,
    ) -> Option<ParticleSystem> {
        let config_path = self.locate_particle_json(particle_path)?;
        let data = match std::fs::read(&config_path) {
            Ok(data) => data,
            Err(err) => {
                log::error!("failed to read particle config for '{name}': {err}");
                return None;
            }
        };
        let config = match ParticleConfig::from_json(&data) {
            Ok(config) => config,
            Err(err) => {
                log::error!("failed to parse particle config for '{name}': {err}");
                return None;
            }
        };

        let mut texture = None;
        let mut texture_size = (0, 0);
        let mut extra_textures = Vec::new();
        let mut texture_name = String::new();
        let mut blend_mode = BlendMode::Additive;
        let mut tex_meta: Option<TexMeta> = None;

        if !config.material.is_empty() {
            let mut texture_names: Vec<String> = Vec::new();

            if config.material.ends_with(".json") {
                if let Some(material) = self.locate_particle_material(&config.material, &config_path)
                {
                    if let Some(pass) = material.passes.first() {
                        texture_names = pass
                            .textures
                            .iter()
                            .filter_map(|t| t.clone())
                            .collect();
                        blend_mode = match pass.blending.as_str() {
                            "alpha" => BlendMode::Alpha,
                            _ => BlendMode::Additive,
                        };
                    }
                }
            } else {
                texture_names = vec![config.material.clone()];
            }

            if !texture_names.is_empty() {
                // A leading "blank" texture is a placeholder; prefer the
                // first real one as the primary sprite.
                let primary = texture_names
                    .iter()
                    .position(|n| !n.to_ascii_lowercase().contains(" blank"))
                    .unwrap_or(0);
                texture_name = texture_names[primary].clone();

                for (i, candidate) in texture_names.iter().enumerate() {
                    let Some(path) = self.resolver.find_texture(candidate) else {
                        log::warn!("particle '{name}': texture '{candidate}' not found");
                        continue;
                    };
                    let Some(loaded) = self.store.load_path(
                        self.backend,
                        self.resolver,
                        &self.config.decode,
                        &path,
                        WrapMode::Clamp,
                    ) else {
                        continue;
                    };
                    if i == primary {
                        texture = Some(loaded.handle);
                        texture_size = (loaded.width, loaded.height);
                        tex_meta = self
                            .resolver
                            .find_tex_meta(&path)
                            .and_then(|meta_path| TexMeta::from_path(&meta_path).ok());
                    } else {
                        extra_textures.push(loaded.handle);
                    }
                }
            }
        }

        Some(ParticleSystem::new(ParticleSystemOptions {
            name: name.to_string(),
            config,
            texture,
            texture_size,
            extra_textures,
            texture_name,
            overrides,
            blend_mode,
            tex_meta,
        }))
    }

    fn locate_particle_json(&self, particle_path: &str) -> Option<PathBuf> {
        let candidates = [
            PathBuf::from(particle_path),
            self.resolver.tmp_dir().join(particle_path),
            self.resolver.resolve_asset(particle_path),
            self.resolver
                .tmp_dir()
                .join("particles")
                .join(Path::new(particle_path).file_name()?),
        ];
        for candidate in candidates {
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        let found = self.resolver.find_in_tmp_by_suffix(particle_path);
        if found.is_none() {
            log::error!("failed to locate particle config '{particle_path}'");
        }
        found
    }

    fn locate_particle_material(&self, material: &str, config_path: &Path) -> Option<Material> {
        let mut candidates = vec![
            self.resolver.tmp_dir().join(material),
            self.resolver.resolve_asset(material),
            self.resolver.tmp_dir().join("materials").join(material),
        ];
        if let Some(dir) = config_path.parent() {
            candidates.push(dir.join(material));
        }

        let path = candidates.into_iter().find(|p| p.is_file())?;
        let data = std::fs::read(&path).ok()?;
        match Material::from_json(&data) {
            Ok(material) => Some(material),
            Err(err) => {
                log::warn!("unreadable particle material '{}': {err}", path.display());
                None
            }
        }
    }
}
