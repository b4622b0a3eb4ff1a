//! Process-lifetime texture cache. Once decoded and uploaded, a texture
//! stays resident; the working set is bounded by the scene, so there is no
//! eviction. Failed loads are cached too, so a missing asset logs once.

use std::collections::HashMap;
use std::path::Path;

use crate::assets::AssetResolver;
use crate::render::{RenderBackend, TextureHandle, WrapMode};
use crate::tex::{self, DecodeOptions};

#[derive(Clone, Copy, Debug)]
pub struct LoadedTexture {
    pub handle: TextureHandle,
    pub width: u32,
    pub height: u32,
}

#[derive(Default)]
pub struct TextureStore {
    by_path: HashMap<String, Option<LoadedTexture>>,
}

impl TextureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a texture by resolved filesystem path, through the PNG cache.
    pub fn load_path(
        &mut self,
        backend: &mut dyn RenderBackend,
        resolver: &AssetResolver,
        options: &DecodeOptions,
        path: &Path,
        wrap: WrapMode,
    ) -> Option<LoadedTexture> {
        let key = path.to_string_lossy().into_owned();
        if let Some(cached) = self.by_path.get(&key) {
            return *cached;
        }

        let loaded = match tex::load_texture_cached(path, &resolver.converted_dir(), options) {
            Ok(image) => match backend.create_texture(&image, wrap) {
                Ok(handle) => Some(LoadedTexture {
                    handle,
                    width: image.width,
                    height: image.height,
                }),
                Err(err) => {
                    log::warn!("texture upload failed for '{}': {err}", path.display());
                    None
                }
            },
            Err(err) => {
                log::warn!("texture decode failed for '{}': {err}", path.display());
                None
            }
        };

        self.by_path.insert(key, loaded);
        loaded
    }

    /// Loads a texture by logical name via the resolver search order.
    pub fn load_name(
        &mut self,
        backend: &mut dyn RenderBackend,
        resolver: &AssetResolver,
        options: &DecodeOptions,
        name: &str,
        wrap: WrapMode,
    ) -> Option<LoadedTexture> {
        let path = resolver.find_texture(name)?;
        self.load_path(backend, resolver, options, &path, wrap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::headless::HeadlessBackend;

    #[test]
    fn load_is_cached_and_failures_are_remembered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tmp/materials")).unwrap();
        let tex_bytes = crate::tex::tests::build_tex(0, (1, 1), (1, 1), &[5, 5, 5, 255], false);
        std::fs::write(dir.path().join("tmp/materials/ok.tex"), tex_bytes).unwrap();
        std::fs::write(dir.path().join("tmp/materials/bad.tex"), b"junk").unwrap();

        let resolver = AssetResolver::new(dir.path(), None);
        let mut backend = HeadlessBackend::new();
        let mut store = TextureStore::new();
        let options = DecodeOptions::default();

        let a = store
            .load_name(&mut backend, &resolver, &options, "materials/ok", WrapMode::Clamp)
            .unwrap();
        let b = store
            .load_name(&mut backend, &resolver, &options, "materials/ok", WrapMode::Clamp)
            .unwrap();
        assert_eq!(a.handle, b.handle);

        assert!(store
            .load_name(&mut backend, &resolver, &options, "materials/bad", WrapMode::Clamp)
            .is_none());
        assert!(store
            .load_name(&mut backend, &resolver, &options, "materials/bad", WrapMode::Clamp)
            .is_none());
    }
}
