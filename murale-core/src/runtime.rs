//! Startup orchestration: package extraction, bulk texture conversion,
//! scene parsing, and render-object construction. The windowed loop and the
//! headless snapshot path both start here.

use std::path::Path;

use anyhow::Context as _;

use crate::assets::AssetResolver;
use crate::audio::SoundPlayer;
use crate::config::{discover_upstream_assets, PlayerConfig};
use crate::foundation::error::{MuraleError, MuraleResult};
use crate::pkg::{bulk_convert_textures, Package};
use crate::render::object::SceneBuilder;
use crate::render::renderer::Renderer;
use crate::render::textures::TextureStore;
use crate::render::RenderBackend;
use crate::scene::model::Scene;

/// Recreates the working directories and extracts the package into `tmp/`.
pub fn prepare_package(root: &Path, pkg_path: &Path) -> MuraleResult<AssetResolver> {
    let tmp = root.join("tmp");
    let converted = root.join("converted");
    for dir in [&tmp, &converted] {
        if dir.exists() {
            std::fs::remove_dir_all(dir)
                .with_context(|| format!("clear '{}'", dir.display()))
                .map_err(MuraleError::from)?;
        }
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create '{}'", dir.display()))
            .map_err(MuraleError::from)?;
    }

    log::info!("unpacking {}", pkg_path.display());
    let package = Package::open(pkg_path)?;
    package.extract_to(&tmp)?;
    Ok(AssetResolver::new(root, None))
}

/// Parses the extracted scene. A missing or unparseable root document is
/// fatal; playback cannot proceed without it.
pub fn load_scene(resolver: &AssetResolver) -> MuraleResult<Scene> {
    let scene_path = resolver
        .find_scene_json()
        .ok_or_else(|| MuraleError::missing_asset("scene.json not found in extracted package"))?;
    log::debug!("found scene description at {}", scene_path.display());
    let data = std::fs::read(&scene_path)
        .with_context(|| format!("read '{}'", scene_path.display()))
        .map_err(MuraleError::from)?;
    let scene = Scene::from_json(&data)?;
    log::info!("scene loaded: {} objects", scene.objects.len());
    Ok(scene)
}

/// Full startup after extraction: converts textures, loads the scene, and
/// builds the renderer against the provided backend.
pub fn build_renderer(
    backend: &mut dyn RenderBackend,
    config: &PlayerConfig,
    root: &Path,
    sound: &mut dyn SoundPlayer,
) -> MuraleResult<Renderer> {
    let upstream = discover_upstream_assets(config.assets_dir.as_ref());
    let resolver = AssetResolver::new(root, upstream);

    let scene = load_scene(&resolver)?;

    bulk_convert_textures(
        &resolver.tmp_dir(),
        &resolver.converted_dir(),
        config.convert_workers,
        &config.decode,
    );

    let mut store = TextureStore::new();
    let objects = SceneBuilder {
        backend: &mut *backend,
        resolver: &resolver,
        store: &mut store,
        config,
    }
    .build(&scene, sound);

    let mut renderer = Renderer::new(backend, scene.general.clone(), objects, config.scaling)?;
    renderer.set_apply_crop_offset(config.apply_crop_offset);
    Ok(renderer)
}

/// Locates the package for a wallpaper folder argument: the folder itself
/// must contain `scene.pkg`.
pub fn package_in_folder(folder: &Path) -> MuraleResult<std::path::PathBuf> {
    let pkg = folder.join("scene.pkg");
    if pkg.is_file() {
        Ok(pkg)
    } else {
        Err(MuraleError::missing_asset(format!(
            "scene.pkg not found in folder {}",
            folder.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullSoundPlayer;
    use crate::render::headless::HeadlessBackend;

    fn build_package_bytes() -> Vec<u8> {
        let scene = serde_json::json!({
            "general": {
                "clearcolor": "0 0 1",
                "orthogonalprojection": {"width": 16, "height": 16}
            },
            "objects": [{
                "name": "bg",
                "image": "materials/bg.tex",
                "origin": "8 8 0",
                "size": "16 16"
            }]
        });
        let scene_bytes = serde_json::to_vec(&scene).unwrap();
        let tex = crate::tex::tests::build_tex(0, (16, 16), (16, 16), &vec![255u8; 16 * 16 * 4], false);

        // Mirrors the on-disk container layout without a writer API.
        let mut buf = Vec::new();
        let push_string = |buf: &mut Vec<u8>, s: &str| {
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        };
        push_string(&mut buf, "PKGV0007");
        buf.extend_from_slice(&2u32.to_le_bytes());
        push_string(&mut buf, "scene.json");
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&(scene_bytes.len() as u32).to_le_bytes());
        push_string(&mut buf, "materials/bg.tex");
        buf.extend_from_slice(&(scene_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(tex.len() as u32).to_le_bytes());
        buf.extend_from_slice(&scene_bytes);
        buf.extend_from_slice(&tex);
        buf
    }

    #[test]
    fn end_to_end_package_to_renderer() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_path = dir.path().join("scene.pkg");
        std::fs::write(&pkg_path, build_package_bytes()).unwrap();

        prepare_package(dir.path(), &pkg_path).unwrap();
        assert!(dir.path().join("tmp/scene.json").is_file());
        assert!(dir.path().join("tmp/materials/bg.tex").is_file());

        let config = PlayerConfig {
            convert_workers: 2,
            ..Default::default()
        };
        let mut backend = HeadlessBackend::new();
        let mut renderer =
            build_renderer(&mut backend, &config, dir.path(), &mut NullSoundPlayer).unwrap();

        // Conversion cache should now hold the decoded PNG.
        assert!(dir.path().join("converted/bg.png").is_file());

        renderer.update_viewport(16, 16);
        renderer.render(&mut backend, 0.0, 16, 16);
        let (_, _, rgba) = backend.frame_pixels().unwrap();
        assert_eq!(&rgba[0..4], &[255, 255, 255, 255]);
    }

    #[test]
    fn missing_scene_json_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("tmp")).unwrap();
        let resolver = AssetResolver::new(dir.path(), None);
        assert!(load_scene(&resolver).is_err());
    }

    #[test]
    fn package_in_folder_requires_scene_pkg() {
        let dir = tempfile::tempdir().unwrap();
        assert!(package_in_folder(dir.path()).is_err());
        std::fs::write(dir.path().join("scene.pkg"), b"x").unwrap();
        assert!(package_in_folder(dir.path()).is_ok());
    }
}
