//! Maps logical asset names (`materials/foo`, `foo.tex`, `foo.json`) to
//! concrete files across a priority-ordered search set rooted at the working
//! directory, with a recursive walk as the last resort and JSON redirection
//! for image -> material -> texture chains.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

const TEXTURE_EXTENSIONS: &[&str] = &[".tex", ".png", ".jpg", ".jpeg", ".tex-json"];
const IMAGE_EXTENSIONS: &[&str] = &["tex", "png", "jpg", "jpeg"];

/// Resolver context: the working directory (containing `tmp/`, `converted/`
/// and optionally `assets/`) plus the configured upstream assets tree.
#[derive(Clone, Debug, Default)]
pub struct AssetResolver {
    root: PathBuf,
    upstream: Option<PathBuf>,
}

impl AssetResolver {
    pub fn new(root: impl Into<PathBuf>, upstream: Option<PathBuf>) -> Self {
        Self {
            root: root.into(),
            upstream,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn converted_dir(&self) -> PathBuf {
        self.root.join("converted")
    }

    /// Resolves a path under the local `assets/` tree, falling back to the
    /// upstream assets tree, and finally to the (possibly nonexistent) local
    /// path so error messages stay meaningful.
    pub fn resolve_asset(&self, rel: &str) -> PathBuf {
        let local = self.root.join("assets").join(rel);
        if local.is_file() {
            return local;
        }
        if let Some(upstream) = &self.upstream {
            let candidate = upstream.join(rel);
            if candidate.is_file() {
                return candidate;
            }
        }
        local
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![
            self.converted_dir(),
            self.tmp_dir().join("materials"),
            self.tmp_dir().join("materials/workshop"),
            self.tmp_dir().join("materials/presets"),
            self.tmp_dir(),
            self.root.join("assets/materials"),
            self.root.join("assets"),
        ];
        if let Some(upstream) = &self.upstream {
            dirs.push(upstream.join("materials"));
            dirs.push(upstream.clone());
        }
        dirs
    }

    /// Finds a texture file for a logical name, trying each search directory
    /// with every known extension against both the cleaned name (stripped of
    /// the `materials/` prefix and `.tex` suffix) and the original, then
    /// falling back to a recursive basename match.
    pub fn find_texture(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() {
            return None;
        }

        let stripped = name.strip_prefix("materials/").unwrap_or(name);
        let clean = stripped.strip_suffix(".tex").unwrap_or(stripped).to_string();

        for dir in self.search_dirs() {
            for ext in TEXTURE_EXTENSIONS {
                let candidates = [
                    dir.join(format!("{clean}{ext}")),
                    dir.join(format!("{name}{ext}")),
                    dir.join(name),
                ];
                for candidate in candidates {
                    if candidate.is_file() {
                        return Some(candidate);
                    }
                }
            }
        }

        self.find_by_basename(&clean)
    }

    fn find_by_basename(&self, clean: &str) -> Option<PathBuf> {
        let target = Path::new(clean)
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())?;

        let mut roots = vec![self.root.join("assets")];
        if let Some(upstream) = &self.upstream {
            roots.push(upstream.clone());
        }

        for walk_root in roots {
            if !walk_root.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&walk_root)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
            {
                let path = entry.path();
                let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                    continue;
                };
                if !IMAGE_EXTENSIONS.contains(&ext) {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if stem == clean || stem == target {
                    return Some(path.to_path_buf());
                }
            }
        }
        None
    }

    /// Locates a JSON document by logical name: extracted tree first, then
    /// the assets trees, then the name taken literally.
    pub fn locate_json(&self, name: &str) -> Option<PathBuf> {
        let candidates = [
            self.tmp_dir().join(name),
            self.resolve_asset(name),
            PathBuf::from(name),
        ];
        candidates.into_iter().find(|p| p.is_file())
    }

    /// Resolves an object's texture reference, following JSON redirection:
    /// a `.json` reference is read and its nested image/material/texture
    /// reference extracted, at most twice, before the final texture lookup.
    pub fn resolve_texture_ref(&self, image: &str, model: &str) -> Option<PathBuf> {
        let reference = if !image.is_empty() { image } else { model };
        if reference.is_empty() {
            return None;
        }

        let mut texture_name = Path::new(reference)
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(stripped) = texture_name.strip_suffix(".json") {
            texture_name = stripped.to_string();
        }

        if reference.ends_with(".json") {
            if let Some(doc_path) = self.locate_json(reference) {
                if let Some(extracted) = extract_texture_reference(&doc_path) {
                    if extracted.ends_with(".json") {
                        // Second and last hop; deeper chains report missing.
                        let next = self
                            .find_texture(&extracted)
                            .or_else(|| self.locate_json(&extracted));
                        if let Some(next_path) = next {
                            if let Some(inner) = extract_texture_reference(&next_path) {
                                texture_name = inner;
                            }
                        }
                    } else {
                        texture_name = extracted;
                    }
                }
            }
        }

        self.find_texture(&texture_name)
    }

    /// Companion metadata for a resolved texture: `<path>-json`, then the
    /// stem with `.tex-json`, then the stem with `.tex-json` spelled via the
    /// `.tex` suffix.
    pub fn find_tex_meta(&self, texture_path: &Path) -> Option<PathBuf> {
        let with_suffix = PathBuf::from(format!("{}-json", texture_path.display()));
        if with_suffix.is_file() {
            return Some(with_suffix);
        }

        let stem = texture_path.with_extension("");
        let candidate = PathBuf::from(format!("{}.tex-json", stem.display()));
        if candidate.is_file() {
            return Some(candidate);
        }
        None
    }

    /// Finds `scene.json` anywhere under the extracted tree.
    pub fn find_scene_json(&self) -> Option<PathBuf> {
        WalkDir::new(self.tmp_dir())
            .into_iter()
            .filter_map(|entry| entry.ok())
            .find(|entry| entry.file_type().is_file() && entry.file_name() == "scene.json")
            .map(|entry| entry.into_path())
    }

    /// Last-resort lookup for configs referenced by partial path: a file
    /// under `tmp/` whose path ends with `suffix` or with its basename.
    pub fn find_in_tmp_by_suffix(&self, suffix: &str) -> Option<PathBuf> {
        let base = Path::new(suffix)
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        WalkDir::new(self.tmp_dir())
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .find(|entry| {
                let p = entry.path().to_string_lossy().replace('\\', "/");
                p.ends_with(suffix) || (!base.is_empty() && p.ends_with(&base))
            })
            .map(|entry| entry.into_path())
    }
}

#[derive(Debug, Default, Deserialize)]
struct RedirectDoc {
    #[serde(default)]
    image: String,
    #[serde(default)]
    material: String,
    #[serde(default)]
    passes: Vec<RedirectPass>,
    #[serde(default)]
    model: RedirectModel,
}

#[derive(Debug, Default, Deserialize)]
struct RedirectPass {
    #[serde(default)]
    textures: Vec<Option<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RedirectModel {
    #[serde(default)]
    material: String,
}

fn extract_texture_reference(json_path: &Path) -> Option<String> {
    let data = std::fs::read(json_path).ok()?;
    let doc: RedirectDoc = serde_json::from_slice(&data).ok()?;

    if !doc.image.is_empty() {
        return Some(doc.image);
    }
    if !doc.material.is_empty() {
        return Some(doc.material);
    }
    if let Some(tex) = doc
        .passes
        .first()
        .and_then(|p| p.textures.first())
        .and_then(|t| t.clone())
    {
        if !tex.is_empty() {
            return Some(tex);
        }
    }
    if !doc.model.material.is_empty() {
        return Some(doc.model.material);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn resolver(dir: &Path) -> AssetResolver {
        AssetResolver::new(dir, None)
    }

    #[test]
    fn converted_dir_wins_over_tmp() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("converted")).unwrap();
        fs::create_dir_all(dir.path().join("tmp/materials")).unwrap();
        fs::write(dir.path().join("converted/wall.png"), b"png").unwrap();
        fs::write(dir.path().join("tmp/materials/wall.tex"), b"tex").unwrap();

        let found = resolver(dir.path()).find_texture("materials/wall.tex").unwrap();
        assert!(found.ends_with("converted/wall.png"));
    }

    #[test]
    fn cleaned_name_strips_prefix_and_suffix() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tmp/materials")).unwrap();
        fs::write(dir.path().join("tmp/materials/fg.tex"), b"tex").unwrap();

        let found = resolver(dir.path()).find_texture("materials/fg.tex").unwrap();
        assert!(found.ends_with("tmp/materials/fg.tex"));
    }

    #[test]
    fn recursive_fallback_matches_basename() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("assets/deep/nested")).unwrap();
        fs::write(dir.path().join("assets/deep/nested/star.png"), b"png").unwrap();

        let found = resolver(dir.path()).find_texture("effects/star").unwrap();
        assert!(found.ends_with("assets/deep/nested/star.png"));
    }

    #[test]
    fn missing_texture_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolver(dir.path()).find_texture("nope").is_none());
    }

    #[test]
    fn json_redirection_follows_image_then_material() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tmp/materials")).unwrap();

        // object image -> model json -> material json -> texture name
        fs::write(
            dir.path().join("tmp/char.json"),
            br#"{"material": "materials/char_mat.json"}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("tmp/materials/char_mat.json"),
            br#"{"passes": [{"textures": ["materials/char_d"]}]}"#,
        )
        .unwrap();
        fs::write(dir.path().join("tmp/materials/char_d.tex"), b"tex").unwrap();

        let found = resolver(dir.path())
            .resolve_texture_ref("char.json", "")
            .unwrap();
        assert!(found.ends_with("tmp/materials/char_d.tex"));
    }

    #[test]
    fn tex_meta_lookup_tries_both_spellings() {
        let dir = tempfile::tempdir().unwrap();
        let tex = dir.path().join("sheet.tex");
        fs::write(&tex, b"t").unwrap();
        fs::write(dir.path().join("sheet.tex-json"), b"{}").unwrap();

        let meta = resolver(dir.path()).find_tex_meta(&tex).unwrap();
        assert!(meta.ends_with("sheet.tex-json"));
    }

    #[test]
    fn scene_json_found_by_walk() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tmp/sub")).unwrap();
        fs::write(dir.path().join("tmp/sub/scene.json"), b"{}").unwrap();
        assert!(resolver(dir.path()).find_scene_json().is_some());
    }
}
