use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::tex::{self, DecodeOptions};

/// Decodes every `.tex` under `root` into `<cache_dir>/<stem>.png` on a
/// bounded worker pool. Runs to completion before any GPU work starts;
/// individual failures are logged and skipped. Returns the number of
/// textures converted.
pub fn bulk_convert_textures(
    root: &Path,
    cache_dir: &Path,
    workers: usize,
    options: &DecodeOptions,
) -> u32 {
    log::info!("starting bulk texture conversion");
    let _ = std::fs::create_dir_all(cache_dir);

    let tex_paths: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry.path().extension().and_then(|e| e.to_str()) == Some("tex")
        })
        .map(|entry| entry.into_path())
        .collect();

    let converted = AtomicU32::new(0);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();

    let convert_one = |path: &Path| match tex::load_texture_cached(path, cache_dir, options) {
        Ok(_) => {
            converted.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => log::error!("failed to convert '{}': {err}", path.display()),
    };

    match pool {
        Ok(pool) => pool.install(|| {
            tex_paths.par_iter().for_each(|path| convert_one(path));
        }),
        Err(err) => {
            // Pool creation failing is unusual; fall back to sequential work
            // rather than dropping the conversion pass.
            log::warn!("worker pool unavailable ({err}), converting sequentially");
            for path in &tex_paths {
                convert_one(path);
            }
        }
    }

    let count = converted.load(Ordering::Relaxed);
    log::info!("bulk conversion finished, processed {count} textures");
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_tree_and_survives_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tmp");
        std::fs::create_dir_all(root.join("materials")).unwrap();

        let good = crate::tex::tests::build_tex(0, (1, 1), (1, 1), &[9, 9, 9, 255], false);
        std::fs::write(root.join("materials/good.tex"), good).unwrap();
        std::fs::write(root.join("materials/bad.tex"), b"not a texture").unwrap();
        std::fs::write(root.join("materials/skip.json"), b"{}").unwrap();

        let cache = dir.path().join("converted");
        let count = bulk_convert_textures(&root, &cache, 4, &DecodeOptions::default());
        assert_eq!(count, 1);
        assert!(cache.join("good.png").is_file());
        assert!(!cache.join("bad.png").is_file());
    }
}
