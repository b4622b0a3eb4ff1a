use std::path::PathBuf;

use crate::tex::DecodeOptions;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScalingMode {
    #[default]
    Fit,
    Cover,
}

impl ScalingMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "cover" => Self::Cover,
            _ => Self::Fit,
        }
    }
}

/// Runtime configuration assembled at startup and handed down explicitly;
/// nothing in the library reads process-global state.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Upstream content-tool assets directory, if one was found or given.
    pub assets_dir: Option<PathBuf>,
    pub scaling: ScalingMode,
    pub silent: bool,
    pub debug: bool,
    pub debug_ui: bool,
    /// Worker cap for the startup texture conversion pass.
    pub convert_workers: usize,
    pub decode: DecodeOptions,
    /// Apply the mask-flip / waterripple source patches legacy scenes need.
    pub legacy_shader_fixups: bool,
    /// Honor model `cropoffset` when positioning objects.
    pub apply_crop_offset: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            assets_dir: None,
            scaling: ScalingMode::Fit,
            silent: false,
            debug: false,
            debug_ui: false,
            convert_workers: 10,
            decode: DecodeOptions::default(),
            legacy_shader_fixups: true,
            apply_crop_offset: false,
        }
    }
}

/// Probes the usual content-tool install locations for an assets tree.
pub fn discover_upstream_assets(custom: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = custom {
        if path.is_dir() {
            log::info!("using assets path: {}", path.display());
            return Some(path.clone());
        }
        log::warn!("assets path not found: {}", path.display());
    }

    let home = std::env::var_os("HOME").map(PathBuf::from)?;
    let candidates = [
        home.join(".local/share/Steam/steamapps/common/wallpaper_engine/assets"),
        home.join(".steam/steam/steamapps/common/wallpaper_engine/assets"),
        home.join(
            ".var/app/com.valvesoftware.Steam/.local/share/Steam/steamapps/common/wallpaper_engine/assets",
        ),
        PathBuf::from("/usr/share/wallpaper_engine/assets"),
    ];
    for candidate in candidates {
        if candidate.is_dir() {
            log::info!("discovered upstream assets at {}", candidate.display());
            return Some(candidate);
        }
    }
    log::warn!("no upstream assets folder found; bundled effects may fail to load");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaling_mode_parse_defaults_to_fit() {
        assert_eq!(ScalingMode::parse("cover"), ScalingMode::Cover);
        assert_eq!(ScalingMode::parse("fit"), ScalingMode::Fit);
        assert_eq!(ScalingMode::parse("garbage"), ScalingMode::Fit);
    }
}
