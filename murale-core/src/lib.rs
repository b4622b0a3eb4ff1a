#![forbid(unsafe_code)]

//! Playback engine for packaged animated-wallpaper scenes: archive and
//! texture codecs, the typed scene runtime, the effect/shader pipeline, the
//! particle engine, and a backend-agnostic compositing renderer.

pub mod assets;
pub mod audio;
pub mod config;
pub mod foundation;
pub mod mesh;
pub mod particle;
pub mod pkg;
pub mod render;
pub mod runtime;
pub mod scene;
pub mod shader;
pub mod tex;
pub mod text;

pub use assets::AssetResolver;
pub use audio::{NullSoundPlayer, SoundPlayer};
pub use config::{discover_upstream_assets, PlayerConfig, ScalingMode};
pub use foundation::error::{MuraleError, MuraleResult};
pub use foundation::math::{parse_color, Vec2, Vec3};
pub use mesh::{load_mdl, MdlMesh, MdlVertex};
pub use particle::{Particle, ParticleSystem, ParticleSystemOptions};
pub use pkg::{bulk_convert_textures, Package, PackageEntry};
pub use render::headless::HeadlessBackend;
pub use render::object::{RenderObject, SceneBuilder};
pub use render::renderer::Renderer;
pub use render::textures::{LoadedTexture, TextureStore};
pub use render::{
    BlendMode, Rect, RenderBackend, ScissorRect, ShaderHandle, TargetHandle, TextureHandle, Tint,
    UniformLocation, UniformValue, WrapMode,
};
pub use runtime::{build_renderer, load_scene, package_in_folder, prepare_package};
pub use scene::{Binding, Dynamic, ObjectKind, Scene, SceneObject};
pub use shader::{GlobalState, LoadedEffect, LoadedPass};
pub use tex::{decode_tex, decode_tex_file, DecodeOptions, TexImage, TexMeta};
pub use text::{NullTextRasterizer, TextRasterizer};
