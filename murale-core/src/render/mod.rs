//! Rendering abstraction. All GPU work funnels through [`RenderBackend`] so
//! the frame loop, effect pipeline, and particle draw are backend-agnostic:
//! the default software backend composites textured quads for headless use
//! and tests, while a GL-backed implementation can live behind a window.

pub mod headless;
pub mod object;
pub mod renderer;
pub mod textures;

use crate::foundation::error::MuraleResult;
use crate::tex::TexImage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub i32);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScissorRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    #[default]
    Alpha,
    Additive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WrapMode {
    #[default]
    Clamp,
    Repeat,
}

/// RGBA tint with components in 0..1.
pub type Tint = [f32; 4];

pub const WHITE: Tint = [1.0, 1.0, 1.0, 1.0];

#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    IdentityMatrix,
    Sampler(i32),
}

/// Contract between the frame loop and a concrete graphics implementation.
/// Exactly one thread drives a backend; handles never leave it.
pub trait RenderBackend {
    fn create_texture(&mut self, image: &TexImage, wrap: WrapMode) -> MuraleResult<TextureHandle>;
    fn texture_size(&self, texture: TextureHandle) -> (u32, u32);
    /// Releases a texture that is being replaced (e.g. re-rasterized text).
    /// Scene textures stay resident for the process lifetime and are never
    /// destroyed individually.
    fn destroy_texture(&mut self, _texture: TextureHandle) {}

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        wrap: WrapMode,
    ) -> MuraleResult<TargetHandle>;
    fn target_texture(&self, target: TargetHandle) -> TextureHandle;
    fn destroy_render_target(&mut self, target: TargetHandle);

    /// Compiles a preprocessed vertex/fragment pair. Backends without shader
    /// support report a gpu error; callers treat that pass as absent.
    fn compile_shader(&mut self, vertex: &str, fragment: &str) -> MuraleResult<ShaderHandle>;
    fn resolve_uniform(&mut self, shader: ShaderHandle, name: &str) -> Option<UniformLocation>;
    fn set_uniform(&mut self, shader: ShaderHandle, location: UniformLocation, value: &UniformValue);
    fn bind_texture_slot(&mut self, slot: u32, texture: TextureHandle);

    fn begin_frame(&mut self, screen_width: u32, screen_height: u32);
    fn end_frame(&mut self);
    fn clear(&mut self, rgba: Tint);

    fn begin_scissor(&mut self, rect: ScissorRect);
    fn end_scissor(&mut self);

    fn begin_target(&mut self, target: TargetHandle);
    fn end_target(&mut self);

    fn begin_shader(&mut self, shader: ShaderHandle);
    fn end_shader(&mut self);

    fn set_blend_mode(&mut self, mode: BlendMode);

    /// Draws `src` of the texture into a `dst.w` x `dst.h` quad whose pivot
    /// point sits at `(dst.x, dst.y)`; the quad's top-left is offset by
    /// `-pivot` and the whole quad rotates about the pivot by
    /// `rotation_deg`. Color and alpha are modulated by `tint`. A negative
    /// `src.h` samples the texture flipped vertically, which is how
    /// render-target contents are drawn upright.
    #[allow(clippy::too_many_arguments)]
    fn draw_textured(
        &mut self,
        texture: TextureHandle,
        src: Rect,
        dst: Rect,
        pivot: (f64, f64),
        rotation_deg: f64,
        tint: Tint,
    );
}
