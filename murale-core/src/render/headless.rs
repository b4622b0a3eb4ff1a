//! Software implementation of [`RenderBackend`]: nearest-neighbor textured
//! quads composited on the CPU. Shader compilation is reported as
//! unsupported, so effect passes take the renderer's documented fallback.
//! Render-target textures emulate GL's bottom-up storage so the frame
//! loop's flip rules behave identically on both backends.

use crate::foundation::error::{MuraleError, MuraleResult};
use crate::render::{
    BlendMode, Rect, RenderBackend, ScissorRect, ShaderHandle, TargetHandle, TextureHandle, Tint,
    UniformLocation, UniformValue, WrapMode,
};
use crate::tex::TexImage;

#[derive(Clone, Debug)]
struct SoftTexture {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
    wrap: WrapMode,
    bottom_up: bool,
}

#[derive(Default)]
pub struct HeadlessBackend {
    textures: Vec<SoftTexture>,
    targets: Vec<Option<TextureHandle>>,
    frame: Option<SoftTexture>,
    current_target: Option<TargetHandle>,
    scissor: Option<ScissorRect>,
    blend: BlendMode,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The composited frame after `end_frame`: `(width, height, rgba)`.
    pub fn frame_pixels(&self) -> Option<(u32, u32, &[u8])> {
        self.frame
            .as_ref()
            .map(|f| (f.width, f.height, f.rgba.as_slice()))
    }

    fn alloc_texture(&mut self, tex: SoftTexture) -> TextureHandle {
        self.textures.push(tex);
        TextureHandle(self.textures.len() as u32 - 1)
    }

    fn dest_size(&self) -> (u32, u32) {
        match self.current_target {
            Some(target) => {
                let tex = self.targets[target.0 as usize].expect("live target");
                let t = &self.textures[tex.0 as usize];
                (t.width, t.height)
            }
            None => self
                .frame
                .as_ref()
                .map(|f| (f.width, f.height))
                .unwrap_or((0, 0)),
        }
    }

    fn in_scissor(&self, x: i32, y: i32) -> bool {
        // Scissor clips only the default framebuffer; offscreen passes run
        // with the scissor suspended by the frame loop.
        if self.current_target.is_some() {
            return true;
        }
        match &self.scissor {
            Some(rect) => {
                x >= rect.x && x < rect.x + rect.w && y >= rect.y && y < rect.y + rect.h
            }
            None => true,
        }
    }

    fn write_pixel(&mut self, x: i32, y: i32, src: [f32; 4]) {
        let (w, h) = self.dest_size();
        if x < 0 || y < 0 || x >= w as i32 || y >= h as i32 || !self.in_scissor(x, y) {
            return;
        }

        let blend = self.blend;
        let dest = match self.current_target {
            Some(target) => {
                let tex = self.targets[target.0 as usize].expect("live target");
                &mut self.textures[tex.0 as usize]
            }
            None => self.frame.as_mut().expect("begin_frame not called"),
        };

        let idx = ((y as u32 * dest.width + x as u32) * 4) as usize;
        let dst = [
            dest.rgba[idx] as f32 / 255.0,
            dest.rgba[idx + 1] as f32 / 255.0,
            dest.rgba[idx + 2] as f32 / 255.0,
            dest.rgba[idx + 3] as f32 / 255.0,
        ];

        let sa = src[3];
        let out = match blend {
            BlendMode::Alpha => [
                src[0] * sa + dst[0] * (1.0 - sa),
                src[1] * sa + dst[1] * (1.0 - sa),
                src[2] * sa + dst[2] * (1.0 - sa),
                sa + dst[3] * (1.0 - sa),
            ],
            BlendMode::Additive => [
                dst[0] + src[0] * sa,
                dst[1] + src[1] * sa,
                dst[2] + src[2] * sa,
                dst[3],
            ],
        };
        for (i, channel) in out.iter().enumerate() {
            dest.rgba[idx + i] = (channel.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
    }

    fn sample(texture: &SoftTexture, mut sx: i64, mut sy: i64) -> [f32; 4] {
        let w = texture.width as i64;
        let h = texture.height as i64;
        match texture.wrap {
            WrapMode::Repeat => {
                sx = sx.rem_euclid(w);
                sy = sy.rem_euclid(h);
            }
            WrapMode::Clamp => {
                sx = sx.clamp(0, w - 1);
                sy = sy.clamp(0, h - 1);
            }
        }
        let idx = ((sy * w + sx) * 4) as usize;
        [
            texture.rgba[idx] as f32 / 255.0,
            texture.rgba[idx + 1] as f32 / 255.0,
            texture.rgba[idx + 2] as f32 / 255.0,
            texture.rgba[idx + 3] as f32 / 255.0,
        ]
    }
}

impl RenderBackend for HeadlessBackend {
    fn create_texture(&mut self, image: &TexImage, wrap: WrapMode) -> MuraleResult<TextureHandle> {
        if image.rgba.len() < (image.width * image.height * 4) as usize {
            return Err(MuraleError::gpu("texture pixel buffer too short"));
        }
        Ok(self.alloc_texture(SoftTexture {
            width: image.width,
            height: image.height,
            rgba: image.rgba.clone(),
            wrap,
            bottom_up: false,
        }))
    }

    fn texture_size(&self, texture: TextureHandle) -> (u32, u32) {
        let t = &self.textures[texture.0 as usize];
        (t.width, t.height)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(t) = self.textures.get_mut(texture.0 as usize) {
            t.width = 0;
            t.height = 0;
            t.rgba.clear();
        }
    }

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
        wrap: WrapMode,
    ) -> MuraleResult<TargetHandle> {
        if width == 0 || height == 0 {
            return Err(MuraleError::gpu("render target must be non-empty"));
        }
        let texture = self.alloc_texture(SoftTexture {
            width,
            height,
            rgba: vec![0; (width * height * 4) as usize],
            wrap,
            bottom_up: true,
        });
        self.targets.push(Some(texture));
        Ok(TargetHandle(self.targets.len() as u32 - 1))
    }

    fn target_texture(&self, target: TargetHandle) -> TextureHandle {
        self.targets[target.0 as usize].expect("live target")
    }

    fn destroy_render_target(&mut self, target: TargetHandle) {
        if let Some(slot) = self.targets.get_mut(target.0 as usize) {
            *slot = None;
        }
    }

    fn compile_shader(&mut self, _vertex: &str, _fragment: &str) -> MuraleResult<ShaderHandle> {
        Err(MuraleError::gpu(
            "shader compilation is unavailable on the software backend",
        ))
    }

    fn resolve_uniform(&mut self, _shader: ShaderHandle, _name: &str) -> Option<UniformLocation> {
        None
    }

    fn set_uniform(
        &mut self,
        _shader: ShaderHandle,
        _location: UniformLocation,
        _value: &UniformValue,
    ) {
    }

    fn bind_texture_slot(&mut self, _slot: u32, _texture: TextureHandle) {}

    fn begin_frame(&mut self, screen_width: u32, screen_height: u32) {
        self.frame = Some(SoftTexture {
            width: screen_width.max(1),
            height: screen_height.max(1),
            rgba: vec![0; (screen_width.max(1) * screen_height.max(1) * 4) as usize],
            wrap: WrapMode::Clamp,
            bottom_up: false,
        });
        self.scissor = None;
        self.blend = BlendMode::Alpha;
        self.current_target = None;
    }

    fn end_frame(&mut self) {}

    fn clear(&mut self, rgba: Tint) {
        let (w, h) = self.dest_size();
        let px = [
            (rgba[0].clamp(0.0, 1.0) * 255.0).round() as u8,
            (rgba[1].clamp(0.0, 1.0) * 255.0).round() as u8,
            (rgba[2].clamp(0.0, 1.0) * 255.0).round() as u8,
            (rgba[3].clamp(0.0, 1.0) * 255.0).round() as u8,
        ];
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                if !self.in_scissor(x, y) {
                    continue;
                }
                let dest = match self.current_target {
                    Some(target) => {
                        let tex = self.targets[target.0 as usize].expect("live target");
                        &mut self.textures[tex.0 as usize]
                    }
                    None => self.frame.as_mut().expect("begin_frame not called"),
                };
                let idx = ((y as u32 * dest.width + x as u32) * 4) as usize;
                dest.rgba[idx..idx + 4].copy_from_slice(&px);
            }
        }
    }

    fn begin_scissor(&mut self, rect: ScissorRect) {
        self.scissor = Some(rect);
    }

    fn end_scissor(&mut self) {
        self.scissor = None;
    }

    fn begin_target(&mut self, target: TargetHandle) {
        self.current_target = Some(target);
    }

    fn end_target(&mut self) {
        self.current_target = None;
    }

    fn begin_shader(&mut self, _shader: ShaderHandle) {}

    fn end_shader(&mut self) {}

    fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend = mode;
    }

    fn draw_textured(
        &mut self,
        texture: TextureHandle,
        src: Rect,
        dst: Rect,
        pivot: (f64, f64),
        rotation_deg: f64,
        tint: Tint,
    ) {
        if dst.w <= 0.0 || dst.h <= 0.0 {
            return;
        }
        let tex = self.textures[texture.0 as usize].clone();
        if tex.width == 0 || tex.height == 0 {
            return;
        }

        // Requested flip cancels against GL's bottom-up target storage.
        let flip = (src.h < 0.0) != tex.bottom_up;
        let src_w = src.w.abs().max(1.0);
        let src_h = src.h.abs().max(1.0);

        let rad = rotation_deg.to_radians();
        let (sin, cos) = rad.sin_cos();

        // Pivot sits at (dst.x, dst.y); walk the rotated quad's bounding box
        // and inverse-map each pixel into texture space.
        let radius = (dst.w * dst.w + dst.h * dst.h).sqrt();
        let x0 = (dst.x - radius).floor() as i32;
        let x1 = (dst.x + radius).ceil() as i32;
        let y0 = (dst.y - radius).floor() as i32;
        let y1 = (dst.y + radius).ceil() as i32;

        for py in y0..=y1 {
            for px in x0..=x1 {
                let dx = px as f64 + 0.5 - dst.x;
                let dy = py as f64 + 0.5 - dst.y;
                // rotate back by -angle
                let lx = dx * cos + dy * sin + pivot.0;
                let ly = -dx * sin + dy * cos + pivot.1;
                if lx < 0.0 || ly < 0.0 || lx >= dst.w || ly >= dst.h {
                    continue;
                }

                let u = lx / dst.w;
                let v = if flip { 1.0 - ly / dst.h } else { ly / dst.h };
                let sx = (src.x + u * src_w).floor() as i64;
                let sy = (src.y.max(0.0) + v * src_h).floor() as i64;

                let sample = Self::sample(&tex, sx, sy);
                let colored = [
                    sample[0] * tint[0],
                    sample[1] * tint[1],
                    sample[2] * tint[2],
                    sample[3] * tint[3],
                ];
                if colored[3] <= 0.0 {
                    continue;
                }
                self.write_pixel(px, py, colored);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white_texture(backend: &mut HeadlessBackend, w: u32, h: u32) -> TextureHandle {
        backend
            .create_texture(
                &TexImage {
                    width: w,
                    height: h,
                    rgba: vec![255; (w * h * 4) as usize],
                },
                WrapMode::Clamp,
            )
            .unwrap()
    }

    fn pixel(backend: &HeadlessBackend, x: u32, y: u32) -> [u8; 4] {
        let (w, _, rgba) = backend.frame_pixels().unwrap();
        let idx = ((y * w + x) * 4) as usize;
        rgba[idx..idx + 4].try_into().unwrap()
    }

    #[test]
    fn clear_respects_scissor() {
        let mut backend = HeadlessBackend::new();
        backend.begin_frame(8, 8);
        backend.begin_scissor(ScissorRect { x: 2, y: 2, w: 4, h: 4 });
        backend.clear([1.0, 0.0, 0.0, 1.0]);
        backend.end_scissor();
        backend.end_frame();

        assert_eq!(pixel(&backend, 3, 3), [255, 0, 0, 255]);
        assert_eq!(pixel(&backend, 0, 0), [0, 0, 0, 0]);
        assert_eq!(pixel(&backend, 7, 7), [0, 0, 0, 0]);
    }

    #[test]
    fn draw_centers_on_pivot() {
        let mut backend = HeadlessBackend::new();
        backend.begin_frame(10, 10);
        let tex = white_texture(&mut backend, 2, 2);
        backend.draw_textured(
            tex,
            Rect::new(0.0, 0.0, 2.0, 2.0),
            Rect::new(5.0, 5.0, 4.0, 4.0),
            (2.0, 2.0),
            0.0,
            super::super::WHITE,
        );
        backend.end_frame();

        assert_eq!(pixel(&backend, 4, 4), [255, 255, 255, 255]);
        assert_eq!(pixel(&backend, 6, 6), [255, 255, 255, 255]);
        assert_eq!(pixel(&backend, 1, 1), [0, 0, 0, 0]);
        assert_eq!(pixel(&backend, 8, 8), [0, 0, 0, 0]);
    }

    #[test]
    fn additive_blend_accumulates() {
        let mut backend = HeadlessBackend::new();
        backend.begin_frame(2, 2);
        backend.clear([0.2, 0.2, 0.2, 1.0]);
        let tex = white_texture(&mut backend, 1, 1);
        backend.set_blend_mode(BlendMode::Additive);
        backend.draw_textured(
            tex,
            Rect::new(0.0, 0.0, 1.0, 1.0),
            Rect::new(0.0, 0.0, 2.0, 2.0),
            (0.0, 0.0),
            0.0,
            [0.5, 0.5, 0.5, 1.0],
        );
        backend.end_frame();

        let px = pixel(&backend, 1, 1);
        assert!(px[0] > 170 && px[0] < 190, "got {px:?}");
    }

    #[test]
    fn render_target_roundtrip_is_upright() {
        let mut backend = HeadlessBackend::new();
        backend.begin_frame(2, 2);

        // Texture with a red top row and green bottom row.
        let mut rgba = vec![0u8; 2 * 2 * 4];
        rgba[0..4].copy_from_slice(&[255, 0, 0, 255]);
        rgba[4..8].copy_from_slice(&[255, 0, 0, 255]);
        rgba[8..12].copy_from_slice(&[0, 255, 0, 255]);
        rgba[12..16].copy_from_slice(&[0, 255, 0, 255]);
        let tex = backend
            .create_texture(
                &TexImage {
                    width: 2,
                    height: 2,
                    rgba,
                },
                WrapMode::Clamp,
            )
            .unwrap();

        let rt = backend.create_render_target(2, 2, WrapMode::Repeat).unwrap();
        backend.begin_target(rt);
        backend.clear([0.0; 4]);
        backend.draw_textured(
            tex,
            Rect::new(0.0, 0.0, 2.0, 2.0),
            Rect::new(0.0, 0.0, 2.0, 2.0),
            (0.0, 0.0),
            0.0,
            super::super::WHITE,
        );
        backend.end_target();

        // Draw the target's texture with the flip the frame loop applies.
        let rt_tex = backend.target_texture(rt);
        backend.draw_textured(
            rt_tex,
            Rect::new(0.0, 0.0, 2.0, -2.0),
            Rect::new(0.0, 0.0, 2.0, 2.0),
            (0.0, 0.0),
            0.0,
            super::super::WHITE,
        );
        backend.end_frame();

        assert_eq!(pixel(&backend, 0, 0), [255, 0, 0, 255]);
        assert_eq!(pixel(&backend, 0, 1), [0, 255, 0, 255]);
    }

    #[test]
    fn software_backend_reports_no_shader_support() {
        let mut backend = HeadlessBackend::new();
        assert!(backend.compile_shader("", "").is_err());
    }
}
