//! The per-frame loop: viewport fit, simulation drivers, scissored
//! composite with per-object ping-pong effect application, particles last.

use chrono::Local;

use crate::config::ScalingMode;
use crate::foundation::error::MuraleResult;
use crate::foundation::math::{parse_color, Vec2, Vec3};
use crate::render::object::RenderObject;
use crate::render::textures::LoadedTexture;
use crate::render::{
    BlendMode, Rect, RenderBackend, ScissorRect, TargetHandle, WrapMode, WHITE,
};
use crate::scene::drivers;
use crate::scene::model::{General, ObjectKind, SceneObject};
use crate::shader::uniforms::{apply_pass, GlobalState, PassBindings};
use crate::shader::{fold_inline_effects, LoadedEffect};
use crate::tex::TexImage;
use crate::text::{self, TextRasterizer};

/// Margin (scene units) past which an off-screen particle system's draw is
/// skipped entirely.
const PARTICLE_CULL_MARGIN: f64 = 2000.0;

pub struct Renderer {
    pub general: General,
    pub objects: Vec<RenderObject>,

    scene_width: u32,
    scene_height: u32,
    scaling: ScalingMode,

    render_scale: f64,
    scene_offset: Vec2,
    mouse: Vec2,
    bg_color: [f32; 4],
    apply_crop_offset: bool,

    black: LoadedTexture,
    white: LoadedTexture,
}

impl Renderer {
    pub fn new(
        backend: &mut dyn RenderBackend,
        general: General,
        objects: Vec<RenderObject>,
        scaling: ScalingMode,
    ) -> MuraleResult<Self> {
        let (scene_width, scene_height) = general.projection();
        let (r, g, b) = parse_color(&general.clear_color);

        let black = solid_texture(backend, [0, 0, 0, 255])?;
        let white = solid_texture(backend, [255, 255, 255, 255])?;

        Ok(Self {
            general,
            objects,
            scene_width,
            scene_height,
            scaling,
            render_scale: 1.0,
            scene_offset: Vec2::ZERO,
            mouse: Vec2::ZERO,
            bg_color: [r as f32, g as f32, b as f32, 1.0],
            apply_crop_offset: false,
            black,
            white,
        })
    }

    /// Honor model `cropoffset` when positioning objects (off by default,
    /// matching observed content).
    pub fn set_apply_crop_offset(&mut self, apply: bool) {
        self.apply_crop_offset = apply;
    }

    pub fn scene_size(&self) -> (u32, u32) {
        (self.scene_width, self.scene_height)
    }

    pub fn mouse(&self) -> Vec2 {
        self.mouse
    }

    /// Fits the logical scene into the window and centers it.
    pub fn update_viewport(&mut self, screen_width: u32, screen_height: u32) {
        let scale_w = f64::from(screen_width) / f64::from(self.scene_width);
        let scale_h = f64::from(screen_height) / f64::from(self.scene_height);
        self.render_scale = match self.scaling {
            ScalingMode::Fit => scale_w.min(scale_h),
            ScalingMode::Cover => scale_w.max(scale_h),
        };
        self.scene_offset = Vec2::new(
            (f64::from(screen_width) - f64::from(self.scene_width) * self.render_scale) / 2.0,
            (f64::from(screen_height) - f64::from(self.scene_height) * self.render_scale) / 2.0,
        );
    }

    /// Maps a window-space mouse position into normalized scene
    /// coordinates in [-1, 1]^2.
    pub fn update_mouse(&mut self, screen_mouse: Vec2) {
        let rel_x = (screen_mouse.x - self.scene_offset.x) / self.render_scale;
        let rel_y = (screen_mouse.y - self.scene_offset.y) / self.render_scale;
        self.mouse = Vec2::new(
            rel_x / f64::from(self.scene_width) * 2.0 - 1.0,
            rel_y / f64::from(self.scene_height) * 2.0 - 1.0,
        );
    }

    /// Advances simulation state: particle systems, then the driver chain
    /// over a snapshot of the object array, then text regeneration.
    pub fn update(
        &mut self,
        backend: &mut dyn RenderBackend,
        dt: f64,
        total_time: f64,
        text_raster: &mut dyn TextRasterizer,
    ) {
        for ro in &mut self.objects {
            if !ro.object.visible.get() {
                continue;
            }
            if let Some(system) = &mut ro.particles {
                system.set_mouse(self.mouse.x, self.mouse.y);
                system.update(dt);
            }
        }

        let mut snapshot: Vec<SceneObject> =
            self.objects.iter().map(|ro| ro.object.clone()).collect();
        let mut offsets = vec![Vec2::ZERO; self.objects.len()];

        drivers::update_clock(&mut snapshot);
        if self.general.camera_parallax {
            drivers::update_parallax(
                &snapshot,
                &mut offsets,
                self.mouse,
                self.general.camera_parallax_amount,
            );
        }
        drivers::update_shake(&snapshot, &mut offsets, total_time);

        for (ro, (object, offset)) in self
            .objects
            .iter_mut()
            .zip(snapshot.into_iter().zip(offsets))
        {
            ro.object = object;
            ro.offset = offset;
        }

        self.refresh_text(backend, text_raster);
    }

    fn refresh_text(&mut self, backend: &mut dyn RenderBackend, text_raster: &mut dyn TextRasterizer) {
        for ro in &mut self.objects {
            if ro.object.kind() != ObjectKind::Text || !ro.object.visible.get() {
                continue;
            }
            let content = text::resolve_text_content(&ro.object.text, Local::now());
            if content == ro.last_text && ro.text_texture.is_some() {
                continue;
            }

            let width = ro.object.size.x.max(0.0) as u32;
            let height = ro.object.size.y.max(0.0) as u32;
            if width == 0 || height == 0 || content.is_empty() {
                continue;
            }

            let raster = text_raster.rasterize(
                &content,
                text::point_size(&ro.object),
                width,
                height,
                text::HorizontalAlign::parse(&ro.object.horizontal_align),
                text::VerticalAlign::parse(&ro.object.vertical_align),
            );
            let Some(image) = raster else { continue };

            match backend.create_texture(&image, WrapMode::Clamp) {
                Ok(handle) => {
                    if let Some(old) = ro.text_texture.take() {
                        backend.destroy_texture(old.handle);
                    }
                    ro.text_texture = Some(LoadedTexture {
                        handle,
                        width: image.width,
                        height: image.height,
                    });
                    ro.last_text = content;
                }
                Err(err) => log::warn!("text upload failed for '{}': {err}", ro.object.name),
            }
        }
    }

    /// Composites one frame. `begin_frame`/`end_frame` bracket the draw so
    /// window backends can bind their surface.
    pub fn render(
        &mut self,
        backend: &mut dyn RenderBackend,
        total_time: f64,
        screen_width: u32,
        screen_height: u32,
    ) {
        backend.begin_frame(screen_width, screen_height);
        backend.clear([0.0, 0.0, 0.0, 1.0]);

        let scene_rect = ScissorRect {
            x: self.scene_offset.x as i32,
            y: self.scene_offset.y as i32,
            w: (f64::from(self.scene_width) * self.render_scale) as i32,
            h: (f64::from(self.scene_height) * self.render_scale) as i32,
        };
        backend.begin_scissor(scene_rect);
        backend.clear(self.bg_color);

        let screen = (f64::from(screen_width), f64::from(screen_height));
        for i in 0..self.objects.len() {
            if !self.objects[i].object.visible.get() {
                continue;
            }
            self.render_object(backend, i, total_time, scene_rect, screen);
        }

        backend.end_scissor();
        backend.end_frame();
    }

    fn render_object(
        &mut self,
        backend: &mut dyn RenderBackend,
        index: usize,
        total_time: f64,
        scene_rect: ScissorRect,
        screen: (f64, f64),
    ) {
        let crop = if self.apply_crop_offset {
            self.objects[index].crop_offset
        } else {
            Vec2::ZERO
        };
        let ro = &self.objects[index];

        let source = ro.image.or(ro.text_texture);
        let origin = Vec2::new(
            self.scene_offset.x
                + (ro.object.origin.x + ro.offset.x - crop.x) * self.render_scale,
            self.scene_offset.y
                + (ro.object.origin.y + ro.offset.y - crop.y) * self.render_scale,
        );

        if let Some(source) = source {
            self.draw_textured_object(backend, index, source, origin, total_time, scene_rect, screen);
        }

        let ro = &self.objects[index];
        if let Some(system) = &ro.particles {
            let margin = PARTICLE_CULL_MARGIN * self.render_scale;
            let on_screen = origin.x + margin >= 0.0
                && origin.x - margin <= screen.0
                && origin.y + margin >= 0.0
                && origin.y - margin <= screen.1;
            if on_screen {
                let scaled = Vec3::new(
                    ro.object.scale.x * self.render_scale,
                    ro.object.scale.y * self.render_scale,
                    ro.object.scale.z * self.render_scale,
                );
                system.draw(backend, self.white.handle, (origin.x, origin.y), scaled);
                backend.set_blend_mode(BlendMode::Alpha);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_textured_object(
        &mut self,
        backend: &mut dyn RenderBackend,
        index: usize,
        source: LoadedTexture,
        origin: Vec2,
        total_time: f64,
        scene_rect: ScissorRect,
        screen: (f64, f64),
    ) {
        let ro = &self.objects[index];

        let mut alpha = ro.object.alpha.get(total_time);
        let mut tint = [1.0_f32; 3];
        fold_inline_effects(&ro.object.effects, &mut alpha, &mut tint);
        if alpha <= 0.0 {
            return;
        }

        let target_w = ro.object.size.x;
        let target_h = ro.object.size.y;
        if target_w <= 0.0 || target_h <= 0.0 {
            return;
        }

        // Cull on the bounding disk so rotation cannot pop objects.
        let dest_w = target_w * ro.object.scale.x * self.render_scale;
        let dest_h = target_h * ro.object.scale.y * self.render_scale;
        let radius = (dest_w * dest_w + dest_h * dest_h).sqrt() / 2.0;
        if origin.x + radius < 0.0
            || origin.x - radius > screen.0
            || origin.y + radius < 0.0
            || origin.y - radius > screen.1
        {
            return;
        }

        let rotation = ro.object.angles.z;
        let tint = [tint[0], tint[1], tint[2], alpha.clamp(0.0, 1.0) as f32];

        let (current, flipped) = if self.objects[index].has_renderable_effects() {
            let current = self.apply_effects(backend, index, source, total_time, scene_rect);
            (current, true)
        } else {
            (source, false)
        };

        let src = Rect::new(
            0.0,
            0.0,
            f64::from(current.width),
            if flipped {
                -f64::from(current.height)
            } else {
                f64::from(current.height)
            },
        );
        let dst = Rect::new(origin.x, origin.y, dest_w.abs(), dest_h.abs());

        backend.set_blend_mode(BlendMode::Alpha);
        backend.draw_textured(
            current.handle,
            src,
            dst,
            (dst.w / 2.0, dst.h / 2.0),
            rotation,
            tint,
        );
    }

    /// Runs the object's visible effect passes through the ping-pong pair
    /// and returns the final composited texture.
    fn apply_effects(
        &mut self,
        backend: &mut dyn RenderBackend,
        index: usize,
        source: LoadedTexture,
        total_time: f64,
        scene_rect: ScissorRect,
    ) -> LoadedTexture {
        let targets = match self.ensure_ping_pong(backend, index, source) {
            Ok(targets) => targets,
            Err(err) => {
                log::warn!("effect targets unavailable: {err}");
                return source;
            }
        };

        let state = GlobalState {
            time: total_time,
            mouse: self.mouse,
            parallax: self.mouse,
        };

        let mut current = source;
        let mut current_is_target = false;
        let mut ping_pong_idx = 0usize;

        // Split borrows: effects are read while the backend mutates.
        let effects: &[LoadedEffect] = &self.objects[index].effects;
        for effect in effects {
            if !effect.config.visible.get() || effect.passes.is_empty() {
                continue;
            }
            for pass in &effect.passes {
                let Some(shader) = pass.shader else { continue };

                let target = targets[ping_pong_idx];
                let (mut active, mut flip) = (current, current_is_target);
                if let Some(override_tex) = pass.textures.first().copied().flatten() {
                    active = override_tex;
                    flip = false;
                }

                backend.end_scissor();
                backend.begin_target(target);
                backend.clear([0.0; 4]);
                backend.begin_shader(shader);

                apply_pass(
                    backend,
                    &PassBindings {
                        shader,
                        params: &pass.params,
                        uniforms: &pass.uniforms,
                        textures: &pass.textures,
                    },
                    &state,
                    Some(active),
                    self.black,
                );

                let src = Rect::new(
                    0.0,
                    0.0,
                    f64::from(active.width),
                    if flip {
                        -f64::from(active.height)
                    } else {
                        f64::from(active.height)
                    },
                );
                let target_tex = backend.target_texture(target);
                let (tw, th) = backend.texture_size(target_tex);
                backend.set_blend_mode(BlendMode::Alpha);
                backend.draw_textured(
                    active.handle,
                    src,
                    Rect::new(0.0, 0.0, f64::from(tw), f64::from(th)),
                    (0.0, 0.0),
                    0.0,
                    WHITE,
                );

                backend.end_shader();
                backend.end_target();
                backend.begin_scissor(scene_rect);

                current = LoadedTexture {
                    handle: target_tex,
                    width: tw,
                    height: th,
                };
                current_is_target = true;
                ping_pong_idx = 1 - ping_pong_idx;
            }
        }

        current
    }

    fn ensure_ping_pong(
        &mut self,
        backend: &mut dyn RenderBackend,
        index: usize,
        source: LoadedTexture,
    ) -> MuraleResult<[TargetHandle; 2]> {
        let ro = &mut self.objects[index];
        if let Some(existing) = ro.ping_pong {
            let (w, h) = backend.texture_size(backend.target_texture(existing[0]));
            if w == source.width && h == source.height {
                return Ok(existing);
            }
            backend.destroy_render_target(existing[0]);
            backend.destroy_render_target(existing[1]);
            ro.ping_pong = None;
        }

        let a = backend.create_render_target(source.width, source.height, WrapMode::Repeat)?;
        let b = backend.create_render_target(source.width, source.height, WrapMode::Repeat)?;
        ro.ping_pong = Some([a, b]);
        Ok([a, b])
    }
}

fn solid_texture(
    backend: &mut dyn RenderBackend,
    rgba: [u8; 4],
) -> MuraleResult<LoadedTexture> {
    let handle = backend.create_texture(
        &TexImage {
            width: 1,
            height: 1,
            rgba: rgba.to_vec(),
        },
        WrapMode::Repeat,
    )?;
    Ok(LoadedTexture {
        handle,
        width: 1,
        height: 1,
    })
}
