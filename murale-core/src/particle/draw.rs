use crate::foundation::math::Vec3;
use crate::particle::ParticleSystem;
use crate::render::{Rect, RenderBackend, TextureHandle};

impl ParticleSystem {
    /// Draws every live particle at `origin` (screen space), scaled by the
    /// owning object's scale. `fallback` stands in when the config's
    /// material texture failed to load.
    pub fn draw(
        &self,
        backend: &mut dyn RenderBackend,
        fallback: TextureHandle,
        origin: (f64, f64),
        obj_scale: Vec3,
    ) {
        let texture = self.texture.unwrap_or(fallback);
        let (tex_w, tex_h) = backend.texture_size(texture);
        if tex_w == 0 || tex_h == 0 {
            return;
        }
        let width = f64::from(tex_w);
        let height = f64::from(tex_h);

        let renderer_kind = self
            .config
            .renderer
            .first()
            .map(|r| r.name.clone())
            .unwrap_or_default();

        let sequence_multiplier = self.config.sequence_multiplier;
        let mut use_sheet = sequence_multiplier > 1.0;

        let grid = (sequence_multiplier * 4.0) as i32;
        let grid = grid.max(1);

        let mut tex_grid = (0, 0);
        if let Some(seq) = self
            .tex_meta
            .as_ref()
            .and_then(|m| m.sprite_sheet_sequences.first())
        {
            if seq.width > 0 && seq.height > 0 && self.texture.is_some() {
                tex_grid = (tex_w as i32 / seq.width, tex_h as i32 / seq.height);
                use_sheet = true;
            }
        }

        let has_grid_particles = self.particles.iter().any(|p| p.grid_x > 0 && p.grid_y > 0);
        let sprite_renderer = renderer_kind == "sprite"
            || (renderer_kind.is_empty() && (has_grid_particles || use_sheet));

        backend.set_blend_mode(self.blend_mode);

        for p in &self.particles {
            let as_sprite =
                (sprite_renderer && use_sheet) || (p.grid_x > 0 && p.grid_y > 0);

            let tint = [
                p.color.x.clamp(0.0, 1.0) as f32,
                p.color.y.clamp(0.0, 1.0) as f32,
                p.color.z.clamp(0.0, 1.0) as f32,
                p.alpha.clamp(0.0, 1.0) as f32,
            ];
            let rotation = p.rotation.to_degrees();

            if as_sprite {
                let mut grid_x = grid;
                let mut grid_y = grid;
                if tex_grid.0 > 0 && tex_grid.1 > 0 {
                    (grid_x, grid_y) = tex_grid;
                }
                if p.grid_x > 0 {
                    grid_x = p.grid_x;
                }
                if p.grid_y > 0 {
                    grid_y = p.grid_y;
                }

                let total_frames = grid_x * grid_y;
                let mut frame = p.sprite_frame;
                if frame < 0 {
                    let age_ratio = (p.max_life - p.life) / p.max_life;
                    frame = (age_ratio * f64::from(total_frames)) as i32;
                }
                let frame = frame.clamp(0, total_frames - 1);

                let sprite_w = width / f64::from(grid_x);
                let sprite_h = height / f64::from(grid_y);
                let src = Rect::new(
                    f64::from(frame % grid_x) * sprite_w,
                    f64::from(frame / grid_x) * sprite_h,
                    sprite_w,
                    sprite_h,
                );

                let scale = p.size / 1000.0;
                let dest_w = sprite_w * scale * obj_scale.x;
                let dest_h = sprite_h * scale * obj_scale.y;
                let dst = Rect::new(
                    origin.0 + p.position.x * obj_scale.x,
                    origin.1 - p.position.y * obj_scale.y,
                    dest_w,
                    dest_h,
                );

                backend.draw_textured(
                    texture,
                    src,
                    dst,
                    (dest_w / 2.0, dest_h / 2.0),
                    rotation,
                    tint,
                );
            } else {
                let src = Rect::new(0.0, 0.0, width, height);
                let scale = p.size / 100.0;
                let dest_w = width * scale * obj_scale.x;
                let dest_h = height * scale * obj_scale.y;
                let dst = Rect::new(
                    origin.0 + p.position.x * obj_scale.x,
                    origin.1 + p.position.y * obj_scale.y,
                    dest_w,
                    dest_h,
                );

                backend.draw_textured(
                    texture,
                    src,
                    dst,
                    (dest_w / 2.0, dest_h / 2.0),
                    rotation,
                    tint,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::system_from_config;
    use crate::render::headless::HeadlessBackend;
    use crate::render::{RenderBackend, WrapMode};
    use crate::tex::TexImage;
    use serde_json::json;

    #[test]
    fn draw_deposits_pixels_at_origin() {
        let mut system = system_from_config(json!({
            "maxcount": 1,
            "emitter": [{"name": "boxrandom", "rate": 1000}],
            "initializer": [
                {"name": "lifetimerandom", "min": 10, "max": 10},
                {"name": "sizerandom", "min": 400, "max": 400}
            ]
        }));
        // Land mid-life so neither fade-in nor tail fade zeroes the alpha.
        system.update(0.001);
        system.update(5.0);
        assert_eq!(system.particles.len(), 1);

        let mut backend = HeadlessBackend::new();
        backend.begin_frame(32, 32);
        let white = backend
            .create_texture(
                &TexImage {
                    width: 2,
                    height: 2,
                    rgba: vec![255; 16],
                },
                WrapMode::Clamp,
            )
            .unwrap();

        system.draw(&mut backend, white, (16.0, 16.0), crate::foundation::math::Vec3::ONE);
        backend.end_frame();

        let (w, _, rgba) = backend.frame_pixels().unwrap();
        let center = ((16 * w + 16) * 4) as usize;
        assert!(rgba[center] > 0, "expected particle coverage at origin");
    }
}
