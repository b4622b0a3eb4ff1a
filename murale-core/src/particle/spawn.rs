use rand::Rng;

use crate::foundation::math::{parse_color, Vec3};
use crate::particle::{Particle, ParticleSystem};
use crate::scene::model::{ParticleEmitter, ParticleInitializer};

fn leading_int(token: &str) -> Option<i32> {
    let digits: String = token.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn parse_grid_token(token: &str) -> Option<(i32, i32)> {
    let (w, h) = token.split_once('x')?;
    let w: i32 = w.parse().ok()?;
    let h = leading_int(h)?;
    (w > 0 && h > 0).then_some((w, h))
}

impl ParticleSystem {
    fn rand_unit(&mut self) -> f64 {
        self.rng().gen::<f64>()
    }

    fn rand_range(&mut self, min: f64, max: f64) -> f64 {
        min + self.rand_unit() * (max - min)
    }

    /// Uniform in a centered interval of width `max - min`, floored at `min`.
    fn rand_extent(&mut self, min: f64, max: f64) -> f64 {
        (self.rand_unit() * 2.0 - 1.0) * (max - min) / 2.0 + min
    }

    fn rand_frame(&mut self, frames: i32) -> i32 {
        self.rng().gen_range(0..frames.max(1))
    }

    pub(crate) fn spawn_particle(&mut self, emitter: &ParticleEmitter) {
        let mut particle = Particle {
            spawn_time: self.global_time,
            ..Default::default()
        };
        particle.random_value = self.rand_unit() * std::f64::consts::TAU;

        particle.position = emitter.origin.as_vec3();

        if self.config.animation_mode == "randomframe" {
            self.assign_random_frame(&mut particle, emitter);
        }

        match emitter.name.as_str() {
            "boxrandom" => {
                let dist_max = emitter.distance_max.as_vec3();
                let dist_min = emitter.distance_min.as_vec3();
                particle.position.x += self.rand_extent(dist_min.x, dist_max.x);
                particle.position.y += self.rand_extent(dist_min.y, dist_max.y);
                particle.position.z += self.rand_extent(dist_min.z, dist_max.z);
            }
            "sphererandom" => {
                let mut dist_max = emitter.distance_max.as_float();
                let dist_min = emitter.distance_min.as_float();
                if dist_max == 0.0 && dist_min == 0.0 {
                    dist_max = 1.0;
                } else if dist_max == 0.0 {
                    dist_max = 100.0;
                }

                let azimuth = self.rand_unit() * std::f64::consts::TAU;
                let elevation =
                    self.rand_unit() * std::f64::consts::PI - std::f64::consts::FRAC_PI_2;
                let radius = self.rand_range(dist_min, dist_max);

                particle.position.x += elevation.cos() * azimuth.cos() * radius;
                particle.position.y += elevation.cos() * azimuth.sin() * radius;
                particle.position.z += elevation.sin() * radius;
            }
            other => log::debug!("particle: unknown emitter geometry '{other}'"),
        }

        let initializers = self.config.initializer.clone();
        for init in &initializers {
            self.apply_initializer(&mut particle, init);
        }

        if let Some(overrides) = self.overrides.clone() {
            let lifetime = overrides.lifetime.base();
            if lifetime != 0.0 {
                particle.max_life *= lifetime;
                particle.life = particle.max_life;
            }
            let alpha = overrides.alpha.base();
            if alpha != 0.0 {
                particle.alpha = alpha;
                particle.initial_alpha = alpha;
            }
            let size = overrides.size.base();
            if size != 0.0 {
                particle.size *= size;
                particle.initial_size = particle.size;
            }
            let speed = overrides.speed.base();
            if speed != 0.0 {
                particle.velocity.x *= speed;
                particle.velocity.y *= speed;
                particle.velocity.z *= speed;
            }
            if !overrides.color_n.is_empty() {
                let (r, g, b) = parse_color(&overrides.color_n);
                particle.color = Vec3::new(r, g, b);
            }
        }

        self.particles.push(particle);
    }

    /// Grid inference for `randomframe`: the texture companion's sheet
    /// sequence wins, then a `{w}x{h}` token in the texture filename, then
    /// the emitter's `distance_max` read as a literal grid.
    fn assign_random_frame(&mut self, particle: &mut Particle, emitter: &ParticleEmitter) {
        let (tex_w, tex_h) = self.texture_size;

        let sheet = self
            .tex_meta
            .as_ref()
            .and_then(|m| m.sprite_sheet_sequences.first())
            .map(|s| (s.width, s.height, s.frames));
        if let Some((fw, fh, frames)) = sheet {
            if fw > 0 && fh > 0 && tex_w > 0 {
                particle.grid_x = tex_w as i32 / fw;
                particle.grid_y = tex_h as i32 / fh;
                let slots = (particle.grid_x * particle.grid_y).max(1);
                particle.sprite_frame =
                    self.rand_frame(if frames > 0 { frames } else { slots });
                return;
            }
        }

        if tex_w > 0 && !self.texture_name.is_empty() {
            let base = self
                .texture_name
                .rsplit('/')
                .next()
                .unwrap_or(&self.texture_name)
                .to_string();
            for part in base.split('_') {
                let Some((fw, fh)) = parse_grid_token(part) else {
                    continue;
                };
                particle.grid_x = tex_w as i32 / fw;
                particle.grid_y = tex_h as i32 / fh;
                if particle.grid_x <= 0 || particle.grid_y <= 0 {
                    continue;
                }
                let slots = particle.grid_x * particle.grid_y;
                let frames = base
                    .split('_')
                    .filter_map(leading_int)
                    .find(|c| *c > 0 && *c <= slots)
                    .unwrap_or(slots);
                particle.sprite_frame = self.rand_frame(frames);
                return;
            }
        }

        let dist_max = emitter.distance_max.as_vec3();
        particle.grid_x = dist_max.x as i32;
        particle.grid_y = dist_max.y as i32;
        if particle.grid_x <= 0 || particle.grid_y <= 0 {
            particle.grid_x = 0;
            particle.grid_y = 0;
            particle.sprite_frame = -1;
            return;
        }

        let slots = particle.grid_x * particle.grid_y;
        let frames = if self.config.max_count > 0 && self.config.max_count < slots {
            self.config.max_count
        } else {
            slots
        };
        particle.sprite_frame = self.rand_frame(frames);
    }

    fn apply_initializer(&mut self, particle: &mut Particle, init: &ParticleInitializer) {
        match init.name.as_str() {
            "lifetimerandom" => {
                particle.max_life = self.rand_range(init.min.as_float(), init.max.as_float());
                particle.life = particle.max_life;
            }
            "sizerandom" | "size_random" => {
                let min = init.min.as_float();
                let max = init.max.as_float();
                particle.size = if init.exponent != 0.0 {
                    let t = self.rand_unit().powf(init.exponent);
                    min + t * (max - min)
                } else {
                    self.rand_range(min, max)
                };
                particle.initial_size = particle.size;
            }
            "velocityrandom" | "velocity_random" => {
                let min = init.min.as_vec3();
                let max = init.max.as_vec3();
                particle.velocity.x = self.rand_range(min.x, max.x);
                particle.velocity.y = self.rand_range(min.y, max.y);
                particle.velocity.z = self.rand_range(min.z, max.z);
            }
            "rotationrandom" | "rotation_random" => {
                let min = init.min.as_float();
                let max = init.max.as_float();
                particle.rotation = self.rand_range(min, max);
                if min == 0.0 && max == 0.0 {
                    particle.rotation = self.rand_unit() * std::f64::consts::TAU;
                }
            }
            "angularvelocityrandom" | "angularvelocity_random" => {
                particle.angular_velocity =
                    self.rand_range(init.min.as_float(), init.max.as_float());
            }
            "colorrandom" | "color_random" => {
                let min = init.min.as_vec3();
                let max = init.max.as_vec3();
                particle.color = Vec3::new(
                    self.rand_range(min.x, max.x) / 255.0,
                    self.rand_range(min.y, max.y) / 255.0,
                    self.rand_range(min.z, max.z) / 255.0,
                );
            }
            "alpharandom" | "alpha_random" => {
                particle.alpha = self.rand_range(init.min.as_float(), init.max.as_float());
                particle.initial_alpha = particle.alpha;
            }
            other => log::debug!("particle: unknown initializer '{other}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::system_from_config;
    use serde_json::json;

    #[test]
    fn box_emitter_spawns_within_extents() {
        let mut system = system_from_config(json!({
            "maxcount": 64,
            "emitter": [{
                "name": "boxrandom",
                "rate": 1000,
                "origin": "10 20 0",
                "distancemin": 0,
                "distancemax": "4 6 0"
            }],
            "initializer": [{"name": "lifetimerandom", "min": 5, "max": 5}]
        }));
        system.update(0.1);
        assert!(!system.particles.is_empty());
        for p in &system.particles {
            assert!((p.position.x - 10.0).abs() <= 2.0 + 1e-9);
            assert!((p.position.y - 20.0).abs() <= 3.0 + 1e-9);
        }
    }

    #[test]
    fn sphere_emitter_respects_radius_band() {
        let mut system = system_from_config(json!({
            "maxcount": 64,
            "emitter": [{
                "name": "sphererandom",
                "rate": 1000,
                "distancemin": 2,
                "distancemax": 5
            }],
            "initializer": [{"name": "lifetimerandom", "min": 5, "max": 5}]
        }));
        system.update(0.1);
        for p in &system.particles {
            let r = (p.position.x * p.position.x
                + p.position.y * p.position.y
                + p.position.z * p.position.z)
                .sqrt();
            assert!(r >= 2.0 - 1e-9 && r <= 5.0 + 1e-9, "radius {r}");
        }
    }

    #[test]
    fn initializers_set_ranges() {
        let mut system = system_from_config(json!({
            "maxcount": 32,
            "emitter": [{"name": "boxrandom", "rate": 1000}],
            "initializer": [
                {"name": "lifetimerandom", "min": 2, "max": 3},
                {"name": "sizerandom", "min": 10, "max": 20},
                {"name": "alpharandom", "min": 0.5, "max": 0.5},
                {"name": "velocityrandom", "min": "0 -1 0", "max": "0 1 0"}
            ]
        }));
        system.update(0.05);
        for p in &system.particles {
            assert!(p.max_life >= 2.0 && p.max_life <= 3.0);
            assert!(p.size >= 10.0 && p.size <= 20.0);
            assert_eq!(p.alpha, 0.5);
            assert!(p.velocity.y.abs() <= 1.0);
        }
    }

    #[test]
    fn randomframe_infers_grid_from_filename() {
        let mut system = system_from_config(json!({
            "maxcount": 8,
            "animationmode": "randomframe",
            "emitter": [{"name": "boxrandom", "rate": 1000}],
            "initializer": [{"name": "lifetimerandom", "min": 5, "max": 5}]
        }));
        system.texture_size = (64, 64);
        system.texture_name = "materials/leaves_8x8.tex".to_string();
        system.update(0.05);
        for p in &system.particles {
            assert_eq!(p.grid_x, 8);
            assert_eq!(p.grid_y, 8);
            assert!(p.sprite_frame >= 0 && p.sprite_frame < 8);
        }
    }

    #[test]
    fn randomframe_prefers_sheet_metadata() {
        let mut system = system_from_config(json!({
            "maxcount": 8,
            "animationmode": "randomframe",
            "emitter": [{"name": "boxrandom", "rate": 1000}],
            "initializer": [{"name": "lifetimerandom", "min": 5, "max": 5}]
        }));
        system.texture_size = (64, 32);
        system.tex_meta = Some(
            serde_json::from_value(json!({
                "spritesheetsequences": [{"frames": 6, "width": 16, "height": 16}]
            }))
            .unwrap(),
        );
        system.update(0.05);
        for p in &system.particles {
            assert_eq!(p.grid_x, 4);
            assert_eq!(p.grid_y, 2);
            assert!(p.sprite_frame >= 0 && p.sprite_frame < 6);
        }
    }
}
