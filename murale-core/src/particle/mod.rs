//! Emitter/initializer/operator particle simulation with sprite-sheet
//! animation, control points, and per-object instance overrides.

mod draw;
mod operators;
mod spawn;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::foundation::math::Vec3;
use crate::render::{BlendMode, TextureHandle};
use crate::scene::model::{InstanceOverride, ParticleConfig};
use crate::tex::TexMeta;

pub const CONTROL_POINT_COUNT: usize = 8;

#[derive(Clone, Debug)]
pub struct Particle {
    pub position: Vec3,
    pub velocity: Vec3,
    pub color: Vec3,
    pub life: f64,
    pub max_life: f64,
    pub alpha: f64,
    pub initial_alpha: f64,
    pub rotation: f64,
    pub angular_velocity: f64,
    pub size: f64,
    pub initial_size: f64,
    pub spawn_time: f64,
    /// Sprite-sheet frame chosen at spawn for `randomframe` mode; -1 selects
    /// the age-driven frame at draw time.
    pub sprite_frame: i32,
    pub grid_x: i32,
    pub grid_y: i32,
    pub random_value: f64,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            color: Vec3::ONE,
            life: 1.0,
            max_life: 1.0,
            alpha: 1.0,
            initial_alpha: 1.0,
            rotation: 0.0,
            angular_velocity: 0.0,
            size: 1.0,
            initial_size: 1.0,
            spawn_time: 0.0,
            sprite_frame: -1,
            grid_x: 0,
            grid_y: 0,
            random_value: 0.0,
        }
    }
}

pub struct ParticleSystemOptions {
    pub name: String,
    pub config: ParticleConfig,
    pub texture: Option<TextureHandle>,
    pub texture_size: (u32, u32),
    pub extra_textures: Vec<TextureHandle>,
    pub texture_name: String,
    pub overrides: Option<InstanceOverride>,
    pub blend_mode: BlendMode,
    pub tex_meta: Option<TexMeta>,
}

pub struct ParticleSystem {
    pub name: String,
    pub config: ParticleConfig,
    pub texture: Option<TextureHandle>,
    pub texture_size: (u32, u32),
    pub extra_textures: Vec<TextureHandle>,
    pub texture_name: String,
    pub particles: Vec<Particle>,
    pub timer: f64,
    pub global_time: f64,
    pub overrides: Option<InstanceOverride>,
    pub control_points: [Vec3; CONTROL_POINT_COUNT],
    pub mouse: Vec3,
    pub blend_mode: BlendMode,
    pub tex_meta: Option<TexMeta>,
    rng: StdRng,
}

impl ParticleSystem {
    pub fn new(options: ParticleSystemOptions) -> Self {
        Self::with_rng(options, StdRng::from_entropy())
    }

    /// Deterministic construction for tests.
    pub fn with_seed(options: ParticleSystemOptions, seed: u64) -> Self {
        Self::with_rng(options, StdRng::seed_from_u64(seed))
    }

    fn with_rng(options: ParticleSystemOptions, rng: StdRng) -> Self {
        Self {
            name: options.name,
            config: options.config,
            texture: options.texture,
            texture_size: options.texture_size,
            extra_textures: options.extra_textures,
            texture_name: options.texture_name,
            particles: Vec::new(),
            timer: 0.0,
            global_time: 0.0,
            overrides: options.overrides,
            control_points: [Vec3::ZERO; CONTROL_POINT_COUNT],
            mouse: Vec3::ZERO,
            blend_mode: options.blend_mode,
            tex_meta: options.tex_meta,
            rng,
        }
    }

    /// Mouse position in normalized scene coordinates, consumed by
    /// pointer-locked control points.
    pub fn set_mouse(&mut self, x: f64, y: f64) {
        self.mouse = Vec3::new(x, y, 0.0);
    }

    fn override_factor(&self, pick: impl Fn(&InstanceOverride) -> f64) -> Option<f64> {
        let value = self.overrides.as_ref().map(&pick)?;
        (value != 0.0).then_some(value)
    }

    pub fn update(&mut self, dt: f64) {
        self.global_time += dt;

        if self.config.emitter.is_empty() {
            return;
        }

        for (i, cp) in self.config.control_point.iter().enumerate() {
            if i >= CONTROL_POINT_COUNT {
                break;
            }
            self.control_points[i] = if cp.lock_to_pointer {
                self.mouse
            } else {
                cp.offset
            };
        }

        let mut max_count = self.config.max_count;
        if max_count <= 0 {
            max_count = 100;
        }
        let count_multiplier = self
            .override_factor(|o| o.count.base())
            .unwrap_or(1.0);
        let max_count = (f64::from(max_count) * count_multiplier) as usize;

        let emitters = self.config.emitter.clone();
        for emitter in &emitters {
            let mut rate = emitter.rate.as_float();
            if let Some(factor) = self.override_factor(|o| o.rate.base()) {
                rate *= factor;
            }
            if rate <= 0.0 {
                continue;
            }

            self.timer += dt;
            let spawn_interval = 1.0 / rate;
            while self.timer >= spawn_interval && self.particles.len() < max_count {
                self.spawn_particle(emitter);
                self.timer -= spawn_interval;
            }
        }

        let mut i = 0;
        while i < self.particles.len() {
            self.particles[i].life -= dt;
            if self.particles[i].life <= 0.0 {
                // Removal order is not observable beyond draw order.
                self.particles.swap_remove(i);
                continue;
            }

            self.apply_operators(i, dt);

            let p = &mut self.particles[i];
            p.position.x += p.velocity.x * dt;
            p.position.y += p.velocity.y * dt;
            p.position.z += p.velocity.z * dt;
            p.rotation += p.angular_velocity * dt;
            i += 1;
        }
    }

    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn system_from_config(config: serde_json::Value) -> ParticleSystem {
        ParticleSystem::with_seed(
            ParticleSystemOptions {
                name: "test".to_string(),
                config: serde_json::from_value(config).unwrap(),
                texture: None,
                texture_size: (0, 0),
                extra_textures: Vec::new(),
                texture_name: String::new(),
                overrides: None,
                blend_mode: BlendMode::Additive,
                tex_meta: None,
            },
            7,
        )
    }

    #[test]
    fn spawn_clamps_to_max_count_and_particles_expire() {
        let mut system = system_from_config(json!({
            "maxcount": 5,
            "emitter": [{"name": "boxrandom", "rate": 1000}],
            "initializer": [{"name": "lifetimerandom", "min": 10, "max": 10}]
        }));

        system.update(0.1);
        assert_eq!(system.particles.len(), 5);

        system.update(11.0);
        assert!(system.particles.is_empty());
    }

    #[test]
    fn empty_emitter_list_is_inert() {
        let mut system = system_from_config(json!({"maxcount": 5}));
        system.update(1.0);
        assert!(system.particles.is_empty());
        assert_eq!(system.global_time, 1.0);
    }

    #[test]
    fn count_override_scales_capacity() {
        let mut system = system_from_config(json!({
            "maxcount": 4,
            "emitter": [{"name": "boxrandom", "rate": 1000}],
            "initializer": [{"name": "lifetimerandom", "min": 10, "max": 10}]
        }));
        system.overrides = Some(
            serde_json::from_value(json!({"count": 2.0})).unwrap(),
        );
        system.update(0.1);
        assert_eq!(system.particles.len(), 8);
    }

    #[test]
    fn pointer_locked_control_point_tracks_mouse() {
        let mut system = system_from_config(json!({
            "emitter": [{"name": "boxrandom", "rate": 1}],
            "controlpoint": [{"id": 0, "locktopointer": true}]
        }));
        system.set_mouse(0.25, -0.5);
        system.update(0.01);
        assert_eq!(system.control_points[0], Vec3::new(0.25, -0.5, 0.0));
    }
}
