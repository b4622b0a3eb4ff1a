use rand::Rng;

use crate::particle::ParticleSystem;
use crate::scene::dynamic::Dynamic;

impl ParticleSystem {
    /// Runs every configured operator over one particle. Operators apply in
    /// declared order; a stale control-point index skips that operator only.
    pub(crate) fn apply_operators(&mut self, index: usize, dt: f64) {
        let mut p = self.particles[index].clone();
        let operators = self.config.operator.clone();

        let has_alpha_fade = operators.iter().any(|op| op.name == "alphafade");

        let base_alpha = p.initial_alpha;
        let mut fade_multiplier = 1.0_f64;
        let mut oscillate_multiplier = 1.0_f64;

        if !has_alpha_fade {
            // Default envelope: quick fade-in over the first 10% of life and
            // a tail fade over the last 20%.
            let age_ratio = (p.max_life - p.life) / p.max_life;
            if age_ratio < 0.1 {
                fade_multiplier = age_ratio / 0.1;
            }
            let life_remaining = p.life / p.max_life;
            if life_remaining < 0.2 {
                fade_multiplier = fade_multiplier.min(life_remaining / 0.2);
            }
        }

        for op in &operators {
            match op.name.as_str() {
                "movement" => {
                    if !op.gravity.is_null() {
                        match &op.gravity {
                            Dynamic::Text(_) | Dynamic::Vector(_) => {
                                let g = op.gravity.as_vec3();
                                p.velocity.x += g.x * dt;
                                p.velocity.y += g.y * dt;
                                p.velocity.z += g.z * dt;
                            }
                            // Scalar gravity pulls along Y only.
                            _ => p.velocity.y += op.gravity.as_float() * dt,
                        }
                    }

                    let drag = op.drag.as_float();
                    if drag > 0.0 {
                        let factor = (1.0 - drag * dt).max(0.0);
                        p.velocity.x *= factor;
                        p.velocity.y *= factor;
                        p.velocity.z *= factor;
                    }
                }

                "alphafade" => {
                    let age_ratio = (p.max_life - p.life) / p.max_life;
                    fade_multiplier = 1.0;

                    if op.fade_in_time > 0.0 && age_ratio < op.fade_in_time {
                        fade_multiplier = age_ratio / op.fade_in_time;
                    }

                    if op.fade_out_time > 0.0 {
                        let fade_start = 1.0 - op.fade_out_time;
                        if age_ratio > fade_start {
                            let progress = (age_ratio - fade_start) / op.fade_out_time;
                            fade_multiplier = fade_multiplier.min(1.0 - progress);
                        }
                    } else {
                        let life_remaining = p.life / p.max_life;
                        if life_remaining < 0.2 {
                            fade_multiplier = fade_multiplier.min(life_remaining / 0.2);
                        }
                    }
                }

                "turbulence" => {
                    if op.speed_max > 0.0 {
                        let time_scale = if op.time_scale != 0.0 { op.time_scale } else { 1.0 };
                        let scale = if op.scale != 0.0 { op.scale } else { 1.0 };

                        let time = self.global_time * time_scale;
                        let noise_x =
                            (time * 0.7 + p.position.x * scale).sin() * (time * 0.3).cos();
                        let noise_y =
                            (time * 0.5 + p.position.y * scale).cos() * (time * 0.8).sin();

                        let speed = op.speed_min
                            + self.rng().gen::<f64>() * (op.speed_max - op.speed_min);
                        p.velocity.x += noise_x * speed * dt;
                        p.velocity.y += noise_y * speed * dt;
                    }
                }

                "controlpointattract" => {
                    let Some(cp) = usize::try_from(op.control_point)
                        .ok()
                        .and_then(|i| self.control_points.get(i))
                    else {
                        log::debug!(
                            "particle: control point {} out of range",
                            op.control_point
                        );
                        continue;
                    };

                    let dx = cp.x - p.position.x;
                    let dy = cp.y - p.position.y;
                    let dist_sq = dx * dx + dy * dy;
                    let threshold = if op.threshold > 0.0 { op.threshold } else { 100.0 };

                    if dist_sq < threshold * threshold && dist_sq > 1.0 {
                        let dist = dist_sq.sqrt();
                        let strength = op.scale / dist_sq;
                        p.velocity.x += (dx / dist) * strength * dt;
                        p.velocity.y += (dy / dist) * strength * dt;
                    }
                }

                "colorchange" => {
                    let age = (p.max_life - p.life) / p.max_life;
                    if age >= op.start_time && age <= op.end_time {
                        let progress = (age - op.start_time) / (op.end_time - op.start_time);
                        let start = op.start_value.as_vec3();
                        let end = op.end_value.as_vec3();
                        p.color.x = start.x + (end.x - start.x) * progress;
                        p.color.y = start.y + (end.y - start.y) * progress;
                        p.color.z = start.z + (end.z - start.z) * progress;
                    }
                }

                "oscillateposition" => {
                    let time = self.global_time - p.spawn_time;

                    let mut freq = op.frequency_max;
                    if op.frequency_min > 0.0 && op.frequency_max > op.frequency_min {
                        let t = (p.random_value.sin() + 1.0) / 2.0;
                        freq = op.frequency_min + t * (op.frequency_max - op.frequency_min);
                    }
                    if freq == 0.0 {
                        freq = 1.0;
                    }

                    let phase_x = time * freq * std::f64::consts::TAU + p.random_value;
                    let phase_y = time * freq * std::f64::consts::TAU + p.random_value + 1.0;
                    p.position.x += phase_x.sin() * op.scale_max * dt;
                    p.position.y += phase_y.cos() * op.scale_max * dt;
                }

                "sizechange" => {
                    let age = (p.max_life - p.life) / p.max_life;
                    let mut start = op.start_value.as_float();
                    let mut end = op.end_value.as_float();
                    if start == 0.0 {
                        start = 1.0;
                    }
                    if end == 0.0 {
                        end = 1.0;
                    }
                    p.size = p.initial_size * (start + (end - start) * age);
                }

                "oscillatealpha" => {
                    let mut frequency = op.frequency_max;
                    if op.frequency_min > 0.0 && op.frequency_max > op.frequency_min {
                        let seed = p.spawn_time.sin();
                        frequency =
                            op.frequency_min + seed.abs() * (op.frequency_max - op.frequency_min);
                    }
                    if frequency == 0.0 {
                        frequency = 1.0;
                    }

                    let scale_min = op.scale_min;
                    let scale_max = if op.scale_max != 0.0 { op.scale_max } else { 1.0 };

                    let age = self.global_time - p.spawn_time;
                    let oscillation = ((age * frequency * std::f64::consts::TAU).sin() + 1.0) / 2.0;
                    oscillate_multiplier = scale_min + oscillation * (scale_max - scale_min);
                }

                other => log::debug!("particle: unknown operator '{other}'"),
            }
        }

        p.alpha = base_alpha * fade_multiplier * oscillate_multiplier;
        self.particles[index] = p;
    }
}
