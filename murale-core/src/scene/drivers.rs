//! Stateless per-frame drivers over the object array. The renderer snapshots
//! object state, runs these in a fixed order (clock, parallax, shake), then
//! writes offsets back.

use chrono::Timelike;

use crate::foundation::math::Vec2;
use crate::scene::model::SceneObject;

/// Applies mouse parallax: objects drift against the pointer proportionally
/// to their authored depth. `mouse` components are in [-1, 1].
pub fn update_parallax(
    objects: &[SceneObject],
    offsets: &mut [Vec2],
    mouse: Vec2,
    amount: f64,
) {
    for (object, offset) in objects.iter().zip(offsets.iter_mut()) {
        offset.x += mouse.x * amount * 100.0 * object.parallax_depth.x;
        offset.y += mouse.y * amount * 100.0 * object.parallax_depth.y;
    }
}

/// Rotates clock-hand objects (named `hour`/`minute`/`seconds`) to the
/// current time of day. Angles are negative degrees so hands sweep clockwise
/// on screen.
pub fn update_clock(objects: &mut [SceneObject]) {
    let now = chrono::Local::now();
    let seconds = f64::from(now.num_seconds_from_midnight())
        + f64::from(now.nanosecond() / 1_000_000) / 1000.0;
    apply_clock(objects, seconds);
}

/// Clock driver over an explicit seconds-since-midnight value.
pub fn apply_clock(objects: &mut [SceneObject], seconds_of_day: f64) {
    let t = seconds_of_day / 86_400.0;
    for object in objects.iter_mut() {
        match object.name.to_ascii_lowercase().as_str() {
            "hour" => object.angles.z = t * -720.0,
            "minute" => object.angles.z = (t * 24.0).fract() * -360.0,
            "seconds" => object.angles.z = (t * 1440.0).fract() * -360.0,
            _ => {}
        }
    }
}

/// Vertical oscillation for `shake`/`breathe` effects. Strength comes from
/// the first pass's `strength` constant, falling back to `amount`, then to
/// `constant_value * 0.1`; `breathe` sways at 60% amplitude.
pub fn update_shake(objects: &[SceneObject], offsets: &mut [Vec2], total_time: f64) {
    for (object, offset) in objects.iter().zip(offsets.iter_mut()) {
        for effect in &object.effects {
            if !effect.visible.get() {
                continue;
            }
            let is_shake =
                effect.name == "shake" || effect.name == "breathe" || effect.file.contains("shake");
            if !is_shake {
                continue;
            }

            let mut amount = 0.05;
            let mut speed = 1.0;
            if let Some(pass) = effect.passes.first() {
                let strength = pick(
                    pass.constant_shader_values.get_float("strength"),
                    pass.constant_shader_values.get_float("Strength"),
                );
                if strength != 0.0 {
                    amount = strength;
                } else {
                    let amt = pick(
                        pass.constant_shader_values.get_float("amount"),
                        pass.constant_shader_values.get_float("Amount"),
                    );
                    if amt != 0.0 {
                        amount = amt;
                    } else if pass.constant_value != 0.0 {
                        amount = pass.constant_value * 0.1;
                    }
                }

                let spd = pick(
                    pass.constant_shader_values.get_float("speed"),
                    pass.constant_shader_values.get_float("Speed"),
                );
                if spd != 0.0 {
                    speed = spd;
                }
            }

            let swing = (total_time * speed * std::f64::consts::PI).sin() * amount * 50.0;
            offset.y += if effect.name == "breathe" {
                swing * 0.6
            } else {
                swing
            };
        }
    }
}

fn pick(primary: f64, fallback: f64) -> f64 {
    if primary != 0.0 {
        primary
    } else {
        fallback
    }
}
