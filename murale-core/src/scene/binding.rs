//! Value wrappers used throughout scene descriptions: the same field may be
//! authored as a bare value, a `{value: ...}` wrapper, or an animation-curve
//! object. Accessors sample animated bindings at the supplied clock.

use serde::de::{Deserialize, Deserializer};
use serde_json::Value;

use crate::foundation::math::lerp;

#[derive(Clone, Debug, PartialEq)]
pub enum Binding<T> {
    Value(T),
    Animated(AnimationCurve),
}

impl Binding<f64> {
    /// Instantaneous value at `clock` seconds.
    pub fn get(&self, clock: f64) -> f64 {
        match self {
            Self::Value(v) => *v,
            Self::Animated(curve) => curve.sample(clock),
        }
    }

    /// Value without a clock: static value, or the first keyframe.
    pub fn base(&self) -> f64 {
        match self {
            Self::Value(v) => *v,
            Self::Animated(curve) => curve.first_value(),
        }
    }
}

impl Binding<bool> {
    pub fn get(&self) -> bool {
        match self {
            Self::Value(v) => *v,
            // A curve on a boolean field is not meaningful; treat as set.
            Self::Animated(_) => true,
        }
    }
}

impl Binding<String> {
    pub fn get(&self) -> &str {
        match self {
            Self::Value(v) => v,
            Self::Animated(_) => "",
        }
    }
}

impl Default for Binding<f64> {
    fn default() -> Self {
        Self::Value(0.0)
    }
}

impl Default for Binding<bool> {
    fn default() -> Self {
        Self::Value(true)
    }
}

impl Default for Binding<String> {
    fn default() -> Self {
        Self::Value(String::new())
    }
}

pub(crate) fn binding_float_default_one() -> Binding<f64> {
    Binding::Value(1.0)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CurveMode {
    #[default]
    Once,
    Loop,
    PingPong,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Tangent {
    pub enabled: bool,
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Keyframe {
    pub frame: f64,
    pub value: f64,
    pub front: Tangent,
    pub back: Tangent,
}

/// Keyframed scalar curve sampled with piecewise cubic Hermite segments.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationCurve {
    pub keyframes: Vec<Keyframe>, // sorted by frame
    pub fps: f64,
    pub length: f64, // frames; 0 means "span of the keys"
    pub mode: CurveMode,
    pub wraploop: bool,
}

impl AnimationCurve {
    pub fn first_value(&self) -> f64 {
        self.keyframes.first().map(|k| k.value).unwrap_or(0.0)
    }

    fn duration_frames(&self) -> f64 {
        if self.length > 0.0 {
            self.length
        } else {
            self.keyframes.last().map(|k| k.frame).unwrap_or(0.0)
        }
    }

    /// Samples the curve at `clock` seconds.
    pub fn sample(&self, clock: f64) -> f64 {
        if self.keyframes.is_empty() {
            return 0.0;
        }
        if self.keyframes.len() == 1 {
            return self.keyframes[0].value;
        }

        let fps = if self.fps > 0.0 { self.fps } else { 30.0 };
        let duration = self.duration_frames();
        let mut frame = clock * fps;

        match self.mode {
            CurveMode::Once => {}
            CurveMode::Loop => {
                if duration > 0.0 {
                    frame = frame.rem_euclid(duration);
                }
            }
            CurveMode::PingPong => {
                if duration > 0.0 {
                    let cycle = frame.rem_euclid(duration * 2.0);
                    frame = if cycle <= duration {
                        cycle
                    } else {
                        duration * 2.0 - cycle
                    };
                }
            }
        }

        self.sample_frame(frame)
    }

    fn sample_frame(&self, frame: f64) -> f64 {
        let keys = &self.keyframes;
        let first = keys.first().expect("non-empty checked by caller");
        let last = keys.last().expect("non-empty checked by caller");

        if frame <= first.frame {
            return first.value;
        }
        if frame >= last.frame {
            // wraploop carries the tail of a looping curve back into the
            // first key instead of holding the last value.
            if self.wraploop && self.mode == CurveMode::Loop {
                let duration = self.duration_frames();
                if duration > last.frame {
                    let span = duration - last.frame;
                    let t = ((frame - last.frame) / span).clamp(0.0, 1.0);
                    return lerp(last.value, first.value, t);
                }
            }
            return last.value;
        }

        let idx = keys.partition_point(|k| k.frame <= frame);
        let k0 = &keys[idx - 1];
        let k1 = &keys[idx];
        let span = k1.frame - k0.frame;
        if span <= 0.0 {
            return k0.value;
        }

        let t = (frame - k0.frame) / span;
        let m0 = tangent_slope(&k0.front, k0, k1, span);
        let m1 = tangent_slope(&k1.back, k0, k1, span);
        hermite(k0.value, m0 * span, k1.value, m1 * span, t)
    }
}

/// Slope in value-per-frame; disabled or degenerate tangents fall back to
/// the segment secant, which keeps the curve continuous.
fn tangent_slope(tangent: &Tangent, k0: &Keyframe, k1: &Keyframe, span: f64) -> f64 {
    if tangent.enabled && tangent.x.abs() > f64::EPSILON {
        tangent.y / tangent.x
    } else {
        (k1.value - k0.value) / span
    }
}

fn hermite(p0: f64, m0: f64, p1: f64, m1: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    (2.0 * t3 - 3.0 * t2 + 1.0) * p0
        + (t3 - 2.0 * t2 + t) * m0
        + (-2.0 * t3 + 3.0 * t2) * p1
        + (t3 - t2) * m1
}

fn tangent_from_value(value: &Value) -> Tangent {
    let get = |k: &str| value.get(k).and_then(Value::as_f64).unwrap_or(0.0);
    Tangent {
        enabled: value
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        x: get("x"),
        y: get("y"),
    }
}

pub(crate) fn curve_from_value(value: &Value) -> Option<AnimationCurve> {
    let animation = value.get("animation")?;
    let keys = animation.get("c0").and_then(Value::as_array)?;

    let mut keyframes: Vec<Keyframe> = keys
        .iter()
        .map(|k| Keyframe {
            frame: k.get("frame").and_then(Value::as_f64).unwrap_or(0.0),
            value: k.get("value").and_then(Value::as_f64).unwrap_or(0.0),
            front: k.get("front").map(tangent_from_value).unwrap_or_default(),
            back: k.get("back").map(tangent_from_value).unwrap_or_default(),
        })
        .collect();
    keyframes.sort_by(|a, b| a.frame.total_cmp(&b.frame));

    let options = animation.get("options");
    let get_opt = |k: &str| {
        options
            .and_then(|o| o.get(k))
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    };
    let mode = match options
        .and_then(|o| o.get("mode"))
        .and_then(Value::as_str)
        .unwrap_or("")
    {
        "loop" => CurveMode::Loop,
        "pingpong" | "ping-pong" => CurveMode::PingPong,
        _ => CurveMode::Once,
    };

    Some(AnimationCurve {
        keyframes,
        fps: get_opt("fps"),
        length: get_opt("length"),
        mode,
        wraploop: options
            .and_then(|o| o.get("wraploop"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

pub(crate) fn binding_float_from_value(value: &Value) -> Binding<f64> {
    match value {
        Value::Number(n) => Binding::Value(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => Binding::Value(s.trim().parse::<f64>().unwrap_or(0.0)),
        Value::Object(_) => {
            if let Some(curve) = curve_from_value(value) {
                return Binding::Animated(curve);
            }
            if let Some(inner) = value.get("value") {
                return binding_float_from_value(inner);
            }
            log::debug!("unrecognized float binding shape: {value}");
            Binding::Value(0.0)
        }
        _ => {
            log::debug!("unrecognized float binding shape: {value}");
            Binding::Value(0.0)
        }
    }
}

pub(crate) fn binding_bool_from_value(value: &Value) -> Binding<bool> {
    match value {
        Value::Bool(b) => Binding::Value(*b),
        Value::Number(n) => Binding::Value(n.as_f64().unwrap_or(0.0) != 0.0),
        Value::String(s) => Binding::Value(s.eq_ignore_ascii_case("true")),
        Value::Object(map) => match map.get("value") {
            Some(Value::Bool(b)) => Binding::Value(*b),
            _ => Binding::Value(true),
        },
        _ => Binding::Value(true),
    }
}

pub(crate) fn binding_string_from_value(value: &Value) -> Binding<String> {
    match value {
        Value::String(s) => Binding::Value(s.clone()),
        Value::Array(items) => Binding::Value(
            items
                .first()
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        Value::Object(map) => Binding::Value(
            map.get("value")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        _ => Binding::Value(String::new()),
    }
}

impl<'de> Deserialize<'de> for Binding<f64> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(binding_float_from_value(&value))
    }
}

impl<'de> Deserialize<'de> for Binding<bool> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(binding_bool_from_value(&value))
    }
}

impl<'de> Deserialize<'de> for Binding<String> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(binding_string_from_value(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_key_curve(mode: CurveMode) -> AnimationCurve {
        AnimationCurve {
            keyframes: vec![
                Keyframe {
                    frame: 0.0,
                    value: 0.0,
                    ..Default::default()
                },
                Keyframe {
                    frame: 30.0,
                    value: 10.0,
                    ..Default::default()
                },
            ],
            fps: 30.0,
            length: 30.0,
            mode,
            wraploop: false,
        }
    }

    #[test]
    fn binding_float_three_shapes_agree() {
        let a: Binding<f64> = serde_json::from_value(json!(0.75)).unwrap();
        let b: Binding<f64> = serde_json::from_value(json!("0.75")).unwrap();
        let c: Binding<f64> = serde_json::from_value(json!({"value": 0.75})).unwrap();
        assert_eq!(a.get(0.0), 0.75);
        assert_eq!(b.get(0.0), 0.75);
        assert_eq!(c.get(0.0), 0.75);
    }

    #[test]
    fn binding_bool_shapes() {
        let shapes = [json!(true), json!(1), json!("TRUE"), json!({"value": true})];
        for shape in shapes {
            let b: Binding<bool> = serde_json::from_value(shape).unwrap();
            assert!(b.get());
        }
        let f: Binding<bool> = serde_json::from_value(json!(0)).unwrap();
        assert!(!f.get());
    }

    #[test]
    fn binding_unknown_object_defaults_true() {
        let b: Binding<bool> = serde_json::from_value(json!({"user": "x"})).unwrap();
        assert!(b.get());
    }

    #[test]
    fn curve_parses_editor_shape() {
        let b: Binding<f64> = serde_json::from_value(json!({
            "animation": {
                "c0": [
                    {"frame": 0, "value": 1.0},
                    {"frame": 60, "value": 3.0}
                ],
                "options": {"fps": 30.0, "length": 60.0, "mode": "loop", "wraploop": false}
            }
        }))
        .unwrap();
        let Binding::Animated(curve) = &b else {
            panic!("expected animated binding");
        };
        assert_eq!(curve.keyframes.len(), 2);
        assert_eq!(curve.mode, CurveMode::Loop);
        assert_eq!(b.base(), 1.0);
    }

    #[test]
    fn once_clamps_out_of_range() {
        let c = two_key_curve(CurveMode::Once);
        assert_eq!(c.sample(-1.0), 0.0);
        assert_eq!(c.sample(5.0), 10.0);
    }

    #[test]
    fn hermite_with_secant_slopes_hits_midpoint() {
        let c = two_key_curve(CurveMode::Once);
        // Straight-line tangents make the hermite segment exactly linear.
        let mid = c.sample(0.5);
        assert!((mid - 5.0).abs() < 1e-9, "mid was {mid}");
    }

    #[test]
    fn loop_wraps_frame() {
        let c = two_key_curve(CurveMode::Loop);
        // 1.5s at 30fps = frame 45 -> wraps to 15 -> value 5.
        assert!((c.sample(1.5) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn ping_pong_mirrors() {
        let c = two_key_curve(CurveMode::PingPong);
        // frame 45 mirrors to 15.
        assert!((c.sample(1.5) - 5.0).abs() < 1e-9);
        // frame 75 -> cycle 15 rising again.
        assert!((c.sample(2.5) - 5.0).abs() < 1e-9);
    }
}
