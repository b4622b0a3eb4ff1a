use serde::de::{Deserialize, Deserializer};
use serde_json::Value;

/// 2-component vector as used by scene descriptions.
///
/// Accepts three JSON shapes: a whitespace-separated numeric string
/// ("0.5 1.0"), a bare number (broadcast to both components), or an object
/// `{x, y}`. Missing components read as 0 unless a single scalar broadcasts.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn splat(v: f64) -> Self {
        Self { x: v, y: v }
    }
}

/// 3-component vector; same accepted shapes as [`Vec2`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const ONE: Self = Self {
        x: 1.0,
        y: 1.0,
        z: 1.0,
    };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn splat(v: f64) -> Self {
        Self { x: v, y: v, z: v }
    }
}

fn parse_f64(token: &str) -> f64 {
    token.parse::<f64>().unwrap_or(0.0)
}

pub(crate) fn vec2_from_value(value: &Value) -> Option<Vec2> {
    match value {
        Value::String(s) => {
            let fields: Vec<&str> = s.split_whitespace().collect();
            match fields.len() {
                0 => Some(Vec2::ZERO),
                1 => Some(Vec2::splat(parse_f64(fields[0]))),
                _ => Some(Vec2::new(parse_f64(fields[0]), parse_f64(fields[1]))),
            }
        }
        Value::Number(n) => n.as_f64().map(Vec2::splat),
        Value::Object(map) => {
            let get = |k: &str| map.get(k).and_then(Value::as_f64).unwrap_or(0.0);
            Some(Vec2::new(get("x"), get("y")))
        }
        _ => None,
    }
}

pub(crate) fn vec3_from_value(value: &Value) -> Option<Vec3> {
    match value {
        Value::String(s) => {
            let fields: Vec<&str> = s.split_whitespace().collect();
            match fields.len() {
                0 => Some(Vec3::ZERO),
                1 => Some(Vec3::splat(parse_f64(fields[0]))),
                2 => Some(Vec3::new(parse_f64(fields[0]), parse_f64(fields[1]), 0.0)),
                _ => Some(Vec3::new(
                    parse_f64(fields[0]),
                    parse_f64(fields[1]),
                    parse_f64(fields[2]),
                )),
            }
        }
        Value::Number(n) => n.as_f64().map(Vec3::splat),
        Value::Object(map) => {
            let get = |k: &str| map.get(k).and_then(Value::as_f64).unwrap_or(0.0);
            Some(Vec3::new(get("x"), get("y"), get("z")))
        }
        _ => None,
    }
}

impl<'de> Deserialize<'de> for Vec2 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Vec2, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(vec2_from_value(&value).unwrap_or_else(|| {
            log::debug!("unrecognized vec2 shape: {value}");
            Vec2::ZERO
        }))
    }
}

impl<'de> Deserialize<'de> for Vec3 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Vec3, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(vec3_from_value(&value).unwrap_or_else(|| {
            log::debug!("unrecognized vec3 shape: {value}");
            Vec3::ZERO
        }))
    }
}

/// Parses a scene color string ("1 0 0.5") into RGB components in 0..1.
/// Fewer than three fields yields black, matching the editor's behavior for
/// empty color strings.
pub fn parse_color(color: &str) -> (f64, f64, f64) {
    let fields: Vec<&str> = color.split_whitespace().collect();
    if fields.len() < 3 {
        return (0.0, 0.0, 0.0);
    }
    (parse_f64(fields[0]), parse_f64(fields[1]), parse_f64(fields[2]))
}

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec3_from_string_three_tokens() {
        let v: Vec3 = serde_json::from_value(serde_json::json!("0.5 1.0 0.25")).unwrap();
        assert_eq!(v, Vec3::new(0.5, 1.0, 0.25));
    }

    #[test]
    fn vec3_from_single_token_broadcasts() {
        let v: Vec3 = serde_json::from_value(serde_json::json!("2.5")).unwrap();
        assert_eq!(v, Vec3::splat(2.5));
    }

    #[test]
    fn vec3_from_number_broadcasts() {
        let v: Vec3 = serde_json::from_value(serde_json::json!(3.0)).unwrap();
        assert_eq!(v, Vec3::splat(3.0));
    }

    #[test]
    fn vec3_from_object_missing_component_is_zero() {
        let v: Vec3 = serde_json::from_value(serde_json::json!({"x": 1.0, "y": 2.0})).unwrap();
        assert_eq!(v, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn vec2_from_string_pair() {
        let v: Vec2 = serde_json::from_value(serde_json::json!("3 4")).unwrap();
        assert_eq!(v, Vec2::new(3.0, 4.0));
    }

    #[test]
    fn unknown_shape_falls_back_to_zero() {
        let v: Vec3 = serde_json::from_value(serde_json::json!([1, 2, 3])).unwrap();
        assert_eq!(v, Vec3::ZERO);
    }

    #[test]
    fn color_parses_three_fields() {
        assert_eq!(parse_color("1 0 0.5"), (1.0, 0.0, 0.5));
        assert_eq!(parse_color(""), (0.0, 0.0, 0.0));
        assert_eq!(parse_color("1 0"), (0.0, 0.0, 0.0));
    }
}
