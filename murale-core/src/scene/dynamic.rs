//! Heterogeneous particle-config fields (`rate`, `distance_min`, operator
//! gravity, initializer min/max, ...) keep their authored shape and are
//! coerced at the use site; operator code branches on the tag rather than
//! normalizing on load.

use serde::de::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::foundation::math::{vec3_from_value, Vec3};

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Dynamic {
    #[default]
    Null,
    Number(f64),
    Vector(Vec3),
    Text(String),
    Object(Map<String, Value>),
}

impl Dynamic {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Scalar coercion: numbers pass through, strings take their first
    /// token, vectors take X, `{value}` wrappers unwrap.
    pub fn as_float(&self) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::Vector(v) => v.x,
            Self::Text(s) => s
                .split_whitespace()
                .next()
                .and_then(|t| t.parse::<f64>().ok())
                .unwrap_or(0.0),
            Self::Object(map) => map.get("value").and_then(Value::as_f64).unwrap_or(0.0),
            Self::Null => 0.0,
        }
    }

    /// Vector coercion: scalars broadcast, strings parse as 1-or-3 token
    /// vectors, `{x,y,z}` objects read componentwise.
    pub fn as_vec3(&self) -> Vec3 {
        match self {
            Self::Number(n) => Vec3::splat(*n),
            Self::Vector(v) => *v,
            Self::Text(s) => {
                vec3_from_value(&Value::String(s.clone())).unwrap_or(Vec3::ZERO)
            }
            Self::Object(map) => {
                let get = |k: &str| map.get(k).and_then(Value::as_f64);
                match (get("x"), get("y"), get("z")) {
                    (None, None, None) => Vec3::splat(
                        map.get("value").and_then(Value::as_f64).unwrap_or(0.0),
                    ),
                    (x, y, z) => Vec3::new(
                        x.unwrap_or(0.0),
                        y.unwrap_or(0.0),
                        z.unwrap_or(0.0),
                    ),
                }
            }
            Self::Null => Vec3::ZERO,
        }
    }
}

impl<'de> Deserialize<'de> for Dynamic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Null => Self::Null,
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => {
                // A three-token numeric string is a vector; anything else
                // stays text and coerces lazily.
                let tokens: Vec<&str> = s.split_whitespace().collect();
                if tokens.len() == 3 && tokens.iter().all(|t| t.parse::<f64>().is_ok()) {
                    Self::Vector(vec3_from_value(&Value::String(s)).unwrap_or(Vec3::ZERO))
                } else {
                    Self::Text(s)
                }
            }
            Value::Object(map) => Self::Object(map),
            other => {
                log::debug!("unrecognized dynamic shape: {other}");
                Self::Null
            }
        })
    }
}
