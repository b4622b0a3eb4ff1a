//! Typed model of the scene description and its satellite JSON documents
//! (materials, particle configs, model metadata). The schema is lenient:
//! unknown keys are ignored, polymorphic keys try shapes in a fixed order,
//! and only a root-level parse failure is fatal.

use std::collections::BTreeMap;

use serde::de::{Deserialize, Deserializer};
use serde::Deserialize as DeriveDeserialize;
use serde_json::Value;

use crate::foundation::error::{MuraleError, MuraleResult};
use crate::foundation::math::{Vec2, Vec3};
use crate::scene::binding::{binding_float_default_one, Binding};
use crate::scene::dynamic::Dynamic;

fn default_scale() -> Vec3 {
    Vec3::ONE
}

#[derive(Clone, Debug, Default, DeriveDeserialize)]
pub struct Scene {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub camera: Camera,
    #[serde(default)]
    pub objects: Vec<SceneObject>,
    #[serde(default)]
    pub version: i64,
}

impl Scene {
    /// Parses the root scene document. Errors here are fatal for playback.
    pub fn from_json(data: &[u8]) -> MuraleResult<Self> {
        serde_json::from_slice(data)
            .map_err(|err| MuraleError::schema(format!("scene json: {err}")))
    }
}

#[derive(Clone, Debug, Default, DeriveDeserialize)]
pub struct Camera {
    #[serde(default)]
    pub center: Vec3,
    #[serde(default)]
    pub eye: Vec3,
    #[serde(default)]
    pub up: Vec3,
}

#[derive(Clone, Debug, Default, DeriveDeserialize)]
pub struct General {
    #[serde(default, rename = "ambientcolor")]
    pub ambient_color: String,
    #[serde(default, rename = "clearcolor")]
    pub clear_color: String,
    #[serde(default, rename = "clearenabled")]
    pub clear_enabled: bool,
    #[serde(default)]
    pub bloom: Binding<bool>,
    #[serde(default, rename = "bloomstrength")]
    pub bloom_strength: f64,
    #[serde(default, rename = "bloomthreshold")]
    pub bloom_threshold: f64,
    #[serde(default, rename = "cameraparallax")]
    pub camera_parallax: bool,
    #[serde(default, rename = "cameraparallaxamount")]
    pub camera_parallax_amount: f64,
    #[serde(default, rename = "cameraparallaxdelay")]
    pub camera_parallax_delay: f64,
    #[serde(default, rename = "cameraparallaxmouseinfluence")]
    pub camera_parallax_mouse_influence: f64,
    #[serde(default, rename = "camerashake")]
    pub camera_shake: Binding<bool>,
    #[serde(default, rename = "camerashakeamplitude")]
    pub camera_shake_amplitude: f64,
    #[serde(default, rename = "camerashakeroughness")]
    pub camera_shake_roughness: f64,
    #[serde(default, rename = "camerashakespeed")]
    pub camera_shake_speed: f64,
    #[serde(default, rename = "orthogonalprojection")]
    pub orthogonal_projection: OrthogonalProjection,
    #[serde(default, rename = "skylightcolor")]
    pub skylight_color: String,
    #[serde(default)]
    pub zoom: f64,
}

#[derive(Clone, Copy, Debug, Default, DeriveDeserialize)]
pub struct OrthogonalProjection {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub width: i64,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub height: i64,
}

// Projection dimensions show up as numbers or strings ("auto"); anything
// unusable reads as 0 and takes the default projection.
fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match &value {
        Value::Number(n) => n.as_i64().unwrap_or_else(|| {
            n.as_f64().map(|f| f as i64).unwrap_or(0)
        }),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

impl General {
    /// Logical scene dimensions; missing or non-positive projection falls
    /// back to 1280x720.
    pub fn projection(&self) -> (u32, u32) {
        let w = self.orthogonal_projection.width;
        let h = self.orthogonal_projection.height;
        if w <= 0 || h <= 0 {
            (1280, 720)
        } else {
            (w as u32, h as u32)
        }
    }
}

/// Visual class of a scene node, decided by which reference field is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Image,
    Text,
    Particle,
    Sound,
    Other,
}

#[derive(Clone, Debug, DeriveDeserialize)]
pub struct SceneObject {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,

    #[serde(default = "binding_float_default_one")]
    pub alpha: Binding<f64>,
    #[serde(default)]
    pub angles: Vec3,
    #[serde(default)]
    pub brightness: f64,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub effects: Vec<SceneEffect>,
    #[serde(default)]
    pub image: String,
    #[serde(default, rename = "instanceoverride")]
    pub instance_override: Option<InstanceOverride>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub origin: Vec3,
    #[serde(default, rename = "parallaxDepth")]
    pub parallax_depth: Vec2,
    #[serde(default)]
    pub particle: String,
    #[serde(default = "default_scale")]
    pub scale: Vec3,
    #[serde(default)]
    pub size: Vec2,
    #[serde(default)]
    pub sound: Vec<String>,
    #[serde(default)]
    pub text: TextInfo,
    #[serde(default, rename = "horizontalalign")]
    pub horizontal_align: String,
    #[serde(default, rename = "verticalalign")]
    pub vertical_align: String,
    #[serde(default, rename = "pointsize")]
    pub point_size: Binding<f64>,
    #[serde(default)]
    pub visible: Binding<bool>,
    #[serde(default)]
    pub volume: Binding<f64>,
    #[serde(default, rename = "playbackmode")]
    pub playback_mode: String,
    #[serde(default, rename = "muteineditor")]
    pub mute_in_editor: bool,
    #[serde(default, rename = "startsilent")]
    pub start_silent: bool,
}

impl Default for SceneObject {
    fn default() -> Self {
        serde_json::from_value(Value::Object(Default::default()))
            .expect("empty object satisfies all defaults")
    }
}

impl SceneObject {
    pub fn kind(&self) -> ObjectKind {
        if !self.image.is_empty() {
            ObjectKind::Image
        } else if !self.text.value.is_empty() || !self.text.script.is_empty() {
            ObjectKind::Text
        } else if !self.particle.is_empty() {
            ObjectKind::Particle
        } else if !self.sound.is_empty() {
            ObjectKind::Sound
        } else {
            ObjectKind::Other
        }
    }

    pub fn text_value(&self) -> &str {
        &self.text.value
    }
}

/// Text payload: either a bare string or an object carrying a script whose
/// format property drives date substitution.
#[derive(Clone, Debug, Default)]
pub struct TextInfo {
    pub value: String,
    pub script: String,
    pub format: String,
}

impl<'de> Deserialize<'de> for TextInfo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match &value {
            Value::String(s) => TextInfo {
                value: s.clone(),
                ..Default::default()
            },
            Value::Object(map) => TextInfo {
                value: map
                    .get("value")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                script: map
                    .get("script")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                format: map
                    .get("scriptproperties")
                    .and_then(|p| p.get("format"))
                    .and_then(|f| f.get("value"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            _ => TextInfo::default(),
        })
    }
}

#[derive(Clone, Debug, Default, DeriveDeserialize)]
pub struct InstanceOverride {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub alpha: Binding<f64>,
    #[serde(default)]
    pub brightness: Binding<f64>,
    #[serde(default, rename = "colorn")]
    pub color_n: String,
    #[serde(default)]
    pub count: Binding<f64>,
    #[serde(default)]
    pub lifetime: Binding<f64>,
    #[serde(default)]
    pub rate: Binding<f64>,
    #[serde(default)]
    pub size: Binding<f64>,
    #[serde(default)]
    pub speed: Binding<f64>,
}

#[derive(Clone, Debug, Default, DeriveDeserialize)]
pub struct SceneEffect {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub file: String,
    #[serde(default = "binding_float_default_one")]
    pub alpha: Binding<f64>,
    #[serde(default)]
    pub visible: Binding<bool>,
    #[serde(default)]
    pub passes: Vec<EffectPass>,
}

#[derive(Clone, Debug, Default, DeriveDeserialize)]
pub struct EffectPass {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub shader: String,
    #[serde(default)]
    pub material: String,
    #[serde(default, rename = "constantvalue")]
    pub constant_value: f64,
    #[serde(default, rename = "constantcolor")]
    pub constant_color: Vec3,
    #[serde(default, rename = "constantshadervalues")]
    pub constant_shader_values: ConstantShaderValues,
    /// Sparse by design: a null slot leaves the lower layer's texture bound.
    #[serde(default)]
    pub textures: Vec<Option<String>>,
    #[serde(default)]
    pub combos: BTreeMap<String, i32>,
}

/// Uniform values keyed by the editor's lowercase constant names.
#[derive(Clone, Debug, Default, DeriveDeserialize, PartialEq)]
pub struct ConstantShaderValues(pub BTreeMap<String, Value>);

impl ConstantShaderValues {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0
            .get(key)
            .or_else(|| self.0.get(&key.to_ascii_lowercase()))
    }

    pub fn get_float(&self, key: &str) -> f64 {
        match self.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::Object(map)) => map.get("value").and_then(Value::as_f64).unwrap_or(0.0),
            Some(Value::String(s)) => s
                .split_whitespace()
                .next()
                .and_then(|t| t.parse::<f64>().ok())
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn insert_missing(&mut self, key: &str, value: Value) {
        self.0.entry(key.to_string()).or_insert(value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

#[derive(Clone, Debug, Default, DeriveDeserialize)]
pub struct Material {
    #[serde(default)]
    pub passes: Vec<MaterialPass>,
}

impl Material {
    pub fn from_json(data: &[u8]) -> MuraleResult<Self> {
        serde_json::from_slice(data)
            .map_err(|err| MuraleError::schema(format!("material json: {err}")))
    }
}

#[derive(Clone, Debug, Default, DeriveDeserialize)]
pub struct MaterialPass {
    #[serde(default)]
    pub textures: Vec<Option<String>>,
    #[serde(default)]
    pub blending: String,
    #[serde(default, rename = "cullmode")]
    pub cull_mode: String,
    #[serde(default, rename = "depthtest")]
    pub depth_test: String,
    #[serde(default, rename = "depthwrite")]
    pub depth_write: String,
    #[serde(default)]
    pub shader: String,
    #[serde(default)]
    pub combos: BTreeMap<String, i32>,
    #[serde(default, rename = "constantshadervalues")]
    pub constant_shader_values: ConstantShaderValues,
}

#[derive(Clone, Debug, Default, DeriveDeserialize)]
pub struct ParticleConfig {
    #[serde(default)]
    pub material: String,
    #[serde(default, rename = "maxcount")]
    pub max_count: i32,
    #[serde(default, rename = "starttime")]
    pub start_time: f64,
    #[serde(default, rename = "sequencemultiplier")]
    pub sequence_multiplier: f64,
    #[serde(default, rename = "animationmode")]
    pub animation_mode: String,
    #[serde(default)]
    pub emitter: Vec<ParticleEmitter>,
    #[serde(default)]
    pub initializer: Vec<ParticleInitializer>,
    #[serde(default)]
    pub operator: Vec<ParticleOperator>,
    #[serde(default)]
    pub renderer: Vec<ParticleRenderer>,
    #[serde(default, rename = "controlpoint")]
    pub control_point: Vec<ControlPoint>,
}

impl ParticleConfig {
    pub fn from_json(data: &[u8]) -> MuraleResult<Self> {
        serde_json::from_slice(data)
            .map_err(|err| MuraleError::schema(format!("particle json: {err}")))
    }
}

#[derive(Clone, Debug, Default, DeriveDeserialize)]
pub struct ParticleEmitter {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rate: Dynamic,
    #[serde(default)]
    pub origin: Dynamic,
    #[serde(default)]
    pub directions: Dynamic,
    #[serde(default, rename = "distancemax")]
    pub distance_max: Dynamic,
    #[serde(default, rename = "distancemin")]
    pub distance_min: Dynamic,
}

#[derive(Clone, Debug, Default, DeriveDeserialize)]
pub struct ParticleInitializer {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub min: Dynamic,
    #[serde(default)]
    pub max: Dynamic,
    #[serde(default)]
    pub exponent: f64,
}

#[derive(Clone, Debug, Default, DeriveDeserialize)]
pub struct ParticleOperator {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,

    // movement
    #[serde(default)]
    pub gravity: Dynamic,
    #[serde(default)]
    pub drag: Dynamic,

    // alphafade
    #[serde(default, rename = "fadeintime")]
    pub fade_in_time: f64,
    #[serde(default, rename = "fadeouttime")]
    pub fade_out_time: f64,

    // controlpointattract
    #[serde(default, rename = "controlpoint")]
    pub control_point: i32,
    #[serde(default)]
    pub origin: Vec3,
    #[serde(default)]
    pub scale: f64,
    #[serde(default)]
    pub threshold: f64,

    // turbulence
    #[serde(default, rename = "timescale")]
    pub time_scale: f64,
    #[serde(default, rename = "speedmin")]
    pub speed_min: f64,
    #[serde(default, rename = "speedmax")]
    pub speed_max: f64,

    // colorchange / sizechange
    #[serde(default, rename = "starttime")]
    pub start_time: f64,
    #[serde(default, rename = "startvalue")]
    pub start_value: Dynamic,
    #[serde(default, rename = "endtime")]
    pub end_time: f64,
    #[serde(default, rename = "endvalue")]
    pub end_value: Dynamic,

    // oscillators
    #[serde(default, rename = "frequencymax")]
    pub frequency_max: f64,
    #[serde(default, rename = "frequencymin")]
    pub frequency_min: f64,
    #[serde(default, rename = "scalemin")]
    pub scale_min: f64,
    #[serde(default, rename = "scalemax")]
    pub scale_max: f64,
}

#[derive(Clone, Debug, Default, DeriveDeserialize)]
pub struct ParticleRenderer {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub length: f64,
    #[serde(default, rename = "maxlength")]
    pub max_length: f64,
}

#[derive(Clone, Debug, Default, DeriveDeserialize)]
pub struct ControlPoint {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub flags: i64,
    #[serde(default, rename = "locktopointer")]
    pub lock_to_pointer: bool,
    #[serde(default)]
    pub offset: Vec3,
}

/// `.json` model metadata referenced by image objects.
#[derive(Clone, Debug, Default, DeriveDeserialize)]
pub struct ModelMeta {
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub puppet: String,
    #[serde(default)]
    pub autosize: bool,
    #[serde(default, rename = "cropoffset")]
    pub crop_offset: Vec2,
}

impl ModelMeta {
    pub fn from_json(data: &[u8]) -> MuraleResult<Self> {
        serde_json::from_slice(data)
            .map_err(|err| MuraleError::schema(format!("model json: {err}")))
    }
}
