pub mod binding;
pub mod drivers;
pub mod dynamic;
pub mod model;

pub use binding::{AnimationCurve, Binding, CurveMode, Keyframe};
pub use dynamic::Dynamic;
pub use model::{
    ConstantShaderValues, ControlPoint, EffectPass, General, InstanceOverride, Material,
    MaterialPass, ModelMeta, ObjectKind, ParticleConfig, ParticleEmitter, ParticleInitializer,
    ParticleOperator, Scene, SceneEffect, SceneObject,
};
