pub mod effect;
pub mod preprocess;
pub mod uniforms;

pub use effect::{fold_inline_effects, EffectLoader, LoadedEffect, LoadedPass};
pub use preprocess::{load_shader_source, preprocess_shader};
pub use uniforms::{apply_pass, GlobalState, PassBindings, ShaderParams};
