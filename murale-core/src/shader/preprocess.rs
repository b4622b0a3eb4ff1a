//! Turns editor-dialect shader source into compilable GLSL: injects combo
//! defines and a compatibility preamble, inlines `#include` files, and
//! applies the pattern rewrites legacy scenes rely on.

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;
use serde_json::Value;

use crate::assets::AssetResolver;

pub const FALLBACK_VERTEX: &str = "#version 120\nattribute vec3 a_Position; attribute vec2 a_TexCoord; varying vec4 v_TexCoord; uniform mat4 mvp; void main() { v_TexCoord = a_TexCoord.xyxy; gl_Position = mvp * vec4(a_Position, 1.0); }";
pub const FALLBACK_FRAGMENT: &str = "#version 120\nvarying vec4 v_TexCoord; uniform sampler2D g_Texture0; void main() { gl_FragColor = texture2D(g_Texture0, v_TexCoord.xy); }";

const COMPAT_PREAMBLE: &str = concat!(
    "#define frac fract\n",
    "#define lerp mix\n",
    "#define texSample2D texture2D\n",
    "#define atan2(y, x) atan(y, x)\n",
    "#define mul(a, b) ((b) * (a))\n",
    "#define g_ModelViewProjectionMatrix mvp\n",
    "#define g_Texture0 texture0\n",
    "#define a_Position vertexPosition\n",
    "#define a_TexCoord vertexTexCoord\n",
    "#define CAST2(x) vec2(x)\n",
    "#define CAST3(x) vec3(x)\n",
    "#define CAST4(x) vec4(x)\n",
    "#define CAST2X2(x) mat2(x)\n",
    "#define CAST3X3(x) mat3(x)\n",
    "#define saturate(x) clamp(x, 0.0, 1.0)\n",
);

/// Rewrites the editor's shader source into the target dialect. `name` is
/// the shader's logical name (used to scope the per-shader rewrites);
/// `legacy_fixups` gates the mask-flip and waterripple text patches.
pub fn preprocess_shader(
    source: &str,
    combos: &BTreeMap<String, i32>,
    name: &str,
    resolver: &AssetResolver,
    legacy_fixups: bool,
) -> String {
    let mut out = String::with_capacity(source.len() + 1024);
    out.push_str("#version 120\n");

    for (combo, value) in combos {
        out.push_str(&format!("#define {combo} {value}\n"));
    }
    if !combos.contains_key("BLENDMODE") {
        out.push_str("#define BLENDMODE 0\n");
    }

    out.push_str(COMPAT_PREAMBLE);

    let mut source = source.to_string();
    if legacy_fixups {
        source = apply_legacy_fixups(source, name);
    }

    let mut included: HashSet<String> = HashSet::new();

    if !source.contains("#include \"common.h\"") {
        let common = resolver.resolve_asset("shaders/common.h");
        if let Ok(content) = std::fs::read_to_string(&common) {
            out.push_str(content.trim_start_matches('\u{feff}'));
            out.push('\n');
            included.insert("common.h".to_string());
        }
    }

    for line in source.lines() {
        let trimmed = line.trim();
        if let Some(include) = parse_include(trimmed) {
            if included.contains(include) {
                continue;
            }
            let path = resolver.resolve_asset(&format!("shaders/{include}"));
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    out.push_str(content.trim_start_matches('\u{feff}'));
                    out.push('\n');
                    included.insert(include.to_string());
                }
                Err(_) => log::warn!("shader: could not resolve include '{include}'"),
            }
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }

    out
}

fn parse_include(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("#include \"")?;
    let include = rest.strip_suffix('"')?;
    Some(include.trim())
}

/// Text patches observed to be necessary for authored scenes: most effects
/// sample their mask with an inverted Y relative to depthparallax, and
/// waterripple squares its speed. Kept as string rewrites so the authored
/// source stays the source of truth.
fn apply_legacy_fixups(mut source: String, name: &str) -> String {
    if name.contains("waterripple") {
        source = source.replace(
            "g_Time * g_AnimationSpeed * g_AnimationSpeed",
            "g_Time * g_AnimationSpeed",
        );
    }

    if !name.contains("depthparallax") {
        source = source.replace(
            "v_TexCoord.y * g_Texture2Resolution.w / g_Texture2Resolution.y",
            "(1.0 - v_TexCoord.y) * g_Texture2Resolution.w / g_Texture2Resolution.y",
        );
        for slot in [1, 2] {
            source = source.replace(
                &format!(
                    "v_TexCoord.w *= g_Texture{slot}Resolution.w / g_Texture{slot}Resolution.y;"
                ),
                &format!(
                    "v_TexCoord.w = (1.0 - v_TexCoord.w) * (g_Texture{slot}Resolution.w / g_Texture{slot}Resolution.y);"
                ),
            );
        }
    }

    source
}

#[derive(Deserialize)]
struct ComboDecl {
    combo: String,
    #[serde(default)]
    default: i32,
}

/// Scans fragment source for `// [COMBO] {"combo": ..., "default": ...}`
/// declarations and fills any combos the scene left unset.
pub fn fill_combo_defaults(fragment_source: &str, combos: &mut BTreeMap<String, i32>) {
    for line in fragment_source.lines() {
        let Some(json_part) = line.trim().strip_prefix("// [COMBO]") else {
            continue;
        };
        if let Ok(decl) = serde_json::from_str::<ComboDecl>(json_part.trim()) {
            if !combos.contains_key(&decl.combo) {
                log::debug!("shader: default combo {} = {}", decl.combo, decl.default);
                combos.insert(decl.combo, decl.default);
            }
        }
    }
}

#[derive(Deserialize)]
struct ConstantDecl {
    material: String,
    default: Value,
}

/// Scans comment lines containing `{"material": ..., "default": ...}` for
/// uniform defaults; both shader stages contribute.
pub fn scan_constant_defaults(source: &str, defaults: &mut BTreeMap<String, Value>) {
    for line in source.lines() {
        let Some(idx) = line.find("//") else { continue };
        let comment = line[idx + 2..].trim();
        if !comment.starts_with('{') {
            continue;
        }
        if let Ok(decl) = serde_json::from_str::<ConstantDecl>(comment) {
            if !decl.material.is_empty() && !decl.default.is_null() {
                defaults.insert(decl.material, decl.default);
            }
        }
    }
}

/// Loads and preprocesses both stages of a named shader from the extracted
/// tree, synthesizing pass-through stages when a file is missing.
pub fn load_shader_source(
    name: &str,
    combos: &mut BTreeMap<String, i32>,
    resolver: &AssetResolver,
    legacy_fixups: bool,
) -> (String, String) {
    let name = name.replace('\\', "/");
    let vert_path = resolver.tmp_dir().join(format!("shaders/{name}.vert"));
    let frag_path = resolver.tmp_dir().join(format!("shaders/{name}.frag"));

    if let Ok(frag) = std::fs::read_to_string(&frag_path) {
        fill_combo_defaults(&frag, combos);
    }

    log::debug!("shader: preprocessing {name} (combos: {combos:?})");

    let vertex = match std::fs::read_to_string(&vert_path) {
        Ok(data) => preprocess_shader(&data, combos, &name, resolver, legacy_fixups),
        Err(_) => {
            log::warn!("shader: {name} has no vertex source at {}", vert_path.display());
            FALLBACK_VERTEX.to_string()
        }
    };
    let fragment = match std::fs::read_to_string(&frag_path) {
        Ok(data) => preprocess_shader(&data, combos, &name, resolver, legacy_fixups),
        Err(_) => {
            log::warn!(
                "shader: {name} has no fragment source at {}",
                frag_path.display()
            );
            FALLBACK_FRAGMENT.to_string()
        }
    };

    (vertex, fragment)
}

/// Collects `constant_shader_values` defaults declared in either stage of a
/// named shader, preferring the extracted tree and falling back to the
/// bundled assets.
pub fn shader_constant_defaults(name: &str, resolver: &AssetResolver) -> BTreeMap<String, Value> {
    let mut defaults = BTreeMap::new();
    for ext in [".vert", ".frag"] {
        let tmp_path = resolver.tmp_dir().join(format!("shaders/{name}{ext}"));
        let path = if tmp_path.is_file() {
            tmp_path
        } else {
            resolver.resolve_asset(&format!("shaders/{name}{ext}"))
        };
        if let Ok(data) = std::fs::read_to_string(&path) {
            scan_constant_defaults(&data, &mut defaults);
        }
    }
    defaults
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> AssetResolver {
        AssetResolver::new(std::env::temp_dir().join("murale-nonexistent"), None)
    }

    #[test]
    fn injects_version_combos_and_blendmode() {
        let mut combos = BTreeMap::new();
        combos.insert("MASK".to_string(), 1);
        let out = preprocess_shader("void main() {}", &combos, "x", &resolver(), true);
        assert!(out.starts_with("#version 120\n"));
        assert!(out.contains("#define MASK 1\n"));
        assert!(out.contains("#define BLENDMODE 0\n"));
        assert!(out.contains("#define saturate(x) clamp(x, 0.0, 1.0)"));
    }

    #[test]
    fn blendmode_not_duplicated_when_present() {
        let mut combos = BTreeMap::new();
        combos.insert("BLENDMODE".to_string(), 3);
        let out = preprocess_shader("", &combos, "x", &resolver(), true);
        assert!(out.contains("#define BLENDMODE 3\n"));
        assert!(!out.contains("#define BLENDMODE 0\n"));
    }

    #[test]
    fn mask_flip_applies_to_non_depthparallax() {
        let src = "float m = v_TexCoord.y * g_Texture2Resolution.w / g_Texture2Resolution.y;";
        let out = preprocess_shader(src, &BTreeMap::new(), "effects/ripple", &resolver(), true);
        assert!(out.contains("(1.0 - v_TexCoord.y) * g_Texture2Resolution.w"));

        let kept = preprocess_shader(src, &BTreeMap::new(), "depthparallax", &resolver(), true);
        assert!(kept.contains("v_TexCoord.y * g_Texture2Resolution.w"));
    }

    #[test]
    fn fixups_can_be_disabled() {
        let src = "g_Time * g_AnimationSpeed * g_AnimationSpeed";
        let out = preprocess_shader(src, &BTreeMap::new(), "waterripple", &resolver(), false);
        assert!(out.contains("g_Time * g_AnimationSpeed * g_AnimationSpeed"));

        let fixed = preprocess_shader(src, &BTreeMap::new(), "waterripple", &resolver(), true);
        assert!(!fixed.contains("g_AnimationSpeed * g_AnimationSpeed"));
    }

    #[test]
    fn includes_are_inlined_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets/shaders")).unwrap();
        std::fs::write(dir.path().join("assets/shaders/common.h"), "float common_fn;").unwrap();
        std::fs::write(dir.path().join("assets/shaders/util.h"), "\u{feff}float util_fn;").unwrap();
        let resolver = AssetResolver::new(dir.path(), None);

        let src = "#include \"util.h\"\n#include \"util.h\"\nvoid main() {}";
        let out = preprocess_shader(src, &BTreeMap::new(), "x", &resolver, true);
        assert_eq!(out.matches("float util_fn;").count(), 1);
        assert_eq!(out.matches("float common_fn;").count(), 1);
        assert!(!out.contains('\u{feff}'));
    }

    #[test]
    fn combo_defaults_fill_missing_only() {
        let frag = "// [COMBO] {\"combo\":\"MASK\",\"default\":1}\n// [COMBO] {\"combo\":\"BLOOM\",\"default\":2}\nvoid main(){}";
        let mut combos = BTreeMap::new();
        combos.insert("MASK".to_string(), 0);
        fill_combo_defaults(frag, &mut combos);
        assert_eq!(combos.get("MASK"), Some(&0));
        assert_eq!(combos.get("BLOOM"), Some(&2));
    }

    #[test]
    fn constant_defaults_scanned_from_comments() {
        let src = "uniform float g_Speed; // {\"material\":\"speed\",\"default\":2.5}";
        let mut defaults = BTreeMap::new();
        scan_constant_defaults(src, &mut defaults);
        assert_eq!(defaults.get("speed"), Some(&serde_json::json!(2.5)));
    }

    #[test]
    fn missing_stage_files_fall_back_to_passthrough() {
        let (vert, frag) =
            load_shader_source("effects/nope", &mut BTreeMap::new(), &resolver(), true);
        assert_eq!(vert, FALLBACK_VERTEX);
        assert_eq!(frag, FALLBACK_FRAGMENT);
    }
}
