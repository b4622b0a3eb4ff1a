use std::path::Path;
use std::process::Command;

fn murale_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_murale"))
}

/// Minimal raw-RGBA `.tex` container around a single mipmap.
fn build_tex(width: u32, height: u32, rgba: &[u8]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"TEXV0005\0");
    buf.extend_from_slice(b"TEXI0001\0");
    buf.extend_from_slice(&0u32.to_le_bytes()); // format
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&width.to_le_bytes());
    buf.extend_from_slice(&height.to_le_bytes());
    buf.extend_from_slice(&width.to_le_bytes());
    buf.extend_from_slice(&height.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(b"TEXB0002\0");
    buf.extend_from_slice(&1u32.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes());
    buf.extend_from_slice(&width.to_le_bytes());
    buf.extend_from_slice(&height.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // not lz4
    buf.extend_from_slice(&(rgba.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(rgba.len() as u32).to_le_bytes());
    buf.extend_from_slice(rgba);
    buf
}

fn build_package(files: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let push_string = |buf: &mut Vec<u8>, s: &str| {
        buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
        buf.extend_from_slice(s.as_bytes());
    };

    let mut buf = Vec::new();
    push_string(&mut buf, "PKGV0007");
    buf.extend_from_slice(&(files.len() as u32).to_le_bytes());
    let mut offset = 0u32;
    for (name, data) in files {
        push_string(&mut buf, name);
        buf.extend_from_slice(&offset.to_le_bytes());
        buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
        offset += data.len() as u32;
    }
    for (_, data) in files {
        buf.extend_from_slice(data);
    }
    buf
}

#[test]
fn decode_subcommand_writes_png() {
    let dir = tempfile::tempdir().unwrap();
    let tex_path = dir.path().join("swatch.tex");
    std::fs::write(&tex_path, build_tex(2, 2, &[128u8; 16])).unwrap();

    let status = murale_bin()
        .current_dir(dir.path())
        .args(["decode", "swatch.tex"])
        .status()
        .unwrap();
    assert!(status.success());

    let out = dir.path().join("test_out/swatch.png");
    assert!(out.is_file(), "expected {}", out.display());
    let img = image::open(&out).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (2, 2));
}

#[test]
fn decode_missing_file_fails_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let status = murale_bin()
        .current_dir(dir.path())
        .args(["decode", "nope.tex"])
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn snapshot_renders_package_headlessly() {
    let dir = tempfile::tempdir().unwrap();

    let scene = serde_json::json!({
        "general": {
            "clearcolor": "0 0 1",
            "orthogonalprojection": {"width": 32, "height": 32}
        },
        "objects": [{
            "name": "bg",
            "image": "materials/bg.tex",
            "origin": "16 16 0",
            "size": "32 32"
        }]
    });
    let pkg = build_package(&[
        ("scene.json", serde_json::to_vec(&scene).unwrap()),
        ("materials/bg.tex", build_tex(32, 32, &vec![255u8; 32 * 32 * 4])),
    ]);
    let pkg_path = dir.path().join("scene.pkg");
    std::fs::write(&pkg_path, pkg).unwrap();

    let status = murale_bin()
        .current_dir(dir.path())
        .args(["--pkg", "scene.pkg", "--snapshot", "frame.png"])
        .status()
        .unwrap();
    assert!(status.success());

    let out = dir.path().join("frame.png");
    let img = image::open(&out).unwrap().to_rgba8();
    assert_eq!(img.dimensions(), (32, 32));
    assert_eq!(img.get_pixel(16, 16).0, [255, 255, 255, 255]);

    assert!(Path::new(&dir.path().join("tmp/scene.json")).is_file());
    assert!(dir.path().join("converted/bg.png").is_file());
}
