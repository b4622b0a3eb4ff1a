//! Decoder for the editor's `.tex` container: multi-image, multi-mipmap,
//! optionally LZ4-block-compressed, with DXT1/DXT5/RG88/R8/RGBA and
//! embedded-PNG payload variants. Only image 0 / mipmap 0 is ever decoded;
//! the rest of the chain is parsed and skipped.

pub mod dxt;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

use crate::foundation::error::{MuraleError, MuraleResult};

const MAGIC: &[u8] = b"TEXV0005";
const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a];

/// Decoder behavior toggles.
#[derive(Clone, Copy, Debug)]
pub struct DecodeOptions {
    /// The editor packs opacity masks as RGBA with the signal in the alpha
    /// channel, so the decoder overwrites every RGBA pixel with
    /// `(A,A,A,A)`. On by default for compatibility, but wrong for true
    /// color textures, hence the toggle.
    pub rgba_opacity_remap: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            rgba_opacity_remap: true,
        }
    }
}

/// A decoded texture: RGBA8 pixels cropped to the authored image size.
#[derive(Clone, Debug)]
pub struct TexImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Companion `.tex-json` metadata that is not stored in the texture binary.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TexMeta {
    #[serde(default)]
    pub format: String,
    #[serde(default, rename = "clampuvs")]
    pub clamp_uvs: bool,
    #[serde(default, rename = "nonpoweroftwo")]
    pub non_power_of_two: bool,
    #[serde(default, rename = "spritesheetsequences")]
    pub sprite_sheet_sequences: Vec<SpriteSheetSequence>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SpriteSheetSequence {
    #[serde(default)]
    pub frames: i32,
    #[serde(default)]
    pub width: i32,
    #[serde(default)]
    pub height: i32,
    #[serde(default)]
    pub duration: f64,
}

impl TexMeta {
    pub fn from_path(path: &Path) -> MuraleResult<Self> {
        let data = fs::read(path)
            .with_context(|| format!("read texture metadata '{}'", path.display()))
            .map_err(MuraleError::from)?;
        serde_json::from_slice(&data)
            .map_err(|err| MuraleError::schema(format!("texture metadata: {err}")))
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn u32(&mut self) -> MuraleResult<u32> {
        let end = self
            .pos
            .checked_add(4)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| MuraleError::corrupt("texture truncated while reading u32"))?;
        let v = u32::from_le_bytes(self.data[self.pos..end].try_into().expect("length checked"));
        self.pos = end;
        Ok(v)
    }

    fn bytes(&mut self, n: usize) -> MuraleResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| MuraleError::corrupt("texture truncated while reading bytes"))?;
        let s = &self.data[self.pos..end];
        self.pos = end;
        Ok(s)
    }

    fn skip(&mut self, n: usize) -> MuraleResult<()> {
        self.bytes(n).map(|_| ())
    }
}

pub fn decode_tex_file(path: &Path, options: &DecodeOptions) -> MuraleResult<TexImage> {
    let data = fs::read(path)
        .with_context(|| format!("read texture '{}'", path.display()))
        .map_err(MuraleError::from)?;
    decode_tex(&data, options)
}

pub fn decode_tex(data: &[u8], options: &DecodeOptions) -> MuraleResult<TexImage> {
    let mut r = Reader::new(data);

    let magic = r.bytes(8)?;
    if magic != MAGIC {
        return Err(MuraleError::corrupt(format!(
            "invalid texture magic: {}",
            String::from_utf8_lossy(magic)
        )));
    }
    r.skip(1)?;
    let _sub_magic = r.bytes(8)?;
    r.skip(1)?;

    let format = r.u32()?;
    r.skip(4)?;
    let _aligned_width = r.u32()?;
    let _aligned_height = r.u32()?;
    let image_width = r.u32()?;
    let image_height = r.u32()?;
    r.skip(4)?;

    let container_magic = r.bytes(8)?.to_vec();
    r.skip(1)?;
    let image_count = r.u32()?;
    if &container_magic == b"TEXB0003" {
        r.u32()?;
    }
    let legacy_container = &container_magic == b"TEXB0001";

    log::debug!(
        "texture: format {format}, target size {image_width}x{image_height}, {image_count} image(s)"
    );

    for image in 0..image_count {
        let mipmap_count = r.u32()?;
        for mip in 0..mipmap_count {
            let mip_width = r.u32()?;
            let mip_height = r.u32()?;
            let (is_lz4, decompressed_size) = if legacy_container {
                (false, 0)
            } else {
                (r.u32()? == 1, r.u32()?)
            };
            let data_size = r.u32()? as usize;
            let payload = r.bytes(data_size)?;

            if image == 0 && mip == 0 {
                let pix = decode_mipmap(
                    payload,
                    format,
                    mip_width,
                    mip_height,
                    is_lz4,
                    decompressed_size,
                    options,
                )?;
                return Ok(crop(pix, mip_width, mip_height, image_width, image_height));
            }
        }
    }

    Err(MuraleError::corrupt("no image found in texture"))
}

fn decode_mipmap(
    payload: &[u8],
    format: u32,
    width: u32,
    height: u32,
    is_lz4: bool,
    decompressed_size: u32,
    options: &DecodeOptions,
) -> MuraleResult<TexImage> {
    if payload.starts_with(&PNG_SIGNATURE) {
        return decode_embedded_png(payload);
    }

    let expected_rgba = (width * height * 4) as usize;
    let mut data: Vec<u8>;
    if is_lz4 {
        log::debug!(
            "texture: lz4 decompress {} -> {decompressed_size}",
            payload.len()
        );
        data = lz4_decompress(payload, decompressed_size as usize)?;
    } else if format == 0 && payload.len() < expected_rgba {
        // Format-0 textures in the wild are sometimes compressed without the
        // flag set; try a decompress sized for the full RGBA buffer and keep
        // the raw bytes when that fails.
        data = lz4_decompress(payload, expected_rgba).unwrap_or_else(|_| payload.to_vec());
    } else {
        data = payload.to_vec();
    }

    let blocks = width.div_ceil(4) as usize * height.div_ceil(4) as usize;

    let pix = if format == 0 || data.len() == expected_rgba {
        if data.len() < expected_rgba {
            return Err(MuraleError::corrupt(format!(
                "rgba texture payload too short: {} < {expected_rgba}",
                data.len()
            )));
        }
        data.truncate(expected_rgba);
        if options.rgba_opacity_remap {
            for px in data.chunks_exact_mut(4) {
                let opacity = px[3];
                px.fill(opacity);
            }
        }
        data
    } else if format == 9 {
        let count = (width * height) as usize;
        if data.len() < count {
            return Err(MuraleError::corrupt("r8 texture payload too short"));
        }
        let mut pix = vec![0u8; count * 4];
        for (i, px) in pix.chunks_exact_mut(4).enumerate() {
            let v = data[i];
            px[0] = v;
            px[1] = v;
            px[2] = v;
            px[3] = 255;
        }
        pix
    } else if format == 8 {
        let count = (width * height) as usize;
        if data.len() < count * 2 {
            return Err(MuraleError::corrupt("rg88 texture payload too short"));
        }
        let mut pix = vec![0u8; count * 4];
        for (i, px) in pix.chunks_exact_mut(4).enumerate() {
            let lum = data[i * 2];
            let alpha = data[i * 2 + 1];
            px[0] = lum;
            px[1] = lum;
            px[2] = lum;
            px[3] = alpha;
        }
        pix
    } else if format == 6 || data.len() == blocks * 16 {
        let mut pix = dxt::decode_dxt5(&data, width, height)?;
        dxt::repair_alpha_edges(&mut pix, width, height);
        pix
    } else if format == 4 || format == 7 || data.len() == blocks * 8 {
        dxt::decode_dxt1(&data, width, height)?
    } else {
        return Err(MuraleError::corrupt(format!(
            "unsupported texture format {format} with payload size {}",
            data.len()
        )));
    };

    Ok(TexImage {
        width,
        height,
        rgba: pix,
    })
}

fn decode_embedded_png(payload: &[u8]) -> MuraleResult<TexImage> {
    let img = image::load_from_memory_with_format(payload, image::ImageFormat::Png)
        .map_err(|err| MuraleError::corrupt(format!("embedded png: {err}")))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    Ok(TexImage {
        width,
        height,
        rgba: img.into_raw(),
    })
}

fn lz4_decompress(payload: &[u8], size: usize) -> MuraleResult<Vec<u8>> {
    lz4_flex::block::decompress(payload, size)
        .map_err(|err| MuraleError::corrupt(format!("lz4 block: {err}")))
}

fn crop(pix: TexImage, src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> TexImage {
    // Embedded PNGs decode at their own size; everything else decodes at the
    // aligned mipmap size and gets cut down to the authored dimensions.
    if pix.width != src_w || pix.height != src_h || (src_w == dst_w && src_h == dst_h) {
        return pix;
    }
    let w = dst_w.min(src_w);
    let h = dst_h.min(src_h);
    let mut out = vec![0u8; (w * h * 4) as usize];
    for row in 0..h as usize {
        let src_off = row * src_w as usize * 4;
        let dst_off = row * w as usize * 4;
        out[dst_off..dst_off + w as usize * 4]
            .copy_from_slice(&pix.rgba[src_off..src_off + w as usize * 4]);
    }
    TexImage {
        width: w,
        height: h,
        rgba: out,
    }
}

/// Loads a texture through the PNG cache: if `<cache_dir>/<stem>.png` exists
/// it wins; otherwise the `.tex` is decoded and the PNG is written back.
pub fn load_texture_cached(
    path: &Path,
    cache_dir: &Path,
    options: &DecodeOptions,
) -> MuraleResult<TexImage> {
    let cache_path = cache_png_path(path, cache_dir);
    if cache_path.is_file() {
        let img = image::open(&cache_path)
            .map_err(|err| MuraleError::corrupt(format!("cached png: {err}")))?
            .to_rgba8();
        let (width, height) = img.dimensions();
        return Ok(TexImage {
            width,
            height,
            rgba: img.into_raw(),
        });
    }

    let img = match path.extension().and_then(|e| e.to_str()) {
        Some("tex") => decode_tex_file(path, options)?,
        _ => {
            let decoded = image::open(path)
                .map_err(|err| MuraleError::corrupt(format!("image '{}': {err}", path.display())))?
                .to_rgba8();
            let (width, height) = decoded.dimensions();
            TexImage {
                width,
                height,
                rgba: decoded.into_raw(),
            }
        }
    };

    if let Err(err) = write_cache_png(&img, &cache_path) {
        log::warn!("failed to cache png '{}': {err}", cache_path.display());
        let _ = fs::remove_file(&cache_path);
    }
    Ok(img)
}

pub fn cache_png_path(tex_path: &Path, cache_dir: &Path) -> PathBuf {
    let stem = tex_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "texture".to_string());
    cache_dir.join(format!("{stem}.png"))
}

fn write_cache_png(img: &TexImage, path: &Path) -> MuraleResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create '{}'", parent.display()))
            .map_err(MuraleError::from)?;
    }
    image::save_buffer_with_format(
        path,
        &img.rgba,
        img.width,
        img.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .map_err(|err| MuraleError::corrupt(format!("encode png: {err}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn build_tex(
        format: u32,
        aligned: (u32, u32),
        image: (u32, u32),
        payload: &[u8],
        lz4: bool,
    ) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"TEXV0005\0");
        buf.extend_from_slice(b"TEXI0001\0");
        buf.extend_from_slice(&format.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&aligned.0.to_le_bytes());
        buf.extend_from_slice(&aligned.1.to_le_bytes());
        buf.extend_from_slice(&image.0.to_le_bytes());
        buf.extend_from_slice(&image.1.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(b"TEXB0002\0");
        buf.extend_from_slice(&1u32.to_le_bytes()); // image count
        buf.extend_from_slice(&1u32.to_le_bytes()); // mipmap count

        buf.extend_from_slice(&aligned.0.to_le_bytes());
        buf.extend_from_slice(&aligned.1.to_le_bytes());
        if lz4 {
            let compressed = lz4_flex::block::compress(payload);
            buf.extend_from_slice(&1u32.to_le_bytes());
            buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            buf.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
            buf.extend_from_slice(&compressed);
        } else {
            buf.extend_from_slice(&0u32.to_le_bytes());
            buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            buf.extend_from_slice(payload);
        }
        buf
    }

    fn no_remap() -> DecodeOptions {
        DecodeOptions {
            rgba_opacity_remap: false,
        }
    }

    #[test]
    fn rejects_bad_magic() {
        let err = decode_tex(b"NOTATEX0\0junkjunkjunk", &DecodeOptions::default()).unwrap_err();
        assert!(err.to_string().contains("invalid texture magic"));
    }

    #[test]
    fn decodes_raw_rgba_without_remap() {
        let payload: Vec<u8> = (0..4 * 4 * 4).map(|i| i as u8).collect();
        let tex = build_tex(0, (4, 4), (4, 4), &payload, false);
        let img = decode_tex(&tex, &no_remap()).unwrap();
        assert_eq!((img.width, img.height), (4, 4));
        assert_eq!(img.rgba, payload);
    }

    #[test]
    fn rgba_opacity_remap_broadcasts_alpha() {
        let payload = vec![10u8, 20, 30, 40];
        let tex = build_tex(0, (1, 1), (1, 1), &payload, false);
        let img = decode_tex(&tex, &DecodeOptions::default()).unwrap();
        assert_eq!(img.rgba, vec![40, 40, 40, 40]);
    }

    #[test]
    fn lz4_payload_roundtrips() {
        let payload: Vec<u8> = std::iter::repeat_n([1u8, 2, 3, 4], 16)
            .flatten()
            .collect();
        let tex = build_tex(0, (4, 4), (4, 4), &payload, true);
        let img = decode_tex(&tex, &no_remap()).unwrap();
        assert_eq!(img.rgba, payload);
    }

    #[test]
    fn crops_aligned_buffer_to_image_size() {
        // 4x4 aligned, 2x2 image: expect the top-left quadrant.
        let mut payload = vec![0u8; 4 * 4 * 4];
        for y in 0..4usize {
            for x in 0..4usize {
                payload[(y * 4 + x) * 4] = (y * 4 + x) as u8;
                payload[(y * 4 + x) * 4 + 3] = 255;
            }
        }
        let tex = build_tex(0, (4, 4), (2, 2), &payload, false);
        let img = decode_tex(&tex, &no_remap()).unwrap();
        assert_eq!((img.width, img.height), (2, 2));
        assert_eq!(img.rgba[0], 0);
        assert_eq!(img.rgba[4], 1);
        assert_eq!(img.rgba[8], 4);
        assert_eq!(img.rgba[12], 5);
    }

    #[test]
    fn embedded_png_matches_png_decoder() {
        let png_img = image::RgbaImage::from_raw(2, 2, vec![255u8; 16]).unwrap();
        let mut png_bytes = Vec::new();
        image::DynamicImage::ImageRgba8(png_img)
            .write_to(
                &mut std::io::Cursor::new(&mut png_bytes),
                image::ImageFormat::Png,
            )
            .unwrap();

        let tex = build_tex(0, (2, 2), (2, 2), &png_bytes, false);
        let img = decode_tex(&tex, &no_remap()).unwrap();
        assert_eq!((img.width, img.height), (2, 2));
        assert_eq!(img.rgba, vec![255u8; 16]);
    }

    #[test]
    fn r8_broadcasts_single_channel() {
        let payload = vec![7u8, 9];
        let tex = build_tex(9, (2, 1), (2, 1), &payload, false);
        let img = decode_tex(&tex, &DecodeOptions::default()).unwrap();
        assert_eq!(img.rgba, vec![7, 7, 7, 255, 9, 9, 9, 255]);
    }

    #[test]
    fn rg88_splits_luminance_and_alpha() {
        let payload = vec![100u8, 200];
        let tex = build_tex(8, (1, 1), (1, 1), &payload, false);
        let img = decode_tex(&tex, &DecodeOptions::default()).unwrap();
        assert_eq!(img.rgba, vec![100, 100, 100, 200]);
    }

    #[test]
    fn dxt5_payload_decodes_by_length() {
        // format 6, one opaque white block, 4x4.
        let mut block = [0u8; 16];
        block[0] = 255;
        block[8..10].copy_from_slice(&0xffffu16.to_le_bytes());
        block[10..12].copy_from_slice(&0xffffu16.to_le_bytes());
        let tex = build_tex(6, (4, 4), (4, 4), &block, false);
        let img = decode_tex(&tex, &DecodeOptions::default()).unwrap();
        assert!(img.rgba.chunks_exact(4).all(|px| px == [255, 255, 255, 255]));
    }

    #[test]
    fn texture_cache_prefers_existing_png() {
        let dir = tempfile::tempdir().unwrap();
        let tex_path = dir.path().join("wall.tex");
        let payload = vec![1u8, 2, 3, 255];
        std::fs::write(&tex_path, build_tex(0, (1, 1), (1, 1), &payload, false)).unwrap();

        let cache = dir.path().join("converted");
        let img = load_texture_cached(&tex_path, &cache, &no_remap()).unwrap();
        assert_eq!(img.rgba, payload);
        assert!(cache.join("wall.png").is_file());

        // Corrupt the .tex; the cached PNG must now serve the load.
        std::fs::write(&tex_path, b"garbage").unwrap();
        let img2 = load_texture_cached(&tex_path, &cache, &no_remap()).unwrap();
        assert_eq!(img2.rgba, payload);
    }
}
