//! Reader for the editor's binary deformable-mesh format. The header is not
//! fully reverse-engineered; counts and the index-section offset come from
//! the reference asset family and are validated against the file size. The
//! mesh only feeds the debug wireframe overlay.

use std::path::Path;

use anyhow::Context as _;

use crate::foundation::error::{MuraleError, MuraleResult};

const MAGIC: &[u8] = b"MDLV0013";
const HEADER_SIZE: usize = 256;
const VERTEX_STRIDE: usize = 52;
// Observed across the reference asset family; revisit once the header
// fields carrying these counts are identified.
const VERTEX_COUNT: usize = 2809;
const INDEX_COUNT: usize = 17384;
const INDEX_SECTION_PADDING: usize = 16;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MdlVertex {
    pub pos_x: f32,
    pub pos_y: f32,
    pub tex_x: f32,
    pub tex_y: f32,
}

#[derive(Clone, Debug, Default)]
pub struct MdlMesh {
    pub vertices: Vec<MdlVertex>,
    pub indices: Vec<u16>,
}

pub fn load_mdl(path: &Path) -> MuraleResult<MdlMesh> {
    let data = std::fs::read(path)
        .with_context(|| format!("read mesh '{}'", path.display()))
        .map_err(MuraleError::from)?;
    parse_mdl(&data)
}

pub fn parse_mdl(data: &[u8]) -> MuraleResult<MdlMesh> {
    if data.len() < HEADER_SIZE {
        return Err(MuraleError::corrupt("mesh shorter than its header"));
    }
    if &data[0..8] != MAGIC {
        return Err(MuraleError::corrupt(format!(
            "invalid mesh magic: {}",
            String::from_utf8_lossy(&data[0..8])
        )));
    }

    let index_start = HEADER_SIZE + VERTEX_COUNT * VERTEX_STRIDE + INDEX_SECTION_PADDING;
    let needed = index_start + INDEX_COUNT * 2;
    if data.len() < needed {
        return Err(MuraleError::corrupt(format!(
            "mesh truncated: {} bytes, need {needed}",
            data.len()
        )));
    }

    let mut vertices = Vec::with_capacity(VERTEX_COUNT);
    for i in 0..VERTEX_COUNT {
        let off = HEADER_SIZE + i * VERTEX_STRIDE;
        let v = &data[off..off + VERTEX_STRIDE];
        vertices.push(MdlVertex {
            tex_x: float16(u16::from_le_bytes([v[0], v[1]])),
            tex_y: float16(u16::from_le_bytes([v[4], v[5]])),
            pos_x: float16(u16::from_le_bytes([v[16], v[17]])),
            pos_y: float16(u16::from_le_bytes([v[20], v[21]])),
        });
    }

    let mut indices = Vec::with_capacity(INDEX_COUNT);
    for i in 0..INDEX_COUNT {
        let off = index_start + i * 2;
        indices.push(u16::from_le_bytes([data[off], data[off + 1]]));
    }

    log::debug!(
        "mesh: {} vertices, {} indices, first at ({:.2}, {:.2})",
        vertices.len(),
        indices.len(),
        vertices[0].pos_x,
        vertices[0].pos_y
    );
    Ok(MdlMesh { vertices, indices })
}

/// Half-float decode; subnormals and non-finite values collapse to 0, which
/// is safe for the debug overlay this feeds.
pub fn float16(h: u16) -> f32 {
    let sign = (h & 0x8000) >> 15;
    let exp = (h & 0x7c00) >> 10;
    let mant = h & 0x03ff;
    if exp == 0 || exp == 31 {
        return 0.0;
    }
    let magnitude = 2f32.powi(i32::from(exp) - 15) * (1.0 + f32::from(mant) / 1024.0);
    if sign == 1 {
        -magnitude
    } else {
        magnitude
    }
}
