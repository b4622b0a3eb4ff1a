pub mod archive;
pub mod convert;

pub use archive::{Package, PackageEntry};
pub use convert::bulk_convert_textures;
