use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::Context as _;

use crate::foundation::error::{MuraleError, MuraleResult};

/// One entry from the package table of contents. `offset` is relative to the
/// start of the data region, which begins immediately after the table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageEntry {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// In-memory view of a scene package: version string, entry table, and the
/// byte offset where the data region starts.
#[derive(Debug)]
pub struct Package {
    version: String,
    entries: Vec<PackageEntry>,
    data_start: usize,
    data: Vec<u8>,
}

impl Package {
    pub fn open(path: &Path) -> MuraleResult<Self> {
        let data = fs::read(path)
            .with_context(|| format!("read package '{}'", path.display()))
            .map_err(MuraleError::from)?;
        Self::from_bytes(data)
    }

    pub fn from_bytes(data: Vec<u8>) -> MuraleResult<Self> {
        let mut cursor = 0usize;
        let version = read_string(&data, &mut cursor)?;

        let file_count = read_u32(&data, &mut cursor)?;
        // An entry is at minimum 12 bytes; a count past that bound means the
        // header was not a length-prefixed table at all.
        if file_count as usize > data.len() / 12 {
            return Err(MuraleError::corrupt(format!(
                "implausible package entry count {file_count}"
            )));
        }

        let mut entries = Vec::with_capacity(file_count as usize);
        for _ in 0..file_count {
            let name = read_string(&data, &mut cursor)?;
            let offset = read_u32(&data, &mut cursor)?;
            let size = read_u32(&data, &mut cursor)?;
            entries.push(PackageEntry { name, offset, size });
        }

        let data_start = cursor;
        for entry in &entries {
            let start = data_start + entry.offset as usize;
            let end = start + entry.size as usize;
            if end > data.len() {
                return Err(MuraleError::corrupt(format!(
                    "entry '{}' extends past package bounds ({} > {})",
                    entry.name,
                    end,
                    data.len()
                )));
            }
        }

        Ok(Self {
            version,
            entries,
            data_start,
            data,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn entries(&self) -> &[PackageEntry] {
        &self.entries
    }

    pub fn entry_bytes(&self, entry: &PackageEntry) -> &[u8] {
        let start = self.data_start + entry.offset as usize;
        &self.data[start..start + entry.size as usize]
    }

    /// Extracts every entry to `<out_dir>/<name>`, creating parent
    /// directories. Entry names that would escape `out_dir` are rejected.
    pub fn extract_to(&self, out_dir: &Path) -> MuraleResult<()> {
        log::debug!(
            "unpacker: extracting {} files (package version '{}')",
            self.entries.len(),
            self.version
        );
        fs::create_dir_all(out_dir)
            .with_context(|| format!("create '{}'", out_dir.display()))
            .map_err(MuraleError::from)?;

        for (i, entry) in self.entries.iter().enumerate() {
            let rel = sanitize_entry_name(&entry.name)?;
            let dest = out_dir.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create '{}'", parent.display()))
                    .map_err(MuraleError::from)?;
            }
            if i % 10 == 0 || i + 1 == self.entries.len() {
                log::debug!(
                    "unpacker: extracting file {}/{}: {}",
                    i + 1,
                    self.entries.len(),
                    entry.name
                );
            }
            fs::write(&dest, self.entry_bytes(entry))
                .with_context(|| format!("write '{}'", dest.display()))
                .map_err(MuraleError::from)?;
        }
        Ok(())
    }
}

/// Entry names are POSIX relative paths. Absolute paths and any `..`
/// component are refused so a hostile package cannot write outside the
/// extraction root.
fn sanitize_entry_name(name: &str) -> MuraleResult<PathBuf> {
    let norm = name.replace('\\', "/");
    let path = Path::new(&norm);
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(MuraleError::corrupt(format!(
                    "package entry '{name}' escapes the extraction root"
                )));
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(MuraleError::corrupt("package entry has an empty name"));
    }
    Ok(out)
}

fn read_u32(data: &[u8], cursor: &mut usize) -> MuraleResult<u32> {
    let end = cursor
        .checked_add(4)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| MuraleError::corrupt("unexpected end of package while reading u32"))?;
    let value = u32::from_le_bytes(data[*cursor..end].try_into().expect("length checked"));
    *cursor = end;
    Ok(value)
}

fn read_string(data: &[u8], cursor: &mut usize) -> MuraleResult<String> {
    let len = read_u32(data, cursor)? as usize;
    let end = cursor
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| MuraleError::corrupt("unexpected end of package while reading string"))?;
    let s = String::from_utf8(data[*cursor..end].to_vec())
        .map_err(|err| MuraleError::corrupt(format!("invalid UTF-8 in package string: {err}")))?;
    *cursor = end;
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn build_package(files: &[(&str, &[u8])]) -> Vec<u8> {
        fn push_string(buf: &mut Vec<u8>, s: &str) {
            buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
            buf.extend_from_slice(s.as_bytes());
        }

        let mut buf = Vec::new();
        push_string(&mut buf, "PKGV0001");
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
    fn parses_version_and_entries() {
        let pkg = Package::from_bytes(build_package(&[
            ("scene.json", b"{}"),
            ("materials/a.tex", b"abcd"),
        ]))
        .unwrap();
        assert_eq!(pkg.version(), "PKGV0001");
        assert_eq!(pkg.entries().len(), 2);
        assert_eq!(pkg.entries()[1].name, "materials/a.tex");
        assert_eq!(pkg.entry_bytes(&pkg.entries()[1].clone()), b"abcd");
    }

    #[test]
    fn extract_writes_every_entry_with_exact_sizes() {
        let pkg = Package::from_bytes(build_package(&[
            ("scene.json", b"{\"objects\":[]}"),
            ("materials/sub/tex.tex", b"xyz"),
        ]))
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        pkg.extract_to(dir.path()).unwrap();

        let scene = dir.path().join("scene.json");
        let tex = dir.path().join("materials/sub/tex.tex");
        assert_eq!(fs::read(scene).unwrap().len(), 14);
        assert_eq!(fs::read(tex).unwrap(), b"xyz");
    }

    #[test]
    fn rejects_path_traversal() {
        let pkg =
            Package::from_bytes(build_package(&[("../evil.txt", b"nope")])).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = pkg.extract_to(dir.path()).unwrap_err();
        assert!(err.to_string().contains("escapes"));
    }

    #[test]
    fn truncated_entry_is_corrupt() {
        let mut bytes = build_package(&[("a.txt", b"1234")]);
        bytes.truncate(bytes.len() - 2);
        assert!(Package::from_bytes(bytes).is_err());
    }
}
