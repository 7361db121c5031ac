//! SF-017: BLAKE3 fingerprints for templates, asset files and directories.
//!
//! Every fingerprint is rendered as `"blake3:{hex}"`.

use super::error::{Error, Result};
use super::types::{AssetSource, Packaging, RenderedTemplate};
use std::io::Read;
use std::path::Path;

const STREAM_BUF_SIZE: usize = 65536;

fn render(hash: blake3::Hash) -> String {
    format!("blake3:{}", hash.to_hex())
}

/// Hash a string.
pub fn hash_string(s: &str) -> String {
    render(blake3::hash(s.as_bytes()))
}

/// Stream a file through the hasher.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; STREAM_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(|e| Error::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(render(hasher.finalize()))
}

/// Hash a directory tree: sorted walk, relative paths included, symlinks skipped.
pub fn hash_directory(path: &Path) -> Result<String> {
    fn walk(base: &Path, current: &Path, entries: &mut Vec<(String, String)>) -> Result<()> {
        let read_dir = std::fs::read_dir(current).map_err(|e| Error::io(current, e))?;
        let mut children = read_dir
            .collect::<std::io::Result<Vec<_>>>()
            .map_err(|e| Error::io(current, e))?;
        children.sort_by_key(|e| e.file_name());

        for entry in children {
            let path = entry.path();
            let ft = entry.file_type().map_err(|e| Error::io(&path, e))?;
            if ft.is_symlink() {
                continue;
            }
            // Components joined with '/' so the hash is platform independent.
            let rel = path
                .strip_prefix(base)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if ft.is_file() {
                entries.push((rel, hash_file(&path)?));
            } else if ft.is_dir() {
                walk(base, &path, entries)?;
            }
        }
        Ok(())
    }

    let mut entries = Vec::new();
    walk(path, path, &mut entries)?;

    let mut hasher = blake3::Hasher::new();
    for (rel, hash) in &entries {
        hasher.update(rel.as_bytes());
        hasher.update(b"\0");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    Ok(render(hasher.finalize()))
}

/// Composite hash over ordered component hashes.
pub fn composite_hash(components: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in components {
        hasher.update(c.as_bytes());
        hasher.update(b"\0");
    }
    render(hasher.finalize())
}

/// Fingerprint of a rendered template: hash of its canonical JSON.
pub fn fingerprint_template(template: &RenderedTemplate) -> Result<String> {
    Ok(hash_string(&serde_json::to_string(template)?))
}

/// Content hash of an asset, its path resolved against `base_dir`.
pub fn fingerprint_asset(base_dir: &Path, asset: &AssetSource) -> Result<String> {
    let path = base_dir.join(&asset.path);
    match asset.packaging {
        Packaging::File => hash_file(&path),
        Packaging::Directory => hash_directory(&path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    #[test]
    fn test_sf017_hash_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bundle.zip");
        std::fs::write(&path, "hello world").unwrap();
        let h = hash_file(&path).unwrap();
        assert!(h.starts_with("blake3:"));
        assert_eq!(h.len(), 7 + 64);
        assert_eq!(h, hash_string("hello world"));
    }

    #[test]
    fn test_sf017_hash_file_missing() {
        let err = hash_file(Path::new("/nonexistent/bundle.zip")).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_sf017_hash_directory_tracks_names_and_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<html/>").unwrap();
        std::fs::write(dir.path().join("css/site.css"), "body{}").unwrap();
        let h1 = hash_directory(dir.path()).unwrap();
        assert_eq!(h1, hash_directory(dir.path()).unwrap());

        std::fs::write(dir.path().join("css/site.css"), "body{color:red}").unwrap();
        let h2 = hash_directory(dir.path()).unwrap();
        assert_ne!(h1, h2);

        std::fs::rename(dir.path().join("index.html"), dir.path().join("home.html")).unwrap();
        assert_ne!(h2, hash_directory(dir.path()).unwrap());
    }

    #[test]
    fn test_sf017_composite_hash_order_matters() {
        let a = composite_hash(&["blake3:aaa", "blake3:bbb"]);
        let b = composite_hash(&["blake3:bbb", "blake3:aaa"]);
        assert_ne!(a, b);
        assert_eq!(a, composite_hash(&["blake3:aaa", "blake3:bbb"]));
    }

    #[test]
    fn test_sf017_fingerprint_template() {
        let template = RenderedTemplate {
            stack: "Web".into(),
            description: None,
            resources: IndexMap::new(),
            outputs: IndexMap::new(),
        };
        let mut changed = template.clone();
        changed.outputs.insert("url".into(), "https://example.com".into());
        assert_eq!(
            fingerprint_template(&template).unwrap(),
            fingerprint_template(&template.clone()).unwrap()
        );
        assert_ne!(
            fingerprint_template(&template).unwrap(),
            fingerprint_template(&changed).unwrap()
        );
    }

    #[test]
    fn test_sf017_fingerprint_asset() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("site")).unwrap();
        std::fs::write(dir.path().join("site/a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("lambda.zip"), "zip").unwrap();

        let file = AssetSource { path: "lambda.zip".into(), packaging: Packaging::File };
        assert_eq!(fingerprint_asset(dir.path(), &file).unwrap(), hash_string("zip"));

        let tree = AssetSource { path: "site".into(), packaging: Packaging::Directory };
        assert_eq!(
            fingerprint_asset(dir.path(), &tree).unwrap(),
            hash_directory(&dir.path().join("site")).unwrap()
        );
    }
}
