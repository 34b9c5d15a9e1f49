// Path resolution for the resource manager's `/Root/`, `/FS/`, `/Embedded/`
// scheme. The catalog crate only knows about drawers and shelves; this
// module is the glue a resource manager uses to turn a path string into
// bytes, without knowing anything about resource types or proxies.
use crate::Catalog;
use std::{borrow::Cow, fs, path::{Path, PathBuf}};

/// One of the three path roots a resource name can be opened under.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PathRoot {
    /// `/Root/<rel>` — filesystem under a configured root, falling back to
    /// resource packs.
    Root,
    /// `/FS/<rel>` — a direct filesystem path.
    Fs,
    /// `/Embedded/<rel>` — looked up inside the embedded archive catalog.
    Embedded,
}

/// A parsed resource path: a root selector plus the relative path under it,
/// with any `#`-suffixed sub-resource selector already stripped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResourcePath {
    pub root: PathRoot,
    pub relative: String,
}

impl ResourcePath {
    /// Parse a resource name into a root + relative path. Returns `None` if
    /// the prefix is not one of the three recognised roots.
    pub fn parse(name: &str) -> Option<Self> {
        let truncated = match name.find('#') {
            Some(idx) => &name[..idx],
            None => name,
        };
        let (root, rest) = if let Some(rel) = truncated.strip_prefix("/Root/") {
            (PathRoot::Root, rel)
        } else if let Some(rel) = truncated.strip_prefix("/FS/") {
            (PathRoot::Fs, rel)
        } else if let Some(rel) = truncated.strip_prefix("/Embedded/") {
            (PathRoot::Embedded, rel)
        } else {
            return None;
        };
        Some(Self {
            root,
            relative: rel_or(rest),
        })
    }
}

fn rel_or(s: &str) -> String {
    s.to_owned()
}

/// Resolves resource names against a configured root directory, an ordered
/// list of resource packs (represented here as an embedded `Catalog`), and
/// the raw filesystem. Mirrors
/// `Engine::World::Resources::ResourceManager::OpenResource` (minus the
/// disabled `/Common/` prefix, which is commented out even upstream).
pub struct FilesystemInterface {
    root_dir: PathBuf,
    embedded: Catalog,
}

impl FilesystemInterface {
    pub fn new(root_dir: impl Into<PathBuf>, embedded: Catalog) -> Self {
        Self {
            root_dir: root_dir.into(),
            embedded,
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn embedded(&self) -> &Catalog {
        &self.embedded
    }

    /// Resolve a name to bytes. Returns `None` on any failure (unknown
    /// prefix, missing file, missing pack entry) — per the error taxonomy,
    /// open failures become `None` rather than propagated errors; the
    /// caller (the loader) turns that into `Invalid` proxy state.
    pub fn open(&self, name: &str) -> Option<Cow<'_, [u8]>> {
        let path = ResourcePath::parse(name)?;
        match path.root {
            PathRoot::Root => self
                .read_under_root(&path.relative)
                .or_else(|| self.read_embedded(&path.relative)),
            PathRoot::Fs => fs::read(&path.relative).ok().map(Cow::Owned),
            PathRoot::Embedded => self.read_embedded(&path.relative),
        }
    }

    fn read_under_root(&self, rel: &str) -> Option<Cow<'static, [u8]>> {
        let full = self.root_dir.join(rel);
        fs::read(full).ok().map(Cow::Owned)
    }

    fn read_embedded(&self, rel: &str) -> Option<Cow<'_, [u8]>> {
        self.embedded.read_name_sync(rel).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_roots() {
        assert_eq!(
            ResourcePath::parse("/Root/tex/a.hk"),
            Some(ResourcePath {
                root: PathRoot::Root,
                relative: "tex/a.hk".to_owned()
            })
        );
        assert_eq!(
            ResourcePath::parse("/FS/abs/path.hk"),
            Some(ResourcePath {
                root: PathRoot::Fs,
                relative: "abs/path.hk".to_owned()
            })
        );
        assert_eq!(
            ResourcePath::parse("/Embedded/ui/icon.hk"),
            Some(ResourcePath {
                root: PathRoot::Embedded,
                relative: "ui/icon.hk".to_owned()
            })
        );
    }

    #[test]
    fn unknown_prefix_is_none() {
        assert_eq!(ResourcePath::parse("/Common/foo.hk"), None);
        assert_eq!(ResourcePath::parse("no/prefix/here"), None);
    }

    #[test]
    fn truncates_at_hash() {
        let p = ResourcePath::parse("/Root/mesh/hero.hk#skin0").unwrap();
        assert_eq!(p.root, PathRoot::Root);
        assert_eq!(p.relative, "mesh/hero.hk");
    }

    #[test]
    fn fs_root_reads_direct_path() {
        let dir = std::env::temp_dir().join("argon_catalog_fs_root_test");
        std::fs::create_dir_all(&dir).unwrap();
        let file = dir.join("probe.txt");
        std::fs::write(&file, b"data").unwrap();
        let fs_iface = FilesystemInterface::new(&dir, Catalog::empty());
        let name = format!("/FS/{}", file.display());
        let bytes = fs_iface.open(&name).unwrap();
        assert_eq!(&*bytes, b"data" as &[u8]);
    }
}
