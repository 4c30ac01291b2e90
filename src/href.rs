//! Href classification and resolution
//!
//! Turns the `href` of an import or include into an absolute filesystem
//! path against a base directory, and computes the relative hrefs used
//! when a stylesheet is saved somewhere else.

use std::path::{Component, Path, PathBuf};

use url::Url;

/// Classification of an `href` value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HrefKind {
    /// Relative reference: "lib/a.xsl", "../common.xsl"
    Relative,
    /// Absolute filesystem path: "/usr/share/xsl/a.xsl"
    Absolute,
    /// File URL: "file:///usr/share/xsl/a.xsl"
    FileUrl,
    /// Anything with a non-file scheme: "https://...", "urn:..."
    Remote,
}

/// An href resolved against a base directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHref {
    pub kind: HrefKind,
    /// Canonical path when the target exists, lexically normalized otherwise
    pub path: PathBuf,
    /// Whether `path` names an existing regular file
    pub exists: bool,
}

impl ResolvedHref {
    /// Directory containing the resolved file
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("/"))
    }
}

/// Classify an href string
pub fn classify_href(href: &str) -> HrefKind {
    if Path::new(href).is_absolute() {
        return HrefKind::Absolute;
    }
    match Url::parse(href) {
        Ok(url) if url.scheme() == "file" => HrefKind::FileUrl,
        // single-letter schemes are drive letters, not URLs
        Ok(url) if url.scheme().len() > 1 => HrefKind::Remote,
        _ => HrefKind::Relative,
    }
}

/// Resolve `href` against `base_dir`
///
/// Never fails: a target that cannot be found is reported through
/// [`ResolvedHref::exists`], since callers apply different policies to
/// missing files.
pub fn resolve(base_dir: &Path, href: &str) -> ResolvedHref {
    let kind = classify_href(href);
    let joined = match kind {
        HrefKind::Absolute => PathBuf::from(href),
        HrefKind::FileUrl => Url::parse(href)
            .ok()
            .and_then(|url| url.to_file_path().ok())
            .unwrap_or_else(|| PathBuf::from(href)),
        HrefKind::Relative => absolutize(base_dir).join(href),
        HrefKind::Remote => {
            return ResolvedHref {
                kind,
                path: PathBuf::from(href),
                exists: false,
            }
        }
    };

    match std::fs::canonicalize(&joined) {
        Ok(path) => {
            let exists = path.is_file();
            ResolvedHref { kind, path, exists }
        }
        Err(_) => ResolvedHref {
            kind,
            path: normalize(&absolutize(&joined)),
            exists: false,
        },
    }
}

/// Make a path absolute against the current directory, without touching the filesystem
pub fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Canonical form of a directory that may not exist yet: its deepest
/// existing ancestor is resolved through the filesystem and the rest is
/// appended lexically
pub fn canonical_dir(dir: &Path) -> PathBuf {
    let dir = normalize(&absolutize(dir));
    let mut missing = Vec::new();
    let mut current = dir.as_path();
    loop {
        if let Ok(canonical) = std::fs::canonicalize(current) {
            return missing.iter().rev().fold(canonical, |acc, part| acc.join(part));
        }
        match (current.parent(), current.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                current = parent;
            }
            _ => return dir.clone(),
        }
    }
}

/// Fold `.` and `..` components lexically
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Relative path leading from directory `from` to directory `to`
///
/// Both should be absolute and normalized. An empty path means they are
/// the same directory.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &to[common..] {
        rel.push(component);
    }
    rel
}

/// Build an href from a relative directory and a file name, using `/`
/// separators regardless of platform
pub fn href_from_parts(dir: &Path, file_name: &str) -> String {
    let mut parts: Vec<String> = dir
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.push(file_name.to_string());
    parts.join("/")
}
