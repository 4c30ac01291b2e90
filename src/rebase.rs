//! Rebasing of unconsolidated references
//!
//! A stylesheet that still holds references can be saved to another
//! directory. Each href with a known base directory is rewritten relative
//! to the new location so that it keeps pointing at the same file.

use std::path::{Path, PathBuf};

use log::debug;

use crate::document::Stylesheet;
use crate::error::StylesheetError;
use crate::href::{self, HrefKind};

/// New href for a reference written relative to `base`, as seen from a
/// stylesheet saved in `output_dir`. Remote hrefs have none.
pub fn rebase_href(base: &Path, href: &str, output_dir: &Path) -> Option<String> {
    let resolved = href::resolve(base, href);
    if resolved.kind == HrefKind::Remote {
        return None;
    }
    let file_name = resolved.path.file_name()?.to_string_lossy().into_owned();
    let relative = href::relative_path(output_dir, resolved.directory());
    Some(href::href_from_parts(&relative, &file_name))
}

impl Stylesheet {
    /// Save to `output`, rebasing the remaining references relative to it
    ///
    /// The stylesheet itself is left untouched; rebasing happens on a copy.
    pub fn save(&self, output: impl AsRef<Path>) -> Result<(), StylesheetError> {
        let output = output.as_ref();
        if !self.has_references() {
            return self.write_to(output);
        }
        self.rebased(output)?.write_to(output)
    }

    /// Deep copy whose references are rebased for a file at `output`
    pub fn rebased(&self, output: impl AsRef<Path>) -> Result<Stylesheet, StylesheetError> {
        let output = output.as_ref();
        let file_name = output
            .file_name()
            .ok_or_else(|| StylesheetError::InvalidPath(output.to_path_buf()))?;
        let output_dir = output_directory(output);

        let mut copy = self.clone();
        for reference in copy.references() {
            let Some(base) = copy.base_uris.get(reference).map(Path::to_path_buf) else {
                continue;
            };
            let Some(old_href) = copy.reference_href(reference).map(str::to_string) else {
                continue;
            };
            let Some(new_href) = rebase_href(&base, &old_href, &output_dir) else {
                continue;
            };

            debug!("Rebasing href \"{}\" to \"{}\"", old_href, new_href);
            copy.xot.set_attribute(reference, copy.names.href, new_href);
            copy.base_uris.remove(reference);
        }

        copy.set_source(Some(output_dir.join(file_name)));
        Ok(copy)
    }
}

/// Directory a saved stylesheet's relative hrefs resolve against
pub fn output_directory(output: &Path) -> PathBuf {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => href::canonical_dir(parent),
        _ => href::canonical_dir(Path::new(".")),
    }
}
