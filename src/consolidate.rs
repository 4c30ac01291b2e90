//! Main consolidation logic
//!
//! Recursive algorithm replacing every `xsl:import` and `xsl:include` of a
//! stylesheet, transitively, with the content of the file it references.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use xot::{Node, Xot};

use crate::base_uri::BaseUriTable;
use crate::dedupe::deduplicate;
use crate::document::{
    copy_top_level, parse_stylesheet, reference_kind, reference_nodes, xml_base, Stylesheet,
    XslNames,
};
use crate::error::StylesheetError;
use crate::href::{self, HrefKind};
use crate::vocab;

/// What to do with a reference whose target file does not exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingReferencePolicy {
    /// Fail with [`StylesheetError::ReferenceNotFound`]
    #[default]
    Fail,
    /// Replace the reference with a trace comment and carry on
    Skip,
}

/// Options for consolidation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ConsolidateOptions {
    pub missing_reference: MissingReferencePolicy,
    /// Remove shadowed top-level declarations after each merged level
    pub deduplicate: bool,
    /// Maximum nesting of references below the root stylesheet
    pub max_depth: Option<usize>,
}

impl Default for ConsolidateOptions {
    fn default() -> Self {
        Self {
            missing_reference: MissingReferencePolicy::Fail,
            deduplicate: true,
            max_depth: None,
        }
    }
}

/// Statistics from consolidation
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ConsolidateStats {
    /// Number of stylesheet files read (excluding the root)
    pub documents_loaded: usize,
    /// References replaced by their content
    pub references_merged: usize,
    /// Missing references dropped under [`MissingReferencePolicy::Skip`]
    pub references_skipped: usize,
    /// Remote references left in place
    pub references_kept: usize,
    /// Shadowed declarations removed
    pub declarations_removed: usize,
}

/// Result of consolidating a file
#[derive(Debug)]
pub struct ConsolidateResult {
    pub stylesheet: Stylesheet,
    pub stats: ConsolidateStats,
}

/// Load `path` and consolidate it against its own directory
pub fn consolidate_file(
    path: impl AsRef<Path>,
    options: &ConsolidateOptions,
) -> Result<ConsolidateResult, StylesheetError> {
    let mut stylesheet = Stylesheet::load(path)?;
    let stats = consolidate(&mut stylesheet, None, options)?;
    Ok(ConsolidateResult { stylesheet, stats })
}

/// Consolidate a stylesheet in place
///
/// On error the stylesheet is left untouched. References with a base-directory entry resolve against it; the others
/// resolve against `default_base_dir`, which falls back to the current
/// working directory.
pub fn consolidate(
    stylesheet: &mut Stylesheet,
    default_base_dir: Option<&Path>,
    options: &ConsolidateOptions,
) -> Result<ConsolidateStats, StylesheetError> {
    let default_base = match default_base_dir {
        Some(dir) => href::absolutize(dir),
        None => std::env::current_dir()?,
    };

    // work on a copy so a failure leaves the stylesheet as it was
    let mut working = stylesheet.clone();
    let source = working.source().map(Path::to_path_buf);
    let mut consolidator = Consolidator::new(&mut working.xot, &working.names, options);
    consolidator.chain.extend(source);
    consolidator.consolidate_level(working.root, &mut working.base_uris, &default_base)?;
    let stats = consolidator.stats;

    *stylesheet = working;
    Ok(stats)
}

impl Stylesheet {
    /// Consolidate in place, resolving references without a base-directory
    /// entry against the current working directory
    pub fn consolidate(
        &mut self,
        options: &ConsolidateOptions,
    ) -> Result<ConsolidateStats, StylesheetError> {
        consolidate(self, None, options)
    }
}

/// Consolidate a sub-document parsed from `source` into the arena
pub(crate) fn consolidate_fragment(
    xot: &mut Xot,
    names: &XslNames,
    root: Node,
    source: &Path,
    options: &ConsolidateOptions,
) -> Result<ConsolidateStats, StylesheetError> {
    let base = source.parent().unwrap_or_else(|| Path::new("/"));
    let mut consolidator = Consolidator::new(xot, names, options);
    consolidator.chain.push(source.to_path_buf());
    consolidator.consolidate_level(root, &mut BaseUriTable::new(), base)?;
    Ok(consolidator.stats)
}

struct Consolidator<'a> {
    xot: &'a mut Xot,
    names: &'a XslNames,
    options: &'a ConsolidateOptions,
    stats: ConsolidateStats,
    /// Canonical paths of the stylesheets currently being expanded
    chain: Vec<PathBuf>,
    /// Nesting of the level being expanded, 0 for the starting stylesheet
    depth: usize,
}

impl<'a> Consolidator<'a> {
    fn new(xot: &'a mut Xot, names: &'a XslNames, options: &'a ConsolidateOptions) -> Self {
        Self {
            xot,
            names,
            options,
            stats: ConsolidateStats::default(),
            chain: Vec::new(),
            depth: 0,
        }
    }

    /// Replace the references among the children of `root`, then drop
    /// declarations the merged content shadows
    fn consolidate_level(
        &mut self,
        root: Node,
        table: &mut BaseUriTable,
        default_base: &Path,
    ) -> Result<(), StylesheetError> {
        // collect first: the children are rewritten while we go
        let references = reference_nodes(self.xot, self.names, root);
        if references.is_empty() {
            return Ok(());
        }

        for reference in references {
            self.consolidate_reference(reference, table, default_base)?;
        }

        if self.options.deduplicate {
            self.stats.declarations_removed += deduplicate(self.xot, self.names, root)?;
        }
        Ok(())
    }

    fn consolidate_reference(
        &mut self,
        reference: Node,
        table: &mut BaseUriTable,
        default_base: &Path,
    ) -> Result<(), StylesheetError> {
        let kind = reference_kind(self.xot, self.names, reference)
            .ok_or_else(|| StylesheetError::InvalidStructure("not a reference node".to_string()))?;
        let href = self
            .xot
            .get_attribute(reference, self.names.href)
            .map(str::to_string)
            .ok_or_else(|| {
                StylesheetError::InvalidStructure(format!("xsl:{} without href", kind))
            })?;

        let base = match table.get(reference) {
            Some(dir) => dir.to_path_buf(),
            None => xml_base(self.xot, self.names, reference, default_base)
                .unwrap_or_else(|| default_base.to_path_buf()),
        };
        let resolved = href::resolve(&base, &href);
        let resolved_display = resolved.path.display().to_string();

        if resolved.kind == HrefKind::Remote {
            warn!("Leaving remote xsl:{} href=\"{}\" in place", kind, href);
            self.stats.references_kept += 1;
            return Ok(());
        }

        if !resolved.exists {
            match self.options.missing_reference {
                MissingReferencePolicy::Fail => {
                    return Err(StylesheetError::ReferenceNotFound {
                        href,
                        path: resolved_display,
                    });
                }
                MissingReferencePolicy::Skip => {
                    warn!(
                        "Skipping xsl:{} href=\"{}\": {} not found",
                        kind, href, resolved_display
                    );
                    let comment = vocab::skipped_comment(kind.as_str(), &href, &resolved_display);
                    self.insert_comment(reference, &comment)?;
                    self.xot.remove(reference)?;
                    table.remove(reference);
                    self.stats.references_skipped += 1;
                    return Ok(());
                }
            }
        }

        if self.chain.contains(&resolved.path) {
            return Err(StylesheetError::CycleDetected(resolved_display));
        }
        if let Some(limit) = self.options.max_depth {
            if self.depth >= limit {
                return Err(StylesheetError::DepthLimitExceeded { href, limit });
            }
        }

        let sub = parse_stylesheet(self.xot, self.names, &resolved.path)?;
        self.stats.documents_loaded += 1;

        self.chain.push(sub.path.clone());
        self.depth += 1;
        let nested = self.consolidate_level(sub.root, &mut BaseUriTable::new(), sub.directory());
        self.depth -= 1;
        self.chain.pop();
        if let Err(e) = nested {
            self.xot.remove(sub.document)?;
            return Err(e);
        }

        debug!("Merging xsl:{} href=\"{}\" from {}", kind, href, resolved_display);
        let comment = vocab::merged_comment(kind.as_str(), &href, &resolved_display);
        self.insert_comment(reference, &comment)?;

        let children: Vec<Node> = self.xot.children(sub.root).collect();
        let root = self
            .xot
            .parent(reference)
            .ok_or_else(|| StylesheetError::InvalidStructure("detached reference".to_string()))?;
        for child in children {
            let copy = copy_top_level(self.xot, sub.root, root, child);
            self.xot.insert_before(reference, copy)?;
        }

        self.xot.remove(sub.document)?;
        self.xot.remove(reference)?;
        table.remove(reference);
        self.stats.references_merged += 1;
        Ok(())
    }

    fn insert_comment(&mut self, reference: Node, text: &str) -> Result<(), StylesheetError> {
        let comment = self.xot.new_comment(text);
        self.xot.insert_before(reference, comment)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_stylesheet(dir: &Path, rel: &str, body: &str) -> PathBuf {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(
            &path,
            format!(
                r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="1.0">{}</xsl:stylesheet>"#,
                body
            ),
        )
        .unwrap();
        path
    }

    /// Top-level children rendered as "comment" or the element's name attribute
    fn outline(stylesheet: &Stylesheet) -> Vec<String> {
        let xot = stylesheet.xot();
        xot.children(stylesheet.root_element())
            .filter_map(|n| {
                if xot.is_comment(n) {
                    Some("comment".to_string())
                } else if xot.is_element(n) {
                    Some(
                        xot.get_attribute(n, stylesheet.names.name)
                            .unwrap_or("?")
                            .to_string(),
                    )
                } else {
                    None
                }
            })
            .collect()
    }

    fn comments(stylesheet: &Stylesheet) -> Vec<String> {
        let xot = stylesheet.xot();
        xot.children(stylesheet.root_element())
            .filter_map(|n| xot.comment_str(n).map(str::to_string))
            .collect()
    }

    #[test]
    fn test_consolidate_without_references_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = write_stylesheet(
            dir.path(),
            "main.xsl",
            r#"<xsl:template name="t"/><xsl:template name="t"/>"#,
        );
        let mut stylesheet = Stylesheet::load(&path).unwrap();
        let before = stylesheet.to_xml_string().unwrap();

        let stats = consolidate(&mut stylesheet, None, &ConsolidateOptions::default()).unwrap();

        assert_eq!(stats, ConsolidateStats::default());
        assert_eq!(stylesheet.to_xml_string().unwrap(), before);
    }

    #[test]
    fn test_import_replaced_by_content() {
        let dir = TempDir::new().unwrap();
        write_stylesheet(dir.path(), "lib/a.xsl", r#"<xsl:template name="shared"/>"#);
        let main = write_stylesheet(
            dir.path(),
            "main.xsl",
            r#"<xsl:import href="lib/a.xsl"/><xsl:template name="main"/>"#,
        );

        let result = consolidate_file(&main, &ConsolidateOptions::default()).unwrap();

        assert_eq!(outline(&result.stylesheet), vec!["comment", "shared", "main"]);
        assert!(!result.stylesheet.has_references());
        assert_eq!(result.stats.references_merged, 1);
        assert_eq!(result.stats.documents_loaded, 1);
        assert_eq!(result.stats.declarations_removed, 0);

        let comment = &comments(&result.stylesheet)[0];
        assert!(comment.contains(r#"merged import href="lib/a.xsl""#));
    }

    #[test]
    fn test_depth_first_document_order() {
        let dir = TempDir::new().unwrap();
        write_stylesheet(dir.path(), "f1a.xsl", r#"<xsl:template name="f1a"/>"#);
        write_stylesheet(
            dir.path(),
            "f1.xsl",
            r#"<xsl:import href="f1a.xsl"/><xsl:template name="f1"/>"#,
        );
        write_stylesheet(dir.path(), "f2.xsl", r#"<xsl:template name="f2"/>"#);
        let main = write_stylesheet(
            dir.path(),
            "main.xsl",
            r#"<xsl:import href="f1.xsl"/><xsl:include href="f2.xsl"/>"#,
        );

        let result = consolidate_file(&main, &ConsolidateOptions::default()).unwrap();

        assert_eq!(
            outline(&result.stylesheet),
            vec!["comment", "comment", "f1a", "f1", "comment", "f2"]
        );
        assert_eq!(result.stats.references_merged, 3);
        assert!(comments(&result.stylesheet)[2].contains("merged include"));
    }

    #[test]
    fn test_nested_reference_resolves_against_its_own_directory() {
        let dir = TempDir::new().unwrap();
        write_stylesheet(dir.path(), "lib/common/util.xsl", r#"<xsl:template name="util"/>"#);
        write_stylesheet(
            dir.path(),
            "lib/a.xsl",
            r#"<xsl:include href="common/util.xsl"/>"#,
        );
        let main = write_stylesheet(dir.path(), "main.xsl", r#"<xsl:import href="lib/a.xsl"/>"#);

        let result = consolidate_file(&main, &ConsolidateOptions::default()).unwrap();
        assert_eq!(outline(&result.stylesheet), vec!["comment", "comment", "util"]);
    }

    #[test]
    fn test_later_declaration_wins() {
        let dir = TempDir::new().unwrap();
        write_stylesheet(dir.path(), "a.xsl", r#"<xsl:template name="t" mode="a"/>"#);
        write_stylesheet(dir.path(), "b.xsl", r#"<xsl:template name="t" mode="b"/>"#);
        let main = write_stylesheet(
            dir.path(),
            "main.xsl",
            r#"<xsl:import href="a.xsl"/><xsl:import href="b.xsl"/>"#,
        );

        let result = consolidate_file(&main, &ConsolidateOptions::default()).unwrap();
        let stylesheet = &result.stylesheet;
        let templates = stylesheet.top_level_elements();
        assert_eq!(templates.len(), 1);
        let mode = stylesheet.xot().name("mode").unwrap();
        assert_eq!(stylesheet.xot().get_attribute(templates[0], mode), Some("b"));
        assert_eq!(result.stats.declarations_removed, 1);
    }

    #[test]
    fn test_keep_duplicates_option() {
        let dir = TempDir::new().unwrap();
        write_stylesheet(dir.path(), "a.xsl", r#"<xsl:variable name="v"/>"#);
        let main = write_stylesheet(
            dir.path(),
            "main.xsl",
            r#"<xsl:import href="a.xsl"/><xsl:variable name="v"/>"#,
        );
        let options = ConsolidateOptions {
            deduplicate: false,
            ..Default::default()
        };

        let result = consolidate_file(&main, &options).unwrap();
        assert_eq!(result.stylesheet.top_level_elements().len(), 2);
    }

    #[test]
    fn test_missing_reference_fails() {
        let dir = TempDir::new().unwrap();
        let main = write_stylesheet(
            dir.path(),
            "main.xsl",
            r#"<xsl:import href="missing.xsl"/><xsl:template name="main"/>"#,
        );

        let err = consolidate_file(&main, &ConsolidateOptions::default()).unwrap_err();
        match &err {
            StylesheetError::ReferenceNotFound { href, .. } => assert_eq!(href, "missing.xsl"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("missing.xsl"));
    }

    #[test]
    fn test_missing_reference_skipped() {
        let dir = TempDir::new().unwrap();
        let main = write_stylesheet(
            dir.path(),
            "main.xsl",
            r#"<xsl:import href="missing.xsl"/><xsl:template name="main"/>"#,
        );
        let options = ConsolidateOptions {
            missing_reference: MissingReferencePolicy::Skip,
            ..Default::default()
        };

        for _ in 0..2 {
            let result = consolidate_file(&main, &options).unwrap();
            assert_eq!(outline(&result.stylesheet), vec!["comment", "main"]);
            assert!(comments(&result.stylesheet)[0].contains(r#"skipped import href="missing.xsl""#));
            assert_eq!(result.stats.references_skipped, 1);
            assert_eq!(result.stats.documents_loaded, 0);
        }
    }

    #[test]
    fn test_failed_consolidation_leaves_stylesheet_unchanged() {
        let dir = TempDir::new().unwrap();
        write_stylesheet(
            dir.path(),
            "a.xsl",
            r#"<xsl:import href="missing.xsl"/><xsl:template name="a"/>"#,
        );
        write_stylesheet(dir.path(), "b.xsl", r#"<xsl:template name="b"/>"#);
        let main = write_stylesheet(
            dir.path(),
            "main.xsl",
            r#"<xsl:import href="b.xsl"/><xsl:import href="a.xsl"/><xsl:template name="main"/>"#,
        );
        let mut stylesheet = Stylesheet::load(&main).unwrap();
        let before = stylesheet.to_xml_string().unwrap();

        let result = consolidate(&mut stylesheet, None, &ConsolidateOptions::default());
        assert!(matches!(result, Err(StylesheetError::ReferenceNotFound { .. })));
        assert_eq!(stylesheet.to_xml_string().unwrap(), before);
        assert_eq!(stylesheet.base_uris().len(), 2);

        let options = ConsolidateOptions {
            missing_reference: MissingReferencePolicy::Skip,
            ..Default::default()
        };
        consolidate(&mut stylesheet, None, &options).unwrap();
        let xml = stylesheet.to_xml_string().unwrap();
        assert_eq!(xml.matches(r#"merged import href="a.xsl""#).count(), 1);
        assert_eq!(xml.matches(r#"merged import href="b.xsl""#).count(), 1);
        assert_eq!(outline(&stylesheet), vec!["comment", "b", "comment", "comment", "a", "main"]);
    }

    #[test]
    fn test_failed_nested_level_inserts_nothing() {
        let dir = TempDir::new().unwrap();
        write_stylesheet(dir.path(), "a.xsl", r#"<xsl:import href="missing.xsl"/>"#);
        let main = write_stylesheet(dir.path(), "main.xsl", r#"<xsl:import href="a.xsl"/>"#);
        let mut stylesheet = Stylesheet::load(&main).unwrap();
        let names = stylesheet.names;
        let root = stylesheet.root;
        let reference = stylesheet.references()[0];

        let options = ConsolidateOptions::default();
        let mut consolidator = Consolidator::new(&mut stylesheet.xot, &names, &options);
        let mut table = BaseUriTable::new();
        table.set(reference, dir.path());
        assert!(consolidator
            .consolidate_level(root, &mut table, dir.path())
            .is_err());
        assert!(consolidator.chain.is_empty());
        assert_eq!(consolidator.depth, 0);

        assert!(table.has(reference));
        assert_eq!(stylesheet.references(), vec![reference]);
        assert!(comments(&stylesheet).is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let dir = TempDir::new().unwrap();
        write_stylesheet(dir.path(), "a.xsl", r#"<xsl:import href="b.xsl"/>"#);
        write_stylesheet(dir.path(), "b.xsl", r#"<xsl:import href="a.xsl"/>"#);
        let main = write_stylesheet(dir.path(), "main.xsl", r#"<xsl:import href="a.xsl"/>"#);

        let result = consolidate_file(&main, &ConsolidateOptions::default());
        assert!(matches!(result, Err(StylesheetError::CycleDetected(_))));
    }

    #[test]
    fn test_self_import_detected() {
        let dir = TempDir::new().unwrap();
        let main = write_stylesheet(dir.path(), "main.xsl", r#"<xsl:import href="main.xsl"/>"#);
        let result = consolidate_file(&main, &ConsolidateOptions::default());
        assert!(matches!(result, Err(StylesheetError::CycleDetected(_))));
    }

    #[test]
    fn test_repeated_import_is_not_a_cycle() {
        let dir = TempDir::new().unwrap();
        write_stylesheet(dir.path(), "common.xsl", r#"<xsl:param name="p"/>"#);
        write_stylesheet(dir.path(), "a.xsl", r#"<xsl:import href="common.xsl"/>"#);
        write_stylesheet(dir.path(), "b.xsl", r#"<xsl:import href="common.xsl"/>"#);
        let main = write_stylesheet(
            dir.path(),
            "main.xsl",
            r#"<xsl:import href="a.xsl"/><xsl:import href="b.xsl"/>"#,
        );

        let result = consolidate_file(&main, &ConsolidateOptions::default()).unwrap();
        assert_eq!(result.stats.documents_loaded, 4);
        assert_eq!(result.stats.declarations_removed, 1);
        assert_eq!(result.stylesheet.top_level_elements().len(), 1);
    }

    #[test]
    fn test_max_depth() {
        let dir = TempDir::new().unwrap();
        write_stylesheet(dir.path(), "c.xsl", r#"<xsl:template name="c"/>"#);
        write_stylesheet(dir.path(), "b.xsl", r#"<xsl:import href="c.xsl"/>"#);
        let main = write_stylesheet(dir.path(), "main.xsl", r#"<xsl:import href="b.xsl"/>"#);

        let shallow = ConsolidateOptions {
            max_depth: Some(1),
            ..Default::default()
        };
        assert!(matches!(
            consolidate_file(&main, &shallow),
            Err(StylesheetError::DepthLimitExceeded { limit: 1, .. })
        ));

        let deep = ConsolidateOptions {
            max_depth: Some(2),
            ..Default::default()
        };
        assert!(consolidate_file(&main, &deep).is_ok());
    }

    #[test]
    fn test_default_base_dir_for_untracked_references() {
        let dir = TempDir::new().unwrap();
        write_stylesheet(dir.path(), "lib/a.xsl", r#"<xsl:template name="a"/>"#);
        let mut stylesheet = Stylesheet::parse(
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="1.0"><xsl:include href="a.xsl"/></xsl:stylesheet>"#,
        )
        .unwrap();

        consolidate(
            &mut stylesheet,
            Some(&dir.path().join("lib")),
            &ConsolidateOptions::default(),
        )
        .unwrap();
        assert_eq!(outline(&stylesheet), vec!["comment", "a"]);
    }

    #[test]
    fn test_remote_reference_left_in_place() {
        let mut stylesheet = Stylesheet::parse(
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform" version="1.0"><xsl:import href="https://example.org/a.xsl"/></xsl:stylesheet>"#,
        )
        .unwrap();

        let stats = consolidate(&mut stylesheet, None, &ConsolidateOptions::default()).unwrap();
        assert_eq!(stats.references_kept, 1);
        assert_eq!(stylesheet.references().len(), 1);
    }

    #[test]
    fn test_options_from_json() {
        let options: ConsolidateOptions =
            serde_json::from_str(r#"{"missing-reference": "skip", "max-depth": 8}"#).unwrap();
        assert_eq!(options.missing_reference, MissingReferencePolicy::Skip);
        assert_eq!(options.max_depth, Some(8));
        assert!(options.deduplicate);
    }
}
