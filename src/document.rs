//! Stylesheet documents
//!
//! Loading and construction of XSLT stylesheets, and the accessor surface
//! callers use to inspect and serialize them. A [`Stylesheet`] owns its
//! own XML arena; sub-documents read during consolidation are parsed into
//! the same arena so that copying their content is an in-arena clone.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use xmlparser::{Token, Tokenizer};
use xot::output::xml::{Declaration, Parameters};
use xot::output::Indentation;
use xot::{NameId, NamespaceId, Node, Xot};

use crate::base_uri::BaseUriTable;
use crate::consolidate::{consolidate_fragment, ConsolidateOptions};
use crate::error::StylesheetError;
use crate::href::{self, HrefKind};
use crate::vocab;

/// XSLT names interned in one arena
#[derive(Debug, Clone, Copy)]
pub(crate) struct XslNames {
    pub namespace: NamespaceId,
    pub stylesheet: NameId,
    pub transform: NameId,
    pub import: NameId,
    pub include: NameId,
    pub template: NameId,
    pub param: NameId,
    pub variable: NameId,
    pub href: NameId,
    pub name: NameId,
    pub match_: NameId,
    pub version: NameId,
    pub xml_base: NameId,
}

impl XslNames {
    pub fn new(xot: &mut Xot) -> Self {
        let namespace = xot.add_namespace(vocab::XSLT_NAMESPACE);
        let xml_namespace = xot.xml_namespace();
        Self {
            namespace,
            stylesheet: xot.add_name_ns(vocab::STYLESHEET, namespace),
            transform: xot.add_name_ns(vocab::TRANSFORM, namespace),
            import: xot.add_name_ns(vocab::IMPORT, namespace),
            include: xot.add_name_ns(vocab::INCLUDE, namespace),
            template: xot.add_name_ns(vocab::TEMPLATE, namespace),
            param: xot.add_name_ns(vocab::PARAM, namespace),
            variable: xot.add_name_ns(vocab::VARIABLE, namespace),
            href: xot.add_name(vocab::HREF),
            name: xot.add_name(vocab::NAME),
            match_: xot.add_name(vocab::MATCH),
            version: xot.add_name(vocab::VERSION),
            xml_base: xot.add_name_ns(vocab::XML_BASE, xml_namespace),
        }
    }
}

/// Kind of a reference node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Import,
    Include,
}

impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Import => vocab::IMPORT,
            ReferenceKind::Include => vocab::INCLUDE,
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How [`Stylesheet::load_with_mode`] treats the given file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Parse the file and use it as the stylesheet content
    #[default]
    Replace,
    /// Build an empty stylesheet whose only child imports the file
    Import,
}

/// How [`Stylesheet::append`] adds another file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppendMode {
    /// Add an `xsl:import` for the file. Only allowed while the stylesheet
    /// holds nothing but import and include elements.
    #[default]
    Import,
    /// Consolidate the file and append its top-level content
    Merge,
}

/// A stylesheet freshly parsed into an arena
pub(crate) struct ParsedStylesheet {
    pub document: Node,
    pub root: Node,
    /// Canonical path of the file
    pub path: PathBuf,
    pub encoding: Option<String>,
}

impl ParsedStylesheet {
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("/"))
    }
}

/// An XSLT stylesheet document
#[derive(Debug, Clone)]
pub struct Stylesheet {
    pub(crate) xot: Xot,
    pub(crate) document: Node,
    pub(crate) root: Node,
    pub(crate) names: XslNames,
    pub(crate) base_uris: BaseUriTable,
    source: Option<PathBuf>,
    encoding: Option<String>,
    pretty: bool,
}

impl Stylesheet {
    /// An empty `xsl:stylesheet` shell
    pub fn new_empty() -> Result<Self, StylesheetError> {
        let mut xot = Xot::new();
        let names = XslNames::new(&mut xot);
        let (document, root) = new_shell(&mut xot, &names)?;
        Ok(Self {
            xot,
            document,
            root,
            names,
            base_uris: BaseUriTable::new(),
            source: None,
            encoding: None,
            pretty: false,
        })
    }

    /// Load a stylesheet file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StylesheetError> {
        Self::load_with_mode(path, LoadMode::Replace)
    }

    pub fn load_with_mode(path: impl AsRef<Path>, mode: LoadMode) -> Result<Self, StylesheetError> {
        let mut stylesheet = Self::new_empty()?;
        stylesheet.reload(path, mode)?;
        Ok(stylesheet)
    }

    /// A stylesheet that defers all of its content to one imported file
    pub fn import_only(path: impl AsRef<Path>) -> Result<Self, StylesheetError> {
        Self::load_with_mode(path, LoadMode::Import)
    }

    /// Parse stylesheet source text. References get no base directory and
    /// resolve against whatever default the consolidator is given.
    pub fn parse(text: &str) -> Result<Self, StylesheetError> {
        let mut stylesheet = Self::new_empty()?;
        let document = stylesheet
            .xot
            .parse(text)
            .map_err(|e| StylesheetError::LoadError {
                path: "<string>".to_string(),
                reason: e.to_string(),
            })?;
        let root = check_root(&mut stylesheet.xot, &stylesheet.names, document, "<string>")?;
        stylesheet.replace_document(document, root)?;
        stylesheet.encoding = declared_encoding(text.as_bytes());
        Ok(stylesheet)
    }

    /// Clear the stylesheet and load `path` into it
    pub fn reload(&mut self, path: impl AsRef<Path>, mode: LoadMode) -> Result<(), StylesheetError> {
        let path = path.as_ref();
        self.clear()?;

        match mode {
            LoadMode::Import => {
                let base = std::env::current_dir()?;
                self.push_import(&path.to_string_lossy(), base)
            }
            LoadMode::Replace => {
                let parsed = parse_stylesheet(&mut self.xot, &self.names, path)?;
                self.replace_document(parsed.document, parsed.root)?;

                let dir = parsed.directory().to_path_buf();
                for reference in self.references() {
                    let base = xml_base(&self.xot, &self.names, reference, &dir)
                        .unwrap_or_else(|| dir.clone());
                    self.base_uris.set(reference, base);
                }

                self.encoding = parsed.encoding;
                self.source = Some(parsed.path);
                Ok(())
            }
        }
    }

    /// Reset to an empty stylesheet shell
    pub fn clear(&mut self) -> Result<(), StylesheetError> {
        let (document, root) = new_shell(&mut self.xot, &self.names)?;
        self.replace_document(document, root)?;
        self.source = None;
        self.encoding = None;
        Ok(())
    }

    /// Add another stylesheet file
    ///
    /// In [`AppendMode::Merge`] the file is consolidated against its own
    /// directory before its top-level content is appended.
    pub fn append(
        &mut self,
        path: impl AsRef<Path>,
        mode: AppendMode,
        options: &ConsolidateOptions,
    ) -> Result<(), StylesheetError> {
        let path = path.as_ref();
        match mode {
            AppendMode::Import => {
                if !self.import_allowed() {
                    return Err(StylesheetError::InvalidOperation(format!(
                        "cannot import {}: stylesheet holds content other than import and include",
                        path.display()
                    )));
                }
                let base = std::env::current_dir()?;
                self.push_import(&path.to_string_lossy(), base)
            }
            AppendMode::Merge => {
                let parsed = parse_stylesheet(&mut self.xot, &self.names, path)?;
                let merged = consolidate_fragment(
                    &mut self.xot,
                    &self.names,
                    parsed.root,
                    &parsed.path,
                    options,
                );
                if let Err(e) = merged {
                    self.xot.remove(parsed.document)?;
                    return Err(e);
                }

                let children: Vec<Node> = self.xot.children(parsed.root).collect();
                for child in children {
                    let copy = copy_top_level(&mut self.xot, parsed.root, self.root, child);
                    self.xot.append(self.root, copy)?;
                }
                self.xot.remove(parsed.document)?;
                Ok(())
            }
        }
    }

    /// True when the root holds no elements other than import and include
    pub fn import_allowed(&self) -> bool {
        let elements = self
            .xot
            .children(self.root)
            .filter(|n| self.xot.is_element(*n))
            .count();
        elements == self.references().len()
    }

    /// Import and include children of the root, in document order
    pub fn references(&self) -> Vec<Node> {
        reference_nodes(&self.xot, &self.names, self.root)
    }

    pub fn has_references(&self) -> bool {
        !self.references().is_empty()
    }

    pub fn reference_kind(&self, node: Node) -> Option<ReferenceKind> {
        reference_kind(&self.xot, &self.names, node)
    }

    pub fn reference_href(&self, node: Node) -> Option<&str> {
        self.xot.get_attribute(node, self.names.href)
    }

    /// Element children of the root, in document order
    pub fn top_level_elements(&self) -> Vec<Node> {
        self.xot
            .children(self.root)
            .filter(|n| self.xot.is_element(*n))
            .collect()
    }

    /// Read-only access to the underlying tree
    pub fn xot(&self) -> &Xot {
        &self.xot
    }

    pub fn root_element(&self) -> Node {
        self.root
    }

    /// Canonical path the stylesheet was loaded from
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub(crate) fn set_source(&mut self, source: Option<PathBuf>) {
        self.source = source;
    }

    /// Encoding named in the XML declaration of the loaded file
    pub fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Whether serialization indents the output
    pub fn pretty(&self) -> bool {
        self.pretty
    }

    pub fn set_pretty(&mut self, pretty: bool) {
        self.pretty = pretty;
    }

    pub fn base_uris(&self) -> &BaseUriTable {
        &self.base_uris
    }

    /// Serialize to XML text.
    ///
    /// Output is always UTF-8 and declared as such, whatever encoding the
    /// source file declared.
    pub fn to_xml_string(&self) -> Result<String, StylesheetError> {
        let parameters = Parameters {
            indentation: self.pretty.then(Indentation::default),
            declaration: Some(Declaration {
                encoding: Some("UTF-8".to_string()),
                standalone: None,
            }),
            ..Default::default()
        };
        Ok(self.xot.serialize_xml_string(parameters, self.document)?)
    }

    /// Serialize to `path` as-is, without rebasing references
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), StylesheetError> {
        fs::write(path, self.to_xml_string()?)?;
        Ok(())
    }

    fn replace_document(&mut self, document: Node, root: Node) -> Result<(), StylesheetError> {
        if document != self.document {
            self.xot.remove(self.document)?;
        }
        self.document = document;
        self.root = root;
        self.base_uris.clear();
        Ok(())
    }

    fn push_import(&mut self, href: &str, base: PathBuf) -> Result<(), StylesheetError> {
        let import = self.xot.new_element(self.names.import);
        self.xot.set_attribute(import, self.names.href, href);
        self.xot.append(self.root, import)?;
        self.base_uris.set(import, base);
        Ok(())
    }
}

impl fmt::Display for Stylesheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_xml_string().map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

fn new_shell(xot: &mut Xot, names: &XslNames) -> Result<(Node, Node), StylesheetError> {
    let root = xot.new_element(names.stylesheet);
    let prefix = xot.add_prefix(vocab::XSLT_PREFIX);
    xot.set_namespace(root, prefix, names.namespace);
    xot.set_attribute(root, names.version, vocab::XSLT_VERSION);
    let document = xot.new_document();
    xot.append(document, root)?;
    Ok((document, root))
}

/// Read and parse a stylesheet file into `xot`
pub(crate) fn parse_stylesheet(
    xot: &mut Xot,
    names: &XslNames,
    path: &Path,
) -> Result<ParsedStylesheet, StylesheetError> {
    let display = path.display().to_string();
    let load_error = |reason: String| StylesheetError::LoadError {
        path: display.clone(),
        reason,
    };

    let bytes = fs::read(path).map_err(|e| load_error(e.to_string()))?;
    let path = fs::canonicalize(path).map_err(|e| load_error(e.to_string()))?;
    let document = xot
        .parse_bytes(&bytes)
        .map_err(|e| load_error(e.to_string()))?;
    let root = check_root(xot, names, document, &display)?;

    Ok(ParsedStylesheet {
        document,
        root,
        path,
        encoding: declared_encoding(&bytes),
    })
}

/// The document element, if it is `xsl:stylesheet` or `xsl:transform`.
/// The document is dropped from the arena otherwise.
fn check_root(
    xot: &mut Xot,
    names: &XslNames,
    document: Node,
    display: &str,
) -> Result<Node, StylesheetError> {
    let root = xot.document_element(document)?;
    let name = xot.element(root).map(|e| e.name());
    if name == Some(names.stylesheet) || name == Some(names.transform) {
        return Ok(root);
    }

    let (local, uri) = match name {
        Some(name) => xot.name_ns_str(name),
        None => ("", ""),
    };
    let reason = format!(
        "root element {{{}}}{} is not an XSLT stylesheet",
        uri, local
    );
    xot.remove(document)?;
    Err(StylesheetError::LoadError {
        path: display.to_string(),
        reason,
    })
}

pub(crate) fn reference_kind(xot: &Xot, names: &XslNames, node: Node) -> Option<ReferenceKind> {
    let name = xot.element(node)?.name();
    if name == names.import {
        Some(ReferenceKind::Import)
    } else if name == names.include {
        Some(ReferenceKind::Include)
    } else {
        None
    }
}

/// Import and include children of `root`, collected before any mutation
pub(crate) fn reference_nodes(xot: &Xot, names: &XslNames, root: Node) -> Vec<Node> {
    xot.children(root)
        .filter(|n| reference_kind(xot, names, *n).is_some())
        .collect()
}

/// Directory named by a reference's `xml:base`, relative to `dir`
pub(crate) fn xml_base(xot: &Xot, names: &XslNames, node: Node, dir: &Path) -> Option<PathBuf> {
    let value = xot.get_attribute(node, names.xml_base)?;
    let path = match href::classify_href(value) {
        HrefKind::Remote => return None,
        HrefKind::FileUrl => url::Url::parse(value).ok()?.to_file_path().ok()?,
        HrefKind::Absolute | HrefKind::Relative => dir.join(value),
    };
    Some(href::normalize(&href::absolutize(&path)))
}

/// Deep copy a top-level node of one stylesheet for insertion under
/// another root. Namespace declarations of the source root that the
/// target root does not share are carried onto the copy, since XPath
/// expressions in attribute values depend on them.
pub(crate) fn copy_top_level(xot: &mut Xot, from_root: Node, to_root: Node, node: Node) -> Node {
    let copy = xot.clone_node(node);
    if !xot.is_element(copy) {
        return copy;
    }
    for (prefix, namespace) in xot.namespace_declarations(from_root) {
        if xot.get_namespace(to_root, prefix) == Some(namespace) {
            continue;
        }
        if xot.get_namespace(copy, prefix).is_none() {
            xot.set_namespace(copy, prefix, namespace);
        }
    }
    copy
}

/// Encoding named in an XML declaration, if any
fn declared_encoding(bytes: &[u8]) -> Option<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    // the declaration is ASCII even when the rest of the file is not
    let end = bytes.windows(2).position(|w| w == b"?>")? + 2;
    let head = std::str::from_utf8(&bytes[..end]).ok()?;
    match Tokenizer::from(head).next()? {
        Ok(Token::Declaration { encoding, .. }) => encoding.map(|e| e.as_str().to_string()),
        _ => None,
    }
}
