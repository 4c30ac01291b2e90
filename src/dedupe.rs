//! Removal of shadowed top-level declarations
//!
//! Once fragments are merged, several templates, params, or variables may
//! share an identity. Later declarations override earlier ones, so only
//! the last occurrence of each identity survives.

use std::collections::HashMap;

use log::debug;
use xot::{NameId, Node, Xot};

use crate::document::{Stylesheet, XslNames};
use crate::error::StylesheetError;

/// Identity of a top-level declaration
///
/// Templates are keyed by `name`, falling back to `match`; params and
/// variables by `name`. The attribute used is part of the key, so a
/// template named "x" never collides with one matching "x".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct DeclarationKey {
    kind: NameId,
    attribute: NameId,
    value: String,
}

pub(crate) fn declaration_key(xot: &Xot, names: &XslNames, node: Node) -> Option<DeclarationKey> {
    let kind = xot.element(node)?.name();
    let attributes = if kind == names.template {
        vec![names.name, names.match_]
    } else if kind == names.param || kind == names.variable {
        vec![names.name]
    } else {
        return None;
    };

    attributes.into_iter().find_map(|attribute| {
        xot.get_attribute(node, attribute).map(|value| DeclarationKey {
            kind,
            attribute,
            value: value.to_string(),
        })
    })
}

/// Remove every declaration among the direct children of `root` that is
/// followed by another with the same key. Declarations without a key are
/// left alone.
///
/// Returns the number of removed declarations.
pub(crate) fn deduplicate(
    xot: &mut Xot,
    names: &XslNames,
    root: Node,
) -> Result<usize, StylesheetError> {
    let mut groups: HashMap<DeclarationKey, Vec<Node>> = HashMap::new();
    for child in xot.children(root) {
        if let Some(key) = declaration_key(xot, names, child) {
            groups.entry(key).or_default().push(child);
        }
    }

    let mut shadowed = Vec::new();
    for (key, mut nodes) in groups {
        if nodes.len() < 2 {
            continue;
        }
        nodes.pop();
        debug!(
            "Removing {} shadowed {} with {}=\"{}\"",
            nodes.len(),
            xot.local_name_str(key.kind),
            xot.local_name_str(key.attribute),
            key.value
        );
        shadowed.extend(nodes);
    }

    for node in &shadowed {
        xot.remove(*node)?;
    }
    Ok(shadowed.len())
}

impl Stylesheet {
    /// Drop shadowed templates, params, and variables at the top level
    pub fn deduplicate(&mut self) -> Result<usize, StylesheetError> {
        deduplicate(&mut self.xot, &self.names, self.root)
    }
}
