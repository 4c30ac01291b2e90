//! Vocabulary definitions for XSLT consolidation
//!
//! Names of the XSLT elements and attributes the consolidator looks at,
//! plus the wording of the trace comments it leaves in merged output.

/// XSLT transform namespace
pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// Prefix declared on new stylesheet shells
pub const XSLT_PREFIX: &str = "xsl";

/// Local name of the stylesheet root element
pub const STYLESHEET: &str = "stylesheet";

/// `xsl:transform` is a synonym of `xsl:stylesheet`
pub const TRANSFORM: &str = "transform";

pub const IMPORT: &str = "import";
pub const INCLUDE: &str = "include";

/// Top-level declaration kinds subject to deduplication
pub const TEMPLATE: &str = "template";
pub const PARAM: &str = "param";
pub const VARIABLE: &str = "variable";

pub const HREF: &str = "href";
pub const NAME: &str = "name";
pub const MATCH: &str = "match";
pub const VERSION: &str = "version";

/// `version` written on new stylesheet shells
pub const XSLT_VERSION: &str = "1.0";

/// Local name of `xml:base`
pub const XML_BASE: &str = "base";

/// Trace comment left where a reference was merged
pub fn merged_comment(kind: &str, href: &str, resolved: &str) -> String {
    comment_text(&format!(
        r#" merged {} href="{}" from "{}" "#,
        kind, href, resolved
    ))
}

/// Trace comment left where a missing reference was skipped
pub fn skipped_comment(kind: &str, href: &str, resolved: &str) -> String {
    comment_text(&format!(
        r#" skipped {} href="{}": "{}" not found "#,
        kind, href, resolved
    ))
}

/// XML comments may not contain `--` nor end with `-`
fn comment_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '-' && out.ends_with('-') {
            out.push(' ');
        }
        out.push(c);
    }
    if out.ends_with('-') {
        out.push(' ');
    }
    out
}
