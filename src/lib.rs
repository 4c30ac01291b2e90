//! XSLT Stylesheet Consolidation Library
//!
//! This library flattens a tree of XSLT stylesheets connected by
//! `xsl:import` and `xsl:include` into a single self-contained stylesheet,
//! and saves stylesheets that still hold references to new locations with
//! their hrefs rebased.
//!
//! # Overview
//!
//! Consolidation works through the references of a stylesheet in document
//! order:
//!
//! 1. Resolving each href against the base directory recorded for it
//! 2. Loading the referenced file and consolidating it recursively
//! 3. Replacing the reference with a trace comment and the file's
//!    top-level content
//! 4. Removing templates, params, and variables shadowed by a later
//!    declaration with the same identity
//!
//! Every reference of a loaded stylesheet carries a base directory in a
//! [`BaseUriTable`], keyed by the reference's node. When such a stylesheet
//! is saved elsewhere, each tracked href is rewritten relative to the new
//! location.
//!
//! # Usage
//!
//! ## Consolidate a stylesheet
//!
//! ```ignore
//! use xslt_consolidate::{consolidate_file, ConsolidateOptions};
//!
//! let result = consolidate_file("xsl/main.xsl", &ConsolidateOptions::default())?;
//! println!("{}", result.stylesheet);
//! ```
//!
//! ## Build an import-only stylesheet and save it elsewhere
//!
//! ```ignore
//! use xslt_consolidate::{AppendMode, ConsolidateOptions, Stylesheet};
//!
//! let mut stylesheet = Stylesheet::import_only("lib/base.xsl")?;
//! stylesheet.append("lib/extra.xsl", AppendMode::Import, &ConsolidateOptions::default())?;
//! stylesheet.save("build/main.xsl")?;
//! ```

pub mod base_uri;
pub mod consolidate;
pub mod dedupe;
pub mod document;
pub mod error;
pub mod href;
pub mod rebase;
pub mod vocab;

// Re-export main types for convenience
pub use crate::base_uri::BaseUriTable;
pub use crate::consolidate::{
    consolidate, consolidate_file, ConsolidateOptions, ConsolidateResult, ConsolidateStats,
    MissingReferencePolicy,
};
pub use crate::document::{AppendMode, LoadMode, ReferenceKind, Stylesheet};
pub use crate::error::StylesheetError;
pub use crate::href::{resolve, HrefKind, ResolvedHref};
pub use crate::rebase::rebase_href;
