//! Markup handling shared by the package and presentation layers.
//!
//! - [`escape`]: entity escaping for attribute values and character data
//! - [`tree`]: the owned document tree parts are edited through
//! - [`query`]: attribute-driven lookups over a tree

pub mod escape;
pub mod query;
pub mod tree;

pub use escape::{escape_attr, escape_text, unescape};
pub use tree::{Declaration, ElementPath, XmlDocument, XmlElement, XmlNode};

use thiserror::Error;

/// Errors raised while parsing a part into a tree.
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("Malformed attribute: {0}")]
    Attribute(String),

    #[error("Document has no root element")]
    NoRoot,

    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}
