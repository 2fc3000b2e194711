//! Utilities shared across the package and presentation layers.

pub mod xml;

pub use xml::{XmlDocument, XmlElement, XmlError, XmlNode};
