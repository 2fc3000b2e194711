//! The `[Content_Types].xml` registry.
//!
//! Defaults map a file extension to a content type; overrides map one exact
//! part name. Both lists keep their document order and are keyed
//! case-insensitively, as OPC part names are.

use crate::common::xml::{XmlDocument, XmlError, escape_attr};
use crate::ooxml::opc::constants::namespace;

/// Declared content types of one package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentTypes {
    /// Default entries as (extension, content type)
    defaults: Vec<(String, String)>,

    /// Override entries as (part name, content type)
    overrides: Vec<(String, String)>,
}

impl ContentTypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_xml(bytes: &[u8]) -> Result<Self, XmlError> {
        let doc = XmlDocument::parse(bytes)?;
        let mut types = Self::new();
        for el in doc.root().elements() {
            let content_type = el.attr("ContentType").unwrap_or_default();
            match el.local_name() {
                "Default" => {
                    if let Some(ext) = el.attr("Extension") {
                        types.defaults.push((ext, content_type));
                    }
                },
                "Override" => {
                    if let Some(partname) = el.attr("PartName") {
                        types.overrides.push((partname, content_type));
                    }
                },
                _ => {},
            }
        }
        Ok(types)
    }

    /// Declare a Default for `ext` unless one exists. Returns whether an entry was added.
    pub fn register_extension(&mut self, ext: &str, content_type: &str) -> bool {
        if self.default_for(ext).is_some() {
            return false;
        }
        self.defaults.push((ext.to_string(), content_type.to_string()));
        true
    }

    /// Declare an Override for `partname` unless one exists. Returns whether an entry was added.
    pub fn register_override(&mut self, partname: &str, content_type: &str) -> bool {
        if self.override_for(partname).is_some() {
            return false;
        }
        self.overrides
            .push((partname.to_string(), content_type.to_string()));
        true
    }

    pub fn remove_override(&mut self, partname: &str) -> Option<String> {
        let pos = self
            .overrides
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(partname))?;
        Some(self.overrides.remove(pos).1)
    }

    pub fn default_for(&self, ext: &str) -> Option<&str> {
        self.defaults
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map(|(_, ct)| ct.as_str())
    }

    pub fn override_for(&self, partname: &str) -> Option<&str> {
        self.overrides
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(partname))
            .map(|(_, ct)| ct.as_str())
    }

    /// Effective content type of a part: its override, else the default for its extension.
    pub fn content_type_of(&self, partname: &str) -> Option<&str> {
        self.override_for(partname).or_else(|| {
            let filename = partname.rsplit('/').next().unwrap_or(partname);
            let ext = filename.rsplit_once('.').map(|(_, ext)| ext)?;
            self.default_for(ext)
        })
    }

    pub fn defaults(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defaults.iter().map(|(e, ct)| (e.as_str(), ct.as_str()))
    }

    pub fn overrides(&self) -> impl Iterator<Item = (&str, &str)> {
        self.overrides
            .iter()
            .map(|(name, ct)| (name.as_str(), ct.as_str()))
    }

    /// Generate the XML for [Content_Types].xml.
    pub fn to_xml(&self) -> String {
        let mut xml =
            String::with_capacity(128 + (self.defaults.len() + self.overrides.len()) * 120);
        xml.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push_str("\r\n");
        xml.push_str(&format!(r#"<Types xmlns="{}">"#, namespace::OPC_CONTENT_TYPES));
        for (ext, content_type) in &self.defaults {
            xml.push_str(&format!(
                r#"<Default Extension="{}" ContentType="{}"/>"#,
                escape_attr(ext),
                escape_attr(content_type)
            ));
        }
        for (partname, content_type) in &self.overrides {
            xml.push_str(&format!(
                r#"<Override PartName="{}" ContentType="{}"/>"#,
                escape_attr(partname),
                escape_attr(content_type)
            ));
        }
        xml.push_str("</Types>");
        xml
    }
}
