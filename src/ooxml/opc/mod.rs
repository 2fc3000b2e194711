/// Open Packaging Conventions (OPC) implementation.
///
/// The package model composition works against: part names, relationship
/// tables, the content-type registry, and a session that caches parsed parts
/// over an archive store.
///
/// - `packuri`: part names and the `_rels` naming scheme
/// - `rel`: relationship tables, id allocation and target resolution
/// - `content_types`: `[Content_Types].xml` Default/Override entries
/// - `phys_pkg`: the archive store seam and its ZIP implementation
/// - `package`: the per-session part cache with explicit commit
pub mod constants;
pub mod content_types;
pub mod error;
pub mod package;
pub mod packuri;
pub mod phys_pkg;
pub mod rel;

// Re-export commonly used types
pub use content_types::ContentTypes;
pub use error::OpcError;
pub use package::Package;
pub use packuri::PackURI;
pub use phys_pkg::{ArchiveStore, ZipStore};
pub use rel::{NewRelationship, RelSelector, Relationship, Relationships, Target};
