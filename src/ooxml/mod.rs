//! Office Open XML (OOXML) packages.
//!
//! Two layers:
//!
//! 1. **OPC Layer** (`opc`): the package model (part names, relationship
//!    tables, content types, the archive store and the part-cache session)
//! 2. **PresentationML** (`pptx`): composing presentations out of elements
//!    and slides of other presentations
//!
//! # Example: Reading a relationship table
//!
//! ```rust,no_run
//! use longan::ooxml::opc::{PackURI, Package, RelSelector};
//! use longan::ooxml::opc::constants::relationship_type as rt;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pkg = Package::open("deck.pptx").await?;
//! let slide = PackURI::new("/ppt/slides/slide1.xml")?;
//! for target in pkg.resolve(&slide, &RelSelector::by_type(rt::CHART)).await? {
//!     println!("{} -> {}", target.r_id, target.file);
//! }
//! # Ok(())
//! # }
//! ```
pub mod error;
pub mod opc;
pub mod pptx;

pub use error::{OoxmlError, Result};
pub use opc::{OpcError, PackURI, Package};
