//! Longan - element-level composition of PowerPoint presentations
//!
//! This library assembles `.pptx` files out of pieces of other `.pptx` files.
//! It works at the level of the Open Packaging Conventions: parts, their
//! relationship tables and the content-type registry. The shapes, charts and
//! slides it moves keep working in their new package.
//!
//! # Features
//!
//! - **Part sessions**: parts parsed on demand, cached, committed explicitly
//! - **Relationships**: resolution by type or target prefix, collision-free id allocation
//! - **Content types**: idempotent Default/Override registration
//! - **Transplants**: locate by creation id or name, clone, rewire companions, place
//! - **Charts**: chart parts copied with their embedded workbooks; hooks can edit both
//! - **Slides**: append whole slides, truncate and reorder slide lists
//!
//! # Example - Appending a slide from another deck
//!
//! ```no_run
//! use longan::ooxml::opc::PackURI;
//! use longan::ooxml::pptx::{ComposeOptions, ComposeReport, append_slide, open_package};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ComposeOptions::default();
//! let mut source = open_package("appendix.pptx", &options).await?;
//! let mut target = open_package("report.pptx", &options).await?;
//! let mut report = ComposeReport::new();
//!
//! let slide = PackURI::new("/ppt/slides/slide3.xml")?;
//! let copy = append_slide(&mut source, &slide, &mut target, &options, &mut report).await?;
//! println!("appended as {}", copy);
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod ooxml;
