//! PowerPoint (.pptx) composition.
//!
//! Building blocks for assembling a presentation out of others: elements are
//! found by stable identity, cloned, rewired against the target package and
//! placed; whole slides are copied; slide lists are truncated and reordered.
//!
//! # Example
//!
//! ```rust,no_run
//! use longan::ooxml::opc::PackURI;
//! use longan::ooxml::pptx::{
//!     ComposeOptions, ComposeReport, StableIdentity, TransplantRequest, Transplanter, open_package,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ComposeOptions::default();
//! let mut source = open_package("source.pptx", &options).await?;
//! let mut target = open_package("template.pptx", &options).await?;
//! let mut report = ComposeReport::new();
//!
//! let request = TransplantRequest::replace(
//!     PackURI::new("/ppt/slides/slide2.xml")?,
//!     StableIdentity::Name("Revenue Chart".to_string()),
//!     PackURI::new("/ppt/slides/slide1.xml")?,
//! );
//! Transplanter::new(&options, &mut report)
//!     .transplant(&mut source, &mut target, request)
//!     .await?;
//!
//! tokio::fs::write("out.pptx", target.finalize().await?).await?;
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod companion;
pub mod config;
pub mod hooks;
pub mod identity;
pub mod presentation;
pub mod report;
pub mod slide;
pub mod transplant;
pub mod workbook;

#[cfg(test)]
pub(crate) mod test_support;

pub use companion::{CompanionKind, CopiedChart, Rewirer};
pub use config::ComposeOptions;
pub use hooks::{ChartHook, Hook, HookError, HookResult, ShapeHook};
pub use identity::{ElementInfo, StableIdentity};
pub use presentation::{
    SlideEntry, SlideInventory, creation_ids, open_package, package_from_bytes, reorder_slides, slides,
    truncate_slides,
};
pub use report::{ComposeReport, HookFailure, SkipReason, Skipped, TrackedRelation};
pub use slide::append_slide;
pub use transplant::{Placement, Stage, TransplantOutcome, TransplantRequest, Transplanter};
pub use workbook::LinkedWorkbook;
