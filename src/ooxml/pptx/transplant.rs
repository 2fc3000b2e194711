//! Moving elements between slides, across packages.
//!
//! A transplant runs through fixed stages: the source element is located by
//! its stable identity, deep-cloned, rewired against the target package,
//! placed, handed to user hooks and finally committed with its slide. A miss
//! while locating is an outcome, not an error; in that case nothing in either
//! package has been touched.

use crate::common::xml::{ElementPath, XmlDocument, XmlElement};
use crate::ooxml::error::{OoxmlError, Result};
use crate::ooxml::opc::error::OpcError;
use crate::ooxml::opc::{ArchiveStore, PackURI, Package};
use crate::ooxml::pptx::companion::{CopiedChart, Rewirer};
use crate::ooxml::pptx::config::ComposeOptions;
use crate::ooxml::pptx::hooks::{Hook, guarded};
use crate::ooxml::pptx::identity::{self, StableIdentity};
use crate::ooxml::pptx::report::{ComposeReport, HookFailure, SkipReason};
use crate::ooxml::pptx::workbook::LinkedWorkbook;
use log::{debug, warn};
use std::collections::HashMap;

/// Container of a slide's shapes.
pub const SHAPE_TREE: &str = "p:spTree";

/// Where a transplanted clone goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Last member of the target's shape tree (top of the z-order).
    Append,
    /// In place of the matching element, at its position.
    Replace,
    /// Delete the matching element; nothing is cloned.
    Remove,
}

/// Progress of one transplant, logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Located,
    Cloned,
    Rewired,
    Placed,
    Skipped,
}

/// One element to move.
#[derive(Debug)]
pub struct TransplantRequest {
    pub source_slide: PackURI,
    pub identity: StableIdentity,
    pub target_slide: PackURI,
    pub placement: Placement,
    /// Identity of the element to replace or remove in the target. Defaults
    /// to the source element's own identity.
    pub target_identity: Option<StableIdentity>,
    pub hooks: Vec<Hook>,
}

impl TransplantRequest {
    pub fn append(source_slide: PackURI, identity: StableIdentity, target_slide: PackURI) -> Self {
        Self {
            source_slide,
            identity,
            target_slide,
            placement: Placement::Append,
            target_identity: None,
            hooks: Vec::new(),
        }
    }

    pub fn replace(source_slide: PackURI, identity: StableIdentity, target_slide: PackURI) -> Self {
        Self {
            placement: Placement::Replace,
            ..Self::append(source_slide, identity, target_slide)
        }
    }

    /// Remove `identity` from `target_slide`.
    pub fn remove(target_slide: PackURI, identity: StableIdentity) -> Self {
        Self {
            placement: Placement::Remove,
            ..Self::append(target_slide.clone(), identity, target_slide)
        }
    }

    pub fn with_target_identity(mut self, identity: StableIdentity) -> Self {
        self.target_identity = Some(identity);
        self
    }

    pub fn with_hook(mut self, hook: Hook) -> Self {
        self.hooks.push(hook);
        self
    }
}

/// What a transplant did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransplantOutcome {
    Placed {
        /// Path of the clone from the slide root
        path: ElementPath,
        /// Source relationship id -> id in the target slide
        relationships: HashMap<String, String>,
        charts: Vec<CopiedChart>,
    },
    Removed {
        path: ElementPath,
    },
    Skipped(SkipReason),
}

impl TransplantOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, TransplantOutcome::Skipped(_))
    }
}

/// Runs transplants with one set of options, recording into one report.
pub struct Transplanter<'a> {
    options: &'a ComposeOptions,
    report: &'a mut ComposeReport,
}

impl<'a> Transplanter<'a> {
    pub fn new(options: &'a ComposeOptions, report: &'a mut ComposeReport) -> Self {
        Self { options, report }
    }

    pub async fn transplant<S, T>(
        &mut self,
        source: &mut Package<S>,
        target: &mut Package<T>,
        request: TransplantRequest,
    ) -> Result<TransplantOutcome>
    where
        S: ArchiveStore,
        T: ArchiveStore,
    {
        let TransplantRequest {
            source_slide,
            identity,
            target_slide,
            placement,
            target_identity,
            mut hooks,
        } = request;

        if placement == Placement::Remove {
            let identity = target_identity.unwrap_or(identity);
            return self.remove(target, &target_slide, &identity).await;
        }

        let source_doc = source.load(&source_slide).await?;
        let Some(mut clone) = identity::locate(source_doc.root(), &identity)
            .and_then(|path| source_doc.root().at(&path).cloned())
        else {
            return Ok(self.skip(&source_slide, identity, SkipReason::ElementNotFound));
        };
        debug!("{:?}: {} in {}", Stage::Located, identity, source_slide);
        debug!("{:?}: <{}>", Stage::Cloned, clone.name());

        // The target is checked before anything is copied into it.
        let target_identity = target_identity
            .or_else(|| StableIdentity::of(&clone, self.options.use_creation_ids))
            .unwrap_or_else(|| identity.clone());
        {
            let root = target.load(&target_slide).await?.root();
            match placement {
                Placement::Replace if identity::locate(root, &target_identity).is_none() => {
                    return Ok(self.skip(&target_slide, target_identity, SkipReason::ElementNotFound));
                },
                _ if root.find(SHAPE_TREE).is_none() => {
                    return Err(OoxmlError::InvalidFormat(format!(
                        "{} has no shape tree",
                        target_slide
                    )));
                },
                _ => {},
            }
        }

        let (relationships, charts) = {
            let mut rewirer = Rewirer::new(
                source,
                &source_slide,
                target,
                &target_slide,
                self.options,
                self.report,
            );
            let relationships = rewirer.rewire(&mut clone).await?;
            (relationships, rewirer.charts().to_vec())
        };
        debug!("{:?}: {} reference(s) in {}", Stage::Rewired, relationships.len(), target_slide);

        let path = {
            let root = target.load(&target_slide).await?.root_mut();
            place(root, clone, placement, &target_identity)
                .ok_or_else(|| OoxmlError::InvalidFormat(format!("cannot place {} in {}", target_identity, target_slide)))?
        };
        debug!("{:?}: {} at {:?}", Stage::Placed, target_identity, path.as_slice());

        self.run_hooks(target, &target_slide, &path, &target_identity, &charts, &mut hooks)
            .await?;
        target.commit(&target_slide).await?;

        Ok(TransplantOutcome::Placed {
            path,
            relationships,
            charts,
        })
    }

    /// Delete the element with `identity` from `slide`.
    pub async fn remove<T: ArchiveStore>(
        &mut self,
        target: &mut Package<T>,
        slide: &PackURI,
        identity: &StableIdentity,
    ) -> Result<TransplantOutcome> {
        let root = target.load(slide).await?.root_mut();
        let Some(path) = identity::locate(root, identity) else {
            return Ok(self.skip(slide, identity.clone(), SkipReason::ElementNotFound));
        };
        root.remove_at(&path);
        debug!("removed {} from {}", identity, slide);
        target.commit(slide).await?;
        Ok(TransplantOutcome::Removed { path })
    }

    fn skip(&mut self, slide: &PackURI, identity: StableIdentity, reason: SkipReason) -> TransplantOutcome {
        warn!("{:?}: {} in {}: {:?}", Stage::Skipped, identity, slide, reason);
        self.report.skip(slide, Some(identity), reason.clone());
        TransplantOutcome::Skipped(reason)
    }

    /// Run `hooks` in order on the placed element. Chart hooks also get the
    /// first copied chart and its workbook, both written back afterwards.
    async fn run_hooks<T: ArchiveStore>(
        &mut self,
        target: &mut Package<T>,
        slide: &PackURI,
        path: &ElementPath,
        identity: &StableIdentity,
        charts: &[CopiedChart],
        hooks: &mut [Hook],
    ) -> Result<()> {
        if hooks.is_empty() {
            return Ok(());
        }
        let chart = charts.first().filter(|_| hooks.iter().any(Hook::is_chart));
        let mut chart_doc = None;
        let mut workbook = None;
        if let Some(chart) = chart {
            let data = target.read_bytes(&chart.part).await?;
            chart_doc = Some(XmlDocument::parse(&data).map_err(|e| OpcError::xml(chart.part.as_str(), e))?);
            if let Some(part) = &chart.workbook {
                workbook = Some(LinkedWorkbook::open(&target.read_bytes(part).await?).await?);
            }
        }

        {
            let root = target.load(slide).await?.root_mut();
            let Some(element) = root.at_mut(path) else {
                return Ok(());
            };
            for (index, hook) in hooks.iter_mut().enumerate() {
                let result = match hook {
                    Hook::Shape(h) => guarded(|| h.apply(element)),
                    Hook::Chart(h) => match chart_doc.as_mut() {
                        Some(doc) => guarded(|| h.apply(element, doc, workbook.as_mut())),
                        None => {
                            warn!("chart hook {} skipped: {} carries no chart", index, identity);
                            self.report
                                .skip(slide, Some(identity.clone()), SkipReason::NoChart { hook: index });
                            continue;
                        },
                    },
                };
                if let Err(message) = result {
                    warn!("hook {} failed on {} in {}: {}", index, identity, slide, message);
                    self.report.hook_failed(HookFailure {
                        index,
                        slide: slide.clone(),
                        element: Some(identity.clone()),
                        message,
                    });
                }
            }
        }

        if let (Some(chart), Some(doc)) = (chart, chart_doc) {
            target.commit_tree(&chart.part, doc).await?;
            if let (Some(part), Some(workbook)) = (&chart.workbook, workbook) {
                target.write_bytes(part, workbook.into_bytes().await?).await?;
            }
        }
        Ok(())
    }
}

/// Put `clone` into `root` and return its path.
fn place(
    root: &mut XmlElement,
    clone: XmlElement,
    placement: Placement,
    identity: &StableIdentity,
) -> Option<ElementPath> {
    match placement {
        Placement::Append => {
            let mut path = root.find_path(|el| el.is(SHAPE_TREE))?;
            let tree = root.at_mut(&path)?;
            tree.push_element(clone);
            path.push(tree.children().len() - 1);
            Some(path)
        },
        Placement::Replace => {
            let original = identity::locate(root, identity)?;
            let placed = root.insert_before(&original, clone)?;
            let mut shifted = original;
            if let Some(last) = shifted.last_mut() {
                *last += 1;
            }
            root.remove_at(&shifted);
            Some(placed)
        },
        Placement::Remove => None,
    }
}
