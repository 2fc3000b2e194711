//! What a composition run did besides its edits.
//!
//! Lookup misses and failing hooks do not abort composition; they land here
//! so a driver can inspect them afterwards. Every relationship attribute the
//! transplanter writes is tracked as well.

use crate::ooxml::opc::PackURI;
use crate::ooxml::pptx::identity::StableIdentity;

/// An operation that was skipped instead of applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    /// Slide the operation addressed
    pub slide: PackURI,
    pub identity: Option<StableIdentity>,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The element was not found where it had to be located
    ElementNotFound,
    /// The source element carries no name and no creation id
    NoIdentity,
    /// A companion reference points at a relationship that does not exist
    DanglingReference { r_id: String },
    /// An external hyperlink was dropped by configuration
    ExternalHyperlinkDropped { target: String },
    /// A chart hook was not run because the placed element has no chart
    NoChart { hook: usize },
}

/// A user hook that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookFailure {
    /// Position of the hook in its list
    pub index: usize,
    pub slide: PackURI,
    pub element: Option<StableIdentity>,
    pub message: String,
}

/// A relationship attribute written into a target part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedRelation {
    /// Part whose markup carries the attribute
    pub part: PackURI,
    /// Element tag and attribute, e.g. `c:chart` / `r:id`
    pub tag: String,
    pub attribute: String,
    pub r_id: String,
    /// Target as registered in the part's relationship table
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComposeReport {
    skipped: Vec<Skipped>,
    hook_failures: Vec<HookFailure>,
    relations: Vec<TrackedRelation>,
}

impl ComposeReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(&mut self, slide: &PackURI, identity: Option<StableIdentity>, reason: SkipReason) {
        self.skipped.push(Skipped {
            slide: slide.clone(),
            identity,
            reason,
        });
    }

    pub fn hook_failed(&mut self, failure: HookFailure) {
        self.hook_failures.push(failure);
    }

    pub fn track_relation(&mut self, relation: TrackedRelation) {
        self.relations.push(relation);
    }

    pub fn skipped(&self) -> &[Skipped] {
        &self.skipped
    }

    pub fn hook_failures(&self) -> &[HookFailure] {
        &self.hook_failures
    }

    pub fn relations(&self) -> &[TrackedRelation] {
        &self.relations
    }

    /// True when nothing was skipped and every hook succeeded.
    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.hook_failures.is_empty()
    }

    pub fn merge(&mut self, other: ComposeReport) {
        self.skipped.extend(other.skipped);
        self.hook_failures.extend(other.hook_failures);
        self.relations.extend(other.relations);
    }
}
