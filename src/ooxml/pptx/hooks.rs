//! User callbacks run against transplanted elements.
//!
//! Hooks run after the clone is placed and before the owning part is
//! committed. A hook that returns an error or panics is recorded and the
//! remaining hooks still run; composition itself never sees the failure.

use crate::common::xml::{XmlDocument, XmlElement};
use crate::ooxml::pptx::workbook::LinkedWorkbook;
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

pub type HookError = Box<dyn std::error::Error + Send + Sync>;
pub type HookResult = Result<(), HookError>;

/// Callback over a placed element.
pub trait ShapeHook {
    fn apply(&mut self, element: &mut XmlElement) -> HookResult;
}

impl<F> ShapeHook for F
where
    F: FnMut(&mut XmlElement) -> HookResult,
{
    fn apply(&mut self, element: &mut XmlElement) -> HookResult {
        self(element)
    }
}

/// Callback over a placed chart frame, its chart part and the chart's
/// embedded workbook when it has one.
pub trait ChartHook {
    fn apply(
        &mut self,
        element: &mut XmlElement,
        chart: &mut XmlDocument,
        workbook: Option<&mut LinkedWorkbook>,
    ) -> HookResult;
}

impl<F> ChartHook for F
where
    F: FnMut(&mut XmlElement, &mut XmlDocument, Option<&mut LinkedWorkbook>) -> HookResult,
{
    fn apply(
        &mut self,
        element: &mut XmlElement,
        chart: &mut XmlDocument,
        workbook: Option<&mut LinkedWorkbook>,
    ) -> HookResult {
        self(element, chart, workbook)
    }
}

/// One entry of an ordered hook list.
pub enum Hook {
    Shape(Box<dyn ShapeHook>),
    /// Skipped when the transplanted element carries no chart.
    Chart(Box<dyn ChartHook>),
}

impl Hook {
    pub fn shape<F>(f: F) -> Self
    where
        F: FnMut(&mut XmlElement) -> HookResult + 'static,
    {
        Hook::Shape(Box::new(f))
    }

    pub fn chart<F>(f: F) -> Self
    where
        F: FnMut(&mut XmlElement, &mut XmlDocument, Option<&mut LinkedWorkbook>) -> HookResult
            + 'static,
    {
        Hook::Chart(Box::new(f))
    }

    pub fn is_chart(&self) -> bool {
        matches!(self, Hook::Chart(_))
    }
}

impl std::fmt::Debug for Hook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hook::Shape(_) => f.write_str("Hook::Shape"),
            Hook::Chart(_) => f.write_str("Hook::Chart"),
        }
    }
}

/// Run `f`, turning an error or a panic into a message.
pub(crate) fn guarded<F>(f: F) -> Result<(), String>
where
    F: FnOnce() -> HookResult,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
