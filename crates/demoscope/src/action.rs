//! Action Dispatcher
//!
//! Performs user-level interactions on roles. Each call resolves the role
//! through the page's registry, so the element is looked up fresh every time.
//! Values are passed through unmodified: invalid input is how page-side
//! validation gets exercised.
//!
//! Actions return once the synchronous DOM effect has been delivered. Timers
//! and animations started by the page are not awaited; follow an action with
//! a polling read when the outcome is asynchronous.

use crate::driver::HarnessDriver;
use crate::locator::{Locator, Point};
use crate::page_object::PageObject;
use crate::result::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Default number of intermediate pointer moves for a drag
pub const DEFAULT_DRAG_STEPS: u32 = 10;

/// Where a drag ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DragTarget {
    /// Center of another role's element
    Role(String),
    /// Absolute page coordinates
    Point {
        /// X coordinate
        x: f64,
        /// Y coordinate
        y: f64,
    },
}

impl DragTarget {
    /// Drag onto a role
    #[must_use]
    pub fn role(name: impl Into<String>) -> Self {
        Self::Role(name.into())
    }

    /// Drag to coordinates
    #[must_use]
    pub const fn point(x: f64, y: f64) -> Self {
        Self::Point { x, y }
    }
}

/// Dispatches interactions for one session
#[derive(Clone)]
pub struct ActionDispatcher {
    driver: Arc<dyn HarnessDriver>,
    page: Arc<PageObject>,
    drag_steps: u32,
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("page", &self.page.display_name())
            .field("drag_steps", &self.drag_steps)
            .finish_non_exhaustive()
    }
}

impl ActionDispatcher {
    /// Create a dispatcher over a driver and page
    #[must_use]
    pub fn new(driver: Arc<dyn HarnessDriver>, page: Arc<PageObject>) -> Self {
        Self {
            driver,
            page,
            drag_steps: DEFAULT_DRAG_STEPS,
        }
    }

    /// Number of intermediate moves used by [`Self::drag`]
    #[must_use]
    pub fn with_drag_steps(mut self, steps: u32) -> Self {
        self.drag_steps = steps.max(1);
        self
    }

    fn locate(&self, role: &str) -> HarnessResult<Locator> {
        self.page.locate(role)
    }

    /// Click a role
    pub async fn click(&self, role: &str) -> HarnessResult<()> {
        let locator = self.locate(role)?;
        debug!(role, selector = %locator.selector(), "click");
        self.driver
            .click(locator.selector())
            .await
            .map_err(|e| e.with_role(role))
    }

    /// Double-click a role
    pub async fn double_click(&self, role: &str) -> HarnessResult<()> {
        let locator = self.locate(role)?;
        debug!(role, selector = %locator.selector(), "double_click");
        self.driver
            .double_click(locator.selector())
            .await
            .map_err(|e| e.with_role(role))
    }

    /// Replace a text control's value
    pub async fn fill(&self, role: &str, text: &str) -> HarnessResult<()> {
        let locator = self.locate(role)?;
        debug!(role, text, "fill");
        self.driver
            .fill(locator.selector(), text)
            .await
            .map_err(|e| e.with_role(role))
    }

    /// Select an option by value
    pub async fn select_option(&self, role: &str, value: &str) -> HarnessResult<()> {
        let locator = self.locate(role)?;
        debug!(role, value, "select_option");
        self.driver
            .select_option(locator.selector(), value)
            .await
            .map_err(|e| e.with_role(role))
    }

    /// Press a key with the role focused
    pub async fn press(&self, role: &str, key: &str) -> HarnessResult<()> {
        let locator = self.locate(role)?;
        debug!(role, key, "press");
        self.driver
            .press(locator.selector(), key)
            .await
            .map_err(|e| e.with_role(role))
    }

    /// Set a range slider's value
    pub async fn set_range(&self, role: &str, value: &str) -> HarnessResult<()> {
        let locator = self.locate(role)?;
        debug!(role, value, "set_range");
        self.driver
            .set_value(locator.selector(), value)
            .await
            .map_err(|e| e.with_role(role))
    }

    /// Check or uncheck a checkbox/radio
    pub async fn check(&self, role: &str, checked: bool) -> HarnessResult<()> {
        let locator = self.locate(role)?;
        debug!(role, checked, "check");
        self.driver
            .set_checked(locator.selector(), checked)
            .await
            .map_err(|e| e.with_role(role))
    }

    async fn center_of(&self, role: &str) -> HarnessResult<Point> {
        let locator = self.locate(role)?;
        let element = self
            .driver
            .query_selector(locator.selector())
            .await?
            .ok_or_else(|| locator.not_found())?;
        element
            .bounding_box
            .filter(|_| element.visible)
            .map(|bbox| bbox.center())
            .ok_or_else(|| HarnessError::ElementNotInteractable {
                role: role.to_string(),
                reason: "element has no layout box".to_string(),
            })
    }

    /// Drag a role's element to another role or a point
    ///
    /// Pointer down at the source center, `drag_steps` interpolated moves,
    /// pointer up at the destination.
    pub async fn drag(&self, role: &str, target: &DragTarget) -> HarnessResult<()> {
        let from = self.center_of(role).await?;
        let to = match target {
            DragTarget::Role(other) => self.center_of(other).await?,
            DragTarget::Point { x, y } => Point::new(*x, *y),
        };
        debug!(role, ?target, steps = self.drag_steps, "drag");

        self.driver.mouse_move(from).await?;
        self.driver.mouse_down().await?;
        for step in 1..=self.drag_steps {
            let t = f64::from(step) / f64::from(self.drag_steps);
            self.driver.mouse_move(from.lerp(&to, t)).await?;
        }
        self.driver.mouse_up().await
    }
}
