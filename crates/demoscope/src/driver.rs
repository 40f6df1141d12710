//! HarnessDriver - Abstract Browser Automation Boundary
//!
//! Everything the harness needs from a browser-automation backend, expressed
//! as one async trait. The harness components never talk to a browser
//! directly, so scenarios can run against Chromium (`CdpDriver`, feature
//! `browser`) or against the scripted in-memory [`MockDriver`].
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  HarnessDriver (trait)                                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────┐            ┌────────────────────┐     │
//! │  │  CdpDriver         │            │  MockDriver        │     │
//! │  │  chromiumoxide     │            │  scripted DOM      │     │
//! │  └────────────────────┘            └────────────────────┘     │
//! │  events ──► unbounded sinks (console / exception / dialog)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use crate::diagnostics::{ConsoleSeverity, DiagnosticEntry};
use crate::dialog::{Dialog, DialogResponse, DialogType};
use crate::locator::{Point, Selector};
use crate::result::{HarnessError, HarnessResult};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Element bounding box in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl BoundingBox {
    /// Create a new bounding box
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Center point
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Point-in-time state of one DOM element as reported by the driver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementState {
    /// Lower-case tag name
    pub tag_name: String,
    /// `textContent`
    #[serde(default)]
    pub text: String,
    /// Form control value, when the element has one
    #[serde(default)]
    pub value: Option<String>,
    /// Class list
    #[serde(default)]
    pub classes: Vec<String>,
    /// Attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Rendered and not hidden by style
    #[serde(default)]
    pub visible: bool,
    /// `disabled` property
    #[serde(default)]
    pub disabled: bool,
    /// `checked` property
    #[serde(default)]
    pub checked: bool,
    /// Bounding box if visible
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
}

impl ElementState {
    /// Whether the class list contains `class`
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Trimmed text content
    #[must_use]
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

/// Events pushed by the driver for the lifetime of a page
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// Console message or uncaught exception
    Diagnostic(DiagnosticEntry),
    /// Native modal dialog opened and is blocking the page
    DialogOpened(Dialog),
}

/// Receiver side of driver event delivery. Unbounded so nothing is dropped.
pub type EventSink = mpsc::UnboundedSender<DriverEvent>;

/// Abstract driver trait for browser automation
///
/// All methods take `&self`: a session's event pump answers dialogs while
/// the scenario is blocked inside an action on the same driver.
#[async_trait]
pub trait HarnessDriver: Send + Sync {
    /// Load a document
    async fn navigate(&self, url: &str) -> HarnessResult<()>;

    /// Current document URL
    async fn current_url(&self) -> HarnessResult<String>;

    /// First element matching the selector
    async fn query_selector(&self, selector: &Selector) -> HarnessResult<Option<ElementState>>;

    /// All elements matching the selector, in document order
    async fn query_selector_all(&self, selector: &Selector) -> HarnessResult<Vec<ElementState>>;

    /// Click the first matching element
    async fn click(&self, selector: &Selector) -> HarnessResult<()>;

    /// Double-click the first matching element
    async fn double_click(&self, selector: &Selector) -> HarnessResult<()>;

    /// Replace the value of a text control
    async fn fill(&self, selector: &Selector, text: &str) -> HarnessResult<()>;

    /// Select an `<option>` by value
    async fn select_option(&self, selector: &Selector, value: &str) -> HarnessResult<()>;

    /// Set a control's value directly and fire `input`/`change` (range sliders)
    async fn set_value(&self, selector: &Selector, value: &str) -> HarnessResult<()>;

    /// Set a checkbox/radio state
    async fn set_checked(&self, selector: &Selector, checked: bool) -> HarnessResult<()>;

    /// Focus the element and press a key (e.g. "Enter", "a")
    async fn press(&self, selector: &Selector, key: &str) -> HarnessResult<()>;

    /// Move the mouse pointer
    async fn mouse_move(&self, point: Point) -> HarnessResult<()>;

    /// Press the left mouse button at the current position
    async fn mouse_down(&self) -> HarnessResult<()>;

    /// Release the left mouse button at the current position
    async fn mouse_up(&self) -> HarnessResult<()>;

    /// Computed style property of the first matching element
    async fn computed_style(
        &self,
        selector: &Selector,
        property: &str,
    ) -> HarnessResult<Option<String>>;

    /// Run a script in the page and return its serializable result
    async fn evaluate(&self, script: &str) -> HarnessResult<serde_json::Value>;

    /// Forward all future page events to `sink`
    async fn subscribe(&self, sink: EventSink) -> HarnessResult<()>;

    /// Wait until every event the page emitted so far has reached the sinks
    async fn flush_events(&self) -> HarnessResult<()> {
        Ok(())
    }

    /// Close the currently open dialog with `response`
    async fn respond_to_dialog(&self, response: &DialogResponse) -> HarnessResult<()>;

    /// Release the page
    async fn close(&self) -> HarnessResult<()>;
}

// ============================================================================
// Mock driver
// ============================================================================

/// Element of the mock DOM
#[derive(Debug, Clone)]
pub struct MockElement {
    /// Selector strings this element answers to (aliases)
    pub selectors: Vec<String>,
    /// `data-testid`
    pub test_id: Option<String>,
    /// Element state reported to the harness
    pub state: ElementState,
    /// `<option>` values for select elements
    pub options: Vec<String>,
    /// Computed styles
    pub styles: BTreeMap<String, String>,
}

impl MockElement {
    /// Create a visible, enabled element
    #[must_use]
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            selectors: Vec::new(),
            test_id: None,
            state: ElementState {
                tag_name: tag_name.into(),
                visible: true,
                bounding_box: Some(BoundingBox::new(0.0, 0.0, 100.0, 20.0)),
                ..ElementState::default()
            },
            options: Vec::new(),
            styles: BTreeMap::new(),
        }
    }

    /// Answer to a selector string (e.g. "#start", ".bar")
    #[must_use]
    pub fn matching(mut self, selector: impl Into<String>) -> Self {
        self.selectors.push(selector.into());
        self
    }

    /// Set `data-testid`
    #[must_use]
    pub fn test_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        let _ = self
            .state
            .attributes
            .insert("data-testid".to_string(), id.clone());
        self.test_id = Some(id);
        self
    }

    /// Set text content
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.state.text = text.into();
        self
    }

    /// Set control value
    #[must_use]
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.state.value = Some(value.into());
        self
    }

    /// Add a class
    #[must_use]
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.state.classes.push(class.into());
        self
    }

    /// Set an attribute
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.state.attributes.insert(name.into(), value.into());
        self
    }

    /// Set a computed style
    #[must_use]
    pub fn style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.styles.insert(property.into(), value.into());
        self
    }

    /// Add `<option>` values (first option becomes the value)
    #[must_use]
    pub fn options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        if self.state.value.is_none() {
            self.state.value = self.options.first().cloned();
        }
        self
    }

    /// Mark disabled
    #[must_use]
    pub const fn disabled(mut self) -> Self {
        self.state.disabled = true;
        self
    }

    /// Mark hidden
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.state.visible = false;
        self.state.bounding_box = None;
        self
    }

    /// Place the element
    #[must_use]
    pub const fn at(mut self, bounding_box: BoundingBox) -> Self {
        self.state.bounding_box = Some(bounding_box);
        self
    }

    fn matches(&self, selector: &Selector) -> bool {
        match selector {
            Selector::Css(s) | Selector::XPath(s) => self.selectors.iter().any(|k| k == s),
            Selector::TestId(id) => self.test_id.as_deref() == Some(id.as_str()),
            Selector::Text(t) => self.state.text.contains(t.as_str()),
            Selector::CssWithText { css, text } => {
                self.selectors.iter().any(|k| k == css) && self.state.text.contains(text.as_str())
            }
        }
    }

    fn interactable(&self, selector: &Selector) -> HarnessResult<()> {
        let reason = if !self.state.visible {
            "element is hidden"
        } else if self.state.disabled {
            "element is disabled"
        } else {
            return Ok(());
        };
        Err(HarnessError::ElementNotInteractable {
            role: selector.to_string(),
            reason: reason.to_string(),
        })
    }
}

/// Scripted page-side effect applied by the mock
#[derive(Debug, Clone)]
pub enum MockEffect {
    /// Set text of every match
    SetText {
        /// Target elements
        target: Selector,
        /// New text
        text: String,
    },
    /// Set texts of matches in order
    SetTexts {
        /// Target elements
        target: Selector,
        /// New texts, one per match
        texts: Vec<String>,
    },
    /// Set value of every match
    SetValue {
        /// Target elements
        target: Selector,
        /// New value
        value: String,
    },
    /// Add a class to every match
    AddClass {
        /// Target elements
        target: Selector,
        /// Class name
        class: String,
    },
    /// Remove a class from every match
    RemoveClass {
        /// Target elements
        target: Selector,
        /// Class name
        class: String,
    },
    /// Enable or disable every match
    SetDisabled {
        /// Target elements
        target: Selector,
        /// Disabled flag
        disabled: bool,
    },
    /// Show or hide every match
    SetVisible {
        /// Target elements
        target: Selector,
        /// Visible flag
        visible: bool,
    },
    /// Emit a console message
    Console {
        /// Severity
        severity: ConsoleSeverity,
        /// Message text
        text: String,
    },
    /// Throw an uncaught exception
    Exception {
        /// Exception text (e.g. "ReferenceError: x is not defined")
        text: String,
    },
    /// Open a blocking native dialog
    Dialog {
        /// Dialog to open
        dialog: Dialog,
        /// Receives the prompt text when accepted with a value
        prompt_target: Option<Selector>,
        /// Effects after accept
        on_accept: Vec<MockEffect>,
        /// Effects after dismiss
        on_dismiss: Vec<MockEffect>,
    },
    /// Apply effects later, as a page timer would
    After {
        /// Delay
        delay: Duration,
        /// Effects to apply
        effects: Vec<MockEffect>,
    },
}

impl MockEffect {
    fn target(raw: &str) -> Selector {
        Selector::parse(raw).unwrap_or_else(|_| Selector::css(raw))
    }

    /// Set text of matches
    #[must_use]
    pub fn set_text(target: &str, text: impl Into<String>) -> Self {
        Self::SetText {
            target: Self::target(target),
            text: text.into(),
        }
    }

    /// Set texts of matches in order
    #[must_use]
    pub fn set_texts<I, S>(target: &str, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::SetTexts {
            target: Self::target(target),
            texts: texts.into_iter().map(Into::into).collect(),
        }
    }

    /// Set value of matches
    #[must_use]
    pub fn set_value(target: &str, value: impl Into<String>) -> Self {
        Self::SetValue {
            target: Self::target(target),
            value: value.into(),
        }
    }

    /// Add a class to matches
    #[must_use]
    pub fn add_class(target: &str, class: impl Into<String>) -> Self {
        Self::AddClass {
            target: Self::target(target),
            class: class.into(),
        }
    }

    /// Remove a class from matches
    #[must_use]
    pub fn remove_class(target: &str, class: impl Into<String>) -> Self {
        Self::RemoveClass {
            target: Self::target(target),
            class: class.into(),
        }
    }

    /// Enable/disable matches
    #[must_use]
    pub fn set_disabled(target: &str, disabled: bool) -> Self {
        Self::SetDisabled {
            target: Self::target(target),
            disabled,
        }
    }

    /// Show/hide matches
    #[must_use]
    pub fn set_visible(target: &str, visible: bool) -> Self {
        Self::SetVisible {
            target: Self::target(target),
            visible,
        }
    }

    /// Emit a console message
    #[must_use]
    pub fn console(severity: ConsoleSeverity, text: impl Into<String>) -> Self {
        Self::Console {
            severity,
            text: text.into(),
        }
    }

    /// Throw an uncaught exception
    #[must_use]
    pub fn exception(text: impl Into<String>) -> Self {
        Self::Exception { text: text.into() }
    }

    /// Open a dialog with no follow-up effects
    #[must_use]
    pub fn dialog(dialog: Dialog) -> Self {
        Self::Dialog {
            dialog,
            prompt_target: None,
            on_accept: Vec::new(),
            on_dismiss: Vec::new(),
        }
    }

    /// Open a prompt whose accepted text is written into `target`
    #[must_use]
    pub fn prompt_into(message: impl Into<String>, target: &str) -> Self {
        Self::Dialog {
            dialog: Dialog::new(DialogType::Prompt, message),
            prompt_target: Some(Self::target(target)),
            on_accept: Vec::new(),
            on_dismiss: Vec::new(),
        }
    }

    /// Apply effects after a delay
    #[must_use]
    pub fn after(delay: Duration, effects: Vec<MockEffect>) -> Self {
        Self::After { delay, effects }
    }
}

/// Bare selector text used in call history (`#start`, `testid=status`)
fn selector_key(selector: &Selector) -> String {
    String::from(selector.clone())
}

#[derive(Debug, Default)]
struct MockState {
    url: String,
    elements: Vec<MockElement>,
    on_navigate: Vec<MockEffect>,
    on_click: Vec<(Selector, Vec<MockEffect>)>,
    on_change: Vec<(Selector, Vec<MockEffect>)>,
    on_key: Vec<(Selector, String, Vec<MockEffect>)>,
    eval_results: HashMap<String, VecDeque<serde_json::Value>>,
    failing_urls: Vec<String>,
    sinks: Vec<EventSink>,
    pending_dialog: Option<oneshot::Sender<DialogResponse>>,
    mouse: Option<Point>,
    history: Vec<String>,
    event_latency: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    refuse_subscribers: bool,
}

impl MockState {
    fn matching_mut<'a>(
        &'a mut self,
        selector: &'a Selector,
    ) -> impl Iterator<Item = &'a mut MockElement> + 'a {
        self.elements.iter_mut().filter(move |e| e.matches(selector))
    }

    fn first(&self, selector: &Selector) -> HarnessResult<&MockElement> {
        self.elements
            .iter()
            .find(|e| e.matches(selector))
            .ok_or_else(|| HarnessError::ElementNotFound {
                role: selector.to_string(),
                selector: selector.to_string(),
            })
    }

    fn first_mut(&mut self, selector: &Selector) -> HarnessResult<&mut MockElement> {
        self.elements
            .iter_mut()
            .find(|e| e.matches(selector))
            .ok_or_else(|| HarnessError::ElementNotFound {
                role: selector.to_string(),
                selector: selector.to_string(),
            })
    }

    fn emit(&mut self, event: &DriverEvent) {
        let Some(latency) = self.event_latency else {
            self.sinks.retain(|sink| sink.send(event.clone()).is_ok());
            return;
        };
        let sinks = self.sinks.clone();
        let event = event.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let _ = in_flight.fetch_add(1, Ordering::SeqCst);
        drop(tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            for sink in sinks {
                let _ = sink.send(event.clone());
            }
            let _ = in_flight.fetch_sub(1, Ordering::SeqCst);
        }));
    }

    fn reactions(list: &[(Selector, Vec<MockEffect>)], selector: &Selector) -> Vec<MockEffect> {
        list.iter()
            .filter(|(key, _)| key == selector)
            .flat_map(|(_, effects)| effects.iter().cloned())
            .collect()
    }
}

/// Scripted in-memory driver for unit and integration tests
///
/// Cloning shares the same page, so a test can keep a handle for inspection
/// while a [`Session`](crate::Session) owns another.
#[derive(Debug, Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
    dialog_wait: Duration,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Create an empty page at `about:blank`
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                url: "about:blank".to_string(),
                ..MockState::default()
            })),
            dialog_wait: Duration::from_secs(5),
        }
    }

    /// How long an open dialog blocks before the action fails
    #[must_use]
    pub const fn with_dialog_wait(mut self, wait: Duration) -> Self {
        self.dialog_wait = wait;
        self
    }

    /// Deliver page events through a relay task after `latency`
    #[must_use]
    pub fn with_event_latency(self, latency: Duration) -> Self {
        self.state().event_latency = Some(latency);
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an element to the DOM
    pub fn add_element(&self, element: MockElement) {
        self.state().elements.push(element);
    }

    /// Remove every element matching `selector`
    pub fn remove_elements(&self, selector: &str) {
        let selector = MockEffect::target(selector);
        self.state().elements.retain(|e| !e.matches(&selector));
    }

    /// Effects applied after every navigation (load-time scripts)
    pub fn on_navigate(&self, effects: Vec<MockEffect>) {
        self.state().on_navigate.extend(effects);
    }

    /// Effects applied when an element matching `selector` is clicked
    pub fn on_click(&self, selector: &str, effects: Vec<MockEffect>) {
        self.state()
            .on_click
            .push((MockEffect::target(selector), effects));
    }

    /// Effects applied after fill/select/set_value/set_checked on `selector`
    pub fn on_change(&self, selector: &str, effects: Vec<MockEffect>) {
        self.state()
            .on_change
            .push((MockEffect::target(selector), effects));
    }

    /// Effects applied when `key` is pressed on `selector`
    pub fn on_key(&self, selector: &str, key: &str, effects: Vec<MockEffect>) {
        self.state()
            .on_key
            .push((MockEffect::target(selector), key.to_string(), effects));
    }

    /// Scripted `evaluate` results; the last one repeats once the queue drains
    pub fn set_eval_results<I>(&self, script: &str, results: I)
    where
        I: IntoIterator<Item = serde_json::Value>,
    {
        let _ = self
            .state()
            .eval_results
            .insert(script.to_string(), results.into_iter().collect());
    }

    /// Make navigation to `url` fail
    pub fn fail_navigation(&self, url: &str) {
        self.state().failing_urls.push(url.to_string());
    }

    /// Make every `subscribe` call fail
    pub fn refuse_subscribers(&self) {
        self.state().refuse_subscribers = true;
    }

    /// Snapshot of all elements matching `selector`
    #[must_use]
    pub fn elements(&self, selector: &str) -> Vec<ElementState> {
        let selector = MockEffect::target(selector);
        self.state()
            .elements
            .iter()
            .filter(|e| e.matches(&selector))
            .map(|e| e.state.clone())
            .collect()
    }

    /// Call history for verification
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state().history.clone()
    }

    /// Check if a method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.state().history.iter().any(|c| c.starts_with(method))
    }

    /// Whether a dialog is currently open
    #[must_use]
    pub fn has_open_dialog(&self) -> bool {
        self.state().pending_dialog.is_some()
    }

    /// Apply effects immediately, as if page script ran them
    ///
    /// # Errors
    ///
    /// Returns error if a scripted dialog is never answered
    pub async fn run_effects(&self, effects: Vec<MockEffect>) -> HarnessResult<()> {
        self.apply(effects).await
    }

    fn record(&self, call: String) {
        self.state().history.push(call);
    }

    fn apply(&self, effects: Vec<MockEffect>) -> BoxFuture<'_, HarnessResult<()>> {
        async move {
            for effect in effects {
                self.apply_one(effect).await?;
            }
            Ok(())
        }
        .boxed()
    }

    async fn apply_one(&self, effect: MockEffect) -> HarnessResult<()> {
        match effect {
            MockEffect::SetText { target, text } => {
                for el in self.state().matching_mut(&target) {
                    el.state.text.clone_from(&text);
                }
            }
            MockEffect::SetTexts { target, texts } => {
                let mut state = self.state();
                for (el, text) in state.matching_mut(&target).zip(texts) {
                    el.state.text = text;
                }
            }
            MockEffect::SetValue { target, value } => {
                for el in self.state().matching_mut(&target) {
                    el.state.value = Some(value.clone());
                }
            }
            MockEffect::AddClass { target, class } => {
                for el in self.state().matching_mut(&target) {
                    if !el.state.has_class(&class) {
                        el.state.classes.push(class.clone());
                    }
                }
            }
            MockEffect::RemoveClass { target, class } => {
                for el in self.state().matching_mut(&target) {
                    el.state.classes.retain(|c| c != &class);
                }
            }
            MockEffect::SetDisabled { target, disabled } => {
                for el in self.state().matching_mut(&target) {
                    el.state.disabled = disabled;
                }
            }
            MockEffect::SetVisible { target, visible } => {
                for el in self.state().matching_mut(&target) {
                    el.state.visible = visible;
                    el.state.bounding_box = if visible {
                        Some(BoundingBox::new(0.0, 0.0, 100.0, 20.0))
                    } else {
                        None
                    };
                }
            }
            MockEffect::Console { severity, text } => {
                let entry = DiagnosticEntry::console(severity, text);
                self.state().emit(&DriverEvent::Diagnostic(entry));
            }
            MockEffect::Exception { text } => {
                let entry = DiagnosticEntry::exception(text);
                self.state().emit(&DriverEvent::Diagnostic(entry));
            }
            MockEffect::Dialog {
                dialog,
                prompt_target,
                on_accept,
                on_dismiss,
            } => {
                let response = self.open_dialog(dialog).await?;
                match response {
                    DialogResponse::Dismiss => self.apply(on_dismiss).await?,
                    DialogResponse::Accept => self.apply(on_accept).await?,
                    DialogResponse::AcceptWith(text) => {
                        if let Some(target) = prompt_target {
                            for el in self.state().matching_mut(&target) {
                                el.state.text.clone_from(&text);
                            }
                        }
                        self.apply(on_accept).await?;
                    }
                }
            }
            MockEffect::After { delay, effects } => {
                let driver = self.clone();
                drop(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = driver.apply(effects).await {
                        tracing::warn!(error = %e, "mock timer effects failed");
                    }
                }));
            }
        }
        Ok(())
    }

    /// Block like a native dialog until `respond_to_dialog` is called
    async fn open_dialog(&self, dialog: Dialog) -> HarnessResult<DialogResponse> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state();
            if state.pending_dialog.is_some() {
                return Err(HarnessError::driver("a dialog is already open"));
            }
            state.pending_dialog = Some(tx);
            state
                .history
                .push(format!("dialog:{}:{}", dialog.dialog_type(), dialog.message()));
            state.emit(&DriverEvent::DialogOpened(dialog));
        }

        match tokio::time::timeout(self.dialog_wait, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(HarnessError::driver("dialog handler dropped")),
            Err(_) => {
                self.state().pending_dialog = None;
                Err(HarnessError::driver(format!(
                    "dialog left open for {}ms",
                    self.dialog_wait.as_millis()
                )))
            }
        }
    }

    async fn change(&self, selector: &Selector, call: String) -> HarnessResult<()> {
        self.record(call);
        let effects = MockState::reactions(&self.state().on_change, selector);
        self.apply(effects).await
    }
}

#[async_trait]
impl HarnessDriver for MockDriver {
    async fn navigate(&self, url: &str) -> HarnessResult<()> {
        let effects = {
            let mut state = self.state();
            state.history.push(format!("navigate:{url}"));
            if state.failing_urls.iter().any(|u| u == url) {
                return Err(HarnessError::Navigation {
                    url: url.to_string(),
                    message: "net::ERR_CONNECTION_REFUSED".to_string(),
                });
            }
            state.url = url.to_string();
            state.on_navigate.clone()
        };
        self.apply(effects).await
    }

    async fn current_url(&self) -> HarnessResult<String> {
        Ok(self.state().url.clone())
    }

    async fn query_selector(&self, selector: &Selector) -> HarnessResult<Option<ElementState>> {
        Ok(self
            .state()
            .elements
            .iter()
            .find(|e| e.matches(selector))
            .map(|e| e.state.clone()))
    }

    async fn query_selector_all(&self, selector: &Selector) -> HarnessResult<Vec<ElementState>> {
        Ok(self
            .state()
            .elements
            .iter()
            .filter(|e| e.matches(selector))
            .map(|e| e.state.clone())
            .collect())
    }

    async fn click(&self, selector: &Selector) -> HarnessResult<()> {
        let effects = {
            let mut state = self.state();
            state.first(selector)?.interactable(selector)?;
            state.history.push(format!("click:{}", selector_key(selector)));
            MockState::reactions(&state.on_click, selector)
        };
        self.apply(effects).await
    }

    async fn double_click(&self, selector: &Selector) -> HarnessResult<()> {
        self.click(selector).await?;
        self.record(format!("double_click:{}", selector_key(selector)));
        self.click(selector).await
    }

    async fn fill(&self, selector: &Selector, text: &str) -> HarnessResult<()> {
        {
            let mut state = self.state();
            let el = state.first_mut(selector)?;
            el.interactable(selector)?;
            el.state.value = Some(text.to_string());
        }
        self.change(selector, format!("fill:{}:{text}", selector_key(selector))).await
    }

    async fn select_option(&self, selector: &Selector, value: &str) -> HarnessResult<()> {
        {
            let mut state = self.state();
            let el = state.first_mut(selector)?;
            el.interactable(selector)?;
            if !el.options.iter().any(|o| o == value) {
                return Err(HarnessError::driver(format!(
                    "no option with value '{value}' in {selector}"
                )));
            }
            el.state.value = Some(value.to_string());
        }
        self.change(selector, format!("select:{}:{value}", selector_key(selector)))
            .await
    }

    async fn set_value(&self, selector: &Selector, value: &str) -> HarnessResult<()> {
        {
            let mut state = self.state();
            let el = state.first_mut(selector)?;
            el.interactable(selector)?;
            el.state.value = Some(value.to_string());
        }
        self.change(selector, format!("set_value:{}:{value}", selector_key(selector)))
            .await
    }

    async fn set_checked(&self, selector: &Selector, checked: bool) -> HarnessResult<()> {
        {
            let mut state = self.state();
            let el = state.first_mut(selector)?;
            el.interactable(selector)?;
            el.state.checked = checked;
        }
        self.change(selector, format!("set_checked:{}:{checked}", selector_key(selector)))
            .await
    }

    async fn press(&self, selector: &Selector, key: &str) -> HarnessResult<()> {
        let effects = {
            let mut state = self.state();
            state.first(selector)?.interactable(selector)?;
            state.history.push(format!("press:{}:{key}", selector_key(selector)));
            state
                .on_key
                .iter()
                .filter(|(s, k, _)| s == selector && k == key)
                .flat_map(|(_, _, effects)| effects.iter().cloned())
                .collect::<Vec<_>>()
        };
        self.apply(effects).await
    }

    async fn mouse_move(&self, point: Point) -> HarnessResult<()> {
        let mut state = self.state();
        state.mouse = Some(point);
        state
            .history
            .push(format!("mouse_move:{:.0},{:.0}", point.x, point.y));
        Ok(())
    }

    async fn mouse_down(&self) -> HarnessResult<()> {
        let mut state = self.state();
        let point = state.mouse.unwrap_or(Point::new(0.0, 0.0));
        state
            .history
            .push(format!("mouse_down:{:.0},{:.0}", point.x, point.y));
        Ok(())
    }

    async fn mouse_up(&self) -> HarnessResult<()> {
        let mut state = self.state();
        let point = state.mouse.unwrap_or(Point::new(0.0, 0.0));
        state
            .history
            .push(format!("mouse_up:{:.0},{:.0}", point.x, point.y));
        Ok(())
    }

    async fn computed_style(
        &self,
        selector: &Selector,
        property: &str,
    ) -> HarnessResult<Option<String>> {
        Ok(self
            .state()
            .elements
            .iter()
            .find(|e| e.matches(selector))
            .and_then(|e| e.styles.get(property).cloned()))
    }

    async fn evaluate(&self, script: &str) -> HarnessResult<serde_json::Value> {
        let mut state = self.state();
        state.history.push(format!("evaluate:{script}"));
        let queue = state
            .eval_results
            .get_mut(script)
            .ok_or_else(|| HarnessError::script(format!("no scripted result for `{script}`")))?;
        let value = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        Ok(value.unwrap_or(serde_json::Value::Null))
    }

    async fn subscribe(&self, sink: EventSink) -> HarnessResult<()> {
        let mut state = self.state();
        if state.refuse_subscribers {
            return Err(HarnessError::driver("page refused event subscription"));
        }
        state.sinks.push(sink);
        Ok(())
    }

    async fn flush_events(&self) -> HarnessResult<()> {
        let in_flight = {
            let mut state = self.state();
            state.history.push("flush_events".to_string());
            Arc::clone(&state.in_flight)
        };
        while in_flight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        Ok(())
    }

    async fn respond_to_dialog(&self, response: &DialogResponse) -> HarnessResult<()> {
        let sender = {
            let mut state = self.state();
            state.history.push(format!("respond_to_dialog:{response}"));
            state.pending_dialog.take()
        };
        let sender = sender.ok_or_else(|| HarnessError::driver("no dialog is open"))?;
        sender
            .send(response.clone())
            .map_err(|_| HarnessError::driver("dialog was already closed"))
    }

    async fn close(&self) -> HarnessResult<()> {
        let mut state = self.state();
        state.history.push("close".to_string());
        state.sinks.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod element_state_tests {
        use super::*;

        #[test]
        fn test_has_class() {
            let state = MockElement::new("div").class("bar").class("sorted").state;
            assert!(state.has_class("sorted"));
            assert!(!state.has_class("sort"));
        }

        #[test]
        fn test_bounding_box_center() {
            let bbox = BoundingBox::new(10.0, 20.0, 100.0, 40.0);
            assert_eq!(bbox.center(), Point::new(60.0, 40.0));
        }

        #[test]
        fn test_element_state_deserializes_with_defaults() {
            let state: ElementState =
                serde_json::from_str(r#"{"tag_name": "button", "visible": true}"#).unwrap();
            assert_eq!(state.tag_name, "button");
            assert!(state.classes.is_empty());
            assert!(state.value.is_none());
        }
    }

    mod mock_element_tests {
        use super::*;

        #[test]
        fn test_matching_by_alias() {
            let el = MockElement::new("button").matching("#start").matching("button");
            assert!(el.matches(&Selector::css("#start")));
            assert!(el.matches(&Selector::css("button")));
            assert!(!el.matches(&Selector::css("#stop")));
        }

        #[test]
        fn test_matching_by_test_id_and_text() {
            let el = MockElement::new("span").test_id("status").text("Sorted!");
            assert!(el.matches(&Selector::test_id("status")));
            assert!(el.matches(&Selector::text("Sorted")));
            assert_eq!(el.state.attributes["data-testid"], "status");
        }

        #[test]
        fn test_options_set_initial_value() {
            let el = MockElement::new("select").options(["50", "200", "500"]);
            assert_eq!(el.state.value.as_deref(), Some("50"));
        }

        #[test]
        fn test_interactable() {
            let sel = Selector::css("#b");
            assert!(MockElement::new("button").interactable(&sel).is_ok());
            assert!(matches!(
                MockElement::new("button").disabled().interactable(&sel),
                Err(HarnessError::ElementNotInteractable { .. })
            ));
            assert!(matches!(
                MockElement::new("button").hidden().interactable(&sel),
                Err(HarnessError::ElementNotInteractable { .. })
            ));
        }
    }

    mod mock_driver_tests {
        use super::*;

        #[tokio::test]
        async fn test_navigate_records_history() {
            let driver = MockDriver::new();
            driver.navigate("file:///demo/index.html").await.unwrap();
            assert_eq!(
                driver.current_url().await.unwrap(),
                "file:///demo/index.html"
            );
            assert!(driver.was_called("navigate"));
        }

        #[tokio::test]
        async fn test_navigate_failure() {
            let driver = MockDriver::new();
            driver.fail_navigation("http://localhost:1/");
            let err = driver.navigate("http://localhost:1/").await.unwrap_err();
            assert!(matches!(err, HarnessError::Navigation { .. }));
        }

        #[tokio::test]
        async fn test_click_applies_effects() {
            let driver = MockDriver::new();
            driver.add_element(MockElement::new("button").matching("#push"));
            driver.add_element(MockElement::new("div").matching("#top").text("empty"));
            driver.on_click("#push", vec![MockEffect::set_text("#top", "42")]);

            driver.click(&Selector::css("#push")).await.unwrap();
            assert_eq!(driver.elements("#top")[0].text, "42");
        }

        #[tokio::test]
        async fn test_click_missing_element() {
            let driver = MockDriver::new();
            let err = driver.click(&Selector::css("#nope")).await.unwrap_err();
            assert!(matches!(err, HarnessError::ElementNotFound { .. }));
        }

        #[tokio::test]
        async fn test_select_option_rejects_unknown_value() {
            let driver = MockDriver::new();
            driver.add_element(
                MockElement::new("select")
                    .matching("#speedControl")
                    .options(["50", "200", "500"]),
            );
            let sel = Selector::css("#speedControl");
            driver.select_option(&sel, "500").await.unwrap();
            assert_eq!(
                driver.query_selector(&sel).await.unwrap().unwrap().value,
                Some("500".to_string())
            );
            assert!(driver.select_option(&sel, "9000").await.is_err());
        }

        #[tokio::test]
        async fn test_fill_passes_value_unmodified() {
            let driver = MockDriver::new();
            driver.add_element(MockElement::new("input").matching("#value"));
            let sel = Selector::css("#value");
            driver.fill(&sel, "  -12abc ").await.unwrap();
            assert_eq!(
                driver.elements("#value")[0].value.as_deref(),
                Some("  -12abc ")
            );
        }

        #[tokio::test]
        async fn test_evaluate_queue_repeats_last() {
            let driver = MockDriver::new();
            driver.set_eval_results(
                "window.done",
                [serde_json::json!(false), serde_json::json!(true)],
            );
            assert_eq!(
                driver.evaluate("window.done").await.unwrap(),
                serde_json::json!(false)
            );
            assert_eq!(
                driver.evaluate("window.done").await.unwrap(),
                serde_json::json!(true)
            );
            assert_eq!(
                driver.evaluate("window.done").await.unwrap(),
                serde_json::json!(true)
            );
            assert!(driver.evaluate("window.other").await.is_err());
        }

        #[tokio::test]
        async fn test_events_reach_subscribers() {
            let driver = MockDriver::new();
            let (tx, mut rx) = mpsc::unbounded_channel();
            driver.subscribe(tx).await.unwrap();
            driver
                .run_effects(vec![
                    MockEffect::console(ConsoleSeverity::Log, "hello"),
                    MockEffect::exception("ReferenceError: foo is not defined"),
                ])
                .await
                .unwrap();

            let first = rx.recv().await.unwrap();
            let second = rx.recv().await.unwrap();
            assert!(matches!(first, DriverEvent::Diagnostic(ref e) if e.text == "hello"));
            assert!(
                matches!(second, DriverEvent::Diagnostic(ref e) if e.text.contains("ReferenceError"))
            );
        }

        #[tokio::test]
        async fn test_unanswered_dialog_fails_action() {
            let driver = MockDriver::new().with_dialog_wait(Duration::from_millis(20));
            driver.add_element(MockElement::new("button").matching("#pop"));
            driver.on_click("#pop", vec![MockEffect::dialog(Dialog::alert("Stack empty"))]);

            let err = driver.click(&Selector::css("#pop")).await.unwrap_err();
            assert!(err.to_string().contains("dialog left open"));
            assert!(!driver.has_open_dialog());
        }

        #[tokio::test]
        async fn test_respond_without_dialog_fails() {
            let driver = MockDriver::new();
            assert!(driver
                .respond_to_dialog(&DialogResponse::Accept)
                .await
                .is_err());
        }

        #[tokio::test]
        async fn test_mouse_primitives_recorded() {
            let driver = MockDriver::new();
            driver.mouse_move(Point::new(10.0, 20.0)).await.unwrap();
            driver.mouse_down().await.unwrap();
            driver.mouse_move(Point::new(30.0, 40.0)).await.unwrap();
            driver.mouse_up().await.unwrap();
            assert_eq!(
                driver.history(),
                vec![
                    "mouse_move:10,20",
                    "mouse_down:10,20",
                    "mouse_move:30,40",
                    "mouse_up:30,40"
                ]
            );
        }

        #[tokio::test]
        async fn test_flush_waits_for_relayed_events() {
            let driver = MockDriver::new().with_event_latency(Duration::from_millis(30));
            let (tx, mut rx) = mpsc::unbounded_channel();
            driver.subscribe(tx).await.unwrap();
            driver
                .run_effects(vec![MockEffect::console(ConsoleSeverity::Error, "late")])
                .await
                .unwrap();
            assert!(rx.try_recv().is_err());

            driver.flush_events().await.unwrap();
            let event = rx.try_recv().unwrap();
            assert!(matches!(event, DriverEvent::Diagnostic(ref e) if e.text == "late"));
            assert!(driver.was_called("flush_events"));
        }

        #[tokio::test]
        async fn test_close_drops_sinks() {
            let driver = MockDriver::new();
            let (tx, mut rx) = mpsc::unbounded_channel();
            driver.subscribe(tx).await.unwrap();
            driver.close().await.unwrap();
            assert!(rx.recv().await.is_none());
        }
    }
}
