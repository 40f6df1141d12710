//! Dialog Mediator
//!
//! Native dialogs (alert, confirm, prompt, beforeunload) block the page until
//! answered. A scenario arms a one-shot [`DialogExpectation`] with the
//! response to give *before* performing the action that triggers the dialog:
//!
//! ```text
//!   arm(Accept) ──► Armed ──(dialog opens)──► Fired ──(fired().await)──► Consumed
//!                     │
//!                     └──(dropped / timed out)──► Abandoned
//! ```
//!
//! Armed expectations answer dialogs in FIFO order, one dialog each. A dialog
//! that arrives with nothing armed is dismissed so the page does not stall,
//! and is recorded as unexpected so session teardown fails.

use crate::result::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// Type of browser dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogType {
    /// Alert dialog (OK button only)
    Alert,
    /// Confirm dialog (OK/Cancel buttons)
    Confirm,
    /// Prompt dialog (text input + OK/Cancel)
    Prompt,
    /// Before unload dialog (Leave/Stay buttons)
    #[serde(rename = "beforeunload")]
    BeforeUnload,
}

impl fmt::Display for DialogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alert => write!(f, "alert"),
            Self::Confirm => write!(f, "confirm"),
            Self::Prompt => write!(f, "prompt"),
            Self::BeforeUnload => write!(f, "beforeunload"),
        }
    }
}

impl DialogType {
    /// Parse the protocol name of a dialog type; unknown names are alerts
    #[must_use]
    pub fn from_protocol(s: &str) -> Self {
        match s {
            "confirm" => Self::Confirm,
            "prompt" => Self::Prompt,
            "beforeunload" => Self::BeforeUnload,
            _ => Self::Alert,
        }
    }
}

/// Response given to a dialog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogResponse {
    /// OK/Yes/Leave
    Accept,
    /// OK with prompt text
    AcceptWith(String),
    /// Cancel/No/Stay
    Dismiss,
}

impl DialogResponse {
    /// Whether the dialog is accepted
    #[must_use]
    pub const fn accepts(&self) -> bool {
        !matches!(self, Self::Dismiss)
    }

    /// Prompt text to send, if any
    #[must_use]
    pub fn prompt_text(&self) -> Option<&str> {
        match self {
            Self::AcceptWith(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for DialogResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::AcceptWith(text) => write!(f, "accept({text:?})"),
            Self::Dismiss => write!(f, "dismiss"),
        }
    }
}

/// A dialog as reported by the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialog {
    dialog_type: DialogType,
    message: String,
    default_value: Option<String>,
}

impl Dialog {
    /// Create a new dialog
    #[must_use]
    pub fn new(dialog_type: DialogType, message: impl Into<String>) -> Self {
        Self {
            dialog_type,
            message: message.into(),
            default_value: None,
        }
    }

    /// Create an alert dialog
    #[must_use]
    pub fn alert(message: impl Into<String>) -> Self {
        Self::new(DialogType::Alert, message)
    }

    /// Create a confirm dialog
    #[must_use]
    pub fn confirm(message: impl Into<String>) -> Self {
        Self::new(DialogType::Confirm, message)
    }

    /// Create a prompt dialog
    #[must_use]
    pub fn prompt(message: impl Into<String>, default: Option<String>) -> Self {
        let mut dialog = Self::new(DialogType::Prompt, message);
        dialog.default_value = default;
        dialog
    }

    /// Create a beforeunload dialog
    #[must_use]
    pub fn before_unload(message: impl Into<String>) -> Self {
        Self::new(DialogType::BeforeUnload, message)
    }

    /// Get dialog type
    #[must_use]
    pub fn dialog_type(&self) -> DialogType {
        self.dialog_type
    }

    /// Get dialog message
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get default value (for prompts)
    #[must_use]
    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }
}

/// A dialog and how it was answered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandledDialog {
    /// The dialog
    pub dialog: Dialog,
    /// Response sent to the page
    pub response: DialogResponse,
    /// Whether an armed expectation answered it
    pub expected: bool,
}

impl fmt::Display for HandledDialog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} -> {}{}",
            self.dialog.dialog_type(),
            self.dialog.message(),
            self.response,
            if self.expected { "" } else { " (unexpected)" }
        )
    }
}

/// Lifecycle of one expectation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectationState {
    /// Waiting for a dialog
    Armed,
    /// A dialog was answered with the armed response
    Fired,
    /// The scenario has observed the fired dialog
    Consumed,
    /// Dropped or timed out before any dialog appeared
    Abandoned,
}

#[derive(Debug)]
struct Slot {
    id: u64,
    response: DialogResponse,
    state: Arc<Mutex<ExpectationState>>,
    notify: oneshot::Sender<Dialog>,
}

#[derive(Debug, Default)]
struct MediatorState {
    armed: VecDeque<Slot>,
    handled: Vec<HandledDialog>,
    next_id: u64,
}

/// Routes page dialogs to armed expectations
#[derive(Debug, Clone, Default)]
pub struct DialogMediator {
    inner: Arc<Mutex<MediatorState>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DialogMediator {
    /// Create a mediator with nothing armed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot expectation answered with `response`
    #[must_use]
    pub fn arm(&self, response: DialogResponse) -> DialogExpectation {
        let (tx, rx) = oneshot::channel();
        let state = Arc::new(Mutex::new(ExpectationState::Armed));
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.armed.push_back(Slot {
            id,
            response: response.clone(),
            state: Arc::clone(&state),
            notify: tx,
        });
        tracing::debug!(id, %response, "dialog expectation armed");
        DialogExpectation {
            id,
            response,
            state,
            receiver: Some(rx),
            mediator: self.clone(),
        }
    }

    /// Decide the response for a dialog that just opened
    ///
    /// Pops the oldest armed expectation. With nothing armed the dialog is
    /// dismissed and recorded as unexpected.
    pub fn on_dialog(&self, dialog: Dialog) -> DialogResponse {
        let mut inner = lock(&self.inner);
        let Some(slot) = inner.armed.pop_front() else {
            tracing::warn!(
                dialog_type = %dialog.dialog_type(),
                message = dialog.message(),
                "unexpected dialog dismissed"
            );
            inner.handled.push(HandledDialog {
                dialog,
                response: DialogResponse::Dismiss,
                expected: false,
            });
            return DialogResponse::Dismiss;
        };

        *lock(&slot.state) = ExpectationState::Fired;
        tracing::debug!(
            id = slot.id,
            dialog_type = %dialog.dialog_type(),
            response = %slot.response,
            "dialog answered"
        );
        inner.handled.push(HandledDialog {
            dialog: dialog.clone(),
            response: slot.response.clone(),
            expected: true,
        });
        let _ = slot.notify.send(dialog);
        slot.response
    }

    fn abandon(&self, id: u64) {
        lock(&self.inner).armed.retain(|slot| slot.id != id);
    }

    /// Number of expectations still waiting
    #[must_use]
    pub fn armed_count(&self) -> usize {
        lock(&self.inner).armed.len()
    }

    /// Every dialog seen so far, in order
    #[must_use]
    pub fn handled(&self) -> Vec<HandledDialog> {
        lock(&self.inner).handled.clone()
    }

    /// Dialogs that arrived with nothing armed
    #[must_use]
    pub fn unexpected(&self) -> Vec<HandledDialog> {
        lock(&self.inner)
            .handled
            .iter()
            .filter(|h| !h.expected)
            .cloned()
            .collect()
    }
}

/// One-shot handle for an armed dialog response
#[derive(Debug)]
pub struct DialogExpectation {
    id: u64,
    response: DialogResponse,
    state: Arc<Mutex<ExpectationState>>,
    receiver: Option<oneshot::Receiver<Dialog>>,
    mediator: DialogMediator,
}

impl DialogExpectation {
    /// Response this expectation answers with
    #[must_use]
    pub fn response(&self) -> &DialogResponse {
        &self.response
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ExpectationState {
        *lock(&self.state)
    }

    /// Wait for the dialog this expectation answers
    ///
    /// # Errors
    ///
    /// Returns `DialogTimeout` if no dialog appeared in time, after which the
    /// expectation is abandoned and will not answer later dialogs.
    pub async fn fired(&mut self, timeout: Duration) -> HarnessResult<Dialog> {
        let timeout_ms = timeout.as_millis() as u64;
        let Some(receiver) = self.receiver.as_mut() else {
            return Err(HarnessError::driver("dialog expectation already consumed"));
        };

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(dialog)) => {
                self.receiver = None;
                *lock(&self.state) = ExpectationState::Consumed;
                Ok(dialog)
            }
            Ok(Err(_)) | Err(_) => self.expire(timeout_ms),
        }
    }

    /// Withdraw after the deadline
    ///
    /// A dialog answered between the deadline and the withdrawal still
    /// counts as fired.
    fn expire(&mut self, timeout_ms: u64) -> HarnessResult<Dialog> {
        self.mediator.abandon(self.id);
        let late = self
            .receiver
            .take()
            .and_then(|mut receiver| receiver.try_recv().ok());

        let mut state = lock(&self.state);
        if let Some(dialog) = late {
            *state = ExpectationState::Consumed;
            return Ok(dialog);
        }
        if *state == ExpectationState::Armed {
            *state = ExpectationState::Abandoned;
        }
        drop(state);
        Err(HarnessError::DialogTimeout {
            expected: self.response.to_string(),
            timeout_ms,
        })
    }
}

impl Drop for DialogExpectation {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if *state == ExpectationState::Armed {
            *state = ExpectationState::Abandoned;
            drop(state);
            self.mediator.abandon(self.id);
        }
    }
}
