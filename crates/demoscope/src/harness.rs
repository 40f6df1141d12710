//! Per-test session lifecycle.
//!
//! A [`Session`] owns one page for one test. It attaches the diagnostic
//! collector and the dialog mediator *before* navigation, so nothing emitted
//! during page load is missed, and verifies both at [`Session::finish`].

use crate::action::ActionDispatcher;
use crate::diagnostics::{DiagnosticEntry, DiagnosticRecord, ExpectedDefect};
use crate::dialog::{DialogExpectation, DialogMediator, DialogResponse, HandledDialog};
use crate::driver::{DriverEvent, HarnessDriver};
use crate::observer::StateObserver;
use crate::page_object::PageObject;
use crate::result::{HarnessError, HarnessResult};
use crate::wait::WaitOptions;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

/// Outcome of a cleanly finished session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    /// Session id
    pub session_id: Uuid,
    /// Page display name
    pub page: String,
    /// Wall time from start to finish
    pub duration: Duration,
    /// Everything the page reported
    pub diagnostics: Vec<DiagnosticEntry>,
    /// Every dialog and how it was answered
    pub dialogs: Vec<HandledDialog>,
    /// Defects that were declared (and observed)
    pub expected_defects: Vec<ExpectedDefect>,
}

/// One test's page, collector and mediator
pub struct Session {
    id: Uuid,
    driver: Arc<dyn HarnessDriver>,
    page: Arc<PageObject>,
    record: DiagnosticRecord,
    mediator: DialogMediator,
    expected_defects: Vec<ExpectedDefect>,
    actions: ActionDispatcher,
    observer: StateObserver,
    pump: EventPump,
    started: Instant,
}

/// Upper bound on waiting for the driver to deliver in-flight events
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Background task moving driver events into the record and mediator
///
/// Dropping it without [`EventPump::stop`] aborts the task.
struct EventPump {
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl EventPump {
    fn spawn(
        events: mpsc::UnboundedReceiver<DriverEvent>,
        record: DiagnosticRecord,
        mediator: DialogMediator,
        driver: Arc<dyn HarnessDriver>,
    ) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(pump_events(events, stop_rx, record, mediator, driver));
        Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Handle everything already queued, then end the task
    async fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "event pump panicked");
            }
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("page", &self.page.display_name())
            .field("diagnostics", &self.record.len())
            .field("expected_defects", &self.expected_defects)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Attach to a driver and start collecting events
    ///
    /// Does not navigate; call [`Session::goto`] next.
    pub async fn start(driver: Arc<dyn HarnessDriver>, page: PageObject) -> HarnessResult<Self> {
        let id = Uuid::new_v4();
        let page = Arc::new(page);
        let record = DiagnosticRecord::new();
        let mediator = DialogMediator::new();

        let (tx, rx) = mpsc::unbounded_channel();
        driver.subscribe(tx).await?;
        let pump = EventPump::spawn(rx, record.clone(), mediator.clone(), Arc::clone(&driver));

        info!(session = %id, page = page.display_name(), "session started");
        Ok(Self {
            id,
            actions: ActionDispatcher::new(Arc::clone(&driver), Arc::clone(&page)),
            observer: StateObserver::new(Arc::clone(&driver), Arc::clone(&page)),
            driver,
            page,
            record,
            mediator,
            expected_defects: Vec::new(),
            pump,
            started: Instant::now(),
        })
    }

    /// Default options for the observer's polling helpers
    #[must_use]
    pub fn with_wait(mut self, options: WaitOptions) -> Self {
        self.observer = self.observer.with_default_wait(options);
        self
    }

    /// Pointer steps used by drags
    #[must_use]
    pub fn with_drag_steps(mut self, steps: u32) -> Self {
        self.actions = self.actions.with_drag_steps(steps);
        self
    }

    /// Session id
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Page under test
    #[must_use]
    pub fn page(&self) -> &PageObject {
        &self.page
    }

    /// Navigate to the page URL
    ///
    /// # Errors
    ///
    /// Returns `Navigation` if loading fails or exceeds the page's load timeout
    pub async fn goto(&self) -> HarnessResult<()> {
        let url = &self.page.url;
        let timeout = Duration::from_millis(self.page.load_timeout_ms);
        info!(session = %self.id, url, "navigating");
        match tokio::time::timeout(timeout, self.driver.navigate(url)).await {
            Ok(result) => result,
            Err(_) => Err(HarnessError::Navigation {
                url: url.clone(),
                message: format!("load did not finish within {}ms", self.page.load_timeout_ms),
            }),
        }
    }

    /// Interactions
    #[must_use]
    pub const fn actions(&self) -> &ActionDispatcher {
        &self.actions
    }

    /// State reads
    #[must_use]
    pub const fn observe(&self) -> &StateObserver {
        &self.observer
    }

    /// Dialog mediator
    #[must_use]
    pub const fn dialogs(&self) -> &DialogMediator {
        &self.mediator
    }

    /// Arm a one-shot dialog response
    #[must_use]
    pub fn expect_dialog(&self, response: DialogResponse) -> DialogExpectation {
        self.mediator.arm(response)
    }

    /// Diagnostic record collected so far
    #[must_use]
    pub const fn diagnostics(&self) -> &DiagnosticRecord {
        &self.record
    }

    /// Declare a known page defect
    pub fn expect_defect(&mut self, defect: ExpectedDefect) {
        self.expected_defects.push(defect);
    }

    /// Stop collecting, release the page and verify what was collected
    ///
    /// # Errors
    ///
    /// Returns `DiagnosticsNotClean` when an unexpected error-level entry or
    /// dialog was seen, or a declared defect never appeared.
    pub async fn finish(mut self) -> HarnessResult<SessionReport> {
        match tokio::time::timeout(FLUSH_TIMEOUT, self.driver.flush_events()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(session = %self.id, error = %e, "failed to flush page events"),
            Err(_) => warn!(session = %self.id, "page events still in flight at finish"),
        }
        self.pump.stop().await;
        if let Err(e) = self.driver.close().await {
            warn!(session = %self.id, error = %e, "failed to close page");
        }

        let duration = self.started.elapsed();
        let verdict = self.verify();
        info!(
            session = %self.id,
            duration_ms = duration.as_millis() as u64,
            diagnostics = self.record.len(),
            clean = verdict.is_ok(),
            "session finished"
        );
        verdict?;

        Ok(SessionReport {
            session_id: self.id,
            page: self.page.display_name().to_string(),
            duration,
            diagnostics: self.record.entries(),
            dialogs: self.mediator.handled(),
            expected_defects: std::mem::take(&mut self.expected_defects),
        })
    }

    fn verify(&self) -> HarnessResult<()> {
        let unexpected = self.mediator.unexpected();
        let diagnostics = self.record.verify(&self.expected_defects);
        if unexpected.is_empty() {
            return diagnostics;
        }

        let mut summary = format!("{} unexpected dialog(s)", unexpected.len());
        if let Err(HarnessError::DiagnosticsNotClean { summary: more, .. }) = &diagnostics {
            summary = format!("{summary}; {more}");
        }
        let dialogs = unexpected
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        Err(HarnessError::DiagnosticsNotClean {
            summary,
            record: format!("{}\n{dialogs}", self.record.render()),
        })
    }
}

async fn pump_events(
    mut events: mpsc::UnboundedReceiver<DriverEvent>,
    mut stop: oneshot::Receiver<()>,
    record: DiagnosticRecord,
    mediator: DialogMediator,
    driver: Arc<dyn HarnessDriver>,
) {
    let handle = |event: DriverEvent| {
        let record = record.clone();
        let mediator = mediator.clone();
        let driver = Arc::clone(&driver);
        async move {
            match event {
                DriverEvent::Diagnostic(entry) => record.push(entry),
                DriverEvent::DialogOpened(dialog) => {
                    let response = mediator.on_dialog(dialog);
                    if let Err(e) = driver.respond_to_dialog(&response).await {
                        warn!(error = %e, "failed to answer dialog");
                    }
                }
            }
        }
    };

    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Some(event) => handle(event).await,
                None => break,
            },
            _ = &mut stop => {
                while let Ok(event) = events.try_recv() {
                    handle(event).await;
                }
                break;
            }
        }
    }
}
