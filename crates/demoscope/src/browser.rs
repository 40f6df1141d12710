//! Chromium backend over the Chrome `DevTools` Protocol.
//!
//! With the `browser` feature, [`Browser`] launches Chromium through
//! chromiumoxide and hands out one [`CdpDriver`] per isolated browser
//! context. The page-side scripts and the key table live outside the feature
//! gate so they can be checked without a browser.

use crate::locator::{js_string, Selector};
use std::fmt::Write as _;

/// Page-side function turning an element into the JSON shape of
/// [`crate::driver::ElementState`]
const DESCRIBE_ELEMENT: &str = r"const describe = (el) => {
  const r = el.getBoundingClientRect();
  const s = window.getComputedStyle(el);
  const visible = s.display !== 'none' && s.visibility !== 'hidden' && r.width > 0 && r.height > 0;
  const attributes = {};
  for (const a of Array.from(el.attributes)) attributes[a.name] = a.value;
  return {
    tag_name: el.tagName.toLowerCase(),
    text: el.textContent || '',
    value: typeof el.value === 'string' ? el.value : null,
    classes: Array.from(el.classList),
    attributes,
    visible,
    disabled: !!el.disabled,
    checked: !!el.checked,
    bounding_box: visible ? { x: r.x, y: r.y, width: r.width, height: r.height } : null,
  };
};";

/// Script returning every match described
#[must_use]
pub fn describe_all_script(selector: &Selector) -> String {
    format!(
        "(() => {{ {DESCRIBE_ELEMENT} return {}.map(describe); }})()",
        selector.to_all_query()
    )
}

/// Script returning the first match described, or null
#[must_use]
pub fn describe_first_script(selector: &Selector) -> String {
    format!(
        "(() => {{ {DESCRIBE_ELEMENT} const el = {}; return el ? describe(el) : null; }})()",
        selector.to_query()
    )
}

/// Script scrolling the first match into view and describing it
///
/// With `focus`, the element also receives keyboard focus.
#[must_use]
pub fn prepare_script(selector: &Selector, focus: bool) -> String {
    let focus = if focus { "el.focus();" } else { "" };
    format!(
        "(() => {{ {DESCRIBE_ELEMENT} const el = {}; if (!el) return null; \
         el.scrollIntoView({{ block: 'center', inline: 'center' }}); {focus} return describe(el); }})()",
        selector.to_query()
    )
}

/// Script setting a form control value and firing `input` and `change`
///
/// Evaluates to null when nothing matches and `false` when a select has no
/// such option.
#[must_use]
pub fn assign_value_script(selector: &Selector, value: &str, require_option: bool) -> String {
    let literal = js_string(value);
    let mut script = format!("(() => {{ const el = {}; if (!el) return null; ", selector.to_query());
    if require_option {
        let _ = write!(
            script,
            "if (!Array.from(el.options || []).some(o => o.value === {literal})) return false; "
        );
    }
    let _ = write!(
        script,
        "el.focus(); el.value = {literal}; \
         el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
         el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()"
    );
    script
}

/// Script toggling a checkbox through a real click when its state differs
#[must_use]
pub fn set_checked_script(selector: &Selector, checked: bool) -> String {
    format!(
        "(() => {{ const el = {}; if (!el) return null; if (el.checked !== {checked}) el.click(); return true; }})()",
        selector.to_query()
    )
}

/// Script reading one computed style property of the first match
#[must_use]
pub fn computed_style_script(selector: &Selector, property: &str) -> String {
    format!(
        "(() => {{ const el = {}; return el ? window.getComputedStyle(el).getPropertyValue({}) : null; }})()",
        selector.to_query(),
        js_string(property)
    )
}

/// Console argument the driver logs to mark a flush point
pub const FLUSH_MARKER: &str = "__demoscope_flush__";

/// Script logging [`FLUSH_MARKER`] through the console
#[must_use]
pub fn flush_script() -> String {
    format!("console.debug({})", js_string(FLUSH_MARKER))
}

/// Keyboard event fields for one named key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDefinition {
    /// DOM `key`
    pub key: String,
    /// DOM `code`
    pub code: String,
    /// Windows virtual key code
    pub key_code: i64,
    /// Text inserted by the key, if any
    pub text: Option<String>,
}

const NAMED_KEYS: &[(&str, &str, i64, Option<&str>)] = &[
    ("Enter", "Enter", 13, Some("\r")),
    ("Tab", "Tab", 9, None),
    ("Escape", "Escape", 27, None),
    ("Backspace", "Backspace", 8, None),
    ("Delete", "Delete", 46, None),
    ("ArrowUp", "ArrowUp", 38, None),
    ("ArrowDown", "ArrowDown", 40, None),
    ("ArrowLeft", "ArrowLeft", 37, None),
    ("ArrowRight", "ArrowRight", 39, None),
    ("Home", "Home", 36, None),
    ("End", "End", 35, None),
    ("PageUp", "PageUp", 33, None),
    ("PageDown", "PageDown", 34, None),
    (" ", "Space", 32, Some(" ")),
];

/// Look up a key by DOM name (`Enter`, `ArrowUp`, `Space`) or single character
#[must_use]
pub fn key_definition(key: &str) -> Option<KeyDefinition> {
    let key = if key == "Space" { " " } else { key };
    if let Some((name, code, key_code, text)) = NAMED_KEYS.iter().find(|(name, ..)| *name == key) {
        return Some(KeyDefinition {
            key: (*name).to_string(),
            code: (*code).to_string(),
            key_code: *key_code,
            text: text.map(str::to_string),
        });
    }

    let mut chars = key.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    let upper = c.to_ascii_uppercase();
    let code = if c.is_ascii_alphabetic() {
        format!("Key{upper}")
    } else if c.is_ascii_digit() {
        format!("Digit{c}")
    } else {
        String::new()
    };
    Some(KeyDefinition {
        key: c.to_string(),
        code,
        key_code: if c.is_ascii_alphanumeric() {
            i64::from(u32::from(upper))
        } else {
            0
        },
        text: Some(c.to_string()),
    })
}

// ============================================================================
// Real CDP Implementation (when `browser` feature is enabled)
// ============================================================================

#[cfg(feature = "browser")]
pub use cdp::{Browser, CdpDriver};

#[cfg(feature = "browser")]
#[allow(
    clippy::significant_drop_tightening,
    clippy::missing_errors_doc,
    clippy::cast_possible_truncation
)]
mod cdp {
    use super::{
        assign_value_script, computed_style_script, describe_all_script, describe_first_script,
        flush_script, key_definition, prepare_script, set_checked_script, FLUSH_MARKER,
    };
    use crate::config::BrowserConfig;
    use crate::diagnostics::{ConsoleSeverity, DiagnosticEntry};
    use crate::dialog::{Dialog, DialogResponse, DialogType};
    use crate::driver::{DriverEvent, ElementState, EventSink, HarnessDriver};
    use crate::locator::{Point, Selector};
    use crate::result::{HarnessError, HarnessResult};
    use crate::suite::DriverFactory;
    use async_trait::async_trait;
    use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
    use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
    use chromiumoxide::cdp::browser_protocol::input::{
        DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
        DispatchMouseEventType, MouseButton,
    };
    use chromiumoxide::cdp::browser_protocol::page::{
        EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
    };
    use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
    use chromiumoxide::cdp::browser_protocol::target::{
        CreateBrowserContextParams, CreateTargetParams,
        DisposeBrowserContextParams,
    };
    use chromiumoxide::cdp::js_protocol::runtime::{
        EventConsoleApiCalled, EventExceptionThrown, RemoteObject,
    };
    use chromiumoxide::page::Page as CdpPage;
    use futures::{FutureExt, Stream, StreamExt};
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
    use tokio::sync::{Mutex, Notify};
    use tokio::task::JoinHandle;
    use tracing::{debug, info};

    type Sinks = Arc<StdMutex<Vec<EventSink>>>;

    fn launch_error(e: impl std::fmt::Display) -> HarnessError {
        HarnessError::BrowserLaunch {
            message: e.to_string(),
        }
    }

    fn driver_error(e: impl std::fmt::Display) -> HarnessError {
        HarnessError::driver(e.to_string())
    }

    fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Browser instance with real CDP connection
    #[derive(Debug)]
    pub struct Browser {
        config: BrowserConfig,
        inner: Arc<Mutex<CdpBrowser>>,
        handle: JoinHandle<()>,
    }

    impl Browser {
        /// Launch a new browser instance with real CDP
        ///
        /// # Errors
        ///
        /// Returns error if browser cannot be launched
        pub async fn launch(config: BrowserConfig) -> HarnessResult<Self> {
            let mut builder = CdpConfig::builder()
                .window_size(config.viewport_width, config.viewport_height)
                .args(config.args.clone());

            if !config.headless {
                builder = builder.with_head();
            }

            if !config.sandbox {
                builder = builder.no_sandbox();
            }

            if let Some(ref path) = config.chromium_path {
                builder = builder.chrome_executable(path);
            }

            let cdp_config = builder.build().map_err(launch_error)?;
            let (browser, mut handler) = CdpBrowser::launch(cdp_config)
                .await
                .map_err(launch_error)?;

            let handle = tokio::spawn(async move {
                while let Some(h) = handler.next().await {
                    if h.is_err() {
                        break;
                    }
                }
            });

            info!(headless = config.headless, "browser launched");
            Ok(Self {
                config,
                inner: Arc::new(Mutex::new(browser)),
                handle,
            })
        }

        /// Get the browser configuration
        #[must_use]
        pub const fn config(&self) -> &BrowserConfig {
            &self.config
        }

        /// Open a blank page in a fresh browser context
        ///
        /// Contexts share no cookies or storage, so scenarios cannot leak
        /// state into each other.
        pub async fn new_isolated_page(&self) -> HarnessResult<CdpDriver> {
            let browser = self.inner.lock().await;
            let context = browser
                .execute(CreateBrowserContextParams::default())
                .await
                .map_err(driver_error)?
                .result
                .browser_context_id;
            let params = CreateTargetParams::builder()
                .url("about:blank")
                .browser_context_id(context.clone())
                .build()
                .map_err(driver_error)?;
            let page = browser.new_page(params).await.map_err(driver_error)?;
            drop(browser);

            page.execute(SetDeviceMetricsOverrideParams::new(
                i64::from(self.config.viewport_width),
                i64::from(self.config.viewport_height),
                1.0,
                false,
            ))
            .await
            .map_err(driver_error)?;

            CdpDriver::attach(page, Arc::clone(&self.inner), Some(context)).await
        }

        /// Close the browser
        pub async fn close(self) -> HarnessResult<()> {
            let result = self.inner.lock().await.close().await;
            self.handle.abort();
            result.map(|_| ()).map_err(driver_error)
        }
    }

    #[async_trait]
    impl DriverFactory for Browser {
        async fn create(&self) -> HarnessResult<Arc<dyn HarnessDriver>> {
            Ok(Arc::new(self.new_isolated_page().await?))
        }
    }

    /// [`HarnessDriver`] over one Chromium page
    pub struct CdpDriver {
        page: CdpPage,
        browser: Arc<Mutex<CdpBrowser>>,
        context: Option<BrowserContextId>,
        sinks: Sinks,
        listeners: StdMutex<Vec<JoinHandle<()>>>,
        flushed: Arc<Notify>,
        pointer: StdMutex<Point>,
        pressed: AtomicBool,
        closed: AtomicBool,
    }

    impl std::fmt::Debug for CdpDriver {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("CdpDriver")
                .field("context", &self.context)
                .field("closed", &self.closed.load(Ordering::SeqCst))
                .finish_non_exhaustive()
        }
    }

    impl CdpDriver {
        async fn attach(
            page: CdpPage,
            browser: Arc<Mutex<CdpBrowser>>,
            context: Option<BrowserContextId>,
        ) -> HarnessResult<Self> {
            let sinks: Sinks = Arc::default();

            let console = page
                .event_listener::<EventConsoleApiCalled>()
                .await
                .map_err(driver_error)?;
            let exceptions = page
                .event_listener::<EventExceptionThrown>()
                .await
                .map_err(driver_error)?;
            let dialogs = page
                .event_listener::<EventJavascriptDialogOpening>()
                .await
                .map_err(driver_error)?;

            let events = futures::stream::select_all([
                console
                    .map(|e| Relayed::from_console(&e))
                    .boxed(),
                exceptions
                    .map(|e| Relayed::Event(DriverEvent::Diagnostic(exception_entry(&e))))
                    .boxed(),
                dialogs
                    .map(|e| Relayed::Event(DriverEvent::DialogOpened(dialog_from(&e))))
                    .boxed(),
            ]);
            let flushed = Arc::new(Notify::new());
            let listeners = vec![forward(events, Arc::clone(&sinks), Arc::clone(&flushed))];

            Ok(Self {
                page,
                browser,
                context,
                sinks,
                listeners: StdMutex::new(listeners),
                flushed,
                pointer: StdMutex::new(Point::new(0.0, 0.0)),
                pressed: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            })
        }

        async fn eval(&self, script: &str) -> HarnessResult<Value> {
            let result = self
                .page
                .evaluate(script)
                .await
                .map_err(|e| HarnessError::script(e.to_string()))?;
            Ok(result.value().cloned().unwrap_or(Value::Null))
        }

        async fn eval_as<T: serde::de::DeserializeOwned>(&self, script: &str) -> HarnessResult<T> {
            Ok(serde_json::from_value(self.eval(script).await?)?)
        }

        /// Scroll into view and check the element can take input
        async fn prepare(&self, selector: &Selector, focus: bool) -> HarnessResult<ElementState> {
            let state: Option<ElementState> = self.eval_as(&prepare_script(selector, focus)).await?;
            let state = state.ok_or_else(|| not_found(selector))?;
            let reason = if !state.visible {
                "element is hidden"
            } else if state.disabled {
                "element is disabled"
            } else {
                return Ok(state);
            };
            Err(HarnessError::ElementNotInteractable {
                role: selector.to_string(),
                reason: reason.to_string(),
            })
        }

        async fn mouse(
            &self,
            kind: DispatchMouseEventType,
            point: Point,
            click_count: i64,
        ) -> HarnessResult<()> {
            let mut builder = DispatchMouseEventParams::builder()
                .r#type(kind)
                .x(point.x)
                .y(point.y);
            if self.pressed.load(Ordering::SeqCst) || click_count > 0 {
                builder = builder.button(MouseButton::Left).buttons(1);
            }
            if click_count > 0 {
                builder = builder.click_count(click_count);
            }
            let params = builder.build().map_err(driver_error)?;
            self.page.execute(params).await.map_err(driver_error)?;
            Ok(())
        }

        async fn click_at(&self, point: Point, click_count: i64) -> HarnessResult<()> {
            self.mouse(DispatchMouseEventType::MouseMoved, point, 0).await?;
            self.mouse(DispatchMouseEventType::MousePressed, point, click_count)
                .await?;
            self.mouse(DispatchMouseEventType::MouseReleased, point, click_count)
                .await?;
            *lock(&self.pointer) = point;
            Ok(())
        }

        async fn assign(&self, selector: &Selector, value: &str, option: bool) -> HarnessResult<()> {
            self.prepare(selector, false).await?;
            match self.eval(&assign_value_script(selector, value, option)).await? {
                Value::Null => Err(not_found(selector)),
                Value::Bool(false) => Err(HarnessError::driver(format!(
                    "no option with value '{value}' in {selector}"
                ))),
                _ => Ok(()),
            }
        }
    }

    fn not_found(selector: &Selector) -> HarnessError {
        HarnessError::ElementNotFound {
            role: selector.to_string(),
            selector: selector.to_string(),
        }
    }

    fn center_of(selector: &Selector, state: &ElementState) -> HarnessResult<Point> {
        state
            .bounding_box
            .map(|b| b.center())
            .ok_or_else(|| HarnessError::ElementNotInteractable {
                role: selector.to_string(),
                reason: "element has no layout box".to_string(),
            })
    }

    /// Item on the merged listener stream
    enum Relayed {
        Event(DriverEvent),
        FlushMarker,
    }

    impl Relayed {
        fn from_console(event: &EventConsoleApiCalled) -> Self {
            let marker = matches!(
                event.args.first().and_then(|a| a.value.as_ref()),
                Some(Value::String(s)) if s == FLUSH_MARKER
            );
            if marker {
                Self::FlushMarker
            } else {
                Self::Event(DriverEvent::Diagnostic(console_entry(event)))
            }
        }
    }

    fn publish(sinks: &Sinks, event: &DriverEvent) {
        lock(sinks).retain(|sink| sink.send(event.clone()).is_ok());
    }

    /// Relay listener events to the sinks in arrival order
    ///
    /// Once the flush marker arrives every event CDP delivered before it is
    /// already queued on some listener, so draining what is ready completes
    /// the flush.
    fn forward<S>(mut events: S, sinks: Sinks, flushed: Arc<Notify>) -> JoinHandle<()>
    where
        S: Stream<Item = Relayed> + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(item) = events.next().await {
                match item {
                    Relayed::Event(event) => publish(&sinks, &event),
                    Relayed::FlushMarker => {
                        while let Some(Some(item)) = events.next().now_or_never() {
                            if let Relayed::Event(event) = item {
                                publish(&sinks, &event);
                            }
                        }
                        flushed.notify_waiters();
                    }
                }
            }
        })
    }

    fn protocol_name<T: serde::Serialize>(value: &T) -> String {
        serde_json::to_value(value)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    }

    fn remote_object_text(object: &RemoteObject) -> String {
        match &object.value {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => object.description.clone().unwrap_or_default(),
        }
    }

    fn position(n: i64) -> u32 {
        u32::try_from(n + 1).unwrap_or(0)
    }

    fn console_entry(event: &EventConsoleApiCalled) -> DiagnosticEntry {
        let severity = ConsoleSeverity::from_api_type(&protocol_name(&event.r#type));
        let text = event
            .args
            .iter()
            .map(remote_object_text)
            .collect::<Vec<_>>()
            .join(" ");
        let entry = DiagnosticEntry::console(severity, text);
        match event
            .stack_trace
            .as_ref()
            .and_then(|trace| trace.call_frames.first())
        {
            Some(frame) => entry.at(
                frame.url.clone(),
                position(frame.line_number),
                position(frame.column_number),
            ),
            None => entry,
        }
    }

    fn exception_entry(event: &EventExceptionThrown) -> DiagnosticEntry {
        let details = &event.exception_details;
        let text = details
            .exception
            .as_ref()
            .and_then(|e| e.description.as_deref())
            .and_then(|d| d.lines().next())
            .map_or_else(|| details.text.clone(), str::to_string);
        let entry = DiagnosticEntry::exception(text);
        match &details.url {
            Some(url) => entry.at(
                url.clone(),
                position(details.line_number),
                position(details.column_number),
            ),
            None => entry,
        }
    }

    fn dialog_from(event: &EventJavascriptDialogOpening) -> Dialog {
        let kind = DialogType::from_protocol(&protocol_name(&event.r#type));
        match kind {
            DialogType::Prompt => Dialog::prompt(event.message.clone(), event.default_prompt.clone()),
            other => Dialog::new(other, event.message.clone()),
        }
    }

    #[async_trait]
    impl HarnessDriver for CdpDriver {
        async fn navigate(&self, url: &str) -> HarnessResult<()> {
            debug!(url, "goto");
            self.page
                .goto(url)
                .await
                .map_err(|e| HarnessError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;
            Ok(())
        }

        async fn current_url(&self) -> HarnessResult<String> {
            Ok(self
                .page
                .url()
                .await
                .map_err(driver_error)?
                .unwrap_or_default())
        }

        async fn query_selector(&self, selector: &Selector) -> HarnessResult<Option<ElementState>> {
            self.eval_as(&describe_first_script(selector)).await
        }

        async fn query_selector_all(&self, selector: &Selector) -> HarnessResult<Vec<ElementState>> {
            self.eval_as(&describe_all_script(selector)).await
        }

        async fn click(&self, selector: &Selector) -> HarnessResult<()> {
            let state = self.prepare(selector, false).await?;
            self.click_at(center_of(selector, &state)?, 1).await
        }

        async fn double_click(&self, selector: &Selector) -> HarnessResult<()> {
            let state = self.prepare(selector, false).await?;
            let point = center_of(selector, &state)?;
            self.click_at(point, 1).await?;
            self.click_at(point, 2).await
        }

        async fn fill(&self, selector: &Selector, text: &str) -> HarnessResult<()> {
            self.assign(selector, text, false).await
        }

        async fn select_option(&self, selector: &Selector, value: &str) -> HarnessResult<()> {
            self.assign(selector, value, true).await
        }

        async fn set_value(&self, selector: &Selector, value: &str) -> HarnessResult<()> {
            self.assign(selector, value, false).await
        }

        async fn set_checked(&self, selector: &Selector, checked: bool) -> HarnessResult<()> {
            self.prepare(selector, false).await?;
            match self.eval(&set_checked_script(selector, checked)).await? {
                Value::Null => Err(not_found(selector)),
                _ => Ok(()),
            }
        }

        async fn press(&self, selector: &Selector, key: &str) -> HarnessResult<()> {
            let def = key_definition(key)
                .ok_or_else(|| HarnessError::driver(format!("unknown key '{key}'")))?;
            self.prepare(selector, true).await?;

            let mut down = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyDown)
                .key(def.key.clone())
                .code(def.code.clone())
                .windows_virtual_key_code(def.key_code);
            if let Some(text) = &def.text {
                down = down.text(text.clone());
            }
            let up = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyUp)
                .key(def.key)
                .code(def.code)
                .windows_virtual_key_code(def.key_code);

            for params in [down, up] {
                let params = params.build().map_err(driver_error)?;
                self.page.execute(params).await.map_err(driver_error)?;
            }
            Ok(())
        }

        async fn mouse_move(&self, point: Point) -> HarnessResult<()> {
            self.mouse(DispatchMouseEventType::MouseMoved, point, 0).await?;
            *lock(&self.pointer) = point;
            Ok(())
        }

        async fn mouse_down(&self) -> HarnessResult<()> {
            let point = *lock(&self.pointer);
            self.mouse(DispatchMouseEventType::MousePressed, point, 1).await?;
            self.pressed.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn mouse_up(&self) -> HarnessResult<()> {
            let point = *lock(&self.pointer);
            let result = self
                .mouse(DispatchMouseEventType::MouseReleased, point, 1)
                .await;
            self.pressed.store(false, Ordering::SeqCst);
            result
        }

        async fn computed_style(
            &self,
            selector: &Selector,
            property: &str,
        ) -> HarnessResult<Option<String>> {
            match self.eval(&computed_style_script(selector, property)).await? {
                Value::String(s) => Ok(Some(s)),
                _ => Ok(None),
            }
        }

        async fn evaluate(&self, script: &str) -> HarnessResult<Value> {
            self.eval(script).await
        }

        async fn subscribe(&self, sink: EventSink) -> HarnessResult<()> {
            lock(&self.sinks).push(sink);
            Ok(())
        }

        async fn flush_events(&self) -> HarnessResult<()> {
            let flushed = self.flushed.notified();
            self.eval(&flush_script()).await?;
            flushed.await;
            Ok(())
        }

        async fn respond_to_dialog(&self, response: &DialogResponse) -> HarnessResult<()> {
            let mut params = HandleJavaScriptDialogParams::new(response.accepts());
            params.prompt_text = response.prompt_text().map(str::to_string);
            self.page.execute(params).await.map_err(driver_error)?;
            Ok(())
        }

        async fn close(&self) -> HarnessResult<()> {
            if self.closed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            for listener in lock(&self.listeners).drain(..) {
                listener.abort();
            }
            lock(&self.sinks).clear();

            self.page.clone().close().await.map_err(driver_error)?;
            if let Some(context) = &self.context {
                self.browser
                    .lock()
                    .await
                    .execute(DisposeBrowserContextParams::new(context.clone()))
                    .await
                    .map_err(driver_error)?;
            }
            Ok(())
        }
    }

    impl Drop for CdpDriver {
        fn drop(&mut self) {
            for listener in lock(&self.listeners).drain(..) {
                listener.abort();
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod script_tests {
        use super::*;

        #[test]
        fn test_describe_scripts_use_selector_queries() {
            let sel = Selector::css("#bars .bar");
            assert!(describe_all_script(&sel).contains("document.querySelectorAll(\"#bars .bar\")"));
            assert!(describe_first_script(&sel).contains("document.querySelector(\"#bars .bar\")"));
            assert!(describe_all_script(&sel).contains(".map(describe)"));
        }

        #[test]
        fn test_prepare_focus() {
            let sel = Selector::css("#name");
            assert!(prepare_script(&sel, true).contains("el.focus();"));
            assert!(!prepare_script(&sel, false).contains("el.focus();"));
            assert!(prepare_script(&sel, false).contains("scrollIntoView"));
        }

        #[test]
        fn test_assign_value_escapes_literal() {
            let script = assign_value_script(&Selector::css("#name"), "say \"hi\"", false);
            assert!(script.contains(r#"el.value = "say \"hi\"""#));
            assert!(!script.contains("el.options"));
            assert!(script.contains("'change'"));
        }

        #[test]
        fn test_assign_value_checks_option() {
            let script = assign_value_script(&Selector::css("#speed"), "500", true);
            assert!(script.contains(r#"o.value === "500""#));
            assert!(script.contains("return false;"));
        }

        #[test]
        fn test_flush_script_logs_marker() {
            assert_eq!(flush_script(), r#"console.debug("__demoscope_flush__")"#);
        }

        #[test]
        fn test_set_checked_and_style() {
            let sel = Selector::css("#agree");
            assert!(set_checked_script(&sel, true).contains("el.checked !== true"));
            assert!(computed_style_script(&sel, "opacity").contains(r#"getPropertyValue("opacity")"#));
        }
    }

    mod key_tests {
        use super::*;

        #[test]
        fn test_named_keys() {
            let enter = key_definition("Enter").unwrap();
            assert_eq!(enter.key_code, 13);
            assert_eq!(enter.text.as_deref(), Some("\r"));

            let arrow = key_definition("ArrowDown").unwrap();
            assert_eq!(arrow.code, "ArrowDown");
            assert!(arrow.text.is_none());
        }

        #[test]
        fn test_space_alias() {
            let space = key_definition("Space").unwrap();
            assert_eq!(space.key, " ");
            assert_eq!(space.code, "Space");
        }

        #[test]
        fn test_characters() {
            let a = key_definition("a").unwrap();
            assert_eq!(a.code, "KeyA");
            assert_eq!(a.key_code, 65);
            assert_eq!(a.text.as_deref(), Some("a"));
            assert_eq!(key_definition("7").unwrap().code, "Digit7");
        }

        #[test]
        fn test_unknown_key() {
            assert!(key_definition("Hyper").is_none());
            assert!(key_definition("").is_none());
        }
    }
}
