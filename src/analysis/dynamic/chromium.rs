//! Headless Chromium driver using chromiumoxide.
//!
//! Requests are captured from the DevTools `Network.requestWillBeSent` event, so
//! beacons fired as images and requests from embedded frames are seen even when
//! the resource itself is blocked.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventRequestWillBeSent, SetBlockedUrLsParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::analysis::dynamic::{BrowserDriver, BrowserSession, PageSnapshot};
use crate::config::Config;
use crate::error_handling::{BrowserError, InitializationError};
use crate::models::{DomSnapshot, NetworkRequest};

/// Upper bound on captured requests per session.
const MAX_CAPTURED_REQUESTS: usize = 5000;

/// Asset types never needed for detection. Blocked requests are still reported
/// by the request listener before they fail.
const BLOCKED_ASSETS: &[&str] = &[
    "*.png*", "*.jpg*", "*.jpeg*", "*.gif*", "*.webp*", "*.svg*", "*.ico*", "*.woff*", "*.ttf*", "*.otf*",
    "*.css*",
];

/// Installed before any page script runs: keeps console output.
const INSTRUMENTATION: &str = r#"(() => {
  const lines = [];
  Object.defineProperty(window, '__tagInspectorConsole', { value: lines, enumerable: false });
  for (const level of ['log', 'info', 'warn', 'error', 'debug']) {
    const original = console[level];
    console[level] = function (...args) {
      try {
        if (lines.length < 1000) {
          lines.push(args.map((a) => {
            if (typeof a === 'string') return a;
            try { return JSON.stringify(a); } catch (e) { return String(a); }
          }).join(' '));
        }
      } catch (e) {}
      return original.apply(this, args);
    };
  }
})();"#;

const INTERACTION: &str = r#"(() => {
  const height = document.body ? document.body.scrollHeight : 0;
  window.scrollTo(0, height / 2);
  document.dispatchEvent(new MouseEvent('mousemove', { clientX: 500, clientY: 300, bubbles: true }));
  return true;
})()"#;

fn snapshot_script(watched: &[String]) -> Result<String, BrowserError> {
    let watched = serde_json::to_string(watched).map_err(|e| BrowserError::Evaluation(e.to_string()))?;
    Ok(format!(
        r#"(() => {{
  const watched = {watched};
  return JSON.stringify({{
    console: (window.__tagInspectorConsole || []).slice(),
    globals: watched.filter((name) => typeof window[name] !== 'undefined'),
    html: document.documentElement ? document.documentElement.outerHTML : '',
    url: location.href,
    loading: document.readyState !== 'complete'
  }});
}})()"#
    ))
}

#[derive(Debug, Deserialize)]
struct RawSnapshot {
    console: Vec<String>,
    globals: Vec<String>,
    html: String,
    url: String,
    loading: bool,
}

impl RawSnapshot {
    fn with_requests(self, requests: Vec<NetworkRequest>) -> PageSnapshot {
        PageSnapshot {
            requests,
            console_logs: self.console,
            dom: DomSnapshot {
                html: self.html,
                globals: self.globals,
            },
            current_url: self.url,
            loading: self.loading,
        }
    }
}

type CapturedRequests = Arc<Mutex<Vec<NetworkRequest>>>;

async fn record_request(requests: &CapturedRequests, url: &str) {
    if url.starts_with("data:") {
        return;
    }
    let mut requests = requests.lock().await;
    if requests.len() < MAX_CAPTURED_REQUESTS {
        requests.push(NetworkRequest::new(url));
    }
}

/// One headless Chromium process shared by every session of a run.
pub struct ChromiumDriver {
    browser: Mutex<Browser>,
    handler: JoinHandle<()>,
}

impl ChromiumDriver {
    /// Launches Chromium. Cross-origin frames stay in the page's process so their
    /// requests reach the page's network events.
    pub async fn launch(config: &Config) -> Result<Self, InitializationError> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-features=IsolateOrigins,site-per-process")
            .arg(format!("--user-agent={}", config.user_agent));
        if let Some(path) = &config.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let browser_config = builder
            .build()
            .map_err(|e| InitializationError::BrowserLaunchError(format!("invalid browser config: {e}")))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| InitializationError::BrowserLaunchError(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::debug!("Browser handler event error: {}", e);
                }
            }
            log::debug!("Browser handler stopped");
        });

        Ok(Self {
            browser: Mutex::new(browser),
            handler,
        })
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn open(
        &self,
        url: &str,
        watched: &[String],
        navigation_timeout: Duration,
    ) -> Result<Box<dyn BrowserSession>, BrowserError> {
        if self.handler.is_finished() {
            return Err(BrowserError::Crashed("browser process is gone".to_string()));
        }
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| BrowserError::Unavailable(e.to_string()))?
        };
        // From here on the session's Drop closes the page on every early return.
        let mut session = ChromiumSession {
            page: Some(page.clone()),
            snapshot_script: snapshot_script(watched)?,
            requests: CapturedRequests::default(),
            capture: None,
        };

        page.execute(EnableParams::default())
            .await
            .map_err(|e| BrowserError::Evaluation(format!("network capture unavailable: {e}")))?;
        let blocked = BLOCKED_ASSETS.iter().map(|pattern| pattern.to_string()).collect();
        if let Err(e) = page.execute(SetBlockedUrLsParams::new(blocked)).await {
            log::debug!("Asset blocking unavailable, loading everything: {}", e);
        }
        let mut events = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| BrowserError::Evaluation(format!("network capture unavailable: {e}")))?;
        let requests = session.requests.clone();
        session.capture = Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                record_request(&requests, &event.request.url).await;
            }
        }));

        page.evaluate_on_new_document(AddScriptToEvaluateOnNewDocumentParams::new(INSTRUMENTATION))
            .await
            .map_err(|e| BrowserError::Evaluation(e.to_string()))?;

        match tokio::time::timeout(navigation_timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(Box::new(session)),
            Ok(Err(e)) => Err(BrowserError::Navigation(e.to_string())),
            Err(_) => Err(BrowserError::NavigationTimeout(navigation_timeout)),
        }
    }

    async fn shutdown(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(e) = browser.close().await {
            log::debug!("Failed to close browser cleanly: {}", e);
        }
        let _ = browser.wait().await;
        self.handler.abort();
    }
}

struct ChromiumSession {
    page: Option<Page>,
    snapshot_script: String,
    requests: CapturedRequests,
    capture: Option<JoinHandle<()>>,
}

impl ChromiumSession {
    fn page(&self) -> Result<&Page, BrowserError> {
        self.page
            .as_ref()
            .ok_or_else(|| BrowserError::Crashed("session already closed".to_string()))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn observe(&mut self, duration: Duration) -> Result<PageSnapshot, BrowserError> {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
        let json: String = self
            .page()?
            .evaluate(self.snapshot_script.as_str())
            .await
            .map_err(|e| BrowserError::Evaluation(e.to_string()))?
            .into_value()
            .map_err(|e| BrowserError::Evaluation(format!("unexpected snapshot value: {e:?}")))?;
        let raw: RawSnapshot =
            serde_json::from_str(&json).map_err(|e| BrowserError::Evaluation(e.to_string()))?;
        let requests = self.requests.lock().await.clone();
        Ok(raw.with_requests(requests))
    }

    async fn interact(&mut self) -> Result<(), BrowserError> {
        self.page()?
            .evaluate(INTERACTION)
            .await
            .map_err(|e| BrowserError::Evaluation(e.to_string()))?;
        Ok(())
    }

    async fn close(mut self: Box<Self>) {
        if let Some(capture) = self.capture.take() {
            capture.abort();
        }
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                log::debug!("Failed to close browser page: {}", e);
            }
        }
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(capture) = self.capture.take() {
            capture.abort();
        }
        if let Some(page) = self.page.take() {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    let _ = page.close().await;
                });
            }
        }
    }
}
