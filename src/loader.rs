//! Page loading via a headless Chromium instance.
//!
//! The loader either launches a local browser or attaches to an existing CDP
//! endpoint, navigates to the requested URL, and waits for the DOM to settle
//! within bounded timeouts. A single attempt is made; there are no retries.
//!
//! Resource scoping: [`LoadedPage`] owns the browser process and the CDP
//! handler task. `close()` tears both down gracefully, and chromiumoxide's
//! own drop handling kills the child process if the page handle is dropped on
//! an error or interrupt path instead.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::{
    browser::{Browser, BrowserConfig},
    handler::viewport::Viewport,
    page::Page,
};
use futures_util::StreamExt;
use thiserror::Error;
use tokio::{fs, task::JoinHandle, time};
use url::Url;

use crate::config::CheckerConfig;
use crate::logging::CheckerLogger;

/// Errors surfaced while loading a page. All of them are fatal: the run
/// aborts before extraction.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported URL scheme '{scheme}' in '{url}'; only http and https are supported")]
    UnsupportedScheme { url: String, scheme: String },
    #[error("failed to launch or attach to the browser: {0}")]
    Launch(String),
    #[error("navigation to '{url}' failed: {message}")]
    Navigation { url: String, message: String },
    #[error("loading '{url}' exceeded {timeout_ms}ms")]
    Timeout { url: String, timeout_ms: u64 },
}

/// Validate the target URL before any browser process is started.
pub fn validate_url(url: &str) -> Result<Url, LoadError> {
    let parsed = Url::parse(url).map_err(|source| LoadError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(LoadError::UnsupportedScheme {
            url: url.to_string(),
            scheme: scheme.to_string(),
        }),
    }
}

/// Launches the browser and produces [`LoadedPage`] handles.
pub struct PageLoader {
    config: CheckerConfig,
    logger: Arc<CheckerLogger>,
}

/// A live, fully-rendered document handle. Owns the browser session for the
/// remainder of the run.
#[derive(Debug)]
pub struct LoadedPage {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Page,
    temp_user_data_dir: Option<PathBuf>,
    url: String,
}

impl PageLoader {
    pub fn new(config: CheckerConfig, logger: Arc<CheckerLogger>) -> Self {
        Self { config, logger }
    }

    /// Load the page and wait for its DOM to settle. Fails with a
    /// [`LoadError`] on invalid URLs, launch failures, navigation failures,
    /// or when the bounded wait elapses.
    pub async fn load(&self, url: &str) -> Result<LoadedPage, LoadError> {
        let parsed = validate_url(url)?;

        let (browser, handler, temp_user_data_dir) = self.start_browser().await?;
        self.logger
            .info(format!("Navigating to {parsed}"), Some("loader"), None);

        let navigation = time::timeout(
            Duration::from_millis(self.config.load_timeout_ms),
            self.open_and_settle(&browser, parsed.as_str()),
        )
        .await;

        let page = match navigation {
            Ok(Ok(page)) => page,
            Ok(Err(err)) => {
                teardown(browser, handler, temp_user_data_dir).await;
                return Err(err);
            }
            Err(_) => {
                teardown(browser, handler, temp_user_data_dir).await;
                return Err(LoadError::Timeout {
                    url: url.to_string(),
                    timeout_ms: self.config.load_timeout_ms,
                });
            }
        };

        self.logger
            .info("Page loaded and settled", Some("loader"), None);

        Ok(LoadedPage {
            browser,
            handler,
            page,
            temp_user_data_dir,
            url: url.to_string(),
        })
    }

    async fn start_browser(
        &self,
    ) -> Result<(Browser, JoinHandle<()>, Option<PathBuf>), LoadError> {
        if let Some(cdp_url) = &self.config.cdp_url {
            let (browser, handler) = Browser::connect(cdp_url.clone())
                .await
                .map_err(|err| LoadError::Launch(err.to_string()))?;
            return Ok((browser, spawn_handler(handler), None));
        }

        let (user_data_dir, temp_user_data_dir) = match &self.config.user_data_dir {
            Some(dir) => (dir.clone(), None),
            None => {
                let unique = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|elapsed| elapsed.as_millis())
                    .unwrap_or_default();
                let dir = std::env::temp_dir()
                    .join(format!("wcag-checker-{}-{unique}", std::process::id()));
                fs::create_dir_all(&dir)
                    .await
                    .map_err(|err| LoadError::Launch(err.to_string()))?;
                (dir.clone(), Some(dir))
            }
        };

        let viewport = Viewport {
            width: 1366,
            height: 768,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        };

        let mut builder = BrowserConfig::builder();
        if let Some(path) = &self.config.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        let builder = builder
            .viewport(viewport)
            .user_data_dir(&user_data_dir)
            .args(vec![
                "--disable-gpu",
                "--no-first-run",
                "--no-default-browser-check",
            ]);
        let builder = if self.config.headless {
            builder
        } else {
            builder.with_head()
        };

        let browser_config = builder.build().map_err(LoadError::Launch)?;

        let (browser, handler) = Browser::launch(browser_config)
            .await
            .map_err(|err| LoadError::Launch(err.to_string()))?;

        Ok((browser, spawn_handler(handler), temp_user_data_dir))
    }

    async fn open_and_settle(&self, browser: &Browser, url: &str) -> Result<Page, LoadError> {
        let page = browser
            .new_page(url)
            .await
            .map_err(|err| LoadError::Navigation {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        page.wait_for_navigation()
            .await
            .map_err(|err| LoadError::Navigation {
                url: url.to_string(),
                message: err.to_string(),
            })?;

        self.wait_for_settled_dom(&page).await;
        Ok(page)
    }

    /// Poll `document.readyState` until the document reports complete or the
    /// settle timeout elapses. Best-effort: an expired settle wait is not an
    /// error, the page is used as-is.
    async fn wait_for_settled_dom(&self, page: &Page) {
        let deadline = Instant::now() + Duration::from_millis(self.config.dom_settle_timeout_ms);
        loop {
            let ready = page
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|result| result.into_value::<String>().ok());
            if ready.as_deref() == Some("complete") {
                return;
            }
            if Instant::now() >= deadline {
                self.logger.debug(
                    "DOM settle wait elapsed before readyState reached complete",
                    Some("loader"),
                    None,
                );
                return;
            }
            time::sleep(Duration::from_millis(100)).await;
        }
    }
}

impl LoadedPage {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Serialized DOM of the loaded document.
    pub async fn html(&self) -> Result<String, LoadError> {
        self.page
            .content()
            .await
            .map_err(|err| LoadError::Navigation {
                url: self.url.clone(),
                message: err.to_string(),
            })
    }

    /// Gracefully terminate the browser session and remove any temporary
    /// profile directory.
    pub async fn close(self) {
        let LoadedPage {
            browser,
            handler,
            page,
            temp_user_data_dir,
            ..
        } = self;
        drop(page);
        teardown(browser, handler, temp_user_data_dir).await;
    }
}

async fn teardown(mut browser: Browser, handler: JoinHandle<()>, temp_dir: Option<PathBuf>) {
    if let Err(err) = browser.close().await {
        eprintln!("browser close failed: {err}");
    }
    let _ = browser.wait().await;
    handler.abort();

    if let Some(path) = temp_dir {
        if let Err(err) = fs::remove_dir_all(&path).await {
            eprintln!("failed to remove temporary user data dir {path:?}: {err}");
        }
    }
}

fn spawn_handler(mut handler: chromiumoxide::handler::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                eprintln!("chromiumoxide handler error: {err}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::Verbosity;

    #[test]
    fn rejects_malformed_urls() {
        let err = validate_url("not a url").expect_err("should reject");
        assert!(matches!(err, LoadError::InvalidUrl { .. }));
    }

    #[test]
    fn rejects_non_http_schemes() {
        let err = validate_url("file:///etc/passwd").expect_err("should reject");
        match err {
            LoadError::UnsupportedScheme { scheme, .. } => assert_eq!(scheme, "file"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn accepts_http_and_https() {
        assert!(validate_url("http://example.com").is_ok());
        assert!(validate_url("https://example.com/path?x=1").is_ok());
    }

    #[tokio::test]
    async fn unreachable_cdp_endpoint_is_a_launch_error() {
        let mut config = CheckerConfig::default();
        // Port 9 (discard) has no listener; the websocket connect fails
        // without touching the network.
        config.cdp_url = Some("ws://127.0.0.1:9/devtools/browser/dead".to_string());

        let logger = Arc::new(CheckerLogger::new(Verbosity::Minimal));
        let loader = PageLoader::new(config, logger);

        let err = loader
            .load("https://example.com")
            .await
            .expect_err("connect should fail");
        assert!(matches!(err, LoadError::Launch(_)), "got: {err}");
    }
}
