//! Chrome-backed browser sessions
//!
//! Each [`ChromeSession`] is its own browser process with a single tab and a
//! background task driving the DevTools connection. Sessions are launched
//! with the stealth flags from [`crate::get_chrome_args`], and every new
//! document gets the automation globals the site probes for removed.

use crate::{create_browser_config, Config, HarvestError, PageSession, SessionFactory};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

const HIDE_AUTOMATION_SCRIPT: &str = "delete window.cdc_adoQpoasnfa76pfcZLmcfl_Array;\n\
     delete window.cdc_adoQpoasnfa76pfcZLmcfl_Promise;\n\
     delete window.cdc_adoQpoasnfa76pfcZLmcfl_Symbol;";

const IS_VISIBLE_FN: &str = "function() {\
     const rect = this.getBoundingClientRect();\
     const style = window.getComputedStyle(this);\
     return rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';\
     }";

pub struct ChromeSession {
    id: usize,
    browser: Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    navigation_timeout: Duration,
    poll_interval: Duration,
    closed: bool,
}

#[async_trait]
impl PageSession for ChromeSession {
    type Element = Element;

    async fn navigate(&self, url: &str) -> Result<(), HarvestError> {
        debug!("Session {} navigating to {}", self.id, url);
        match timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(HarvestError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(HarvestError::Timeout(self.navigation_timeout)),
        }
    }

    async fn wait_visible(&self, selector: &str, limit: Duration) -> Result<(), HarvestError> {
        let poll = async {
            loop {
                if let Ok(element) = self.page.find_element(selector).await {
                    let visible = element
                        .call_js_fn(IS_VISIBLE_FN, false)
                        .await
                        .ok()
                        .and_then(|returns| returns.result.value)
                        .and_then(|value| value.as_bool())
                        .unwrap_or(false);
                    if visible {
                        return;
                    }
                }
                sleep(self.poll_interval).await;
            }
        };

        timeout(limit, poll)
            .await
            .map_err(|_| HarvestError::Timeout(limit))
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Element>, HarvestError> {
        self.page
            .find_elements(selector)
            .await
            .map_err(|e| HarvestError::ElementNotFound(format!("{selector}: {e}")))
    }

    async fn find_one(
        &self,
        parent: Option<&Element>,
        selector: &str,
    ) -> Result<Element, HarvestError> {
        let found = match parent {
            Some(parent) => parent.find_element(selector).await,
            None => self.page.find_element(selector).await,
        };
        found.map_err(|e| HarvestError::ElementNotFound(format!("{selector}: {e}")))
    }

    async fn text_of(&self, element: &Element) -> Result<String, HarvestError> {
        element
            .inner_text()
            .await
            .map_err(|e| HarvestError::PageError(e.to_string()))?
            .map(|text| text.trim().to_string())
            .ok_or_else(|| HarvestError::PageError("element has no text".to_string()))
    }

    async fn attribute_of(&self, element: &Element, name: &str) -> Result<String, HarvestError> {
        element
            .attribute(name)
            .await
            .map_err(|e| HarvestError::PageError(e.to_string()))?
            .ok_or_else(|| HarvestError::ElementNotFound(format!("attribute {name}")))
    }

    async fn close(&mut self) -> Result<(), HarvestError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let browser = self.browser.get_mut();
        let result = browser.close().await;
        let _ = browser.wait().await;
        self.handler.abort();
        debug!("Session {} closed", self.id);

        result
            .map(|_| ())
            .map_err(|e| HarvestError::SessionCrashed(e.to_string()))
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Session {} dropped without being closed", self.id);
            self.handler.abort();
        }
    }
}

/// Launches one Chrome process per session
pub struct ChromeSessionFactory {
    config: Config,
    next_instance: AtomicUsize,
}

impl ChromeSessionFactory {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            next_instance: AtomicUsize::new(0),
        }
    }

    async fn prepare_page(&self, page: &Page) -> Result<(), HarvestError> {
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            HIDE_AUTOMATION_SCRIPT,
        ))
        .await
        .map_err(|e| HarvestError::BrowserLaunchFailed(format!("stealth script: {e}")))?;

        if let Some(cookies) = &self.config.browser.cookies {
            for (name, value) in parse_cookie_header(cookies) {
                let param = CookieParam::builder()
                    .name(name.as_str())
                    .value(value.as_str())
                    .domain(self.config.browser.cookie_domain.as_str())
                    .build();

                match param {
                    Ok(param) => {
                        if let Err(e) = page.set_cookie(param).await {
                            warn!("Failed to set cookie {}: {}", name, e);
                        }
                    }
                    Err(e) => warn!("Failed to build cookie {}: {}", name, e),
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl SessionFactory for ChromeSessionFactory {
    type Session = ChromeSession;

    async fn create(&self) -> Result<ChromeSession, HarvestError> {
        let id = self.next_instance.fetch_add(1, Ordering::Relaxed);
        let browser_config = create_browser_config(&self.config, Some(id))?;

        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| HarvestError::BrowserLaunchFailed(e.to_string()))?;

        // The handler is a stream that must be polled for the connection to make progress
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("Session {} handler error: {}", id, e);
                    break;
                }
            }
            debug!("Session {} handler stream ended", id);
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(HarvestError::BrowserLaunchFailed(e.to_string()));
            }
        };

        let mut session = ChromeSession {
            id,
            browser: Mutex::new(browser),
            page,
            handler: handler_task,
            navigation_timeout: self.config.navigation_timeout,
            poll_interval: self.config.wait_poll_interval,
            closed: false,
        };

        if let Err(e) = self.prepare_page(&session.page).await {
            let _ = session.close().await;
            return Err(e);
        }

        info!("Browser session {} launched", id);
        Ok(session)
    }
}

/// Split a `Cookie` header value into name/value pairs
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cookie_header() {
        let pairs = parse_cookie_header("yandexuid=123; session=a=b;  ; broken; =x");
        assert_eq!(
            pairs,
            vec![
                ("yandexuid".to_string(), "123".to_string()),
                ("session".to_string(), "a=b".to_string()),
            ]
        );
    }

    #[test]
    fn test_factory_assigns_instance_ids() {
        let factory = ChromeSessionFactory::new(Config::default());
        assert_eq!(factory.next_instance.fetch_add(1, Ordering::Relaxed), 0);
        assert_eq!(factory.next_instance.load(Ordering::Relaxed), 1);
    }
}
