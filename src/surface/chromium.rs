//! `FeedSurface` implementation backed by a chromiumoxide page.
//!
//! Element addressing is re-resolved on every call: the feed is virtualized,
//! so node handles held across a scroll are routinely stale. Lookups that
//! fail structurally (selector matches nothing, node detached mid-read) are
//! reported as absent rather than errors where the trait contract allows it.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;

use super::{FeedSurface, ReadyState};

/// How long a single simulated click may take before it is skipped. Expand
/// controls on a busy feed frequently never acknowledge the interaction.
const CLICK_TIMEOUT: Duration = Duration::from_millis(800);

pub struct ChromiumSurface {
    page: Page,
}

impl ChromiumSurface {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn nth(&self, selector: &str, index: usize) -> Option<Element> {
        let mut elements = self.page.find_elements(selector).await.ok()?;
        if index < elements.len() {
            Some(elements.swap_remove(index))
        } else {
            None
        }
    }

    async fn nth_within(
        &self,
        scope: &str,
        scope_index: usize,
        selector: &str,
        index: usize,
    ) -> Option<Element> {
        let container = self.nth(scope, scope_index).await?;
        let mut elements = container.find_elements(selector).await.ok()?;
        if index < elements.len() {
            Some(elements.swap_remove(index))
        } else {
            None
        }
    }

    async fn click_element(&self, element: Element) -> Result<()> {
        tokio::time::timeout(CLICK_TIMEOUT, element.click())
            .await
            .context("Click timed out")?
            .context("Click failed")?;
        Ok(())
    }
}

#[async_trait]
impl FeedSurface for ChromiumSurface {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Navigation to {url} failed"))?;
        Ok(())
    }

    async fn ready_state(&self) -> Result<ReadyState> {
        let value: String = self
            .page
            .evaluate("document.readyState")
            .await
            .context("Failed to evaluate document.readyState")?
            .into_value()
            .map_err(|e| anyhow::anyhow!("readyState was not a string: {e}"))?;
        Ok(ReadyState::from_document(&value))
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        // A selector matching nothing is a count of zero, not an error.
        Ok(self
            .page
            .find_elements(selector)
            .await
            .map(|elements| elements.len())
            .unwrap_or(0))
    }

    async fn inner_text(&self, selector: &str, index: usize) -> Result<Option<String>> {
        let Some(element) = self.nth(selector, index).await else {
            return Ok(None);
        };
        Ok(element.inner_text().await.ok().flatten())
    }

    async fn attribute(
        &self,
        selector: &str,
        index: usize,
        name: &str,
    ) -> Result<Option<String>> {
        let Some(element) = self.nth(selector, index).await else {
            return Ok(None);
        };
        Ok(element.attribute(name).await.ok().flatten())
    }

    async fn click(&self, selector: &str, index: usize) -> Result<()> {
        let element = self
            .nth(selector, index)
            .await
            .with_context(|| format!("No element for {selector}[{index}]"))?;
        self.click_element(element).await
    }

    async fn count_within(
        &self,
        scope: &str,
        scope_index: usize,
        selector: &str,
    ) -> Result<usize> {
        let Some(container) = self.nth(scope, scope_index).await else {
            return Ok(0);
        };
        Ok(container
            .find_elements(selector)
            .await
            .map(|elements| elements.len())
            .unwrap_or(0))
    }

    async fn inner_text_within(
        &self,
        scope: &str,
        scope_index: usize,
        selector: &str,
        index: usize,
    ) -> Result<Option<String>> {
        let Some(element) = self.nth_within(scope, scope_index, selector, index).await else {
            return Ok(None);
        };
        Ok(element.inner_text().await.ok().flatten())
    }

    async fn attribute_within(
        &self,
        scope: &str,
        scope_index: usize,
        selector: &str,
        index: usize,
        name: &str,
    ) -> Result<Option<String>> {
        let Some(element) = self.nth_within(scope, scope_index, selector, index).await else {
            return Ok(None);
        };
        Ok(element.attribute(name).await.ok().flatten())
    }

    async fn click_within(
        &self,
        scope: &str,
        scope_index: usize,
        selector: &str,
        index: usize,
    ) -> Result<()> {
        let element = self
            .nth_within(scope, scope_index, selector, index)
            .await
            .with_context(|| format!("No element for {scope}[{scope_index}] {selector}[{index}]"))?;
        self.click_element(element).await
    }

    async fn scroll_by(&self, pixels: i64) -> Result<()> {
        self.page
            .evaluate(format!("window.scrollBy(0, {pixels})"))
            .await
            .context("scrollBy failed")?;
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.page
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .context("scrollTo bottom failed")?;
        Ok(())
    }

    async fn document_height(&self) -> Result<i64> {
        self.page
            .evaluate("document.body.scrollHeight")
            .await
            .context("Failed to evaluate scrollHeight")?
            .into_value()
            .map_err(|e| anyhow::anyhow!("scrollHeight was not a number: {e}"))
    }

    async fn current_url(&self) -> Result<Option<String>> {
        self.page.url().await.context("Failed to read current URL")
    }

    async fn page_title(&self) -> Result<String> {
        Ok(self
            .page
            .get_title()
            .await
            .context("Failed to read page title")?
            .unwrap_or_default())
    }

    async fn body_text(&self) -> Result<String> {
        let Some(body) = self.nth("body", 0).await else {
            return Ok(String::new());
        };
        Ok(body.inner_text().await.ok().flatten().unwrap_or_default())
    }
}
