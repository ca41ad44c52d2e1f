//! In-memory viewer with virtualized page rendering
//!
//! Behaves like the real viewer as far as the harvester can tell: only the
//! pages around the current one exist as elements, scrolling an element into
//! view makes it the current page and moves the rendered window, and the
//! settings live in an intercepted key-value store. Used by tests, benches
//! and dry runs.

use crate::events::{forward_store_writes, Event, EventSender};
use crate::export::{ImageFormat, PAGE_ID_MARKER};
use crate::settings::{ViewerSettings, SETTINGS_KEY};
use crate::store::{InterceptingStore, KeyValueStore, MemoryStore};
use crate::surface::{PageElement, ViewerSurface};
use crate::{Error, Result};
use base64::Engine as Base64Engine;

pub struct VirtualViewer {
    title: String,
    store: InterceptingStore<MemoryStore>,
    total_pages: usize,
    render_limit: usize,
    window_radius: usize,
    current_page: usize,
    counter_visible: bool,
    events: Option<EventSender>,
    scrolled: Vec<String>,
    encoded: Vec<String>,
}

impl VirtualViewer {
    /// A volume of `total_pages` pages, correctly configured, on page 1
    pub fn new(total_pages: usize) -> Self {
        let mut store = InterceptingStore::new(MemoryStore::new());
        store.inner_mut().put(SETTINGS_KEY, &ViewerSettings::vertical_single_page().to_blob());
        Self {
            title: "Virtual Volume".to_string(),
            store,
            total_pages,
            render_limit: total_pages,
            window_radius: 1,
            current_page: 1,
            counter_visible: true,
            events: None,
            scrolled: Vec::new(),
            encoded: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Number of pages rendered on each side of the current page
    pub fn with_window_radius(mut self, radius: usize) -> Self {
        self.window_radius = radius;
        self
    }

    /// Never render pages past `limit`, whatever the counter says
    pub fn with_render_limit(mut self, limit: usize) -> Self {
        self.render_limit = limit.min(self.total_pages);
        self
    }

    /// Replace the stored settings blob (`None` removes it)
    pub fn with_settings_blob(mut self, blob: Option<&str>) -> Self {
        let inner = self.store.inner_mut();
        match blob {
            Some(blob) => inner.put(SETTINGS_KEY, blob),
            None => inner.delete(SETTINGS_KEY),
        }
        self
    }

    pub fn with_current_page(mut self, page: usize) -> Self {
        self.current_page = page;
        self
    }

    pub fn without_counter(mut self) -> Self {
        self.counter_visible = false;
        self
    }

    /// Change the title as the page would once it finishes loading
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.emit(Event::TitleChanged(self.title.clone()));
    }

    /// A write made by the viewer page itself (goes through interception)
    pub fn write_store(&mut self, key: &str, value: &str) -> Result<()> {
        self.store.set(key, value)
    }

    /// A write made by another tab: bypasses interception, arrives as a
    /// cross-context change notification instead
    pub fn external_store_write(&mut self, key: &str, value: Option<&str>) -> Result<()> {
        let inner = self.store.inner_mut();
        match value {
            Some(v) => inner.put(key, v),
            None => inner.delete(key),
        }
        self.emit(Event::StorageChanged {
            key: Some(key.to_string()),
            value: value.map(str::to_string),
        });
        Ok(())
    }

    /// Jump to a page as if the user scrolled there
    pub fn go_to_page(&mut self, page: usize) {
        if self.current_page != page {
            self.current_page = page;
            let text = self.counter();
            self.emit(Event::CounterChanged(text));
        }
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    /// Ids in the order they were scrolled into view
    pub fn scrolled_ids(&self) -> &[String] {
        &self.scrolled
    }

    /// Ids in the order they were encoded
    pub fn encoded_ids(&self) -> &[String] {
        &self.encoded
    }

    fn counter(&self) -> Option<String> {
        self.counter_visible
            .then(|| format!("{}/{}", self.current_page, self.total_pages))
    }

    fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    fn page_number(&self, element: &PageElement) -> Option<usize> {
        element
            .id
            .strip_prefix(PAGE_ID_MARKER)
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| (1..=self.render_limit).contains(n))
    }
}

impl ViewerSurface for VirtualViewer {
    fn store(&mut self) -> &mut dyn KeyValueStore {
        &mut self.store
    }

    fn subscribe(&mut self, events: EventSender) -> Result<()> {
        // A new subscription replaces the previous one
        let hooks = self.store.hooks();
        hooks.clear();
        forward_store_writes(&hooks, SETTINGS_KEY, events.clone());
        self.events = Some(events);
        Ok(())
    }

    fn document_title(&mut self) -> Result<String> {
        Ok(self.title.clone())
    }

    fn counter_text(&mut self) -> Result<Option<String>> {
        Ok(self.counter())
    }

    fn page_elements(&mut self) -> Result<Vec<PageElement>> {
        let lo = self.current_page.saturating_sub(self.window_radius).max(1);
        let hi = (self.current_page + self.window_radius).min(self.render_limit);
        Ok((lo..=hi).map(|n| PageElement::new(format!("{}{}", PAGE_ID_MARKER, n))).collect())
    }

    fn scroll_into_view(&mut self, element: &PageElement) -> Result<()> {
        let page = self
            .page_number(element)
            .ok_or_else(|| Error::ScriptError(format!("no page element {}", element.id)))?;
        self.scrolled.push(element.id.clone());
        self.go_to_page(page);
        Ok(())
    }

    fn encode_image(&mut self, element: &PageElement, format: ImageFormat) -> Result<String> {
        let page = self.page_number(element).ok_or_else(|| Error::ExportError {
            id: element.id.clone(),
            reason: "element is not rendered".into(),
        })?;
        self.encoded.push(element.id.clone());
        let pixels = format!("{} pixels of page {}", format.mime(), page);
        Ok(format!(
            "data:{};base64,{}",
            format.mime(),
            base64::engine::general_purpose::STANDARD.encode(pixels)
        ))
    }
}
