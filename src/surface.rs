//! The viewer contract the harvester depends on
//!
//! Backends implement [`ViewerSurface`] over whatever actually hosts the
//! viewer: a Chrome tab driven over CDP, or the in-memory
//! [`VirtualViewer`](crate::virtual_viewer::VirtualViewer) used in tests.

use crate::events::EventSender;
use crate::export::ImageFormat;
use crate::store::KeyValueStore;
use crate::Result;

/// Selector matching the canvases the viewer renders pages into
pub const CANVAS_SELECTOR: &str = "canvas.default";

/// A rendered page element, identified by its parent element's id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageElement {
    pub id: String,
}

impl PageElement {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Operations the harvester performs against the viewer
pub trait ViewerSurface {
    /// The viewer's key-value store (local storage)
    fn store(&mut self) -> &mut dyn KeyValueStore;

    /// Start delivering change notifications: intercepted writes of the
    /// settings key, cross-context store changes, counter and title mutations.
    /// Subscribing again replaces the earlier subscription.
    fn subscribe(&mut self, events: EventSender) -> Result<()>;

    /// Current document title
    fn document_title(&mut self) -> Result<String>;

    /// Text of the page counter, `None` when the element is absent
    fn counter_text(&mut self) -> Result<Option<String>>;

    /// Page elements currently present, in document order.
    ///
    /// The viewer virtualizes rendering, so this is a moving window over the
    /// volume rather than the whole volume.
    fn page_elements(&mut self) -> Result<Vec<PageElement>>;

    /// Scroll an element into view so the viewer renders it at full fidelity
    fn scroll_into_view(&mut self, element: &PageElement) -> Result<()>;

    /// Encode the element's pixels as a data URL
    fn encode_image(&mut self, element: &PageElement, format: ImageFormat) -> Result<String>;
}
