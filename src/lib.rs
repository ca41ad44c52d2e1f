//! Canvas Harvest
//!
//! Saves every page of a volume open in the NFBR web document viewer. The
//! viewer renders pages lazily into canvas elements as the reader scrolls;
//! the harvester scrolls through them, waits for each to render, encodes it
//! and delivers it as a download named after the volume.
//!
//! Before a sweep may start the viewer has to be configured for it: pages
//! laid out vertically, spread mode off, positioned on page 1. The session
//! watches those conditions continuously and only enables the sweep when they
//! all hold.
//!
//! # Architecture
//!
//! - [`settings`], [`position`] and [`readiness`] are pure observers over the
//!   viewer's raw state.
//! - [`sweep`] and [`export`] capture pages through the [`ViewerSurface`]
//!   trait and hand files to a [`download::DownloadSink`].
//! - [`session`] owns the state of one session and applies
//!   [`events::Event`]s from the viewer and the user one at a time.
//! - Backends: [`cdp`] drives a Chrome tab (feature `cdp`, default), and
//!   [`virtual_viewer`] is an in-memory viewer for tests and dry runs.
//!
//! # Example
//!
//! ```
//! use canvas_harvest::download::MemorySink;
//! use canvas_harvest::panel::RecordingView;
//! use canvas_harvest::session::{Session, SessionOptions};
//! use canvas_harvest::virtual_viewer::VirtualViewer;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = std::sync::Arc::new(canvas_harvest::clock::ManualClock::new());
//! let mut session = Session::new(SessionOptions::default().with_clock(clock));
//! let mut viewer = VirtualViewer::new(3).with_title("My Book");
//! let mut sink = MemorySink::new();
//! let mut view = RecordingView::default();
//!
//! session.attach(&mut viewer, &mut view)?;
//! let report = session.start(&mut viewer, &mut sink, &mut view)?;
//! assert_eq!(report.exported, 3);
//! assert_eq!(sink.file_names()[0], "My Book  Page 1.jpg");
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

pub mod error;
pub use error::{Error, Result};

pub mod clock;
pub mod download;
pub mod events;
pub mod export;
pub mod panel;
pub mod position;
pub mod preferences;
pub mod readiness;
pub mod session;
pub mod settings;
pub mod store;
pub mod surface;
pub mod sweep;
pub mod virtual_viewer;

#[cfg(feature = "cdp")]
pub mod cdp;

// Async-friendly handle over a session running on its own thread
pub mod async_api;

pub use async_api::{Harvester, HarvesterHandle};
pub use export::ImageFormat;
pub use readiness::DelayTime;
pub use surface::{PageElement, ViewerSurface};

/// How downloads leave the browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadMode {
    /// Decode each page in-process and write it to `output_dir`
    #[default]
    Directory,
    /// Click a synthetic download link in the page and let the browser save it
    Anchor,
}

/// Configuration for a harvesting run
///
/// The defaults open a visible browser window, since the reader usually has
/// to sign in and adjust the viewer settings by hand before a sweep can start.
///
/// # Examples
///
/// ```
/// let cfg = canvas_harvest::HarvestConfig::default();
/// assert!(!cfg.headless);
/// assert_eq!(cfg.format.extension(), "jpg");
/// ```
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Browser window size
    pub viewport: Viewport,
    /// Timeout for page loads and browser calls in milliseconds
    pub timeout_ms: u64,
    /// Run the browser without a window
    pub headless: bool,
    /// Browser profile directory; keeps the viewer's sign-in and local storage
    pub user_data_dir: Option<PathBuf>,
    /// Where `DownloadMode::Directory` writes pages
    pub output_dir: PathBuf,
    pub format: ImageFormat,
    pub download: DownloadMode,
    /// Overrides the saved delay preference
    pub delay: Option<DelayTime>,
    /// Overrides the volume name taken from the document title
    pub volume_name: Option<String>,
    /// Start sweeping as soon as the viewer is ready
    pub auto_start: bool,
    /// With `auto_start`, stop once that sweep finishes
    pub exit_after_sweep: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            timeout_ms: 30000,
            headless: false,
            user_data_dir: None,
            output_dir: PathBuf::from("."),
            format: ImageFormat::default(),
            download: DownloadMode::default(),
            delay: None,
            volume_name: None,
            auto_start: false,
            exit_after_sweep: true,
        }
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}
