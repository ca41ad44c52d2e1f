//! Page sweep engine
//!
//! The viewer only materializes a few page elements at a time and offers no
//! way to ask for page N directly. Scrolling is the only trigger, so the sweep
//! repeatedly enumerates whatever is rendered, scrolls through it and exports
//! every element it has not seen yet. A pass that exports nothing ends the
//! sweep: either everything is captured or the viewer stopped producing new
//! elements, and retrying cannot change that.
//!
//! An element that cannot be scrolled to or encoded is skipped and picked up
//! again by the next pass. Failures of the viewer connection or the sink end
//! the sweep.
//!
//! Exports are strictly sequential because each one depends on its element
//! having been scrolled into view and rendered just before.

use crate::download::DownloadSink;
use crate::export::{export_page, DownloadedPages, ImageFormat};
use crate::readiness::DelayTime;
use crate::surface::ViewerSurface;
use crate::Result;
use log::{debug, info, warn};
use std::time::Duration;

/// Parameters of one sweep
#[derive(Debug, Clone)]
pub struct SweepPlan {
    /// Page count reported by the viewer
    pub expected_total: usize,
    /// Wait between scrolling an element into view and encoding it
    pub delay: DelayTime,
    pub volume_name: String,
    pub format: ImageFormat,
}

/// Where the sweep yields control
pub trait Pacer {
    /// Wait for the viewer to render. This is the sweep's only suspension
    /// point; implementations may process other work while waiting.
    fn pause(&mut self, delay: Duration);

    /// Called after every export
    fn progress(&mut self, _downloaded: usize, _total: usize) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Every expected page has been captured
    Complete,
    /// A pass exported nothing before the expected count was reached
    Stalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Pages exported by this sweep
    pub exported: usize,
    /// Pages captured in the session, including earlier sweeps
    pub total_downloaded: usize,
    /// Enumeration passes performed
    pub passes: usize,
    pub outcome: SweepOutcome,
}

/// Run a sweep until coverage is complete or a pass stalls.
///
/// Already-captured ids are skipped, so calling this again after an
/// interruption resumes where the previous sweep stopped.
pub fn sweep(
    viewer: &mut dyn ViewerSurface,
    sink: &mut dyn DownloadSink,
    pages: &mut DownloadedPages,
    plan: &SweepPlan,
    pacer: &mut dyn Pacer,
) -> Result<SweepReport> {
    let delay = plan.delay.as_duration();
    let mut exported = 0;
    let mut passes = 0;
    let mut outcome = SweepOutcome::Complete;

    while pages.len() < plan.expected_total {
        passes += 1;
        let elements = viewer.page_elements()?;
        debug!("Pass {}: {} elements rendered", passes, elements.len());

        let mut exported_this_pass = 0;
        for element in &elements {
            // An element that vanished since enumeration is left for the next pass
            match viewer.scroll_into_view(element) {
                Ok(()) => {}
                Err(e) if e.is_element_error() => {
                    warn!("Skipping {}: {}", element.id, e);
                    continue;
                }
                Err(e) => return Err(e),
            }
            if pages.contains(&element.id) {
                continue;
            }

            pacer.pause(delay);

            match export_page(viewer, sink, pages, element, &plan.volume_name, plan.format) {
                Ok(true) => {
                    exported_this_pass += 1;
                    pacer.progress(pages.len(), plan.expected_total);
                }
                Ok(false) => {}
                Err(e) if e.is_element_error() => warn!("Skipping {}: {}", element.id, e),
                Err(e) => return Err(e),
            }
        }

        exported += exported_this_pass;
        if exported_this_pass == 0 {
            outcome = SweepOutcome::Stalled;
            break;
        }
    }

    info!(
        "Sweep finished after {} passes: {} exported, {}/{} captured{}",
        passes,
        exported,
        pages.len(),
        plan.expected_total,
        if outcome == SweepOutcome::Stalled { " (stalled)" } else { "" }
    );

    Ok(SweepReport { exported, total_downloaded: pages.len(), passes, outcome })
}
