//! Sweep and gating behaviour against the in-memory viewer

use canvas_harvest::clock::ManualClock;
use canvas_harvest::download::{DirectorySink, MemorySink};
use canvas_harvest::events::{Command, Event};
use canvas_harvest::export::DownloadedPages;
use canvas_harvest::panel::RecordingView;
use canvas_harvest::session::{Session, SessionOptions};
use canvas_harvest::settings::SETTINGS_KEY;
use canvas_harvest::sweep::{sweep, Pacer, SweepOutcome, SweepPlan};
use canvas_harvest::virtual_viewer::VirtualViewer;
use canvas_harvest::{DelayTime, Error, ImageFormat};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct NoWait {
    pauses: usize,
}

impl Pacer for NoWait {
    fn pause(&mut self, _delay: Duration) {
        self.pauses += 1;
    }
}

fn plan(total: usize) -> SweepPlan {
    SweepPlan {
        expected_total: total,
        delay: DelayTime::default(),
        volume_name: "Vol".to_string(),
        format: ImageFormat::default(),
    }
}

fn session() -> Session {
    Session::new(SessionOptions::default().with_clock(Arc::new(ManualClock::new())))
}

#[test]
fn sweep_captures_every_page_once() {
    let mut viewer = VirtualViewer::new(12);
    let mut sink = MemorySink::new();
    let mut pages = DownloadedPages::new();
    let mut pacer = NoWait::default();

    let report = sweep(&mut viewer, &mut sink, &mut pages, &plan(12), &mut pacer).unwrap();

    assert_eq!(report.outcome, SweepOutcome::Complete);
    assert_eq!(report.exported, 12);
    assert_eq!(pacer.pauses, 12);

    let names = sink.file_names();
    let unique: HashSet<&String> = names.iter().collect();
    assert_eq!(names.len(), 12);
    assert_eq!(unique.len(), 12);
    assert!(names.contains(&"Vol  Page 12.jpg".to_string()));

    // Every export was preceded by a scroll of the same element
    assert_eq!(viewer.encoded_ids().len(), 12);
    for id in viewer.encoded_ids() {
        assert!(viewer.scrolled_ids().contains(id));
    }
}

#[test]
fn wide_render_window_needs_few_passes() {
    let mut viewer = VirtualViewer::new(6).with_window_radius(10);
    let mut sink = MemorySink::new();
    let mut pages = DownloadedPages::new();

    let report = sweep(&mut viewer, &mut sink, &mut pages, &plan(6), &mut NoWait::default()).unwrap();
    assert_eq!(report.passes, 1);
    assert_eq!(report.outcome, SweepOutcome::Complete);
}

#[test]
fn stalled_viewer_ends_the_sweep() {
    let mut viewer = VirtualViewer::new(10).with_render_limit(6);
    let mut sink = MemorySink::new();
    let mut pages = DownloadedPages::new();

    let report = sweep(&mut viewer, &mut sink, &mut pages, &plan(10), &mut NoWait::default()).unwrap();

    assert_eq!(report.outcome, SweepOutcome::Stalled);
    assert_eq!(report.exported, 6);
    assert_eq!(report.total_downloaded, 6);
    assert_eq!(sink.requests().len(), 6);
}

#[test]
fn restart_resumes_without_duplicates() {
    let mut sink = MemorySink::new();
    let mut pages = DownloadedPages::new();

    let mut first = VirtualViewer::new(10).with_render_limit(4);
    sweep(&mut first, &mut sink, &mut pages, &plan(10), &mut NoWait::default()).unwrap();
    assert_eq!(pages.len(), 4);

    // A fresh viewer renders everything at once here; with a narrow window a
    // pass over already-captured pages would count as a stall.
    let mut second = VirtualViewer::new(10).with_window_radius(10);
    let report = sweep(&mut second, &mut sink, &mut pages, &plan(10), &mut NoWait::default()).unwrap();
    assert_eq!(report.exported, 6);
    assert_eq!(report.total_downloaded, 10);

    let names = sink.file_names();
    let unique: HashSet<&String> = names.iter().collect();
    assert_eq!(unique.len(), names.len());

    // Nothing left to do
    let report = sweep(&mut second, &mut sink, &mut pages, &plan(10), &mut NoWait::default()).unwrap();
    assert_eq!(report.exported, 0);
    assert_eq!(report.passes, 0);
    assert_eq!(sink.requests().len(), 10);
}

#[test]
fn pages_land_in_the_output_directory() {
    let dir = std::env::temp_dir().join(format!("canvas-harvest-sweep-{}", std::process::id()));
    let mut sink = DirectorySink::new(&dir).unwrap();
    let mut viewer = VirtualViewer::new(3);
    let mut pages = DownloadedPages::new();
    let plan = SweepPlan { format: ImageFormat::Png, ..plan(3) };

    sweep(&mut viewer, &mut sink, &mut pages, &plan, &mut NoWait::default()).unwrap();

    for n in 1..=3 {
        let bytes = std::fs::read(dir.join(format!("Vol  Page {}.png", n))).unwrap();
        assert_eq!(bytes, format!("image/png pixels of page {}", n).into_bytes());
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn wrong_settings_keep_the_trigger_disabled() {
    let mut viewer = VirtualViewer::new(5).with_settings_blob(Some(r#"{"viewerPageTransitionAxis":"horizontal","viewerSpreadDouble":true}"#));
    let mut sink = MemorySink::new();
    let mut view = RecordingView::default();
    let mut session = session();
    session.attach(&mut viewer, &mut view).unwrap();

    let panel = view.last().unwrap();
    assert_eq!(panel.page_transition.to_string(), "❌ Page Transition: horizontal");
    assert_eq!(panel.spread_double.to_string(), "❌ Spread Double: true");
    assert!(!panel.button.enabled);

    assert!(matches!(session.start(&mut viewer, &mut sink, &mut view), Err(Error::NotReady(_))));
    assert!(sink.requests().is_empty());
}

#[test]
fn malformed_settings_are_reported_not_raised() {
    let mut viewer = VirtualViewer::new(5).with_settings_blob(Some("{not json"));
    let mut view = RecordingView::default();
    let mut session = session();
    session.attach(&mut viewer, &mut view).unwrap();

    let panel = view.last().unwrap();
    assert_eq!(panel.page_transition.to_string(), "⚠️ Page Transition: error");
    assert!(!session.is_ready());
}

#[test]
fn missing_counter_blocks_the_sweep() {
    let mut viewer = VirtualViewer::new(5).without_counter();
    let mut sink = MemorySink::new();
    let mut view = RecordingView::default();
    let mut session = session();
    session.attach(&mut viewer, &mut view).unwrap();

    assert_eq!(view.last().unwrap().page_position.to_string(), "⚠️ Current Page: not found");
    assert!(session.start(&mut viewer, &mut sink, &mut view).is_err());
}

#[test]
fn fixing_the_viewer_enables_the_trigger() {
    let mut viewer = VirtualViewer::new(4).with_settings_blob(None).with_current_page(2);
    let mut sink = MemorySink::new();
    let mut view = RecordingView::default();
    let mut session = session();
    session.attach(&mut viewer, &mut view).unwrap();
    assert!(!session.is_ready());

    viewer
        .write_store(SETTINGS_KEY, r#"{"viewerPageTransitionAxis":"vertical","viewerSpreadDouble":"false"}"#)
        .unwrap();
    viewer.go_to_page(1);
    session.pump(&mut viewer, &mut sink, &mut view);
    assert!(session.is_ready());

    session.dispatch(Event::Command(Command::Start(None)), &mut viewer, &mut sink, &mut view);
    assert_eq!(sink.requests().len(), 4);
    assert_eq!(session.downloaded().len(), 4);
}
