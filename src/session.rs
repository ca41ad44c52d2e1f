//! Session context and control loop
//!
//! A [`Session`] owns all mutable state of one harvesting session: the latest
//! observer reports, the delay and volume name fields, the set of captured
//! pages and the event queue. Everything runs on the thread that calls
//! [`Session::run`]. While a sweep waits for the viewer to render, pending
//! events are applied at the wait points, so observations stay live during a
//! sweep without ever interleaving with an export.

use crate::clock::{Clock, SystemClock};
use crate::download::DownloadSink;
use crate::events::{Command, Event, EventBus, EventSender, Reply};
use crate::export::{DownloadedPages, ImageFormat};
use crate::panel::{ButtonState, DelayField, Indicator, IndicatorRow, PanelState, StatusView};
use crate::position::{self, PositionReport, PositionStatus};
use crate::preferences::{load_delay, save_delay};
use crate::readiness::{self, format_seconds, DelayTime};
use crate::settings::{self, SettingsReport, SettingsStatus, SETTINGS_KEY};
use crate::surface::ViewerSurface;
use crate::sweep::{sweep, Pacer, SweepPlan, SweepReport};
use crate::{Error, HarvestConfig, Result};
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long "Download Complete!" stays up before the session goes idle
pub const COMPLETE_LINGER: Duration = Duration::from_secs(3);

const POLL_INTERVAL: Duration = Duration::from_millis(200);
const PAUSE_SLICE: Duration = Duration::from_millis(100);

const IDLE_LABEL: &str = "Download Volume";
const COMPLETE_LABEL: &str = "Download Complete!";

/// Session behaviour knobs
#[derive(Clone)]
pub struct SessionOptions {
    pub format: ImageFormat,
    /// Delay to use instead of the saved preference (saved when set)
    pub delay: Option<DelayTime>,
    /// Volume name to use instead of the document title
    pub volume_name: Option<String>,
    /// Start a sweep as soon as the session first becomes ready
    pub auto_start: bool,
    /// Stop the loop after the auto-started sweep
    pub exit_after_sweep: bool,
    pub clock: Arc<dyn Clock>,
}

impl SessionOptions {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            format: config.format,
            delay: config.delay,
            volume_name: config.volume_name.clone(),
            auto_start: config.auto_start,
            exit_after_sweep: config.auto_start && config.exit_after_sweep,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&HarvestConfig::default())
    }
}

/// What the action trigger is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// `progress` is `(captured, expected)` once the first page is exported
    Downloading { progress: Option<(usize, usize)> },
    Complete { until: Instant },
}

#[derive(Debug, Clone, Default)]
struct VolumeName {
    title: String,
    title_settled: bool,
    user: Option<String>,
}

impl VolumeName {
    fn current(&self) -> &str {
        self.user.as_deref().unwrap_or(&self.title)
    }

    // The title is tracked until it first becomes non-empty.
    fn observe_title(&mut self, title: &str) {
        if self.title_settled || title.is_empty() {
            return;
        }
        self.title = title.to_string();
        self.title_settled = true;
        info!("Volume name updated to: {}", self.current());
    }

    fn set_user(&mut self, name: &str) {
        let name = name.trim();
        self.user = (!name.is_empty()).then(|| name.to_string());
    }
}

#[derive(Debug, Clone)]
struct DelayInput {
    text: String,
    millis: f64,
}

impl From<DelayTime> for DelayInput {
    fn from(delay: DelayTime) -> Self {
        Self { text: format_seconds(delay.as_seconds()), millis: delay.as_millis() as f64 }
    }
}

enum Action {
    Start(Reply<Result<SweepReport>>),
    Shutdown(Reply<()>),
}

fn respond<T>(reply: Reply<T>, value: T) {
    if let Some(tx) = reply {
        let _ = tx.send(value);
    }
}

struct SessionState {
    settings: Option<SettingsReport>,
    position: Option<PositionReport>,
    delay: DelayTime,
    delay_input: DelayInput,
    pending_delay_save: Option<DelayTime>,
    volume: VolumeName,
    phase: Phase,
    last_panel: Option<PanelState>,
}

impl SessionState {
    fn new(volume_override: Option<&str>) -> Self {
        let mut volume = VolumeName::default();
        if let Some(name) = volume_override {
            volume.set_user(name);
        }
        Self {
            settings: None,
            position: None,
            delay: DelayTime::default(),
            delay_input: DelayTime::default().into(),
            pending_delay_save: None,
            volume,
            phase: Phase::Idle,
            last_panel: None,
        }
    }

    fn checks_pass(&self) -> bool {
        match (&self.settings, &self.position) {
            (Some(s), Some(p)) => readiness::compute_ready(s, p, self.delay_input.millis),
            _ => false,
        }
    }

    fn is_ready(&self) -> bool {
        self.phase == Phase::Idle && self.checks_pass()
    }

    fn blockers(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.phase != Phase::Idle {
            out.push("a sweep is running or just finished".to_string());
        }
        match (&self.settings, &self.position) {
            (Some(s), Some(p)) => {
                out.extend(readiness::blockers(s, p, self.delay_input.millis).into_iter().map(String::from))
            }
            _ => out.push("viewer has not been checked yet".to_string()),
        }
        out
    }

    fn set_delay(&mut self, text: &str) -> Result<DelayTime> {
        let text = text.trim();
        let seconds = text.parse::<f64>().unwrap_or(f64::NAN);
        self.delay_input = DelayInput { text: text.to_string(), millis: seconds * 1000.0 };
        let delay = DelayTime::from_seconds(seconds)?;
        self.delay = delay;
        self.pending_delay_save = Some(delay);
        Ok(delay)
    }

    fn apply(&mut self, event: Event) -> Option<Action> {
        match event {
            Event::StoreWritten { key, value } => {
                if key == SETTINGS_KEY {
                    self.settings = Some(settings::evaluate(Some(&value)));
                }
                None
            }
            Event::StorageChanged { key: Some(key), value } if key == SETTINGS_KEY => {
                self.settings = Some(settings::evaluate(value.as_deref()));
                None
            }
            Event::StorageChanged { .. } => None,
            Event::CounterChanged(text) => {
                self.position = Some(position::evaluate(text.as_deref()));
                None
            }
            Event::TitleChanged(title) => {
                self.volume.observe_title(&title);
                None
            }
            Event::Command(command) => match command {
                Command::SetDelay(text, reply) => {
                    let result = self.set_delay(&text);
                    if let Err(e) = &result {
                        warn!("{}", e);
                    }
                    respond(reply, result);
                    None
                }
                Command::SetVolumeName(name, reply) => {
                    self.volume.set_user(&name);
                    info!("Volume name set to: {}", self.volume.current());
                    respond(reply, ());
                    None
                }
                Command::Status(reply) => {
                    respond(reply, self.panel());
                    None
                }
                Command::Start(reply) => Some(Action::Start(reply)),
                Command::Shutdown(reply) => Some(Action::Shutdown(reply)),
            },
        }
    }

    fn panel(&self) -> PanelState {
        let settings_row = |label: &'static str, report: &SettingsReport, ok: bool, value: String| IndicatorRow {
            label,
            indicator: match report.status {
                SettingsStatus::NotFound | SettingsStatus::Error(_) => Indicator::Warning,
                SettingsStatus::Parsed(_) if ok => Indicator::Ok,
                SettingsStatus::Parsed(_) => Indicator::Wrong,
            },
            value,
        };

        let (page_transition, spread_double) = match &self.settings {
            Some(r) => (
                settings_row("Page Transition", r, r.page_transition_ok, r.page_transition_display()),
                settings_row("Spread Double", r, r.spread_double_ok, r.spread_double_display()),
            ),
            None => (IndicatorRow::pending("Page Transition"), IndicatorRow::pending("Spread Double")),
        };

        let page_position = match &self.position {
            None => IndicatorRow::pending("Current Page"),
            Some(report) => IndicatorRow {
                label: "Current Page",
                indicator: match (&report.status, report.on_first_page) {
                    (PositionStatus::Found(_), true) => Indicator::Ok,
                    _ => Indicator::Warning,
                },
                value: report.display(),
            },
        };

        let label = match self.phase {
            Phase::Idle => IDLE_LABEL.to_string(),
            Phase::Downloading { progress: None } => "Downloading...".to_string(),
            Phase::Downloading { progress: Some((done, total)) } => format!("Downloading... {}/{}", done, total),
            Phase::Complete { .. } => COMPLETE_LABEL.to_string(),
        };

        PanelState {
            page_transition,
            spread_double,
            page_position,
            volume_name: self.volume.current().to_string(),
            delay: DelayField {
                text: self.delay_input.text.clone(),
                flagged: !readiness::delay_in_range(self.delay_input.millis),
            },
            button: ButtonState { enabled: self.is_ready(), label },
        }
    }

    // Only re-render when something visible changed, so repeated triggers
    // for the same state stay quiet.
    fn render(&mut self, view: &mut dyn StatusView) {
        let panel = self.panel();
        if self.last_panel.as_ref() != Some(&panel) {
            view.render(&panel);
            self.last_panel = Some(panel);
        }
    }
}

/// Pacer that keeps applying observations while the sweep waits
struct SessionPacer<'a> {
    state: &'a mut SessionState,
    events: &'a EventBus,
    deferred: &'a mut VecDeque<Action>,
    view: &'a mut dyn StatusView,
    clock: &'a dyn Clock,
}

impl SessionPacer<'_> {
    fn drain(&mut self) {
        while let Some(event) = self.events.try_recv() {
            match self.state.apply(event) {
                Some(Action::Start(reply)) => {
                    debug!("Ignoring start request during a sweep");
                    respond(reply, Err(Error::NotReady("a sweep is already running".into())));
                }
                Some(action) => self.deferred.push_back(action),
                None => {}
            }
        }
        self.state.render(self.view);
    }
}

impl Pacer for SessionPacer<'_> {
    fn pause(&mut self, delay: Duration) {
        let deadline = self.clock.now() + delay;
        loop {
            self.drain();
            let now = self.clock.now();
            if now >= deadline {
                break;
            }
            self.clock.sleep((deadline - now).min(PAUSE_SLICE));
        }
    }

    fn progress(&mut self, downloaded: usize, total: usize) {
        self.state.phase = Phase::Downloading { progress: Some((downloaded, total)) };
        self.state.render(self.view);
    }
}

/// One harvesting session over one viewer
pub struct Session {
    state: SessionState,
    pages: DownloadedPages,
    events: EventBus,
    deferred: VecDeque<Action>,
    options: SessionOptions,
    attached: bool,
    auto_started: bool,
    shutdown: bool,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            state: SessionState::new(options.volume_name.as_deref()),
            pages: DownloadedPages::new(),
            events: EventBus::new(),
            deferred: VecDeque::new(),
            options,
            attached: false,
            auto_started: false,
            shutdown: false,
        }
    }

    /// Sending side of the session's event queue
    pub fn sender(&self) -> EventSender {
        self.events.sender()
    }

    /// Load preferences, subscribe to the viewer and take the initial readings
    pub fn attach(&mut self, viewer: &mut dyn ViewerSurface, view: &mut dyn StatusView) -> Result<()> {
        let delay = match self.options.delay {
            Some(delay) => {
                if let Err(e) = save_delay(viewer.store(), delay) {
                    warn!("Could not save delay preference: {}", e);
                }
                delay
            }
            None => load_delay(viewer.store()),
        };
        self.state.delay = delay;
        self.state.delay_input = delay.into();

        viewer.subscribe(self.events.sender())?;

        match viewer.document_title() {
            Ok(title) => self.state.volume.observe_title(&title),
            Err(e) => warn!("Could not read document title: {}", e),
        }
        self.refresh_settings(viewer);
        self.refresh_position(viewer);

        self.attached = true;
        self.state.render(view);
        Ok(())
    }

    /// Re-read the settings key directly from the store
    pub fn refresh_settings(&mut self, viewer: &mut dyn ViewerSurface) {
        let report = match viewer.store().get(SETTINGS_KEY) {
            Ok(raw) => settings::evaluate(raw.as_deref()),
            Err(e) => {
                warn!("Could not read viewer settings: {}", e);
                SettingsReport::failed(e.to_string())
            }
        };
        self.state.settings = Some(report);
    }

    /// Re-read the page counter directly from the viewer
    pub fn refresh_position(&mut self, viewer: &mut dyn ViewerSurface) {
        let raw = viewer.counter_text().unwrap_or_else(|e| {
            warn!("Could not read page counter: {}", e);
            None
        });
        self.state.position = Some(position::evaluate(raw.as_deref()));
    }

    /// Apply one event (observation or command)
    pub fn dispatch(
        &mut self,
        event: Event,
        viewer: &mut dyn ViewerSurface,
        sink: &mut dyn DownloadSink,
        view: &mut dyn StatusView,
    ) {
        if let Some(action) = self.state.apply(event) {
            self.execute(action, viewer, sink, view);
        }
        self.flush_delay_save(viewer);
        self.state.render(view);
    }

    /// Apply everything queued so far without waiting; returns the count
    pub fn pump(
        &mut self,
        viewer: &mut dyn ViewerSurface,
        sink: &mut dyn DownloadSink,
        view: &mut dyn StatusView,
    ) -> usize {
        let mut handled = 0;
        loop {
            if let Some(action) = self.deferred.pop_front() {
                self.execute(action, viewer, sink, view);
            } else if let Some(event) = self.events.try_recv() {
                self.dispatch(event, viewer, sink, view);
            } else {
                break;
            }
            handled += 1;
        }
        handled
    }

    fn execute(
        &mut self,
        action: Action,
        viewer: &mut dyn ViewerSurface,
        sink: &mut dyn DownloadSink,
        view: &mut dyn StatusView,
    ) {
        match action {
            Action::Start(reply) => {
                let result = self.start(viewer, sink, view);
                if let Err(e) = &result {
                    warn!("{}", e);
                }
                respond(reply, result);
            }
            Action::Shutdown(reply) => {
                self.shutdown = true;
                respond(reply, ());
            }
        }
    }

    fn flush_delay_save(&mut self, viewer: &mut dyn ViewerSurface) {
        if let Some(delay) = self.state.pending_delay_save.take() {
            if let Err(e) = save_delay(viewer.store(), delay) {
                warn!("Could not save delay preference: {}", e);
            }
        }
    }

    /// Run a sweep now, if the session is ready
    pub fn start(
        &mut self,
        viewer: &mut dyn ViewerSurface,
        sink: &mut dyn DownloadSink,
        view: &mut dyn StatusView,
    ) -> Result<SweepReport> {
        if !self.state.is_ready() {
            return Err(Error::NotReady(self.state.blockers().join(", ")));
        }
        let total = self
            .state
            .position
            .as_ref()
            .and_then(|p| p.position.total)
            .ok_or(Error::MissingPageCount)?;
        let expected_total = usize::try_from(total).map_err(|_| Error::MissingPageCount)?;

        let plan = SweepPlan {
            expected_total,
            delay: self.state.delay,
            volume_name: self.state.volume.current().to_string(),
            format: self.options.format,
        };
        info!(
            "Downloading {} pages of \"{}\" with a {} s delay",
            plan.expected_total, plan.volume_name, plan.delay
        );

        self.state.phase = Phase::Downloading { progress: None };
        self.state.render(view);

        let result = {
            let mut pacer = SessionPacer {
                state: &mut self.state,
                events: &self.events,
                deferred: &mut self.deferred,
                view: &mut *view,
                clock: self.options.clock.as_ref(),
            };
            sweep(viewer, sink, &mut self.pages, &plan, &mut pacer)
        };

        self.state.phase = match &result {
            Ok(_) => {
                info!("{}", COMPLETE_LABEL);
                Phase::Complete { until: self.options.clock.now() + COMPLETE_LINGER }
            }
            Err(e) => {
                error!("Sweep aborted: {}", e);
                Phase::Idle
            }
        };
        self.flush_delay_save(viewer);
        self.state.render(view);
        result
    }

    /// Time-based transitions: return to idle once the completion notice
    /// expires. Returns true on that transition.
    pub fn tick(&mut self, view: &mut dyn StatusView) -> bool {
        if let Phase::Complete { until } = self.state.phase {
            if self.options.clock.now() >= until {
                self.state.phase = Phase::Idle;
                self.state.render(view);
                return true;
            }
        }
        false
    }

    /// Process events until shut down
    pub fn run(
        &mut self,
        viewer: &mut dyn ViewerSurface,
        sink: &mut dyn DownloadSink,
        view: &mut dyn StatusView,
    ) -> Result<()> {
        if !self.attached {
            self.attach(viewer, view)?;
        }

        while !self.shutdown {
            if let Some(action) = self.deferred.pop_front() {
                self.execute(action, viewer, sink, view);
                continue;
            }
            if let Some(event) = self.events.recv_timeout(POLL_INTERVAL) {
                self.dispatch(event, viewer, sink, view);
            }
            if self.tick(view) {
                self.refresh_settings(viewer);
                self.refresh_position(viewer);
                self.state.render(view);
            }

            if self.options.auto_start && !self.auto_started && self.state.is_ready() {
                self.auto_started = true;
                if let Err(e) = self.start(viewer, sink, view) {
                    warn!("{}", e);
                }
                if self.options.exit_after_sweep {
                    self.shutdown = true;
                }
            }
        }

        info!("Session stopped with {} pages captured", self.pages.len());
        Ok(())
    }

    pub fn panel(&self) -> PanelState {
        self.state.panel()
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn downloaded(&self) -> &DownloadedPages {
        &self.pages
    }

    /// Delay currently in effect (the last accepted edit)
    pub fn delay(&self) -> DelayTime {
        self.state.delay
    }

    pub fn volume_name(&self) -> &str {
        self.state.volume.current()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown
    }
}
