//! Status panel model
//!
//! The panel shows one indicator row per observed condition, the editable
//! fields and the action button. The session builds a [`PanelState`] and
//! hands it to a [`StatusView`] whenever it changes.

use log::info;
use std::fmt;

/// Indicator shown in front of a row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// Not checked yet
    Pending,
    /// Value is as required
    Ok,
    /// Value is present but wrong
    Wrong,
    /// Value is missing, unreadable, or needs user action
    Warning,
}

impl Indicator {
    pub fn icon(&self) -> &'static str {
        match self {
            Indicator::Pending => "⏳",
            Indicator::Ok => "✅",
            Indicator::Wrong => "❌",
            Indicator::Warning => "⚠️",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorRow {
    pub label: &'static str,
    pub indicator: Indicator,
    pub value: String,
}

impl IndicatorRow {
    pub fn pending(label: &'static str) -> Self {
        Self { label, indicator: Indicator::Pending, value: "checking...".to_string() }
    }
}

impl fmt::Display for IndicatorRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.indicator.icon(), self.label, self.value)
    }
}

/// The delay field as typed, and whether it is flagged as invalid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayField {
    pub text: String,
    pub flagged: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonState {
    pub enabled: bool,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelState {
    pub page_transition: IndicatorRow,
    pub spread_double: IndicatorRow,
    pub page_position: IndicatorRow,
    pub volume_name: String,
    pub delay: DelayField,
    pub button: ButtonState,
}

impl fmt::Display for PanelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.page_transition)?;
        writeln!(f, "{}", self.spread_double)?;
        writeln!(f, "{}", self.page_position)?;
        writeln!(f, "Volume Name: {}", self.volume_name)?;
        writeln!(
            f,
            "Delay Time (seconds): {}{}",
            self.delay.text,
            if self.delay.flagged { " (must be 2-20)" } else { "" }
        )?;
        write!(
            f,
            "[{}]{}",
            self.button.label,
            if self.button.enabled { "" } else { " (disabled)" }
        )
    }
}

/// Something that displays the panel
pub trait StatusView {
    fn render(&mut self, panel: &PanelState);
}

/// Renders the panel through the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogView;

impl StatusView for LogView {
    fn render(&mut self, panel: &PanelState) {
        for line in panel.to_string().lines() {
            info!("{}", line);
        }
    }
}

/// Keeps every rendered panel; handy in tests
#[derive(Debug, Clone, Default)]
pub struct RecordingView {
    pub renders: Vec<PanelState>,
}

impl RecordingView {
    pub fn last(&self) -> Option<&PanelState> {
        self.renders.last()
    }
}

impl StatusView for RecordingView {
    fn render(&mut self, panel: &PanelState) {
        self.renders.push(panel.clone());
    }
}
