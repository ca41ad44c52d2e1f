//! Viewer settings observer
//!
//! The viewer keeps its preferences as a JSON blob in local storage. Two of
//! them decide whether a sweep produces usable output: pages must be laid out
//! along the vertical axis, and spread (two-page) mode must be off. The store
//! is known to serialize `viewerSpreadDouble` both as a boolean and as a
//! string, so both spellings of `false` are accepted.

use log::error;
use serde::Serialize;
use serde_json::Value;

/// Local storage key holding the viewer settings blob
pub const SETTINGS_KEY: &str = "/NFBR_Settings/NFBR.SettingData";

/// Required value of `viewerPageTransitionAxis`
pub const EXPECTED_TRANSITION_AXIS: &str = "vertical";

const TRANSITION_FIELD: &str = "viewerPageTransitionAxis";
const SPREAD_FIELD: &str = "viewerSpreadDouble";

/// The two settings fields this crate cares about, as raw JSON values.
///
/// `None` means the field was not present at all; `Some(Value::Null)` means it
/// was present and `null`. The distinction only matters for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewerSettings {
    #[serde(rename = "viewerPageTransitionAxis", skip_serializing_if = "Option::is_none")]
    pub page_transition_axis: Option<Value>,
    #[serde(rename = "viewerSpreadDouble", skip_serializing_if = "Option::is_none")]
    pub spread_double: Option<Value>,
}

impl ViewerSettings {
    /// Settings that satisfy both checks
    pub fn vertical_single_page() -> Self {
        Self {
            page_transition_axis: Some(Value::String(EXPECTED_TRANSITION_AXIS.to_string())),
            spread_double: Some(Value::Bool(false)),
        }
    }

    /// Serialize into the blob format the viewer stores
    pub fn to_blob(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    fn from_value(value: &Value) -> std::result::Result<Self, String> {
        match value {
            // Reading a property of `null` is the one parsed shape the viewer
            // page itself would fail on.
            Value::Null => Err("settings blob is null".to_string()),
            Value::Object(map) => Ok(Self {
                page_transition_axis: map.get(TRANSITION_FIELD).cloned(),
                spread_double: map.get(SPREAD_FIELD).cloned(),
            }),
            _ => Ok(Self::default()),
        }
    }

    fn page_transition_ok(&self) -> bool {
        matches!(&self.page_transition_axis, Some(Value::String(s)) if s == EXPECTED_TRANSITION_AXIS)
    }

    fn spread_double_ok(&self) -> bool {
        match &self.spread_double {
            Some(Value::Bool(false)) => true,
            Some(Value::String(s)) => s == "false",
            _ => false,
        }
    }
}

/// Outcome of reading the settings key
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsStatus {
    /// The key is absent from the store
    NotFound,
    /// The key is present but the blob could not be parsed
    Error(String),
    /// The blob parsed
    Parsed(ViewerSettings),
}

/// Verdict of the settings observer
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsReport {
    pub status: SettingsStatus,
    pub page_transition_ok: bool,
    pub spread_double_ok: bool,
}

impl SettingsReport {
    /// Report for a store that could not be read at all
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: SettingsStatus::Error(message.into()),
            page_transition_ok: false,
            spread_double_ok: false,
        }
    }

    /// Both checks pass
    pub fn is_ok(&self) -> bool {
        self.page_transition_ok && self.spread_double_ok
    }

    /// Text shown next to the page transition indicator
    pub fn page_transition_display(&self) -> String {
        match &self.status {
            SettingsStatus::NotFound => "not found".to_string(),
            SettingsStatus::Error(_) => "error".to_string(),
            SettingsStatus::Parsed(s) => match &s.page_transition_axis {
                Some(v) if !is_falsy(v) => js_string(Some(v)),
                _ => "unknown".to_string(),
            },
        }
    }

    /// Text shown next to the spread double indicator
    pub fn spread_double_display(&self) -> String {
        match &self.status {
            SettingsStatus::NotFound => "not found".to_string(),
            SettingsStatus::Error(_) => "error".to_string(),
            SettingsStatus::Parsed(_) if self.spread_double_ok => "false".to_string(),
            SettingsStatus::Parsed(s) => js_string(s.spread_double.as_ref()),
        }
    }
}

/// Classify the raw settings blob.
///
/// Never fails: a missing key or a malformed blob yields a report with both
/// flags false. Parse failures are logged.
pub fn evaluate(raw: Option<&str>) -> SettingsReport {
    let Some(raw) = raw else {
        return SettingsReport {
            status: SettingsStatus::NotFound,
            page_transition_ok: false,
            spread_double_ok: false,
        };
    };

    let parsed = serde_json::from_str::<Value>(raw)
        .map_err(|e| e.to_string())
        .and_then(|v| ViewerSettings::from_value(&v));

    match parsed {
        Ok(settings) => SettingsReport {
            page_transition_ok: settings.page_transition_ok(),
            spread_double_ok: settings.spread_double_ok(),
            status: SettingsStatus::Parsed(settings),
        },
        Err(message) => {
            error!("Error parsing {}: {}", SETTINGS_KEY, message);
            SettingsReport::failed(message)
        }
    }
}

fn is_falsy(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

// Render a value the way the viewer page would print it.
fn js_string(v: Option<&Value>) -> String {
    match v {
        None => "undefined".to_string(),
        Some(Value::Null) => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => js_string(Some(other)),
            })
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::Object(_)) => "[object Object]".to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_vertical_with_boolean_or_string_false() {
        for spread in [r#"false"#, r#""false""#] {
            let raw = format!(r#"{{"viewerPageTransitionAxis":"vertical","viewerSpreadDouble":{}}}"#, spread);
            let report = evaluate(Some(&raw));
            assert!(report.page_transition_ok, "{}", raw);
            assert!(report.spread_double_ok, "{}", raw);
            assert!(report.is_ok());
            assert_eq!(report.spread_double_display(), "false");
        }
    }

    #[test]
    fn rejects_other_combinations() {
        let cases = [
            (r#"{"viewerPageTransitionAxis":"horizontal","viewerSpreadDouble":false}"#, false, true),
            (r#"{"viewerPageTransitionAxis":"vertical","viewerSpreadDouble":true}"#, true, false),
            (r#"{"viewerPageTransitionAxis":"vertical","viewerSpreadDouble":"true"}"#, true, false),
            (r#"{"viewerPageTransitionAxis":"Vertical","viewerSpreadDouble":0}"#, false, false),
            (r#"{"viewerSpreadDouble":false}"#, false, true),
            (r#"{}"#, false, false),
        ];
        for (raw, transition, spread) in cases {
            let report = evaluate(Some(raw));
            assert_eq!(report.page_transition_ok, transition, "{}", raw);
            assert_eq!(report.spread_double_ok, spread, "{}", raw);
            assert!(!report.is_ok());
        }
    }

    #[test]
    fn absent_blob_is_not_found() {
        let report = evaluate(None);
        assert_eq!(report.status, SettingsStatus::NotFound);
        assert!(!report.page_transition_ok && !report.spread_double_ok);
        assert_eq!(report.page_transition_display(), "not found");
        assert_eq!(report.spread_double_display(), "not found");
    }

    #[test]
    fn malformed_blob_degrades_to_error() {
        for raw in ["{not json", "", "null", "{\"viewerPageTransitionAxis\":"] {
            let report = evaluate(Some(raw));
            assert!(matches!(report.status, SettingsStatus::Error(_)), "{:?}", raw);
            assert!(!report.page_transition_ok && !report.spread_double_ok);
            assert_eq!(report.page_transition_display(), "error");
        }
    }

    #[test]
    fn non_object_blob_counts_as_missing_fields() {
        let report = evaluate(Some("42"));
        assert!(matches!(report.status, SettingsStatus::Parsed(_)));
        assert_eq!(report.page_transition_display(), "unknown");
        assert_eq!(report.spread_double_display(), "undefined");
    }

    #[test]
    fn display_values_follow_page_rendering() {
        let report = evaluate(Some(r#"{"viewerPageTransitionAxis":"","viewerSpreadDouble":null}"#));
        assert_eq!(report.page_transition_display(), "unknown");
        assert_eq!(report.spread_double_display(), "null");

        let report = evaluate(Some(r#"{"viewerPageTransitionAxis":"horizontal","viewerSpreadDouble":true}"#));
        assert_eq!(report.page_transition_display(), "horizontal");
        assert_eq!(report.spread_double_display(), "true");
    }

    #[test]
    fn helper_blob_round_trips_through_evaluate() {
        let blob = ViewerSettings::vertical_single_page().to_blob();
        assert!(evaluate(Some(&blob)).is_ok());
    }
}
