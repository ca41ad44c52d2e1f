//! Page position tracker
//!
//! Parses the viewer's `current/total` page counter. Numbers are read the
//! lenient way the viewer page reads them: leading whitespace is skipped and
//! the longest run of digits wins, so `" 3 "` and `"3 pages"` both read as 3.

/// Selector of the element carrying the counter text
pub const COUNTER_SELECTOR: &str = "#pageSliderCounter";

/// Parsed counter values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PagePosition {
    pub current: Option<i64>,
    pub total: Option<i64>,
}

impl PagePosition {
    /// Parse `"current/total"`; either side may fail independently
    pub fn parse(text: &str) -> Self {
        let mut parts = text.split('/');
        let current = parts.next().and_then(parse_leading_int);
        let total = parts.next().and_then(parse_leading_int);
        Self { current, total }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionStatus {
    /// The counter element does not exist
    NotFound,
    /// The counter element exists and carries this text
    Found(String),
}

/// Verdict of the position tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionReport {
    pub status: PositionStatus,
    pub position: PagePosition,
    pub on_first_page: bool,
}

impl PositionReport {
    /// Text shown next to the position indicator
    pub fn display(&self) -> String {
        match &self.status {
            PositionStatus::NotFound => "not found".to_string(),
            PositionStatus::Found(text) if self.on_first_page => text.clone(),
            PositionStatus::Found(text) => format!("{} (scroll to page 1)", text),
        }
    }
}

/// Evaluate the counter text (`None` when the element is missing)
pub fn evaluate(raw: Option<&str>) -> PositionReport {
    match raw {
        None => PositionReport {
            status: PositionStatus::NotFound,
            position: PagePosition::default(),
            on_first_page: false,
        },
        Some(text) => {
            let position = PagePosition::parse(text);
            PositionReport {
                status: PositionStatus::Found(text.to_string()),
                on_first_page: position.current == Some(1),
                position,
            }
        }
    }
}

/// Read a leading integer: optional whitespace, optional sign, digits.
///
/// Returns `None` when no digit follows, or on overflow.
pub fn parse_leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let digits_end = rest
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    if digits_end == 0 {
        return None;
    }
    let magnitude: i64 = rest[..digits_end].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_is_detected() {
        let report = evaluate(Some("1/20"));
        assert!(report.on_first_page);
        assert_eq!(report.position, PagePosition { current: Some(1), total: Some(20) });
        assert_eq!(report.display(), "1/20");
    }

    #[test]
    fn later_page_is_not_first() {
        let report = evaluate(Some("3/20"));
        assert!(!report.on_first_page);
        assert_eq!(report.position.current, Some(3));
        assert_eq!(report.display(), "3/20 (scroll to page 1)");
    }

    #[test]
    fn missing_counter_is_not_first_page() {
        let report = evaluate(None);
        assert_eq!(report.status, PositionStatus::NotFound);
        assert!(!report.on_first_page);
        assert_eq!(report.display(), "not found");
    }

    #[test]
    fn lenient_integer_parsing() {
        assert_eq!(parse_leading_int(" 12 "), Some(12));
        assert_eq!(parse_leading_int("7 pages"), Some(7));
        assert_eq!(parse_leading_int("-4"), Some(-4));
        assert_eq!(parse_leading_int("+5"), Some(5));
        assert_eq!(parse_leading_int("abc"), None);
        assert_eq!(parse_leading_int(""), None);
        assert_eq!(parse_leading_int("-"), None);
        assert_eq!(parse_leading_int("99999999999999999999999"), None);
    }

    #[test]
    fn counter_without_total() {
        let report = evaluate(Some("1"));
        assert!(report.on_first_page);
        assert_eq!(report.position.total, None);

        let report = evaluate(Some("/"));
        assert!(!report.on_first_page);
        assert_eq!(report.position, PagePosition::default());
    }
}
