use std::fmt;

use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::TagRadarError;

// --- Report artifact naming ---

pub const CAMPAIGN_REPORT_PREFIX: &str = "campaign_analysis_report_";
pub const USER_REPORT_PREFIX: &str = "suspicious_users_report_";
pub const REPORT_EXTENSION: &str = ".csv";

/// Stable identifier of a durable report: `<hashtag>_<YYYY-MM-DD>`.
///
/// Both artifact file names are derived from the id alone, so the id is
/// restricted to strings that are safe as a single file-name fragment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ReportId(String);

impl ReportId {
    /// Id for a run whose primary hashtag is `primary_hashtag`, started on `date` (UTC).
    pub fn for_run(primary_hashtag: &str, date: NaiveDate) -> Result<Self, TagRadarError> {
        let tag = normalize_hashtag(primary_hashtag);
        if tag.is_empty() {
            return Err(TagRadarError::Validation(
                "The first hashtag must contain more than a `#`.".to_string(),
            ));
        }
        Self::parse(&format!("{tag}_{}", date.format("%Y-%m-%d")))
    }

    pub fn parse(raw: &str) -> Result<Self, TagRadarError> {
        if is_file_fragment(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(TagRadarError::Validation(format!("`{raw}` is not a valid report id")))
        }
    }

    /// Recover the id from a campaign report file name, if it follows the convention.
    pub fn from_campaign_file_name(file_name: &str) -> Option<Self> {
        let id = file_name
            .strip_prefix(CAMPAIGN_REPORT_PREFIX)?
            .strip_suffix(REPORT_EXTENSION)?;
        Self::parse(id).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn campaign_file_name(&self) -> String {
        format!("{CAMPAIGN_REPORT_PREFIX}{}{REPORT_EXTENSION}", self.0)
    }

    pub fn user_file_name(&self) -> String {
        format!("{USER_REPORT_PREFIX}{}{REPORT_EXTENSION}", self.0)
    }

    /// Human label, `"hashtag (date)"`. The date is everything after the last `_`
    /// so hashtags containing underscores survive intact.
    pub fn display_name(&self) -> String {
        match self.0.rsplit_once('_') {
            Some((tag, date)) => format!("{tag} ({date})"),
            None => self.0.clone(),
        }
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_file_fragment(s: &str) -> bool {
    !s.is_empty()
        && !s.contains("..")
        && !s.chars().any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control())
}

/// Strip surrounding whitespace and one leading `#`.
pub fn normalize_hashtag(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix('#').unwrap_or(trimmed).trim()
}

/// Check an analyze request's hashtags before any stage is launched.
pub fn validate_hashtags(hashtags: &[String]) -> Result<(), TagRadarError> {
    let Some(primary) = hashtags.first() else {
        return Err(TagRadarError::Validation("Hashtags are required as an array.".to_string()));
    };
    if hashtags.iter().any(|h| h.trim().is_empty()) {
        return Err(TagRadarError::Validation("Hashtags must be non-blank strings.".to_string()));
    }
    let tag = normalize_hashtag(primary);
    if tag.is_empty() || !is_file_fragment(tag) {
        return Err(TagRadarError::Validation(format!(
            "`{primary}` cannot be used to name a report."
        )));
    }
    Ok(())
}

// --- Report contents ---

/// One CSV data row, keyed by header. Column order follows the file header,
/// and values stay text; consumers parse numeric columns themselves.
///
/// A repeated header keeps its first position and its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportRow {
    fields: Vec<(String, String)>,
}

impl ReportRow {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        let mut row = Self::default();
        for (name, value) in fields {
            row.insert(name, value);
        }
        row
    }

    pub fn insert(&mut self, column: String, value: String) {
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for ReportRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Both tables of one report, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPair {
    pub campaign_report: Vec<ReportRow>,
    pub user_report: Vec<ReportRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub id: ReportId,
    pub display_name: String,
}

impl From<ReportId> for ReportSummary {
    fn from(id: ReportId) -> Self {
        let display_name = id.display_name();
        Self { id, display_name }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tags(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn report_id_strips_leading_marker() {
        let id = ReportId::for_run("#Election", date(2024, 3, 1)).unwrap();
        assert_eq!(id.as_str(), "Election_2024-03-01");
        assert_eq!(id.campaign_file_name(), "campaign_analysis_report_Election_2024-03-01.csv");
        assert_eq!(id.user_file_name(), "suspicious_users_report_Election_2024-03-01.csv");
    }

    #[test]
    fn report_id_without_marker_is_unchanged() {
        let id = ReportId::for_run("  climate ", date(2024, 1, 9)).unwrap();
        assert_eq!(id.as_str(), "climate_2024-01-09");
    }

    #[test]
    fn bare_marker_is_rejected() {
        assert!(ReportId::for_run("#", date(2024, 1, 1)).is_err());
    }

    #[test]
    fn parse_rejects_path_traversal() {
        assert!(ReportId::parse("../etc/passwd").is_err());
        assert!(ReportId::parse("a/b_2024-01-01").is_err());
        assert!(ReportId::parse("a\\b").is_err());
        assert!(ReportId::parse("").is_err());
        assert!(ReportId::parse("foo_2024-01-01").is_ok());
    }

    #[test]
    fn display_name_splits_on_last_separator() {
        let id = ReportId::parse("foo_2024-01-01").unwrap();
        assert_eq!(id.display_name(), "foo (2024-01-01)");

        let id = ReportId::parse("my_tag_2024-01-01").unwrap();
        assert_eq!(id.display_name(), "my_tag (2024-01-01)");
    }

    #[test]
    fn campaign_file_name_round_trips() {
        let id = ReportId::from_campaign_file_name("campaign_analysis_report_foo_2024-01-01.csv")
            .unwrap();
        assert_eq!(id.as_str(), "foo_2024-01-01");
        let user_file = "suspicious_users_report_foo_2024-01-01.csv";
        assert!(ReportId::from_campaign_file_name(user_file).is_none());
        assert!(ReportId::from_campaign_file_name("campaign_analysis_report_foo.json").is_none());
        assert!(ReportId::from_campaign_file_name("campaign_analysis_report_.csv").is_none());
    }

    #[test]
    fn validate_hashtags_cases() {
        assert!(validate_hashtags(&[]).is_err());
        assert!(validate_hashtags(&tags(&["#ok", "  "])).is_err());
        assert!(validate_hashtags(&tags(&["#"])).is_err());
        assert!(validate_hashtags(&tags(&["#a/b"])).is_err());
        assert!(validate_hashtags(&tags(&["#ok", "#also"])).is_ok());
    }

    #[test]
    fn row_serializes_in_header_order() {
        let row = ReportRow::new(vec![
            ("username".to_string(), "zed".to_string()),
            ("comments".to_string(), "3".to_string()),
            ("cleaned_content".to_string(), "a, \"b\"".to_string()),
        ]);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"username":"zed","comments":"3","cleaned_content":"a, \"b\""}"#);
        assert_eq!(row.get("comments"), Some("3"));
        assert_eq!(row.get("missing"), None);
        assert_eq!(
            row.columns().collect::<Vec<_>>(),
            vec!["username", "comments", "cleaned_content"]
        );
    }

    #[test]
    fn repeated_column_keeps_last_value() {
        let row = ReportRow::new(vec![
            ("username".to_string(), "first".to_string()),
            ("score".to_string(), "1".to_string()),
            ("username".to_string(), "second".to_string()),
        ]);
        assert_eq!(row.get("username"), Some("second"));
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["username", "score"]);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"username":"second","score":"1"}"#);
    }

    #[test]
    fn summary_uses_camel_case() {
        let summary = ReportSummary::from(ReportId::parse("foo_2024-01-01").unwrap());
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["id"], "foo_2024-01-01");
        assert_eq!(json["displayName"], "foo (2024-01-01)");
    }
}
