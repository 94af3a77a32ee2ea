use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use tracing::info;

use super::domain::{LegacyWebsiteContact, WebsiteId};

#[derive(Debug)]
pub enum LegacyImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    InvalidTimestamp { website_id: String, value: String },
}

impl std::fmt::Display for LegacyImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LegacyImportError::Io(err) => write!(f, "failed to read legacy export: {}", err),
            LegacyImportError::Csv(err) => write!(f, "invalid legacy CSV data: {}", err),
            LegacyImportError::InvalidTimestamp { website_id, value } => write!(
                f,
                "website {} has an unparseable last_activity '{}'",
                website_id, value
            ),
        }
    }
}

impl std::error::Error for LegacyImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LegacyImportError::Io(err) => Some(err),
            LegacyImportError::Csv(err) => Some(err),
            LegacyImportError::InvalidTimestamp { .. } => None,
        }
    }
}

impl From<std::io::Error> for LegacyImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for LegacyImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

/// Reads the legacy `websites` + `contacts` export into migration input rows.
pub struct LegacyExportImporter;

impl LegacyExportImporter {
    pub fn from_path(
        path: impl AsRef<Path>,
    ) -> Result<Vec<LegacyWebsiteContact>, LegacyImportError> {
        let path = path.as_ref();
        let rows = Self::from_reader(File::open(path)?)?;
        info!(path = %path.display(), rows = rows.len(), "legacy export loaded");
        Ok(rows)
    }

    pub fn from_reader<R: Read>(
        reader: R,
    ) -> Result<Vec<LegacyWebsiteContact>, LegacyImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        csv_reader
            .deserialize::<LegacyRow>()
            .map(|record| record?.into_contact())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct LegacyRow {
    website_id: String,
    domain: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    contact_email: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    contact_name: Option<String>,
    #[serde(default)]
    guest_post_cost: Option<f64>,
    #[serde(default)]
    avg_response_time_hours: Option<f64>,
    #[serde(default)]
    success_rate_percentage: Option<f64>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    last_activity: Option<String>,
}

impl LegacyRow {
    fn into_contact(self) -> Result<LegacyWebsiteContact, LegacyImportError> {
        let last_activity = match self.last_activity.as_deref() {
            Some(raw) => Some(parse_timestamp(raw).ok_or_else(|| {
                LegacyImportError::InvalidTimestamp {
                    website_id: self.website_id.clone(),
                    value: raw.to_string(),
                }
            })?),
            None => None,
        };

        Ok(LegacyWebsiteContact {
            website_id: WebsiteId(self.website_id),
            domain: self.domain,
            contact_email: self.contact_email,
            contact_name: self.contact_name,
            guest_post_cost: self.guest_post_cost,
            avg_response_time_hours: self.avg_response_time_hours,
            success_rate_percentage: self.success_rate_percentage,
            last_activity,
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "website_id,domain,contact_email,contact_name,guest_post_cost,avg_response_time_hours,success_rate_percentage,last_activity\n";

    #[test]
    fn empty_cells_become_none() {
        let csv = format!(
            "{HEADER}w1,a.com,contact@a.com,Acme,50,,92.5,2025-03-01\nw2,b.com,,,,,,\n"
        );
        let rows = LegacyExportImporter::from_reader(csv.as_bytes()).expect("csv parses");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].contact_email.as_deref(), Some("contact@a.com"));
        assert_eq!(rows[0].guest_post_cost, Some(50.0));
        assert_eq!(rows[0].avg_response_time_hours, None);
        assert_eq!(rows[0].success_rate_percentage, Some(92.5));
        assert!(rows[0].last_activity.is_some());
        assert_eq!(rows[1].contact_email, None);
        assert_eq!(rows[1].contact_name, None);
        assert_eq!(rows[1].guest_post_cost, None);
        assert_eq!(rows[1].last_activity, None);
    }

    #[test]
    fn rejects_unparseable_activity() {
        let csv = format!("{HEADER}w1,a.com,contact@a.com,Acme,50,,,last tuesday\n");
        let err = LegacyExportImporter::from_reader(csv.as_bytes()).expect_err("bad timestamp");
        assert!(matches!(err, LegacyImportError::InvalidTimestamp { .. }));
    }

    #[test]
    fn accepts_rfc3339_timestamps() {
        assert!(parse_timestamp("2025-03-01T12:30:00Z").is_some());
        assert!(parse_timestamp("2025-03-01").is_some());
        assert!(parse_timestamp("03/01/2025").is_none());
    }
}
