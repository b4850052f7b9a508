use std::collections::BTreeSet;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tagradar_common::{ReportId, ReportPair, ReportRow, ReportSummary};
use tracing::{debug, info};

use crate::error::ReportError;

/// Durable reports, stored as flat CSV pairs in one directory.
///
/// The directory listing is the index: a report exists when its campaign
/// file exists, and both file names are derived from the report id.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    pub fn campaign_path(&self, id: &ReportId) -> PathBuf {
        self.dir.join(id.campaign_file_name())
    }

    pub fn user_path(&self, id: &ReportId) -> PathBuf {
        self.dir.join(id.user_file_name())
    }

    /// All reports, newest first. Ids end in an ISO date, so descending
    /// lexicographic order is also reverse chronological per hashtag.
    pub async fn list(&self) -> Result<Vec<ReportSummary>, ReportError> {
        let read_err = |source| ReportError::Read {
            path: self.dir.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(read_err)?;

        let mut ids = BTreeSet::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(id) = ReportId::from_campaign_file_name(name) {
                ids.insert(id);
            }
        }

        debug!(count = ids.len(), dir = %self.dir.display(), "Listed reports");
        Ok(ids.into_iter().rev().map(ReportSummary::from).collect())
    }

    /// Load both tables of `report_id`. Ids that could not name a report file
    /// are reported as not found.
    pub async fn get(&self, report_id: &str) -> Result<ReportPair, ReportError> {
        let id = ReportId::parse(report_id).map_err(|_| ReportError::NotFound {
            report_id: report_id.to_string(),
        })?;
        self.get_id(&id).await
    }

    pub async fn get_id(&self, id: &ReportId) -> Result<ReportPair, ReportError> {
        let campaign = spawn_read(id.clone(), self.campaign_path(id));
        let user = spawn_read(id.clone(), self.user_path(id));
        let (campaign_report, user_report) = tokio::try_join!(campaign, user)?;

        info!(
            report_id = %id,
            campaign_rows = campaign_report.len(),
            user_rows = user_report.len(),
            "Loaded report"
        );
        Ok(ReportPair {
            campaign_report,
            user_report,
        })
    }
}

async fn spawn_read(id: ReportId, path: PathBuf) -> Result<Vec<ReportRow>, ReportError> {
    let task_path = path.clone();
    match tokio::task::spawn_blocking(move || read_csv(&id, &task_path)).await {
        Ok(result) => result,
        Err(join) => Err(ReportError::Read {
            path,
            source: std::io::Error::new(ErrorKind::Other, join),
        }),
    }
}

/// Parse a headed CSV file into rows keyed by header, preserving file order.
pub fn read_csv(id: &ReportId, path: &Path) -> Result<Vec<ReportRow>, ReportError> {
    let file = File::open(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => ReportError::NotFound {
            report_id: id.to_string(),
        },
        _ => ReportError::Read {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let parse_err = |source| ReportError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);
    let headers = reader.headers().map_err(parse_err)?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(parse_err)?;
        let fields = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), record.get(i).unwrap_or_default().to_string()))
            .collect();
        rows.push(ReportRow::new(fields));
    }
    Ok(rows)
}
