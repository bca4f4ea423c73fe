//! Local record of what a run published.
//!
//! `link.txt` holds the video URL alone; `results.json` holds the combined
//! [`PublicationSummary`]. Neither is written until every artifact of the run
//! has been published, and both are written atomically (temp file + rename).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use hookreel_models::{PublicationRecord, PublicationSummary};

use crate::config::WorkDir;
use crate::error::{WorkerError, WorkerResult};

#[derive(Debug, Clone)]
pub struct PublicationLedger {
    link_path: PathBuf,
    results_path: PathBuf,
    records: Vec<PublicationRecord>,
}

impl PublicationLedger {
    pub fn new(link_path: impl Into<PathBuf>, results_path: impl Into<PathBuf>) -> Self {
        Self {
            link_path: link_path.into(),
            results_path: results_path.into(),
            records: Vec::new(),
        }
    }

    pub fn in_work_dir(work_dir: &WorkDir) -> Self {
        Self::new(work_dir.link(), work_dir.results())
    }

    /// Keep `record` until [`PublicationLedger::finish`]. Nothing is written yet.
    pub fn record(&mut self, record: PublicationRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[PublicationRecord] {
        &self.records
    }

    /// Write `link.txt` and `results.json` and return the summary.
    ///
    /// Call only once every upload has succeeded. Fails without writing
    /// anything if no video has been recorded.
    pub async fn finish(&self, completed_at: DateTime<Utc>) -> WorkerResult<PublicationSummary> {
        let summary = PublicationSummary::from_records(&self.records, completed_at).ok_or_else(
            || {
                WorkerError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "no video publication to record",
                ))
            },
        )?;

        let json = serde_json::to_vec_pretty(&summary)?;

        write_atomic(&self.link_path, summary.video_url.as_bytes()).await?;
        info!(path = %self.link_path.display(), url = %summary.video_url, "Wrote link file");

        write_atomic(&self.results_path, &json).await?;
        info!(path = %self.results_path.display(), "Wrote results file");
        Ok(summary)
    }
}

async fn write_atomic(path: &Path, contents: &[u8]) -> WorkerResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
