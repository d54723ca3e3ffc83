//! Every uploaded dataset is kept, so an older one can be made active again later. Each upload is
//! a directory named by its ID, holding the four GTFS files and an `upload.json` record.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use gtfs::{preview_table, round2, Row, GTFS, REQUIRED_FILES};

use crate::RetryPolicy;

const RECORD_FILE: &str = "upload.json";
/// Rows of each file shown in an upload summary
pub const PREVIEW_ROWS: usize = 5;

pub type UploadID = u64;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: UploadID,
    pub name: String,
    /// UTC
    pub upload_date: NaiveDateTime,
    pub num_routes: usize,
    pub num_trips: usize,
    pub num_stops: usize,
    pub num_stop_times: usize,
    pub status: UploadStatus,
    pub notes: Option<String>,
    /// Of the original zip, in bytes
    pub file_size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadStatus {
    /// Files are still being written. An upload stuck here was interrupted.
    Processing,
    Parsed,
    Error,
}

/// An upload record plus a look at what's inside. Both maps are keyed by file name, like
/// `stops.txt`; a file that's missing or unreadable is left out.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UploadSummary {
    #[serde(flatten)]
    pub record: UploadRecord,
    pub avg_stops_per_trip: f64,
    pub columns: BTreeMap<String, Vec<String>>,
    /// The first few rows of each file
    pub previews: BTreeMap<String, Vec<Row>>,
}

/// One entry of the upload list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ListedUpload {
    #[serde(flatten)]
    pub record: UploadRecord,
    /// Whether this upload is the active dataset
    pub active: bool,
}

impl UploadRecord {
    pub fn avg_stops_per_trip(&self) -> f64 {
        if self.num_trips == 0 {
            0.0
        } else {
            round2(self.num_stop_times as f64 / self.num_trips as f64)
        }
    }
}

pub struct Archive {
    root: PathBuf,
    retry: RetryPolicy,
}

impl Archive {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs_err::create_dir_all(&root)?;
        Ok(Self {
            root,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stores a zipped dataset. Without a name, the zip's filename is used.
    pub fn import_zip<P: AsRef<Path>>(
        &self,
        path: P,
        name: Option<String>,
        notes: Option<String>,
    ) -> Result<UploadSummary> {
        let path = path.as_ref();
        let bytes = fs_err::read(path)?;
        let name = name.unwrap_or_else(|| {
            path.file_name()
                .map(|x| x.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string())
        });
        self.import_zip_bytes(bytes, name, notes)
    }

    /// Nothing is stored unless the zip has all of the required files.
    pub fn import_zip_bytes(
        &self,
        bytes: Vec<u8>,
        name: String,
        notes: Option<String>,
    ) -> Result<UploadSummary> {
        let file_size = bytes.len() as u64;
        let gtfs = GTFS::import_zip_bytes(bytes)?;

        let id = self.next_id()?;
        let mut record = UploadRecord {
            id,
            name,
            upload_date: Utc::now().naive_utc(),
            num_routes: gtfs.routes.len(),
            num_trips: gtfs.trips.len(),
            num_stops: gtfs.stops.len(),
            num_stop_times: gtfs.stop_times.len(),
            status: UploadStatus::Processing,
            notes,
            file_size,
        };
        let dir = self.upload_dir(id);
        fs_err::create_dir_all(&dir)?;
        self.write_record(&record)?;

        if let Err(err) = self
            .retry
            .run(&format!("Storing upload {id}"), || gtfs.write_to_dir(&dir))
        {
            record.status = UploadStatus::Error;
            self.write_record(&record)?;
            return Err(err);
        }
        record.status = UploadStatus::Parsed;
        self.write_record(&record)?;
        info!("Stored upload {id} ({}): {}", record.name, gtfs.describe());
        Ok(self.summarize(record))
    }

    /// Newest first
    pub fn list(&self) -> Result<Vec<UploadRecord>> {
        let mut records = Vec::new();
        for entry in fs_err::read_dir(&self.root)? {
            let entry = entry?;
            let id = match entry.file_name().to_str().and_then(|x| x.parse().ok()) {
                Some(id) => id,
                None => continue,
            };
            match self.read_record(id) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => warn!("Skipping upload {id}: {err}"),
            }
        }
        records.sort_by(|a, b| {
            b.upload_date
                .cmp(&a.upload_date)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(records)
    }

    /// Like `list`, marking the upload that's currently active.
    pub fn list_marking(&self, active: Option<UploadID>) -> Result<Vec<ListedUpload>> {
        Ok(self
            .list()?
            .into_iter()
            .map(|record| ListedUpload {
                active: Some(record.id) == active,
                record,
            })
            .collect())
    }

    pub fn get(&self, id: UploadID) -> Result<Option<UploadSummary>> {
        Ok(self.read_record(id)?.map(|record| self.summarize(record)))
    }

    /// The stored dataset of one upload.
    pub fn load(&self, id: UploadID) -> Result<Option<GTFS>> {
        let record = match self.read_record(id)? {
            Some(record) => record,
            None => return Ok(None),
        };
        if record.status != UploadStatus::Parsed {
            bail!("Upload {id} is {:?}, not usable", record.status);
        }
        Ok(Some(GTFS::load_from_dir(self.upload_dir(id))?))
    }

    /// Removes an upload and all of its files. None if it didn't exist.
    pub fn delete(&self, id: UploadID) -> Result<Option<UploadRecord>> {
        let record = match self.read_record(id)? {
            Some(record) => record,
            None => return Ok(None),
        };
        let dir = self.upload_dir(id);
        self.retry.run(&format!("Deleting upload {id}"), || {
            fs_err::remove_dir_all(&dir)?;
            Ok(())
        })?;
        info!("Deleted upload {id} ({})", record.name);
        Ok(Some(record))
    }

    fn upload_dir(&self, id: UploadID) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn summarize(&self, record: UploadRecord) -> UploadSummary {
        let dir = self.upload_dir(record.id);
        let mut columns = BTreeMap::new();
        let mut previews = BTreeMap::new();
        for file in REQUIRED_FILES {
            let path = dir.join(file);
            if !path.exists() {
                continue;
            }
            let preview = fs_err::File::open(&path)
                .map_err(anyhow::Error::from)
                .and_then(|f| preview_table(f, PREVIEW_ROWS));
            match preview {
                Ok((header, rows)) => {
                    columns.insert(file.to_string(), header);
                    previews.insert(file.to_string(), rows);
                }
                Err(err) => warn!("No preview of {}: {err}", path.display()),
            }
        }
        UploadSummary {
            avg_stops_per_trip: record.avg_stops_per_trip(),
            record,
            columns,
            previews,
        }
    }

    fn next_id(&self) -> Result<UploadID> {
        let mut max = 0;
        for entry in fs_err::read_dir(&self.root)? {
            if let Some(id) = entry?
                .file_name()
                .to_str()
                .and_then(|x| x.parse::<UploadID>().ok())
            {
                max = max.max(id);
            }
        }
        Ok(max + 1)
    }

    fn read_record(&self, id: UploadID) -> Result<Option<UploadRecord>> {
        let path = self.upload_dir(id).join(RECORD_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let record: UploadRecord = serde_json::from_str(&fs_err::read_to_string(&path)?)
            .map_err(|err| anyhow!("{}: {err}", path.display()))?;
        Ok(Some(record))
    }

    fn write_record(&self, record: &UploadRecord) -> Result<()> {
        let path = self.upload_dir(record.id).join(RECORD_FILE);
        let contents = serde_json::to_string_pretty(record)?;
        self.retry
            .run(&format!("Writing {}", path.display()), || {
                fs_err::write(&path, &contents)?;
                Ok(())
            })
    }
}
