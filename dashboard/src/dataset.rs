use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use anyhow::Result;
use chrono::Local;
use serde::{Deserialize, Serialize};

use gtfs::{JoinIndex, Record, Route, StopTime, Table, GTFS, REQUIRED_FILES};

use crate::archive::UploadID;
use crate::RetryPolicy;

const STAGING_DIR: &str = ".staging";
const ACTIVE_UPLOAD_FILE: &str = "active_upload.json";

/// One complete, immutable dataset. Queries run against a snapshot and never see a later swap.
#[derive(Debug)]
pub struct Snapshot {
    /// Bumped every time the active dataset changes
    pub generation: u64,
    pub gtfs: GTFS,
    /// The archived upload this dataset was loaded from, if any. Edits don't change it.
    pub upload: Option<UploadID>,
}

impl Snapshot {
    pub fn index(&self) -> JoinIndex<'_> {
        JoinIndex::new(&self.gtfs)
    }
}

pub trait SnapshotSource {
    fn snapshot(&self) -> Arc<Snapshot>;
}

/// Whole-table replacement, the only way edits reach the active dataset.
///
/// `ActiveDataset` implements this by taking the table's writer lock for the one call, so it waits
/// for any `RoutesWriter` or `StopTimesWriter` to be dropped. Never call it while the same thread
/// holds one; that deadlocks. A read-modify-write should call the writer's own method instead.
pub trait SnapshotSink {
    fn replace_routes(&self, routes: Table<Route>) -> Result<()>;
    fn replace_stop_times(&self, stop_times: Table<StopTime>) -> Result<()>;
}

/// The dataset currently being served, optionally mirrored to a directory of GTFS files.
pub struct ActiveDataset {
    current: RwLock<Arc<Snapshot>>,
    dir: Option<PathBuf>,
    retry: RetryPolicy,
    // Held for a whole read-modify-write of one table. Ingestion takes both.
    routes_writer: Mutex<()>,
    stop_times_writer: Mutex<()>,
}

impl ActiveDataset {
    pub fn in_memory(gtfs: GTFS) -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot {
                generation: 0,
                gtfs,
                upload: None,
            })),
            dir: None,
            retry: RetryPolicy::default(),
            routes_writer: Mutex::new(()),
            stop_times_writer: Mutex::new(()),
        }
    }

    /// Serves the dataset stored in a directory, and writes every change back there. A directory
    /// without a complete dataset starts out empty.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let gtfs = if REQUIRED_FILES.iter().all(|f| dir.join(f).exists()) {
            GTFS::load_from_dir(dir)?
        } else {
            warn!("{} doesn't have a complete dataset yet", dir.display());
            GTFS::empty()
        };
        let upload = read_active_upload(dir)?;
        let dataset = Self {
            current: RwLock::new(Arc::new(Snapshot {
                generation: 0,
                gtfs,
                upload,
            })),
            dir: Some(dir.to_path_buf()),
            ..Self::in_memory(GTFS::empty())
        };
        Ok(dataset)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    pub fn active_upload(&self) -> Option<UploadID> {
        self.snapshot().upload
    }

    /// Makes a complete dataset active. If writing the backing directory fails, the previous
    /// dataset stays active and its files are restored.
    pub fn ingest(&self, gtfs: GTFS) -> Result<u64> {
        self.ingest_from(gtfs, None)
    }

    /// Like `ingest`, remembering which archived upload is now active.
    pub fn ingest_upload(&self, id: UploadID, gtfs: GTFS) -> Result<u64> {
        self.ingest_from(gtfs, Some(id))
    }

    fn ingest_from(&self, gtfs: GTFS, upload: Option<UploadID>) -> Result<u64> {
        let _routes = lock(&self.routes_writer);
        let _stop_times = lock(&self.stop_times_writer);
        if let Some(ref dir) = self.dir {
            self.persist_all(dir, &gtfs)?;
            // Only logged, since the new files are already in place
            if let Err(err) = self.retry.run("Recording the active upload", || {
                write_active_upload(dir, upload)
            }) {
                error!("{err}");
            }
        }
        let describe = gtfs.describe();
        let generation = {
            let mut current = self
                .current
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let generation = current.generation + 1;
            *current = Arc::new(Snapshot {
                generation,
                gtfs,
                upload,
            });
            generation
        };
        match upload {
            Some(id) => info!("Now serving upload {id} as generation {generation}: {describe}"),
            None => info!("Now serving generation {generation}: {describe}"),
        }
        Ok(generation)
    }

    /// Loads everything before swapping, so a directory missing any table changes nothing.
    pub fn ingest_dir<P: AsRef<Path>>(&self, path: P) -> Result<u64> {
        let gtfs = GTFS::load_from_dir(path)?;
        self.ingest(gtfs)
    }

    pub fn lock_routes(&self) -> RoutesWriter<'_> {
        RoutesWriter {
            dataset: self,
            _guard: lock(&self.routes_writer),
        }
    }

    pub fn lock_stop_times(&self) -> StopTimesWriter<'_> {
        StopTimesWriter {
            dataset: self,
            _guard: lock(&self.stop_times_writer),
        }
    }

    // The new dataset is built from whatever is current while holding the write lock, so
    // replacing one table never undoes a concurrent replacement of another. Building only clones
    // the shared tables.
    fn swap<F: FnOnce(&GTFS) -> GTFS>(&self, build: F) -> u64 {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let generation = current.generation + 1;
        let gtfs = build(&current.gtfs);
        let upload = current.upload;
        *current = Arc::new(Snapshot {
            generation,
            gtfs,
            upload,
        });
        generation
    }

    fn persist_table<T: Record>(&self, table: &Table<T>, file: &str) -> Result<()> {
        let dir = match self.dir {
            Some(ref dir) => dir,
            None => return Ok(()),
        };
        let staged = dir.join(format!("{file}.staging"));
        let dest = dir.join(file);
        self.retry.run(&format!("Writing {}", dest.display()), || {
            table.write_to_path(&staged)?;
            fs_err::rename(&staged, &dest)?;
            Ok(())
        })
    }

    fn persist_all(&self, dir: &Path, gtfs: &GTFS) -> Result<()> {
        let staging = dir.join(STAGING_DIR);
        if staging.exists() {
            fs_err::remove_dir_all(&staging)?;
        }
        self.retry
            .run("Staging the new dataset", || gtfs.write_to_dir(&staging))?;

        let backup = backup_existing(dir)?;
        let moved = self.retry.run("Moving the new dataset into place", || {
            for file in REQUIRED_FILES {
                let staged = staging.join(file);
                // Already moved by an earlier attempt
                if !staged.exists() {
                    continue;
                }
                fs_err::rename(&staged, dir.join(file))?;
            }
            Ok(())
        });
        if let Err(err) = moved {
            if let Some(ref backup) = backup {
                if let Err(restore_err) = restore(backup, dir) {
                    error!(
                        "Couldn't restore {} from {}: {restore_err}",
                        dir.display(),
                        backup.display()
                    );
                }
            }
            return Err(err);
        }
        fs_err::remove_dir_all(&staging)?;
        Ok(())
    }
}

impl SnapshotSource for ActiveDataset {
    fn snapshot(&self) -> Arc<Snapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SnapshotSink for ActiveDataset {
    fn replace_routes(&self, routes: Table<Route>) -> Result<()> {
        self.lock_routes().replace_routes(routes)
    }

    fn replace_stop_times(&self, stop_times: Table<StopTime>) -> Result<()> {
        self.lock_stop_times().replace_stop_times(stop_times)
    }
}

/// Exclusive access to the routes table until dropped.
pub struct RoutesWriter<'a> {
    dataset: &'a ActiveDataset,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> RoutesWriter<'a> {
    /// Routes in this snapshot can't change until the writer is dropped.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.dataset.snapshot()
    }

    pub fn replace_routes(&self, routes: Table<Route>) -> Result<()> {
        self.dataset.persist_table(&routes, "routes.txt")?;
        let routes = Arc::new(routes);
        let generation = self.dataset.swap(|gtfs| GTFS {
            routes,
            ..gtfs.clone()
        });
        debug!("Replaced routes, now at generation {generation}");
        Ok(())
    }
}

/// Exclusive access to the stop times table until dropped.
pub struct StopTimesWriter<'a> {
    dataset: &'a ActiveDataset,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> StopTimesWriter<'a> {
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.dataset.snapshot()
    }

    pub fn replace_stop_times(&self, stop_times: Table<StopTime>) -> Result<()> {
        self.dataset.persist_table(&stop_times, "stop_times.txt")?;
        let stop_times = Arc::new(stop_times);
        let generation = self.dataset.swap(|gtfs| GTFS {
            stop_times,
            ..gtfs.clone()
        });
        debug!("Replaced stop times, now at generation {generation}");
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct ActiveUpload {
    upload_id: UploadID,
}

fn read_active_upload(dir: &Path) -> Result<Option<UploadID>> {
    let path = dir.join(ACTIVE_UPLOAD_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let active: ActiveUpload = serde_json::from_str(&fs_err::read_to_string(&path)?)
        .map_err(|err| anyhow!("{}: {err}", path.display()))?;
    Ok(Some(active.upload_id))
}

fn write_active_upload(dir: &Path, upload: Option<UploadID>) -> Result<()> {
    let path = dir.join(ACTIVE_UPLOAD_FILE);
    match upload {
        Some(upload_id) => {
            fs_err::write(&path, serde_json::to_string(&ActiveUpload { upload_id })?)?;
        }
        None => {
            if path.exists() {
                fs_err::remove_file(&path)?;
            }
        }
    }
    Ok(())
}

fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Copies whatever dataset files exist into a timestamped directory. Backups made within the same
/// second get a numeric suffix.
fn backup_existing(dir: &Path) -> Result<Option<PathBuf>> {
    let existing: Vec<&str> = REQUIRED_FILES
        .into_iter()
        .filter(|file| dir.join(file).exists())
        .collect();
    if existing.is_empty() {
        return Ok(None);
    }
    let stamp = format!("backup_{}", Local::now().format("%Y%m%d_%H%M%S"));
    let mut backup = dir.join(&stamp);
    let mut suffix = 1;
    while backup.exists() {
        backup = dir.join(format!("{stamp}_{suffix}"));
        suffix += 1;
    }
    fs_err::create_dir_all(&backup)?;
    for file in existing {
        fs_err::copy(dir.join(file), backup.join(file))?;
    }
    info!("Backed up the previous dataset to {}", backup.display());
    Ok(Some(backup))
}

fn restore(backup: &Path, dir: &Path) -> Result<()> {
    for file in REQUIRED_FILES {
        let src = backup.join(file);
        if src.exists() {
            fs_err::copy(&src, dir.join(file))?;
        }
    }
    warn!("Restored {} from {}", dir.display(), backup.display());
    Ok(())
}
