#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod ids;
mod index;
mod routes;
mod stop_times;
mod stops;
pub mod table;
mod time;
mod trips;

use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use zip::ZipArchive;

pub use ids::{RouteID, ServiceID, StopID, TripID};
pub use index::JoinIndex;
pub use routes::Route;
pub use stop_times::{sort_by_sequence, StopTime};
pub use stops::{LatLon, Stop};
pub use table::{load_table, load_table_from_path, preview_table, Record, Row, Table};
pub use time::{format_seconds, parse_time, Time};
pub use trips::Trip;

/// A dataset is only usable with all of these present.
pub const REQUIRED_FILES: [&str; 4] = ["stops.txt", "routes.txt", "trips.txt", "stop_times.txt"];

/// One complete dataset. The four tables always come from the same source. Tables are shared, so
/// cloning a dataset to replace one of them copies nothing else.
#[derive(Clone, Debug)]
pub struct GTFS {
    pub routes: Arc<Table<Route>>,
    pub trips: Arc<Table<Trip>>,
    pub stops: Arc<Table<Stop>>,
    pub stop_times: Arc<Table<StopTime>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub routes: usize,
    pub trips: usize,
    pub stops: usize,
    pub stop_times: usize,
    pub avg_stops_per_trip: f64,
}

impl GTFS {
    pub fn empty() -> Self {
        Self::from_tables(Table::empty(), Table::empty(), Table::empty(), Table::empty())
    }

    pub fn from_tables(
        routes: Table<Route>,
        trips: Table<Trip>,
        stops: Table<Stop>,
        stop_times: Table<StopTime>,
    ) -> Self {
        Self {
            routes: Arc::new(routes),
            trips: Arc::new(trips),
            stops: Arc::new(stops),
            stop_times: Arc::new(stop_times),
        }
    }

    /// Fails if any of the required files is missing, rather than producing a partial dataset.
    pub fn load_from_dir<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let missing: Vec<&str> = REQUIRED_FILES
            .into_iter()
            .filter(|file| !path.join(file).exists())
            .collect();
        if !missing.is_empty() {
            bail!(
                "{} is missing required GTFS files: {}",
                path.display(),
                missing.join(", ")
            );
        }

        let stops = Table::load_from_path(path.join("stops.txt"))?;
        let routes = Table::load_from_path(path.join("routes.txt"))?;
        let trips = Table::load_from_path(path.join("trips.txt"))?;
        let stop_times = Table::load_from_path(path.join("stop_times.txt"))?;
        let gtfs = Self::from_tables(routes, trips, stops, stop_times);
        info!("Loaded {} from {}", gtfs.describe(), path.display());
        Ok(gtfs)
    }

    /// Finds the required files anywhere in the archive, since many feeds are zipped with a
    /// top-level directory.
    pub fn load_from_zip<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Self> {
        let names: Vec<String> = archive.file_names().map(|x| x.to_string()).collect();
        let mut found = Vec::new();
        let mut missing = Vec::new();
        for file in REQUIRED_FILES {
            match names.iter().find(|name| is_member(name, file)) {
                Some(name) => found.push(name.clone()),
                None => missing.push(file),
            }
        }
        if !missing.is_empty() {
            bail!("Missing required GTFS files: {}", missing.join(", "));
        }

        // Each member borrows the archive mutably, so read them one at a time
        let stops = Table::from_reader(get_zip_file(archive, &found[0])?)?;
        let routes = Table::from_reader(get_zip_file(archive, &found[1])?)?;
        let trips = Table::from_reader(get_zip_file(archive, &found[2])?)?;
        let stop_times = Table::from_reader(get_zip_file(archive, &found[3])?)?;
        let gtfs = Self::from_tables(routes, trips, stops, stop_times);
        info!("Loaded {} from a zip archive", gtfs.describe());
        Ok(gtfs)
    }

    pub fn import_zip_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mut archive = ZipArchive::new(std::io::Cursor::new(bytes))
            .map_err(|err| anyhow!("Invalid zip file: {err}"))?;
        Self::load_from_zip(&mut archive)
    }

    /// Mostly for tests and small fixtures. Arguments are the contents of routes.txt, trips.txt,
    /// stops.txt, and stop_times.txt.
    pub fn from_csv_strings(
        routes: &str,
        trips: &str,
        stops: &str,
        stop_times: &str,
    ) -> Result<Self> {
        Ok(Self::from_tables(
            Table::from_reader(routes.as_bytes())?,
            Table::from_reader(trips.as_bytes())?,
            Table::from_reader(stops.as_bytes())?,
            Table::from_reader(stop_times.as_bytes())?,
        ))
    }

    pub fn write_to_dir<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs_err::create_dir_all(path)?;
        self.stops.write_to_path(path.join("stops.txt"))?;
        self.routes.write_to_path(path.join("routes.txt"))?;
        self.trips.write_to_path(path.join("trips.txt"))?;
        self.stop_times.write_to_path(path.join("stop_times.txt"))?;
        Ok(())
    }

    pub fn summary(&self) -> Summary {
        let avg_stops_per_trip = if self.trips.is_empty() {
            0.0
        } else {
            round2(self.stop_times.len() as f64 / self.trips.len() as f64)
        };
        Summary {
            routes: self.routes.len(),
            trips: self.trips.len(),
            stops: self.stops.len(),
            stop_times: self.stop_times.len(),
            avg_stops_per_trip,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "{} routes, {} trips, {} stops, {} stop times",
            self.routes.len(),
            self.trips.len(),
            self.stops.len(),
            self.stop_times.len()
        )
    }
}

fn is_member(name: &str, file: &str) -> bool {
    name == file || name.ends_with(&format!("/{file}"))
}

/// Rounds to 2 decimal places, the precision every derived number is reported with.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// Adds the path in the error message
pub fn get_zip_file<'a, R: Read + Seek>(
    archive: &'a mut ZipArchive<R>,
    path: &str,
) -> Result<zip::read::ZipFile<'a>> {
    archive
        .by_name(path)
        .map_err(|err| anyhow!("{path}: {err}"))
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use super::*;

    fn zip_with(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in files {
            writer
                .start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn zip_with_nested_directory() {
        let bytes = zip_with(&[
            ("feed/routes.txt", "route_id\nR1\n"),
            ("feed/trips.txt", "route_id,trip_id\nR1,T1\n"),
            ("feed/stops.txt", "stop_id\nA\nB\n"),
            ("feed/stop_times.txt", "trip_id,stop_id,stop_sequence\nT1,A,1\nT1,B,2\n"),
            ("feed/agency.txt", "agency_id\nX\n"),
        ]);
        let gtfs = GTFS::import_zip_bytes(bytes).unwrap();
        assert_eq!(gtfs.routes.len(), 1);
        assert_eq!(gtfs.stops.len(), 2);
        assert_eq!(gtfs.trips.rows[0].trip_id, TripID::new("T1"));
        assert_eq!(gtfs.stop_times.rows[1].stop_id, StopID::new("B"));
        let summary = gtfs.summary();
        assert_eq!(summary.stop_times, 2);
        assert_eq!(summary.avg_stops_per_trip, 2.0);
    }

    #[test]
    fn zip_missing_a_table() {
        let bytes = zip_with(&[
            ("routes.txt", "route_id\nR1\n"),
            ("trips.txt", "route_id,trip_id\nR1,T1\n"),
            ("stops.txt", "stop_id\nA\n"),
        ]);
        let err = GTFS::import_zip_bytes(bytes).unwrap_err();
        assert!(err.to_string().contains("stop_times.txt"), "{err}");
    }

    #[test]
    fn replacing_one_table_shares_the_rest() {
        let gtfs = GTFS::from_csv_strings(
            "route_id\nR1\n",
            "route_id,trip_id\nR1,T1\n",
            "stop_id\nA\n",
            "trip_id,stop_id\nT1,A\n",
        )
        .unwrap();
        let mut routes = (*gtfs.routes).clone();
        routes.rows[0].short_name = Some("1".to_string());
        let edited = GTFS {
            routes: Arc::new(routes),
            ..gtfs.clone()
        };
        assert!(Arc::ptr_eq(&gtfs.stop_times, &edited.stop_times));
        assert!(Arc::ptr_eq(&gtfs.stops, &edited.stops));
        assert!(gtfs.routes.rows[0].short_name.is_none());
        assert_eq!(edited.routes.rows[0].short_name.as_deref(), Some("1"));
    }

    #[test]
    fn not_a_zip() {
        assert!(GTFS::import_zip_bytes(b"hello".to_vec()).is_err());
    }

    #[test]
    fn member_names() {
        assert!(is_member("stops.txt", "stops.txt"));
        assert!(is_member("a/b/stops.txt", "stops.txt"));
        assert!(!is_member("bus_stops.txt", "stops.txt"));
        assert!(!is_member("stop_times.txt", "stops.txt"));
    }

    #[test]
    fn rounding() {
        assert_eq!(round2(22.5), 22.5);
        assert_eq!(round2(1.0 / 3.0), 0.33);
        assert_eq!(round2(2.0 / 3.0), 0.67);
    }
}
