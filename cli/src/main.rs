#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

use anyhow::Result;
use log::LevelFilter;
use serde::Serialize;
use simple_logger::SimpleLogger;
use structopt::StructOpt;

use dashboard::archive::{Archive, UploadID};
use dashboard::{
    all_route_paths, departure_board, route_listing, route_path, route_stops, stop_listing,
    stop_time_listing, trip_listing, update_route, ActiveDataset, Kpis, RouteDetails, RouteStats,
    RouteUpdate, SnapshotSource,
};
use gtfs::{RouteID, StopID};

#[derive(StructOpt)]
#[structopt(about = "Explore and edit a GTFS dataset")]
struct Args {
    /// The directory holding the active dataset. Edits and uploads are written here.
    #[structopt(long, default_value = "data")]
    data: String,
    /// The directory where every upload is kept
    #[structopt(long, default_value = "archive")]
    archive: String,
    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Headline numbers for the whole dataset
    Kpis,
    /// Every route, as raw columns
    Routes,
    /// Every trip, as raw columns
    Trips,
    /// Every stop, with parsed coordinates
    Stops,
    /// Every stop time, with times in seconds
    StopTimes,
    /// The next departures from a stop
    Departures { stop: String },
    RouteDetails { route: String },
    /// Trips of a route, grouped by service
    RouteStats { route: String },
    /// Stops served by a route
    RouteStops { route: String },
    /// The path of one route
    Path {
        route: String,
        /// Print GeoJSON instead
        #[structopt(long)]
        geojson: bool,
    },
    /// Paths of every route that has one
    Paths,
    /// Edit route attributes and, optionally, the stop order of its first trip
    UpdateRoute {
        route: String,
        /// JSON like {"route_short_name": "1X", "stops": [{"stop_id": "A", "stop_sequence": 1}]}
        #[structopt(long)]
        edit: String,
    },
    /// Archive a zipped dataset and make it active
    Upload {
        zip: String,
        #[structopt(long)]
        name: Option<String>,
        #[structopt(long)]
        notes: Option<String>,
    },
    /// List archived uploads, newest first, marking the active one
    Uploads,
    UploadInfo { id: UploadID },
    /// Make an archived upload active again
    Reload { id: UploadID },
    DeleteUpload { id: UploadID },
}

fn main() -> Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .env()
        .init()?;

    let args = Args::from_args();
    args.run()
}

impl Args {
    fn run(self) -> Result<()> {
        match self.cmd {
            Command::Kpis => {
                let snapshot = self.dataset()?.snapshot();
                print(&Kpis::compute(&snapshot.index()))
            }
            Command::Routes => {
                let snapshot = self.dataset()?.snapshot();
                print(&route_listing(&snapshot.index()))
            }
            Command::Trips => {
                let snapshot = self.dataset()?.snapshot();
                print(&trip_listing(&snapshot.index()))
            }
            Command::Stops => {
                let snapshot = self.dataset()?.snapshot();
                print(&stop_listing(&snapshot.index()))
            }
            Command::StopTimes => {
                let snapshot = self.dataset()?.snapshot();
                print(&stop_time_listing(&snapshot.index()))
            }
            Command::Departures { ref stop } => {
                let snapshot = self.dataset()?.snapshot();
                print(&departure_board(&snapshot.index(), &StopID::new(stop))?)
            }
            Command::RouteDetails { ref route } => {
                let snapshot = self.dataset()?.snapshot();
                print(&RouteDetails::compute(
                    &snapshot.index(),
                    &RouteID::new(route),
                )?)
            }
            Command::RouteStats { ref route } => {
                let snapshot = self.dataset()?.snapshot();
                print(&RouteStats::compute(&snapshot.index(), &RouteID::new(route))?)
            }
            Command::RouteStops { ref route } => {
                let snapshot = self.dataset()?.snapshot();
                print(&route_stops(&snapshot.index(), &RouteID::new(route))?)
            }
            Command::Path { ref route, geojson } => {
                let snapshot = self.dataset()?.snapshot();
                let path = route_path(&snapshot.index(), &RouteID::new(route))?;
                if geojson {
                    print(&path.to_geojson())
                } else {
                    print(&path)
                }
            }
            Command::Paths => {
                let snapshot = self.dataset()?.snapshot();
                print(&all_route_paths(&snapshot.index()))
            }
            Command::UpdateRoute {
                ref route,
                ref edit,
            } => {
                let update: RouteUpdate = serde_json::from_str(edit)
                    .map_err(|err| anyhow!("Bad --edit {edit}: {err}"))?;
                let dataset = self.dataset()?;
                print(&update_route(&dataset, &RouteID::new(route), &update)?)
            }
            Command::Upload {
                ref zip,
                ref name,
                ref notes,
            } => {
                let summary = self
                    .archive()?
                    .import_zip(zip, name.clone(), notes.clone())?;
                let gtfs = self
                    .archive()?
                    .load(summary.record.id)?
                    .ok_or_else(|| anyhow!("Upload {} vanished", summary.record.id))?;
                self.dataset()?.ingest_upload(summary.record.id, gtfs)?;
                print(&summary)
            }
            Command::Uploads => {
                let active = self.dataset()?.active_upload();
                print(&self.archive()?.list_marking(active)?)
            }
            Command::UploadInfo { id } => match self.archive()?.get(id)? {
                Some(summary) => print(&summary),
                None => bail!("Upload {id} not found"),
            },
            Command::Reload { id } => {
                let gtfs = self
                    .archive()?
                    .load(id)?
                    .ok_or_else(|| anyhow!("Upload {id} not found"))?;
                let dataset = self.dataset()?;
                let generation = dataset.ingest_upload(id, gtfs)?;
                info!("Upload {id} is active, as generation {generation}");
                print(&dataset.snapshot().gtfs.summary())
            }
            Command::DeleteUpload { id } => match self.archive()?.delete(id)? {
                Some(record) => print(&record),
                None => bail!("Upload {id} not found"),
            },
        }
    }

    fn dataset(&self) -> Result<ActiveDataset> {
        ActiveDataset::open(&self.data)
    }

    fn archive(&self) -> Result<Archive> {
        Archive::open(&self.archive)
    }
}

fn print<T: Serialize>(x: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(x)?);
    Ok(())
}
