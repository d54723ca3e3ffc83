//! Derived views over one GTFS snapshot: KPIs, headways, departure boards, per-route details and
//! paths, plus the only write path back into the active dataset.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

pub mod archive;
mod dataset;
mod departures;
mod edit;
mod listings;
mod metrics;
mod paths;
mod retry;
mod route_details;

use gtfs::{RouteID, StopID};

pub use dataset::{
    ActiveDataset, RoutesWriter, Snapshot, SnapshotSink, SnapshotSource, StopTimesWriter,
};
pub use departures::{departure_board, Departure, MAX_DEPARTURES};
pub use edit::{
    edit_route, edit_stop_sequence, update_route, EditError, RouteEdit, RouteUpdate,
    RouteUpdateResult, StopSequence,
};
pub use listings::{
    route_listing, route_stops, stop_listing, stop_time_listing, trip_listing, StopListing,
    StopTimeListing,
};
pub use metrics::{
    average_headway_minutes, average_trip_duration_minutes, headways, headways_at,
    route_stop_headways, trip_duration, trip_durations, Kpis,
};
pub use paths::{all_route_paths, route_path, PathError, PathStop, RoutePath};
pub use retry::RetryPolicy;
pub use route_details::{first_stop_headway_minutes, RouteDetails, RouteStats, TripDetails};

/// An ID passed in explicitly by a caller doesn't exist in the snapshot.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("route {0} not found")]
    RouteNotFound(RouteID),
    #[error("stop {0} not found")]
    StopNotFound(StopID),
}
