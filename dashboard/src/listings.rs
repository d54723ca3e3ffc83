use std::collections::BTreeSet;

use serde::Serialize;

use gtfs::{JoinIndex, Record, RouteID, Row, Stop, StopID};

use crate::QueryError;

/// A stop's raw columns, with the coordinates parsed. Coordinates that don't parse are null.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StopListing {
    #[serde(flatten)]
    pub row: Row,
    pub stop_lat: Option<f64>,
    pub stop_lon: Option<f64>,
}

/// A stop time's raw columns, plus times in seconds and the route of its trip when known.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StopTimeListing {
    #[serde(flatten)]
    pub row: Row,
    pub arrival_sec: Option<u32>,
    pub departure_sec: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<RouteID>,
}

impl StopListing {
    fn new(stop: &Stop) -> Self {
        let mut row = stop.to_row();
        row.remove("stop_lat");
        row.remove("stop_lon");
        Self {
            row,
            stop_lat: stop.parsed_lat(),
            stop_lon: stop.parsed_lon(),
        }
    }
}

/// Every route's columns as they'd be written back.
pub fn route_listing(index: &JoinIndex) -> Vec<Row> {
    index.gtfs.routes.to_rows()
}

/// Every trip's columns, including trips whose route doesn't exist.
pub fn trip_listing(index: &JoinIndex) -> Vec<Row> {
    index.gtfs.trips.to_rows()
}

pub fn stop_listing(index: &JoinIndex) -> Vec<StopListing> {
    index.gtfs.stops.iter().map(StopListing::new).collect()
}

pub fn stop_time_listing(index: &JoinIndex) -> Vec<StopTimeListing> {
    index
        .gtfs
        .stop_times
        .iter()
        .map(|st| StopTimeListing {
            row: st.to_row(),
            arrival_sec: st.arrival().map(|t| t.inner_seconds()),
            departure_sec: st.departure().map(|t| t.inner_seconds()),
            route_id: index.route_of_trip(&st.trip_id).cloned(),
        })
        .collect()
}

/// Every stop served by some trip of a route, in stops.txt order.
pub fn route_stops(index: &JoinIndex, route_id: &RouteID) -> Result<Vec<StopListing>, QueryError> {
    if index.route(route_id).is_none() {
        return Err(QueryError::RouteNotFound(route_id.clone()));
    }
    let mut served: BTreeSet<&StopID> = BTreeSet::new();
    for trip in index.trips_of_route(route_id) {
        for st in index.stop_times_of_trip(trip) {
            served.insert(&st.stop_id);
        }
    }
    Ok(index
        .gtfs
        .stops
        .iter()
        .filter(|stop| served.contains(&stop.stop_id))
        .map(StopListing::new)
        .collect())
}
