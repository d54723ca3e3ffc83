use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use gtfs::{round2, JoinIndex, Route, RouteID, StopID, Time, TripID};

use crate::metrics::{headways, mean};
use crate::QueryError;

/// Everything about one route needed for a detail page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteDetails {
    pub route: Route,
    pub total_trips: usize,
    pub trips: Vec<TripDetails>,
    /// Only measured at the first stop of each trip
    pub avg_headway_minutes: Option<f64>,
    /// Distinct stops served by any trip
    pub total_stops: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TripDetails {
    pub trip_id: TripID,
    pub service_id: Option<String>,
    pub direction_id: Option<String>,
    pub trip_headsign: Option<String>,
    pub first_stop_id: StopID,
    pub first_stop_name: String,
    pub last_stop_id: StopID,
    pub last_stop_name: String,
    pub departure_time: Option<String>,
    pub arrival_time: Option<String>,
    pub duration_minutes: Option<f64>,
    pub num_stops: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteStats {
    pub total_trips: usize,
    pub trips_by_service: BTreeMap<String, usize>,
}

impl RouteDetails {
    pub fn compute(index: &JoinIndex, route_id: &RouteID) -> Result<Self, QueryError> {
        let route = index
            .route(route_id)
            .ok_or_else(|| QueryError::RouteNotFound(route_id.clone()))?;

        let mut total_trips = 0;
        let mut trips = Vec::new();
        for trip in index.gtfs.trips.iter() {
            if &trip.route_id != route_id {
                continue;
            }
            total_trips += 1;

            let stop_times = index.sorted_stop_times(&trip.trip_id);
            let (first, last) = match (stop_times.first(), stop_times.last()) {
                (Some(first), Some(last)) => (*first, *last),
                _ => continue,
            };
            let duration_minutes = match (first.departure(), last.arrival()) {
                (Some(t1), Some(t2)) => Some(round2(t2.seconds_since(t1) as f64 / 60.0)),
                _ => None,
            };
            trips.push(TripDetails {
                trip_id: trip.trip_id.clone(),
                service_id: trip.service_id.as_ref().map(|x| x.to_string()),
                direction_id: trip.direction_id.clone(),
                trip_headsign: trip.headsign.clone(),
                first_stop_id: first.stop_id.clone(),
                first_stop_name: stop_name(index, &first.stop_id),
                last_stop_id: last.stop_id.clone(),
                last_stop_name: stop_name(index, &last.stop_id),
                departure_time: first.departure_time.clone(),
                arrival_time: last.arrival_time.clone(),
                duration_minutes,
                num_stops: stop_times.len(),
            });
        }

        let mut stops: BTreeSet<&StopID> = BTreeSet::new();
        for trip in index.trips_of_route(route_id) {
            for st in index.stop_times_of_trip(trip) {
                stops.insert(&st.stop_id);
            }
        }

        Ok(Self {
            route: route.clone(),
            total_trips,
            trips,
            avg_headway_minutes: first_stop_headway_minutes(index, route_id),
            total_stops: stops.len(),
        })
    }
}

fn stop_name(index: &JoinIndex, stop: &StopID) -> String {
    index.stop_name(stop).unwrap_or("N/A").to_string()
}

/// A rough headway for a route, looking only at when each trip leaves its first stop. This is
/// separate from the per-stop headways in `metrics`.
pub fn first_stop_headway_minutes(index: &JoinIndex, route_id: &RouteID) -> Option<f64> {
    let mut departures: Vec<Time> = Vec::new();
    for trip in index.trips_of_route(route_id) {
        if let Some(time) = index
            .sorted_stop_times(trip)
            .first()
            .and_then(|st| st.departure())
        {
            departures.push(time);
        }
    }
    mean(&headways(departures)).map(|secs| round2(secs / 60.0))
}

impl RouteStats {
    pub fn compute(index: &JoinIndex, route_id: &RouteID) -> Result<Self, QueryError> {
        if index.route(route_id).is_none() {
            return Err(QueryError::RouteNotFound(route_id.clone()));
        }
        let mut total_trips = 0;
        let mut trips_by_service = BTreeMap::new();
        for trip in index.gtfs.trips.iter() {
            if &trip.route_id != route_id {
                continue;
            }
            total_trips += 1;
            let service = trip
                .service_id
                .as_ref()
                .map(|x| x.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            *trips_by_service.entry(service).or_insert(0) += 1;
        }
        Ok(Self {
            total_trips,
            trips_by_service,
        })
    }
}
