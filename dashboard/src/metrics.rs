use std::collections::BTreeMap;

use serde::Serialize;

use gtfs::{round2, JoinIndex, RouteID, StopID, StopTime, Time, TripID};

/// Headline numbers for a whole dataset.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Kpis {
    pub total_routes: usize,
    pub total_trips: usize,
    /// 0 if there's nothing to measure
    pub avg_headway_minutes: f64,
    pub avg_trip_duration_minutes: f64,
    pub total_stops: usize,
}

impl Kpis {
    pub fn compute(index: &JoinIndex) -> Self {
        let gtfs = index.gtfs;
        let total_routes = unique_count(gtfs.routes.iter().map(|r| r.route_id.as_str()));
        let total_trips = unique_count(gtfs.trips.iter().map(|t| t.trip_id.as_str()));
        let kpis = Self {
            total_routes,
            total_trips,
            avg_headway_minutes: round2(average_headway_minutes(index, None).unwrap_or(0.0)),
            avg_trip_duration_minutes: round2(average_trip_duration_minutes(index).unwrap_or(0.0)),
            total_stops: gtfs.stops.len(),
        };
        debug!("KPIs: {:?}", kpis);
        kpis
    }
}

fn unique_count<'a, I: Iterator<Item = &'a str>>(ids: I) -> usize {
    ids.filter(|id| !id.is_empty())
        .collect::<std::collections::BTreeSet<_>>()
        .len()
}

/// Gaps in seconds between successive departures. Zero or negative gaps come from duplicated
/// departures and are dropped.
pub fn headways(mut departures: Vec<Time>) -> Vec<u32> {
    departures.sort();
    departures
        .windows(2)
        .map(|pair| pair[1].seconds_since(pair[0]))
        .filter(|gap| *gap > 0)
        .map(|gap| gap as u32)
        .collect()
}

/// Headways of one route at one stop. Trips whose route doesn't exist don't count.
pub fn headways_at(index: &JoinIndex, route: &RouteID, stop: &StopID) -> Vec<u32> {
    let departures = index
        .gtfs
        .stop_times
        .iter()
        .filter(|st| &st.stop_id == stop)
        .filter(|st| index.resolved_route_of_trip(&st.trip_id) == Some(route))
        .filter_map(StopTime::departure)
        .collect();
    headways(departures)
}

/// Headways for every (route, stop) pair served in the dataset.
pub fn route_stop_headways<'a>(
    index: &JoinIndex<'a>,
) -> BTreeMap<(&'a RouteID, &'a StopID), Vec<u32>> {
    let mut departures: BTreeMap<(&RouteID, &StopID), Vec<Time>> = BTreeMap::new();
    for st in index.gtfs.stop_times.iter() {
        if st.stop_id.is_empty() {
            continue;
        }
        let route = match index.resolved_route_of_trip(&st.trip_id) {
            Some(route) => route,
            None => continue,
        };
        if let Some(time) = st.departure() {
            departures
                .entry((route, &st.stop_id))
                .or_insert_with(Vec::new)
                .push(time);
        }
    }
    departures
        .into_iter()
        .map(|(key, times)| (key, headways(times)))
        .collect()
}

/// The mean of every (route, stop) headway, across the whole dataset or just one route.
pub fn average_headway_minutes(index: &JoinIndex, route: Option<&RouteID>) -> Option<f64> {
    let all = route_stop_headways(index);
    let samples: Vec<u32> = all
        .into_iter()
        .filter(|((r, _), _)| route.map(|route| *r == route).unwrap_or(true))
        .flat_map(|(_, list)| list)
        .collect();
    mean(&samples).map(|secs| secs / 60.0)
}

/// The span between the earliest and latest time anywhere in a trip, using both arrivals and
/// departures. None if that isn't positive.
pub fn trip_duration(stop_times: &[&StopTime]) -> Option<u32> {
    let times: Vec<Time> = stop_times
        .iter()
        .flat_map(|st| [st.arrival(), st.departure()])
        .flatten()
        .collect();
    let first = times.iter().min()?;
    let last = times.iter().max()?;
    let duration = last.seconds_since(*first);
    if duration > 0 {
        Some(duration as u32)
    } else {
        None
    }
}

/// Durations in seconds of every trip that has stop times, skipping trips without a positive
/// duration.
pub fn trip_durations<'a>(index: &JoinIndex<'a>) -> BTreeMap<&'a TripID, u32> {
    index
        .stop_times_by_trip
        .iter()
        .filter_map(|(trip, stop_times)| Some((*trip, trip_duration(stop_times)?)))
        .collect()
}

pub fn average_trip_duration_minutes(index: &JoinIndex) -> Option<f64> {
    let durations: Vec<u32> = trip_durations(index).into_values().collect();
    mean(&durations).map(|secs| secs / 60.0)
}

pub(crate) fn mean(samples: &[u32]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let sum: f64 = samples.iter().map(|x| f64::from(*x)).sum();
    Some(sum / samples.len() as f64)
}
