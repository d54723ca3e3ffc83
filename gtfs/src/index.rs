use std::collections::{BTreeMap, BTreeSet};

use crate::stop_times::sort_by_sequence;
use crate::{Route, RouteID, Stop, StopID, StopTime, TripID, GTFS};

/// Lookups joining the four tables by their string IDs. Borrows from one snapshot and never
/// modifies it; build once and share across every query against that snapshot.
pub struct JoinIndex<'a> {
    pub gtfs: &'a GTFS,
    /// Last write wins if a trip ID is duplicated
    pub trip_to_route: BTreeMap<&'a TripID, &'a RouteID>,
    /// In file order, not sorted by stop_sequence
    pub stop_times_by_trip: BTreeMap<&'a TripID, Vec<&'a StopTime>>,
    /// Deduplicated, in the order trips first appear
    pub route_to_trips: BTreeMap<&'a RouteID, Vec<&'a TripID>>,
    /// First write wins
    pub stops_by_id: BTreeMap<&'a StopID, &'a Stop>,
    /// First write wins
    pub routes_by_id: BTreeMap<&'a RouteID, &'a Route>,
}

impl<'a> JoinIndex<'a> {
    pub fn new(gtfs: &'a GTFS) -> Self {
        let mut trip_to_route = BTreeMap::new();
        let mut route_to_trips: BTreeMap<&RouteID, Vec<&TripID>> = BTreeMap::new();
        let mut seen: BTreeSet<(&RouteID, &TripID)> = BTreeSet::new();
        for trip in gtfs.trips.iter() {
            if trip.trip_id.is_empty() {
                continue;
            }
            trip_to_route.insert(&trip.trip_id, &trip.route_id);
            if !trip.route_id.is_empty() && seen.insert((&trip.route_id, &trip.trip_id)) {
                route_to_trips
                    .entry(&trip.route_id)
                    .or_insert_with(Vec::new)
                    .push(&trip.trip_id);
            }
        }

        let mut stop_times_by_trip: BTreeMap<&TripID, Vec<&StopTime>> = BTreeMap::new();
        for st in gtfs.stop_times.iter() {
            if st.trip_id.is_empty() {
                continue;
            }
            stop_times_by_trip
                .entry(&st.trip_id)
                .or_insert_with(Vec::new)
                .push(st);
        }

        let mut stops_by_id = BTreeMap::new();
        for stop in gtfs.stops.iter() {
            if !stop.stop_id.is_empty() {
                stops_by_id.entry(&stop.stop_id).or_insert(stop);
            }
        }

        let mut routes_by_id = BTreeMap::new();
        for route in gtfs.routes.iter() {
            if !route.route_id.is_empty() {
                routes_by_id.entry(&route.route_id).or_insert(route);
            }
        }

        Self {
            gtfs,
            trip_to_route,
            stop_times_by_trip,
            route_to_trips,
            stops_by_id,
            routes_by_id,
        }
    }

    pub fn route(&self, id: &RouteID) -> Option<&'a Route> {
        self.routes_by_id.get(id).copied()
    }

    pub fn stop(&self, id: &StopID) -> Option<&'a Stop> {
        self.stops_by_id.get(id).copied()
    }

    pub fn route_of_trip(&self, trip: &TripID) -> Option<&'a RouteID> {
        self.trip_to_route.get(trip).copied()
    }

    /// The route a trip belongs to, only if that route actually exists.
    pub fn resolved_route_of_trip(&self, trip: &TripID) -> Option<&'a RouteID> {
        self.route_of_trip(trip)
            .filter(|route| self.routes_by_id.contains_key(*route))
    }

    pub fn trips_of_route(&self, route: &RouteID) -> &[&'a TripID] {
        self.route_to_trips
            .get(route)
            .map(|trips| trips.as_slice())
            .unwrap_or(&[])
    }

    pub fn stop_times_of_trip(&self, trip: &TripID) -> &[&'a StopTime] {
        self.stop_times_by_trip
            .get(trip)
            .map(|list| list.as_slice())
            .unwrap_or(&[])
    }

    /// Stably sorted by stop_sequence
    pub fn sorted_stop_times(&self, trip: &TripID) -> Vec<&'a StopTime> {
        let mut list = self.stop_times_of_trip(trip).to_vec();
        sort_by_sequence(&mut list);
        list
    }

    pub fn stop_name(&self, id: &StopID) -> Option<&'a str> {
        self.stop(id).and_then(|stop| stop.name.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Trip;

    fn gtfs() -> GTFS {
        GTFS::from_csv_strings(
            "route_id,route_short_name\nR1,1\nR2,2\nR1,dupe\n",
            "route_id,trip_id\nR1,T1\nR1,T2\nR2,T3\nR1,T1\nR2,T4\n,T5\n",
            "stop_id,stop_name\nA,Alpha\nB,Beta\nA,Second Alpha\n",
            "trip_id,stop_id,stop_sequence\nT1,B,2\nT1,A,1\nT3,A,1\nT9,A,1\n",
        )
        .unwrap()
    }

    #[test]
    fn lookups() {
        let gtfs = gtfs();
        let index = JoinIndex::new(&gtfs);

        let r1 = RouteID::new("R1");
        let trips: Vec<&str> = index
            .trips_of_route(&r1)
            .iter()
            .map(|t| t.as_str())
            .collect();
        assert_eq!(trips, vec!["T1", "T2"]);
        assert_eq!(
            index.route(&r1).unwrap().short_name.as_deref(),
            Some("1")
        );
        assert_eq!(index.stop_name(&StopID::new("A")), Some("Alpha"));
        assert!(index.trips_of_route(&RouteID::new("nope")).is_empty());

        // T5 has no route, so it isn't route-scoped anywhere, but it's still in trip_to_route
        assert_eq!(
            index.route_of_trip(&TripID::new("T5")).map(|r| r.as_str()),
            Some("")
        );
        assert_eq!(index.resolved_route_of_trip(&TripID::new("T5")), None);
    }

    #[test]
    fn stop_times_keep_file_order_until_sorted() {
        let gtfs = gtfs();
        let index = JoinIndex::new(&gtfs);
        let t1 = TripID::new("T1");
        let raw: Vec<&str> = index
            .stop_times_of_trip(&t1)
            .iter()
            .map(|st| st.stop_id.as_str())
            .collect();
        assert_eq!(raw, vec!["B", "A"]);
        let sorted: Vec<&str> = index
            .sorted_stop_times(&t1)
            .iter()
            .map(|st| st.stop_id.as_str())
            .collect();
        assert_eq!(sorted, vec!["A", "B"]);
        // Stop times for unknown trips are still indexed
        assert_eq!(index.stop_times_of_trip(&TripID::new("T9")).len(), 1);
    }

    #[test]
    fn duplicate_trip_last_write_wins() {
        let mut gtfs = gtfs();
        let mut moved = Trip::new(TripID::new("T2"), RouteID::new("R2"));
        moved.headsign = Some("moved".to_string());
        std::sync::Arc::make_mut(&mut gtfs.trips).rows.push(moved);
        let index = JoinIndex::new(&gtfs);
        assert_eq!(
            index.route_of_trip(&TripID::new("T2")).map(|r| r.as_str()),
            Some("R2")
        );
    }
}
