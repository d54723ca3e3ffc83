use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use serde::Serialize;

use gtfs::{JoinIndex, Record, Route, RouteID, Row, StopID, StopTime};

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum PathError {
    #[error("route {0} not found")]
    RouteNotFound(RouteID),
    #[error("no trips for route {0}")]
    NoTrips(RouteID),
    #[error("no path found for route {0}")]
    NoPath(RouteID),
}

/// The line a route traces, approximated by the stops of its longest trip.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoutePath {
    pub route_id: RouteID,
    pub route: Row,
    /// [lat, lon] pairs, in stop order
    pub coordinates: Vec<[f64; 2]>,
    /// Parallel to `coordinates`
    pub stops: Vec<PathStop>,
    pub total_stops: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PathStop {
    pub stop_id: StopID,
    pub stop_name: Option<String>,
    pub stop_sequence: i64,
}

/// A path needs at least this many good coordinates.
const MIN_COORDINATES: usize = 2;

/// Only for routes in routes.txt, even if trips refer to other route IDs.
pub fn route_path(index: &JoinIndex, route_id: &RouteID) -> Result<RoutePath, PathError> {
    let route = index
        .route(route_id)
        .ok_or_else(|| PathError::RouteNotFound(route_id.clone()))?;
    build_path(index, route_id, route)
}

/// Paths for every route. Routes without a usable path are logged and skipped; they never fail the
/// whole batch.
pub fn all_route_paths(index: &JoinIndex) -> Vec<RoutePath> {
    let mut paths = Vec::new();
    let mut skipped = 0;
    for route in index.gtfs.routes.iter() {
        if route.route_id.is_empty() {
            warn!("Skipping a route without a route_id: {:?}", route.to_row());
            skipped += 1;
            continue;
        }
        match build_path(index, &route.route_id, route) {
            Ok(path) => {
                debug!(
                    "Route {}: {} coordinates",
                    route.route_id,
                    path.coordinates.len()
                );
                paths.push(path);
            }
            Err(err) => {
                debug!("Skipping: {err}");
                skipped += 1;
            }
        }
    }
    info!(
        "Built {} route paths out of {} routes ({} skipped)",
        paths.len(),
        index.gtfs.routes.len(),
        skipped
    );
    paths
}

fn build_path(
    index: &JoinIndex,
    route_id: &RouteID,
    route: &Route,
) -> Result<RoutePath, PathError> {
    let trips = index.trips_of_route(route_id);
    if trips.is_empty() {
        return Err(PathError::NoTrips(route_id.clone()));
    }

    // The trip with the most stop times. On a tie, the earliest trip in trips.txt wins.
    let mut best: Option<Vec<&StopTime>> = None;
    for trip in trips {
        let stop_times = index.sorted_stop_times(trip);
        if stop_times.is_empty() {
            continue;
        }
        if best
            .as_ref()
            .map(|b| stop_times.len() > b.len())
            .unwrap_or(true)
        {
            best = Some(stop_times);
        }
    }
    let best = best.ok_or_else(|| PathError::NoPath(route_id.clone()))?;

    let mut coordinates = Vec::new();
    let mut stops = Vec::new();
    for st in best {
        let stop = match index.stop(&st.stop_id) {
            Some(stop) => stop,
            None => continue,
        };
        match stop.position() {
            Some(pos) => {
                coordinates.push([pos.lat, pos.lon]);
                stops.push(PathStop {
                    stop_id: stop.stop_id.clone(),
                    stop_name: stop.name.clone(),
                    stop_sequence: st.sequence_key(),
                });
            }
            None => {
                debug!(
                    "Route {route_id}, stop {}: no valid coordinates ({:?}, {:?})",
                    stop.stop_id, stop.lat, stop.lon
                );
            }
        }
    }

    if coordinates.len() < MIN_COORDINATES {
        return Err(PathError::NoPath(route_id.clone()));
    }
    Ok(RoutePath {
        route_id: route_id.clone(),
        route: route.to_row(),
        total_stops: coordinates.len(),
        coordinates,
        stops,
    })
}

impl RoutePath {
    /// A LineString for the path, then a Point for every stop. GeoJSON wants (lon, lat).
    pub fn to_geojson(&self) -> GeoJson {
        let mut features = Vec::new();

        let mut feature = Feature {
            bbox: None,
            geometry: Some(Geometry::new(Value::LineString(
                self.coordinates
                    .iter()
                    .map(|[lat, lon]| vec![*lon, *lat])
                    .collect(),
            ))),
            id: None,
            properties: None,
            foreign_members: None,
        };
        feature.set_property("type", "route");
        feature.set_property("route_id", self.route_id.to_string());
        features.push(feature);

        for ([lat, lon], stop) in self.coordinates.iter().zip(self.stops.iter()) {
            let mut feature = Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![*lon, *lat]))),
                id: None,
                properties: None,
                foreign_members: None,
            };
            feature.set_property("type", "stop");
            feature.set_property("stop_id", stop.stop_id.to_string());
            feature.set_property("stop_sequence", stop.stop_sequence);
            if let Some(ref name) = stop.stop_name {
                feature.set_property("stop_name", name.clone());
            }
            features.push(feature);
        }

        GeoJson::FeatureCollection(FeatureCollection {
            features,
            bbox: None,
            foreign_members: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use gtfs::GTFS;

    use super::*;

    const STOPS: &str = "stop_id,stop_name,stop_lat,stop_lon\n\
        A,Alpha,52.50,13.40\n\
        B,Beta,52.51,13.41\n\
        C,Gamma,52.52,13.42\n\
        Z,Null Island,0,0\n\
        X,Bad,95,13.4\n\
        Q,Garbled,abc,13.4\n";

    #[test]
    fn batch_skips_routes_with_too_few_coordinates() {
        let gtfs = GTFS::from_csv_strings(
            "route_id,route_short_name\nSHORT,1\nLONG,2\n",
            "route_id,trip_id\nSHORT,T1\nLONG,T2\n",
            STOPS,
            "trip_id,stop_id,stop_sequence\n\
             T1,A,1\n\
             T1,Z,2\n\
             T1,X,3\n\
             T2,C,3\n\
             T2,A,1\n\
             T2,B,2\n",
        )
        .unwrap();
        let index = JoinIndex::new(&gtfs);
        let paths = all_route_paths(&index);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].route_id, RouteID::new("LONG"));
        assert_eq!(paths[0].route["route_short_name"], "2");
        assert_eq!(
            paths[0].coordinates,
            vec![[52.50, 13.40], [52.51, 13.41], [52.52, 13.42]]
        );
        assert_eq!(paths[0].total_stops, 3);

        assert_eq!(
            route_path(&index, &RouteID::new("SHORT")),
            Err(PathError::NoPath(RouteID::new("SHORT")))
        );
    }

    #[test]
    fn representative_trip_is_the_longest() {
        let gtfs = GTFS::from_csv_strings(
            "route_id\nR1\n",
            "route_id,trip_id\nR1,T1\nR1,T2\nR1,T3\n",
            STOPS,
            "trip_id,stop_id,stop_sequence\n\
             T1,A,1\n\
             T1,B,2\n\
             T2,C,1\n\
             T2,B,2\n\
             T2,A,3\n\
             T3,B,1\n\
             T3,A,2\n\
             T3,C,3\n",
        )
        .unwrap();
        let index = JoinIndex::new(&gtfs);
        let path = route_path(&index, &RouteID::new("R1")).unwrap();
        // T2 and T3 tie; T2 comes first
        let ids: Vec<&str> = path.stops.iter().map(|s| s.stop_id.as_str()).collect();
        assert_eq!(ids, vec!["C", "B", "A"]);
        let seqs: Vec<i64> = path.stops.iter().map(|s| s.stop_sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn invalid_sequences_sort_as_zero() {
        let gtfs = GTFS::from_csv_strings(
            "route_id\nR1\n",
            "route_id,trip_id\nR1,T1\n",
            STOPS,
            "trip_id,stop_id,stop_sequence\n\
             T1,A,2\n\
             T1,B,oops\n\
             T1,C,1\n\
             T1,Q,3\n",
        )
        .unwrap();
        let index = JoinIndex::new(&gtfs);
        let path = route_path(&index, &RouteID::new("R1")).unwrap();
        let ids: Vec<&str> = path.stops.iter().map(|s| s.stop_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C", "A"]);
        assert_eq!(path.stops[0].stop_sequence, 0);
    }

    #[test]
    fn failures() {
        let gtfs = GTFS::from_csv_strings(
            "route_id\nR1\nR2\n",
            "route_id,trip_id\nR2,T2\n",
            STOPS,
            "trip_id,stop_id,stop_sequence\n",
        )
        .unwrap();
        let index = JoinIndex::new(&gtfs);
        assert_eq!(
            route_path(&index, &RouteID::new("R1")),
            Err(PathError::NoTrips(RouteID::new("R1")))
        );
        // Has a trip, but no stop times
        assert_eq!(
            route_path(&index, &RouteID::new("R2")),
            Err(PathError::NoPath(RouteID::new("R2")))
        );
        assert!(all_route_paths(&index).is_empty());
    }

    #[test]
    fn trips_on_an_unlisted_route_have_no_path() {
        let gtfs = GTFS::from_csv_strings(
            "route_id\nR1\n",
            "route_id,trip_id\nGHOST,T1\n",
            STOPS,
            "trip_id,stop_id,stop_sequence\nT1,A,1\nT1,B,2\n",
        )
        .unwrap();
        let index = JoinIndex::new(&gtfs);
        assert_eq!(
            route_path(&index, &RouteID::new("GHOST")),
            Err(PathError::RouteNotFound(RouteID::new("GHOST")))
        );
        assert!(all_route_paths(&index).is_empty());
    }

    #[test]
    fn geojson_is_lon_lat() {
        let gtfs = GTFS::from_csv_strings(
            "route_id\nR1\n",
            "route_id,trip_id\nR1,T1\n",
            STOPS,
            "trip_id,stop_id,stop_sequence\nT1,A,1\nT1,B,2\n",
        )
        .unwrap();
        let index = JoinIndex::new(&gtfs);
        let path = route_path(&index, &RouteID::new("R1")).unwrap();
        let json = serde_json::to_value(path.to_geojson()).unwrap();
        let features = json["features"].as_array().unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[0]["geometry"]["type"], "LineString");
        assert_eq!(features[0]["geometry"]["coordinates"][0][0], 13.40);
        assert_eq!(features[0]["geometry"]["coordinates"][0][1], 52.50);
        assert_eq!(features[2]["properties"]["stop_name"], "Beta");
    }
}
