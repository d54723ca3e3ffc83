use serde::Serialize;

use gtfs::{JoinIndex, RouteID, StopID, TripID};

use crate::QueryError;

/// Boards are cut off after this many entries.
pub const MAX_DEPARTURES: usize = 20;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Departure {
    pub trip_id: TripID,
    pub route_id: Option<RouteID>,
    pub route_name: String,
    pub departure_time: String,
    pub arrival_time: Option<String>,
    pub stop_sequence: Option<String>,
}

/// Everything leaving a stop, ordered by the departure time text.
///
/// The ordering compares the raw strings, not the parsed times, so "7:50:00" lands after
/// "24:10:00". Feeds that zero-pad consistently sort correctly.
pub fn departure_board(index: &JoinIndex, stop: &StopID) -> Result<Vec<Departure>, QueryError> {
    if index.stop(stop).is_none() {
        return Err(QueryError::StopNotFound(stop.clone()));
    }

    let mut departures = Vec::new();
    for st in index.gtfs.stop_times.iter() {
        if &st.stop_id != stop {
            continue;
        }
        let departure_time = match st.departure_time {
            Some(ref x) => x.clone(),
            None => continue,
        };
        let route_id = index
            .route_of_trip(&st.trip_id)
            .filter(|route| !route.is_empty());
        let route_name = match route_id {
            Some(route) => index
                .route(route)
                .and_then(|r| r.short_name.clone())
                .unwrap_or_else(|| route.to_string()),
            None => "N/A".to_string(),
        };
        departures.push(Departure {
            trip_id: st.trip_id.clone(),
            route_id: route_id.cloned(),
            route_name,
            departure_time,
            arrival_time: st.arrival_time.clone(),
            stop_sequence: st.stop_sequence.clone(),
        });
    }

    // Stable, so equal times keep file order
    departures.sort_by(|a, b| a.departure_time.cmp(&b.departure_time));
    departures.truncate(MAX_DEPARTURES);
    Ok(departures)
}

#[cfg(test)]
mod tests {
    use gtfs::GTFS;

    use super::*;

    fn feed(stop_times: &str) -> GTFS {
        GTFS::from_csv_strings(
            "route_id,route_short_name\nR1,Blue\nR2,\n",
            "route_id,trip_id\nR1,T1\nR2,T2\nGONE,T3\n",
            "stop_id,stop_name\nA,Alpha\nB,Beta\n",
            stop_times,
        )
        .unwrap()
    }

    fn times(board: &[Departure]) -> Vec<&str> {
        board.iter().map(|d| d.departure_time.as_str()).collect()
    }

    #[test]
    fn sorted_as_text() {
        let gtfs = feed(
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,08:05:00,08:05:00,A,1\n\
             T1,24:10:00,24:10:00,A,5\n\
             T1,7:50:00,7:50:00,A,9\n",
        );
        let index = JoinIndex::new(&gtfs);
        let board = departure_board(&index, &StopID::new("A")).unwrap();
        assert_eq!(times(&board), vec!["08:05:00", "24:10:00", "7:50:00"]);
    }

    #[test]
    fn route_names() {
        let gtfs = feed(
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,08:00:00,08:00:00,A,1\n\
             T2,08:01:00,08:01:00,A,1\n\
             T3,08:02:00,08:02:00,A,1\n\
             T4,08:03:00,08:03:00,A,1\n",
        );
        let index = JoinIndex::new(&gtfs);
        let board = departure_board(&index, &StopID::new("A")).unwrap();
        let names: Vec<&str> = board.iter().map(|d| d.route_name.as_str()).collect();
        // Short name, then the raw route ID (no short name, or no such route), then N/A for a trip
        // without a route
        assert_eq!(names, vec!["Blue", "R2", "GONE", "N/A"]);
        assert_eq!(board[3].route_id, None);
        assert_eq!(board[2].route_id, Some(RouteID::new("GONE")));
    }

    #[test]
    fn skips_missing_departures_and_other_stops() {
        let gtfs = feed(
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,08:00:00,,A,1\n\
             T1,08:05:00,08:05:00,B,2\n\
             T2,09:00:00,09:00:00,A,1\n",
        );
        let index = JoinIndex::new(&gtfs);
        let board = departure_board(&index, &StopID::new("A")).unwrap();
        assert_eq!(times(&board), vec!["09:00:00"]);
        assert_eq!(board[0].arrival_time.as_deref(), Some("09:00:00"));
        assert_eq!(board[0].stop_sequence.as_deref(), Some("1"));
    }

    #[test]
    fn truncated() {
        let mut stop_times = "trip_id,departure_time,stop_id,stop_sequence\n".to_string();
        for i in 0..30 {
            stop_times.push_str(&format!("T1,{:02}:00:00,A,{}\n", 30 - i, i));
        }
        let gtfs = feed(&stop_times);
        let index = JoinIndex::new(&gtfs);
        let board = departure_board(&index, &StopID::new("A")).unwrap();
        assert_eq!(board.len(), MAX_DEPARTURES);
        assert_eq!(board[0].departure_time, "01:00:00");
        assert_eq!(board[19].departure_time, "20:00:00");
    }

    #[test]
    fn unknown_stop() {
        let gtfs = feed("trip_id,departure_time,stop_id,stop_sequence\n");
        let index = JoinIndex::new(&gtfs);
        assert_eq!(
            departure_board(&index, &StopID::new("Z")),
            Err(QueryError::StopNotFound(StopID::new("Z")))
        );
        // Known, but nothing departs
        assert_eq!(departure_board(&index, &StopID::new("B")), Ok(Vec::new()));
    }
}
