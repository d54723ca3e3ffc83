use std::collections::BTreeMap;

use serde::Serialize;

use crate::table::{put, take, take_id, Record, Row};
use crate::{StopID, Time, TripID};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StopTime {
    pub trip_id: TripID,
    // The raw text. Hours may be 24 or more.
    pub arrival_time: Option<String>,
    pub departure_time: Option<String>,
    pub stop_id: StopID,
    pub stop_sequence: Option<String>,
    pub stop_headsign: Option<String>,
    pub pickup_type: Option<String>,
    pub drop_off_type: Option<String>,
    pub shape_dist_traveled: Option<String>,
    pub timepoint: Option<String>,

    pub extra: BTreeMap<String, String>,
}

impl StopTime {
    pub fn new(trip_id: TripID, stop_id: StopID) -> Self {
        Self {
            trip_id,
            arrival_time: None,
            departure_time: None,
            stop_id,
            stop_sequence: None,
            stop_headsign: None,
            pickup_type: None,
            drop_off_type: None,
            shape_dist_traveled: None,
            timepoint: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn arrival(&self) -> Option<Time> {
        Time::parse(self.arrival_time.as_deref()?)
    }

    pub fn departure(&self) -> Option<Time> {
        Time::parse(self.departure_time.as_deref()?)
    }

    /// The ordering key within a trip. Missing or non-numeric sequences count as 0.
    pub fn sequence_key(&self) -> i64 {
        self.stop_sequence
            .as_deref()
            .and_then(|x| x.parse().ok())
            .unwrap_or(0)
    }
}

/// Stable sort by `sequence_key`, so ties keep file order.
pub fn sort_by_sequence(stop_times: &mut [&StopTime]) {
    stop_times.sort_by_key(|st| st.sequence_key());
}

impl Record for StopTime {
    const COLUMNS: &'static [&'static str] = &[
        "trip_id",
        "arrival_time",
        "departure_time",
        "stop_id",
        "stop_sequence",
        "stop_headsign",
        "pickup_type",
        "drop_off_type",
        "shape_dist_traveled",
        "timepoint",
    ];

    fn from_row(mut row: Row) -> Self {
        Self {
            trip_id: TripID::new(take_id(&mut row, "trip_id")),
            arrival_time: take(&mut row, "arrival_time"),
            departure_time: take(&mut row, "departure_time"),
            stop_id: StopID::new(take_id(&mut row, "stop_id")),
            stop_sequence: take(&mut row, "stop_sequence"),
            stop_headsign: take(&mut row, "stop_headsign"),
            pickup_type: take(&mut row, "pickup_type"),
            drop_off_type: take(&mut row, "drop_off_type"),
            shape_dist_traveled: take(&mut row, "shape_dist_traveled"),
            timepoint: take(&mut row, "timepoint"),
            extra: row,
        }
    }

    fn to_row(&self) -> Row {
        let mut row = self.extra.clone();
        row.insert("trip_id".to_string(), self.trip_id.to_string());
        put(&mut row, "arrival_time", &self.arrival_time);
        put(&mut row, "departure_time", &self.departure_time);
        row.insert("stop_id".to_string(), self.stop_id.to_string());
        put(&mut row, "stop_sequence", &self.stop_sequence);
        put(&mut row, "stop_headsign", &self.stop_headsign);
        put(&mut row, "pickup_type", &self.pickup_type);
        put(&mut row, "drop_off_type", &self.drop_off_type);
        put(&mut row, "shape_dist_traveled", &self.shape_dist_traveled);
        put(&mut row, "timepoint", &self.timepoint);
        row
    }
}
