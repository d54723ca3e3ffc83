use std::collections::BTreeMap;

use serde::Serialize;

use crate::table::{put, take, take_id, Record, Row};
use crate::{RouteID, ServiceID, TripID};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Trip {
    pub trip_id: TripID,
    pub route_id: RouteID,
    pub service_id: Option<ServiceID>,
    pub headsign: Option<String>,
    pub short_name: Option<String>,
    /// 0 or 1 in a valid feed. Inbound/outbound are arbitrary.
    pub direction_id: Option<String>,
    pub block_id: Option<String>,
    pub shape_id: Option<String>,
    pub wheelchair_accessible: Option<String>,
    pub bikes_allowed: Option<String>,

    pub extra: BTreeMap<String, String>,
}

impl Trip {
    pub fn new(trip_id: TripID, route_id: RouteID) -> Self {
        Self {
            trip_id,
            route_id,
            service_id: None,
            headsign: None,
            short_name: None,
            direction_id: None,
            block_id: None,
            shape_id: None,
            wheelchair_accessible: None,
            bikes_allowed: None,
            extra: BTreeMap::new(),
        }
    }
}

impl Record for Trip {
    const COLUMNS: &'static [&'static str] = &[
        "route_id",
        "service_id",
        "trip_id",
        "trip_headsign",
        "trip_short_name",
        "direction_id",
        "block_id",
        "shape_id",
        "wheelchair_accessible",
        "bikes_allowed",
    ];

    fn from_row(mut row: Row) -> Self {
        Self {
            trip_id: TripID::new(take_id(&mut row, "trip_id")),
            route_id: RouteID::new(take_id(&mut row, "route_id")),
            service_id: take(&mut row, "service_id").map(ServiceID::new),
            headsign: take(&mut row, "trip_headsign"),
            short_name: take(&mut row, "trip_short_name"),
            direction_id: take(&mut row, "direction_id"),
            block_id: take(&mut row, "block_id"),
            shape_id: take(&mut row, "shape_id"),
            wheelchair_accessible: take(&mut row, "wheelchair_accessible"),
            bikes_allowed: take(&mut row, "bikes_allowed"),
            extra: row,
        }
    }

    fn to_row(&self) -> Row {
        let mut row = self.extra.clone();
        row.insert("trip_id".to_string(), self.trip_id.to_string());
        row.insert("route_id".to_string(), self.route_id.to_string());
        put(
            &mut row,
            "service_id",
            &self.service_id.as_ref().map(|x| x.to_string()),
        );
        put(&mut row, "trip_headsign", &self.headsign);
        put(&mut row, "trip_short_name", &self.short_name);
        put(&mut row, "direction_id", &self.direction_id);
        put(&mut row, "block_id", &self.block_id);
        put(&mut row, "shape_id", &self.shape_id);
        put(&mut row, "wheelchair_accessible", &self.wheelchair_accessible);
        put(&mut row, "bikes_allowed", &self.bikes_allowed);
        row
    }
}
