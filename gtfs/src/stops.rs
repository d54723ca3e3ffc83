use std::collections::BTreeMap;

use serde::Serialize;

use crate::table::{put, take, take_id, Record, Row};
use crate::StopID;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Stop {
    pub stop_id: StopID,
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    // Raw text. Use position() to get something validated.
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub zone_id: Option<String>,
    pub url: Option<String>,
    pub location_type: Option<String>,
    pub parent_station: Option<String>,
    pub timezone: Option<String>,
    pub wheelchair_boarding: Option<String>,

    pub extra: BTreeMap<String, String>,
}

/// A WGS84 position known to be in range and not the (0, 0) placeholder.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }
        // Lots of feeds use 0,0 for "unknown"
        if lat == 0.0 && lon == 0.0 {
            return None;
        }
        Some(Self { lat, lon })
    }
}

impl Stop {
    pub fn new(stop_id: StopID) -> Self {
        Self {
            stop_id,
            code: None,
            name: None,
            description: None,
            lat: None,
            lon: None,
            zone_id: None,
            url: None,
            location_type: None,
            parent_station: None,
            timezone: None,
            wheelchair_boarding: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn parsed_lat(&self) -> Option<f64> {
        parse_coordinate(self.lat.as_deref())
    }

    pub fn parsed_lon(&self) -> Option<f64> {
        parse_coordinate(self.lon.as_deref())
    }

    pub fn position(&self) -> Option<LatLon> {
        LatLon::new(self.parsed_lat()?, self.parsed_lon()?)
    }
}

fn parse_coordinate(raw: Option<&str>) -> Option<f64> {
    let x: f64 = raw?.parse().ok()?;
    if x.is_finite() {
        Some(x)
    } else {
        None
    }
}

impl Record for Stop {
    const COLUMNS: &'static [&'static str] = &[
        "stop_id",
        "stop_code",
        "stop_name",
        "stop_desc",
        "stop_lat",
        "stop_lon",
        "zone_id",
        "stop_url",
        "location_type",
        "parent_station",
        "stop_timezone",
        "wheelchair_boarding",
    ];

    fn from_row(mut row: Row) -> Self {
        Self {
            stop_id: StopID::new(take_id(&mut row, "stop_id")),
            code: take(&mut row, "stop_code"),
            name: take(&mut row, "stop_name"),
            description: take(&mut row, "stop_desc"),
            lat: take(&mut row, "stop_lat"),
            lon: take(&mut row, "stop_lon"),
            zone_id: take(&mut row, "zone_id"),
            url: take(&mut row, "stop_url"),
            location_type: take(&mut row, "location_type"),
            parent_station: take(&mut row, "parent_station"),
            timezone: take(&mut row, "stop_timezone"),
            wheelchair_boarding: take(&mut row, "wheelchair_boarding"),
            extra: row,
        }
    }

    fn to_row(&self) -> Row {
        let mut row = self.extra.clone();
        row.insert("stop_id".to_string(), self.stop_id.to_string());
        put(&mut row, "stop_code", &self.code);
        put(&mut row, "stop_name", &self.name);
        put(&mut row, "stop_desc", &self.description);
        put(&mut row, "stop_lat", &self.lat);
        put(&mut row, "stop_lon", &self.lon);
        put(&mut row, "zone_id", &self.zone_id);
        put(&mut row, "stop_url", &self.url);
        put(&mut row, "location_type", &self.location_type);
        put(&mut row, "parent_station", &self.parent_station);
        put(&mut row, "stop_timezone", &self.timezone);
        put(&mut row, "wheelchair_boarding", &self.wheelchair_boarding);
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(lat: &str, lon: &str) -> Stop {
        let mut stop = Stop::new(StopID::new("S"));
        stop.lat = Some(lat.to_string());
        stop.lon = Some(lon.to_string());
        stop
    }

    #[test]
    fn valid_positions() {
        assert_eq!(
            stop("52.52", "13.40").position(),
            Some(LatLon {
                lat: 52.52,
                lon: 13.40
            })
        );
        // Only one axis at zero is fine
        assert!(stop("0", "13.4").position().is_some());
        assert!(stop("-90", "180").position().is_some());
    }

    #[test]
    fn rejected_positions() {
        assert_eq!(stop("0", "0").position(), None);
        assert_eq!(stop("0.0", "-0.0").position(), None);
        assert_eq!(stop("91", "10").position(), None);
        assert_eq!(stop("10", "-180.5").position(), None);
        assert_eq!(stop("north", "10").position(), None);
        assert_eq!(stop("NaN", "10").position(), None);
        assert_eq!(Stop::new(StopID::new("S")).position(), None);
    }
}
