use std::collections::BTreeMap;

use serde::Serialize;

use crate::table::{put, take, take_id, Record, Row};
use crate::RouteID;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Route {
    pub route_id: RouteID,
    pub agency_id: Option<String>,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
    pub description: Option<String>,
    /// Kept as text; feeds use both the basic and extended type codes
    pub route_type: Option<String>,
    pub url: Option<String>,
    pub color: Option<String>,
    pub text_color: Option<String>,

    pub extra: BTreeMap<String, String>,
}

impl Route {
    pub fn new(route_id: RouteID) -> Self {
        Self {
            route_id,
            agency_id: None,
            short_name: None,
            long_name: None,
            description: None,
            route_type: None,
            url: None,
            color: None,
            text_color: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn describe(&self) -> String {
        for x in [&self.short_name, &self.long_name, &self.description] {
            if let Some(x) = x {
                return x.to_string();
            }
        }
        self.route_id.to_string()
    }
}

impl Record for Route {
    const COLUMNS: &'static [&'static str] = &[
        "route_id",
        "agency_id",
        "route_short_name",
        "route_long_name",
        "route_desc",
        "route_type",
        "route_url",
        "route_color",
        "route_text_color",
    ];

    fn from_row(mut row: Row) -> Self {
        Self {
            route_id: RouteID::new(take_id(&mut row, "route_id")),
            agency_id: take(&mut row, "agency_id"),
            short_name: take(&mut row, "route_short_name"),
            long_name: take(&mut row, "route_long_name"),
            description: take(&mut row, "route_desc"),
            route_type: take(&mut row, "route_type"),
            url: take(&mut row, "route_url"),
            color: take(&mut row, "route_color"),
            text_color: take(&mut row, "route_text_color"),
            extra: row,
        }
    }

    fn to_row(&self) -> Row {
        let mut row = self.extra.clone();
        row.insert("route_id".to_string(), self.route_id.to_string());
        put(&mut row, "agency_id", &self.agency_id);
        put(&mut row, "route_short_name", &self.short_name);
        put(&mut row, "route_long_name", &self.long_name);
        put(&mut row, "route_desc", &self.description);
        put(&mut row, "route_type", &self.route_type);
        put(&mut row, "route_url", &self.url);
        put(&mut row, "route_color", &self.color);
        put(&mut row, "route_text_color", &self.text_color);
        row
    }
}
