use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use gtfs::{JoinIndex, Route, RouteID, StopID};

use crate::ActiveDataset;

/// Route attributes to overwrite. Anything left out is kept as it is.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RouteEdit {
    pub route_short_name: Option<String>,
    pub route_long_name: Option<String>,
    pub route_color: Option<String>,
    pub route_desc: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StopSequence {
    pub stop_id: StopID,
    #[serde(deserialize_with = "number_or_string")]
    pub stop_sequence: String,
}

/// An attribute edit plus an optional new stop order, as one request.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RouteUpdate {
    #[serde(flatten)]
    pub edit: RouteEdit,
    #[serde(default)]
    pub stops: Vec<StopSequence>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteUpdateResult {
    pub route: Route,
    pub stop_times_changed: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum EditError {
    #[error("route {0} not found")]
    RouteNotFound(RouteID),
    #[error("couldn't save the edit: {0}")]
    Store(anyhow::Error),
}

impl RouteEdit {
    pub fn is_empty(&self) -> bool {
        self == &RouteEdit::default()
    }

    fn apply(&self, route: &mut Route) {
        if let Some(ref x) = self.route_short_name {
            route.short_name = Some(x.clone());
        }
        if let Some(ref x) = self.route_long_name {
            route.long_name = Some(x.clone());
        }
        if let Some(ref x) = self.route_color {
            route.color = Some(x.clone());
        }
        if let Some(ref x) = self.route_desc {
            route.description = Some(x.clone());
        }
    }
}

/// Overwrites the supplied attributes of the first route with this ID, then saves the whole
/// routes table. Returns the route as saved.
pub fn edit_route(
    dataset: &ActiveDataset,
    route_id: &RouteID,
    edit: &RouteEdit,
) -> Result<Route, EditError> {
    let writer = dataset.lock_routes();
    let snapshot = writer.snapshot();
    let mut routes = (*snapshot.gtfs.routes).clone();
    let route = routes
        .rows
        .iter_mut()
        .find(|r| &r.route_id == route_id)
        .ok_or_else(|| EditError::RouteNotFound(route_id.clone()))?;
    edit.apply(route);
    let updated = route.clone();

    writer.replace_routes(routes).map_err(EditError::Store)?;
    info!("Edited route {route_id}: {edit:?}");
    Ok(updated)
}

/// Renumbers stops of the route's first trip, in trips.txt order. Other trips are untouched.
/// Returns how many stop times changed; nothing is saved if that's 0.
pub fn edit_stop_sequence(
    dataset: &ActiveDataset,
    route_id: &RouteID,
    stops: &[StopSequence],
) -> Result<usize, EditError> {
    let writer = dataset.lock_stop_times();
    let snapshot = writer.snapshot();
    let index = JoinIndex::new(&snapshot.gtfs);
    if index.route(route_id).is_none() {
        return Err(EditError::RouteNotFound(route_id.clone()));
    }
    let trip = match index.trips_of_route(route_id).first() {
        Some(trip) => (*trip).clone(),
        None => {
            warn!("Route {route_id} has no trips, so there's no stop order to change");
            return Ok(0);
        }
    };

    // Later entries for the same stop win
    let new_sequence: BTreeMap<&StopID, &str> = stops
        .iter()
        .map(|s| (&s.stop_id, s.stop_sequence.as_str()))
        .collect();
    let mut stop_times = (*snapshot.gtfs.stop_times).clone();
    let mut changed = 0;
    for st in &mut stop_times.rows {
        if st.trip_id != trip {
            continue;
        }
        if let Some(seq) = new_sequence.get(&st.stop_id) {
            st.stop_sequence = Some(seq.to_string());
            changed += 1;
        }
    }
    if changed == 0 {
        return Ok(0);
    }

    writer
        .replace_stop_times(stop_times)
        .map_err(EditError::Store)?;
    info!("Changed {changed} stop sequences of trip {trip} on route {route_id}");
    Ok(changed)
}

/// The attribute edit, then the stop order edit if one is given.
pub fn update_route(
    dataset: &ActiveDataset,
    route_id: &RouteID,
    update: &RouteUpdate,
) -> Result<RouteUpdateResult, EditError> {
    let route = edit_route(dataset, route_id, &update.edit)?;
    let stop_times_changed = if update.stops.is_empty() {
        0
    } else {
        edit_stop_sequence(dataset, route_id, &update.stops)?
    };
    Ok(RouteUpdateResult {
        route,
        stop_times_changed,
    })
}

// Feeds and clients disagree about whether a sequence is a number or a string.
fn number_or_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Value {
        Int(i64),
        Text(String),
    }
    Ok(match Value::deserialize(d)? {
        Value::Int(x) => x.to_string(),
        Value::Text(x) => x,
    })
}
