use crate::parser::Station;

/// Mean earth radius in meters.
const EARTH_RADIUS: f64 = 6_371_000.0;

/// Great-circle distance in meters between two points given in degrees.
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS * c
}

pub fn station_distance(a: &Station, b: &Station) -> f64 {
    haversine(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Neighbour lists by station index: every other station closer than `max_distance`.
///
/// Stations at distance zero (the station itself, or a duplicate position)
/// are never neighbours.
pub fn adjacency(stations: &[Station], max_distance: f64) -> Vec<Vec<usize>> {
    stations
        .iter()
        .map(|from| {
            stations
                .iter()
                .enumerate()
                .filter(|(_, to)| {
                    let d = station_distance(from, to);
                    d > 0.0 && d < max_distance
                })
                .map(|(j, _)| j)
                .collect()
        })
        .collect()
}
