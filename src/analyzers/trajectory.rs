use crate::analyzers::flow::HOURS;

/// Expected number of bikes at the end of every hour of the day.
pub type Trajectory = [f64; HOURS];

/// Integrates hourly net flow from a starting level.
///
/// `trajectory[0] = start + net[0]` and `trajectory[h] = trajectory[h - 1] + net[h]`.
pub fn reconstruct(start: f64, net: &[f64; HOURS]) -> Trajectory {
    let mut trajectory = [0.0; HOURS];
    let mut level = start;
    for (h, change) in net.iter().enumerate() {
        level += change;
        trajectory[h] = level;
    }
    trajectory
}
