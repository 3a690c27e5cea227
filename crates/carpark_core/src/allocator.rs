use std::collections::BTreeMap;

use crate::models::{ChargingPoint, CurrentTiers};

pub(crate) type Points = BTreeMap<String, ChargingPoint>;

/// Return the current drawn by all plugged points.
pub(crate) fn allocated_current(points: &Points) -> u64 {
    points
        .values()
        .filter(|point| point.is_plugged())
        .map(|point| u64::from(point.current()))
        .sum()
}

/// Names of the plugged points matching `filter`, the longest charging first.
///
/// Points plugged in the same millisecond are ordered by name.
fn plugged_by_age(points: &Points, filter: impl Fn(&ChargingPoint) -> bool) -> Vec<String> {
    let mut candidates: Vec<&ChargingPoint> = points
        .values()
        .filter(|point| point.is_plugged() && filter(point))
        .collect();
    candidates.sort_by(|a, b| {
        a.plug_in_timestamp()
            .cmp(&b.plug_in_timestamp())
            .then_with(|| a.name().cmp(b.name()))
    });
    candidates
        .into_iter()
        .map(|point| point.name().to_string())
        .collect()
}

/// Put the points charging the longest to the low current until another
/// high current grant fits under the ceiling.
pub(crate) fn throttle(points: &mut Points, tiers: &CurrentTiers) {
    let max = u64::from(tiers.max);
    let high = u64::from(tiers.high);

    for name in plugged_by_age(points, |point| point.current() > tiers.low) {
        if allocated_current(points) + high <= max {
            break;
        }
        if let Some(point) = points.get_mut(&name) {
            tracing::debug!("Throttling {} to {}A", name, tiers.low);
            point.set_current(tiers.low);
        }
    }
}

/// Give the high current back to slow charging points, in plug-in order,
/// as long as the ceiling allows it.
pub(crate) fn boost(points: &mut Points, tiers: &CurrentTiers) {
    let max = u64::from(tiers.max);
    let step = u64::from(tiers.high - tiers.low);

    for name in plugged_by_age(points, |point| point.current() < tiers.high) {
        if allocated_current(points) + step > max {
            break;
        }
        if let Some(point) = points.get_mut(&name) {
            tracing::info!("Boosting {} to {}A", name, tiers.high);
            point.set_current(tiers.high);
        }
    }
}
