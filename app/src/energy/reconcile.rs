use crate::core::time::DateTime;
use crate::statistics::{PersistedStatPoint, StatField};

use super::EnergyMeasurement;

#[derive(Debug, Clone, PartialEq)]
pub struct Drift {
    pub start: DateTime,
    pub field: StatField,
    pub persisted: f64,
    pub computed: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub baseline: f64,
    pub points: Vec<PersistedStatPoint>,
    pub drifts: Vec<Drift>,
}

/// Turns one room's interval measurements into a cumulative series that continues the persisted
/// history.
///
/// The running sum starts from the most recent persisted `sum` strictly before the first new
/// measurement (zero without one). Points sharing a start with a persisted point are compared
/// field by field; differences are taken at whole-Wh resolution and reported when they exceed
/// `tolerance_wh`. New values are returned regardless.
pub fn reconcile(measurements: &[EnergyMeasurement], persisted: &[PersistedStatPoint], tolerance_wh: f64) -> Reconciled {
    let mut ordered: Vec<&EnergyMeasurement> = measurements.iter().collect();
    ordered.sort_by_key(|m| m.timestamp);

    let Some(first) = ordered.first().map(|m| m.timestamp) else {
        return Reconciled {
            baseline: 0.0,
            points: vec![],
            drifts: vec![],
        };
    };

    let baseline = persisted
        .iter()
        .filter(|p| p.start < first)
        .filter_map(|p| p.sum.map(|sum| (p.start, sum)))
        .max_by_key(|(start, _)| *start)
        .map_or(0.0, |(_, sum)| sum);

    let mut running = baseline;
    let mut points = Vec::with_capacity(ordered.len());
    let mut drifts = vec![];

    for measurement in ordered {
        running += measurement.energy_wh;

        let point = PersistedStatPoint {
            start: measurement.timestamp,
            mean: Some(measurement.energy_wh),
            sum: Some(running),
        };

        if let Some(existing) = persisted.iter().find(|p| p.start == point.start) {
            drifts.extend(compare(existing.mean, measurement.energy_wh, StatField::Mean, &point, tolerance_wh));
            drifts.extend(compare(existing.sum, running, StatField::Sum, &point, tolerance_wh));
        }

        points.push(point);
    }

    Reconciled {
        baseline,
        points,
        drifts,
    }
}

fn compare(
    persisted: Option<f64>,
    computed: f64,
    field: StatField,
    point: &PersistedStatPoint,
    tolerance_wh: f64,
) -> Option<Drift> {
    let persisted = persisted?;

    ((persisted - computed).abs().floor() > tolerance_wh).then_some(Drift {
        start: point.start,
        field,
        persisted,
        computed,
    })
}
