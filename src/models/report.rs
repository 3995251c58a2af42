use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coefficients of a fitted anatomical plane (ax + by + c form).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneCoefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

/// Computed-plane report produced by the landmark model for one study.
///
/// Carries the Porion-Orbitale plane, the LMCo/LLCo/LNC plane, and the named
/// angle/distance measurements derived from the predicted landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaneReport {
    pub po_or: PlaneCoefficients,
    pub lm_co_ll_co_lnc: PlaneCoefficients,
    #[serde(default)]
    pub angles: BTreeMap<String, f64>,
    #[serde(default)]
    pub distances: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_deserializes_from_model_output() {
        let raw = r#"{
            "po_or": {"a": 0.12, "b": -0.98, "c": 4.5},
            "lm_co_ll_co_lnc": {"a": 1.0, "b": 0.0, "c": -2.25},
            "angles": {"gonial": 121.4},
            "distances": {"ramus_height": 53.2}
        }"#;

        let report: PlaneReport = serde_json::from_str(raw).expect("report should parse");
        assert_eq!(report.po_or.b, -0.98);
        assert_eq!(report.angles["gonial"], 121.4);
        assert_eq!(report.distances["ramus_height"], 53.2);
    }

    #[test]
    fn measurement_maps_are_optional() {
        let raw = r#"{
            "po_or": {"a": 0.0, "b": 1.0, "c": 0.0},
            "lm_co_ll_co_lnc": {"a": 1.0, "b": 0.0, "c": 0.0}
        }"#;

        let report: PlaneReport = serde_json::from_str(raw).expect("report should parse");
        assert!(report.angles.is_empty());
        assert!(report.distances.is_empty());
    }
}
