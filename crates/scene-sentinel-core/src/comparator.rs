//! Comparator (C4): a pure function comparing a declared `Action` against
//! observed `LightEntity` state within configured tolerances.

use scene_sentinel_config::ToleranceConfig;

use crate::model::{Action, FailureClass, FailureSet, LightEntity};

#[derive(Debug, Clone, PartialEq)]
pub struct CompareResult {
    pub matched: bool,
    pub failures: FailureSet,
}

impl CompareResult {
    fn matched() -> Self {
        Self {
            matched: true,
            failures: FailureSet::new(),
        }
    }

    fn miss(failures: FailureSet) -> Self {
        Self {
            matched: false,
            failures,
        }
    }
}

/// Apply §4.3's ordered rules. Each rule either returns early or falls
/// through to the next; a light with multiple simultaneous discrepancies
/// (e.g. both brightness and color_temp off) accumulates every applicable
/// failure class rather than stopping at the first miss.
pub fn compare(expected: &Action, observed: &LightEntity, tolerances: &ToleranceConfig) -> CompareResult {
    if expected.on != observed.on {
        let mut failures = FailureSet::new();
        failures.insert(FailureClass::OnOff);
        return CompareResult::miss(failures);
    }

    if !expected.on {
        return CompareResult::matched();
    }

    let mut failures = FailureSet::new();

    if let Some(expected_brightness) = expected.brightness {
        // Compared literally: an expected 0% is validated as 0%, never
        // coerced to the 1% drive-time floor (SPEC_FULL.md §4.3, §9).
        let observed_percent = observed.brightness_percent().unwrap_or(0.0);
        if (expected_brightness - observed_percent).abs() > tolerances.brightness_tolerance {
            failures.insert(FailureClass::Brightness);
        }
    }

    if let Some(expected_xy) = expected.xy {
        if observed.in_xy_mode() {
            let observed_xy = observed.xy.expect("in_xy_mode implies xy is Some");
            let dx = (expected_xy.x - observed_xy.x).abs();
            let dy = (expected_xy.y - observed_xy.y).abs();
            if dx > tolerances.color_tolerance || dy > tolerances.color_tolerance {
                failures.insert(FailureClass::Color);
            }
        }
        // Light in CT mode while xy was expected: not penalized (§4.3 rule 4).
    }

    if let Some(expected_mirek) = expected.mirek {
        if observed.in_color_temp_mode() {
            let observed_mirek = observed.mirek.expect("in_color_temp_mode implies mirek is Some");
            if (expected_mirek - observed_mirek).abs() > tolerances.color_temp_tolerance {
                failures.insert(FailureClass::ColorTemp);
            }
        }
    }

    if failures.is_empty() {
        CompareResult::matched()
    } else {
        CompareResult::miss(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Xy;

    fn tolerances() -> ToleranceConfig {
        ToleranceConfig {
            brightness_tolerance: 5.0,
            color_tolerance: 0.01,
            color_temp_tolerance: 50.0,
        }
    }

    fn action(on: bool) -> Action {
        Action {
            target_rid: "r1".into(),
            on,
            brightness: None,
            xy: None,
            mirek: None,
        }
    }

    fn light(on: bool) -> LightEntity {
        LightEntity {
            on,
            brightness: None,
            xy: None,
            mirek: None,
        }
    }

    #[test]
    fn off_lights_match_regardless_of_other_fields() {
        let expected = Action {
            brightness: Some(50.0),
            ..action(false)
        };
        let observed = LightEntity {
            brightness: Some(10),
            ..light(false)
        };
        let result = compare(&expected, &observed, &tolerances());
        assert!(result.matched);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn on_off_mismatch_short_circuits() {
        let expected = Action {
            brightness: Some(50.0),
            ..action(true)
        };
        let observed = light(false);
        let result = compare(&expected, &observed, &tolerances());
        assert!(!result.matched);
        assert_eq!(result.failures, [FailureClass::OnOff].into_iter().collect());
    }

    #[test]
    fn brightness_within_tolerance_matches() {
        let expected = Action {
            brightness: Some(80.0),
            ..action(true)
        };
        let observed = LightEntity {
            brightness: Some(204), // 80%
            ..light(true)
        };
        let result = compare(&expected, &observed, &tolerances());
        assert!(result.matched);
    }

    #[test]
    fn brightness_zero_validates_literally_not_coerced() {
        let expected = Action {
            brightness: Some(0.0),
            ..action(true)
        };
        let observed = LightEntity {
            brightness: Some(0),
            ..light(true)
        };
        let result = compare(&expected, &observed, &tolerances());
        assert!(result.matched);
    }

    #[test]
    fn brightness_outside_tolerance_fails() {
        let expected = Action {
            brightness: Some(80.0),
            ..action(true)
        };
        let observed = LightEntity {
            brightness: Some(178), // ~69.8%
            ..light(true)
        };
        let result = compare(&expected, &observed, &tolerances());
        assert!(!result.matched);
        assert!(result.failures.contains(&FailureClass::Brightness));
    }

    #[test]
    fn color_temp_mismatch_when_in_ct_mode() {
        let expected = Action {
            mirek: Some(366.0),
            ..action(true)
        };
        let observed = LightEntity {
            mirek: Some(420.0),
            ..light(true)
        };
        let result = compare(&expected, &observed, &tolerances());
        assert!(!result.matched);
        assert_eq!(
            result.failures,
            [FailureClass::ColorTemp].into_iter().collect()
        );
    }

    #[test]
    fn xy_expected_but_light_in_ct_mode_is_not_penalized() {
        let expected = Action {
            xy: Some(Xy { x: 0.5, y: 0.4 }),
            ..action(true)
        };
        let observed = LightEntity {
            mirek: Some(300.0),
            ..light(true)
        };
        let result = compare(&expected, &observed, &tolerances());
        assert!(result.matched);
    }

    #[test]
    fn multiple_failures_accumulate() {
        let expected = Action {
            brightness: Some(80.0),
            mirek: Some(366.0),
            ..action(true)
        };
        let observed = LightEntity {
            brightness: Some(100), // ~39%
            mirek: Some(420.0),
            ..light(true)
        };
        let result = compare(&expected, &observed, &tolerances());
        assert!(!result.matched);
        assert_eq!(result.failures.len(), 2);
        assert!(result.failures.contains(&FailureClass::Brightness));
        assert!(result.failures.contains(&FailureClass::ColorTemp));
    }
}
