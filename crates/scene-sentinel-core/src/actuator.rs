//! Actuator (C5): translates a declared `Action` into the hub-level drive
//! command actually issued when driving a light individually at L3.

use crate::model::Action;

/// Fully resolved drive command, native units, ready to hand to a
/// `HubClient::drive_light` implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveCommand {
    pub on: bool,
    /// Native 0-255 scale, lower-bounded at 1 whenever `on` is true.
    pub brightness: Option<u8>,
    pub xy: Option<(f64, f64)>,
    pub mirek: Option<f64>,
}

/// Apply §4.4's driving translation rules. Unlike the comparator, driving
/// coerces an expected 0% brightness up to the minimum non-zero level.
pub fn translate(action: &Action) -> DriveCommand {
    if !action.on {
        return DriveCommand {
            on: false,
            brightness: None,
            xy: None,
            mirek: None,
        };
    }

    let brightness = action.brightness.map(|percent| {
        let coerced = if percent <= 0.0 { 1.0 } else { percent };
        let native = (coerced / 100.0 * 255.0).round() as i64;
        native.clamp(1, 255) as u8
    });

    DriveCommand {
        on: true,
        brightness,
        xy: action.xy.map(|xy| (xy.x, xy.y)),
        mirek: action.mirek,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Xy;

    #[test]
    fn off_ignores_other_fields() {
        let action = Action {
            target_rid: "r1".into(),
            on: false,
            brightness: Some(80.0),
            xy: Some(Xy { x: 0.5, y: 0.4 }),
            mirek: Some(300.0),
        };
        let command = translate(&action);
        assert_eq!(
            command,
            DriveCommand {
                on: false,
                brightness: None,
                xy: None,
                mirek: None,
            }
        );
    }

    #[test]
    fn zero_brightness_coerced_to_minimum() {
        let action = Action {
            target_rid: "r1".into(),
            on: true,
            brightness: Some(0.0),
            xy: None,
            mirek: None,
        };
        let command = translate(&action);
        assert_eq!(command.brightness, Some(1));
    }

    #[test]
    fn brightness_converted_to_native_scale() {
        let action = Action {
            target_rid: "r1".into(),
            on: true,
            brightness: Some(80.0),
            xy: None,
            mirek: None,
        };
        let command = translate(&action);
        assert_eq!(command.brightness, Some(204));
    }

    #[test]
    fn xy_and_mirek_pass_through_unchanged() {
        let action = Action {
            target_rid: "r1".into(),
            on: true,
            brightness: None,
            xy: Some(Xy { x: 0.31, y: 0.32 }),
            mirek: Some(366.0),
        };
        let command = translate(&action);
        assert_eq!(command.xy, Some((0.31, 0.32)));
        assert_eq!(command.mirek, Some(366.0));
    }
}
