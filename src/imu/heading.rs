use micromath::F32Ext as _;
use nalgebra::Vector3;

/// Degrees in a full turn
pub const FULL_TURN: f32 = 360.0;

/// Pitch and roll in degrees from the gravity vector
/// https://www.nxp.com/docs/en/application-note/AN3461.pdf
pub fn tilt_from_accel(accel: &Vector3<f32>) -> (f32, f32) {
    let pitch = (-accel.x).atan2((accel.y * accel.y + accel.z * accel.z).sqrt());
    let roll = accel.y.atan2(accel.z);

    (pitch.to_degrees(), roll.to_degrees())
}

/// Compass heading in [0, 360) of a calibrated magnetometer reading,
/// projected onto the horizontal plane using pitch and roll (degrees)
pub fn tilt_compensated_heading(mag: &Vector3<f32>, pitch: f32, roll: f32) -> f32 {
    let (pitch, roll) = (pitch.to_radians(), roll.to_radians());
    let (sin_p, cos_p) = (pitch.sin(), pitch.cos());
    let (sin_r, cos_r) = (roll.sin(), roll.cos());

    let mx = mag.x * cos_p + mag.z * sin_p;
    let my = mag.x * sin_r * sin_p + mag.y * cos_r - mag.z * sin_r * cos_p;

    normalize_degrees(my.atan2(mx).to_degrees())
}

/// Wraps any angle into [0, 360)
pub fn normalize_degrees(deg: f32) -> f32 {
    let wrapped = deg % FULL_TURN;
    let wrapped = if wrapped < 0.0 {
        wrapped + FULL_TURN
    } else {
        wrapped
    };

    // -1e-6 + 360 rounds to 360 in f32
    if wrapped >= FULL_TURN {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest rotation from `from` to `to`, in (-180, 180]
pub fn angle_difference(to: f32, from: f32) -> f32 {
    let diff = normalize_degrees(to - from);
    if diff > FULL_TURN / 2.0 {
        diff - FULL_TURN
    } else {
        diff
    }
}

/// Linear map of `value` from [in_min, in_max] onto [out_min, out_max], clamped to the output range.
/// The output bounds may come in either order.
pub fn map_clamped(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let mapped = if in_max == in_min {
        out_min
    } else {
        out_min + (value - in_min) * (out_max - out_min) / (in_max - in_min)
    };

    mapped.clamp(out_min.min(out_max), out_min.max(out_max))
}
