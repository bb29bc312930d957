use nalgebra::Vector3;

/// Hard-iron correction: `corrected = (raw - offset) / scale` per axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagnetometerCalibration {
    pub offset: Vector3<f32>,
    pub scale: Vector3<f32>,
}

impl Default for MagnetometerCalibration {
    /// Uncalibrated: no offset, unit scale
    fn default() -> Self {
        Self {
            offset: Vector3::new(0.0, 0.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl MagnetometerCalibration {
    /// Offset is the envelope center, scale its half-span. None for an empty or flat envelope.
    pub fn from_envelope(envelope: &MagEnvelope) -> Option<Self> {
        if envelope.samples == 0 {
            return None;
        }

        let calibration = Self {
            offset: (envelope.max + envelope.min) / 2.0,
            scale: (envelope.max - envelope.min) / 2.0,
        };

        calibration.is_valid().then_some(calibration)
    }

    /// Every scale axis strictly positive, everything finite
    pub fn is_valid(&self) -> bool {
        self.offset.iter().all(|v| v.is_finite())
            && self.scale.iter().all(|v| v.is_finite() && *v > 0.0)
    }

    pub fn apply(&self, raw: &Vector3<f32>) -> Vector3<f32> {
        (raw - self.offset).component_div(&self.scale)
    }
}

/// Per-axis min/max of raw magnetometer readings seen during a calibration window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagEnvelope {
    min: Vector3<f32>,
    max: Vector3<f32>,
    samples: u32,
}

impl Default for MagEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

impl MagEnvelope {
    pub const fn new() -> Self {
        Self {
            min: Vector3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Vector3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
            samples: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn include(&mut self, raw: &Vector3<f32>) {
        self.min = self.min.inf(raw);
        self.max = self.max.sup(raw);
        self.samples = self.samples.saturating_add(1);
    }

    pub fn min(&self) -> Vector3<f32> {
        self.min
    }

    pub fn max(&self) -> Vector3<f32> {
        self.max
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }
}

/// Non-volatile home of the magnetometer calibration.
/// `load` returning None means the device was never calibrated.
pub trait CalibrationStore {
    fn load(&mut self) -> Option<MagnetometerCalibration>;

    fn save(&mut self, calibration: &MagnetometerCalibration);
}

/// RAM-only store, forgets everything on reset
impl CalibrationStore for Option<MagnetometerCalibration> {
    fn load(&mut self) -> Option<MagnetometerCalibration> {
        *self
    }

    fn save(&mut self, calibration: &MagnetometerCalibration) {
        *self = Some(*calibration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_center_and_half_span() {
        let mut envelope = MagEnvelope::new();
        envelope.include(&Vector3::new(-20.0, 10.0, -5.0));
        envelope.include(&Vector3::new(40.0, -30.0, 15.0));
        envelope.include(&Vector3::new(0.0, 0.0, 0.0));

        assert_eq!(envelope.samples(), 3);
        let calibration = MagnetometerCalibration::from_envelope(&envelope).unwrap();
        assert_eq!(calibration.offset, Vector3::new(10.0, -10.0, 5.0));
        assert_eq!(calibration.scale, Vector3::new(30.0, 20.0, 10.0));

        let corrected = calibration.apply(&Vector3::new(40.0, 10.0, 5.0));
        assert_eq!(corrected, Vector3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_flat_or_empty_envelope_is_rejected() {
        assert_eq!(MagnetometerCalibration::from_envelope(&MagEnvelope::new()), None);

        let mut envelope = MagEnvelope::new();
        envelope.include(&Vector3::new(1.0, 2.0, 3.0));
        envelope.include(&Vector3::new(4.0, 2.0, 6.0));
        assert_eq!(MagnetometerCalibration::from_envelope(&envelope), None);
    }

    #[test]
    fn test_default_is_identity() {
        let calibration = MagnetometerCalibration::default();
        assert!(calibration.is_valid());
        let raw = Vector3::new(0.3, -0.2, 0.5);
        assert_eq!(calibration.apply(&raw), raw);
    }

    #[test]
    fn test_ram_store() {
        let mut store: Option<MagnetometerCalibration> = None;
        assert_eq!(store.load(), None);
        let calibration = MagnetometerCalibration {
            offset: Vector3::new(1.0, 2.0, 3.0),
            scale: Vector3::new(2.0, 2.0, 2.0),
        };
        store.save(&calibration);
        assert_eq!(store.load(), Some(calibration));
    }
}
