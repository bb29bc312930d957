use crate::config::KalmanParams;

/// Single-state, constant-position Kalman filter.
/// The first measurement initializes the estimate and is returned unchanged.
#[derive(Debug, Clone, Copy)]
pub struct ScalarKalman {
    params: KalmanParams,
    estimate: Option<f32>,
    error: f32,
}

impl ScalarKalman {
    pub fn new(params: KalmanParams) -> Self {
        Self {
            params,
            estimate: None,
            error: params.initial_error,
        }
    }

    pub fn params(&self) -> KalmanParams {
        self.params
    }

    /// Keeps the current estimate, its error restarts from the new initial error
    pub fn set_params(&mut self, params: KalmanParams) {
        self.params = params;
        self.error = params.initial_error;
    }

    pub fn reset(&mut self) {
        self.estimate = None;
        self.error = self.params.initial_error;
    }

    pub fn estimate(&self) -> Option<f32> {
        self.estimate
    }

    pub fn update(&mut self, measurement: f32) -> f32 {
        let Some(estimate) = self.estimate else {
            self.estimate = Some(measurement);
            self.error = self.params.initial_error;
            return measurement;
        };

        // predict
        let predicted_error = self.error + self.params.process_noise;
        // correct
        let gain = predicted_error / (predicted_error + self.params.measurement_noise);
        let estimate = estimate + gain * (measurement - estimate);
        self.error = (1.0 - gain) * predicted_error;
        self.estimate = Some(estimate);

        estimate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_update_passes_through() {
        let mut kalman = ScalarKalman::new(KalmanParams::default());
        assert_eq!(kalman.update(1234.5), 1234.5);
        assert_eq!(kalman.estimate(), Some(1234.5));
    }

    #[test]
    fn test_gain_from_noise() {
        let params = KalmanParams::new(20.0, 10.0, 0.0).unwrap();
        let mut kalman = ScalarKalman::new(params);
        kalman.update(1000.0);
        // p = 0 + 20, k = 20 / 30
        let out = kalman.update(1300.0);
        assert!((out - 1200.0).abs() < 1e-3, "{out}");
    }

    #[test]
    fn test_converges_on_constant_input() {
        let mut kalman = ScalarKalman::new(KalmanParams::default());
        kalman.update(500.0);
        let mut out = 0.0;
        for _ in 0..30 {
            out = kalman.update(800.0);
        }
        assert!((out - 800.0).abs() < 0.01, "{out}");
    }

    #[test]
    fn test_reset_forgets_estimate() {
        let mut kalman = ScalarKalman::new(KalmanParams::default());
        kalman.update(500.0);
        kalman.update(510.0);
        kalman.reset();
        assert_eq!(kalman.estimate(), None);
        assert_eq!(kalman.update(42.0), 42.0);
    }

    #[test]
    fn test_new_params_restart_error() {
        let mut kalman = ScalarKalman::new(KalmanParams::new(20.0, 10.0, 0.0).unwrap());
        kalman.update(1000.0);
        kalman.update(1300.0);

        kalman.set_params(KalmanParams::new(0.0, 10.0, 10.0).unwrap());
        let kept = kalman.estimate().unwrap();
        assert!((kept - 1200.0).abs() < 1e-3, "{kept}");
        // p = 10, k = 0.5
        let out = kalman.update(1400.0);
        assert!((out - 1300.0).abs() < 1e-3, "{out}");
    }
}
