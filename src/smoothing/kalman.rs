//! Scalar Kalman filter with identity transition and observation.

/// One axis of pointer filtering.
///
/// The first measurement after construction or an unseeded [`reset`](Self::reset)
/// is returned unchanged and becomes the estimate, so the pointer never
/// drifts in from the origin.
#[derive(Debug, Clone)]
pub struct SignalFilter {
    process_noise: f64,
    measurement_noise: f64,
    initial_error_covariance: f64,
    estimate: f64,
    error_covariance: f64,
    initialized: bool,
}

impl SignalFilter {
    pub fn new(process_noise: f64, measurement_noise: f64, initial_error_covariance: f64) -> Self {
        let initial_error_covariance = if initial_error_covariance > 0.0 {
            initial_error_covariance
        } else {
            1.0
        };
        Self {
            process_noise: process_noise.max(0.0),
            measurement_noise: measurement_noise.max(f64::EPSILON),
            initial_error_covariance,
            estimate: 0.0,
            error_covariance: initial_error_covariance,
            initialized: false,
        }
    }

    pub fn filter(&mut self, measurement: f64) -> f64 {
        if !self.initialized {
            self.reset(Some(measurement));
            return measurement;
        }

        // Predict: estimate is unchanged under the identity transition.
        let predicted_covariance = self.error_covariance + self.process_noise;

        // Correct.
        let gain = predicted_covariance / (predicted_covariance + self.measurement_noise);
        self.estimate += gain * (measurement - self.estimate);
        self.error_covariance = predicted_covariance * (1.0 - gain);

        self.estimate
    }

    /// Drop all history. `Some(seed)` leaves the filter initialized at `seed`.
    pub fn reset(&mut self, seed: Option<f64>) {
        self.error_covariance = self.initial_error_covariance;
        match seed {
            Some(value) => {
                self.estimate = value;
                self.initialized = true;
            }
            None => {
                self.estimate = 0.0;
                self.initialized = false;
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn estimate(&self) -> f64 {
        self.estimate
    }

    pub fn error_covariance(&self) -> f64 {
        self.error_covariance
    }
}
