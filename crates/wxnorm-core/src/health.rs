//! Indoor comfort indices
//!
//! Each input is scored 0..=100 (100 = comfortable). The composite
//! `health_idx` is the worst available sub-index.

/// Sub-indices computed from whatever inputs were present
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthIndex {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub co2: Option<f64>,
    pub noise: Option<f64>,
}

impl HealthIndex {
    pub fn compute(
        temperature: Option<f64>,
        humidity: Option<f64>,
        co2: Option<f64>,
        noise: Option<f64>,
    ) -> Self {
        Self {
            temperature: temperature.map(temperature_score),
            humidity: humidity.map(humidity_score),
            co2: co2.map(co2_score),
            noise: noise.map(noise_score),
        }
    }

    pub fn composite(&self) -> Option<f64> {
        [self.temperature, self.humidity, self.co2, self.noise]
            .into_iter()
            .flatten()
            .reduce(f64::min)
    }
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 100.0).round()
}

// 19..=24 °C is ideal, 10 points lost per degree outside
fn temperature_score(t: f64) -> f64 {
    let distance = if t < 19.0 {
        19.0 - t
    } else if t > 24.0 {
        t - 24.0
    } else {
        0.0
    };
    clamp_score(100.0 - distance * 10.0)
}

// 40..=60 % is ideal, 2.5 points lost per percent outside
fn humidity_score(h: f64) -> f64 {
    let distance = if h < 40.0 {
        40.0 - h
    } else if h > 60.0 {
        h - 60.0
    } else {
        0.0
    };
    clamp_score(100.0 - distance * 2.5)
}

// full marks up to 600 ppm, zero from 2000 ppm
fn co2_score(ppm: f64) -> f64 {
    clamp_score(100.0 - (ppm - 600.0).max(0.0) * 100.0 / 1400.0)
}

// full marks up to 40 dB, zero from 90 dB
fn noise_score(db: f64) -> f64 {
    clamp_score(100.0 - (db - 40.0).max(0.0) * 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comfortable_room() {
        let idx = HealthIndex::compute(Some(21.0), Some(50.0), Some(450.0), Some(35.0));
        assert_eq!(idx.composite(), Some(100.0));
    }

    #[test]
    fn test_worst_sub_index_wins() {
        let idx = HealthIndex::compute(Some(21.0), Some(50.0), Some(1300.0), None);
        assert_eq!(idx.co2, Some(50.0));
        assert_eq!(idx.noise, None);
        assert_eq!(idx.composite(), Some(50.0));
    }

    #[test]
    fn test_scores_are_clamped() {
        let idx = HealthIndex::compute(Some(-30.0), Some(0.0), Some(5000.0), Some(120.0));
        assert_eq!(idx.temperature, Some(0.0));
        assert_eq!(idx.humidity, Some(0.0));
        assert_eq!(idx.co2, Some(0.0));
        assert_eq!(idx.noise, Some(0.0));
    }

    #[test]
    fn test_no_inputs() {
        assert_eq!(HealthIndex::default().composite(), None);
    }
}
