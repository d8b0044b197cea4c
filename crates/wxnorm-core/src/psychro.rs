//! Psychrometric derivations
//!
//! Temperatures in °C, relative humidity in %, pressure in Pa.

/// Saturation vapour pressure over water (Pa), Magnus-Bolton form
pub fn saturation_vapor_pressure(temperature: f64) -> f64 {
    611.2 * ((17.67 * temperature) / (temperature + 243.5)).exp()
}

/// Specific humidity (kg of water vapour per kg of moist air)
pub fn absolute_humidity(temperature: f64, pressure_pa: f64, humidity: f64) -> Option<f64> {
    if pressure_pa <= 0.0 || !(0.0..=100.0).contains(&humidity) {
        return None;
    }
    let vapor = humidity / 100.0 * saturation_vapor_pressure(temperature);
    let denominator = pressure_pa - 0.378 * vapor;
    if denominator <= 0.0 {
        return None;
    }
    Some(0.622 * vapor / denominator)
}

/// Dew point (°C) using the Magnus formula
pub fn dew_point(temperature: f64, humidity: f64) -> Option<f64> {
    if humidity <= 0.0 || humidity > 100.0 {
        return None;
    }
    let gamma = (humidity / 100.0).ln() + (17.67 * temperature) / (temperature + 243.5);
    Some(243.5 * gamma / (17.67 - gamma))
}

/// hPa -> Pa
pub fn hpa_to_pa(pressure: f64) -> f64 {
    pressure * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturation_vapor_pressure() {
        // ~611 Pa at the freezing point, ~2339 Pa at 20°C
        assert!((saturation_vapor_pressure(0.0) - 611.2).abs() < 0.01);
        assert!((saturation_vapor_pressure(20.0) - 2339.0).abs() < 5.0);
    }

    #[test]
    fn test_absolute_humidity() {
        let q = absolute_humidity(20.0, hpa_to_pa(1013.25), 50.0).unwrap();
        // about 7.2 g/kg
        assert!((q - 0.0072).abs() < 0.0002, "got {}", q);

        assert_eq!(absolute_humidity(20.0, 0.0, 50.0), None);
        assert_eq!(absolute_humidity(20.0, 101_325.0, 150.0), None);
    }

    #[test]
    fn test_dew_point() {
        let dp = dew_point(25.0, 60.0).unwrap();
        assert!((dp - 16.7).abs() < 0.2, "got {}", dp);

        let saturated = dew_point(10.0, 100.0).unwrap();
        assert!((saturated - 10.0).abs() < 1e-9);

        assert_eq!(dew_point(10.0, 0.0), None);
    }
}
