use serde::{Deserialize, Serialize};
use crate::core::{Result, VideoError};

pub const DEFAULT_MODULE_AREA: f64 = 2.6;
pub const DEFAULT_MONTHLY_CONSUMPTION: f64 = 780.0;
pub const DEFAULT_CONSUMPTION_INCREMENT: f64 = 4.5;
pub const DEFAULT_PEAK_SUN_HOURS: f64 = 5.3;

/// Oversize range (percent) considered ideal
pub const OPTIMAL_OVERSIZE: std::ops::RangeInclusive<f64> = 100.0..=138.0;

/// Photovoltaic system description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationInput {
    /// Degrees away from north
    pub azimuth_deviation: f64,
    /// Degrees
    pub tilt: f64,
    /// Watts per module
    pub module_power: f64,
    pub module_count: u32,
    /// Square meters per module
    pub module_area: f64,
    /// Watts per inverter
    pub inverter_power: f64,
    pub inverter_count: u32,
    /// Hours per day
    pub peak_sun_hours: f64,
    /// kWh per month
    pub monthly_consumption: f64,
    /// Expected consumption growth, percent
    pub consumption_increment: f64,
}

impl Default for SimulationInput {
    fn default() -> Self {
        Self {
            azimuth_deviation: 15.0,
            tilt: 15.0,
            module_power: 600.0,
            module_count: 12,
            module_area: DEFAULT_MODULE_AREA,
            inverter_power: 2500.0,
            inverter_count: 1,
            peak_sun_hours: DEFAULT_PEAK_SUN_HOURS,
            monthly_consumption: DEFAULT_MONTHLY_CONSUMPTION,
            consumption_increment: DEFAULT_CONSUMPTION_INCREMENT,
        }
    }
}

/// Loss fractions, 0.03 = 3%
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossFactors {
    pub orientation: f64,
    pub tilt: f64,
    pub shading: f64,
    pub temperature: f64,
    pub mismatch: f64,
    pub soiling: f64,
    pub cabling: f64,
    pub inverter: f64,
    pub other: f64,
}

impl LossFactors {
    /// Orientation and tilt losses follow the installation, the rest are fixed defaults.
    pub fn for_installation(azimuth_deviation: f64, tilt: f64) -> Self {
        let azimuth_deviation = azimuth_deviation.abs();
        Self {
            orientation: if azimuth_deviation > 30.0 { 0.05 } else { azimuth_deviation * 0.001 },
            tilt: (tilt - 23.0).abs() * 0.002,
            shading: 0.03,
            temperature: 0.08,
            mismatch: 0.02,
            soiling: 0.02,
            cabling: 0.015,
            inverter: 0.03,
            other: 0.01,
        }
    }

    pub fn total(&self) -> f64 {
        self.orientation
            + self.tilt
            + self.shading
            + self.temperature
            + self.mismatch
            + self.soiling
            + self.cabling
            + self.inverter
            + self.other
    }

    /// `1 - Σ losses`, as a fraction
    pub fn performance_ratio(&self) -> f64 {
        1.0 - self.total()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub losses: LossFactors,
    /// Percent
    pub performance_ratio: f64,
    /// kWp
    pub system_size: f64,
    /// kWh per year
    pub annual_generation: f64,
    /// kWh per month
    pub monthly_generation: f64,
    /// kWh per year the installation should cover
    pub required_generation: f64,
    /// Module power over inverter power, percent
    pub oversize: f64,
    /// Square meters
    pub area: f64,
}

impl SimulationResult {
    pub fn is_oversize_optimal(&self) -> bool {
        OPTIMAL_OVERSIZE.contains(&self.oversize)
    }

    /// Within 10% of the required generation
    pub fn is_generation_sufficient(&self) -> bool {
        self.annual_generation >= self.required_generation * 0.9
    }
}

pub fn simulate(input: &SimulationInput) -> Result<SimulationResult> {
    let mut errors = Vec::new();
    if input.module_count == 0 || input.module_power <= 0.0 {
        errors.push("Module count and power must be positive".to_string());
    }
    if input.inverter_count == 0 || input.inverter_power <= 0.0 {
        errors.push("Inverter count and power must be positive".to_string());
    }
    if input.peak_sun_hours < 0.0 {
        errors.push("Peak sun hours can't be negative".to_string());
    }
    if !errors.is_empty() {
        return Err(VideoError::InvalidParameters(errors));
    }

    let losses = LossFactors::for_installation(input.azimuth_deviation, input.tilt);
    let performance_ratio = losses.performance_ratio();

    let total_power = input.module_count as f64 * input.module_power;
    let inverter_power = input.inverter_count as f64 * input.inverter_power;
    let annual_generation = total_power * input.peak_sun_hours * 365.0 * performance_ratio / 1000.0;
    let module_area = if input.module_area > 0.0 { input.module_area } else { DEFAULT_MODULE_AREA };

    Ok(SimulationResult {
        losses,
        performance_ratio: performance_ratio * 100.0,
        system_size: total_power / 1000.0,
        annual_generation,
        monthly_generation: annual_generation / 12.0,
        required_generation: input.monthly_consumption * (1.0 + input.consumption_increment / 100.0) * 12.0,
        oversize: total_power / inverter_power * 100.0,
        area: input.module_count as f64 * module_area,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_loss_factors() {
        let losses = LossFactors::for_installation(15.0, 15.0);
        assert!(approx(losses.orientation, 0.015));
        assert!(approx(losses.tilt, 0.016));
        assert!(approx(losses.total(), 0.236));
        assert!(approx(losses.performance_ratio(), 0.764));

        let steep = LossFactors::for_installation(45.0, 23.0);
        assert_eq!(steep.orientation, 0.05);
        assert_eq!(steep.tilt, 0.0);
    }

    #[test]
    fn test_default_simulation() {
        let result = simulate(&SimulationInput::default()).unwrap();

        assert!(approx(result.system_size, 7.2));
        assert!(approx(result.performance_ratio, 76.4));
        // 7200 W * 5.3 h * 365 * 0.764 / 1000
        assert!(approx(result.annual_generation, 7200.0 * 5.3 * 365.0 * 0.764 / 1000.0));
        assert!(approx(result.monthly_generation, result.annual_generation / 12.0));
        assert!(approx(result.required_generation, 780.0 * 1.045 * 12.0));
        assert!(approx(result.oversize, 288.0));
        assert!(approx(result.area, 31.2));
        assert!(!result.is_oversize_optimal());
        assert!(result.is_generation_sufficient());
    }

    #[test]
    fn test_invalid_input() {
        let input = SimulationInput {
            inverter_count: 0,
            ..SimulationInput::default()
        };
        assert!(matches!(simulate(&input), Err(VideoError::InvalidParameters(_))));
    }
}
