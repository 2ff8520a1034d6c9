//! TOML configuration for the tracker.
//!
//! Every section and field is optional; missing values fall back to the
//! defaults of the section type. CLI flags are applied on top by `main`.

use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::calibration::CalibrationConfig;
use crate::filter::{FilterConfig, FilterKind, Smoother};
use crate::gaze_loop::GazeLoopConfig;
use crate::interaction::InteractionConfig;
use crate::model::ModelConfig;
use crate::screen::ScreenSize;
use crate::simulate::SimulationConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub screen: ScreenSize,
    pub calibration: CalibrationConfig,
    pub model: ModelConfig,
    pub filter: FilterConfig,
    pub interaction: InteractionConfig,
    pub gaze_loop: GazeLoopConfig,
    pub simulation: SimulationConfig,
}

impl TrackerConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_toml_str(&text)
            .with_context(|| format!("loading config {}", path.display()))?;
        info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(text).context("invalid TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks that serde cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.screen.width == 0 || self.screen.height == 0 {
            bail!("screen must be non-empty, got {}", self.screen);
        }

        let cal = &self.calibration;
        if !(0.0..0.5).contains(&cal.margin_ratio) {
            bail!("calibration.margin_ratio must be in [0, 0.5), got {}", cal.margin_ratio);
        }
        if cal.min_samples_per_point == 0 {
            bail!("calibration.min_samples_per_point must be at least 1");
        }
        if cal.max_samples_per_point < cal.min_samples_per_point {
            bail!(
                "calibration.max_samples_per_point ({}) is below min_samples_per_point ({})",
                cal.max_samples_per_point,
                cal.min_samples_per_point
            );
        }

        let ia = &self.interaction;
        for (name, value) in [
            ("prolonged_blink_ms", ia.prolonged_blink_ms),
            ("dwell_ms", ia.dwell_ms),
            ("dwell_radius_px", ia.dwell_radius_px),
            ("lockout_ms", ia.lockout_ms),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("interaction.{name} must be a non-negative number, got {value}");
            }
        }

        let fps = self.gaze_loop.target_fps;
        if !fps.is_finite() || fps <= 0.0 {
            bail!("gaze_loop.target_fps must be positive, got {fps}");
        }

        let rate = self.simulation.drop_rate;
        if !(0.0..=1.0).contains(&rate) {
            bail!("simulation.drop_rate must be in [0, 1], got {rate}");
        }

        // surfaces DegenerateFilterConfig at load time instead of at startup
        self.build_filter()?;
        Ok(())
    }

    /// Build the configured smoothing filter.
    pub fn build_filter(&self) -> anyhow::Result<Smoother> {
        self.build_filter_kind(self.filter.kind)
    }

    pub fn build_filter_kind(&self, kind: FilterKind) -> anyhow::Result<Smoother> {
        Smoother::build(kind, &self.filter.params)
            .with_context(|| format!("building {} filter", kind.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::PointLayout;
    use crate::model::ModelKind;
    use std::io::Write;

    #[test]
    fn test_empty_config_is_default() {
        let config = TrackerConfig::from_toml_str("").unwrap();
        assert_eq!(config, TrackerConfig::default());
        assert_eq!(config.model.kind, ModelKind::Ridge);
        assert_eq!(config.filter.kind, FilterKind::Kalman);
        assert_eq!(config.screen, ScreenSize::new(1920, 1080));
    }

    #[test]
    fn test_partial_sections() {
        let text = r#"
            [screen]
            width = 2560
            height = 1440

            [calibration]
            layout = "nine"
            min_samples_per_point = 5

            [model]
            kind = "svr"

            [model.params]
            svr_c = 4.0

            [filter]
            kind = "kde"

            [interaction]
            dwell_ms = 1200.0
        "#;
        let config = TrackerConfig::from_toml_str(text).unwrap();
        assert_eq!(config.screen, ScreenSize::new(2560, 1440));
        assert_eq!(config.calibration.layout, PointLayout::Nine);
        assert_eq!(config.calibration.min_samples_per_point, 5);
        assert_eq!(config.calibration.max_samples_per_point, 25);
        assert_eq!(config.model.kind, ModelKind::Svr);
        assert_eq!(config.model.params.svr_c, 4.0);
        assert_eq!(config.model.params.ridge_alpha, 1.0);
        assert_eq!(config.filter.kind, FilterKind::Kde);
        assert_eq!(config.interaction.dwell_ms, 1200.0);
        assert_eq!(config.interaction.lockout_ms, 1500.0);
    }

    #[test]
    fn test_degenerate_kalman_rejected_at_load() {
        let text = r#"
            [filter.params]
            measurement_variance_x = 0.0
        "#;
        let err = TrackerConfig::from_toml_str(text).unwrap_err();
        assert!(format!("{err:#}").contains("kalman"), "{err:#}");

        // irrelevant for a filter that ignores variance
        let text = r#"
            [filter]
            kind = "ema"
            [filter.params]
            measurement_variance_x = 0.0
        "#;
        assert!(TrackerConfig::from_toml_str(text).is_ok());
    }

    #[test]
    fn test_range_checks() {
        for text in [
            "[calibration]\nmargin_ratio = 0.6",
            "[calibration]\nmin_samples_per_point = 0",
            "[calibration]\nmin_samples_per_point = 30",
            "[interaction]\ndwell_ms = -1.0",
            "[gaze_loop]\ntarget_fps = 0.0",
            "[screen]\nwidth = 0\nheight = 100",
        ] {
            assert!(TrackerConfig::from_toml_str(text).is_err(), "{text}");
        }
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[model]\nkind = \"mlp\"").unwrap();
        let config = TrackerConfig::load(file.path()).unwrap();
        assert_eq!(config.model.kind, ModelKind::Mlp);

        let missing = TrackerConfig::load(Path::new("/nonexistent/gazehome.toml"));
        assert!(missing.is_err());
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = TrackerConfig::default();
        let text = toml::to_string(&config).unwrap();
        assert_eq!(TrackerConfig::from_toml_str(&text).unwrap(), config);
    }
}
