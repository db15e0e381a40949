use std::num::NonZeroUsize;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::GenerationError;

const DEFAULT_BASELINE_JSON: &str = include_str!("../resources/baseline.json");

/// Environment variable naming an optional baseline overlay file.
pub const BASELINE_OVERRIDE_ENV: &str = "CURB_APPEAL_BASELINE";

const STEP_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountBounds {
    pub min: u32,
    pub max: u32,
    pub default: u32,
}

impl CountBounds {
    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrengthBounds {
    pub min: f64,
    pub max: f64,
    pub default: f64,
    #[serde(default)]
    pub step: Option<f64>,
}

impl StrengthBounds {
    pub fn contains(&self, value: f64) -> bool {
        if !value.is_finite() || value < self.min || value > self.max {
            return false;
        }
        match self.step {
            Some(step) if step > 0.0 => {
                let steps = (value - self.min) / step;
                (steps - steps.round()).abs() < STEP_TOLERANCE
            }
            _ => true,
        }
    }
}

/// Ranges the front end offers for the per-action controls.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlBounds {
    pub num_images: CountBounds,
    pub grid_width: CountBounds,
    pub strength: StrengthBounds,
}

/// Generation parameters that stay fixed across actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineConfig {
    pub engine: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub checkpoint: String,
    #[serde(default)]
    pub loras: IndexMap<String, f64>,
    pub width: u32,
    pub height: u32,
    pub sampler: String,
    pub steps: u32,
    pub cfg_scale: f64,
    pub use_refiner: bool,
    pub high_noise_frac: f64,
    pub style_preset: String,
    pub controls: ControlBounds,
}

impl BaselineConfig {
    /// The defaults compiled into the binary.
    pub fn embedded() -> Result<Self> {
        Self::load(None)
    }

    /// Loads the embedded defaults, overlaid by the JSON object at `overlay_path`.
    pub fn load(overlay_path: Option<&Path>) -> Result<Self> {
        let mut merged = parse_json_object(DEFAULT_BASELINE_JSON)
            .context("embedded baseline configuration is not a JSON object")?;
        if let Some(path) = overlay_path {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed reading baseline overlay {}", path.display()))?;
            merge_baseline_overlay(&mut merged, &raw)
                .with_context(|| format!("invalid baseline overlay {}", path.display()))?;
        }
        let config: BaselineConfig = serde_json::from_value(Value::Object(merged))
            .context("baseline configuration has missing or mistyped fields")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.trim().is_empty() {
            bail!("baseline engine must not be empty");
        }
        if self.width == 0 || self.height == 0 {
            bail!(
                "baseline dimensions must be positive (got {}x{})",
                self.width,
                self.height
            );
        }
        if self.steps == 0 {
            bail!("baseline steps must be positive");
        }
        if !self.cfg_scale.is_finite() || self.cfg_scale <= 0.0 {
            bail!("baseline cfg_scale must be a positive number");
        }
        if !(0.0..=1.0).contains(&self.high_noise_frac) {
            bail!(
                "baseline high_noise_frac must lie in [0, 1] (got {})",
                self.high_noise_frac
            );
        }
        for (name, weight) in &self.loras {
            if !weight.is_finite() {
                bail!("lora weight for '{name}' is not a finite number");
            }
        }
        validate_count_bounds("num_images", &self.controls.num_images)?;
        validate_count_bounds("grid_width", &self.controls.grid_width)?;

        let strength = &self.controls.strength;
        if !(0.0 <= strength.min && strength.min <= strength.max && strength.max <= 1.0) {
            bail!(
                "strength bounds must satisfy 0 <= min <= max <= 1 (got {}..{})",
                strength.min,
                strength.max
            );
        }
        if matches!(strength.step, Some(step) if !(step.is_finite() && step > 0.0)) {
            bail!("strength step must be a positive number");
        }
        if !strength.contains(strength.default) {
            bail!(
                "strength default {} lies outside its bounds",
                strength.default
            );
        }
        Ok(())
    }
}

fn validate_count_bounds(name: &str, bounds: &CountBounds) -> Result<()> {
    if bounds.min == 0 {
        bail!("{name} minimum must be at least 1");
    }
    if !(bounds.min <= bounds.default && bounds.default <= bounds.max) {
        bail!(
            "{name} bounds must satisfy min <= default <= max (got {}, {}, {})",
            bounds.min,
            bounds.default,
            bounds.max
        );
    }
    Ok(())
}

fn parse_json_object(raw: &str) -> Result<Map<String, Value>> {
    let parsed: Value = serde_json::from_str(raw)?;
    match parsed {
        Value::Object(map) => Ok(map),
        _ => bail!("expected a JSON object"),
    }
}

/// Top-level keys replace the defaults; `controls` merges one control at a time.
fn merge_baseline_overlay(base: &mut Map<String, Value>, raw: &str) -> Result<()> {
    let overlay = parse_json_object(raw)?;
    for (key, value) in overlay {
        if key == "controls" {
            if let (Some(Value::Object(existing)), Value::Object(incoming)) =
                (base.get_mut("controls"), &value)
            {
                for (control, bounds) in incoming {
                    match (existing.get_mut(control), bounds) {
                        (Some(Value::Object(current)), Value::Object(fields)) => {
                            for (field, field_value) in fields {
                                current.insert(field.clone(), field_value.clone());
                            }
                        }
                        _ => {
                            existing.insert(control.clone(), bounds.clone());
                        }
                    }
                }
                continue;
            }
        }
        base.insert(key, value);
    }
    Ok(())
}

/// Per-action choices made through the front end's controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionControls {
    pub num_images: u32,
    pub grid_width: u32,
    pub strength: f64,
}

impl ActionControls {
    pub fn defaults(bounds: &ControlBounds) -> Self {
        Self {
            num_images: bounds.num_images.default,
            grid_width: bounds.grid_width.default,
            strength: bounds.strength.default,
        }
    }

    pub fn validate(&self, bounds: &ControlBounds) -> std::result::Result<(), GenerationError> {
        if !bounds.num_images.contains(self.num_images) {
            return Err(GenerationError::invalid(format!(
                "number of images must be between {} and {} (got {})",
                bounds.num_images.min, bounds.num_images.max, self.num_images
            )));
        }
        if !bounds.grid_width.contains(self.grid_width) {
            return Err(GenerationError::invalid(format!(
                "grid width must be between {} and {} (got {})",
                bounds.grid_width.min, bounds.grid_width.max, self.grid_width
            )));
        }
        if !bounds.strength.contains(self.strength) {
            let step = bounds
                .strength
                .step
                .map(|step| format!(" in steps of {step}"))
                .unwrap_or_default();
            return Err(GenerationError::invalid(format!(
                "strength must be between {} and {}{step} (got {})",
                bounds.strength.min, bounds.strength.max, self.strength
            )));
        }
        Ok(())
    }

    pub fn grid_columns(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.grid_width as usize).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::errors::GenerationErrorKind;

    use super::{ActionControls, BaselineConfig};

    #[test]
    fn embedded_baseline_has_expected_constants() -> anyhow::Result<()> {
        let baseline = BaselineConfig::embedded()?;
        assert_eq!(baseline.engine, "sdxl");
        assert_eq!(baseline.prompt, "house with updated landscaping");
        assert_eq!(baseline.checkpoint, "octoai:crystal-clear");
        assert_eq!(baseline.loras.get("octoai:add-detail"), Some(&0.5));
        assert_eq!((baseline.width, baseline.height), (1024, 1024));
        assert_eq!(baseline.sampler, "DDIM");
        assert_eq!(baseline.steps, 30);
        assert_eq!(baseline.cfg_scale, 12.0);
        assert!(baseline.use_refiner);
        assert_eq!(baseline.high_noise_frac, 0.8);
        assert_eq!(baseline.style_preset, "base");
        assert_eq!(baseline.controls.num_images.max, 10);
        assert_eq!(baseline.controls.grid_width.default, 2);
        assert_eq!(baseline.controls.strength.default, 0.45);
        Ok(())
    }

    #[test]
    fn overlay_replaces_top_level_and_merges_controls() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("baseline.json");
        fs::write(
            &path,
            r#"{
                "prompt": "modern farmhouse exterior",
                "loras": {"octoai:paint-splash": 0.3},
                "controls": {"num_images": {"max": 4}}
            }"#,
        )?;

        let baseline = BaselineConfig::load(Some(&path))?;
        assert_eq!(baseline.prompt, "modern farmhouse exterior");
        assert_eq!(baseline.loras.len(), 1);
        assert_eq!(baseline.loras.get("octoai:paint-splash"), Some(&0.3));
        assert_eq!(baseline.controls.num_images.max, 4);
        assert_eq!(baseline.controls.num_images.min, 1);
        assert_eq!(baseline.controls.num_images.default, 2);
        assert_eq!(baseline.checkpoint, "octoai:crystal-clear");
        Ok(())
    }

    #[test]
    fn overlay_with_out_of_range_refiner_fraction_is_rejected() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("baseline.json");
        fs::write(&path, r#"{"high_noise_frac": 1.5}"#)?;

        let err = BaselineConfig::load(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("high_noise_frac"));
        Ok(())
    }

    #[test]
    fn overlay_must_be_an_object() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("baseline.json");
        fs::write(&path, "[1, 2, 3]")?;
        assert!(BaselineConfig::load(Some(&path)).is_err());
        Ok(())
    }

    #[test]
    fn controls_default_to_bounds_and_validate() -> anyhow::Result<()> {
        let baseline = BaselineConfig::embedded()?;
        let controls = ActionControls::defaults(&baseline.controls);
        assert_eq!(controls.num_images, 2);
        assert_eq!(controls.grid_columns().get(), 2);
        assert!(controls.validate(&baseline.controls).is_ok());
        Ok(())
    }

    #[test]
    fn controls_reject_values_outside_bounds() -> anyhow::Result<()> {
        let baseline = BaselineConfig::embedded()?;
        let bounds = &baseline.controls;
        let base = ActionControls::defaults(bounds);

        for controls in [
            ActionControls {
                num_images: 0,
                ..base
            },
            ActionControls {
                num_images: 11,
                ..base
            },
            ActionControls {
                grid_width: 6,
                ..base
            },
            ActionControls {
                strength: 0.25,
                ..base
            },
            ActionControls {
                strength: 0.47,
                ..base
            },
            ActionControls {
                strength: f64::NAN,
                ..base
            },
        ] {
            let err = controls.validate(bounds).unwrap_err();
            assert_eq!(err.kind(), GenerationErrorKind::InvalidParameters);
        }
        Ok(())
    }

    #[test]
    fn strength_on_step_grid_is_accepted() -> anyhow::Result<()> {
        let baseline = BaselineConfig::embedded()?;
        for strength in [0.3, 0.35, 0.45, 0.55, 0.7] {
            assert!(
                baseline.controls.strength.contains(strength),
                "strength {strength} should be accepted"
            );
        }
        Ok(())
    }
}
