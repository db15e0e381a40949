use curb_contracts::{BaselineConfig, GenerationError, GenerationRequest, RequestOverrides};
use rand::Rng;

/// Upper bound (inclusive) for freshly drawn seeds.
pub const MAX_SEED: u64 = 10_000_000_000;

pub fn random_seed() -> u64 {
    rand::thread_rng().gen_range(0..=MAX_SEED)
}

/// Overlays per-action choices on a shared baseline without mutating it.
#[derive(Debug, Clone, Copy)]
pub struct RequestBuilder<'a> {
    baseline: &'a BaselineConfig,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(baseline: &'a BaselineConfig) -> Self {
        Self { baseline }
    }

    pub fn baseline(&self) -> &BaselineConfig {
        self.baseline
    }

    /// Range-checks the overrides and assembles the request. Values are
    /// passed through unchanged, never clamped.
    pub fn build(
        &self,
        init_image: String,
        overrides: RequestOverrides,
    ) -> Result<GenerationRequest, GenerationError> {
        let max_images = self.baseline.controls.num_images.max;
        if overrides.num_images == 0 || overrides.num_images > max_images {
            return Err(GenerationError::invalid(format!(
                "image count must be between 1 and {max_images} (got {})",
                overrides.num_images
            )));
        }
        if !(0.0..=1.0).contains(&overrides.strength) {
            return Err(GenerationError::invalid(format!(
                "strength must lie in [0, 1] (got {})",
                overrides.strength
            )));
        }
        if !(0.0..=1.0).contains(&self.baseline.high_noise_frac) {
            return Err(GenerationError::invalid(format!(
                "refiner fraction must lie in [0, 1] (got {})",
                self.baseline.high_noise_frac
            )));
        }
        if init_image.is_empty() {
            return Err(GenerationError::no_image());
        }

        let baseline = self.baseline;
        Ok(GenerationRequest {
            prompt: baseline.prompt.clone(),
            negative_prompt: baseline.negative_prompt.clone(),
            seed: overrides.seed,
            checkpoint: baseline.checkpoint.clone(),
            loras: baseline.loras.clone(),
            width: baseline.width,
            height: baseline.height,
            num_images: overrides.num_images,
            sampler: baseline.sampler.clone(),
            steps: baseline.steps,
            cfg_scale: baseline.cfg_scale,
            use_refiner: baseline.use_refiner,
            high_noise_frac: baseline.high_noise_frac,
            style_preset: baseline.style_preset.clone(),
            init_image,
            strength: overrides.strength,
        })
    }

    /// Same as [`build`](Self::build) with a newly drawn seed.
    pub fn build_with_fresh_seed(
        &self,
        init_image: String,
        num_images: u32,
        strength: f64,
    ) -> Result<GenerationRequest, GenerationError> {
        self.build(
            init_image,
            RequestOverrides {
                num_images,
                strength,
                seed: random_seed(),
            },
        )
    }
}
