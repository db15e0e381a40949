use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One image-to-image generation call, assembled once per action.
///
/// Field names are the service's wire names.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub seed: u64,
    pub checkpoint: String,
    pub loras: IndexMap<String, f64>,
    pub width: u32,
    pub height: u32,
    pub num_images: u32,
    pub sampler: String,
    pub steps: u32,
    pub cfg_scale: f64,
    pub use_refiner: bool,
    pub high_noise_frac: f64,
    pub style_preset: String,
    /// Base64 PNG of the normalized source photo.
    pub init_image: String,
    pub strength: f64,
}

/// The three values overlaid on the baseline for each action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestOverrides {
    pub num_images: u32,
    pub strength: f64,
    pub seed: u64,
}

impl std::fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("prompt", &self.prompt)
            .field("negative_prompt", &self.negative_prompt)
            .field("seed", &self.seed)
            .field("checkpoint", &self.checkpoint)
            .field("loras", &self.loras)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("num_images", &self.num_images)
            .field("sampler", &self.sampler)
            .field("steps", &self.steps)
            .field("cfg_scale", &self.cfg_scale)
            .field("use_refiner", &self.use_refiner)
            .field("high_noise_frac", &self.high_noise_frac)
            .field("style_preset", &self.style_preset)
            .field(
                "init_image",
                &format_args!("<{} base64 chars>", self.init_image.len()),
            )
            .field("strength", &self.strength)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;
    use serde_json::{json, Value};

    use super::GenerationRequest;

    fn sample() -> GenerationRequest {
        let mut loras = IndexMap::new();
        loras.insert("octoai:add-detail".to_string(), 0.5);
        GenerationRequest {
            prompt: "house with updated landscaping".to_string(),
            negative_prompt: "Blurry photo".to_string(),
            seed: 42,
            checkpoint: "octoai:crystal-clear".to_string(),
            loras,
            width: 1024,
            height: 1024,
            num_images: 3,
            sampler: "DDIM".to_string(),
            steps: 30,
            cfg_scale: 12.0,
            use_refiner: true,
            high_noise_frac: 0.8,
            style_preset: "base".to_string(),
            init_image: "aGVsbG8=".repeat(64),
            strength: 0.45,
        }
    }

    #[test]
    fn serializes_with_service_field_names() -> anyhow::Result<()> {
        let value = serde_json::to_value(sample())?;
        let mut keys = value
            .as_object()
            .map(|obj| obj.keys().cloned().collect::<Vec<String>>())
            .unwrap_or_default();
        keys.sort();
        let mut expected = vec![
            "prompt",
            "negative_prompt",
            "seed",
            "checkpoint",
            "loras",
            "width",
            "height",
            "num_images",
            "sampler",
            "steps",
            "cfg_scale",
            "use_refiner",
            "high_noise_frac",
            "style_preset",
            "init_image",
            "strength",
        ];
        expected.sort();
        assert_eq!(keys, expected);
        assert_eq!(value["loras"], json!({"octoai:add-detail": 0.5}));
        assert_eq!(value["strength"], json!(0.45));
        assert_eq!(value["use_refiner"], Value::Bool(true));
        Ok(())
    }

    #[test]
    fn debug_output_omits_image_body() {
        let request = sample();
        let rendered = format!("{request:?}");
        assert!(rendered.contains("<512 base64 chars>"));
        assert!(!rendered.contains("aGVsbG8="));
    }
}
