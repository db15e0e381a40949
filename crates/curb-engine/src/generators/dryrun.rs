use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use curb_contracts::{
    GeneratedImage, GenerationError, GenerationErrorKind, GenerationRequest, GenerationResponse,
};
use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use super::ImageGenerator;
use crate::normalize::ACCEPTED_FORMATS;

/// Offline generator: solid-colour JPEGs derived from prompt, seed and index.
///
/// The init image is still decoded so that a malformed request fails the
/// same way it would against the hosted service.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryrunGenerator;

impl ImageGenerator for DryrunGenerator {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let rejected =
            |message: String| GenerationError::new(GenerationErrorKind::ServiceRejected, message);

        let init = BASE64
            .decode(request.init_image.as_bytes())
            .map_err(|err| rejected(format!("init_image is not valid base64: {err}")))?;
        match image::guess_format(&init) {
            Ok(format) if ACCEPTED_FORMATS.contains(&format) => {}
            Ok(format) => return Err(rejected(format!("init_image has unsupported format {format:?}"))),
            Err(err) => return Err(rejected(format!("init_image is not an image: {err}"))),
        }

        let mut images = Vec::with_capacity(request.num_images as usize);
        for idx in 0..request.num_images {
            let seed = request.seed.saturating_add(u64::from(idx));
            let color = color_for(&request.prompt, request.seed, idx);
            let canvas = RgbImage::from_pixel(request.width, request.height, Rgb(color));
            let mut buffer = Cursor::new(Vec::new());
            canvas
                .write_to(&mut buffer, ImageFormat::Jpeg)
                .map_err(|err| rejected(format!("dryrun encode failed: {err}")))?;
            images.push(
                GeneratedImage::new(buffer.into_inner())
                    .with_seed(Some(seed))
                    .with_finish_reason(Some("OK".to_string())),
            );
        }
        tracing::debug!(count = images.len(), seed = request.seed, "dryrun images generated");
        Ok(GenerationResponse {
            images,
            request_id: Some(format!("dryrun-{}", request.seed)),
        })
    }
}

fn color_for(prompt: &str, seed: u64, idx: u32) -> [u8; 3] {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update(seed.to_le_bytes());
    hasher.update(idx.to_le_bytes());
    let digest = hasher.finalize();
    [digest[0], digest[1], digest[2]]
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use curb_contracts::{BaselineConfig, GenerationErrorKind, RequestOverrides};
    use image::ImageFormat;

    use super::{color_for, DryrunGenerator, BASE64};
    use crate::builder::RequestBuilder;
    use crate::generators::ImageGenerator;
    use crate::normalize::tests::{encode, gradient};

    fn small_baseline() -> anyhow::Result<BaselineConfig> {
        let mut baseline = BaselineConfig::embedded()?;
        baseline.width = 32;
        baseline.height = 24;
        Ok(baseline)
    }

    fn png_b64() -> String {
        BASE64.encode(encode(&gradient(8, 8), ImageFormat::Png))
    }

    #[test]
    fn produces_requested_count_of_jpegs() -> anyhow::Result<()> {
        let baseline = small_baseline()?;
        let request = RequestBuilder::new(&baseline).build(
            png_b64(),
            RequestOverrides {
                num_images: 3,
                strength: 0.45,
                seed: 40,
            },
        )?;
        let response = DryrunGenerator.generate(&request)?;

        assert_eq!(response.len(), 3);
        for (idx, generated) in response.images.iter().enumerate() {
            assert_eq!(image::guess_format(generated.to_bytes())?, ImageFormat::Jpeg);
            let decoded = image::load_from_memory(generated.to_bytes())?;
            assert_eq!((decoded.width(), decoded.height()), (32, 24));
            assert_eq!(generated.seed, Some(40 + idx as u64));
            assert_eq!(generated.finish_reason.as_deref(), Some("OK"));
        }
        assert_eq!(response.request_id.as_deref(), Some("dryrun-40"));
        Ok(())
    }

    #[test]
    fn colours_are_deterministic_per_seed_and_index() {
        assert_eq!(color_for("p", 1, 0), color_for("p", 1, 0));
        assert_ne!(color_for("p", 1, 0), color_for("p", 2, 0));
        assert_ne!(color_for("p", 1, 0), color_for("p", 1, 1));
    }

    #[test]
    fn rejects_init_image_that_is_not_an_image() -> anyhow::Result<()> {
        let baseline = small_baseline()?;
        let builder = RequestBuilder::new(&baseline);
        let overrides = RequestOverrides {
            num_images: 1,
            strength: 0.45,
            seed: 0,
        };
        for init in ["%%%not-base64", "aGVsbG8gd29ybGQ="] {
            let request = builder.build(init.to_string(), overrides)?;
            let err = DryrunGenerator.generate(&request).unwrap_err();
            assert_eq!(err.kind(), GenerationErrorKind::ServiceRejected, "init {init}");
        }
        Ok(())
    }
}
