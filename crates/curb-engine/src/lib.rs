pub mod builder;
pub mod generators;
pub mod normalize;
pub mod results;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Instant;

use curb_contracts::{
    partition, ActionControls, BaselineConfig, DisplayGroup, EventPayload, EventWriter,
    GeneratedImage, GenerationError, GenerationErrorKind, GenerationRequest,
};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::builder::RequestBuilder;
use crate::generators::{GeneratorRegistry, ImageGenerator};
use crate::normalize::{normalize_upload, NormalizedImage};
use crate::results::ResultStore;

pub use crate::builder::{random_seed, MAX_SEED};
pub use crate::generators::{default_generator_registry, DryrunGenerator, OctoAiGenerator};
pub use crate::results::OutputLayout;

/// File name of the upright upload when previews are saved.
pub const PREVIEW_FILE_NAME: &str = "original.png";

/// Everything one successful action produced.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub action_id: String,
    pub preview: NormalizedImage,
    pub preview_path: Option<PathBuf>,
    pub request: GenerationRequest,
    pub images: Vec<GeneratedImage>,
    pub written: Vec<PathBuf>,
    pub request_id: Option<String>,
}

impl ActionOutcome {
    pub fn groups(&self, width: NonZeroUsize) -> Vec<DisplayGroup<'_, GeneratedImage>> {
        partition(&self.images, width)
    }

    pub fn written_groups(&self, width: NonZeroUsize) -> Vec<DisplayGroup<'_, PathBuf>> {
        partition(&self.written, width)
    }
}

/// Runs generate actions: one upload in, one set of result files out.
pub struct CurbEngine {
    baseline: BaselineConfig,
    generators: GeneratorRegistry,
    store: ResultStore,
    events: EventWriter,
    save_preview: bool,
}

impl CurbEngine {
    pub fn new(
        baseline: BaselineConfig,
        generators: GeneratorRegistry,
        store: ResultStore,
        events: EventWriter,
    ) -> Self {
        Self {
            baseline,
            generators,
            store,
            events,
            save_preview: false,
        }
    }

    pub fn with_preview(mut self, save_preview: bool) -> Self {
        self.save_preview = save_preview;
        self
    }

    pub fn baseline(&self) -> &BaselineConfig {
        &self.baseline
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    pub fn generator_names(&self) -> Vec<String> {
        self.generators.names()
    }

    /// Upload and control checks run before anything touches the filesystem;
    /// results are written only once the generator has returned every image.
    pub fn generate(
        &self,
        generator_name: &str,
        upload: Option<&[u8]>,
        controls: &ActionControls,
    ) -> Result<ActionOutcome, GenerationError> {
        let upload = upload
            .filter(|bytes| !bytes.is_empty())
            .ok_or_else(GenerationError::no_image)?;
        controls.validate(&self.baseline.controls)?;
        let generator = self.generators.get(generator_name).ok_or_else(|| {
            GenerationError::invalid(format!(
                "unknown generator '{generator_name}' (available: {})",
                self.generators.names().join(", ")
            ))
        })?;

        let action_id = Uuid::new_v4().to_string();
        self.emit(
            "action_started",
            &action_id,
            json!({
                "generator": generator_name,
                "num_images": controls.num_images,
                "grid_width": controls.grid_width,
                "strength": controls.strength,
                "upload_bytes": upload.len(),
            }),
        )?;

        let started = Instant::now();
        match self.run_action(generator, &action_id, upload, controls) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::error!(
                    action_id = %action_id,
                    kind = err.kind().as_str(),
                    detail = err.message(),
                    "generation failed"
                );
                let logged = self.events.emit(
                    "generation_failed",
                    &action_id,
                    map_object(json!({
                        "kind": err.kind().as_str(),
                        "message": err.message(),
                        "elapsed_s": started.elapsed().as_secs_f64(),
                    })),
                );
                if let Err(log_err) = logged {
                    tracing::warn!(error = %log_err, "failed recording generation_failed event");
                }
                Err(err)
            }
        }
    }

    fn run_action(
        &self,
        generator: &dyn ImageGenerator,
        action_id: &str,
        upload: &[u8],
        controls: &ActionControls,
    ) -> Result<ActionOutcome, GenerationError> {
        let preview = normalize_upload(upload)?;
        self.emit(
            "image_normalized",
            action_id,
            json!({
                "format": format!("{:?}", preview.source_format).to_lowercase(),
                "width": preview.width(),
                "height": preview.height(),
                "orientation": preview.orientation,
                "rotated": preview.rotated,
            }),
        )?;

        let init_image = preview
            .to_base64_png()
            .map_err(|err| GenerationError::from_anyhow(GenerationErrorKind::UnsupportedImage, &err))?;
        let request = RequestBuilder::new(&self.baseline).build_with_fresh_seed(
            init_image,
            controls.num_images,
            controls.strength,
        )?;
        self.emit(
            "request_built",
            action_id,
            json!({
                "engine": self.baseline.engine,
                "seed": request.seed,
                "num_images": request.num_images,
                "strength": request.strength,
                "init_image_chars": request.init_image.len(),
            }),
        )?;

        let started = Instant::now();
        let response = generator.generate(&request)?;
        self.emit(
            "generation_finished",
            action_id,
            json!({
                "generator": generator.name(),
                "images": response.len(),
                "request_id": response.request_id,
                "seeds": response.images.iter().map(|image| image.seed).collect::<Vec<_>>(),
                "latency_s": started.elapsed().as_secs_f64(),
            }),
        )?;

        let written = self.store.persist(&response.images, action_id)?;
        let preview_path = if self.save_preview {
            let path = self.store.action_dir(action_id).join(PREVIEW_FILE_NAME);
            preview
                .save_preview(&path)
                .map_err(|err| GenerationError::from_anyhow(GenerationErrorKind::Storage, &err))?;
            Some(path)
        } else {
            None
        };
        self.emit(
            "results_written",
            action_id,
            json!({
                "paths": written
                    .iter()
                    .map(|path| path.to_string_lossy().to_string())
                    .collect::<Vec<_>>(),
                "preview_path": preview_path
                    .as_ref()
                    .map(|path| path.to_string_lossy().to_string()),
            }),
        )?;

        Ok(ActionOutcome {
            action_id: action_id.to_string(),
            preview,
            preview_path,
            request,
            images: response.images,
            written,
            request_id: response.request_id,
        })
    }

    fn emit(&self, event_type: &str, action_id: &str, payload: Value) -> Result<(), GenerationError> {
        self.events
            .emit(event_type, action_id, map_object(payload))
            .map(|_| ())
            .map_err(|err| GenerationError::from_anyhow(GenerationErrorKind::Storage, &err))
    }
}

fn map_object(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_else(Map::new)
}
