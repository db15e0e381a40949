mod dryrun;
mod octoai;

use std::collections::BTreeMap;
use std::env;

use curb_contracts::{GenerationError, GenerationRequest, GenerationResponse};

pub use dryrun::DryrunGenerator;
pub use octoai::{OctoAiGenerator, DEFAULT_API_BASE};

/// A backend that turns one request into an ordered list of images.
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, request: &GenerationRequest)
        -> Result<GenerationResponse, GenerationError>;
}

#[derive(Default)]
pub struct GeneratorRegistry {
    generators: BTreeMap<String, Box<dyn ImageGenerator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<G: ImageGenerator + 'static>(&mut self, generator: G) {
        self.generators
            .insert(generator.name().to_string(), Box::new(generator));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ImageGenerator> {
        self.generators
            .get(name)
            .map(|generator| generator.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.generators.keys().cloned().collect()
    }
}

/// `octoai` configured from the environment plus the offline `dryrun`.
pub fn default_generator_registry(engine: &str) -> anyhow::Result<GeneratorRegistry> {
    let mut generators = GeneratorRegistry::new();
    generators.register(DryrunGenerator);
    generators.register(OctoAiGenerator::from_env(engine)?);
    Ok(generators)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
