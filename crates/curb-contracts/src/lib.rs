pub mod config;
pub mod errors;
pub mod events;
pub mod grid;
pub mod request;
pub mod response;

pub use config::{ActionControls, BaselineConfig, ControlBounds, CountBounds, StrengthBounds};
pub use errors::{GenerationError, GenerationErrorKind};
pub use events::{EventPayload, EventWriter};
pub use grid::{partition, DisplayGroup};
pub use request::{GenerationRequest, RequestOverrides};
pub use response::{GeneratedImage, GenerationResponse};
