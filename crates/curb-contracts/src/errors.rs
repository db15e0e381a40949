/// Failure categories at the generation boundary.
///
/// The front end picks its wording per kind instead of folding every cause
/// into one message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GenerationErrorKind {
    NoImageProvided,
    UnsupportedImage,
    InvalidParameters,
    MissingCredential,
    Transport,
    Unauthorized,
    ServiceRejected,
    MalformedResponse,
    Storage,
}

impl GenerationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoImageProvided => "no_image_provided",
            Self::UnsupportedImage => "unsupported_image",
            Self::InvalidParameters => "invalid_parameters",
            Self::MissingCredential => "missing_credential",
            Self::Transport => "transport",
            Self::Unauthorized => "unauthorized",
            Self::ServiceRejected => "service_rejected",
            Self::MalformedResponse => "malformed_response",
            Self::Storage => "storage",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoImageProvided => "Please upload a source image of your home.",
            Self::UnsupportedImage => "The uploaded file is not a readable PNG or JPEG image.",
            Self::InvalidParameters => "The generation settings are out of range.",
            Self::MissingCredential => "No credential is configured for the image service.",
            Self::Transport => "Could not reach the image service. Please try again.",
            Self::Unauthorized => "The image service rejected the configured credential.",
            Self::ServiceRejected => "The image service rejected the request.",
            Self::MalformedResponse => "The image service returned an unreadable response.",
            Self::Storage => "The generated images could not be saved.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationError {
    kind: GenerationErrorKind,
    message: String,
}

impl GenerationError {
    pub fn new(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn no_image() -> Self {
        Self::new(
            GenerationErrorKind::NoImageProvided,
            "no source image was provided",
        )
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(GenerationErrorKind::InvalidParameters, message)
    }

    /// Keeps the whole context chain of an `anyhow` error in the detail text.
    pub fn from_anyhow(kind: GenerationErrorKind, err: &anyhow::Error) -> Self {
        Self::new(kind, format!("{err:#}"))
    }

    pub fn kind(&self) -> GenerationErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn user_message(&self) -> &'static str {
        self.kind.user_message()
    }
}

impl std::fmt::Display for GenerationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for GenerationError {}
