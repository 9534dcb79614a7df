use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Cannot reach the generation service at {url}: {source}")]
    Connectivity {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Model '{identifier}' is not loaded (loaded: {})", format_loaded(.loaded))]
    ModelResolution { identifier: String, loaded: Vec<String> },

    #[error("Generation request failed with HTTP {status}: {body}")]
    GenerationCall { status: u16, body: String },

    #[error("Malformed response from the generation service: {0}")]
    MalformedResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ClientError {
    /// The service could not be reached at all.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// The service answered but the requested model is not loaded.
    pub fn is_model_resolution(&self) -> bool {
        matches!(self, Self::ModelResolution { .. })
    }
}

fn format_loaded(loaded: &[String]) -> String {
    if loaded.is_empty() {
        "none".to_string()
    } else {
        loaded.join(", ")
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
