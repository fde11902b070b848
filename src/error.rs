use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config Error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Frame Decode Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Bad prediction shape {shape:?}: expected [N, 4 + classes] with at least one class")]
    BadPredictionShape { shape: Vec<usize> },

    #[error("Worker thread panicked")]
    WorkerPanicked,
}
