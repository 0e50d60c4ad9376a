//! Error taxonomy of the prediction pipeline

/// Result type used throughout the predictor library
pub type PredictionResult<T> = Result<T, PredictionError>;

/// Stage of the pipeline that found too little data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStage {
    /// Raw samples returned by the backend
    Fetch,
    /// Rows left after resampling and gap filling
    Prepare,
}

impl std::fmt::Display for DataStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataStage::Fetch => f.write_str("fetch"),
            DataStage::Prepare => f.write_str("prepare"),
        }
    }
}

/// Every way a single metric's prediction or a publish can fail
#[derive(thiserror::Error, Debug)]
pub enum PredictionError {
    /// The backend could not be reached, or the connection is degraded
    #[error("Backend unreachable: {message}")]
    Connectivity { message: String },

    /// The backend answered but with an error or an unreadable payload
    #[error("Backend error: {message}")]
    Backend { message: String },

    /// Too few usable observations to fit a model
    #[error("Insufficient data at {stage}: {found} samples, need {required}")]
    InsufficientData {
        stage: DataStage,
        found: usize,
        required: usize,
    },

    /// The forecasting model failed to fit or predict
    #[error("Model '{model}' failed: {message}")]
    ModelFit { model: String, message: String },

    /// The metrics sink rejected or never received the push
    #[error("Publish failed: {message}")]
    Publish { message: String },
}

impl PredictionError {
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn insufficient(stage: DataStage, found: usize, required: usize) -> Self {
        Self::InsufficientData {
            stage,
            found,
            required,
        }
    }

    pub fn model_fit(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelFit {
            model: model.into(),
            message: message.into(),
        }
    }

    pub fn publish(message: impl Into<String>) -> Self {
        Self::Publish {
            message: message.into(),
        }
    }

    /// Stable label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connectivity { .. } => "connectivity",
            Self::Backend { .. } => "backend",
            Self::InsufficientData { .. } => "insufficient_data",
            Self::ModelFit { .. } => "model_fit",
            Self::Publish { .. } => "publish",
        }
    }

    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }
}

impl From<reqwest::Error> for PredictionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::backend(format!("Failed to parse response: {}", e))
        } else {
            Self::connectivity(e.to_string())
        }
    }
}
