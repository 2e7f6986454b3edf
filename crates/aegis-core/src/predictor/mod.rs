//! Failure prediction engine

mod failure;
mod features;
mod model;

pub use failure::{
    FailurePrediction, FailurePredictor, FailureType, HealthyLimits, PredictionBands,
    PredictorConfig, TimeToFailureBand, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_PREDICTION_WINDOW,
};
pub use features::{
    extract_features, FeatureVector, CONNECTIONS, CPU, CPU_TREND, DAY_OF_WEEK, DISK, ERROR_RATE,
    ERROR_TREND, FEATURE_COUNT, HOUR_OF_DAY, LOAD_AVERAGE, MEMORY, MEMORY_TREND, NETWORK,
    QUEUE_DEPTH, RESPONSE_TIME, THROUGHPUT,
};
pub use model::{FailureModel, ModelOutput, ModelStats, RiskWeights, TrainingExample};
