//! Per-window ensemble weights recomputed from recent model errors.

pub mod adapter;
pub mod scheduler;
pub mod weighting;

pub use adapter::{
    prediction_errors, record_prediction_errors, AdapterState, EnsembleWeightAdapter,
    RetrainReport,
};
pub use scheduler::WeightRetrainScheduler;
pub use weighting::{error_profile, inverse_error_weights};
