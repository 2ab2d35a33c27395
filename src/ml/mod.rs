//! Model training, inference and scoring.

pub mod gbdt;
pub mod metrics;
pub mod trainer;
