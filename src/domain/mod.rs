// Domain layer - Pure types and analysis algorithms
pub mod autocorrelation;
pub mod bucket;
pub mod error;
pub mod normalizer;
pub mod reading;
pub mod statistics;
