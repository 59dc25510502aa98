//! ATLAS Credit Score API Library
//!
//! This library scores loan applicants for risk of payment delay and runs
//! what-if simulations (adding a guarantor, clearing other debt) to show how
//! the score would move.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Core scoring logic.
//! - `artifact`: Model artifact loading and validation.
//! - `classifier`: Classifier trait and serialized classifier kinds.
//! - `config`: Configuration management.
//! - `encoder`: One-hot feature encoding and column alignment.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Applicant and result models.
//! - `scoring`: Probability to score conversion.
//! - `simulation`: What-if scenario rules.
//! - `training`: Offline artifact production.

pub mod api;
pub mod core;

pub mod artifact;
pub mod classifier;
pub mod config;
pub mod encoder;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod scoring;
pub mod simulation;
pub mod training;
