//! Menstrual cycle inference: phase classification, cycle length
//! estimation and backfill, and next-period prediction over one owner's
//! history.
//!
//! The engine modules ([`date_math`], [`phase`], [`cycle_length`],
//! [`duplicate`], [`prediction`]) are synchronous and pure.
//! [`service::CycleService`] wires them to a [`store::CycleStore`].

pub mod collaborators;
pub mod config;
pub mod crypto;
pub mod cycle_length;
pub mod date_math;
pub mod duplicate;
pub mod error;
pub mod logging;
pub mod models;
pub mod phase;
pub mod prediction;
pub mod service;
pub mod store;

pub use error::CycleError;
pub use models::{CycleRecord, FertileWindow, NewCycle, OwnerId, Phase, Prediction, RecordId};
pub use service::{CycleService, ServiceError};
