//! Error definitions for the mapping module

use super::binding::AxisRole;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MappingError {
    /// The sample is too short for one of the bound axes
    #[error("Sample has no axis {index} for {role} ({available} axes reported)")]
    MissingAxis {
        role: AxisRole,
        index: usize,
        available: usize,
    },

    /// The binding itself is unusable
    #[error("Invalid input binding: {0}")]
    InvalidBinding(String),
}
