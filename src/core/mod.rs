//! Core data model: identifiers, the clock seam, schedule evaluation, and
//! the resource spec/status types.

pub mod clock;
pub mod resource;
pub mod schedule;
pub mod types;
