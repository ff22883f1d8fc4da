//! API endpoint handlers, one module per resource.

pub mod analyze;
pub mod dashboard;
pub mod health;
pub mod personalization;
pub mod predict;
pub mod summarize;
