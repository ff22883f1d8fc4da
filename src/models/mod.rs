//! Domain types shared across the personalization, fusion, and
//! recommendation subsystems.

pub mod profile;
pub mod recommendation;
pub mod risk;

pub use profile::{AuditRecord, PatientProfile, Thresholds};
pub use recommendation::{Recommendation, Severity};
pub use risk::{Entity, RankedRisk, RiskVector};
