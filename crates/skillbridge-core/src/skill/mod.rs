pub mod dependency;
pub mod descriptor;
pub mod discovery;
pub mod fingerprint;
pub mod manifest;
pub mod metadata;
pub mod tags;

pub use descriptor::{Readiness, SkillDescriptor};
pub use metadata::{RiskLevel, SkillHeader};
