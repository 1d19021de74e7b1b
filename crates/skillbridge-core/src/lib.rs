pub mod cache;
pub mod config;
pub mod error;
pub mod observability;
pub mod path_validation;
pub mod registry;
pub mod selector;
pub mod skill;
pub mod validation;

pub use error::{PathEscape, RegistryError, ValidationError};
pub use registry::{Catalog, Registry};
pub use skill::{Readiness, SkillDescriptor};
