//! Models are entities that are common to services

pub mod auth;
pub mod env;
pub mod location;
pub mod method;
pub mod report;

pub use auth::Credentials;
pub use location::{Location, Scheme};
pub use method::{ConnectionMethod, MethodKind};
