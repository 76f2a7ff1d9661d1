//! FHIR Bundle model and local reference resolution.
//!
//! Before a bundle's resources can be submitted individually, references
//! between entries expressed through temporary `fullUrl` identifiers
//! (e.g. `urn:uuid:...`) have to be rewritten to the permanent
//! `<resourceType>/<id>` form the resources will carry on the server.
//! [`resolve_references`] performs that rewrite in place.

pub mod model;
pub mod resolve;

pub use model::{Bundle, BundleEntry, BundleRequest, BundleType};
pub use resolve::{
    resolve_references, LocalReferenceMap, ResolveError, ResolveReport, ResourceIdentity,
};
