pub mod drift;
pub mod engine;

pub use drift::{DriftPolicy, ExactMatch, SubnetMatch};
pub use engine::{validate_username, AdminError, AuthorizationEngine, Fence, OriginSource};
