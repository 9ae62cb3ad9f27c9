//! Data shared across the setup steps and the broker.

pub mod context;
pub mod policy;

pub use context::SharedContext;
pub use policy::PolicyDocument;
