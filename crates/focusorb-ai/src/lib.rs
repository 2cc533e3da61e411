pub mod backend;
pub mod oracle;

pub use backend::{BackendError, HttpOracle};
pub use oracle::{ChatReply, DecisionOracle, Verdict};
