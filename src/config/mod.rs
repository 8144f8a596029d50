pub mod schema;

#[allow(unused_imports)]
pub use schema::{
    AgentConfig, Config, ObservabilityConfig, SessionsConfig, WorkflowConfig,
};
pub(crate) use schema::sync_directory;
