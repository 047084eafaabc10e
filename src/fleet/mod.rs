mod manager;
mod pipeline;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use manager::{FleetManager, ShutdownHandle};
pub use pipeline::{CameraPipeline, PipelineDeps, PipelineStop};
pub use types::{ComponentState, ShutdownReason};
