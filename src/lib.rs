pub mod adapters;
pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod probes;
pub mod registry;
pub mod sampler;
pub mod supervisor;

pub use config::AppConfig;
pub use coordination::{Shutdown, ShutdownSignal};
pub use domain::{
    AlertEvent, CycleReport, HealthStatus, ServiceDescriptor, ServiceOutcome, ServiceState,
    ServiceStatus, Severity,
};
pub use error::{Result, WardenError};
pub use persistence::{PersistedStates, StateStore};
pub use registry::{RegisteredService, ServiceRegistry};
pub use sampler::ResourceSampler;
pub use supervisor::{AlertDispatcher, RemediationExecutor, SupervisorLoop};
