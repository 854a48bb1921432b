//! Supervision: alert routing, remediation and the monitoring cycle

pub mod alert_manager;
pub mod channels;
pub mod cycle;
pub mod remediation;

pub use alert_manager::{AlertDispatcher, DispatchResult, PendingDispatch};
pub use channels::{AlertChannel, LogChannel};
pub use cycle::SupervisorLoop;
pub use remediation::{
    action_for, CommandAction, ContainerRestart, NoRemediation, RemediationAction,
    RemediationExecutor, SystemdRestart,
};
