pub mod alert;
pub mod report;
pub mod service;
pub mod state;

pub use alert::*;
pub use report::*;
pub use service::*;
pub use state::*;
