pub mod config;
pub mod constants;
pub mod error;
pub mod frame;
pub mod link;
pub mod mode;
pub mod parameters;
pub mod program;
pub mod receiver;
pub mod session;
pub mod sink;
pub mod sync;

// Re-export the types most callers need
pub use config::SessionConfig;
pub use error::PacerError;
pub use mode::Mode;
pub use parameters::{Parameter, ParameterSet, Value};
pub use program::{JsonStore, MemoryStore, ParameterStore, ProgrammingRequest};
pub use receiver::{Receiver, Supervisor};
pub use session::{LinkState, Session};
pub use sink::{Sample, SampleSink};
