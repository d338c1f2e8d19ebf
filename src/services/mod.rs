pub mod failure_writer;
pub mod remote_processor;
pub mod simulated_processor;

pub use failure_writer::FailureWriter;
pub use remote_processor::{Canceller, ProcessHandle, ProcessReporter, ProcessorEvent, RemoteProcessor};
pub use simulated_processor::{SimulatedOutcome, SimulatedProcessor};
