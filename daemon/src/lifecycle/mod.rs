//! Process lifecycle: signal handling and the session stop flag

mod shutdown;

pub use shutdown::{ShutdownSignal, StopFlag};
