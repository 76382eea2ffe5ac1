mod error;
mod shutdown;

pub mod prelude {
    pub use crate::error::{ConfigurationError, SchedulerInvariantError};
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle};
}
