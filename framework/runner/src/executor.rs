use std::future::Future;

/// Runs the async work of every virtual user on one shared multi-threaded Tokio runtime.
#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
}

impl Executor {
    pub(crate) fn new(runtime: tokio::runtime::Runtime) -> Self {
        Self { runtime }
    }

    /// Run async code in place, blocking the calling thread until it completes.
    ///
    /// The future is always driven to completion, it is not cancelled when the run is stopped.
    /// A virtual user that is asked to stop finishes its current request first. Use a timeout
    /// inside the future if it could otherwise run for a long time.
    ///
    /// Must not be called from inside the runtime, virtual user threads are outside it.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        self.runtime.block_on(fut)
    }

    /// Submit async code to be run in the background.
    ///
    /// The runner does not wait for spawned futures before it finishes. In virtual user hooks,
    /// use [Executor::execute_in_place] so that the work completes before the next iteration.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(fut);
    }

    pub fn handle(&self) -> &tokio::runtime::Handle {
        self.runtime.handle()
    }
}
