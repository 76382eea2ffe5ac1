use std::{fmt::Debug, sync::Arc};

use volley_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use volley_instruments::Reporter;

use crate::executor::Executor;

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

/// State shared by every virtual user in a run.
///
/// The global setup hook gets mutable access to fill in the scenario's value. After that it is
/// shared read-only behind an [Arc].
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    reporter: Arc<Reporter>,
    shutdown_handle: ShutdownHandle,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        reporter: Arc<Reporter>,
        shutdown_handle: ShutdownHandle,
    ) -> Self {
        Self {
            executor,
            reporter,
            shutdown_handle,
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    /// Stop the whole run, as if Ctrl-C had been pressed. Virtual users finish their current
    /// iteration and the summary is produced as normal.
    pub fn force_stop_scenario(&self) {
        self.shutdown_handle.shutdown();
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// The context of one virtual user, owned by the thread that runs it.
pub struct VuContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    vu_id: String,
    runner_context: Arc<RunnerContext<RV>>,
    stop_listener: DelegatedShutdownListener,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VuContext<RV, V> {
    pub(crate) fn new(
        vu_id: String,
        runner_context: Arc<RunnerContext<RV>>,
        stop_listener: DelegatedShutdownListener,
    ) -> Self {
        Self {
            vu_id,
            runner_context,
            stop_listener,
            value: Default::default(),
        }
    }

    /// A name for this virtual user that is unique within the run, such as `vu-3`.
    pub fn vu_id(&self) -> &str {
        &self.vu_id
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    /// Signalled when this virtual user should stop, either because the ramp no longer needs it
    /// or because the run is ending.
    pub fn stop_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.stop_listener
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}
