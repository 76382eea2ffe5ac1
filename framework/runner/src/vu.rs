use std::sync::Arc;
use std::time::Duration;

use volley_core::prelude::DelegatedShutdownListener;
use volley_instruments::{OperationRecord, ITERATION_OPERATION_ID};

use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
use crate::definition::VuHookMut;

/// The hooks that each virtual user runs.
pub(crate) struct VuHooks<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub(crate) setup: Option<VuHookMut<RV, V>>,
    pub(crate) behaviour: VuHookMut<RV, V>,
    pub(crate) teardown: Option<VuHookMut<RV, V>>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Clone for VuHooks<RV, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Copy for VuHooks<RV, V> {}

/// Run one virtual user until `stop` is signalled.
///
/// Each iteration runs the behaviour hook once, records it as an `iteration` operation and then
/// pauses. A behaviour error fails that iteration only. A stop signal is checked before every
/// iteration and cuts the pause short, so the virtual user never starts another iteration after
/// it has been asked to stop.
pub(crate) fn run_vu<RV: UserValuesConstraint, V: UserValuesConstraint>(
    vu_id: String,
    runner_context: Arc<RunnerContext<RV>>,
    hooks: VuHooks<RV, V>,
    iteration_pause: Duration,
    mut stop: DelegatedShutdownListener,
) {
    let mut context = VuContext::new(vu_id.clone(), runner_context.clone(), stop.clone());

    if let Some(setup) = hooks.setup {
        if let Err(e) = setup(&mut context) {
            log::error!("Setup failed for virtual user {vu_id}: {e:?}");
            return;
        }
    }

    log::debug!("Virtual user {vu_id} started");

    let mut iterations = 0u64;
    loop {
        if stop.should_shutdown() {
            break;
        }

        let mut record = OperationRecord::new(ITERATION_OPERATION_ID);
        let result = (hooks.behaviour)(&mut context);
        record.finish(result.is_err());
        runner_context.reporter().add_iteration(&record);
        iterations += 1;

        if let Err(e) = result {
            log::warn!("Iteration failed for virtual user {vu_id}: {e:?}");
        }

        if !pause(&runner_context, iteration_pause, &mut stop) {
            break;
        }
    }

    if let Some(teardown) = hooks.teardown {
        if let Err(e) = teardown(&mut context) {
            log::error!("Teardown failed for virtual user {vu_id}: {e:?}");
        }
    }

    log::debug!("Virtual user {vu_id} stopped after {iterations} iterations");
}

/// Sleep for `duration` unless stopped first. Returns false if the virtual user should stop.
fn pause<RV: UserValuesConstraint>(
    runner_context: &RunnerContext<RV>,
    duration: Duration,
    stop: &mut DelegatedShutdownListener,
) -> bool {
    if duration.is_zero() {
        return !stop.should_shutdown();
    }

    runner_context.executor().handle().block_on(async {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = stop.wait_for_shutdown() => false,
        }
    })
}
