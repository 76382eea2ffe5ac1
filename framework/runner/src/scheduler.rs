use anyhow::Context;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use volley_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use volley_instruments::Reporter;

use crate::executor::Executor;
use crate::stage::{RampSchedule, RampState};

/// One running virtual user, on its own named thread.
#[derive(Debug)]
pub struct RunnerHandle {
    id: usize,
    stop: ShutdownHandle,
    join_handle: JoinHandle<()>,
}

impl RunnerHandle {
    /// Start `body` on a new thread called `vu-<id>`. The body gets a listener that is signalled
    /// when [RunnerHandle::stop] is called.
    pub fn start<F>(id: usize, body: F) -> anyhow::Result<Self>
    where
        F: FnOnce(DelegatedShutdownListener) + Send + 'static,
    {
        let stop = ShutdownHandle::new();
        let listener = stop.new_listener();

        let join_handle = std::thread::Builder::new()
            .name(format!("vu-{id}"))
            .spawn(move || body(listener))
            .with_context(|| format!("Failed to spawn thread for virtual user {id}"))?;

        Ok(Self {
            id,
            stop,
            join_handle,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Ask the virtual user to stop once its current iteration is done. Does not wait.
    pub fn stop(&self) {
        self.stop.shutdown();
    }

    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    pub fn join(self) -> anyhow::Result<()> {
        self.join_handle
            .join()
            .map_err(|_| anyhow::anyhow!("Virtual user vu-{} panicked", self.id))
    }
}

/// Counts from a finished schedule, for the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    pub peak_runners: usize,
    pub runners_started: usize,
}

/// Keeps the number of live virtual users in line with a [RampSchedule].
///
/// New virtual users are created with `spawn`, which is given the id to use. The scheduler is
/// the only owner of the [RunnerHandle]s it creates.
pub struct Scheduler<F> {
    schedule: RampSchedule,
    tick_interval: Duration,
    spawn: F,
    live: Vec<RunnerHandle>,
    stopping: Vec<RunnerHandle>,
    next_id: usize,
    target: usize,
    state: Option<RampState>,
    peak_runners: usize,
    runners_started: usize,
    live_report: Option<(Arc<Reporter>, Duration)>,
}

impl<F> Scheduler<F>
where
    F: FnMut(usize) -> anyhow::Result<RunnerHandle>,
{
    pub fn new(schedule: RampSchedule, tick_interval: Duration, spawn: F) -> Self {
        Self {
            schedule,
            tick_interval,
            spawn,
            live: Vec::new(),
            stopping: Vec::new(),
            next_id: 0,
            target: 0,
            state: None,
            peak_runners: 0,
            runners_started: 0,
            live_report: None,
        }
    }

    /// Log a point in time summary from `reporter` every `interval` while [Scheduler::run] is
    /// running.
    pub fn with_live_report(mut self, reporter: Arc<Reporter>, interval: Duration) -> Self {
        self.live_report = Some((reporter, interval));
        self
    }

    /// Number of virtual users that are running and have not been asked to stop.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Number of virtual users that have been asked to stop but have not been joined yet.
    pub fn stopping_count(&self) -> usize {
        self.stopping.len()
    }

    pub fn report(&self) -> ScheduleReport {
        ScheduleReport {
            peak_runners: self.peak_runners,
            runners_started: self.runners_started,
        }
    }

    /// One reconciliation step at `elapsed` since the run started.
    ///
    /// Starts or stops virtual users so that the live count matches the ramp target. The newest
    /// virtual users are stopped first. Once the schedule is complete every live virtual user is
    /// stopped and no more are started.
    pub fn tick(&mut self, elapsed: Duration) -> RampState {
        let state = self.schedule.state_at(elapsed);
        if self.state != Some(state) {
            log::info!("Ramp is now {state:?} at {elapsed:?}");
            self.state = Some(state);
        }

        self.reap();

        self.target = self.schedule.target_at(elapsed);
        while self.live.len() < self.target {
            match (self.spawn)(self.next_id) {
                Ok(handle) => {
                    self.next_id += 1;
                    self.runners_started += 1;
                    self.live.push(handle);
                }
                Err(e) => {
                    // Try again on the next tick.
                    log::error!("Failed to start virtual user: {e:?}");
                    break;
                }
            }
        }

        if self.live.len() > self.target {
            let surplus = self.live.split_off(self.target);
            for handle in surplus.into_iter().rev() {
                log::debug!("Stopping vu-{}", handle.id());
                handle.stop();
                self.stopping.push(handle);
            }
        }

        self.peak_runners = self.peak_runners.max(self.live.len());

        state
    }

    /// Ask every live virtual user to stop.
    pub fn stop_all(&mut self) {
        for handle in self.live.drain(..).rev() {
            handle.stop();
            self.stopping.push(handle);
        }
    }

    /// Wait for every stopping virtual user to finish.
    pub fn drain(&mut self) {
        for handle in self.stopping.drain(..) {
            if let Err(e) = handle.join() {
                log::error!("{e:?}");
            }
        }
    }

    /// Tick until the schedule completes or `shutdown_listener` is signalled, then stop and wait
    /// for every virtual user.
    pub fn run(
        mut self,
        executor: &Executor,
        mut shutdown_listener: DelegatedShutdownListener,
    ) -> ScheduleReport {
        let started = Instant::now();
        let mut next_tick = started;
        let mut next_report = self
            .live_report
            .as_ref()
            .and_then(|(_, interval)| started.checked_add(*interval));

        loop {
            if self.tick(started.elapsed()) == RampState::Complete {
                break;
            }

            if let Some(due) = next_report.filter(|due| Instant::now() >= *due) {
                self.log_live_report();
                next_report = self
                    .live_report
                    .as_ref()
                    .and_then(|(_, interval)| due.checked_add(*interval));
            }

            next_tick = (next_tick + self.tick_interval).max(Instant::now());
            let deadline = tokio::time::Instant::from_std(next_tick);
            let shutdown_requested = executor.handle().block_on(async {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => false,
                    _ = shutdown_listener.wait_for_shutdown() => true,
                }
            });

            if shutdown_requested {
                log::info!(
                    "Shutdown requested, stopping {} virtual users",
                    self.live.len()
                );
                break;
            }
        }

        self.stop_all();
        log::debug!(
            "Waiting for {} virtual users to finish",
            self.stopping.len()
        );
        self.drain();

        self.report()
    }

    /// Join virtual users that have finished, whether they were asked to stop or ended on their
    /// own. A live virtual user that ended on its own is replaced on this tick.
    fn reap(&mut self) {
        let (finished, stopping): (Vec<_>, Vec<_>) = std::mem::take(&mut self.stopping)
            .into_iter()
            .partition(RunnerHandle::is_finished);
        self.stopping = stopping;

        let (ended, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.live)
            .into_iter()
            .partition(RunnerHandle::is_finished);
        self.live = live;

        for handle in finished.into_iter().chain(ended) {
            if let Err(e) = handle.join() {
                log::error!("{e:?}");
            }
        }
    }

    fn log_live_report(&self) {
        let Some((reporter, _)) = &self.live_report else {
            return;
        };

        let summary = reporter.summarize();
        let (passed, failed) = summary
            .checks
            .iter()
            .fold((0, 0), |(p, f), c| (p + c.passes, f + c.fails));
        log::info!(
            "{} live runners, target {}, {} iterations, {} checks passed, {} failed",
            self.live.len(),
            self.target,
            summary.total_iterations,
            passed,
            failed
        );
    }

    #[cfg(test)]
    fn live_ids(&self) -> Vec<usize> {
        self.live.iter().map(RunnerHandle::id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{Stage, StageSequence};
    use pretty_assertions::assert_eq;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn idle_runner(id: usize) -> anyhow::Result<RunnerHandle> {
        RunnerHandle::start(id, |stop| {
            while !stop.should_shutdown() {
                std::thread::sleep(Duration::from_millis(1));
            }
        })
    }

    fn schedule(stages: Vec<Stage>, run_duration: Option<Duration>) -> RampSchedule {
        RampSchedule::with_run_duration(StageSequence::new(stages).unwrap(), run_duration)
    }

    #[test]
    fn follows_the_ramp_then_stops_everything() {
        let mut scheduler = Scheduler::new(
            schedule(vec![Stage::new(secs(10), 100)], Some(secs(15))),
            secs(1),
            idle_runner,
        );

        assert_eq!(RampState::Ramping { stage: 0 }, scheduler.tick(secs(5)));
        assert_eq!(50, scheduler.live_count());

        assert_eq!(RampState::Holding, scheduler.tick(secs(12)));
        assert_eq!(100, scheduler.live_count());

        assert_eq!(RampState::Complete, scheduler.tick(secs(15)));
        assert_eq!(0, scheduler.live_count());

        // No new runners once complete.
        assert_eq!(RampState::Complete, scheduler.tick(secs(16)));
        assert_eq!(0, scheduler.live_count());

        scheduler.drain();
        assert_eq!(0, scheduler.stopping_count());
        assert_eq!(
            ScheduleReport {
                peak_runners: 100,
                runners_started: 100,
            },
            scheduler.report()
        );
    }

    #[test]
    fn stops_newest_first() {
        let mut scheduler = Scheduler::new(
            schedule(
                vec![Stage::new(secs(10), 10), Stage::new(secs(10), 0)],
                None,
            ),
            secs(1),
            idle_runner,
        );

        scheduler.tick(secs(10));
        assert_eq!((0..10).collect::<Vec<_>>(), scheduler.live_ids());

        scheduler.tick(secs(15));
        assert_eq!((0..5).collect::<Vec<_>>(), scheduler.live_ids());
        assert_eq!(5, scheduler.stopping_count());

        scheduler.stop_all();
        scheduler.drain();
    }

    #[test]
    fn replaces_runners_that_end_on_their_own() {
        let mut scheduler = Scheduler::new(
            schedule(vec![Stage::new(Duration::ZERO, 2)], None),
            secs(1),
            |id| RunnerHandle::start(id, |_| {}),
        );

        scheduler.tick(secs(1));
        std::thread::sleep(Duration::from_millis(100));
        scheduler.tick(secs(2));

        assert_eq!(2, scheduler.live_count());
        assert_eq!(4, scheduler.report().runners_started);
        assert_eq!(2, scheduler.report().peak_runners);

        scheduler.stop_all();
        scheduler.drain();
    }

    #[test]
    fn spawn_failure_does_not_stop_the_ramp() {
        let mut fail_next = true;
        let mut scheduler = Scheduler::new(
            schedule(vec![Stage::new(Duration::ZERO, 3)], None),
            secs(1),
            move |id| {
                if std::mem::take(&mut fail_next) {
                    anyhow::bail!("no threads left");
                }
                idle_runner(id)
            },
        );

        scheduler.tick(secs(1));
        assert_eq!(0, scheduler.live_count());

        scheduler.tick(secs(2));
        assert_eq!(3, scheduler.live_count());

        scheduler.stop_all();
        scheduler.drain();
    }

    #[test]
    fn run_to_completion() {
        let executor = Executor::new(tokio::runtime::Runtime::new().unwrap());
        let shutdown = ShutdownHandle::new();

        let scheduler = Scheduler::new(
            schedule(
                vec![
                    Stage::new(Duration::from_millis(100), 3),
                    Stage::new(Duration::from_millis(300), 3),
                ],
                Some(Duration::from_millis(400)),
            ),
            Duration::from_millis(10),
            idle_runner,
        )
        .with_live_report(Arc::new(Reporter::default()), Duration::from_millis(50));

        let report = scheduler.run(&executor, shutdown.new_listener());

        assert_eq!(3, report.peak_runners);
        assert!(report.runners_started >= 3);
    }

    #[test]
    fn run_stops_on_shutdown() {
        let executor = Executor::new(tokio::runtime::Runtime::new().unwrap());
        let shutdown = ShutdownHandle::new();

        let scheduler = Scheduler::new(
            schedule(vec![Stage::new(Duration::ZERO, 2)], None),
            Duration::from_millis(10),
            idle_runner,
        );

        let trigger = shutdown.clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            trigger.shutdown();
        });

        let started = Instant::now();
        let report = scheduler.run(&executor, shutdown.new_listener());
        stopper.join().unwrap();

        assert_eq!(2, report.peak_runners);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
