use std::time::Duration;
use volley_core::prelude::SchedulerInvariantError;
use volley_summary_model::StageSummary;

/// A timed segment of the run, over which the number of virtual users moves linearly from the
/// previous stage's target to this stage's target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

impl From<Stage> for StageSummary {
    fn from(stage: Stage) -> Self {
        StageSummary {
            duration: stage.duration,
            target: stage.target,
        }
    }
}

/// Parse a stage from `<duration>:<target>`, for example `30s:1000` or `1m 30s:50`.
pub fn parse_stage(s: &str) -> Result<Stage, SchedulerInvariantError> {
    let malformed = || SchedulerInvariantError::Malformed {
        stage: s.to_string(),
    };

    let (duration, target) = s.rsplit_once(':').ok_or_else(malformed)?;
    let (duration, target) = (duration.trim(), target.trim());

    if duration.starts_with('-') {
        return Err(SchedulerInvariantError::NegativeDuration {
            stage: s.to_string(),
        });
    }
    let duration = humantime::parse_duration(duration).map_err(|_| malformed())?;

    let target = target.parse::<i64>().map_err(|_| malformed())?;
    let target = usize::try_from(target).map_err(|_| SchedulerInvariantError::NegativeTarget {
        stage: s.to_string(),
    })?;

    Ok(Stage::new(duration, target))
}

/// An ordered, non-empty list of stages whose total duration fits in a [Duration].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSequence {
    stages: Vec<Stage>,
}

impl StageSequence {
    pub fn new(stages: Vec<Stage>) -> Result<Self, SchedulerInvariantError> {
        if stages.is_empty() {
            return Err(SchedulerInvariantError::NoStages);
        }

        // Every partial sum taken while interpolating is bounded by the total.
        stages
            .iter()
            .try_fold(Duration::ZERO, |total, stage| total.checked_add(stage.duration))
            .ok_or(SchedulerInvariantError::TooLong)?;

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn final_target(&self) -> usize {
        self.stages.last().map(|s| s.target).unwrap_or_default()
    }

    pub fn peak_target(&self) -> usize {
        self.stages.iter().map(|s| s.target).max().unwrap_or_default()
    }

    /// The stage that is active at `elapsed`, or `None` once every stage has finished.
    ///
    /// A stage is active from its start up to, but not including, its end. So at the boundary
    /// between two stages the later one is active.
    pub fn stage_at(&self, elapsed: Duration) -> Option<usize> {
        let mut stage_end = Duration::ZERO;
        for (index, stage) in self.stages.iter().enumerate() {
            stage_end += stage.duration;
            if elapsed < stage_end {
                return Some(index);
            }
        }

        None
    }

    /// The desired number of virtual users at `elapsed`.
    ///
    /// Interpolates linearly within the active stage, starting from the previous stage's target.
    /// The first stage starts from zero. The result is rounded to the nearest integer. It is
    /// computed from the absolute elapsed time so no rounding error carries over between calls.
    /// After the last stage the final target is returned.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        let mut stage_start = Duration::ZERO;
        let mut previous_target = 0usize;

        for stage in &self.stages {
            let stage_end = stage_start + stage.duration;
            if elapsed < stage_end {
                let fraction = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let from = previous_target as f64;
                let to = stage.target as f64;
                return (from + (to - from) * fraction).round() as usize;
            }

            stage_start = stage_end;
            previous_target = stage.target;
        }

        previous_target
    }

    pub fn to_summary(&self) -> Vec<StageSummary> {
        self.stages.iter().copied().map(StageSummary::from).collect()
    }
}

/// Where the run is in its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampState {
    /// Following the stage with this index.
    Ramping { stage: usize },
    /// Every stage has finished but the run continues, holding the final target.
    Holding,
    /// The run is over. No new iterations are started.
    Complete,
}

/// A stage sequence plus how long the whole run lasts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampSchedule {
    stages: StageSequence,
    run_duration: Option<Duration>,
}

impl RampSchedule {
    /// A run that ends as soon as the last stage does.
    pub fn new(stages: StageSequence) -> Self {
        let run_duration = Some(stages.total_duration());
        Self {
            stages,
            run_duration,
        }
    }

    /// A run that lasts for `run_duration`, or until stopped if `None`.
    ///
    /// If this is shorter than the stages then the run is cut short, if it is longer then the
    /// final target is held until the time is up.
    pub fn with_run_duration(stages: StageSequence, run_duration: Option<Duration>) -> Self {
        Self {
            stages,
            run_duration,
        }
    }

    pub fn stages(&self) -> &StageSequence {
        &self.stages
    }

    pub fn run_duration(&self) -> Option<Duration> {
        self.run_duration
    }

    pub fn state_at(&self, elapsed: Duration) -> RampState {
        if let Some(run_duration) = self.run_duration {
            if elapsed >= run_duration {
                return RampState::Complete;
            }
        }

        match self.stages.stage_at(elapsed) {
            Some(stage) => RampState::Ramping { stage },
            None => RampState::Holding,
        }
    }

    /// The desired number of virtual users at `elapsed`, which is zero once the run is complete.
    pub fn target_at(&self, elapsed: Duration) -> usize {
        match self.state_at(elapsed) {
            RampState::Complete => 0,
            _ => self.stages.target_at(elapsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn reference_stages() -> StageSequence {
        StageSequence::new(vec![
            Stage::new(secs(30), 1000),
            Stage::new(secs(60), 100),
            Stage::new(secs(20), 50),
        ])
        .unwrap()
    }

    #[test]
    fn first_stage_ramps_from_zero() {
        let stages = StageSequence::new(vec![Stage::new(secs(10), 100)]).unwrap();

        assert_eq!(0, stages.target_at(Duration::ZERO));
        assert_eq!(50, stages.target_at(secs(5)));
        assert_eq!(100, stages.target_at(secs(10)));
        assert_eq!(100, stages.target_at(secs(12)));
    }

    #[test]
    fn boundaries_hit_stage_targets_exactly() {
        let stages = reference_stages();

        assert_eq!(1000, stages.target_at(secs(30)));
        assert_eq!(100, stages.target_at(secs(90)));
        assert_eq!(50, stages.target_at(secs(110)));
    }

    #[test]
    fn ramps_down_between_stages() {
        let stages = reference_stages();

        // Half way through the second stage, between 1000 and 100.
        assert_eq!(550, stages.target_at(secs(60)));
        // Half way through the last stage, between 100 and 50.
        assert_eq!(75, stages.target_at(secs(100)));
    }

    #[test]
    fn rounds_to_nearest() {
        let stages = StageSequence::new(vec![Stage::new(secs(3), 1)]).unwrap();

        assert_eq!(0, stages.target_at(secs(1)));
        assert_eq!(1, stages.target_at(secs(2)));
    }

    #[test]
    fn zero_duration_stage_jumps() {
        let stages =
            StageSequence::new(vec![Stage::new(Duration::ZERO, 10), Stage::new(secs(10), 10)])
                .unwrap();

        assert_eq!(Some(1), stages.stage_at(Duration::ZERO));
        assert_eq!(10, stages.target_at(Duration::ZERO));
        assert_eq!(10, stages.target_at(secs(5)));
    }

    #[test]
    fn state_transitions() {
        let schedule = RampSchedule::new(reference_stages());

        assert_eq!(RampState::Ramping { stage: 0 }, schedule.state_at(Duration::ZERO));
        assert_eq!(RampState::Ramping { stage: 0 }, schedule.state_at(secs(29)));
        assert_eq!(RampState::Ramping { stage: 1 }, schedule.state_at(secs(30)));
        assert_eq!(RampState::Ramping { stage: 2 }, schedule.state_at(secs(90)));
        assert_eq!(RampState::Complete, schedule.state_at(secs(110)));
        assert_eq!(0, schedule.target_at(secs(110)));
    }

    #[test]
    fn longer_run_holds_final_target() {
        let stages = StageSequence::new(vec![Stage::new(secs(10), 100)]).unwrap();
        let schedule = RampSchedule::with_run_duration(stages, Some(secs(15)));

        assert_eq!(RampState::Holding, schedule.state_at(secs(12)));
        assert_eq!(100, schedule.target_at(secs(12)));
        assert_eq!(RampState::Complete, schedule.state_at(secs(15)));
    }

    #[test]
    fn soak_never_completes() {
        let stages = StageSequence::new(vec![Stage::new(secs(10), 5)]).unwrap();
        let schedule = RampSchedule::with_run_duration(stages, None);

        assert_eq!(RampState::Holding, schedule.state_at(secs(100_000)));
        assert_eq!(5, schedule.target_at(secs(100_000)));
    }

    #[test]
    fn empty_sequence_is_rejected() {
        assert_eq!(
            SchedulerInvariantError::NoStages,
            StageSequence::new(vec![]).unwrap_err()
        );
    }

    #[test]
    fn parse_valid_stages() {
        assert_eq!(Stage::new(secs(30), 1000), parse_stage("30s:1000").unwrap());
        assert_eq!(Stage::new(secs(60), 100), parse_stage("1m:100").unwrap());
        assert_eq!(Stage::new(secs(90), 0), parse_stage("1m 30s:0").unwrap());
    }

    #[test]
    fn parse_invalid_stages() {
        assert!(matches!(
            parse_stage("-5s:10"),
            Err(SchedulerInvariantError::NegativeDuration { .. })
        ));
        assert!(matches!(
            parse_stage("5s:-10"),
            Err(SchedulerInvariantError::NegativeTarget { .. })
        ));
        assert!(matches!(
            parse_stage("5s"),
            Err(SchedulerInvariantError::Malformed { .. })
        ));
        assert!(matches!(
            parse_stage("soon:10"),
            Err(SchedulerInvariantError::Malformed { .. })
        ));
    }

    #[test]
    fn overflowing_total_duration_is_rejected() {
        let stage = parse_stage("400000000000y:10").unwrap();

        assert_eq!(
            SchedulerInvariantError::TooLong,
            StageSequence::new(vec![stage, stage]).unwrap_err()
        );
        assert!(StageSequence::new(vec![stage]).is_ok());
    }

    proptest! {
        #[test]
        fn target_stays_between_stage_endpoints(
            stages in prop::collection::vec((1u64..120_000, 0usize..2000), 1..6),
            probe in 0u64..1_000_000,
        ) {
            let stages = StageSequence::new(
                stages
                    .into_iter()
                    .map(|(ms, target)| Stage::new(Duration::from_millis(ms), target))
                    .collect(),
            )
            .unwrap();

            let elapsed = Duration::from_millis(probe % (stages.total_duration().as_millis() as u64 + 1));
            let target = stages.target_at(elapsed);

            match stages.stage_at(elapsed) {
                Some(index) => {
                    let from = if index == 0 { 0 } else { stages.stages()[index - 1].target };
                    let to = stages.stages()[index].target;
                    prop_assert!(target >= from.min(to) && target <= from.max(to));
                }
                None => prop_assert_eq!(stages.final_target(), target),
            }
        }

        #[test]
        fn target_is_monotonic_within_a_stage(
            from in 0usize..5000,
            to in 0usize..5000,
            duration_ms in 1u64..100_000,
            a in 0u64..100_000,
            b in 0u64..100_000,
        ) {
            let stages = StageSequence::new(vec![
                Stage::new(Duration::ZERO, from),
                Stage::new(Duration::from_millis(duration_ms), to),
            ])
            .unwrap();

            let (early, late) = (a.min(b) % duration_ms, a.max(b) % duration_ms);
            let (early, late) = (early.min(late), early.max(late));
            let early_target = stages.target_at(Duration::from_millis(early));
            let late_target = stages.target_at(Duration::from_millis(late));

            if to >= from {
                prop_assert!(early_target <= late_target);
            } else {
                prop_assert!(early_target >= late_target);
            }
        }
    }
}
