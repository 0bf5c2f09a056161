//! Actuation Sequencer: grade-specific timed step sequences for the diverter,
//! the pusher and the conveyor.
//!
//! A sequence is a list of steps, each applying one actuator command and then
//! holding for a duration. `tick()` advances through every step whose hold
//! has elapsed, so the control loop can keep servicing connectivity while a
//! sequence runs. `execute()` is the blocking form over the same steps.
//!
//! Actuators are driven to rest on abort, on any actuator error and when the
//! sequencer is dropped mid-sequence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use grader_traits::{Clock, MonotonicClock, Motor, Servo};

use crate::SharedClock;
use crate::config::ActuationCfg;
use crate::error::GraderError;
use crate::hw_error::map_boxed;
use crate::types::Grade;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Diverter(u8),
    Pusher(u8),
    ConveyorRun,
    ConveyorStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuationStep {
    pub action: Action,
    pub hold: Duration,
}

impl ActuationStep {
    const fn new(action: Action, hold: Duration) -> Self {
        Self { action, hold }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Running,
    Completed(Grade),
}

#[derive(Debug)]
struct Active {
    grade: Grade,
    steps: Vec<ActuationStep>,
    idx: usize,
    entered: Instant,
}

pub struct ActuationSequencer<D: Servo, P: Servo, M: Motor> {
    diverter: D,
    pusher: P,
    conveyor: M,
    cfg: ActuationCfg,
    clock: SharedClock,
    active: Option<Active>,
    completed: u64,
    faults: u64,
}

impl<D: Servo, P: Servo, M: Motor> ActuationSequencer<D, P, M> {
    pub fn new(diverter: D, pusher: P, conveyor: M, cfg: ActuationCfg) -> Self {
        Self {
            diverter,
            pusher,
            conveyor,
            cfg,
            clock: Arc::new(MonotonicClock::new()),
            active: None,
            completed: 0,
            faults: 0,
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn cfg(&self) -> &ActuationCfg {
        &self.cfg
    }

    /// Steps for `grade`. Every plan ends with all actuators at rest.
    pub fn plan(&self, grade: Grade) -> Vec<ActuationStep> {
        let c = &self.cfg;
        let push = [
            ActuationStep::new(Action::Pusher(c.pusher_engaged_deg), c.push_dwell),
            ActuationStep::new(Action::Pusher(c.pusher_rest_deg), c.servo_settle),
        ];
        let divert_and_convey = |deg: u8, run: Duration| {
            let mut steps = vec![ActuationStep::new(Action::Diverter(deg), c.servo_settle)];
            steps.extend(push);
            steps.extend([
                ActuationStep::new(Action::ConveyorRun, run),
                ActuationStep::new(Action::ConveyorStop, Duration::ZERO),
                ActuationStep::new(Action::Diverter(c.diverter_rest_deg), c.servo_settle),
            ]);
            steps
        };
        match grade {
            Grade::A => {
                let mut steps = push.to_vec();
                steps.extend([
                    ActuationStep::new(Action::ConveyorRun, c.conveyor_a),
                    ActuationStep::new(Action::ConveyorStop, Duration::ZERO),
                ]);
                steps
            }
            Grade::B => divert_and_convey(c.diverter_b_deg, c.conveyor_b),
            Grade::C => divert_and_convey(c.diverter_c_deg, c.conveyor_c),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_grade(&self) -> Option<Grade> {
        self.active.as_ref().map(|a| a.grade)
    }

    /// Time left in the current step.
    pub fn remaining(&self) -> Option<Duration> {
        let a = self.active.as_ref()?;
        let held = self.clock.now().saturating_duration_since(a.entered);
        Some(a.steps[a.idx].hold.saturating_sub(held))
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    pub fn faults(&self) -> u64 {
        self.faults
    }

    /// Begin the sequence for `grade` and apply its first step.
    pub fn start(&mut self, grade: Grade) -> Result<(), GraderError> {
        if let Some(a) = &self.active {
            return Err(GraderError::State(format!(
                "sequence for grade {} still running",
                a.grade
            )));
        }
        let steps = self.plan(grade);
        let first = steps[0].action;
        tracing::info!(%grade, steps = steps.len(), "actuation started");
        self.active = Some(Active {
            grade,
            steps,
            idx: 0,
            entered: self.clock.now(),
        });
        if let Err(e) = self.apply(first) {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Apply the next step once the current one has been held long enough.
    ///
    /// Holds are measured from when a step was applied, so a late tick delays
    /// the rest of the sequence but never shortens a later hold. Zero-hold
    /// steps chain within one tick.
    pub fn tick(&mut self) -> Result<TickOutcome, GraderError> {
        let now = self.clock.now();
        loop {
            let Some(a) = self.active.as_mut() else {
                return Ok(TickOutcome::Idle);
            };
            let step = a.steps[a.idx];
            if now.saturating_duration_since(a.entered) < step.hold {
                return Ok(TickOutcome::Running);
            }
            a.idx += 1;
            a.entered = now;
            if a.idx == a.steps.len() {
                let grade = a.grade;
                self.active = None;
                self.completed += 1;
                tracing::info!(%grade, "actuation complete");
                return Ok(TickOutcome::Completed(grade));
            }
            let next = a.steps[a.idx].action;
            if let Err(e) = self.apply(next) {
                return Err(self.fail(e));
            }
        }
    }

    /// Run the whole sequence for `grade`, sleeping on the clock between steps.
    pub fn execute(&mut self, grade: Grade) -> Result<(), GraderError> {
        self.start(grade)?;
        loop {
            match self.tick()? {
                TickOutcome::Completed(_) | TickOutcome::Idle => return Ok(()),
                TickOutcome::Running => {
                    let wait = self.remaining().unwrap_or(self.cfg.tick);
                    self.clock.sleep(wait.max(Duration::from_millis(1)));
                }
            }
        }
    }

    /// Stop the running sequence, if any, and rest every actuator.
    pub fn abort(&mut self) -> Result<(), GraderError> {
        let Some(a) = self.active.take() else {
            return Ok(());
        };
        tracing::warn!(grade = %a.grade, step = a.idx, "actuation aborted");
        self.rest_all()
    }

    /// Drive every actuator to rest. Attempts all three; returns the first error.
    pub fn rest_all(&mut self) -> Result<(), GraderError> {
        let d = self
            .diverter
            .set_angle(self.cfg.diverter_rest_deg)
            .map_err(|e| map_boxed(&e));
        let p = self
            .pusher
            .set_angle(self.cfg.pusher_rest_deg)
            .map_err(|e| map_boxed(&e));
        let m = self.conveyor.stop().map_err(|e| map_boxed(&e));
        d.and(p).and(m)
    }

    fn apply(&mut self, action: Action) -> Result<(), GraderError> {
        tracing::debug!(?action, "actuation step");
        match action {
            Action::Diverter(deg) => self.diverter.set_angle(deg),
            Action::Pusher(deg) => self.pusher.set_angle(deg),
            Action::ConveyorRun => self.conveyor.run(),
            Action::ConveyorStop => self.conveyor.stop(),
        }
        .map_err(|e| map_boxed(&e))
    }

    fn fail(&mut self, e: GraderError) -> GraderError {
        self.faults += 1;
        let grade = self.active.take().map(|a| a.grade);
        tracing::error!(error = %e, grade = ?grade, "actuation fault; resting actuators");
        if let Err(rest) = self.rest_all() {
            tracing::error!(error = %rest, "failed to rest actuators");
        }
        e
    }
}

impl<D: Servo, P: Servo, M: Motor> Drop for ActuationSequencer<D, P, M> {
    fn drop(&mut self) {
        if self.active.is_some() {
            let _ = self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grader_hardware::{SimulatedConveyor, SimulatedServo};
    use grader_traits::clock::test_clock::TestClock;

    type Seq = ActuationSequencer<SimulatedServo, SimulatedServo, SimulatedConveyor>;

    fn rig() -> (
        Seq,
        grader_hardware::SimServoHandle,
        grader_hardware::SimServoHandle,
        grader_hardware::SimConveyorHandle,
        Arc<TestClock>,
    ) {
        let d = SimulatedServo::new();
        let p = SimulatedServo::new();
        let m = SimulatedConveyor::new();
        let (dh, ph, mh) = (d.handle(), p.handle(), m.handle());
        let clock = Arc::new(TestClock::new());
        let s = ActuationSequencer::new(d, p, m, ActuationCfg::default()).with_clock(clock.clone());
        (s, dh, ph, mh, clock)
    }

    #[test]
    fn conveyor_time_shrinks_with_grade() {
        let (s, ..) = rig();
        let run = |g| {
            s.plan(g)
                .iter()
                .find(|st| st.action == Action::ConveyorRun)
                .map(|st| st.hold)
                .unwrap()
        };
        assert!(run(Grade::A) > run(Grade::B));
        assert!(run(Grade::B) > run(Grade::C));
    }

    #[test]
    fn grade_a_never_moves_diverter() {
        let (mut s, dh, ph, mh, clock) = rig();
        s.execute(Grade::A).unwrap();
        assert!(dh.angles().is_empty());
        assert_eq!(ph.angles(), vec![90, 0]);
        assert_eq!(mh.starts(), 1);
        assert!(!mh.is_running());
        assert_eq!(clock.elapsed(), Duration::from_millis(500 + 300 + 3_000));
    }

    #[test]
    fn grade_c_diverts_then_returns() {
        let (mut s, dh, ph, mh, _) = rig();
        s.execute(Grade::C).unwrap();
        assert_eq!(dh.angles(), vec![135, 90]);
        assert_eq!(ph.angles(), vec![90, 0]);
        assert!(!mh.is_running());
        assert_eq!(s.completed(), 1);
    }

    #[test]
    fn ticks_advance_only_after_hold() {
        let (mut s, dh, _, mh, clock) = rig();
        s.start(Grade::B).unwrap();
        assert_eq!(dh.last_angle(), Some(45));
        assert_eq!(s.tick().unwrap(), TickOutcome::Running);
        clock.advance(Duration::from_millis(300 + 500 + 300));
        // late tick: the settle is done and the pusher engages now, its dwell
        // starting from this tick
        s.tick().unwrap();
        s.tick().unwrap();
        clock.advance(Duration::from_millis(500));
        s.tick().unwrap();
        clock.advance(Duration::from_millis(300));
        s.tick().unwrap();
        assert!(mh.is_running());
        assert!(s.is_busy());
        clock.advance(Duration::from_millis(2_000));
        s.tick().unwrap();
        assert!(!mh.is_running());
        clock.advance(Duration::from_millis(300));
        assert_eq!(s.tick().unwrap(), TickOutcome::Completed(Grade::B));
        assert_eq!(s.tick().unwrap(), TickOutcome::Idle);
    }

    #[test]
    fn late_tick_does_not_shorten_push_dwell() {
        let (mut s, _, ph, _, clock) = rig();
        s.start(Grade::A).unwrap();
        assert_eq!(ph.angles(), vec![90]);

        clock.advance(Duration::from_millis(5_000));
        assert_eq!(s.tick().unwrap(), TickOutcome::Running);
        assert_eq!(ph.angles(), vec![90, 0]);
        assert_eq!(s.remaining(), Some(Duration::from_millis(300)));

        clock.advance(Duration::from_millis(299));
        assert_eq!(s.tick().unwrap(), TickOutcome::Running);
        clock.advance(Duration::from_millis(1));
        assert_eq!(s.tick().unwrap(), TickOutcome::Running);
        assert_eq!(s.remaining(), Some(Duration::from_millis(3_000)));
    }

    #[test]
    fn second_start_is_rejected() {
        let (mut s, ..) = rig();
        s.start(Grade::A).unwrap();
        assert!(matches!(s.start(Grade::C), Err(GraderError::State(_))));
    }

    #[test]
    fn fault_rests_everything() {
        let (mut s, dh, ph, mh, clock) = rig();
        s.start(Grade::C).unwrap();
        ph.set_failing(true);
        clock.advance(Duration::from_millis(300));
        assert!(s.tick().is_err());
        assert!(!s.is_busy());
        assert_eq!(dh.last_angle(), Some(90));
        assert!(!mh.is_running());
        assert_eq!(s.faults(), 1);
    }

    #[test]
    fn drop_mid_sequence_rests_actuators() {
        let (mut s, dh, ph, mh, clock) = rig();
        s.start(Grade::B).unwrap();
        for ms in [300, 500, 300] {
            clock.advance(Duration::from_millis(ms));
            s.tick().unwrap();
        }
        assert!(mh.is_running());
        drop(s);
        assert!(!mh.is_running());
        assert_eq!(dh.last_angle(), Some(90));
        assert_eq!(ph.last_angle(), Some(0));
    }
}
