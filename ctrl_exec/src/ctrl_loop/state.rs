//! Control loop state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use comms_if::msg::{
    control::{ControlMsg, MultiArray, SolveTimeMsg},
    Header,
};
use log::{error, info, warn};
use nalgebra::DVector;
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// Internal
use super::*;
use crate::{
    mpc::{Mpc, Optimizer},
    params::CtrlParams,
    plan::{HorizonPlan, Planner},
    traj_buffer::TrajectoryBuffer,
};
use util::{
    archive::{ArchiveError, Archived, Archiver},
    logger::Throttle,
    module::State,
    session,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Session relative path the horizon plan is saved to.
const PLAN_SAVE_PATH: &str = "plan/horizon_plan.json";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The receding horizon control loop.
pub struct CtrlLoop<P, O, S> {
    params: CtrlParams,

    /// Executing mode
    mode: CtrlMode,

    planner: P,

    /// Optimizer waiting to be handed to the MPC once the plan exists.
    optimizer: Option<O>,

    mpc: Option<Mpc<O>>,

    /// State measured when planning, used as the initial state of the first solve.
    planning_state: Option<DVector<f64>>,

    sink: S,

    cell: Arc<SensorCell>,
    gate: Arc<ProceedGate>,
    shutdown: ShutdownSignal,

    archiver: Option<Archiver>,
    last_record: Option<CycleRecord>,

    report: LoopReport,

    consec_solve_failures: u32,

    /// Throttle for the notices logged while waiting.
    wait_notice: Throttle,

    /// Throttle for stale sample warnings.
    stale_notice: Throttle,
}

/// Counters accumulated over the run of the loop.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct LoopReport {
    /// Number of steady state cycles.
    pub num_cycles: u64,

    pub num_published: u64,
    pub num_solve_failures: u64,
    pub num_stale_samples: u64,
    pub num_overruns: u64,

    /// Cursor after the last successful step.
    pub cursor: usize,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<P, O, S> CtrlLoop<P, O, S>
where
    P: Planner,
    O: Optimizer,
    S: ControlSink,
{
    pub fn new(
        params: CtrlParams,
        planner: P,
        optimizer: O,
        sink: S,
        cell: Arc<SensorCell>,
        gate: Arc<ProceedGate>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let notice_period = Duration::from_secs_f64(params.wait_notice_period_s);

        Self {
            params,
            mode: CtrlMode::AwaitingInput,
            planner,
            optimizer: Some(optimizer),
            mpc: None,
            planning_state: None,
            sink,
            cell,
            gate,
            shutdown,
            archiver: None,
            last_record: None,
            report: LoopReport::default(),
            consec_solve_failures: 0,
            wait_notice: Throttle::new(notice_period),
            stale_notice: Throttle::new(notice_period),
        }
    }

    /// Write a record of every steady state cycle into the given archive.
    pub fn with_archiver(mut self, archiver: Archiver) -> Self {
        self.archiver = Some(archiver);
        self
    }

    pub fn mode(&self) -> CtrlMode {
        self.mode
    }

    pub fn report(&self) -> &LoopReport {
        &self.report
    }

    pub fn mpc(&self) -> Option<&Mpc<O>> {
        self.mpc.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run the loop until shutdown or a fatal error.
    pub fn run(&mut self) -> Result<LoopReport, CtrlLoopError> {
        let period = Duration::from_secs_f64(self.params.loop_period_s);

        info!("Control loop started");

        while self.mode != CtrlMode::Shutdown {
            let cycle_start = Instant::now();
            let mode = self.mode;

            if let Err(e) = self.proc() {
                error!("Control loop stopped in mode {:?}: {}", mode, e);
                self.mode = CtrlMode::Shutdown;
                return Err(e);
            }

            // Planning and the first solve move straight on, the gate wait is its own sleep
            match mode {
                CtrlMode::AwaitingInput => self.sleep_to_period(cycle_start, period, false),
                CtrlMode::SteadyState => self.sleep_to_period(cycle_start, period, true),
                _ => (),
            }
        }

        info!(
            "Control loop stopped after {} cycles ({} commands published, {} solve failures, \
             {} stale samples, {} overruns)",
            self.report.num_cycles,
            self.report.num_published,
            self.report.num_solve_failures,
            self.report.num_stale_samples,
            self.report.num_overruns
        );

        Ok(self.report)
    }

    /// Execute one iteration of the loop in the current mode, without sleeping.
    ///
    /// Returns the mode for the next iteration.
    pub fn proc(&mut self) -> Result<CtrlMode, CtrlLoopError> {
        if self.shutdown.is_triggered() && self.mode != CtrlMode::Shutdown {
            info!("Shutdown requested in mode {:?}", self.mode);
            self.mode = CtrlMode::Shutdown;
        }

        if self.mode != CtrlMode::Shutdown && self.cell.is_source_lost() {
            return Err(CtrlLoopError::SensorSourceLost);
        }

        let next = match self.mode {
            CtrlMode::AwaitingInput => self.mode_awaiting_input(),
            CtrlMode::Planning => self.mode_planning(),
            CtrlMode::SolvingFirst => self.mode_solving_first(),
            CtrlMode::AwaitingProceed => self.mode_awaiting_proceed(),
            CtrlMode::SteadyState => self.mode_steady_state(),
            CtrlMode::Shutdown => Ok(CtrlMode::Shutdown),
        }?;

        if next != self.mode {
            info!("Mode change: {:?} -> {:?}", self.mode, next);

            // Notices in the new mode are printed straight away
            self.wait_notice = Throttle::new(Duration::from_secs_f64(
                self.params.wait_notice_period_s,
            ));
        }
        self.mode = next;

        Ok(next)
    }

    fn mode_awaiting_input(&mut self) -> Result<CtrlMode, CtrlLoopError> {
        if self.cell.is_ready() {
            return Ok(CtrlMode::Planning);
        }

        if self.wait_notice.ready() {
            if let InputLatch::AwaitingInput { sensor, reference } = self.cell.latch() {
                info!(
                    "Waiting for input (sensor received: {}, reference received: {})",
                    sensor, reference
                );
            }
        }

        Ok(CtrlMode::AwaitingInput)
    }

    fn mode_planning(&mut self) -> Result<CtrlMode, CtrlLoopError> {
        let optimizer = self.optimizer.take().ok_or(CtrlLoopError::AlreadyPlanned)?;

        let sample = self.read_sample()?;
        let x0 = self.state_of(&sample)?;
        let q_init = x0.rows(0, self.params.robot.nq).into_owned();
        let q_goal = DVector::from_column_slice(&self.params.goal_configuration);

        info!(
            "Planning from {:?} to {:?}",
            q_init.as_slice(),
            q_goal.as_slice()
        );

        let points = self
            .planner
            .plan(&q_init, &q_goal)
            .map_err(CtrlLoopError::PlanningFailure)?;

        // Stage the points and build the plan from those valid for every attribute
        let mut points = points.into_iter();
        let mut buffer = TrajectoryBuffer::new();
        buffer.initialize(
            points
                .next()
                .ok_or(CtrlLoopError::PlanError(crate::plan::PlanError::Empty))?,
        );
        for point in points {
            buffer
                .add_trajectory_point(point)
                .map_err(CtrlLoopError::BufferError)?;
        }

        let plan = HorizonPlan::from_buffer(&mut buffer, self.params.time_step_s)
            .map_err(CtrlLoopError::PlanError)?;

        if !buffer.is_empty() {
            warn!(
                "{} planned points after the first incomplete one were dropped",
                buffer.len()
            );
        }
        info!(
            "Horizon plan built: {} points over {:.2} s",
            plan.len(),
            (plan.len() - 1) as f64 * plan.dt()
        );

        session::save(PLAN_SAVE_PATH, plan.clone());

        self.mpc = Some(Mpc::new(optimizer, plan, self.params.horizon_size));
        self.planning_state = Some(x0);

        Ok(CtrlMode::SolvingFirst)
    }

    fn mode_solving_first(&mut self) -> Result<CtrlMode, CtrlLoopError> {
        // The plan starts from this state, so the first solve must too
        let x0 = match self.planning_state.take() {
            Some(x0) => x0,
            None => {
                let sample = self.read_sample()?;
                self.state_of(&sample)?
            }
        };

        self.mpc
            .as_mut()
            .ok_or(CtrlLoopError::MpcError(crate::mpc::MpcError::NotInitialised))?
            .init(x0)
            .map_err(CtrlLoopError::FirstSolveFailure)?;

        Ok(CtrlMode::AwaitingProceed)
    }

    fn mode_awaiting_proceed(&mut self) -> Result<CtrlMode, CtrlLoopError> {
        let timeout = Duration::from_secs_f64(self.params.loop_period_s);

        match self.gate.wait(&self.shutdown, timeout) {
            GateStatus::Open => Ok(CtrlMode::SteadyState),
            GateStatus::Shutdown => Ok(CtrlMode::Shutdown),
            GateStatus::TimedOut => {
                if self.wait_notice.ready() {
                    info!("First solve done, waiting for the signal to proceed");
                }
                Ok(CtrlMode::AwaitingProceed)
            }
        }
    }

    fn mode_steady_state(&mut self) -> Result<CtrlMode, CtrlLoopError> {
        self.report.num_cycles += 1;

        let mut record = CycleRecord {
            elapsed_s: session::get_elapsed_seconds(),
            cycle: self.report.num_cycles,
            cursor: self.report.cursor,
            solve_duration_s: std::f64::NAN,
            published: false,
            stale: false,
            solve_failed: false,
        };

        // Copy the sample out so the lock is not held while solving
        let sample = self.read_sample()?;

        if let Some(max_age_s) = self.params.max_sensor_age_s {
            let age_s = sample.received.elapsed().as_secs_f64();
            if age_s > max_age_s {
                self.report.num_stale_samples += 1;
                record.stale = true;

                if self.stale_notice.ready() {
                    warn!(
                        "Latest sensor sample is {:.3} s old (limit {:.3} s), skipping cycle",
                        age_s, max_age_s
                    );
                }

                return self.end_cycle(record);
            }
        }

        let x0 = self.state_of(&sample)?;

        let mpc = self
            .mpc
            .as_mut()
            .ok_or(CtrlLoopError::MpcError(crate::mpc::MpcError::NotInitialised))?;

        let solve_start = Instant::now();
        let result = mpc.proc(&x0);
        let solve_duration_s = solve_start.elapsed().as_secs_f64();

        record.solve_duration_s = solve_duration_s;

        match result {
            Ok((output, mpc_report)) => {
                self.consec_solve_failures = 0;
                self.report.cursor = mpc_report.cursor;
                record.cursor = mpc_report.cursor;

                let gain = &output.feedback_gain;
                let control = ControlMsg {
                    header: Header::now(),
                    feedback_gain: MultiArray::matrix(
                        gain.nrows(),
                        gain.ncols(),
                        gain.transpose().as_slice().to_vec(),
                    )
                    .map_err(CtrlLoopError::MessageError)?,
                    feedforward: MultiArray::vector(output.command.as_slice().to_vec()),
                    initial_state: sample.msg,
                };

                record.published = self.publish_control(&control);
                self.publish_solve_time(solve_duration_s);
            }
            Err(crate::mpc::MpcError::SolveFailure(e)) => {
                self.report.num_solve_failures += 1;
                record.solve_failed = true;

                self.publish_solve_time(solve_duration_s);
                self.handle_solve_failure(e)?;
            }
            Err(e) => return Err(CtrlLoopError::MpcError(e)),
        }

        self.end_cycle(record)
    }

    /// Apply the solve failure policy to a failed steady state solve.
    fn handle_solve_failure(&mut self, e: SolveError) -> Result<(), CtrlLoopError> {
        match self.params.solve_failure_policy {
            SolveFailurePolicy::Abort => Err(CtrlLoopError::SolveFailure(e)),
            SolveFailurePolicy::HoldLastCommand => {
                self.consec_solve_failures += 1;

                if self.consec_solve_failures > self.params.max_consec_solve_failures {
                    return Err(CtrlLoopError::TooManySolveFailures {
                        count: self.consec_solve_failures,
                        last: e,
                    });
                }

                warn!(
                    "Solve failed ({} consecutive), holding the last command: {}",
                    self.consec_solve_failures, e
                );
                Ok(())
            }
        }
    }

    /// Publish the control message, unless shutdown has been requested.
    ///
    /// Returns true if the message was published.
    fn publish_control(&mut self, control: &ControlMsg) -> bool {
        if self.shutdown.is_triggered() {
            return false;
        }

        match self.sink.publish_control(control) {
            Ok(()) => {
                self.report.num_published += 1;
                true
            }
            Err(e) => {
                warn!("Could not publish the control message: {}", e);
                false
            }
        }
    }

    /// Report the duration of this cycle's solve, successful or not.
    fn publish_solve_time(&mut self, solve_duration_s: f64) {
        if self.shutdown.is_triggered() {
            return;
        }

        let solve_time = SolveTimeMsg {
            header: Header::now(),
            duration_s: solve_duration_s,
        };
        if let Err(e) = self.sink.publish_solve_time(&solve_time) {
            warn!("Could not publish the solve time message: {}", e);
        }
    }

    fn end_cycle(&mut self, record: CycleRecord) -> Result<CtrlMode, CtrlLoopError> {
        self.last_record = Some(record);

        if let Err(e) = self.write() {
            warn!("Could not archive cycle {}: {}", record.cycle, e);
        }

        Ok(CtrlMode::SteadyState)
    }

    fn sleep_to_period(&mut self, cycle_start: Instant, period: Duration, count_overrun: bool) {
        let cycle_dur = cycle_start.elapsed();

        match period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None if count_overrun => {
                warn!(
                    "Cycle overran by {:.06} s",
                    cycle_dur.as_secs_f64() - period.as_secs_f64()
                );
                self.report.num_overruns += 1;
            }
            None => (),
        }
    }

    fn read_sample(&self) -> Result<SensorSample, CtrlLoopError> {
        self.cell
            .read()
            .ok_or(CtrlLoopError::NoSensorSample(self.mode))
    }

    /// State vector of a sample, checked against the robot's dimensions.
    fn state_of(&self, sample: &SensorSample) -> Result<DVector<f64>, CtrlLoopError> {
        let joint_state = &sample.msg.joint_state;
        let robot = &self.params.robot;

        for &(what, expected, found) in [
            ("positions", robot.nq, joint_state.position.len()),
            ("velocities", robot.nv, joint_state.velocity.len()),
        ]
        .iter()
        {
            if expected != found {
                return Err(CtrlLoopError::SensorDimension {
                    what,
                    expected,
                    found,
                });
            }
        }

        Ok(DVector::from_vec(sample.msg.state()))
    }
}

impl<P, O, S> Archived for CtrlLoop<P, O, S> {
    /// Write the record of the last cycle, if an archiver is attached.
    fn write(&mut self) -> Result<(), ArchiveError> {
        match (self.archiver.as_mut(), self.last_record) {
            (Some(archiver), Some(record)) => archiver.serialise(record),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        mpc::{OptimizerOutput, SolverWeights},
        plan::{JointSpacePlanner, PlanningError},
        robot_model::RobotModel,
        traj_buffer::TrajectoryPoint,
    };
    use comms_if::msg::sensor::SensorMsg;
    use nalgebra::DMatrix;
    use std::convert::Infallible;

    /// Sink which records every message and triggers shutdown after a number of commands.
    struct MockSink {
        controls: Vec<ControlMsg>,
        solve_times: Vec<SolveTimeMsg>,
        shutdown_after: usize,
        shutdown: ShutdownSignal,
    }

    impl ControlSink for MockSink {
        type Error = Infallible;

        fn publish_control(&mut self, msg: &ControlMsg) -> Result<(), Infallible> {
            self.controls.push(msg.clone());
            if self.controls.len() >= self.shutdown_after {
                self.shutdown.trigger();
            }
            Ok(())
        }

        fn publish_solve_time(&mut self, msg: &SolveTimeMsg) -> Result<(), Infallible> {
            self.solve_times.push(msg.clone());
            Ok(())
        }
    }

    /// Optimizer whose steps can be made to fail.
    struct MockOptimizer {
        fail_steps: bool,
    }

    impl Optimizer for MockOptimizer {
        fn first_solve(
            &mut self,
            _x_window: &DMatrix<f64>,
            _a_window: &DMatrix<f64>,
            x0: &DVector<f64>,
            _horizon_size: usize,
        ) -> Result<OptimizerOutput, SolveError> {
            Ok(Self::output(x0))
        }

        fn step(
            &mut self,
            x0: &DVector<f64>,
            _x_ref: &DVector<f64>,
            _a_ref: &DVector<f64>,
        ) -> Result<OptimizerOutput, SolveError> {
            if self.fail_steps {
                return Err(SolveError::NotConverged("mock failure".into()));
            }
            Ok(Self::output(x0))
        }
    }

    impl MockOptimizer {
        fn output(x0: &DVector<f64>) -> OptimizerOutput {
            let nv = x0.len() / 2;
            OptimizerOutput {
                state: x0.clone(),
                command: DVector::from_element(nv, 1.0),
                feedback_gain: DMatrix::from_fn(nv, 2 * nv, |r, c| (r * 10 + c) as f64),
            }
        }
    }

    struct FailingPlanner;

    impl Planner for FailingPlanner {
        fn plan(
            &mut self,
            _q_init: &DVector<f64>,
            _q_goal: &DVector<f64>,
        ) -> Result<Vec<TrajectoryPoint>, PlanningError> {
            Err(PlanningError::Failed("no path".into()))
        }
    }

    fn params() -> CtrlParams {
        CtrlParams {
            loop_period_s: 0.001,
            horizon_size: 5,
            time_step_s: 0.05,
            goal_configuration: vec![2.0, -2.0],
            solver_weights: SolverWeights {
                end_effector_pose: 1e4,
                state_regularisation: 1.0,
                control_regularisation: 1e-3,
                collision_avoidance: 0.0,
            },
            max_joint_vel_rads: 1.0,
            solve_failure_policy: SolveFailurePolicy::HoldLastCommand,
            max_consec_solve_failures: 2,
            max_sensor_age_s: None,
            auto_proceed: true,
            wait_notice_period_s: 1.0,
            robot: RobotModel {
                name: "test".into(),
                nq: 2,
                nv: 2,
                ee_frame_name: "tool".into(),
            },
        }
    }

    struct Fixture {
        cell: Arc<SensorCell>,
        gate: Arc<ProceedGate>,
        shutdown: ShutdownSignal,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                cell: Arc::new(SensorCell::new()),
                gate: Arc::new(ProceedGate::new()),
                shutdown: ShutdownSignal::new(),
            }
        }

        /// Latch both inputs and open the gate.
        fn ready(self) -> Self {
            self.cell.write_sensor(sensor_msg());
            self.cell.latch_reference();
            self.gate.open();
            self
        }

        fn sink(&self, shutdown_after: usize) -> MockSink {
            MockSink {
                controls: Vec::new(),
                solve_times: Vec::new(),
                shutdown_after,
                shutdown: self.shutdown.clone(),
            }
        }

        fn ctrl_loop<P: Planner, O: Optimizer>(
            &self,
            params: CtrlParams,
            planner: P,
            optimizer: O,
            shutdown_after: usize,
        ) -> CtrlLoop<P, O, MockSink> {
            CtrlLoop::new(
                params,
                planner,
                optimizer,
                self.sink(shutdown_after),
                self.cell.clone(),
                self.gate.clone(),
                self.shutdown.clone(),
            )
        }
    }

    fn sensor_msg() -> SensorMsg {
        SensorMsg::new(vec![0.0, 0.0], vec![0.0, 0.0])
    }

    fn planner() -> JointSpacePlanner {
        JointSpacePlanner::new(0.05, 1.0)
    }

    fn run_to_steady_state<P: Planner, O: Optimizer, S: ControlSink>(
        ctrl_loop: &mut CtrlLoop<P, O, S>,
    ) {
        for _ in 0..10 {
            if ctrl_loop.mode() == CtrlMode::SteadyState {
                return;
            }
            ctrl_loop.proc().unwrap();
        }
        panic!("Loop did not reach steady state");
    }

    #[test]
    fn test_run_publishes_until_shutdown() {
        let fixture = Fixture::new().ready();
        let mut ctrl_loop =
            fixture.ctrl_loop(params(), planner(), MockOptimizer { fail_steps: false }, 20);

        let report = ctrl_loop.run().unwrap();

        assert_eq!(ctrl_loop.mode(), CtrlMode::Shutdown);
        assert_eq!(report.num_published, 20);
        assert_eq!(report.num_cycles, 20);

        let sink = ctrl_loop.sink();
        assert_eq!(sink.controls.len(), 20);

        // No solve time is published once the sink has triggered shutdown
        assert_eq!(sink.solve_times.len(), 19);

        let control = &sink.controls[0];
        assert_eq!(control.feedback_gain.dims, vec![2, 4]);
        assert_eq!(control.feedback_gain.get(1, 3), Some(13.0));
        assert_eq!(control.feedforward.data, vec![1.0, 1.0]);
        assert_eq!(control.initial_state.joint_state, sensor_msg().joint_state);

        // The cursor starts after the first window and moves one row per cycle
        assert_eq!(report.cursor, 5 + 20);
    }

    #[test]
    fn test_real_optimizer_moves_towards_goal() {
        let fixture = Fixture::new().ready();
        let p = params();
        let optimizer =
            crate::mpc::DoubleIntegratorOptimizer::new(&p.solver_weights, 2, 2, p.time_step_s)
                .unwrap();
        let mut ctrl_loop = fixture.ctrl_loop(p, planner(), optimizer, 3);

        ctrl_loop.run().unwrap();

        // The goal is positive on the first joint and negative on the second
        let ff = &ctrl_loop.sink().controls[0].feedforward.data;
        assert!(ff[0] > 0.0);
        assert!(ff[1] < 0.0);
    }

    #[test]
    fn test_shutdown_while_awaiting_input() {
        let fixture = Fixture::new();
        let mut ctrl_loop =
            fixture.ctrl_loop(params(), planner(), MockOptimizer { fail_steps: false }, 1);

        let shutdown = fixture.shutdown.clone();
        let jh = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            shutdown.trigger();
        });

        let report = ctrl_loop.run().unwrap();
        jh.join().unwrap();

        assert!(ctrl_loop.mpc().is_none());
        assert_eq!(report.num_cycles, 0);
        assert!(ctrl_loop.sink().controls.is_empty());
    }

    #[test]
    fn test_shutdown_at_proceed_gate() {
        let fixture = Fixture::new();
        fixture.cell.write_sensor(sensor_msg());
        fixture.cell.latch_reference();

        let mut ctrl_loop =
            fixture.ctrl_loop(params(), planner(), MockOptimizer { fail_steps: false }, 1);

        let shutdown = fixture.shutdown.clone();
        let jh = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            shutdown.trigger();
        });

        ctrl_loop.run().unwrap();
        jh.join().unwrap();

        // The first solve was done but nothing was published
        assert_eq!(ctrl_loop.mpc().unwrap().cursor(), 5);
        assert!(ctrl_loop.sink().controls.is_empty());
        assert!(ctrl_loop.sink().solve_times.is_empty());
    }

    #[test]
    fn test_stale_sample_is_not_used() {
        let fixture = Fixture::new().ready();
        let mut p = params();
        p.max_sensor_age_s = Some(0.005);
        let mut ctrl_loop =
            fixture.ctrl_loop(p, planner(), MockOptimizer { fail_steps: false }, 100);

        run_to_steady_state(&mut ctrl_loop);

        thread::sleep(Duration::from_millis(20));
        ctrl_loop.proc().unwrap();
        assert_eq!(ctrl_loop.report().num_stale_samples, 1);
        assert!(ctrl_loop.sink().controls.is_empty());

        fixture.cell.write_sensor(sensor_msg());
        ctrl_loop.proc().unwrap();
        assert_eq!(ctrl_loop.report().num_published, 1);
    }

    #[test]
    fn test_hold_last_command_policy() {
        let fixture = Fixture::new().ready();
        let mut ctrl_loop =
            fixture.ctrl_loop(params(), planner(), MockOptimizer { fail_steps: true }, 100);

        run_to_steady_state(&mut ctrl_loop);
        let cursor = ctrl_loop.mpc().unwrap().cursor();

        // Two failures are tolerated without publishing, the third stops the loop
        assert_eq!(ctrl_loop.proc().unwrap(), CtrlMode::SteadyState);
        assert_eq!(ctrl_loop.proc().unwrap(), CtrlMode::SteadyState);

        // Failed solves still report how long they took
        assert!(ctrl_loop.sink().controls.is_empty());
        assert_eq!(ctrl_loop.sink().solve_times.len(), 2);
        assert!(ctrl_loop
            .sink()
            .solve_times
            .iter()
            .all(|t| t.duration_s >= 0.0));

        match ctrl_loop.proc() {
            Err(CtrlLoopError::TooManySolveFailures { count: 3, .. }) => (),
            r => panic!("Expected too many solve failures, got {:?}", r),
        }

        assert!(ctrl_loop.sink().controls.is_empty());
        assert_eq!(ctrl_loop.report().num_solve_failures, 3);
        assert_eq!(ctrl_loop.mpc().unwrap().cursor(), cursor);
    }

    #[test]
    fn test_abort_policy() {
        let fixture = Fixture::new().ready();
        let mut p = params();
        p.solve_failure_policy = SolveFailurePolicy::Abort;
        let mut ctrl_loop =
            fixture.ctrl_loop(p, planner(), MockOptimizer { fail_steps: true }, 100);

        match ctrl_loop.run() {
            Err(CtrlLoopError::SolveFailure(SolveError::NotConverged(_))) => (),
            r => panic!("Expected a solve failure, got {:?}", r),
        }
        assert_eq!(ctrl_loop.mode(), CtrlMode::Shutdown);
        assert!(ctrl_loop.sink().controls.is_empty());
    }

    #[test]
    fn test_planning_failure_is_fatal() {
        let fixture = Fixture::new().ready();
        let mut ctrl_loop =
            fixture.ctrl_loop(params(), FailingPlanner, MockOptimizer { fail_steps: false }, 1);

        match ctrl_loop.run() {
            Err(CtrlLoopError::PlanningFailure(PlanningError::Failed(_))) => (),
            r => panic!("Expected a planning failure, got {:?}", r),
        }
        assert!(ctrl_loop.mpc().is_none());
    }

    #[test]
    fn test_sensor_dimension_checked() {
        let fixture = Fixture::new();
        fixture
            .cell
            .write_sensor(SensorMsg::new(vec![0.0; 3], vec![0.0; 2]));
        fixture.cell.latch_reference();

        let mut ctrl_loop =
            fixture.ctrl_loop(params(), planner(), MockOptimizer { fail_steps: false }, 1);

        match ctrl_loop.run() {
            Err(CtrlLoopError::SensorDimension {
                expected: 2,
                found: 3,
                ..
            }) => (),
            r => panic!("Expected a sensor dimension error, got {:?}", r),
        }
    }

    #[test]
    fn test_cycle_archive() {
        let path = std::env::temp_dir().join(format!("ctrl_loop_arch_{}.csv", std::process::id()));

        let fixture = Fixture::new().ready();
        let mut ctrl_loop = fixture
            .ctrl_loop(params(), planner(), MockOptimizer { fail_steps: false }, 3)
            .with_archiver(Archiver::from_file_path(&path).unwrap());

        ctrl_loop.run().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let mut lines = contents.lines();
        assert_eq!(
            lines.next(),
            Some("elapsed_s,cycle,cursor,solve_duration_s,published,stale,solve_failed")
        );
        assert_eq!(lines.count(), 3);
    }

    #[test]
    fn test_first_solve_uses_planning_state() {
        let fixture = Fixture::new().ready();
        let mut ctrl_loop =
            fixture.ctrl_loop(params(), planner(), MockOptimizer { fail_steps: false }, 100);

        assert_eq!(ctrl_loop.proc().unwrap(), CtrlMode::Planning);
        assert_eq!(ctrl_loop.proc().unwrap(), CtrlMode::SolvingFirst);

        // A newer sample arriving between planning and the first solve is not used
        fixture
            .cell
            .write_sensor(SensorMsg::new(vec![1.0, 1.0], vec![0.5, 0.5]));
        assert_eq!(ctrl_loop.proc().unwrap(), CtrlMode::AwaitingProceed);

        let output = ctrl_loop.mpc().unwrap().get_output().unwrap();
        assert_eq!(output.state, DVector::zeros(4));
    }

    #[test]
    fn test_lost_sensor_source_is_fatal() {
        let fixture = Fixture::new().ready();
        let mut ctrl_loop =
            fixture.ctrl_loop(params(), planner(), MockOptimizer { fail_steps: false }, 100);

        run_to_steady_state(&mut ctrl_loop);
        ctrl_loop.proc().unwrap();
        assert_eq!(ctrl_loop.report().num_published, 1);

        fixture.cell.mark_source_lost();
        match ctrl_loop.run() {
            Err(CtrlLoopError::SensorSourceLost) => (),
            r => panic!("Expected the sensor source to be lost, got {:?}", r),
        }
        assert_eq!(ctrl_loop.mode(), CtrlMode::Shutdown);
        assert_eq!(ctrl_loop.report().num_published, 1);
    }

    #[test]
    fn test_lost_sensor_source_while_awaiting_input() {
        let fixture = Fixture::new();
        fixture.cell.mark_source_lost();

        let mut ctrl_loop =
            fixture.ctrl_loop(params(), planner(), MockOptimizer { fail_steps: false }, 1);

        match ctrl_loop.run() {
            Err(CtrlLoopError::SensorSourceLost) => (),
            r => panic!("Expected the sensor source to be lost, got {:?}", r),
        }
        assert!(ctrl_loop.mpc().is_none());
    }
}
