//! Integration Tests for the Detector Graph
//!
//! These tests verify ordering, delivery, lag, queue and timeout behaviour
//! of whole graphs built through the public API.

use std::cell::RefCell;
use std::rc::Rc;

use detector_graph_core::prelude::*;
use detector_graph_core::{GraphConfig, GraphInputQueue, TimeoutHandle};

type Log = Rc<RefCell<Vec<String>>>;

fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

// ---------------------------------------------------------------------------
// Topics
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
struct Reading(u32);

#[derive(Clone, Debug, PartialEq)]
struct Stage1(u32);

#[derive(Clone, Debug, PartialEq)]
struct Stage2(u32);

#[derive(Clone, Debug, PartialEq)]
struct Output(u32);

#[derive(Clone, Debug, PartialEq)]
struct LeftOut(u32);

#[derive(Clone, Debug, PartialEq)]
struct RightOut(u32);

#[derive(Clone, Debug, PartialEq)]
struct Joined(u32);

// ---------------------------------------------------------------------------
// Pipeline detectors
// ---------------------------------------------------------------------------

/// Reading -> Stage1
struct FirstStage {
    log: Log,
}

impl Detector for FirstStage {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring.subscribe::<Reading>()?.setup_publishing::<Stage1>()?;
        Ok(())
    }
}

impl Subscriber<Reading> for FirstStage {
    fn evaluate(&mut self, value: &Reading, ctx: &mut Context<'_, Self>) {
        self.log.borrow_mut().push("first".into());
        ctx.publish(Stage1(value.0 + 1));
    }
}

impl Publisher<Stage1> for FirstStage {}

/// Stage1 -> Stage2
struct SecondStage {
    log: Log,
}

impl Detector for SecondStage {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring.subscribe::<Stage1>()?.setup_publishing::<Stage2>()?;
        Ok(())
    }
}

impl Subscriber<Stage1> for SecondStage {
    fn evaluate(&mut self, value: &Stage1, ctx: &mut Context<'_, Self>) {
        self.log.borrow_mut().push("second".into());
        ctx.publish(Stage2(value.0 * 10));
    }
}

impl Publisher<Stage2> for SecondStage {}

/// Stage2 -> Output
struct ThirdStage {
    log: Log,
}

impl Detector for ThirdStage {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring.subscribe::<Stage2>()?.setup_publishing::<Output>()?;
        Ok(())
    }
}

impl Subscriber<Stage2> for ThirdStage {
    fn evaluate(&mut self, value: &Stage2, ctx: &mut Context<'_, Self>) {
        self.log.borrow_mut().push("third".into());
        ctx.publish(Output(value.0));
    }
}

impl Publisher<Output> for ThirdStage {}

/// Test that producers always run before consumers, whatever the
/// construction order.
#[test]
fn producers_run_before_consumers() {
    let log = new_log();
    let mut graph = Graph::new();

    // Built back to front.
    graph.add_detector(ThirdStage { log: log.clone() }).unwrap();
    graph.add_detector(SecondStage { log: log.clone() }).unwrap();
    graph.add_detector(FirstStage { log: log.clone() }).unwrap();

    graph.process_data(Reading(1)).unwrap();

    assert_eq!(entries(&log), vec!["first", "second", "third"]);
    assert_eq!(graph.topic::<Output>().unwrap().new_value(), Some(&Output(20)));
}

// ---------------------------------------------------------------------------
// Diamond
// ---------------------------------------------------------------------------

struct Left {
    log: Log,
}

impl Detector for Left {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring.subscribe::<Reading>()?.setup_publishing::<LeftOut>()?;
        Ok(())
    }
}

impl Subscriber<Reading> for Left {
    fn evaluate(&mut self, value: &Reading, ctx: &mut Context<'_, Self>) {
        self.log.borrow_mut().push("left".into());
        ctx.publish(LeftOut(value.0));
    }
}

impl Publisher<LeftOut> for Left {}

struct Right {
    log: Log,
}

impl Detector for Right {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring.subscribe::<Reading>()?.setup_publishing::<RightOut>()?;
        Ok(())
    }
}

impl Subscriber<Reading> for Right {
    fn evaluate(&mut self, value: &Reading, ctx: &mut Context<'_, Self>) {
        self.log.borrow_mut().push("right".into());
        ctx.publish(RightOut(value.0 * 2));
    }
}

impl Publisher<RightOut> for Right {}

struct Join {
    log: Log,
    left: u32,
    right: u32,
}

impl Detector for Join {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring
            .subscribe::<LeftOut>()?
            .subscribe::<RightOut>()?
            .setup_publishing::<Joined>()?;
        Ok(())
    }

    fn complete_evaluation(&mut self, ctx: &mut Context<'_, Self>) {
        self.log.borrow_mut().push("join complete".into());
        ctx.publish(Joined(self.left + self.right));
    }
}

impl Subscriber<LeftOut> for Join {
    fn evaluate(&mut self, value: &LeftOut, _ctx: &mut Context<'_, Self>) {
        self.log.borrow_mut().push("join left".into());
        self.left = value.0;
    }
}

impl Subscriber<RightOut> for Join {
    fn evaluate(&mut self, value: &RightOut, _ctx: &mut Context<'_, Self>) {
        self.log.borrow_mut().push("join right".into());
        self.right = value.0;
    }
}

impl Publisher<Joined> for Join {}

/// Test that a detector fed by two paths sees each topic once and
/// completes once per pass.
#[test]
fn diamond_delivers_each_topic_once() {
    let log = new_log();
    let mut graph = Graph::new();
    graph
        .add_detector(Join {
            log: log.clone(),
            left: 0,
            right: 0,
        })
        .unwrap();
    graph.add_detector(Left { log: log.clone() }).unwrap();
    graph.add_detector(Right { log: log.clone() }).unwrap();

    graph.process_data(Reading(3)).unwrap();

    assert_eq!(
        entries(&log),
        vec!["left", "right", "join left", "join right", "join complete"]
    );
    assert_eq!(graph.topic::<Joined>().unwrap().new_value(), Some(&Joined(9)));

    log.borrow_mut().clear();
    graph.process_data(Reading(1)).unwrap();
    assert_eq!(entries(&log).len(), 5);
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

struct Named {
    name: &'static str,
    log: Log,
}

impl Detector for Named {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring.subscribe::<Reading>()?;
        Ok(())
    }
}

impl Subscriber<Reading> for Named {
    fn evaluate(&mut self, value: &Reading, _ctx: &mut Context<'_, Self>) {
        self.log.borrow_mut().push(format!("{}:{}", self.name, value.0));
    }
}

fn run_named(names: &[&'static str], inputs: &[u32]) -> Vec<String> {
    let log = new_log();
    let mut graph = Graph::new();
    for &name in names {
        graph
            .add_detector(Named {
                name,
                log: log.clone(),
            })
            .unwrap();
    }
    for input in inputs {
        graph.process_data(Reading(*input)).unwrap();
    }
    entries(&log)
}

/// Test that independent detectors run in construction order and that
/// replaying inputs reproduces the same trace.
#[test]
fn independent_detectors_follow_construction_order() {
    assert_eq!(run_named(&["a", "b"], &[1]), vec!["a:1", "b:1"]);
    assert_eq!(run_named(&["b", "a"], &[1]), vec!["b:1", "a:1"]);

    let first = run_named(&["x", "y", "z"], &[1, 2, 3]);
    let second = run_named(&["x", "y", "z"], &[1, 2, 3]);
    assert_eq!(first, second);
    assert_eq!(first.len(), 9);
}

// ---------------------------------------------------------------------------
// Lag
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
struct Add(u32);

#[derive(Clone, Debug, PartialEq)]
struct Total(u32);

struct Accumulator {
    base: u32,
    pending: Option<u32>,
    log: Log,
}

impl Detector for Accumulator {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring
            .subscribe::<Add>()?
            .subscribe::<Lagged<Total>>()?
            .setup_publishing::<Total>()?;
        Ok(())
    }

    fn complete_evaluation(&mut self, ctx: &mut Context<'_, Self>) {
        if let Some(add) = self.pending.take() {
            ctx.publish(Total(self.base + add));
        }
    }
}

impl Subscriber<Add> for Accumulator {
    fn evaluate(&mut self, value: &Add, _ctx: &mut Context<'_, Self>) {
        self.pending = Some(self.pending.unwrap_or(0) + value.0);
    }
}

impl Subscriber<Lagged<Total>> for Accumulator {
    fn evaluate(&mut self, value: &Lagged<Total>, _ctx: &mut Context<'_, Self>) {
        self.log.borrow_mut().push(format!("lagged {}", value.data.0));
        self.base = value.data.0;
    }
}

impl Publisher<Total> for Accumulator {}

fn accumulator_graph(log: &Log) -> Graph {
    let mut graph = Graph::new();
    graph
        .add_detector(Accumulator {
            base: 0,
            pending: None,
            log: log.clone(),
        })
        .unwrap();
    graph.add_lag::<Total>().unwrap();
    graph
}

/// Test that a lagged value is absent on the first pass and carries the
/// previous pass's value afterwards.
#[test]
fn lag_delivers_previous_pass_value() {
    let log = new_log();
    let mut graph = accumulator_graph(&log);

    graph.push_data(Add(5)).unwrap();
    graph.push_data(Add(3)).unwrap();

    // Pass 1: nothing captured yet.
    assert!(graph.evaluate_graph().unwrap());
    assert_eq!(graph.topic::<Total>().unwrap().new_value(), Some(&Total(5)));
    assert!(graph.topic::<Lagged<Total>>().unwrap().current_value().is_none());

    // Pass 2: Lagged<Total> arrives together with the next input.
    assert!(graph.evaluate_graph().unwrap());
    assert_eq!(
        graph.topic::<Lagged<Total>>().unwrap().new_value(),
        Some(&Lagged::new(Total(5)))
    );
    assert_eq!(graph.topic::<Total>().unwrap().new_value(), Some(&Total(8)));

    // Pass 3: lag-only follow-up.
    assert!(graph.has_data_pending());
    assert!(graph.evaluate_graph().unwrap());
    assert!(!graph.topic::<Total>().unwrap().has_new_value());
    assert!(!graph.has_data_pending());
    assert!(!graph.evaluate_graph().unwrap());

    assert_eq!(entries(&log), vec!["lagged 5", "lagged 8"]);
}

/// Test that process_data settles lag feedback before returning.
#[test]
fn process_data_runs_lag_follow_up() {
    let log = new_log();
    let mut graph = accumulator_graph(&log);

    assert_eq!(graph.process_data(Add(2)).unwrap(), 2);
    assert_eq!(graph.process_data(Add(4)).unwrap(), 2);
    assert_eq!(graph.topic::<Total>().unwrap().current_value(), Some(&Total(6)));
    assert_eq!(entries(&log), vec!["lagged 2", "lagged 6"]);
}

#[derive(Clone)]
struct Start;

#[derive(Clone)]
struct Ping(u32);

struct Pinger {
    limit: u32,
}

impl Detector for Pinger {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring
            .subscribe::<Start>()?
            .subscribe::<Lagged<Ping>>()?
            .setup_publishing::<Ping>()?;
        Ok(())
    }
}

impl Subscriber<Start> for Pinger {
    fn evaluate(&mut self, _value: &Start, ctx: &mut Context<'_, Self>) {
        ctx.publish(Ping(1));
    }
}

impl Subscriber<Lagged<Ping>> for Pinger {
    fn evaluate(&mut self, value: &Lagged<Ping>, ctx: &mut Context<'_, Self>) {
        if value.data.0 < self.limit {
            ctx.publish(Ping(value.data.0 + 1));
        }
    }
}

impl Publisher<Ping> for Pinger {}

fn ping_graph(limit: u32, max_feedback_passes: usize) -> Graph {
    let config = GraphConfig::default().with_max_feedback_passes(max_feedback_passes);
    let mut graph = Graph::with_config(config);
    graph.add_detector(Pinger { limit }).unwrap();
    graph.add_lag::<Ping>().unwrap();
    graph
}

/// Test that bounded lag feedback settles on its own.
#[test]
fn converging_feedback_settles() {
    let mut graph = ping_graph(3, 8);
    // One input pass plus three lag passes.
    assert_eq!(graph.process_data(Start).unwrap(), 4);
    assert_eq!(
        graph.topic::<Lagged<Ping>>().unwrap().new_value().map(|l| l.data.0),
        Some(3)
    );
}

/// Test that endless lag feedback is cut off.
#[test]
fn endless_feedback_hits_the_limit() {
    let mut graph = ping_graph(u32::MAX, 3);
    let err = graph.process_data(Start).unwrap_err();

    assert!(matches!(err, GraphError::FeedbackLimit { passes: 3 }));
    assert_eq!(graph.pass_count(), 4);
    assert!(!graph.has_data_pending());
}

// ---------------------------------------------------------------------------
// Input queue
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Job(u32);

#[derive(Clone)]
struct Retry(u32);

struct JobRunner {
    log: Log,
}

impl Detector for JobRunner {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring
            .subscribe::<Job>()?
            .subscribe::<Retry>()?
            .setup_future_publishing::<Retry>()?;
        Ok(())
    }
}

impl Subscriber<Job> for JobRunner {
    fn evaluate(&mut self, value: &Job, ctx: &mut Context<'_, Self>) {
        self.log.borrow_mut().push(format!("job {}", value.0));
        ctx.publish_on_future_evaluation(Retry(value.0));
    }
}

impl Subscriber<Retry> for JobRunner {
    fn evaluate(&mut self, value: &Retry, _ctx: &mut Context<'_, Self>) {
        self.log.borrow_mut().push(format!("retry {}", value.0));
    }
}

impl FuturePublisher<Retry> for JobRunner {}

/// Test that future publishes queue behind inputs already waiting.
#[test]
fn future_publishes_wait_their_turn() {
    let log = new_log();
    let mut graph = Graph::new();
    graph.add_detector(JobRunner { log: log.clone() }).unwrap();

    graph.push_data(Job(1)).unwrap();
    graph.push_data(Job(2)).unwrap();
    assert_eq!(graph.evaluate_pending().unwrap(), 4);

    assert_eq!(entries(&log), vec!["job 1", "job 2", "retry 1", "retry 2"]);
}

#[derive(Clone)]
struct Countdown(u32);

struct Resubmitter {
    queue: GraphInputQueue,
    log: Log,
}

impl Detector for Resubmitter {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring.subscribe::<Countdown>()?;
        Ok(())
    }
}

impl Subscriber<Countdown> for Resubmitter {
    fn evaluate(&mut self, value: &Countdown, _ctx: &mut Context<'_, Self>) {
        self.log.borrow_mut().push(format!(
            "{} evaluating={} queued={}",
            value.0,
            self.queue.is_evaluating(),
            self.queue.len()
        ));
        if value.0 > 0 {
            self.queue.submit(Countdown(value.0 - 1)).unwrap();
        }
    }
}

/// Test that input submitted from inside a pass is deferred to its own pass.
#[test]
fn submissions_during_a_pass_are_deferred() {
    let log = new_log();
    let mut graph = Graph::new();
    let queue = graph.input_queue();
    graph
        .add_detector(Resubmitter {
            queue,
            log: log.clone(),
        })
        .unwrap();

    assert_eq!(graph.process_data(Countdown(2)).unwrap(), 3);
    assert_eq!(
        entries(&log),
        vec![
            "2 evaluating=true queued=0",
            "1 evaluating=true queued=0",
            "0 evaluating=true queued=0",
        ]
    );
    assert!(!graph.input_queue().is_evaluating());
}

/// Test that a bounded queue rejects input past its capacity.
#[test]
fn bounded_queue_rejects_overflow() {
    let mut graph = Graph::with_config(GraphConfig::default().with_max_pending_inputs(1));
    graph.resolve_topic::<Reading>().unwrap();

    graph.push_data(Reading(1)).unwrap();
    let err = graph.push_data(Reading(2)).unwrap_err();
    assert!(matches!(err, GraphError::InputQueueFull { capacity: 1 }));
    assert_eq!(graph.evaluate_pending().unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Wiring errors
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Pong(u32);

struct Echo;

impl Detector for Echo {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring.subscribe::<Pong>()?.setup_publishing::<Pong>()?;
        Ok(())
    }
}

impl Subscriber<Pong> for Echo {
    fn evaluate(&mut self, value: &Pong, ctx: &mut Context<'_, Self>) {
        ctx.publish(value.clone());
    }
}

impl Publisher<Pong> for Echo {}

/// Test that a detector cannot feed its own input within a pass.
#[test]
fn self_subscription_is_rejected() {
    let mut graph = Graph::new();
    let err = graph.add_detector(Echo).unwrap_err();

    assert!(matches!(err, WiringError::SelfSubscription { ref detector, ref topic }
        if detector == "Echo" && topic == "Pong"));
    assert_eq!(graph.detector_count(), 0);
    assert!(graph.registry().topic_info(graph.registry().topic_id::<Pong>().unwrap())
        .unwrap()
        .subscribers()
        .is_empty());
}

/// Ping -> Pong
struct Forward;

impl Detector for Forward {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring.subscribe::<Ping>()?.setup_publishing::<Pong>()?;
        Ok(())
    }
}

impl Subscriber<Ping> for Forward {
    fn evaluate(&mut self, value: &Ping, ctx: &mut Context<'_, Self>) {
        ctx.publish(Pong(value.0));
    }
}

impl Publisher<Pong> for Forward {}

/// Pong -> Ping
struct Backward;

impl Detector for Backward {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring.subscribe::<Pong>()?.setup_publishing::<Ping>()?;
        Ok(())
    }
}

impl Subscriber<Pong> for Backward {
    fn evaluate(&mut self, value: &Pong, ctx: &mut Context<'_, Self>) {
        ctx.publish(Ping(value.0));
    }
}

impl Publisher<Ping> for Backward {}

/// Lagged<Pong> -> Ping
struct LaggedBackward;

impl Detector for LaggedBackward {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring
            .subscribe::<Lagged<Pong>>()?
            .setup_publishing::<Ping>()?;
        Ok(())
    }
}

impl Subscriber<Lagged<Pong>> for LaggedBackward {
    fn evaluate(&mut self, value: &Lagged<Pong>, ctx: &mut Context<'_, Self>) {
        if value.data.0 > 0 {
            ctx.publish(Ping(value.data.0 - 1));
        }
    }
}

impl Publisher<Ping> for LaggedBackward {}

/// Test that an unbroken cycle fails at seal time, naming its vertices.
#[test]
fn unbroken_cycle_fails_to_seal() {
    let mut graph = Graph::new();
    graph.add_detector(Forward).unwrap();
    graph.add_detector(Backward).unwrap();

    let err = graph.seal().unwrap_err();
    let WiringError::Cycle { vertices } = err else {
        panic!("expected a cycle error");
    };
    assert_eq!(vertices, vec!["Forward", "Ping", "Pong", "Backward"]);
    assert!(!graph.is_sealed());

    assert!(matches!(
        graph.evaluate_graph(),
        Err(GraphError::Wiring(WiringError::Cycle { .. }))
    ));
}

/// Test that the same loop closed through a lag is accepted and runs.
#[test]
fn cycle_through_lag_is_accepted() {
    let mut graph = Graph::new();
    graph.add_detector(Forward).unwrap();
    graph.add_detector(LaggedBackward).unwrap();
    graph.add_lag::<Pong>().unwrap();
    graph.seal().unwrap();

    // Ping(3) -> Pong(3) -> Lagged -> Ping(2) ... -> Pong(0)
    assert_eq!(graph.process_data(Ping(3)).unwrap(), 5);
    assert_eq!(
        graph.topic::<Pong>().unwrap().current_value().map(|p| p.0),
        Some(0)
    );
}

/// Test that wiring is frozen once the graph is sealed.
#[test]
fn sealed_graph_rejects_new_wiring() {
    let mut graph = Graph::new();
    graph.add_detector(Forward).unwrap();
    graph.process_data(Ping(1)).unwrap();

    assert!(graph.is_sealed());
    assert!(matches!(graph.add_detector(Backward), Err(WiringError::Sealed(_))));
    assert!(matches!(graph.resolve_topic::<Start>(), Err(WiringError::Sealed(_))));
    assert!(graph.resolve_topic::<Ping>().is_ok());
}

struct Sloppy;

impl Detector for Sloppy {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring.subscribe::<Reading>()?;
        Ok(())
    }
}

impl Subscriber<Reading> for Sloppy {
    fn evaluate(&mut self, value: &Reading, ctx: &mut Context<'_, Self>) {
        ctx.publish(Output(value.0));
    }
}

impl Publisher<Output> for Sloppy {}

/// Test that publishing a topic without wiring it is reported.
#[test]
fn undeclared_publish_is_reported() {
    let mut graph = Graph::new();
    graph.add_detector(Sloppy).unwrap();

    let err = graph.process_data(Reading(1)).unwrap_err();
    assert!(matches!(err, GraphError::UndeclaredPublish { ref detector, ref topic }
        if detector == "Sloppy" && topic == "Output"));
    assert!(!graph.input_queue().is_evaluating());
}

/// Test that values for unknown topics are rejected up front.
#[test]
fn unknown_topic_is_rejected() {
    let mut graph = Graph::new();
    graph.add_detector(Forward).unwrap();
    assert!(matches!(
        graph.push_data(Start),
        Err(GraphError::UnknownTopic { .. })
    ));
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct DoorOpened;

#[derive(Clone)]
struct DoorAlarm;

struct DoorMonitor {
    timeouts: TimeoutPublisherService,
    handle: Rc<RefCell<Option<TimeoutHandle>>>,
}

impl Detector for DoorMonitor {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring
            .subscribe::<DoorOpened>()?
            .setup_timeout_publishing::<DoorAlarm>()?;
        Ok(())
    }
}

impl Subscriber<DoorOpened> for DoorMonitor {
    fn evaluate(&mut self, _value: &DoorOpened, ctx: &mut Context<'_, Self>) {
        *self.handle.borrow_mut() = ctx.schedule_timeout(&self.timeouts, DoorAlarm, 5);
    }
}

impl TimeoutPublisher<DoorAlarm> for DoorMonitor {}

struct Siren {
    log: Log,
}

impl Detector for Siren {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring.subscribe::<DoorAlarm>()?;
        Ok(())
    }
}

impl Subscriber<DoorAlarm> for Siren {
    fn evaluate(&mut self, _value: &DoorAlarm, _ctx: &mut Context<'_, Self>) {
        self.log.borrow_mut().push("alarm".into());
    }
}

/// Test that a timeout fires once when due and is inert afterwards.
#[test]
fn timeout_fires_once_when_due() {
    let log = new_log();
    let handle = Rc::new(RefCell::new(None));
    let mut graph = Graph::new();
    let timeouts = TimeoutPublisherService::for_graph(&graph);
    graph
        .add_detector(DoorMonitor {
            timeouts: timeouts.clone(),
            handle: handle.clone(),
        })
        .unwrap();
    graph.add_detector(Siren { log: log.clone() }).unwrap();

    graph.process_data(DoorOpened).unwrap();
    let scheduled = handle.borrow().expect("timeout scheduled");

    for now in [0, 1, 4] {
        assert_eq!(timeouts.tick(now, &mut graph).unwrap(), 0);
    }
    assert!(entries(&log).is_empty());
    assert!(timeouts.is_pending(scheduled));

    assert_eq!(timeouts.tick(5, &mut graph).unwrap(), 1);
    assert_eq!(entries(&log), vec!["alarm"]);
    assert!(!timeouts.is_pending(scheduled));

    assert!(!timeouts.cancel(scheduled));
    assert_eq!(timeouts.tick(10, &mut graph).unwrap(), 0);
    assert_eq!(entries(&log), vec!["alarm"]);
}

/// Test that a cancelled timeout never reaches the graph.
#[test]
fn cancelled_timeout_stays_silent() {
    let log = new_log();
    let handle = Rc::new(RefCell::new(None));
    let mut graph = Graph::new();
    let timeouts = TimeoutPublisherService::for_graph(&graph);
    graph
        .add_detector(DoorMonitor {
            timeouts: timeouts.clone(),
            handle: handle.clone(),
        })
        .unwrap();
    graph.add_detector(Siren { log: log.clone() }).unwrap();

    graph.process_data(DoorOpened).unwrap();
    let scheduled = handle.borrow().expect("timeout scheduled");
    assert!(timeouts.cancel(scheduled));

    assert_eq!(timeouts.tick(20, &mut graph).unwrap(), 0);
    assert!(entries(&log).is_empty());
}

#[derive(Clone)]
struct StartPatrol;

struct Patrol {
    timeouts: TimeoutPublisherService,
    handle: Rc<RefCell<Option<TimeoutHandle>>>,
}

impl Detector for Patrol {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring
            .subscribe::<StartPatrol>()?
            .setup_timeout_publishing::<DoorAlarm>()?;
        Ok(())
    }
}

impl Subscriber<StartPatrol> for Patrol {
    fn evaluate(&mut self, _value: &StartPatrol, ctx: &mut Context<'_, Self>) {
        *self.handle.borrow_mut() = ctx.schedule_periodic(&self.timeouts, DoorAlarm, 3);
    }
}

impl TimeoutPublisher<DoorAlarm> for Patrol {}

/// Test that periodic timeouts keep feeding the graph until cancelled.
#[test]
fn periodic_timeout_repeats() {
    let log = new_log();
    let handle = Rc::new(RefCell::new(None));
    let mut graph = Graph::new();
    let timeouts = TimeoutPublisherService::for_graph(&graph);
    graph
        .add_detector(Patrol {
            timeouts: timeouts.clone(),
            handle: handle.clone(),
        })
        .unwrap();
    graph.add_detector(Siren { log: log.clone() }).unwrap();

    graph.process_data(StartPatrol).unwrap();
    for now in 1..=9 {
        timeouts.tick(now, &mut graph).unwrap();
    }
    assert_eq!(entries(&log).len(), 3);

    let scheduled = handle.borrow().expect("periodic timeout scheduled");
    assert!(timeouts.cancel(scheduled));
    timeouts.tick(12, &mut graph).unwrap();
    assert_eq!(entries(&log).len(), 3);
}

/// Schedules a timeout it never declared.
struct Prankster {
    timeouts: TimeoutPublisherService,
}

impl Detector for Prankster {
    fn wire(wiring: &mut Wiring<'_, Self>) -> Result<(), WiringError> {
        wiring.subscribe::<DoorOpened>()?;
        Ok(())
    }
}

impl Subscriber<DoorOpened> for Prankster {
    fn evaluate(&mut self, _value: &DoorOpened, ctx: &mut Context<'_, Self>) {
        assert!(ctx.schedule_timeout(&self.timeouts, DoorAlarm, 1).is_none());
    }
}

impl TimeoutPublisher<DoorAlarm> for Prankster {}

/// Test that a timeout without `setup_timeout_publishing` is rejected and
/// never reaches the graph.
#[test]
fn undeclared_timeout_is_rejected() {
    let log = new_log();
    let mut graph = Graph::new();
    let timeouts = TimeoutPublisherService::for_graph(&graph);
    graph
        .add_detector(Prankster {
            timeouts: timeouts.clone(),
        })
        .unwrap();
    graph.add_detector(Siren { log: log.clone() }).unwrap();

    let err = graph.process_data(DoorOpened).unwrap_err();
    assert!(matches!(
        err,
        GraphError::UndeclaredPublish { ref detector, ref topic }
            if detector == "Prankster" && topic == "DoorAlarm"
    ));
    assert_eq!(timeouts.pending_count(), 0);

    assert_eq!(timeouts.tick(5, &mut graph).unwrap(), 0);
    assert!(entries(&log).is_empty());
}
