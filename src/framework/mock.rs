//! # Mock Backends
//!
//! Scripted in-memory implementations of every capability trait, for testing the
//! orchestrator without any real transport.
//!
//! Each mock keeps one script per operation. Expectations are queued with a fluent
//! builder and consumed in order; when the queue is empty the mock falls back to a
//! happy-path answer.
//!
//! # Example
//! ```ignore
//! let mocks = MockBackends::new();
//! mocks.arm.expect_state().always().return_ok(ArmState::Down);
//! mocks.database.expect_lookup().times(2).hang();
//!
//! let system = CommLayer::from_parts(config, mocks.backends(), mocks.registry(), sink);
//! // drive orders...
//! assert_eq!(mocks.arm.state_calls(), 5);
//! ```

use crate::framework::error::{StepError, TransportError};
use crate::framework::transport::{
    AlertNotifier, AudioPlayer, Backends, CustomerDirectory, DisplayScreen, MenuControl, RobotArm,
    ServingUnits, Transport, TransportKind,
};
use crate::lifecycle::TransportRegistry;
use crate::model::{
    ArmState, ComponentAlert, CustomerInfo, CustomerRecord, DeliveryReport, Order, ServingUnitInfo,
    SoundCue, WorkDeadlines, WorkRequest, WorkResult,
};
use crate::orchestrator::{DeadLetterRecord, DeadLetterSink};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

#[derive(Clone)]
enum Reply<T> {
    Value(Result<T, StepError>),
    /// Never answers. Only a timeout gets the caller out.
    Hang,
}

struct Expectation<T> {
    reply: Reply<T>,
    /// `None` repeats forever.
    remaining: Option<usize>,
}

/// Queue of scripted answers for one operation, plus a call counter.
pub struct Script<T> {
    expectations: Mutex<VecDeque<Expectation<T>>>,
    calls: AtomicUsize,
}

impl<T: Clone> Script<T> {
    fn new() -> Self {
        Self {
            expectations: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    fn push(&self, reply: Reply<T>, remaining: Option<usize>) {
        self.expectations.lock().push_back(Expectation { reply, remaining });
    }

    /// Records a call and takes the next scripted reply, if any.
    fn next(&self) -> Option<Reply<T>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut queue = self.expectations.lock();
        let (reply, exhausted) = {
            let front = queue.front_mut()?;
            let exhausted = match &mut front.remaining {
                None => false,
                Some(n) => {
                    *n -= 1;
                    *n == 0
                }
            };
            (front.reply.clone(), exhausted)
        };
        if exhausted {
            queue.pop_front();
        }
        Some(reply)
    }

    /// Finite expectations not consumed yet.
    fn outstanding(&self) -> usize {
        self.expectations
            .lock()
            .iter()
            .filter(|e| e.remaining.is_some())
            .count()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Answers the current call, using `default` when nothing is scripted.
    async fn answer(&self, default: impl FnOnce() -> Result<T, StepError>) -> Result<T, StepError> {
        resolve(self.next(), default).await
    }
}

async fn resolve<T>(
    reply: Option<Reply<T>>,
    default: impl FnOnce() -> Result<T, StepError>,
) -> Result<T, StepError> {
    match reply {
        None => default(),
        Some(Reply::Value(value)) => value,
        Some(Reply::Hang) => std::future::pending().await,
    }
}

/// Builder for one scripted expectation. Defaults to a single use.
pub struct ExpectationBuilder<'a, T: Clone> {
    script: &'a Script<T>,
    remaining: Option<usize>,
}

impl<'a, T: Clone> ExpectationBuilder<'a, T> {
    fn new(script: &'a Script<T>) -> Self {
        Self {
            script,
            remaining: Some(1),
        }
    }

    /// Applies the reply to the next `n` calls.
    pub fn times(mut self, n: usize) -> Self {
        self.remaining = Some(n.max(1));
        self
    }

    /// Applies the reply to every remaining call. Later expectations are never reached.
    pub fn always(mut self) -> Self {
        self.remaining = None;
        self
    }

    /// Sets the expectation to return a successful result.
    pub fn return_ok(self, value: T) {
        self.script.push(Reply::Value(Ok(value)), self.remaining);
    }

    /// Sets the expectation to return an error.
    pub fn return_err(self, error: impl Into<StepError>) {
        self.script.push(Reply::Value(Err(error.into())), self.remaining);
    }

    /// Sets the expectation to never answer.
    pub fn hang(self) {
        self.script.push(Reply::Hang, self.remaining);
    }
}

fn mock_failure(what: &str) -> StepError {
    StepError::from(TransportError::remote("mock", format!("scripted {what} failure")))
}

// =============================================================================
// DATABASE
// =============================================================================

/// Customer directory and menu control.
pub struct MockDatabase {
    lookup: Script<CustomerRecord>,
    disable: Script<Vec<String>>,
    health: Script<bool>,
    disabled: Mutex<Vec<Vec<String>>>,
    hold: Mutex<Option<Arc<Semaphore>>>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self {
            lookup: Script::new(),
            disable: Script::new(),
            health: Script::new(),
            disabled: Mutex::new(Vec::new()),
            hold: Mutex::new(None),
        }
    }

    /// Expects a customer lookup. Unscripted lookups answer `"Test Customer"`.
    pub fn expect_lookup(&self) -> ExpectationBuilder<'_, CustomerRecord> {
        ExpectationBuilder::new(&self.lookup)
    }

    /// Expects a menu-disable call. Unscripted calls echo the components back.
    pub fn expect_disable(&self) -> ExpectationBuilder<'_, Vec<String>> {
        ExpectationBuilder::new(&self.disable)
    }

    pub fn expect_health(&self) -> ExpectationBuilder<'_, bool> {
        ExpectationBuilder::new(&self.health)
    }

    /// Makes every lookup wait for a permit of `gate` before answering.
    pub fn hold_lookups(&self, gate: Arc<Semaphore>) {
        *self.hold.lock() = Some(gate);
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup.calls()
    }

    pub fn disable_calls(&self) -> usize {
        self.disable.calls()
    }

    /// Component lists passed to every disable attempt.
    pub fn disabled(&self) -> Vec<Vec<String>> {
        self.disabled.lock().clone()
    }
}

impl Default for MockDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CustomerDirectory for MockDatabase {
    async fn lookup_customer(&self, order_id: &str) -> Result<CustomerRecord, StepError> {
        let reply = self.lookup.next();
        let gate = self.hold.lock().clone();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await;
        }
        resolve(reply, || Ok(CustomerRecord::new(order_id, "Test Customer"))).await
    }
}

#[async_trait]
impl MenuControl for MockDatabase {
    async fn disable_menu_items(&self, components: &[String]) -> Result<Vec<String>, StepError> {
        self.disabled.lock().push(components.to_vec());
        self.disable.answer(|| Ok(components.to_vec())).await
    }
}

// =============================================================================
// ROBOT ARM
// =============================================================================

pub struct MockRobotArm {
    state: Script<ArmState>,
    dispatch: Script<WorkResult>,
    health: Script<bool>,
    dispatched: Mutex<Vec<String>>,
}

impl MockRobotArm {
    pub fn new() -> Self {
        Self {
            state: Script::new(),
            dispatch: Script::new(),
            health: Script::new(),
            dispatched: Mutex::new(Vec::new()),
        }
    }

    /// Expects a state query. Unscripted queries report [`ArmState::Up`].
    pub fn expect_state(&self) -> ExpectationBuilder<'_, ArmState> {
        ExpectationBuilder::new(&self.state)
    }

    /// Expects a work dispatch. Unscripted dispatches complete successfully.
    pub fn expect_dispatch(&self) -> ExpectationBuilder<'_, WorkResult> {
        ExpectationBuilder::new(&self.dispatch)
    }

    pub fn expect_health(&self) -> ExpectationBuilder<'_, bool> {
        ExpectationBuilder::new(&self.health)
    }

    pub fn state_calls(&self) -> usize {
        self.state.calls()
    }

    pub fn dispatch_calls(&self) -> usize {
        self.dispatch.calls()
    }

    /// Order ids of every dispatch attempt.
    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().clone()
    }
}

impl Default for MockRobotArm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RobotArm for MockRobotArm {
    async fn query_state(&self) -> Result<ArmState, StepError> {
        self.state.answer(|| Ok(ArmState::Up)).await
    }

    async fn dispatch_work(
        &self,
        request: &WorkRequest,
        _deadlines: WorkDeadlines,
    ) -> Result<WorkResult, StepError> {
        self.dispatched.lock().push(request.order_id.clone());
        self.dispatch
            .answer(|| {
                Ok(WorkResult {
                    order_id: request.order_id.clone(),
                    success: true,
                    completed_at: chrono::Utc::now(),
                    details: serde_json::json!({ "items": request.items.len() }),
                })
            })
            .await
    }
}

// =============================================================================
// SERVING UNITS
// =============================================================================

pub struct MockServingUnits {
    open: Script<()>,
    health: Script<bool>,
    units: Mutex<Option<Vec<String>>>,
    failing: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<String>>,
}

impl MockServingUnits {
    pub fn new() -> Self {
        Self {
            open: Script::new(),
            health: Script::new(),
            units: Mutex::new(None),
            failing: Mutex::new(HashSet::new()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Overrides unit derivation with a fixed list.
    pub fn with_units(&self, units: &[&str]) {
        *self.units.lock() = Some(units.iter().map(|u| u.to_string()).collect());
    }

    /// Makes every attempt to open `unit_id` fail.
    pub fn fail_unit(&self, unit_id: &str) {
        self.failing.lock().insert(unit_id.to_string());
    }

    /// Expects an open call on any unit that is not marked failing.
    pub fn expect_open(&self) -> ExpectationBuilder<'_, ()> {
        ExpectationBuilder::new(&self.open)
    }

    pub fn expect_health(&self) -> ExpectationBuilder<'_, bool> {
        ExpectationBuilder::new(&self.health)
    }

    /// How many times `unit_id` was asked to open.
    pub fn attempts(&self, unit_id: &str) -> usize {
        self.attempts.lock().iter().filter(|u| *u == unit_id).count()
    }
}

impl Default for MockServingUnits {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServingUnits for MockServingUnits {
    fn units_for(&self, order: &Order) -> Vec<String> {
        match &*self.units.lock() {
            Some(units) => units.clone(),
            None => (0..order.items.len()).map(|i| format!("unit_{i}")).collect(),
        }
    }

    async fn open_unit(&self, unit_id: &str) -> Result<(), StepError> {
        self.attempts.lock().push(unit_id.to_string());
        if self.failing.lock().contains(unit_id) {
            return Err(mock_failure("open_unit"));
        }
        self.open.answer(|| Ok(())).await
    }
}

// =============================================================================
// SCREEN, AUDIO, NOTIFIER
// =============================================================================

pub struct MockScreen {
    publish: Script<()>,
    health: Script<bool>,
    customers: Mutex<Vec<CustomerInfo>>,
    units: Mutex<Vec<(String, Vec<ServingUnitInfo>)>>,
}

impl MockScreen {
    pub fn new() -> Self {
        Self {
            publish: Script::new(),
            health: Script::new(),
            customers: Mutex::new(Vec::new()),
            units: Mutex::new(Vec::new()),
        }
    }

    /// Expects a publish on either topic.
    pub fn expect_publish(&self) -> ExpectationBuilder<'_, ()> {
        ExpectationBuilder::new(&self.publish)
    }

    pub fn expect_health(&self) -> ExpectationBuilder<'_, bool> {
        ExpectationBuilder::new(&self.health)
    }

    pub fn customer_infos(&self) -> Vec<CustomerInfo> {
        self.customers.lock().clone()
    }

    pub fn unit_infos(&self) -> Vec<(String, Vec<ServingUnitInfo>)> {
        self.units.lock().clone()
    }
}

impl Default for MockScreen {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DisplayScreen for MockScreen {
    async fn publish_customer_info(&self, info: &CustomerInfo) -> Result<(), StepError> {
        self.publish.answer(|| Ok(())).await?;
        self.customers.lock().push(info.clone());
        Ok(())
    }

    async fn publish_serving_units(
        &self,
        order_id: &str,
        units: &[ServingUnitInfo],
    ) -> Result<(), StepError> {
        self.publish.answer(|| Ok(())).await?;
        self.units.lock().push((order_id.to_string(), units.to_vec()));
        Ok(())
    }
}

pub struct MockAudio {
    play: Script<()>,
    health: Script<bool>,
    played: Mutex<Vec<SoundCue>>,
}

impl MockAudio {
    pub fn new() -> Self {
        Self {
            play: Script::new(),
            health: Script::new(),
            played: Mutex::new(Vec::new()),
        }
    }

    pub fn expect_play(&self) -> ExpectationBuilder<'_, ()> {
        ExpectationBuilder::new(&self.play)
    }

    pub fn expect_health(&self) -> ExpectationBuilder<'_, bool> {
        ExpectationBuilder::new(&self.health)
    }

    /// Every cue requested, including failed attempts.
    pub fn played(&self) -> Vec<SoundCue> {
        self.played.lock().clone()
    }
}

impl Default for MockAudio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioPlayer for MockAudio {
    async fn play(&self, cue: SoundCue) -> Result<(), StepError> {
        self.played.lock().push(cue);
        self.play.answer(|| Ok(())).await
    }
}

/// A failure alert as received by [`MockNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentFailureAlert {
    pub system: String,
    pub error: String,
    pub order_id: Option<String>,
}

pub struct MockNotifier {
    send: Script<DeliveryReport>,
    health: Script<bool>,
    failures: Mutex<Vec<SentFailureAlert>>,
    components: Mutex<Vec<ComponentAlert>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            send: Script::new(),
            health: Script::new(),
            failures: Mutex::new(Vec::new()),
            components: Mutex::new(Vec::new()),
        }
    }

    /// Expects a send of either alert kind. Unscripted sends deliver to one recipient.
    pub fn expect_send(&self) -> ExpectationBuilder<'_, DeliveryReport> {
        ExpectationBuilder::new(&self.send)
    }

    pub fn expect_health(&self) -> ExpectationBuilder<'_, bool> {
        ExpectationBuilder::new(&self.health)
    }

    pub fn failure_alerts(&self) -> Vec<SentFailureAlert> {
        self.failures.lock().clone()
    }

    pub fn component_alerts(&self) -> Vec<ComponentAlert> {
        self.components.lock().clone()
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

fn delivered_once() -> Result<DeliveryReport, StepError> {
    Ok(DeliveryReport {
        delivered: 1,
        failed: Vec::new(),
    })
}

#[async_trait]
impl AlertNotifier for MockNotifier {
    async fn send_failure_alert(
        &self,
        system: &str,
        error: &str,
        order_id: Option<&str>,
    ) -> Result<DeliveryReport, StepError> {
        self.failures.lock().push(SentFailureAlert {
            system: system.to_string(),
            error: error.to_string(),
            order_id: order_id.map(str::to_string),
        });
        self.send.answer(delivered_once).await
    }

    async fn send_component_alert(
        &self,
        alert: &ComponentAlert,
    ) -> Result<DeliveryReport, StepError> {
        self.components.lock().push(alert.clone());
        self.send.answer(delivered_once).await
    }
}

// =============================================================================
// TRANSPORT CONTRACT
// =============================================================================

macro_rules! mock_transport {
    ($mock:ty, $name:literal, $kind:expr) => {
        #[async_trait]
        impl Transport for $mock {
            fn name(&self) -> &str {
                $name
            }

            fn kind(&self) -> TransportKind {
                $kind
            }

            async fn initialize(&self) -> Result<(), TransportError> {
                Ok(())
            }

            async fn shutdown(&self) {}

            async fn health_check(&self) -> Result<bool, TransportError> {
                match self.health.answer(|| Ok(true)).await {
                    Ok(healthy) => Ok(healthy),
                    Err(StepError::Transport(e)) => Err(e),
                    Err(other) => Err(TransportError::remote($name, other)),
                }
            }
        }
    };
}

mock_transport!(MockDatabase, "database", TransportKind::HttpClient);
mock_transport!(MockRobotArm, "robot_arm", TransportKind::PubSub);
mock_transport!(MockServingUnits, "serving_units", TransportKind::ServiceCall);
mock_transport!(MockScreen, "screen", TransportKind::PubSub);
mock_transport!(MockAudio, "sound", TransportKind::LocalOs);
mock_transport!(MockNotifier, "notifier", TransportKind::Sms);

// =============================================================================
// DEAD LETTERS
// =============================================================================

/// Dead-letter sink that keeps every record in memory.
#[derive(Default)]
pub struct MemoryDeadLetterSink {
    records: Mutex<Vec<DeadLetterRecord>>,
}

impl MemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DeadLetterRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetterSink {
    async fn emit(&self, record: DeadLetterRecord) {
        self.records.lock().push(record);
    }
}

// =============================================================================
// FULL BACKEND SET
// =============================================================================

/// One mock per backend, wired both as capabilities and as registered transports.
#[derive(Clone)]
pub struct MockBackends {
    pub database: Arc<MockDatabase>,
    pub arm: Arc<MockRobotArm>,
    pub units: Arc<MockServingUnits>,
    pub screen: Arc<MockScreen>,
    pub audio: Arc<MockAudio>,
    pub notifier: Arc<MockNotifier>,
}

impl MockBackends {
    pub fn new() -> Self {
        Self {
            database: Arc::new(MockDatabase::new()),
            arm: Arc::new(MockRobotArm::new()),
            units: Arc::new(MockServingUnits::new()),
            screen: Arc::new(MockScreen::new()),
            audio: Arc::new(MockAudio::new()),
            notifier: Arc::new(MockNotifier::new()),
        }
    }

    pub fn backends(&self) -> Backends {
        Backends {
            customers: self.database.clone(),
            menu: self.database.clone(),
            arm: self.arm.clone(),
            units: self.units.clone(),
            screen: self.screen.clone(),
            audio: self.audio.clone(),
            notifier: self.notifier.clone(),
        }
    }

    pub fn registry(&self) -> TransportRegistry {
        let mut registry = TransportRegistry::new();
        registry.register(self.database.clone());
        registry.register(self.arm.clone());
        registry.register(self.units.clone());
        registry.register(self.screen.clone());
        registry.register(self.audio.clone());
        registry.register(self.notifier.clone());
        registry
    }

    /// Verifies that all finite expectations were met.
    pub fn verify(&self) {
        let outstanding = self.database.lookup.outstanding()
            + self.database.disable.outstanding()
            + self.arm.state.outstanding()
            + self.arm.dispatch.outstanding()
            + self.units.open.outstanding()
            + self.screen.publish.outstanding()
            + self.audio.play.outstanding()
            + self.notifier.send.outstanding();
        if outstanding != 0 {
            panic!("Not all expectations were met. {outstanding} remaining");
        }
    }
}

impl Default for MockBackends {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn scripted_replies_are_consumed_in_order() {
        let db = MockDatabase::new();
        db.expect_lookup()
            .return_err(TransportError::unavailable("database", "connection refused"));
        db.expect_lookup().return_ok(CustomerRecord::new("o1", "Ada"));

        assert!(db.lookup_customer("o1").await.is_err());
        assert_eq!(db.lookup_customer("o1").await.unwrap().customer_name, "Ada");
        // Queue drained: happy-path fallback.
        assert_eq!(
            db.lookup_customer("o2").await.unwrap().customer_name,
            "Test Customer"
        );
        assert_eq!(db.lookup_calls(), 3);
    }

    #[tokio::test]
    async fn always_repeats_forever() {
        let arm = MockRobotArm::new();
        arm.expect_state().always().return_ok(ArmState::Down);
        for _ in 0..4 {
            assert_eq!(arm.query_state().await.unwrap(), ArmState::Down);
        }
        assert_eq!(arm.state_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn hang_never_answers() {
        let arm = MockRobotArm::new();
        arm.expect_state().hang();
        let result = tokio::time::timeout(Duration::from_secs(1), arm.query_state()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn failing_units_fail_every_attempt() {
        let units = MockServingUnits::new();
        units.fail_unit("B");
        assert!(units.open_unit("A").await.is_ok());
        assert!(units.open_unit("B").await.is_err());
        assert!(units.open_unit("B").await.is_err());
        assert_eq!(units.attempts("B"), 2);
    }

    #[test]
    #[should_panic(expected = "Not all expectations were met")]
    fn verify_reports_unused_expectations() {
        let mocks = MockBackends::new();
        mocks.audio.expect_play().times(2).return_ok(());
        mocks.verify();
    }
}
