use async_trait::async_trait;
use comm_layer::clients::{SmsNotifier, SmsProvider};
use comm_layer::config::AppConfig;
use comm_layer::framework::mock::{MemoryDeadLetterSink, MockBackends};
use comm_layer::framework::{StepError, TransportError};
use comm_layer::lifecycle::CommLayer;
use comm_layer::model::{
    AlertLevel, ArmState, CustomerRecord, OrderItem, OrderRequest, OrderStatus, SmsMessage,
    SoundCue,
};
use comm_layer::orchestrator::{OrderProcessingError, StepKind, ALERT_SOURCE};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

fn espresso() -> OrderItem {
    OrderItem {
        item_id: "coffee_001".into(),
        name: "Espresso".into(),
        quantity: 1,
        components: vec!["coffee_beans".into(), "water".into()],
    }
}

fn order(order_id: &str) -> OrderRequest {
    OrderRequest::new(order_id, vec![espresso()])
}

fn system(mocks: &MockBackends, config: AppConfig) -> (Arc<CommLayer>, Arc<MemoryDeadLetterSink>) {
    let sink = Arc::new(MemoryDeadLetterSink::new());
    let system = CommLayer::from_parts(config, mocks.backends(), mocks.registry(), sink.clone());
    (Arc::new(system), sink)
}

/// Waits (in real time) until `condition` holds.
async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn healthy_backends_complete_an_order() {
    let mocks = MockBackends::new();
    let (system, sink) = system(&mocks, AppConfig::default());

    let response = system.process_order(order("order_123")).await.expect("order should complete");

    assert_eq!(response.order_id, "order_123");
    assert_eq!(response.estimated_time, 40);
    assert_eq!(response.serving_unit_count, 1);
    assert_eq!(response.status, OrderStatus::Completed);
    assert!(!system.active_orders().contains("order_123"));

    let infos = mocks.screen.customer_infos();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].customer_name, "Test Customer");
    assert_eq!(infos[0].estimated_time, 40);
    assert_eq!(mocks.arm.dispatched(), vec!["order_123".to_string()]);
    assert_eq!(mocks.audio.played(), vec![SoundCue::OrderComplete]);
    assert!(mocks.notifier.failure_alerts().is_empty());
    assert!(sink.records().is_empty());
    mocks.verify();
}

#[tokio::test(start_paused = true)]
async fn arm_that_stays_down_fails_the_order_once() {
    let mocks = MockBackends::new();
    mocks.arm.expect_state().always().return_ok(ArmState::Down);
    let (system, sink) = system(&mocks, AppConfig::default());

    let err = system.process_order(order("order_456")).await.unwrap_err();

    assert!(matches!(
        err,
        OrderProcessingError::StepFailed {
            ref order_id,
            step: StepKind::CheckArmState,
            ..
        } if order_id == "order_456"
    ));
    assert_eq!(mocks.arm.state_calls(), 5);
    assert_eq!(mocks.arm.dispatch_calls(), 0);

    let alerts = mocks.notifier.failure_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].system, ALERT_SOURCE);
    assert_eq!(alerts[0].order_id.as_deref(), Some("order_456"));
    assert_eq!(mocks.audio.played(), vec![SoundCue::ErrorAlert]);

    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].order_id, "order_456");
    assert_eq!(records[0].retry_count, 0);
    assert!(!system.active_orders().contains("order_456"));
}

#[tokio::test(start_paused = true)]
async fn slow_lookup_is_retried_until_it_answers() {
    let mocks = MockBackends::new();
    mocks.database.expect_lookup().times(2).hang();
    mocks
        .database
        .expect_lookup()
        .return_ok(CustomerRecord::new("order_789", "Grace"));
    let (system, _sink) = system(&mocks, AppConfig::default());

    let response = system.process_order(order("order_789")).await.unwrap();

    assert_eq!(response.status, OrderStatus::Completed);
    assert_eq!(mocks.database.lookup_calls(), 3);
    assert_eq!(mocks.screen.customer_infos()[0].customer_name, "Grace");
    mocks.verify();
}

#[tokio::test(start_paused = true)]
async fn failed_order_without_dead_letters() {
    let mocks = MockBackends::new();
    mocks
        .database
        .expect_lookup()
        .always()
        .return_err(TransportError::unavailable("database", "connection refused"));
    let mut config = AppConfig::default();
    config.orchestrator.dead_letter.enabled = false;
    let (system, sink) = system(&mocks, config);

    let err = system.process_order(order("order_1")).await.unwrap_err();

    assert_eq!(err.step(), Some(StepKind::ResolveCustomer));
    assert_eq!(mocks.database.lookup_calls(), 3);
    assert_eq!(mocks.notifier.failure_alerts().len(), 1);
    assert!(sink.records().is_empty());
}

#[tokio::test]
async fn admission_gate_bounds_concurrent_orders() {
    let mocks = MockBackends::new();
    let release = Arc::new(Semaphore::new(0));
    mocks.database.hold_lookups(release.clone());
    let mut config = AppConfig::default();
    config.performance.max_concurrent_orders = 2;
    config.performance.order_timeout = Duration::from_millis(200);
    let (system, _sink) = system(&mocks, config);

    let first = tokio::spawn({
        let system = system.clone();
        async move { system.process_order(order("order_a")).await }
    });
    let second = tokio::spawn({
        let system = system.clone();
        async move { system.process_order(order("order_b")).await }
    });
    eventually(|| mocks.database.lookup_calls() == 2).await;
    assert_eq!(system.active_orders().len(), 2);

    let err = system.process_order(order("order_c")).await.unwrap_err();
    assert!(matches!(
        err,
        OrderProcessingError::AdmissionTimeout { ref order_id, .. } if order_id == "order_c"
    ));
    // Rejected before admission: no failure handling.
    assert!(mocks.notifier.failure_alerts().is_empty());

    release.add_permits(2);
    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert!(system.active_orders().is_empty());

    // Slots are free again.
    let response = system.process_order(order("order_c")).await.unwrap();
    assert_eq!(response.status, OrderStatus::Completed);
}

#[tokio::test]
async fn queued_order_is_admitted_when_a_slot_frees() {
    let mocks = MockBackends::new();
    let release = Arc::new(Semaphore::new(0));
    mocks.database.hold_lookups(release.clone());
    let mut config = AppConfig::default();
    config.performance.max_concurrent_orders = 2;
    config.performance.order_timeout = Duration::from_secs(30);
    let (system, _sink) = system(&mocks, config);

    let spawn_order = |order_id: &'static str| {
        let system = system.clone();
        tokio::spawn(async move { system.process_order(order(order_id)).await })
    };
    let first = spawn_order("order_a");
    let second = spawn_order("order_b");
    eventually(|| mocks.database.lookup_calls() == 2).await;

    let third = spawn_order("order_c");
    tokio::time::sleep(Duration::from_millis(100)).await;
    // Waiting at the gate: not admitted, no backend touched.
    assert!(!third.is_finished());
    assert!(!system.active_orders().contains("order_c"));
    assert_eq!(mocks.database.lookup_calls(), 2);

    release.add_permits(1);
    eventually(|| mocks.database.lookup_calls() == 3).await;
    release.add_permits(2);

    let response = third.await.unwrap().expect("queued order completes");
    assert_eq!(response.status, OrderStatus::Completed);
    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
    assert!(system.active_orders().is_empty());
}

#[tokio::test]
async fn abandoned_order_releases_its_id() {
    let mocks = MockBackends::new();
    let release = Arc::new(Semaphore::new(0));
    mocks.database.hold_lookups(release.clone());
    let (system, sink) = system(&mocks, AppConfig::default());

    let abandoned = tokio::spawn({
        let system = system.clone();
        async move { system.process_order(order("order_x")).await }
    });
    eventually(|| mocks.database.lookup_calls() == 1).await;
    assert!(system.active_orders().contains("order_x"));

    abandoned.abort();
    assert!(abandoned.await.unwrap_err().is_cancelled());
    assert!(!system.active_orders().contains("order_x"));
    assert_eq!(system.available_slots(), 10);
    assert!(mocks.notifier.failure_alerts().is_empty());
    assert!(sink.records().is_empty());

    release.add_permits(1);
    let response = system.process_order(order("order_x")).await.unwrap();
    assert_eq!(response.status, OrderStatus::Completed);
}

#[tokio::test]
async fn duplicate_order_id_is_rejected_while_in_flight() {
    let mocks = MockBackends::new();
    let release = Arc::new(Semaphore::new(0));
    mocks.database.hold_lookups(release.clone());
    let (system, sink) = system(&mocks, AppConfig::default());

    let first = tokio::spawn({
        let system = system.clone();
        async move { system.process_order(order("order_dup")).await }
    });
    eventually(|| mocks.database.lookup_calls() == 1).await;

    let err = system.process_order(order("order_dup")).await.unwrap_err();
    assert_eq!(err, OrderProcessingError::DuplicateOrder("order_dup".into()));
    assert!(sink.records().is_empty());

    release.add_permits(1);
    assert!(first.await.unwrap().is_ok());
    assert_eq!(mocks.database.lookup_calls(), 1);
}

#[tokio::test]
async fn invalid_order_is_rejected_up_front() {
    let mocks = MockBackends::new();
    let (system, _sink) = system(&mocks, AppConfig::default());

    let err = system
        .process_order(OrderRequest::new("order_empty", Vec::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, OrderProcessingError::InvalidOrder(_)));
    assert_eq!(mocks.database.lookup_calls(), 0);
    assert!(mocks.notifier.failure_alerts().is_empty());
}

#[tokio::test]
async fn health_reports_every_transport() {
    let mocks = MockBackends::new();
    mocks
        .arm
        .expect_health()
        .always()
        .return_err(TransportError::unavailable("robot_arm", "bus down"));
    let (system, _sink) = system(&mocks, AppConfig::default());

    let first = system.get_health_status().await;
    let second = system.get_health_status().await;

    assert_eq!(first, second);
    assert_eq!(first.len(), 6);
    assert!(first["database"].healthy);
    assert!(!first["robot_arm"].healthy);
    assert!(first["robot_arm"].error.as_deref().unwrap_or_default().contains("bus down"));

    let metrics = system.get_metrics().await;
    assert_eq!(metrics.active_orders, 0);
    assert_eq!(metrics.performance.max_concurrent_orders, 10);
    assert_eq!(metrics.transport_health, first);
}

/// SMS gateway that is down.
struct OfflineSms;

#[async_trait]
impl SmsProvider for OfflineSms {
    fn name(&self) -> &str {
        "offline"
    }

    async fn is_available(&self) -> bool {
        false
    }

    async fn send(&self, _message: &SmsMessage) -> Result<(), TransportError> {
        Err(TransportError::unavailable("sms", "gateway down"))
    }
}

#[tokio::test]
async fn unavailable_sms_provider_is_reported_unhealthy() {
    let mocks = MockBackends::new();
    let mut registry = mocks.registry();
    let notifier = SmsNotifier::new(Arc::new(OfflineSms), vec!["+15550100".into()]);
    registry.register(Arc::new(notifier));
    let system = CommLayer::from_parts(
        AppConfig::default(),
        mocks.backends(),
        registry,
        Arc::new(MemoryDeadLetterSink::new()),
    );

    let health = system.get_health_status().await;

    assert_eq!(health.len(), 6);
    assert!(!health["notifier"].healthy);
    assert!(health["database"].healthy);
}

#[tokio::test]
async fn empty_component_disables_menu_items() {
    let mocks = MockBackends::new();
    let (system, _sink) = system(&mocks, AppConfig::default());

    let outcome = system
        .handle_component_alert("coffee_beans", "empty", "Hopper empty")
        .await
        .unwrap();

    assert_eq!(outcome.disabled_items, vec!["coffee_beans".to_string()]);
    assert!(outcome.notification.is_some());
    let sent = mocks.notifier.component_alerts();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].level, AlertLevel::Empty);
    assert_eq!(mocks.database.disabled(), vec![vec!["coffee_beans".to_string()]]);
}

#[tokio::test]
async fn warning_alert_only_notifies() {
    let mocks = MockBackends::new();
    let (system, _sink) = system(&mocks, AppConfig::default());

    let outcome = system
        .handle_component_alert("milk", "warning", "Milk low")
        .await
        .unwrap();

    assert!(outcome.disabled_items.is_empty());
    assert_eq!(mocks.database.disable_calls(), 0);
}

#[tokio::test]
async fn unknown_alert_level_is_rejected() {
    let mocks = MockBackends::new();
    let (system, _sink) = system(&mocks, AppConfig::default());

    let err = system
        .handle_component_alert("milk", "panic", "??")
        .await
        .unwrap_err();

    assert!(matches!(err, StepError::Validation(_)));
    assert!(mocks.notifier.component_alerts().is_empty());
}

#[tokio::test]
async fn shutdown_stops_admission() {
    let mocks = MockBackends::new();
    let (system, _sink) = system(&mocks, AppConfig::default());

    system.shutdown().await;

    let err = system.process_order(order("order_late")).await.unwrap_err();
    assert_eq!(err, OrderProcessingError::ShuttingDown("order_late".into()));
}
