//! Component alerts (inventory warnings raised by the robot arm).
//!
//! Every alert is forwarded to the operators. An `empty` alert additionally
//! disables the menu items that need the component, retried like any other step.
//! Failures are logged; nothing here fails the caller.

use crate::framework::{retry, AlertNotifier, MenuControl, RetryPolicy};
use crate::model::{AlertLevel, ComponentAlert, DeliveryReport};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// What handling a component alert achieved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentAlertOutcome {
    /// `None` when the notification could not be sent at all.
    pub notification: Option<DeliveryReport>,
    /// Menu items disabled for an `empty` alert.
    pub disabled_items: Vec<String>,
}

pub struct ComponentAlertHandler {
    notifier: Arc<dyn AlertNotifier>,
    menu: Arc<dyn MenuControl>,
    disable_policy: RetryPolicy,
}

impl ComponentAlertHandler {
    pub fn new(
        notifier: Arc<dyn AlertNotifier>,
        menu: Arc<dyn MenuControl>,
        disable_policy: RetryPolicy,
    ) -> Self {
        Self {
            notifier,
            menu,
            disable_policy,
        }
    }

    #[instrument(skip(self, alert), fields(component = %alert.component, level = %alert.level))]
    pub async fn handle(&self, alert: &ComponentAlert) -> ComponentAlertOutcome {
        let mut outcome = ComponentAlertOutcome::default();

        match self.notifier.send_component_alert(alert).await {
            Ok(report) => outcome.notification = Some(report),
            Err(e) => warn!(error = %e, "Component alert notification failed"),
        }

        if alert.level == AlertLevel::Empty {
            let components = vec![alert.component.clone()];
            match retry(&self.disable_policy, "disable_menu", || {
                self.menu.disable_menu_items(&components)
            })
            .await
            {
                Ok(items) => {
                    info!(disabled = ?items, "Menu items disabled");
                    outcome.disabled_items = items;
                }
                Err(e) => warn!(error = %e, "Menu items could not be disabled"),
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::mock::MockBackends;
    use crate::framework::TransportError;
    use std::time::Duration;

    fn handler(mocks: &MockBackends) -> ComponentAlertHandler {
        let policy = RetryPolicy::new(3, 2.0, Duration::from_millis(100), None).unwrap();
        ComponentAlertHandler::new(mocks.notifier.clone(), mocks.database.clone(), policy)
    }

    #[tokio::test]
    async fn warnings_only_notify() {
        let mocks = MockBackends::new();
        let outcome = handler(&mocks)
            .handle(&ComponentAlert::new("cups", AlertLevel::Warning, "running low"))
            .await;

        assert_eq!(outcome.notification.map(|r| r.delivered), Some(1));
        assert!(outcome.disabled_items.is_empty());
        assert_eq!(mocks.database.disable_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_disables_menu_items_with_retry() {
        let mocks = MockBackends::new();
        mocks
            .database
            .expect_disable()
            .return_err(TransportError::unavailable("database", "503"));
        mocks.database.expect_disable().return_ok(vec!["latte".into()]);

        let outcome = handler(&mocks)
            .handle(&ComponentAlert::new("milk", AlertLevel::Empty, "Milk container is empty"))
            .await;

        assert_eq!(outcome.disabled_items, vec!["latte".to_string()]);
        assert_eq!(mocks.database.disable_calls(), 2);
        assert_eq!(mocks.database.disabled()[0], vec!["milk".to_string()]);
        assert_eq!(mocks.notifier.component_alerts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_disable_is_absorbed() {
        let mocks = MockBackends::new();
        mocks
            .database
            .expect_disable()
            .always()
            .return_err(TransportError::unavailable("database", "down"));

        let outcome = handler(&mocks)
            .handle(&ComponentAlert::new("milk", AlertLevel::Empty, "empty"))
            .await;

        assert!(outcome.disabled_items.is_empty());
        assert_eq!(mocks.database.disable_calls(), 3);
    }
}
