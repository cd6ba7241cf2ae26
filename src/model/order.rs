//! The order: unit of work driven through the saga.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Base preparation time for any order, in seconds.
const BASE_PREPARATION_SECS: u32 = 30;
/// Additional preparation time per line item, in seconds.
const PER_ITEM_SECS: u32 = 10;

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    #[serde(rename = "id")]
    pub item_id: String,
    pub name: String,
    pub quantity: u32,
    /// Component tags the item needs (e.g. `coffee`, `milk`).
    #[serde(default)]
    pub components: Vec<String>,
}

/// Order payload delivered by the ingress after authentication and schema checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub order_id: String,
    pub items: Vec<OrderItem>,
}

impl OrderRequest {
    pub fn new(order_id: impl Into<String>, items: Vec<OrderItem>) -> Self {
        Self {
            order_id: order_id.into(),
            items,
        }
    }
}

/// Lifecycle status of an order.
///
/// ```text
/// RECEIVED → CUSTOMER_RESOLVED → ARM_READY → WORK_DISPATCHED
///          → UNITS_OPENED → SCREEN_UPDATED → COMPLETED
/// any non-terminal state → FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Received,
    CustomerResolved,
    ArmReady,
    WorkDispatched,
    UnitsOpened,
    ScreenUpdated,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed)
    }

    /// The successor on the happy path, if any.
    pub fn next(&self) -> Option<OrderStatus> {
        use OrderStatus::*;
        match self {
            Received => Some(CustomerResolved),
            CustomerResolved => Some(ArmReady),
            ArmReady => Some(WorkDispatched),
            WorkDispatched => Some(UnitsOpened),
            UnitsOpened => Some(ScreenUpdated),
            ScreenUpdated => Some(Completed),
            Completed | Failed => None,
        }
    }

    pub fn can_advance_to(&self, target: OrderStatus) -> bool {
        match target {
            OrderStatus::Failed => !self.is_terminal(),
            _ => self.next() == Some(target),
        }
    }

    pub fn as_str(&self) -> &'static str {
        use OrderStatus::*;
        match self {
            Received => "RECEIVED",
            CustomerResolved => "CUSTOMER_RESOLVED",
            ArmReady => "ARM_READY",
            WorkDispatched => "WORK_DISPATCHED",
            UnitsOpened => "UNITS_OPENED",
            ScreenUpdated => "SCREEN_UPDATED",
            Completed => "COMPLETED",
            Failed => "FAILED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An admitted order.
///
/// Owned exclusively by the orchestrator while it is being processed.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub order_id: String,
    pub items: Vec<OrderItem>,
    /// Filled in once the customer lookup succeeds.
    pub customer_name: Option<String>,
    status: OrderStatus,
}

impl Order {
    /// Builds an order from an ingress payload, rejecting malformed payloads.
    pub fn from_request(request: OrderRequest) -> Result<Self, String> {
        if request.order_id.trim().is_empty() {
            return Err("order_id must not be empty".into());
        }
        if request.items.is_empty() {
            return Err(format!("order {} has no items", request.order_id));
        }
        for item in &request.items {
            if item.item_id.trim().is_empty() {
                return Err(format!("order {} has an item without id", request.order_id));
            }
            if item.quantity == 0 {
                return Err(format!(
                    "item {} of order {} has zero quantity",
                    item.item_id, request.order_id
                ));
            }
        }
        Ok(Self {
            order_id: request.order_id,
            items: request.items,
            customer_name: None,
            status: OrderStatus::Received,
        })
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Moves the order along its state machine.
    pub(crate) fn advance(&mut self, next: OrderStatus) {
        debug_assert!(
            self.status.can_advance_to(next),
            "illegal transition {} -> {}",
            self.status,
            next
        );
        self.status = next;
    }

    /// Estimated preparation time in seconds. Pure function of the order.
    pub fn estimated_time(&self) -> u32 {
        let items = u32::try_from(self.items.len()).unwrap_or(u32::MAX);
        BASE_PREPARATION_SECS.saturating_add(items.saturating_mul(PER_ITEM_SECS))
    }
}

/// Completion summary returned to the ingress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub estimated_time: u32,
    pub serving_unit_count: usize,
    pub status: OrderStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, quantity: u32) -> OrderItem {
        OrderItem {
            item_id: id.into(),
            name: "Espresso".into(),
            quantity,
            components: vec!["coffee".into(), "water".into()],
        }
    }

    #[test]
    fn status_walks_forward_only() {
        let mut status = OrderStatus::Received;
        let mut seen = vec![status];
        while let Some(next) = status.next() {
            assert!(status.can_advance_to(next));
            status = next;
            seen.push(status);
        }
        assert_eq!(status, OrderStatus::Completed);
        assert_eq!(seen.len(), 7);

        assert!(!OrderStatus::Received.can_advance_to(OrderStatus::ArmReady));
        assert!(OrderStatus::UnitsOpened.can_advance_to(OrderStatus::Failed));
        assert!(!OrderStatus::Completed.can_advance_to(OrderStatus::Failed));
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&OrderStatus::CustomerResolved).unwrap();
        assert_eq!(json, "\"CUSTOMER_RESOLVED\"");
    }

    #[test]
    fn rejects_malformed_payloads() {
        assert!(Order::from_request(OrderRequest::new("", vec![item("a", 1)])).is_err());
        assert!(Order::from_request(OrderRequest::new("o1", vec![])).is_err());
        assert!(Order::from_request(OrderRequest::new("o1", vec![item("a", 0)])).is_err());

        let order = Order::from_request(OrderRequest::new("o1", vec![item("a", 2)])).unwrap();
        assert_eq!(order.status(), OrderStatus::Received);
        assert_eq!(order.customer_name, None);
    }

    #[test]
    fn estimated_time_depends_on_item_count() {
        let one = Order::from_request(OrderRequest::new("o1", vec![item("a", 1)])).unwrap();
        let items = vec![item("a", 1), item("b", 4), item("c", 1)];
        let three = Order::from_request(OrderRequest::new("o2", items)).unwrap();
        assert_eq!(one.estimated_time(), 40);
        assert_eq!(three.estimated_time(), 60);
    }

    #[test]
    fn ingress_payload_uses_id_field() {
        let request: OrderRequest = serde_json::from_str(
            r#"{"order_id":"order_123","items":[{"id":"coffee_001","name":"Espresso","quantity":1,"components":["coffee","water"]}]}"#,
        )
        .unwrap();
        assert_eq!(request.items[0].item_id, "coffee_001");
    }
}
