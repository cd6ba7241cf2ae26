//! The table of orders currently in flight.

use crate::model::{Order, OrderStatus};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Snapshot of an in-flight order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveOrder {
    pub order_id: String,
    pub status: OrderStatus,
    pub customer_name: Option<String>,
    pub admitted_at: DateTime<Utc>,
    /// Distinguishes successive admissions of the same id.
    #[serde(skip)]
    ticket: u64,
}

/// Concurrency-safe store of in-flight orders, keyed by order id.
///
/// Written only by the orchestrator (insert on admission, remove on the terminal
/// outcome). Cloning shares the same table.
#[derive(Clone, Default)]
pub struct ActiveOrders {
    orders: Arc<DashMap<String, ActiveOrder>>,
    next_ticket: Arc<AtomicU64>,
}

impl ActiveOrders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `order`. Returns `false`, leaving the table untouched, if its id is taken.
    pub fn try_insert(&self, order: &Order) -> bool {
        self.insert(order).is_some()
    }

    /// Registers `order` for the lifetime of the returned [`Admission`].
    ///
    /// Returns `None`, leaving the table untouched, if its id is taken.
    pub fn admit(&self, order: &Order) -> Option<Admission<'_>> {
        let ticket = self.insert(order)?;
        Some(Admission {
            active: self,
            order_id: order.order_id.clone(),
            ticket,
        })
    }

    fn insert(&self, order: &Order) -> Option<u64> {
        match self.orders.entry(order.order_id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
                slot.insert(ActiveOrder {
                    order_id: order.order_id.clone(),
                    status: order.status(),
                    customer_name: order.customer_name.clone(),
                    admitted_at: Utc::now(),
                    ticket,
                });
                Some(ticket)
            }
        }
    }

    /// Mirrors the order's progress into its entry.
    pub fn update(&self, order: &Order) {
        if let Some(mut entry) = self.orders.get_mut(&order.order_id) {
            entry.status = order.status();
            entry.customer_name = order.customer_name.clone();
        }
    }

    /// Removes the entry. A no-op when absent.
    pub fn remove(&self, order_id: &str) -> Option<ActiveOrder> {
        self.orders.remove(order_id).map(|(_, order)| order)
    }

    pub fn get(&self, order_id: &str) -> Option<ActiveOrder> {
        self.orders.get(order_id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.orders.contains_key(order_id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Ids of every in-flight order, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.orders.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

/// Removes an admitted order's entry when processing ends, however it ends.
///
/// Only the entry created by this admission is removed; a later order that
/// reused the id after an earlier removal is left alone.
#[must_use = "the order is unregistered as soon as the admission is dropped"]
pub struct Admission<'a> {
    active: &'a ActiveOrders,
    order_id: String,
    ticket: u64,
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        let ticket = self.ticket;
        self.active
            .orders
            .remove_if(&self.order_id, |_, entry| entry.ticket == ticket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{OrderItem, OrderRequest};

    fn order(id: &str) -> Order {
        Order::from_request(OrderRequest::new(
            id,
            vec![OrderItem {
                item_id: "tea_001".into(),
                name: "Tea".into(),
                quantity: 1,
                components: vec![],
            }],
        ))
        .unwrap()
    }

    #[test]
    fn duplicate_ids_are_refused() {
        let active = ActiveOrders::new();
        assert!(active.try_insert(&order("o1")));
        assert!(!active.try_insert(&order("o1")));
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn update_and_remove() {
        let active = ActiveOrders::new();
        let mut o = order("o1");
        active.try_insert(&o);
        o.customer_name = Some("Ada".into());
        o.advance(OrderStatus::CustomerResolved);
        active.update(&o);

        let snapshot = active.get("o1").unwrap();
        assert_eq!(snapshot.status, OrderStatus::CustomerResolved);
        assert_eq!(snapshot.customer_name.as_deref(), Some("Ada"));

        assert!(active.remove("o1").is_some());
        assert!(active.remove("o1").is_none());
        assert!(active.is_empty());
    }

    #[test]
    fn admission_unregisters_on_drop() {
        let active = ActiveOrders::new();
        let admission = active.admit(&order("o1")).unwrap();
        assert!(active.admit(&order("o1")).is_none());
        assert!(active.contains("o1"));

        drop(admission);
        assert!(!active.contains("o1"));
    }

    #[test]
    fn stale_admission_leaves_a_reused_id_alone() {
        let active = ActiveOrders::new();
        let first = active.admit(&order("o1")).unwrap();
        active.remove("o1");
        let second = active.admit(&order("o1")).unwrap();

        drop(first);
        assert!(active.contains("o1"));
        drop(second);
        assert!(active.is_empty());
    }

    #[test]
    fn clones_share_the_table() {
        let active = ActiveOrders::new();
        let reader = active.clone();
        active.try_insert(&order("b"));
        active.try_insert(&order("a"));
        assert_eq!(reader.ids(), vec!["a".to_string(), "b".to_string()]);
    }
}
