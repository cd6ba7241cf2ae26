//! # Order Saga
//!
//! [`Orchestrator::process_order`] drives one order through a fixed sequence of
//! remote steps. Every step is wrapped by the [retry engine](crate::framework::retry)
//! with its own policy; the first step to fail terminally hands the order to the
//! [failure pipeline](super::failure) and the error goes back to the caller.
//!
//! ```text
//! admission gate ─▶ RECEIVED
//!   resolve customer ─▶ CUSTOMER_RESOLVED
//!   check arm state  ─▶ ARM_READY
//!   dispatch work    ─▶ WORK_DISPATCHED       (ack, then completion)
//!   open units       ─▶ UNITS_OPENED          (fan-out, independent per unit)
//!   update screen    ─▶ SCREEN_UPDATED        (two concurrent publishes)
//!   completion sound ─▶ COMPLETED
//! any terminal step failure ─▶ FAILED ─▶ failure pipeline ─▶ Err
//! ```
//!
//! Within an order steps run strictly in sequence. Across orders there is no
//! ordering; the only shared controls are the admission gate and the active-orders
//! table.

use crate::config::{OrchestratorConfig, PerformanceConfig};
use crate::framework::{retry, Backends, RetryPolicy, ServingUnits, StepError};
use crate::model::{
    ArmState, CustomerInfo, Order, OrderRequest, OrderResponse, OrderStatus, ServingUnitInfo,
    SoundCue, UnitStatus, WorkDeadlines, WorkRequest,
};
use crate::orchestrator::{
    ActiveOrders, DeadLetterSink, FailurePipeline, OrderProcessingError, StepKind,
};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

/// Priority attached to every work request.
const WORK_PRIORITY: u8 = 1;

pub struct Orchestrator {
    backends: Backends,
    config: OrchestratorConfig,
    gate: Arc<Semaphore>,
    max_concurrent_orders: usize,
    admission_timeout: Duration,
    active: ActiveOrders,
    failures: FailurePipeline,
}

impl Orchestrator {
    pub fn new(
        backends: Backends,
        performance: &PerformanceConfig,
        config: OrchestratorConfig,
        active: ActiveOrders,
        dead_letters: Arc<dyn DeadLetterSink>,
    ) -> Self {
        let dead_letters = config.dead_letter.enabled.then_some(dead_letters);
        let failures = FailurePipeline::new(
            backends.notifier.clone(),
            backends.audio.clone(),
            active.clone(),
            dead_letters,
        );
        Self {
            backends,
            config,
            gate: Arc::new(Semaphore::new(performance.max_concurrent_orders)),
            max_concurrent_orders: performance.max_concurrent_orders,
            admission_timeout: performance.order_timeout,
            active,
            failures,
        }
    }

    pub fn active_orders(&self) -> &ActiveOrders {
        &self.active
    }

    /// Free admission slots.
    pub fn available_slots(&self) -> usize {
        self.gate.available_permits()
    }

    pub fn max_concurrent_orders(&self) -> usize {
        self.max_concurrent_orders
    }

    /// Stops admitting orders. Orders already in flight run to completion.
    pub fn close(&self) {
        self.gate.close();
    }

    /// Processes one order end to end.
    ///
    /// Blocks for an admission slot for at most the configured order timeout.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn process_order(
        &self,
        request: OrderRequest,
    ) -> Result<OrderResponse, OrderProcessingError> {
        debug!(?request, "process_order called");
        let mut order = Order::from_request(request).map_err(OrderProcessingError::InvalidOrder)?;
        let order_id = order.order_id.clone();

        let admission = tokio::time::timeout(self.admission_timeout, self.gate.acquire()).await;
        let _permit = match admission {
            Ok(Ok(permit)) => permit,
            Ok(Err(_closed)) => return Err(OrderProcessingError::ShuttingDown(order_id)),
            Err(_) => {
                warn!(waited = ?self.admission_timeout, "Admission timed out");
                return Err(OrderProcessingError::AdmissionTimeout {
                    order_id,
                    waited: self.admission_timeout,
                });
            }
        };

        // Unregisters the order even if this future is dropped mid-step.
        let Some(admission) = self.active.admit(&order) else {
            warn!("Order id already in flight");
            return Err(OrderProcessingError::DuplicateOrder(order_id));
        };
        info!(items = order.items.len(), "Order admitted");

        match self.run_steps(&mut order).await {
            Ok(response) => {
                drop(admission);
                info!(
                    estimated_time = response.estimated_time,
                    serving_units = response.serving_unit_count,
                    "Order completed"
                );
                Ok(response)
            }
            Err(err) => {
                order.advance(OrderStatus::Failed);
                warn!(step = ?err.step(), error = %err, "Order failed");
                self.failures.handle(&order_id, &err.to_string()).await;
                drop(admission);
                Err(err)
            }
        }
    }

    async fn run_steps(&self, order: &mut Order) -> Result<OrderResponse, OrderProcessingError> {
        let order_id = order.order_id.clone();
        let backends = &self.backends;

        let step = StepKind::ResolveCustomer;
        let customer = self
            .run_step(&order_id, step, self.policy(step), || {
                backends.customers.lookup_customer(&order_id)
            })
            .await?;
        order.customer_name = Some(customer.customer_name);
        self.advance(order, OrderStatus::CustomerResolved);

        let step = StepKind::CheckArmState;
        self.run_step(&order_id, step, self.policy(step), || async {
            let state = backends.arm.query_state().await?;
            if state.is_ready() {
                Ok::<(), StepError>(())
            } else {
                Err(StepError::state(ArmState::Up, state))
            }
        })
        .await?;
        self.advance(order, OrderStatus::ArmReady);

        // The policy timeout bounds the acknowledgment milestone, not the whole dispatch.
        let dispatch_policy = self.policy(StepKind::DispatchWork);
        let deadlines = WorkDeadlines {
            ack: dispatch_policy.timeout().unwrap_or(self.config.completion_timeout),
            completion: self.config.completion_timeout,
        };
        let work = WorkRequest {
            order_id: order_id.clone(),
            items: order.items.clone(),
            priority: WORK_PRIORITY,
        };
        self.run_step(&order_id, StepKind::DispatchWork, &dispatch_policy.without_timeout(), || {
            backends.arm.dispatch_work(&work, deadlines)
        })
        .await?;
        self.advance(order, OrderStatus::WorkDispatched);

        let unit_ids = backends.units.units_for(order);
        let opened = open_units_concurrently(
            backends.units.as_ref(),
            &unit_ids,
            self.policy(StepKind::OpenUnits),
        )
        .await;
        let failed: Vec<&str> = opened
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(unit, _)| unit.as_str())
            .collect();
        if self
            .config
            .unit_failure_threshold
            .is_breached(failed.len(), opened.len())
        {
            return Err(OrderProcessingError::StepFailed {
                order_id,
                step: StepKind::OpenUnits,
                source: StepError::state(
                    "serving units opened",
                    format!("failed units: {}", failed.join(", ")),
                ),
            });
        }
        let serving_unit_count = opened.len() - failed.len();
        self.advance(order, OrderStatus::UnitsOpened);

        let estimated_time = order.estimated_time();
        let customer_info = CustomerInfo {
            order_id: order_id.clone(),
            customer_name: order.customer_name.clone().unwrap_or_default(),
            estimated_time,
        };
        let unit_infos: Vec<ServingUnitInfo> = unit_ids
            .iter()
            .enumerate()
            .map(|(i, unit_id)| ServingUnitInfo {
                unit_id: unit_id.clone(),
                item_name: order
                    .items
                    .get(i)
                    .map(|item| item.name.clone())
                    .unwrap_or_else(|| unit_id.clone()),
                status: if opened.get(unit_id).copied().unwrap_or(false) {
                    UnitStatus::Opened
                } else {
                    UnitStatus::Failed
                },
            })
            .collect();
        let screen_policy = self.policy(StepKind::UpdateScreen);
        let (customer_published, units_published) = tokio::join!(
            retry(screen_policy, "publish_customer_info", || {
                backends.screen.publish_customer_info(&customer_info)
            }),
            retry(screen_policy, "publish_serving_units", || {
                backends.screen.publish_serving_units(&order_id, &unit_infos)
            }),
        );
        customer_published
            .and(units_published)
            .map_err(|source| OrderProcessingError::StepFailed {
                order_id: order_id.clone(),
                step: StepKind::UpdateScreen,
                source,
            })?;
        self.advance(order, OrderStatus::ScreenUpdated);

        let sound = self
            .run_step(&order_id, StepKind::PlaySound, self.policy(StepKind::PlaySound), || {
                backends.audio.play(SoundCue::OrderComplete)
            })
            .await;
        match sound {
            Ok(()) => {}
            Err(err) if !self.config.completion_sound_fatal => {
                warn!(error = %err, "Completion sound failed, order still completes");
            }
            Err(err) => return Err(err),
        }
        self.advance(order, OrderStatus::Completed);

        Ok(OrderResponse {
            order_id,
            estimated_time,
            serving_unit_count,
            status: order.status(),
        })
    }

    fn policy(&self, step: StepKind) -> &RetryPolicy {
        self.config.steps.for_step(step)
    }

    fn advance(&self, order: &mut Order, status: OrderStatus) {
        order.advance(status);
        self.active.update(order);
        debug!(%status, "Order advanced");
    }

    async fn run_step<T, F, Fut>(
        &self,
        order_id: &str,
        step: StepKind,
        policy: &RetryPolicy,
        attempt: F,
    ) -> Result<T, OrderProcessingError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        debug!(%step, "Step started");
        retry(policy, step.as_str(), attempt)
            .await
            .map_err(|source| OrderProcessingError::StepFailed {
                order_id: order_id.to_string(),
                step,
                source,
            })
    }
}

/// Opens every unit concurrently, each under its own retries.
///
/// A unit that exhausts its retries is reported as `false`; it never cancels or
/// fails its siblings.
pub async fn open_units_concurrently(
    units: &dyn ServingUnits,
    unit_ids: &[String],
    policy: &RetryPolicy,
) -> BTreeMap<String, bool> {
    let opens = unit_ids.iter().map(|unit_id| async move {
        let result = retry(policy, "open_unit", || units.open_unit(unit_id)).await;
        if let Err(e) = &result {
            warn!(%unit_id, error = %e, "Serving unit did not open");
        }
        (unit_id.clone(), result.is_ok())
    });
    join_all(opens).await.into_iter().collect()
}
