//! The `OrderExecutor` contract shared by every backend.

use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use ordergate_core::{ClientOrderId, Fill, OrderRequest, OrderStatus, Routing};

use crate::error::{ExecutorError, ExecutorResult};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Turns an admitted order into a fill or an executor error.
///
/// Implementations own their retry behaviour; callers never retry.
pub trait OrderExecutor: Send + Sync {
    /// Route this executor serves.
    fn route(&self) -> Routing;

    /// Submit an order. The order's client id is reused on every retry.
    fn submit<'a>(&'a self, order: &'a OrderRequest) -> BoxFuture<'a, ExecutorResult<Fill>>;

    fn cancel<'a>(&'a self, id: &'a ClientOrderId) -> BoxFuture<'a, ExecutorResult<()>>;

    /// Last known status; `Unknown` for ids this executor never saw.
    fn status(&self, id: &ClientOrderId) -> OrderStatus;
}

/// Arc wrapper for OrderExecutor trait objects.
pub type DynOrderExecutor = Arc<dyn OrderExecutor>;

/// Client id to status map kept by every executor.
#[derive(Debug, Default)]
pub struct OrderTracker {
    statuses: DashMap<ClientOrderId, OrderStatus>,
}

impl OrderTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: &ClientOrderId, status: OrderStatus) {
        self.statuses.insert(id.clone(), status);
    }

    #[must_use]
    pub fn get(&self, id: &ClientOrderId) -> OrderStatus {
        self.statuses
            .get(id)
            .map(|s| *s)
            .unwrap_or(OrderStatus::Unknown)
    }

    /// Cancel without a venue round-trip.
    ///
    /// Orders already in a terminal state cannot be cancelled.
    pub fn cancel_local(&self, id: &ClientOrderId) -> ExecutorResult<()> {
        let mut entry = self
            .statuses
            .get_mut(id)
            .ok_or_else(|| ExecutorError::UnknownOrder(id.to_string()))?;
        if entry.is_terminal() {
            return Err(ExecutorError::Rejected(format!(
                "order {id} is already {:?}",
                *entry
            )));
        }
        *entry = OrderStatus::Cancelled;
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

/// Client id for a submission; orders without one get a fresh id.
pub(crate) fn client_id_for(order: &OrderRequest) -> ClientOrderId {
    order.client_id.clone().unwrap_or_default()
}
