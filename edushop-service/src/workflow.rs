use std::sync::Arc;
use tracing::info;
use shared::*;
use crate::error::AppError;
use crate::store::OrderStore;

/// Turns a booking request into a persisted order.
///
/// The request is checked for presence of every field, each referenced lesson
/// must have a seat count, and the store then reserves the seats and writes
/// the order in one step. A rejected request leaves lessons and orders as they
/// were.
#[derive(Clone)]
pub struct OrderWorkflow {
    store: Arc<dyn OrderStore>,
}

impl OrderWorkflow {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub async fn place_order(&self, request: PlaceOrderRequest) -> Result<Order, AppError> {
        let new_order = request.validate()?;
        let bookings = new_order.seat_bookings()?;

        let order = self.store.place_order(new_order, bookings).await?;
        info!("Order {} placed by {} for {} lessons", order.id, order.name, order.lesson_ids.len());
        Ok(order)
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>, AppError> {
        Ok(self.store.list_orders().await?)
    }
}
