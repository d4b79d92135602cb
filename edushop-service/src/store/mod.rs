//! Storage for lessons and orders.
//!
//! Both traits are implemented by [`PgStore`] for production and by
//! [`InMemoryStore`] for local runs and tests.

mod connector;
mod memory;
mod postgres;

pub use connector::{DbConnection, StoreConnector};
pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use shared::*;
use uuid::Uuid;
use crate::error::StoreError;

#[async_trait]
pub trait LessonStore: Send + Sync {
    /// Insert every lesson in one batch.
    async fn insert_lessons(&self, batch: Vec<NewLesson>) -> Result<BulkInsertResult, StoreError>;

    async fn list_lessons(&self) -> Result<Vec<Lesson>, StoreError>;

    /// Apply the present fields of `patch`. An unknown id is not an error,
    /// it simply matches nothing. `modified_count` is 1 only when a stored
    /// value actually changed.
    async fn update_lesson(&self, id: Uuid, patch: LessonPatch) -> Result<UpdateResult, StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Check every booking against the lesson's remaining space, take the
    /// seats and persist the order, all or nothing.
    async fn place_order(&self, order: NewOrder, bookings: Vec<SeatBooking>) -> Result<Order, StoreError>;

    /// All orders, oldest first.
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError>;
}
