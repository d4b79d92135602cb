use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;
use shared::*;
use crate::error::StoreError;
use super::{LessonStore, OrderStore};

#[derive(Debug, Default)]
struct Collections {
    lessons: Vec<Lesson>,
    orders: Vec<Order>,
}

/// Process-local store. Bookings hold the write lock from the capacity
/// check until the order is recorded.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LessonStore for InMemoryStore {
    async fn insert_lessons(&self, batch: Vec<NewLesson>) -> Result<BulkInsertResult, StoreError> {
        let mut collections = self.collections.write().await;
        let inserted: Vec<Lesson> = batch
            .into_iter()
            .map(|lesson| lesson.into_lesson(Uuid::new_v4()))
            .collect();
        let inserted_ids = inserted.iter().map(|lesson| lesson.id).collect();
        let inserted_count = inserted.len();
        collections.lessons.extend(inserted);

        Ok(BulkInsertResult {
            inserted_count,
            inserted_ids,
        })
    }

    async fn list_lessons(&self) -> Result<Vec<Lesson>, StoreError> {
        Ok(self.collections.read().await.lessons.clone())
    }

    async fn update_lesson(&self, id: Uuid, patch: LessonPatch) -> Result<UpdateResult, StoreError> {
        let mut collections = self.collections.write().await;
        let result = match collections.lessons.iter_mut().find(|lesson| lesson.id == id) {
            Some(lesson) => UpdateResult {
                matched_count: 1,
                modified_count: u64::from(patch.apply_to(lesson)),
            },
            None => UpdateResult {
                matched_count: 0,
                modified_count: 0,
            },
        };
        Ok(result)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn place_order(&self, order: NewOrder, bookings: Vec<SeatBooking>) -> Result<Order, StoreError> {
        let mut collections = self.collections.write().await;

        for booking in &bookings {
            let lesson = collections
                .lessons
                .iter()
                .find(|lesson| lesson.id == booking.lesson_id)
                .ok_or(StoreError::LessonNotFound(booking.lesson_id))?;

            if lesson.space < booking.seats {
                return Err(StoreError::InsufficientSpace {
                    subject: lesson.subject.clone(),
                });
            }
        }

        for booking in &bookings {
            if let Some(lesson) = collections.lessons.iter_mut().find(|lesson| lesson.id == booking.lesson_id) {
                lesson.space -= booking.seats;
            }
        }

        let order = order.into_order(Uuid::new_v4(), Utc::now());
        collections.orders.push(order.clone());
        Ok(order)
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        Ok(self.collections.read().await.orders.clone())
    }
}
