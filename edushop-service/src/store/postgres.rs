use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};
use tracing::info;
use uuid::Uuid;
use shared::*;
use crate::error::StoreError;
use crate::models::*;
use crate::schema::*;
use super::{DbConnection, LessonStore, OrderStore, StoreConnector};

pub struct PgStore {
    connector: StoreConnector,
}

impl PgStore {
    pub fn new(connector: StoreConnector) -> Self {
        Self { connector }
    }

    /// Open the pool now rather than on the first request.
    pub async fn connect(&self) -> Result<(), StoreError> {
        if !self.connector.is_connected() {
            self.connector.handle().await?;
        }
        Ok(())
    }

    async fn conn(&self) -> Result<DbConnection<'_>, StoreError> {
        let pool = self.connector.handle().await?;
        Ok(pool.get().await?)
    }
}

#[async_trait]
impl LessonStore for PgStore {
    async fn insert_lessons(&self, batch: Vec<NewLesson>) -> Result<BulkInsertResult, StoreError> {
        let new_lessons = batch
            .into_iter()
            .map(|lesson| NewDbLesson::new(Uuid::new_v4(), lesson))
            .collect::<Result<Vec<_>, _>>()?;
        let inserted_ids: Vec<Uuid> = new_lessons.iter().map(|lesson| lesson.id).collect();

        let mut conn = self.conn().await?;
        let inserted_count = diesel::insert_into(lessons::table)
            .values(&new_lessons)
            .execute(&mut conn)
            .await?;

        info!("Inserted {} lessons", inserted_count);
        Ok(BulkInsertResult {
            inserted_count,
            inserted_ids,
        })
    }

    async fn list_lessons(&self) -> Result<Vec<Lesson>, StoreError> {
        let mut conn = self.conn().await?;
        let rows = lessons::table.load::<DbLesson>(&mut conn).await?;
        rows.into_iter().map(Lesson::try_from).collect()
    }

    async fn update_lesson(&self, id: Uuid, patch: LessonPatch) -> Result<UpdateResult, StoreError> {
        let mut conn = self.conn().await?;
        conn.transaction::<_, StoreError, _>(|conn| {
            Box::pin(async move {
                let current = lessons::table
                    .filter(lessons::id.eq(id))
                    .for_update()
                    .first::<DbLesson>(conn)
                    .await
                    .optional()?;

                let Some(current) = current else {
                    return Ok(UpdateResult {
                        matched_count: 0,
                        modified_count: 0,
                    });
                };

                let mut lesson = Lesson::try_from(current)?;
                if !patch.apply_to(&mut lesson) {
                    return Ok(UpdateResult {
                        matched_count: 1,
                        modified_count: 0,
                    });
                }

                let changes = LessonChangeset::try_from(patch)?;
                diesel::update(lessons::table.filter(lessons::id.eq(id)))
                    .set(&changes)
                    .execute(conn)
                    .await?;

                Ok(UpdateResult {
                    matched_count: 1,
                    modified_count: 1,
                })
            })
        }).await
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn place_order(&self, order: NewOrder, bookings: Vec<SeatBooking>) -> Result<Order, StoreError> {
        let new_order = DbOrder::try_from(order.into_order(Uuid::new_v4(), Utc::now()))?;

        let mut conn = self.conn().await?;
        let db_order = conn.transaction::<_, StoreError, _>(|conn| {
            Box::pin(async move {
                let lesson_ids: Vec<Uuid> = bookings.iter().map(|booking| booking.lesson_id).collect();
                let selected = lessons::table
                    .filter(lessons::id.eq_any(lesson_ids))
                    .order(lessons::id.asc())
                    .for_update()
                    .load::<DbLesson>(conn)
                    .await?;

                for booking in &bookings {
                    let lesson = selected
                        .iter()
                        .find(|lesson| lesson.id == booking.lesson_id)
                        .ok_or(StoreError::LessonNotFound(booking.lesson_id))?;

                    if lesson.space < booking.seats {
                        return Err(StoreError::InsufficientSpace {
                            subject: lesson.subject.clone(),
                        });
                    }
                }

                let now = Utc::now();
                for booking in &bookings {
                    let updated = diesel::update(
                        lessons::table
                            .filter(lessons::id.eq(booking.lesson_id))
                            .filter(lessons::space.ge(booking.seats)),
                    )
                    .set((
                        lessons::space.eq(lessons::space - booking.seats),
                        lessons::updated_at.eq(Some(now)),
                    ))
                    .execute(conn)
                    .await?;

                    if updated != 1 {
                        return Err(StoreError::Persistence(format!(
                            "Space for lesson {} changed during booking",
                            booking.lesson_id
                        )));
                    }
                }

                let db_order = diesel::insert_into(orders::table)
                    .values(&new_order)
                    .get_result::<DbOrder>(conn)
                    .await?;

                Ok(db_order)
            })
        }).await?;

        info!("Order {} booked {} lessons", db_order.id, db_order.lesson_ids.as_array().map_or(0, Vec::len));
        Order::try_from(db_order)
    }

    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let mut conn = self.conn().await?;
        let rows = orders::table
            .order(orders::created_at.asc())
            .load::<DbOrder>(&mut conn)
            .await?;

        rows.into_iter().map(Order::try_from).collect()
    }
}

/// These run against a real database: point `DATABASE_URL` at a scratch
/// Postgres and run `cargo test -- --ignored`.
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Once};
    use crate::store::connector::run_migrations;

    static MIGRATE: Once = Once::new();

    fn store() -> PgStore {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a scratch database");
        MIGRATE.call_once(|| run_migrations(&database_url).unwrap());
        PgStore::new(StoreConnector::new(database_url))
    }

    fn lesson(subject: &str, space: i32) -> NewLesson {
        NewLesson {
            subject: subject.to_string(),
            location: "London".to_string(),
            price: 0.1,
            space,
        }
    }

    fn booking(seats: &[(Uuid, u32)]) -> (NewOrder, Vec<SeatBooking>) {
        let order = NewOrder {
            name: "Ada".to_string(),
            phone: "0123".to_string(),
            lesson_ids: seats.iter().map(|(id, _)| *id).collect(),
            spaces: seats.iter().copied().collect::<HashMap<_, _>>(),
        };
        let bookings = order.seat_bookings().unwrap();
        (order, bookings)
    }

    async fn space_of(store: &PgStore, id: Uuid) -> i32 {
        store
            .list_lessons()
            .await
            .unwrap()
            .into_iter()
            .find(|lesson| lesson.id == id)
            .unwrap()
            .space
    }

    async fn orders_booking(store: &PgStore, id: Uuid) -> Vec<Order> {
        store
            .list_orders()
            .await
            .unwrap()
            .into_iter()
            .filter(|order| order.lesson_ids.contains(&id))
            .collect()
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn inserted_lessons_are_listed_with_their_fields() {
        let store = store();
        let batch = vec![lesson("Math", 5), lesson("Art", 2)];
        let result = store.insert_lessons(batch.clone()).await.unwrap();
        assert_eq!(result.inserted_count, 2);

        let listed = store.list_lessons().await.unwrap();
        for (id, expected) in result.inserted_ids.iter().zip(batch) {
            let stored = listed.iter().find(|lesson| lesson.id == *id).unwrap();
            assert_eq!(*stored, expected.into_lesson(*id));
        }
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn capacity_boundary_is_enforced() {
        let store = store();
        let id = store.insert_lessons(vec![lesson("Math", 3)]).await.unwrap().inserted_ids[0];

        let (order, bookings) = booking(&[(id, 4)]);
        let err = store.place_order(order, bookings).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientSpace { ref subject } if subject == "Math"));
        assert!(orders_booking(&store, id).await.is_empty());
        assert_eq!(space_of(&store, id).await, 3);

        let (order, bookings) = booking(&[(id, 3)]);
        let placed = store.place_order(order, bookings).await.unwrap();
        assert_eq!(space_of(&store, id).await, 0);

        let stored = orders_booking(&store, id).await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, placed.id);
        assert_eq!(stored[0].spaces, HashMap::from([(id, 3)]));
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn short_lesson_rolls_back_the_whole_booking() {
        let store = store();
        let ids = store
            .insert_lessons(vec![lesson("Math", 3), lesson("Art", 1)])
            .await
            .unwrap()
            .inserted_ids;

        let (order, bookings) = booking(&[(ids[0], 3), (ids[1], 2)]);
        let err = store.place_order(order, bookings).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientSpace { ref subject } if subject == "Art"));

        assert_eq!(space_of(&store, ids[0]).await, 3);
        assert_eq!(space_of(&store, ids[1]).await, 1);
        assert!(orders_booking(&store, ids[0]).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    #[ignore = "needs DATABASE_URL"]
    async fn concurrent_full_capacity_bookings_cannot_oversell() {
        let store = Arc::new(store());
        let id = store.insert_lessons(vec![lesson("Math", 2)]).await.unwrap().inserted_ids[0];

        let attempts: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    let (order, bookings) = booking(&[(id, 2)]);
                    store.place_order(order, bookings).await
                })
            })
            .collect();

        let mut succeeded = 0;
        for attempt in attempts {
            if attempt.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 1);
        assert_eq!(space_of(&store, id).await, 0);
        assert_eq!(orders_booking(&store, id).await.len(), 1);
    }

    #[tokio::test]
    #[ignore = "needs DATABASE_URL"]
    async fn update_counts_only_real_changes() {
        let store = store();
        let id = store.insert_lessons(vec![lesson("Art", 2)]).await.unwrap().inserted_ids[0];

        let same = LessonPatch { subject: Some("Art".to_string()), ..Default::default() };
        let result = store.update_lesson(id, same).await.unwrap();
        assert_eq!(result, UpdateResult { matched_count: 1, modified_count: 0 });

        let moved = LessonPatch { location: Some("Paris".to_string()), ..Default::default() };
        let result = store.update_lesson(id, moved).await.unwrap();
        assert_eq!(result, UpdateResult { matched_count: 1, modified_count: 1 });

        let unknown = store.update_lesson(Uuid::new_v4(), LessonPatch::default()).await.unwrap();
        assert_eq!(unknown, UpdateResult { matched_count: 0, modified_count: 0 });
    }
}
