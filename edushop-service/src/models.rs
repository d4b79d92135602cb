use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use num_traits::{FromPrimitive, ToPrimitive};
use uuid::Uuid;
use shared::*;
use crate::error::StoreError;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crate::schema::lessons)]
pub struct DbLesson {
    pub id: Uuid,
    pub subject: String,
    pub location: String,
    pub price: BigDecimal,
    pub space: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::lessons)]
pub struct NewDbLesson {
    pub id: Uuid,
    pub subject: String,
    pub location: String,
    pub price: BigDecimal,
    pub space: i32,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = crate::schema::lessons)]
pub struct LessonChangeset {
    pub subject: Option<String>,
    pub location: Option<String>,
    pub price: Option<BigDecimal>,
    pub space: Option<i32>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct DbOrder {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub lesson_ids: serde_json::Value,
    pub spaces: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

fn to_numeric(price: f64) -> Result<BigDecimal, StoreError> {
    BigDecimal::from_f64(price)
        .ok_or_else(|| StoreError::Persistence(format!("Price {} is not representable", price)))
}

impl TryFrom<DbLesson> for Lesson {
    type Error = StoreError;

    fn try_from(db_lesson: DbLesson) -> Result<Self, Self::Error> {
        let price = db_lesson.price.to_f64().filter(|price| price.is_finite()).ok_or_else(|| {
            StoreError::Persistence(format!("Price {} of lesson {} is out of range", db_lesson.price, db_lesson.id))
        })?;

        Ok(Self {
            id: db_lesson.id,
            subject: db_lesson.subject,
            location: db_lesson.location,
            price,
            space: db_lesson.space,
        })
    }
}

impl NewDbLesson {
    pub fn new(id: Uuid, lesson: NewLesson) -> Result<Self, StoreError> {
        Ok(Self {
            id,
            price: to_numeric(lesson.price)?,
            subject: lesson.subject,
            location: lesson.location,
            space: lesson.space,
        })
    }
}

impl TryFrom<LessonPatch> for LessonChangeset {
    type Error = StoreError;

    fn try_from(patch: LessonPatch) -> Result<Self, Self::Error> {
        Ok(Self {
            price: patch.price.map(to_numeric).transpose()?,
            subject: patch.subject,
            location: patch.location,
            space: patch.space,
            updated_at: Some(Utc::now()),
        })
    }
}

impl TryFrom<Order> for DbOrder {
    type Error = StoreError;

    fn try_from(order: Order) -> Result<Self, Self::Error> {
        Ok(Self {
            id: order.id,
            name: order.name,
            phone: order.phone,
            lesson_ids: serde_json::to_value(order.lesson_ids)?,
            spaces: serde_json::to_value(order.spaces)?,
            created_at: order.created_at,
        })
    }
}

impl TryFrom<DbOrder> for Order {
    type Error = StoreError;

    fn try_from(db_order: DbOrder) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db_order.id,
            name: db_order.name,
            phone: db_order.phone,
            lesson_ids: serde_json::from_value(db_order.lesson_ids)?,
            spaces: serde_json::from_value(db_order.spaces)?,
            created_at: db_order.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::str::FromStr;

    #[test]
    fn order_survives_the_jsonb_columns() {
        let lesson = Uuid::new_v4();
        let order = Order {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            phone: "0123".to_string(),
            lesson_ids: vec![lesson, lesson],
            spaces: HashMap::from([(lesson, 2)]),
            created_at: Utc::now(),
        };

        let db_order = DbOrder::try_from(order.clone()).unwrap();
        assert_eq!(db_order.lesson_ids, serde_json::json!([lesson, lesson]));
        assert_eq!(Order::try_from(db_order).unwrap(), order);
    }

    #[test]
    fn corrupt_spaces_column_is_a_persistence_error() {
        let db_order = DbOrder {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            phone: "0123".to_string(),
            lesson_ids: serde_json::json!([]),
            spaces: serde_json::json!("not a map"),
            created_at: Utc::now(),
        };

        assert!(matches!(Order::try_from(db_order), Err(StoreError::Persistence(_))));
    }

    #[test]
    fn lesson_price_converts_through_numeric() {
        let id = Uuid::new_v4();
        let row = NewDbLesson::new(
            id,
            NewLesson {
                subject: "Art".to_string(),
                location: "Leeds".to_string(),
                price: 12.5,
                space: 2,
            },
        )
        .unwrap();

        let lesson = Lesson::try_from(DbLesson {
            id,
            subject: row.subject,
            location: row.location,
            price: row.price,
            space: row.space,
            created_at: None,
            updated_at: None,
        })
        .unwrap();
        assert_eq!(lesson.price, 12.5);
    }

    #[test]
    fn lesson_price_beyond_f64_is_a_persistence_error() {
        let db_lesson = DbLesson {
            id: Uuid::new_v4(),
            subject: "Art".to_string(),
            location: "Leeds".to_string(),
            price: BigDecimal::from_str("1e400").unwrap(),
            space: 2,
            created_at: None,
            updated_at: None,
        };

        assert!(matches!(Lesson::try_from(db_lesson), Err(StoreError::Persistence(_))));
    }
}
