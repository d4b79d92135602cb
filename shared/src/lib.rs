use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: Uuid,
    pub subject: String,
    pub location: String,
    pub price: f64,
    pub space: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewLesson {
    pub subject: String,
    pub location: String,
    pub price: f64,
    pub space: i32,
}

/// Partial update of a lesson. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LessonPatch {
    pub subject: Option<String>,
    pub location: Option<String>,
    pub price: Option<f64>,
    pub space: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    #[serde(rename = "lessonIDs")]
    pub lesson_ids: Vec<Uuid>,
    pub spaces: HashMap<Uuid, u32>,
    pub created_at: DateTime<Utc>,
}

/// An order that passed presence validation and is ready to be booked.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub name: String,
    pub phone: String,
    pub lesson_ids: Vec<Uuid>,
    pub spaces: HashMap<Uuid, u32>,
}

/// Raw body of `POST /api/orders`. Every field is optional here so that a
/// missing field reports the same error as an empty one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaceOrderRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(rename = "lessonIDs")]
    pub lesson_ids: Option<Vec<Uuid>>,
    pub spaces: Option<HashMap<Uuid, u32>>,
}

/// Seats requested for a single lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatBooking {
    pub lesson_id: Uuid,
    pub seats: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkInsertResult {
    pub inserted_count: usize,
    pub inserted_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("All fields are required.")]
    MissingFields,
    #[error("No space count given for lesson: {0}")]
    MissingSeatCount(Uuid),
    #[error("Requested space count {seats} for lesson {lesson_id} is too large")]
    SeatCountOutOfRange { lesson_id: Uuid, seats: u32 },
    #[error("At least one lesson is required")]
    EmptyBatch,
    #[error("Space must not be negative, got {0}")]
    NegativeSpace(i32),
    #[error("Price must be a non-negative number, got {0}")]
    InvalidPrice(f64),
    #[error("Invalid request: {0}")]
    Malformed(String),
}

fn check_space(space: i32) -> Result<(), ValidationError> {
    if space < 0 {
        return Err(ValidationError::NegativeSpace(space));
    }
    Ok(())
}

fn check_price(price: f64) -> Result<(), ValidationError> {
    if !price.is_finite() || price < 0.0 {
        return Err(ValidationError::InvalidPrice(price));
    }
    Ok(())
}

impl NewLesson {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_space(self.space)?;
        check_price(self.price)
    }

    pub fn validate_batch(lessons: &[NewLesson]) -> Result<(), ValidationError> {
        if lessons.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        lessons.iter().try_for_each(NewLesson::validate)
    }

    pub fn into_lesson(self, id: Uuid) -> Lesson {
        Lesson {
            id,
            subject: self.subject,
            location: self.location,
            price: self.price,
            space: self.space,
        }
    }
}

impl LessonPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(space) = self.space {
            check_space(space)?;
        }
        if let Some(price) = self.price {
            check_price(price)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.subject.is_none() && self.location.is_none() && self.price.is_none() && self.space.is_none()
    }

    /// Applies the present fields to `lesson`, returning whether anything changed.
    pub fn apply_to(&self, lesson: &mut Lesson) -> bool {
        let before = lesson.clone();
        if let Some(subject) = &self.subject {
            lesson.subject = subject.clone();
        }
        if let Some(location) = &self.location {
            lesson.location = location.clone();
        }
        if let Some(price) = self.price {
            lesson.price = price;
        }
        if let Some(space) = self.space {
            lesson.space = space;
        }
        *lesson != before
    }
}

impl PlaceOrderRequest {
    /// Structural presence check only: each field must be present and non-empty.
    pub fn validate(self) -> Result<NewOrder, ValidationError> {
        let name = self.name.filter(|name| !name.is_empty());
        let phone = self.phone.filter(|phone| !phone.is_empty());
        let lesson_ids = self.lesson_ids.filter(|ids| !ids.is_empty());
        let spaces = self.spaces.filter(|spaces| !spaces.is_empty());

        match (name, phone, lesson_ids, spaces) {
            (Some(name), Some(phone), Some(lesson_ids), Some(spaces)) => Ok(NewOrder {
                name,
                phone,
                lesson_ids,
                spaces,
            }),
            _ => Err(ValidationError::MissingFields),
        }
    }
}

impl NewOrder {
    /// One booking per distinct lesson, sorted by lesson id so that row locks
    /// are always taken in the same order.
    pub fn seat_bookings(&self) -> Result<Vec<SeatBooking>, ValidationError> {
        let mut bookings = BTreeMap::new();
        for lesson_id in &self.lesson_ids {
            let seats = *self
                .spaces
                .get(lesson_id)
                .ok_or(ValidationError::MissingSeatCount(*lesson_id))?;
            let seats = i32::try_from(seats).map_err(|_| ValidationError::SeatCountOutOfRange {
                lesson_id: *lesson_id,
                seats,
            })?;
            bookings.insert(*lesson_id, seats);
        }

        Ok(bookings
            .into_iter()
            .map(|(lesson_id, seats)| SeatBooking { lesson_id, seats })
            .collect())
    }

    pub fn into_order(self, id: Uuid, created_at: DateTime<Utc>) -> Order {
        Order {
            id,
            name: self.name,
            phone: self.phone,
            lesson_ids: self.lesson_ids,
            spaces: self.spaces,
            created_at,
        }
    }
}
