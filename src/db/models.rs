use rusqlite::types::Type;
use rusqlite::Row;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::images::domain::Imageable;
use crate::restaurants::domain::{PriceRange, WeeklyHours};
use crate::reviews::domain::ReviewStatus;
use crate::users::domain::Role;

/// A text column held a value no enum variant matches.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Read a TEXT column holding JSON.
fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub bio: Option<String>,
    pub avatar_path: Option<String>,
    pub location: Option<String>,
    pub is_public: bool,
    pub email_notifications: bool,
    pub is_admin: bool,
    pub role: Role,
    pub is_active: bool,
    pub last_login_at: Option<String>,
    pub banned_at: Option<String>,
    pub restaurant_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    pub const COLUMNS: &'static str = "id, name, email, password_hash, bio, avatar_path, location, \
        is_public, email_notifications, is_admin, role, is_active, last_login_at, banned_at, \
        restaurant_id, created_at, updated_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            bio: row.get(4)?,
            avatar_path: row.get(5)?,
            location: row.get(6)?,
            is_public: row.get(7)?,
            email_notifications: row.get(8)?,
            is_admin: row.get(9)?,
            role: row.get(10)?,
            is_active: row.get(11)?,
            last_login_at: row.get(12)?,
            banned_at: row.get(13)?,
            restaurant_id: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin || self.role.is_admin()
    }

    pub fn is_restaurant_owner(&self) -> bool {
        self.restaurant_id.is_some() || self.role == Role::RestaurantOwner
    }

    pub fn avatar_url(&self) -> Option<String> {
        self.avatar_path.as_ref().map(|p| format!("/uploads/{}", p))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: String,
    pub name: String,
    pub cuisine: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub hours: WeeklyHours,
    pub price_range: PriceRange,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub features: Vec<String>,
    pub average_rating: f64,
    pub review_count: i64,
    pub is_active: bool,
    pub owner_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Restaurant {
    pub const COLUMNS: &'static str = "id, name, cuisine, description, address, phone, hours, \
        price_range, location, latitude, longitude, features, average_rating, review_count, \
        is_active, owner_id, created_at, updated_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            cuisine: row.get(2)?,
            description: row.get(3)?,
            address: row.get(4)?,
            phone: row.get(5)?,
            hours: json_column(row, 6)?,
            price_range: row.get(7)?,
            location: row.get(8)?,
            latitude: row.get(9)?,
            longitude: row.get(10)?,
            features: json_column(row, 11)?,
            average_rating: row.get(12)?,
            review_count: row.get(13)?,
            is_active: row.get(14)?,
            owner_id: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub user_id: String,
    pub restaurant_id: String,
    pub food_rating: i64,
    pub service_rating: i64,
    pub ambiance_rating: i64,
    pub value_rating: i64,
    pub overall_rating: f64,
    pub title: String,
    pub content: String,
    pub visit_date: Option<String>,
    pub recommend: Option<bool>,
    pub helpful_count: i64,
    pub is_verified: bool,
    pub status: ReviewStatus,
    pub approved_at: Option<String>,
    pub rejected_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Review {
    pub const COLUMNS: &'static str = "id, user_id, restaurant_id, food_rating, service_rating, \
        ambiance_rating, value_rating, overall_rating, title, content, visit_date, recommend, \
        helpful_count, is_verified, status, approved_at, rejected_at, created_at, updated_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            restaurant_id: row.get(2)?,
            food_rating: row.get(3)?,
            service_rating: row.get(4)?,
            ambiance_rating: row.get(5)?,
            value_rating: row.get(6)?,
            overall_rating: row.get(7)?,
            title: row.get(8)?,
            content: row.get(9)?,
            visit_date: row.get(10)?,
            recommend: row.get(11)?,
            helpful_count: row.get(12)?,
            is_verified: row.get(13)?,
            status: row.get(14)?,
            approved_at: row.get(15)?,
            rejected_at: row.get(16)?,
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub id: String,
    pub review_id: String,
    pub user_id: String,
    pub response: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ReviewResponse {
    pub const COLUMNS: &'static str = "id, review_id, user_id, response, created_at, updated_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            review_id: row.get(1)?,
            user_id: row.get(2)?,
            response: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub owner: Imageable,
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
    pub path: String,
    pub url: String,
    pub is_primary: bool,
    pub sort_order: i64,
    pub created_at: String,
}

impl Image {
    pub const COLUMNS: &'static str = "id, imageable_kind, imageable_id, filename, original_name, \
        mime_type, size, path, url, is_primary, sort_order, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let kind: String = row.get(1)?;
        let owner_id: String = row.get(2)?;
        let owner = Imageable::from_parts(&kind, owner_id).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
        })?;
        Ok(Self {
            id: row.get(0)?,
            owner,
            filename: row.get(3)?,
            original_name: row.get(4)?,
            mime_type: row.get(5)?,
            size: row.get(6)?,
            path: row.get(7)?,
            url: row.get(8)?,
            is_primary: row.get(9)?,
            sort_order: row.get(10)?,
            created_at: row.get(11)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub data: serde_json::Value,
    pub read_at: Option<String>,
    pub created_at: String,
}

impl Notification {
    pub const COLUMNS: &'static str = "id, user_id, kind, data, read_at, created_at";

    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get(2)?,
            data: json_column(row, 3)?,
            read_at: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}
