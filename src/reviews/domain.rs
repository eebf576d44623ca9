use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::models::UnknownVariant;
use crate::error::{AppError, AppResult, FieldErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// An admin decision on a pending review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Moderation {
    Approve,
    Reject,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    /// Admins only decide on pending reviews; a decided review goes back to
    /// pending through an author edit, never directly to the other outcome.
    pub fn apply(self, action: Moderation) -> AppResult<ReviewStatus> {
        match (self, action) {
            (ReviewStatus::Pending, Moderation::Approve) => Ok(ReviewStatus::Approved),
            (ReviewStatus::Pending, Moderation::Reject) => Ok(ReviewStatus::Rejected),
            (current, _) => Err(AppError::InvalidTransition(format!(
                "Review is already {}",
                current
            ))),
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReviewStatus::Pending),
            "approved" => Ok(ReviewStatus::Approved),
            "rejected" => Ok(ReviewStatus::Rejected),
            other => Err(UnknownVariant {
                kind: "review status",
                value: other.to_string(),
            }),
        }
    }
}

impl FromSql for ReviewStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for ReviewStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

/// The four scored categories of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubRatings {
    pub food: i64,
    pub service: i64,
    pub ambiance: i64,
    pub value: i64,
}

/// Payload for creating or editing a review.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReviewInput {
    #[validate(range(min = 1, max = 5, message = "Food rating must be between 1 and 5"))]
    pub food_rating: i64,
    #[validate(range(min = 1, max = 5, message = "Service rating must be between 1 and 5"))]
    pub service_rating: i64,
    #[validate(range(min = 1, max = 5, message = "Ambiance rating must be between 1 and 5"))]
    pub ambiance_rating: i64,
    #[validate(range(min = 1, max = 5, message = "Value rating must be between 1 and 5"))]
    pub value_rating: i64,
    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters"))]
    pub title: String,
    #[validate(length(min = 10, max = 5000, message = "Review must be 10 to 5000 characters"))]
    pub content: String,
    #[serde(default)]
    pub visit_date: Option<String>,
    #[serde(default)]
    pub recommend: Option<bool>,
}

impl ReviewInput {
    pub fn ratings(&self) -> SubRatings {
        SubRatings {
            food: self.food_rating,
            service: self.service_rating,
            ambiance: self.ambiance_rating,
            value: self.value_rating,
        }
    }

    /// Trim text fields and validate everything, collecting all field errors.
    pub fn validated(mut self) -> AppResult<Self> {
        self.title = self.title.trim().to_string();
        self.content = self.content.trim().to_string();
        self.visit_date = self
            .visit_date
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => match AppError::from(e) {
                AppError::Validation(fields) => fields,
                other => return Err(other),
            },
        };

        if let Some(date) = &self.visit_date {
            match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
                Ok(d) if d > Utc::now().date_naive() => {
                    errors
                        .entry("visit_date".into())
                        .or_default()
                        .push("Visit date cannot be in the future".into());
                }
                Ok(_) => {}
                Err(_) => {
                    errors
                        .entry("visit_date".into())
                        .or_default()
                        .push("Visit date must be YYYY-MM-DD".into());
                }
            }
        }

        if errors.is_empty() {
            Ok(self)
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

/// HTML form variant of [`ReviewInput`]; selects post empty strings for "no answer".
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewForm {
    pub food_rating: i64,
    pub service_rating: i64,
    pub ambiance_rating: i64,
    pub value_rating: i64,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub visit_date: Option<String>,
    #[serde(default)]
    pub recommend: Option<String>,
}

impl From<ReviewForm> for ReviewInput {
    fn from(form: ReviewForm) -> Self {
        let recommend = match form.recommend.as_deref().map(str::trim) {
            Some("yes") | Some("true") | Some("1") => Some(true),
            Some("no") | Some("false") | Some("0") => Some(false),
            _ => None,
        };
        ReviewInput {
            food_rating: form.food_rating,
            service_rating: form.service_rating,
            ambiance_rating: form.ambiance_rating,
            value_rating: form.value_rating,
            title: form.title,
            content: form.content,
            visit_date: form.visit_date,
            recommend,
        }
    }
}
