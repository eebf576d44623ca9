use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::db::models::UnknownVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PriceRange {
    #[serde(rename = "$")]
    Budget,
    #[default]
    #[serde(rename = "$$")]
    Moderate,
    #[serde(rename = "$$$")]
    Expensive,
    #[serde(rename = "$$$$")]
    Luxury,
}

impl PriceRange {
    pub const ALL: [PriceRange; 4] = [
        PriceRange::Budget,
        PriceRange::Moderate,
        PriceRange::Expensive,
        PriceRange::Luxury,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceRange::Budget => "$",
            PriceRange::Moderate => "$$",
            PriceRange::Expensive => "$$$",
            PriceRange::Luxury => "$$$$",
        }
    }
}

impl fmt::Display for PriceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceRange {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PriceRange::ALL
            .into_iter()
            .find(|p| p.as_str() == s.trim())
            .ok_or_else(|| UnknownVariant {
                kind: "price_range",
                value: s.to_string(),
            })
    }
}

impl FromSql for PriceRange {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

impl ToSql for PriceRange {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub fn label(&self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
            Weekday::Sunday => "Sunday",
        }
    }
}

/// Opening hours for one day. `open`/`close` are "HH:MM"; a closed day carries neither.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub day: Weekday,
    #[serde(default)]
    pub closed: bool,
    pub open: Option<String>,
    pub close: Option<String>,
}

impl DayHours {
    pub fn display(&self) -> String {
        match (self.closed, &self.open, &self.close) {
            (false, Some(open), Some(close)) => format!("{} – {}", open, close),
            _ => "Closed".to_string(),
        }
    }
}

/// Weekly schedule, stored as a JSON array. Days absent from the list are unknown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct WeeklyHours(pub Vec<DayHours>);

impl WeeklyHours {
    /// Checks times and day uniqueness, returning the schedule sorted Monday first.
    pub fn normalized(mut self) -> Result<Self, String> {
        self.0.sort_by_key(|d| d.day);
        for pair in self.0.windows(2) {
            if pair[0].day == pair[1].day {
                return Err(format!("{} is listed more than once", pair[0].day.label()));
            }
        }

        for day in &mut self.0 {
            if day.closed {
                day.open = None;
                day.close = None;
                continue;
            }
            let (open, close) = match (&day.open, &day.close) {
                (Some(open), Some(close)) => (parse_time(open)?, parse_time(close)?),
                _ => {
                    return Err(format!(
                        "{} needs both opening and closing times",
                        day.day.label()
                    ))
                }
            };
            // Closing after midnight is written as an earlier time, e.g. 18:00–02:00.
            if open == close {
                return Err(format!("{} opens and closes at the same time", day.day.label()));
            }
        }
        Ok(self)
    }

    pub fn days(&self) -> &[DayHours] {
        &self.0
    }
}

fn parse_time(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| format!("'{}' is not a HH:MM time", value))
}

/// Trim, drop empties and duplicates while keeping first-seen order.
pub fn normalize_features(features: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(features.len());
    for feature in features {
        let feature = feature.trim().to_string();
        if feature.is_empty() || out.iter().any(|f| f.eq_ignore_ascii_case(&feature)) {
            continue;
        }
        out.push(feature);
    }
    out
}

/// Parse a comma separated feature list as typed into a form.
pub fn parse_feature_list(raw: &str) -> Vec<String> {
    normalize_features(raw.split(',').map(str::to_string).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RestaurantSort {
    #[default]
    Rating,
    Reviews,
    Name,
    Newest,
}

impl RestaurantSort {
    pub fn order_by(&self) -> &'static str {
        match self {
            RestaurantSort::Rating => "average_rating DESC, review_count DESC, name ASC",
            RestaurantSort::Reviews => "review_count DESC, average_rating DESC, name ASC",
            RestaurantSort::Name => "name COLLATE NOCASE ASC",
            RestaurantSort::Newest => "created_at DESC, id DESC",
        }
    }
}

/// Query string of the public restaurant listing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RestaurantFilters {
    pub search: Option<String>,
    pub cuisine: Option<String>,
    pub price_range: Option<String>,
    pub location: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub min_rating: Option<f64>,
    pub sort: RestaurantSort,
    pub page: Option<u32>,
}

/// Query strings send `min_rating=` for "any"; treat that as absent.
fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

impl RestaurantFilters {
    /// Blank strings from empty form fields count as absent.
    pub fn non_empty(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(day: Weekday, open: &str, close: &str) -> DayHours {
        DayHours {
            day,
            closed: false,
            open: Some(open.into()),
            close: Some(close.into()),
        }
    }

    #[test]
    fn price_range_parses_symbols() {
        assert_eq!("$$$".parse::<PriceRange>().unwrap(), PriceRange::Expensive);
        assert_eq!(PriceRange::Luxury.to_string(), "$$$$");
        assert!("$$$$$".parse::<PriceRange>().is_err());
        assert_eq!(
            serde_json::to_string(&PriceRange::Budget).unwrap(),
            "\"$\""
        );
    }

    #[test]
    fn hours_are_sorted_and_validated() {
        let hours = WeeklyHours(vec![
            day(Weekday::Friday, "18:00", "02:00"),
            day(Weekday::Monday, "09:00", "17:00"),
        ])
        .normalized()
        .unwrap();
        assert_eq!(hours.days()[0].day, Weekday::Monday);
        assert_eq!(hours.days()[1].display(), "18:00 – 02:00");
    }

    #[test]
    fn hours_reject_duplicates_and_bad_times() {
        let dup = WeeklyHours(vec![
            day(Weekday::Monday, "09:00", "17:00"),
            day(Weekday::Monday, "10:00", "18:00"),
        ]);
        assert!(dup.normalized().is_err());

        let bad = WeeklyHours(vec![day(Weekday::Tuesday, "9am", "17:00")]);
        assert!(bad.normalized().is_err());
    }

    #[test]
    fn closed_days_drop_times() {
        let hours = WeeklyHours(vec![DayHours {
            day: Weekday::Sunday,
            closed: true,
            open: Some("10:00".into()),
            close: None,
        }])
        .normalized()
        .unwrap();
        assert_eq!(hours.days()[0].open, None);
        assert_eq!(hours.days()[0].display(), "Closed");
    }

    #[test]
    fn features_are_deduplicated() {
        let features = parse_feature_list(" Terrace, wifi,, WiFi ,terrace,Parking");
        assert_eq!(features, vec!["Terrace", "wifi", "Parking"]);
    }
}
