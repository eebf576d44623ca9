use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::models::Restaurant;
use crate::db::new_id;
use crate::error::{AppError, AppResult};
use crate::images::domain::Imageable;
use crate::pagination::{Page, PageRequest};
use crate::restaurants::domain::{
    normalize_features, parse_feature_list, PriceRange, RestaurantFilters, WeeklyHours,
};

/// A restaurant with its primary image, as shown in listings.
#[derive(Debug, Clone, Serialize)]
pub struct RestaurantCard {
    #[serde(flatten)]
    pub restaurant: Restaurant,
    pub primary_image: Option<String>,
}

const PRIMARY_IMAGE_SQL: &str = "(SELECT url FROM images i WHERE i.imageable_kind = 'restaurant' \
     AND i.imageable_id = restaurants.id AND i.is_primary = 1)";

impl RestaurantCard {
    fn select() -> String {
        format!("SELECT {}, {} FROM restaurants", Restaurant::COLUMNS, PRIMARY_IMAGE_SQL)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            restaurant: Restaurant::from_row(row)?,
            primary_image: row.get(18)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RestaurantInput {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "Cuisine is required"))]
    pub cuisine: String,
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    #[serde(default)]
    pub description: Option<String>,
    #[validate(length(max = 255, message = "Address must be at most 255 characters"))]
    #[serde(default)]
    pub address: Option<String>,
    #[validate(length(max = 50, message = "Phone must be at most 50 characters"))]
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub hours: WeeklyHours,
    #[serde(default)]
    pub price_range: PriceRange,
    #[validate(length(max = 255, message = "Location must be at most 255 characters"))]
    #[serde(default)]
    pub location: Option<String>,
    #[validate(range(min = -90.0, max = 90.0, message = "Latitude must be between -90 and 90"))]
    #[serde(default)]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0, message = "Longitude must be between -180 and 180"))]
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub features: Vec<String>,
}

impl RestaurantInput {
    fn validated(self) -> AppResult<Self> {
        let input = RestaurantInput {
            name: self.name.trim().to_string(),
            cuisine: self.cuisine.trim().to_string(),
            description: trimmed(self.description),
            address: trimmed(self.address),
            phone: trimmed(self.phone),
            location: trimmed(self.location),
            features: normalize_features(self.features),
            hours: self
                .hours
                .normalized()
                .map_err(|msg| AppError::field("hours", msg))?,
            ..self
        };
        input.validate()?;
        Ok(input)
    }
}

/// HTML form for a restaurant. Numbers arrive as text and blank fields as empty strings;
/// hours are edited through the API and carried over unchanged.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RestaurantForm {
    pub name: String,
    pub cuisine: String,
    pub description: String,
    pub address: String,
    pub phone: String,
    pub price_range: String,
    pub location: String,
    pub latitude: String,
    pub longitude: String,
    pub features: String,
}

impl RestaurantForm {
    pub fn into_input(self, hours: WeeklyHours) -> AppResult<RestaurantInput> {
        let price_range = if self.price_range.trim().is_empty() {
            PriceRange::default()
        } else {
            self.price_range
                .parse()
                .map_err(|_| AppError::field("price_range", "Choose $, $$, $$$ or $$$$"))?
        };
        let coordinate = |field: &str, raw: &str| -> AppResult<Option<f64>> {
            let raw = raw.trim();
            if raw.is_empty() {
                return Ok(None);
            }
            raw.parse()
                .map(Some)
                .map_err(|_| AppError::field(field, "Must be a number"))
        };
        Ok(RestaurantInput {
            latitude: coordinate("latitude", &self.latitude)?,
            longitude: coordinate("longitude", &self.longitude)?,
            name: self.name,
            cuisine: self.cuisine,
            description: Some(self.description),
            address: Some(self.address),
            phone: Some(self.phone),
            hours,
            price_range,
            location: Some(self.location),
            features: parse_feature_list(&self.features),
        })
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn find(conn: &Connection, id: &str) -> AppResult<Restaurant> {
    conn.query_row(
        &format!("SELECT {} FROM restaurants WHERE id = ?1", Restaurant::COLUMNS),
        params![id],
        Restaurant::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

/// Public lookup: inactive listings are hidden unless the viewer is an admin.
pub fn find_visible(conn: &Connection, id: &str, viewer_is_admin: bool) -> AppResult<Restaurant> {
    let restaurant = find(conn, id)?;
    if !restaurant.is_active && !viewer_is_admin {
        return Err(AppError::NotFound);
    }
    Ok(restaurant)
}

pub fn list(conn: &Connection, filters: RestaurantFilters, per_page: u32) -> AppResult<Page<RestaurantCard>> {
    let mut clauses: Vec<String> = vec!["is_active = 1".into()];
    let mut values: Vec<SqlValue> = Vec::new();

    if let Some(search) = RestaurantFilters::non_empty(&filters.search) {
        clauses.push("(name LIKE ? OR cuisine LIKE ? OR description LIKE ?)".into());
        let pattern = format!("%{}%", search);
        for _ in 0..3 {
            values.push(SqlValue::Text(pattern.clone()));
        }
    }
    if let Some(cuisine) = RestaurantFilters::non_empty(&filters.cuisine) {
        clauses.push("cuisine = ? COLLATE NOCASE".into());
        values.push(SqlValue::Text(cuisine.to_string()));
    }
    if let Some(price) = RestaurantFilters::non_empty(&filters.price_range) {
        let price: PriceRange = price
            .parse()
            .map_err(|_| AppError::field("price_range", "Choose $, $$, $$$ or $$$$"))?;
        clauses.push("price_range = ?".into());
        values.push(SqlValue::Text(price.as_str().to_string()));
    }
    if let Some(location) = RestaurantFilters::non_empty(&filters.location) {
        clauses.push("location LIKE ?".into());
        values.push(SqlValue::Text(format!("%{}%", location)));
    }
    if let Some(min) = filters.min_rating {
        if !(0.0..=5.0).contains(&min) {
            return Err(AppError::field("min_rating", "Minimum rating must be between 0 and 5"));
        }
        clauses.push("average_rating >= ?".into());
        values.push(SqlValue::Real(min));
    }

    let where_sql = format!("WHERE {}", clauses.join(" AND "));
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM restaurants {}", where_sql),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    let request = PageRequest::new(filters.page, per_page);
    let sql = format!(
        "{} {} ORDER BY {} LIMIT {} OFFSET {}",
        RestaurantCard::select(),
        where_sql,
        filters.sort.order_by(),
        request.limit(),
        request.offset()
    );
    let mut stmt = conn.prepare(&sql)?;
    let cards = stmt
        .query_map(params_from_iter(values.iter()), RestaurantCard::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(request.into_page(cards, total))
}

/// Highest rated active restaurants, for the home page and admin dashboard.
pub fn top_rated(conn: &Connection, limit: i64) -> AppResult<Vec<RestaurantCard>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE is_active = 1 AND review_count > 0
         ORDER BY average_rating DESC, review_count DESC LIMIT ?1",
        RestaurantCard::select()
    ))?;
    let cards = stmt
        .query_map(params![limit], RestaurantCard::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cards)
}

/// Home page picks: rated restaurants by rating, then the newest unrated ones
/// so a young site still has something to show.
pub fn featured(conn: &Connection, limit: i64) -> AppResult<Vec<RestaurantCard>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE is_active = 1
         ORDER BY review_count > 0 DESC, average_rating DESC, review_count DESC,
                  created_at DESC, id DESC
         LIMIT ?1",
        RestaurantCard::select()
    ))?;
    let cards = stmt
        .query_map(params![limit], RestaurantCard::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cards)
}

pub fn cuisines(conn: &Connection) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT cuisine FROM restaurants WHERE is_active = 1 ORDER BY cuisine COLLATE NOCASE",
    )?;
    let cuisines = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cuisines)
}

pub fn create(conn: &Connection, input: RestaurantInput) -> AppResult<Restaurant> {
    let input = input.validated()?;
    let id = new_id();
    conn.execute(
        "INSERT INTO restaurants (id, name, cuisine, description, address, phone, hours,
             price_range, location, latitude, longitude, features)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            id,
            input.name,
            input.cuisine,
            input.description,
            input.address,
            input.phone,
            serde_json::to_string(&input.hours)?,
            input.price_range,
            input.location,
            input.latitude,
            input.longitude,
            serde_json::to_string(&input.features)?,
        ],
    )?;
    tracing::info!(restaurant_id = %id, "Created restaurant");
    find(conn, &id)
}

pub fn update(conn: &Connection, id: &str, input: RestaurantInput) -> AppResult<Restaurant> {
    let input = input.validated()?;
    let changed = conn.execute(
        "UPDATE restaurants SET name = ?1, cuisine = ?2, description = ?3, address = ?4,
             phone = ?5, hours = ?6, price_range = ?7, location = ?8, latitude = ?9,
             longitude = ?10, features = ?11, updated_at = datetime('now')
         WHERE id = ?12",
        params![
            input.name,
            input.cuisine,
            input.description,
            input.address,
            input.phone,
            serde_json::to_string(&input.hours)?,
            input.price_range,
            input.location,
            input.latitude,
            input.longitude,
            serde_json::to_string(&input.features)?,
            id,
        ],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    find(conn, id)
}

pub fn toggle_active(conn: &Connection, id: &str) -> AppResult<Restaurant> {
    let changed = conn.execute(
        "UPDATE restaurants SET is_active = NOT is_active, updated_at = datetime('now') WHERE id = ?1",
        params![id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    find(conn, id)
}

/// Delete a restaurant with its reviews and image rows. Returns the stored
/// image paths so the caller can remove the files.
pub fn delete(conn: &mut Connection, id: &str) -> AppResult<Vec<String>> {
    let tx = crate::db::write_tx(conn)?;
    find(&tx, id)?;

    let review_ids: Vec<String> = {
        let mut stmt = tx.prepare("SELECT id FROM reviews WHERE restaurant_id = ?1")?;
        let ids = stmt
            .query_map(params![id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };

    let mut paths = crate::images::repository::delete_all_for(&tx, &Imageable::Restaurant(id.to_string()))?;
    for review_id in review_ids {
        paths.extend(crate::images::repository::delete_all_for(
            &tx,
            &Imageable::Review(review_id),
        )?);
    }

    tx.execute("DELETE FROM restaurants WHERE id = ?1", params![id])?;
    tx.commit()?;

    tracing::info!(restaurant_id = %id, "Deleted restaurant");
    Ok(paths)
}

/// Admin listing: every restaurant, optionally filtered by name and active flag.
pub fn admin_list(
    conn: &Connection,
    search: Option<String>,
    active: Option<bool>,
    page: Option<u32>,
    per_page: u32,
) -> AppResult<Page<RestaurantCard>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();
    if let Some(search) = trimmed(search) {
        clauses.push("(name LIKE ? OR location LIKE ?)".into());
        let pattern = format!("%{}%", search);
        values.push(SqlValue::Text(pattern.clone()));
        values.push(SqlValue::Text(pattern));
    }
    if let Some(active) = active {
        clauses.push("is_active = ?".into());
        values.push(SqlValue::Integer(active as i64));
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM restaurants {}", where_sql),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;
    let request = PageRequest::new(page, per_page);
    let mut stmt = conn.prepare(&format!(
        "{} {} ORDER BY name COLLATE NOCASE ASC LIMIT {} OFFSET {}",
        RestaurantCard::select(),
        where_sql,
        request.limit(),
        request.offset()
    ))?;
    let cards = stmt
        .query_map(params_from_iter(values.iter()), RestaurantCard::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(request.into_page(cards, total))
}

// --- Favorites ---

/// Toggle a favorite; returns whether the restaurant is now a favorite.
pub fn toggle_favorite(conn: &Connection, user_id: &str, restaurant_id: &str) -> AppResult<bool> {
    find_visible(conn, restaurant_id, false)?;

    let removed = conn.execute(
        "DELETE FROM favorites WHERE user_id = ?1 AND restaurant_id = ?2",
        params![user_id, restaurant_id],
    )?;
    if removed > 0 {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO favorites (user_id, restaurant_id) VALUES (?1, ?2)",
        params![user_id, restaurant_id],
    )?;
    Ok(true)
}

pub fn is_favorite(conn: &Connection, user_id: &str, restaurant_id: &str) -> AppResult<bool> {
    Ok(conn.query_row(
        "SELECT COUNT(*) > 0 FROM favorites WHERE user_id = ?1 AND restaurant_id = ?2",
        params![user_id, restaurant_id],
        |row| row.get(0),
    )?)
}

pub fn favorites(conn: &Connection, user_id: &str) -> AppResult<Vec<RestaurantCard>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE restaurants.is_active = 1
           AND restaurants.id IN (SELECT restaurant_id FROM favorites WHERE user_id = ?1)
         ORDER BY (SELECT f.created_at FROM favorites f
                   WHERE f.restaurant_id = restaurants.id AND f.user_id = ?1) DESC",
        RestaurantCard::select()
    ))?;
    let cards = stmt
        .query_map(params![user_id], RestaurantCard::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(cards)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;
    use crate::restaurants::domain::RestaurantSort;

    fn input(name: &str, cuisine: &str, price: PriceRange) -> RestaurantInput {
        RestaurantInput {
            name: name.into(),
            cuisine: cuisine.into(),
            description: Some(format!("{} serves {}", name, cuisine)),
            address: None,
            phone: None,
            hours: WeeklyHours::default(),
            price_range: price,
            location: Some("Lisbon".into()),
            latitude: None,
            longitude: None,
            features: vec!["Terrace".into(), "terrace".into()],
        }
    }

    fn set_rating(conn: &Connection, id: &str, avg: f64, count: i64) {
        conn.execute(
            "UPDATE restaurants SET average_rating = ?1, review_count = ?2 WHERE id = ?3",
            params![avg, count, id],
        )
        .unwrap();
    }

    #[test]
    fn create_normalizes_input() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let r = create(&conn, input("  Sol ", "Portuguese", PriceRange::Budget)).unwrap();
        assert_eq!(r.name, "Sol");
        assert_eq!(r.features, vec!["Terrace"]);
        assert_eq!(r.average_rating, 0.0);
        assert!(r.is_active);
    }

    #[test]
    fn create_rejects_bad_coordinates() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let mut bad = input("Sol", "Portuguese", PriceRange::Budget);
        bad.latitude = Some(120.0);
        assert!(matches!(
            create(&conn, bad),
            Err(AppError::Validation(ref f)) if f.contains_key("latitude")
        ));
    }

    #[test]
    fn list_filters_and_sorts() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let a = create(&conn, input("Alfama", "Portuguese", PriceRange::Budget)).unwrap();
        let b = create(&conn, input("Bella", "Italian", PriceRange::Expensive)).unwrap();
        let c = create(&conn, input("Casa", "Italian", PriceRange::Moderate)).unwrap();
        set_rating(&conn, &a.id, 3.5, 2);
        set_rating(&conn, &b.id, 4.75, 4);
        set_rating(&conn, &c.id, 4.0, 1);
        toggle_active(&conn, &c.id).unwrap();

        let all = list(&conn, RestaurantFilters::default(), 10).unwrap();
        let names: Vec<_> = all.items.iter().map(|c| c.restaurant.name.as_str()).collect();
        assert_eq!(names, vec!["Bella", "Alfama"]);

        let italian = list(
            &conn,
            RestaurantFilters {
                cuisine: Some("italian".into()),
                ..Default::default()
            },
            10,
        )
        .unwrap();
        assert_eq!(italian.total, 1);

        let rated = list(
            &conn,
            RestaurantFilters {
                min_rating: Some(4.0),
                ..Default::default()
            },
            10,
        )
        .unwrap();
        assert_eq!(rated.total, 1);
        assert_eq!(rated.items[0].restaurant.id, b.id);

        let cheap = list(
            &conn,
            RestaurantFilters {
                price_range: Some("$".into()),
                sort: RestaurantSort::Name,
                search: Some("portug".into()),
                ..Default::default()
            },
            10,
        )
        .unwrap();
        assert_eq!(cheap.items[0].restaurant.id, a.id);

        let bad = list(
            &conn,
            RestaurantFilters {
                price_range: Some("cheap".into()),
                ..Default::default()
            },
            10,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn inactive_restaurants_are_hidden_from_public() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let r = create(&conn, input("Hidden", "Thai", PriceRange::Moderate)).unwrap();
        toggle_active(&conn, &r.id).unwrap();

        assert!(matches!(find_visible(&conn, &r.id, false), Err(AppError::NotFound)));
        assert!(find_visible(&conn, &r.id, true).is_ok());
    }

    #[test]
    fn featured_falls_back_to_unrated_restaurants() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let fresh = create(&conn, input("Fresh", "Thai", PriceRange::Moderate)).unwrap();
        assert!(top_rated(&conn, 6).unwrap().is_empty());

        let picks = featured(&conn, 6).unwrap();
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].restaurant.id, fresh.id);

        let rated = create(&conn, input("Rated", "Thai", PriceRange::Moderate)).unwrap();
        set_rating(&conn, &rated.id, 3.5, 2);
        let hidden = create(&conn, input("Hidden", "Thai", PriceRange::Moderate)).unwrap();
        toggle_active(&conn, &hidden.id).unwrap();

        let names: Vec<String> = featured(&conn, 6)
            .unwrap()
            .into_iter()
            .map(|c| c.restaurant.name)
            .collect();
        assert_eq!(names, vec!["Rated", "Fresh"]);
    }

    #[test]
    fn favorites_toggle() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let user = testing::insert_user(&conn, "Fay", "user");
        let r = create(&conn, input("Fav", "Thai", PriceRange::Moderate)).unwrap();

        assert!(toggle_favorite(&conn, &user, &r.id).unwrap());
        assert!(is_favorite(&conn, &user, &r.id).unwrap());
        assert_eq!(favorites(&conn, &user).unwrap().len(), 1);

        assert!(!toggle_favorite(&conn, &user, &r.id).unwrap());
        assert!(favorites(&conn, &user).unwrap().is_empty());
    }

    #[test]
    fn form_parses_numbers_and_features() {
        let form = RestaurantForm {
            name: "Form".into(),
            cuisine: "Greek".into(),
            price_range: "$$$".into(),
            latitude: "38.7".into(),
            longitude: "".into(),
            features: "wifi, parking".into(),
            ..Default::default()
        };
        let input = form.into_input(WeeklyHours::default()).unwrap();
        assert_eq!(input.price_range, PriceRange::Expensive);
        assert_eq!(input.latitude, Some(38.7));
        assert_eq!(input.longitude, None);
        assert_eq!(input.features, vec!["wifi", "parking"]);
    }
}
