use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Deserialize;
use validator::Validate;

use crate::auth::password;
use crate::db::models::User;
use crate::db::new_id;
use crate::error::{AppError, AppResult};
use crate::pagination::{Page, PageRequest};
use crate::users::domain::{AccountStatus, AccountType, Role, SortDirection, UserSort};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(must_match(other = "password", message = "Passwords do not match"))]
    pub password_confirmation: String,
    #[serde(default)]
    pub account_type: AccountType,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProfileInput {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(length(max = 1000, message = "Bio must be at most 1000 characters"))]
    #[serde(default)]
    pub bio: Option<String>,
    #[validate(length(max = 255, message = "Location must be at most 255 characters"))]
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub email_notifications: bool,
}

/// Query string of the admin user list.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UserFilters {
    pub search: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
    pub sort: UserSort,
    pub direction: SortDirection,
    pub page: Option<u32>,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn find(conn: &Connection, id: &str) -> AppResult<User> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", User::COLUMNS),
        params![id],
        User::from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

pub fn find_by_email(conn: &Connection, email: &str) -> AppResult<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", User::COLUMNS),
            params![email.trim().to_lowercase()],
            User::from_row,
        )
        .optional()?)
}

const EMAIL_TAKEN: &str = "The email has already been taken";

pub fn register(conn: &Connection, input: RegisterInput, bcrypt_cost: u32) -> AppResult<User> {
    let input = RegisterInput {
        name: input.name.trim().to_string(),
        email: input.email.trim().to_lowercase(),
        ..input
    };
    input.validate()?;

    if find_by_email(conn, &input.email)?.is_some() {
        return Err(AppError::field("email", EMAIL_TAKEN));
    }

    let id = new_id();
    let hash = password::hash_password(&input.password, bcrypt_cost)?;
    let role: Role = input.account_type.into();

    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, role) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, input.name, input.email, hash, role],
    )
    .map_err(AppError::unique("email", EMAIL_TAKEN))?;

    tracing::info!(user_id = %id, %role, "Registered user");
    find(conn, &id)
}

/// Check credentials and stamp the login time. Banned accounts are refused
/// even with the right password.
pub fn authenticate(conn: &Connection, email: &str, password: &str) -> AppResult<User> {
    let user = find_by_email(conn, email)?.ok_or(AppError::Unauthorized)?;
    if !password::verify_password(password, &user.password_hash) {
        return Err(AppError::Unauthorized);
    }
    if !user.is_active {
        return Err(AppError::forbidden("Your account has been suspended"));
    }

    conn.execute(
        "UPDATE users SET last_login_at = datetime('now') WHERE id = ?1",
        params![user.id],
    )?;
    find(conn, &user.id)
}

pub fn update_profile(conn: &Connection, user_id: &str, input: ProfileInput) -> AppResult<User> {
    let input = ProfileInput {
        name: input.name.trim().to_string(),
        bio: blank_to_none(input.bio),
        location: blank_to_none(input.location),
        ..input
    };
    input.validate()?;

    let changed = conn.execute(
        "UPDATE users SET name = ?1, bio = ?2, location = ?3, is_public = ?4,
             email_notifications = ?5, updated_at = datetime('now')
         WHERE id = ?6",
        params![
            input.name,
            input.bio,
            input.location,
            input.is_public,
            input.email_notifications,
            user_id
        ],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound);
    }
    find(conn, user_id)
}

/// Point the user at a new avatar file, returning the one it replaces.
pub fn set_avatar(conn: &Connection, user_id: &str, path: &str) -> AppResult<Option<String>> {
    let previous = find(conn, user_id)?.avatar_path;
    conn.execute(
        "UPDATE users SET avatar_path = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![path, user_id],
    )?;
    Ok(previous)
}

/// Whether `viewer` may see `profile_owner`'s public profile.
pub fn can_view_profile(profile_owner: &User, viewer: Option<&User>) -> bool {
    profile_owner.is_public
        || viewer.is_some_and(|v| v.id == profile_owner.id || v.is_admin())
}

pub fn admin_list(conn: &Connection, filters: UserFilters, per_page: u32) -> AppResult<Page<User>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    if let Some(search) = blank_to_none(filters.search) {
        clauses.push("(name LIKE ? OR email LIKE ?)".into());
        let pattern = format!("%{}%", search);
        values.push(SqlValue::Text(pattern.clone()));
        values.push(SqlValue::Text(pattern));
    }

    if let Some(role) = blank_to_none(filters.role) {
        let role: Role = role
            .parse()
            .map_err(|_| AppError::field("role", "Unknown role"))?;
        if role.is_admin() {
            clauses.push("(role = ? OR is_admin = 1)".into());
        } else {
            clauses.push("role = ?".into());
        }
        values.push(SqlValue::Text(role.as_str().to_string()));
    }

    if let Some(status) = blank_to_none(filters.status) {
        let status = match status.as_str() {
            "active" => AccountStatus::Active,
            "banned" => AccountStatus::Banned,
            _ => return Err(AppError::field("status", "Status must be active or banned")),
        };
        clauses.push(match status {
            AccountStatus::Active => "is_active = 1".into(),
            AccountStatus::Banned => "is_active = 0".into(),
        });
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM users {}", where_sql),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    let request = PageRequest::new(filters.page, per_page);
    let sql = format!(
        "SELECT {} FROM users {} ORDER BY {} {}, id ASC LIMIT {} OFFSET {}",
        User::COLUMNS,
        where_sql,
        filters.sort.column(),
        filters.direction.sql(),
        request.limit(),
        request.offset()
    );
    let mut stmt = conn.prepare(&sql)?;
    let users = stmt
        .query_map(params_from_iter(values.iter()), User::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(request.into_page(users, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing;

    fn input(email: &str) -> RegisterInput {
        RegisterInput {
            name: " Maria ".into(),
            email: email.into(),
            password: "secret-password".into(),
            password_confirmation: "secret-password".into(),
            account_type: AccountType::User,
        }
    }

    #[test]
    fn register_normalizes_and_hashes() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let user = register(&conn, input("Maria@Example.com "), 4).unwrap();

        assert_eq!(user.name, "Maria");
        assert_eq!(user.email, "maria@example.com");
        assert_ne!(user.password_hash, "secret-password");
        assert_eq!(user.role, Role::User);
        assert!(user.is_active);
        assert!(!user.is_admin());
        assert!(!user.is_restaurant_owner());
    }

    #[test]
    fn register_rejects_duplicates_and_bad_input() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        register(&conn, input("dup@example.com"), 4).unwrap();

        let err = register(&conn, input("DUP@example.com"), 4).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref f) if f.contains_key("email")));

        let mut bad = input("x@example.com");
        bad.password_confirmation = "different".into();
        let err = register(&conn, bad, 4).unwrap_err();
        assert!(matches!(err, AppError::Validation(ref f) if f.contains_key("password_confirmation")));
    }

    #[test]
    fn simultaneous_signups_with_one_email_yield_one_account() {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::create_pool(&dir.path().join("forkful.db")).unwrap();
        crate::db::run_migrations(&pool).unwrap();

        let results: Vec<AppResult<User>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..6)
                .map(|_| {
                    let pool = pool.clone();
                    scope.spawn(move || register(&pool.get().unwrap(), input("race@example.com"), 4))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        for result in results.iter().filter_map(|r| r.as_ref().err()) {
            assert!(matches!(result, AppError::Validation(fields) if fields.contains_key("email")), "{:?}", result);
        }
        let count: i64 = pool
            .get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn owner_accounts_are_owners_before_claiming() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let mut owner = input("owner@example.com");
        owner.account_type = AccountType::RestaurantOwner;
        let user = register(&conn, owner, 4).unwrap();
        assert!(user.is_restaurant_owner());
        assert!(user.restaurant_id.is_none());
    }

    #[test]
    fn authenticate_checks_password_and_ban() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let user = register(&conn, input("auth@example.com"), 4).unwrap();

        assert!(matches!(
            authenticate(&conn, "auth@example.com", "nope"),
            Err(AppError::Unauthorized)
        ));

        let logged_in = authenticate(&conn, "AUTH@example.com", "secret-password").unwrap();
        assert!(logged_in.last_login_at.is_some());

        conn.execute(
            "UPDATE users SET is_active = 0 WHERE id = ?1",
            params![user.id],
        )
        .unwrap();
        assert!(matches!(
            authenticate(&conn, "auth@example.com", "secret-password"),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn admin_flag_or_role_makes_admin() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let id = testing::insert_user(&conn, "Flagged", "user");
        conn.execute("UPDATE users SET is_admin = 1 WHERE id = ?1", params![id])
            .unwrap();
        assert!(find(&conn, &id).unwrap().is_admin());

        let id = testing::insert_user(&conn, "Root", "super_admin");
        assert!(find(&conn, &id).unwrap().is_admin());
    }

    #[test]
    fn profile_update_and_visibility() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        let id = testing::insert_user(&conn, "Pia", "user");

        let user = update_profile(
            &conn,
            &id,
            ProfileInput {
                name: "Pia P".into(),
                bio: Some("  ".into()),
                location: Some("Porto".into()),
                is_public: false,
                email_notifications: false,
            },
        )
        .unwrap();
        assert_eq!(user.bio, None);
        assert_eq!(user.location.as_deref(), Some("Porto"));

        let stranger = find(&conn, &testing::insert_user(&conn, "Other", "user")).unwrap();
        let admin = find(&conn, &testing::insert_user(&conn, "Boss", "admin")).unwrap();
        assert!(!can_view_profile(&user, None));
        assert!(!can_view_profile(&user, Some(&stranger)));
        assert!(can_view_profile(&user, Some(&user)));
        assert!(can_view_profile(&user, Some(&admin)));
    }

    #[test]
    fn admin_list_filters_and_sorts() {
        let pool = testing::pool();
        let conn = pool.get().unwrap();
        testing::insert_user(&conn, "Zed", "user");
        let banned = testing::insert_user(&conn, "Amy", "user");
        testing::insert_user(&conn, "Olav", "restaurant_owner");
        conn.execute(
            "UPDATE users SET is_active = 0 WHERE id = ?1",
            params![banned],
        )
        .unwrap();

        let page = admin_list(
            &conn,
            UserFilters {
                sort: UserSort::Name,
                direction: SortDirection::Asc,
                ..Default::default()
            },
            10,
        )
        .unwrap();
        let names: Vec<_> = page.items.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["Amy", "Olav", "Zed"]);

        let banned_only = admin_list(
            &conn,
            UserFilters {
                status: Some("banned".into()),
                ..Default::default()
            },
            10,
        )
        .unwrap();
        assert_eq!(banned_only.total, 1);
        assert_eq!(banned_only.items[0].id, banned);

        let owners = admin_list(
            &conn,
            UserFilters {
                role: Some("restaurant_owner".into()),
                search: Some("ola".into()),
                ..Default::default()
            },
            10,
        )
        .unwrap();
        assert_eq!(owners.total, 1);
    }
}
