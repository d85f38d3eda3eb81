use chrono::Utc;
use diesel::{pg::PgConnection, prelude::*};
use uuid::Uuid;

use super::{StoreError, StoreResult};
use crate::{
    auth::password::hash_password,
    models::{NewUser, User},
    schema::users,
};

#[derive(AsChangeset, Debug, Default, Clone)]
#[diesel(table_name = users)]
pub struct ProfileChangeset {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin: Option<String>,
}

impl ProfileChangeset {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.linkedin.is_none()
    }
}

pub fn find(conn: &mut PgConnection, user_id: Uuid) -> QueryResult<User> {
    users::table.find(user_id).first(conn)
}

pub fn find_by_username(conn: &mut PgConnection, username: &str) -> QueryResult<Option<User>> {
    users::table
        .filter(users::username.eq(username))
        .first(conn)
        .optional()
}

pub fn create_user(
    conn: &mut PgConnection,
    username: &str,
    password: &str,
    role: &str,
) -> StoreResult<User> {
    let password_hash = hash_password(password)
        .map_err(|err| StoreError::Conflict(format!("unable to hash password: {err}")))?;
    let new_user = NewUser {
        id: Uuid::new_v4(),
        username: username.trim().to_string(),
        password_hash,
        role: role.to_string(),
        ..Default::default()
    };

    diesel::insert_into(users::table)
        .values(&new_user)
        .get_result(conn)
        .map_err(|err| StoreError::on_unique_violation(err, "username already exists"))
}

pub fn update_profile(
    conn: &mut PgConnection,
    user_id: Uuid,
    changes: &ProfileChangeset,
) -> StoreResult<User> {
    let existing = find(conn, user_id)?;
    if changes.is_empty() {
        return Ok(existing);
    }

    let now = Utc::now().naive_utc();
    Ok(diesel::update(users::table.find(user_id))
        .set((changes, users::updated_at.eq(now)))
        .get_result(conn)?)
}
