use diesel::{pg::PgConnection, prelude::*};
use rand::{rngs::OsRng, RngCore};
use uuid::Uuid;

use crate::{
    models::{ApiKey, NewApiKey, User},
    schema::{api_keys, users},
};

pub const API_KEY_BYTES: usize = 20;

/// 40 hex characters from 20 random bytes.
pub fn generate_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Inserts a key for `user_id`, generating the token when none is supplied.
pub fn create_api_key(
    conn: &mut PgConnection,
    user_id: Uuid,
    key: Option<String>,
    comment: &str,
) -> QueryResult<ApiKey> {
    let key = key
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(generate_key);
    let new_key = NewApiKey {
        key,
        user_id,
        comment: comment.trim().to_string(),
    };

    diesel::insert_into(api_keys::table)
        .values(&new_key)
        .get_result(conn)
}

pub fn find_user_by_key(conn: &mut PgConnection, key: &str) -> QueryResult<Option<User>> {
    api_keys::table
        .inner_join(users::table)
        .filter(api_keys::key.eq(key))
        .select(users::all_columns)
        .first::<User>(conn)
        .optional()
}

#[cfg(test)]
mod tests {
    use super::generate_key;

    #[test]
    fn generated_keys_are_forty_hex_chars() {
        let key = generate_key();
        assert_eq!(key.len(), 40);
        assert!(key.chars().all(|ch| ch.is_ascii_hexdigit()));
        assert_ne!(key, generate_key());
    }
}
