// This file contains all SQL statements issued by the backend.
#![forbid(unsafe_code)]

// ========================= users table =========================
pub const CREATE_USERS_TABLE: &str = concat!(
    "CREATE TABLE IF NOT EXISTS users ",
    "(id SERIAL PRIMARY KEY, name TEXT UNIQUE)",
);

// The unique name column makes reinsertion of the seed row a no-op.
pub const INSERT_SEED_USER: &str = concat!(
    "INSERT INTO users (name) VALUES ($1) ",
    "ON CONFLICT (name) DO NOTHING",
);

// No ORDER BY: row order is whatever the storage engine returns.
pub const LIST_USERS: &str = "SELECT id, name FROM users";

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_table_is_idempotent() {
        assert!(CREATE_USERS_TABLE.contains("IF NOT EXISTS"));
    }

    #[test]
    fn seed_insert_is_conflict_suppressed() {
        assert!(INSERT_SEED_USER.contains("ON CONFLICT (name) DO NOTHING"));
    }
}
