#![forbid(unsafe_code)]

use anyhow::Result;
use log::warn;
use sqlx::{ConnectOptions, Connection, PgConnection, Row};

use crate::utils::config::SEED_USER_NAME;
use crate::utils::db_statements::{CREATE_USERS_TABLE, INSERT_SEED_USER, LIST_USERS};

use crate::RUNTIME_CTX;

// ***************************************************************************
//                                 Row Types
// ***************************************************************************
/** One row of the users table.  The name column carries no NOT NULL
 * constraint, so it surfaces as an option.
 */
#[derive(Debug)]
pub struct UserRow {
    pub id: i32,
    pub name: Option<String>,
}

// ***************************************************************************
//                              Public Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// fetch_users:
// ---------------------------------------------------------------------------
/** Make sure the users table exists and holds the seed row, then return all
 * of its rows.  Each invocation opens its own connection and each statement
 * auto-commits in order.
 *
 * Connection or statement failures propagate to the caller as a single
 * undifferentiated error class.
 */
pub async fn fetch_users() -> Result<Vec<UserRow>> {
    // One connection per request, no pooling.
    let options = RUNTIME_CTX.db_config.connect_options();
    let mut conn = options.connect().await?;

    // Run the statement sequence before closing, whether it succeeded or not.
    let outcome = load_users(&mut conn).await;

    // The connection is released on every exit path; if the close itself
    // fails the drop still severs the socket.
    if let Err(e) = conn.close().await {
        warn!("Ignoring error while closing database connection: {}", e);
    }

    outcome
}

// ***************************************************************************
//                             Private Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// load_users:
// ---------------------------------------------------------------------------
async fn load_users(conn: &mut PgConnection) -> Result<Vec<UserRow>> {
    // Idempotent DDL, safe to run on every request.
    sqlx::query(CREATE_USERS_TABLE)
        .execute(&mut *conn)
        .await?;

    // Seed row.  The name column is unique, so reruns are no-ops.
    sqlx::query(INSERT_SEED_USER)
        .bind(SEED_USER_NAME)
        .execute(&mut *conn)
        .await?;

    // Create the select statement.
    let rows = sqlx::query(LIST_USERS)
        .fetch_all(&mut *conn)
        .await?;

    // Collect the row data into element objects.
    let mut users: Vec<UserRow> = vec!();
    for row in rows {
        users.push(UserRow { id: row.get(0), name: row.get(1) });
    }

    Ok(users)
}
