#![forbid(unsafe_code)]

use poem::Request;
use poem_openapi::{ OpenApi, payload::Json, Object, ApiResponse };
use anyhow::Result;
use serde_json::{json, Value};

use crate::utils::errors::HttpResult;

use crate::utils::db::{self, UserRow};
use crate::utils::web_utils::{self, RequestDebug};
use log::error;

// ***************************************************************************
//                          Request/Response Definiions
// ***************************************************************************
pub struct ListUsersApi;

// ***************************************************************************
//                          Request/Response Definiions
// ***************************************************************************
#[derive(Object)]
struct ReqListUsers
{
    // Empty for now, but kept as a placeholder for the eventual implementation
    // of query parameters that will filter this endpoint's output.
}

// Implement the debug record trait for logging.
impl RequestDebug for ReqListUsers {
    type Req = ReqListUsers;
    fn get_request_info(&self) -> String {
        let mut s = String::with_capacity(255);
        s.push_str("  Request body:");
        s
    }
}

// ------------------- HTTP Status Codes -------------------
// The 200 body is a bare JSON array of [id, name] arrays rather than an
// enveloped object, so the payload type is a raw JSON value.
#[derive(Debug, ApiResponse)]
enum UsersResponse {
    #[oai(status = 200)]
    Http200(Json<Value>),
    #[oai(status = 500)]
    Http500(Json<HttpResult>),
}

fn make_http_200(resp: Value) -> UsersResponse {
    UsersResponse::Http200(Json(resp))
}
fn make_http_500(msg: String) -> UsersResponse {
    UsersResponse::Http500(Json(HttpResult::new(500.to_string(), msg)))
}

// ***************************************************************************
//                             OpenAPI Endpoint
// ***************************************************************************
#[OpenApi]
impl ListUsersApi {
    #[oai(path = "/users", method = "get")]
    async fn get_users(&self, http_req: &Request) -> UsersResponse {
        // Package the request parameters.
        let req = ReqListUsers {};

        // -------------------- Process Request ----------------------
        // Process the request.
        match process(http_req, &req).await {
            Ok(r) => r,
            Err(e) => {
                let msg = "ERROR: ".to_owned() + e.to_string().as_str();
                error!("{}", msg);
                make_http_500(msg)
            }
        }
    }
}

// ***************************************************************************
//                          Private Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// process:
// ---------------------------------------------------------------------------
/** Run the fixed create/seed/select sequence and shape the resulting rows
 * into the response body.
 */
async fn process(http_req: &Request, req: &ReqListUsers) -> Result<UsersResponse> {
    // Conditional logging depending on log level.
    web_utils::debug_request(http_req, req);

    // Fetch the users from the database over a fresh connection.
    let users = db::fetch_users().await?;
    Ok(make_http_200(users_to_rows(&users)))
}

// ---------------------------------------------------------------------------
// users_to_rows:
// ---------------------------------------------------------------------------
/** Serialize each user as a two element [id, name] array, in column order.
 * Row order is whatever the select returned and is not part of the contract.
 */
fn users_to_rows(users: &[UserRow]) -> Value {
    Value::Array(users.iter().map(|u| json!([u.id, u.name])).collect())
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::utils::db::UserRow;
    use super::users_to_rows;

    #[test]
    fn rows_serialize_as_pairs() {
        let users = vec![UserRow { id: 1, name: Some("Alice".to_string()) }];
        assert_eq!(users_to_rows(&users), json!([[1, "Alice"]]));
    }

    #[test]
    fn null_name_serializes_as_null() {
        let users = vec![
            UserRow { id: 1, name: Some("Alice".to_string()) },
            UserRow { id: 2, name: None },
        ];
        assert_eq!(users_to_rows(&users), json!([[1, "Alice"], [2, null]]));
    }

    #[test]
    fn empty_table_serializes_as_empty_array() {
        assert_eq!(users_to_rows(&[]), json!([]));
    }
}
