#![forbid(unsafe_code)]

use lazy_static::lazy_static;
use log::info;
use poem::{listener::TcpListener, Route};
use poem_openapi::{payload::PlainText, OpenApi, OpenApiService};

// Backend utilities
use crate::api::users_list::ListUsersApi;
use crate::utils::config::{init_log, init_runtime_context, RuntimeCtx};
use crate::utils::errors::Errors;

// Modules
mod api;
mod utils;

// ***************************************************************************
//                                Constants
// ***************************************************************************
const SERVER_NAME : &str = "BackendServer"; // for poem logging

// The fixed text served from the root path.
const GREETING : &str = "Hello from Backend!";

// ***************************************************************************
//                             Static Variables
// ***************************************************************************
// Lazily initialize the parameters variable so that is has a 'static lifetime.
// The runtime context holds the http parameters and the database connection
// parameters; each request opens its own database connection from the latter.
// We exit if we can't read our parameters.
lazy_static! {
    static ref RUNTIME_CTX: RuntimeCtx = init_runtime_context();
}

// ---------------------------------------------------------------------------
// main:
// ---------------------------------------------------------------------------
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    // --------------- Initialize Backend -------------
    // Announce ourselves.
    println!("Starting backend_server!");

    // Initialize the server.
    backend_init();

    // --------------- Main Loop Set Up ---------------
    // Assign the listen address and the advertised base URL.
    let addr = format!("{}:{}",
        RUNTIME_CTX.parms.config.http_addr,
        RUNTIME_CTX.parms.config.http_port);
    let backend_url = format!("http://{}", addr);

    // Create the routes.
    let app = build_app(&backend_url);

    // ------------------ Main Loop -------------------
    poem::Server::new(TcpListener::bind(addr))
        .name(SERVER_NAME)
        .run(app)
        .await
}

// ---------------------------------------------------------------------------
// build_app:
// ---------------------------------------------------------------------------
/** Build the complete route tree.  The application is an explicit value
 * handed to the server's run call in main; no handler routes through
 * ambient application state.
 */
fn build_app(backend_url: &str) -> Route {
    // Create a tuple with both API structs served by this program.
    let endpoints = (GreetingApi, ListUsersApi);
    let api_service =
        OpenApiService::new(endpoints, "Backend Server", "0.1.0").server(backend_url);

    Route::new().nest("/", api_service)
}

// ***************************************************************************
//                             Private Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// backend_init:
// ---------------------------------------------------------------------------
/** Initialize all subsystems and data structures other than those needed
 * to configure the main loop processor.
 */
fn backend_init() {
    // Configure our log.
    init_log();

    // Force the reading of input parameters and initialization of the runtime
    // context, which makes the database connection parameters available to
    // all modules.
    info!("{}", Errors::InputParms(format!("{:#?}", *RUNTIME_CTX)));

    // Log build info.
    print_version_info();
}

// ---------------------------------------------------------------------------
// print_version_info:
// ---------------------------------------------------------------------------
fn print_version_info() {
    info!("{}.", format!("\n*** Running {}={}",
                        SERVER_NAME,
                        option_env!("CARGO_PKG_VERSION").unwrap_or("unknown")));
}

// ***************************************************************************
//                             Greeting Endpoint
// ***************************************************************************
// Greeting structure.
struct GreetingApi;

// ---------------------------------------------------------------------------
// greeting endpoint:
// ---------------------------------------------------------------------------
#[OpenApi]
impl GreetingApi {
    #[oai(path = "/", method = "get")]
    async fn index(&self) -> PlainText<String> {
        PlainText(GREETING.to_string())
    }
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use poem::http::StatusCode;
    use poem::test::TestClient;

    use super::{build_app, GREETING};

    #[tokio::test]
    async fn greeting_returns_fixed_text() {
        // The root route never touches the database, so this holds with no
        // database reachable.
        let cli = TestClient::new(build_app("http://localhost:5000"));
        let resp = cli.get("/").send().await;
        resp.assert_status_is_ok();
        resp.assert_text(GREETING).await;
    }

    #[tokio::test]
    async fn undefined_path_returns_not_found() {
        let cli = TestClient::new(build_app("http://localhost:5000"));
        let resp = cli.get("/definitely/not/here").send().await;
        resp.assert_status(StatusCode::NOT_FOUND);
    }
}
