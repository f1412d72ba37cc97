#![forbid(unsafe_code)]

use anyhow::{Result, anyhow};
use log::{info, error, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;
use serde::Deserialize;
use std::{env, fmt, fs};
use toml;
use lazy_static::lazy_static;
use structopt::StructOpt;

use sqlx::postgres::PgConnectOptions;

// Backend utilities
use crate::utils::{errors::Errors, web_utils::get_absolute_path};

// ***************************************************************************
//                                Constants
// ***************************************************************************
// File locations, overridable through the environment.
const ENV_CONFIG_FILE         : &str = "BACKEND_CONFIG_FILE";
const DEFAULT_CONFIG_FILE     : &str = "~/.backend_server/backend.toml";
const ENV_LOG_CONFIG_FILE     : &str = "BACKEND_LOG_CONFIG";
const DEFAULT_LOG_CONFIG_FILE : &str = "~/.backend_server/log4rs.yml";

// Networking.
const DEFAULT_HTTP_ADDR    : &str = "0.0.0.0";
const DEFAULT_HTTP_PORT    : u16  = 5000;

// Database connection environment variables.
const ENV_POSTGRES_HOST     : &str = "POSTGRES_HOST";
const ENV_POSTGRES_PORT     : &str = "POSTGRES_PORT";
const ENV_POSTGRES_DB       : &str = "POSTGRES_DB";
const ENV_POSTGRES_USER     : &str = "POSTGRES_USER";
const ENV_POSTGRES_PASSWORD : &str = "POSTGRES_PASSWORD";

// Database connection defaults.
const DEFAULT_POSTGRES_HOST     : &str = "db";
const DEFAULT_POSTGRES_PORT     : u16  = 5432;
const DEFAULT_POSTGRES_DB       : &str = "testdb";
const DEFAULT_POSTGRES_USER     : &str = "postgres";
const DEFAULT_POSTGRES_PASSWORD : &str = "postgres";

// The seed row guarantees a non-empty listing on a fresh database.
pub const SEED_USER_NAME   : &str = "Alice";

// Pattern used when no log4rs configuration file is available.
const CONSOLE_LOG_PATTERN  : &str = "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {t} - {m}{n}";

// ***************************************************************************
//                             Static Variables
// ***************************************************************************
// Assign the command line arguments BEFORE RUNTIME_CTX is initialized in main.
lazy_static! {
    pub static ref BACKEND_ARGS: BackendArgs = init_backend_args();
}

// ***************************************************************************
//                               Config Structs
// ***************************************************************************
// ---------------------------------------------------------------------------
// CommandLineArgs:
// ---------------------------------------------------------------------------
#[derive(Debug, StructOpt)]
#[structopt(name = "backend_args", about = "Command line arguments for the backend server.")]
pub struct BackendArgs {
    /// Path to the server's TOML configuration file.
    ///
    /// When the file does not exist the server runs with built-in defaults.
    #[structopt(short, long)]
    pub config_file: Option<String>,
}

// ---------------------------------------------------------------------------
// Parms:
// ---------------------------------------------------------------------------
#[derive(Debug)]
#[allow(dead_code)]
pub struct Parms {
    pub config_file: String,
    pub config: Config,
}

// ---------------------------------------------------------------------------
// RuntimeCtx:
// ---------------------------------------------------------------------------
#[derive(Debug)]
#[allow(dead_code)]
pub struct RuntimeCtx {
    pub parms: Parms,
    pub db_config: DbConfig,
    pub args: &'static BackendArgs,
}

// ---------------------------------------------------------------------------
// Config:
// ---------------------------------------------------------------------------
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct Config {
    pub title: String,
    pub http_addr: String,
    pub http_port: u16,
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "Backend Server".to_string(),
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

// ---------------------------------------------------------------------------
// DbConfig:
// ---------------------------------------------------------------------------
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    password: String,
}

impl DbConfig {
    /** Read the connection parameters from the environment, falling back to
     * the standard defaults for any that are unset.  A malformed port value
     * aborts startup.
     */
    pub fn from_env() -> Self {
        let port = match env::var(ENV_POSTGRES_PORT) {
            Ok(s) => s.parse::<u16>()
                .unwrap_or_else(|_| panic!("Invalid {} value: {}", ENV_POSTGRES_PORT, s)),
            Err(_) => DEFAULT_POSTGRES_PORT,
        };
        Self {
            host: env_or_default(ENV_POSTGRES_HOST, DEFAULT_POSTGRES_HOST),
            port,
            database: env_or_default(ENV_POSTGRES_DB, DEFAULT_POSTGRES_DB),
            user: env_or_default(ENV_POSTGRES_USER, DEFAULT_POSTGRES_USER),
            password: env_or_default(ENV_POSTGRES_PASSWORD, DEFAULT_POSTGRES_PASSWORD),
        }
    }

    /** Connection options from which each request opens its own connection. */
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }
}

// Keep the password out of startup parameter logging.
impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ***************************************************************************
//                            Argument Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_backend_args:
// ---------------------------------------------------------------------------
/** Get the command line arguments. */
fn init_backend_args() -> BackendArgs {
    let args = BackendArgs::from_args();
    println!("{:?}", args);
    args
}

// ***************************************************************************
//                               Log Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_log:
// ---------------------------------------------------------------------------
/** Initialize log4rs from the configured file when one is present, otherwise
 * fall back to console logging so the server is never silent.
 */
pub fn init_log() {
    let logconfig = get_absolute_path(&init_log_config());
    match log4rs::init_file(logconfig.clone(), Default::default()) {
        Ok(_) => info!("Log4rs initialized using: {}", logconfig),
        Err(_) => {
            init_console_log();
            info!("{}", Errors::Log4rsInitialization(logconfig));
            info!("Logging to the console instead.");
        },
    }
}

// ---------------------------------------------------------------------------
// init_log_config:
// ---------------------------------------------------------------------------
fn init_log_config() -> String {
    env::var(ENV_LOG_CONFIG_FILE).unwrap_or_else(|_| DEFAULT_LOG_CONFIG_FILE.to_string())
}

// ---------------------------------------------------------------------------
// init_console_log:
// ---------------------------------------------------------------------------
fn init_console_log() {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(CONSOLE_LOG_PATTERN)))
        .build();
    let config = log4rs::config::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))
        .expect("Unable to assemble the console logging configuration.");
    log4rs::init_config(config).expect("Unable to initialize console logging.");
}

/// ***************************************************************************
//                             Parms Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// get_parms:
// ---------------------------------------------------------------------------
/** Retrieve the application parameters from the configuration file specified
 * either through an environment variable or as a command line argument.  If
 * neither is provided, an attempt is made to use the default file path.  A
 * file that cannot be read yields the default configuration.
 */
fn get_parms() -> Result<Parms> {
    // Get the config file path.
    let config_file = get_config_file_path();

    // Read the configuration file.
    let config_file_abs = get_absolute_path(&config_file);
    info!("{}", Errors::ReadingConfigFile(config_file_abs.clone()));
    let contents = match fs::read_to_string(&config_file_abs) {
        Ok(c) => c,
        Err(_) => {
            println!("Unable to read configuration at {}. Using default values.", config_file_abs);
            return Ok(Parms { config_file: Default::default(), config: Config::new() });
        }
    };

    // Parse the toml configuration.
    let config : Config = match toml::from_str(&contents) {
        Ok(c)  => c,
        Err(e) => {
            let msg = format!("{}\n   {}", Errors::TOMLParseError(config_file_abs), e);
            error!("{}", msg);
            return Result::Err(anyhow!(msg));
        }
    };

    Ok(Parms { config_file: config_file_abs, config })
}

// ---------------------------------------------------------------------------
// get_config_file_path:
// ---------------------------------------------------------------------------
fn get_config_file_path() -> String {
    // Order of precedence:
    //  1. Environment variable
    //  2. Command line --config-file argument
    //  3. Default location
    //
    env::var(ENV_CONFIG_FILE).unwrap_or_else(
        |_| {
            match BACKEND_ARGS.config_file.clone() {
                Some(f) => f,
                None => DEFAULT_CONFIG_FILE.to_string(),
            }
        })
}

// ***************************************************************************
//                             Config Functions
// ***************************************************************************
// ---------------------------------------------------------------------------
// init_runtime_context:
// ---------------------------------------------------------------------------
pub fn init_runtime_context() -> RuntimeCtx {
    // If this fails the application aborts.
    let parms = get_parms().expect("FAILED to read configuration file.");
    let db_config = DbConfig::from_env();
    RuntimeCtx {parms, db_config, args: &BACKEND_ARGS}
}

// ***************************************************************************
//                             Helper Functions
// ***************************************************************************
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

// ***************************************************************************
//                                  Tests
// ***************************************************************************
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_config() {
        println!("{:?}", Config::new());
    }

    #[test]
    fn default_config_binds_all_interfaces_on_5000() {
        let config = Config::new();
        assert_eq!(config.http_addr, "0.0.0.0");
        assert_eq!(config.http_port, 5000);
    }

    // The only test that touches the process environment.
    #[test]
    fn db_config_reads_environment() {
        env::set_var(ENV_POSTGRES_HOST, "pg.example.com");
        env::set_var(ENV_POSTGRES_PORT, "5433");
        env::set_var(ENV_POSTGRES_DB, "appdb");
        env::set_var(ENV_POSTGRES_USER, "svc");
        env::set_var(ENV_POSTGRES_PASSWORD, "supersecret");

        let db_config = DbConfig::from_env();
        let options = db_config.connect_options();
        assert_eq!(options.get_host(), "pg.example.com");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_database(), Some("appdb"));
        assert_eq!(options.get_username(), "svc");

        env::remove_var(ENV_POSTGRES_HOST);
        env::remove_var(ENV_POSTGRES_PORT);
        env::remove_var(ENV_POSTGRES_DB);
        env::remove_var(ENV_POSTGRES_USER);
        env::remove_var(ENV_POSTGRES_PASSWORD);
    }

    #[test]
    fn debug_output_redacts_password() {
        let db_config = DbConfig {
            host: "db".to_string(),
            port: 5432,
            database: "testdb".to_string(),
            user: "app".to_string(),
            password: "supersecret".to_string(),
        };
        let dump = format!("{:?}", db_config);
        assert!(dump.contains("<redacted>"));
        assert!(!dump.contains("supersecret"));
    }
}
