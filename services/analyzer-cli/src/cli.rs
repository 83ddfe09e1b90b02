//! Argument parsing
//!
//! Pure translation of `argv` into [`Cli`]; nothing here touches the
//! network or the credential file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "circuit-analyzer", version, about = "Circuit Analyzer API client")]
pub struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "CONFIG_PATH", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Sign in with email and password
    Login { email: String, password: String },

    /// Create an account and sign in
    Signup {
        email: String,
        name: String,
        password: String,
    },

    /// Sign in with a Google ID token
    Google { id_token: String },

    /// End the session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Check that the API is reachable
    Health,

    /// Send an arbitrary API request
    Request {
        #[arg(value_parser = parse_method)]
        method: Method,
        path: String,
        /// JSON request body
        #[arg(value_parser = parse_body)]
        body: Option<Value>,
    },
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method: {raw}"))
}

fn parse_body(raw: &str) -> Result<Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("request body is not valid JSON: {e}"))
}
