use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pkjwt_auth::JWT_BEARER_ASSERTION_TYPE;

#[derive(Parser)]
#[command(name = "pkjwt")]
#[command(about = "Check and inspect private_key_jwt client assertions")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level filter (overridden by RUST_LOG)
    #[arg(long, global = true, env = "PKJWT_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate an assertion the way the token endpoint would
    Check(CheckArgs),
    /// Print an assertion's header and claims without validating it
    Inspect(InspectArgs),
}

#[derive(clap::Args)]
pub struct CheckArgs {
    /// Authenticator configuration (TOML)
    #[arg(short, long, env = "PKJWT_CONFIG")]
    pub config: PathBuf,

    /// Client key registry: JSON object mapping client IDs to JWKS
    #[arg(short, long, env = "PKJWT_JWKS")]
    pub jwks: PathBuf,

    /// Expected client ID; the check fails if the assertion names another
    #[arg(long)]
    pub client_id: Option<String>,

    /// client_assertion_type sent with the assertion
    #[arg(long, default_value = JWT_BEARER_ASSERTION_TYPE)]
    pub assertion_type: String,

    /// Evaluate at this Unix timestamp instead of now
    #[arg(long)]
    pub at: Option<i64>,

    /// The compact JWT (read from stdin when omitted)
    pub assertion: Option<String>,
}

#[derive(clap::Args)]
pub struct InspectArgs {
    /// The compact JWT (read from stdin when omitted)
    pub assertion: Option<String>,
}
