//! `replicate` subcommand

use clap::Args;
use std::path::PathBuf;

use crate::replication::ReplicationStrategy;

pub mod handler;

pub use handler::handle_replicate_command;

#[derive(Args, Debug, Clone)]
pub struct ReplicateCommands {
    /// Service root of the RESO Web API server
    #[arg(long, env = "RESO_SERVICE_URL")]
    pub url: String,

    /// Resource to replicate (repeatable)
    #[arg(short, long = "resource", required = true)]
    pub resources: Vec<String>,

    /// Navigation property to `$expand` (repeatable)
    #[arg(short, long = "expand")]
    pub expansions: Vec<String>,

    /// OData `$filter` expression
    #[arg(long)]
    pub filter: Option<String>,

    /// OData `$orderby` expression
    #[arg(long)]
    pub orderby: Option<String>,

    /// Page size (`$top` for TopAndSkip, `Prefer: odata.maxpagesize` for NextLink)
    #[arg(long)]
    pub top: Option<u32>,

    /// Pagination strategy: TopAndSkip or NextLink
    #[arg(short, long)]
    pub strategy: Option<ReplicationStrategy>,

    /// Stop each resource once this many records have been fetched
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Directory for the report and persisted pages
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Also write every page to disk
    #[arg(long)]
    pub persist_pages: bool,

    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Static bearer token
    #[arg(long, env = "RESO_BEARER_TOKEN", hide_env_values = true)]
    pub bearer_token: Option<String>,

    /// OAuth2 client id
    #[arg(long, env = "RESO_CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth2 client secret
    #[arg(long, env = "RESO_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// OAuth2 token endpoint
    #[arg(long, env = "RESO_TOKEN_URI")]
    pub token_uri: Option<String>,

    /// OAuth2 scope
    #[arg(long, env = "RESO_SCOPE")]
    pub scope: Option<String>,

    /// Field whose enumeration values should be counted (repeatable)
    #[arg(long = "lookup-field")]
    pub lookup_fields: Vec<String>,
}
