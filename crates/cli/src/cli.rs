use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "liteproxy-cache")]
#[command(about = "Inspect and purge the liteproxy response cache")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print one cached object
    Get(RecordArgs),
    /// Print every cached object of a resource type
    List(ScopeArgs),
    /// Delete cached records and report how many were removed
    Purge(PurgeArgs),
}

#[derive(Args)]
pub struct ScopeArgs {
    /// Client identity (the caller's User-Agent)
    #[arg(long, default_value = "default")]
    pub identity: String,
    /// Resource key, e.g. `pods` or `deployments.apps`
    #[arg(long)]
    pub resource: String,
    /// Namespace; omit for cluster-scoped objects or to span all namespaces
    #[arg(long)]
    pub namespace: Option<String>,
}

#[derive(Args)]
pub struct RecordArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,
    /// Object name
    #[arg(long)]
    pub name: String,
}

#[derive(Args)]
pub struct PurgeArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,
    /// Only purge this object
    #[arg(long)]
    pub name: Option<String>,
}
