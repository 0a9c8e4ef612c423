use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mediafetch")]
#[command(about = "Asynchronous media fetch service", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to $MEDIAFETCH_CONFIG or config/mediafetch.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server with its worker pool and retention sweeper
    Server(ServerArgs),
    /// Run a single retention sweep over the artifact directory and exit
    Sweep,
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}
