use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "resizebox")]
#[command(about = "ResizeBox image resizing service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server
    Server(ServerArgs),
    /// Run one sweep pass over an artifact directory and exit
    Sweep(SweepArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// Configuration file (overrides RESIZEBOX_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct SweepArgs {
    /// Artifact directory (overrides storage.root)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Artifact lifetime in seconds (overrides storage.ttl_seconds)
    #[arg(long)]
    pub ttl_seconds: Option<u64>,

    /// Configuration file (overrides RESIZEBOX_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_defaults() {
        let cli = Cli::try_parse_from(["resizebox", "server"]).unwrap();
        match cli.command {
            Commands::Server(args) => {
                assert!(args.address.is_none());
                assert!(args.config.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_sweep_overrides() {
        let cli = Cli::try_parse_from([
            "resizebox",
            "sweep",
            "--root",
            "/tmp/artifacts",
            "--ttl-seconds",
            "60",
        ])
        .unwrap();

        match cli.command {
            Commands::Sweep(args) => {
                assert_eq!(args.root, Some(PathBuf::from("/tmp/artifacts")));
                assert_eq!(args.ttl_seconds, Some(60));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_bad_address() {
        assert!(Cli::try_parse_from(["resizebox", "server", "--address", "nope"]).is_err());
    }
}
