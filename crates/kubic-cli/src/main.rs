mod cmd;
mod context;
mod output;

use clap::{Parser, Subcommand};
use cmd::node::NodeSubcommand;
use context::Context;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "kubicctl",
    about = "Bootstrap and grow a Kubernetes cluster with kubeadm and salt",
    version,
    propagate_version = true
)]
struct Cli {
    /// Daemon configuration file (missing file = stock defaults)
    #[arg(
        long,
        global = true,
        env = "KUBIC_CONFIG",
        default_value = kubic_core::config::DEFAULT_CONFIG_PATH
    )]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Record external commands instead of running them
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn this host into a Kubernetes control-plane node
    Init {
        /// Pod network add-on: flannel (default) or cilium
        #[arg(long)]
        pod_network: Option<String>,

        /// Kubernetes version to initialize (default: installed kubeadm)
        #[arg(long)]
        kubernetes_version: Option<String>,
    },

    /// Manage worker nodes
    Node {
        #[command(subcommand)]
        subcommand: NodeSubcommand,
    },

    /// Apply a manifest and record its digest
    Deploy { path: PathBuf },

    /// List recorded deployments and whether their manifests changed
    Deployments,

    /// Tear down the control plane on this host
    Reset,

    /// Check that the external tools are installed
    Check,

    /// Run the control daemon
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = Context::load(&cli.config, cli.json, cli.dry_run);
    let result = ctx.and_then(|ctx| match cli.command {
        Commands::Init {
            pod_network,
            kubernetes_version,
        } => cmd::init::run(&ctx, pod_network, kubernetes_version),
        Commands::Node { subcommand } => cmd::node::run(&ctx, subcommand),
        Commands::Deploy { path } => cmd::deploy::run(&ctx, &path),
        Commands::Deployments => cmd::deploy::list(&ctx),
        Commands::Reset => cmd::reset::run(&ctx),
        Commands::Check => cmd::check::run(&ctx),
        Commands::Serve { port } => cmd::serve::run(&ctx, port),
    });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
