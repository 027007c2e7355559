pub mod commands;

use adt_bridge_core::objects::ObjectKind;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "adt-bridge")]
#[command(author, version, about = "Local HTTP bridge into ADT backend sessions")]
pub struct Cli {
    /// Path to config file (checked in order: local config.toml, ~/.config/adt-bridge/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the bridge server
    Start {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show bridge status
    Status,

    /// List workspace projects
    Projects,

    /// Send one request through a running bridge
    Request(RequestArgs),

    /// Check that the active ABAP system answers through the bridge
    Check(BridgeArgs),

    /// Quick search for repository objects
    Search {
        /// Name pattern, e.g. ZCL_*
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 20)]
        max: u32,

        /// ADT object type filter, e.g. CLAS or PROG
        #[arg(short = 't', long = "type")]
        object_type: Option<String>,

        #[command(flatten)]
        bridge: BridgeArgs,
    },

    /// Print the source of an object (class, interface, program, function, table)
    Source {
        kind: ObjectKind,
        name: String,

        #[command(flatten)]
        bridge: BridgeArgs,
    },

    /// Show a package and the objects in it
    Package {
        name: String,

        #[command(flatten)]
        bridge: BridgeArgs,
    },

    /// Replace the source of an object (lock, write, unlock)
    WriteSource(WriteSourceArgs),

    /// Create an executable program
    CreateProgram(CreateArgs),

    /// Create a class, or update it if it already exists
    CreateClass(CreateArgs),
}

#[derive(Args)]
pub struct BridgeArgs {
    /// Bridge URL (auto-detected when omitted)
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(Args)]
pub struct WriteSourceArgs {
    pub kind: ObjectKind,
    pub name: String,

    /// File holding the new source
    #[arg(short, long)]
    pub file: PathBuf,

    /// Transport request
    #[arg(long)]
    pub transport: Option<String>,

    /// Activate the object after writing
    #[arg(long)]
    pub activate: bool,

    #[command(flatten)]
    pub bridge: BridgeArgs,
}

#[derive(Args)]
pub struct CreateArgs {
    /// Object name; Z is prepended outside the customer namespace
    pub name: String,

    #[arg(short, long)]
    pub description: Option<String>,

    /// Package (defaults to $TMP)
    #[arg(long)]
    pub package: Option<String>,

    /// Transport request
    #[arg(long)]
    pub transport: Option<String>,

    /// File holding the initial source
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    #[command(flatten)]
    pub bridge: BridgeArgs,
}

#[derive(Args)]
pub struct RequestArgs {
    /// HTTP method (GET, POST, PUT, DELETE)
    pub method: String,

    /// ADT path, e.g. /sap/bc/adt/discovery
    pub path: String,

    /// Header as NAME:VALUE (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Query parameter as NAME=VALUE (repeatable)
    #[arg(short = 'p', long = "param")]
    pub params: Vec<String>,

    /// Request body
    #[arg(short, long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the request body from a file
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    #[command(flatten)]
    pub bridge: BridgeArgs,
}
