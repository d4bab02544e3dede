//! Process entry surface: the command-line flags the binary accepts.

use clap::Parser;

/// `waypoint` with no flags serves HTTP+WS+SSE; `--stdio` and `--setup`
/// switch to the two other transport modes a client launches it under.
#[derive(Debug, Parser)]
#[command(name = "waypoint", version, about = "MCP research server")]
pub struct Cli {
    /// Run the line-delimited JSON-RPC loop over stdin/stdout instead of
    /// serving HTTP. All logging is redirected away from stdout so it
    /// never corrupts the protocol stream.
    #[arg(long)]
    pub stdio: bool,

    /// Print a config snippet for the named MCP client and exit 0
    /// without starting the server at all.
    #[arg(long)]
    pub setup: Option<String>,
}
