//! The `serve` command (also the default invocation): runs the stdio MCP
//! protocol server loop until stdin closes.

use anyhow::Result;

use crate::transport;

/// Runs the protocol server loop. Returns the process exit code: 0 on a
/// clean shutdown, 2 on a transport-level I/O error (§6).
pub async fn run() -> Result<u8> {
    tracing::info!("stratum server starting");
    match transport::run().await {
        Ok(()) => Ok(0),
        Err(err) => {
            tracing::error!(%err, "transport loop terminated with an I/O error");
            Ok(2)
        }
    }
}
