//! Java Debug Adapter Protocol server.
//!
//! This crate provides:
//! - The DAP wire layer: `Content-Length` framing, message envelopes and typed
//!   request arguments ([`dap`]).
//! - A connection engine that sequences outbound messages and correlates
//!   adapter-initiated requests with client responses ([`protocol_server`]).
//! - A command dispatcher and per-command handlers that drive a debuggee
//!   through the [`javadbg_vm::DebuggeeSession`] interface ([`adapter`],
//!   [`handler`]).

use std::sync::Arc;
use std::time::Duration;

use javadbg_config::AdapterConfig;
use javadbg_vm::VirtualMachineManager;
use tokio::io::{AsyncRead, AsyncWrite};

pub mod adapter;
pub mod breakpoints;
pub mod context;
pub mod dap;
pub mod error;
pub mod events;
pub mod format;
pub mod handler;
pub mod hardening;
pub mod id_collection;
pub mod protocol_server;
pub mod source_lookup;

pub use crate::adapter::{DebugAdapter, DebugRequestHandler, ResponseBuilder};
pub use crate::context::SessionContext;
pub use crate::error::{AdapterError, ErrorCode, HandlerResult, ProtocolError};
pub use crate::protocol_server::{MessageSender, ProtocolServer, ServerHandle, ServerOptions};

impl From<&AdapterConfig> for ServerOptions {
    fn from(config: &AdapterConfig) -> Self {
        Self {
            max_message_bytes: config.max_message_bytes,
            request_timeout: (config.request_timeout_ms > 0)
                .then(|| Duration::from_millis(config.request_timeout_ms)),
        }
    }
}

/// Serves one client over stdin/stdout until it disconnects.
pub async fn run_stdio(
    config: &AdapterConfig,
    vm_manager: Arc<dyn VirtualMachineManager>,
) -> anyhow::Result<()> {
    serve(tokio::io::stdin(), tokio::io::stdout(), config, vm_manager)
        .await
        .map_err(anyhow::Error::from)
}

/// Serves one client over an arbitrary byte stream pair.
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    config: &AdapterConfig,
    vm_manager: Arc<dyn VirtualMachineManager>,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let server = ProtocolServer::new(reader, writer, ServerOptions::from(config));
    let context = SessionContext::new(
        config.clone(),
        server.sender(),
        server.handle(),
        vm_manager,
    );
    let adapter = DebugAdapter::new(Arc::new(context));
    server.run(Arc::new(adapter)).await
}
