use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BusError;

/// Transport layer for ZeroMQ connections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "address")]
pub enum Transport {
    /// Unix domain socket named under `/tmp/herald/`. Same host only.
    Ipc(String),

    /// TCP transport for distributed deployment.
    Tcp { host: String, port: u16 },
}

impl Transport {
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(name.to_string())
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Parse a broker URL: `tcp://host:port` or `ipc://name`.
    pub fn parse(url: &str) -> Result<Self, BusError> {
        if let Some(rest) = url.strip_prefix("tcp://") {
            let (host, port) = rest
                .rsplit_once(':')
                .ok_or_else(|| BusError::Transport(format!("missing port in '{url}'")))?;
            let port = port
                .parse()
                .map_err(|_| BusError::Transport(format!("invalid port in '{url}'")))?;
            if host.is_empty() {
                return Err(BusError::Transport(format!("missing host in '{url}'")));
            }
            return Ok(Self::tcp(host, port));
        }
        if let Some(name) = url.strip_prefix("ipc://") {
            if name.is_empty() || name.contains('/') {
                return Err(BusError::Transport(format!(
                    "ipc url must name a socket, not a path: '{url}'"
                )));
            }
            return Ok(Self::ipc(name));
        }
        Err(BusError::Transport(format!("unsupported broker url '{url}'")))
    }

    /// Generate the ZeroMQ endpoint address string.
    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(name) => format!("ipc:///tmp/herald/{name}.sock"),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    /// For IPC transports, ensure the parent directory exists.
    ///
    /// ZeroMQ requires the directory to exist before binding an IPC socket.
    pub fn ensure_ipc_dir(&self) -> std::io::Result<()> {
        if let Self::Ipc(_) = self {
            let endpoint = self.endpoint();
            let path = endpoint.strip_prefix("ipc://").unwrap_or(&endpoint);
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Remove a stale IPC socket file left over from a previous run.
    ///
    /// A leftover `.sock` file causes `EADDRINUSE` on the next bind.
    pub fn remove_stale_socket(&self) -> std::io::Result<()> {
        if let Self::Ipc(_) = self {
            let endpoint = self.endpoint();
            let path = endpoint.strip_prefix("ipc://").unwrap_or(&endpoint);
            match std::fs::remove_file(path) {
                Ok(()) => {
                    tracing::debug!(path, "removed stale IPC socket");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Prepare the endpoint for binding.
    pub(crate) fn prepare_bind(&self) -> Result<(), BusError> {
        self.ensure_ipc_dir()
            .map_err(|e| BusError::Transport(e.to_string()))?;
        self.remove_stale_socket()
            .map_err(|e| BusError::Transport(e.to_string()))
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}
