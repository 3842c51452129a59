//! Control socket wire format: one JSON object per line in each direction.
//!
//! ```text
//! -> {"cmd":"sync","container":"Review"}
//! <- {"ok":true,"data":{...}}
//! ```

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::thread::sleep;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// Gap between connection attempts while a freshly started daemon binds.
const STARTUP_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "lowercase")]
pub enum ControlRequest {
    Status,
    /// Sync now and reply once the run is over.
    Sync {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        container: Option<String>,
    },
    Stop,
}

impl ControlRequest {
    fn connect_attempts(&self) -> u32 {
        match self {
            // Polled right after `daemon start`, before the socket exists.
            ControlRequest::Status => 5,
            ControlRequest::Sync { .. } | ControlRequest::Stop => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<Value, String>> for ControlReply {
    fn from(result: Result<Value, String>) -> Self {
        match result {
            Ok(data) => Self {
                ok: true,
                data: Some(data),
                error: None,
            },
            Err(message) => Self {
                ok: false,
                data: None,
                error: Some(message),
            },
        }
    }
}

impl ControlReply {
    pub fn into_result(self) -> Result<Value, DaemonError> {
        if self.ok {
            return Ok(self.data.unwrap_or(Value::Null));
        }
        Err(DaemonError::Protocol(
            self.error.unwrap_or_else(|| "daemon replied without an error message".to_string()),
        ))
    }
}

/// Send `request` to the daemon under `home` and return the reply's data.
pub fn call(home: &Path, request: &ControlRequest) -> Result<Value, DaemonError> {
    let socket = socket_path(home);
    let attempts = request.connect_attempts();
    let mut attempt = 1;
    loop {
        match exchange(&socket, request) {
            Err(DaemonError::DaemonNotRunning { .. }) if attempt < attempts => {
                attempt += 1;
                sleep(STARTUP_POLL);
            }
            result => return result.and_then(ControlReply::into_result),
        }
    }
}

fn exchange(socket: &Path, request: &ControlRequest) -> Result<ControlReply, DaemonError> {
    let stream = UnixStream::connect(socket).map_err(|err| match err.kind() {
        ErrorKind::NotFound | ErrorKind::ConnectionRefused => DaemonError::DaemonNotRunning {
            socket: socket.to_path_buf(),
        },
        _ => io_err(socket, err),
    })?;

    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    (&stream)
        .write_all(line.as_bytes())
        .map_err(|e| io_err(socket, e))?;

    let mut reply = String::new();
    BufReader::new(&stream)
        .read_line(&mut reply)
        .map_err(|e| io_err(socket, e))?;
    if reply.is_empty() {
        return Err(DaemonError::Protocol(
            "daemon closed the connection without replying".to_string(),
        ));
    }
    Ok(serde_json::from_str(reply.trim_end())?)
}
