//! IPC protocol for parent ↔ sandbox worker communication.
//!
//! Uses length-delimited JSON messages: 4-byte big-endian length prefix + JSON payload.
//! All messages are typed via [`ParentMessage`] and [`ChildMessage`] enums.
//! `Result` fields use serde's external tagging (`{"Ok": ..}` / `{"Err": ..}`),
//! which the Python worker mirrors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::namespace::{Bindings, CallError, CallValue, ObjectInfo, Target};

/// Messages sent from the parent process to the worker child.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ParentMessage {
    /// Execute the neutralized artifact as a fresh module.
    Load {
        /// Path of the neutralized artifact inside the worker directory.
        artifact: String,
        /// Module name to execute under (never `__main__`).
        module_name: String,
        /// Install the list-based numpy stand-in when numpy is missing.
        stub_numpy: bool,
    },
    /// Call a target with positional arguments.
    Call {
        /// What to call.
        target: Target,
        /// Positional arguments.
        args: Vec<Value>,
    },
    /// Read a target.
    Get {
        /// What to read.
        target: Target,
    },
    /// Rebind a module global.
    SetGlobal {
        /// Global name.
        name: String,
        /// New value.
        value: Value,
    },
    /// Describe a target's shape.
    Describe {
        /// What to describe.
        target: Target,
    },
    /// Exit cleanly.
    Shutdown,
}

/// Messages sent from the worker child to the parent process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChildMessage {
    /// The module body finished executing.
    Loaded {
        /// Top-level bindings, or the escaped exception.
        result: Result<Bindings, String>,
    },
    /// Answer to `Call`, `Get` or `SetGlobal`.
    Reply {
        /// The value, or why the request failed.
        result: Result<CallValue, CallError>,
    },
    /// Answer to `Describe`.
    Described {
        /// The object shape, or why the request failed.
        result: Result<ObjectInfo, CallError>,
    },
    /// A log message from the worker.
    Log {
        /// The log message text.
        message: String,
    },
}

/// Write a length-delimited JSON message to an async writer.
///
/// Format: 4-byte big-endian length prefix followed by the JSON payload bytes.
pub async fn write_message<T: Serialize, W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &T,
) -> Result<(), std::io::Error> {
    let payload = serde_json::to_vec(msg)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "IPC payload too large: {} bytes (max {} bytes)",
                payload.len(),
                u32::MAX
            ),
        )
    })?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Default maximum IPC message size: 16 MB.
pub const DEFAULT_MAX_IPC_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Read a length-delimited JSON message from an async reader.
///
/// Returns `None` if the reader has reached EOF (clean shutdown).
/// Uses [`DEFAULT_MAX_IPC_MESSAGE_SIZE`] as the size limit.
pub async fn read_message<T: for<'de> Deserialize<'de>, R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<T>, std::io::Error> {
    read_message_with_limit(reader, DEFAULT_MAX_IPC_MESSAGE_SIZE).await
}

/// Read a length-delimited JSON message with a configurable size limit.
///
/// Returns `None` if the reader has reached EOF (clean shutdown).
pub async fn read_message_with_limit<T: for<'de> Deserialize<'de>, R: AsyncRead + Unpin>(
    reader: &mut R,
    max_size: usize,
) -> Result<Option<T>, std::io::Error> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_size {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "IPC message too large: {} bytes (limit: {} bytes)",
                len, max_size
            ),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    let msg: T = serde_json::from_slice(&payload)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(Some(msg))
}
