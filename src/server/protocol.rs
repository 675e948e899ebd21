// DM Bridge - Wire Protocol
// Copyright (C) 2026 Christos Daggas
// SPDX-License-Identifier: MIT

//! Newline-delimited JSON framing.
//!
//! ```text
//! → {"interface":"servicemanager","method":"Query","params":{"name":"w32time"}}
//! ← {"status":0,"result":1}
//! ← {"status":2,"error":{"kind":"AccessDenied","message":"..."}}
//! ```

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::BridgeError;

/// Largest request line accepted, newline included.
pub const MAX_REQUEST_BYTES: u64 = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub interface: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ok(result: Value) -> Self {
        Self {
            status: 0,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(err: &BridgeError) -> Self {
        Self {
            status: err.status(),
            result: None,
            error: Some(ErrorBody {
                kind: err.kind().to_string(),
                message: err.to_string(),
            }),
        }
    }
}

/// One unit read off a connection.
#[derive(Debug)]
pub enum Frame {
    Request(Request),
    /// A complete line that is not a valid request. The connection survives.
    Malformed(BridgeError),
    /// A line over [`MAX_REQUEST_BYTES`]. The connection is closed.
    Oversized,
    Eof,
}

pub async fn read_frame<R>(reader: &mut R) -> io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let read = (&mut *reader)
        .take(MAX_REQUEST_BYTES + 1)
        .read_line(&mut line)
        .await?;

    if read == 0 {
        return Ok(Frame::Eof);
    }
    if read as u64 > MAX_REQUEST_BYTES {
        return Ok(Frame::Oversized);
    }

    Ok(match serde_json::from_str::<Request>(line.trim()) {
        Ok(request) => Frame::Request(request),
        Err(e) => Frame::Malformed(BridgeError::InvalidArgument(format!("malformed request: {}", e))),
    })
}

pub async fn write_response<W>(writer: &mut W, response: &Response) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut payload = serde_json::to_vec(response)?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_read_frames() {
        let input = concat!(
            r#"{"interface":"telemetry","method":"GetLevel"}"#,
            "\n",
            "not json\n",
            r#"{"interface":"servicemanager","method":"Query","params":{"name":"w32time"}}"#,
        );
        let mut reader = BufReader::new(input.as_bytes());

        match read_frame(&mut reader).await.unwrap() {
            Frame::Request(request) => {
                assert_eq!(request.interface, "telemetry");
                assert_eq!(request.method, "GetLevel");
                assert_eq!(request.params, Value::Null);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            read_frame(&mut reader).await.unwrap(),
            Frame::Malformed(BridgeError::InvalidArgument(_))
        ));
        match read_frame(&mut reader).await.unwrap() {
            Frame::Request(request) => assert_eq!(request.params, json!({"name": "w32time"})),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(read_frame(&mut reader).await.unwrap(), Frame::Eof));
    }

    #[tokio::test]
    async fn test_oversized_request() {
        let input = format!("{}\n", "x".repeat(MAX_REQUEST_BYTES as usize + 10));
        let mut reader = BufReader::new(input.as_bytes());
        assert!(matches!(read_frame(&mut reader).await.unwrap(), Frame::Oversized));
    }

    #[tokio::test]
    async fn test_request_at_limit_is_read() {
        let request = r#"{"interface":"telemetry","method":"GetLevel","params":{}}"#;
        let padding = MAX_REQUEST_BYTES as usize - request.len() - 1;
        let input = format!("{}{}\n", " ".repeat(padding), request);
        let mut reader = BufReader::new(input.as_bytes());
        assert!(matches!(read_frame(&mut reader).await.unwrap(), Frame::Request(_)));
    }

    #[test]
    fn test_response_shapes() {
        let ok = serde_json::to_value(Response::ok(Value::Null)).unwrap();
        assert_eq!(ok, json!({"status": 0, "result": null}));

        let err = serde_json::to_value(Response::error(&BridgeError::NotConfigured)).unwrap();
        assert_eq!(err["status"], 3);
        assert_eq!(err["error"]["kind"], "NotConfigured");
        assert!(err.get("result").is_none());
    }
}
