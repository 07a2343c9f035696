//! Newline-delimited JSON transport between a host process and the worker.
//!
//! Every inbound line is one request. Every outbound line is one
//! [`WorkerMessage`]: either the bare status string `"busy"` or a response
//! object.

use serde_json::Value;
use shapeworker_core::{Request, Response, WorkerMessage};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::ProxyError;
use crate::worker::Worker;

/// Decode one inbound line.
///
/// When the line is not a valid request but still names a `uid`, the error
/// side carries a response for that `uid`. Otherwise there is nobody to
/// answer and the error side is `None`.
pub fn decode_line(line: &str) -> Result<Request, Option<Response>> {
    let value: Value = match serde_json::from_str(line) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "Inbound line is not JSON");
            return Err(None);
        }
    };
    let uid = value.get("uid").and_then(Value::as_str).map(str::to_owned);

    serde_json::from_value::<Request>(value).map_err(|e| {
        let error = ProxyError::MalformedRequest(e.to_string());
        match uid {
            Some(uid) => Some(Response::failure(uid, error.to_string())),
            None => {
                tracing::warn!(error = %error, "Dropping request without uid");
                None
            }
        }
    })
}

/// Pump requests from `reader` into `worker` and messages from `outbound`
/// into `writer` until the reader hits EOF and the worker has drained.
///
/// Returns the number of non-blank lines read.
pub async fn serve<R, W>(
    worker: Worker,
    mut outbound: mpsc::UnboundedReceiver<WorkerMessage>,
    reader: R,
    mut writer: W,
) -> Result<u64, ProxyError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let read_side = async move {
        let mut lines = reader.lines();
        let mut received = 0u64;
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            received += 1;
            match decode_line(&line) {
                Ok(request) => worker.submit(request)?,
                Err(Some(response)) => worker.reject(response)?,
                Err(None) => {}
            }
        }
        tracing::debug!(received, "Inbound stream closed");
        // Closing the queue lets the worker finish and end the outbound stream.
        drop(worker);
        Ok::<_, ProxyError>(received)
    };

    let write_side = async {
        while let Some(message) = outbound.recv().await {
            let mut line = serde_json::to_vec(&message)?;
            line.push(b'\n');
            writer.write_all(&line).await?;
            writer.flush().await?;
        }
        Ok::<_, ProxyError>(())
    };

    let (received, ()) = tokio::try_join!(read_side, write_side)?;
    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{ProxyService, ServiceOptions};
    use serde_json::json;
    use shapeworker_kernel::ShapeKernel;

    #[test]
    fn decode_valid_request() {
        let line = r#"{"action":{"functionName":"shapes.solid.createCube","inputs":{"size":1}},"uid":"7"}"#;
        let request = decode_line(line).unwrap();
        assert_eq!(request.uid, "7");
        assert_eq!(request.function_name(), "shapes.solid.createCube");
    }

    #[test]
    fn decode_recovers_uid_for_malformed_request() {
        let response = decode_line(r#"{"uid":"9","action":{"inputs":{}}}"#).unwrap_err().unwrap();
        assert_eq!(response.uid, "9");
        assert!(response.error.unwrap().starts_with("malformed request"));
    }

    #[test]
    fn decode_drops_lines_without_uid() {
        assert!(decode_line("not json").unwrap_err().is_none());
        assert!(decode_line(r#"{"action":{"functionName":"x"}}"#).unwrap_err().is_none());
    }

    #[tokio::test]
    async fn serves_lines_in_order() {
        let input = concat!(
            r#"{"action":{"functionName":"shapes.solid.createCube","inputs":{"size":1}},"uid":"a"}"#,
            "\n\n",
            r#"{"uid":"b"}"#,
            "\n",
            r#"{"action":{"functionName":"startedTheRun"},"uid":"c"}"#,
            "\n",
        );
        let service = ProxyService::new(ShapeKernel::default(), ServiceOptions::default()).unwrap();
        let (worker, outbound, thread) = Worker::spawn(service).unwrap();

        let mut output = Vec::new();
        let received = serve(worker, outbound, input.as_bytes(), &mut output).await.unwrap();
        tokio::task::spawn_blocking(move || thread.join()).await.unwrap().unwrap();
        assert_eq!(received, 3);

        let lines: Vec<Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], json!("busy"));
        assert_eq!(lines[1]["uid"], "a");
        assert_eq!(lines[1]["result"]["type"], "shape");
        assert_eq!(lines[2]["uid"], "b");
        assert!(lines[2]["error"].is_string());
        assert_eq!(lines[3], json!("busy"));
        assert_eq!(lines[4]["uid"], "c");
        assert_eq!(lines[4]["result"]["evicted"], false);
    }
}
