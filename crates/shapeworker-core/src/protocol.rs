use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest input summary embedded in an error message.
const INPUT_SUMMARY_LIMIT: usize = 512;

/// One host call: `{ "action": { "functionName", "inputs" }, "uid" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub action: Action,
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub function_name: String,
    #[serde(default)]
    pub inputs: Value,
}

impl Request {
    pub fn new(uid: impl Into<String>, function_name: impl Into<String>, inputs: Value) -> Self {
        Self {
            action: Action {
                function_name: function_name.into(),
                inputs,
            },
            uid: uid.into(),
        }
    }

    pub fn function_name(&self) -> &str {
        &self.action.function_name
    }

    /// Compact JSON of the inputs, truncated for embedding in error messages.
    pub fn input_summary(&self) -> String {
        let json = serde_json::to_string(&self.action.inputs).unwrap_or_default();
        if json.len() <= INPUT_SUMMARY_LIMIT {
            return json;
        }
        let mut end = INPUT_SUMMARY_LIMIT;
        while !json.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &json[..end])
    }
}

/// Reply to exactly one [`Request`], correlated by `uid`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn success(uid: impl Into<String>, result: Value) -> Self {
        Self {
            uid: uid.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(uid: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Advisory status sent before a request's response. Carries no `uid`.
///
/// Emitted when the worker dequeues the request, not on arrival: a request
/// queued behind a long computation is acknowledged only once it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Busy,
}

/// Everything the worker sends to the host, in emission order.
///
/// On the wire a status is a bare string (`"busy"`) and a response is an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerMessage {
    Status(WorkerStatus),
    Response(Response),
}

/// Operation names with dispatch rules of their own. None of them go
/// through the operation cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReservedOperation {
    /// Tessellate the `shape` subject.
    ShapeToMesh,
    /// Tessellate every entry of `shapes`.
    ShapesToMeshes,
    /// Run boundary; may trigger threshold eviction.
    StartedTheRun,
    /// Unconditional eviction.
    CleanAllCache,
    /// Serialize the `shape` subject to an STL document.
    SaveShapeStl,
}

impl ReservedOperation {
    pub const ALL: [ReservedOperation; 5] = [
        ReservedOperation::ShapeToMesh,
        ReservedOperation::ShapesToMeshes,
        ReservedOperation::StartedTheRun,
        ReservedOperation::CleanAllCache,
        ReservedOperation::SaveShapeStl,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReservedOperation::ShapeToMesh => "shapeToMesh",
            ReservedOperation::ShapesToMeshes => "shapesToMeshes",
            ReservedOperation::StartedTheRun => "startedTheRun",
            ReservedOperation::CleanAllCache => "cleanAllCache",
            ReservedOperation::SaveShapeStl => "saveShapeStl",
        }
    }
}

impl fmt::Display for ReservedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReservedOperation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReservedOperation::ALL
            .into_iter()
            .find(|op| op.name() == s)
            .ok_or(())
    }
}
