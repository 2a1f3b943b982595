use std::io::Write;

use serde::Serialize;
use serde_json::Value;

use super::csv_parser::OperationKind;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// Answer to one operation row: exactly one of `result` / `error` is set.
#[derive(Debug, Serialize)]
pub struct Response {
    pub line: u64,
    pub op: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn ok(line: u64, op: OperationKind, result: impl Serialize) -> serde_json::Result<Self> {
        Ok(Self {
            line,
            op,
            result: Some(serde_json::to_value(result)?),
            error: None,
        })
    }

    pub fn err(line: u64, op: OperationKind, kind: &str, message: &str) -> Self {
        Self {
            line,
            op,
            result: None,
            error: Some(ErrorBody {
                kind: kind.to_string(),
                message: message.to_string(),
            }),
        }
    }
}

/// Writes `response` as a single JSON line.
pub fn write_response<W>(output: &mut W, response: &Response) -> anyhow::Result<()>
where
    W: Write,
{
    serde_json::to_writer(&mut *output, response)?;
    output.write_all(b"\n")?;
    Ok(())
}
