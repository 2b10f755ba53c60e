//! JSON I/O handling for CLI
//!
//! - Input: one JSON document on stdin (may span lines)
//! - Output: one JSON object on stdout
//! - Logs never go to stdout

use std::io::{self, Read, Write};

use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Read a JSON request from stdin. Empty input is an empty request.
pub fn read_request() -> CliResult<Value> {
    let mut body = String::new();
    io::stdin().lock().read_to_string(&mut body)?;
    parse_request(&body)
}

pub(crate) fn parse_request(body: &str) -> CliResult<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value = serde_json::from_str(body)?;
    if !value.is_object() {
        return Err(CliError::invalid_request("Request body must be a JSON object"));
    }
    Ok(value)
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });

    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, &response)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        assert_eq!(parse_request("  \n").unwrap(), serde_json::json!({}));
        assert!(parse_request("{\n\"filters\": null\n}").is_ok());
        assert!(parse_request("[1]").is_err());
        assert!(parse_request("{oops").is_err());
    }
}
