#![forbid(unsafe_code)]

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};

use crate::error::GatewayError;

/// Decoded path parameters. Every segment arrives base64-encoded; absent
/// segments decode to empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestVars {
    pub secret: String,
    pub command: String,
    pub description: String,
    pub cmd_hash: String,
    pub working_directory: String,
}

impl RequestVars {
    pub fn decode(params: &HashMap<String, String>) -> Result<Self, GatewayError> {
        Ok(Self {
            secret: decode_field(params, "secret")?,
            command: decode_field(params, "command")?,
            description: decode_field(params, "description")?,
            cmd_hash: decode_field(params, "cmdHash")?,
            working_directory: decode_field(params, "workingDirectory")?,
        })
    }

    pub fn require_hash(&self) -> Result<&str, GatewayError> {
        require("cmdHash", &self.cmd_hash)
    }

    pub fn require_command(&self) -> Result<&str, GatewayError> {
        require("command", &self.command)
    }
}

fn require<'a>(name: &str, value: &'a str) -> Result<&'a str, GatewayError> {
    if value.trim().is_empty() {
        return Err(GatewayError::BadRequest(format!("{name} is required")));
    }
    Ok(value)
}

fn decode_field(params: &HashMap<String, String>, name: &str) -> Result<String, GatewayError> {
    let Some(raw) = params.get(name) else {
        return Ok(String::new());
    };
    let bytes = STANDARD
        .decode(raw)
        .or_else(|_| URL_SAFE.decode(raw))
        .map_err(|e| GatewayError::BadRequest(format!("invalid base64 in {name}: {e}")))?;
    String::from_utf8(bytes)
        .map_err(|_| GatewayError::BadRequest(format!("{name} is not valid UTF-8")))
}

/// Encodes a value the way clients must send path segments.
#[must_use]
pub fn encode(value: &str) -> String {
    URL_SAFE.encode(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn decodes_present_fields_and_defaults_absent_ones() {
        let p = params(&[
            ("secret", &STANDARD.encode("s3cret")),
            ("cmdHash", &STANDARD.encode("abc123")),
        ]);
        let vars = RequestVars::decode(&p).unwrap();
        assert_eq!(vars.secret, "s3cret");
        assert_eq!(vars.cmd_hash, "abc123");
        assert!(vars.command.is_empty());
        assert!(vars.working_directory.is_empty());
    }

    #[test]
    fn accepts_url_safe_encoding() {
        let text = "cat ~/notes??>>out";
        assert!(encode(text).contains(['-', '_']));
        let p = params(&[("command", &encode(text))]);
        assert_eq!(RequestVars::decode(&p).unwrap().command, text);
    }

    #[test]
    fn invalid_base64_is_a_bad_request() {
        let p = params(&[("description", "***")]);
        let err = RequestVars::decode(&p).unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(msg) if msg.contains("description")));
    }

    #[test]
    fn required_fields_must_be_non_empty() {
        let vars = RequestVars::default();
        assert!(vars.require_hash().is_err());
        assert!(vars.require_command().is_err());
    }
}
