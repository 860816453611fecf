//! Stdio JSON-lines subprocess transport for the Plugin Facade. Spawns the
//! configured binary once per call, writes a single JSON request line to
//! its stdin, and reads a single JSON response line from its stdout — the
//! simplest transport that still lets an operator implement `GrantAccess`/
//! `RevokeAccess` in any language, which is the whole point of keeping the
//! facade transport-agnostic (spec §4.5).

use access_types::{AccessRequest, Application};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use super::{GrantResponse, GrantStatus, Plugin, RevokeResponse, RevokeStatus};
use crate::util::Error;

pub struct ProcessPlugin {
    binary_path: String,
}

impl ProcessPlugin {
    pub fn new(binary_path: String) -> Self {
        ProcessPlugin { binary_path }
    }

    async fn call(&self, op: &'static str, body: Value) -> Result<Value, Error> {
        let mut child = Command::new(&self.binary_path)
            .arg(op)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| Error::Plugin(format!("failed to spawn plugin {}: {e}", self.binary_path)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Plugin("plugin process has no stdin".into()))?;
        let payload = serde_json::to_vec(&body)?;
        stdin
            .write_all(&payload)
            .await
            .map_err(|e| Error::Plugin(format!("failed writing to plugin stdin: {e}")))?;
        stdin.write_all(b"\n").await.ok();
        drop(stdin);

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Plugin("plugin process has no stdout".into()))?;
        let mut line = String::new();
        BufReader::new(stdout)
            .read_line(&mut line)
            .await
            .map_err(|e| Error::Plugin(format!("failed reading plugin stdout: {e}")))?;

        let status = child
            .wait()
            .await
            .map_err(|e| Error::Plugin(format!("plugin process failed: {e}")))?;
        if !status.success() {
            return Err(Error::Plugin(format!("plugin exited with status {status}")));
        }

        if line.trim().is_empty() {
            return Err(Error::PluginNullResponse);
        }
        let value: Value = serde_json::from_str(line.trim())?;
        if value.is_null() {
            return Err(Error::PluginNullResponse);
        }
        Ok(value)
    }
}

#[derive(Serialize)]
struct CallBody<'a> {
    request: &'a AccessRequest,
    application: &'a Application,
}

#[derive(Deserialize)]
struct WireGrantResponse {
    status: String,
    message: Option<String>,
}

#[derive(Deserialize)]
struct WireRevokeResponse {
    status: String,
    message: Option<String>,
}

#[async_trait]
impl Plugin for ProcessPlugin {
    async fn init(&self) -> Result<(), Error> {
        // The stdio transport is stateless across calls, so there is no
        // persistent handle to establish; `init` exists on the trait for
        // transports (e.g. a long-lived RPC connection) that need one.
        Ok(())
    }

    async fn grant_access(&self, request: &AccessRequest, app: &Application) -> Result<GrantResponse, Error> {
        let body = serde_json::to_value(CallBody {
            request,
            application: app,
        })?;
        let value = self.call("grant", body).await?;
        let wire: WireGrantResponse = serde_json::from_value(value)?;
        let status = match wire.status.as_str() {
            "Granted" => GrantStatus::Granted,
            "Pending" => GrantStatus::Pending,
            "Denied" => GrantStatus::Denied,
            other => return Err(Error::Plugin(format!("unrecognized grant status '{other}'"))),
        };
        Ok(GrantResponse {
            status,
            message: wire.message,
        })
    }

    async fn revoke_access(&self, request: &AccessRequest, app: &Application) -> Result<RevokeResponse, Error> {
        let body = serde_json::to_value(CallBody {
            request,
            application: app,
        })?;
        let value = self.call("revoke", body).await?;
        let wire: WireRevokeResponse = serde_json::from_value(value)?;
        let status = match wire.status.as_str() {
            "Revoked" => RevokeStatus::Revoked,
            "Pending" => RevokeStatus::Pending,
            other => return Err(Error::Plugin(format!("unrecognized revoke status '{other}'"))),
        };
        Ok(RevokeResponse {
            status,
            message: wire.message,
        })
    }
}
