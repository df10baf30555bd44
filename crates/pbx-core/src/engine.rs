//! Telephony engine control contract
//!
//! The engine is only ever asked three things: which endpoints it runs,
//! how one endpoint is configured, and to reload its configuration.
//! [`AsteriskCli`] answers them through the engine's remote console.

use std::collections::BTreeSet;
use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use crate::Error;
use crate::model::{LiveEntityState, Registration};

/// Default command used to apply endpoint configuration changes
pub const DEFAULT_RELOAD_COMMAND: &str = "module reload res_pjsip.so";

/// Failures reported by an [`EngineControl`] implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("engine unreachable: {0}")]
    Unreachable(String),

    /// The engine answered but refused the command; carries its raw output
    #[error("engine command failed: {0}")]
    Failed(String),

    #[error("unexpected engine output: {0}")]
    Malformed(String),
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unreachable(message) => Error::EngineUnreachable { message },
            EngineError::Failed(output) => Error::Reload { output },
            EngineError::Malformed(message) => Error::EngineProtocol { message },
        }
    }
}

/// Narrow control surface of the telephony engine
#[async_trait]
pub trait EngineControl: Send + Sync {
    /// Ids of every endpoint the engine currently runs
    async fn list_live_endpoints(&self) -> Result<Vec<String>, EngineError>;

    /// Configuration of one endpoint, or `None` if the engine does not know it
    async fn get_endpoint_detail(&self, id: &str) -> Result<Option<LiveEntityState>, EngineError>;

    /// Re-read configuration files; returns the engine's raw output
    async fn reload(&self) -> Result<String, EngineError>;
}

/// Engine control through `asterisk -rx "<command>"`
#[derive(Debug, Clone)]
pub struct AsteriskCli {
    binary: String,
    reload_command: String,
}

impl Default for AsteriskCli {
    fn default() -> Self {
        Self::new("asterisk")
    }
}

impl AsteriskCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            reload_command: DEFAULT_RELOAD_COMMAND.to_string(),
        }
    }

    pub fn with_reload_command(mut self, command: impl Into<String>) -> Self {
        self.reload_command = command.into();
        self
    }

    async fn run(&self, command: &str) -> Result<String, EngineError> {
        tracing::debug!(binary = %self.binary, command, "Running engine command");

        let output = Command::new(&self.binary)
            .arg("-rx")
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| EngineError::Unreachable(format!("failed to run {}: {}", self.binary, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if stdout.contains("Unable to connect to remote asterisk") || stderr.contains("Unable to connect") {
            return Err(EngineError::Unreachable(first_line(&stdout, &stderr)));
        }
        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            return Err(EngineError::Failed(format!(
                "exit code {}: {}",
                code,
                format!("{}{}", stdout, stderr).trim()
            )));
        }

        Ok(stdout)
    }
}

#[async_trait]
impl EngineControl for AsteriskCli {
    async fn list_live_endpoints(&self) -> Result<Vec<String>, EngineError> {
        let output = self.run("pjsip show endpoints").await?;
        Ok(parse_endpoint_list(&output))
    }

    async fn get_endpoint_detail(&self, id: &str) -> Result<Option<LiveEntityState>, EngineError> {
        if id.is_empty() || id.chars().any(|c| c.is_whitespace() || c == '"') {
            return Err(EngineError::Malformed(format!("invalid endpoint id '{}'", id)));
        }
        let output = self.run(&format!("pjsip show endpoint {}", id)).await?;
        Ok(parse_endpoint_detail(id, &output))
    }

    async fn reload(&self) -> Result<String, EngineError> {
        let output = self.run(&self.reload_command).await?;
        let lowered = output.to_lowercase();
        if ["fail", "error", "not found", "unable", "no such"]
            .iter()
            .any(|marker| lowered.contains(marker))
        {
            return Err(EngineError::Failed(output.trim().to_string()));
        }
        Ok(output.trim().to_string())
    }
}

fn first_line(stdout: &str, stderr: &str) -> String {
    stdout
        .lines()
        .chain(stderr.lines())
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no output")
        .trim()
        .to_string()
}

static ENDPOINT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Endpoint:\s+([^\s/<]+)(?:/\S*)?(?:\s|$)").expect("valid regex"));

static PARAM_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([a-z][a-z0-9_]*)\s+:\s?(.*)$").expect("valid regex"));

static AOR_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*Aor:\s+(\S+)\s+(\d+)\s*$").expect("valid regex"));

static CONTACT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Contact:\s+[^\s/<]+/(\S+)\s+\S+\s+(\S+)").expect("valid regex"));

static CONTACT_HOST: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@([^;>\s]+)").expect("valid regex"));

static CALLERID_NAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^"([^"]*)""#).expect("valid regex"));

/// Endpoint ids from `pjsip show endpoints`, in listing order.
pub fn parse_endpoint_list(output: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    output
        .lines()
        .filter_map(|line| ENDPOINT_LINE.captures(line))
        .map(|caps| caps[1].to_string())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Live state from `pjsip show endpoint <id>`.
///
/// Returns `None` when the engine reports no such endpoint.
pub fn parse_endpoint_detail(id: &str, output: &str) -> Option<LiveEntityState> {
    if output.contains("Unable to find object") {
        return None;
    }

    let mut state = LiveEntityState::new(id);
    let mut found = false;
    let mut max_contacts = 0u32;
    let mut saw_aor = false;
    let mut contact_status: Option<String> = None;

    for line in output.lines() {
        if let Some(caps) = AOR_LINE.captures(line) {
            saw_aor = true;
            max_contacts += caps[2].parse::<u32>().unwrap_or(0);
            continue;
        }
        if let Some(caps) = CONTACT_LINE.captures(line) {
            if state.contact.is_none() {
                state.contact = CONTACT_HOST.captures(&caps[1]).map(|h| h[1].to_string());
                contact_status = Some(caps[2].to_string());
            }
            continue;
        }
        if ENDPOINT_LINE.is_match(line) {
            found = true;
            continue;
        }
        let Some(caps) = PARAM_LINE.captures(line) else {
            continue;
        };
        found = true;
        let value = caps[2].trim();
        match &caps[1] {
            "callerid" => {
                state.name = CALLERID_NAME
                    .captures(value)
                    .map(|c| c[1].to_string())
                    .filter(|n| !n.is_empty());
            }
            "auth" | "outbound_auth" if !value.is_empty() => state.has_secret = true,
            "allow" => state.codecs = parse_codecs(value),
            "context" => state.context = value.to_string(),
            "transport" => state.transport = value.to_string(),
            _ => {}
        }
    }

    if !found {
        return None;
    }

    state.enabled = max_contacts > 0;
    state.registration = match contact_status.as_deref() {
        Some("Unavail") => Registration::Unregistered,
        Some(_) => Registration::Registered,
        None if saw_aor => Registration::Unregistered,
        None => Registration::Unknown,
    };
    Some(state)
}

/// `(ulaw|alaw)` or `ulaw,alaw` into a codec list.
fn parse_codecs(value: &str) -> Vec<String> {
    value
        .trim_matches(|c| c == '(' || c == ')')
        .split(['|', ','])
        .map(str::trim)
        .filter(|c| !c.is_empty() && *c != "nothing")
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ENDPOINTS: &str = r#"
 Endpoint:  <Endpoint/CID.....................................>  <State.....>  <Channels.>
    I/OAuth:  <AuthId/UserName...........................................................>
        Aor:  <Aor............................................>  <MaxContact>
      Contact:  <Aor/ContactUri..........................> <Hash....> <Status> <RTT(ms)..>
==========================================================================================

 Endpoint:  1001/1001                                            Not in use    0 of inf
     InAuth:  1001/1001
        Aor:  1001                                               1
      Contact:  1001/sip:1001@192.168.1.50:5060;ob      a1b2c3d4e5 Avail        12.345

 Endpoint:  1002                                                 Unavailable   0 of inf
        Aor:  1002                                               0

Objects found: 2
"#;

    const DETAIL: &str = r#"
 Endpoint:  1001/1001                                            Not in use    0 of inf
     InAuth:  1001/1001
        Aor:  1001                                               1
      Contact:  1001/sip:1001@192.168.1.50:5060;ob      a1b2c3d4e5 Avail        12.345

 ParameterName                      : ParameterValue
 =================================================================================
 aors                               : 1001
 allow                              : (ulaw|alaw)
 auth                               : 1001
 callerid                           : "Alice" <1001>
 context                            : internal
 disallow                           : all
 transport                          : transport-udp
"#;

    #[test]
    fn list_skips_legend_and_dedupes() {
        assert_eq!(parse_endpoint_list(ENDPOINTS), vec!["1001", "1002"]);
        assert!(parse_endpoint_list("No objects found.\n").is_empty());
    }

    #[test]
    fn detail_extracts_compared_and_observed_fields() {
        let state = parse_endpoint_detail("1001", DETAIL).unwrap();

        assert_eq!(state.name.as_deref(), Some("Alice"));
        assert!(state.has_secret);
        assert_eq!(state.codecs, vec!["ulaw", "alaw"]);
        assert_eq!(state.context, "internal");
        assert_eq!(state.transport, "transport-udp");
        assert!(state.enabled);
        assert_eq!(state.registration, Registration::Registered);
        assert_eq!(state.contact.as_deref(), Some("192.168.1.50:5060"));
    }

    #[test]
    fn detail_of_unknown_endpoint_is_none() {
        assert_eq!(parse_endpoint_detail("9999", "Unable to find object 9999.\n"), None);
        assert_eq!(parse_endpoint_detail("9999", ""), None);
    }

    #[test]
    fn zero_max_contacts_means_disabled() {
        let output = " Endpoint:  1002\n        Aor:  1002      0\n context   : internal\n";
        let state = parse_endpoint_detail("1002", output).unwrap();

        assert!(!state.enabled);
        assert!(!state.has_secret);
        assert_eq!(state.registration, Registration::Unregistered);
    }

    #[test]
    fn codec_spellings() {
        assert_eq!(parse_codecs("(ulaw|alaw|g722)"), vec!["ulaw", "alaw", "g722"]);
        assert_eq!(parse_codecs("ulaw, alaw"), vec!["ulaw", "alaw"]);
        assert!(parse_codecs("(nothing)").is_empty());
    }

    #[test]
    fn failed_engine_errors_map_to_reload() {
        let err: Error = EngineError::Failed("Module not found".to_string()).into();
        assert!(matches!(err, Error::Reload { output } if output == "Module not found"));
    }

    #[tokio::test]
    async fn missing_binary_is_unreachable() {
        let cli = AsteriskCli::new("/nonexistent/asterisk-binary");

        let result = cli.list_live_endpoints().await;

        assert!(matches!(result, Err(EngineError::Unreachable(_))));
    }
}
