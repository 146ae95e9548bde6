//! `nmap`: port scan plus Metasploit search query generation.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::process::Command;
use toolplan_primitives::{CallContext, Config};

use crate::descriptor::{Tool, ToolDescriptor, ToolMetadata};
use crate::error::{ToolError, ToolResult};
use crate::process;
use crate::registry::{BuildContext, RegistryBuilder};
use crate::schema::decode_args;

use super::parse_ip;

/// Registered name.
pub const NAME: &str = "nmap";

const DEFAULT_EXECUTABLE: &str = "nmap";
const DEFAULT_ARGS: [&str; 8] = [
    "-v",
    "-T3",
    "-sT",
    "-sV",
    "-Pn",
    "--version-all",
    "--top-ports",
    "100",
];
const PORT_LINE: &str = r"(\d+)/tcp\s+(\w+)\s+(.+?)\s*(?:\n|$)";

/// One `port/tcp state service` line of nmap output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port number as printed.
    pub port: String,
    /// Port state, e.g. `open`.
    pub state: String,
    /// Service and version text.
    pub service: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NmapArgs {
    ip: String,
    #[serde(default)]
    args: Vec<String>,
}

fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "ip": {
                "type": "string",
                "description": "The IP address to scan."
            },
            "args": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Optional nmap arguments, e.g. [\"-sV\",\"-p\",\"1-100\"]. \
                                Defaults to [\"-v\",\"-T3\",\"-sT\",\"-sV\",\"-Pn\",\"--version-all\",\"--top-ports\",\"100\"]."
            }
        },
        "required": ["ip"],
        "additionalProperties": false
    })
}

/// Registers the capability under [`NAME`].
pub fn register(builder: &mut RegistryBuilder) {
    builder.register(NAME, build);
}

fn build(_ctx: &BuildContext, config: &Config) -> ToolResult<Option<ToolDescriptor>> {
    if !config.is_enabled(NAME) {
        return Ok(None);
    }
    let executable = config
        .capability(NAME)
        .executable()
        .unwrap_or(DEFAULT_EXECUTABLE)
        .to_owned();
    let port_line = Regex::new(PORT_LINE).map_err(|err| ToolError::config(NAME, err.to_string()))?;
    let metadata = ToolMetadata::new(
        NAME,
        "Runs nmap against an IP with the given arguments (or sane defaults), parses open \
         ports and returns the arguments used plus generated Metasploit search queries.",
        schema(),
    )?;
    Ok(Some(ToolDescriptor::new(
        metadata,
        NmapTool {
            executable,
            port_line,
        },
    )))
}

struct NmapTool {
    executable: String,
    port_line: Regex,
}

#[async_trait]
impl Tool for NmapTool {
    async fn invoke(&self, ctx: CallContext, input: Value) -> ToolResult<String> {
        let args: NmapArgs = decode_args(NAME, input)?;
        let ip = parse_ip(NAME, &args.ip)?.to_string();
        let argv = scan_arguments(&ip, args.args);

        let mut command = Command::new(&self.executable);
        command.args(&argv);
        let output = process::run(&ctx, NAME, command)
            .await?
            .into_success(&self.executable)?;

        let ports = parse_ports(&self.port_line, &output);
        let queries = msf_queries(&ports);
        Ok(format!(
            "Used args: {}\n\nGenerated Metasploit queries: {}",
            argv.join(" "),
            serde_json::to_string(&queries).map_err(|err| ToolError::execution(err.to_string()))?
        ))
    }
}

fn scan_arguments(ip: &str, requested: Vec<String>) -> Vec<String> {
    if requested.is_empty() {
        let mut argv: Vec<String> = DEFAULT_ARGS.iter().map(|arg| (*arg).to_owned()).collect();
        argv.push(ip.to_owned());
        return argv;
    }
    let mut argv = requested;
    if !argv.iter().any(|arg| arg == ip) {
        argv.push(ip.to_owned());
    }
    argv
}

/// Extracts `port/tcp state service` lines from nmap output.
#[must_use]
pub fn parse_ports(port_line: &Regex, output: &str) -> Vec<PortInfo> {
    port_line
        .captures_iter(output)
        .map(|caps| PortInfo {
            port: caps[1].to_owned(),
            state: caps[2].trim().to_owned(),
            service: caps[3].trim().to_owned(),
        })
        .collect()
}

/// Builds Metasploit search queries for every open port.
#[must_use]
pub fn msf_queries(ports: &[PortInfo]) -> Vec<String> {
    ports
        .iter()
        .filter(|port| port.state.eq_ignore_ascii_case("open"))
        .flat_map(|port| {
            [
                format!("type:exploit name:{}", port.service),
                format!("port {}", port.port),
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Starting Nmap 7.94
PORT     STATE  SERVICE VERSION
22/tcp   open   ssh     OpenSSH 8.9p1
80/tcp   closed http
443/tcp  open   https
Nmap done: 1 IP address (1 host up)";

    #[test]
    fn parses_port_lines() {
        let regex = Regex::new(PORT_LINE).unwrap();
        let ports = parse_ports(&regex, SAMPLE);
        assert_eq!(ports.len(), 3);
        assert_eq!(ports[0].port, "22");
        assert_eq!(ports[0].state, "open");
        assert_eq!(ports[0].service, "ssh     OpenSSH 8.9p1");
        assert_eq!(ports[1].state, "closed");
        assert_eq!(ports[2].service, "https");
    }

    #[test]
    fn queries_only_for_open_ports() {
        let regex = Regex::new(PORT_LINE).unwrap();
        let queries = msf_queries(&parse_ports(&regex, SAMPLE));
        assert_eq!(
            queries,
            [
                "type:exploit name:ssh     OpenSSH 8.9p1",
                "port 22",
                "type:exploit name:https",
                "port 443"
            ]
        );
    }

    #[test]
    fn default_arguments_end_with_ip() {
        let argv = scan_arguments("10.0.0.1", Vec::new());
        assert_eq!(argv.first().map(String::as_str), Some("-v"));
        assert_eq!(argv.last().map(String::as_str), Some("10.0.0.1"));
        assert_eq!(argv.len(), DEFAULT_ARGS.len() + 1);
    }

    #[test]
    fn custom_arguments_gain_ip_once() {
        let argv = scan_arguments("10.0.0.1", vec!["-sV".into(), "-p".into(), "1-100".into()]);
        assert_eq!(argv, ["-sV", "-p", "1-100", "10.0.0.1"]);

        let argv = scan_arguments("10.0.0.1", vec!["10.0.0.1".into(), "-F".into()]);
        assert_eq!(argv, ["10.0.0.1", "-F"]);
    }

    #[tokio::test]
    async fn rejects_invalid_ip_before_spawning() {
        let tool = NmapTool {
            executable: "definitely-not-nmap".into(),
            port_line: Regex::new(PORT_LINE).unwrap(),
        };
        let err = tool
            .invoke(CallContext::new(), json!({"ip": "not-an-ip"}))
            .await
            .expect_err("invalid ip");
        assert!(matches!(err, ToolError::Argument { .. }));
    }

    #[tokio::test]
    async fn parses_output_of_substituted_executable() {
        let tool = NmapTool {
            executable: "sh".into(),
            port_line: Regex::new(PORT_LINE).unwrap(),
        };
        let script = format!("printf '%s\\n' \"{}\"", SAMPLE.replace('\n', "\" \""));
        let output = tool
            .invoke(
                CallContext::new(),
                json!({"ip": "10.0.0.1", "args": ["-c", script, "10.0.0.1"]}),
            )
            .await
            .unwrap();
        assert!(output.starts_with("Used args: -c"));
        assert!(output.contains("\"port 22\""));
        assert!(output.contains("\"port 443\""));
        assert!(!output.contains("\"port 80\""));
    }
}
