// Lab configuration model
//
// Every field has a default matching the reference six-AS topology, so an
// absent config file still yields a usable configuration.

use serde::{Deserialize, Serialize};

use super::error::{DomainError, Result};
use super::node::NodeName;

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    /// Prefix that attaches to a node; `{pid}` is replaced by the context pid.
    /// Empty means run on the host.
    pub attach_command: Vec<String>,
    /// Shell invocation receiving the command text as its last argument
    pub shell: Vec<String>,
    /// Command-line marker binding a process to a node (`mininet:R6`)
    pub node_tag_prefix: String,
    /// Binary name of this tool; its own instances never resolve as nodes
    pub tool_name: String,
    /// Hostnames every node may report without triggering a mismatch warning
    pub accepted_hostnames: Vec<String>,
    pub probe: ProbeSettings,
    pub topology: Topology,
    pub daemons: DaemonCommands,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            attach_command: vec!["mnexec".into(), "-a".into(), "{pid}".into()],
            shell: vec!["/bin/sh".into(), "-lc".into()],
            node_tag_prefix: "mininet:".into(),
            tool_name: "hijacklab".into(),
            accepted_hostnames: vec!["mininet".into()],
            probe: ProbeSettings::default(),
            topology: Topology::default(),
            daemons: DaemonCommands::default(),
        }
    }
}

impl LabConfig {
    pub fn validate(&self) -> Result<()> {
        if self.shell.is_empty() {
            return Err(DomainError::ValidationError("shell must not be empty".into()));
        }
        if self.node_tag_prefix.is_empty() {
            return Err(DomainError::ValidationError(
                "node_tag_prefix must not be empty".into(),
            ));
        }
        if !self.attach_command.is_empty() && !self.attach_command.iter().any(|a| a.contains("{pid}")) {
            return Err(DomainError::ValidationError(
                "attach_command must reference {pid}".into(),
            ));
        }
        if self.probe.timeout_secs == 0 || self.probe.preflight_timeout_secs == 0 {
            return Err(DomainError::ValidationError(
                "probe timeouts must be at least 1 second".into(),
            ));
        }
        Ok(())
    }
}

/// Probe tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeSettings {
    /// Bound for every capture-mode command
    pub timeout_secs: u64,
    /// Bound for the hostname sanity check
    pub preflight_timeout_secs: u64,
    /// Characters of a fetched body kept as evidence
    pub evidence_chars: usize,
    /// Per-node daemon log, `{node}` substituted
    pub log_path_template: String,
    /// Lines read when the summary probe falls back to the log
    pub fallback_log_lines: usize,
    pub vty_address: String,
    pub vty_port: u16,
    pub vty_password: String,
    pub summary_query: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            preflight_timeout_secs: 1,
            evidence_chars: 500,
            log_path_template: "/tmp/{node}-bgpd.log".into(),
            fallback_log_lines: 40,
            vty_address: "127.0.0.1".into(),
            vty_port: 2605,
            vty_password: "zebra".into(),
            summary_query: "show ip bgp summary".into(),
        }
    }
}

/// Expected BGP session between a router and a peer address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionExpectation {
    pub router: NodeName,
    pub peer: String,
}

/// Roles of the nodes in the experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topology {
    pub routers: Vec<NodeName>,
    pub attacker_router: NodeName,
    pub attacker_host: NodeName,
    /// Host inside the origin AS; keeps reaching the real server
    pub origin_host: NodeName,
    /// Host whose traffic the basic attack redirects
    pub victim_host: NodeName,
    /// Hosts checked after the hard attack
    pub probe_hosts: Vec<NodeName>,
    /// Routers whose BGP summary is shown during an attack
    pub observer_routers: Vec<NodeName>,
    /// Router whose log closes an attack report
    pub log_router: NodeName,
    /// Address of the hijacked prefix's web server
    pub target_address: String,
    pub attacker_marker: String,
    pub origin_marker: String,
    pub http_timeout_secs: u64,
    pub bgp_port: u16,
    pub sessions: Vec<SessionExpectation>,
}

impl Default for Topology {
    fn default() -> Self {
        let routers: Vec<NodeName> = ["R1", "R2", "R3", "R4", "R5", "R6"]
            .into_iter()
            .map(NodeName::from_static)
            .collect();
        let probe_hosts = ["h1-1", "h2-1", "h3-1", "h4-1", "h5-1"]
            .into_iter()
            .map(NodeName::from_static)
            .collect();
        let observer_routers = ["R2", "R3", "R5"]
            .into_iter()
            .map(NodeName::from_static)
            .collect();

        Self {
            routers,
            attacker_router: NodeName::from_static("R6"),
            attacker_host: NodeName::from_static("h6-1"),
            origin_host: NodeName::from_static("h1-1"),
            victim_host: NodeName::from_static("h5-1"),
            probe_hosts,
            observer_routers,
            log_router: NodeName::from_static("R5"),
            target_address: "11.0.1.1".into(),
            attacker_marker: "Attacker web server".into(),
            origin_marker: "Default web server".into(),
            http_timeout_secs: 3,
            bgp_port: 179,
            sessions: vec![SessionExpectation {
                router: NodeName::from_static("R3"),
                peer: "9.0.7.2".into(),
            }],
        }
    }
}

/// Shell templates for the external daemons; `{node}` and `{sleep}` substituted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonCommands {
    pub zebra: String,
    pub bgpd: String,
    pub bgpd_hard: String,
    pub stop_bgpd: String,
    pub webserver: String,
    /// `ps` pattern identifying a running web server
    pub webserver_pattern: String,
    pub topology_launcher: String,
    pub rogue_flag: String,
}

impl Default for DaemonCommands {
    fn default() -> Self {
        Self {
            zebra: "/usr/lib/frr/zebra -f conf/zebra-{node}.conf -d -i /tmp/zebra-{node}.pid > logs/{node}-zebra-stdout 2>&1".into(),
            bgpd: "/usr/lib/frr/bgpd -f conf/bgpd-{node}.conf -d -i /tmp/bgpd-{node}.pid > logs/{node}-bgpd-stdout 2>&1".into(),
            bgpd_hard: "/usr/lib/frr/bgpd -f conf/bgpd-{node}-hard.conf -d -i /tmp/bgpd-{node}.pid > logs/{node}-bgpd-hard-stdout 2>&1".into(),
            stop_bgpd: "pkill -f --signal 9 '[b]gpd-{node}'".into(),
            webserver: "python3 webserver.py --text '*** Attacker web server (AS6) ***' >/dev/null 2>&1 &".into(),
            webserver_pattern: "webserver.py".into(),
            topology_launcher: "python3 bgp.py --sleep {sleep}".into(),
            rogue_flag: "--rogue".into(),
        }
    }
}

/// Substitute `{key}` placeholders in a command template
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(LabConfig::default().validate().is_ok());
    }

    #[test]
    fn test_attach_command_must_reference_pid() {
        let config = LabConfig {
            attach_command: vec!["nsenter".into(), "-a".into()],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(DomainError::ValidationError(_))
        ));
    }

    #[test]
    fn test_host_execution_needs_no_pid() {
        let config = LabConfig {
            attach_command: vec![],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_render_template() {
        let rendered = render_template(
            "tail -n {lines} /tmp/{node}-bgpd.log",
            &[("node", "R5"), ("lines", "40")],
        );
        assert_eq!(rendered, "tail -n 40 /tmp/R5-bgpd.log");
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: LabConfig =
            serde_json::from_str(r#"{"topology": {"attacker_router": "R7"}}"#).unwrap();

        assert_eq!(config.topology.attacker_router.as_str(), "R7");
        assert_eq!(config.topology.victim_host.as_str(), "h5-1");
        assert_eq!(config.probe.vty_port, 2605);
    }
}
