//! Runtime contract of the GRR server image
//!
//! Static metadata attached to the final image: entrypoint, default command,
//! exposed ports and declared volumes. Inert at build time.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue, json};

/// Script invoked as the container entrypoint
pub const ENTRYPOINT: &str = "/usr/src/grr/scripts/docker-entrypoint.sh";

/// Command passed to the entrypoint when the operator supplies none
pub const DEFAULT_COMMAND: &str = "grr";

/// Administrative web interface
pub const ADMIN_UI_PORT: u16 = 8000;

/// Inbound agent/client connections
pub const FRONTEND_PORT: u16 = 8080;

pub const CONFIG_VOLUME: &str = "/etc/grr";
pub const LOG_VOLUME: &str = "/var/log";
pub const DATASTORE_VOLUME: &str = "/var/grr-datastore";

/// What a declared port is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortPurpose {
    AdminUi,
    Frontend,
}

/// A declared network port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedPort {
    pub port: u16,
    pub purpose: PortPurpose,
}

impl ExposedPort {
    /// Port spec in image-config form, e.g. `8000/tcp`
    pub fn spec(&self) -> String {
        format!("{}/tcp", self.port)
    }
}

/// Immutable runtime contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeContract {
    entrypoint: Vec<String>,
    cmd: Vec<String>,
    ports: Vec<ExposedPort>,
    volumes: Vec<String>,
}

impl RuntimeContract {
    /// The contract of the GRR server image
    ///
    /// Nothing in the build configuration feeds into it.
    pub fn grr_server() -> Self {
        Self {
            entrypoint: vec![ENTRYPOINT.to_string()],
            cmd: vec![DEFAULT_COMMAND.to_string()],
            ports: vec![
                ExposedPort {
                    port: ADMIN_UI_PORT,
                    purpose: PortPurpose::AdminUi,
                },
                ExposedPort {
                    port: FRONTEND_PORT,
                    purpose: PortPurpose::Frontend,
                },
            ],
            volumes: vec![
                CONFIG_VOLUME.to_string(),
                LOG_VOLUME.to_string(),
                DATASTORE_VOLUME.to_string(),
            ],
        }
    }

    pub fn entrypoint(&self) -> &[String] {
        &self.entrypoint
    }

    pub fn cmd(&self) -> &[String] {
        &self.cmd
    }

    pub fn ports(&self) -> &[ExposedPort] {
        &self.ports
    }

    pub fn volumes(&self) -> &[String] {
        &self.volumes
    }

    /// Image-config directives, one per line, in exec form
    ///
    /// The same strings feed `podman commit --change` and the rendered
    /// Dockerfile.
    pub fn directives(&self) -> Vec<String> {
        let mut directives = vec![
            format!("ENTRYPOINT {}", exec_form(&self.entrypoint)),
            format!("CMD {}", exec_form(&self.cmd)),
        ];
        for port in &self.ports {
            directives.push(format!("EXPOSE {}", port.spec()));
        }
        directives.push(format!("VOLUME {}", exec_form(&self.volumes)));
        directives
    }

    /// Renders the contract as the tail of a Dockerfile
    pub fn to_dockerfile(&self) -> String {
        let mut out = String::new();
        for directive in self.directives() {
            out.push_str(&directive);
            out.push('\n');
        }
        out
    }

    /// OCI image `config` object
    pub fn to_image_config(&self) -> JsonValue {
        let exposed: Map<String, JsonValue> = self
            .ports
            .iter()
            .map(|p| (p.spec(), json!({})))
            .collect();
        let volumes: Map<String, JsonValue> = self
            .volumes
            .iter()
            .map(|v| (v.clone(), json!({})))
            .collect();

        json!({
            "Entrypoint": self.entrypoint,
            "Cmd": self.cmd,
            "ExposedPorts": exposed,
            "Volumes": volumes,
        })
    }
}

fn exec_form(items: &[String]) -> String {
    // Serialising a string slice cannot fail
    serde_json::to_string(items).unwrap_or_default()
}
