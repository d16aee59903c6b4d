use chrono::{DateTime, NaiveDateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::lab::{self, DeviceType, LabStatus, LinkProperties, NodeStatus, Position, Resources};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VendorSummary {
	pub name: String,
	pub display_name: String,
	pub logo_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Vendor {
	pub id: String,
	pub name: String,
	pub display_name: String,
	pub logo_url: Option<String>,
	pub website: Option<String>,
	#[serde(default)]
	pub image_count: usize,
}

/// A device image (network OS) that can be instantiated on the canvas.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NetworkImage {
	pub id: String,
	pub name: String,
	pub display_name: String,
	pub version: Option<String>,
	#[serde(rename = "type")]
	pub device_type: DeviceType,
	/// docker, qemu, vrnetlab
	pub runtime: Option<String>,
	pub image_uri: Option<String>,
	pub vendor: VendorSummary,
	pub cpu_recommended: Option<u32>,
	pub memory_recommended: Option<u32>,
	pub console_type: Option<String>,
	#[serde(default)]
	pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImageList {
	pub count: usize,
	pub images: Vec<NetworkImage>,
}

#[derive(Debug, Deserialize)]
pub struct VendorList {
	pub count: usize,
	pub vendors: Vec<Vendor>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
	#[default]
	Pending,
	Success,
	Error,
}
impl fmt::Display for ActionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			ActionStatus::Pending => "pending",
			ActionStatus::Success => "success",
			ActionStatus::Error => "error",
		})
	}
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatRequest {
	pub message: String,
	pub lab_id: Option<String>,
}

/// A mutation (or other operation) proposed by the chat service.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatAction {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub status: ActionStatus,
	#[serde(default, alias = "params")]
	pub data: Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatResponse {
	pub response: String,
	#[serde(default)]
	pub actions: Option<Vec<ChatAction>>,
	#[serde(default)]
	pub suggestions: Option<Vec<String>>,
}

// lab as served by `GET /labs/{id}`

#[derive(Debug, Serialize, Deserialize)]
pub struct LabDescription {
	pub id: String,
	pub name: String,
	pub description: Option<String>,
	#[serde(default)]
	pub status: LabStatus,
	#[serde(default)]
	pub nodes: Vec<LabNode>,
	#[serde(default)]
	pub links: Vec<LabLink>,
	pub created_at: Option<String>,
	pub updated_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageRef {
	pub id: String,
	pub name: String,
	pub display_name: Option<String>,
	#[serde(rename = "type")]
	pub device_type: DeviceType,
	pub vendor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LabNode {
	pub id: String,
	pub name: String,
	pub hostname: Option<String>,
	pub image: ImageRef,
	pub position: Position,
	#[serde(default)]
	pub resources: Resources,
	#[serde(default)]
	pub status: NodeStatus,
	pub mgmt_ip: Option<String>,
	pub console_port: Option<u16>,
	#[serde(default)]
	pub interfaces: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LinkEndpoint {
	pub node_id: String,
	pub interface: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LabLink {
	pub id: String,
	pub source: LinkEndpoint,
	pub target: LinkEndpoint,
	#[serde(default)]
	pub properties: LinkProperties,
	pub status: Option<String>,
}

/// Reads the backend's timestamps, which may or may not carry a UTC offset.
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(s)
		.map(|dt| dt.with_timezone(&Utc))
		.ok()
		.or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").ok().map(|n| n.and_utc()))
}

impl From<LabDescription> for lab::Lab {
	fn from(desc: LabDescription) -> lab::Lab {
		let created_at = desc.created_at.as_deref()
			.and_then(|s| {
				let parsed = parse_timestamp(s);
				if parsed.is_none() {
					warn!("unreadable lab timestamp {:?}, using the current time", s);
				}
				parsed
			})
			.unwrap_or_else(Utc::now);

		lab::Lab {
			id: desc.id,
			name: desc.name,
			description: desc.description,
			status: desc.status,
			nodes: desc.nodes.into_iter().map(lab::Node::from).collect(),
			links: desc.links.into_iter().map(lab::Link::from).collect(),
			created_at,
			updated_at: desc.updated_at.as_deref().and_then(parse_timestamp),
		}
	}
}

impl From<LabNode> for lab::Node {
	fn from(n: LabNode) -> lab::Node {
		lab::Node {
			id: n.id,
			label: n.name,
			device_type: n.image.device_type,
			vendor: n.image.vendor.unwrap_or_default(),
			image: n.image.name,
			image_id: n.image.id,
			position: n.position,
			status: n.status,
			mgmt_ip: n.mgmt_ip,
			hostname: n.hostname,
			console_port: n.console_port,
			resources: n.resources,
			interfaces: n.interfaces,
		}
	}
}

impl From<LabLink> for lab::Link {
	fn from(l: LabLink) -> lab::Link {
		// ids from the backend are kept verbatim
		lab::Link {
			id: l.id,
			source: l.source.node_id,
			target: l.target.node_id,
			source_interface: l.source.interface,
			target_interface: l.target.interface,
			properties: l.properties,
		}
	}
}
