
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type NodeId = String;
pub type LinkId = String;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
	Router,
	Switch,
	Firewall,
	Host,
}
impl fmt::Display for DeviceType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			DeviceType::Router => "router",
			DeviceType::Switch => "switch",
			DeviceType::Firewall => "firewall",
			DeviceType::Host => "host",
		})
	}
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
	/// The device is defined but not running.
	#[default]
	Stopped,
	/// The orchestrator is booting the device.
	Starting,
	/// The device is up and accepts console sessions.
	Running,
	/// The orchestrator failed to start or lost the device.
	Error,
}
impl NodeStatus {
	pub fn is_running(&self) -> bool {
		matches!(self, NodeStatus::Running)
	}

	/// The status an optimistic start/stop toggle requests from this one.
	pub fn toggled(&self) -> NodeStatus {
		match self {
			NodeStatus::Running => NodeStatus::Stopped,
			_ => NodeStatus::Running,
		}
	}
}
impl fmt::Display for NodeStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			NodeStatus::Stopped => "Stopped",
			NodeStatus::Starting => "Starting",
			NodeStatus::Running => "Running",
			NodeStatus::Error => "Error",
		})
	}
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LabStatus {
	#[default]
	Draft,
	Deploying,
	Running,
	Stopped,
	Error,
}
impl fmt::Display for LabStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			LabStatus::Draft => "Draft",
			LabStatus::Deploying => "Deploying",
			LabStatus::Running => "Running",
			LabStatus::Stopped => "Stopped",
			LabStatus::Error => "Error",
		})
	}
}

/// A point in canvas (graph) space.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Position {
	pub x: f64,
	pub y: f64,
}
impl Position {
	pub fn new(x: f64, y: f64) -> Position {
		Position { x, y }
	}
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resources {
	/// CPU cores
	pub cpu: Option<u32>,
	/// Memory, in MB
	pub memory: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Node {
	pub id: NodeId,
	pub label: String,
	#[serde(rename = "type")]
	pub device_type: DeviceType,
	#[serde(default)]
	pub vendor: String,
	/// Image name, eg: `ios-xe`
	pub image: String,
	pub image_id: String,
	pub position: Position,
	#[serde(default)]
	pub status: NodeStatus,
	pub mgmt_ip: Option<String>,
	pub hostname: Option<String>,
	pub console_port: Option<u16>,
	#[serde(default)]
	pub resources: Resources,
	#[serde(default)]
	pub interfaces: Vec<String>,
}

/// Partial node attributes, as accepted by `updateNode`. `None` leaves the attribute as-is.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodePatch {
	pub label: Option<String>,
	pub position: Option<Position>,
	pub status: Option<NodeStatus>,
	pub mgmt_ip: Option<Option<String>>,
	pub hostname: Option<Option<String>>,
	pub resources: Option<Resources>,
	pub interfaces: Option<Vec<String>>,
}
impl NodePatch {
	pub fn position(position: Position) -> NodePatch {
		NodePatch { position: Some(position), ..NodePatch::default() }
	}
	pub fn status(status: NodeStatus) -> NodePatch {
		NodePatch { status: Some(status), ..NodePatch::default() }
	}

	pub fn apply_to(self, node: &mut Node) {
		let NodePatch { label, position, status, mgmt_ip, hostname, resources, interfaces } = self;
		if let Some(label) = label { node.label = label; }
		if let Some(position) = position { node.position = position; }
		if let Some(status) = status { node.status = status; }
		if let Some(mgmt_ip) = mgmt_ip { node.mgmt_ip = mgmt_ip; }
		if let Some(hostname) = hostname { node.hostname = hostname; }
		if let Some(resources) = resources { node.resources = resources; }
		if let Some(interfaces) = interfaces { node.interfaces = interfaces; }
	}
}

/// Emulated impairment on a link. Every field absent means an ideal link.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct LinkProperties {
	/// eg: `1gbit`
	pub bandwidth: Option<String>,
	pub delay_ms: Option<f64>,
	pub loss_percent: Option<f64>,
	pub jitter_ms: Option<f64>,
}
impl LinkProperties {
	pub fn is_ideal(&self) -> bool {
		self == &LinkProperties::default()
	}

	/// Checks that every numeric impairment is finite and non-negative, and loss is a percentage.
	pub fn validate(&self) -> Result<(), &'static str> {
		let non_negative = |v: Option<f64>| v.map(|v| v.is_finite() && v >= 0.0).unwrap_or(true);

		if !non_negative(self.delay_ms) {
			return Err("delay_ms must be a non-negative number");
		}
		if !non_negative(self.jitter_ms) {
			return Err("jitter_ms must be a non-negative number");
		}
		if !non_negative(self.loss_percent) {
			return Err("loss_percent must be a non-negative number");
		}
		if self.loss_percent.map(|l| l > 100.0).unwrap_or(false) {
			return Err("loss_percent must not exceed 100");
		}
		if let Some(bw) = &self.bandwidth {
			if bw.trim().is_empty() || bw.trim_start().starts_with('-') {
				return Err("bandwidth must be a non-negative rate");
			}
		}
		Ok(())
	}
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Link {
	pub id: LinkId,
	pub source: NodeId,
	pub target: NodeId,
	pub source_interface: Option<String>,
	pub target_interface: Option<String>,
	#[serde(default)]
	pub properties: LinkProperties,
}
impl Link {
	/// The id a link gets when wired on the canvas: `e<source>-<target>`
	pub fn derived_id(source: &str, target: &str) -> LinkId {
		format!("e{}-{}", source, target)
	}

	pub fn between(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Link {
		let (source, target) = (source.into(), target.into());
		Link {
			id: Link::derived_id(&source, &target),
			source,
			target,
			source_interface: None,
			target_interface: None,
			properties: LinkProperties::default(),
		}
	}

	pub fn touches(&self, node: &str) -> bool {
		self.source == node || self.target == node
	}
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Lab {
	pub id: String,
	pub name: String,
	pub description: Option<String>,
	#[serde(default)]
	pub status: LabStatus,
	#[serde(default)]
	pub nodes: Vec<Node>,
	#[serde(default)]
	pub links: Vec<Link>,
	pub created_at: DateTime<Utc>,
	pub updated_at: Option<DateTime<Utc>>,
}
impl Lab {
	pub fn new(id: impl Into<String>, name: impl Into<String>) -> Lab {
		Lab {
			id: id.into(),
			name: name.into(),
			description: None,
			status: LabStatus::Draft,
			nodes: Vec::new(),
			links: Vec::new(),
			created_at: Utc::now(),
			updated_at: None,
		}
	}

	pub fn node(&self, id: &str) -> Option<&Node> {
		self.nodes.iter().find(|n| n.id == id)
	}
	pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
		self.nodes.iter_mut().find(|n| n.id == id)
	}
	pub fn link(&self, id: &str) -> Option<&Link> {
		self.links.iter().find(|l| l.id == id)
	}
	pub fn contains_node(&self, id: &str) -> bool {
		self.node(id).is_some()
	}

	pub fn node_by_label(&self, label: &str) -> Option<&Node> {
		self.nodes.iter().find(|n| n.label == label)
	}

	/// Interface names already wired on the given node.
	pub fn used_interfaces<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a str> + 'a {
		self.links.iter().filter_map(move |l| {
			if l.source == node {
				l.source_interface.as_deref()
			} else if l.target == node {
				l.target_interface.as_deref()
			} else {
				None
			}
		})
	}

	pub(crate) fn touch(&mut self) {
		self.updated_at = Some(Utc::now());
	}
}
