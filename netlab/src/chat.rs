//! Turns chat-proposed actions into [`GraphStore`] commands.
//!
//! Actions are planned against a scratch copy of the store first, so an action
//! either lands completely or not at all, and runs through exactly the same
//! validation a canvas edit would.

use log::{debug, warn};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::catalog::{Catalog, ImageQuery};
use crate::lab::{DeviceType, Lab, Link, LinkProperties, Node, NodeId, NodeStatus, Position, Resources};
use crate::rest_types::{ActionStatus, ChatAction, ChatResponse};
use crate::store::{Command, GraphError, GraphStore};
use crate::utils;

/// Shown in place of the assistant's reply when the chat request itself failed.
pub const FALLBACK_REPLY: &str = "Sorry, I encountered an error processing your request. Please make sure the backend is running and try again.";

const GRID_ORIGIN: (f64, f64) = (100.0, 100.0);
const GRID_SPACING: (f64, f64) = (200.0, 150.0);

#[derive(Debug, Error)]
pub enum ChatError {
	#[error("Unreadable parameters for {kind}: {source}")]
	BadParams { kind: String, source: serde_json::Error },
	#[error("No image available for node {0}")]
	NoImage(String),
	#[error("Node {0} is not in the lab")]
	UnknownEndpoint(String),
	#[error("Unknown topology pattern {0:?}")]
	UnknownPattern(String),
	#[error("The {pattern} pattern requires {expected}")]
	BadCount { pattern: &'static str, expected: &'static str },
	#[error(transparent)]
	Graph(#[from] GraphError),
}

/// The reply shown when the chat service could not be reached.
pub fn fallback_response() -> ChatResponse {
	ChatResponse {
		response: FALLBACK_REPLY.to_owned(),
		actions: None,
		suggestions: None,
	}
}

#[derive(Debug, Deserialize)]
struct NodeSpec {
	name: Option<String>,
	#[serde(rename = "type")]
	device_type: Option<DeviceType>,
	image: Option<String>,
	vendor: Option<String>,
	hostname: Option<String>,
	position: Option<Position>,
	cpu: Option<u32>,
	memory: Option<u32>,
}
impl NodeSpec {
	fn named(name: String, device_type: DeviceType) -> NodeSpec {
		NodeSpec {
			name: Some(name),
			device_type: Some(device_type),
			image: None,
			vendor: None,
			hostname: None,
			position: None,
			cpu: None,
			memory: None,
		}
	}
}

#[derive(Debug, Deserialize)]
struct LinkSpec {
	id: Option<String>,
	source: String,
	target: String,
	source_interface: Option<String>,
	target_interface: Option<String>,
	#[serde(default)]
	properties: LinkProperties,
}
impl LinkSpec {
	fn between(source: String, target: String) -> LinkSpec {
		LinkSpec { id: None, source, target, source_interface: None, target_interface: None, properties: LinkProperties::default() }
	}
}

#[derive(Debug, Deserialize)]
struct AddNodes {
	nodes: Vec<NodeSpec>,
}

#[derive(Debug, Deserialize)]
struct AddLinks {
	links: Vec<LinkSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PatternCount {
	Flat(usize),
	Tiers { spines: Option<usize>, leaves: Option<usize> },
}

#[derive(Debug, Deserialize)]
struct TopologyPattern {
	pattern: String,
	count: Option<PatternCount>,
	image_type: Option<DeviceType>,
}

/// Nodes and links a pattern expands to, by label.
fn expand_pattern(p: TopologyPattern) -> Result<(Vec<NodeSpec>, Vec<LinkSpec>), ChatError> {
	let ty = p.image_type.unwrap_or(DeviceType::Router);
	let flat = |pattern: &'static str, min: usize, expected: &'static str| match p.count {
		Some(PatternCount::Flat(n)) if n >= min => Ok(n),
		_ => Err(ChatError::BadCount { pattern, expected }),
	};

	let mut nodes = Vec::new();
	let mut links = Vec::new();
	match p.pattern.as_str() {
		"ring" => {
			let n = flat("ring", 2, "a count of at least 2")?;
			nodes.extend((1..=n).map(|i| NodeSpec::named(format!("R{}", i), ty)));
			links.extend((1..=n).map(|i| LinkSpec::between(format!("R{}", i), format!("R{}", i % n + 1))));
		},
		"mesh" => {
			let n = flat("mesh", 1, "a count of at least 1")?;
			nodes.extend((1..=n).map(|i| NodeSpec::named(format!("R{}", i), ty)));
			for i in 1..=n {
				links.extend((i + 1..=n).map(|j| LinkSpec::between(format!("R{}", i), format!("R{}", j))));
			}
		},
		"star" => {
			let n = flat("star", 1, "a count of at least 1")?;
			nodes.push(NodeSpec::named("Core".into(), ty));
			nodes.extend((1..n).map(|i| NodeSpec::named(format!("Edge{}", i), ty)));
			links.extend((1..n).map(|i| LinkSpec::between("Core".into(), format!("Edge{}", i))));
		},
		"spine-leaf" => {
			let (spines, leaves) = match p.count {
				None => (2, 4),
				Some(PatternCount::Tiers { spines, leaves }) => (spines.unwrap_or(2), leaves.unwrap_or(4)),
				Some(PatternCount::Flat(_)) => {
					return Err(ChatError::BadCount { pattern: "spine-leaf", expected: "spine and leaf counts" });
				},
			};
			nodes.extend((1..=spines).map(|i| NodeSpec::named(format!("Spine{}", i), DeviceType::Switch)));
			nodes.extend((1..=leaves).map(|i| NodeSpec::named(format!("Leaf{}", i), DeviceType::Switch)));
			for s in 1..=spines {
				links.extend((1..=leaves).map(|l| LinkSpec::between(format!("Spine{}", s), format!("Leaf{}", l))));
			}
		},
		other => return Err(ChatError::UnknownPattern(other.to_owned())),
	}
	Ok((nodes, links))
}

/// Grid slots for `count` new nodes, pushed down past the rows existing nodes occupy.
fn grid_positions(count: usize, existing: usize) -> Vec<Position> {
	if count == 0 {
		return Vec::new();
	}
	let cols = (count as f64).sqrt().ceil() as usize;
	let row_offset = (existing / cols) as f64 * GRID_SPACING.1;

	(0..count)
		.map(|i| {
			let (row, col) = (i / cols, i % cols);
			Position::new(
				GRID_ORIGIN.0 + col as f64 * GRID_SPACING.0,
				GRID_ORIGIN.1 + row as f64 * GRID_SPACING.1 + row_offset,
			)
		})
		.collect()
}

/// Lowest `eth<i>` not yet wired on the node.
fn next_interface(lab: Option<&Lab>, node: &str) -> String {
	let used: Vec<&str> = lab.map(|l| l.used_interfaces(node).collect()).unwrap_or_default();
	(0..)
		.map(|i| format!("eth{}", i))
		.find(|name| !used.contains(&name.as_str()))
		.unwrap_or_default()
}

/// A throwaway store commands are tried against before they touch the real one.
struct Scratch {
	store: GraphStore,
	commands: Vec<Command>,
}
impl Scratch {
	fn new(lab: Option<&Lab>) -> Result<Scratch, GraphError> {
		let mut store = GraphStore::new();
		if let Some(lab) = lab {
			store.set_lab(lab.clone())?;
		}
		Ok(Scratch { store, commands: Vec::new() })
	}

	fn push(&mut self, cmd: Command) -> Result<(), GraphError> {
		self.store.apply(cmd.clone())?;
		self.commands.push(cmd);
		Ok(())
	}

	/// By id first, then by label. Later nodes win label clashes, so a pattern links its own nodes.
	fn resolve(&self, name: &str) -> Result<NodeId, ChatError> {
		if let Some(node) = self.store.node(name) {
			return Ok(node.id.clone());
		}
		self.store.nodes().iter().rev()
			.find(|n| n.label == name)
			.map(|n| n.id.clone())
			.ok_or_else(|| ChatError::UnknownEndpoint(name.to_owned()))
	}

	fn add_nodes(&mut self, catalog: &Catalog, specs: Vec<NodeSpec>) -> Result<(), ChatError> {
		let existing = self.store.nodes().len();
		let slots = grid_positions(specs.len(), existing);

		for (idx, (spec, slot)) in specs.into_iter().zip(slots).enumerate() {
			let query = ImageQuery {
				name: spec.image.as_deref(),
				device_type: spec.device_type,
				vendor: spec.vendor.as_deref(),
			};
			let label = spec.name.clone();
			let image = catalog.resolve(&query)
				.ok_or_else(|| ChatError::NoImage(label.clone().unwrap_or_else(|| format!("{:?}", query))))?;

			let node = Node {
				id: utils::node_id(),
				label: label.unwrap_or_else(|| format!("{}{}", image.name, existing + idx + 1)),
				device_type: image.device_type,
				vendor: image.vendor.name.clone(),
				image: image.name.clone(),
				image_id: image.id.clone(),
				position: spec.position.unwrap_or(slot),
				status: NodeStatus::Stopped,
				mgmt_ip: None,
				hostname: spec.hostname,
				console_port: None,
				resources: Resources { cpu: spec.cpu, memory: spec.memory },
				interfaces: Vec::new(),
			};
			debug!("chat node {} ({}) from image {}", node.label, node.id, image.name);
			self.push(Command::AddNode(node))?;
		}
		Ok(())
	}

	fn add_links(&mut self, specs: Vec<LinkSpec>) -> Result<(), ChatError> {
		for spec in specs {
			let source = self.resolve(&spec.source)?;
			let target = self.resolve(&spec.target)?;

			let source_interface = spec.source_interface
				.unwrap_or_else(|| next_interface(self.store.lab(), &source));
			let target_interface = spec.target_interface
				.unwrap_or_else(|| next_interface(self.store.lab(), &target));

			let link = Link {
				// ids supplied by chat are kept as-is
				id: spec.id.unwrap_or_else(|| Link::derived_id(&source, &target)),
				source,
				target,
				source_interface: Some(source_interface),
				target_interface: Some(target_interface),
				properties: spec.properties,
			};
			self.push(Command::AddLink(link))?;
		}
		Ok(())
	}
}

fn params<T: DeserializeOwned>(action: &ChatAction) -> Result<T, ChatError> {
	serde_json::from_value(action.data.clone())
		.map_err(|source| ChatError::BadParams { kind: action.kind.clone(), source })
}

/// Applies chat actions to a [`GraphStore`], resolving images from the catalog.
#[derive(Debug, Clone, Copy)]
pub struct ChatMutator<'a> {
	catalog: &'a Catalog,
}

impl<'a> ChatMutator<'a> {
	pub fn new(catalog: &'a Catalog) -> ChatMutator<'a> {
		ChatMutator { catalog }
	}

	/// The commands an action stands for, or `None` if the action does not mutate the graph.
	pub fn plan(&self, lab: Option<&Lab>, action: &ChatAction) -> Result<Option<Vec<Command>>, ChatError> {
		let mut scratch = Scratch::new(lab)?;
		match action.kind.as_str() {
			"add_nodes" => {
				let AddNodes { nodes } = params(action)?;
				scratch.add_nodes(self.catalog, nodes)?;
			},
			"add_links" => {
				let AddLinks { links } = params(action)?;
				scratch.add_links(links)?;
			},
			"create_topology_pattern" => {
				let (nodes, links) = expand_pattern(params(action)?)?;
				scratch.add_nodes(self.catalog, nodes)?;
				scratch.add_links(links)?;
			},
			_ => return Ok(None),
		}
		Ok(Some(scratch.commands))
	}

	/// Plans and applies one action, recording the outcome in its status.
	/// Returns whether the graph changed.
	pub fn apply_action(&self, store: &mut GraphStore, action: &mut ChatAction) -> Result<bool, ChatError> {
		let commands = match self.plan(store.lab(), action) {
			Ok(Some(commands)) => commands,
			Ok(None) => {
				debug!("chat action {} is not a graph mutation", action.kind);
				return Ok(false);
			},
			Err(e) => {
				warn!("chat action {} failed: {}", action.kind, e);
				action.status = ActionStatus::Error;
				return Err(e);
			},
		};

		let count = commands.len();
		for cmd in commands {
			if let Err(e) = store.apply(cmd) {
				warn!("chat action {} failed while applying: {}", action.kind, e);
				action.status = ActionStatus::Error;
				return Err(e.into());
			}
		}
		debug!("chat action {} applied {} commands", action.kind, count);
		action.status = ActionStatus::Success;
		Ok(count > 0)
	}

	/// Applies every action of a response in order. Failed actions are marked and skipped.
	/// Returns the number of actions that changed the graph.
	pub fn apply_response(&self, store: &mut GraphStore, response: &mut ChatResponse) -> usize {
		let mut changed = 0;
		for action in response.actions.iter_mut().flatten() {
			if let Ok(true) = self.apply_action(store, action) {
				changed += 1;
			}
		}
		changed
	}
}
