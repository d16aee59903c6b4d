//! Details panel for the selected node.

use log::{debug, info};

use netlab::lab::{DeviceType, Node, NodeId, NodePatch, NodeStatus};
use netlab::store::{Change, GraphError, GraphStore};

pub const DEFAULT_CPU: u32 = 1;
pub const DEFAULT_MEMORY_MB: u32 = 512;

/// Everything the inspector shows for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectorView {
	pub id: NodeId,
	pub label: String,
	pub image: String,
	pub device_type: DeviceType,
	pub vendor: String,
	pub status: NodeStatus,
	pub mgmt_ip: Option<String>,
	pub hostname: Option<String>,
	pub cpu: u32,
	pub memory_mb: u32,
	pub interfaces: Vec<String>,
	/// Only a running device accepts a console
	pub can_open_console: bool,
}
impl From<&Node> for InspectorView {
	fn from(node: &Node) -> InspectorView {
		InspectorView {
			id: node.id.clone(),
			label: node.label.clone(),
			image: node.image.clone(),
			device_type: node.device_type,
			vendor: node.vendor.clone(),
			status: node.status,
			mgmt_ip: node.mgmt_ip.clone(),
			hostname: node.hostname.clone(),
			cpu: node.resources.cpu.unwrap_or(DEFAULT_CPU),
			memory_mb: node.resources.memory.unwrap_or(DEFAULT_MEMORY_MB),
			interfaces: node.interfaces.clone(),
			can_open_console: node.status.is_running(),
		}
	}
}

/// Reads the selection and sends edits back through the store. Holds no state of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeInspector;

impl NodeInspector {
	/// `None` when nothing is selected.
	pub fn view(&self, store: &GraphStore) -> Option<InspectorView> {
		store.selected_node().map(InspectorView::from)
	}

	/// Optimistically flips the selected node between running and stopped.
	///
	/// This is a request: the orchestrator's status, once it arrives, replaces whatever is set here.
	pub fn toggle_status(&self, store: &mut GraphStore) -> Result<Option<NodeStatus>, GraphError> {
		let (id, next) = match store.selected_node() {
			Some(node) => (node.id.clone(), node.status.toggled()),
			None => return Ok(None),
		};
		debug!("requesting {} -> {}", id, next);
		store.update_node(id, NodePatch::status(next))?;
		Ok(Some(next))
	}

	/// Deletes the selected node (and its links) once `confirm` agrees. Declining changes nothing.
	pub fn delete<F>(&self, store: &mut GraphStore, confirm: F) -> Result<Option<Change>, GraphError>
		where F: FnOnce(&Node) -> bool
	{
		let node = match store.selected_node() {
			Some(node) => node,
			None => return Ok(None),
		};
		if !confirm(node) {
			debug!("delete of {} declined", node.label);
			return Ok(None);
		}
		let id = node.id.clone();
		let change = store.remove_node(id)?;
		if let Change::NodeRemoved { node, links, .. } = &change {
			info!("deleted node {} with {} link(s)", node.label, links.len());
		}
		Ok(Some(change))
	}
}
