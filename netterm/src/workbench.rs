//! The single-threaded core: one store, the canvas mirror over it, and the consoles opened from it.
//!
//! Everything here runs on one task. Console transports run elsewhere and only talk back through
//! the event queue drained by [`Workbench::pump`] / [`Workbench::next_console_event`].

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use log::{debug, info, warn};

use netlab::canvas::{CanvasAdapter, EdgeChange, NodeChange};
use netlab::catalog::Catalog;
use netlab::chat::{self, ChatMutator};
use netlab::lab::{Lab, LinkId, LinkProperties, Node, NodeId, NodePatch, NodeStatus, Position};
use netlab::rest;
use netlab::rt::{ChatRequest, ChatResponse};
use netlab::store::{Change, GraphError, GraphStore};
use netlab::Config;

use crate::consoles::{ConsoleError, Consoles, OpenOutcome};
use crate::inspector::{InspectorView, NodeInspector};
use crate::term::{CloseReason, ConsoleEvent, Connector};

/// Store changes that can leave a console without a live node.
#[derive(Debug, Clone, PartialEq)]
enum Dropped {
	Node(NodeId),
	/// Still in the lab but no longer running
	Stopped(NodeId),
	/// The lab was replaced or cleared; any node may be gone
	Unknown,
}

pub struct Workbench {
	store: GraphStore,
	canvas: CanvasAdapter,
	consoles: Consoles,
	catalog: Catalog,
	inspector: NodeInspector,
	dropped: Rc<RefCell<Vec<Dropped>>>,
}
impl std::fmt::Debug for Workbench {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Workbench")
			.field("store", &self.store)
			.field("consoles", &self.consoles)
			.finish()
	}
}

impl Workbench {
	pub fn new(config: Config, connector: Arc<dyn Connector>, catalog: Catalog) -> Workbench {
		let mut store = GraphStore::new();
		let dropped = Rc::new(RefCell::new(Vec::new()));

		let sink = Rc::clone(&dropped);
		store.subscribe(move |change, view| {
			let d = match change {
				Change::NodeRemoved { node, .. } => Dropped::Node(node.id.clone()),
				Change::NodeUpdated(id) => match view.lab.and_then(|l| l.node(id)) {
					Some(node) if !node.status.is_running() => Dropped::Stopped(id.clone()),
					_ => return,
				},
				Change::LabReplaced | Change::Cleared => Dropped::Unknown,
				_ => return,
			};
			sink.borrow_mut().push(d);
		});

		Workbench {
			store,
			canvas: CanvasAdapter::new(),
			consoles: Consoles::new(config, connector),
			catalog,
			inspector: NodeInspector,
			dropped,
		}
	}

	// Getters
	pub fn store(&self) -> &GraphStore { &self.store }
	pub fn canvas(&self) -> &CanvasAdapter { &self.canvas }
	pub fn catalog(&self) -> &Catalog { &self.catalog }
	pub fn consoles(&self) -> &Consoles { &self.consoles }
	pub fn consoles_mut(&mut self) -> &mut Consoles { &mut self.consoles }

	/// Replaces the lab. Consoles whose node is gone from the new lab are closed.
	pub fn load_lab(&mut self, lab: Lab) -> Result<(), GraphError> {
		let res = self.store.set_lab(lab).map(|_| ());
		self.settle();
		res
	}

	/// Starts an empty lab. Every console is closed.
	pub fn new_lab(&mut self, id: &str, name: &str) -> Result<(), GraphError> {
		let res = self.store.new_lab(id, name).map(|_| ());
		self.settle();
		res
	}

	pub fn clear(&mut self) {
		self.store.clear();
		self.settle();
	}

	pub fn update_link(&mut self, id: &str, properties: LinkProperties) -> Result<(), GraphError> {
		let res = self.store.update_link(id, properties).map(|_| ());
		self.settle();
		res
	}

	// Canvas

	pub fn drop_image(&mut self, pointer: Position, payload: Option<&str>) -> Option<NodeId> {
		let id = self.canvas.on_drop(&mut self.store, pointer, payload);
		self.settle();
		id
	}

	pub fn connect(&mut self, source: &str, target: &str) -> Result<LinkId, GraphError> {
		let res = self.canvas.on_connect(&mut self.store, source, target);
		self.settle();
		res
	}

	pub fn nodes_changed(&mut self, changes: Vec<NodeChange>) {
		self.canvas.on_nodes_change(&mut self.store, changes);
		self.settle();
	}

	pub fn edges_changed(&mut self, changes: Vec<EdgeChange>) {
		self.canvas.on_edges_change(&mut self.store, changes);
		self.settle();
	}

	/// The lab as it should be saved: every pending canvas position flushed first.
	pub fn snapshot(&mut self) -> Option<Lab> {
		let flushed = self.canvas.commit_pending(&mut self.store);
		if flushed > 0 {
			debug!("flushed {} canvas position(s) before snapshot", flushed);
		}
		self.store.lab().cloned()
	}

	// Inspector

	pub fn inspect(&self) -> Option<InspectorView> {
		self.inspector.view(&self.store)
	}

	pub fn toggle_status(&mut self) -> Result<Option<NodeStatus>, GraphError> {
		let res = self.inspector.toggle_status(&mut self.store);
		self.settle();
		res
	}

	pub fn delete_selected<F>(&mut self, confirm: F) -> Result<bool, GraphError>
		where F: FnOnce(&Node) -> bool
	{
		let res = self.inspector.delete(&mut self.store, confirm);
		self.settle();
		res.map(|c| c.is_some())
	}

	/// Status reported by the orchestrator. Always wins over an optimistic toggle.
	pub fn apply_backend_status(&mut self, node: &str, status: NodeStatus) -> Result<(), GraphError> {
		debug!("backend reports {} as {}", node, status);
		let res = self.store.update_node(node, NodePatch::status(status)).map(|_| ());
		self.settle();
		res
	}

	// Consoles

	/// Opens the console of the selected node, as the inspector's button does.
	pub fn open_selected_console(&mut self) -> Result<Option<OpenOutcome>, ConsoleError> {
		match self.store.selection().cloned() {
			Some(id) => self.open_console(&id).map(Some),
			None => Ok(None),
		}
	}

	pub fn open_console(&mut self, node: &str) -> Result<OpenOutcome, ConsoleError> {
		let node = self.store.node(node)
			.ok_or_else(|| ConsoleError::UnknownNode(node.to_owned()))?;
		self.consoles.open(node)
	}

	pub fn close_console(&mut self, node: &str) -> bool {
		self.consoles.close(node, CloseReason::User)
	}

	/// Dispatches whatever console events are queued. Returns how many reached a session.
	pub fn pump(&mut self) -> usize {
		self.consoles.drain()
	}

	/// Waits for one console event and dispatches it.
	pub async fn next_console_event(&mut self) -> Option<ConsoleEvent> {
		let event = self.consoles.next_event().await?;
		self.consoles.dispatch(event.clone());
		Some(event)
	}

	// Chat

	/// Sends a chat message and applies the proposed actions. A failed request yields the fallback reply
	/// and leaves the lab alone.
	pub async fn chat(&mut self, client: &rest::Client, message: &str) -> ChatResponse {
		let req = ChatRequest {
			message: message.to_owned(),
			lab_id: self.store.lab().map(|l| l.id.clone()),
		};
		let res = client.chat(&req).await;
		self.apply_chat(res)
	}

	fn apply_chat(&mut self, res: Result<ChatResponse, rest::Error>) -> ChatResponse {
		let mut response = match res {
			Ok(response) => response,
			Err(e) => {
				warn!("chat request failed: {}", e);
				return chat::fallback_response();
			},
		};
		let changed = ChatMutator::new(&self.catalog).apply_response(&mut self.store, &mut response);
		if changed > 0 {
			info!("chat applied {} action(s)", changed);
		}
		self.settle();
		response
	}

	/// Closes consoles orphaned by the last mutation and rebuilds the canvas mirror.
	fn settle(&mut self) {
		let dropped: Vec<Dropped> = self.dropped.borrow_mut().drain(..).collect();
		for d in dropped {
			match d {
				Dropped::Node(id) => {
					if self.consoles.close(&id, CloseReason::NodeRemoved) {
						debug!("closed console of removed node {}", id);
					}
				},
				Dropped::Stopped(id) => {
					if self.consoles.close(&id, CloseReason::NodeStopped) {
						debug!("closed console of stopped node {}", id);
					}
				},
				Dropped::Unknown => {
					let orphans: Vec<NodeId> = self.consoles.sessions().iter()
						.map(|s| s.node().to_owned())
						.filter(|id| self.store.node(id).is_none())
						.collect();
					for id in orphans {
						self.consoles.close(&id, CloseReason::NodeRemoved);
					}
				},
			}
		}
		self.canvas.sync_from(&self.store);
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use netlab::lab::{DeviceType, Link, Resources};
	use netlab::rt::{ActionStatus, ChatAction, NetworkImage, Vendor, VendorSummary};

	use super::*;
	use crate::consoles::tests::{settle, FakeConnector};
	use crate::term::SessionState;

	fn image(id: &str, name: &str, ty: DeviceType, vendor: &str) -> NetworkImage {
		NetworkImage {
			id: id.into(),
			name: name.into(),
			display_name: name.to_uppercase(),
			version: None,
			device_type: ty,
			runtime: None,
			image_uri: None,
			vendor: VendorSummary { name: vendor.into(), display_name: vendor.into(), logo_url: None },
			cpu_recommended: Some(1),
			memory_recommended: Some(1024),
			console_type: None,
			tags: Vec::new(),
		}
	}

	fn catalog() -> Catalog {
		let vendors = vec![Vendor {
			id: "v1".into(),
			name: "cisco".into(),
			display_name: "Cisco".into(),
			logo_url: None,
			website: None,
			image_count: 2,
		}];
		Catalog::new(vec![
			image("img1", "ios-xe", DeviceType::Router, "cisco"),
			image("img2", "nexus", DeviceType::Switch, "cisco"),
		], vendors)
	}

	fn node(id: &str, status: NodeStatus) -> Node {
		Node {
			id: id.into(),
			label: id.to_uppercase(),
			device_type: DeviceType::Router,
			vendor: "cisco".into(),
			image: "ios-xe".into(),
			image_id: "img1".into(),
			position: Position::new(10.0, 10.0),
			status,
			mgmt_ip: None,
			hostname: None,
			console_port: None,
			resources: Resources::default(),
			interfaces: Vec::new(),
		}
	}

	fn workbench(connector: &Arc<FakeConnector>) -> Workbench {
		let mut wb = Workbench::new(Config::default(), connector.clone() as Arc<dyn Connector>, catalog());
		let mut lab = Lab::new("lab1", "Lab");
		lab.nodes.push(node("r1", NodeStatus::Running));
		lab.nodes.push(node("r2", NodeStatus::Stopped));
		lab.links.push(Link::between("r1", "r2"));
		wb.load_lab(lab).unwrap();
		wb
	}

	#[test]
	fn load_rebuilds_the_canvas() {
		let wb = workbench(&Arc::new(FakeConnector::default()));
		assert_eq!(wb.canvas().nodes().len(), 2);
		assert_eq!(wb.canvas().edges().len(), 1);
	}

	#[tokio::test]
	async fn deleting_a_node_closes_its_console() {
		let connector = Arc::new(FakeConnector::default());
		let mut wb = workbench(&connector);
		wb.open_console("r1").unwrap();
		settle(wb.consoles_mut(), |c| c.session("r1").map(|s| s.state()) == Some(SessionState::Open)).await;

		wb.nodes_changed(vec![NodeChange::Select { id: "r1".into(), selected: true }]);
		assert!(wb.delete_selected(|_| true).unwrap());

		assert!(wb.consoles().session("r1").is_none());
		assert!(wb.store().links().is_empty());
		assert_eq!(wb.canvas().nodes().len(), 1);
		assert!(wb.canvas().edges().is_empty());
	}

	#[tokio::test]
	async fn canvas_removal_closes_console_too() {
		let connector = Arc::new(FakeConnector::default());
		let mut wb = workbench(&connector);
		wb.open_console("r1").unwrap();
		wb.nodes_changed(vec![NodeChange::Remove { id: "r1".into() }]);
		assert!(wb.consoles().sessions().is_empty());
	}

	#[tokio::test]
	async fn reloading_closes_only_orphaned_consoles() {
		let connector = Arc::new(FakeConnector::default());
		let mut wb = workbench(&connector);
		wb.apply_backend_status("r2", NodeStatus::Running).unwrap();
		wb.open_console("r1").unwrap();
		wb.open_console("r2").unwrap();

		let mut lab = Lab::new("lab1", "Lab");
		lab.nodes.push(node("r2", NodeStatus::Running));
		wb.load_lab(lab).unwrap();

		assert!(wb.consoles().session("r1").is_none());
		assert!(wb.consoles().session("r2").is_some());
	}

	#[tokio::test]
	async fn console_needs_a_running_node() {
		let mut wb = workbench(&Arc::new(FakeConnector::default()));
		assert!(matches!(wb.open_console("r2"), Err(ConsoleError::NodeNotRunning(_))));
		assert!(matches!(wb.open_console("nope"), Err(ConsoleError::UnknownNode(_))));
		assert_eq!(wb.open_selected_console().unwrap(), None);
	}

	#[test]
	fn backend_status_overrides_optimistic_toggle() {
		let mut wb = workbench(&Arc::new(FakeConnector::default()));
		wb.nodes_changed(vec![NodeChange::Select { id: "r2".into(), selected: true }]);
		assert_eq!(wb.toggle_status().unwrap(), Some(NodeStatus::Running));
		assert!(wb.inspect().unwrap().can_open_console);

		wb.apply_backend_status("r2", NodeStatus::Error).unwrap();
		let view = wb.inspect().unwrap();
		assert_eq!(view.status, NodeStatus::Error);
		assert!(!view.can_open_console);
	}

	#[tokio::test]
	async fn stopping_a_node_closes_its_console() {
		let connector = Arc::new(FakeConnector::default());
		let mut wb = workbench(&connector);
		wb.open_console("r1").unwrap();
		settle(wb.consoles_mut(), |c| c.session("r1").map(|s| s.state()) == Some(SessionState::Open)).await;

		wb.nodes_changed(vec![NodeChange::Select { id: "r1".into(), selected: true }]);
		assert_eq!(wb.toggle_status().unwrap(), Some(NodeStatus::Stopped));
		assert!(wb.consoles().session("r1").is_none());

		wb.apply_backend_status("r1", NodeStatus::Running).unwrap();
		wb.open_console("r1").unwrap();
		wb.apply_backend_status("r1", NodeStatus::Running).unwrap();
		assert!(wb.consoles().session("r1").is_some());
		wb.apply_backend_status("r1", NodeStatus::Error).unwrap();
		assert!(wb.consoles().session("r1").is_none());
	}

	#[tokio::test]
	async fn clearing_or_starting_over_closes_every_console() {
		let connector = Arc::new(FakeConnector::default());
		let mut wb = workbench(&connector);
		wb.open_console("r1").unwrap();
		wb.clear();
		assert!(wb.consoles().sessions().is_empty());
		assert!(wb.canvas().nodes().is_empty());
		assert!(wb.store().lab().is_none());

		let mut wb = workbench(&connector);
		wb.open_console("r1").unwrap();
		wb.new_lab("lab2", "Fresh").unwrap();
		assert!(wb.consoles().sessions().is_empty());
		assert!(wb.canvas().edges().is_empty());
		assert_eq!(wb.store().lab().map(|l| l.name.as_str()), Some("Fresh"));
	}

	#[test]
	fn link_properties_go_through_the_store() {
		let mut wb = workbench(&Arc::new(FakeConnector::default()));
		let link = wb.store().links()[0].id.clone();
		let props = LinkProperties { delay_ms: Some(20.0), ..LinkProperties::default() };
		wb.update_link(&link, props.clone()).unwrap();
		assert_eq!(wb.store().links()[0].properties, props);
		assert!(matches!(wb.update_link("nope", props), Err(GraphError::UnknownLink(_))));
		assert_eq!(wb.canvas().edges().len(), 1);
	}

	#[test]
	fn drag_end_is_in_the_snapshot() {
		let mut wb = workbench(&Arc::new(FakeConnector::default()));
		wb.nodes_changed(vec![NodeChange::Position { id: "r1".into(), position: Position::new(300.0, 40.0), dragging: true }]);
		assert_eq!(wb.store().node("r1").unwrap().position, Position::new(10.0, 10.0));

		let lab = wb.snapshot().unwrap();
		assert_eq!(lab.node("r1").unwrap().position, Position::new(300.0, 40.0));
	}

	#[test]
	fn chat_actions_land_in_store_and_canvas() {
		let mut wb = workbench(&Arc::new(FakeConnector::default()));
		let response = ChatResponse {
			response: "Added a switch".into(),
			actions: Some(vec![ChatAction {
				kind: "add_nodes".into(),
				description: String::new(),
				status: ActionStatus::Pending,
				data: json!({ "nodes": [{ "name": "SW1", "type": "switch" }] }),
			}]),
			suggestions: None,
		};
		let out = wb.apply_chat(Ok(response));
		assert_eq!(out.actions.unwrap()[0].status, ActionStatus::Success);
		assert_eq!(wb.store().nodes().len(), 3);
		assert_eq!(wb.canvas().nodes().len(), 3);
	}

	#[test]
	fn failed_chat_falls_back_without_touching_the_lab() {
		let mut wb = workbench(&Arc::new(FakeConnector::default()));
		let before = wb.store().lab().cloned();
		let err = serde_json::from_str::<u32>("nope").unwrap_err();
		let out = wb.apply_chat(Err(rest::Error::from(err)));
		assert_eq!(out.response, chat::FALLBACK_REPLY);
		assert_eq!(wb.store().lab().cloned(), before);
	}
}
