//! Bridges the renderer's own node/edge arrays and the [`GraphStore`].
//!
//! The renderer needs to move nodes every frame without a store round-trip, so
//! the adapter keeps a local mirror. The mirror is a projection of the store:
//! it can be thrown away and rebuilt with [`CanvasAdapter::sync`] at any time.
//! Positions are only written back to the store when a drag ends (or when
//! [`CanvasAdapter::commit_pending`] is called ahead of a save).

use log::{debug, trace, warn};
use thiserror::Error;

use crate::catalog::ImageDescriptor;
use crate::lab::{Lab, Link, LinkId, Node, NodeId, NodePatch, NodeStatus, Position, Resources};
use crate::store::{Command, GraphError, GraphStore};
use crate::utils;

const MIN_ZOOM: f64 = 0.1;
const MAX_ZOOM: f64 = 10.0;

/// Pan and zoom transform applied to the whole canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
	pub x: f64,
	pub y: f64,
	/// Zoom factor (1.0 = 100%, clamped to 0.1..10.0).
	pub k: f64,
}
impl Default for ViewTransform {
	fn default() -> ViewTransform {
		ViewTransform { x: 0.0, y: 0.0, k: 1.0 }
	}
}
impl ViewTransform {
	pub fn screen_to_canvas(&self, screen: Position) -> Position {
		Position::new((screen.x - self.x) / self.k, (screen.y - self.y) / self.k)
	}

	pub fn canvas_to_screen(&self, canvas: Position) -> Position {
		Position::new(canvas.x * self.k + self.x, canvas.y * self.k + self.y)
	}

	pub fn pan_by(&mut self, dx: f64, dy: f64) {
		self.x += dx;
		self.y += dy;
	}

	/// Zooms by `factor`, keeping the canvas point under `anchor` (screen space) fixed.
	pub fn zoom_at(&mut self, anchor: Position, factor: f64) {
		let before = self.screen_to_canvas(anchor);
		self.k = (self.k * factor).clamp(MIN_ZOOM, MAX_ZOOM);
		self.x = anchor.x - before.x * self.k;
		self.y = anchor.y - before.y * self.k;
	}
}

#[derive(Debug, Error)]
pub enum DropError {
	#[error("Nothing was attached to the drop")]
	Missing,
	#[error("Drop payload is not a device image")]
	Malformed(#[from] serde_json::Error),
	#[error("Drop payload failed validation: {0}")]
	Invalid(&'static str),
}

/// Everything the device library can drag onto the canvas.
#[derive(Debug, Clone, PartialEq)]
pub enum DropPayload {
	Image(ImageDescriptor),
}
impl DropPayload {
	pub fn decode(raw: Option<&str>) -> Result<DropPayload, DropError> {
		let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or(DropError::Missing)?;
		let image: ImageDescriptor = serde_json::from_str(raw)?;

		if image.id.trim().is_empty() {
			return Err(DropError::Invalid("image id is empty"));
		}
		if image.name.trim().is_empty() {
			return Err(DropError::Invalid("image name is empty"));
		}
		Ok(DropPayload::Image(image))
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct MirrorNode {
	pub id: NodeId,
	pub position: Position,
	pub selected: bool,
	pub dragging: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MirrorEdge {
	pub id: LinkId,
	pub source: NodeId,
	pub target: NodeId,
	pub selected: bool,
}

/// Pointer-driven node updates, as emitted by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeChange {
	Position { id: NodeId, position: Position, dragging: bool },
	Select { id: NodeId, selected: bool },
	Remove { id: NodeId },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EdgeChange {
	Select { id: LinkId, selected: bool },
	Remove { id: LinkId },
}

#[derive(Debug, Default)]
pub struct CanvasAdapter {
	pub transform: ViewTransform,
	nodes: Vec<MirrorNode>,
	edges: Vec<MirrorEdge>,
}

impl CanvasAdapter {
	pub fn new() -> CanvasAdapter {
		CanvasAdapter::default()
	}

	pub fn nodes(&self) -> &[MirrorNode] { &self.nodes }
	pub fn edges(&self) -> &[MirrorEdge] { &self.edges }
	pub fn node(&self, id: &str) -> Option<&MirrorNode> { self.nodes.iter().find(|n| n.id == id) }

	/// Instantiates the dropped image at the pointer. Bad payloads are ignored (logged, no node).
	pub fn on_drop(&mut self, store: &mut GraphStore, pointer: Position, payload: Option<&str>) -> Option<NodeId> {
		let image = match DropPayload::decode(payload) {
			Ok(DropPayload::Image(image)) => image,
			Err(e) => {
				debug!("ignoring drop: {}", e);
				return None;
			},
		};

		let position = self.transform.screen_to_canvas(pointer);
		let node = Node {
			id: utils::node_id(),
			label: unique_label(store, &image.name),
			device_type: image.device_type,
			vendor: image.vendor.name.clone(),
			image: image.name.clone(),
			image_id: image.id.clone(),
			position,
			status: NodeStatus::Stopped,
			mgmt_ip: None,
			hostname: None,
			console_port: None,
			resources: Resources::default(),
			interfaces: Vec::new(),
		};

		let id = node.id.clone();
		match store.add_node(node) {
			Ok(_) => {
				debug!("dropped {} as {} at {:?}", image.name, id, position);
				self.nodes.push(MirrorNode { id: id.clone(), position, selected: false, dragging: false });
				Some(id)
			},
			Err(e) => {
				warn!("store refused dropped node: {}", e);
				None
			},
		}
	}

	/// Wires `source` to `target` with a canvas-derived link id. Impairments start out absent.
	pub fn on_connect(&mut self, store: &mut GraphStore, source: &str, target: &str) -> Result<LinkId, GraphError> {
		let link = Link::between(source, target);
		let id = link.id.clone();
		store.add_link(link)?;

		self.edges.push(MirrorEdge {
			id: id.clone(),
			source: source.to_owned(),
			target: target.to_owned(),
			selected: false,
		});
		Ok(id)
	}

	pub fn on_nodes_change(&mut self, store: &mut GraphStore, changes: Vec<NodeChange>) {
		for change in changes {
			trace!("node change {:?}", change);
			match change {
				NodeChange::Position { id, position, dragging } => {
					let Some(mirror) = self.nodes.iter_mut().find(|n| n.id == id) else {
						continue;
					};
					mirror.position = position;
					mirror.dragging = dragging;
					if !dragging {
						// drag end materializes the position
						if let Err(e) = store.update_node(id, NodePatch::position(position)) {
							warn!("unable to commit dragged position: {}", e);
						}
					}
				},
				NodeChange::Select { id, selected } => {
					for n in self.nodes.iter_mut() {
						n.selected = selected && n.id == id;
					}
					let sel = if selected {
						Some(id)
					} else if store.selection().map(|s| s == &id).unwrap_or(false) {
						None
					} else {
						continue;
					};
					if let Err(e) = store.set_selection(sel) {
						warn!("unable to select node: {}", e);
					}
				},
				NodeChange::Remove { id } => {
					match store.remove_node(id) {
						Ok(_) => self.sync_from(store),
						Err(e) => warn!("unable to remove node: {}", e),
					}
				},
			}
		}
	}

	pub fn on_edges_change(&mut self, store: &mut GraphStore, changes: Vec<EdgeChange>) {
		for change in changes {
			trace!("edge change {:?}", change);
			match change {
				EdgeChange::Select { id, selected } => {
					if let Some(edge) = self.edges.iter_mut().find(|e| e.id == id) {
						edge.selected = selected;
					}
				},
				EdgeChange::Remove { id } => {
					match store.apply(Command::RemoveLink(id.clone())) {
						Ok(_) => self.edges.retain(|e| e.id != id),
						Err(e) => warn!("unable to remove link: {}", e),
					}
				},
			}
		}
	}

	/// Writes every mirror position that differs from the store back into it. Call before saving.
	pub fn commit_pending(&mut self, store: &mut GraphStore) -> usize {
		let pending: Vec<(NodeId, Position)> = self.nodes.iter()
			.filter(|m| store.node(&m.id).map(|n| n.position != m.position).unwrap_or(false))
			.map(|m| (m.id.clone(), m.position))
			.collect();

		let mut committed = 0;
		for (id, position) in pending {
			match store.update_node(id, NodePatch::position(position)) {
				Ok(_) => committed += 1,
				Err(e) => warn!("unable to commit position: {}", e),
			}
		}
		committed
	}

	pub fn sync_from(&mut self, store: &GraphStore) {
		self.sync(store.lab(), store.selection().map(String::as_str));
	}

	/// Rebuilds the mirror from the store. Nodes in the middle of a drag keep their local position.
	pub fn sync(&mut self, lab: Option<&Lab>, selection: Option<&str>) {
		let old = std::mem::take(&mut self.nodes);
		let Some(lab) = lab else {
			self.edges.clear();
			return;
		};

		self.nodes = lab.nodes.iter()
			.map(|n| {
				let dragged = old.iter().find(|m| m.id == n.id && m.dragging);
				MirrorNode {
					id: n.id.clone(),
					position: dragged.map(|m| m.position).unwrap_or(n.position),
					selected: selection == Some(n.id.as_str()),
					dragging: dragged.is_some(),
				}
			})
			.collect();

		let old_edges = std::mem::take(&mut self.edges);
		self.edges = lab.links.iter()
			.map(|l| MirrorEdge {
				id: l.id.clone(),
				source: l.source.clone(),
				target: l.target.clone(),
				selected: old_edges.iter().any(|e| e.id == l.id && e.selected),
			})
			.collect();
	}
}

/// `<image>-<n+1>` where n counts the nodes already using the image. Skips ahead if that label is taken.
fn unique_label(store: &GraphStore, image: &str) -> String {
	let count = store.nodes().iter().filter(|n| n.image == image).count();
	let mut n = count + 1;
	loop {
		let label = format!("{}-{}", image, n);
		if !store.nodes().iter().any(|node| node.label == label) {
			return label;
		}
		n += 1;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lab::DeviceType;

	const IOS_XE: &str = r#"{"name": "ios-xe", "type": "router", "vendor": {"name": "cisco"}, "id": "img1"}"#;

	#[test]
	fn drop_creates_stopped_node_at_pointer() {
		let mut store = GraphStore::new();
		let mut canvas = CanvasAdapter::new();

		let id = canvas.on_drop(&mut store, Position::new(100.0, 100.0), Some(IOS_XE)).unwrap();
		let node = store.node(&id).unwrap();

		assert!(id.starts_with("node-"));
		assert_eq!(node.label, "ios-xe-1");
		assert_eq!(node.device_type, DeviceType::Router);
		assert_eq!(node.status, NodeStatus::Stopped);
		assert_eq!(node.vendor, "cisco");
		assert_eq!(node.position, Position::new(100.0, 100.0));
		assert_eq!(canvas.node(&id).map(|m| m.position), Some(Position::new(100.0, 100.0)));
	}

	#[test]
	fn drop_applies_pan_and_zoom() {
		let mut store = GraphStore::new();
		let mut canvas = CanvasAdapter::new();
		canvas.transform = ViewTransform { x: 50.0, y: 20.0, k: 2.0 };

		let id = canvas.on_drop(&mut store, Position::new(250.0, 120.0), Some(IOS_XE)).unwrap();
		assert_eq!(store.node(&id).unwrap().position, Position::new(100.0, 50.0));
	}

	#[test]
	fn labels_count_per_image_and_skip_taken_ones() {
		let mut store = GraphStore::new();
		let mut canvas = CanvasAdapter::new();
		let origin = Position::default();

		let a = canvas.on_drop(&mut store, origin, Some(IOS_XE)).unwrap();
		let b = canvas.on_drop(&mut store, origin, Some(IOS_XE)).unwrap();
		assert_eq!(store.node(&b).unwrap().label, "ios-xe-2");

		let ceos = r#"{"name": "ceos", "type": "switch", "vendor": {"name": "arista"}, "id": "img2"}"#;
		let c = canvas.on_drop(&mut store, origin, Some(ceos)).unwrap();
		assert_eq!(store.node(&c).unwrap().label, "ceos-1");

		store.remove_node(a).unwrap();
		let d = canvas.on_drop(&mut store, origin, Some(IOS_XE)).unwrap();
		assert_eq!(store.node(&d).unwrap().label, "ios-xe-3");
	}

	#[test]
	fn malformed_drops_change_nothing() {
		let mut store = GraphStore::new();
		let mut canvas = CanvasAdapter::new();
		let p = Position::default();

		assert_eq!(canvas.on_drop(&mut store, p, None), None);
		assert_eq!(canvas.on_drop(&mut store, p, Some("")), None);
		assert_eq!(canvas.on_drop(&mut store, p, Some("{not json")), None);
		assert_eq!(canvas.on_drop(&mut store, p, Some(r#"{"name": "x", "type": "toaster", "vendor": {"name": "v"}, "id": "i"}"#)), None);
		assert_eq!(canvas.on_drop(&mut store, p, Some(r#"{"name": "", "type": "host", "vendor": {"name": "v"}, "id": "i"}"#)), None);

		assert!(store.nodes().is_empty());
		assert!(store.links().is_empty());
		assert!(canvas.nodes().is_empty());
	}

	#[test]
	fn decode_reports_why_it_failed() {
		assert!(matches!(DropPayload::decode(None), Err(DropError::Missing)));
		assert!(matches!(DropPayload::decode(Some("[]")), Err(DropError::Malformed(_))));
		assert!(matches!(
			DropPayload::decode(Some(r#"{"name": "a", "type": "host", "vendor": {"name": "v"}, "id": " "}"#)),
			Err(DropError::Invalid(_))
		));
	}

	fn two_nodes() -> (GraphStore, CanvasAdapter, NodeId, NodeId) {
		let mut store = GraphStore::new();
		let mut canvas = CanvasAdapter::new();
		let a = canvas.on_drop(&mut store, Position::new(0.0, 0.0), Some(IOS_XE)).unwrap();
		let b = canvas.on_drop(&mut store, Position::new(200.0, 0.0), Some(IOS_XE)).unwrap();
		(store, canvas, a, b)
	}

	#[test]
	fn connect_derives_link_id() {
		let mut store = GraphStore::new();
		for id in ["node-1", "node-2"] {
			let mut lab_node = store_node(id);
			lab_node.label = id.to_string();
			store.add_node(lab_node).unwrap();
		}
		let mut canvas = CanvasAdapter::new();
		canvas.sync_from(&store);

		let id = canvas.on_connect(&mut store, "node-1", "node-2").unwrap();
		assert_eq!(id, "enode-1-node-2");
		assert!(store.links()[0].properties.is_ideal());
		assert_eq!(canvas.edges().len(), 1);
	}

	#[test]
	fn connect_to_missing_node_leaves_mirror_alone() {
		let (mut store, mut canvas, a, _) = two_nodes();
		assert!(matches!(canvas.on_connect(&mut store, &a, "node-0"), Err(GraphError::DanglingReference { .. })));
		assert!(canvas.edges().is_empty());
	}

	#[test]
	fn positions_reach_the_store_on_drag_end_only() {
		let (mut store, mut canvas, a, _) = two_nodes();
		let mid = Position::new(10.0, 10.0);
		let end = Position::new(40.0, 30.0);

		canvas.on_nodes_change(&mut store, vec![NodeChange::Position { id: a.clone(), position: mid, dragging: true }]);
		assert_eq!(store.node(&a).unwrap().position, Position::new(0.0, 0.0));
		assert_eq!(canvas.node(&a).unwrap().position, mid);

		canvas.on_nodes_change(&mut store, vec![NodeChange::Position { id: a.clone(), position: end, dragging: false }]);
		assert_eq!(store.node(&a).unwrap().position, end);
	}

	#[test]
	fn commit_pending_flushes_in_flight_drags() {
		let (mut store, mut canvas, a, b) = two_nodes();
		canvas.on_nodes_change(&mut store, vec![
			NodeChange::Position { id: a.clone(), position: Position::new(5.0, 5.0), dragging: true },
		]);
		assert_eq!(canvas.commit_pending(&mut store), 1);
		assert_eq!(store.node(&a).unwrap().position, Position::new(5.0, 5.0));
		assert_eq!(store.node(&b).unwrap().position, Position::new(200.0, 0.0));
		assert_eq!(canvas.commit_pending(&mut store), 0);
	}

	#[test]
	fn selecting_and_removing_go_through_the_store() {
		let (mut store, mut canvas, a, b) = two_nodes();
		canvas.on_connect(&mut store, &a, &b).unwrap();

		canvas.on_nodes_change(&mut store, vec![NodeChange::Select { id: a.clone(), selected: true }]);
		assert_eq!(store.selection(), Some(&a));
		assert!(canvas.node(&a).unwrap().selected);

		canvas.on_nodes_change(&mut store, vec![NodeChange::Remove { id: a.clone() }]);
		assert!(store.node(&a).is_none());
		assert_eq!(store.selection(), None);
		assert!(store.links().is_empty());
		assert!(canvas.edges().is_empty());
		assert_eq!(canvas.nodes().len(), 1);
	}

	#[test]
	fn removing_an_edge_removes_the_link() {
		let (mut store, mut canvas, a, b) = two_nodes();
		let link = canvas.on_connect(&mut store, &a, &b).unwrap();
		canvas.on_edges_change(&mut store, vec![EdgeChange::Remove { id: link }]);
		assert!(store.links().is_empty());
		assert!(canvas.edges().is_empty());
	}

	#[test]
	fn sync_rebuilds_from_store_but_keeps_active_drags() {
		let (mut store, mut canvas, a, b) = two_nodes();
		canvas.on_nodes_change(&mut store, vec![
			NodeChange::Position { id: a.clone(), position: Position::new(7.0, 7.0), dragging: true },
		]);
		store.remove_node(b.clone()).unwrap();
		canvas.sync_from(&store);

		assert_eq!(canvas.nodes().len(), 1);
		assert_eq!(canvas.node(&a).unwrap().position, Position::new(7.0, 7.0));
		assert!(canvas.node(&b).is_none());
	}

	#[test]
	fn zoom_keeps_anchor_fixed() {
		let mut t = ViewTransform::default();
		let anchor = Position::new(100.0, 50.0);
		let under = t.screen_to_canvas(anchor);
		t.zoom_at(anchor, 2.0);
		assert_eq!(t.screen_to_canvas(anchor), under);
		t.zoom_at(anchor, 1000.0);
		assert_eq!(t.k, MAX_ZOOM);
	}

	fn store_node(id: &str) -> Node {
		Node {
			id: id.into(),
			label: id.into(),
			device_type: DeviceType::Router,
			vendor: String::new(),
			image: "ios-xe".into(),
			image_id: "img1".into(),
			position: Position::default(),
			status: NodeStatus::Stopped,
			mgmt_ip: None,
			hostname: None,
			console_port: None,
			resources: Resources::default(),
			interfaces: Vec::new(),
		}
	}
}
