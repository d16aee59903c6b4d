//! The authoritative lab graph.
//!
//! Every mutation, whether it comes from the canvas, the inspector or a chat
//! action, goes through [`GraphStore::apply`]. A command either applies fully
//! or fails without touching state, and observers are called before `apply`
//! returns with a view of the state after the whole command has landed.

use std::collections::HashSet;
use std::fmt;

use log::{debug, trace, warn};
use thiserror::Error;

use crate::lab::{Lab, Link, LinkId, LinkProperties, Node, NodeId, NodePatch};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
	#[error("Link {link} references node {node}, which is not in the lab")]
	DanglingReference { link: LinkId, node: NodeId },
	#[error("A node with id {0} already exists")]
	DuplicateNode(NodeId),
	#[error("A link with id {0} already exists")]
	DuplicateLink(LinkId),
	#[error("Link {0} connects a node to itself")]
	SelfLoop(LinkId),
	#[error("No node with id {0}")]
	UnknownNode(NodeId),
	#[error("No link with id {0}")]
	UnknownLink(LinkId),
	#[error("Invalid properties on link {link}: {reason}")]
	InvalidLinkProperty { link: LinkId, reason: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
	/// Replace the lab wholesale (load)
	SetLab(Lab),
	/// Start an empty draft lab
	NewLab { id: String, name: String },
	AddNode(Node),
	AddLink(Link),
	UpdateNode { id: NodeId, patch: NodePatch },
	UpdateLink { id: LinkId, properties: LinkProperties },
	RemoveNode(NodeId),
	RemoveLink(LinkId),
	SetSelection(Option<NodeId>),
	Clear,
}

/// What a successfully applied [`Command`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
	LabReplaced,
	NodeAdded(NodeId),
	LinkAdded(LinkId),
	NodeUpdated(NodeId),
	LinkUpdated(LinkId),
	NodeRemoved {
		node: Node,
		/// Links removed along with the node
		links: Vec<LinkId>,
		selection_cleared: bool,
	},
	LinkRemoved(Link),
	SelectionChanged(Option<NodeId>),
	Cleared,
}

/// Read-only view handed to observers.
#[derive(Debug, Clone, Copy)]
pub struct StoreView<'a> {
	pub lab: Option<&'a Lab>,
	pub selection: Option<&'a NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Box<dyn FnMut(&Change, StoreView<'_>)>;

pub const DRAFT_LAB_ID: &str = "draft";
pub const DRAFT_LAB_NAME: &str = "Untitled lab";

#[derive(Default)]
pub struct GraphStore {
	lab: Option<Lab>,
	selection: Option<NodeId>,
	observers: Vec<(ObserverId, Observer)>,
	next_observer: u64,
}
impl fmt::Debug for GraphStore {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("GraphStore")
			.field("lab", &self.lab)
			.field("selection", &self.selection)
			.field("observers", &self.observers.len())
			.finish()
	}
}

impl GraphStore {
	pub fn new() -> GraphStore {
		GraphStore::default()
	}

	// Getters
	pub fn lab(&self) -> Option<&Lab> { self.lab.as_ref() }
	pub fn selection(&self) -> Option<&NodeId> { self.selection.as_ref() }
	pub fn nodes(&self) -> &[Node] { self.lab.as_ref().map(|l| l.nodes.as_slice()).unwrap_or(&[]) }
	pub fn links(&self) -> &[Link] { self.lab.as_ref().map(|l| l.links.as_slice()).unwrap_or(&[]) }
	pub fn node(&self, id: &str) -> Option<&Node> { self.lab.as_ref()?.node(id) }

	pub fn selected_node(&self) -> Option<&Node> {
		self.node(self.selection.as_deref()?)
	}

	pub fn view(&self) -> StoreView<'_> {
		StoreView { lab: self.lab.as_ref(), selection: self.selection.as_ref() }
	}

	pub fn subscribe<F>(&mut self, observer: F) -> ObserverId
		where F: FnMut(&Change, StoreView<'_>) + 'static
	{
		let id = ObserverId(self.next_observer);
		self.next_observer += 1;
		self.observers.push((id, Box::new(observer)));
		id
	}

	pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
		let before = self.observers.len();
		self.observers.retain(|(oid, _)| *oid != id);
		before != self.observers.len()
	}

	pub fn set_lab(&mut self, lab: Lab) -> Result<Change, GraphError> { self.apply(Command::SetLab(lab)) }
	pub fn add_node(&mut self, node: Node) -> Result<Change, GraphError> { self.apply(Command::AddNode(node)) }
	pub fn add_link(&mut self, link: Link) -> Result<Change, GraphError> { self.apply(Command::AddLink(link)) }
	pub fn update_node(&mut self, id: impl Into<NodeId>, patch: NodePatch) -> Result<Change, GraphError> {
		self.apply(Command::UpdateNode { id: id.into(), patch })
	}
	pub fn new_lab(&mut self, id: impl Into<String>, name: impl Into<String>) -> Result<Change, GraphError> {
		self.apply(Command::NewLab { id: id.into(), name: name.into() })
	}
	pub fn update_link(&mut self, id: impl Into<LinkId>, properties: LinkProperties) -> Result<Change, GraphError> {
		self.apply(Command::UpdateLink { id: id.into(), properties })
	}
	pub fn remove_node(&mut self, id: impl Into<NodeId>) -> Result<Change, GraphError> { self.apply(Command::RemoveNode(id.into())) }
	pub fn remove_link(&mut self, id: impl Into<LinkId>) -> Result<Change, GraphError> { self.apply(Command::RemoveLink(id.into())) }
	pub fn set_selection(&mut self, id: Option<NodeId>) -> Result<Change, GraphError> { self.apply(Command::SetSelection(id)) }
	pub fn clear(&mut self) -> Change {
		// clearing can not fail
		let change = self.clear_state();
		self.notify(&change);
		change
	}

	/// Applies a single command. On error, nothing has been changed and no observer has been called.
	pub fn apply(&mut self, cmd: Command) -> Result<Change, GraphError> {
		trace!("applying {:?}", cmd);
		let change = match cmd {
			Command::SetLab(lab) => self.replace_lab(lab)?,
			Command::NewLab { id, name } => {
				self.lab = Some(Lab::new(id, name));
				self.selection = None;
				Change::LabReplaced
			},
			Command::AddNode(node) => {
				if self.node(&node.id).is_some() {
					return Err(GraphError::DuplicateNode(node.id));
				}
				let lab = self.lab_or_draft();
				let id = node.id.clone();
				lab.nodes.push(node);
				lab.touch();
				Change::NodeAdded(id)
			},
			Command::AddLink(link) => {
				self.check_link(&link)?;
				let lab = self.lab_or_draft();
				let id = link.id.clone();
				lab.links.push(link);
				lab.touch();
				Change::LinkAdded(id)
			},
			Command::UpdateNode { id, patch } => {
				let lab = self.lab.as_mut().ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
				let node = lab.node_mut(&id).ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
				patch.apply_to(node);
				lab.touch();
				Change::NodeUpdated(id)
			},
			Command::UpdateLink { id, properties } => {
				properties.validate()
					.map_err(|reason| GraphError::InvalidLinkProperty { link: id.clone(), reason })?;
				let lab = self.lab.as_mut().ok_or_else(|| GraphError::UnknownLink(id.clone()))?;
				let link = lab.links.iter_mut()
					.find(|l| l.id == id)
					.ok_or_else(|| GraphError::UnknownLink(id.clone()))?;
				link.properties = properties;
				lab.touch();
				Change::LinkUpdated(id)
			},
			Command::RemoveNode(id) => self.cascade_remove(id)?,
			Command::RemoveLink(id) => {
				let lab = self.lab.as_mut().ok_or_else(|| GraphError::UnknownLink(id.clone()))?;
				let idx = lab.links.iter()
					.position(|l| l.id == id)
					.ok_or_else(|| GraphError::UnknownLink(id.clone()))?;
				let link = lab.links.remove(idx);
				lab.touch();
				Change::LinkRemoved(link)
			},
			Command::SetSelection(sel) => {
				if let Some(id) = &sel {
					if self.node(id).is_none() {
						return Err(GraphError::UnknownNode(id.clone()));
					}
				}
				self.selection = sel.clone();
				Change::SelectionChanged(sel)
			},
			Command::Clear => self.clear_state(),
		};

		self.notify(&change);
		Ok(change)
	}

	/// Removes a node, every link touching it and the selection pointing at it, as one step.
	fn cascade_remove(&mut self, id: NodeId) -> Result<Change, GraphError> {
		let lab = self.lab.as_mut().ok_or_else(|| GraphError::UnknownNode(id.clone()))?;
		let idx = lab.nodes.iter()
			.position(|n| n.id == id)
			.ok_or_else(|| GraphError::UnknownNode(id.clone()))?;

		let node = lab.nodes.remove(idx);
		let mut removed_links = Vec::new();
		lab.links.retain(|l| {
			if l.touches(&node.id) {
				removed_links.push(l.id.clone());
				false
			} else {
				true
			}
		});
		lab.touch();

		let selection_cleared = self.selection.as_deref() == Some(node.id.as_str());
		if selection_cleared {
			self.selection = None;
		}

		debug!("removed node {} ({} links cascaded, selection cleared: {})", node.id, removed_links.len(), selection_cleared);
		Ok(Change::NodeRemoved { node, links: removed_links, selection_cleared })
	}

	fn replace_lab(&mut self, lab: Lab) -> Result<Change, GraphError> {
		let mut node_ids = HashSet::new();
		for node in &lab.nodes {
			if !node_ids.insert(node.id.as_str()) {
				return Err(GraphError::DuplicateNode(node.id.clone()));
			}
		}
		let mut link_ids = HashSet::new();
		for link in &lab.links {
			if !link_ids.insert(link.id.as_str()) {
				return Err(GraphError::DuplicateLink(link.id.clone()));
			}
			for end in [&link.source, &link.target] {
				if !node_ids.contains(end.as_str()) {
					return Err(GraphError::DanglingReference { link: link.id.clone(), node: end.clone() });
				}
			}
		}

		if let Some(sel) = &self.selection {
			if !node_ids.contains(sel.as_str()) {
				self.selection = None;
			}
		}
		debug!("loaded lab {} ({} nodes, {} links)", lab.id, lab.nodes.len(), lab.links.len());
		self.lab = Some(lab);
		Ok(Change::LabReplaced)
	}

	fn check_link(&self, link: &Link) -> Result<(), GraphError> {
		for end in [&link.source, &link.target] {
			if self.node(end).is_none() {
				warn!("rejecting link {}: endpoint {} does not exist", link.id, end);
				return Err(GraphError::DanglingReference { link: link.id.clone(), node: end.clone() });
			}
		}
		if link.source == link.target {
			return Err(GraphError::SelfLoop(link.id.clone()));
		}
		if self.lab.as_ref().and_then(|l| l.link(&link.id)).is_some() {
			return Err(GraphError::DuplicateLink(link.id.clone()));
		}
		link.properties.validate()
			.map_err(|reason| GraphError::InvalidLinkProperty { link: link.id.clone(), reason })
	}

	fn lab_or_draft(&mut self) -> &mut Lab {
		self.lab.get_or_insert_with(|| {
			debug!("no lab loaded, starting a draft");
			Lab::new(DRAFT_LAB_ID, DRAFT_LAB_NAME)
		})
	}

	fn clear_state(&mut self) -> Change {
		self.lab = None;
		self.selection = None;
		Change::Cleared
	}

	fn notify(&mut self, change: &Change) {
		let view = StoreView { lab: self.lab.as_ref(), selection: self.selection.as_ref() };
		for (_, observer) in self.observers.iter_mut() {
			observer(change, view);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::rc::Rc;

	use super::*;
	use crate::lab::{DeviceType, NodeStatus, Position, Resources};

	fn node(id: &str) -> Node {
		Node {
			id: id.into(),
			label: format!("{}-label", id),
			device_type: DeviceType::Router,
			vendor: "cisco".into(),
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

	fn store_with(nodes: &[&str], links: &[(&str, &str)]) -> GraphStore {
		let mut store = GraphStore::new();
		for n in nodes {
			store.add_node(node(n)).unwrap();
		}
		for (s, t) in links {
			store.add_link(Link::between(*s, *t)).unwrap();
		}
		store
	}

	#[test]
	fn remove_node_cascades_links_and_selection() {
		let mut store = store_with(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
		store.set_selection(Some("b".into())).unwrap();

		let change = store.remove_node("b").unwrap();
		match change {
			Change::NodeRemoved { node, mut links, selection_cleared } => {
				links.sort();
				assert_eq!(node.id, "b");
				assert_eq!(links, vec!["ea-b".to_string(), "eb-c".to_string()]);
				assert!(selection_cleared);
			},
			other => panic!("unexpected change {:?}", other),
		}

		assert!(store.links().iter().all(|l| !l.touches("b")));
		assert_eq!(store.links().len(), 1);
		assert_eq!(store.selection(), None);
	}

	#[test]
	fn cascade_holds_over_arbitrary_sequences() {
		let ids = ["n0", "n1", "n2", "n3", "n4"];
		let mut store = GraphStore::new();
		for id in ids {
			store.add_node(node(id)).unwrap();
		}
		for (i, s) in ids.iter().enumerate() {
			for t in ids.iter().skip(i + 1) {
				store.add_link(Link::between(*s, *t)).unwrap();
			}
		}
		for victim in ["n3", "n0", "n4"] {
			store.remove_node(victim).unwrap();
			for link in store.links() {
				assert!(store.node(&link.source).is_some(), "dangling source after removing {}", victim);
				assert!(store.node(&link.target).is_some(), "dangling target after removing {}", victim);
			}
		}
		assert_eq!(store.links().len(), 1);
	}

	#[test]
	fn add_link_with_missing_endpoint_is_rejected() {
		let mut store = store_with(&["a", "b"], &[("a", "b")]);
		let before = store.links().to_vec();

		let err = store.add_link(Link::between("a", "ghost")).unwrap_err();
		assert_eq!(err, GraphError::DanglingReference { link: "ea-ghost".into(), node: "ghost".into() });
		let err = store.add_link(Link::between("ghost", "b")).unwrap_err();
		assert!(matches!(err, GraphError::DanglingReference { .. }));

		assert_eq!(store.links(), before.as_slice());
	}

	#[test]
	fn duplicate_and_self_links_are_rejected() {
		let mut store = store_with(&["a", "b"], &[("a", "b")]);
		assert_eq!(store.add_link(Link::between("a", "b")), Err(GraphError::DuplicateLink("ea-b".into())));
		assert_eq!(store.add_link(Link::between("a", "a")), Err(GraphError::SelfLoop("ea-a".into())));
		assert_eq!(store.add_node(node("a")), Err(GraphError::DuplicateNode("a".into())));
	}

	#[test]
	fn observers_never_see_dangling_links() {
		let mut store = store_with(&["a", "b", "c"], &[("a", "b"), ("a", "c")]);
		store.set_selection(Some("a".into())).unwrap();

		let seen = Rc::new(RefCell::new(Vec::new()));
		let seen_in = seen.clone();
		store.subscribe(move |change, view| {
			let lab = view.lab.expect("lab present");
			let dangling = lab.links.iter().any(|l| !lab.contains_node(&l.source) || !lab.contains_node(&l.target));
			seen_in.borrow_mut().push((change.clone(), dangling, view.selection.cloned()));
		});

		store.remove_node("a").unwrap();

		let seen = seen.borrow();
		assert_eq!(seen.len(), 1);
		let (change, dangling, selection) = &seen[0];
		assert!(matches!(change, Change::NodeRemoved { selection_cleared: true, .. }));
		assert!(!dangling);
		assert_eq!(selection, &None);
	}

	#[test]
	fn failed_commands_do_not_notify() {
		let mut store = store_with(&["a"], &[]);
		let calls = Rc::new(RefCell::new(0));
		let calls_in = calls.clone();
		let id = store.subscribe(move |_, _| *calls_in.borrow_mut() += 1);

		assert!(store.add_link(Link::between("a", "b")).is_err());
		assert!(store.remove_node("missing").is_err());
		assert_eq!(*calls.borrow(), 0);

		store.update_node("a", NodePatch::status(NodeStatus::Running)).unwrap();
		assert_eq!(*calls.borrow(), 1);

		assert!(store.unsubscribe(id));
		store.update_node("a", NodePatch::status(NodeStatus::Stopped)).unwrap();
		assert_eq!(*calls.borrow(), 1);
	}

	#[test]
	fn set_lab_rejects_dangling_links_wholesale() {
		let mut store = store_with(&["a"], &[]);
		let mut lab = Lab::new("lab-1", "broken");
		lab.nodes.push(node("x"));
		lab.links.push(Link::between("x", "y"));

		assert!(matches!(store.set_lab(lab), Err(GraphError::DanglingReference { .. })));
		assert!(store.node("a").is_some());
	}

	#[test]
	fn set_lab_drops_stale_selection() {
		let mut store = store_with(&["a"], &[]);
		store.set_selection(Some("a".into())).unwrap();

		let mut lab = Lab::new("lab-1", "fresh");
		lab.nodes.push(node("b"));
		store.set_lab(lab).unwrap();
		assert_eq!(store.selection(), None);
		assert_eq!(store.lab().map(|l| l.id.as_str()), Some("lab-1"));
	}

	#[test]
	fn update_link_validates_properties() {
		let mut store = store_with(&["a", "b"], &[("a", "b")]);
		let bad = LinkProperties { loss_percent: Some(-0.5), ..Default::default() };
		assert!(matches!(
			store.apply(Command::UpdateLink { id: "ea-b".into(), properties: bad }),
			Err(GraphError::InvalidLinkProperty { .. })
		));

		let good = LinkProperties { delay_ms: Some(10.0), ..Default::default() };
		store.apply(Command::UpdateLink { id: "ea-b".into(), properties: good.clone() }).unwrap();
		assert_eq!(store.links()[0].properties, good);
	}

	#[test]
	fn selection_must_reference_existing_node() {
		let mut store = store_with(&["a"], &[]);
		assert_eq!(store.set_selection(Some("zz".into())), Err(GraphError::UnknownNode("zz".into())));
		store.set_selection(Some("a".into())).unwrap();
		assert_eq!(store.selected_node().map(|n| n.id.as_str()), Some("a"));
	}

	#[test]
	fn clear_tears_everything_down() {
		let mut store = store_with(&["a", "b"], &[("a", "b")]);
		store.set_selection(Some("a".into())).unwrap();
		assert_eq!(store.clear(), Change::Cleared);
		assert!(store.lab().is_none());
		assert!(store.nodes().is_empty());
		assert_eq!(store.selection(), None);
	}
}
