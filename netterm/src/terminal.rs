
use log::debug;
use thiserror::Error;

use netlab::lab::{Lab, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NodeSearchError {
	#[error("No lab matching the desired lab id")]
	NoMatchingLab,
	#[error("No node matching the desired node descriptor within the specified lab")]
	NoMatchingNode,
	#[error("Multiple nodes matched by node label within the lab. Try renaming the nodes, or using a node ID")]
	MultipleMatchingNodes,
}

// internal helper for find_node
trait NamedMatcher {
	fn id(&self) -> &str;
	fn label(&self) -> &str;

	fn matches(&self, descriptor: &str) -> bool {
		self.id() == descriptor || self.label() == descriptor
	}
}
impl NamedMatcher for Node {
	fn id(&self) -> &str { &self.id }
	fn label(&self) -> &str { &self.label }
}

/// Finds a node by id or label, preferring an id match when a descriptor matches several nodes.
pub fn find_node<'a>(lab: &'a Lab, desc: &str) -> Result<&'a Node, NodeSearchError> {
	let mut matching: Vec<&Node> = lab.nodes.iter()
		.filter(|n| n.matches(desc))
		.inspect(|n| debug!("found node matching the provided description: (id, label, status) = {:?}", (&n.id, &n.label, n.status)))
		.collect();

	match matching.len() {
		0 => Err(NodeSearchError::NoMatchingNode),
		1 => Ok(matching.remove(0)),
		_ => match matching.iter().position(|n| n.id == desc) {
			Some(i) => {
				debug!("Found multiple nodes for description {:?} - interpreting it as an ID", desc);
				Ok(matching.remove(i))
			},
			None => Err(NodeSearchError::MultipleMatchingNodes),
		},
	}
}
