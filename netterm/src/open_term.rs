
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use log::{debug, info};

use netlab::catalog::Catalog;
use netlab::rest::Client;
use netlab::Config;

use crate::consoles::OpenOutcome;
use crate::term::backend::WsConnector;
use crate::term::frontend::RawTerminal;
use crate::terminal::{self, NodeSearchError};
use crate::workbench::Workbench;

#[derive(Debug, Args)]
pub struct SubCmdOpen {
	/// Lab id
	lab: String,

	/// Node id or label. Ids win when a label collides with another node's id.
	node: String,
}
impl SubCmdOpen {
	pub async fn run(&self, config: &Config) -> anyhow::Result<()> {
		let client = Client::new(config)?;
		let lab = client.lab(&self.lab).await?
			.ok_or(NodeSearchError::NoMatchingLab)
			.with_context(|| format!("looking up lab {:?}", self.lab))?;

		let node = terminal::find_node(&lab, &self.node)
			.with_context(|| format!("looking up node {:?} in lab {:?}", self.node, lab.name))?;
		let (id, label) = (node.id.clone(), node.label.clone());
		debug!("resolved node {:?} to {} ({})", self.node, id, label);

		// the terminal relay needs a tty, so check that before connecting
		let raw = RawTerminal::new()?;

		let mut wb = Workbench::new(config.clone(), Arc::new(WsConnector), Catalog::default());
		wb.load_lab(lab)?;
		match wb.open_console(&id)? {
			OpenOutcome::Opened(session) => info!("opening console #{} for {}", session, label),
			OpenOutcome::Focused(session) => info!("reusing console #{} for {}", session, label),
		}
		info!("connecting to {} ({}), Ctrl-] detaches", label, id);

		raw.run(&mut wb, &id).await
	}
}
