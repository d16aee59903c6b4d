
pub mod consoles;
pub mod inspector;
pub mod listing;
pub mod open_term;
pub mod term;
pub mod terminal;
pub mod workbench;

pub use consoles::{ConsoleError, Consoles, OpenOutcome};
pub use inspector::{InspectorView, NodeInspector};
pub use workbench::Workbench;
