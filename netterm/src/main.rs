
use clap::{Parser, Subcommand};
use log::trace;

use netlab::Config;
use netterm::listing::SubCmdList;
use netterm::open_term::SubCmdOpen;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
	/// Backend base URL. Defaults to $NETLAB_URL, then http://localhost:8000
	#[arg(long, global = true)]
	url: Option<String>,

	#[command(subcommand)]
	subc: SubCmd,
}

#[derive(Debug, Subcommand)]
enum SubCmd {
	/// Lists the device images the backend offers, grouped by vendor
	List(SubCmdList),
	/// Opens an interactive console to a running node
	Open(SubCmdOpen),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	env_logger::init();

	trace!("parsing args");
	let args = Args::parse();

	let config = match args.url {
		Some(url) => Config::new(url),
		None => Config::from_env(),
	};
	trace!("using backend {}", config.base_url);

	match &args.subc {
		SubCmd::List(list) => list.run(&config).await,
		SubCmd::Open(open) => open.run(&config).await,
	}
}
