
use clap::Args;
use log::trace;

use netlab::catalog::Catalog;
use netlab::rest::Client;
use netlab::Config;

#[derive(Debug, Args)]
pub struct SubCmdList {
	/// Also shows image ids and recommended resources
	#[arg(short, long)]
	all: bool,
}
impl SubCmdList {
	pub async fn run(&self, config: &Config) -> anyhow::Result<()> {
		let client = Client::new(config)?;
		trace!("fetching catalog");
		let catalog = client.catalog().await?;

		for line in self.list_data(&catalog) {
			println!("{}", line);
		}
		Ok(())
	}

	fn list_data(&self, catalog: &Catalog) -> Vec<String> {
		let mut out = Vec::new();
		for (vendor, images) in catalog.grouped_by_vendor() {
			out.push(format!("{} ({} images)", vendor, images.len()));
			for image in images {
				let version = image.version.as_deref().unwrap_or("-");
				if self.all {
					let cpu = image.cpu_recommended.map(|c| c.to_string()).unwrap_or_else(|| "?".into());
					let mem = image.memory_recommended.map(|m| m.to_string()).unwrap_or_else(|| "?".into());
					out.push(format!("\t{} [{}] {} {} :: {} ({} cpu, {} MB)", image.display_name, image.device_type, image.name, version, image.id, cpu, mem));
				} else {
					out.push(format!("\t{} [{}] {} {}", image.display_name, image.device_type, image.name, version));
				}
			}
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use netlab::lab::DeviceType;
	use netlab::rt::{NetworkImage, Vendor, VendorSummary};

	use super::*;

	fn image(id: &str, name: &str, vendor: &str) -> NetworkImage {
		NetworkImage {
			id: id.into(),
			name: name.into(),
			display_name: name.to_uppercase(),
			version: Some("17.3".into()),
			device_type: DeviceType::Router,
			runtime: None,
			image_uri: None,
			vendor: VendorSummary { name: vendor.into(), display_name: vendor.into(), logo_url: None },
			cpu_recommended: Some(2),
			memory_recommended: None,
			console_type: None,
			tags: Vec::new(),
		}
	}

	#[test]
	fn lists_images_under_their_vendor() {
		let vendors = vec![Vendor { id: "v1".into(), name: "cisco".into(), display_name: "Cisco".into(), logo_url: None, website: None, image_count: 1 }];
		let catalog = Catalog::new(vec![image("img1", "ios-xe", "cisco")], vendors);

		let short = SubCmdList { all: false }.list_data(&catalog);
		assert_eq!(short.len(), 2);
		assert!(short[1].contains("IOS-XE [router] ios-xe 17.3"));

		let long = SubCmdList { all: true }.list_data(&catalog);
		assert!(long[1].ends_with(":: img1 (2 cpu, ? MB)"));
	}
}
