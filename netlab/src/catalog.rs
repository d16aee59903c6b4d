//! The device library: images that can be dropped onto the canvas, and the vendors they group under.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::lab::DeviceType;
use crate::rest_types::{NetworkImage, Vendor, VendorSummary};

/// The payload carried by a library drag. Decoded by the canvas on drop.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageDescriptor {
	pub id: String,
	pub name: String,
	#[serde(rename = "type")]
	pub device_type: DeviceType,
	pub vendor: VendorRef,
	pub display_name: Option<String>,
	pub version: Option<String>,
	pub cpu_recommended: Option<u32>,
	pub memory_recommended: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct VendorRef {
	pub name: String,
	pub display_name: Option<String>,
}

impl From<&NetworkImage> for ImageDescriptor {
	fn from(img: &NetworkImage) -> ImageDescriptor {
		let VendorSummary { name, display_name, .. } = &img.vendor;
		ImageDescriptor {
			id: img.id.clone(),
			name: img.name.clone(),
			device_type: img.device_type,
			vendor: VendorRef { name: name.clone(), display_name: Some(display_name.clone()) },
			display_name: Some(img.display_name.clone()),
			version: img.version.clone(),
			cpu_recommended: img.cpu_recommended,
			memory_recommended: img.memory_recommended,
		}
	}
}

/// What a chat action asks for when it wants a node of some kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageQuery<'a> {
	pub name: Option<&'a str>,
	pub device_type: Option<DeviceType>,
	pub vendor: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
	pub images: Vec<NetworkImage>,
	pub vendors: Vec<Vendor>,
}

impl Catalog {
	pub fn new(images: Vec<NetworkImage>, vendors: Vec<Vendor>) -> Catalog {
		Catalog { images, vendors }
	}

	pub fn image(&self, id: &str) -> Option<&NetworkImage> {
		self.images.iter().find(|i| i.id == id)
	}

	/// Images grouped per vendor, in vendor order. Images of unlisted vendors trail at the end.
	pub fn grouped_by_vendor(&self) -> Vec<(String, Vec<&NetworkImage>)> {
		let mut groups: Vec<(String, Vec<&NetworkImage>)> = self.vendors.iter()
			.map(|v| (v.name.clone(), Vec::new()))
			.collect();

		for img in &self.images {
			match groups.iter_mut().find(|(name, _)| name == &img.vendor.name) {
				Some((_, imgs)) => imgs.push(img),
				None => groups.push((img.vendor.name.clone(), vec![img])),
			}
		}
		groups
	}

	/// Finds the best image for the query: by (case-insensitive) name fragment, type and vendor,
	/// falling back to the first image of the requested type.
	pub fn resolve(&self, query: &ImageQuery<'_>) -> Option<&NetworkImage> {
		let name = query.name.map(|n| n.to_lowercase());
		let exact = self.images.iter().find(|img| {
			name.as_ref().map(|n| img.name.to_lowercase().contains(n.as_str())).unwrap_or(true)
				&& query.device_type.map(|t| img.device_type == t).unwrap_or(true)
				&& query.vendor.map(|v| img.vendor.name.eq_ignore_ascii_case(v)).unwrap_or(true)
		});

		exact.or_else(|| {
			debug!("no image matched {:?} exactly, falling back to type", query);
			let ty = query.device_type.unwrap_or(DeviceType::Router);
			self.images.iter().find(|img| img.device_type == ty)
		})
	}
}
