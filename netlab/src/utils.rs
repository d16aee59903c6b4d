
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static LAST_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Wall-clock milliseconds, bumped so tokens are strictly increasing across the process
/// even when several are handed out within the same millisecond.
pub fn next_token() -> u64 {
	let now = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0);

	let mut last = LAST_TOKEN.load(Ordering::Relaxed);
	loop {
		let next = now.max(last + 1);
		match LAST_TOKEN.compare_exchange_weak(last, next, Ordering::Relaxed, Ordering::Relaxed) {
			Ok(_) => return next,
			Err(actual) => last = actual,
		}
	}
}

/// A fresh `node-<token>` id.
pub fn node_id() -> String {
	format!("node-{}", next_token())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn node_ids_are_unique_and_prefixed() {
		let ids: Vec<String> = (0..100).map(|_| node_id()).collect();
		assert!(ids.iter().all(|id| id.starts_with("node-")));

		let mut dedup = ids.clone();
		dedup.sort();
		dedup.dedup();
		assert_eq!(dedup.len(), ids.len());
	}

	#[test]
	fn tokens_increase_across_threads() {
		let handles: Vec<_> = (0..4)
			.map(|_| std::thread::spawn(|| (0..50).map(|_| next_token()).collect::<Vec<_>>()))
			.collect();
		let mut all: Vec<u64> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
		let total = all.len();
		all.sort();
		all.dedup();
		assert_eq!(all.len(), total);
	}
}
