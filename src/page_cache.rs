//! A small in-memory cache for fully rendered pages.
//!
//! Entries expire after a fixed time-to-live. The amount of entries is
//! bounded: when full, the oldest entry is dropped to make room.

use std::{
	collections::VecDeque,
	future::Future,
	sync::Mutex,
	time::{Duration, Instant},
};

use log::*;


pub struct PageCache {
	entries: Mutex<VecDeque<CacheEntry>>,
	ttl: Duration,
	capacity: usize,
}

struct CacheEntry {
	key: String,
	stored: Instant,
	body: String,
}


impl PageCache {
	pub fn new(ttl: Duration, capacity: usize) -> Self {
		debug_assert!(capacity > 0, "Can't use a capacity smaller than 1");
		Self {
			entries: Mutex::new(VecDeque::new()),
			ttl,
			capacity: capacity.max(1),
		}
	}

	/// Builds the cache key out of a static prefix and the parts that make a
	/// page distinct.
	pub fn key(prefix: &str, uri: &str, viewer: Option<i64>) -> String {
		match viewer {
			Some(id) => format!("{}:{}:user{}", prefix, uri, id),
			None => format!("{}:{}:anonymous", prefix, uri),
		}
	}

	pub fn get(&self, key: &str) -> Option<String> {
		let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
		let now = Instant::now();
		entries.retain(|e| now.duration_since(e.stored) < self.ttl);
		entries
			.iter()
			.find(|e| e.key == key)
			.map(|e| e.body.clone())
	}

	pub fn insert(&self, key: String, body: String) {
		if self.ttl.is_zero() {
			return;
		}

		let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
		entries.retain(|e| e.key != key);
		while entries.len() >= self.capacity {
			entries.pop_front();
		}
		entries.push_back(CacheEntry {
			key,
			stored: Instant::now(),
			body,
		});
	}

	/// Returns the cached page, or renders and stores it when there is none.
	/// Failed renders are not stored.
	pub async fn get_or_render<E, F, Fut>(&self, key: String, render: F) -> Result<String, E>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<String, E>>,
	{
		if let Some(body) = self.get(&key) {
			trace!("Page cache hit for {}", &key);
			return Ok(body);
		}

		let body = render().await?;
		self.insert(key, body.clone());
		Ok(body)
	}

	/// Drops all entries, so that the next requests render fresh pages.
	pub fn clear(&self) {
		let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
		debug!("Clearing {} cached pages", entries.len());
		entries.clear();
	}

	pub fn len(&self) -> usize {
		let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
		let now = Instant::now();
		entries.retain(|e| now.duration_since(e.stored) < self.ttl);
		entries.len()
	}
}


#[cfg(test)]
mod tests {
	use std::convert::Infallible;

	use super::*;

	#[tokio::test]
	async fn test_get_or_render_only_renders_once() {
		let cache = PageCache::new(Duration::from_secs(20), 8);
		let key = PageCache::key("index_page", "/", None);

		let first: Result<String, Infallible> = cache
			.get_or_render(key.clone(), || async { Ok("first".to_string()) })
			.await;
		let second: Result<String, Infallible> = cache
			.get_or_render(key.clone(), || async { Ok("second".to_string()) })
			.await;
		assert_eq!(first.unwrap(), "first");
		assert_eq!(second.unwrap(), "first");

		cache.clear();
		let third: Result<String, Infallible> = cache
			.get_or_render(key, || async { Ok("third".to_string()) })
			.await;
		assert_eq!(third.unwrap(), "third");
	}

	#[tokio::test]
	async fn test_failed_renders_are_not_cached() {
		let cache = PageCache::new(Duration::from_secs(20), 8);
		let result: Result<String, &str> = cache
			.get_or_render("k".into(), || async { Err("broken") })
			.await;
		assert!(result.is_err());
		assert_eq!(cache.len(), 0);
	}

	#[test]
	fn test_entries_expire() {
		let cache = PageCache::new(Duration::from_millis(10), 8);
		cache.insert("k".into(), "body".into());
		assert_eq!(cache.get("k").as_deref(), Some("body"));
		std::thread::sleep(Duration::from_millis(20));
		assert!(cache.get("k").is_none());
	}

	#[test]
	fn test_capacity_drops_oldest() {
		let cache = PageCache::new(Duration::from_secs(20), 2);
		cache.insert("a".into(), "1".into());
		cache.insert("b".into(), "2".into());
		cache.insert("c".into(), "3".into());
		assert!(cache.get("a").is_none());
		assert_eq!(cache.get("c").as_deref(), Some("3"));
		assert_eq!(cache.len(), 2);
	}

	#[test]
	fn test_keys_differ_per_viewer() {
		assert_ne!(
			PageCache::key("index_page", "/", None),
			PageCache::key("index_page", "/", Some(1))
		);
		assert_ne!(
			PageCache::key("index_page", "/?page=2", None),
			PageCache::key("index_page", "/", None)
		);
	}
}
