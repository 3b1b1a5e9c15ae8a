use serde::*;


/// The file path of the system-wide configuration file
#[cfg(target_family = "unix")]
pub const CONFIG_FILE_PATH: &str = "/etc/chronicle/config.toml";
#[cfg(target_family = "windows")]
pub const CONFIG_FILE_PATH: &str = "C:\\Program Files\\chronicle\\config.toml";

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_POSTS_PER_PAGE: u64 = 10;
pub const DEFAULT_INDEX_CACHE_SECONDS: u64 = 20;
pub const DEFAULT_INDEX_CACHE_CAPACITY: usize = 64;
pub const DEFAULT_LOGIN_URL: &str = "/auth/login/";

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub database_path: String,

	pub listen_address: Option<String>,
	pub port: Option<u16>,
	pub templates_path: Option<String>,
	pub static_path: Option<String>,
	pub media_path: Option<String>,

	pub posts_per_page: Option<u64>,
	pub index_cache_seconds: Option<u64>,
	pub index_cache_capacity: Option<usize>,
	pub login_url: Option<String>,

	#[serde(default)]
	pub groups: Vec<GroupConfig>,
}

/// A group that is made sure to exist on start-up.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct GroupConfig {
	pub slug: String,
	pub title: String,
	#[serde(default)]
	pub description: String,
}


impl Config {
	pub fn posts_per_page(&self) -> u64 {
		self.posts_per_page
			.filter(|n| *n > 0)
			.unwrap_or(DEFAULT_POSTS_PER_PAGE)
	}

	pub fn index_cache_seconds(&self) -> u64 {
		self.index_cache_seconds
			.unwrap_or(DEFAULT_INDEX_CACHE_SECONDS)
	}

	pub fn index_cache_capacity(&self) -> usize {
		self.index_cache_capacity
			.filter(|n| *n > 0)
			.unwrap_or(DEFAULT_INDEX_CACHE_CAPACITY)
	}

	pub fn login_url(&self) -> &str { self.login_url.as_deref().unwrap_or(DEFAULT_LOGIN_URL) }

	pub fn templates_path(&self) -> &str { self.templates_path.as_deref().unwrap_or("templates") }

	pub fn static_path(&self) -> &str { self.static_path.as_deref().unwrap_or("static") }

	pub fn media_path(&self) -> &str { self.media_path.as_deref().unwrap_or("media") }
}

impl Default for Config {
	fn default() -> Self {
		Self {
			database_path: String::default(),
			listen_address: None,
			port: None,
			templates_path: None,
			static_path: None,
			media_path: None,
			posts_per_page: None,
			index_cache_seconds: None,
			index_cache_capacity: None,
			login_url: None,
			groups: Vec::new(),
		}
	}
}
