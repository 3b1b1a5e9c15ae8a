//! Helpers for the unit and integration tests.
use std::{
	ops::Deref,
	path::Path,
	sync::Arc,
};

use axum::{
	body::{to_bytes, Body},
	http::{header, Request},
	response::Response,
	Router,
};
use log::*;
use tempfile::{NamedTempFile, TempDir};
use tower::ServiceExt;

use crate::{
	auth,
	config::Config,
	db::{Database, PersistenceHandle},
	entity::user,
	migration::Migrations,
	web::{self, Global},
};


pub const TEST_PASSWORD: &str = "correct horse battery staple";
pub const MULTIPART_BOUNDARY: &str = "chronicle-test-boundary";

/// A tiny but valid GIF image.
pub const SMALL_GIF: &[u8] = &[
	0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x02, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
	0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
	0x00, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x0C, 0x0A, 0x00, 0x3B,
];

/// A migrated database in a temporary file, which gets removed when dropped.
pub struct TestDatabase {
	db: Database,
	_file: NamedTempFile,
}

/// A complete web application backed by a temporary database and media
/// folder.
pub struct TestApp {
	pub global: Arc<Global>,
	_db: TestDatabase,
	media: TempDir,
}

#[derive(Default)]
pub struct MultipartBuilder {
	body: Vec<u8>,
}


impl Deref for TestDatabase {
	type Target = Database;

	fn deref(&self) -> &Database { &self.db }
}

impl TestApp {
	pub fn db(&self) -> &Database { &self.global.db }

	pub fn media_path(&self) -> &Path { self.media.path() }

	pub fn router(&self) -> Router { web::router(self.global.clone()) }

	/// Sends a request through a fresh router.
	pub async fn send(&self, request: Request<Body>) -> Response {
		self.router()
			.oneshot(request)
			.await
			.expect("router failed")
	}

	pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
		let mut builder = Request::builder().uri(uri);
		if let Some(c) = cookie {
			builder = builder.header(header::COOKIE, c);
		}
		self.send(builder.body(Body::empty()).unwrap()).await
	}

	pub async fn post_form(
		&self, uri: &str, cookie: Option<&str>, form: &[(&str, &str)],
	) -> Response {
		let mut builder = Request::builder()
			.method("POST")
			.uri(uri)
			.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
		if let Some(c) = cookie {
			builder = builder.header(header::COOKIE, c);
		}
		let body = serde_urlencoded::to_string(form).unwrap();
		self.send(builder.body(Body::from(body)).unwrap()).await
	}

	pub async fn post_multipart(
		&self, uri: &str, cookie: Option<&str>, form: MultipartBuilder,
	) -> Response {
		let mut builder = Request::builder()
			.method("POST")
			.uri(uri)
			.header(
				header::CONTENT_TYPE,
				format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
			);
		if let Some(c) = cookie {
			builder = builder.header(header::COOKIE, c);
		}
		self.send(builder.body(Body::from(form.finish())).unwrap())
			.await
	}
}

impl MultipartBuilder {
	pub fn new() -> Self { Self::default() }

	pub fn text(mut self, name: &str, value: &str) -> Self {
		self.body.extend_from_slice(
			format!(
				"--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
				MULTIPART_BOUNDARY, name, value
			)
			.as_bytes(),
		);
		self
	}

	pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
		self.body.extend_from_slice(
			format!(
				"--{}\r\nContent-Disposition: form-data; name=\"{}\"; \
				 filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
				MULTIPART_BOUNDARY, name, file_name, content_type
			)
			.as_bytes(),
		);
		self.body.extend_from_slice(data);
		self.body.extend_from_slice(b"\r\n");
		self
	}

	pub fn finish(mut self) -> Vec<u8> {
		self.body
			.extend_from_slice(format!("--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
		self.body
	}
}


pub async fn load_database(filename: &str) -> TestDatabase {
	let temp_file = NamedTempFile::with_prefix(filename).unwrap();
	let db = Database::load(temp_file.path().to_owned())
		.await
		.expect("unable to load database");
	let migrations = Migrations::load();
	migrations.run(&db).await.expect("migration issue");
	debug!("Loaded database at {}", temp_file.path().display());
	TestDatabase {
		db,
		_file: temp_file,
	}
}

/// Sets up the web application with the templates and static files of this
/// repository.
pub async fn load_app(filename: &str) -> TestApp {
	load_app_with_config(filename, Config::default()).await
}

pub async fn load_app_with_config(filename: &str, mut config: Config) -> TestApp {
	let db = load_database(filename).await;
	let media = tempfile::Builder::new().prefix(filename).tempdir().unwrap();

	config.templates_path = Some(concat!(env!("CARGO_MANIFEST_DIR"), "/templates").to_string());
	config.static_path = Some(concat!(env!("CARGO_MANIFEST_DIR"), "/static").to_string());
	config.media_path = Some(media.path().display().to_string());
	let global = Global::new(config, db.db.clone()).expect("unable to load templates");

	TestApp {
		global: Arc::new(global),
		_db: db,
		media,
	}
}

/// Creates a user that can log in with `TEST_PASSWORD`.
pub async fn create_user(db: &Database, username: &str) -> user::Model {
	let hash = auth::hash_password(TEST_PASSWORD).unwrap();
	db.create_user(username, "", "", &hash)
		.await
		.expect("unable to create user")
}

/// Starts a session for the user, and returns the value for the cookie header.
pub async fn login(db: &Database, user: &user::Model) -> String {
	let token = auth::generate_session_token();
	db.create_session(user.id, &token)
		.await
		.expect("unable to create session");
	format!("{}={}", auth::SESSION_COOKIE, token)
}

pub async fn body_string(response: Response) -> String {
	let bytes = to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("unable to read body");
	String::from_utf8(bytes.to_vec()).expect("body is not UTF-8")
}

pub fn location(response: &Response) -> &str {
	response
		.headers()
		.get(header::LOCATION)
		.and_then(|v| v.to_str().ok())
		.unwrap_or_default()
}
