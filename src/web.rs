mod auth;
pub mod common;
mod follow;
mod forms;
mod posts;

use std::{
	io,
	net::SocketAddr,
	path::PathBuf,
	sync::{atomic::*, Arc},
	time::Duration,
};

use ::serde::*;
use axum::{
	extract::{DefaultBodyLimit, Extension, State},
	middleware::from_fn_with_state,
	response::Response,
	routing::{get, post},
	Router,
};
use log::*;
use tera::{Context, Tera};
use tokio::time::sleep;
use tower_http::services::ServeDir;

use self::common::*;
use crate::{config::Config, db::Database, entity::user, page_cache::PageCache};


/// The static prefix of the index page cache keys.
pub const INDEX_CACHE_PREFIX: &str = "index_page";

pub struct Global {
	pub config: Config,
	pub db: Database,
	pub template_engine: Tera,
	pub index_cache: PageCache,
	pub media_path: PathBuf,
}

/// The user that is making the request, if logged in.
#[derive(Clone, Debug, Default)]
pub struct Viewer(pub Option<user::Model>);

#[derive(Serialize)]
struct ViewerData {
	id: i64,
	username: String,
	display_name: String,
}


impl Global {
	pub fn new(config: Config, db: Database) -> tera::Result<Self> {
		let pattern = format!("{}/**/*.tera", config.templates_path().trim_end_matches('/'));
		let mut template_engine = Tera::new(&pattern)?;
		template_engine.autoescape_on(vec![".html.tera"]);

		let index_cache = PageCache::new(
			Duration::from_secs(config.index_cache_seconds()),
			config.index_cache_capacity(),
		);
		let media_path = PathBuf::from(config.media_path());
		Ok(Self {
			config,
			db,
			template_engine,
			index_cache,
			media_path,
		})
	}

	pub fn render_to_string(
		&self, template_name: &str, viewer: &Viewer, context: Context,
	) -> Result<String, Response> {
		let mut complete_context = Context::new();
		complete_context.insert("viewer", &viewer.data());
		complete_context.insert("login_url", self.config.login_url());
		complete_context.extend(context);

		self.template_engine
			.render(template_name, &complete_context)
			.map_err(|e| {
				server_error_response(
					e,
					&format!("Unable to render template \"{}\"", template_name),
				)
			})
	}

	pub fn render(&self, template_name: &str, viewer: &Viewer, context: Context) -> Response {
		match self.render_to_string(template_name, viewer, context) {
			Ok(html) => html_response(200, html),
			Err(r) => r,
		}
	}

	/// Renders the dedicated 'page not found' page.
	pub fn render_not_found(&self, viewer: &Viewer, path: &str) -> Response {
		warn!("HTTP 404 error: {}", path);
		let mut context = Context::new();
		context.insert("path", path);
		match self.render_to_string("core/404.html.tera", viewer, context) {
			Ok(html) => html_response(404, html),
			Err(r) => r,
		}
	}
}

impl Viewer {
	pub fn id(&self) -> Option<i64> { self.0.as_ref().map(|u| u.id) }

	fn data(&self) -> Option<ViewerData> {
		self.0.as_ref().map(|u| ViewerData {
			id: u.id,
			username: u.username.clone(),
			display_name: u.display_name(),
		})
	}
}


pub fn router(g: Arc<Global>) -> Router {
	let protected = Router::new()
		.route("/create/", get(posts::create).post(posts::create_post))
		.route(
			"/posts/:post_id/edit/",
			get(posts::edit).post(posts::edit_post),
		)
		.route("/posts/:post_id/comment/", post(posts::add_comment))
		.route("/follow/", get(follow::index))
		.route("/profile/:username/follow/", get(follow::follow))
		.route("/profile/:username/unfollow/", get(follow::unfollow))
		.route_layer(from_fn_with_state(g.clone(), auth::login_required));

	Router::new()
		.route("/", get(posts::index))
		.route("/group/:slug/", get(posts::group_posts))
		.route("/profile/:username/", get(posts::profile))
		.route("/posts/:post_id/", get(posts::post_detail))
		.merge(protected)
		.nest("/auth", auth::router())
		.nest_service("/static", ServeDir::new(g.config.static_path()))
		.nest_service("/media", ServeDir::new(&g.media_path))
		.fallback(not_found)
		.layer(from_fn_with_state(g.clone(), auth::session_middleware))
		.layer(DefaultBodyLimit::max(10_000_000))
		.with_state(g)
}

pub async fn serve(stop_flag: Arc<AtomicBool>, global: Arc<Global>) -> io::Result<()> {
	let address = global
		.config
		.listen_address
		.clone()
		.unwrap_or("127.0.0.1".to_string());
	let port = global
		.config
		.port
		.unwrap_or(crate::config::DEFAULT_PORT);
	let app = router(global);

	let listener = tokio::net::TcpListener::bind((address.as_str(), port)).await?;
	info!("Serving on http://{}", listener.local_addr()?);
	axum::serve(
		listener,
		app.into_make_service_with_connect_info::<SocketAddr>(),
	)
	.with_graceful_shutdown(async move {
		while !stop_flag.load(Ordering::Relaxed) {
			sleep(Duration::from_secs(1)).await;
		}
		info!("Shutting down web server...");
	})
	.await
}

async fn not_found(
	State(g): State<Arc<Global>>, viewer: Option<Extension<Viewer>>, uri: axum::http::Uri,
) -> Response {
	let viewer = viewer.map(|Extension(v)| v).unwrap_or_default();
	g.render_not_found(&viewer, uri.path())
}
