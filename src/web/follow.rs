use std::sync::Arc;

use axum::{
	extract::{Extension, Path, Query, State},
	http::Uri,
	response::Response,
};
use log::*;
use tera::Context;

use super::{common::*, posts::PageQuery, Global, Viewer};
use crate::{
	db::{FollowResult, PersistenceHandle},
	entity::user,
	paginator::parse_page_number,
};


async fn load_follow_target(
	g: &Global, viewer: &Viewer, uri: &Uri, username: &str,
) -> Result<(i64, user::Model), Response> {
	let viewer_id = viewer
		.id()
		.ok_or_else(|| redirect_to_login(g.config.login_url(), uri))?;
	match g.db.find_user_by_username(username).await {
		Ok(Some(author)) => Ok((viewer_id, author)),
		Ok(None) => Err(g.render_not_found(viewer, uri.path())),
		Err(e) => Err(server_error_response(e, "Unable to load user")),
	}
}

/// The posts of all the authors that the viewer follows.
pub async fn index(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Query(query): Query<PageQuery>, uri: Uri,
) -> Response {
	let viewer_id = match viewer.id() {
		Some(id) => id,
		None => return redirect_to_login(g.config.login_url(), &uri),
	};

	let page_number = parse_page_number(query.page());
	let page = match g
		.db
		.load_follow_page(viewer_id, page_number, g.config.posts_per_page())
		.await
	{
		Ok(p) => p,
		Err(e) => return server_error_response(e, "Unable to load followed posts"),
	};

	let mut context = Context::new();
	context.insert("page_obj", &page.map(into_post_display_info));
	g.render("posts/follow.html.tera", &viewer, context)
}

pub async fn follow(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Path(username): Path<String>, uri: Uri,
) -> Response {
	let (viewer_id, author) = match load_follow_target(&g, &viewer, &uri, &username).await {
		Ok(t) => t,
		Err(r) => return r,
	};

	match g.db.follow(viewer_id, author.id).await {
		Ok(FollowResult::Created) => info!("User {} now follows {}", viewer_id, author.id),
		Ok(FollowResult::AlreadyExists) => {
			debug!("User {} already follows {}", viewer_id, author.id)
		}
		Ok(FollowResult::SelfFollow) => {
			debug!("User {} tried to follow themselves", viewer_id)
		}
		Err(e) => return server_error_response(e, "Unable to follow user"),
	}
	redirect_response(format!("/profile/{}/", author.username))
}

pub async fn unfollow(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Path(username): Path<String>, uri: Uri,
) -> Response {
	let (viewer_id, author) = match load_follow_target(&g, &viewer, &uri, &username).await {
		Ok(t) => t,
		Err(r) => return r,
	};

	match g.db.unfollow(viewer_id, author.id).await {
		Ok(true) => {
			info!("User {} unfollowed {}", viewer_id, author.id);
			redirect_response(format!("/profile/{}/", author.username))
		}
		Ok(false) => g.render_not_found(&viewer, uri.path()),
		Err(e) => server_error_response(e, "Unable to unfollow user"),
	}
}
