use std::sync::Arc;

use ::serde::Deserialize;
use axum::{
	extract::{Extension, FromRequest, Multipart, Path, Query, Request, State},
	http::Uri,
	response::{IntoResponse, Response},
	Form,
};
use log::*;
use tera::Context;

use super::{
	common::*,
	forms::{self, CommentForm, FormErrors, PostForm, PostFormValues},
	Global, Viewer, INDEX_CACHE_PREFIX,
};
use crate::{
	db::{PersistenceHandle, PostInfo},
	entity::{post, user},
	page_cache::PageCache,
	paginator::{parse_page_number, Page},
};


#[derive(Deserialize)]
pub struct PageQuery {
	page: Option<String>,
}

impl PageQuery {
	pub fn page(&self) -> Option<&str> { self.page.as_deref() }
}


fn display_page(page: Page<PostInfo>) -> Page<PostDisplayInfo> {
	page.map(into_post_display_info)
}

/// Ids in the URL that aren't numbers are treated the same as ids that don't
/// exist.
fn parse_id(raw: &str) -> Option<i64> { raw.parse().ok() }

fn detail_url(post_id: i64) -> String { format!("/posts/{}/", post_id) }

fn current_user<'a>(
	g: &Global, viewer: &'a Viewer, uri: &Uri,
) -> Result<&'a user::Model, Response> {
	viewer
		.0
		.as_ref()
		.ok_or_else(|| redirect_to_login(g.config.login_url(), uri))
}

/// Loads the post that the viewer wants to edit. Responds with a 404 if it
/// doesn't exist, or with a redirect to the post if the viewer isn't the
/// author.
async fn load_own_post(
	g: &Global, viewer: &Viewer, uri: &Uri, raw_post_id: &str,
) -> Result<post::Model, Response> {
	let author = current_user(g, viewer, uri)?;
	let post_id = parse_id(raw_post_id).ok_or_else(|| g.render_not_found(viewer, uri.path()))?;
	let post = match g.db.find_post(post_id).await {
		Ok(Some(p)) => p,
		Ok(None) => return Err(g.render_not_found(viewer, uri.path())),
		Err(e) => return Err(server_error_response(e, "Unable to load post")),
	};

	if post.author_id != author.id {
		info!(
			"User {} tried to edit post {} of user {}",
			author.id, post.id, post.author_id
		);
		return Err(redirect_response(detail_url(post.id)));
	}
	Ok(post)
}

async fn render_post_form(
	g: &Global, viewer: &Viewer, values: &PostFormValues, errors: &FormErrors,
	post: Option<&post::Model>,
) -> Response {
	let groups = match g.db.load_groups().await {
		Ok(g) => g,
		Err(e) => return server_error_response(e, "Unable to load groups"),
	};

	let mut context = Context::new();
	context.insert("form", values);
	context.insert("selected_group", &values.group.trim().parse::<i64>().ok());
	context.insert("errors", errors);
	context.insert("groups", &groups);
	context.insert("is_edit", &post.is_some());
	context.insert("post", &post);
	context.insert(
		"image_url",
		&post
			.and_then(|p| p.image.as_ref())
			.map(|path| format!("/media/{}", path)),
	);
	g.render("posts/create_post.html.tera", viewer, context)
}


pub async fn index(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Query(query): Query<PageQuery>, uri: Uri,
) -> Response {
	let target = uri
		.path_and_query()
		.map(|pq| pq.as_str())
		.unwrap_or("/");
	let key = PageCache::key(INDEX_CACHE_PREFIX, target, viewer.id());
	let page_number = parse_page_number(query.page());

	let global: &Global = &g;
	let viewer = &viewer;
	let result = global
		.index_cache
		.get_or_render(key, move || async move {
			let page = global
				.db
				.load_index_page(page_number, global.config.posts_per_page())
				.await
				.map_err(|e| server_error_response(e, "Unable to load posts"))?;

			let mut context = Context::new();
			context.insert("page_obj", &display_page(page));
			global.render_to_string("posts/index.html.tera", viewer, context)
		})
		.await;

	match result {
		Ok(html) => html_response(200, html),
		Err(response) => response,
	}
}

pub async fn group_posts(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Path(slug): Path<String>, Query(query): Query<PageQuery>, uri: Uri,
) -> Response {
	let group = match g.db.find_group_by_slug(&slug).await {
		Ok(Some(group)) => group,
		Ok(None) => return g.render_not_found(&viewer, uri.path()),
		Err(e) => return server_error_response(e, "Unable to load group"),
	};

	let page_number = parse_page_number(query.page());
	let page = match g
		.db
		.load_group_page(group.id, page_number, g.config.posts_per_page())
		.await
	{
		Ok(p) => p,
		Err(e) => return server_error_response(e, "Unable to load group posts"),
	};

	let mut context = Context::new();
	context.insert("group", &group);
	context.insert("page_obj", &display_page(page));
	g.render("posts/group_list.html.tera", &viewer, context)
}

pub async fn profile(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Path(username): Path<String>, Query(query): Query<PageQuery>, uri: Uri,
) -> Response {
	let author = match g.db.find_user_by_username(&username).await {
		Ok(Some(u)) => u,
		Ok(None) => return g.render_not_found(&viewer, uri.path()),
		Err(e) => return server_error_response(e, "Unable to load user"),
	};

	let page_number = parse_page_number(query.page());
	let page = match g
		.db
		.load_author_page(author.id, page_number, g.config.posts_per_page())
		.await
	{
		Ok(p) => p,
		Err(e) => return server_error_response(e, "Unable to load the author's posts"),
	};

	let following = match viewer.id() {
		None => false,
		Some(viewer_id) => match g.db.is_following(viewer_id, author.id).await {
			Ok(f) => f,
			Err(e) => return server_error_response(e, "Unable to load follow status"),
		},
	};

	let mut context = Context::new();
	context.insert("author", &author);
	context.insert("author_name", &author.display_name());
	context.insert("post_count", &page.meta.count);
	context.insert("following", &following);
	context.insert("is_self", &(viewer.id() == Some(author.id)));
	context.insert("page_obj", &display_page(page));
	g.render("posts/profile.html.tera", &viewer, context)
}

pub async fn post_detail(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Path(post_id): Path<String>, uri: Uri,
) -> Response {
	let post_id = match parse_id(&post_id) {
		Some(id) => id,
		None => return g.render_not_found(&viewer, uri.path()),
	};
	let post = match g.db.find_post_info(post_id).await {
		Ok(Some(p)) => p,
		Ok(None) => return g.render_not_found(&viewer, uri.path()),
		Err(e) => return server_error_response(e, "Unable to load post"),
	};

	let comments = match g.db.load_comments(post.id).await {
		Ok(c) => c,
		Err(e) => return server_error_response(e, "Unable to load comments"),
	};
	let author_post_count = match g.db.count_author_posts(post.author_id).await {
		Ok(c) => c,
		Err(e) => return server_error_response(e, "Unable to count posts"),
	};

	let mut context = Context::new();
	context.insert("is_author", &(viewer.id() == Some(post.author_id)));
	context.insert("author_post_count", &author_post_count);
	context.insert(
		"comments",
		&comments
			.into_iter()
			.map(into_comment_display_info)
			.collect::<Vec<_>>(),
	);
	context.insert("post", &into_post_display_info(post));
	g.render("posts/post_detail.html.tera", &viewer, context)
}

pub async fn create(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
) -> Response {
	render_post_form(
		&g,
		&viewer,
		&PostFormValues::default(),
		&FormErrors::new(),
		None,
	)
	.await
}

pub async fn create_post(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, uri: Uri,
	multipart: Multipart,
) -> Response {
	let author = match current_user(&g, &viewer, &uri) {
		Ok(u) => u,
		Err(r) => return r,
	};
	let form = match PostForm::parse(multipart).await {
		Ok(f) => f,
		Err(r) => return r,
	};
	let values = form.values();
	let valid = match form.validate(&g.db).await {
		Ok(Ok(v)) => v,
		Ok(Err(errors)) => return render_post_form(&g, &viewer, &values, &errors, None).await,
		Err(e) => return server_error_response(e, "Unable to validate post"),
	};

	let image = match &valid.image {
		None => None,
		Some(upload) => match forms::store_image(&g.media_path, upload).await {
			Ok(path) => Some(path),
			Err(e) => return server_error_response(e, "Unable to store image"),
		},
	};

	match g
		.db
		.create_post(author.id, &valid.text, valid.group_id, image)
		.await
	{
		Ok(post) => {
			info!("User {} published post {}", author.id, post.id);
			redirect_response(format!("/profile/{}/", author.username))
		}
		Err(e) => server_error_response(e, "Unable to create post"),
	}
}

pub async fn edit(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Path(post_id): Path<String>, uri: Uri,
) -> Response {
	let post = match load_own_post(&g, &viewer, &uri, &post_id).await {
		Ok(p) => p,
		Err(r) => return r,
	};

	let values = PostFormValues {
		text: post.text.clone(),
		group: post.group_id.map(|id| id.to_string()).unwrap_or_default(),
	};
	render_post_form(&g, &viewer, &values, &FormErrors::new(), Some(&post)).await
}

pub async fn edit_post(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Path(post_id): Path<String>, uri: Uri, request: Request,
) -> Response {
	let post = match load_own_post(&g, &viewer, &uri, &post_id).await {
		Ok(p) => p,
		Err(r) => return r,
	};
	// The body is only read once the viewer is known to be the author.
	let multipart = match Multipart::from_request(request, &g).await {
		Ok(m) => m,
		Err(rejection) => return rejection.into_response(),
	};
	let form = match PostForm::parse(multipart).await {
		Ok(f) => f,
		Err(r) => return r,
	};
	let values = form.values();
	let valid = match form.validate(&g.db).await {
		Ok(Ok(v)) => v,
		Ok(Err(errors)) => {
			return render_post_form(&g, &viewer, &values, &errors, Some(&post)).await
		}
		Err(e) => return server_error_response(e, "Unable to validate post"),
	};

	let image = match &valid.image {
		None => None,
		Some(upload) => match forms::store_image(&g.media_path, upload).await {
			Ok(path) => Some(path),
			Err(e) => return server_error_response(e, "Unable to store image"),
		},
	};

	match g
		.db
		.update_post(post.id, &valid.text, valid.group_id, image)
		.await
	{
		Ok(Some(_)) => redirect_response(detail_url(post.id)),
		Ok(None) => g.render_not_found(&viewer, uri.path()),
		Err(e) => server_error_response(e, "Unable to update post"),
	}
}

pub async fn add_comment(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>,
	Path(post_id): Path<String>, uri: Uri, Form(form): Form<CommentForm>,
) -> Response {
	let author = match current_user(&g, &viewer, &uri) {
		Ok(u) => u,
		Err(r) => return r,
	};
	let post = match parse_id(&post_id) {
		None => None,
		Some(id) => match g.db.find_post(id).await {
			Ok(p) => p,
			Err(e) => return server_error_response(e, "Unable to load post"),
		},
	};
	let post = match post {
		Some(p) => p,
		None => return g.render_not_found(&viewer, uri.path()),
	};

	let text = form.text.trim();
	if text.is_empty() {
		debug!("Ignoring empty comment on post {}", post.id);
	} else if let Err(e) = g.db.create_comment(post.id, author.id, text).await {
		return server_error_response(e, "Unable to add comment");
	}
	redirect_response(detail_url(post.id))
}
