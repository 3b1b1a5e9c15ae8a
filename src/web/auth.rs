use std::{collections::BTreeMap, sync::Arc};

use ::serde::Deserialize;
use axum::{
	extract::{Extension, Query, Request, State},
	middleware::Next,
	response::{IntoResponse, Response},
	routing::get,
	Form, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::*;
use tera::Context;

use super::{common::*, Global, Viewer};
use crate::{
	auth::{self, SESSION_COOKIE},
	db::{self, PersistenceHandle},
};


const INVALID_LOGIN: &str =
	"Please enter a correct username and password. Note that both fields may be case-sensitive.";
const USERNAME_TAKEN: &str = "A user with that username already exists.";
const PASSWORD_MISMATCH: &str = "The two password fields didn't match.";

#[derive(Deserialize)]
pub struct NextQuery {
	next: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
	#[serde(default)]
	username: String,
	#[serde(default)]
	password: String,
	next: Option<String>,
}

#[derive(Deserialize)]
pub struct SignupForm {
	#[serde(default)]
	first_name: String,
	#[serde(default)]
	last_name: String,
	#[serde(default)]
	username: String,
	#[serde(default)]
	password1: String,
	#[serde(default)]
	password2: String,
}


pub fn router() -> Router<Arc<Global>> {
	Router::new()
		.route("/signup/", get(signup).post(signup_post))
		.route("/login/", get(login).post(login_post))
		.route("/logout/", get(logout))
}

pub fn session_token(cookies: &CookieJar) -> Option<String> {
	cookies.get(SESSION_COOKIE).map(|c| c.value().to_string())
}

/// Resolves the session cookie into the viewer of the request. Unknown tokens
/// are treated as anonymous.
pub async fn session_middleware(
	State(g): State<Arc<Global>>, cookies: CookieJar, mut request: Request, next: Next,
) -> Response {
	let viewer = match session_token(&cookies) {
		None => Viewer::default(),
		Some(token) => match g.db.find_session_user(&token).await {
			Ok(user) => {
				if user.is_none() {
					debug!("Unknown session token used");
				}
				Viewer(user)
			}
			Err(e) => return server_error_response(e, "Unable to load session"),
		},
	};
	request.extensions_mut().insert(viewer);
	next.run(request).await
}

/// Sends anonymous visitors to the login page.
pub async fn login_required(
	State(g): State<Arc<Global>>, Extension(viewer): Extension<Viewer>, request: Request,
	next: Next,
) -> Response {
	if viewer.0.is_none() {
		return redirect_to_login(g.config.login_url(), request.uri());
	}
	next.run(request).await
}


fn render_login(
	g: &Global, username: &str, next: Option<&str>, error: Option<&str>,
) -> Response {
	let mut context = Context::new();
	context.insert("username", username);
	context.insert("next", &next.unwrap_or_default());
	context.insert("error", &error);
	g.render("auth/login.html.tera", &Viewer::default(), context)
}

fn render_signup(
	g: &Global, form: Option<&SignupForm>, errors: &BTreeMap<&'static str, Vec<String>>,
) -> Response {
	let mut context = Context::new();
	context.insert("first_name", &form.map(|f| f.first_name.as_str()).unwrap_or_default());
	context.insert("last_name", &form.map(|f| f.last_name.as_str()).unwrap_or_default());
	context.insert("username", &form.map(|f| f.username.as_str()).unwrap_or_default());
	context.insert("errors", errors);
	g.render("auth/signup.html.tera", &Viewer::default(), context)
}

/// Logs the user in by creating a new session, and redirects.
async fn start_session(
	db: &impl PersistenceHandle, cookies: CookieJar, user_id: i64, location: &str,
) -> Response {
	let token = auth::generate_session_token();
	if let Err(e) = db.create_session(user_id, &token).await {
		return server_error_response(e, "Unable to create session");
	}

	let cookie = Cookie::build((SESSION_COOKIE, token))
		.path("/")
		.http_only(true);
	(cookies.add(cookie), redirect_response(location)).into_response()
}


async fn login(State(g): State<Arc<Global>>, Query(query): Query<NextQuery>) -> Response {
	render_login(&g, "", query.next.as_deref(), None)
}

async fn login_post(
	State(g): State<Arc<Global>>, cookies: CookieJar, Form(form): Form<LoginForm>,
) -> Response {
	let user = match g.db.find_user_by_username(&form.username).await {
		Ok(u) => u,
		Err(e) => return server_error_response(e, "Unable to load user"),
	};

	let valid = match &user {
		None => false,
		Some(u) => {
			let password = form.password.clone();
			let hash = u.password_hash.clone();
			match tokio::task::spawn_blocking(move || auth::verify_password(&password, &hash))
				.await
			{
				Ok(v) => v,
				Err(e) => return server_error_response(e, "Password verification failed"),
			}
		}
	};

	match user {
		Some(u) if valid => {
			info!("User {} logged in", &u.username);
			let location = safe_next(form.next.as_deref()).to_string();
			start_session(&g.db, cookies, u.id, &location).await
		}
		_ => render_login(
			&g,
			&form.username,
			form.next.as_deref(),
			Some(INVALID_LOGIN),
		),
	}
}

async fn logout(State(g): State<Arc<Global>>, cookies: CookieJar) -> Response {
	if let Some(token) = session_token(&cookies) {
		if let Err(e) = g.db.delete_session(&token).await {
			return server_error_response(e, "Unable to delete session");
		}
	}

	let removal = Cookie::build(SESSION_COOKIE).path("/");
	let page = g.render(
		"auth/logged_out.html.tera",
		&Viewer::default(),
		Context::new(),
	);
	(cookies.remove(removal), page).into_response()
}

async fn signup(State(g): State<Arc<Global>>) -> Response {
	render_signup(&g, None, &BTreeMap::new())
}

async fn signup_post(
	State(g): State<Arc<Global>>, cookies: CookieJar, Form(form): Form<SignupForm>,
) -> Response {
	let mut errors = BTreeMap::<&'static str, Vec<String>>::new();
	if let Err(message) = auth::validate_username(&form.username) {
		errors.entry("username").or_default().push(message.to_string());
	}
	if form.password1.is_empty() {
		errors
			.entry("password1")
			.or_default()
			.push(super::forms::REQUIRED.to_string());
	}
	if form.password2.is_empty() {
		errors
			.entry("password2")
			.or_default()
			.push(super::forms::REQUIRED.to_string());
	} else if form.password1 != form.password2 {
		errors
			.entry("password2")
			.or_default()
			.push(PASSWORD_MISMATCH.to_string());
	}
	if !errors.is_empty() {
		return render_signup(&g, Some(&form), &errors);
	}

	let password = form.password1.clone();
	let hash = match tokio::task::spawn_blocking(move || auth::hash_password(&password)).await {
		Ok(Ok(h)) => h,
		Ok(Err(e)) => return server_error_response(e, "Unable to hash password"),
		Err(e) => return server_error_response(e, "Unable to hash password"),
	};

	let tx = match g.db.transaction().await {
		Ok(tx) => tx,
		Err(e) => return server_error_response(e, "Unable to start transaction"),
	};
	let user = match tx
		.create_user(&form.username, &form.first_name, &form.last_name, &hash)
		.await
	{
		Ok(u) => u,
		Err(db::Error::UsernameTaken(_)) => {
			errors
				.entry("username")
				.or_default()
				.push(USERNAME_TAKEN.to_string());
			return render_signup(&g, Some(&form), &errors);
		}
		Err(e) => return server_error_response(e, "Unable to create user"),
	};
	let response = start_session(&tx, cookies, user.id, "/").await;
	if response.status().is_server_error() {
		return response;
	}
	if let Err(e) = tx.commit().await {
		return server_error_response(e, "Unable to commit new user");
	}
	info!("New user {} signed up", &user.username);
	response
}


#[cfg(test)]
mod tests {
	use axum::http::{header, HeaderMap, HeaderValue};

	use super::*;

	#[test]
	fn test_session_token_is_found_among_cookies() {
		let mut headers = HeaderMap::new();
		assert_eq!(session_token(&CookieJar::from_headers(&headers)), None);

		headers.insert(
			header::COOKIE,
			HeaderValue::from_static("theme=dark; sessionid=abc123; lang=en"),
		);
		let cookies = CookieJar::from_headers(&headers);
		assert_eq!(session_token(&cookies).as_deref(), Some("abc123"));
	}
}
