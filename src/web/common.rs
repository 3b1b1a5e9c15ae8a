use std::fmt::{Debug, Display};

use ::serde::Serialize;
use axum::{
	body::Body,
	http::{header, StatusCode, Uri},
	response::{IntoResponse, Response},
};
use chrono::*;
use log::*;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::db::{CommentInfo, PostInfo};


/// Everything but the unreserved characters and the slash gets encoded in the
/// `next` parameter.
const NEXT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
	.remove(b'/')
	.remove(b'-')
	.remove(b'_')
	.remove(b'.')
	.remove(b'~');

#[derive(Debug, Serialize)]
pub struct PostDisplayInfo {
	id: i64,
	text: String,
	author_username: String,
	author_name: String,
	group_title: Option<String>,
	group_slug: Option<String>,
	image_url: Option<String>,
	created: String,
	time_ago: String,
}

#[derive(Debug, Serialize)]
pub struct CommentDisplayInfo {
	id: i64,
	author_username: String,
	text: String,
	created: String,
	time_ago: String,
}


fn format_timestamp(millis: i64) -> (String, String) {
	let created = Utc
		.timestamp_millis_opt(millis)
		.single()
		.unwrap_or_default();
	let time_ago = human_readable_duration(&Utc::now().signed_duration_since(created));
	(format!("{}", created.format("%d %b %Y %H:%M")), time_ago)
}

pub fn into_post_display_info(post: PostInfo) -> PostDisplayInfo {
	let (created, time_ago) = format_timestamp(post.pub_date);
	let full_name = format!("{} {}", post.author_first_name, post.author_last_name);
	let author_name = match full_name.trim() {
		"" => post.author_username.clone(),
		name => name.to_string(),
	};

	PostDisplayInfo {
		id: post.id,
		text: post.text,
		author_username: post.author_username,
		author_name,
		group_title: post.group_title,
		group_slug: post.group_slug,
		image_url: post.image.map(|path| format!("/media/{}", path)),
		created,
		time_ago,
	}
}

pub fn into_comment_display_info(comment: CommentInfo) -> CommentDisplayInfo {
	let (created, time_ago) = format_timestamp(comment.created);
	CommentDisplayInfo {
		id: comment.id,
		author_username: comment.author_username,
		text: comment.text,
		created,
		time_ago,
	}
}

pub fn human_readable_duration(duration: &Duration) -> String {
	fn plural(amount: i64, unit: &str) -> String {
		if amount == 1 {
			format!("{} {}", amount, unit)
		} else {
			format!("{} {}s", amount, unit)
		}
	}

	if duration.num_weeks() > 0 {
		plural(duration.num_weeks(), "week")
	} else if duration.num_days() > 0 {
		plural(duration.num_days(), "day")
	} else if duration.num_hours() > 0 {
		plural(duration.num_hours(), "hour")
	} else if duration.num_minutes() > 0 {
		plural(duration.num_minutes(), "minute")
	} else {
		plural(duration.num_seconds().max(0), "second")
	}
}

pub fn html_response(status_code: u16, html: String) -> Response {
	Response::builder()
		.status(status_code)
		.header("Content-Type", "text/html; charset=utf-8")
		.body(Body::from(html))
		.unwrap()
}

/// A '302 Found' redirect to the given location.
pub fn redirect_response(location: impl Into<String>) -> Response {
	let location: String = location.into();
	(StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Redirects to the login page, which will send the user back to the original
/// URI after logging in.
pub fn redirect_to_login(login_url: &str, original: &Uri) -> Response {
	let next = original
		.path_and_query()
		.map(|pq| pq.as_str())
		.unwrap_or("/");
	redirect_response(format!(
		"{}?next={}",
		login_url,
		utf8_percent_encode(next, NEXT_ENCODE_SET)
	))
}

/// Only allows redirecting to paths on this site.
pub fn safe_next(next: Option<&str>) -> &str {
	match next {
		Some(n) if n.starts_with('/') && !n.starts_with("//") && !n.contains('\\') => n,
		_ => "/",
	}
}

pub fn error_response<S>(status_code: u16, message: S) -> Response
where
	S: Into<String>,
{
	let string: String = message.into();
	if status_code >= 400 {
		warn!("HTTP {} error: {}", status_code, &string);
	}
	Response::builder()
		.status(status_code)
		.header("Content-Type", "text/plain")
		.body(Body::from(string))
		.unwrap()
}

pub fn server_error_response<E>(e: E, message: &str) -> Response
where
	E: Debug + Display,
{
	error!("{}: {:?}", message, e);
	error_response(500, format!("{}: {}", message, e))
}
