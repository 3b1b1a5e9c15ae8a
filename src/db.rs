mod install;

use std::{
	path::PathBuf,
	time::Duration,
};

use ::serde::Serialize;
use async_trait::async_trait;
use chrono::Utc;
use log::*;
use sea_orm::{
	sea_query::{OnConflict, Query},
	ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, DatabaseBackend,
	DatabaseConnection, DbErr, EntityTrait, FromQueryResult, JoinType, NotSet, PaginatorTrait,
	QueryFilter, QueryOrder, QuerySelect, RelationTrait, Select, Set, TransactionTrait,
};
use thiserror::Error;

use crate::{
	entity::{comment, follow, group, post, session, user},
	paginator::{Page, PageMeta},
};


#[derive(Clone)]
pub struct Database {
	orm: DatabaseConnection,
}

pub struct Transaction(pub(crate) sea_orm::DatabaseTransaction);

#[derive(Debug, Error)]
pub enum Error {
	#[error("{0}")]
	OrmError(#[from] DbErr),
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
	#[error("user {0} does not exist")]
	MissingUser(i64),
	#[error("username \"{0}\" is already taken")]
	UsernameTaken(String),
	#[error("group slug \"{0}\" is already taken")]
	SlugTaken(String),
}

pub type Result<T> = std::result::Result<T, self::Error>;

/// A post together with the fields of its author and group that are needed to
/// display it.
#[derive(Clone, Debug, FromQueryResult, PartialEq, Serialize)]
pub struct PostInfo {
	pub id: i64,
	pub text: String,
	pub pub_date: i64,
	pub author_id: i64,
	pub group_id: Option<i64>,
	pub image: Option<String>,
	pub author_username: String,
	pub author_first_name: String,
	pub author_last_name: String,
	pub group_title: Option<String>,
	pub group_slug: Option<String>,
}

#[derive(Clone, Debug, FromQueryResult, Serialize)]
pub struct CommentInfo {
	pub id: i64,
	pub post_id: i64,
	pub author_id: i64,
	pub text: String,
	pub created: i64,
	pub author_username: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FollowResult {
	Created,
	AlreadyExists,
	/// Following yourself is silently ignored.
	SelfFollow,
}


fn now() -> i64 { Utc::now().timestamp_millis() }

fn select_post_info() -> Select<post::Entity> {
	post::Entity::find()
		.column_as(user::Column::Username, "author_username")
		.column_as(user::Column::FirstName, "author_first_name")
		.column_as(user::Column::LastName, "author_last_name")
		.column_as(group::Column::Title, "group_title")
		.column_as(group::Column::Slug, "group_slug")
		.join(JoinType::InnerJoin, post::Relation::Author.def())
		.join(JoinType::LeftJoin, post::Relation::Group.def())
		.order_by_desc(post::Column::PubDate)
		.order_by_desc(post::Column::Id)
}


#[async_trait]
pub trait PersistenceHandle: Send + Sync {
	type Inner: ConnectionTrait;

	fn inner(&self) -> &Self::Inner;

	fn backend(&self) -> DatabaseBackend { self.inner().get_database_backend() }


	async fn create_user(
		&self, username: &str, first_name: &str, last_name: &str, password_hash: &str,
	) -> Result<user::Model> {
		if self.find_user_by_username(username).await?.is_some() {
			return Err(Error::UsernameTaken(username.to_string()));
		}

		let model = user::ActiveModel {
			id: NotSet,
			username: Set(username.to_string()),
			first_name: Set(first_name.to_string()),
			last_name: Set(last_name.to_string()),
			password_hash: Set(password_hash.to_string()),
			date_joined: Set(now()),
		}
		.insert(self.inner())
		.await?;
		info!("Created user {} ({})", &model.username, model.id);
		Ok(model)
	}

	async fn find_user(&self, user_id: i64) -> Result<Option<user::Model>> {
		Ok(user::Entity::find_by_id(user_id).one(self.inner()).await?)
	}

	async fn find_user_by_username(&self, username: &str) -> Result<Option<user::Model>> {
		Ok(user::Entity::find()
			.filter(user::Column::Username.eq(username))
			.one(self.inner())
			.await?)
	}

	/// Deletes the user, along with everything they've authored. Returns
	/// whether the user existed.
	async fn delete_user(&self, user_id: i64) -> Result<bool> {
		let result = user::Entity::delete_by_id(user_id)
			.exec(self.inner())
			.await?;
		Ok(result.rows_affected > 0)
	}


	async fn create_group(&self, title: &str, slug: &str, description: &str) -> Result<group::Model> {
		if self.find_group_by_slug(slug).await?.is_some() {
			return Err(Error::SlugTaken(slug.to_string()));
		}

		let model = group::ActiveModel {
			id: NotSet,
			title: Set(title.to_string()),
			slug: Set(slug.to_string()),
			description: Set(description.to_string()),
		}
		.insert(self.inner())
		.await?;
		Ok(model)
	}

	/// Creates the group if its slug is unknown, otherwise updates its title
	/// and description.
	async fn ensure_group(&self, title: &str, slug: &str, description: &str) -> Result<group::Model> {
		match self.find_group_by_slug(slug).await? {
			None => self.create_group(title, slug, description).await,
			Some(existing) => {
				let mut active: group::ActiveModel = existing.into();
				active.title = Set(title.to_string());
				active.description = Set(description.to_string());
				Ok(active.update(self.inner()).await?)
			}
		}
	}

	async fn find_group(&self, group_id: i64) -> Result<Option<group::Model>> {
		Ok(group::Entity::find_by_id(group_id).one(self.inner()).await?)
	}

	async fn find_group_by_slug(&self, slug: &str) -> Result<Option<group::Model>> {
		Ok(group::Entity::find()
			.filter(group::Column::Slug.eq(slug))
			.one(self.inner())
			.await?)
	}

	async fn load_groups(&self) -> Result<Vec<group::Model>> {
		Ok(group::Entity::find()
			.order_by_asc(group::Column::Title)
			.all(self.inner())
			.await?)
	}

	/// Deletes the group and all posts filed under it.
	async fn delete_group(&self, group_id: i64) -> Result<bool> {
		let result = group::Entity::delete_by_id(group_id)
			.exec(self.inner())
			.await?;
		Ok(result.rows_affected > 0)
	}


	async fn create_post(
		&self, author_id: i64, text: &str, group_id: Option<i64>, image: Option<String>,
	) -> Result<post::Model> {
		if self.find_user(author_id).await?.is_none() {
			return Err(Error::MissingUser(author_id));
		}

		let model = post::ActiveModel {
			id: NotSet,
			text: Set(text.to_string()),
			pub_date: Set(now()),
			author_id: Set(author_id),
			group_id: Set(group_id),
			image: Set(image),
		}
		.insert(self.inner())
		.await?;
		debug!("Post {} created by user {}", model.id, author_id);
		Ok(model)
	}

	/// Replaces the text and group of a post. The image is only replaced if a
	/// new one is given. The id, author and publication date stay untouched.
	async fn update_post(
		&self, post_id: i64, text: &str, group_id: Option<i64>, image: Option<String>,
	) -> Result<Option<post::Model>> {
		let existing = match self.find_post(post_id).await? {
			None => return Ok(None),
			Some(p) => p,
		};

		let mut active: post::ActiveModel = existing.into();
		active.text = Set(text.to_string());
		active.group_id = Set(group_id);
		if image.is_some() {
			active.image = Set(image);
		}
		Ok(Some(active.update(self.inner()).await?))
	}

	async fn find_post(&self, post_id: i64) -> Result<Option<post::Model>> {
		Ok(post::Entity::find_by_id(post_id).one(self.inner()).await?)
	}

	async fn find_post_info(&self, post_id: i64) -> Result<Option<PostInfo>> {
		Ok(select_post_info()
			.filter(post::Column::Id.eq(post_id))
			.into_model::<PostInfo>()
			.one(self.inner())
			.await?)
	}

	/// Deletes the post along with its comments.
	async fn delete_post(&self, post_id: i64) -> Result<bool> {
		let result = post::Entity::delete_by_id(post_id)
			.exec(self.inner())
			.await?;
		Ok(result.rows_affected > 0)
	}

	async fn count_posts(&self) -> Result<u64> {
		Ok(post::Entity::find().count(self.inner()).await?)
	}

	async fn count_author_posts(&self, author_id: i64) -> Result<u64> {
		Ok(post::Entity::find()
			.filter(post::Column::AuthorId.eq(author_id))
			.count(self.inner())
			.await?)
	}

	/// Loads one page of the given post selection. The page number gets
	/// clamped into the available range.
	async fn load_post_page(
		&self, selection: Select<post::Entity>, page: u64, per_page: u64,
	) -> Result<Page<PostInfo>> {
		let paginator = selection
			.into_model::<PostInfo>()
			.paginate(self.inner(), per_page.max(1));
		let count = paginator.num_items().await?;
		let meta = PageMeta::new(page, count, per_page);
		let items = if count > 0 {
			paginator.fetch_page(meta.index()).await?
		} else {
			Vec::new()
		};
		Ok(Page { items, meta })
	}

	async fn load_index_page(&self, page: u64, per_page: u64) -> Result<Page<PostInfo>> {
		self.load_post_page(select_post_info(), page, per_page)
			.await
	}

	async fn load_group_page(
		&self, group_id: i64, page: u64, per_page: u64,
	) -> Result<Page<PostInfo>> {
		let selection = select_post_info().filter(post::Column::GroupId.eq(group_id));
		self.load_post_page(selection, page, per_page).await
	}

	async fn load_author_page(
		&self, author_id: i64, page: u64, per_page: u64,
	) -> Result<Page<PostInfo>> {
		let selection = select_post_info().filter(post::Column::AuthorId.eq(author_id));
		self.load_post_page(selection, page, per_page).await
	}

	/// Loads a page of posts from all the authors that the user follows.
	async fn load_follow_page(
		&self, user_id: i64, page: u64, per_page: u64,
	) -> Result<Page<PostInfo>> {
		let selection = select_post_info().filter(
			post::Column::AuthorId.in_subquery(
				Query::select()
					.column(follow::Column::AuthorId)
					.from(follow::Entity)
					.and_where(follow::Column::UserId.eq(user_id))
					.take(),
			),
		);
		self.load_post_page(selection, page, per_page).await
	}


	async fn create_comment(
		&self, post_id: i64, author_id: i64, text: &str,
	) -> Result<comment::Model> {
		let model = comment::ActiveModel {
			id: NotSet,
			post_id: Set(post_id),
			author_id: Set(author_id),
			text: Set(text.to_string()),
			created: Set(now()),
		}
		.insert(self.inner())
		.await?;
		Ok(model)
	}

	/// Loads all comments of a post, oldest first.
	async fn load_comments(&self, post_id: i64) -> Result<Vec<CommentInfo>> {
		Ok(comment::Entity::find()
			.column_as(user::Column::Username, "author_username")
			.join(JoinType::InnerJoin, comment::Relation::Author.def())
			.filter(comment::Column::PostId.eq(post_id))
			.order_by_asc(comment::Column::Created)
			.order_by_asc(comment::Column::Id)
			.into_model::<CommentInfo>()
			.all(self.inner())
			.await?)
	}

	async fn count_comments(&self, post_id: i64) -> Result<u64> {
		Ok(comment::Entity::find()
			.filter(comment::Column::PostId.eq(post_id))
			.count(self.inner())
			.await?)
	}


	/// Makes the user follow the author, unless that is already the case.
	async fn follow(&self, user_id: i64, author_id: i64) -> Result<FollowResult> {
		if user_id == author_id {
			return Ok(FollowResult::SelfFollow);
		}
		if self.is_following(user_id, author_id).await? {
			return Ok(FollowResult::AlreadyExists);
		}

		// The unique index catches a concurrent request that got here first.
		let insert_result = follow::Entity::insert(follow::ActiveModel {
			id: NotSet,
			user_id: Set(user_id),
			author_id: Set(author_id),
		})
		.on_conflict(
			OnConflict::columns([follow::Column::UserId, follow::Column::AuthorId])
				.do_nothing()
				.to_owned(),
		)
		.exec_without_returning(self.inner())
		.await;
		match insert_result {
			Ok(rows) if rows > 0 => Ok(FollowResult::Created),
			Ok(_) | Err(DbErr::RecordNotInserted) => Ok(FollowResult::AlreadyExists),
			Err(e) => Err(e.into()),
		}
	}

	/// Removes the follow edge from the user to the author. Returns false if
	/// there was none.
	async fn unfollow(&self, user_id: i64, author_id: i64) -> Result<bool> {
		let result = follow::Entity::delete_many()
			.filter(follow::Column::UserId.eq(user_id))
			.filter(follow::Column::AuthorId.eq(author_id))
			.exec(self.inner())
			.await?;
		Ok(result.rows_affected > 0)
	}

	async fn is_following(&self, user_id: i64, author_id: i64) -> Result<bool> {
		Ok(self.count_follows(user_id, author_id).await? > 0)
	}

	async fn count_follows(&self, user_id: i64, author_id: i64) -> Result<u64> {
		Ok(follow::Entity::find()
			.filter(follow::Column::UserId.eq(user_id))
			.filter(follow::Column::AuthorId.eq(author_id))
			.count(self.inner())
			.await?)
	}


	async fn create_session(&self, user_id: i64, token: &str) -> Result<session::Model> {
		let model = session::ActiveModel {
			id: NotSet,
			token: Set(token.to_string()),
			user_id: Set(user_id),
			created: Set(now()),
		}
		.insert(self.inner())
		.await?;
		Ok(model)
	}

	async fn find_session_user(&self, token: &str) -> Result<Option<user::Model>> {
		let result = session::Entity::find()
			.filter(session::Column::Token.eq(token))
			.find_also_related(user::Entity)
			.one(self.inner())
			.await?;
		Ok(result.and_then(|(_, user)| user))
	}

	async fn delete_session(&self, token: &str) -> Result<bool> {
		let result = session::Entity::delete_many()
			.filter(session::Column::Token.eq(token))
			.exec(self.inner())
			.await?;
		Ok(result.rows_affected > 0)
	}
}


impl Database {
	/// Opens the database at the given path, creating it if it doesn't exist
	/// yet. Migrations still need to be run afterwards.
	pub async fn load(path: PathBuf) -> Result<Self> {
		// If the folder doesn't exist yet, create it
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				tokio::fs::create_dir_all(parent).await?;
			}
		}

		let mut opts = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
		opts.idle_timeout(Duration::from_secs(10));
		opts.acquire_timeout(Duration::from_secs(5));
		opts.sqlx_logging_level(LevelFilter::Debug);
		let orm = sea_orm::Database::connect(opts).await?;

		orm.execute_unprepared(install::QUERY).await?;
		Ok(Self { orm })
	}

	pub async fn transaction(&self) -> Result<Transaction> {
		let tx = self.orm.begin().await?;
		Ok(Transaction(tx))
	}
}

impl PersistenceHandle for Database {
	type Inner = DatabaseConnection;

	fn inner(&self) -> &Self::Inner { &self.orm }
}

impl PersistenceHandle for Transaction {
	type Inner = sea_orm::DatabaseTransaction;

	fn inner(&self) -> &Self::Inner { &self.0 }
}

impl Transaction {
	pub async fn commit(self) -> Result<()> {
		self.0.commit().await?;
		Ok(())
	}
}


#[cfg(test)]
mod tests {
	use super::*;
	use crate::test;

	#[tokio::test]
	async fn test_posts_are_paginated_newest_first() {
		let db = test::load_database("pagination").await;
		let author = test::create_user(&db, "auth").await;
		let group = db
			.create_group("Test group", "test-slug", "Test description")
			.await
			.unwrap();
		for i in 0..13 {
			db.create_post(author.id, &format!("Post {}", i), Some(group.id), None)
				.await
				.unwrap();
		}

		let first = db.load_index_page(1, 10).await.unwrap();
		assert_eq!(first.items.len(), 10);
		assert_eq!(first.meta.num_pages, 2);
		assert_eq!(first.items[0].text, "Post 12");
		assert_eq!(first.items[0].author_username, "auth");
		assert_eq!(first.items[0].group_slug.as_deref(), Some("test-slug"));

		let second = db.load_group_page(group.id, 2, 10).await.unwrap();
		assert_eq!(second.items.len(), 3);
		assert_eq!(second.items[2].text, "Post 0");

		let clamped = db.load_author_page(author.id, 7, 10).await.unwrap();
		assert_eq!(clamped.meta.number, 2);
		assert_eq!(clamped.items.len(), 3);
	}

	#[tokio::test]
	async fn test_empty_page() {
		let db = test::load_database("empty").await;
		let page = db.load_index_page(3, 10).await.unwrap();
		assert_eq!(page.meta.number, 1);
		assert!(page.items.is_empty());
	}

	#[tokio::test]
	async fn test_update_post_keeps_identity() {
		let db = test::load_database("update").await;
		let author = test::create_user(&db, "auth").await;
		let group = db.create_group("Cats", "cats", "").await.unwrap();
		let post = db
			.create_post(author.id, "Before", None, Some("posts/a.gif".into()))
			.await
			.unwrap();

		let updated = db
			.update_post(post.id, "After", Some(group.id), None)
			.await
			.unwrap()
			.expect("post disappeared");
		assert_eq!(updated.id, post.id);
		assert_eq!(updated.author_id, author.id);
		assert_eq!(updated.pub_date, post.pub_date);
		assert_eq!(updated.text, "After");
		assert_eq!(updated.group_id, Some(group.id));
		assert_eq!(updated.image.as_deref(), Some("posts/a.gif"));
		assert_eq!(db.count_posts().await.unwrap(), 1);

		assert!(db.update_post(9999, "x", None, None).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_follow_is_idempotent() {
		let db = test::load_database("follow").await;
		let user = test::create_user(&db, "reader").await;
		let author = test::create_user(&db, "writer").await;

		assert_eq!(db.follow(user.id, author.id).await.unwrap(), FollowResult::Created);
		assert_eq!(
			db.follow(user.id, author.id).await.unwrap(),
			FollowResult::AlreadyExists
		);
		assert_eq!(db.count_follows(user.id, author.id).await.unwrap(), 1);
		assert_eq!(db.follow(user.id, user.id).await.unwrap(), FollowResult::SelfFollow);
		assert_eq!(db.count_follows(user.id, user.id).await.unwrap(), 0);

		assert!(db.unfollow(user.id, author.id).await.unwrap());
		assert!(!db.unfollow(user.id, author.id).await.unwrap());
		assert!(!db.is_following(user.id, author.id).await.unwrap());
	}

	#[tokio::test]
	async fn test_follow_feed_only_has_followed_authors() {
		let db = test::load_database("feed").await;
		let reader = test::create_user(&db, "reader").await;
		let followed = test::create_user(&db, "followed").await;
		let other = test::create_user(&db, "other").await;
		db.create_post(followed.id, "Followed post", None, None)
			.await
			.unwrap();
		db.create_post(other.id, "Other post", None, None)
			.await
			.unwrap();

		assert!(db
			.load_follow_page(reader.id, 1, 10)
			.await
			.unwrap()
			.items
			.is_empty());

		db.follow(reader.id, followed.id).await.unwrap();
		let feed = db.load_follow_page(reader.id, 1, 10).await.unwrap();
		assert_eq!(feed.items.len(), 1);
		assert_eq!(feed.items[0].text, "Followed post");
	}

	#[tokio::test]
	async fn test_deletes_cascade() {
		let db = test::load_database("cascade").await;
		let author = test::create_user(&db, "auth").await;
		let commenter = test::create_user(&db, "commenter").await;
		let group = db.create_group("Cats", "cats", "").await.unwrap();

		let grouped = db
			.create_post(author.id, "In group", Some(group.id), None)
			.await
			.unwrap();
		let loose = db.create_post(author.id, "Loose", None, None).await.unwrap();
		db.create_comment(loose.id, commenter.id, "Nice")
			.await
			.unwrap();
		assert_eq!(db.count_comments(loose.id).await.unwrap(), 1);

		assert!(db.delete_group(group.id).await.unwrap());
		assert!(db.find_post(grouped.id).await.unwrap().is_none());
		assert!(db.find_post(loose.id).await.unwrap().is_some());

		assert!(db.delete_user(commenter.id).await.unwrap());
		assert_eq!(db.count_comments(loose.id).await.unwrap(), 0);

		assert!(db.delete_user(author.id).await.unwrap());
		assert_eq!(db.count_posts().await.unwrap(), 0);
	}

	#[tokio::test]
	async fn test_comments_are_listed_oldest_first() {
		let db = test::load_database("comments").await;
		let author = test::create_user(&db, "auth").await;
		let post = db.create_post(author.id, "Post", None, None).await.unwrap();
		db.create_comment(post.id, author.id, "First").await.unwrap();
		db.create_comment(post.id, author.id, "Second").await.unwrap();

		let comments = db.load_comments(post.id).await.unwrap();
		let texts: Vec<&str> = comments.iter().map(|c| c.text.as_str()).collect();
		assert_eq!(texts, vec!["First", "Second"]);
		assert_eq!(comments[0].author_username, "auth");
	}

	#[tokio::test]
	async fn test_usernames_and_slugs_are_unique() {
		let db = test::load_database("unique").await;
		test::create_user(&db, "auth").await;
		assert!(matches!(
			db.create_user("auth", "", "", "hash").await,
			Err(Error::UsernameTaken(_))
		));

		db.create_group("Cats", "cats", "").await.unwrap();
		assert!(matches!(
			db.create_group("Other cats", "cats", "").await,
			Err(Error::SlugTaken(_))
		));
		let updated = db
			.ensure_group("Felines", "cats", "All about cats")
			.await
			.unwrap();
		assert_eq!(updated.title, "Felines");
		assert_eq!(db.load_groups().await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_sessions() {
		let db = test::load_database("sessions").await;
		let user = test::create_user(&db, "auth").await;
		db.create_session(user.id, "token").await.unwrap();

		let found = db.find_session_user("token").await.unwrap();
		assert_eq!(found.map(|u| u.id), Some(user.id));
		assert!(db.find_session_user("other").await.unwrap().is_none());

		assert!(db.delete_session("token").await.unwrap());
		assert!(db.find_session_user("token").await.unwrap().is_none());
	}
}
