use async_trait::async_trait;
use sea_orm::{sea_query::Index, ConnectionTrait, EntityTrait, Schema};

use super::MigrationTrait;
use crate::{
	db::{self, PersistenceHandle},
	entity::{comment, follow, group, post, session, user},
};


pub struct Migration;


async fn create_table<E>(tx: &db::Transaction, schema: &Schema, entity: E) -> db::Result<()>
where
	E: EntityTrait,
{
	let stat = schema.create_table_from_entity(entity);
	tx.inner().execute(tx.backend().build(&stat)).await?;
	Ok(())
}


#[async_trait]
impl MigrationTrait for Migration {
	async fn run(&self, tx: &db::Transaction) -> db::Result<()> {
		let schema = Schema::new(tx.backend());

		create_table(tx, &schema, user::Entity).await?;
		create_table(tx, &schema, group::Entity).await?;
		create_table(tx, &schema, post::Entity).await?;
		create_table(tx, &schema, comment::Entity).await?;
		create_table(tx, &schema, follow::Entity).await?;
		create_table(tx, &schema, session::Entity).await?;

		// A user can only follow an author once
		let stat = Index::create()
			.name("idx_follow_user_author")
			.table(follow::Entity)
			.col(follow::Column::UserId)
			.col(follow::Column::AuthorId)
			.unique()
			.to_owned();
		tx.inner().execute(tx.backend().build(&stat)).await?;

		// The listings are always sorted on publication date
		let stat = Index::create()
			.name("idx_post_pub_date")
			.table(post::Entity)
			.col(post::Column::PubDate)
			.to_owned();
		tx.inner().execute(tx.backend().build(&stat)).await?;

		let stat = Index::create()
			.name("idx_comment_post")
			.table(comment::Entity)
			.col(comment::Column::PostId)
			.to_owned();
		tx.inner().execute(tx.backend().build(&stat)).await?;
		Ok(())
	}
}
