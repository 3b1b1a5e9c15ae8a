use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = true)]
	pub id: i64,
	#[sea_orm(unique)]
	pub username: String,
	pub first_name: String,
	pub last_name: String,
	/// The argon2 hash in PHC string format.
	#[serde(skip)]
	pub password_hash: String,
	/// Milliseconds since the UNIX epoch.
	pub date_joined: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(has_many = "super::post::Entity")]
	Post,
	#[sea_orm(has_many = "super::comment::Entity")]
	Comment,
}

impl Related<super::post::Entity> for Entity {
	fn to() -> RelationDef { Relation::Post.def() }
}

impl Related<super::comment::Entity> for Entity {
	fn to() -> RelationDef { Relation::Comment.def() }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
	/// The full name of the user, or the username if no name has been set.
	pub fn display_name(&self) -> String {
		let full_name = format!("{} {}", self.first_name, self.last_name);
		let trimmed = full_name.trim();
		if trimmed.is_empty() {
			self.username.clone()
		} else {
			trimmed.to_string()
		}
	}
}
