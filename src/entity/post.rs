use std::fmt;

use sea_orm::entity::prelude::*;
use serde::Serialize;

/// The number of characters of the text that represent a post in short form.
pub const SHORT_TEXT_LENGTH: usize = 15;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize)]
#[sea_orm(table_name = "post")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = true)]
	pub id: i64,
	pub text: String,
	/// Milliseconds since the UNIX epoch, set once on creation.
	pub pub_date: i64,
	pub author_id: i64,
	pub group_id: Option<i64>,
	/// Path of the image relative to the media folder.
	pub image: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(
		belongs_to = "super::user::Entity",
		from = "Column::AuthorId",
		to = "super::user::Column::Id",
		on_update = "Cascade",
		on_delete = "Cascade"
	)]
	Author,
	#[sea_orm(
		belongs_to = "super::group::Entity",
		from = "Column::GroupId",
		to = "super::group::Column::Id",
		on_update = "Cascade",
		on_delete = "Cascade"
	)]
	Group,
	#[sea_orm(has_many = "super::comment::Entity")]
	Comment,
}

impl Related<super::user::Entity> for Entity {
	fn to() -> RelationDef { Relation::Author.def() }
}

impl Related<super::group::Entity> for Entity {
	fn to() -> RelationDef { Relation::Group.def() }
}

impl Related<super::comment::Entity> for Entity {
	fn to() -> RelationDef { Relation::Comment.def() }
}

impl ActiveModelBehavior for ActiveModel {}

impl fmt::Display for Model {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let short: String = self.text.chars().take(SHORT_TEXT_LENGTH).collect();
		write!(f, "{}", short)
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	fn post_with_text(text: &str) -> Model {
		Model {
			id: 1,
			text: text.to_string(),
			pub_date: 0,
			author_id: 1,
			group_id: None,
			image: None,
		}
	}

	#[test]
	fn test_short_text_is_cut_at_fifteen_characters() {
		assert_eq!(post_with_text("Short").to_string(), "Short");
		assert_eq!(
			post_with_text("A post that is longer than that").to_string(),
			"A post that is "
		);
		// Characters are counted, not bytes
		assert_eq!(
			post_with_text("Пост о тестировании моделей").to_string(),
			"Пост о тестиров"
		);
	}
}
