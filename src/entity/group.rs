//! A group is a topical category that posts can optionally be filed under.
use std::fmt;

use sea_orm::entity::prelude::*;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize)]
#[sea_orm(table_name = "post_group")]
pub struct Model {
	#[sea_orm(primary_key, auto_increment = true)]
	pub id: i64,
	pub title: String,
	#[sea_orm(unique)]
	pub slug: String,
	pub description: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
	#[sea_orm(has_many = "super::post::Entity")]
	Post,
}

impl Related<super::post::Entity> for Entity {
	fn to() -> RelationDef { Relation::Post.def() }
}

impl ActiveModelBehavior for ActiveModel {}

impl fmt::Display for Model {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.title) }
}


#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_group_is_shown_by_title() {
		let group = Model {
			id: 1,
			title: "Тестовая группа".into(),
			slug: "test-slug".into(),
			description: "Тестовое описание".into(),
		};
		assert_eq!(group.to_string(), "Тестовая группа");
	}
}
