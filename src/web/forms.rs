//! Parsing and validation of the submitted forms.
use std::{
	collections::BTreeMap,
	path::{Path, PathBuf},
};

use ::serde::{Deserialize, Serialize};
use axum::extract::Multipart;
use base58::ToBase58;
use log::*;
use rand::prelude::*;

use super::common::error_response;
use crate::db::{self, PersistenceHandle};


pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
	"Select a valid choice. That choice is not one of the available choices.";
pub const INVALID_IMAGE: &str =
	"Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

/// Field name -> error messages.
pub type FormErrors = BTreeMap<&'static str, Vec<String>>;

pub struct UploadedImage {
	pub file_name: String,
	pub content_type: Option<String>,
	pub data: Vec<u8>,
}

/// The raw input of the post form, as submitted.
#[derive(Default)]
pub struct PostForm {
	pub text: String,
	pub group: String,
	pub image: Option<UploadedImage>,
}

/// The values that get put back into the form when it is re-rendered.
#[derive(Default, Serialize)]
pub struct PostFormValues {
	pub text: String,
	pub group: String,
}

pub struct ValidPost {
	pub text: String,
	pub group_id: Option<i64>,
	pub image: Option<UploadedImage>,
}

#[derive(Default, Deserialize)]
pub struct CommentForm {
	#[serde(default)]
	pub text: String,
}


impl PostForm {
	pub async fn parse(mut form: Multipart) -> Result<Self, axum::response::Response> {
		let mut result = Self::default();

		// Collect the form fields
		loop {
			let field = match form.next_field().await {
				Ok(Some(f)) => f,
				Ok(None) => break,
				Err(e) => return Err(error_response(400, format!("Malformed form data: {}", e))),
			};
			let name = field.name().unwrap_or_default().to_string();

			match name.as_str() {
				"text" | "group" => {
					let value = field
						.text()
						.await
						.map_err(|e| error_response(400, format!("Malformed form field: {}", e)))?;
					if name == "text" {
						result.text = value;
					} else {
						result.group = value;
					}
				}
				"image" => {
					let file_name = field.file_name().unwrap_or_default().to_string();
					let content_type = field.content_type().map(|s| s.to_string());
					let data = field
						.bytes()
						.await
						.map_err(|e| error_response(400, format!("Malformed upload: {}", e)))?;
					if data.len() == 0 && file_name.is_empty() {
						debug!("Ignoring empty image field.");
						continue;
					}
					result.image = Some(UploadedImage {
						file_name,
						content_type,
						data: data.to_vec(),
					});
				}
				other => warn!("Unrecognized post form field: {}", other),
			}
		}
		Ok(result)
	}

	pub fn values(&self) -> PostFormValues {
		PostFormValues {
			text: self.text.clone(),
			group: self.group.clone(),
		}
	}

	/// Validates the form, the group needs to exist in the database.
	pub async fn validate(
		self, db: &impl PersistenceHandle,
	) -> db::Result<Result<ValidPost, FormErrors>> {
		let mut errors = FormErrors::new();

		let text = self.text.trim().to_string();
		if text.is_empty() {
			errors.entry("text").or_default().push(REQUIRED.to_string());
		}

		let group_raw = self.group.trim();
		let group_id = if group_raw.is_empty() {
			None
		} else {
			match group_raw.parse::<i64>() {
				Ok(id) if db.find_group(id).await?.is_some() => Some(id),
				_ => {
					errors
						.entry("group")
						.or_default()
						.push(INVALID_CHOICE.to_string());
					None
				}
			}
		};

		if let Some(image) = &self.image {
			let is_image = image
				.content_type
				.as_deref()
				.map(|t| t.starts_with("image/"))
				.unwrap_or(false);
			if !is_image || image.data.is_empty() {
				errors
					.entry("image")
					.or_default()
					.push(INVALID_IMAGE.to_string());
			}
		}

		if errors.is_empty() {
			Ok(Ok(ValidPost {
				text,
				group_id,
				image: self.image,
			}))
		} else {
			Ok(Err(errors))
		}
	}
}

/// Replaces anything that isn't safe in a file name, and drops any directory
/// components.
pub fn sanitize_file_name(file_name: &str) -> String {
	let base = Path::new(file_name)
		.file_name()
		.map(|n| n.to_string_lossy().to_string())
		.unwrap_or_default();
	let cleaned: String = base
		.chars()
		.map(|c| {
			if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
				c
			} else {
				'_'
			}
		})
		.collect();
	let trimmed = cleaned.trim_start_matches('.');
	if trimmed.is_empty() {
		"image".to_string()
	} else {
		trimmed.to_string()
	}
}

/// Stores the uploaded image in the `posts` folder of the media folder, and
/// returns its path relative to the media folder. If a file with the same name
/// already exists, a random suffix is added.
pub async fn store_image(media_path: &Path, image: &UploadedImage) -> std::io::Result<String> {
	let folder = media_path.join("posts");
	tokio::fs::create_dir_all(&folder).await?;

	let file_name = sanitize_file_name(&image.file_name);
	let mut candidate = file_name.clone();
	while tokio::fs::try_exists(folder.join(&candidate)).await? {
		let path = PathBuf::from(&file_name);
		let stem = path
			.file_stem()
			.map(|s| s.to_string_lossy().to_string())
			.unwrap_or_default();
		let mut suffix = [0u8; 5];
		thread_rng().fill_bytes(&mut suffix);
		candidate = match path.extension() {
			Some(ext) => format!("{}_{}.{}", stem, suffix.to_base58(), ext.to_string_lossy()),
			None => format!("{}_{}", stem, suffix.to_base58()),
		};
	}

	tokio::fs::write(folder.join(&candidate), &image.data).await?;
	Ok(format!("posts/{}", candidate))
}
