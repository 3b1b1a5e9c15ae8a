//! Password hashing, session tokens and the rules for usernames.
use argon2::{
	password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
	Argon2,
};
use base58::ToBase58;
use rand::{prelude::*, rngs::OsRng};
use thiserror::Error;


/// The name of the cookie that holds the session token.
pub const SESSION_COOKIE: &str = "sessionid";
pub const USERNAME_MAX_LENGTH: usize = 150;

#[derive(Debug, Error)]
pub enum Error {
	#[error("unable to hash password: {0}")]
	Hash(argon2::password_hash::Error),
}


pub fn hash_password(password: &str) -> Result<String, Error> {
	let salt = SaltString::generate(&mut OsRng);
	let hash = Argon2::default()
		.hash_password(password.as_bytes(), &salt)
		.map_err(Error::Hash)?;
	Ok(hash.to_string())
}

/// Checks the password against a stored hash. A malformed hash never matches.
pub fn verify_password(password: &str, hash: &str) -> bool {
	match PasswordHash::new(hash) {
		Ok(parsed) => Argon2::default()
			.verify_password(password.as_bytes(), &parsed)
			.is_ok(),
		Err(_) => false,
	}
}

/// Generates a new random session token.
pub fn generate_session_token() -> String {
	let mut bytes = [0u8; 32];
	thread_rng().fill_bytes(&mut bytes);
	bytes.to_base58()
}

/// Usernames consist of letters, digits and the characters `@.+-_`.
pub fn validate_username(username: &str) -> Result<(), &'static str> {
	if username.is_empty() {
		return Err("This field is required.");
	}
	if username.chars().count() > USERNAME_MAX_LENGTH {
		return Err("Ensure this value has at most 150 characters.");
	}
	if !username
		.chars()
		.all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
	{
		return Err(
			"Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ \
			 characters.",
		);
	}
	Ok(())
}
