//! The bootstrap schema of a fresh database. Everything else is created by the
//! migrations, which take off from version v0.0.
pub const QUERY: &'static str = r#"
	CREATE TABLE IF NOT EXISTS version (
		major INTEGER NOT NULL,
		minor INTEGER NOT NULL
	);
	INSERT INTO version (major, minor)
		SELECT 0, 0 WHERE NOT EXISTS (SELECT 1 FROM version);
"#;
