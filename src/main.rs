use std::{
	env, fmt,
	fs::File,
	io::{self, prelude::*},
	path::{Path, PathBuf},
	process,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use chronicle::{
	config::{self, Config},
	db::{self, Database, PersistenceHandle},
	migration::Migrations,
	web::{self, Global},
};
use log::*;
use signal_hook::flag;


/// The first command-line argument overrides the configuration file path.
/// Otherwise the user's own configuration file is used when it exists, and the
/// system-wide one when it doesn't.
fn config_path() -> PathBuf {
	if let Some(arg) = env::args_os().nth(1) {
		return PathBuf::from(arg);
	}

	if let Some(mut user_path) = dirs::config_dir() {
		user_path.push("chronicle");
		user_path.push("config.toml");
		if user_path.exists() {
			return user_path;
		}
	}
	PathBuf::from(config::CONFIG_FILE_PATH)
}

fn initialize_logging() {
	let result = env::var_os("SYSTEM_LOG_FILE").map(|os| PathBuf::from(os));

	if let Some(filename) = result {
		if let Err(e) = simple_logging::log_to_file(&filename, LevelFilter::Debug) {
			eprintln!("Unable to log to {}: {}", filename.display(), e);
			process::exit(1);
		}
	} else {
		env_logger::init()
	}
}

fn load_config<P>(path: P) -> Option<Config>
where
	P: AsRef<Path> + fmt::Debug,
{
	let mut file = match File::open(&path) {
		Err(e) => match e.kind() {
			io::ErrorKind::NotFound => {
				error!("Config file {:?} not found!", path);
				return None;
			}
			_ => {
				error!("Unable to open config file {:?}: {}", path, e);
				return None;
			}
		},
		Ok(f) => f,
	};

	let mut content = String::new();
	if let Err(e) = file.read_to_string(&mut content) {
		error!("Unable to read config file {:?}: {}", path, e);
		return None;
	}

	match toml::from_str(&content) {
		Err(e) => {
			error!("Unable to parse config file {:?}: {}", path, e);
			None
		}
		Ok(c) => Some(c),
	}
}

/// Makes sure the groups of the config file exist, with up-to-date titles and
/// descriptions.
async fn load_group_config(db: &Database, config: &Config) -> db::Result<()> {
	for group in &config.groups {
		let model = db
			.ensure_group(&group.title, &group.slug, &group.description)
			.await?;
		debug!("Group {} ({}) is available", &model.slug, model.id);
	}
	Ok(())
}

fn register_signals(stop_flag: &Arc<AtomicBool>) -> io::Result<()> {
	flag::register(signal_hook::consts::SIGINT, stop_flag.clone())?;
	flag::register(signal_hook::consts::SIGTERM, stop_flag.clone())?;
	let stop_flag2 = stop_flag.clone();
	ctrlc::set_handler(move || {
		stop_flag2.store(true, Ordering::Relaxed);
	})
	.map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

#[tokio::main]
async fn main() {
	initialize_logging();

	// Load config
	let config_path = config_path();
	let config = match load_config(&config_path) {
		Some(c) => c,
		None => process::exit(1),
	};

	// Catch signals
	let stop_flag = Arc::new(AtomicBool::new(false));
	if let Err(e) = register_signals(&stop_flag) {
		error!("Unable to register signal handlers: {}", e);
		process::exit(1);
	}

	// Load database
	let db = match Database::load(PathBuf::from(&config.database_path)).await {
		Ok(db) => db,
		Err(e) => {
			error!("Unable to load database: {}", e);
			process::exit(1);
		}
	};

	// Run migrations (does nothing if there is nothing to migrate)
	if let Err(e) = Migrations::load().run(&db).await {
		error!("Unable to migrate database: {}", e);
		process::exit(1);
	}

	if let Err(e) = load_group_config(&db, &config).await {
		error!("Unable to load the configured groups: {}", e);
		process::exit(1);
	}

	let global = match Global::new(config, db) {
		Ok(g) => Arc::new(g),
		Err(e) => {
			error!("Unable to load templates: {}", e);
			process::exit(1);
		}
	};

	// Run the web server until it stops because of a signal
	if let Err(e) = web::serve(stop_flag, global).await {
		error!("Web server failed: {}", e);
		process::exit(1);
	}
	info!("Exiting chronicle...");
}
