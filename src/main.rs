use campus::orm::{Db, apply_migration_files, auto_migrate};
use campus::router::AppState;
use campus::settings::Settings;
use campus::urls::build_router;
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CAMPUS_SETTINGS").ok());
    let settings = match settings_path {
        Some(path) => {
            log::info!("Loading settings from {}", path);
            Settings::load(&path)?
        }
        None => Settings::default(),
    };

    let db = Arc::new(Db::connect(&settings.database_url).await?);
    auto_migrate(db.clone()).await?;
    if let Some(dir) = &settings.migrations_dir {
        if Path::new(dir).is_dir() {
            let applied = apply_migration_files(db.clone(), dir).await?;
            log::info!("Applied {} migration file(s) from {}", applied, dir);
        }
    }

    let router = build_router(AppState::new(db, settings.clone()));
    router.run(&settings).await
}
