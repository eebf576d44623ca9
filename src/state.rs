use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::{AggregateScope, Config};
use crate::images::domain::UploadLimits;
use crate::images::storage::FileStore;
use crate::notifications::Notifier;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub files: FileStore,
    pub notifier: Notifier,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        Self {
            files: FileStore::new(config.uploads_path()),
            notifier: Notifier::new(db.clone(), config.mail.clone()),
            db,
            config,
        }
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_files: self.config.storage.max_files,
            max_file_bytes: self.config.storage.max_file_bytes,
        }
    }

    pub fn aggregate_scope(&self) -> AggregateScope {
        self.config.reviews.aggregate_scope
    }
}
