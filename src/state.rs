use std::sync::Arc;

use sqlx::SqlitePool;

use super::{config::Config, database::init_db};

pub struct State {
    pub config: Config,
    pub pool: SqlitePool,
}

impl State {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let pool = init_db(&config.database_url).await;

        Arc::new(Self { config, pool })
    }
}
