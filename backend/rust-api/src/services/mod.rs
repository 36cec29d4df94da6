use std::sync::Arc;

use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;

use crate::config::Config;
use self::game_service::GameService;
use self::identity::MongoIdentityProvider;
use self::profile_service::MongoProfileAggregator;
use self::question_source::MongoQuestionSource;
use self::session_store::MongoSessionStore;

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    pub redis: ConnectionManager,
    pub game: GameService,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");
        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        // Verify the connection before serving traffic
        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;
        tracing::info!("Redis connection established");

        session_store::ensure_indexes(&mongo).await?;

        let game = GameService::new(
            Arc::new(MongoSessionStore::new(mongo.clone())),
            Arc::new(MongoQuestionSource::new(mongo.clone())),
            Arc::new(MongoProfileAggregator::new(mongo.clone())),
            Arc::new(MongoIdentityProvider::new(mongo.clone())),
        );

        Ok(Self {
            config,
            mongo,
            redis,
            game,
        })
    }
}

pub mod game_service;
pub mod identity;
pub mod profile_service;
pub mod question_source;
pub mod session_store;
