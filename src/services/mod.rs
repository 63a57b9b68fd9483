use std::sync::Arc;

use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;

use crate::config::Config;

pub mod ai_client;
pub mod auth_service;
pub mod hint_service;
pub mod judge_client;
pub mod progress_service;
pub mod session_service;
pub mod submission_service;

use ai_client::{HintModel, OpenAiHintModel};
use judge_client::{HttpJudge, JudgeTransport};

pub struct AppState {
    pub config: Config,
    pub mongo: Database,
    pub redis: ConnectionManager,
    /// Wire-level judge transport; swapped for stubs in tests.
    pub judge_transport: Arc<dyn JudgeTransport>,
    /// Text-generation provider behind the hint flow; swapped in tests.
    pub hint_model: Arc<dyn HintModel>,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let judge_transport: Arc<dyn JudgeTransport> = Arc::new(HttpJudge::new(&config.judge));
        let hint_model: Arc<dyn HintModel> = Arc::new(OpenAiHintModel::new(&config.assist));
        Self::with_providers(config, mongo_client, redis_client, judge_transport, hint_model).await
    }

    pub async fn with_providers(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
        judge_transport: Arc<dyn JudgeTransport>,
        hint_model: Arc<dyn HintModel>,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        Ok(Self {
            config,
            mongo,
            redis,
            judge_transport,
            hint_model,
        })
    }
}
