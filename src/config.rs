use serde::Deserialize;
use std::env;

/// Remote judge endpoint settings. The optional api_key/api_host pair is
/// sent as gateway headers when the judge sits behind an API marketplace.
#[derive(Debug, Clone, Deserialize)]
pub struct JudgeConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub api_host: Option<String>,
    pub language_id: u32,
    pub timeout_seconds: u64,
    pub poll_interval_ms: u64,
}

/// Text-generation provider settings for the hint assistant.
#[derive(Debug, Clone, Deserialize)]
pub struct AssistConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub mongo_database: String,
    pub redis_uri: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub submit_cooldown_seconds: i64,
    pub judge: JudgeConfig,
    pub assist: AssistConfig,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env_name = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env_name)).required(false), // Allow missing config file, fallback to ENV
            )
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017/codeclass".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "codeclass".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string());

        let jwt_secret = settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
            .unwrap_or_else(|_| {
                if env_name == "prod" {
                    panic!("FATAL: JWT_SECRET must be set in production!");
                }
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            });

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let submit_cooldown_seconds = settings
            .get_int("policy.submit_cooldown_seconds")
            .ok()
            .or_else(|| {
                env::var("SUBMIT_COOLDOWN_SECONDS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok())
            })
            .filter(|v| *v > 0)
            .unwrap_or(15);

        let judge = JudgeConfig {
            base_url: settings
                .get_string("judge.base_url")
                .or_else(|_| env::var("JUDGE_BASE_URL"))
                .unwrap_or_else(|_| "https://judge0-ce.p.rapidapi.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: settings
                .get_string("judge.api_key")
                .ok()
                .or_else(|| env::var("JUDGE_API_KEY").ok())
                .filter(|v| !v.trim().is_empty()),
            api_host: settings
                .get_string("judge.api_host")
                .ok()
                .or_else(|| env::var("JUDGE_API_HOST").ok())
                .filter(|v| !v.trim().is_empty()),
            language_id: settings
                .get_int("judge.language_id")
                .ok()
                .or_else(|| {
                    env::var("JUDGE_LANGUAGE_ID")
                        .ok()
                        .and_then(|v| v.parse::<i64>().ok())
                })
                .map(|v| v as u32)
                .unwrap_or(71),
            timeout_seconds: settings
                .get_int("judge.timeout_seconds")
                .ok()
                .map(|v| v as u64)
                .filter(|v| *v > 0)
                .unwrap_or(30),
            poll_interval_ms: settings
                .get_int("judge.poll_interval_ms")
                .ok()
                .map(|v| v as u64)
                .filter(|v| *v > 0)
                .unwrap_or(900),
        };

        let assist = AssistConfig {
            base_url: settings
                .get_string("assist.base_url")
                .or_else(|_| env::var("ASSIST_BASE_URL"))
                .unwrap_or_else(|_| "https://api.openai.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: settings
                .get_string("assist.api_key")
                .or_else(|_| env::var("ASSIST_API_KEY"))
                .unwrap_or_default(),
            model: settings
                .get_string("assist.model")
                .or_else(|_| env::var("ASSIST_MODEL"))
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            timeout_seconds: settings
                .get_int("assist.timeout_seconds")
                .ok()
                .map(|v| v as u64)
                .filter(|v| *v > 0)
                .unwrap_or(20),
        };

        Ok(Config {
            mongo_uri,
            mongo_database,
            redis_uri,
            jwt_secret,
            bind_addr,
            submit_cooldown_seconds,
            judge,
            assist,
        })
    }
}
