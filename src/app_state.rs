use std::sync::Arc;

use tera::Tera;

use crate::config::Config;
use crate::db::MongoDB;
use crate::email::Mailer;
use crate::gemini::GeminiClient;
use crate::identity::IdentityClient;
use crate::stats::StatsCache;

#[derive(Clone)]
pub struct AppState {
    pub mongodb: Arc<MongoDB>,
    pub config: Config,
    pub identity: IdentityClient,
    pub gemini: GeminiClient,
    pub mailer: Mailer,
    pub templates: Arc<Tera>,
    pub stats_cache: Arc<StatsCache>,
}

impl AppState {
    /// Wires the outbound clients around one shared connection pool.
    pub fn new(
        mongodb: Arc<MongoDB>,
        config: Config,
        http_client: reqwest::Client,
        templates: Tera,
    ) -> Self {
        AppState {
            identity: IdentityClient::new(
                http_client.clone(),
                &config.identity_url,
                &config.identity_anon_key,
            ),
            gemini: GeminiClient::new(
                http_client.clone(),
                &config.gemini_endpoint,
                config.gemini_api_key.clone(),
                config.llm_temperature,
                config.llm_max_tokens,
            ),
            mailer: Mailer::new(
                http_client,
                &config.email_api_url,
                config.email_api_key.clone(),
                &config.email_from,
            ),
            mongodb,
            config,
            templates: Arc::new(templates),
            stats_cache: Arc::new(StatsCache::default()),
        }
    }

    /// State over the test config. The Mongo client connects lazily, so
    /// handlers that never touch the store work without a server.
    #[cfg(test)]
    pub(crate) async fn for_tests() -> Self {
        Self::for_tests_with_store(&crate::config::test_config().mongo_uri).await
    }

    /// Every store call fails quickly: nothing listens on the port.
    #[cfg(test)]
    pub(crate) async fn for_tests_with_store_down() -> Self {
        Self::for_tests_with_store(
            "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=300&connectTimeoutMS=300",
        )
        .await
    }

    #[cfg(test)]
    async fn for_tests_with_store(mongo_uri: &str) -> Self {
        let mut config = crate::config::test_config();
        config.mongo_uri = mongo_uri.to_string();
        let mongodb = MongoDB::init(&config.mongo_uri, &config.database_name)
            .await
            .unwrap();
        let templates = crate::templates::load().unwrap();
        AppState::new(Arc::new(mongodb), config, reqwest::Client::new(), templates)
    }
}
