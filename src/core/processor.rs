use std::sync::Arc;

use crate::cache::{ExtractionCache, ResponseCache};
use crate::config::AppConfig;
use crate::core::assembler::{GenerativeClient, ResponseAssembler};
use crate::core::extractor::EntityExtractor;
use crate::core::router::QueryRouter;
use crate::core::search::SearchEngine;
use crate::database::Database;
use crate::error::Result;
use crate::logging::Logger;
use crate::models::{Entities, Pagination, Response, ResponseType, SortSpec};
use crate::security::RateLimiter;
use crate::{log_debug, log_info, log_warn};

/// The pipeline entry point: rate limit, cache, extract, route, search,
/// assemble. Always produces a `Response`; failures surface as user-safe
/// messages, never as errors.
pub struct QueryProcessor {
    extractor: EntityExtractor,
    router: QueryRouter,
    engine: SearchEngine,
    assembler: ResponseAssembler,
    limiter: RateLimiter,
    response_cache: ResponseCache,
    extraction_cache: ExtractionCache,
    logger: Arc<Logger>,
    config: AppConfig,
}

impl QueryProcessor {
    pub fn new(
        db: Arc<Database>,
        client: Arc<dyn GenerativeClient>,
        logger: Arc<Logger>,
        config: AppConfig,
    ) -> Result<Self> {
        let engine = SearchEngine::new(Arc::clone(&db), Arc::clone(&logger), config.search.clone());
        let assembler =
            ResponseAssembler::new(client, Arc::clone(&logger), config.generative.clone());
        let limiter = RateLimiter::new(config.rate_limit.clone());
        let response_cache = ResponseCache::new(config.cache.max_entries, config.cache_ttl());
        let extraction_cache = ExtractionCache::new(config.cache.max_entries as usize);

        Ok(Self {
            extractor: EntityExtractor::new()?,
            router: QueryRouter::new(),
            engine,
            assembler,
            limiter,
            response_cache,
            extraction_cache,
            logger,
            config,
        })
    }

    pub async fn process(
        &self,
        query: &str,
        hint_entities: Option<&Entities>,
        user_id: &str,
        offset: usize,
        limit: usize,
        show_cars: bool,
    ) -> Response {
        let status = self.limiter.check(user_id);
        if !status.allowed {
            log_warn!(self.logger, "processor", "rate limit hit for user {user_id}");
            return Response {
                response_type: ResponseType::Error,
                message: "Слишком много запросов. Пожалуйста, подождите немного и повторите."
                    .to_string(),
                cars: Vec::new(),
                entities: Entities::default(),
                total_count: 0,
                has_more: false,
            };
        }

        if self.config.cache.enable_response_cache {
            let key = ResponseCache::cache_key(query, offset, limit, show_cars, hint_entities);
            let response = self
                .response_cache
                .get_or_compute(key, self.compute(query, hint_entities, offset, limit, show_cars))
                .await;
            (*response).clone()
        } else {
            let response = self
                .compute(query, hint_entities, offset, limit, show_cars)
                .await;
            (*response).clone()
        }
    }

    async fn compute(
        &self,
        query: &str,
        hint_entities: Option<&Entities>,
        offset: usize,
        limit: usize,
        show_cars: bool,
    ) -> Arc<Response> {
        let mut entities = match self.extraction_cache.get(query).await {
            Some(entities) => {
                log_debug!(self.logger, "processor", "extraction cache hit");
                entities
            }
            None => {
                let entities = self.extractor.extract(query);
                self.extraction_cache.put(query, entities.clone()).await;
                entities
            }
        };
        if let Some(hints) = hint_entities {
            entities.merge_hints(hints);
        }

        let routing = self.router.classify(query, &entities);
        log_info!(
            self.logger,
            "processor",
            "routed {:?}: command={} question_list={} strict_range={} any_numeric={}",
            routing.kind,
            routing.is_command,
            routing.is_question_list,
            routing.has_strict_range,
            routing.has_any_numeric
        );

        let page = Pagination {
            offset,
            limit: limit.clamp(1, self.config.search.max_page_size),
        };
        let result = self.engine.search(&entities, &SortSpec::default(), &page).await;
        let response = self
            .assembler
            .assemble(query, &routing, &result, &entities, show_cars)
            .await;
        Arc::new(response)
    }

    pub async fn invalidate_cache(&self) {
        self.response_cache.invalidate_all().await;
    }
}
