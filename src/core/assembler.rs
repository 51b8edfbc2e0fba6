use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::GenerativeConfig;
use crate::error::{GenerativeError, Result};
use crate::logging::Logger;
use crate::log_warn;
use crate::models::{
    Entities, Response, ResponseType, RoutingDecision, RoutingKind, SearchResult, Vehicle,
};

/// Collaborator that turns a prompt plus real catalog rows into prose.
/// The grounding slice is the complete set of rows the completion may
/// mention; the client must not invent vehicles beyond it.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn complete(&self, prompt: &str, grounding: &[Vehicle]) -> Result<String>;
}

/// Builds the final user-facing `Response` from the routing decision and
/// the search outcome.
pub struct ResponseAssembler {
    client: Arc<dyn GenerativeClient>,
    logger: Arc<Logger>,
    config: GenerativeConfig,
}

impl ResponseAssembler {
    pub fn new(
        client: Arc<dyn GenerativeClient>,
        logger: Arc<Logger>,
        config: GenerativeConfig,
    ) -> Self {
        Self {
            client,
            logger,
            config,
        }
    }

    pub async fn assemble(
        &self,
        query: &str,
        routing: &RoutingDecision,
        result: &SearchResult,
        entities: &Entities,
        show_cars: bool,
    ) -> Response {
        match routing.kind {
            RoutingKind::StrictDb | RoutingKind::SoftDb => {
                self.assemble_db(result, entities, show_cars)
            }
            RoutingKind::GenerativeFallback => {
                self.assemble_generative(query, result, entities, show_cars)
                    .await
            }
        }
    }

    fn assemble_db(&self, result: &SearchResult, entities: &Entities, show_cars: bool) -> Response {
        if result.total_count == 0 {
            return Response {
                response_type: ResponseType::NoResults,
                message: no_results_message(result, entities),
                cars: Vec::new(),
                entities: entities.clone(),
                total_count: 0,
                has_more: false,
            };
        }

        let mut message = result.explanation.clone();
        for (i, vehicle) in result.vehicles.iter().enumerate() {
            message.push('\n');
            message.push_str(&format_vehicle_line(i + 1, vehicle));
        }

        Response {
            response_type: ResponseType::CarList,
            message,
            cars: if show_cars {
                result.vehicles.clone()
            } else {
                Vec::new()
            },
            entities: entities.clone(),
            total_count: result.total_count,
            has_more: result.has_more,
        }
    }

    async fn assemble_generative(
        &self,
        query: &str,
        result: &SearchResult,
        entities: &Entities,
        show_cars: bool,
    ) -> Response {
        let grounding: Vec<Vehicle> = result
            .vehicles
            .iter()
            .take(self.config.max_grounding_rows)
            .cloned()
            .collect();
        let prompt = build_prompt(query, &grounding);

        let mut completion = None;
        for attempt in 0..=self.config.max_retries {
            match self.complete_once(&prompt, &grounding).await {
                Ok(text) => {
                    completion = Some(text);
                    break;
                }
                Err(e) => {
                    log_warn!(
                        self.logger,
                        "assembler",
                        "generative attempt {} failed: {e}",
                        attempt + 1
                    );
                }
            }
        }

        let message = completion.unwrap_or_else(|| {
            "Сейчас не получается сформировать развернутый ответ. \
             Попробуйте уточнить запрос, например марку, бюджет или город."
                .to_string()
        });

        Response {
            response_type: ResponseType::LlmAnswerWithCars,
            message,
            cars: if show_cars { grounding } else { Vec::new() },
            entities: entities.clone(),
            total_count: result.total_count,
            has_more: result.has_more,
        }
    }

    async fn complete_once(&self, prompt: &str, grounding: &[Vehicle]) -> Result<String> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let call = self.client.complete(prompt, grounding);
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Ok(text),
            Ok(Ok(_)) => Err(GenerativeError::EmptyCompletion.into()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(GenerativeError::Timeout.into()),
        }
    }
}

/// The prompt lists only rows that exist in the catalog, so the completion
/// has nothing fabricated to lean on.
fn build_prompt(query: &str, grounding: &[Vehicle]) -> String {
    let mut prompt = format!("Запрос пользователя: {query}\n");
    if grounding.is_empty() {
        prompt.push_str(
            "Подходящих автомобилей в каталоге нет. Ответь честно, ничего не выдумывая, \
             и предложи смягчить условия.",
        );
    } else {
        prompt.push_str("Автомобили в наличии (используй только их, не выдумывай другие):\n");
        for (i, vehicle) in grounding.iter().enumerate() {
            prompt.push_str(&format_vehicle_line(i + 1, vehicle));
            prompt.push('\n');
        }
        prompt.push_str("Ответь на запрос, опираясь только на этот список.");
    }
    prompt
}

fn no_results_message(result: &SearchResult, entities: &Entities) -> String {
    let mut message = result.explanation.clone();
    let mut suggestions = Vec::new();
    if !entities.colors.is_empty() {
        suggestions.push("убрать ограничение по цвету");
    }
    if !entities.body_types.is_empty() {
        suggestions.push("рассмотреть другие типы кузова");
    }
    if entities.price_to.is_some() {
        suggestions.push("увеличить бюджет");
    }
    if entities.year_from.is_some() {
        suggestions.push("допустить более ранний год выпуска");
    }
    if suggestions.is_empty() {
        suggestions.push("смягчить условия поиска");
    }
    message.push_str(". Можно попробовать ");
    message.push_str(&suggestions.join(", "));
    message.push('.');
    message
}

fn format_vehicle_line(position: usize, vehicle: &Vehicle) -> String {
    let mut line = format!(
        "{position}. {}, {} г., {} ₽",
        vehicle.title,
        vehicle.manufacture_year,
        format_price(vehicle.price)
    );
    if let Some(city) = &vehicle.city {
        line.push_str(&format!(", {city}"));
    }
    if let Some(mileage) = vehicle.mileage {
        line.push_str(&format!(", пробег {} км", format_price(mileage)));
    }
    line
}

fn format_price(value: i64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    use crate::models::SearchResult;

    fn vehicle(id: i64, title: &str, price: i64) -> Vehicle {
        Vehicle {
            id,
            title: title.to_string(),
            brand: "BMW".to_string(),
            model: "X3".to_string(),
            vin: None,
            color: Some("синий".to_string()),
            price,
            city: Some("Москва".to_string()),
            manufacture_year: 2022,
            body_type: Some("кроссовер".to_string()),
            gear_box_type: Some("автомат".to_string()),
            driving_gear_type: Some("полный".to_string()),
            engine_vol: Some(2.0),
            power: Some(190),
            fuel_type: Some("бензин".to_string()),
            dealer_center: None,
            mileage: None,
            is_used: false,
        }
    }

    fn db_result(vehicles: Vec<Vehicle>) -> SearchResult {
        let total = vehicles.len();
        SearchResult {
            vehicles,
            total_count: total,
            offset: 0,
            limit: 10,
            has_more: false,
            explanation: format!("Найдено предложений: {total}"),
            relaxed_model: false,
            degraded: false,
        }
    }

    fn strict() -> RoutingDecision {
        RoutingDecision {
            kind: RoutingKind::StrictDb,
            is_command: true,
            is_question_list: false,
            has_strict_range: false,
            has_soft_numeric: false,
            has_any_numeric: false,
        }
    }

    fn fallback() -> RoutingDecision {
        RoutingDecision {
            kind: RoutingKind::GenerativeFallback,
            ..strict()
        }
    }

    fn config() -> GenerativeConfig {
        GenerativeConfig {
            timeout_ms: 100,
            max_retries: 1,
            max_grounding_rows: 5,
        }
    }

    struct EchoClient {
        last_prompt: Mutex<Option<String>>,
    }

    #[async_trait]
    impl GenerativeClient for EchoClient {
        async fn complete(&self, prompt: &str, _grounding: &[Vehicle]) -> Result<String> {
            *self.last_prompt.lock().await = Some(prompt.to_string());
            Ok("ответ".to_string())
        }
    }

    struct FlakyClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerativeClient for FlakyClient {
        async fn complete(&self, _prompt: &str, _grounding: &[Vehicle]) -> Result<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(GenerativeError::Service("connection reset".to_string()).into())
            } else {
                Ok("со второй попытки".to_string())
            }
        }
    }

    struct SlowClient;

    #[async_trait]
    impl GenerativeClient for SlowClient {
        async fn complete(&self, _prompt: &str, _grounding: &[Vehicle]) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("слишком поздно".to_string())
        }
    }

    fn assembler(client: Arc<dyn GenerativeClient>) -> ResponseAssembler {
        ResponseAssembler::new(client, Arc::new(Logger::disabled()), config())
    }

    #[tokio::test]
    async fn db_route_formats_numbered_lines() {
        let a = assembler(Arc::new(EchoClient {
            last_prompt: Mutex::new(None),
        }));
        let result = db_result(vec![vehicle(1, "BMW X3", 5_000_000)]);
        let response = a
            .assemble("найди бмв", &strict(), &result, &Entities::default(), true)
            .await;

        assert_eq!(response.response_type, ResponseType::CarList);
        assert!(response.message.contains("1. BMW X3, 2022 г., 5 000 000 ₽, Москва"));
        assert_eq!(response.cars.len(), 1);
    }

    #[tokio::test]
    async fn show_cars_false_strips_the_payload() {
        let a = assembler(Arc::new(EchoClient {
            last_prompt: Mutex::new(None),
        }));
        let result = db_result(vec![vehicle(1, "BMW X3", 5_000_000)]);
        let response = a
            .assemble("найди бмв", &strict(), &result, &Entities::default(), false)
            .await;
        assert!(response.cars.is_empty());
        assert_eq!(response.total_count, 1);
    }

    #[tokio::test]
    async fn zero_rows_suggest_concrete_relaxations() {
        let a = assembler(Arc::new(EchoClient {
            last_prompt: Mutex::new(None),
        }));
        let mut result = db_result(Vec::new());
        result.explanation = "По заданным условиям ничего не найдено".to_string();
        let entities = Entities {
            colors: vec!["красный".to_string()],
            price_to: Some(1_000_000),
            ..Default::default()
        };
        let response = a
            .assemble("найди красную до миллиона", &strict(), &result, &entities, true)
            .await;

        assert_eq!(response.response_type, ResponseType::NoResults);
        assert!(response.message.contains("цвету"));
        assert!(response.message.contains("бюджет"));
    }

    #[tokio::test]
    async fn generative_prompt_contains_only_real_rows() {
        let client = Arc::new(EchoClient {
            last_prompt: Mutex::new(None),
        });
        let a = assembler(client.clone());
        let result = db_result(vec![vehicle(1, "BMW X3", 5_000_000)]);
        let response = a
            .assemble(
                "что посоветуете из бмв",
                &fallback(),
                &result,
                &Entities::default(),
                true,
            )
            .await;

        assert_eq!(response.response_type, ResponseType::LlmAnswerWithCars);
        assert_eq!(response.message, "ответ");
        let prompt = client.last_prompt.lock().await.clone().unwrap();
        assert!(prompt.contains("BMW X3"));
        assert!(prompt.contains("не выдумывай"));
    }

    #[tokio::test]
    async fn one_retry_recovers_from_transient_failure() {
        let client = Arc::new(FlakyClient {
            calls: AtomicUsize::new(0),
        });
        let a = assembler(client.clone());
        let result = db_result(Vec::new());
        let response = a
            .assemble("посоветуй", &fallback(), &result, &Entities::default(), true)
            .await;

        assert_eq!(response.message, "со второй попытки");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn timeout_degrades_to_safe_message() {
        let a = assembler(Arc::new(SlowClient));
        let result = db_result(Vec::new());
        let response = a
            .assemble("посоветуй", &fallback(), &result, &Entities::default(), true)
            .await;

        assert_eq!(response.response_type, ResponseType::LlmAnswerWithCars);
        assert!(!response.message.is_empty());
        assert!(response.message.contains("уточнить"));
    }

    #[test]
    fn price_grouping_inserts_spaces() {
        assert_eq!(format_price(999), "999");
        assert_eq!(format_price(85_000), "85 000");
        assert_eq!(format_price(5_000_000), "5 000 000");
    }
}
