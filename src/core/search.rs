use std::sync::Arc;

use rusqlite::types::Value;

use crate::config::SearchConfig;
use crate::core::synonyms::{Slot, SynonymStore};
use crate::database::operations::{Catalog, PredicateSet};
use crate::database::Database;
use crate::error::{AppError, Result};
use crate::logging::Logger;
use crate::models::{
    Entities, Pagination, SearchResult, SortColumn, SortDirection, SortSpec, Vehicle, VehicleState,
};
use crate::{log_error, log_info, log_warn};

/// Multi-stage candidate filter over the new and used catalogs.
///
/// Owner count, acceleration and seat slots have no catalog columns; queries
/// leaning on them alone are answered by the generative path.
pub struct SearchEngine {
    db: Arc<Database>,
    synonyms: &'static SynonymStore,
    logger: Arc<Logger>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(db: Arc<Database>, logger: Arc<Logger>, config: SearchConfig) -> Self {
        Self {
            db,
            synonyms: SynonymStore::shared(),
            logger,
            config,
        }
    }

    /// Run the filter over both catalogs and merge into one sorted page.
    ///
    /// Catalog failures degrade to an empty result with an explanation; the
    /// caller never sees an error.
    pub async fn search(
        &self,
        entities: &Entities,
        sort: &SortSpec,
        page: &Pagination,
    ) -> SearchResult {
        let mut merged = match self.run_catalogs(entities, true).await {
            Ok(rows) => rows,
            Err(e) => {
                log_error!(self.logger, "search", "catalog query failed: {e}");
                let mut result =
                    SearchResult::empty("Каталог временно недоступен, попробуйте позже");
                result.degraded = true;
                return result;
            }
        };

        let mut relaxed_model = false;
        if merged.is_empty()
            && self.config.relax_model_on_empty
            && entities.brand.is_some()
            && entities.model.is_some()
        {
            match self.run_catalogs(entities, false).await {
                Ok(rows) if !rows.is_empty() => {
                    log_info!(
                        self.logger,
                        "search",
                        "model {:?} matched nothing, relaxed to brand {:?}",
                        entities.model,
                        entities.brand
                    );
                    merged = rows;
                    relaxed_model = true;
                }
                Ok(_) => {}
                Err(e) => {
                    log_warn!(self.logger, "search", "brand-only retry failed: {e}");
                }
            }
        }

        sort_vehicles(&mut merged, sort);

        let total_count = merged.len();
        let limit = page.limit.min(self.config.max_page_size).max(1);
        let offset = page.offset;
        let vehicles: Vec<Vehicle> = merged.into_iter().skip(offset).take(limit).collect();
        let has_more = total_count > offset + limit;

        let explanation = if total_count == 0 {
            "По заданным условиям ничего не найдено".to_string()
        } else if relaxed_model {
            format!(
                "Точной модели нет в наличии, показаны другие автомобили {}",
                entities.brand.as_deref().unwrap_or("этой марки")
            )
        } else {
            format!("Найдено предложений: {total_count}")
        };

        SearchResult {
            vehicles,
            total_count,
            offset,
            limit,
            has_more,
            explanation,
            relaxed_model,
            degraded: false,
        }
    }

    /// Both catalogs concurrently; rows merged in arrival order and sorted
    /// by the caller.
    async fn run_catalogs(&self, entities: &Entities, include_model: bool) -> Result<Vec<Vehicle>> {
        let new_preds = self.build_predicates(entities, Catalog::New, include_model);
        let used_preds = self.build_predicates(entities, Catalog::Used, include_model);

        let db_new = Arc::clone(&self.db);
        let db_used = Arc::clone(&self.db);
        let new_task =
            tokio::task::spawn_blocking(move || db_new.query_catalog(Catalog::New, &new_preds));
        let used_task =
            tokio::task::spawn_blocking(move || db_used.query_catalog(Catalog::Used, &used_preds));

        let (new_rows, used_rows) = tokio::join!(new_task, used_task);
        let mut rows = new_rows.map_err(|e| AppError::Unknown(e.to_string()))??;
        rows.extend(used_rows.map_err(|e| AppError::Unknown(e.to_string()))??);
        Ok(rows)
    }

    /// One AND-ed predicate set per catalog. Each textual slot becomes an
    /// OR-group over its synonym variants; every value is a bound parameter.
    fn build_predicates(
        &self,
        entities: &Entities,
        catalog: Catalog,
        include_model: bool,
    ) -> PredicateSet {
        let mut p = PredicateSet::new();

        match (entities.state, catalog) {
            (Some(VehicleState::New), Catalog::Used) | (Some(VehicleState::Used), Catalog::New) => {
                p.never();
                return p;
            }
            _ => {}
        }

        if let Some(brand) = &entities.brand {
            p.contains_any("brand", &self.synonyms.expand(Slot::Brand, brand));
        }
        if include_model {
            if let Some(model) = &entities.model {
                p.contains_any("model", &self.synonyms.expand(Slot::Model, model));
            }
        }
        if !entities.colors.is_empty() {
            let groups: Vec<Vec<String>> = entities
                .colors
                .iter()
                .map(|c| self.synonyms.expand(Slot::Color, c))
                .collect();
            p.contains_any_grouped("color", &groups);
        }
        if !entities.body_types.is_empty() {
            let variants: Vec<String> = entities
                .body_types
                .iter()
                .flat_map(|b| self.synonyms.expand(Slot::BodyType, b))
                .collect();
            p.contains_any("body_type", &variants);
        }
        if let Some(city) = &entities.city {
            p.contains_any("city", &self.synonyms.expand(Slot::City, city));
        }
        if let Some(fuel) = &entities.fuel_type {
            p.contains_any("fuel_type", &self.synonyms.expand(Slot::FuelType, fuel));
        }
        if let Some(transmission) = &entities.transmission {
            p.contains_any(
                "gear_box_type",
                &self.synonyms.expand(Slot::Transmission, transmission),
            );
        }
        if let Some(drive) = &entities.drive_type {
            p.contains_any(
                "driving_gear_type",
                &self.synonyms.expand(Slot::DriveType, drive),
            );
        }

        if let Some(from) = entities.price_from {
            p.at_least("price", Value::Integer(from));
        }
        if let Some(to) = entities.price_to {
            p.at_most("price", Value::Integer(to));
        }
        if let Some(exact) = entities.power_exact {
            p.equals("power", Value::Integer(exact));
        } else {
            if let Some(from) = entities.power_from {
                p.at_least("power", Value::Integer(from));
            }
            if let Some(to) = entities.power_to {
                p.at_most("power", Value::Integer(to));
            }
        }
        if let Some(from) = entities.year_from {
            p.at_least("manufacture_year", Value::Integer(from as i64));
        }
        if let Some(to) = entities.year_to {
            p.at_most("manufacture_year", Value::Integer(to as i64));
        }
        if let Some(exact) = entities.engine_vol_exact {
            p.close_to("engine_vol", exact);
        } else {
            if let Some(from) = entities.engine_vol_from {
                p.at_least("engine_vol", Value::Real(from));
            }
            if let Some(to) = entities.engine_vol_to {
                p.at_most("engine_vol", Value::Real(to));
            }
        }

        match catalog {
            Catalog::New => {
                // A minimum-mileage filter can only match the used catalog.
                if entities.mileage_from.is_some() {
                    p.never();
                }
            }
            Catalog::Used => {
                if let Some(from) = entities.mileage_from {
                    p.at_least("mileage", Value::Integer(from));
                }
                if let Some(to) = entities.mileage_to {
                    p.at_most("mileage", Value::Integer(to));
                }
            }
        }

        p
    }
}

fn sort_key(vehicle: &Vehicle, column: SortColumn) -> i64 {
    match column {
        SortColumn::Price => vehicle.price,
        SortColumn::Year => vehicle.manufacture_year as i64,
        SortColumn::Power => vehicle.power.unwrap_or(0),
        SortColumn::Mileage => vehicle.mileage.unwrap_or(0),
    }
}

fn sort_vehicles(vehicles: &mut [Vehicle], sort: &SortSpec) {
    vehicles.sort_by(|a, b| {
        let ord = sort_key(a, sort.column).cmp(&sort_key(b, sort.column));
        let ord = match sort.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        };
        // Equal keys resolve by row id so pagination stays stable.
        ord.then(a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::operations::test_support::seed;

    fn engine(db: Arc<Database>) -> SearchEngine {
        SearchEngine::new(
            db,
            Arc::new(Logger::disabled()),
            SearchConfig {
                default_page_size: 10,
                max_page_size: 50,
                relax_model_on_empty: true,
            },
        )
    }

    fn catalog() -> Arc<Database> {
        let db = Database::in_memory().unwrap();
        let mut x3 = seed("BMW", "X3", 5_000_000);
        x3.color = Some("синий".to_string());
        db.insert_vehicle(Catalog::New, &x3).unwrap();

        let mut vesta = seed("Lada", "Vesta", 1_400_000);
        vesta.color = Some("белый".to_string());
        vesta.power = Some(106);
        db.insert_vehicle(Catalog::New, &vesta).unwrap();

        let mut used_x3 = seed("BMW", "X3", 3_200_000);
        used_x3.color = Some("красный".to_string());
        used_x3.manufacture_year = 2019;
        used_x3.mileage = Some(78_000);
        db.insert_vehicle(Catalog::Used, &used_x3).unwrap();

        Arc::new(db)
    }

    #[tokio::test]
    async fn merges_both_catalogs_sorted_by_price() {
        let engine = engine(catalog());
        let entities = Entities {
            brand: Some("BMW".to_string()),
            ..Default::default()
        };
        let result = engine
            .search(&entities, &SortSpec::default(), &Pagination::default())
            .await;

        assert_eq!(result.total_count, 2);
        assert_eq!(result.vehicles[0].price, 3_200_000);
        assert!(result.vehicles[0].is_used);
        assert_eq!(result.vehicles[1].price, 5_000_000);
        assert!(!result.relaxed_model);
    }

    #[tokio::test]
    async fn brand_synonyms_reach_latin_catalog_values() {
        let engine = engine(catalog());
        // Canonical value as the extractor produces it.
        let entities = Entities {
            brand: Some("Lada".to_string()),
            ..Default::default()
        };
        let result = engine
            .search(&entities, &SortSpec::default(), &Pagination::default())
            .await;
        assert_eq!(result.total_count, 1);
        assert_eq!(result.vehicles[0].model, "Vesta");
    }

    #[tokio::test]
    async fn missing_model_relaxes_to_brand() {
        let engine = engine(catalog());
        let entities = Entities {
            brand: Some("BMW".to_string()),
            model: Some("X5".to_string()),
            ..Default::default()
        };
        let result = engine
            .search(&entities, &SortSpec::default(), &Pagination::default())
            .await;

        assert!(result.relaxed_model);
        assert_eq!(result.total_count, 2);
        assert!(result.explanation.contains("BMW"));
    }

    #[tokio::test]
    async fn state_filter_short_circuits_one_catalog() {
        let engine = engine(catalog());
        let entities = Entities {
            brand: Some("BMW".to_string()),
            state: Some(VehicleState::New),
            ..Default::default()
        };
        let result = engine
            .search(&entities, &SortSpec::default(), &Pagination::default())
            .await;
        assert_eq!(result.total_count, 1);
        assert!(!result.vehicles[0].is_used);
    }

    #[tokio::test]
    async fn multiple_colors_use_or_semantics() {
        let db = catalog();
        // A two-tone row must match through the красный variant group.
        let mut two_tone = seed("BMW", "X6", 7_500_000);
        two_tone.color = Some("черный с красным".to_string());
        db.insert_vehicle(Catalog::New, &two_tone).unwrap();

        let engine = engine(db);
        let entities = Entities {
            colors: vec!["красный".to_string(), "белый".to_string()],
            ..Default::default()
        };
        let result = engine
            .search(&entities, &SortSpec::default(), &Pagination::default())
            .await;
        assert_eq!(result.total_count, 3);
        assert!(result.vehicles.iter().any(|v| v.model == "X6"));
    }

    #[tokio::test]
    async fn minimum_mileage_excludes_new_catalog() {
        let engine = engine(catalog());
        let entities = Entities {
            mileage_from: Some(50_000),
            ..Default::default()
        };
        let result = engine
            .search(&entities, &SortSpec::default(), &Pagination::default())
            .await;
        assert_eq!(result.total_count, 1);
        assert!(result.vehicles[0].is_used);
    }

    #[tokio::test]
    async fn pagination_reports_total_and_has_more() {
        let engine = engine(catalog());
        let result = engine
            .search(
                &Entities::default(),
                &SortSpec::default(),
                &Pagination {
                    offset: 0,
                    limit: 2,
                },
            )
            .await;
        assert_eq!(result.total_count, 3);
        assert_eq!(result.vehicles.len(), 2);
        assert!(result.has_more);

        let last_page = engine
            .search(
                &Entities::default(),
                &SortSpec::default(),
                &Pagination {
                    offset: 2,
                    limit: 2,
                },
            )
            .await;
        assert_eq!(last_page.vehicles.len(), 1);
        assert!(!last_page.has_more);
    }

    #[tokio::test]
    async fn descending_year_sort_with_id_tie_break() {
        let engine = engine(catalog());
        let result = engine
            .search(
                &Entities::default(),
                &SortSpec {
                    column: SortColumn::Year,
                    direction: SortDirection::Descending,
                },
                &Pagination::default(),
            )
            .await;
        // Two 2022 rows (ids 1, 2 in the new catalog) ahead of the 2019 one.
        assert_eq!(result.vehicles[0].manufacture_year, 2022);
        assert_eq!(result.vehicles[0].id, 1);
        assert_eq!(result.vehicles[2].manufacture_year, 2019);
    }

    #[tokio::test]
    async fn zero_match_numeric_filter_yields_empty_explanation() {
        let engine = engine(catalog());
        let entities = Entities {
            price_to: Some(100_000),
            ..Default::default()
        };
        let result = engine
            .search(&entities, &SortSpec::default(), &Pagination::default())
            .await;
        assert_eq!(result.total_count, 0);
        assert!(!result.degraded);
        assert!(result.explanation.contains("ничего не найдено"));
    }
}
