use crate::core::synonyms::fold;
use crate::models::{Entities, RoutingDecision, RoutingKind};

/// Imperative verbs: these always demand a database answer.
static COMMAND_STEMS: &[&str] = &[
    "найди", "найдите", "найти", "покажи", "покажите", "подбери", "подберите", "выведи",
    "выведите",
];

static QUESTION_MARKERS: &[&str] = &["какие", "какая", "какой"];
static EXISTENCE_VERBS: &[&str] = &["есть", "имеются", "продаются", "бывают"];
static CAR_NOUN_STEMS: &[&str] = &["машин", "авто", "автомобил", "тачк"];

/// Routes a query to the database or the generative fallback, from the
/// extracted entities plus surface lexical cues.
///
/// `classify` is pure: identical `(query, entities)` inputs always produce
/// the identical decision.
pub struct QueryRouter;

impl QueryRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, query: &str, entities: &Entities) -> RoutingDecision {
        let norm = fold(query);
        let words: Vec<&str> = norm
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| !w.is_empty())
            .collect();

        let is_command = words.iter().any(|w| COMMAND_STEMS.contains(w));
        let has_question_marker = words.iter().any(|w| QUESTION_MARKERS.contains(w));
        let has_existence_verb = words.iter().any(|w| EXISTENCE_VERBS.contains(w));
        let has_car_noun = words
            .iter()
            .any(|w| CAR_NOUN_STEMS.iter().any(|stem| w.starts_with(stem)));
        let is_question_list = has_question_marker && has_existence_verb && has_car_noun;

        let has_any_numeric = entities.has_any_numeric();
        let has_strict_range = entities.has_strict_range();
        let has_soft_numeric = has_any_numeric && !has_strict_range;

        // First match wins, top to bottom. The table is total: the final
        // arm keeps the router responsive no matter the input.
        let kind = if is_command {
            RoutingKind::StrictDb
        } else if is_question_list && has_strict_range {
            RoutingKind::StrictDb
        } else if is_question_list && has_soft_numeric {
            RoutingKind::GenerativeFallback
        } else if has_any_numeric {
            RoutingKind::StrictDb
        } else {
            RoutingKind::GenerativeFallback
        };

        RoutingDecision {
            kind,
            is_command,
            is_question_list,
            has_strict_range,
            has_soft_numeric,
            has_any_numeric,
        }
    }
}

impl Default for QueryRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::EntityExtractor;

    fn classify(query: &str) -> RoutingDecision {
        let extractor = EntityExtractor::new().unwrap();
        let entities = extractor.extract(query);
        QueryRouter::new().classify(query, &entities)
    }

    #[test]
    fn command_routes_to_strict_db() {
        let d = classify("найди машину от 160 л.с.");
        assert!(d.is_command);
        assert_eq!(d.kind, RoutingKind::StrictDb);
    }

    #[test]
    fn command_dominates_even_without_numerics() {
        let d = classify("покажи красные машины");
        assert!(d.is_command);
        assert!(!d.has_any_numeric);
        assert_eq!(d.kind, RoutingKind::StrictDb);
    }

    #[test]
    fn question_list_with_soft_numeric_goes_generative() {
        let d = classify("какие машины есть от 160 л.с.");
        assert!(d.is_question_list);
        assert!(d.has_soft_numeric);
        assert!(!d.has_strict_range);
        assert_eq!(d.kind, RoutingKind::GenerativeFallback);
    }

    #[test]
    fn question_list_with_strict_range_goes_to_db() {
        let d = classify("какие машины есть 160-200 л.с.");
        assert!(d.is_question_list);
        assert!(d.has_strict_range);
        assert_eq!(d.kind, RoutingKind::StrictDb);
    }

    #[test]
    fn plain_strict_range_goes_to_db() {
        let d = classify("машины 160-200 л.с.");
        assert!(!d.is_command);
        assert!(!d.is_question_list);
        assert!(d.has_strict_range);
        assert_eq!(d.kind, RoutingKind::StrictDb);
    }

    #[test]
    fn colors_only_goes_generative() {
        let d = classify("красная и синяя");
        assert!(!d.has_any_numeric);
        assert_eq!(d.kind, RoutingKind::GenerativeFallback);
    }

    #[test]
    fn brand_only_goes_generative() {
        let d = classify("бмв");
        assert_eq!(d.kind, RoutingKind::GenerativeFallback);
    }

    #[test]
    fn classification_is_deterministic_and_total() {
        let queries = [
            "",
            "???",
            "найди",
            "какие есть",
            "какие машины есть до 2 млн",
            "от 100 до 200 л.с. и до 3 млн",
            "просто текст ни о чем",
        ];
        for q in queries {
            let first = classify(q);
            let second = classify(q);
            assert_eq!(first, second, "unstable decision for {q:?}");
            assert!(matches!(
                first.kind,
                RoutingKind::StrictDb | RoutingKind::SoftDb | RoutingKind::GenerativeFallback
            ));
        }
    }

    #[test]
    fn question_list_requires_all_three_cues() {
        // Question marker without the car noun is not a list question,
        // so the numeric cue sends it to the database.
        let d = classify("какие есть варианты до 2 млн");
        assert!(!d.is_question_list);
        assert_eq!(d.kind, RoutingKind::StrictDb);
    }
}
