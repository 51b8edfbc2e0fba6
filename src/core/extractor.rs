use regex::Regex;

use crate::core::synonyms::{fold, Slot, SynonymStore};
use crate::error::Result;
use crate::models::{Entities, VehicleState};

/// Words that must never become a brand or a free-form model candidate.
static STOPWORDS: &[&str] = &[
    "машина", "машины", "машину", "машин", "машине", "авто", "автомобиль", "автомобили",
    "автомобилей", "тачка", "тачку", "тачки", "купить", "куплю", "продажа", "продаже",
    "есть", "какие", "какая", "какой", "сколько", "найди", "найдите", "найти", "покажи",
    "покажите", "подбери", "подберите", "выведи", "хочу", "нужна", "нужен", "нужны",
    "дайте", "дай", "можно", "пожалуйста", "цвета", "цвет", "цветом", "года", "год",
    "годов", "выпуска", "привод", "приводом", "коробка", "коробкой", "двигатель",
    "двигателем", "объем", "объемом", "мощность", "мощностью", "пробег", "пробегом",
    "салон", "салоном", "новый", "новая", "новое", "новые", "новую", "подержанный",
    "подержанная", "недорого", "дорого", "дешево", "самый", "самая", "самые", "очень",
    "или", "и", "не", "на", "в", "с", "до", "от", "за", "по", "для", "у", "к", "а",
];

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

fn is_numeric_word(word: &str) -> bool {
    !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '.' | ','))
}

#[derive(Debug)]
struct Word {
    text: String,
    consumed: bool,
}

/// Split folded text into words of letters/digits, keeping in-word hyphens
/// and slashes ("х-трейл", "б/у").
fn tokenize(norm: &str) -> Vec<Word> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in norm.chars() {
        if c.is_alphanumeric() || c == '-' || c == '/' {
            current.push(c);
        } else if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
        .into_iter()
        .map(|text| Word {
            text: text.trim_matches(|c| c == '-' || c == '/').to_string(),
            consumed: false,
        })
        .filter(|w| !w.text.is_empty())
        .collect()
}

/// Text with consumable spans: numeric extractors blank what they matched so
/// later patterns cannot re-read the same fragment.
struct Masked {
    chars: Vec<char>,
}

impl Masked {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
        }
    }

    fn text(&self) -> String {
        self.chars.iter().collect()
    }

    fn blank(&mut self, current: &str, byte_range: std::ops::Range<usize>) {
        let start = current[..byte_range.start].chars().count();
        let len = current[byte_range.start..byte_range.end].chars().count();
        for c in self.chars.iter_mut().skip(start).take(len) {
            *c = ' ';
        }
    }
}

fn parse_num(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse().ok()
}

fn price_multiplier(unit: Option<&str>) -> Option<f64> {
    let unit = unit?;
    if unit.starts_with("млн") || unit.starts_with("миллион") {
        Some(1_000_000.0)
    } else if unit.starts_with("тыс") || unit.starts_with("т.") {
        Some(1_000.0)
    } else if unit.starts_with("руб") || unit.starts_with('р') || unit.starts_with('₽') {
        Some(1.0)
    } else {
        None
    }
}

/// Bare numbers at or above this magnitude default to the price slot.
const BARE_PRICE_FLOOR: i64 = 100_000;

struct NumericPatterns {
    accel_sprint: Regex,
    accel_range: Regex,
    accel_from: Regex,
    accel_to: Regex,
    accel_bare: Regex,
    mileage_range: Regex,
    mileage_from: Regex,
    mileage_to: Regex,
    mileage_bare: Regex,
    power_range: Regex,
    power_pair: Regex,
    power_from: Regex,
    power_to: Regex,
    power_exact: Regex,
    engine_range: Regex,
    engine_pair: Regex,
    engine_from: Regex,
    engine_to: Regex,
    engine_exact: Regex,
    owners_one: Regex,
    owners_from: Regex,
    owners_to: Regex,
    owners_count: Regex,
    year_range: Regex,
    year_pair: Regex,
    year_from: Regex,
    year_to: Regex,
    year_bare: Regex,
    seats_num: Regex,
    seats_word: Regex,
    price_range: Regex,
    price_pair: Regex,
    price_from: Regex,
    price_to: Regex,
    price_bare_unit: Regex,
    price_bare_big: Regex,
}

const NUM: &str = r"(\d+(?:[.,]\d+)?)";
const PRICE_NUM: &str = r"(\d{1,3}(?:\s\d{3})+|\d+(?:[.,]\d+)?)";
const PRICE_UNIT: &str = r"(млн\.?|миллиона?|миллионов|тыс\.?|тысячи?|тысяч|т\.\s?р\.?|руб(?:лей|ля)?\.?|р\.|₽)";
const POWER_UNIT: &str = r"(?:л\.?\s?с\.?|лс|сил|лошадиных\s+сил|лошадей)";
const YEAR: &str = r"\b(19\d{2}|20[0-3]\d)\b";

impl NumericPatterns {
    fn compile() -> Result<Self> {
        let p = |s: String| Regex::new(&s).map_err(|e| {
            crate::error::AppError::Unknown(format!("pattern compilation failed: {e}"))
        });
        Ok(Self {
            accel_sprint: p(format!(
                r"(?:разгон\w*\s+)?до\s+(?:100|сотни)\s+за\s+{NUM}\s*(?:сек\w*|с\b)?"
            ))?,
            accel_range: p(format!(r"{NUM}\s*-\s*{NUM}\s*сек\w*"))?,
            accel_from: p(format!(r"от\s+{NUM}\s*сек\w*"))?,
            accel_to: p(format!(r"до\s+{NUM}\s*сек\w*"))?,
            accel_bare: p(format!(r"за\s+{NUM}\s*сек\w*"))?,
            mileage_range: p(format!(
                r"(?:пробег\w*\s+)?от\s+{NUM}\s*(тысяч\w*|тыс\.?)?\s+до\s+{NUM}\s*(тысяч\w*|тыс\.?)?\s*км\b"
            ))?,
            mileage_from: p(format!(
                r"(?:пробег\w*\s+)?от\s+{NUM}\s*(тысяч\w*|тыс\.?)?\s*км\b"
            ))?,
            mileage_to: p(format!(
                r"(?:пробег\w*\s+)?(?:до|не\s+более)\s+{NUM}\s*(тысяч\w*|тыс\.?)?\s*км\b"
            ))?,
            mileage_bare: p(format!(r"пробег\w*\s+{NUM}\s*(тысяч\w*|тыс\.?)?(?:\s*км\b)?"))?,
            power_range: p(format!(r"от\s+{NUM}\s+до\s+{NUM}\s*{POWER_UNIT}"))?,
            power_pair: p(format!(r"{NUM}\s*-\s*{NUM}\s*{POWER_UNIT}"))?,
            power_from: p(format!(r"(?:мощность\w*\s+)?от\s+{NUM}\s*{POWER_UNIT}"))?,
            power_to: p(format!(r"(?:мощность\w*\s+)?до\s+{NUM}\s*{POWER_UNIT}"))?,
            power_exact: p(format!(r"(?:мощность\w*\s+)?{NUM}\s*{POWER_UNIT}"))?,
            engine_range: p(format!(r"от\s+{NUM}\s+до\s+{NUM}\s*л(?:итр\w*)?\b"))?,
            engine_pair: p(format!(r"{NUM}\s*-\s*{NUM}\s*л(?:итр\w*)?\b"))?,
            engine_from: p(format!(r"(?:объем\w*\s+)?от\s+{NUM}\s*л(?:итр\w*)?\b"))?,
            engine_to: p(format!(r"(?:объем\w*\s+)?до\s+{NUM}\s*л(?:итр\w*)?\b"))?,
            engine_exact: p(format!(
                r"(?:объем\w*\s+(?:двигателя\s+)?)?{NUM}\s*л(?:итр\w*)?\b"
            ))?,
            owners_one: p(r"один\s+владелец".to_string())?,
            owners_from: p(format!(r"от\s+{NUM}\s*владель?ц\w*"))?,
            owners_to: p(format!(r"(?:до|не\s+более)\s+{NUM}\s*владель?ц\w*"))?,
            owners_count: p(format!(r"{NUM}\s*владель?ц\w*"))?,
            year_range: p(format!(r"(?:от|с)\s+{YEAR}\s+(?:до|по)\s+{YEAR}(?:\s*год\w*)?"))?,
            year_pair: p(format!(r"{YEAR}\s*-\s*{YEAR}(?:\s*год\w*)?"))?,
            year_from: p(format!(r"(?:от|с|новее)\s+{YEAR}(?:\s*год\w*)?"))?,
            year_to: p(format!(r"(?:до|по|старше)\s+{YEAR}(?:\s*год\w*)?"))?,
            year_bare: p(format!(r"{YEAR}(?:\s*год\w*)?"))?,
            seats_num: p(format!(r"{NUM}\s*мест\w*"))?,
            seats_word: p(r"(пяти|шести|семи|восьми)мест\w*".to_string())?,
            price_range: p(format!(
                r"от\s+{PRICE_NUM}\s*{PRICE_UNIT}?\s+до\s+{PRICE_NUM}\s*{PRICE_UNIT}?"
            ))?,
            price_pair: p(format!(r"{PRICE_NUM}\s*-\s*{PRICE_NUM}\s*{PRICE_UNIT}"))?,
            price_from: p(format!(r"(?:от|дороже)\s+{PRICE_NUM}\s*{PRICE_UNIT}?"))?,
            price_to: p(format!(r"(?:до|дешевле|не\s+дороже)\s+{PRICE_NUM}\s*{PRICE_UNIT}?"))?,
            price_bare_unit: p(format!(r"(?:за\s+)?{PRICE_NUM}\s*{PRICE_UNIT}"))?,
            price_bare_big: p(format!(r"{PRICE_NUM}"))?,
        })
    }
}

/// Rule-based extraction of structured entities from free-form Russian
/// queries. `extract` is pure: no state survives a call, so re-running it on
/// the same text always yields the same entity set.
pub struct EntityExtractor {
    synonyms: &'static SynonymStore,
    patterns: NumericPatterns,
}

impl EntityExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            synonyms: SynonymStore::shared(),
            patterns: NumericPatterns::compile()?,
        })
    }

    /// Never fails: unparseable fragments are simply left out of the result.
    pub fn extract(&self, query: &str) -> Entities {
        let norm = fold(query);
        let mut entities = Entities::default();
        let mut words = tokenize(&norm);

        self.extract_colors(&mut entities, &mut words);
        let brand_index = self.extract_brand(&mut entities, &mut words);
        self.extract_model(&mut entities, &mut words, brand_index);
        self.extract_numeric(&mut entities, &norm);
        self.apply_qualitative(&mut entities, &words);
        self.extract_categorical(&mut entities, &mut words, &norm);
        normalize_ranges(&mut entities);
        entities
    }

    fn available<'a>(words: &'a [Word]) -> (Vec<usize>, Vec<&'a str>) {
        let mut indices = Vec::new();
        let mut texts = Vec::new();
        for (i, w) in words.iter().enumerate() {
            if !w.consumed {
                indices.push(i);
                texts.push(w.text.as_str());
            }
        }
        (indices, texts)
    }

    fn consume_matches(
        &self,
        slot: Slot,
        words: &mut [Word],
        mut on_match: impl FnMut(&'static str),
    ) {
        let (indices, texts) = Self::available(words);
        for m in self.synonyms.match_words(slot, &texts) {
            on_match(m.canonical);
            for k in m.word_index..m.word_index + m.word_count {
                words[indices[k]].consumed = true;
            }
        }
    }

    /// All color mentions, canonicalized, first-appearance order preserved.
    fn extract_colors(&self, entities: &mut Entities, words: &mut [Word]) {
        let mut colors: Vec<String> = Vec::new();
        self.consume_matches(Slot::Color, words, |canonical| {
            if !colors.iter().any(|c| c == canonical) {
                colors.push(canonical.to_string());
            }
        });
        entities.colors = colors;
    }

    /// Exact table lookup first, then the consolidated fuzzy fallback.
    /// Returns the index of the first word the brand mention consumed.
    fn extract_brand(&self, entities: &mut Entities, words: &mut [Word]) -> Option<usize> {
        let (indices, texts) = Self::available(words);
        if let Some(m) = self.synonyms.match_words(Slot::Brand, &texts).first() {
            entities.brand = Some(m.canonical.to_string());
            for k in m.word_index..m.word_index + m.word_count {
                words[indices[k]].consumed = true;
            }
            return Some(indices[m.word_index]);
        }

        for (i, word) in words.iter_mut().enumerate() {
            if word.consumed
                || is_stopword(&word.text)
                || is_numeric_word(&word.text)
                || self.word_belongs_to_other_slot(&word.text)
            {
                continue;
            }
            if let Some(canonical) = self.synonyms.fuzzy_brand(&word.text) {
                entities.brand = Some(canonical.to_string());
                word.consumed = true;
                return Some(i);
            }
        }
        None
    }

    fn word_belongs_to_other_slot(&self, word: &str) -> bool {
        [
            Slot::Model,
            Slot::Color,
            Slot::City,
            Slot::BodyType,
            Slot::FuelType,
            Slot::Transmission,
            Slot::DriveType,
        ]
        .iter()
        .any(|slot| self.synonyms.is_known_variant(*slot, word))
    }

    /// Known models win; composite names are preferred by the table scan.
    /// Without a table hit, the word right after the brand mention becomes a
    /// free-form model unless it is a stopword, a color form, a body-type
    /// word, or a pure number.
    fn extract_model(
        &self,
        entities: &mut Entities,
        words: &mut [Word],
        brand_index: Option<usize>,
    ) {
        let mut model: Option<String> = None;
        self.consume_matches(Slot::Model, words, |canonical| {
            if model.is_none() {
                model = Some(canonical.to_string());
            }
        });

        if model.is_none() && entities.brand.is_some() {
            // Only words after the brand mention can be a free-form model.
            let start = brand_index
                .map(|i| i + 1)
                .unwrap_or(words.len())
                .min(words.len());
            for word in words[start..].iter_mut().filter(|w| !w.consumed) {
                let text = word.text.as_str();
                if is_stopword(text)
                    || is_numeric_word(text)
                    || text.chars().any(|c| c.is_ascii_digit())
                    || text.chars().count() < 2
                    || self.synonyms.is_known_variant(Slot::Color, text)
                    || self.synonyms.is_known_variant(Slot::BodyType, text)
                    || self.synonyms.is_known_variant(Slot::City, text)
                    || self.synonyms.is_known_variant(Slot::FuelType, text)
                    || self.synonyms.is_known_variant(Slot::Transmission, text)
                    || self.synonyms.is_known_variant(Slot::DriveType, text)
                {
                    continue;
                }
                model = Some(text.to_string());
                word.consumed = true;
                break;
            }
        }

        entities.model = model;
    }

    fn extract_numeric(&self, entities: &mut Entities, norm: &str) {
        let mut masked = Masked::new(norm);
        let p = &self.patterns;

        // Acceleration first: it owns the "до 100 за X" form whose numbers
        // would otherwise leak into other fields.
        {
            let text = masked.text();
            if let Some(c) = p.accel_sprint.captures(&text) {
                if let Some(v) = parse_num(&c[1]) {
                    entities.acceleration_to = Some(v);
                    masked.blank(&text, c.get(0).map(|m| m.range()).unwrap_or_default());
                }
            }
        }
        take_pair_f64(&mut masked, &p.accel_range, |a, b| {
            entities.acceleration_from = Some(a);
            entities.acceleration_to = Some(b);
        });
        take_one_f64(&mut masked, &p.accel_from, |v| {
            entities.acceleration_from.get_or_insert(v);
        });
        take_one_f64(&mut masked, &p.accel_to, |v| {
            entities.acceleration_to.get_or_insert(v);
        });
        take_one_f64(&mut masked, &p.accel_bare, |v| {
            entities.acceleration_to.get_or_insert(v);
        });

        // Mileage before price: "до 100 тыс км" must not read as money.
        {
            let text = masked.text();
            if let Some(c) = p.mileage_range.captures(&text) {
                let m1 = if c.get(2).is_some() { 1000.0 } else { 1.0 };
                let m2 = if c.get(4).is_some() { 1000.0 } else { 1.0 };
                if let (Some(a), Some(b)) = (parse_num(&c[1]), parse_num(&c[3])) {
                    entities.mileage_from = Some((a * m1) as i64);
                    entities.mileage_to = Some((b * m2) as i64);
                    masked.blank(&text, c.get(0).map(|m| m.range()).unwrap_or_default());
                }
            }
        }
        take_mileage(&mut masked, &p.mileage_from, &mut entities.mileage_from);
        take_mileage(&mut masked, &p.mileage_to, &mut entities.mileage_to);
        take_mileage(&mut masked, &p.mileage_bare, &mut entities.mileage_to);

        // Power: "л.с." must be consumed before the engine-volume "л".
        take_pair_f64(&mut masked, &p.power_range, |a, b| {
            entities.power_from = Some(a as i64);
            entities.power_to = Some(b as i64);
        });
        take_pair_f64(&mut masked, &p.power_pair, |a, b| {
            entities.power_from = Some(a as i64);
            entities.power_to = Some(b as i64);
        });
        take_one_f64(&mut masked, &p.power_from, |v| {
            entities.power_from.get_or_insert(v as i64);
        });
        take_one_f64(&mut masked, &p.power_to, |v| {
            entities.power_to.get_or_insert(v as i64);
        });
        if entities.power_from.is_none() && entities.power_to.is_none() {
            take_one_f64(&mut masked, &p.power_exact, |v| {
                entities.power_exact.get_or_insert(v as i64);
            });
        }

        // Engine volume: plausible displacements only, so "5 лет" noise or a
        // stray "200 л" cannot land here.
        let vol_ok = |v: f64| v > 0.0 && v <= 10.0;
        take_pair_f64(&mut masked, &p.engine_range, |a, b| {
            if vol_ok(a) && vol_ok(b) {
                entities.engine_vol_from = Some(a);
                entities.engine_vol_to = Some(b);
            }
        });
        take_pair_f64(&mut masked, &p.engine_pair, |a, b| {
            if vol_ok(a) && vol_ok(b) {
                entities.engine_vol_from.get_or_insert(a);
                entities.engine_vol_to.get_or_insert(b);
            }
        });
        take_one_f64_if(&mut masked, &p.engine_from, vol_ok, |v| {
            entities.engine_vol_from.get_or_insert(v);
        });
        take_one_f64_if(&mut masked, &p.engine_to, vol_ok, |v| {
            entities.engine_vol_to.get_or_insert(v);
        });
        if entities.engine_vol_from.is_none() && entities.engine_vol_to.is_none() {
            take_one_f64_if(&mut masked, &p.engine_exact, vol_ok, |v| {
                entities.engine_vol_exact.get_or_insert(v);
            });
        }

        // Owner count.
        {
            let text = masked.text();
            if let Some(m) = p.owners_one.find(&text) {
                entities.owners_count = Some(1);
                masked.blank(&text, m.range());
            }
        }
        take_one_f64(&mut masked, &p.owners_from, |v| {
            entities.owners_from.get_or_insert(v as i64);
        });
        take_one_f64(&mut masked, &p.owners_to, |v| {
            entities.owners_to.get_or_insert(v as i64);
        });
        if entities.owners_from.is_none() && entities.owners_to.is_none() {
            take_one_f64(&mut masked, &p.owners_count, |v| {
                entities.owners_count.get_or_insert(v as i64);
            });
        }

        // Year.
        take_pair_f64(&mut masked, &p.year_range, |a, b| {
            entities.year_from = Some(a as i32);
            entities.year_to = Some(b as i32);
        });
        take_pair_f64(&mut masked, &p.year_pair, |a, b| {
            entities.year_from.get_or_insert(a as i32);
            entities.year_to.get_or_insert(b as i32);
        });
        take_one_f64(&mut masked, &p.year_from, |v| {
            entities.year_from.get_or_insert(v as i32);
        });
        take_one_f64(&mut masked, &p.year_to, |v| {
            entities.year_to.get_or_insert(v as i32);
        });
        if entities.year_from.is_none() && entities.year_to.is_none() {
            take_one_f64(&mut masked, &p.year_bare, |v| {
                entities.year_from = Some(v as i32);
                entities.year_to = Some(v as i32);
            });
        }

        // Seats.
        take_one_f64(&mut masked, &p.seats_num, |v| {
            entities.seats.get_or_insert(v as i64);
        });
        {
            let text = masked.text();
            if let Some(c) = p.seats_word.captures(&text) {
                let n = match &c[1] {
                    "пяти" => 5,
                    "шести" => 6,
                    "семи" => 7,
                    _ => 8,
                };
                entities.seats.get_or_insert(n);
                masked.blank(&text, c.get(0).map(|m| m.range()).unwrap_or_default());
            }
        }

        // Price last: by now everything unit-bearing is consumed, so a
        // currency unit or sheer magnitude is enough to attribute a number.
        self.extract_price(entities, &mut masked);
    }

    fn extract_price(&self, entities: &mut Entities, masked: &mut Masked) {
        let p = &self.patterns;
        {
            let text = masked.text();
            if let Some(c) = p.price_range.captures(&text) {
                let u1 = c.get(2).map(|m| m.as_str());
                let u2 = c.get(4).map(|m| m.as_str());
                // "от 1.5 до 2 млн": a one-sided unit applies to both bounds.
                let m1 = price_multiplier(u1).or_else(|| price_multiplier(u2));
                let m2 = price_multiplier(u2).or_else(|| price_multiplier(u1));
                if let (Some(a), Some(b)) = (parse_num(&c[1]), parse_num(&c[3])) {
                    let from = (a * m1.unwrap_or(1.0)) as i64;
                    let to = (b * m2.unwrap_or(1.0)) as i64;
                    let unit_present = u1.is_some() || u2.is_some();
                    if unit_present || from >= BARE_PRICE_FLOOR || to >= BARE_PRICE_FLOOR {
                        entities.price_from = Some(from);
                        entities.price_to = Some(to);
                        masked.blank(&text, c.get(0).map(|m| m.range()).unwrap_or_default());
                    }
                }
            }
        }
        take_price(masked, &p.price_pair, true, |from, to| {
            entities.price_from.get_or_insert(from);
            entities.price_to.get_or_insert(to);
        });
        take_price_single(masked, &p.price_from, |v| {
            entities.price_from.get_or_insert(v);
        });
        take_price_single(masked, &p.price_to, |v| {
            entities.price_to.get_or_insert(v);
        });
        if entities.price_from.is_none() && entities.price_to.is_none() {
            let text = masked.text();
            if let Some(c) = p.price_bare_unit.captures(&text) {
                if let (Some(v), Some(m)) =
                    (parse_num(&c[1]), price_multiplier(c.get(2).map(|x| x.as_str())))
                {
                    entities.price_to = Some((v * m) as i64);
                    masked.blank(&text, c.get(0).map(|x| x.range()).unwrap_or_default());
                }
            }
        }
        if entities.price_from.is_none() && entities.price_to.is_none() {
            let text = masked.text();
            for c in p.price_bare_big.captures_iter(&text) {
                if let Some(v) = parse_num(&c[1]) {
                    if v as i64 >= BARE_PRICE_FLOOR {
                        entities.price_to = Some(v as i64);
                        break;
                    }
                }
            }
        }
    }

    /// Qualitative adjectives map to default thresholds, applied only when
    /// the explicit numeric entity was not extracted: explicit values win.
    fn apply_qualitative(&self, entities: &mut Entities, words: &[Word]) {
        let no_power = |e: &Entities| {
            e.power_from.is_none() && e.power_to.is_none() && e.power_exact.is_none()
        };
        for word in words {
            let text = word.text.as_str();
            if text.starts_with("недорог") || text.starts_with("дешев") || text.starts_with("бюджетн")
            {
                if entities.price_to.is_none() {
                    entities.price_to = Some(1_500_000);
                }
            } else if text.starts_with("дорог") || text.starts_with("премиум") || text.starts_with("премиальн")
            {
                if entities.price_from.is_none() {
                    entities.price_from = Some(3_000_000);
                }
            } else if text.starts_with("быстр") || text.starts_with("динамичн") {
                if no_power(entities) {
                    entities.power_from = Some(180);
                }
            } else if text.starts_with("медленн") {
                if no_power(entities) {
                    entities.power_to = Some(130);
                }
            } else if text.starts_with("спорткар") || text.starts_with("спортивн") {
                if entities.body_types.is_empty() {
                    entities.body_types = vec!["купе".to_string(), "кабриолет".to_string()];
                }
                if no_power(entities) {
                    entities.power_from = Some(200);
                }
            }
        }
    }

    fn extract_categorical(&self, entities: &mut Entities, words: &mut [Word], norm: &str) {
        self.consume_matches(Slot::City, words, |c| {
            entities.city.get_or_insert(c.to_string());
        });
        let mut bodies = std::mem::take(&mut entities.body_types);
        self.consume_matches(Slot::BodyType, words, |c| {
            if !bodies.iter().any(|b| b == c) {
                bodies.push(c.to_string());
            }
        });
        entities.body_types = bodies;
        self.consume_matches(Slot::FuelType, words, |c| {
            entities.fuel_type.get_or_insert(c.to_string());
        });
        self.consume_matches(Slot::Transmission, words, |c| {
            entities.transmission.get_or_insert(c.to_string());
        });
        self.consume_matches(Slot::DriveType, words, |c| {
            entities.drive_type.get_or_insert(c.to_string());
        });

        for word in words.iter().filter(|w| !w.consumed) {
            match word.text.as_str() {
                "новый" | "новая" | "новое" | "новые" | "новую" | "новых" => {
                    entities.state.get_or_insert(VehicleState::New);
                }
                "б/у" | "бу" => {
                    entities.state.get_or_insert(VehicleState::Used);
                }
                t if t.starts_with("подержанн") => {
                    entities.state.get_or_insert(VehicleState::Used);
                }
                _ => {}
            }
        }
        if norm.contains("с пробегом") {
            entities.state.get_or_insert(VehicleState::Used);
        }
    }
}

fn take_one_f64(masked: &mut Masked, re: &Regex, mut apply: impl FnMut(f64)) {
    take_one_f64_if(masked, re, |_| true, |v| apply(v));
}

fn take_one_f64_if(
    masked: &mut Masked,
    re: &Regex,
    accept: impl Fn(f64) -> bool,
    mut apply: impl FnMut(f64),
) {
    let text = masked.text();
    if let Some(c) = re.captures(&text) {
        if let Some(v) = parse_num(&c[1]) {
            if accept(v) {
                apply(v);
                masked.blank(&text, c.get(0).map(|m| m.range()).unwrap_or_default());
            }
        }
    }
}

fn take_pair_f64(masked: &mut Masked, re: &Regex, mut apply: impl FnMut(f64, f64)) {
    let text = masked.text();
    if let Some(c) = re.captures(&text) {
        if let (Some(a), Some(b)) = (parse_num(&c[1]), parse_num(&c[2])) {
            apply(a, b);
            masked.blank(&text, c.get(0).map(|m| m.range()).unwrap_or_default());
        }
    }
}

fn take_mileage(masked: &mut Masked, re: &Regex, slot: &mut Option<i64>) {
    if slot.is_some() {
        return;
    }
    let text = masked.text();
    if let Some(c) = re.captures(&text) {
        let mult = if c.get(2).is_some() { 1000.0 } else { 1.0 };
        if let Some(v) = parse_num(&c[1]) {
            *slot = Some((v * mult) as i64);
            masked.blank(&text, c.get(0).map(|m| m.range()).unwrap_or_default());
        }
    }
}

fn take_price(
    masked: &mut Masked,
    re: &Regex,
    unit_required: bool,
    mut apply: impl FnMut(i64, i64),
) {
    let text = masked.text();
    if let Some(c) = re.captures(&text) {
        let mult = price_multiplier(c.get(3).map(|m| m.as_str()));
        if unit_required && mult.is_none() {
            return;
        }
        let mult = mult.unwrap_or(1.0);
        if let (Some(a), Some(b)) = (parse_num(&c[1]), parse_num(&c[2])) {
            apply((a * mult) as i64, (b * mult) as i64);
            masked.blank(&text, c.get(0).map(|m| m.range()).unwrap_or_default());
        }
    }
}

fn take_price_single(masked: &mut Masked, re: &Regex, mut apply: impl FnMut(i64)) {
    let text = masked.text();
    if let Some(c) = re.captures(&text) {
        let unit = c.get(2).map(|m| m.as_str());
        if let Some(v) = parse_num(&c[1]) {
            let value = (v * price_multiplier(unit).unwrap_or(1.0)) as i64;
            if unit.is_some() || value >= BARE_PRICE_FLOOR {
                apply(value);
                masked.blank(&text, c.get(0).map(|m| m.range()).unwrap_or_default());
            }
        }
    }
}

/// Reversed bounds ("от 200 до 100") are swapped so `from <= to` holds.
fn normalize_ranges(entities: &mut Entities) {
    fn swap_i64(from: &mut Option<i64>, to: &mut Option<i64>) {
        if let (Some(a), Some(b)) = (*from, *to) {
            if a > b {
                *from = Some(b);
                *to = Some(a);
            }
        }
    }
    fn swap_f64(from: &mut Option<f64>, to: &mut Option<f64>) {
        if let (Some(a), Some(b)) = (*from, *to) {
            if a > b {
                *from = Some(b);
                *to = Some(a);
            }
        }
    }
    swap_i64(&mut entities.price_from, &mut entities.price_to);
    swap_i64(&mut entities.power_from, &mut entities.power_to);
    swap_i64(&mut entities.mileage_from, &mut entities.mileage_to);
    swap_i64(&mut entities.owners_from, &mut entities.owners_to);
    swap_f64(&mut entities.engine_vol_from, &mut entities.engine_vol_to);
    swap_f64(&mut entities.acceleration_from, &mut entities.acceleration_to);
    if let (Some(a), Some(b)) = (entities.year_from, entities.year_to) {
        if a > b {
            entities.year_from = Some(b);
            entities.year_to = Some(a);
        }
    }
}
