use std::collections::HashMap;

use once_cell::sync::Lazy;
use strsim::normalized_levenshtein;

/// Slot families served by the synonym tables. A closed enum: an unknown
/// slot is unrepresentable, which is how the "unknown slot is a programming
/// error" contract is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Brand,
    Model,
    Color,
    City,
    BodyType,
    FuelType,
    Transmission,
    DriveType,
}

/// Similarity threshold for the fuzzy brand fallback.
pub const FUZZY_BRAND_THRESHOLD: f64 = 0.6;

type Entries = &'static [(&'static str, &'static [&'static str])];

static BRANDS: Entries = &[
    ("BMW", &["бмв", "бэмвэ", "бумер", "bmw"]),
    ("Lada", &["лада", "лады", "ладу", "ваз", "жигули", "lada"]),
    (
        "Toyota",
        &["тойота", "тойоты", "тойоту", "тоёта", "тоета", "toyota"],
    ),
    ("Kia", &["киа", "кия", "kia"]),
    (
        "Hyundai",
        &["хендай", "хендэ", "хундай", "хюндай", "hyundai"],
    ),
    (
        "Mercedes-Benz",
        &["мерседес", "мерседеса", "мерс", "mercedes", "mercedes-benz"],
    ),
    ("Audi", &["ауди", "audi"]),
    (
        "Volkswagen",
        &["фольксваген", "фольцваген", "vw", "volkswagen"],
    ),
    ("Skoda", &["шкода", "шкоды", "шкоду", "skoda"]),
    ("Nissan", &["ниссан", "ниссана", "nissan"]),
    ("Ford", &["форд", "форда", "ford"]),
    ("Renault", &["рено", "renault"]),
    ("Chery", &["чери", "черри", "chery"]),
    ("Haval", &["хавал", "хавейл", "хавэйл", "haval"]),
    ("Geely", &["джили", "джели", "geely"]),
    ("Porsche", &["порше", "porsche"]),
    ("Lexus", &["лексус", "лексуса", "lexus"]),
    ("Mazda", &["мазда", "мазды", "мазду", "mazda"]),
    ("Honda", &["хонда", "хонды", "хонду", "honda"]),
    (
        "Mitsubishi",
        &["митсубиси", "мицубиси", "митсубиши", "mitsubishi"],
    ),
    ("Volvo", &["вольво", "volvo"]),
    ("Changan", &["чанган", "changan"]),
    ("Exeed", &["эксид", "exeed"]),
    ("Omoda", &["омода", "omoda"]),
];

static MODELS: Entries = &[
    ("Camry", &["камри", "camry"]),
    ("Corolla", &["королла", "королу", "corolla"]),
    ("RAV4", &["рав4", "рав 4", "rav4", "rav 4"]),
    (
        "Land Cruiser",
        &["ленд крузер", "ленд крузера", "лэнд крузер", "land cruiser"],
    ),
    (
        "Land Cruiser Prado",
        &["ленд крузер прадо", "прадо", "land cruiser prado", "prado"],
    ),
    ("Granta", &["гранта", "гранты", "гранту", "granta"]),
    ("Vesta", &["веста", "весты", "весту", "vesta"]),
    ("Niva", &["нива", "нивы", "ниву", "niva"]),
    ("Rio", &["рио", "rio"]),
    ("Sportage", &["спортейдж", "спортаж", "sportage"]),
    ("Seltos", &["селтос", "seltos"]),
    ("Solaris", &["солярис", "соляриса", "solaris"]),
    ("Creta", &["крета", "креты", "крету", "creta"]),
    ("Tucson", &["туссан", "туксон", "tucson"]),
    ("Santa Fe", &["санта фе", "сантафе", "santa fe"]),
    ("Tiguan", &["тигуан", "тигуана", "tiguan"]),
    ("Polo", &["поло", "polo"]),
    ("Octavia", &["октавия", "октавию", "octavia"]),
    ("Rapid", &["рапид", "rapid"]),
    ("Qashqai", &["кашкай", "кашкая", "qashqai"]),
    ("X-Trail", &["икстрейл", "икс трейл", "х-трейл", "x-trail"]),
    ("Focus", &["фокус", "фокуса", "focus"]),
    ("Duster", &["дастер", "дастера", "duster"]),
    ("Logan", &["логан", "логана", "logan"]),
    ("Tiggo 7 Pro", &["тигго 7 про", "тиго 7 про", "tiggo 7 pro"]),
    ("Tiggo 4", &["тигго 4", "тиго 4", "tiggo 4"]),
    ("Jolion", &["джолион", "jolion"]),
    ("F7", &["ф7", "f7"]),
    ("Coolray", &["кулрей", "кулрэй", "coolray"]),
    ("Macan", &["макан", "macan"]),
    ("Cayenne", &["кайен", "каен", "кайена", "cayenne"]),
    ("X5", &["х5", "икс5", "x5"]),
    ("X3", &["х3", "икс3", "x3"]),
    ("E-Class", &["е-класс", "е класс", "e-class"]),
    ("GLC", &["глц", "glc"]),
];

static COLORS: Entries = &[
    (
        "красный",
        &[
            "красная", "красное", "красные", "красного", "красную", "красным", "красной",
        ],
    ),
    (
        "синий",
        &["синяя", "синее", "синие", "синего", "синюю", "синим", "синей"],
    ),
    (
        "белый",
        &["белая", "белое", "белые", "белого", "белую", "белым", "белой"],
    ),
    (
        "черный",
        &[
            "чёрный", "черная", "чёрная", "черное", "черные", "черного", "черную", "черным",
            "черной",
        ],
    ),
    (
        "серый",
        &["серая", "серое", "серые", "серого", "серую", "серым", "серой"],
    ),
    (
        "серебристый",
        &["серебристая", "серебристые", "серебристого", "серебристую", "серебро"],
    ),
    (
        "зеленый",
        &[
            "зелёный", "зеленая", "зелёная", "зеленые", "зеленого", "зеленую", "зеленой",
        ],
    ),
    (
        "желтый",
        &["жёлтый", "желтая", "жёлтая", "желтые", "желтого", "желтую"],
    ),
    ("оранжевый", &["оранжевая", "оранжевые", "оранжевую"]),
    ("коричневый", &["коричневая", "коричневые", "коричневую"]),
    ("бежевый", &["бежевая", "бежевые", "бежевую"]),
    (
        "голубой",
        &["голубая", "голубые", "голубого", "голубую", "голубой"],
    ),
    ("фиолетовый", &["фиолетовая", "фиолетовые", "фиолетовую"]),
    ("розовый", &["розовая", "розовые", "розовую"]),
    ("золотой", &["золотистый", "золотистая", "золотая", "золотую"]),
    ("бордовый", &["бордовая", "бордовые", "бордовую"]),
];

static CITIES: Entries = &[
    ("Москва", &["москва", "москве", "москвы", "мск"]),
    (
        "Санкт-Петербург",
        &[
            "санкт-петербург", "петербург", "петербурге", "питер", "питере", "спб",
        ],
    ),
    ("Казань", &["казань", "казани"]),
    ("Екатеринбург", &["екатеринбург", "екатеринбурге", "екб"]),
    ("Новосибирск", &["новосибирск", "новосибирске"]),
    (
        "Нижний Новгород",
        &["нижний новгород", "нижнем новгороде", "нижний"],
    ),
    ("Краснодар", &["краснодар", "краснодаре"]),
    ("Самара", &["самара", "самаре"]),
    ("Уфа", &["уфа", "уфе"]),
    ("Ростов-на-Дону", &["ростов-на-дону", "ростов", "ростове"]),
];

static BODY_TYPES: Entries = &[
    ("седан", &["седаны", "седана", "седане"]),
    (
        "хэтчбек",
        &["хетчбек", "хэтчбеки", "хетчбэк", "хэтч"],
    ),
    ("универсал", &["универсалы", "универсала"]),
    (
        "внедорожник",
        &["внедорожники", "внедорожника", "джип", "джипы"],
    ),
    (
        "кроссовер",
        &["кроссоверы", "кроссовера", "паркетник", "паркетники"],
    ),
    ("купе", &[]),
    ("кабриолет", &["кабриолеты", "кабрио"]),
    ("минивэн", &["минивен", "минивэны"]),
    ("пикап", &["пикапы", "пикапа"]),
    ("лифтбек", &["лифтбэк", "лифтбеки"]),
];

static FUEL_TYPES: Entries = &[
    ("бензин", &["бензиновый", "бензиновая", "бензине"]),
    ("дизель", &["дизельный", "дизельная", "дизеле"]),
    ("гибрид", &["гибридный", "гибридная", "гибриды"]),
    (
        "электро",
        &["электрический", "электрическая", "электромобиль", "электричка"],
    ),
];

static TRANSMISSIONS: Entries = &[
    (
        "автомат",
        &["акпп", "автоматическая", "автоматом", "автомате"],
    ),
    (
        "механика",
        &["мкпп", "механическая", "механике", "ручная"],
    ),
    ("робот", &["роботизированная", "дсг", "dsg"]),
    ("вариатор", &["вариаторе", "cvt"]),
];

static DRIVE_TYPES: Entries = &[
    (
        "полный",
        &["полный привод", "полным приводом", "4wd", "awd", "4х4", "4x4"],
    ),
    ("передний", &["передний привод", "передним приводом", "fwd"]),
    ("задний", &["задний привод", "задним приводом", "rwd"]),
];

/// Case-fold for lookups: lowercase plus ё→е, the two insensitivities the
/// tables guarantee.
pub fn fold(text: &str) -> String {
    text.chars()
        .flat_map(|c| c.to_lowercase())
        .map(|c| if c == 'ё' { 'е' } else { c })
        .collect()
}

struct SynonymTable {
    variants_by_canonical: HashMap<&'static str, Vec<&'static str>>,
    canonical_by_variant: HashMap<String, &'static str>,
    max_phrase_words: usize,
}

impl SynonymTable {
    fn build(entries: Entries) -> Self {
        let mut variants_by_canonical = HashMap::new();
        let mut canonical_by_variant = HashMap::new();
        let mut max_phrase_words = 1;

        for (canonical, variants) in entries {
            let mut all: Vec<&'static str> = Vec::with_capacity(variants.len() + 1);
            all.push(*canonical);
            all.extend_from_slice(variants);
            for variant in &all {
                canonical_by_variant.insert(fold(variant), *canonical);
                max_phrase_words = max_phrase_words.max(variant.split_whitespace().count());
            }
            variants_by_canonical.insert(*canonical, all);
        }

        Self {
            variants_by_canonical,
            canonical_by_variant,
            max_phrase_words,
        }
    }
}

/// A canonical value found in a word sequence, with the window it consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordMatch {
    pub canonical: &'static str,
    pub word_index: usize,
    pub word_count: usize,
}

/// Read-only lookup over the per-slot synonym tables. Built once at process
/// start; safe for unlimited concurrent readers.
pub struct SynonymStore {
    tables: HashMap<Slot, SynonymTable>,
}

static ALL_SLOTS: &[(Slot, Entries)] = &[
    (Slot::Brand, BRANDS),
    (Slot::Model, MODELS),
    (Slot::Color, COLORS),
    (Slot::City, CITIES),
    (Slot::BodyType, BODY_TYPES),
    (Slot::FuelType, FUEL_TYPES),
    (Slot::Transmission, TRANSMISSIONS),
    (Slot::DriveType, DRIVE_TYPES),
];

static STORE: Lazy<SynonymStore> = Lazy::new(|| {
    let tables = ALL_SLOTS
        .iter()
        .map(|(slot, entries)| (*slot, SynonymTable::build(entries)))
        .collect();
    SynonymStore { tables }
});

impl SynonymStore {
    /// The shared process-wide store.
    pub fn shared() -> &'static SynonymStore {
        &STORE
    }

    fn table(&self, slot: Slot) -> &SynonymTable {
        // Every Slot variant is registered in ALL_SLOTS.
        self.tables
            .get(&slot)
            .unwrap_or_else(|| unreachable!("slot table missing: {slot:?}"))
    }

    /// Map a raw word or documented multi-word phrase to its canonical
    /// value. Whole-phrase only: this never matches inside unrelated words.
    pub fn normalize(&self, slot: Slot, raw: &str) -> Option<&'static str> {
        let folded = fold(raw.trim());
        if folded.is_empty() {
            return None;
        }
        self.table(slot).canonical_by_variant.get(&folded).copied()
    }

    /// All textual variants of a canonical value (the canonical included),
    /// for building OR-groups of search predicates.
    pub fn expand(&self, slot: Slot, canonical: &str) -> Vec<String> {
        self.table(slot)
            .variants_by_canonical
            .get(canonical)
            .map(|variants| variants.iter().map(|v| fold(v)).collect())
            .unwrap_or_else(|| vec![fold(canonical)])
    }

    /// True if the word is a known variant of any value in the slot.
    pub fn is_known_variant(&self, slot: Slot, word: &str) -> bool {
        self.normalize(slot, word).is_some()
    }

    /// Scan a word sequence for canonical values. Longer phrases win over
    /// their single-word prefixes, and consumed words are not reused.
    pub fn match_words(&self, slot: Slot, words: &[&str]) -> Vec<WordMatch> {
        let table = self.table(slot);
        let mut matches = Vec::new();
        let mut i = 0;
        while i < words.len() {
            let mut advanced = false;
            let max_window = table.max_phrase_words.min(words.len() - i);
            for window in (1..=max_window).rev() {
                let phrase = words[i..i + window].join(" ");
                if let Some(canonical) = table.canonical_by_variant.get(fold(&phrase).as_str()) {
                    matches.push(WordMatch {
                        canonical,
                        word_index: i,
                        word_count: window,
                    });
                    i += window;
                    advanced = true;
                    break;
                }
            }
            if !advanced {
                i += 1;
            }
        }
        matches
    }

    /// Approximate brand lookup for misspellings the tables do not list.
    /// Returns the best candidate at similarity >= 0.6, so every caller gets
    /// identical matching semantics.
    pub fn fuzzy_brand(&self, word: &str) -> Option<&'static str> {
        let folded = fold(word);
        if folded.chars().count() < 3 || folded.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }
        let table = self.table(Slot::Brand);
        let mut best: Option<(&'static str, f64)> = None;
        for (variant, canonical) in &table.canonical_by_variant {
            let score = normalized_levenshtein(&folded, variant);
            if score >= FUZZY_BRAND_THRESHOLD
                && best.map(|(_, s)| score > s).unwrap_or(true)
            {
                best = Some((canonical, score));
            }
        }
        best.map(|(canonical, _)| canonical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_case_and_yo_insensitive() {
        let store = SynonymStore::shared();
        assert_eq!(store.normalize(Slot::Brand, "БМВ"), Some("BMW"));
        assert_eq!(store.normalize(Slot::Color, "чёрная"), Some("черный"));
        assert_eq!(store.normalize(Slot::Color, "ЗЕЛЁНЫЙ"), Some("зеленый"));
    }

    #[test]
    fn normalize_rejects_unknown_and_partial_words() {
        let store = SynonymStore::shared();
        assert_eq!(store.normalize(Slot::Brand, "обман"), None);
        assert_eq!(store.normalize(Slot::Brand, ""), None);
    }

    #[test]
    fn match_words_does_not_match_inside_unrelated_words() {
        let store = SynonymStore::shared();
        // "бмв" is a substring of "обман" transliterations never matter here:
        // matching is whole-token only.
        let words = ["это", "обман", "а", "не", "машина"];
        assert!(store.match_words(Slot::Brand, &words).is_empty());
    }

    #[test]
    fn match_words_prefers_composite_phrases() {
        let store = SynonymStore::shared();
        let words = ["тойота", "ленд", "крузер", "прадо"];
        let matches = store.match_words(Slot::Model, &words);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].canonical, "Land Cruiser Prado");
        assert_eq!(matches[0].word_count, 3);
    }

    #[test]
    fn expand_includes_canonical_and_variants() {
        let store = SynonymStore::shared();
        let variants = store.expand(Slot::Brand, "BMW");
        assert!(variants.contains(&"bmw".to_string()));
        assert!(variants.contains(&"бмв".to_string()));
    }

    #[test]
    fn fuzzy_brand_recovers_misspellings() {
        let store = SynonymStore::shared();
        assert_eq!(store.fuzzy_brand("тайота"), Some("Toyota"));
        assert_eq!(store.fuzzy_brand("мерсидес"), Some("Mercedes-Benz"));
        assert_eq!(store.fuzzy_brand("от"), None);
        assert_eq!(store.fuzzy_brand("шкаф"), None);
    }

    #[test]
    fn match_words_preserves_appearance_order() {
        let store = SynonymStore::shared();
        let words = ["красная", "и", "синяя"];
        let matches = store.match_words(Slot::Color, &words);
        let canonicals: Vec<_> = matches.iter().map(|m| m.canonical).collect();
        assert_eq!(canonicals, vec!["красный", "синий"]);
    }
}
