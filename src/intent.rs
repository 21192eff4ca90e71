//! Intent Parser
//!
//! Turns a free-text question into a closed `Intent` record using fixed
//! lexicons and keyword patterns only. Parsing is a pure function of the
//! question and never fails: the worst case is an intent with no entities and
//! query type `general`. Everything except state abbreviations is matched on
//! the lower-cased text.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref YEAR_RE: Regex = Regex::new(r"\b(?:19|20)\d{2}\b").unwrap();
    static ref LAST_N_YEARS_RE: Regex = Regex::new(r"last\s+(\d+)\s+years?").unwrap();
    static ref DISTRICT_BEFORE_RE: Regex = Regex::new(r"(\w+)\s+district").unwrap();
    static ref DISTRICT_AFTER_RE: Regex = Regex::new(r"district\s+(\w+)").unwrap();
}

const STATES: &[&str] = &[
    "andhra pradesh", "arunachal pradesh", "assam", "bihar", "chhattisgarh",
    "goa", "gujarat", "haryana", "himachal pradesh", "jharkhand", "karnataka",
    "kerala", "madhya pradesh", "maharashtra", "manipur", "meghalaya", "mizoram",
    "nagaland", "odisha", "punjab", "rajasthan", "sikkim", "tamil nadu",
    "telangana", "tripura", "uttar pradesh", "uttarakhand", "west bengal",
];

/// Matched only as upper-case whole words, so "sum up" or "up-to-date" never
/// name a state.
const STATE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("MH", "maharashtra"),
    ("UP", "uttar pradesh"),
    ("MP", "madhya pradesh"),
    ("TN", "tamil nadu"),
    ("AP", "andhra pradesh"),
    ("WB", "west bengal"),
    ("HP", "himachal pradesh"),
    ("UK", "uttarakhand"),
];

const CROPS: &[&str] = &[
    "rice", "wheat", "maize", "corn", "bajra", "jowar", "ragi", "cotton", "sugarcane",
    "groundnut", "peanut", "sunflower", "soybean", "soya", "mustard", "sesame", "safflower",
    "coconut", "areca nut", "cashew", "tea", "coffee", "rubber", "paddy", "barley",
    "millets", "pulses", "lentils", "chickpea", "gram", "onion", "potato", "tomato",
];

const CROP_VARIATIONS: &[(&str, &str)] = &[
    ("rices", "rice"),
    ("wheats", "wheat"),
    ("cottons", "cotton"),
    ("corns", "corn"),
    ("maizes", "maize"),
    ("cereals", "wheat"),
    ("grains", "wheat"),
    ("vegetables", "potato"),
];

const TEMPORAL_WORDS: &[&str] = &["year", "month", "season", "annual", "monthly"];
const PRODUCTION_WORDS: &[&str] = &["production", "yield", "harvest", "output"];
const PRICE_WORDS: &[&str] = &["price", "market", "cost", "rate", "mandi"];
const CLIMATE_WORDS: &[&str] = &["rain", "climate", "weather", "monsoon"];
const LIVE_TRIGGER_WORDS: &[&str] = &[
    "current", "latest", "recent", "live", "market", "price", "now", "today",
];

/// Metric tags a question can ask about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricTag {
    Production,
    Area,
    Rainfall,
    Temperature,
    Price,
    Correlation,
}

impl MetricTag {
    pub const ALL: [MetricTag; 6] = [
        MetricTag::Production,
        MetricTag::Area,
        MetricTag::Rainfall,
        MetricTag::Temperature,
        MetricTag::Price,
        MetricTag::Correlation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricTag::Production => "production",
            MetricTag::Area => "area",
            MetricTag::Rainfall => "rainfall",
            MetricTag::Temperature => "temperature",
            MetricTag::Price => "price",
            MetricTag::Correlation => "correlation",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            MetricTag::Production => &[
                "production", "yield", "output", "harvest", "produce", "grown", "cultivation", "farming",
            ],
            MetricTag::Area => &[
                "area", "acreage", "cultivation", "land", "hectare", "acres", "coverage", "sown",
            ],
            MetricTag::Rainfall => &[
                "rainfall", "precipitation", "rain", "monsoon", "water", "irrigation",
            ],
            MetricTag::Temperature => &["temperature", "temp", "climate", "weather", "heat"],
            MetricTag::Price => &[
                "price", "cost", "rate", "market", "mandi", "selling", "buying", "value", "worth",
            ],
            MetricTag::Correlation => &[
                "correlation", "relationship", "impact", "effect", "influence", "connection",
            ],
        }
    }
}

impl fmt::Display for MetricTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Comparison,
    Trend,
    Ranking,
    Correlation,
    Current,
    Aggregation,
    General,
}

impl QueryType {
    /// Scoring order; ties resolve to the earliest entry.
    const SCORED: [QueryType; 6] = [
        QueryType::Trend,
        QueryType::Comparison,
        QueryType::Ranking,
        QueryType::Correlation,
        QueryType::Current,
        QueryType::Aggregation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Comparison => "comparison",
            QueryType::Trend => "trend",
            QueryType::Ranking => "ranking",
            QueryType::Correlation => "correlation",
            QueryType::Current => "current",
            QueryType::Aggregation => "aggregation",
            QueryType::General => "general",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            QueryType::Trend => &[
                "trend", "over time", "change", "pattern", "analyse", "analyze", "analysis",
                "evolution", "progress", "development", "growth", "decline", "increase", "decrease",
                "trajectory", "movement", "shift", "variation", "fluctuation",
            ],
            QueryType::Comparison => &[
                "compare", "comparison", "versus", "vs", "against", "between", "difference",
                "contrast", "relative", "better", "worse", "higher", "lower", "more", "less",
            ],
            QueryType::Ranking => &[
                "highest", "maximum", "top", "best", "ranking", "rank", "leading", "first",
                "lowest", "minimum", "bottom", "worst", "last", "least", "order", "sort",
            ],
            QueryType::Correlation => &[
                "correlation", "relationship", "impact", "effect", "influence", "connection",
                "association", "link", "related", "depends", "affects", "causes",
            ],
            QueryType::Current => &[
                "current", "latest", "recent", "live", "today", "now", "real-time",
                "up-to-date", "fresh", "new", "present", "contemporary", "modern",
            ],
            QueryType::Aggregation => &[
                "average", "mean", "total", "sum", "overall", "aggregate", "combined",
            ],
            QueryType::General => &[],
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregation operator for general (summary) queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    #[default]
    Avg,
    Sum,
    Max,
    Min,
}

impl Aggregation {
    const PATTERNS: [(Aggregation, &'static [&'static str]); 4] = [
        (Aggregation::Avg, &["average", "mean", "typical", "normal"]),
        (Aggregation::Sum, &["sum", "total", "combined", "aggregate", "overall"]),
        (Aggregation::Max, &["maximum", "highest", "peak", "top", "best"]),
        (Aggregation::Min, &["minimum", "lowest", "bottom", "least", "worst"]),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Avg => "avg",
            Aggregation::Sum => "sum",
            Aggregation::Max => "max",
            Aggregation::Min => "min",
        }
    }

    pub fn sql_function(&self) -> &'static str {
        match self {
            Aggregation::Avg => "AVG",
            Aggregation::Sum => "SUM",
            Aggregation::Max => "MAX",
            Aggregation::Min => "MIN",
        }
    }

    /// Output column of a summary row, e.g. `avg_value`.
    pub fn value_column(&self) -> String {
        format!("{}_value", self.as_str())
    }

    /// Word used in prose answers.
    pub fn describe(&self) -> &'static str {
        match self {
            Aggregation::Avg => "average",
            Aggregation::Sum => "total",
            Aggregation::Max => "maximum",
            Aggregation::Min => "minimum",
        }
    }
}

/// Time expressions found in the question. Relative expressions are kept as
/// flags; the resolvers turn them into concrete year windows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub years: Vec<i32>,
    pub last_n_years: Option<u32>,
    pub recent: bool,
    pub decade: bool,
    pub annual: bool,
    /// Set for trend questions without explicit years: use the full history
    pub default_range: bool,
}

impl TimeRange {
    pub fn has_explicit_years(&self) -> bool {
        !self.years.is_empty()
    }
}

/// Structured interpretation of a question. Built once by `IntentParser::parse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub question: String,
    pub states: Vec<String>,
    pub districts: Vec<String>,
    pub crops: Vec<String>,
    pub metrics: Vec<MetricTag>,
    pub time_range: TimeRange,
    pub query_type: QueryType,
    pub aggregation: Aggregation,
    pub confidence: f64,
    /// Advisory note for the caller, never an error
    pub suggestion: Option<String>,
}

impl Intent {
    pub fn has_metric(&self, metric: MetricTag) -> bool {
        self.metrics.contains(&metric)
    }

    /// No entity or metric could be extracted.
    pub fn is_ambiguous(&self) -> bool {
        self.states.is_empty()
            && self.districts.is_empty()
            && self.crops.is_empty()
            && self.metrics.is_empty()
    }

    /// Price metric requested or price vocabulary in the question.
    pub fn is_price_flavored(&self) -> bool {
        self.has_metric(MetricTag::Price) || contains_any(&self.question.to_lowercase(), PRICE_WORDS)
    }

    /// Rain/climate vocabulary in the question.
    pub fn is_climate_flavored(&self) -> bool {
        contains_any(&self.question.to_lowercase(), CLIMATE_WORDS)
    }

    /// Words that suggest fresh remote data is wanted.
    pub fn has_live_trigger(&self) -> bool {
        contains_any(&self.question.to_lowercase(), LIVE_TRIGGER_WORDS)
    }
}

/// Lexicon and keyword based intent parser.
#[derive(Debug, Default, Clone)]
pub struct IntentParser;

impl IntentParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, question: &str) -> Intent {
        let text = question.to_lowercase();

        let mut intent = Intent {
            question: question.to_string(),
            states: extract_states(&text, question),
            districts: extract_districts(&text),
            crops: extract_crops(&text),
            metrics: extract_metrics(&text),
            time_range: extract_time_range(&text),
            query_type: classify_query_type(&text),
            aggregation: extract_aggregation(&text),
            confidence: confidence(&text),
            suggestion: None,
        };

        apply_context_rules(&mut intent, &text);
        intent
    }
}

fn apply_context_rules(intent: &mut Intent, text: &str) {
    if intent.metrics.is_empty() && contains_any(text, PRODUCTION_WORDS) {
        intent.metrics.push(MetricTag::Production);
    }

    if intent.query_type == QueryType::Comparison && intent.states.len() < 2 {
        intent.suggestion =
            Some("Comparison queries work better with at least two specific states mentioned".to_string());
    }

    if intent.query_type == QueryType::Trend && !intent.time_range.has_explicit_years() {
        intent.time_range.default_range = true;
    }

    if intent.has_metric(MetricTag::Price) {
        intent.query_type = QueryType::Current;
    }
}

/// Byte offset of the first occurrence of `term` in `text` that starts at a
/// word boundary. With `whole_word` the occurrence must also end at one.
fn find_term(text: &str, term: &str, whole_word: bool) -> Option<usize> {
    text.match_indices(term).map(|(idx, _)| idx).find(|&idx| {
        let starts_word = text[..idx]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let ends_word = !whole_word
            || text[idx + term.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric());
        starts_word && ends_word
    })
}

fn matches_term(text: &str, term: &str, whole_word: bool) -> bool {
    find_term(text, term, whole_word).is_some()
}

fn contains_any(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| matches_term(text, term, false))
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_unique(found: &mut Vec<String>, value: String) {
    if !found.contains(&value) {
        found.push(value);
    }
}

/// Canonical names ordered by where they were mentioned, first mention wins.
fn in_mention_order(mut hits: Vec<(usize, &str)>) -> Vec<String> {
    hits.sort_by_key(|(pos, _)| *pos);
    let mut found = Vec::new();
    for (_, name) in hits {
        push_unique(&mut found, title_case(name));
    }
    found
}

fn extract_states(text: &str, question: &str) -> Vec<String> {
    let mut hits = Vec::new();
    for state in STATES {
        if let Some(pos) = find_term(text, state, false) {
            hits.push((pos, *state));
        }
    }
    for (abbrev, state) in STATE_ABBREVIATIONS {
        if let Some(pos) = find_term(question, abbrev, true) {
            hits.push((pos, *state));
        }
    }
    in_mention_order(hits)
}

fn extract_districts(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    for re in [&*DISTRICT_BEFORE_RE, &*DISTRICT_AFTER_RE] {
        for caps in re.captures_iter(text) {
            if let Some(name) = caps.get(1) {
                push_unique(&mut found, title_case(name.as_str()));
            }
        }
    }
    found
}

fn extract_crops(text: &str) -> Vec<String> {
    let mut hits = Vec::new();
    for crop in CROPS {
        if let Some(pos) = find_term(text, crop, false) {
            hits.push((pos, *crop));
        }
    }
    for (variation, crop) in CROP_VARIATIONS {
        if let Some(pos) = find_term(text, variation, false) {
            hits.push((pos, *crop));
        }
    }
    in_mention_order(hits)
}

fn extract_metrics(text: &str) -> Vec<MetricTag> {
    MetricTag::ALL
        .iter()
        .copied()
        .filter(|metric| contains_any(text, metric.keywords()))
        .collect()
}

fn extract_time_range(text: &str) -> TimeRange {
    let mut years: Vec<i32> = YEAR_RE
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    years.dedup();

    let last_n_years = LAST_N_YEARS_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|n| n.as_str().parse().ok());

    TimeRange {
        years,
        last_n_years,
        recent: text.contains("recent") || text.contains("latest"),
        decade: text.contains("decade"),
        annual: text.contains("annual") || text.contains("yearly"),
        default_range: false,
    }
}

fn classify_query_type(text: &str) -> QueryType {
    let trimmed = text.trim();
    let mut best = QueryType::General;
    let mut best_score = 0;

    for query_type in QueryType::SCORED {
        let score: u32 = query_type
            .keywords()
            .iter()
            .filter(|keyword| matches_term(text, keyword, false))
            .map(|keyword| {
                if *keyword == trimmed {
                    3
                } else if keyword.contains(' ') {
                    2
                } else {
                    1
                }
            })
            .sum();
        if score > best_score {
            best = query_type;
            best_score = score;
        }
    }
    best
}

fn extract_aggregation(text: &str) -> Aggregation {
    Aggregation::PATTERNS
        .iter()
        .find(|(_, keywords)| contains_any(text, keywords))
        .map(|(aggregation, _)| *aggregation)
        .unwrap_or_default()
}

fn confidence(text: &str) -> f64 {
    let mut score = 0.0;
    if QueryType::SCORED.iter().any(|qt| contains_any(text, qt.keywords())) {
        score += 0.3;
    }
    if STATES.iter().any(|state| matches_term(text, state, false)) {
        score += 0.2;
    }
    if CROPS.iter().any(|crop| matches_term(text, crop, false)) {
        score += 0.2;
    }
    if MetricTag::ALL.iter().any(|metric| contains_any(text, metric.keywords())) {
        score += 0.2;
    }
    if contains_any(text, TEMPORAL_WORDS) {
        score += 0.1;
    }
    f64::min(score, 1.0)
}
