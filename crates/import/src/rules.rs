use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tally_core::{normalize_description, Money, Transaction};
use thiserror::Error;

const BUILTIN_RULES: &str = include_str!("../rules/default_rules.toml");

/// One pattern → category mapping. Rules are evaluated in the order given.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryRule {
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub match_type: MatchType,
    pub category: String,
    pub subcategory: String,
    #[serde(default)]
    pub direction: Direction,
    /// Inclusive bounds on the transaction's absolute amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_min_cents: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_max_cents: Option<i64>,
}

impl CategoryRule {
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        match_type: MatchType,
        category: impl Into<String>,
        subcategory: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            match_type,
            category: category.into(),
            subcategory: subcategory.into(),
            direction: Direction::Any,
            amount_min_cents: None,
            amount_max_cents: None,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_amount_range(mut self, min_cents: Option<i64>, max_cents: Option<i64>) -> Self {
        self.amount_min_cents = min_cents;
        self.amount_max_cents = max_cents;
        self
    }

    fn amount_in_range(&self, magnitude: Money) -> bool {
        self.amount_min_cents.map_or(true, |min| magnitude >= Money::from_cents(min))
            && self.amount_max_cents.map_or(true, |max| magnitude <= Money::from_cents(max))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    #[default]
    Contains,
    Exact,
    Regex,
}

impl std::str::FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(MatchType::Contains),
            "exact" => Ok(MatchType::Exact),
            "regex" => Ok(MatchType::Regex),
            other => Err(format!("Unknown match type: '{other}'")),
        }
    }
}

/// Restricts a rule to one side of the ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Any,
    Debit,
    Credit,
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule '{name}': invalid regex: {source}")]
    InvalidRegex {
        name: String,
        #[source]
        source: regex::Error,
    },
    #[error("Failed to parse rules TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    rule: Vec<CategoryRule>,
}

enum Matcher {
    Substring(String),
    Whole(String),
    Pattern(Regex),
}

/// Internal pairing of a rule with its precompiled matcher.
struct CompiledRule {
    rule: CategoryRule,
    matcher: Matcher,
}

impl CompiledRule {
    fn compile(rule: CategoryRule) -> Result<Self, RuleError> {
        let matcher = match rule.match_type {
            MatchType::Contains => Matcher::Substring(normalize_description(&rule.pattern)),
            MatchType::Exact => Matcher::Whole(normalize_description(&rule.pattern)),
            MatchType::Regex => Matcher::Pattern(
                RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| RuleError::InvalidRegex { name: rule.name.clone(), source })?,
            ),
        };
        Ok(Self { rule, matcher })
    }

    fn matches(&self, text: &str, is_debit: bool, magnitude: Money) -> bool {
        let side_ok = match self.rule.direction {
            Direction::Any => true,
            Direction::Debit => is_debit,
            Direction::Credit => !is_debit,
        };
        side_ok
            && self.rule.amount_in_range(magnitude)
            && match &self.matcher {
                Matcher::Substring(p) => text.contains(p.as_str()),
                Matcher::Whole(p) => text == p,
                Matcher::Pattern(re) => re.is_match(text),
            }
    }
}

/// Ordered, first-match-wins rule set. Matching is pure: the same
/// description, side and amount always yield the same rule.
pub struct CategoryRuleEngine {
    rules: Vec<CompiledRule>,
}

impl CategoryRuleEngine {
    /// Compiles `rules` in the given order. A bad regex fails the whole set.
    pub fn new(rules: Vec<CategoryRule>) -> Result<Self, RuleError> {
        let rules = rules
            .into_iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Parses an ordered `[[rule]]` array.
    pub fn from_toml(toml_content: &str) -> Result<Self, RuleError> {
        let file: RuleFile = toml::from_str(toml_content)?;
        Self::new(file.rule)
    }

    /// The bundled rule set.
    pub fn builtin() -> Result<Self, RuleError> {
        Self::from_toml(BUILTIN_RULES)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = &CategoryRule> {
        self.rules.iter().map(|cr| &cr.rule)
    }

    /// First rule matching the description on the given side, if any.
    /// `amount` may be signed; bounds compare its absolute value.
    pub fn match_description(
        &self,
        description: &str,
        is_debit: bool,
        amount: Money,
    ) -> Option<&CategoryRule> {
        let text = normalize_description(description);
        let magnitude = amount.abs();
        self.rules
            .iter()
            .find(|cr| cr.matches(&text, is_debit, magnitude))
            .map(|cr| &cr.rule)
    }

    pub fn find_matching_rule(&self, tx: &Transaction) -> Option<&CategoryRule> {
        self.match_description(&tx.description, tx.is_debit(), tx.amount())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tally_core::Money;

    fn make_tx(desc: &str, debit_cents: i64, credit_cents: i64) -> Transaction {
        Transaction::new(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            desc,
            Money::from_cents(debit_cents),
            Money::from_cents(credit_cents),
            None,
        )
        .unwrap()
    }

    fn make_rule(pattern: &str, match_type: MatchType, category: &str) -> CategoryRule {
        CategoryRule::new("test", pattern, match_type, category, "Sub")
    }

    // ── match types ───────────────────────────────────────────────────────────

    #[test]
    fn contains_match_case_insensitive() {
        let engine = CategoryRuleEngine::new(vec![make_rule("swiggy", MatchType::Contains, "Food")]).unwrap();
        assert!(engine.find_matching_rule(&make_tx("SWIGGY  ORDER 4521", 500, 0)).is_some());
        assert!(engine.find_matching_rule(&make_tx("STARBUCKS", 500, 0)).is_none());
    }

    #[test]
    fn exact_match_ignores_spacing_and_case() {
        let engine = CategoryRuleEngine::new(vec![make_rule("atm cash", MatchType::Exact, "Cash")]).unwrap();
        assert!(engine.find_matching_rule(&make_tx("ATM   CASH", 500, 0)).is_some());
        assert!(engine.find_matching_rule(&make_tx("ATM CASH 123", 500, 0)).is_none());
    }

    #[test]
    fn regex_match() {
        let engine =
            CategoryRuleEngine::new(vec![make_rule(r"^amzn|amazon", MatchType::Regex, "Shopping")]).unwrap();
        assert!(engine.find_matching_rule(&make_tx("AMAZON MARKETPLACE", 1999, 0)).is_some());
        assert!(engine.find_matching_rule(&make_tx("AMZN*PRIME", 1399, 0)).is_some());
        assert!(engine.find_matching_rule(&make_tx("WHOLE FOODS", 1000, 0)).is_none());
    }

    #[test]
    fn invalid_regex_is_a_construction_error() {
        let err = CategoryRuleEngine::new(vec![make_rule("(unclosed", MatchType::Regex, "X")]);
        assert!(matches!(err, Err(RuleError::InvalidRegex { .. })));
    }

    // ── ordering and filters ──────────────────────────────────────────────────

    #[test]
    fn first_declared_rule_wins() {
        let engine = CategoryRuleEngine::new(vec![
            make_rule("amazon", MatchType::Contains, "First"),
            make_rule("amazon marketplace", MatchType::Contains, "Second"),
        ])
        .unwrap();
        let rule = engine.find_matching_rule(&make_tx("AMAZON MARKETPLACE", 999, 0)).unwrap();
        assert_eq!(rule.category, "First");
    }

    #[test]
    fn direction_filter() {
        let engine = CategoryRuleEngine::new(vec![
            make_rule("salary", MatchType::Contains, "Income").with_direction(Direction::Credit),
        ])
        .unwrap();
        assert!(engine.find_matching_rule(&make_tx("SALARY JUNE", 0, 5_000_000)).is_some());
        assert!(engine.find_matching_rule(&make_tx("SALARY ADVANCE REPAID", 10_000, 0)).is_none());
    }

    #[test]
    fn amount_min_filter() {
        let engine = CategoryRuleEngine::new(vec![
            make_rule("amazon", MatchType::Contains, "Big").with_amount_range(Some(1_000_000), None),
            make_rule("amazon", MatchType::Contains, "Small"),
        ])
        .unwrap();
        // Below minimum falls through to the next rule
        assert_eq!(engine.find_matching_rule(&make_tx("AMAZON", 999_999, 0)).unwrap().category, "Small");
        // At minimum matches
        assert_eq!(engine.find_matching_rule(&make_tx("AMAZON", 1_000_000, 0)).unwrap().category, "Big");
    }

    #[test]
    fn amount_max_filter_uses_magnitude_on_both_sides() {
        let engine = CategoryRuleEngine::new(vec![
            make_rule("upi", MatchType::Contains, "Petty").with_amount_range(None, Some(50_000)),
        ])
        .unwrap();
        assert!(engine.find_matching_rule(&make_tx("UPI PAYMENT", 50_000, 0)).is_some());
        assert!(engine.find_matching_rule(&make_tx("UPI PAYMENT", 50_001, 0)).is_none());
        assert!(engine.find_matching_rule(&make_tx("UPI RECEIVED", 0, 20_000)).is_some());
        assert!(engine.match_description("upi refund", false, Money::from_cents(-20_000)).is_some());
    }

    // ── toml / builtin ────────────────────────────────────────────────────────

    #[test]
    fn from_toml_keeps_file_order() {
        let engine = CategoryRuleEngine::from_toml(
            r#"
            [[rule]]
            name = "b"
            pattern = "coffee"
            category = "Food & Dining"
            subcategory = "Cafe/Coffee"

            [[rule]]
            name = "a"
            pattern = "^coffee"
            match_type = "regex"
            category = "Other"
            subcategory = "Other"
            direction = "debit"
            amount_max_cents = 50000
            "#,
        )
        .unwrap();
        let names: Vec<_> = engine.rules().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["b", "a"]);
        let second = engine.rules().nth(1).unwrap();
        assert_eq!(second.direction, Direction::Debit);
        assert_eq!((second.amount_min_cents, second.amount_max_cents), (None, Some(50_000)));
        assert_eq!(engine.rules().next().unwrap().amount_max_cents, None);
    }

    #[test]
    fn bad_toml_is_an_error() {
        assert!(matches!(CategoryRuleEngine::from_toml("[[rule]]\nname = 1"), Err(RuleError::Parse(_))));
    }

    #[test]
    fn builtin_rules_compile() {
        let engine = CategoryRuleEngine::builtin().unwrap();
        assert!(engine.len() > 40);
    }

    #[test]
    fn builtin_swiggy_is_food_delivery() {
        let engine = CategoryRuleEngine::builtin().unwrap();
        let rule = engine.find_matching_rule(&make_tx("SWIGGY ORDER 4521", 45_000, 0)).unwrap();
        assert_eq!(rule.category, "Food & Dining");
        assert_eq!(rule.subcategory, "Food Delivery");
    }

    #[test]
    fn builtin_examples() {
        let engine = CategoryRuleEngine::builtin().unwrap();
        let category = |desc: &str, debit: i64, credit: i64| {
            engine
                .find_matching_rule(&make_tx(desc, debit, credit))
                .map(|r| (r.category.clone(), r.subcategory.clone()))
        };
        assert_eq!(category("UPI/SWIGGY/4521", 100, 0).unwrap().1, "Food Delivery");
        assert_eq!(category("NEFT-ACME CORP SALARY JUN", 0, 100).unwrap().1, "Salary");
        assert_eq!(category("UBER EATS", 100, 0).unwrap().1, "Food Delivery");
        assert_eq!(category("UBER TRIP", 100, 0).unwrap().1, "Cab/Taxi");
        assert_eq!(category("IMPS P2A 99881", 100, 0).unwrap().1, "Bank Transfer");
        assert_eq!(category("AMAZON PRIME VIDEO", 100, 0).unwrap().0, "Entertainment");
        assert!(category("MISC 12345", 100, 0).is_none());
    }
}
