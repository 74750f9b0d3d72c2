//! Assertions over stored DOM snapshots and console logs
//!
//! Every rule produces exactly one [`AssertionResult`]. Bodies are fetched
//! lazily: a spec with no rules reads nothing, and a spec with many rules
//! reads its artifact once per call. Load failures, a missing ref and
//! malformed rules all turn into failed results instead of errors.

use async_trait::async_trait;
use regex::Regex;
use scraper::node::Element;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::console::{ConsoleLevel, ConsoleLogEntry, ConsoleStore};
use crate::dom::DomStore;
use crate::filter::{ErrorFilter, MatchMode, Matcher};
use crate::types::StorageRef;
use crate::Result;

/// Where the engine reads DOM snapshots from
#[async_trait]
pub trait DomSource: Send + Sync {
    async fn load_dom(&self, storage_ref: &StorageRef) -> Result<String>;
}

/// Where the engine reads console logs from
#[async_trait]
pub trait ConsoleSource: Send + Sync {
    async fn load_console(&self, storage_ref: &StorageRef) -> Result<Vec<ConsoleLogEntry>>;
}

#[async_trait]
impl DomSource for DomStore {
    async fn load_dom(&self, storage_ref: &StorageRef) -> Result<String> {
        self.retrieve(storage_ref).await
    }
}

#[async_trait]
impl ConsoleSource for ConsoleStore {
    async fn load_console(&self, storage_ref: &StorageRef) -> Result<Vec<ConsoleLogEntry>> {
        self.retrieve(storage_ref).await
    }
}

/// Text expectation on the first element matching `selector`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRule {
    pub selector: String,
    pub expected: String,
    #[serde(default)]
    pub mode: MatchMode,
}

/// Attribute expectation on the first element matching `selector`.
/// Without `expected` only presence is checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeRule {
    pub selector: String,
    pub attribute: String,
    #[serde(default)]
    pub expected: Option<String>,
    #[serde(default = "exact")]
    pub mode: MatchMode,
}

fn exact() -> MatchMode {
    MatchMode::Exact
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountOperator {
    Equal,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

impl CountOperator {
    pub fn holds(&self, actual: usize, expected: usize) -> bool {
        match self {
            CountOperator::Equal => actual == expected,
            CountOperator::GreaterThan => actual > expected,
            CountOperator::LessThan => actual < expected,
            CountOperator::GreaterThanOrEqual => actual >= expected,
            CountOperator::LessThanOrEqual => actual <= expected,
        }
    }
}

impl fmt::Display for CountOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CountOperator::Equal => "==",
            CountOperator::GreaterThan => ">",
            CountOperator::LessThan => "<",
            CountOperator::GreaterThanOrEqual => ">=",
            CountOperator::LessThanOrEqual => "<=",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountRule {
    pub selector: String,
    pub operator: CountOperator,
    pub count: usize,
}

/// DOM rules, evaluated against one snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DomValidationSpec {
    pub exists: Vec<String>,
    pub not_exists: Vec<String>,
    pub visible: Vec<String>,
    pub hidden: Vec<String>,
    pub text_content: Vec<TextRule>,
    pub attributes: Vec<AttributeRule>,
    pub count: Vec<CountRule>,
}

/// A console message that must (or must not) appear
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRule {
    pub pattern: String,
    #[serde(default)]
    pub mode: MatchMode,
    /// Only entries at this level are considered
    #[serde(default)]
    pub level: Option<ConsoleLevel>,
}

/// Console rules, evaluated against one log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleValidationSpec {
    pub max_errors: Option<usize>,
    pub max_warnings: Option<usize>,
    pub expected_messages: Vec<MessageRule>,
    pub forbidden_messages: Vec<MessageRule>,
    /// Known noise removed before thresholds and forbidden checks
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    Exists,
    NotExists,
    Visible,
    Hidden,
    TextContent,
    Attribute,
    Count,
    MaxErrors,
    MaxWarnings,
    ExpectedMessage,
    ForbiddenMessage,
}

/// Outcome of a single rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub kind: AssertionKind,
    /// Selector or message pattern the rule is about
    pub target: String,
    pub passed: bool,
    pub message: String,
}

impl AssertionResult {
    fn new(kind: AssertionKind, target: &str, passed: bool, message: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.to_string(),
            passed,
            message: message.into(),
        }
    }

    fn fail(kind: AssertionKind, target: &str, message: impl Into<String>) -> Self {
        Self::new(kind, target, false, message)
    }
}

enum DomCheck<'a> {
    Exists(&'a str),
    NotExists(&'a str),
    Visible(&'a str),
    Hidden(&'a str),
    Text(&'a TextRule),
    Attribute(&'a AttributeRule),
    Count(&'a CountRule),
}

impl DomCheck<'_> {
    fn kind(&self) -> AssertionKind {
        match self {
            DomCheck::Exists(_) => AssertionKind::Exists,
            DomCheck::NotExists(_) => AssertionKind::NotExists,
            DomCheck::Visible(_) => AssertionKind::Visible,
            DomCheck::Hidden(_) => AssertionKind::Hidden,
            DomCheck::Text(_) => AssertionKind::TextContent,
            DomCheck::Attribute(_) => AssertionKind::Attribute,
            DomCheck::Count(_) => AssertionKind::Count,
        }
    }

    fn selector(&self) -> &str {
        match self {
            DomCheck::Exists(s) | DomCheck::NotExists(s) | DomCheck::Visible(s) | DomCheck::Hidden(s) => s,
            DomCheck::Text(r) => &r.selector,
            DomCheck::Attribute(r) => &r.selector,
            DomCheck::Count(r) => &r.selector,
        }
    }
}

impl DomValidationSpec {
    fn checks(&self) -> Vec<DomCheck<'_>> {
        let mut checks = Vec::new();
        checks.extend(self.exists.iter().map(|s| DomCheck::Exists(s)));
        checks.extend(self.not_exists.iter().map(|s| DomCheck::NotExists(s)));
        checks.extend(self.visible.iter().map(|s| DomCheck::Visible(s)));
        checks.extend(self.hidden.iter().map(|s| DomCheck::Hidden(s)));
        checks.extend(self.text_content.iter().map(DomCheck::Text));
        checks.extend(self.attributes.iter().map(DomCheck::Attribute));
        checks.extend(self.count.iter().map(DomCheck::Count));
        checks
    }
}

enum ConsoleCheck<'a> {
    MaxErrors(usize),
    MaxWarnings(usize),
    Expected(&'a MessageRule),
    Forbidden(&'a MessageRule),
}

impl ConsoleCheck<'_> {
    fn kind(&self) -> AssertionKind {
        match self {
            ConsoleCheck::MaxErrors(_) => AssertionKind::MaxErrors,
            ConsoleCheck::MaxWarnings(_) => AssertionKind::MaxWarnings,
            ConsoleCheck::Expected(_) => AssertionKind::ExpectedMessage,
            ConsoleCheck::Forbidden(_) => AssertionKind::ForbiddenMessage,
        }
    }

    fn target(&self) -> &str {
        match self {
            ConsoleCheck::MaxErrors(_) => "errors",
            ConsoleCheck::MaxWarnings(_) => "warnings",
            ConsoleCheck::Expected(r) | ConsoleCheck::Forbidden(r) => &r.pattern,
        }
    }
}

impl ConsoleValidationSpec {
    fn checks(&self) -> Vec<ConsoleCheck<'_>> {
        let mut checks = Vec::new();
        checks.extend(self.max_errors.map(ConsoleCheck::MaxErrors));
        checks.extend(self.max_warnings.map(ConsoleCheck::MaxWarnings));
        checks.extend(self.expected_messages.iter().map(ConsoleCheck::Expected));
        checks.extend(self.forbidden_messages.iter().map(ConsoleCheck::Forbidden));
        checks
    }
}

/// Progressive validator over stored artifacts
#[derive(Clone)]
pub struct AssertionEngine {
    dom: Arc<dyn DomSource>,
    console: Arc<dyn ConsoleSource>,
}

impl AssertionEngine {
    pub fn new(dom: Arc<dyn DomSource>, console: Arc<dyn ConsoleSource>) -> Self {
        Self { dom, console }
    }

    pub async fn evaluate_dom_validations(
        &self,
        spec: &DomValidationSpec,
        dom_ref: Option<&StorageRef>,
    ) -> Vec<AssertionResult> {
        let checks = spec.checks();
        if checks.is_empty() {
            return Vec::new();
        }
        let Some(dom_ref) = dom_ref else {
            return fail_all_dom(&checks, "no DOM snapshot captured for this checkpoint");
        };

        let html = match self.dom.load_dom(dom_ref).await {
            Ok(html) => html,
            Err(e) => {
                warn!("Failed to load DOM {}: {}", dom_ref.path, e);
                return fail_all_dom(&checks, &format!("failed to load DOM snapshot: {}", e));
            }
        };

        // `Html` is not `Send`; parse and evaluate without awaiting.
        let results = check_dom(&html, &checks);
        debug!(
            "Evaluated {} DOM rules against {}: {} passed",
            results.len(),
            dom_ref.path,
            results.iter().filter(|r| r.passed).count()
        );
        results
    }

    pub async fn evaluate_console_validations(
        &self,
        spec: &ConsoleValidationSpec,
        console_ref: Option<&StorageRef>,
    ) -> Vec<AssertionResult> {
        let checks = spec.checks();
        if checks.is_empty() {
            return Vec::new();
        }
        let Some(console_ref) = console_ref else {
            return fail_all_console(&checks, "no console log captured for this checkpoint");
        };

        let entries = match self.console.load_console(console_ref).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to load console log {}: {}", console_ref.path, e);
                return fail_all_console(&checks, &format!("failed to load console log: {}", e));
            }
        };

        let results = check_console(&entries, &spec.ignore_patterns, &checks);
        debug!(
            "Evaluated {} console rules against {}: {} passed",
            results.len(),
            console_ref.path,
            results.iter().filter(|r| r.passed).count()
        );
        results
    }
}

fn fail_all_dom(checks: &[DomCheck<'_>], message: &str) -> Vec<AssertionResult> {
    checks
        .iter()
        .map(|c| AssertionResult::fail(c.kind(), c.selector(), message))
        .collect()
}

fn fail_all_console(checks: &[ConsoleCheck<'_>], message: &str) -> Vec<AssertionResult> {
    checks
        .iter()
        .map(|c| AssertionResult::fail(c.kind(), c.target(), message))
        .collect()
}

fn check_dom(html: &str, checks: &[DomCheck<'_>]) -> Vec<AssertionResult> {
    let doc = Html::parse_document(html);
    checks.iter().map(|check| check_dom_rule(&doc, check)).collect()
}

fn check_dom_rule(doc: &Html, check: &DomCheck<'_>) -> AssertionResult {
    let kind = check.kind();
    let target = check.selector();
    let selector = match Selector::parse(target) {
        Ok(s) => s,
        Err(e) => return AssertionResult::fail(kind, target, format!("invalid selector: {}", e)),
    };
    let first = doc.select(&selector).next();
    let result = |passed: bool, message: String| AssertionResult::new(kind, target, passed, message);

    match check {
        DomCheck::Exists(_) => match first {
            Some(_) => result(true, "element exists".into()),
            None => result(false, "no element matches".into()),
        },
        DomCheck::NotExists(_) => match first {
            Some(_) => result(false, "element exists".into()),
            None => result(true, "no element matches".into()),
        },
        DomCheck::Visible(_) => match first {
            Some(el) if !is_hidden(el) => result(true, "element is visible".into()),
            Some(_) => result(false, "element is hidden".into()),
            None => result(false, "no element matches".into()),
        },
        DomCheck::Hidden(_) => match first {
            Some(el) if !is_hidden(el) => result(false, "element is visible".into()),
            Some(_) => result(true, "element is hidden".into()),
            None => result(true, "no element matches".into()),
        },
        DomCheck::Text(rule) => {
            let Some(el) = first else {
                return result(false, "no element matches".into());
            };
            let text = element_text(el);
            match value_matches(&text, &rule.expected, rule.mode) {
                Ok(true) => result(true, format!("text matches '{}'", rule.expected)),
                Ok(false) => result(false, format!("expected '{}', found '{}'", rule.expected, text)),
                Err(e) => result(false, e),
            }
        }
        DomCheck::Attribute(rule) => {
            let Some(el) = first else {
                return result(false, "no element matches".into());
            };
            match (el.value().attr(&rule.attribute), &rule.expected) {
                (None, _) => result(false, format!("attribute '{}' is missing", rule.attribute)),
                (Some(_), None) => result(true, format!("attribute '{}' is present", rule.attribute)),
                (Some(actual), Some(expected)) => match value_matches(actual, expected, rule.mode) {
                    Ok(true) => result(true, format!("{}='{}'", rule.attribute, actual)),
                    Ok(false) => result(
                        false,
                        format!("expected {}='{}', found '{}'", rule.attribute, expected, actual),
                    ),
                    Err(e) => result(false, e),
                },
            }
        }
        DomCheck::Count(rule) => {
            let actual = doc.select(&selector).count();
            let passed = rule.operator.holds(actual, rule.count);
            result(
                passed,
                format!("found {} elements, expected {} {}", actual, rule.operator, rule.count),
            )
        }
    }
}

const NON_RENDERED: &[&str] = &[
    "head", "script", "style", "template", "noscript", "title", "meta", "link",
];

/// Hidden when the element or any ancestor is hidden by markup alone
fn is_hidden(el: ElementRef<'_>) -> bool {
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .any(|e| hides(e.value()))
}

fn hides(el: &Element) -> bool {
    if NON_RENDERED.contains(&el.name()) || el.attr("hidden").is_some() {
        return true;
    }
    if el.name() == "input" && el.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden")) {
        return true;
    }
    if let Some(style) = el.attr("style") {
        let style: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        return style.contains("display:none") || style.contains("visibility:hidden");
    }
    false
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Rule matching; a bad regex is a rule error, not a fallback
fn value_matches(actual: &str, expected: &str, mode: MatchMode) -> std::result::Result<bool, String> {
    match mode {
        MatchMode::Exact => Ok(actual.trim() == expected.trim()),
        MatchMode::Contains => Ok(actual.to_lowercase().contains(&expected.to_lowercase())),
        MatchMode::Regex => Regex::new(expected)
            .map(|re| re.is_match(actual))
            .map_err(|e| format!("invalid regex '{}': {}", expected, e)),
    }
}

fn rule_matcher(rule: &MessageRule) -> std::result::Result<Matcher, String> {
    Matcher::try_new(&rule.pattern, rule.mode).map_err(|e| format!("invalid regex '{}': {}", rule.pattern, e))
}

fn matching<'a>(entries: &'a [ConsoleLogEntry], rule: &MessageRule, matcher: &Matcher) -> Vec<&'a ConsoleLogEntry> {
    entries
        .iter()
        .filter(|e| rule.level.map_or(true, |level| e.level == level))
        .filter(|e| matcher.is_match(&e.message))
        .collect()
}

fn check_console(
    entries: &[ConsoleLogEntry],
    ignore_patterns: &[String],
    checks: &[ConsoleCheck<'_>],
) -> Vec<AssertionResult> {
    let relevant = ErrorFilter::filter_allowed_patterns(entries, ignore_patterns, MatchMode::Contains);
    let count = |level: ConsoleLevel| relevant.iter().filter(|e| e.level == level).count();

    checks
        .iter()
        .map(|check| {
            let kind = check.kind();
            let target = check.target();
            match check {
                ConsoleCheck::MaxErrors(max) | ConsoleCheck::MaxWarnings(max) => {
                    let (level, label) = if matches!(check, ConsoleCheck::MaxErrors(_)) {
                        (ConsoleLevel::Error, "errors")
                    } else {
                        (ConsoleLevel::Warn, "warnings")
                    };
                    let actual = count(level);
                    AssertionResult::new(
                        kind,
                        target,
                        actual <= *max,
                        format!("{} {} (max {})", actual, label, max),
                    )
                }
                ConsoleCheck::Expected(rule) => match rule_matcher(rule) {
                    Ok(matcher) => {
                        let found = matching(entries, rule, &matcher).len();
                        if found > 0 {
                            AssertionResult::new(kind, target, true, format!("found {} matching messages", found))
                        } else {
                            AssertionResult::fail(kind, target, "expected message not found")
                        }
                    }
                    Err(e) => AssertionResult::fail(kind, target, e),
                },
                ConsoleCheck::Forbidden(rule) => match rule_matcher(rule) {
                    Ok(matcher) => {
                        let found = matching(&relevant, rule, &matcher);
                        match found.first() {
                            None => AssertionResult::new(kind, target, true, "no forbidden messages"),
                            Some(first) => AssertionResult::fail(
                                kind,
                                target,
                                format!("{} forbidden messages, first: {}", found.len(), first.message),
                            ),
                        }
                    }
                    Err(e) => AssertionResult::fail(kind, target, e),
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{Category, RefTags};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting<T> {
        value: T,
        loads: AtomicUsize,
    }

    impl<T> Counting<T> {
        fn new(value: T) -> Arc<Self> {
            Arc::new(Self {
                value,
                loads: AtomicUsize::new(0),
            })
        }

        fn loads(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DomSource for Counting<String> {
        async fn load_dom(&self, _: &StorageRef) -> Result<String> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.clone())
        }
    }

    #[async_trait]
    impl ConsoleSource for Counting<Vec<ConsoleLogEntry>> {
        async fn load_console(&self, _: &StorageRef) -> Result<Vec<ConsoleLogEntry>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.clone())
        }
    }

    struct Broken;

    #[async_trait]
    impl DomSource for Broken {
        async fn load_dom(&self, r: &StorageRef) -> Result<String> {
            Err(Error::not_found("html", &r.path))
        }
    }

    fn any_ref() -> StorageRef {
        StorageRef {
            category: Category::Html,
            test_id: "t".into(),
            path: "html/t/x.manifest".into(),
            size: 0,
            hash: String::new(),
            timestamp: Utc::now(),
            compressed: false,
            tags: RefTags::default(),
        }
    }

    const PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Shop</title></head>
<body>
  <h1 id="title">Welcome  back</h1>
  <nav><a class="link" href="/a">A</a><a class="link" href="/b">B</a><a class="link active" href="/c">C</a></nav>
  <div id="modal" style="display: none"><button id="close">Close</button></div>
  <p hidden class="note">secret</p>
  <input type="hidden" name="csrf" value="abc">
  <img src="/logo.png" alt="Logo">
</body></html>"#;

    fn engine_with(html: &str, logs: Vec<ConsoleLogEntry>) -> (AssertionEngine, Arc<Counting<String>>, Arc<Counting<Vec<ConsoleLogEntry>>>) {
        let dom = Counting::new(html.to_string());
        let console = Counting::new(logs);
        let engine = AssertionEngine::new(dom.clone(), console.clone());
        (engine, dom, console)
    }

    #[tokio::test]
    async fn test_dom_rules() {
        let (engine, dom, _) = engine_with(PAGE, Vec::new());
        let spec = DomValidationSpec {
            exists: vec!["#title".into(), "#missing".into()],
            not_exists: vec![".error-banner".into()],
            visible: vec!["h1".into(), "#close".into()],
            hidden: vec!["#modal".into(), "p.note".into(), "input[name=csrf]".into(), ".absent".into()],
            text_content: vec![
                TextRule {
                    selector: "#title".into(),
                    expected: "Welcome back".into(),
                    mode: MatchMode::Exact,
                },
                TextRule {
                    selector: "#title".into(),
                    expected: "^Welcome".into(),
                    mode: MatchMode::Regex,
                },
            ],
            attributes: vec![
                AttributeRule {
                    selector: "img".into(),
                    attribute: "alt".into(),
                    expected: Some("Logo".into()),
                    mode: MatchMode::Exact,
                },
                AttributeRule {
                    selector: "a.active".into(),
                    attribute: "href".into(),
                    expected: Some("/c".into()),
                    mode: MatchMode::Contains,
                },
                AttributeRule {
                    selector: "img".into(),
                    attribute: "title".into(),
                    expected: None,
                    mode: MatchMode::Exact,
                },
            ],
            count: vec![
                CountRule {
                    selector: "nav a.link".into(),
                    operator: CountOperator::Equal,
                    count: 3,
                },
                CountRule {
                    selector: "a".into(),
                    operator: CountOperator::LessThan,
                    count: 3,
                },
            ],
        };

        let results = engine.evaluate_dom_validations(&spec, Some(&any_ref())).await;
        let passed: Vec<bool> = results.iter().map(|r| r.passed).collect();
        assert_eq!(
            passed,
            vec![
                true, false, // exists
                true, // not_exists
                true, false, // visible
                true, true, true, true, // hidden
                true, true, // text
                true, true, false, // attributes
                true, false, // count
            ]
        );
        assert_eq!(dom.loads(), 1);
    }

    #[tokio::test]
    async fn test_malformed_rules_fail_alone() {
        let (engine, _, _) = engine_with(PAGE, Vec::new());
        let spec = DomValidationSpec {
            exists: vec!["h1[".into(), "h1".into()],
            text_content: vec![TextRule {
                selector: "h1".into(),
                expected: "(".into(),
                mode: MatchMode::Regex,
            }],
            ..Default::default()
        };
        let results = engine.evaluate_dom_validations(&spec, Some(&any_ref())).await;
        assert!(!results[0].passed);
        assert!(results[0].message.contains("invalid selector"));
        assert!(results[1].passed);
        assert!(results[2].message.contains("invalid regex"));
    }

    #[tokio::test]
    async fn test_missing_or_unloadable_dom_fails_everything() {
        let (engine, dom, _) = engine_with(PAGE, Vec::new());
        let spec = DomValidationSpec {
            exists: vec!["h1".into()],
            not_exists: vec![".x".into()],
            ..Default::default()
        };
        let results = engine.evaluate_dom_validations(&spec, None).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.passed));
        assert_eq!(dom.loads(), 0);

        let broken = AssertionEngine::new(Arc::new(Broken), Counting::new(Vec::<ConsoleLogEntry>::new()));
        let results = broken.evaluate_dom_validations(&spec, Some(&any_ref())).await;
        assert!(results.iter().all(|r| !r.passed && r.message.contains("failed to load")));
    }

    #[tokio::test]
    async fn test_empty_spec_reads_nothing() {
        let (engine, dom, console) = engine_with(PAGE, Vec::new());
        let r = any_ref();
        assert!(engine.evaluate_dom_validations(&DomValidationSpec::default(), Some(&r)).await.is_empty());
        assert!(engine
            .evaluate_console_validations(&ConsoleValidationSpec::default(), Some(&r))
            .await
            .is_empty());
        assert_eq!(dom.loads() + console.loads(), 0);
    }

    #[tokio::test]
    async fn test_console_rules_load_once() {
        let logs = vec![
            ConsoleLogEntry::new(ConsoleLevel::Info, "App ready"),
            ConsoleLogEntry::new(ConsoleLevel::Warn, "Download the React DevTools"),
            ConsoleLogEntry::new(ConsoleLevel::Error, "favicon.ico 404 (Not Found)"),
            ConsoleLogEntry::new(ConsoleLevel::Error, "Uncaught TypeError: cart is undefined"),
        ];
        let (engine, _, console) = engine_with("", logs);
        let spec = ConsoleValidationSpec {
            max_errors: Some(1),
            max_warnings: Some(0),
            expected_messages: vec![
                MessageRule {
                    pattern: "app ready".into(),
                    mode: MatchMode::Contains,
                    level: Some(ConsoleLevel::Info),
                },
                MessageRule {
                    pattern: "App ready".into(),
                    mode: MatchMode::Exact,
                    level: Some(ConsoleLevel::Error),
                },
            ],
            forbidden_messages: vec![MessageRule {
                pattern: r"TypeError:.*undefined".into(),
                mode: MatchMode::Regex,
                level: None,
            }],
            ignore_patterns: vec!["favicon".into(), "DevTools".into()],
        };

        let results = engine.evaluate_console_validations(&spec, Some(&any_ref())).await;
        assert_eq!(results.len(), 5);
        assert_eq!(console.loads(), 1);

        let passed: Vec<bool> = results.iter().map(|r| r.passed).collect();
        assert_eq!(passed, vec![true, true, true, false, false]);
        assert_eq!(results[0].kind, AssertionKind::MaxErrors);
        assert!(results[4].message.contains("cart is undefined"));
    }

    #[tokio::test]
    async fn test_console_bad_regex_fails_only_its_rule() {
        let (engine, _, _) = engine_with("", vec![ConsoleLogEntry::new(ConsoleLevel::Error, "boom")]);
        let spec = ConsoleValidationSpec {
            max_errors: Some(5),
            forbidden_messages: vec![MessageRule {
                pattern: "[boom".into(),
                mode: MatchMode::Regex,
                level: None,
            }],
            ..Default::default()
        };
        let results = engine.evaluate_console_validations(&spec, Some(&any_ref())).await;
        assert!(results[0].passed);
        assert!(!results[1].passed);
        assert!(results[1].message.contains("invalid regex"));
    }
}
