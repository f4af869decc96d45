//! Rendering of the per-node matcher template.
//!
//! The template is a JSON array of matchers with a `{{NodeName}}` placeholder:
//!
//! ```text
//! [{"name": "instance", "value": "{{NodeName}}", "isRegex": false},
//!  {"name": "alertname", "value": "KubeNodeNotReady", "isRegex": false}]
//! ```
//!
//! `{{.NodeName}}` is accepted as a spelling of the same placeholder.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, SilencerError};
use crate::types::Matcher;

static ACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(.*?)\}\}").unwrap_or_else(|_| unreachable!()));

const NODE_NAME_FIELDS: [&str; 2] = ["NodeName", ".NodeName"];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    NodeName,
}

/// A parsed matcher template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatcherTemplate {
    source: String,
    segments: Vec<Segment>,
}

/// Matcher as written in the template, before required fields are checked.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMatcher {
    name: Option<String>,
    value: Option<String>,
    is_regex: Option<bool>,
    is_equal: Option<bool>,
}

impl RawMatcher {
    fn validate(self, index: usize) -> Result<Matcher> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name");
        }
        if self.value.is_none() {
            missing.push("value");
        }
        if self.is_regex.is_none() {
            missing.push("isRegex");
        }

        match (self.name, self.value, self.is_regex) {
            (Some(name), Some(value), Some(is_regex)) => Ok(Matcher {
                name,
                value,
                is_regex,
                is_equal: self.is_equal,
            }),
            _ => Err(SilencerError::MatcherValidation {
                reason: format!("matcher {index} lacks {}", missing.join(", ")),
            }),
        }
    }
}

impl MatcherTemplate {
    /// Parses the template's placeholder actions.
    ///
    /// # Errors
    ///
    /// Returns `SilencerError::TemplateRender` for an unknown action or an
    /// unterminated `{{`.
    pub fn parse(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let mut segments = Vec::new();
        let mut last = 0;

        for caps in ACTION.captures_iter(&source) {
            let (Some(whole), Some(field)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let field = field.as_str().trim();
            if !NODE_NAME_FIELDS.contains(&field) {
                return Err(SilencerError::TemplateRender {
                    reason: format!("unsupported template action {{{{{field}}}}}"),
                });
            }
            push_literal(&mut segments, &source[last..whole.start()])?;
            segments.push(Segment::NodeName);
            last = whole.end();
        }
        push_literal(&mut segments, &source[last..])?;

        Ok(Self { source, segments })
    }

    /// Returns the template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Renders the template for `node_id` and parses the matchers.
    ///
    /// # Errors
    ///
    /// Returns `SilencerError::TemplateRender` if the rendered text is not a
    /// JSON array of matcher objects, and `SilencerError::MatcherValidation`
    /// if any matcher lacks `name`, `value` or `isRegex`.
    pub fn render(&self, node_id: &str) -> Result<Vec<Matcher>> {
        let escaped = escape_json_string(node_id)?;
        let rendered: String = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.as_str(),
                Segment::NodeName => escaped.as_str(),
            })
            .collect();
        debug!(node = %node_id, rendered = %rendered, "rendered matchers");

        let raw: Vec<RawMatcher> =
            serde_json::from_str(&rendered).map_err(|e| SilencerError::TemplateRender {
                reason: format!("rendered template is not a matcher list: {e}"),
            })?;

        raw.into_iter()
            .enumerate()
            .map(|(index, matcher)| matcher.validate(index))
            .collect()
    }
}

fn push_literal(segments: &mut Vec<Segment>, text: &str) -> Result<()> {
    if text.contains("{{") {
        return Err(SilencerError::TemplateRender {
            reason: "unclosed template action".to_string(),
        });
    }
    if !text.is_empty() {
        segments.push(Segment::Literal(text.to_string()));
    }
    Ok(())
}

/// Escapes `value` for use inside a JSON string literal.
fn escape_json_string(value: &str) -> Result<String> {
    let quoted = serde_json::to_string(value).map_err(|e| SilencerError::TemplateRender {
        reason: e.to_string(),
    })?;
    Ok(quoted[1..quoted.len() - 1].to_string())
}

/// Renders `template` for `node_id` in one step.
///
/// # Errors
///
/// See [`MatcherTemplate::parse`] and [`MatcherTemplate::render`].
pub fn render_matchers(template: &str, node_id: &str) -> Result<Vec<Matcher>> {
    MatcherTemplate::parse(template)?.render(node_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const VALID: &str = r#"[{"name": "instance", "value": "{{NodeName}}", "isRegex": false}, {"name": "alertname", "value": "node_reboot", "isRegex": false}]"#;

    #[test]
    fn renders_node_name() {
        let matchers = render_matchers(VALID, "node1").unwrap();
        assert_eq!(
            matchers,
            vec![
                Matcher::equal("instance", "node1"),
                Matcher::equal("alertname", "node_reboot"),
            ]
        );
    }

    #[test_case("{{.NodeName}}" ; "go field syntax")]
    #[test_case("{{ NodeName }}" ; "padded")]
    #[test_case("{{ .NodeName }}" ; "padded go field syntax")]
    fn accepts_placeholder_spellings(placeholder: &str) {
        let template = format!(r#"[{{"name": "instance", "value": "{placeholder}", "isRegex": false}}]"#);
        let matchers = render_matchers(&template, "worker-2").unwrap();
        assert_eq!(matchers[0].value, "worker-2");
    }

    #[test]
    fn placeholder_may_appear_more_than_once() {
        let template = r#"[{"name": "instance", "value": "{{NodeName}}:9100|{{NodeName}}", "isRegex": true}]"#;
        let matchers = render_matchers(template, "n1").unwrap();
        assert_eq!(matchers[0].value, "n1:9100|n1");
        assert!(matchers[0].is_regex);
    }

    #[test]
    fn keeps_optional_is_equal() {
        let template = r#"[{"name": "severity", "value": "info", "isRegex": false, "isEqual": false}]"#;
        let matchers = render_matchers(template, "n1").unwrap();
        assert_eq!(matchers[0].is_equal, Some(false));
    }

    #[test]
    fn node_name_is_json_escaped() {
        let matchers = render_matchers(VALID, r#"we"ird\node"#).unwrap();
        assert_eq!(matchers[0].value, r#"we"ird\node"#);
    }

    #[test_case(r#"[{name: "instance", "value": "{{NodeName}}", "isRegex": false}]"# ; "unquoted key")]
    #[test_case(r#"[{"name": "instance", "value": "{{NodeName}}"}"# ; "unterminated array")]
    #[test_case(r#"{"name": "instance", "value": "{{NodeName}}", "isRegex": false}"# ; "object instead of array")]
    #[test_case(r#"[{"name": "instance", "value": "{{Node}}", "isRegex": false}]"# ; "unknown field")]
    #[test_case(r#"[{"name": "instance", "value": "{{NodeName", "isRegex": false}]"# ; "unclosed action")]
    fn invalid_template_fails(template: &str) {
        assert!(matches!(
            render_matchers(template, "node1"),
            Err(SilencerError::TemplateRender { .. })
        ));
    }

    #[test]
    fn parse_reports_bad_actions_before_rendering() {
        assert!(matches!(
            MatcherTemplate::parse(r#"[{"name": "x", "value": "{{.Labels}}", "isRegex": false}]"#),
            Err(SilencerError::TemplateRender { .. })
        ));
    }

    #[test_case(r#"[{"name": "instance", "value": "{{NodeName}}"}]"#, "isRegex" ; "missing is regex")]
    #[test_case(r#"[{"value": "{{NodeName}}", "isRegex": false}]"#, "name" ; "missing name")]
    #[test_case(r#"[{"name": "instance", "isRegex": false}]"#, "value" ; "missing value")]
    fn missing_fields_fail_validation(template: &str, field: &str) {
        match render_matchers(template, "node1") {
            Err(SilencerError::MatcherValidation { reason }) => assert!(reason.contains(field)),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn one_invalid_matcher_fails_the_whole_list() {
        let template = r#"[{"name": "instance", "value": "{{NodeName}}", "isRegex": false}, {"name": "alertname", "value": "x"}]"#;
        assert!(matches!(
            render_matchers(template, "node1"),
            Err(SilencerError::MatcherValidation { .. })
        ));
    }

    #[test]
    fn template_without_placeholder_renders_as_is() {
        let template = r#"[{"name": "alertname", "value": "Reboot", "isRegex": false}]"#;
        let parsed = MatcherTemplate::parse(template).unwrap();
        assert_eq!(parsed.as_str(), template);
        assert_eq!(parsed.render("n1").unwrap(), vec![Matcher::equal("alertname", "Reboot")]);
    }
}
