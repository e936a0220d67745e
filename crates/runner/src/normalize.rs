//! Declarative page normalization
//!
//! Rules are turned into small scripts evaluated in the page. A rule that
//! matches nothing, or whose script throws, is reported as a
//! `NormalizationFailure` and otherwise ignored.

use tracing::{debug, warn};

use sitediff_common::{NormalizationAction, NormalizationRule, SiteDiffError, SiteDiffResult};

use crate::browser::BrowserSession;

/// Result of applying one rule
#[derive(Debug)]
pub enum RuleOutcome {
    /// The rule touched this many elements
    Applied { selector: String, count: u64 },

    /// Best-effort failure; capture continues
    Skipped(SiteDiffError),
}

/// Build the in-page script for a rule. The script evaluates to the number
/// of elements it touched.
pub fn rule_script(rule: &NormalizationRule) -> SiteDiffResult<String> {
    let selector = serde_json::to_string(&rule.selector)?;

    let body = match &rule.action {
        NormalizationAction::Hide => r#"
    for (const el of nodes) {
      el.style.setProperty('visibility', 'hidden', 'important');
      el.style.setProperty('display', 'none', 'important');
    }"#
        .to_string(),
        NormalizationAction::Remove => r#"
    for (const el of nodes) {
      el.remove();
    }"#
        .to_string(),
        NormalizationAction::Fill { value } => format!(
            r#"
    const value = {value};
    for (const el of nodes) {{
      const tag = el.tagName.toLowerCase();
      const type = (el.getAttribute('type') || '').toLowerCase();
      if (tag === 'select') {{
        const option = Array.from(el.options).find((o) => o.value !== '');
        if (option) {{
          el.value = option.value;
        }}
      }} else if (type === 'checkbox' || type === 'radio') {{
        el.checked = true;
      }} else if (type === 'email') {{
        el.value = value.includes('@') ? value : value + '@example.com';
      }} else if (type === 'number' || type === 'range') {{
        el.value = '1';
      }} else if (type === 'tel') {{
        el.value = '5555555555';
      }} else if (tag === 'input' || tag === 'textarea') {{
        el.value = value;
      }} else {{
        continue;
      }}
      el.dispatchEvent(new Event('input', {{ bubbles: true }}));
      el.dispatchEvent(new Event('change', {{ bubbles: true }}));
    }}"#,
            value = serde_json::to_string(value)?
        ),
    };

    Ok(format!(
        r#"(() => {{
    const nodes = Array.from(document.querySelectorAll({selector}));{body}
    return nodes.length;
}})()"#,
        selector = selector,
        body = body
    ))
}

/// Apply every rule in order. Never fails the capture.
pub async fn apply_rules(
    session: &mut dyn BrowserSession,
    rules: &[NormalizationRule],
) -> Vec<RuleOutcome> {
    let mut outcomes = Vec::with_capacity(rules.len());

    for rule in rules {
        let outcome = match apply_rule(session, rule).await {
            Ok(count) => {
                debug!(
                    "Normalization '{}' ({}) touched {} element(s)",
                    rule.selector,
                    rule.action.name(),
                    count
                );
                RuleOutcome::Applied {
                    selector: rule.selector.clone(),
                    count,
                }
            }
            Err(e) => {
                warn!("{}", e);
                RuleOutcome::Skipped(e)
            }
        };
        outcomes.push(outcome);
    }

    outcomes
}

async fn apply_rule(
    session: &mut dyn BrowserSession,
    rule: &NormalizationRule,
) -> SiteDiffResult<u64> {
    let failure = |reason: String| SiteDiffError::NormalizationFailure {
        selector: rule.selector.clone(),
        reason,
    };

    let script = rule_script(rule).map_err(|e| failure(e.to_string()))?;
    let value = session
        .evaluate(&script)
        .await
        .map_err(|e| failure(e.to_string()))?;

    match value.as_u64() {
        Some(0) => Err(failure("no matching element".to_string())),
        Some(count) => Ok(count),
        None => Err(failure(format!("unexpected script result {}", value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hide_script_quotes_selector() {
        let rule = NormalizationRule {
            selector: r#"div[data-banner="cookie"]"#.to_string(),
            action: NormalizationAction::Hide,
        };
        let script = rule_script(&rule).unwrap();
        assert!(script.starts_with("(() => {"));
        assert!(script.contains(r#"document.querySelectorAll("div[data-banner=\"cookie\"]")"#));
        assert!(script.contains("'visibility', 'hidden', 'important'"));
        assert!(script.trim_end().ends_with("})()"));
    }

    #[test]
    fn test_fill_script_embeds_value() {
        let rule = NormalizationRule {
            selector: "form [required]".to_string(),
            action: NormalizationAction::Fill {
                value: "it's a test".to_string(),
            },
        };
        let script = rule_script(&rule).unwrap();
        assert!(script.contains(r#"const value = "it's a test";"#));
        assert!(script.contains("new Event('change', { bubbles: true })"));
    }

    #[test]
    fn test_remove_script() {
        let rule = NormalizationRule {
            selector: ".chat-widget".to_string(),
            action: NormalizationAction::Remove,
        };
        assert!(rule_script(&rule).unwrap().contains("el.remove();"));
    }
}
