//! Pure template renderer.
//!
//! Supported syntax:
//! - `{{var}}` and `{{var.path}}` — literal substitution
//! - `{{#if var}}...{{/if}}` — included when `var` is truthy
//! - `{{#each list}}...{{/each}}` — repeated per item, exposing `{{this}}`,
//!   `{{@index}}` and `{{list.prop}}` inside the block
//!
//! Missing variables render as the empty string, never an error. Rendering
//! has no side effects, so templates are safe to unit test exhaustively.

use serde_json::Value;

use courier_common::types::{RenderedContent, Template};

/// Render a stored template with the given variables.
pub fn render(template: &Template, variables: &Value) -> RenderedContent {
    RenderedContent {
        subject: template.subject.as_deref().map(|s| render_str(s, variables)),
        title: template.title.as_deref().map(|s| render_str(s, variables)),
        content: render_str(&template.content, variables),
        html_content: template
            .html_content
            .as_deref()
            .map(|s| render_str(s, variables)),
    }
}

/// Render a single template string with the given variables.
pub fn render_str(input: &str, variables: &Value) -> String {
    let scope = Scope {
        vars: variables,
        each: None,
    };
    render_scope(input, &scope)
}

/// Variable scope: the request variables plus, inside an `{{#each}}` block,
/// the current item frame.
struct Scope<'a> {
    vars: &'a Value,
    each: Option<EachFrame<'a>>,
}

struct EachFrame<'a> {
    name: &'a str,
    item: &'a Value,
    index: usize,
}

fn render_scope(input: &str, scope: &Scope<'_>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let tag_start = open + 2;
        let Some(close) = rest[tag_start..].find("}}") else {
            // unterminated tag: emit the remainder literally
            out.push_str(&rest[open..]);
            return out;
        };
        let tag = rest[tag_start..tag_start + close].trim();
        let after_tag = tag_start + close + 2;

        if let Some(cond) = tag.strip_prefix("#if ") {
            match find_block_end(&rest[after_tag..], "if") {
                Some((body_len, consumed)) => {
                    let body = &rest[after_tag..after_tag + body_len];
                    if truthy(resolve(scope, cond.trim())) {
                        out.push_str(&render_scope(body, scope));
                    }
                    rest = &rest[after_tag + consumed..];
                }
                None => {
                    // unmatched open: emit literally and move on
                    out.push_str(&rest[open..after_tag]);
                    rest = &rest[after_tag..];
                }
            }
        } else if let Some(list) = tag.strip_prefix("#each ") {
            match find_block_end(&rest[after_tag..], "each") {
                Some((body_len, consumed)) => {
                    let body = &rest[after_tag..after_tag + body_len];
                    let name = list.trim();
                    if let Some(Value::Array(items)) = resolve(scope, name) {
                        for (index, item) in items.iter().enumerate() {
                            let inner = Scope {
                                vars: scope.vars,
                                each: Some(EachFrame { name, item, index }),
                            };
                            out.push_str(&render_scope(body, &inner));
                        }
                    }
                    rest = &rest[after_tag + consumed..];
                }
                None => {
                    out.push_str(&rest[open..after_tag]);
                    rest = &rest[after_tag..];
                }
            }
        } else if tag.starts_with('/') {
            // stray close tag: swallow
            rest = &rest[after_tag..];
        } else {
            if let Some(value) = resolve(scope, tag) {
                out.push_str(&value_to_string(&value));
            }
            rest = &rest[after_tag..];
        }
    }

    out.push_str(rest);
    out
}

/// Find the end of the current `{{#kind}}` block, honoring nesting of the
/// same kind. Returns `(body_len, consumed)` relative to the slice start,
/// where `consumed` includes the closing tag.
fn find_block_end(s: &str, kind: &str) -> Option<(usize, usize)> {
    let open_prefix = format!("#{kind} ");
    let close = format!("/{kind}");
    let mut depth = 1u32;
    let mut pos = 0;

    while let Some(i) = s[pos..].find("{{") {
        let tag_start = pos + i + 2;
        let j = s[tag_start..].find("}}")?;
        let tag = s[tag_start..tag_start + j].trim();
        let tag_end = tag_start + j + 2;

        if tag.starts_with(&open_prefix) {
            depth += 1;
        } else if tag == close {
            depth -= 1;
            if depth == 0 {
                return Some((pos + i, tag_end));
            }
        }
        pos = tag_end;
    }
    None
}

/// Resolve a tag against the scope. Inside an `{{#each}}` block, `this`,
/// `@index` and `listname.prop` refer to the current item.
fn resolve(scope: &Scope<'_>, key: &str) -> Option<Value> {
    if let Some(frame) = &scope.each {
        if key == "this" {
            return Some(frame.item.clone());
        }
        if key == "@index" {
            return Some(Value::from(frame.index));
        }
        if key == frame.name {
            return Some(frame.item.clone());
        }
        if let Some(prop) = key.strip_prefix(frame.name)
            && let Some(prop) = prop.strip_prefix('.')
        {
            return lookup_path(frame.item, prop).cloned();
        }
    }
    lookup_path(scope.vars, key).cloned()
}

/// Walk a dot-separated path through a JSON value.
fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Truthiness for `{{#if}}`: missing, null, false, zero, empty string and
/// empty array are falsy.
fn truthy(value: Option<Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(_)) => true,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_literal_substitution() {
        let out = render_str(
            "Order {{orderNumber}} for {{customer.name}}",
            &json!({"orderNumber": "ORD-1", "customer": {"name": "Ada"}}),
        );
        assert_eq!(out, "Order ORD-1 for Ada");
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let out = render_str("Hello {{name}}!", &json!({}));
        assert_eq!(out, "Hello !");
    }

    #[test]
    fn test_number_and_bool_substitution() {
        let out = render_str("{{count}} items, gift: {{gift}}", &json!({"count": 3, "gift": true}));
        assert_eq!(out, "3 items, gift: true");
    }

    #[test]
    fn test_if_truthy_includes_block() {
        let out = render_str(
            "{{#if tracking}}Track: {{tracking}}{{/if}}",
            &json!({"tracking": "TRK-9"}),
        );
        assert_eq!(out, "Track: TRK-9");
    }

    #[test]
    fn test_if_falsy_skips_block() {
        for vars in [json!({}), json!({"tracking": ""}), json!({"tracking": false})] {
            let out = render_str("a{{#if tracking}}X{{/if}}b", &vars);
            assert_eq!(out, "ab");
        }
    }

    #[test]
    fn test_nested_if() {
        let out = render_str(
            "{{#if a}}A{{#if b}}B{{/if}}{{/if}}",
            &json!({"a": true, "b": true}),
        );
        assert_eq!(out, "AB");
        let out = render_str("{{#if a}}A{{#if b}}B{{/if}}{{/if}}", &json!({"a": true}));
        assert_eq!(out, "A");
    }

    #[test]
    fn test_each_this_and_index() {
        let out = render_str(
            "{{#each items}}{{@index}}:{{this}} {{/each}}",
            &json!({"items": ["a", "b"]}),
        );
        assert_eq!(out, "0:a 1:b ");
    }

    #[test]
    fn test_each_item_property() {
        let out = render_str(
            "{{#each lines}}{{lines.name}} x{{lines.qty}}; {{/each}}",
            &json!({"lines": [{"name": "Mug", "qty": 2}, {"name": "Pen", "qty": 1}]}),
        );
        assert_eq!(out, "Mug x2; Pen x1; ");
    }

    #[test]
    fn test_each_missing_list_renders_empty() {
        let out = render_str("a{{#each items}}X{{/each}}b", &json!({}));
        assert_eq!(out, "ab");
    }

    #[test]
    fn test_no_unresolved_tokens_when_vars_present() {
        let out = render_str(
            "Order {{orderNumber}} {{#if total}}total {{total}}{{/if}}",
            &json!({"orderNumber": "ORD-1", "total": "9.99"}),
        );
        assert!(!out.contains("{{"));
        assert!(!out.contains("}}"));
    }

    #[test]
    fn test_unterminated_tag_is_literal() {
        let out = render_str("Hello {{name", &json!({"name": "Ada"}));
        assert_eq!(out, "Hello {{name");
    }

    #[test]
    fn test_render_full_template() {
        let template = Template {
            id: uuid::Uuid::new_v4(),
            notification_type: courier_common::types::NotificationType::OrderConfirmation,
            channel: courier_common::types::Channel::Email,
            locale: "en".to_string(),
            tenant_id: None,
            version: 1,
            subject: Some("Order {{orderNumber}} confirmed".to_string()),
            title: None,
            content: "Thanks! Your order {{orderNumber}} is confirmed.".to_string(),
            html_content: Some("<b>{{orderNumber}}</b>".to_string()),
            variables: json!(["orderNumber"]),
            created_at: chrono::Utc::now(),
        };
        let content = render(&template, &json!({"orderNumber": "ORD-1"}));
        assert_eq!(content.subject.as_deref(), Some("Order ORD-1 confirmed"));
        assert_eq!(content.content, "Thanks! Your order ORD-1 is confirmed.");
        assert_eq!(content.html_content.as_deref(), Some("<b>ORD-1</b>"));
        assert!(content.title.is_none());
    }
}
