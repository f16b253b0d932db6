//! `{key}` placeholder substitution and recipient handling.
//!
//! A placeholder is a run of ASCII word characters in single braces. Values
//! come from a flat JSON context; anything the context cannot fill is left in
//! place so a half-filled template is still readable.

use std::str::FromStr;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::mapping::MappingRecord;

/// Flat key/value context a template is rendered against
pub type Context = Map<String, Value>;

/// Context key whose value is added to cc when the mapping asks for it
pub const ACTOR_EMAIL: &str = "actor_email";
pub const ACTOR_NAME: &str = "actor_name";

lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"\{([A-Za-z0-9_]+)\}").unwrap();
}

/// Recipients and rendered text for one notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailData {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
    pub mapping_id: i64,
}

/// Why a trigger produced no email
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// No active mapping matched any candidate
    NotFound,
    /// The mapping rendered to no valid recipient
    NoRecipients { mapping_id: i64 },
}

/// Replace every `{key}` found in `context`.
///
/// Strings are inserted as-is, numbers and booleans in display form, arrays
/// and objects as compact JSON. Unknown keys and `null` values keep the token.
pub fn substitute(text: &str, context: &Context) -> String {
    TOKEN
        .replace_all(text, |caps: &Captures| match context.get(&caps[1]) {
            Some(Value::Null) | None => caps[0].to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        })
        .into_owned()
}

/// Substitute inside every string element; other values pass through
pub fn substitute_values(values: &[Value], context: &Context) -> Vec<Value> {
    values
        .iter()
        .map(|value| match value {
            Value::String(s) => Value::String(substitute(s, context)),
            other => other.clone(),
        })
        .collect()
}

fn substitute_all(values: &[String], context: &Context) -> Vec<String> {
    values.iter().map(|value| substitute(value, context)).collect()
}

pub fn contains_placeholder(text: &str) -> bool {
    TOKEN.is_match(text)
}

pub fn is_valid_email(value: &str) -> bool {
    lettre::Address::from_str(value).is_ok()
}

/// Trim, drop invalid addresses and deduplicate, keeping first occurrences.
pub fn normalize_recipients<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut recipients: Vec<String> = Vec::new();
    for value in values {
        let address = value.as_ref().trim();
        if address.is_empty() || !is_valid_email(address) {
            tracing::warn!(address = %address, "Invalid email address dropped");
            continue;
        }
        if !recipients.iter().any(|existing| existing == address) {
            recipients.push(address.to_string());
        }
    }
    recipients
}

/// Render a mapping against `context`.
///
/// A non-empty `actor_email` is appended to cc when the mapping's meta lists
/// `{actor_email}`.
pub fn build_email_data(
    mapping: &MappingRecord,
    context: &Context,
) -> Result<EmailData, ResolveOutcome> {
    let to = substitute_all(&mapping.to, context);
    let mut cc = substitute_all(&mapping.cc, context);

    let actor_token = format!("{{{}}}", ACTOR_EMAIL);
    if mapping.meta.iter().any(|m| *m == actor_token) {
        if let Some(actor_email) = context.get(ACTOR_EMAIL).and_then(Value::as_str) {
            if !actor_email.trim().is_empty() {
                cc.push(actor_email.to_string());
            }
        }
    }

    let to = normalize_recipients(&to);
    let cc = normalize_recipients(&cc);

    if to.is_empty() && cc.is_empty() {
        tracing::warn!(mapping_id = mapping.id, "No valid recipients for email mapping");
        return Err(ResolveOutcome::NoRecipients {
            mapping_id: mapping.id,
        });
    }

    Ok(EmailData {
        to,
        cc,
        subject: substitute(mapping.subject.as_deref().unwrap_or_default(), context),
        body: substitute(mapping.body.as_deref().unwrap_or_default(), context),
        mapping_id: mapping.id,
    })
}

/// One `{key}` token per context key
pub fn placeholders_from_context(context: &Context) -> Vec<String> {
    context.keys().map(|key| format!("{{{}}}", key)).collect()
}

/// Flatten a serializable model's fields into a context, `extra` winning on clashes.
///
/// Models that do not serialize to a JSON object contribute nothing.
pub fn context_from_model<T: Serialize>(model: &T, extra: Context) -> Context {
    let mut context = match serde_json::to_value(model) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => Context::new(),
        Err(e) => {
            tracing::warn!(error = %e, "Model could not be serialized into a context");
            Context::new()
        }
    };
    context.extend(extra);
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn ctx(value: Value) -> Context {
        match value {
            Value::Object(map) => map,
            _ => panic!("context must be an object"),
        }
    }

    fn record(to: &[&str], cc: &[&str], meta: &[&str]) -> MappingRecord {
        MappingRecord {
            id: 11,
            module: "Sales".to_string(),
            menu: "Leads".to_string(),
            task: "Create".to_string(),
            to: to.iter().map(|s| s.to_string()).collect(),
            cc: cc.iter().map(|s| s.to_string()).collect(),
            subject: Some("New Lead: {lead_name}".to_string()),
            body: Some("<p>Lead {lead_name} assigned</p>".to_string()),
            is_active: true,
            meta: meta.iter().map(|s| s.to_string()).collect(),
            last_updated_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_substitute_known_keys() {
        let context = ctx(json!({ "name": "Acme", "count": 3, "vip": true }));
        assert_eq!(
            substitute("{name} has {count} leads, vip={vip}", &context),
            "Acme has 3 leads, vip=true"
        );
    }

    #[test]
    fn test_unknown_and_null_tokens_are_preserved() {
        assert_eq!(substitute("{unknown}", &Context::new()), "{unknown}");

        let context = ctx(json!({ "gone": null }));
        assert_eq!(substitute("x {gone} y", &context), "x {gone} y");
    }

    #[test]
    fn test_non_word_tokens_are_ignored() {
        let context = ctx(json!({ "a-b": "no", "a b": "no" }));
        assert_eq!(substitute("{a-b} {a b} {}", &context), "{a-b} {a b} {}");
    }

    #[test]
    fn test_structured_values_render_as_json() {
        let context = ctx(json!({ "tags": ["a", "b"], "owner": { "id": 1 } }));
        assert_eq!(
            substitute("{tags} {owner}", &context),
            r#"["a","b"] {"id":1}"#
        );
    }

    #[test]
    fn test_substitution_is_idempotent() {
        let context = ctx(json!({ "lead_name": "Acme Corp", "id": 42 }));
        let once = substitute("Lead {lead_name} #{id} {missing}", &context);
        assert_eq!(substitute(&once, &context), once);
    }

    #[test]
    fn test_substitute_values_skips_non_strings() {
        let context = ctx(json!({ "email": "a@b.com" }));
        let values = vec![json!("{email}"), json!(5)];
        assert_eq!(
            substitute_values(&values, &context),
            vec![json!("a@b.com"), json!(5)]
        );
    }

    #[test]
    fn test_normalize_recipients() {
        assert_eq!(
            normalize_recipients(["a@b.com", "a@b.com", " bad "]),
            vec!["a@b.com"]
        );
        assert_eq!(
            normalize_recipients([" A@b.com ", "a@b.com"]),
            vec!["A@b.com", "a@b.com"]
        );
    }

    #[test]
    fn test_build_email_data_adds_actor_to_cc() {
        let mapping = record(&["{owner_email}"], &[], &["{lead_name}", "{actor_email}"]);
        let context = ctx(json!({
            "lead_name": "Acme Corp",
            "owner_email": "owner@example.com",
            "actor_email": "actor@example.com"
        }));

        let data = build_email_data(&mapping, &context).unwrap();
        assert_eq!(data.to, vec!["owner@example.com"]);
        assert_eq!(data.cc, vec!["actor@example.com"]);
        assert_eq!(data.subject, "New Lead: Acme Corp");
        assert_eq!(data.mapping_id, 11);
    }

    #[test]
    fn test_actor_email_ignored_without_meta_flag() {
        let mapping = record(&["ops@example.com"], &[], &[]);
        let context = ctx(json!({ "actor_email": "actor@example.com" }));

        let data = build_email_data(&mapping, &context).unwrap();
        assert!(data.cc.is_empty());
    }

    #[test]
    fn test_unfilled_recipients_yield_no_recipients() {
        let mapping = record(&["{owner_email}"], &["{manager_email}"], &[]);
        assert_eq!(
            build_email_data(&mapping, &Context::new()),
            Err(ResolveOutcome::NoRecipients { mapping_id: 11 })
        );
    }

    #[test]
    fn test_placeholders_from_context() {
        let context = ctx(json!({ "b": 1, "a": 2 }));
        let mut placeholders = placeholders_from_context(&context);
        placeholders.sort();
        assert_eq!(placeholders, vec!["{a}", "{b}"]);
    }

    #[test]
    fn test_context_from_model_merges_extra() {
        #[derive(Serialize)]
        struct Lead {
            id: i64,
            lead_name: String,
        }

        let lead = Lead {
            id: 5,
            lead_name: "Acme".to_string(),
        };
        let context = context_from_model(&lead, ctx(json!({ "lead_name": "Override", "x": 1 })));
        assert_eq!(context["id"], json!(5));
        assert_eq!(context["lead_name"], json!("Override"));
        assert_eq!(context["x"], json!(1));

        let scalar = context_from_model(&7, ctx(json!({ "x": 1 })));
        assert_eq!(scalar.len(), 1);
    }
}
