//! Field-value resolution for web forms.
//!
//! Starts from a fixed mapping of sender and message attributes onto the
//! service's field tokens, then walks the legislator's required steps.
//! Select fields whose mapped value is not an allowed option get one chosen
//! by [`OptionStrategy`], tried in priority order. Steps that remain without
//! a value are reported and logged; the submission still goes ahead.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use super::types::{FormOption, FormSchema, OptionSet};
use crate::constituents::SenderProfile;
use crate::messages::Message;
use crate::states;

pub const NAME_PREFIX: &str = "$NAME_PREFIX";
pub const NAME_FIRST: &str = "$NAME_FIRST";
pub const NAME_LAST: &str = "$NAME_LAST";
pub const NAME_FULL: &str = "$NAME_FULL";
pub const ADDRESS_STREET: &str = "$ADDRESS_STREET";
pub const ADDRESS_STREET_2: &str = "$ADDRESS_STREET_2";
pub const ADDRESS_CITY: &str = "$ADDRESS_CITY";
pub const ADDRESS_ZIP5: &str = "$ADDRESS_ZIP5";
pub const ADDRESS_ZIP4: &str = "$ADDRESS_ZIP4";
pub const ADDRESS_ZIP_PLUS_4: &str = "$ADDRESS_ZIP_PLUS_4";
pub const EMAIL: &str = "$EMAIL";
pub const SUBJECT: &str = "$SUBJECT";
pub const MESSAGE: &str = "$MESSAGE";
pub const STATE_ABBREV: &str = "$ADDRESS_STATE_POSTAL_ABBREV";
pub const STATE_FULL: &str = "$ADDRESS_STATE_FULL";
pub const PHONE: &str = "$PHONE";

/// How a select option was chosen, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionStrategy {
    /// The mapped value equals an option's value or label, ignoring case and punctuation
    ExactMatch,
    /// An option's label appears in the message, or shares a keyword with it
    CategoryMatch,
    /// The first allowed option
    FirstAvailable,
}

impl OptionStrategy {
    pub const PRIORITY: [Self; 3] = [Self::ExactMatch, Self::CategoryMatch, Self::FirstAvailable];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionChoice {
    pub field: String,
    pub value: String,
    pub strategy: OptionStrategy,
}

/// Field values ready to submit, plus what it took to get there.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedForm {
    pub fields: BTreeMap<String, String>,
    pub choices: Vec<OptionChoice>,
    /// Required steps left without a value
    pub unresolved: Vec<String>,
}

/// The fixed token mapping for a sender and message. Empty values are left
/// out so required steps that need them are reported as unresolved.
#[must_use]
pub fn base_fields(sender: &SenderProfile, message: &Message) -> BTreeMap<String, String> {
    let address = &sender.address;
    let zip_plus_4 = address
        .zip4
        .as_ref()
        .map(|zip4| format!("{}-{zip4}", address.zip5));

    [
        (NAME_PREFIX, Some(address.prefix.clone())),
        (NAME_FIRST, Some(address.first_name.clone())),
        (NAME_LAST, Some(address.last_name.clone())),
        (NAME_FULL, Some(address.full_name())),
        (ADDRESS_STREET, Some(address.street_address.clone())),
        (ADDRESS_STREET_2, Some(address.street_address2.clone())),
        (ADDRESS_CITY, Some(address.city.clone())),
        (ADDRESS_ZIP5, Some(address.zip5.clone())),
        (ADDRESS_ZIP4, address.zip4.clone()),
        (ADDRESS_ZIP_PLUS_4, zip_plus_4),
        (EMAIL, Some(sender.constituent.email.clone())),
        (SUBJECT, Some(message.subject.clone())),
        (MESSAGE, Some(message.body.clone())),
        (STATE_ABBREV, Some(address.state.clone())),
        (
            STATE_FULL,
            states::full_name(&address.state).map(str::to_string),
        ),
        (PHONE, Some(address.phone.clone())),
    ]
    .into_iter()
    .filter_map(|(token, value)| {
        value
            .filter(|v| !v.trim().is_empty())
            .map(|v| (token.to_string(), v))
    })
    .collect()
}

/// Walk a legislator's required steps and fill in select fields.
#[must_use]
pub fn resolve_fields(
    bioguide_id: &str,
    schema: &FormSchema,
    base: &BTreeMap<String, String>,
    message: &Message,
) -> ResolvedForm {
    let mut resolved = ResolvedForm {
        fields: base.clone(),
        ..ResolvedForm::default()
    };
    let text = MessageText::new(&message.subject, &message.body);

    for step in &schema.required_actions {
        let field = step.value.as_str();

        if let Some(options) = step.options.as_ref().filter(|o| !o.is_empty()) {
            let current = resolved.fields.get(field);
            if !current.is_some_and(|v| options.allows(v)) {
                let wanted = exact_match_candidates(field, &resolved.fields);
                if let Some((value, strategy)) = choose_option(options, &wanted, &text) {
                    tracing::debug!(bioguide_id, field, %value, ?strategy, "selected form option");
                    resolved.fields.insert(field.to_string(), value.clone());
                    resolved.choices.push(OptionChoice {
                        field: field.to_string(),
                        value,
                        strategy,
                    });
                }
            }
        }

        if !resolved.fields.contains_key(field) {
            tracing::error!(
                bioguide_id,
                field,
                "required form field has no mapping; submitting without it"
            );
            resolved.unresolved.push(field.to_string());
        }
    }

    resolved
}

/// Values an exact match may compare against: the mapped value, and for
/// state fields the other spelling of the state as well.
fn exact_match_candidates(field: &str, fields: &BTreeMap<String, String>) -> Vec<String> {
    let mut wanted: Vec<String> = fields.get(field).cloned().into_iter().collect();
    let alias = match field {
        STATE_ABBREV => fields.get(STATE_FULL),
        STATE_FULL => fields.get(STATE_ABBREV),
        _ => None,
    };
    wanted.extend(alias.cloned());
    wanted
}

fn choose_option(
    options: &OptionSet,
    wanted: &[String],
    text: &MessageText,
) -> Option<(String, OptionStrategy)> {
    let options = options.options();
    OptionStrategy::PRIORITY.iter().find_map(|&strategy| {
        let chosen = match strategy {
            OptionStrategy::ExactMatch => exact_match(&options, wanted),
            OptionStrategy::CategoryMatch => category_match(&options, text),
            OptionStrategy::FirstAvailable => options.first(),
        };
        chosen.map(|option| (option.value.clone(), strategy))
    })
}

fn exact_match<'a>(options: &'a [FormOption], wanted: &[String]) -> Option<&'a FormOption> {
    let wanted: Vec<String> = wanted
        .iter()
        .map(|w| squash(w))
        .filter(|w| !w.is_empty())
        .collect();
    options
        .iter()
        .find(|o| wanted.contains(&squash(&o.value)) || wanted.contains(&squash(&o.label)))
}

fn category_match<'a>(options: &'a [FormOption], text: &MessageText) -> Option<&'a FormOption> {
    if let Some(option) = options.iter().find(|o| text.contains_phrase(&o.label)) {
        return Some(option);
    }

    let mut best: Option<(&FormOption, usize)> = None;
    for option in options {
        let shared = keywords(&option.label)
            .filter(|k| text.words.contains(k))
            .count();
        if shared > 0 && best.is_none_or(|(_, score)| shared > score) {
            best = Some((option, shared));
        }
    }
    best.map(|(option, _)| option)
}

/// Lower-case alphanumerics only.
fn squash(s: &str) -> String {
    s.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn words(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_lowercase)
}

const STOP_WORDS: &[&str] = &[
    "about", "affairs", "and", "issues", "issue", "other", "general", "policy", "with", "from",
    "that", "this", "your",
];

fn keywords(label: &str) -> impl Iterator<Item = String> + '_ {
    words(label).filter(|w| w.len() >= 4 && !STOP_WORDS.contains(&w.as_str()))
}

struct MessageText {
    /// Words joined by single spaces, padded at both ends
    padded: String,
    words: HashSet<String>,
}

impl MessageText {
    fn new(subject: &str, body: &str) -> Self {
        let all: Vec<String> = words(subject).chain(words(body)).collect();
        Self {
            padded: format!(" {} ", all.join(" ")),
            words: all.into_iter().collect(),
        }
    }

    fn contains_phrase(&self, label: &str) -> bool {
        let phrase: Vec<String> = words(label).collect();
        !phrase.is_empty() && self.padded.contains(&format!(" {} ", phrase.join(" ")))
    }
}
