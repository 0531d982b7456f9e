//! Recipient bucketing.
//!
//! Classifies the addresses on an inbound message against the sender's
//! permitted legislators. Every addressed email lands in exactly one bucket;
//! the catch-all address is consumed and expands to every contactable
//! permitted legislator.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use utoipa::ToSchema;

use super::types::Legislator;
use crate::config::EmailConfig;

/// Address normalization shared by bucketing and legislator lookups.
#[derive(Debug, Clone)]
pub struct EmailRouting {
    catch_all: String,
    public_suffix: String,
    legislator_suffix: String,
}

impl EmailRouting {
    #[must_use]
    pub fn new(catch_all: &str, public_domain: &str, legislator_domain: &str) -> Self {
        let mut routing = Self {
            catch_all: String::new(),
            public_suffix: format!("@{}", public_domain.trim().to_lowercase()),
            legislator_suffix: format!("@{}", legislator_domain.trim().to_lowercase()),
        };
        routing.catch_all = routing.normalize(catch_all);
        routing
    }

    #[must_use]
    pub fn from_config(config: &EmailConfig) -> Self {
        Self::new(
            &config.catch_all,
            &config.public_domain,
            &config.legislator_domain,
        )
    }

    /// Lower-case and move public-domain addresses onto the legislator domain.
    #[must_use]
    pub fn normalize(&self, email: &str) -> String {
        let lowered = email.trim().to_lowercase();
        match lowered.strip_suffix(&self.public_suffix) {
            Some(local) => format!("{local}{}", self.legislator_suffix),
            None => lowered,
        }
    }

    #[must_use]
    pub fn is_catch_all(&self, email: &str) -> bool {
        self.normalize(email) == self.catch_all
    }

    /// Index legislators by normalized email for [`bucket_recipients`].
    #[must_use]
    pub fn directory(&self, legislators: Vec<Legislator>) -> HashMap<String, Legislator> {
        legislators
            .into_iter()
            .map(|l| (self.normalize(&l.email), l))
            .collect()
    }
}

/// An addressed email that matched a legislator outside `contactable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MatchedRecipient {
    pub address: String,
    pub legislator: Legislator,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RecipientBuckets {
    /// De-duplicated by bioguide id, in first-seen order
    pub contactable: Vec<Legislator>,
    /// Addressed emails (other than the catch-all) that resolved into `contactable`
    pub contactable_addresses: Vec<String>,
    /// Addresses that match no legislator
    pub non_existent: Vec<String>,
    /// Legislators who do not currently take messages
    pub uncontactable: Vec<MatchedRecipient>,
    /// Legislators outside the sender's district
    pub does_not_represent: Vec<MatchedRecipient>,
    /// Whether the catch-all address was present
    pub used_catch_all: bool,
}

impl RecipientBuckets {
    #[must_use]
    pub fn has_contactable(&self) -> bool {
        !self.contactable.is_empty()
    }

    fn add_contactable(&mut self, legislator: &Legislator) {
        if !self
            .contactable
            .iter()
            .any(|l| l.bioguide_id == legislator.bioguide_id)
        {
            self.contactable.push(legislator.clone());
        }
    }
}

/// Sort addressed emails into buckets.
///
/// `directory` maps normalized email to legislator (see
/// [`EmailRouting::directory`]); lookups are case-insensitive.
#[must_use]
pub fn bucket_recipients(
    permitted: &[Legislator],
    addressed: &[String],
    routing: &EmailRouting,
    directory: &HashMap<String, Legislator>,
) -> RecipientBuckets {
    let permitted_ids: HashSet<&str> = permitted.iter().map(|l| l.bioguide_id.as_str()).collect();
    let mut buckets = RecipientBuckets::default();

    if addressed.iter().any(|email| routing.is_catch_all(email)) {
        buckets.used_catch_all = true;
        for legislator in permitted.iter().filter(|l| l.contactable) {
            buckets.add_contactable(legislator);
        }
    }

    for email in addressed.iter().filter(|email| !routing.is_catch_all(email)) {
        let Some(legislator) = directory.get(&routing.normalize(email)) else {
            buckets.non_existent.push(email.clone());
            continue;
        };

        if !legislator.contactable {
            buckets.uncontactable.push(MatchedRecipient {
                address: email.clone(),
                legislator: legislator.clone(),
            });
        } else if !permitted_ids.contains(legislator.bioguide_id.as_str()) {
            buckets.does_not_represent.push(MatchedRecipient {
                address: email.clone(),
                legislator: legislator.clone(),
            });
        } else {
            buckets.add_contactable(legislator);
            buckets.contactable_addresses.push(email.clone());
        }
    }

    buckets
}
