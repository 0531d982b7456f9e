//! Legislator and district types, plus district lookup API responses.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A congressional district: state plus district number.
///
/// `number` is `None` for state-wide representation (at-large, territories).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct District {
    /// Two-letter USPS code (e.g., "VA")
    pub state: String,
    pub number: Option<i32>,
}

impl District {
    #[must_use]
    pub fn new(state: impl Into<String>, number: Option<i32>) -> Self {
        Self {
            state: state.into(),
            number,
        }
    }
}

impl fmt::Display for District {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.number {
            Some(n) => write!(f, "{}-{n}", self.state),
            None => write!(f, "{}-AL", self.state),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Chamber {
    House,
    Senate,
}

impl Chamber {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::House => "house",
            Self::Senate => "senate",
        }
    }
}

impl FromStr for Chamber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "house" => Ok(Self::House),
            "senate" => Ok(Self::Senate),
            other => Err(format!("unknown chamber '{other}'")),
        }
    }
}

/// A member of Congress (Senator, Representative, Delegate or Commissioner).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Legislator {
    pub id: Uuid,
    /// Bioguide ID (e.g., "A000360")
    pub bioguide_id: String,
    pub chamber: Chamber,
    /// State abbreviation (e.g., "TN")
    pub state: String,
    /// `None` for members elected state-wide
    pub district: Option<i32>,
    /// Short title ("Sen", "Rep", "Del", "Com")
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    /// Contact address in the legislator domain
    pub email: String,
    /// Whether the member currently accepts messages through this service
    pub contactable: bool,
}

impl Legislator {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// State-wide members represent every district of their state.
    #[must_use]
    pub fn represents(&self, district: &District) -> bool {
        self.state.eq_ignore_ascii_case(&district.state)
            && (self.district.is_none() || self.district == district.number)
    }
}

/// One candidate from a district lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DistrictCandidate {
    pub state: String,
    pub district: Option<i32>,
}

impl From<DistrictCandidate> for District {
    fn from(candidate: DistrictCandidate) -> Self {
        Self {
            state: candidate.state,
            number: candidate.district,
        }
    }
}

/// Response from the district locate endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistrictsResponse {
    #[serde(default)]
    pub results: Vec<DistrictCandidate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legislator(state: &str, district: Option<i32>) -> Legislator {
        Legislator {
            id: Uuid::new_v4(),
            bioguide_id: "X000001".into(),
            chamber: if district.is_some() {
                Chamber::House
            } else {
                Chamber::Senate
            },
            state: state.into(),
            district,
            title: "Rep".into(),
            first_name: "Pat".into(),
            last_name: "Example".into(),
            email: "rep.example@opencongress.org".into(),
            contactable: true,
        }
    }

    #[test]
    fn senators_represent_every_district_in_state() {
        let senator = legislator("VA", None);
        assert!(senator.represents(&District::new("VA", Some(8))));
        assert!(senator.represents(&District::new("VA", None)));
        assert!(!senator.represents(&District::new("MD", Some(8))));
    }

    #[test]
    fn representatives_match_their_district_only() {
        let rep = legislator("VA", Some(8));
        assert!(rep.represents(&District::new("VA", Some(8))));
        assert!(!rep.represents(&District::new("VA", Some(11))));
        assert!(!rep.represents(&District::new("VA", None)));
    }

    #[test]
    fn district_display() {
        assert_eq!(District::new("VA", Some(8)).to_string(), "VA-8");
        assert_eq!(District::new("DC", None).to_string(), "DC-AL");
    }

    #[test]
    fn chamber_parses_case_insensitively() {
        assert_eq!("Senate".parse::<Chamber>(), Ok(Chamber::Senate));
        assert_eq!("house".parse::<Chamber>(), Ok(Chamber::House));
        assert!("joint".parse::<Chamber>().is_err());
    }

    #[test]
    fn locate_response_parses_null_district() {
        let json = r#"{"results": [{"state": "DC", "district": null}], "count": 1}"#;
        let response: DistrictsResponse = serde_json::from_str(json).unwrap();
        let district: District = response.results[0].clone().into();
        assert_eq!(district, District::new("DC", None));
    }
}
