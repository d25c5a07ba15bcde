//! CreateCollection metadata validation. Violations are accumulated and
//! reported together rather than failing on the first bad field.

use crate::error::TxError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static SHORTNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d*[A-Za-z_][A-Za-z0-9_]*$").unwrap());
static EXTERNAL_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]+://\S*$").unwrap());

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub shortname: String,
    pub category_id: Option<u32>,
    #[serde(default)]
    pub banner_image: Option<String>,
    #[serde(default)]
    pub logo_image: Option<String>,
    #[serde(default)]
    pub featured_image: Option<String>,
    #[serde(default)]
    pub external_link: Option<String>,
    #[serde(default)]
    pub discord_link: Option<String>,
    #[serde(default)]
    pub telegram_link: Option<String>,
    #[serde(default)]
    pub instagram_user_name: Option<String>,
    #[serde(default)]
    pub twitter_user_name: Option<String>,
}

fn check_len(errors: &mut Vec<String>, field: &str, value: &str, min: usize, max: usize) {
    if value.len() < min {
        errors.push(format!("{field} shorter than {min}"));
    }
    if value.len() > max {
        errors.push(format!("{field} longer than {max}"));
    }
}

fn check_optional(
    errors: &mut Vec<String>,
    field: &str,
    value: &Option<String>,
    min: usize,
    max: usize,
    pattern: Option<&Regex>,
) {
    let Some(v) = value else { return };
    if v.is_empty() {
        return;
    }
    check_len(errors, field, v, min, max);
    if let Some(re) = pattern {
        if !re.is_match(v) {
            errors.push(format!("{field} does not match the required pattern"));
        }
    }
}

impl CollectionMetadata {
    pub fn validate(&self) -> Result<(), TxError> {
        let mut errors = Vec::new();

        check_len(&mut errors, "shortname", &self.shortname, 3, 64);
        if !SHORTNAME_RE.is_match(&self.shortname) {
            errors.push("shortname does not match the required pattern".into());
        }
        if self.category_id.is_none() {
            errors.push("categoryId is required".into());
        }

        check_optional(&mut errors, "bannerImage", &self.banner_image, 4, 256, None);
        check_optional(&mut errors, "logoImage", &self.logo_image, 4, 256, None);
        check_optional(&mut errors, "featuredImage", &self.featured_image, 4, 256, None);
        check_optional(
            &mut errors,
            "externalLink",
            &self.external_link,
            4,
            64,
            Some(&EXTERNAL_LINK_RE),
        );
        check_optional(&mut errors, "discordLink", &self.discord_link, 3, 64, None);
        check_optional(&mut errors, "telegramLink", &self.telegram_link, 3, 64, None);
        check_optional(
            &mut errors,
            "instagramUserName",
            &self.instagram_user_name,
            3,
            64,
            None,
        );
        check_optional(
            &mut errors,
            "twitterUserName",
            &self.twitter_user_name,
            3,
            64,
            None,
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(TxError::InvalidMetadata(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> CollectionMetadata {
        CollectionMetadata {
            shortname: "punks_2024".into(),
            category_id: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn minimal_valid_metadata() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn shortname_pattern() {
        let mut m = valid();
        m.shortname = "12punks".into(); // digits must be followed by a letter/underscore
        assert!(m.validate().is_ok());
        m.shortname = "1234".into();
        assert!(m.validate().is_err());
        m.shortname = "has space".into();
        assert!(m.validate().is_err());
    }

    #[test]
    fn errors_are_accumulated() {
        let m = CollectionMetadata {
            shortname: "a".into(), // too short AND fine pattern-wise
            category_id: None,
            external_link: Some("not-a-url".into()),
            ..Default::default()
        };
        let err = m.validate().unwrap_err();
        let TxError::InvalidMetadata(msg) = err else {
            panic!("wrong error kind")
        };
        assert!(msg.contains("shortname"));
        assert!(msg.contains("categoryId"));
        assert!(msg.contains("externalLink"));
    }

    #[test]
    fn external_link_scheme_required() {
        let mut m = valid();
        m.external_link = Some("https://example.org/x".into());
        assert!(m.validate().is_ok());
        m.external_link = Some("example.org/x".into());
        assert!(m.validate().is_err());
    }
}
