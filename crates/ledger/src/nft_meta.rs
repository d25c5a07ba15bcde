//! MintNft metadata validation: name and image are required; attributes, when
//! present, parse as an array of `{trait_type, maxValue, value}` with name and
//! value required. A "properties" attribute validates value only.

use crate::error::TxError;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftMetadata {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub description: Option<String>,
    /// JSON-encoded attribute array; kept as a string so the content hash
    /// covers the exact user-supplied bytes.
    #[serde(default)]
    pub attributes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAttribute {
    #[serde(rename = "trait_type")]
    pub name: Option<String>,
    #[serde(rename = "maxValue")]
    pub max_value: Option<i64>,
    pub value: Option<i64>,
}

impl AssetAttribute {
    fn validate_full(&self, errors: &mut Vec<String>) {
        if self.name.is_none() {
            errors.push("attribute trait_type is required".into());
        }
        if self.max_value.is_none() {
            errors.push("attribute maxValue is required".into());
        }
        if self.value.is_none() {
            errors.push("attribute value is required".into());
        }
    }

    fn validate_value_only(&self, errors: &mut Vec<String>) {
        if self.name.is_none() {
            errors.push("attribute trait_type is required".into());
        }
        if self.value.is_none() {
            errors.push("attribute value is required".into());
        }
    }
}

impl NftMetadata {
    pub fn validate(&self) -> Result<(), TxError> {
        let mut errors = Vec::new();
        if self.name.is_empty() {
            errors.push("name is required".into());
        }
        if self.image.is_empty() {
            errors.push("image is required".into());
        }
        if let Some(raw) = &self.attributes {
            if !raw.is_empty() {
                match serde_json::from_str::<Vec<AssetAttribute>>(raw) {
                    Ok(attributes) => {
                        for a in &attributes {
                            let is_properties = a
                                .name
                                .as_deref()
                                .map(|n| n.eq_ignore_ascii_case("properties"))
                                .unwrap_or(false);
                            if is_properties {
                                a.validate_value_only(&mut errors);
                            } else {
                                a.validate_full(&mut errors);
                            }
                        }
                    }
                    Err(e) => errors.push(format!("attributes are not a valid array: {e}")),
                }
            }
        }
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

    fn meta(attributes: Option<&str>) -> NftMetadata {
        NftMetadata {
            name: "piece".into(),
            image: "ipfs://bafy".into(),
            description: None,
            attributes: attributes.map(|s| s.to_string()),
        }
    }

    #[test]
    fn name_and_image_required() {
        assert!(meta(None).validate().is_ok());
        let missing = NftMetadata::default();
        let err = missing.validate().unwrap_err();
        let TxError::InvalidMetadata(msg) = err else {
            panic!()
        };
        assert!(msg.contains("name"));
        assert!(msg.contains("image"));
    }

    #[test]
    fn attributes_validated_as_array() {
        let ok = meta(Some(
            r#"[{"trait_type":"ratio","maxValue":40,"value":20}]"#,
        ));
        assert!(ok.validate().is_ok());

        let missing_max = meta(Some(r#"[{"trait_type":"ratio","value":20}]"#));
        assert!(missing_max.validate().is_err());

        let not_an_array = meta(Some(r#"{"trait_type":"ratio"}"#));
        assert!(not_an_array.validate().is_err());
    }

    #[test]
    fn properties_attribute_skips_max_value() {
        let props = meta(Some(r#"[{"trait_type":"Properties","value":3}]"#));
        assert!(props.validate().is_ok());
        let props_missing_value = meta(Some(r#"[{"trait_type":"properties"}]"#));
        assert!(props_missing_value.validate().is_err());
    }
}
