#![forbid(unsafe_code)]

use serde::{Deserialize, Deserializer, Serialize};

pub const REQUIRED_ADDRESS_FIELDS: [&str; 4] = ["address_line_one", "city", "state", "zip_code"];

/// One postal address as supplied by a caller.
///
/// All four address fields are optional on input; an address is only submitted to the provider
/// when every one of them is present and non-blank. `latitude`/`longitude` are never read from
/// input and are only populated on output, from a provider match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub address_line_one: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub city: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub state: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub zip_code: Option<String>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl AddressRecord {
    pub fn new(
        address_line_one: impl Into<String>,
        city: impl Into<String>,
        state: impl Into<String>,
        zip_code: impl Into<String>,
    ) -> Self {
        Self {
            address_line_one: Some(address_line_one.into()),
            city: Some(city.into()),
            state: Some(state.into()),
            zip_code: Some(zip_code.into()),
            latitude: None,
            longitude: None,
        }
    }

    /// Required fields that are absent or blank after trimming, in declaration order.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let values = [
            self.address_line_one.as_deref(),
            self.city.as_deref(),
            self.state.as_deref(),
            self.zip_code.as_deref(),
        ];
        REQUIRED_ADDRESS_FIELDS
            .iter()
            .zip(values)
            .filter(|(_, value)| is_blank(*value))
            .map(|(field, _)| *field)
            .collect()
    }

    pub fn is_structurally_valid(&self) -> bool {
        self.missing_required_fields().is_empty()
    }

    pub fn with_coordinates(mut self, latitude: Option<f64>, longitude: Option<f64>) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    pub fn annotate(self, valid: bool, additional_info: impl Into<String>) -> AnnotatedAddress {
        AnnotatedAddress {
            address: self,
            valid,
            additional_info: additional_info.into(),
        }
    }
}

/// Output record: the address as it was submitted plus the validation verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnotatedAddress {
    #[serde(flatten)]
    pub address: AddressRecord,
    pub valid: bool,
    pub additional_info: String,
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LenientText {
    Text(String),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
}

// Callers routinely send zip codes as JSON numbers.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<LenientText>::deserialize(deserializer)?;
    Ok(raw.map(|value| match value {
        LenientText::Text(text) => text,
        LenientText::Integer(n) => n.to_string(),
        LenientText::Unsigned(n) => n.to_string(),
        LenientText::Float(n) => n.to_string(),
    }))
}
