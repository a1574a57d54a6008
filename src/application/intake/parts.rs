//! Uploaded form parts and the structured payloads carried by them.

use bytes::Bytes;
use serde_json::Value;

use crate::application::render::Mapping;

use super::IntakeError;

pub const TEMPLATE_PART: &str = "template";
pub const PARAMS_PART: &str = "params";
pub const CONFIG_PART: &str = "config";

/// One file received under a form field.
#[derive(Debug, Clone)]
pub struct UploadedPart {
    pub name: String,
    pub filename: String,
    pub content: Bytes,
}

impl UploadedPart {
    pub fn new(name: impl Into<String>, filename: impl Into<String>, content: Bytes) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            content,
        }
    }
}

/// The parts of a single generate request.
#[derive(Debug, Clone, Default)]
pub struct IntakeRequest {
    pub template: Option<UploadedPart>,
    pub params: Option<UploadedPart>,
    pub config: Option<UploadedPart>,
}

impl IntakeRequest {
    pub fn with_template(template: UploadedPart) -> Self {
        Self {
            template: Some(template),
            ..Self::default()
        }
    }

    /// Whether a form field name maps onto one of the request slots.
    pub fn accepts(field: &str) -> bool {
        matches!(field, TEMPLATE_PART | PARAMS_PART | CONFIG_PART)
    }

    /// Place a part in the slot named by its field. The first part for a slot wins.
    ///
    /// Returns `false` when the part was not stored.
    pub fn insert(&mut self, part: UploadedPart) -> bool {
        let slot = match part.name.as_str() {
            TEMPLATE_PART => &mut self.template,
            PARAMS_PART => &mut self.params,
            CONFIG_PART => &mut self.config,
            _ => return false,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(part);
        true
    }
}

/// Parse an optional JSON part into a mapping, defaulting to an empty one.
pub(super) fn parse_mapping(
    part_name: &'static str,
    part: Option<&UploadedPart>,
) -> Result<Mapping, IntakeError> {
    let Some(part) = part else {
        return Ok(Mapping::new());
    };

    let value: Value =
        serde_json::from_slice(&part.content).map_err(|err| IntakeError::MalformedPayload {
            part: part_name,
            reason: err.to_string(),
        })?;

    match value {
        Value::Object(mapping) => Ok(mapping),
        other => Err(IntakeError::MalformedPayload {
            part: part_name,
            reason: format!("expected a JSON object, found {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(name: &str, filename: &str, content: &'static str) -> UploadedPart {
        UploadedPart::new(name, filename, Bytes::from_static(content.as_bytes()))
    }

    #[test]
    fn insert_routes_parts_by_field_name() {
        let mut request = IntakeRequest::default();
        assert!(request.insert(part("template", "report.html", "<b>x</b>")));
        assert!(request.insert(part("params", "data.json", "{}")));
        assert!(request.insert(part("config", "style.json", "{}")));
        assert!(!request.insert(part("extra", "notes.json", "{}")));

        assert_eq!(
            request.template.as_ref().map(|p| p.filename.as_str()),
            Some("report.html")
        );
        assert!(request.params.is_some());
        assert!(request.config.is_some());
    }

    #[test]
    fn first_part_for_a_slot_wins() {
        let mut request = IntakeRequest::default();
        assert!(request.insert(part("template", "first.html", "a")));
        assert!(!request.insert(part("template", "second.html", "b")));
        assert_eq!(
            request.template.map(|p| p.filename),
            Some("first.html".to_string())
        );
    }

    #[test]
    fn absent_payload_defaults_to_empty_mapping() {
        let mapping = parse_mapping(PARAMS_PART, None).expect("empty mapping");
        assert!(mapping.is_empty());
    }

    #[test]
    fn object_payload_is_parsed() {
        let params = part("params", "data.json", r#"{"title": "Q3", "total": 12}"#);
        let mapping = parse_mapping(PARAMS_PART, Some(&params)).expect("mapping");
        assert_eq!(mapping.get("title"), Some(&Value::from("Q3")));
        assert_eq!(mapping.get("total"), Some(&Value::from(12)));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let params = part("params", "data.json", "{not json");
        let err = parse_mapping(PARAMS_PART, Some(&params)).expect_err("malformed");
        assert!(matches!(
            err,
            IntakeError::MalformedPayload { part: "params", .. }
        ));
    }

    #[test]
    fn non_object_json_is_malformed() {
        let config = part("config", "config.json", "[1, 2, 3]");
        let err = parse_mapping(CONFIG_PART, Some(&config)).expect_err("malformed");
        match err {
            IntakeError::MalformedPayload { part, reason } => {
                assert_eq!(part, "config");
                assert!(reason.contains("an array"), "reason: {reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
