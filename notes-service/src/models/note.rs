use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A stored note. `id` always equals the key the note is stored under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

/// Request body for create and replace.
///
/// Only a JSON object is accepted. Missing or `null` fields decode as empty
/// strings and unknown fields are ignored, so a client-supplied `id` never
/// reaches the stored note.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct NotePayload {
    pub title: String,
    pub content: String,
}

#[derive(Deserialize)]
struct PayloadFields {
    #[serde(default, deserialize_with = "null_as_empty")]
    title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    content: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl TryFrom<Map<String, Value>> for NotePayload {
    type Error = serde_json::Error;

    fn try_from(object: Map<String, Value>) -> Result<Self, Self::Error> {
        let fields: PayloadFields = serde_json::from_value(Value::Object(object))?;
        Ok(Self {
            title: fields.title,
            content: fields.content,
        })
    }
}

impl NotePayload {
    /// Bind the payload to the key it will be stored under.
    pub fn into_note(self, id: impl Into<String>) -> Note {
        Note {
            id: id.into(),
            title: self.title,
            content: self.content,
        }
    }
}
