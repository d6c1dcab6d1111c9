use crate::catalog::{Addressable, Catalog};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Open key/value mapping merged verbatim into a query.
pub type Properties = Map<String, Value>;

/// Keyword combinators accepted by [`Entry::search`].
pub const SEARCH_TYPES: [&str; 3] = ["AND", "OR", "NOT"];

/// A metric, element (dimension) or segment known to a report suite.
///
/// `attributes` holds whatever else the server sent for the entry
/// (`decimals`, `classification`, ...). Only `properties` ends up in a
/// query; it starts as `{"id": <id>}` and grows through the copy-and-mutate
/// helpers below.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub title: String,
    /// Id of the owning report suite, if any
    pub scope: Option<String>,
    #[serde(default)]
    pub attributes: Properties,
    #[serde(default)]
    pub properties: Properties,
}

impl Entry {
    pub fn new(id: &str, title: &str, scope: Option<&str>) -> Entry {
        let mut properties = Properties::new();
        properties.insert("id".to_string(), Value::String(id.to_string()));
        Entry {
            id: id.to_string(),
            title: title.to_string(),
            scope: scope.map(str::to_string),
            attributes: Properties::new(),
            properties,
        }
    }

    /// Build an entry from one item of a server listing.
    ///
    /// `title_field` and `id_field` name the keys holding the display title
    /// and the canonical id (`name`/`id` for metrics and elements).
    pub fn from_item(
        item: &Value,
        scope: Option<&str>,
        title_field: &str,
        id_field: &str,
    ) -> Result<Entry> {
        let object = item.as_object().ok_or_else(|| {
            Error::UnexpectedResponse(format!("catalog item is not an object: {}", item))
        })?;
        let id = scalar_text(object.get(id_field)).ok_or_else(|| {
            Error::UnexpectedResponse(format!("catalog item has no `{}`: {}", id_field, item))
        })?;
        let title = scalar_text(object.get(title_field)).unwrap_or_default();
        let mut entry = Entry::new(&id, &title, scope);
        entry.attributes = object.clone();
        Ok(entry)
    }

    /// Build a named catalog out of a server listing (a JSON array).
    pub fn list(
        name: &str,
        items: &Value,
        scope: Option<&str>,
        title_field: &str,
        id_field: &str,
    ) -> Result<Catalog<Entry>> {
        let array = items.as_array().ok_or_else(|| {
            Error::UnexpectedResponse(format!("{} listing is not an array", name))
        })?;
        let entries = array
            .iter()
            .map(|item| Entry::from_item(item, scope, title_field, id_field))
            .collect::<Result<Vec<Entry>>>()?;
        Ok(Catalog::new(name, entries))
    }

    /// The value written into a query for this entry.
    pub fn serialize(&self) -> Value {
        Value::Object(self.properties.clone())
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Classification name, when the server (or the caller) attached a
    /// non-empty one.
    pub fn classification(&self) -> Option<&str> {
        self.attributes
            .get("classification")
            .or_else(|| self.properties.get("classification"))
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
    }

    /// Declared decimal precision of a metric, zero when absent.
    pub fn decimals(&self) -> u32 {
        match self.attributes.get("decimals") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as u32,
            Some(Value::String(s)) => s.trim().parse::<u32>().unwrap_or(0),
            _ => 0,
        }
    }

    /// Copy of this entry with one extra property.
    pub fn with_property(&self, key: &str, value: impl Into<Value>) -> Entry {
        let mut entry = self.clone();
        entry.properties.insert(key.to_string(), value.into());
        entry
    }

    /// Copy of this entry with every given property merged in.
    pub fn with_properties(&self, extra: &Properties) -> Entry {
        let mut entry = self.clone();
        for (key, value) in extra {
            entry.properties.insert(key.clone(), value.clone());
        }
        entry
    }

    /// Limit an element to rows `start..stop`.
    pub fn range(&self, start: u64, stop: u64) -> Result<Entry> {
        if stop < start {
            return Err(Error::InvalidOption(format!(
                "range stop {} is before start {}",
                stop, start
            )));
        }
        Ok(self
            .with_property("startingWith", start.to_string())
            .with_property("top", (stop - start).to_string()))
    }

    /// Same as `range(0, stop)`.
    pub fn range_to(&self, stop: u64) -> Result<Entry> {
        self.range(0, stop)
    }

    /// Restrict an element to rows matching `keywords`.
    pub fn search<I, S>(&self, keywords: I, kind: &str) -> Result<Entry>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let kind = kind.to_uppercase();
        if !SEARCH_TYPES.contains(&kind.as_str()) {
            return Err(Error::InvalidOption(format!(
                "Search type should be one of: {}",
                SEARCH_TYPES.join(", ")
            )));
        }
        let keywords = keywords
            .into_iter()
            .map(|k| Value::String(k.into()))
            .collect::<Vec<Value>>();
        let mut search = Properties::new();
        search.insert("type".to_string(), Value::String(kind));
        search.insert("keywords".to_string(), Value::Array(keywords));
        Ok(self.with_property("search", Value::Object(search)))
    }

    /// Restrict an element to the given item names.
    pub fn select<I, S>(&self, keys: I) -> Entry
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = keys
            .into_iter()
            .map(|k| Value::String(k.into()))
            .collect::<Vec<Value>>();
        self.with_property("selected", Value::Array(keys))
    }
}

impl Addressable for Entry {
    fn id(&self) -> &str {
        &self.id
    }
    fn title(&self) -> &str {
        &self.title
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID {:25} | Name: {}", self.id, self.title)
    }
}

/// Text of a string or number field.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
