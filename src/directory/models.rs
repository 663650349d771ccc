//! Directory data models and Graph response shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DirectoryError;

/// `@odata.type` discriminator of group objects.
pub const GROUP_ODATA_TYPE: &str = "#microsoft.graph.group";

/// Fields requested when listing or looking up users.
pub const USER_SELECT: &str = "id,displayName,mail";

/// A directory user. `groups` is filled by a separate membership traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    pub id: String,
    pub display_name: String,
    pub mail: String,
    #[serde(default, skip_deserializing)]
    pub groups: Vec<String>,
}

impl DirectoryUser {
    /// Decode a raw page item. `id`, `displayName` and `mail` must all be present strings.
    pub fn from_value(value: Value) -> Result<Self, DirectoryError> {
        serde_json::from_value(value).map_err(|e| DirectoryError::Decode(format!("user: {}", e)))
    }
}

/// Group as returned in a membership listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub display_name: String,
}

/// Item of a `memberOf` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryObject {
    Group(Group),
    /// Directory roles, administrative units, devices and anything else.
    Other(Option<String>),
}

impl DirectoryObject {
    /// Decode on the `@odata.type` discriminator.
    pub fn from_value(value: Value) -> Result<Self, DirectoryError> {
        match value.get("@odata.type").and_then(Value::as_str) {
            Some(GROUP_ODATA_TYPE) => serde_json::from_value(value)
                .map(Self::Group)
                .map_err(|e| DirectoryError::Decode(format!("group: {}", e))),
            other => Ok(Self::Other(other.map(String::from))),
        }
    }

    /// Display name if this is a group.
    pub fn into_group_name(self) -> Option<String> {
        match self {
            Self::Group(group) => Some(group.display_name),
            Self::Other(_) => None,
        }
    }
}

/// One page of an OData collection.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
    #[serde(rename = "@odata.count")]
    pub count: Option<u64>,
}

/// `OData` error response from Microsoft Graph.
#[derive(Debug, Deserialize)]
pub struct ODataError {
    pub error: ODataErrorBody,
}

/// `OData` error body.
#[derive(Debug, Deserialize)]
pub struct ODataErrorBody {
    pub code: String,
    pub message: String,
}
