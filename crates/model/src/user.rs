use serde::{Deserialize, Serialize};

/// The person on whose behalf an operation runs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub can_update_and_install_libraries: bool,
    /// Allows installing (or upgrading) libraries flagged as restricted.
    #[serde(default)]
    pub can_create_restricted: bool,
    #[serde(default)]
    pub can_install_recommended: bool,
}
impl User {
    /// A user allowed to do everything; used by the command line front end.
    pub fn administrator(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: "Administrator".to_string(),
            can_update_and_install_libraries: true,
            can_create_restricted: true,
            can_install_recommended: true,
        }
    }
}
