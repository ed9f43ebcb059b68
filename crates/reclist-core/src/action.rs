//! Mass-action names and definitions.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A bulk operation applicable to a selection of records.
///
/// Well-known actions have a dedicated execution path. Anything else declared
/// in metadata is `Custom` and runs through the generic definition-driven path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MassAction {
    Remove,
    MassUpdate,
    Export,
    Merge,
    Follow,
    Unfollow,
    ConvertCurrency,
    RecalculateFormula,
    Unlink,
    PrintPdf,
    /// Metadata-declared action executed through its definition.
    Custom(String),
}

impl MassAction {
    /// Parse an action name. Unknown names become `Custom`.
    pub fn parse(name: &str) -> Self {
        match name {
            "remove" => Self::Remove,
            "massUpdate" => Self::MassUpdate,
            "export" => Self::Export,
            "merge" => Self::Merge,
            "follow" => Self::Follow,
            "unfollow" => Self::Unfollow,
            "convertCurrency" => Self::ConvertCurrency,
            "recalculateFormula" => Self::RecalculateFormula,
            "unlink" => Self::Unlink,
            "printPdf" => Self::PrintPdf,
            other => Self::Custom(other.to_string()),
        }
    }

    /// The action name as used in metadata and on the wire.
    pub fn name(&self) -> &str {
        match self {
            Self::Remove => "remove",
            Self::MassUpdate => "massUpdate",
            Self::Export => "export",
            Self::Merge => "merge",
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
            Self::ConvertCurrency => "convertCurrency",
            Self::RecalculateFormula => "recalculateFormula",
            Self::Unlink => "unlink",
            Self::PrintPdf => "printPdf",
            Self::Custom(name) => name,
        }
    }

    /// Whether this action has a dedicated execution path.
    pub fn is_well_known(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    /// Name of the option/config flag that disables this action,
    /// e.g. `massActionRemoveDisabled`.
    pub fn disabled_flag(&self) -> String {
        let name = self.name();
        let mut chars = name.chars();
        let capitalized = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        };
        format!("massAction{}Disabled", capitalized)
    }
}

impl fmt::Display for MassAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for MassAction {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl Serialize for MassAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for MassAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::parse(&name))
    }
}

/// How an action is carried out once confirmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Request/response against the bulk-action endpoint.
    #[default]
    Sync,
    /// Delegated to a registered action handler.
    Handler,
}

/// Declarative definition of a mass action, read from
/// `clientDefs.{scope}.massActionDefs.{name}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MassActionDefinition {
    /// Action name; filled from the metadata key.
    #[serde(skip)]
    pub name: String,

    /// Skip the confirmation prompt.
    pub bypass_confirmation: bool,

    /// Message key of the confirmation prompt.
    pub confirmation_message: Option<String>,

    /// ACL action required (e.g. "edit").
    pub acl: Option<String>,

    /// Scope the ACL check runs against; defaults to the list's scope.
    pub acl_scope: Option<String>,

    /// Config parameter path gating availability; `!` prefix negates.
    pub config_check: Option<String>,

    /// Message key shown while the request is in flight.
    pub wait_message: Option<String>,

    /// Message key shown on success; `{count}` is substituted.
    pub success_message: Option<String>,

    /// Endpoint for the generic path.
    pub url: Option<String>,

    /// Registered handler name.
    pub handler: Option<String>,

    /// Handler method run once during registry setup.
    pub init_function: Option<String>,
}

impl MassActionDefinition {
    /// Parse a definition from its metadata value. Missing or malformed
    /// values yield an empty definition.
    pub fn from_metadata(name: &str, value: Option<serde_json::Value>) -> Self {
        let mut def: Self = value
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        def.name = name.to_string();
        def
    }

    pub fn requires_confirmation(&self) -> bool {
        !self.bypass_confirmation
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        if self.handler.is_some() {
            ExecutionMode::Handler
        } else {
            ExecutionMode::Sync
        }
    }

    pub fn confirmation_message(&self) -> &str {
        self.confirmation_message.as_deref().unwrap_or("confirmation")
    }

    pub fn wait_message(&self) -> &str {
        self.wait_message.as_deref().unwrap_or("pleaseWait")
    }

    pub fn success_message(&self) -> &str {
        self.success_message.as_deref().unwrap_or("done")
    }
}
