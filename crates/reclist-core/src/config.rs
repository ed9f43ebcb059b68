//! Configuration types.
//!
//! Three layers feed a list: component defaults, entity-specific client
//! definitions from metadata, and per-instance options. They are resolved
//! once into an immutable [`ListConfig`].
//!
//! Precedence for value settings: per-instance option, then entity
//! definition, then component default. Disable flags are sticky: a flag set
//! at any layer disables the feature.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

// =============================================================================
// Application Settings
// =============================================================================

/// Application-wide settings, loadable from `settings.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// All-results mass actions above this total run as deferred jobs.
    pub mass_action_idle_threshold: i64,

    /// All-results exports above this total run as deferred jobs.
    pub export_idle_threshold: i64,

    /// Maximum selection size for PDF printing.
    pub mass_print_pdf_max_count: Option<usize>,

    /// Export is disabled for non-administrators.
    pub export_disabled: bool,

    /// Configured currencies.
    pub currency_list: Vec<String>,

    /// Show the total record count above the list.
    pub display_record_count: bool,

    /// Collection is truncated to this size before re-sorting.
    pub record_list_max_size_limit: usize,

    /// Entity types that have PDF templates.
    pub template_entity_types: Vec<String>,

    /// Additional parameters, addressable by `configCheck`.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            mass_action_idle_threshold: 500,
            export_idle_threshold: 1000,
            mass_print_pdf_max_count: None,
            export_disabled: false,
            currency_list: vec!["USD".to_string()],
            display_record_count: true,
            record_list_max_size_limit: 200,
            template_entity_types: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

impl AppSettings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load settings from the config directory, falling back to defaults
    /// when the file does not exist.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match settings_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Look up a parameter by dotted path (e.g. `"outboundEmail.enabled"`).
    pub fn param(&self, path: &str) -> Option<serde_json::Value> {
        let root = serde_json::to_value(self).ok()?;
        path.split('.')
            .try_fold(&root, |value, key| value.get(key))
            .cloned()
    }

    /// Truthiness of a parameter; missing parameters are false.
    pub fn param_is_truthy(&self, path: &str) -> bool {
        match self.param(path) {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::Bool(b)) => b,
            Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(serde_json::Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}

/// Get the config directory path.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("reclist"))
}

/// Get the path to settings.toml.
pub fn settings_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("settings.toml"))
}

// =============================================================================
// Layers
// =============================================================================

/// Component-level defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ListDefaults {
    pub mass_action_list: Vec<String>,
    pub check_all_result_mass_action_list: Vec<String>,
    pub checkboxes: bool,
    pub selectable: bool,
    pub header: bool,
    pub show_more: bool,
    pub show_count: bool,
    pub row_actions_view: Option<String>,
    pub row_actions_column_width: u32,
    pub checkbox_column_width: u32,
    pub min_column_width: u32,
    pub layout_name: String,
    pub mass_print_pdf_disabled: bool,
    /// Names of `massAction{Name}Disabled` flags set on the component.
    pub disabled_action_flags: Vec<String>,
}

impl Default for ListDefaults {
    fn default() -> Self {
        Self {
            mass_action_list: ["remove", "merge", "massUpdate", "export"]
                .map(String::from)
                .to_vec(),
            check_all_result_mass_action_list: ["remove", "massUpdate", "export"]
                .map(String::from)
                .to_vec(),
            checkboxes: true,
            selectable: false,
            header: true,
            show_more: true,
            show_count: true,
            row_actions_view: Some("views/record/row-actions/default".to_string()),
            row_actions_column_width: 25,
            checkbox_column_width: 40,
            min_column_width: 100,
            layout_name: "list".to_string(),
            mass_print_pdf_disabled: false,
            disabled_action_flags: Vec::new(),
        }
    }
}

/// Entity-specific client definitions (`clientDefs.{scope}`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityListDefs {
    pub edit_disabled: bool,
    pub remove_disabled: bool,
    pub merge_disabled: bool,
    pub export_disabled: bool,
    pub mass_update_disabled: bool,
    pub mass_follow_disabled: bool,
    pub convert_currency_disabled: bool,
    pub mass_action_list: Vec<String>,
    pub check_all_result_mass_action_list: Vec<String>,
}

/// Per-instance options. Unset fields defer to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListOptions {
    pub checkboxes: Option<bool>,
    pub selectable: Option<bool>,
    pub header: Option<bool>,
    pub header_disabled: bool,
    pub show_more: Option<bool>,
    pub show_count: Option<bool>,
    pub display_total_count: Option<bool>,
    pub row_actions_disabled: bool,
    pub mass_actions_disabled: bool,
    pub check_all_result_disabled: Option<bool>,
    pub edit_disabled: bool,
    pub remove_disabled: bool,
    pub export_disabled: bool,
    pub mass_update_disabled: bool,
    pub mass_follow_disabled: bool,
    pub mass_print_pdf_disabled: bool,
    pub mass_convert_currency_disabled: bool,
    pub layout_acl_disabled: bool,
    pub unlink_mass_action: bool,
    pub layout_name: Option<String>,
    /// Names of `massAction{Name}Disabled` flags that are set.
    pub disabled_action_flags: Vec<String>,
    pub mandatory_select_attribute_list: Vec<String>,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Immutable, fully resolved list configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ListConfig {
    pub base_mass_actions: Vec<String>,
    pub base_all_result_actions: Vec<String>,
    pub checkboxes: bool,
    /// Checkboxes were switched off explicitly; adding actions never re-enables them.
    pub checkboxes_disabled: bool,
    pub selectable: bool,
    pub header: bool,
    pub show_more: bool,
    /// Show the total record count.
    pub display_total_count: bool,
    pub row_actions_view: Option<String>,
    pub row_actions_column_width: u32,
    pub checkbox_column_width: u32,
    pub min_column_width: u32,
    pub layout_name: String,
    pub mass_actions_disabled: bool,
    pub check_all_result_disabled: bool,
    pub edit_disabled: bool,
    pub remove_disabled: bool,
    pub merge_disabled: bool,
    pub export_disabled: bool,
    pub mass_update_disabled: bool,
    pub mass_follow_disabled: bool,
    pub mass_print_pdf_disabled: bool,
    pub mass_convert_currency_disabled: bool,
    pub layout_acl_disabled: bool,
    pub unlink_mass_action: bool,
    pub disabled_action_flags: BTreeSet<String>,
    pub mandatory_select_attribute_list: Vec<String>,
}

impl ListConfig {
    /// Resolve the three layers into one configuration.
    pub fn resolve(
        defaults: &ListDefaults,
        entity: &EntityListDefs,
        options: &ListOptions,
        settings: &AppSettings,
    ) -> Self {
        let selectable = options.selectable.unwrap_or(defaults.selectable);
        let mass_actions_disabled = options.mass_actions_disabled;
        let mut checkboxes = options.checkboxes.unwrap_or(defaults.checkboxes);
        if mass_actions_disabled && !selectable {
            checkboxes = false;
        }

        let header = !options.header_disabled && options.header.unwrap_or(defaults.header);
        let show_count = options.show_count.unwrap_or(defaults.show_count);
        let display_total_count = options
            .display_total_count
            .unwrap_or(show_count && settings.display_record_count);

        Self {
            base_mass_actions: defaults.mass_action_list.clone(),
            base_all_result_actions: defaults.check_all_result_mass_action_list.clone(),
            checkboxes,
            checkboxes_disabled: options.checkboxes == Some(false),
            selectable,
            header,
            show_more: options.show_more.unwrap_or(defaults.show_more),
            display_total_count,
            row_actions_view: if options.row_actions_disabled {
                None
            } else {
                defaults.row_actions_view.clone()
            },
            row_actions_column_width: defaults.row_actions_column_width,
            checkbox_column_width: defaults.checkbox_column_width,
            min_column_width: defaults.min_column_width,
            layout_name: options
                .layout_name
                .clone()
                .unwrap_or_else(|| defaults.layout_name.clone()),
            mass_actions_disabled,
            check_all_result_disabled: options.check_all_result_disabled.unwrap_or(false),
            edit_disabled: options.edit_disabled || entity.edit_disabled,
            remove_disabled: options.remove_disabled || entity.remove_disabled,
            merge_disabled: entity.merge_disabled,
            export_disabled: options.export_disabled || entity.export_disabled,
            mass_update_disabled: options.mass_update_disabled || entity.mass_update_disabled,
            mass_follow_disabled: options.mass_follow_disabled || entity.mass_follow_disabled,
            mass_print_pdf_disabled: options.mass_print_pdf_disabled
                || defaults.mass_print_pdf_disabled,
            mass_convert_currency_disabled: options.mass_convert_currency_disabled
                || entity.convert_currency_disabled,
            layout_acl_disabled: options.layout_acl_disabled,
            unlink_mass_action: options.unlink_mass_action,
            disabled_action_flags: defaults
                .disabled_action_flags
                .iter()
                .chain(&options.disabled_action_flags)
                .cloned()
                .collect(),
            mandatory_select_attribute_list: options.mandatory_select_attribute_list.clone(),
        }
    }

    /// Whether the `massAction{Name}Disabled` flag is set.
    pub fn is_action_flag_disabled(&self, flag: &str) -> bool {
        self.disabled_action_flags.contains(flag)
    }

    /// Whether rows carry a trailing row-actions column.
    pub fn has_row_actions(&self) -> bool {
        self.row_actions_view.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_resolve_defaults() {
        let config = ListConfig::resolve(
            &ListDefaults::default(),
            &EntityListDefs::default(),
            &ListOptions::default(),
            &AppSettings::default(),
        );
        assert!(config.checkboxes);
        assert!(!config.checkboxes_disabled);
        assert!(config.header);
        assert!(config.has_row_actions());
        assert_eq!(config.base_mass_actions, ["remove", "merge", "massUpdate", "export"]);
        assert_eq!(config.min_column_width, 100);
    }

    #[test]
    fn test_option_overrides_default_and_flags_are_sticky() {
        let entity = EntityListDefs {
            remove_disabled: true,
            ..Default::default()
        };
        let options = ListOptions {
            show_more: Some(false),
            edit_disabled: true,
            ..Default::default()
        };
        let config = ListConfig::resolve(
            &ListDefaults::default(),
            &entity,
            &options,
            &AppSettings::default(),
        );
        assert!(!config.show_more);
        assert!(config.remove_disabled);
        assert!(config.edit_disabled);
    }

    #[test]
    fn test_component_and_option_disable_flags_are_merged() {
        let defaults = ListDefaults {
            mass_print_pdf_disabled: true,
            disabled_action_flags: vec!["massActionExportDisabled".to_string()],
            ..ListDefaults::default()
        };
        let options = ListOptions {
            disabled_action_flags: vec!["massActionMergeDisabled".to_string()],
            ..Default::default()
        };
        let config = ListConfig::resolve(
            &defaults,
            &EntityListDefs::default(),
            &options,
            &AppSettings::default(),
        );
        assert!(config.mass_print_pdf_disabled);
        assert!(config.is_action_flag_disabled("massActionExportDisabled"));
        assert!(config.is_action_flag_disabled("massActionMergeDisabled"));
        assert!(!config.is_action_flag_disabled("massActionRemoveDisabled"));
    }

    #[test]
    fn test_display_total_count_follows_show_count() {
        let settings = AppSettings::default();
        let config = ListConfig::resolve(
            &ListDefaults::default(),
            &EntityListDefs::default(),
            &ListOptions {
                show_count: Some(false),
                ..Default::default()
            },
            &settings,
        );
        assert!(!config.display_total_count);

        let config = ListConfig::resolve(
            &ListDefaults::default(),
            &EntityListDefs::default(),
            &ListOptions::default(),
            &settings,
        );
        assert!(config.display_total_count);
    }

    #[test]
    fn test_mass_actions_disabled_hides_checkboxes_unless_selectable() {
        let options = ListOptions {
            mass_actions_disabled: true,
            ..Default::default()
        };
        let config = ListConfig::resolve(
            &ListDefaults::default(),
            &EntityListDefs::default(),
            &options,
            &AppSettings::default(),
        );
        assert!(!config.checkboxes);

        let options = ListOptions {
            mass_actions_disabled: true,
            selectable: Some(true),
            ..Default::default()
        };
        let config = ListConfig::resolve(
            &ListDefaults::default(),
            &EntityListDefs::default(),
            &options,
            &AppSettings::default(),
        );
        assert!(config.checkboxes);
    }

    #[test]
    fn test_header_disabled_wins() {
        let options = ListOptions {
            header: Some(true),
            header_disabled: true,
            ..Default::default()
        };
        let config = ListConfig::resolve(
            &ListDefaults::default(),
            &EntityListDefs::default(),
            &options,
            &AppSettings::default(),
        );
        assert!(!config.header);
    }

    #[test]
    fn test_settings_param_lookup() {
        let mut settings = AppSettings::default();
        settings.extra.insert(
            "outboundEmail".to_string(),
            serde_json::json!({"enabled": true}),
        );
        assert!(settings.param_is_truthy("outboundEmail.enabled"));
        assert!(!settings.param_is_truthy("outboundEmail.missing"));
        assert!(settings.param_is_truthy("displayRecordCount"));
    }

    #[test]
    fn test_settings_load_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "massActionIdleThreshold = 10\ncurrencyList = [\"USD\", \"EUR\"]\nmassPrintPdfMaxCount = 50"
        )
        .unwrap();

        let settings = AppSettings::load(file.path()).unwrap();
        assert_eq!(settings.mass_action_idle_threshold, 10);
        assert_eq!(settings.currency_list.len(), 2);
        assert_eq!(settings.mass_print_pdf_max_count, Some(50));
        assert_eq!(settings.export_idle_threshold, 1000);
    }

    #[test]
    fn test_settings_load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "massActionIdleThreshold = \"many\"").unwrap();
        assert!(matches!(
            AppSettings::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
