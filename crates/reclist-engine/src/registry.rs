//! Mass-action registry and its gating pipeline.
//!
//! The registry is an ordered list of enabled actions plus a derived list of
//! the actions that are safe to run in all-results mode. It is built once per
//! setup by [`build_registry`] and only changed afterwards through
//! [`MassActionRegistry::add`] and [`MassActionRegistry::remove`].
//!
//! ## Pipeline
//!
//! 1. Seed with the configured base actions
//! 2. Drop actions the principal has no scope access for
//! 3. Append entity, then global, metadata actions that pass both the
//!    availability and the access predicate
//! 4. Intersect the all-results list with the enabled list, then re-admit
//!    metadata all-results actions for base collections only
//! 5. Run deferred handler initialisation, all concurrently
//! 6. Inject or drop well-known actions from runtime predicates
//! 7. Drop actions whose disabled flag is set
//! 8. Suppress checkboxes when nothing is left and rows are not selectable

use std::collections::HashMap;

use futures::future::join_all;

use reclist_core::{AppSettings, ListConfig, MassAction, MassActionDefinition, RegistryError};

use crate::handlers::HandlerRegistry;
use crate::layout::field_type;
use crate::ports::{AccessOracle, MetadataOracle};

/// Enabled actions for one list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MassActionRegistry {
    actions: Vec<MassAction>,
    all_result_actions: Vec<MassAction>,
    definitions: HashMap<String, MassActionDefinition>,
}

impl MassActionRegistry {
    pub fn actions(&self) -> &[MassAction] {
        &self.actions
    }

    /// Actions safe to run against every record matching the query.
    pub fn all_result_actions(&self) -> &[MassAction] {
        &self.all_result_actions
    }

    pub fn action_names(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn all_result_action_names(&self) -> Vec<String> {
        self.all_result_actions
            .iter()
            .map(|a| a.name().to_string())
            .collect()
    }

    pub fn contains(&self, action: &MassAction) -> bool {
        self.actions.contains(action)
    }

    pub fn is_all_result_safe(&self, action: &MassAction) -> bool {
        self.all_result_actions.contains(action)
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Add an action. Returns `false` if it was already enabled.
    pub fn add(&mut self, action: MassAction, all_result: bool, to_beginning: bool) -> bool {
        if self.actions.contains(&action) {
            return false;
        }
        if all_result && !self.all_result_actions.contains(&action) {
            if to_beginning {
                self.all_result_actions.insert(0, action.clone());
            } else {
                self.all_result_actions.push(action.clone());
            }
        }
        tracing::debug!("Enabled mass action '{}'", action);
        if to_beginning {
            self.actions.insert(0, action);
        } else {
            self.actions.push(action);
        }
        true
    }

    /// Remove an action from both lists. Returns whether it was enabled.
    pub fn remove(&mut self, action: &MassAction) -> bool {
        self.all_result_actions.retain(|a| a != action);
        let before = self.actions.len();
        self.actions.retain(|a| a != action);
        let removed = self.actions.len() != before;
        if removed {
            tracing::debug!("Disabled mass action '{}'", action);
        }
        removed
    }

    /// Keep the action but make it unavailable in all-results mode.
    pub fn remove_all_result(&mut self, action: &MassAction) {
        self.all_result_actions.retain(|a| a != action);
    }

    /// Attach the definition an action runs with.
    pub fn set_definition(&mut self, definition: MassActionDefinition) {
        self.definitions
            .insert(definition.name.clone(), definition);
    }

    /// Definition of an action; an empty one when metadata declared none.
    pub fn definition(&self, name: &str) -> MassActionDefinition {
        self.definitions
            .get(name)
            .cloned()
            .unwrap_or_else(|| MassActionDefinition::from_metadata(name, None))
    }

    fn clear(&mut self) {
        self.actions.clear();
        self.all_result_actions.clear();
    }
}

// =============================================================================
// Gating Pipeline
// =============================================================================

/// Everything the pipeline reads.
pub struct GatingContext<'a> {
    pub entity_type: &'a str,
    /// Query target of the collection.
    pub collection_url: &'a str,
    pub config: &'a ListConfig,
    pub settings: &'a AppSettings,
    pub access: &'a dyn AccessOracle,
    pub metadata: &'a dyn MetadataOracle,
    pub handlers: &'a HandlerRegistry,
}

/// Result of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrySetup {
    pub registry: MassActionRegistry,
    /// Whether rows render a checkbox column.
    pub checkboxes: bool,
}

struct Pipeline<'a, 'b> {
    ctx: &'b GatingContext<'a>,
    registry: MassActionRegistry,
    checkboxes: bool,
}

impl Pipeline<'_, '_> {
    /// Add an action; enabling one turns checkboxes on unless they were
    /// switched off explicitly.
    fn add(&mut self, action: MassAction, all_result: bool, to_beginning: bool) {
        if self.registry.add(action, all_result, to_beginning) && !self.ctx.config.checkboxes_disabled
        {
            self.checkboxes = true;
        }
    }

    fn remove(&mut self, name: &str) {
        self.registry.remove(&MassAction::parse(name));
    }

    /// Metadata definition, entity-specific first.
    fn definition(&self, name: &str) -> MassActionDefinition {
        let metadata = self.ctx.metadata;
        let value = metadata
            .get(&["clientDefs", self.ctx.entity_type, "massActionDefs", name])
            .or_else(|| metadata.get(&["clientDefs", "Global", "massActionDefs", name]));
        MassActionDefinition::from_metadata(name, value)
    }

    /// Both predicates pass for a declared action.
    fn admits(&self, definition: &MassActionDefinition) -> bool {
        is_available(definition, self.ctx.settings)
            && is_accessible(definition, self.ctx.entity_type, self.ctx.access)
    }

    /// Reject definitions whose execution path cannot exist.
    fn validate(&self, definition: &MassActionDefinition) -> Result<bool, RegistryError> {
        if let Some(handler) = &definition.handler {
            if !self.ctx.handlers.contains(handler) {
                return Err(RegistryError::UnregisteredHandler {
                    action: definition.name.clone(),
                    handler: handler.clone(),
                });
            }
            return Ok(true);
        }
        let action = MassAction::parse(&definition.name);
        if !action.is_well_known() && definition.url.is_none() {
            tracing::warn!(
                "Mass action '{}' has neither a handler nor a url, skipping",
                definition.name
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn metadata_list(&self, key: &str) -> Vec<String> {
        let metadata = self.ctx.metadata;
        let mut names = metadata.get_str_list(&["clientDefs", self.ctx.entity_type, key]);
        names.extend(metadata.get_str_list(&["clientDefs", "Global", key]));
        names
    }

    fn seed(&mut self) {
        let config = self.ctx.config;
        for name in &config.base_mass_actions {
            self.registry.actions.push(MassAction::parse(name));
        }
        for name in &config.base_all_result_actions {
            self.registry.all_result_actions.push(MassAction::parse(name));
        }
    }

    fn apply_scope_access(&mut self) {
        let (access, entity_type) = (self.ctx.access, self.ctx.entity_type);
        if !access.check_scope(entity_type, "delete") {
            self.remove("remove");
            self.remove("merge");
        }
        if self.ctx.config.remove_disabled {
            self.remove("remove");
        }
        if !access.check_scope(entity_type, "edit") {
            self.remove("massUpdate");
            self.remove("merge");
        }
        if self.ctx.config.merge_disabled {
            self.remove("merge");
        }
    }

    fn append_declared(&mut self) -> Result<(), RegistryError> {
        for name in self.metadata_list("massActionList") {
            let action = MassAction::parse(&name);
            if self.registry.contains(&action) {
                continue;
            }
            let definition = self.definition(&name);
            if !self.admits(&definition) || !self.validate(&definition)? {
                tracing::debug!("Mass action '{}' not admitted", name);
                continue;
            }
            self.add(action, false, false);
            self.registry.set_definition(definition);
        }
        Ok(())
    }

    fn recompute_all_result(&mut self) -> Result<(), RegistryError> {
        let enabled = self.registry.actions.clone();
        self.registry
            .all_result_actions
            .retain(|a| enabled.contains(a));

        if self.ctx.collection_url != self.ctx.entity_type {
            return Ok(());
        }
        for name in self.metadata_list("checkAllResultMassActionList") {
            let action = MassAction::parse(&name);
            if !self.registry.contains(&action) || self.registry.is_all_result_safe(&action) {
                continue;
            }
            let definition = self.definition(&name);
            if !self.admits(&definition) || !self.validate(&definition)? {
                continue;
            }
            self.registry.all_result_actions.push(action);
        }
        Ok(())
    }

    async fn run_initializers(&self) {
        let mut pending = Vec::new();
        for action in &self.registry.actions {
            let definition = self.registry.definition(action.name());
            let (Some(function), Some(handler_name)) =
                (definition.init_function.clone(), definition.handler.as_deref())
            else {
                continue;
            };
            let Some(handler) = self.ctx.handlers.get(handler_name) else {
                continue;
            };
            let name = action.name().to_string();
            pending.push(async move { (name, handler.init(&function).await) });
        }

        if pending.is_empty() {
            return;
        }
        tracing::debug!("Running {} action initialisers", pending.len());
        for (name, result) in join_all(pending).await {
            if let Err(e) = result {
                tracing::error!("Initialisation of mass action '{}' failed: {}", name, e);
            }
        }
    }

    fn apply_runtime_rules(&mut self) {
        let ctx = self.ctx;
        let (access, metadata, settings, config, entity_type) = (
            ctx.access,
            ctx.metadata,
            ctx.settings,
            ctx.config,
            ctx.entity_type,
        );
        let mass_update_permitted = access.permission("massUpdatePermission").as_deref() == Some("yes");

        if (settings.export_disabled && !access.is_admin())
            || access.permission("exportPermission").as_deref() == Some("no")
            || config.export_disabled
        {
            self.remove("export");
        }

        if !mass_update_permitted || config.edit_disabled || config.mass_update_disabled {
            self.remove("massUpdate");
        }

        if !config.mass_follow_disabled
            && metadata.get_bool(&["scopes", entity_type, "stream"])
            && access.check(entity_type, "stream")
        {
            self.add(MassAction::Follow, false, false);
            self.add(MassAction::Unfollow, true, false);
        }

        if !config.mass_print_pdf_disabled
            && settings
                .template_entity_types
                .iter()
                .any(|t| t == entity_type)
        {
            self.add(MassAction::PrintPdf, false, false);
        }

        if config.unlink_mass_action {
            self.add(MassAction::Unlink, false, true);
        }

        if !config.mass_convert_currency_disabled
            && settings.currency_list.len() > 1
            && access.check_scope(entity_type, "edit")
            && mass_update_permitted
            && has_editable_currency_field(metadata, access, entity_type)
        {
            self.add(MassAction::ConvertCurrency, true, false);
        }

        if access.is_admin()
            && metadata.get_bool(&["formula", entity_type, "beforeSaveCustomScript"])
        {
            self.add(MassAction::RecalculateFormula, true, false);
        }

        if ctx.collection_url != entity_type {
            self.registry.all_result_actions.clear();
        }
        if !mass_update_permitted {
            self.registry.remove_all_result(&MassAction::Remove);
        }
    }

    fn apply_disabled_flags(&mut self) {
        let config = self.ctx.config;
        let disabled: Vec<MassAction> = self
            .registry
            .actions
            .iter()
            .filter(|a| config.is_action_flag_disabled(&a.disabled_flag()))
            .cloned()
            .collect();
        for action in disabled {
            self.registry.remove(&action);
        }
        if config.mass_actions_disabled {
            self.registry.clear();
        }
    }
}

/// Run the gating pipeline.
pub async fn build_registry(ctx: &GatingContext<'_>) -> Result<RegistrySetup, RegistryError> {
    let mut pipeline = Pipeline {
        ctx,
        registry: MassActionRegistry::default(),
        checkboxes: ctx.config.checkboxes,
    };

    pipeline.seed();
    pipeline.apply_scope_access();
    pipeline.append_declared()?;
    pipeline.recompute_all_result()?;
    pipeline.run_initializers().await;
    pipeline.apply_runtime_rules();
    pipeline.apply_disabled_flags();

    if pipeline.registry.is_empty() && !ctx.config.selectable {
        pipeline.checkboxes = false;
    }

    tracing::debug!(
        "Mass actions for {}: {:?} (all results: {:?})",
        ctx.entity_type,
        pipeline.registry.action_names(),
        pipeline.registry.all_result_action_names()
    );

    Ok(RegistrySetup {
        registry: pipeline.registry,
        checkboxes: pipeline.checkboxes,
    })
}

/// `configCheck` predicate: a settings path, optionally negated with `!`.
pub fn is_available(definition: &MassActionDefinition, settings: &AppSettings) -> bool {
    match definition.config_check.as_deref() {
        None | Some("") => true,
        Some(check) => match check.strip_prefix('!') {
            Some(path) => !settings.param_is_truthy(path),
            None => settings.param_is_truthy(check),
        },
    }
}

/// `acl` / `aclScope` predicate.
pub fn is_accessible(
    definition: &MassActionDefinition,
    scope: &str,
    access: &dyn AccessOracle,
) -> bool {
    match (&definition.acl, &definition.acl_scope) {
        (Some(acl), acl_scope) => access.check(acl_scope.as_deref().unwrap_or(scope), acl),
        (None, Some(acl_scope)) => access.check_scope(acl_scope, "read"),
        (None, None) => true,
    }
}

fn has_editable_currency_field(
    metadata: &dyn MetadataOracle,
    access: &dyn AccessOracle,
    entity_type: &str,
) -> bool {
    let forbidden = access.scope_forbidden_fields(entity_type, "edit");
    let Some(serde_json::Value::Object(fields)) =
        metadata.get(&["entityDefs", entity_type, "fields"])
    else {
        return false;
    };
    fields.keys().any(|name| {
        !forbidden.contains(name)
            && field_type(metadata, entity_type, name).as_deref() == Some("currency")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{ActionHandler, HandlerRequest};
    use crate::metadata::JsonMetadata;
    use crate::ports::MockAccessOracle;
    use futures::future::BoxFuture;
    use parking_lot::Mutex;
    use reclist_core::{EntityListDefs, ListDefaults, ListOptions, MassActionError};
    use serde_json::json;
    use std::sync::Arc;

    fn permissive_access() -> MockAccessOracle {
        let mut access = MockAccessOracle::new();
        access.expect_check().return_const(true);
        access.expect_check_scope().return_const(true);
        access.expect_check_model().return_const(true);
        access.expect_scope_forbidden_fields().return_const(Vec::<String>::new());
        access
            .expect_permission()
            .returning(|_| Some("yes".to_string()));
        access.expect_is_admin().return_const(false);
        access.expect_is_portal().return_const(false);
        access
    }

    fn config(options: ListOptions) -> ListConfig {
        ListConfig::resolve(
            &ListDefaults::default(),
            &EntityListDefs::default(),
            &options,
            &AppSettings::default(),
        )
    }

    async fn build(
        access: &MockAccessOracle,
        metadata: &JsonMetadata,
        config: &ListConfig,
        settings: &AppSettings,
        url: &str,
    ) -> RegistrySetup {
        let handlers = HandlerRegistry::new();
        build_with(access, metadata, config, settings, url, &handlers)
            .await
            .unwrap()
    }

    async fn build_with(
        access: &MockAccessOracle,
        metadata: &JsonMetadata,
        config: &ListConfig,
        settings: &AppSettings,
        url: &str,
        handlers: &HandlerRegistry,
    ) -> Result<RegistrySetup, RegistryError> {
        let ctx = GatingContext {
            entity_type: "Account",
            collection_url: url,
            config,
            settings,
            access,
            metadata,
            handlers,
        };
        build_registry(&ctx).await
    }

    #[tokio::test]
    async fn test_default_pipeline() {
        let access = permissive_access();
        let metadata = JsonMetadata::new(json!({}));
        let setup = build(
            &access,
            &metadata,
            &config(ListOptions::default()),
            &AppSettings::default(),
            "Account",
        )
        .await;

        assert_eq!(
            setup.registry.action_names(),
            vec!["remove", "merge", "massUpdate", "export"]
        );
        assert_eq!(
            setup.registry.all_result_action_names(),
            vec!["remove", "massUpdate", "export"]
        );
        assert!(setup.checkboxes);
    }

    #[tokio::test]
    async fn test_scope_access_removes_actions() {
        let mut access = MockAccessOracle::new();
        access.expect_check().return_const(true);
        access
            .expect_check_scope()
            .returning(|_, action| action != "delete");
        access.expect_scope_forbidden_fields().return_const(Vec::<String>::new());
        access.expect_permission().returning(|_| Some("yes".to_string()));
        access.expect_is_admin().return_const(false);

        let metadata = JsonMetadata::new(json!({}));
        let setup = build(
            &access,
            &metadata,
            &config(ListOptions::default()),
            &AppSettings::default(),
            "Account",
        )
        .await;

        assert_eq!(setup.registry.action_names(), vec!["massUpdate", "export"]);
    }

    #[tokio::test]
    async fn test_declared_actions_are_gated() {
        let access = permissive_access();
        let metadata = JsonMetadata::new(json!({
            "clientDefs": {
                "Account": {
                    "massActionList": ["sendNewsletter", "needsFlag"],
                    "checkAllResultMassActionList": ["sendNewsletter"],
                    "massActionDefs": {
                        "sendNewsletter": {"url": "Account/action/newsletter", "acl": "edit"},
                        "needsFlag": {"url": "x", "configCheck": "newsletterEnabled"}
                    }
                },
                "Global": {
                    "massActionList": ["sendNewsletter", "tag"],
                    "massActionDefs": {"tag": {"url": "Global/tag", "configCheck": "!tagsDisabled"}}
                }
            }
        }));
        let setup = build(
            &access,
            &metadata,
            &config(ListOptions::default()),
            &AppSettings::default(),
            "Account",
        )
        .await;

        assert_eq!(
            setup.registry.action_names(),
            vec!["remove", "merge", "massUpdate", "export", "sendNewsletter", "tag"]
        );
        assert!(setup
            .registry
            .is_all_result_safe(&MassAction::parse("sendNewsletter")));
        assert_eq!(
            setup.registry.definition("sendNewsletter").url.as_deref(),
            Some("Account/action/newsletter")
        );
    }

    #[tokio::test]
    async fn test_relation_list_has_no_all_result_actions() {
        let access = permissive_access();
        let metadata = JsonMetadata::new(json!({}));
        let setup = build(
            &access,
            &metadata,
            &config(ListOptions::default()),
            &AppSettings::default(),
            "Opportunity/abc/accounts",
        )
        .await;

        assert!(setup.registry.all_result_actions().is_empty());
        assert!(!setup.registry.is_empty());
    }

    #[tokio::test]
    async fn test_runtime_rules() {
        let mut access = MockAccessOracle::new();
        access.expect_check().return_const(true);
        access.expect_check_scope().return_const(true);
        access.expect_scope_forbidden_fields().return_const(Vec::<String>::new());
        access.expect_permission().returning(|name| match name {
            "exportPermission" => Some("no".to_string()),
            _ => Some("yes".to_string()),
        });
        access.expect_is_admin().return_const(true);

        let metadata = JsonMetadata::new(json!({
            "scopes": {"Account": {"stream": true}},
            "formula": {"Account": {"beforeSaveCustomScript": "entity\\setAttribute('a', 1);"}},
            "entityDefs": {"Account": {"fields": {"amount": {"type": "currency"}}}}
        }));
        let settings = AppSettings {
            currency_list: vec!["USD".into(), "EUR".into()],
            template_entity_types: vec!["Account".into()],
            ..AppSettings::default()
        };
        let options = ListOptions {
            unlink_mass_action: true,
            ..ListOptions::default()
        };
        let setup = build(&access, &metadata, &config(options), &settings, "Account").await;

        assert_eq!(
            setup.registry.action_names(),
            vec![
                "unlink",
                "remove",
                "merge",
                "massUpdate",
                "follow",
                "unfollow",
                "printPdf",
                "convertCurrency",
                "recalculateFormula",
            ]
        );
        assert_eq!(
            setup.registry.all_result_action_names(),
            vec![
                "remove",
                "massUpdate",
                "unfollow",
                "convertCurrency",
                "recalculateFormula"
            ]
        );
    }

    #[tokio::test]
    async fn test_mass_update_permission_gates_all_result_remove() {
        let mut access = MockAccessOracle::new();
        access.expect_check().return_const(true);
        access.expect_check_scope().return_const(true);
        access.expect_scope_forbidden_fields().return_const(Vec::<String>::new());
        access.expect_permission().return_const(None::<String>);
        access.expect_is_admin().return_const(false);

        let metadata = JsonMetadata::new(json!({}));
        let setup = build(
            &access,
            &metadata,
            &config(ListOptions::default()),
            &AppSettings::default(),
            "Account",
        )
        .await;

        assert_eq!(setup.registry.action_names(), vec!["remove", "merge", "export"]);
        assert_eq!(setup.registry.all_result_action_names(), vec!["export"]);
    }

    #[tokio::test]
    async fn test_disabled_flags_and_checkbox_suppression() {
        let access = permissive_access();
        let metadata = JsonMetadata::new(json!({}));

        let options = ListOptions {
            disabled_action_flags: vec!["massActionMergeDisabled".into()],
            ..ListOptions::default()
        };
        let setup = build(&access, &metadata, &config(options), &AppSettings::default(), "Account").await;
        assert!(!setup.registry.contains(&MassAction::Merge));

        let options = ListOptions {
            mass_actions_disabled: true,
            ..ListOptions::default()
        };
        let setup = build(&access, &metadata, &config(options), &AppSettings::default(), "Account").await;
        assert!(setup.registry.is_empty());
        assert!(!setup.checkboxes);

        let options = ListOptions {
            mass_actions_disabled: true,
            selectable: Some(true),
            ..ListOptions::default()
        };
        let setup = build(&access, &metadata, &config(options), &AppSettings::default(), "Account").await;
        assert!(setup.checkboxes);
    }

    #[tokio::test]
    async fn test_component_disable_flags_drop_actions() {
        let access = permissive_access();
        let metadata = JsonMetadata::new(json!({}));
        let settings = AppSettings {
            template_entity_types: vec!["Account".into()],
            ..AppSettings::default()
        };

        let setup = build(&access, &metadata, &config(ListOptions::default()), &settings, "Account").await;
        assert!(setup.registry.contains(&MassAction::PrintPdf));
        assert!(setup.registry.contains(&MassAction::Export));

        let defaults = ListDefaults {
            mass_print_pdf_disabled: true,
            disabled_action_flags: vec!["massActionExportDisabled".into()],
            ..ListDefaults::default()
        };
        let config = ListConfig::resolve(
            &defaults,
            &EntityListDefs::default(),
            &ListOptions::default(),
            &settings,
        );
        let setup = build(&access, &metadata, &config, &settings, "Account").await;

        assert!(!setup.registry.contains(&MassAction::PrintPdf));
        assert!(!setup.registry.contains(&MassAction::Export));
        assert_eq!(setup.registry.action_names(), vec!["remove", "merge", "massUpdate"]);
        assert_eq!(
            setup.registry.all_result_action_names(),
            vec!["remove", "massUpdate"]
        );
    }

    struct CountingHandler {
        inits: Arc<Mutex<Vec<String>>>,
    }

    impl ActionHandler for CountingHandler {
        fn init(&self, function: &str) -> BoxFuture<'static, Result<(), MassActionError>> {
            let inits = self.inits.clone();
            let function = function.to_string();
            Box::pin(async move {
                tokio::task::yield_now().await;
                inits.lock().push(function);
                Ok(())
            })
        }

        fn run(&self, _request: HandlerRequest) -> BoxFuture<'static, Result<(), MassActionError>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn test_initializers_complete_before_setup_returns() {
        let access = permissive_access();
        let metadata = JsonMetadata::new(json!({
            "clientDefs": {"Account": {
                "massActionList": ["a", "b"],
                "massActionDefs": {
                    "a": {"handler": "custom", "initFunction": "initA"},
                    "b": {"handler": "custom", "initFunction": "initB"}
                }
            }}
        }));
        let inits = Arc::new(Mutex::new(Vec::new()));
        let handlers = HandlerRegistry::new();
        handlers
            .register("custom", Arc::new(CountingHandler { inits: inits.clone() }))
            .unwrap();

        build_with(
            &access,
            &metadata,
            &config(ListOptions::default()),
            &AppSettings::default(),
            "Account",
            &handlers,
        )
        .await
        .unwrap();

        let mut done = inits.lock().clone();
        done.sort();
        assert_eq!(done, vec!["initA", "initB"]);
    }

    #[tokio::test]
    async fn test_unregistered_handler_fails_setup() {
        let access = permissive_access();
        let metadata = JsonMetadata::new(json!({
            "clientDefs": {"Account": {
                "massActionList": ["a"],
                "massActionDefs": {"a": {"handler": "missing"}}
            }}
        }));

        let err = build_with(
            &access,
            &metadata,
            &config(ListOptions::default()),
            &AppSettings::default(),
            "Account",
            &HandlerRegistry::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(
            err,
            RegistryError::UnregisteredHandler {
                action: "a".into(),
                handler: "missing".into()
            }
        );
    }

    #[test]
    fn test_config_check() {
        let mut settings = AppSettings::default();
        settings.extra.insert("flag".into(), json!(true));

        let mut def = MassActionDefinition::from_metadata("x", None);
        assert!(is_available(&def, &settings));
        def.config_check = Some("flag".into());
        assert!(is_available(&def, &settings));
        def.config_check = Some("!flag".into());
        assert!(!is_available(&def, &settings));
        def.config_check = Some("missing".into());
        assert!(!is_available(&def, &settings));
    }
}
