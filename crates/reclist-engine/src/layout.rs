//! Layout resolution and column projection.
//!
//! A list layout is an ordered list of [`ColumnDescriptor`]s. The projector
//! turns it into header descriptors and the per-row cell instructions shared
//! by every row binding. Field access is applied once, when the projector is
//! built: forbidden columns keep their position (so widths stay stable) but
//! lose their label and sortability.

use serde::{Deserialize, Serialize};

use reclist_core::{ListConfig, SortOrder};

use crate::ports::MetadataOracle;

/// One declared column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnDescriptor {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub field_type: Option<String>,
    /// Percentage width.
    pub width: Option<f64>,
    pub width_px: Option<f64>,
    pub align: Option<String>,
    pub custom_label: Option<String>,
    pub not_sortable: bool,
    pub no_label: bool,
    pub view: Option<String>,
    pub link: bool,
    pub params: Option<serde_json::Value>,
}

impl ColumnDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Declared width. Pixels win over percent.
    pub fn declared_width(&self) -> Option<ColumnWidth> {
        match (self.width_px, self.width) {
            (Some(px), _) if px > 0.0 => Some(ColumnWidth::Pixels(px)),
            (_, Some(pct)) if pct > 0.0 => Some(ColumnWidth::Percent(pct)),
            _ => None,
        }
    }
}

/// A column width as rendered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ColumnWidth {
    Percent(f64),
    Pixels(f64),
}

impl ColumnWidth {
    /// CSS form, e.g. `30%` or `120px`.
    pub fn css(&self) -> String {
        match self {
            Self::Percent(w) => format!("{}%", w),
            Self::Pixels(w) => format!("{}px", w),
        }
    }
}

/// One header cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderDef {
    pub name: Option<String>,
    /// Custom label, or the field name as a translation key.
    pub label: Option<String>,
    pub has_custom_label: bool,
    pub sortable: bool,
    pub sorted: bool,
    pub descending: bool,
    pub width: Option<ColumnWidth>,
    pub align: Option<String>,
}

/// How a field cell renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CellMode {
    List,
    /// Rendered as a link to the record.
    ListLink,
}

/// Render instructions for one field cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellInstruction {
    pub column_name: String,
    /// Key of the cell within the row, `{column}Field`.
    pub name: String,
    pub view: String,
    pub mode: CellMode,
    pub width: Option<ColumnWidth>,
    pub align: Option<String>,
    pub params: serde_json::Value,
}

/// One cell of a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RowCell {
    Checkbox,
    Field(CellInstruction),
    RowActions { view: String, width: u32 },
}

/// Turns a layout into headers and row cells for one rendering session.
pub struct LayoutProjector {
    entity_type: String,
    columns: Vec<ColumnDescriptor>,
    cells: Vec<RowCell>,
    checkboxes: bool,
    row_actions_width: Option<u32>,
    checkbox_column_width: u32,
    min_column_width: u32,
}

impl LayoutProjector {
    /// Build the projection.
    ///
    /// `forbidden_fields` are the fields the principal may not read; pass an
    /// empty list when layout access filtering is disabled.
    pub fn new(
        entity_type: &str,
        columns: Vec<ColumnDescriptor>,
        forbidden_fields: &[String],
        metadata: &dyn MetadataOracle,
        config: &ListConfig,
    ) -> Self {
        let columns = filter_forbidden(columns, forbidden_fields);
        let mut cells = Vec::with_capacity(columns.len() + 2);

        if config.checkboxes {
            cells.push(RowCell::Checkbox);
        }
        for column in &columns {
            let Some(name) = column.name.as_deref() else {
                continue;
            };
            let field_type = column
                .field_type
                .clone()
                .or_else(|| field_type(metadata, entity_type, name));
            let view = column
                .view
                .clone()
                .or_else(|| metadata.get_str(&["entityDefs", entity_type, "fields", name, "view"]))
                .unwrap_or_else(|| field_view_name(metadata, field_type.as_deref()));

            cells.push(RowCell::Field(CellInstruction {
                column_name: name.to_string(),
                name: format!("{}Field", name),
                view,
                mode: if column.link {
                    CellMode::ListLink
                } else {
                    CellMode::List
                },
                width: column.declared_width(),
                align: column.align.clone(),
                params: column
                    .params
                    .clone()
                    .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
            }));
        }
        if let Some(view) = &config.row_actions_view {
            cells.push(RowCell::RowActions {
                view: view.clone(),
                width: config.row_actions_column_width,
            });
        }

        Self {
            entity_type: entity_type.to_string(),
            columns,
            cells,
            checkboxes: config.checkboxes,
            row_actions_width: config
                .has_row_actions()
                .then_some(config.row_actions_column_width),
            checkbox_column_width: config.checkbox_column_width,
            min_column_width: config.min_column_width,
        }
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Cells every row binding is built from.
    pub fn row_cells(&self) -> &[RowCell] {
        &self.cells
    }

    /// Names of the declared columns, in order.
    pub fn field_names(&self) -> Vec<String> {
        self.columns.iter().filter_map(|c| c.name.clone()).collect()
    }

    /// Header cells for the current sort.
    ///
    /// A trailing width-only cell is added for the row-actions column.
    pub fn header_defs(&self, order_by: Option<&str>, order: SortOrder) -> Vec<HeaderDef> {
        let mut defs: Vec<HeaderDef> = self
            .columns
            .iter()
            .map(|column| {
                let sortable = !column.not_sortable;
                let sorted = sortable && column.name.is_some() && column.name.as_deref() == order_by;
                let label = if column.no_label {
                    None
                } else {
                    column.custom_label.clone().or_else(|| column.name.clone())
                };
                HeaderDef {
                    name: column.name.clone(),
                    label,
                    has_custom_label: column.custom_label.is_some(),
                    sortable,
                    sorted,
                    descending: sorted && order == SortOrder::Desc,
                    width: column.declared_width(),
                    align: column.align.clone(),
                }
            })
            .collect();

        if let Some(width) = self.row_actions_width {
            defs.push(HeaderDef {
                name: None,
                label: None,
                has_custom_label: false,
                sortable: false,
                sorted: false,
                descending: false,
                width: Some(ColumnWidth::Pixels(width as f64)),
                align: None,
            });
        }
        defs
    }

    /// Minimum table width including the checkbox and row-actions columns.
    pub fn min_table_width(&self) -> u64 {
        let mut extra_px = 0.0;
        if self.checkboxes {
            extra_px += self.checkbox_column_width as f64;
        }
        if let Some(width) = self.row_actions_width {
            extra_px += width as f64;
        }
        min_table_width(&self.columns, self.min_column_width, extra_px)
    }

    /// Attributes the record source must select for this layout.
    ///
    /// Union of every column's attributes plus `mandatory`, deduplicated in
    /// first-seen order. Columns whose field has no known type are skipped.
    pub fn select_attribute_list(
        &self,
        metadata: &dyn MetadataOracle,
        mandatory: &[String],
    ) -> Option<Vec<String>> {
        if self.entity_type.is_empty() {
            return None;
        }

        let mut attributes: Vec<String> = Vec::new();
        let mut push = |attribute: String| {
            if !attributes.contains(&attribute) {
                attributes.push(attribute);
            }
        };

        for column in &self.columns {
            let Some(name) = column.name.as_deref() else {
                continue;
            };
            let Some(field_type) = field_type(metadata, &self.entity_type, name) else {
                continue;
            };
            for attribute in field_attribute_list(metadata, name, &field_type) {
                push(attribute);
            }
        }
        for attribute in mandatory {
            push(attribute.clone());
        }
        Some(attributes)
    }
}

/// Blank the label and disable sorting on forbidden columns.
pub fn filter_forbidden(
    mut columns: Vec<ColumnDescriptor>,
    forbidden_fields: &[String],
) -> Vec<ColumnDescriptor> {
    for column in &mut columns {
        let forbidden = column
            .name
            .as_ref()
            .is_some_and(|name| forbidden_fields.contains(name));
        if forbidden {
            column.custom_label = Some(String::new());
            column.not_sortable = true;
        }
    }
    columns
}

/// Minimum width of a table with the given columns.
///
/// With declared percentages summing to `W`, pixel widths (plus `extra_px`)
/// summing to `Wpx` and `E` undeclared columns: `columns * min` when
/// `W >= 100`, otherwise `round((Wpx + min * E) / (1 - W / 100))`.
pub fn min_table_width(columns: &[ColumnDescriptor], min_column_width: u32, extra_px: f64) -> u64 {
    let mut total_percent = 0.0;
    let mut total_px = extra_px;
    let mut empty = 0u32;

    for column in columns {
        match column.declared_width() {
            Some(ColumnWidth::Pixels(px)) => total_px += px,
            Some(ColumnWidth::Percent(pct)) => total_percent += pct,
            None => empty += 1,
        }
    }

    let min = min_column_width as f64;
    if total_percent >= 100.0 {
        return columns.len() as u64 * min_column_width as u64;
    }
    ((total_px + min * empty as f64) / (1.0 - total_percent / 100.0)).round() as u64
}

/// Declared type of a field on an entity.
pub fn field_type(metadata: &dyn MetadataOracle, entity_type: &str, field: &str) -> Option<String> {
    metadata.get_str(&["entityDefs", entity_type, "fields", field, "type"])
}

/// Attributes backing a field, from the `actualFields` suffixes of its type.
///
/// `address` with suffixes `["street", "city"]` on field `billingAddress`
/// gives `billingAddressStreet`, `billingAddressCity`. An empty suffix maps to
/// the field name itself.
pub fn field_attribute_list(
    metadata: &dyn MetadataOracle,
    field: &str,
    field_type: &str,
) -> Vec<String> {
    let mut suffixes = metadata.get_str_list(&["fields", field_type, "actualFields"]);
    suffixes.extend(metadata.get_str_list(&["fields", field_type, "notActualFields"]));

    if suffixes.is_empty() {
        return vec![field.to_string()];
    }
    suffixes
        .iter()
        .map(|suffix| format!("{}{}", field, upper_first(suffix)))
        .collect()
}

/// View used to render a field of the given type.
fn field_view_name(metadata: &dyn MetadataOracle, field_type: Option<&str>) -> String {
    let field_type = field_type.unwrap_or("base");
    metadata
        .get_str(&["fields", field_type, "view"])
        .unwrap_or_else(|| format!("views/fields/{}", camel_to_hyphen(field_type)))
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn camel_to_hyphen(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if c.is_uppercase() {
            out.push('-');
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::JsonMetadata;
    use reclist_core::{AppSettings, EntityListDefs, ListDefaults, ListOptions};
    use serde_json::json;

    fn width(pct: f64) -> ColumnDescriptor {
        ColumnDescriptor {
            width: Some(pct),
            ..ColumnDescriptor::default()
        }
    }

    fn config(options: ListOptions) -> ListConfig {
        ListConfig::resolve(
            &ListDefaults::default(),
            &EntityListDefs::default(),
            &options,
            &AppSettings::default(),
        )
    }

    fn metadata() -> JsonMetadata {
        JsonMetadata::new(json!({
            "entityDefs": {"Account": {"fields": {
                "name": {"type": "varchar"},
                "billingAddress": {"type": "address"},
                "amount": {"type": "currency"},
                "assignedUser": {"type": "link"}
            }}},
            "fields": {
                "address": {"actualFields": ["street", "city", "country"]},
                "currency": {"actualFields": ["currency", ""], "view": "views/fields/currency"},
                "link": {"actualFields": ["id"], "notActualFields": ["name"]}
            }
        }))
    }

    #[test]
    fn test_min_width_with_one_empty_column() {
        let columns = vec![width(50.0), width(30.0), ColumnDescriptor::default()];
        assert_eq!(min_table_width(&columns, 100, 0.0), 500);
    }

    #[test]
    fn test_min_width_full_percentage() {
        let columns = vec![width(60.0), width(40.0), ColumnDescriptor::default()];
        assert_eq!(min_table_width(&columns, 100, 0.0), 300);
    }

    #[test]
    fn test_min_width_counts_pixels() {
        let columns = vec![
            ColumnDescriptor {
                width_px: Some(150.0),
                ..ColumnDescriptor::default()
            },
            ColumnDescriptor::default(),
        ];
        assert_eq!(min_table_width(&columns, 100, 40.0), 290);
    }

    #[test]
    fn test_forbidden_columns_keep_position() {
        let columns = vec![ColumnDescriptor::named("name"), ColumnDescriptor::named("salary")];
        let filtered = filter_forbidden(columns, &["salary".to_string()]);

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[1].custom_label.as_deref(), Some(""));
        assert!(filtered[1].not_sortable);
        assert!(!filtered[0].not_sortable);
    }

    #[test]
    fn test_header_defs() {
        let metadata = metadata();
        let columns = vec![
            ColumnDescriptor {
                width: Some(40.0),
                link: true,
                ..ColumnDescriptor::named("name")
            },
            ColumnDescriptor {
                custom_label: Some("Where".into()),
                ..ColumnDescriptor::named("billingAddress")
            },
            ColumnDescriptor {
                no_label: true,
                not_sortable: true,
                ..ColumnDescriptor::named("amount")
            },
        ];
        let projector =
            LayoutProjector::new("Account", columns, &[], &metadata, &config(ListOptions::default()));

        let defs = projector.header_defs(Some("name"), SortOrder::Desc);
        assert_eq!(defs.len(), 4);
        assert!(defs[0].sorted && defs[0].descending);
        assert_eq!(defs[0].width.map(|w| w.css()), Some("40%".to_string()));
        assert_eq!(defs[1].label.as_deref(), Some("Where"));
        assert!(defs[1].has_custom_label);
        assert!(!defs[1].sorted);
        assert_eq!(defs[2].label, None);
        assert!(!defs[2].sortable);
        assert_eq!(defs[3].width, Some(ColumnWidth::Pixels(25.0)));
    }

    #[test]
    fn test_row_cells() {
        let metadata = metadata();
        let columns = vec![
            ColumnDescriptor {
                link: true,
                ..ColumnDescriptor::named("name")
            },
            ColumnDescriptor::named("amount"),
            ColumnDescriptor::named("assignedUser"),
        ];
        let projector =
            LayoutProjector::new("Account", columns, &[], &metadata, &config(ListOptions::default()));
        let cells = projector.row_cells();

        assert_eq!(cells.len(), 5);
        assert_eq!(cells[0], RowCell::Checkbox);
        match &cells[1] {
            RowCell::Field(cell) => {
                assert_eq!(cell.name, "nameField");
                assert_eq!(cell.view, "views/fields/varchar");
                assert_eq!(cell.mode, CellMode::ListLink);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &cells[2] {
            RowCell::Field(cell) => assert_eq!(cell.view, "views/fields/currency"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(cells[4], RowCell::RowActions { width: 25, .. }));
    }

    #[test]
    fn test_no_checkbox_or_row_actions_cells() {
        let metadata = metadata();
        let options = ListOptions {
            checkboxes: Some(false),
            row_actions_disabled: true,
            ..ListOptions::default()
        };
        let projector = LayoutProjector::new(
            "Account",
            vec![ColumnDescriptor::named("name")],
            &[],
            &metadata,
            &config(options),
        );

        assert_eq!(projector.row_cells().len(), 1);
        assert_eq!(projector.header_defs(None, SortOrder::Asc).len(), 1);
        assert_eq!(projector.min_table_width(), 100);
    }

    #[test]
    fn test_select_attribute_list() {
        let metadata = metadata();
        let columns = vec![
            ColumnDescriptor::named("name"),
            ColumnDescriptor::named("billingAddress"),
            ColumnDescriptor::named("amount"),
            ColumnDescriptor::named("assignedUser"),
            ColumnDescriptor::named("unknownField"),
        ];
        let projector =
            LayoutProjector::new("Account", columns, &[], &metadata, &config(ListOptions::default()));

        let attributes = projector
            .select_attribute_list(&metadata, &["name".to_string(), "createdAt".to_string()])
            .unwrap();
        assert_eq!(
            attributes,
            vec![
                "name",
                "billingAddressStreet",
                "billingAddressCity",
                "billingAddressCountry",
                "amountCurrency",
                "amount",
                "assignedUserId",
                "assignedUserName",
                "createdAt",
            ]
        );
    }

    #[test]
    fn test_select_attribute_list_without_scope() {
        let metadata = metadata();
        let projector = LayoutProjector::new(
            "",
            vec![ColumnDescriptor::named("name")],
            &[],
            &metadata,
            &config(ListOptions::default()),
        );
        assert!(projector.select_attribute_list(&metadata, &[]).is_none());
    }

    #[test]
    fn test_camel_to_hyphen() {
        assert_eq!(camel_to_hyphen("linkMultiple"), "link-multiple");
        assert_eq!(camel_to_hyphen("varchar"), "varchar");
    }
}
