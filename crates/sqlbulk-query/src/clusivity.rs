//! Column inclusion and exclusion.
//!
//! A mutating operation always acts on the key columns plus some subset of
//! the non-key columns. [`Clusivity`] describes that subset by inclusion or
//! exclusion, naming columns either through typed [`Field`] references or by
//! plain name, and [`Clusivity::resolve`] turns it into concrete column
//! positions.

use sqlbulk_core::{EntityDescriptor, Error, Field, Result};

/// A set of columns named by field reference and/or by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet {
    fields: Vec<&'static str>,
    names: Vec<String>,
}

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column by typed field reference.
    pub fn field<T>(mut self, field: Field<T>) -> Self {
        self.fields.push(field.name);
        self
    }

    /// Add a column by name. Matches either the column name or the field name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.names.push(name.into());
        self
    }

    /// Add several columns by name.
    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(Into::into));
        self
    }

    fn contains(&self, column_name: &str, field_name: &str) -> bool {
        self.fields
            .iter()
            .copied()
            .chain(self.names.iter().map(String::as_str))
            .any(|n| n == column_name || n == field_name)
    }
}

/// Which non-key columns an operation touches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Clusivity {
    /// Every non-key column.
    #[default]
    All,
    /// Only the listed columns.
    Include(ColumnSet),
    /// Every non-key column except the listed ones.
    Exclude(ColumnSet),
}

impl Clusivity {
    pub fn include(set: ColumnSet) -> Self {
        Clusivity::Include(set)
    }

    pub fn exclude(set: ColumnSet) -> Self {
        Clusivity::Exclude(set)
    }

    /// Resolve to non-key column positions, in entity column order.
    ///
    /// Key columns are never part of the result. Listed names that are not
    /// non-key columns of the entity are ignored. An empty result is a
    /// configuration error.
    #[allow(clippy::result_large_err)]
    pub fn resolve(&self, entity: &EntityDescriptor) -> Result<Vec<usize>> {
        let fields = entity.fields();
        let resolved: Vec<usize> = entity
            .non_key_indices()
            .iter()
            .copied()
            .filter(|&i| {
                let f = &fields[i];
                match self {
                    Clusivity::All => true,
                    Clusivity::Include(set) => set.contains(f.column_name, f.name),
                    Clusivity::Exclude(set) => !set.contains(f.column_name, f.name),
                }
            })
            .collect();

        if resolved.is_empty() {
            return Err(Error::config(format!(
                "column selection for '{}' leaves no non-key column to act on",
                entity.table_name()
            )));
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlbulk_core::{Entity, FieldInfo, Row, SqlType, Value};

    #[derive(Debug, Clone, Default)]
    struct Item {
        id: i64,
        name: String,
        price: f64,
        stock: i32,
    }

    impl Item {
        const NAME: Field<String> = Field::new("name");
        const PRICE: Field<f64> = Field::new("price");
    }

    impl Entity for Item {
        const TABLE_NAME: &'static str = "items";
        const PRIMARY_KEY: &'static [&'static str] = &["id"];

        fn fields() -> &'static [FieldInfo] {
            static FIELDS: [FieldInfo; 4] = [
                FieldInfo::new("id", "id", SqlType::BigInt).primary_key(true),
                FieldInfo::new("name", "name", SqlType::Text),
                FieldInfo::new("price", "unit_price", SqlType::Double),
                FieldInfo::new("stock", "stock", SqlType::Integer),
            ];
            &FIELDS
        }

        fn to_row(&self) -> Vec<(&'static str, Value)> {
            vec![
                ("id", self.id.into()),
                ("name", self.name.clone().into()),
                ("unit_price", self.price.into()),
                ("stock", self.stock.into()),
            ]
        }

        fn from_row(row: &Row) -> sqlbulk_core::Result<Self> {
            Ok(Self {
                id: row.get_named("id")?,
                name: row.get_named("name")?,
                price: row.get_named("unit_price")?,
                stock: row.get_named("stock")?,
            })
        }
    }

    fn entity() -> EntityDescriptor {
        EntityDescriptor::of::<Item>().unwrap()
    }

    #[test]
    fn test_all_is_every_non_key_column() {
        assert_eq!(Clusivity::All.resolve(&entity()).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_include_unions_fields_and_names_in_entity_order() {
        let set = ColumnSet::new().name("stock").field(Item::NAME).name("name");
        assert_eq!(Clusivity::include(set).resolve(&entity()).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_include_ignores_keys_and_unknown_names() {
        let set = ColumnSet::new().name("id").name("bogus").field(Item::PRICE);
        assert_eq!(Clusivity::include(set).resolve(&entity()).unwrap(), vec![2]);
    }

    #[test]
    fn test_field_name_and_column_name_both_match() {
        let by_column = ColumnSet::new().name("unit_price");
        assert_eq!(Clusivity::include(by_column).resolve(&entity()).unwrap(), vec![2]);
    }

    #[test]
    fn test_exclude_subtracts() {
        let set = ColumnSet::new().field(Item::PRICE).names(["stock"]);
        assert_eq!(Clusivity::exclude(set).resolve(&entity()).unwrap(), vec![1]);
    }

    #[test]
    fn test_empty_result_is_config_error() {
        let set = ColumnSet::new().names(["name", "price", "stock"]);
        let err = Clusivity::exclude(set).resolve(&entity()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Clusivity::include(ColumnSet::new().name("id"))
            .resolve(&entity())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
