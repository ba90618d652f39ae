//! Element payload helpers.
//!
//! Elements travel as JSON objects. The fields this crate cares about are the
//! identity (`sysmlid`), the owner, the optimistic-concurrency stamp (`read`)
//! and the polymorphic `specialization` payload selected by its `type`.

use serde_json::{Map, Value};

/// Identity field assigned by the server.
pub const ID_FIELD: &str = "sysmlid";
/// Owning element reference.
pub const OWNER_FIELD: &str = "owner";
/// Read stamp used for optimistic concurrency.
pub const READ_FIELD: &str = "read";
/// Polymorphic payload.
pub const SPECIALIZATION_FIELD: &str = "specialization";
/// Aggregate list carried by fully hydrated container elements.
pub const CONTAINS_FIELD: &str = "contains";
/// Document structure (view tree) carried by products.
pub const VIEW2VIEW_FIELD: &str = "view2view";

/// Fields that change on every server round trip and carry no user intent.
pub const VOLATILE_FIELDS: [&str; 3] = ["modified", READ_FIELD, "creator"];

/// Specialization fields that cannot be edited through an edit copy.
pub const NON_EDIT_KEYS: [&str; 5] = [
    CONTAINS_FIELD,
    VIEW2VIEW_FIELD,
    "childrenViews",
    "displayedElements",
    "allowedElements",
];

/// Known specialization discriminants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecializationKind {
    Property,
    View,
    Product,
    Package,
    Comment,
    Other,
}

impl SpecializationKind {
    pub fn from_type(type_name: &str) -> Self {
        match type_name {
            "Property" => Self::Property,
            "View" => Self::View,
            "Product" => Self::Product,
            "Package" => Self::Package,
            "Comment" => Self::Comment,
            _ => Self::Other,
        }
    }

    /// Kind of an element's specialization, or `None` when it has none.
    pub fn of(element: &Value) -> Option<Self> {
        let spec = element.get(SPECIALIZATION_FIELD)?.as_object()?;
        Some(
            spec.get("type")
                .and_then(Value::as_str)
                .map_or(Self::Other, Self::from_type),
        )
    }

    /// Document/view-like kinds that aggregate other elements via `contains`.
    pub fn is_container(self) -> bool {
        match self {
            Self::View | Self::Product => true,
            Self::Property | Self::Package | Self::Comment | Self::Other => false,
        }
    }
}

/// The element's identity, if present.
pub fn element_id(element: &Value) -> Option<&str> {
    element.get(ID_FIELD).and_then(Value::as_str)
}

/// True when the field is present with a non-null value.
pub fn has_field(element: &Value, field: &str) -> bool {
    element.get(field).is_some_and(|v| !v.is_null())
}

fn specialization_mut(element: &mut Value) -> Option<&mut Map<String, Value>> {
    element.get_mut(SPECIALIZATION_FIELD)?.as_object_mut()
}

/// True for container elements that were seeded without their `contains`
/// aggregate (e.g. by a lightweight list endpoint) and need a full fetch.
pub fn is_partially_hydrated(element: &Value) -> bool {
    let Some(kind) = SpecializationKind::of(element) else {
        return false;
    };
    kind.is_container()
        && element
            .get(SPECIALIZATION_FIELD)
            .and_then(Value::as_object)
            .is_some_and(|spec| !spec.contains_key(CONTAINS_FIELD))
}

/// Normalize an element in place.
///
/// - Property values are coerced to an array and lose nested specializations.
/// - A specialization nested directly inside the specialization is dropped.
/// - With `for_edit`, the non-editable structural fields are removed.
pub fn clean_element(element: &mut Value, for_edit: bool) {
    let kind = SpecializationKind::of(element);
    let Some(spec) = specialization_mut(element) else {
        return;
    };

    if kind == Some(SpecializationKind::Property) {
        match spec.get_mut("value") {
            Some(Value::Array(values)) => {
                for value in values.iter_mut() {
                    if let Some(obj) = value.as_object_mut() {
                        obj.remove(SPECIALIZATION_FIELD);
                    }
                }
            }
            _ => {
                spec.insert("value".to_string(), Value::Array(Vec::new()));
            }
        }
    }

    spec.remove(SPECIALIZATION_FIELD);

    if for_edit {
        for key in NON_EDIT_KEYS {
            spec.remove(key);
        }
    }
}

/// Remove the volatile fields (`modified`, `read`, `creator`).
pub fn strip_volatile(element: &mut Value) {
    if let Some(obj) = element.as_object_mut() {
        for field in VOLATILE_FIELDS {
            obj.remove(field);
        }
    }
}
