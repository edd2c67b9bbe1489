use serde::de::DeserializeOwned;
use serde::Serialize;

/// A record type managed by a mapping context.
///
/// Entities are plain serde types. The context stores each one as a JSON
/// document in the table named by [`Entity::SET_NAME`] and identifies it by the
/// serialized value of [`Entity::KEY_FIELD`].
///
/// A key that serializes to `null` or to the integer `0` is store-generated:
/// the next integer is assigned on insert and written back into the entity
/// returned by the add operations.
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Note {
///     #[serde(default)]
///     id: i64,
///     title: String,
/// }
///
/// impl Entity for Note {
///     const SET_NAME: &'static str = "notes";
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Table name of the entity set. Must match `[A-Za-z_][A-Za-z0-9_]*`.
    const SET_NAME: &'static str;

    /// Serialized field holding the entity's identity.
    const KEY_FIELD: &'static str = "id";
}

/// Short type name used in log lines and error messages.
pub fn entity_name<T: Entity>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Widget {
        code: String,
    }

    impl Entity for Widget {
        const SET_NAME: &'static str = "widgets";
        const KEY_FIELD: &'static str = "code";
    }

    #[test]
    fn test_entity_name_strips_module_path() {
        assert_eq!(entity_name::<Widget>(), "Widget");
    }

    #[test]
    fn test_key_field_override() {
        assert_eq!(Widget::KEY_FIELD, "code");
        assert_eq!(Widget::SET_NAME, "widgets");
    }
}
