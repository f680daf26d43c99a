//! EDM primitive types and store-type mapping

/// Primitive types accepted for conceptual properties
pub const EDM_PRIMITIVES: &[&str] = &[
    "Binary",
    "Boolean",
    "Byte",
    "DateTime",
    "DateTimeOffset",
    "Decimal",
    "Double",
    "Guid",
    "Int16",
    "Int32",
    "Int64",
    "SByte",
    "Single",
    "String",
    "Time",
];

/// Check if `name` is a conceptual primitive type
#[must_use]
pub fn is_primitive(name: &str) -> bool {
    EDM_PRIMITIVES.contains(&name)
}

/// Conceptual primitive type for a database column type
///
/// Matching is case-insensitive. Unknown store types yield `None`.
#[must_use]
pub fn edm_type_for_store(store_type: &str) -> Option<&'static str> {
    let lowered = store_type.to_ascii_lowercase();
    let edm = match lowered.as_str() {
        "bit" => "Boolean",
        "tinyint" => "Byte",
        "smallint" => "Int16",
        "int" => "Int32",
        "bigint" => "Int64",
        "real" => "Single",
        "float" => "Double",
        "decimal" | "numeric" | "money" | "smallmoney" => "Decimal",
        "char" | "nchar" | "varchar" | "nvarchar" | "text" | "ntext" | "xml" => "String",
        "binary" | "varbinary" | "image" | "rowversion" | "timestamp" => "Binary",
        "date" | "datetime" | "datetime2" | "smalldatetime" => "DateTime",
        "datetimeoffset" => "DateTimeOffset",
        "time" => "Time",
        "uniqueidentifier" => "Guid",
        _ => return None,
    };
    Some(edm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_types_map_to_primitives() {
        assert_eq!(edm_type_for_store("INT"), Some("Int32"));
        assert_eq!(edm_type_for_store("nvarchar"), Some("String"));
        assert_eq!(edm_type_for_store("geography"), None);
    }

    #[test]
    fn every_mapped_type_is_primitive() {
        for store in ["bit", "bigint", "money", "xml", "image", "time", "uniqueidentifier"] {
            let edm = edm_type_for_store(store).unwrap();
            assert!(is_primitive(edm), "{edm}");
        }
    }
}
