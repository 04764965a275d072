//! Credential field merging.
//!
//! Catalog descriptors replace stored descriptors, but a non-empty stored
//! value always survives: the catalog can reshape a field, never overwrite
//! what an operator entered. Field types are not checked, so a field whose
//! type changes keeps its old value.

use crate::model::{CredentialField, Credentials};

/// Merge one catalog field descriptor over the stored field of the same name.
///
/// The result is the catalog descriptor. If the stored field holds a
/// non-empty value, that value replaces whatever value the catalog carries.
pub fn merge_credential_field(
    stored: Option<&CredentialField>,
    catalog: &CredentialField,
) -> CredentialField {
    let mut merged = catalog.clone();
    if let Some(value) = stored.and_then(CredentialField::stored_value) {
        merged.value = Some(value.to_string());
    }
    merged
}

/// Merge catalog credentials into stored credentials.
///
/// - Absent stored credentials start from an empty mapping.
/// - Fields only in the catalog are added verbatim, value included.
/// - Fields in both take the catalog descriptor and keep the stored value.
/// - Fields only in storage are left untouched.
pub fn merge_credentials(
    stored: Option<&Credentials>,
    catalog: Option<&Credentials>,
) -> Credentials {
    let mut merged = stored.cloned().unwrap_or_default();
    for (name, field) in catalog.into_iter().flatten() {
        let next = merge_credential_field(merged.get(name), field);
        merged.insert(name.clone(), next);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds(fields: &[(&str, CredentialField)]) -> Credentials {
        fields
            .iter()
            .map(|(name, field)| (name.to_string(), field.clone()))
            .collect()
    }

    #[test]
    fn test_absent_stored_starts_empty() {
        assert!(merge_credentials(None, None).is_empty());
    }

    #[test]
    fn test_new_field_added_with_catalog_value() {
        let catalog = creds(&[("api_key", CredentialField::new("string").with_value("default"))]);
        let merged = merge_credentials(None, Some(&catalog));
        assert_eq!(merged, catalog);
    }

    #[test]
    fn test_stored_value_wins_over_catalog_value() {
        let stored = creds(&[("api_key", CredentialField::new("string").with_value("secret123"))]);
        let catalog = creds(&[(
            "api_key",
            CredentialField::new("string")
                .with_description("new description")
                .with_value("should-be-ignored"),
        )]);

        let merged = merge_credentials(Some(&stored), Some(&catalog));
        let field = &merged["api_key"];
        assert_eq!(field.value.as_deref(), Some("secret123"));
        assert_eq!(field.description.as_deref(), Some("new description"));
    }

    #[test]
    fn test_empty_stored_value_takes_catalog_value() {
        let stored = creds(&[("api_key", CredentialField::new("string").with_value(""))]);
        let catalog = creds(&[("api_key", CredentialField::new("string").with_value("default"))]);

        let merged = merge_credentials(Some(&stored), Some(&catalog));
        assert_eq!(merged["api_key"].value.as_deref(), Some("default"));
    }

    #[test]
    fn test_descriptor_replaced_without_value() {
        let mut old = CredentialField::new("string").with_description("old");
        old.extra
            .insert("required".to_string(), serde_json::json!(true));
        let stored = creds(&[("token", old)]);
        let catalog = creds(&[("token", CredentialField::new("string").with_description("new"))]);

        let merged = merge_credentials(Some(&stored), Some(&catalog));
        assert_eq!(merged["token"], CredentialField::new("string").with_description("new"));
    }

    #[test]
    fn test_type_change_keeps_value() {
        let stored = creds(&[("port", CredentialField::new("string").with_value("8080"))]);
        let catalog = creds(&[("port", CredentialField::new("integer"))]);

        let merged = merge_credentials(Some(&stored), Some(&catalog));
        assert_eq!(merged["port"].field_type.as_deref(), Some("integer"));
        assert_eq!(merged["port"].value.as_deref(), Some("8080"));
    }

    #[test]
    fn test_stored_only_fields_kept() {
        let stored = creds(&[("legacy", CredentialField::new("string").with_value("v"))]);
        let catalog = creds(&[("api_key", CredentialField::new("string"))]);

        let merged = merge_credentials(Some(&stored), Some(&catalog));
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["legacy"].value.as_deref(), Some("v"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let stored = creds(&[("api_key", CredentialField::new("string").with_value("real-key"))]);
        let catalog = creds(&[(
            "api_key",
            CredentialField::new("string").with_value("should-be-ignored"),
        )]);

        let once = merge_credentials(Some(&stored), Some(&catalog));
        let twice = merge_credentials(Some(&once), Some(&catalog));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_stored_value_always_wins() {
        let values = ["a", "secret123", "ключ", " "];
        let catalog_values = [None, Some(""), Some("x"), Some("secret123")];
        for stored_value in values {
            for catalog_value in catalog_values {
                let stored = creds(&[("f", CredentialField::new("string").with_value(stored_value))]);
                let mut field = CredentialField::new("other");
                field.value = catalog_value.map(str::to_string);
                let catalog = creds(&[("f", field)]);

                let merged = merge_credentials(Some(&stored), Some(&catalog));
                assert_eq!(merged["f"].value.as_deref(), Some(stored_value));
            }
        }
    }
}
