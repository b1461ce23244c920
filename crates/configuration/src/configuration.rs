//! Configuration for the query compiler.

use query_engine_metadata::metadata::{self, RelationKind};
use schemars::schema::RootSchema;

use crate::error::MakeRuntimeConfigurationError;
use crate::version1::{CompilerSettings, ParsedConfiguration};

/// Aliases need room for a hash suffix and a readable prefix.
pub const MIN_IDENTIFIER_LENGTH: usize = 16;

/// The 'Configuration' type collects all the information necessary to compile queries at runtime.
///
/// Values of this type are produced from a 'ParsedConfiguration' using
/// 'make_runtime_configuration', which checks the metadata for references the
/// compiler would otherwise trip over halfway through a query.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub metadata: metadata::Metadata,
    pub settings: CompilerSettings,
}

/// Generate the JSON schema of the latest configuration format.
pub fn generate_latest_schema() -> RootSchema {
    schemars::schema_for!(ParsedConfiguration)
}

/// Validate a parsed configuration and turn it into a runtime one.
pub fn make_runtime_configuration(
    parsed_config: ParsedConfiguration,
) -> Result<Configuration, MakeRuntimeConfigurationError> {
    let max_identifier_length = parsed_config.compiler.max_identifier_length;
    if max_identifier_length < MIN_IDENTIFIER_LENGTH {
        return Err(MakeRuntimeConfigurationError::IdentifierLengthTooSmall {
            minimum: MIN_IDENTIFIER_LENGTH,
            actual: max_identifier_length,
        });
    }

    let metadata = parsed_config.metadata;
    for (entity_name, entity) in &metadata.entities.0 {
        if entity.identity().is_none() {
            return Err(MakeRuntimeConfigurationError::MissingIdentity(
                entity_name.clone(),
            ));
        }
        for (relation_name, relation) in &entity.relations {
            let invalid = |reason: &str| MakeRuntimeConfigurationError::InvalidRelation {
                entity: entity_name.clone(),
                relation: relation_name.clone(),
                reason: reason.to_string(),
            };

            let Some(target) = metadata.get_entity(&relation.target) else {
                return Err(MakeRuntimeConfigurationError::UnknownRelationTarget {
                    entity: entity_name.clone(),
                    relation: relation_name.clone(),
                    target: relation.target.clone(),
                });
            };

            match &relation.mapped_by {
                Some(mapped_by) => match target.relation(mapped_by) {
                    None => return Err(invalid("mappedBy names no relation on the target")),
                    Some(owning) if !owning.is_owning() => {
                        return Err(invalid("mappedBy names another inverse relation"))
                    }
                    Some(_) => {}
                },
                None => match relation.kind {
                    RelationKind::ManyToOne | RelationKind::OneToOne
                        if relation.join_column.is_none() =>
                    {
                        return Err(invalid("an owning to-one relation needs a joinColumn"))
                    }
                    RelationKind::ManyToMany if relation.join_table.is_none() => {
                        return Err(invalid("an owning many-to-many relation needs a joinTable"))
                    }
                    RelationKind::OneToMany => {
                        return Err(invalid("a one-to-many relation needs mappedBy"))
                    }
                    _ => {}
                },
            }
        }
    }

    tracing::info!(
        entities = metadata.entities.0.len(),
        max_identifier_length,
        "configuration ready"
    );

    Ok(Configuration {
        metadata,
        settings: parsed_config.compiler,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::version1::parse_configuration;

    fn static_configuration_dir() -> PathBuf {
        let mut d = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        d.push("../../static/contacts");
        d
    }

    #[tokio::test]
    async fn static_configuration_is_valid() {
        let parsed = parse_configuration(static_configuration_dir()).await.unwrap();
        let configuration = make_runtime_configuration(parsed).unwrap();
        assert!(configuration.metadata.get_entity("Contact").is_some());
    }

    #[tokio::test]
    async fn static_configuration_conforms_to_the_schema() {
        let schema = serde_json::to_value(generate_latest_schema()).unwrap();
        let compiled = jsonschema::JSONSchema::compile(&schema).unwrap();

        let contents =
            std::fs::read_to_string(static_configuration_dir().join("configuration.json"))
                .unwrap();
        let instance: serde_json::Value = serde_json::from_str(&contents).unwrap();

        assert!(compiled.is_valid(&instance));
    }

    #[test]
    fn short_identifier_limits_are_rejected() {
        let mut parsed = ParsedConfiguration::empty();
        parsed.compiler.max_identifier_length = 8;
        assert_eq!(
            make_runtime_configuration(parsed).unwrap_err(),
            MakeRuntimeConfigurationError::IdentifierLengthTooSmall {
                minimum: MIN_IDENTIFIER_LENGTH,
                actual: 8
            }
        );
    }

    #[test]
    fn dangling_relations_are_rejected() {
        let parsed: ParsedConfiguration = serde_json::from_value(serde_json::json!({
            "version": 1,
            "metadata": { "entities": { "Contact": {
                "tableName": "contact",
                "columns": { "id": { "name": "id", "type": "bigint", "primaryKey": true } },
                "relations": {
                    "company": { "kind": "manyToOne", "target": "Company", "joinColumn": "company_id" }
                }
            } } }
        }))
        .unwrap();

        assert!(matches!(
            make_runtime_configuration(parsed),
            Err(MakeRuntimeConfigurationError::UnknownRelationTarget { .. })
        ));
    }
}
