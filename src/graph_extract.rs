//! LLM-backed property-graph triple extraction (part of C4's graph writer),
//! generalized from `original_source/flexible-graphrag/config.py`'s
//! `SchemaLLMPathExtractor`/`SimpleLLMPathExtractor` selection into an
//! explicit prompt + JSON-parse step over [`crate::llm_chat::complete`]
//! (SPEC_FULL §4.4 "Graph writer").

use serde::Deserialize;

use crate::config::{LlmConfig, NamedSchema};
use crate::errors::{EngineError, Result};
use crate::models::Triple;

#[derive(Deserialize)]
struct RawTriple {
    subject: String,
    #[serde(default)]
    subject_label: Option<String>,
    relation: String,
    object: String,
    #[serde(default)]
    object_label: Option<String>,
}

/// Extract up to `max_triplets` triples from `chunk_text`. When `schema` is
/// `Some`, the prompt constrains the model to the schema's entity/relation
/// vocabulary and validation list; off-schema triples are dropped afterward
/// iff `schema.strict`. When `schema` is `None`, extraction is schema-free.
pub async fn extract_triples(
    chunk_id: &str,
    chunk_text: &str,
    schema: Option<&NamedSchema>,
    max_triplets: usize,
    llm: &LlmConfig,
) -> Result<Vec<Triple>> {
    let prompt = build_prompt(chunk_text, schema, max_triplets);
    let response = crate::llm_chat::complete(llm, &prompt).await?;
    let raw = parse_triples(&response)?;
    Ok(apply_schema_filter(raw, schema, chunk_id))
}

fn build_prompt(chunk_text: &str, schema: Option<&NamedSchema>, max_triplets: usize) -> String {
    let schema_block = match schema {
        Some(s) => format!(
            "Only use these entity labels: {:?}\nOnly use these relation labels: {:?}\n\
             Prefer these (subject_label, relation, object_label) combinations where applicable: {:?}\n",
            s.entities, s.relations, s.relationships
        ),
        None => String::new(),
    };

    format!(
        "Extract up to {max_triplets} (subject, relation, object) knowledge-graph triples from the \
         text below. {schema_block}Respond with a JSON array only, each element shaped as \
         {{\"subject\": str, \"subject_label\": str|null, \"relation\": str, \"object\": str, \"object_label\": str|null}}.\n\n\
         Text:\n{chunk_text}"
    )
}

fn parse_triples(response: &str) -> Result<Vec<RawTriple>> {
    let json_text = extract_json_array(response);
    serde_json::from_str(&json_text)
        .map_err(|e| EngineError::ModelIO(format!("could not parse triple extraction response: {e}")))
}

/// Models occasionally wrap JSON in prose or code fences; take the first
/// `[...]` span found.
fn extract_json_array(text: &str) -> String {
    let start = text.find('[');
    let end = text.rfind(']');
    match (start, end) {
        (Some(s), Some(e)) if e > s => text[s..=e].to_string(),
        _ => "[]".to_string(),
    }
}

fn apply_schema_filter(raw: Vec<RawTriple>, schema: Option<&NamedSchema>, chunk_id: &str) -> Vec<Triple> {
    raw.into_iter()
        .filter(|t| {
            let Some(schema) = schema else { return true };
            if !schema.strict {
                return true;
            }
            let entity_ok = |label: &Option<String>| match label {
                Some(l) => schema.entities.iter().any(|e| e == l),
                None => false,
            };
            entity_ok(&t.subject_label) && entity_ok(&t.object_label) && schema.relations.iter().any(|r| r == &t.relation)
        })
        .map(|t| Triple {
            subject: t.subject,
            subject_label: t.subject_label,
            relation: t.relation,
            object: t.object,
            object_label: t.object_label,
            chunk_id: chunk_id.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(strict: bool) -> NamedSchema {
        NamedSchema {
            name: "demo".to_string(),
            entities: vec!["Person".to_string(), "Place".to_string()],
            relations: vec!["RULES".to_string()],
            relationships: vec![("Person".to_string(), "RULES".to_string(), "Place".to_string())],
            strict,
        }
    }

    fn raw(subject_label: Option<&str>, relation: &str, object_label: Option<&str>) -> RawTriple {
        RawTriple {
            subject: "Paul".to_string(),
            subject_label: subject_label.map(|s| s.to_string()),
            relation: relation.to_string(),
            object: "Arrakis".to_string(),
            object_label: object_label.map(|s| s.to_string()),
        }
    }

    #[test]
    fn extracts_a_json_array_embedded_in_prose() {
        let text = "Here are the triples:\n[{\"a\":1}]\nThanks.";
        assert_eq!(extract_json_array(text), "[{\"a\":1}]");
    }

    #[test]
    fn missing_array_falls_back_to_empty() {
        assert_eq!(extract_json_array("no json here"), "[]");
    }

    #[test]
    fn schema_free_keeps_every_triple() {
        let triples = apply_schema_filter(vec![raw(None, "ANYTHING", None)], None, "c1");
        assert_eq!(triples.len(), 1);
    }

    #[test]
    fn strict_schema_drops_off_schema_triples() {
        let s = schema(true);
        let triples = apply_schema_filter(vec![raw(Some("Person"), "HATES", Some("Place"))], Some(&s), "c1");
        assert!(triples.is_empty());
    }

    #[test]
    fn strict_schema_keeps_on_schema_triples() {
        let s = schema(true);
        let triples = apply_schema_filter(vec![raw(Some("Person"), "RULES", Some("Place"))], Some(&s), "c1");
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].chunk_id, "c1");
    }

    #[test]
    fn non_strict_schema_keeps_off_schema_triples() {
        let s = schema(false);
        let triples = apply_schema_filter(vec![raw(None, "HATES", None)], Some(&s), "c1");
        assert_eq!(triples.len(), 1);
    }

    #[test]
    fn prompt_includes_schema_vocabulary_when_provided() {
        let s = schema(true);
        let prompt = build_prompt("some text", Some(&s), 10);
        assert!(prompt.contains("Person"));
        assert!(prompt.contains("RULES"));
    }
}
