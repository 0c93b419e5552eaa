//! Aggregation pipelines
//!
//! Read pipelines support `$match`, `$project`, `$addFields` (alias `$set`),
//! `$unset`, `$sort`, `$skip`, `$limit` and `$count`. Update pipelines are
//! restricted to the per-document stages: `$addFields`/`$set`, `$project`
//! and `$unset`.
//!
//! Within one `$addFields` stage every expression sees the document as it
//! was before the stage.

use crate::compare::sort_order;
use crate::expr::evaluate;
use crate::fields::{get_field, parse_path, set_field, unset_field};
use crate::filter::matches;
use foldline_core::{Document, Error, Result, ID_FIELD};
use serde_json::Value;

const READ_STAGES: &[&str] = &[
    "$match", "$project", "$addFields", "$set", "$unset", "$sort", "$skip", "$limit", "$count",
];

const UPDATE_STAGES: &[&str] = &["$addFields", "$set", "$project", "$unset"];

/// Run a read pipeline over a collection's documents
///
/// Stage names are checked before anything runs, so an invalid pipeline
/// fails the same way on an empty collection as on a full one.
///
/// # Errors
///
/// Returns `InvalidQuery` for unknown stages or malformed stage bodies.
pub fn aggregate(mut docs: Vec<Document>, pipeline: &[Document]) -> Result<Vec<Document>> {
    check_stages(pipeline, READ_STAGES)?;
    for stage in pipeline {
        let (name, body) = stage_parts(stage)?;
        docs = match name {
            "$match" => {
                let filter = object(name, body)?;
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$sort" => sort(docs, object(name, body)?)?,
            "$skip" => {
                let n = count_arg(name, body)?;
                docs.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = count_arg(name, body)?;
                docs.into_iter().take(n).collect()
            }
            "$count" => {
                let field = body
                    .as_str()
                    .filter(|f| !f.is_empty() && !f.starts_with('$') && !f.contains('.'))
                    .ok_or_else(|| Error::invalid_query("$count expects a plain field name"))?;
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut out = Document::new();
                    out.insert(field.to_string(), Value::from(docs.len() as u64));
                    vec![out]
                }
            }
            _ => docs
                .iter()
                .map(|doc| apply_document_stage(doc, name, body))
                .collect::<Result<Vec<_>>>()?,
        };
    }
    Ok(docs)
}

/// Run an update pipeline against one document, returning the new document
///
/// # Errors
///
/// Returns `InvalidQuery` for stages that are not allowed in updates.
pub fn update_with_pipeline(doc: &Document, pipeline: &[Document]) -> Result<Document> {
    check_stages(pipeline, UPDATE_STAGES)?;
    let mut current = doc.clone();
    for stage in pipeline {
        let (name, body) = stage_parts(stage)?;
        current = apply_document_stage(&current, name, body)?;
    }
    Ok(current)
}

fn apply_document_stage(doc: &Document, name: &str, body: &Value) -> Result<Document> {
    match name {
        "$addFields" | "$set" => add_fields(doc, object(name, body)?),
        "$project" => project(doc, object(name, body)?),
        "$unset" => unset(doc, body),
        other => Err(Error::invalid_query(format!("unsupported stage {}", other))),
    }
}

fn check_stages(pipeline: &[Document], allowed: &[&str]) -> Result<()> {
    for stage in pipeline {
        let (name, _) = stage_parts(stage)?;
        if !allowed.contains(&name) {
            return Err(Error::invalid_query(format!("unsupported stage {}", name)));
        }
    }
    Ok(())
}

fn stage_parts(stage: &Document) -> Result<(&str, &Value)> {
    let mut entries = stage.iter();
    match (entries.next(), entries.next()) {
        (Some((name, body)), None) => Ok((name.as_str(), body)),
        _ => Err(Error::invalid_query("a pipeline stage must have exactly one field")),
    }
}

fn object<'a>(name: &str, body: &'a Value) -> Result<&'a Document> {
    body.as_object()
        .ok_or_else(|| Error::invalid_query(format!("{} expects an object", name)))
}

fn count_arg(name: &str, body: &Value) -> Result<usize> {
    body.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| Error::invalid_query(format!("{} expects a non-negative integer", name)))
}

fn add_fields(doc: &Document, spec: &Document) -> Result<Document> {
    let mut out = doc.clone();
    for (field, expr) in spec {
        let path = parse_path(field)?;
        match evaluate(expr, doc)? {
            Some(value) => set_field(&mut out, &path, value)?,
            None => {
                unset_field(&mut out, &path);
            }
        }
    }
    Ok(out)
}

fn unset(doc: &Document, body: &Value) -> Result<Document> {
    let fields: Vec<&str> = match body {
        Value::String(field) => vec![field.as_str()],
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .ok_or_else(|| Error::invalid_query("$unset expects field names"))
            })
            .collect::<Result<_>>()?,
        _ => return Err(Error::invalid_query("$unset expects a string or an array of strings")),
    };
    let mut out = doc.clone();
    for field in fields {
        unset_field(&mut out, &parse_path(field)?);
    }
    Ok(out)
}

enum Projection<'a> {
    Include,
    Exclude,
    Computed(&'a Value),
}

fn classify(value: &Value) -> Projection<'_> {
    match value {
        Value::Bool(true) => Projection::Include,
        Value::Bool(false) => Projection::Exclude,
        Value::Number(n) if n.as_f64() == Some(0.0) => Projection::Exclude,
        Value::Number(_) => Projection::Include,
        other => Projection::Computed(other),
    }
}

fn project(doc: &Document, spec: &Document) -> Result<Document> {
    let mut include_id = true;
    let mut inclusion = false;
    let mut exclusion = false;
    for (field, value) in spec {
        match (field.as_str(), classify(value)) {
            (ID_FIELD, Projection::Exclude) => include_id = false,
            (ID_FIELD, Projection::Include) => {}
            (_, Projection::Exclude) => exclusion = true,
            _ => inclusion = true,
        }
    }
    if inclusion && exclusion {
        return Err(Error::invalid_query(
            "$project cannot mix inclusion and exclusion",
        ));
    }

    if !inclusion {
        let mut out = doc.clone();
        for (field, value) in spec {
            if matches!(classify(value), Projection::Exclude) {
                unset_field(&mut out, &parse_path(field)?);
            }
        }
        return Ok(out);
    }

    let mut out = Document::new();
    if include_id {
        if let Some(id) = doc.get(ID_FIELD) {
            out.insert(ID_FIELD.to_string(), id.clone());
        }
    }
    for (field, value) in spec {
        if field == ID_FIELD && !matches!(classify(value), Projection::Computed(_)) {
            continue;
        }
        let path = parse_path(field)?;
        let projected = match classify(value) {
            Projection::Include => get_field(doc, &path).cloned(),
            Projection::Computed(expr) => evaluate(expr, doc)?,
            Projection::Exclude => None,
        };
        if let Some(value) = projected {
            set_field(&mut out, &path, value)?;
        }
    }
    Ok(out)
}

fn sort(mut docs: Vec<Document>, spec: &Document) -> Result<Vec<Document>> {
    if spec.is_empty() {
        return Err(Error::invalid_query("$sort needs at least one key"));
    }
    let keys = spec
        .iter()
        .map(|(field, direction)| {
            let descending = match direction.as_i64() {
                Some(1) => false,
                Some(-1) => true,
                _ => return Err(Error::invalid_query("$sort direction must be 1 or -1")),
            };
            Ok((parse_path(field)?, descending))
        })
        .collect::<Result<Vec<_>>>()?;

    docs.sort_by(|a, b| {
        keys.iter()
            .map(|(path, descending)| {
                let ordering = sort_order(get_field(a, path), get_field(b, path));
                if *descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            })
            .find(|o| o.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(docs)
}
