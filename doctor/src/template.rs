//! Message template rendering.
//!
//! Templates use `{field}` placeholders naming columns of the rule's result
//! row, with `{{` and `}}` as literal braces. Placeholders are resolved
//! against each row as it is rendered, so a template that names a column the
//! query does not return only fails once a row reaches it.

use crate::types::Row;

/// Text substituted for SQL `NULL` values.
const NULL_TEXT: &str = "NULL";

/// Errors raised while rendering a template against a row.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    /// A placeholder names a column the row does not have.
    #[error("placeholder '{{{field}}}' does not match any column returned by the query")]
    MissingField { field: String },

    /// A `{` or `}` without its partner.
    #[error("unmatched '{brace}' at offset {offset}")]
    UnmatchedBrace { brace: char, offset: usize },

    /// `{}` with no field name.
    #[error("empty placeholder at offset {offset}")]
    EmptyPlaceholder { offset: usize },
}

/// Render `template` with the values of `row`.
///
/// Field names are matched exactly and case-sensitively.
///
/// # Errors
///
/// Returns a [`TemplateError`] on a missing column or malformed braces.
pub fn render(template: &str, row: &Row) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        match ch {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    out.push('{');
                    continue;
                }

                let mut end = None;
                for (idx, c) in chars.by_ref() {
                    match c {
                        '}' => {
                            end = Some(idx);
                            break;
                        }
                        '{' => return Err(TemplateError::UnmatchedBrace { brace: '{', offset }),
                        _ => {}
                    }
                }
                let end = end.ok_or(TemplateError::UnmatchedBrace { brace: '{', offset })?;

                let field = &template[offset + 1..end];
                if field.is_empty() {
                    return Err(TemplateError::EmptyPlaceholder { offset });
                }
                match row.get(field) {
                    Some(Some(value)) => out.push_str(value),
                    Some(None) => out.push_str(NULL_TEXT),
                    None => {
                        return Err(TemplateError::MissingField {
                            field: field.to_owned(),
                        })
                    }
                }
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(TemplateError::UnmatchedBrace { brace: '}', offset });
                }
            }
            _ => out.push(ch),
        }
    }

    Ok(out)
}
