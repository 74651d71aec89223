//! Logic-less text templates for regex sources and comment bodies.
//!
//! Templates reference fields of a typed [`TemplateData`] with `{{field}}`
//! placeholders, optionally piped through a transform: `{{title | upper}}`.
//! There are no conditionals or loops. Rendering is pure: the same template
//! and data always produce the same output.
//!
//! The same engine serves two purposes. A pattern's regex template is rendered
//! with PR fields only (job fields are not yet available), and the result is
//! handed to the regex compiler. Comment templates are rendered after the
//! watch, with job and outcome fields filled in on success.

use std::borrow::Cow;
use std::time::Duration;

use thiserror::Error;

use crate::types::{Job, PrNumber};

/// Errors from template parsing or rendering.
///
/// A template error aborts the task it belongs to and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A `{{` without a matching `}}`.
    #[error("unclosed placeholder starting at byte {at}")]
    Unclosed { at: usize },

    /// A `{{}}` or `{{ | upper}}` placeholder with no field name.
    #[error("empty placeholder at byte {at}")]
    EmptyPlaceholder { at: usize },

    /// A transform other than `upper` or `lower`.
    #[error("unknown transform {name:?}")]
    UnknownTransform { name: String },

    /// A field name [`TemplateData`] does not define.
    #[error("unknown field {name:?}")]
    UnknownField { name: String },

    /// A defined field that has no value in this render context
    /// (e.g. `job_name` while rendering a regex template).
    #[error("field {name:?} is not available in this context")]
    FieldNotAvailable { name: String },
}

/// Text transform applied to a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transform {
    Upper,
    Lower,
}

impl Transform {
    fn parse(name: &str) -> Result<Self, TemplateError> {
        match name {
            "upper" => Ok(Transform::Upper),
            "lower" => Ok(Transform::Lower),
            other => Err(TemplateError::UnknownTransform {
                name: other.to_string(),
            }),
        }
    }

    fn apply(self, value: &str) -> String {
        match self {
            Transform::Upper => value.to_uppercase(),
            Transform::Lower => value.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field {
        name: String,
        transform: Option<Transform>,
    },
}

/// A parsed template, ready to render against [`TemplateData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// Parses template source into segments.
    ///
    /// Placeholder syntax is validated here; field names are only checked
    /// against the data at render time.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open
                .find("}}")
                .ok_or(TemplateError::Unclosed { at: offset + open })?;

            let inner = &after_open[..close];
            let (name, transform) = match inner.split_once('|') {
                Some((field, transform)) => {
                    (field.trim(), Some(Transform::parse(transform.trim())?))
                }
                None => (inner.trim(), None),
            };
            if name.is_empty() {
                return Err(TemplateError::EmptyPlaceholder { at: offset + open });
            }

            segments.push(Segment::Field {
                name: name.to_string(),
                transform,
            });

            offset += open + 2 + close + 2;
            rest = &after_open[close + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Template { segments })
    }

    /// Renders the template against the given data.
    pub fn render(&self, data: &TemplateData) -> Result<String, TemplateError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field { name, transform } => {
                    let value = data.field(name)?;
                    match transform {
                        Some(t) => out.push_str(&t.apply(&value)),
                        None => out.push_str(&value),
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Parses and renders in one step.
pub fn render(source: &str, data: &TemplateData) -> Result<String, TemplateError> {
    Template::parse(source)?.render(data)
}

/// The fixed set of fields a template may reference.
///
/// Built fresh for each render and never retained. Job and outcome fields
/// are `None` until the watch has run; referencing them earlier is a
/// [`TemplateError::FieldNotAvailable`].
#[derive(Debug, Clone)]
pub struct TemplateData {
    pub repo: String,
    pub pattern: String,
    pub number: PrNumber,
    pub title: String,
    pub url: String,
    pub source_branch: String,
    pub target_branch: String,
    pub sender: String,
    /// The resolved wait timeout, rendered as humantime text.
    pub timeout: Duration,
    pub job_name: Option<String>,
    pub job_url: Option<String>,
    pub elapsed: Option<Duration>,
    pub attempts: Option<u32>,
}

impl TemplateData {
    /// Fills in the job fields after a successful watch.
    pub fn with_job(mut self, job: &Job) -> Self {
        self.job_name = Some(job.name.clone());
        self.job_url = Some(job.url.clone());
        self
    }

    /// Fills in the outcome counters after the watch has finished.
    pub fn with_outcome(mut self, elapsed: Duration, attempts: u32) -> Self {
        self.elapsed = Some(elapsed);
        self.attempts = Some(attempts);
        self
    }

    /// The accessor table mapping placeholder names to field values.
    fn field(&self, name: &str) -> Result<Cow<'_, str>, TemplateError> {
        let required = |value: &Option<String>| {
            value
                .as_deref()
                .map(|v| Cow::Owned(v.to_string()))
                .ok_or_else(|| TemplateError::FieldNotAvailable {
                    name: name.to_string(),
                })
        };

        match name {
            "repo" => Ok(Cow::Borrowed(self.repo.as_str())),
            "pattern" => Ok(Cow::Borrowed(self.pattern.as_str())),
            "number" => Ok(Cow::Owned(self.number.0.to_string())),
            "title" => Ok(Cow::Borrowed(self.title.as_str())),
            "url" => Ok(Cow::Borrowed(self.url.as_str())),
            "source_branch" => Ok(Cow::Borrowed(self.source_branch.as_str())),
            "target_branch" => Ok(Cow::Borrowed(self.target_branch.as_str())),
            "sender" => Ok(Cow::Borrowed(self.sender.as_str())),
            "timeout" => Ok(Cow::Owned(format_duration(self.timeout))),
            "job_name" => required(&self.job_name),
            "job_url" => required(&self.job_url),
            "elapsed" => self
                .elapsed
                .map(|d| Cow::Owned(format_duration(d)))
                .ok_or_else(|| TemplateError::FieldNotAvailable {
                    name: name.to_string(),
                }),
            "attempts" => self
                .attempts
                .map(|n| Cow::Owned(n.to_string()))
                .ok_or_else(|| TemplateError::FieldNotAvailable {
                    name: name.to_string(),
                }),
            other => Err(TemplateError::UnknownField {
                name: other.to_string(),
            }),
        }
    }
}

/// Formats a duration as humantime text. Durations of a second or more are
/// rounded to whole seconds so comments read `1m 40s` rather than
/// `1m 40s 7ms 250us`; sub-second durations keep their precision.
fn format_duration(d: Duration) -> String {
    let rounded = if d.as_secs() >= 1 {
        Duration::from_secs(d.as_secs())
    } else {
        d
    };
    humantime::format_duration(rounded).to_string()
}
