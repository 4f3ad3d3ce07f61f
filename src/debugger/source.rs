//! Routine sources and line alignment.
//!
//! The remote debugger reports line numbers relative to the routine body as it
//! is stored in the catalog (`pg_proc.prosrc`). Users look at the full
//! definition produced by `pg_get_functiondef`, which wraps the body with the
//! `CREATE FUNCTION` header and the `AS $function$` quoting. [`align`] computes
//! the shift between the two.

use crate::debugger::error::Error;
use crate::debugger::Oid;
use indexmap::IndexMap;
use std::ops::RangeInclusive;

/// Compute `offset` so that `offset + relative_line` is the (0-based) line of
/// `definition` that corresponds to `relative_line` of the `partial` body.
///
/// The first non-empty line of `partial` is searched verbatim in `definition`.
/// Return `None` if `partial` has no non-empty line or if that line never
/// appears in `definition`.
pub fn align(definition: &str, partial: &str) -> Option<i64> {
    let (partial_pos, ref_line) = partial
        .split('\n')
        .enumerate()
        .find(|(_, line)| !line.is_empty())
        .map(|(idx, line)| (idx as i64 + 1, line))?;

    let source_pos = definition
        .split('\n')
        .position(|line| line == ref_line)
        .map(|idx| idx as i64 + 1)?;

    Some(source_pos - partial_pos - 1)
}

/// Routine as returned by the catalog, before alignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRoutine {
    pub oid: Oid,
    pub schema: String,
    pub name: String,
    /// Text of `pg_get_function_arguments`.
    pub arguments: String,
    /// Text of `pg_get_functiondef`.
    pub definition: String,
    /// Body as stored by the catalog.
    pub body: String,
    /// `md5` of the definition, changes with every `CREATE OR REPLACE`.
    pub digest: Option<String>,
}

/// A resolved routine with its aligned source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineDescriptor {
    oid: Oid,
    schema: String,
    name: String,
    parameters: IndexMap<String, String>,
    arity: RangeInclusive<usize>,
    definition: String,
    digest: Option<String>,
    source_offset: i64,
}

impl RoutineDescriptor {
    /// Build a descriptor from catalog data, aligning the body with the definition.
    pub fn new(raw: RawRoutine) -> Result<Self, Error> {
        let source_offset =
            align(&raw.definition, &raw.body).ok_or(Error::SourceAlignment(raw.oid))?;
        Ok(Self {
            oid: raw.oid,
            schema: raw.schema,
            name: raw.name,
            parameters: parse_parameters(&raw.arguments),
            arity: parameter_bounds(&raw.arguments),
            definition: raw.definition,
            digest: raw.digest,
            source_offset,
        })
    }

    pub fn oid(&self) -> Oid {
        self.oid
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Routine name qualified with a schema, like `public.calc`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Input parameters in declaration order (name -> declared type).
    pub fn parameters(&self) -> &IndexMap<String, String> {
        &self.parameters
    }

    /// Number of arguments a call may pass, parameters with a default may be omitted.
    pub fn arity(&self) -> &RangeInclusive<usize> {
        &self.arity
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    pub fn source_offset(&self) -> i64 {
        self.source_offset
    }

    pub fn line_count(&self) -> usize {
        self.definition.split('\n').count()
    }

    /// Text of a (0-based) definition line.
    pub fn line(&self, idx: usize) -> Option<&str> {
        self.definition.split('\n').nth(idx)
    }

    /// Map a debugger line (relative to the body) into a 0-based definition line.
    pub fn absolute_line(&self, relative: i32) -> i64 {
        relative as i64 + self.source_offset
    }

    /// Map a 0-based definition line into a debugger line (relative to the body).
    pub fn relative_line(&self, absolute: i64) -> i64 {
        absolute - self.source_offset
    }
}

/// Split on commas that are not nested in parentheses or quotes.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = vec![];
    let mut depth = 0usize;
    let mut in_ident = false;
    let mut in_literal = false;
    let mut start = 0;
    for (idx, ch) in text.char_indices() {
        let quoted = in_ident || in_literal;
        match ch {
            '"' if !in_literal => in_ident = !in_ident,
            '\'' if !in_ident => in_literal = !in_literal,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Input parameter declaration with its mode keyword and default clause removed.
struct InputDeclaration<'a> {
    words: Vec<&'a str>,
    has_default: bool,
    variadic: bool,
}

/// Iterate input parameters of a `pg_get_function_arguments` output.
/// `OUT` and `TABLE` columns are skipped.
fn input_declarations(arguments: &str) -> impl Iterator<Item = InputDeclaration<'_>> {
    const MODES: [&str; 3] = ["IN", "INOUT", "VARIADIC"];

    split_top_level(arguments).into_iter().filter_map(|decl| {
        let decl = decl.trim();
        if decl.is_empty() {
            return None;
        }
        let (decl, has_default) = match decl.find(" DEFAULT ") {
            Some(idx) => (&decl[..idx], true),
            None => (decl, false),
        };

        let mut words: Vec<&str> = decl.split_whitespace().collect();
        let mut variadic = false;
        match words.first() {
            Some(&"OUT") | Some(&"TABLE") => return None,
            Some(mode) if MODES.contains(mode) => {
                variadic = *mode == "VARIADIC";
                words.remove(0);
            }
            _ => {}
        }
        Some(InputDeclaration {
            words,
            has_default,
            variadic,
        })
    })
}

/// Parse `pg_get_function_arguments` output into input parameters.
///
/// `OUT` and `TABLE` columns are skipped, `DEFAULT` clauses are dropped and an
/// unnamed parameter is named after its position (`$1`, `$2`, ...).
pub fn parse_parameters(arguments: &str) -> IndexMap<String, String> {
    let mut parameters = IndexMap::new();
    for (idx, decl) in input_declarations(arguments).enumerate() {
        match decl.words.as_slice() {
            [] => continue,
            [ty] => {
                parameters.insert(format!("${}", idx + 1), ty.to_string());
            }
            [name, ty @ ..] => {
                parameters.insert(name.trim_matches('"').to_string(), ty.join(" "));
            }
        }
    }
    parameters
}

/// Range of argument counts accepted by a routine with these input parameters.
///
/// Parameters with a `DEFAULT` clause may be omitted. A `VARIADIC` parameter
/// accepts any number of trailing arguments.
pub fn parameter_bounds(arguments: &str) -> RangeInclusive<usize> {
    let mut required = 0;
    let mut total = 0;
    let mut variadic = false;
    for decl in input_declarations(arguments) {
        total += 1;
        if !decl.has_default && !decl.variadic {
            required += 1;
        }
        variadic |= decl.variadic;
    }
    if variadic {
        return required..=usize::MAX;
    }
    required..=total
}
