// src/core/routing/matcher.rs

//! Compiled route matchers.
//!
//! Match specs arrive as data in RouteConfiguration updates and are compiled
//! once per config-selector generation. Compilation is the fallible step
//! (regex syntax, degenerate ranges); evaluation is infallible and runs on the
//! per-RPC pick path.

use crate::core::channel::RpcInfo;
use crate::core::errors::ResolverError;
use crate::core::xds::resources::{
    FractionSpec, HeaderMatchKind, HeaderMatchSpec, PathMatchSpec, RouteMatchSpec,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use regex::Regex;

/// A fully compiled route match predicate.
#[derive(Debug)]
pub struct CompiledRouteMatcher {
    path: CompiledPathMatcher,
    headers: Vec<CompiledHeaderMatcher>,
    fraction: Option<FractionSpec>,
}

#[derive(Debug)]
enum CompiledPathMatcher {
    Exact { path: String, case_insensitive: bool },
    Prefix { prefix: String, case_insensitive: bool },
    Regex(Regex),
}

#[derive(Debug)]
struct CompiledHeaderMatcher {
    name: String,
    invert: bool,
    kind: CompiledHeaderMatchKind,
}

#[derive(Debug)]
enum CompiledHeaderMatchKind {
    Exact(String),
    Regex(Regex),
    Range { start: i64, end: i64 },
    Present(bool),
    Prefix(String),
    Suffix(String),
}

/// Compiles `pattern` anchored to the full input, the way safe-regex matchers
/// are specified to behave.
fn compile_full_match(pattern: &str, what: &str) -> Result<Regex, ResolverError> {
    Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| ResolverError::InvalidRoute(format!("invalid {what} regex '{pattern}': {e}")))
}

impl CompiledRouteMatcher {
    pub fn compile(spec: &RouteMatchSpec) -> Result<Self, ResolverError> {
        let path = match &spec.path {
            PathMatchSpec::Exact {
                path,
                case_insensitive,
            } => CompiledPathMatcher::Exact {
                path: path.clone(),
                case_insensitive: *case_insensitive,
            },
            PathMatchSpec::Prefix {
                prefix,
                case_insensitive,
            } => CompiledPathMatcher::Prefix {
                prefix: prefix.clone(),
                case_insensitive: *case_insensitive,
            },
            PathMatchSpec::SafeRegex(pattern) => {
                CompiledPathMatcher::Regex(compile_full_match(pattern, "path match")?)
            }
        };

        let mut headers = Vec::with_capacity(spec.headers.len());
        for header in &spec.headers {
            headers.push(CompiledHeaderMatcher::compile(header)?);
        }

        if let Some(fraction) = &spec.fraction {
            if fraction.denominator == 0 {
                return Err(ResolverError::InvalidRoute(
                    "runtime fraction has a zero denominator".to_string(),
                ));
            }
        }

        Ok(Self {
            path,
            headers,
            fraction: spec.fraction,
        })
    }

    /// Evaluates the predicate against an RPC. The fraction component, when
    /// present, is evaluated last with a fresh random draw.
    pub fn matches(&self, rpc: &RpcInfo) -> bool {
        if !self.path.matches(&rpc.method) {
            return false;
        }
        if !self.headers.iter().all(|h| h.matches(rpc)) {
            return false;
        }
        match self.fraction {
            None => true,
            Some(FractionSpec {
                numerator,
                denominator,
            }) => {
                let mut rng = SmallRng::from_entropy();
                rng.gen_range(0..denominator) < numerator
            }
        }
    }
}

impl CompiledPathMatcher {
    fn matches(&self, method: &str) -> bool {
        match self {
            Self::Exact {
                path,
                case_insensitive,
            } => {
                if *case_insensitive {
                    method.eq_ignore_ascii_case(path)
                } else {
                    method == path
                }
            }
            Self::Prefix {
                prefix,
                case_insensitive,
            } => {
                if *case_insensitive {
                    method
                        .get(..prefix.len())
                        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
                } else {
                    method.starts_with(prefix)
                }
            }
            Self::Regex(re) => re.is_match(method),
        }
    }
}

impl CompiledHeaderMatcher {
    fn compile(spec: &HeaderMatchSpec) -> Result<Self, ResolverError> {
        let kind = match &spec.kind {
            HeaderMatchKind::Exact(value) => CompiledHeaderMatchKind::Exact(value.clone()),
            HeaderMatchKind::SafeRegex(pattern) => {
                CompiledHeaderMatchKind::Regex(compile_full_match(pattern, "header match")?)
            }
            HeaderMatchKind::Range { start, end } => {
                if start > end {
                    return Err(ResolverError::InvalidRoute(format!(
                        "header range match on '{}' has start {start} > end {end}",
                        spec.name
                    )));
                }
                CompiledHeaderMatchKind::Range {
                    start: *start,
                    end: *end,
                }
            }
            HeaderMatchKind::Present(present) => CompiledHeaderMatchKind::Present(*present),
            HeaderMatchKind::Prefix(prefix) => CompiledHeaderMatchKind::Prefix(prefix.clone()),
            HeaderMatchKind::Suffix(suffix) => CompiledHeaderMatchKind::Suffix(suffix.clone()),
        };
        Ok(Self {
            name: spec.name.clone(),
            invert: spec.invert,
            kind,
        })
    }

    fn matches(&self, rpc: &RpcInfo) -> bool {
        let value = rpc.header_value(&self.name);
        let matched = match (&self.kind, value) {
            (CompiledHeaderMatchKind::Present(want), value) => value.is_some() == *want,
            (_, None) => false,
            (CompiledHeaderMatchKind::Exact(expected), Some(v)) => v == *expected,
            (CompiledHeaderMatchKind::Regex(re), Some(v)) => re.is_match(&v),
            (CompiledHeaderMatchKind::Range { start, end }, Some(v)) => v
                .trim()
                .parse::<i64>()
                .is_ok_and(|n| n >= *start && n < *end),
            (CompiledHeaderMatchKind::Prefix(prefix), Some(v)) => v.starts_with(prefix),
            (CompiledHeaderMatchKind::Suffix(suffix), Some(v)) => v.ends_with(suffix),
        };
        matched != self.invert
    }
}
