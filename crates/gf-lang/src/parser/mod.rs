mod area_parser;
mod options;
mod output;
mod script_pred;

pub use options::Options;
pub use output::Output;

use crate::area::{AreaExpression, Primitive};
use crate::detect::DetectSet;
use crate::error::{LangReason, LangResult};
use crate::predicate::PredicateSet;
use crate::tokens::Cursor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Scan,
    Search,
    Nearby,
    Within,
    Intersects,
}

impl Command {
    pub fn is_spatial(self) -> bool {
        matches!(self, Command::Nearby | Command::Within | Command::Intersects)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// The fully parsed, executor-ready form of a query command's tail.
#[derive(Debug)]
pub struct SearchTokens {
    pub command: Command,
    pub key: String,
    pub cursor: u64,
    pub limit: Option<u64>,
    pub sparse: Option<u8>,
    pub match_globs: Vec<String>,
    pub predicates: PredicateSet,
    pub no_fields: bool,
    pub fence: bool,
    pub detect: DetectSet,
    pub commands: Option<Vec<String>>,
    pub distance: bool,
    pub nodwell: bool,
    pub order: Order,
    pub clip: bool,
    pub buffer: Option<f64>,
    pub output: Output,
    /// `WITHIN`/`INTERSECTS` only.
    pub area: Option<AreaExpression>,
    /// `NEARBY` only: `(lat, lon, radius_meters)`, radius 0 means unbounded.
    pub point: Option<(f64, f64, f64)>,
}

/// Parses `[options...] [output] [area...]` following `command key` (the
/// command keyword and key are supplied by the caller, matching the
/// dispatcher's own tokenization of the command name).
pub fn parse_command(command: Command, key: &str, tail: &[String]) -> LangResult<SearchTokens> {
    let mut cursor = Cursor::new(tail);

    let opts = Options::parse(&mut cursor)?;

    if opts.fence && !command.is_spatial() {
        return Err(LangReason::Conflict("FENCE is only valid on NEARBY/WITHIN/INTERSECTS".into()).into());
    }
    let default_order = Order::Asc;
    if opts.order.is_some() && command.is_spatial() {
        return Err(LangReason::Conflict("ASC/DESC is not valid on spatial commands".into()).into());
    }

    let output = output::parse_output(&mut cursor, command)?;

    let (area, point) = match command {
        Command::Nearby => {
            let prim = area_parser::parse_primitive(&mut cursor)?;
            let (lat, lon) = prim
                .center()
                .ok_or_else(|| LangReason::ArgInvalid("NEARBY requires POINT".into()))?;
            let radius = prim.radius_m().unwrap_or(0.0);
            if !matches!(prim, Primitive::Point { .. }) {
                return Err(LangReason::ArgInvalid("NEARBY requires a POINT primitive".into()).into());
            }
            (None, Some((lat, lon, radius)))
        }
        Command::Within | Command::Intersects => {
            let expr = area_parser::parse_area_expr(&mut cursor)?;
            if opts.clip {
                validate_clip(&expr, command)?;
            }
            (Some(expr), None)
        }
        Command::Scan | Command::Search => (None, None),
    };

    if !cursor.is_empty() {
        return Err(LangReason::ArgInvalid(format!(
            "unexpected trailing tokens: {:?}",
            cursor.rest()
        ))
        .into());
    }

    Ok(SearchTokens {
        command,
        key: key.to_string(),
        cursor: opts.cursor,
        limit: opts.limit,
        sparse: opts.sparse,
        match_globs: opts.match_globs,
        predicates: opts.predicates,
        no_fields: opts.no_fields,
        fence: opts.fence,
        detect: opts.detect.unwrap_or_default(),
        commands: opts.commands,
        distance: opts.distance,
        nodwell: opts.nodwell,
        order: opts.order.unwrap_or(default_order),
        clip: opts.clip,
        buffer: opts.buffer,
        output,
        area,
        point,
    })
}

fn validate_clip(expr: &AreaExpression, command: Command) -> LangResult<()> {
    if command != Command::Intersects {
        return Err(LangReason::Conflict("CLIP is only valid on INTERSECTS".into()).into());
    }
    check_leaves_support_clip(expr)
}

fn check_leaves_support_clip(expr: &AreaExpression) -> LangResult<()> {
    match expr {
        AreaExpression::Leaf(p) => {
            if !p.supports_clip() {
                return Err(LangReason::Conflict(
                    "CLIP is not supported for this area primitive".into(),
                )
                .into());
            }
            Ok(())
        }
        AreaExpression::Not(inner) => check_leaves_support_clip(inner),
        AreaExpression::And(parts) | AreaExpression::Or(parts) => {
            parts.iter().try_for_each(check_leaves_support_clip)
        }
    }
}
