use std::time::{Duration, SystemTime};

use gf_core::{Object, RespValue, ScanWriter};
use gf_core::HookDef;
use gf_lang::{parse_command, Command, FieldList, Geometry, Value};

use crate::error::{RuntimeReason, RuntimeResult};
use crate::state::GfServer;

/// Connection-level response encoding — Tile38's `OUTPUT json|resp`. Since
/// connections themselves are out of scope, callers thread this through
/// explicitly rather than relying on interpreter-global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Resp,
    Json,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResponse {
    Json(String),
    Resp(RespValue),
}

pub type DispatchResult = RuntimeResult<DispatchResponse>;

/// The seam at which an out-of-scope wire codec would plug in: tokens are
/// already split (no request framing is implemented here), and the
/// response is rendered according to `output` rather than written directly
/// to a socket.
pub trait Dispatch: Send + Sync {
    fn dispatch(&self, tokens: &[String], output: OutputMode) -> DispatchResult;
}

fn render(writer: ScanWriter, output: OutputMode) -> DispatchResponse {
    match output {
        OutputMode::Json => DispatchResponse::Json(writer.to_json()),
        OutputMode::Resp => DispatchResponse::Resp(writer.to_resp()),
    }
}

fn bad_args(msg: impl Into<String>) -> RuntimeReason {
    RuntimeReason::Queue(format!("bad arguments: {}", msg.into()))
}

fn query_command(word: &str) -> Option<Command> {
    match word.to_ascii_uppercase().as_str() {
        "SCAN" => Some(Command::Scan),
        "SEARCH" => Some(Command::Search),
        "NEARBY" => Some(Command::Nearby),
        "WITHIN" => Some(Command::Within),
        "INTERSECTS" => Some(Command::Intersects),
        _ => None,
    }
}

impl Dispatch for GfServer {
    fn dispatch(&self, tokens: &[String], output: OutputMode) -> DispatchResult {
        let Some(cmd) = tokens.first() else {
            return Err(orion_error::StructError::from(bad_args("empty command")));
        };
        let cmd_upper = cmd.to_ascii_uppercase();
        let args = &tokens[1..];

        if let Some(command) = query_command(&cmd_upper) {
            return self.dispatch_query(command, args, output);
        }

        match cmd_upper.as_str() {
            "PING" => Ok(DispatchResponse::Json("{\"ok\":true,\"pong\":true}".to_string())),
            "SERVER" => Ok(DispatchResponse::Json(self.stats().to_json())),
            "SET" => self.dispatch_set(args),
            "GET" => self.dispatch_get(args),
            "DEL" => self.dispatch_del(args),
            "SETHOOK" => self.dispatch_set_hook(args, false),
            "SETCHAN" => self.dispatch_set_hook(args, true),
            "DELHOOK" => self.dispatch_del_hook(args, false),
            "DELCHAN" => self.dispatch_del_hook(args, true),
            other => Err(orion_error::StructError::from(bad_args(format!(
                "unknown command {other:?}"
            )))),
        }
    }
}

impl GfServer {
    fn dispatch_query(&self, command: Command, args: &[String], output: OutputMode) -> DispatchResult {
        let Some(key) = args.first() else {
            return Err(orion_error::StructError::from(bad_args("missing key")));
        };
        let tail: Vec<String> = args[1..].to_vec();
        let tokens = parse_command(command, key, &tail)?;
        let outcome = self.execute_query(tokens)?;
        match outcome {
            gf_core::QueryOutcome::Answered(writer) => Ok(render(writer, output)),
            gf_core::QueryOutcome::GoingLive(_) => Err(orion_error::StructError::from(bad_args(
                "FENCE queries must be registered via SETHOOK/SETCHAN, not dispatched directly",
            ))),
        }
    }

    fn dispatch_set(&self, args: &[String]) -> DispatchResult {
        let [key, id, rest @ ..] = args else {
            return Err(orion_error::StructError::from(bad_args("SET key id ...")));
        };
        let mut i = 0;
        let geometry = match rest.first().map(|s| s.to_ascii_uppercase()).as_deref() {
            Some("POINT") => {
                let lat: f64 = parse_f64(rest.get(1), "lat")?;
                let lon: f64 = parse_f64(rest.get(2), "lon")?;
                let z = rest.get(3).and_then(|s| s.parse::<f64>().ok());
                i = if z.is_some() { 4 } else { 3 };
                Geometry::point(lat, lon, z)
            }
            Some("OBJECT") => {
                let json = rest.get(1).ok_or_else(|| bad_args("OBJECT requires a geojson body"))?;
                i = 2;
                Geometry::from_geojson_str(json)?
            }
            _ => return Err(orion_error::StructError::from(bad_args("SET requires POINT or OBJECT"))),
        };

        let mut fields = FieldList::new();
        let mut ttl: Option<u64> = None;
        while i < rest.len() {
            match rest[i].to_ascii_uppercase().as_str() {
                "FIELD" => {
                    let name = rest.get(i + 1).ok_or_else(|| bad_args("FIELD requires name value"))?;
                    let raw = rest.get(i + 2).ok_or_else(|| bad_args("FIELD requires name value"))?;
                    let value = raw
                        .parse::<f64>()
                        .map(Value::Number)
                        .unwrap_or_else(|_| Value::String(raw.clone()));
                    fields.set(name.clone(), value);
                    i += 3;
                }
                "EX" => {
                    let secs = rest.get(i + 1).ok_or_else(|| bad_args("EX requires seconds"))?;
                    ttl = Some(secs.parse().map_err(|_| bad_args("EX seconds must be an integer"))?);
                    i += 2;
                }
                other => return Err(orion_error::StructError::from(bad_args(format!("unexpected token {other:?}")))),
            }
        }

        let mut object = Object::new(id.clone(), geometry).with_fields(fields);
        if let Some(secs) = ttl {
            object = object.with_ttl(secs);
        }
        self.set_object(key, object)?;
        Ok(DispatchResponse::Json("{\"ok\":true}".to_string()))
    }

    fn dispatch_get(&self, args: &[String]) -> DispatchResult {
        let [key, id] = args else {
            return Err(orion_error::StructError::from(bad_args("GET key id")));
        };
        let found = self.with_object(key, id, |obj| {
            let mut buf = String::from("{\"ok\":true,\"object\":");
            obj.geometry.append_json(&mut buf);
            buf.push('}');
            buf
        });
        match found {
            Some(body) => Ok(DispatchResponse::Json(body)),
            None => Err(orion_error::StructError::from(crate::error::RuntimeReason::Core(
                gf_core::CoreReason::IdNotFound,
            ))),
        }
    }

    fn dispatch_del(&self, args: &[String]) -> DispatchResult {
        let [key, id] = args else {
            return Err(orion_error::StructError::from(bad_args("DEL key id")));
        };
        let removed = self.del_object(key, id)?;
        Ok(DispatchResponse::Json(format!("{{\"ok\":true,\"removed\":{removed}}}")))
    }

    fn dispatch_set_hook(&self, args: &[String], channel: bool) -> DispatchResult {
        let [name, endpoints_raw, command_word, key, tail @ ..] = args else {
            return Err(orion_error::StructError::from(bad_args(
                "SETHOOK name endpoint[,endpoint...] COMMAND key ...",
            )));
        };
        let Some(command) = query_command(command_word) else {
            return Err(orion_error::StructError::from(bad_args(format!(
                "unknown fence command {command_word:?}"
            ))));
        };
        let (fence_tail, metas, ex_secs) = split_hook_trailer(tail)?;
        let fence = parse_command(command, key, &fence_tail)?;
        if !fence.fence {
            return Err(orion_error::StructError::from(bad_args(
                "SETHOOK's query must include FENCE",
            )));
        }
        let endpoints = endpoints_raw.split(',').map(str::to_string).collect();
        let expires_at = ex_secs.map(|secs| SystemTime::now() + Duration::from_secs(secs));
        let def = HookDef {
            name: name.clone(),
            key: key.clone(),
            endpoints,
            fence,
            message: Vec::new(),
            metas,
            channel,
            expires_at,
        };
        let outcome = self.set_hook(def)?;
        Ok(DispatchResponse::Json(format!(
            "{{\"ok\":true,\"already_exists\":{}}}",
            matches!(outcome, gf_core::SetOutcome::AlreadyExists)
        )))
    }

    fn dispatch_del_hook(&self, args: &[String], channel: bool) -> DispatchResult {
        let [name] = args else {
            return Err(orion_error::StructError::from(bad_args("DELHOOK name")));
        };
        let removed = self.del_hook(name, channel)?;
        Ok(DispatchResponse::Json(format!("{{\"ok\":true,\"removed\":{removed}}}")))
    }
}

/// Strips trailing `META k v` pairs and an optional trailing `EX seconds`
/// off a `SETHOOK`/`SETCHAN` tail before it is handed to `parse_command`,
/// since neither keyword belongs to the fence query grammar itself.
fn split_hook_trailer(tail: &[String]) -> RuntimeResult<(Vec<String>, Vec<(String, String)>, Option<u64>)> {
    let mut end = tail.len();
    let mut ex: Option<u64> = None;
    let mut metas_rev: Vec<(String, String)> = Vec::new();
    loop {
        if ex.is_none() && end >= 2 && tail[end - 2].eq_ignore_ascii_case("EX") {
            let secs: u64 = tail[end - 1]
                .parse()
                .map_err(|_| bad_args("EX seconds must be an integer"))?;
            ex = Some(secs);
            end -= 2;
            continue;
        }
        if end >= 3 && tail[end - 3].eq_ignore_ascii_case("META") {
            metas_rev.push((tail[end - 2].clone(), tail[end - 1].clone()));
            end -= 3;
            continue;
        }
        break;
    }
    metas_rev.reverse();
    Ok((tail[..end].to_vec(), metas_rev, ex))
}

fn parse_f64(tok: Option<&String>, label: &str) -> RuntimeResult<f64> {
    tok.ok_or_else(|| bad_args(format!("missing {label}")))?
        .parse::<f64>()
        .map_err(|_| orion_error::StructError::from(bad_args(format!("invalid {label}"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn split_hook_trailer_leaves_plain_fence_tail_untouched() {
        let tail = toks("FENCE DETECT enter,exit");
        let (fence_tail, metas, ex) = split_hook_trailer(&tail).unwrap();
        assert_eq!(fence_tail, tail);
        assert!(metas.is_empty());
        assert_eq!(ex, None);
    }

    #[test]
    fn split_hook_trailer_extracts_trailing_ex() {
        let tail = toks("FENCE DETECT enter,exit EX 30");
        let (fence_tail, metas, ex) = split_hook_trailer(&tail).unwrap();
        assert_eq!(fence_tail, toks("FENCE DETECT enter,exit"));
        assert!(metas.is_empty());
        assert_eq!(ex, Some(30));
    }

    #[test]
    fn split_hook_trailer_extracts_meta_pairs_in_order() {
        let tail = toks("FENCE DETECT enter META team alpha META zone north EX 120");
        let (fence_tail, metas, ex) = split_hook_trailer(&tail).unwrap();
        assert_eq!(fence_tail, toks("FENCE DETECT enter"));
        assert_eq!(
            metas,
            vec![
                ("team".to_string(), "alpha".to_string()),
                ("zone".to_string(), "north".to_string()),
            ]
        );
        assert_eq!(ex, Some(120));
    }

    #[test]
    fn split_hook_trailer_rejects_non_integer_ex() {
        let tail = toks("FENCE DETECT enter EX soon");
        assert!(split_hook_trailer(&tail).is_err());
    }
}
