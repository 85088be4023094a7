//! Reference business-logic handler: a JSON command protocol dispatching
//! insert/select/update/delete against a `Writers(Id, Name)` table.
//!
//! Grounded directly on `BusinessLogic` (`src/test.cpp` in the original
//! source): same table, same four commands, same status vocabulary
//! (`ok`/`fail`/`param_err`/`sql_err`/`cmd_err`/`req_err`). Ported from
//! hand-rolled `rapidjson` field checks to `serde_json::Value` access, and
//! from an exception-based `executeSQL` to the `mysql` crate's `Result`.

use std::sync::Arc;

use log::warn;
use mysql::prelude::Queryable;
use serde::Serialize;
use serde_json::Value;

use crate::dbpool::DbPool;
use crate::handler::{BusinessHandler, Request, Response};

const INSERT_CMD: i64 = 0;
const SELECT_CMD: i64 = 1;
const UPDATE_CMD: i64 = 2;
const DELETE_CMD: i64 = 3;

#[derive(Serialize)]
struct Reply {
    cli_timestamp: i64,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    names: Option<Vec<String>>,
}

/// Builds a [`BusinessHandler`] implementing the reference insert/select/
/// update/delete protocol against `db`.
pub fn reference_handler(db: Arc<DbPool>) -> BusinessHandler {
    Arc::new(move |request: &Request, response: Response| {
        let reply = handle(&db, request);
        let body = serde_json::to_vec(&reply).expect("Reply always serializes");
        if let Err(e) = response.send(&body) {
            warn!("failed to send response: {e}");
        }
    })
}

/// Result of validating a request body against the reference protocol's
/// envelope, before any database access is attempted.
enum Validated {
    ReqErr,
    CmdErr { cli_timestamp: i64 },
    Dispatch { cli_timestamp: i64, cmd: i64, doc: Value },
}

/// Parses and validates a request body, without touching the database.
/// Split out so the `req_err`/`cmd_err` paths are unit-testable without a
/// live MySQL connection.
fn validate(request: &Request) -> Validated {
    let doc: Value = match request.body_str().ok().and_then(|s| serde_json::from_str(s).ok()) {
        Some(Value::Object(map)) => Value::Object(map),
        _ => return Validated::ReqErr,
    };

    let Some(cli_timestamp) = doc.get("timestamp").and_then(Value::as_i64) else {
        return Validated::ReqErr;
    };

    let Some(cmd) = doc.get("cmd").and_then(Value::as_i64) else {
        return Validated::CmdErr { cli_timestamp };
    };

    if !matches!(cmd, INSERT_CMD | SELECT_CMD | UPDATE_CMD | DELETE_CMD) {
        return Validated::CmdErr { cli_timestamp };
    }

    Validated::Dispatch { cli_timestamp, cmd, doc }
}

fn handle(db: &DbPool, request: &Request) -> Reply {
    let (cli_timestamp, cmd, doc) = match validate(request) {
        Validated::ReqErr => {
            return Reply {
                cli_timestamp: 0,
                status: "req_err",
                names: None,
            }
        }
        Validated::CmdErr { cli_timestamp } => {
            return Reply {
                cli_timestamp,
                status: "cmd_err",
                names: None,
            }
        }
        Validated::Dispatch { cli_timestamp, cmd, doc } => (cli_timestamp, cmd, doc),
    };

    let mut conn = db.check_out();
    let outcome = match cmd {
        INSERT_CMD => insert(&mut conn, &doc),
        SELECT_CMD => select(&mut conn, &doc),
        UPDATE_CMD => update(&mut conn, &doc),
        DELETE_CMD => remove(&mut conn, &doc),
        _ => unreachable!("validate() only dispatches known commands"),
    };
    db.check_in(conn);

    match outcome {
        Outcome::ParamErr => Reply {
            cli_timestamp,
            status: "param_err",
            names: None,
        },
        Outcome::SqlErr(e) => {
            warn!("sql error: {e}");
            Reply {
                cli_timestamp,
                status: "sql_err",
                names: None,
            }
        }
        Outcome::Fail => Reply {
            cli_timestamp,
            status: "fail",
            names: None,
        },
        Outcome::Ok => Reply {
            cli_timestamp,
            status: "ok",
            names: None,
        },
        Outcome::Select(names) => Reply {
            cli_timestamp,
            status: "ok",
            names: Some(names),
        },
    }
}

enum Outcome {
    ParamErr,
    SqlErr(mysql::Error),
    Fail,
    Ok,
    Select(Vec<String>),
}

fn insert(conn: &mut mysql::Conn, doc: &Value) -> Outcome {
    let (Some(id), Some(name)) = (doc.get("Id").and_then(Value::as_i64), doc.get("Name").and_then(Value::as_str))
    else {
        return Outcome::ParamErr;
    };

    match conn.exec_drop("INSERT INTO Writers(Id, Name) VALUES (?, ?)", (id, name)) {
        Ok(()) if conn.affected_rows() > 0 => Outcome::Ok,
        Ok(()) => Outcome::Fail,
        Err(e) => Outcome::SqlErr(e),
    }
}

fn select(conn: &mut mysql::Conn, doc: &Value) -> Outcome {
    let Some(id) = doc.get("Id").and_then(Value::as_i64) else {
        return Outcome::ParamErr;
    };

    match conn.exec::<String, _, _>("SELECT Name FROM Writers WHERE Id = ?", (id,)) {
        Ok(names) => Outcome::Select(names),
        Err(e) => Outcome::SqlErr(e),
    }
}

fn update(conn: &mut mysql::Conn, doc: &Value) -> Outcome {
    let (Some(id), Some(name)) = (doc.get("Id").and_then(Value::as_i64), doc.get("Name").and_then(Value::as_str))
    else {
        return Outcome::ParamErr;
    };

    match conn.exec_drop("UPDATE Writers SET Name = ? WHERE Id = ?", (name, id)) {
        Ok(()) if conn.affected_rows() > 0 => Outcome::Ok,
        Ok(()) => Outcome::Fail,
        Err(e) => Outcome::SqlErr(e),
    }
}

fn remove(conn: &mut mysql::Conn, doc: &Value) -> Outcome {
    let Some(id) = doc.get("Id").and_then(Value::as_i64) else {
        return Outcome::ParamErr;
    };

    match conn.exec_drop("DELETE FROM Writers WHERE Id = ?", (id,)) {
        Ok(()) if conn.affected_rows() > 0 => Outcome::Ok,
        Ok(()) => Outcome::Fail,
        Err(e) => Outcome::SqlErr(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_json_yields_req_err() {
        let request = Request::new(b"not json".to_vec());
        assert!(matches!(validate(&request), Validated::ReqErr));
    }

    #[test]
    fn missing_timestamp_yields_req_err() {
        let request = Request::new(br#"{"cmd":0,"Id":1}"#.to_vec());
        assert!(matches!(validate(&request), Validated::ReqErr));
    }

    #[test]
    fn missing_cmd_yields_cmd_err() {
        let request = Request::new(br#"{"timestamp":123}"#.to_vec());
        assert!(matches!(
            validate(&request),
            Validated::CmdErr { cli_timestamp: 123 }
        ));
    }

    #[test]
    fn unknown_cmd_yields_cmd_err() {
        let request = Request::new(br#"{"timestamp":123,"cmd":99}"#.to_vec());
        assert!(matches!(
            validate(&request),
            Validated::CmdErr { cli_timestamp: 123 }
        ));
    }

    #[test]
    fn known_cmd_dispatches() {
        let request = Request::new(br#"{"timestamp":1,"cmd":0,"Id":7,"Name":"a"}"#.to_vec());
        assert!(matches!(
            validate(&request),
            Validated::Dispatch { cli_timestamp: 1, cmd: 0, .. }
        ));
    }

    #[test]
    fn reply_serializes_without_names_field_when_absent() {
        let reply = Reply {
            cli_timestamp: 42,
            status: "ok",
            names: None,
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert!(!json.contains("names"));
        assert!(json.contains("\"cli_timestamp\":42"));
    }

    #[test]
    fn reply_serializes_names_field_for_select() {
        let reply = Reply {
            cli_timestamp: 1,
            status: "ok",
            names: Some(vec!["a".to_string(), "b".to_string()]),
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains("\"names\":[\"a\",\"b\"]"));
    }
}
