//! Command channel wire protocol.
//!
//! Inbound messages are text split on `/`; the first field selects the
//! handler. A field is either a keyword (`app_ping`, motion names,
//! `robot_script_stop`, decision tokens) or a JSON order object. Anything
//! else is ignored: most traffic is plain keywords, so undecodable text is
//! expected noise rather than an error.
//!
//! Outbound notifications are newline-terminated text lines, except the ping
//! reply which is a JSON array of per-joint records.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

use crate::actuator::JointTelemetry;

pub const FIELD_DELIMITER: char = '/';
pub const PING: &str = "app_ping";
pub const ORDER_TYPE: &str = "ICECREAM";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressiveMotion {
    Breath,
    Greet,
    DanceRandom,
    DanceA,
    DanceB,
    DanceC,
    Sleep,
    ComeOn,
}

impl ExpressiveMotion {
    pub const ALL: [ExpressiveMotion; 8] = [
        Self::Breath,
        Self::Greet,
        Self::DanceRandom,
        Self::DanceA,
        Self::DanceB,
        Self::DanceC,
        Self::Sleep,
        Self::ComeOn,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Breath => "breath",
            Self::Greet => "greet",
            Self::DanceRandom => "dance_random",
            Self::DanceA => "dance_a",
            Self::DanceB => "dance_b",
            Self::DanceC => "dance_c",
            Self::Sleep => "sleep",
            Self::ComeOn => "comeon",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.keyword() == keyword)
    }
}

impl fmt::Display for ExpressiveMotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Outcome of a sub-decision inside a running order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Go,
    Stop,
}

/// A structured order. Decisions start unset and are filled in by later tokens.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderRequest {
    /// Delay between accepting the order and moving.
    pub start_delay: Duration,
    /// The client asked for a seal inspection before the capsule is used.
    pub sealing_check: bool,
    pub topping: bool,
    /// Pickup-zone decision (`icecream_go` / `icecream_stop`).
    pub proceed: Option<Decision>,
    /// Seal decision (`sealing_pass` / `sealing_reject`).
    pub sealing: Option<Decision>,
}

impl Default for OrderRequest {
    fn default() -> Self {
        Self {
            start_delay: Duration::ZERO,
            sealing_check: false,
            topping: true,
            proceed: None,
            sealing: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Ping,
    Expressive(ExpressiveMotion),
    CleanMode,
    CleanModeEnd,
    TrashMode,
    ScriptStop,
    Order(OrderRequest),
    Proceed(Decision),
    Sealing(Decision),
    /// JSON object with an order type this controller does not serve.
    Unsupported(String),
}

/// Decode one inbound message. `None` means "not for us", which is not an error.
pub fn parse_line(line: &str) -> Option<Command> {
    let line = line.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    let first = line.split(FIELD_DELIMITER).next()?.trim();
    if first.is_empty() {
        return None;
    }
    if first == PING {
        return Some(Command::Ping);
    }
    let field = first.replace(PING, "");
    let field = field.trim();

    if let Some(motion) = ExpressiveMotion::from_keyword(field) {
        return Some(Command::Expressive(motion));
    }
    match field {
        "robot_script_stop" => return Some(Command::ScriptStop),
        "clean_mode" => return Some(Command::CleanMode),
        "clean_mode_end" => return Some(Command::CleanModeEnd),
        "trash_mode" => return Some(Command::TrashMode),
        _ => {}
    }
    if field.contains("icecream_go") {
        return Some(Command::Proceed(Decision::Go));
    }
    if field.contains("icecream_stop") {
        return Some(Command::Proceed(Decision::Stop));
    }
    if field.contains("sealing_pass") {
        return Some(Command::Sealing(Decision::Go));
    }
    if field.contains("sealing_reject") {
        return Some(Command::Sealing(Decision::Stop));
    }
    parse_order(field)
}

fn parse_order(field: &str) -> Option<Command> {
    let value: Value = serde_json::from_str(field).ok()?;
    let kind = value.get("type")?.as_str()?;
    if kind != ORDER_TYPE {
        return Some(Command::Unsupported(kind.to_string()));
    }

    let mut order = OrderRequest::default();
    let Some(req) = value.get("makeReq") else {
        return Some(Command::Order(order));
    };
    match req.get("latency") {
        Some(Value::Number(n)) => order.start_delay = start_delay(n.as_f64()),
        Some(Value::String(s)) => match s.trim() {
            "go" => order.proceed = Some(Decision::Go),
            "stop" => order.proceed = Some(Decision::Stop),
            other => order.start_delay = start_delay(other.parse::<f64>().ok()),
        },
        _ => {}
    }
    if let Some(sealing) = req.get("sealing").and_then(Value::as_str) {
        order.sealing_check = sealing.trim().eq_ignore_ascii_case("yes");
    }
    if let Some(topping) = req.get("topping") {
        order.topping = match topping {
            Value::Bool(b) => *b,
            Value::String(s) => !matches!(s.trim(), "no" | "false" | "0" | ""),
            _ => true,
        };
    }
    Some(Command::Order(order))
}

/// Client-supplied latency in seconds. Negative, non-finite or out-of-range values mean no delay.
fn start_delay(secs: Option<f64>) -> Duration {
    secs
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or_default()
}

// ----------------------------------------------------------------------------
// Outbound
// ----------------------------------------------------------------------------

pub const JOINT_TYPES: [&str; 6] = ["A", "B", "C", "D", "E", "F"];
pub const JOINT_NAMES: [&str; 6] = ["Base", "Shoulder", "Elbow", "Wrist1", "Wrist2", "Wrist3"];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JointRecord {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub joint_name: &'static str,
    pub temperature: f64,
    /// Current rounded to mA, reported ×100.
    pub current: f64,
}

pub fn joint_records(telemetry: &JointTelemetry) -> Vec<JointRecord> {
    (0..JOINT_TYPES.len())
        .map(|i| JointRecord {
            kind: JOINT_TYPES[i],
            joint_name: JOINT_NAMES[i],
            temperature: telemetry.temperatures[i],
            current: (telemetry.currents[i] * 1000.0).round() / 10.0,
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    PhaseStart(String),
    PhaseFinish(String),
    IcecreamStart,
    IcecreamFinish,
    IcecreamCancel,
    SealingCheck,
    Telemetry(Vec<JointRecord>),
    Error(String),
    Fault(i32),
}

impl Notification {
    /// Wire form, newline-terminated.
    pub fn encode(&self) -> String {
        let body = match self {
            Self::PhaseStart(phase) => format!("{}_start", phase),
            Self::PhaseFinish(phase) => format!("{}_finish", phase),
            Self::IcecreamStart => "icecream_start".to_string(),
            Self::IcecreamFinish => "icecream_finish".to_string(),
            Self::IcecreamCancel => "icecream_cancel".to_string(),
            Self::SealingCheck => "sealing_check".to_string(),
            Self::Telemetry(records) => {
                serde_json::to_string(records).unwrap_or_else(|_| "[]".to_string())
            }
            Self::Error(message) => format!("ERROR : {}", message),
            Self::Fault(code) => format!("robot_fault {}", code),
        };
        format!("{}\n", body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_use_first_field_only() {
        assert_eq!(parse_line("greet/extra/ignored"), Some(Command::Expressive(ExpressiveMotion::Greet)));
        assert_eq!(parse_line("extra/greet"), None);
        assert_eq!(parse_line("comeon\n"), Some(Command::Expressive(ExpressiveMotion::ComeOn)));
        assert_eq!(parse_line("dance_random"), Some(Command::Expressive(ExpressiveMotion::DanceRandom)));
        assert_eq!(parse_line("robot_script_stop"), Some(Command::ScriptStop));
        assert_eq!(parse_line("clean_mode_end"), Some(Command::CleanModeEnd));
        assert_eq!(parse_line("trash_mode"), Some(Command::TrashMode));
    }

    #[test]
    fn ping_is_exact_and_prefix_is_stripped() {
        assert_eq!(parse_line("app_ping"), Some(Command::Ping));
        assert_eq!(parse_line("app_ping/whatever"), Some(Command::Ping));
        assert_eq!(parse_line("app_pingsleep"), Some(Command::Expressive(ExpressiveMotion::Sleep)));
    }

    #[test]
    fn decision_tokens_match_by_substring() {
        assert_eq!(parse_line("icecream_go"), Some(Command::Proceed(Decision::Go)));
        assert_eq!(parse_line("xx_icecream_stop"), Some(Command::Proceed(Decision::Stop)));
        assert_eq!(parse_line("sealing_pass"), Some(Command::Sealing(Decision::Go)));
        assert_eq!(parse_line("sealing_reject"), Some(Command::Sealing(Decision::Stop)));
    }

    #[test]
    fn parses_order_payload() {
        let cmd = parse_line(r#"{"type":"ICECREAM","makeReq":{"latency":3,"sealing":"yes"}}"#);
        let Some(Command::Order(order)) = cmd else {
            panic!("expected order, got {:?}", cmd);
        };
        assert_eq!(order.start_delay, Duration::from_secs(3));
        assert!(order.sealing_check);
        assert!(order.topping);
        assert_eq!(order.proceed, None);
        assert_eq!(order.sealing, None);
    }

    #[test]
    fn order_with_string_latency_and_no_topping() {
        let cmd = parse_line(r#"{"type":"ICECREAM","makeReq":{"latency":"2","sealing":"no","topping":false}}"#);
        let Some(Command::Order(order)) = cmd else {
            panic!("expected order");
        };
        assert_eq!(order.start_delay, Duration::from_secs(2));
        assert!(!order.sealing_check);
        assert!(!order.topping);
    }

    #[test]
    fn other_order_types_are_unsupported() {
        assert_eq!(
            parse_line(r#"{"type":"COFFEE"}"#),
            Some(Command::Unsupported("COFFEE".to_string()))
        );
    }

    #[test]
    fn undecodable_text_is_ignored() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("hello robot"), None);
        assert_eq!(parse_line("{not json"), None);
        assert_eq!(parse_line(r#"{"kind":"ICECREAM"}"#), None);
        assert_eq!(parse_line("[1,2,3]"), None);
    }

    #[test]
    fn telemetry_has_six_records_in_joint_order() {
        let telemetry = JointTelemetry {
            temperatures: [30.0, 31.0, 32.0, 33.0, 34.0, 35.0],
            currents: [1.2346, 0.5, 0.0, 0.1, 0.25, 2.0],
        };
        let records = joint_records(&telemetry);
        assert_eq!(records.len(), 6);
        assert_eq!(records[0].kind, "A");
        assert_eq!(records[0].joint_name, "Base");
        assert_eq!(records[5].joint_name, "Wrist3");
        assert!((records[0].current - 123.5).abs() < 1e-9);
        assert!((records[1].current - 50.0).abs() < 1e-9);

        let line = Notification::Telemetry(records).encode();
        assert!(line.ends_with('\n'));
        let parsed: Vec<Value> = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed.len(), 6);
        assert_eq!(parsed[2]["joint_name"], "Elbow");
        assert_eq!(parsed[3]["type"], "D");
    }

    #[test]
    fn out_of_range_latency_means_no_delay() {
        for line in [
            r#"{"type":"ICECREAM","makeReq":{"latency":1e30}}"#,
            r#"{"type":"ICECREAM","makeReq":{"latency":"1e30"}}"#,
            r#"{"type":"ICECREAM","makeReq":{"latency":-4}}"#,
            r#"{"type":"ICECREAM","makeReq":{"latency":"NaN"}}"#,
        ] {
            match parse_line(line) {
                Some(Command::Order(order)) => assert_eq!(order.start_delay, Duration::ZERO, "{}", line),
                other => panic!("{} parsed as {:?}", line, other),
            }
        }
        match parse_line(r#"{"type":"ICECREAM","makeReq":{"latency":"2.5"}}"#) {
            Some(Command::Order(order)) => assert_eq!(order.start_delay, Duration::from_millis(2500)),
            other => panic!("parsed as {:?}", other),
        }
    }

    #[test]
    fn notifications_encode_as_lines() {
        assert_eq!(Notification::PhaseFinish("greet".into()).encode(), "greet_finish\n");
        assert_eq!(Notification::IcecreamCancel.encode(), "icecream_cancel\n");
        assert_eq!(Notification::SealingCheck.encode(), "sealing_check\n");
        assert_eq!(Notification::Fault(31).encode(), "robot_fault 31\n");
    }
}
