//! Wire format spoken with the guest-side driver: one JSON object per line.

use serde::{Deserialize, Serialize};

use crate::core_types::GuestError;

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Request<'a> {
    Execute { id: u64, source: &'a str },
    Install { id: u64, inputs: &'a [String] },
    Collect { id: u64 },
    Restore { id: u64 },
}

impl Request<'_> {
    pub fn id(&self) -> u64 {
        match self {
            Request::Execute { id, .. }
            | Request::Install { id, .. }
            | Request::Collect { id }
            | Request::Restore { id } => *id,
        }
    }

    pub fn op(&self) -> &'static str {
        match self {
            Request::Execute { .. } => "execute",
            Request::Install { .. } => "install",
            Request::Collect { .. } => "collect",
            Request::Restore { .. } => "restore",
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Reply {
    Ok {
        id: Option<u64>,
        #[serde(default)]
        value: Option<String>,
        #[serde(default)]
        stdout: Option<String>,
        #[serde(default)]
        stderr: Option<String>,
    },
    Raised {
        id: Option<u64>,
        error: GuestError,
    },
    Fault {
        id: Option<u64>,
        message: String,
    },
}

impl Reply {
    pub fn id(&self) -> Option<u64> {
        match self {
            Reply::Ok { id, .. } | Reply::Raised { id, .. } | Reply::Fault { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let inputs = vec!["x".to_string()];
        let line = serde_json::to_string(&Request::Install { id: 4, inputs: &inputs }).unwrap();
        assert_eq!(line, r#"{"op":"install","id":4,"inputs":["x"]}"#);

        let line = serde_json::to_string(&Request::Collect { id: 5 }).unwrap();
        assert_eq!(line, r#"{"op":"collect","id":5}"#);
    }

    #[test]
    fn reply_variants() {
        let ok: Reply = serde_json::from_str(r#"{"status": "ok", "value": null, "id": 2}"#).unwrap();
        assert_eq!(
            ok,
            Reply::Ok { id: Some(2), value: None, stdout: None, stderr: None }
        );

        let raised: Reply = serde_json::from_str(
            r#"{"status": "raised", "error": {"type": "NameError", "message": "name 'x' is not defined", "traceback": "..."}, "id": 3}"#,
        )
        .unwrap();
        match raised {
            Reply::Raised { id, error } => {
                assert_eq!(id, Some(3));
                assert_eq!(error.kind, "NameError");
            }
            other => panic!("unexpected reply {:?}", other),
        }

        let fault: Reply =
            serde_json::from_str(r#"{"status": "fault", "message": "boom", "id": null}"#).unwrap();
        assert_eq!(fault.id(), None);
    }
}
